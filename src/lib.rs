pub mod game;

use gloo_timers::future::TimeoutFuture;
use serde::Serialize;
use serde_wasm_bindgen::{from_value, to_value};
use std::str::FromStr;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;
use web_sys::js_sys::{Function, Promise};

pub use game::{
    known_levels, max_rounds_for_level, GameEvent, GameOutcome, GamePhase, GameState,
    IntegrityError, Pad, PressOutcome, RevealCue, RevealPlan, RoundEngine, RuleError,
    RuleResolution, PAD_ACTIVE_MS, REVEAL_STEP_MS, ROUND_BREAK_MS, TURN_HANDOFF_MS,
};

#[cfg(feature = "wee_alloc")]
#[global_allocator]
static ALLOC: wee_alloc::WeeAlloc = wee_alloc::WeeAlloc::INIT;

#[wasm_bindgen(start)]
pub fn start() {
    set_panic_hook();
}

fn to_js_error(error: RuleError) -> JsValue {
    to_value(&error).unwrap_or_else(|serialize_err| JsValue::from_str(&serialize_err.to_string()))
}

fn serde_to_js_error<E: std::fmt::Display>(error: E) -> JsValue {
    JsValue::from_str(&error.to_string())
}

fn resolution_from_events(state: &GameState, events: Vec<GameEvent>) -> RuleResolution {
    RuleResolution::new(state.clone(), events)
}

fn resolution_json(resolution: RuleResolution) -> Result<String, JsValue> {
    serde_json::to_string(&resolution).map_err(serde_to_js_error)
}

fn parse_pad(color: &str) -> Result<Pad, JsValue> {
    Pad::from_str(color)
        .map_err(|_| JsValue::from_str(&format!("unknown pad color: {color}")))
}

#[derive(Serialize)]
struct RevealResponse {
    plan: RevealPlan,
    resolution: RuleResolution,
}

#[derive(Serialize)]
struct PressResponse {
    outcome: PressOutcome,
    resolution: RuleResolution,
}

#[wasm_bindgen]
pub struct GameEngine {
    state: GameState,
    engine: RoundEngine,
}

#[wasm_bindgen]
impl GameEngine {
    /// 可选地从 JSON 恢复状态；传入种子则整局可复现。
    #[wasm_bindgen(constructor)]
    pub fn new(initial_state_json: Option<String>, seed: Option<u64>) -> Result<GameEngine, JsValue> {
        let state = if let Some(json) = initial_state_json {
            serde_json::from_str(&json).map_err(serde_to_js_error)?
        } else {
            GameState::new()
        };
        let engine = match seed {
            Some(seed) => RoundEngine::with_seed(seed),
            None => RoundEngine::new(),
        };
        Ok(GameEngine { state, engine })
    }

    pub fn state_json(&self) -> Result<String, JsValue> {
        serde_json::to_string(&self.state).map_err(serde_to_js_error)
    }

    pub fn set_state_json(&mut self, json: &str) -> Result<(), JsValue> {
        let state: GameState = serde_json::from_str(json).map_err(serde_to_js_error)?;
        self.state = state;
        Ok(())
    }

    pub fn start_game(&mut self, level: u8) -> Result<String, JsValue> {
        let events = self
            .engine
            .start_game(&mut self.state, level)
            .map_err(to_js_error)?;
        web_sys::console::log_1(
            &format!(
                "simon: level {} started, {} rounds to win",
                level, self.state.max_rounds
            )
            .into(),
        );
        resolution_json(resolution_from_events(&self.state, events))
    }

    /// 序列增长一步，返回揭示时间表和引擎事件。
    pub fn begin_computer_turn(&mut self) -> Result<String, JsValue> {
        let events = self
            .engine
            .begin_computer_turn(&mut self.state)
            .map_err(to_js_error)?;
        let response = RevealResponse {
            plan: RevealPlan::for_sequence(&self.state.target_sequence),
            resolution: resolution_from_events(&self.state, events),
        };
        serde_json::to_string(&response).map_err(serde_to_js_error)
    }

    pub fn turn_ready(&mut self) -> Result<String, JsValue> {
        let events = self.engine.turn_ready(&mut self.state);
        resolution_json(resolution_from_events(&self.state, events))
    }

    pub fn submit_press(&mut self, color: &str) -> Result<String, JsValue> {
        let pad = parse_pad(color)?;
        let (outcome, events) = self
            .engine
            .submit_press(&mut self.state, pad)
            .map_err(to_js_error)?;
        let response = PressResponse {
            outcome,
            resolution: resolution_from_events(&self.state, events),
        };
        serde_json::to_string(&response).map_err(serde_to_js_error)
    }

    pub fn phase(&self) -> String {
        format!("{:?}", self.state.phase)
    }

    pub fn round(&self) -> u32 {
        self.state.round
    }

    pub fn max_rounds(&self) -> u32 {
        self.state.max_rounds
    }

    pub fn presses_remaining(&self) -> usize {
        self.state.presses_remaining()
    }

    pub fn target_sequence(&self) -> Result<JsValue, JsValue> {
        to_value(&self.state.target_sequence).map_err(JsValue::from)
    }

    pub fn player_sequence(&self) -> Result<JsValue, JsValue> {
        to_value(&self.state.player_sequence).map_err(JsValue::from)
    }

    /// 给玩家看的状态文案，沿用原版的海盗口吻。
    pub fn status_text(&self) -> String {
        match self.state.phase {
            GamePhase::Idle => "Captain's Orders".to_string(),
            GamePhase::ComputerTurn => "The computer's turn...".to_string(),
            GamePhase::PlayerTurn => {
                format!("Your turn: {} presses left", self.state.presses_remaining())
            }
            GamePhase::GameOver => match self.state.outcome {
                Some(GameOutcome::Won { .. }) => "Shiver me timbers! Ye won!".to_string(),
                _ => "Arrr, ye pressed the wrong pad! Walk the plank!".to_string(),
            },
        }
    }

    /// 按时间表逐个触发 `on_reveal(pad)`，在允许输入的时刻 resolve。
    /// 定时一旦排入便不会取消；之后是否交棒由调用方再调 `turn_ready` 决定。
    pub fn play_reveals(&self, on_reveal: Function) -> Promise {
        let plan = RevealPlan::for_sequence(&self.state.target_sequence);

        future_to_promise(async move {
            let mut elapsed = 0u32;
            for cue in &plan.cues {
                TimeoutFuture::new(cue.delay_ms.saturating_sub(elapsed)).await;
                elapsed = cue.delay_ms;
                let pad = to_value(&cue.pad).map_err(JsValue::from)?;
                on_reveal.call1(&JsValue::NULL, &pad)?;
            }
            TimeoutFuture::new(plan.input_open_ms.saturating_sub(elapsed)).await;
            Ok(JsValue::from_f64(plan.input_open_ms as f64))
        })
    }
}

/// 返回一个空闲的初始状态，方便前端初始化。
#[wasm_bindgen(js_name = "createGameState")]
pub fn create_game_state() -> Result<JsValue, JsValue> {
    to_value(&GameState::new()).map_err(JsValue::from)
}

/// 返回一个进行中的示例状态，方便前端调试。
#[wasm_bindgen(js_name = "sampleGameState")]
pub fn sample_game_state() -> Result<JsValue, JsValue> {
    to_value(&GameState::sample()).map_err(JsValue::from)
}

/// 将传入的游戏状态进行深拷贝后返回。
#[wasm_bindgen(js_name = "cloneGameState")]
pub fn clone_game_state(state: JsValue) -> Result<JsValue, JsValue> {
    let state: GameState = from_value(state).map_err(JsValue::from)?;
    let cloned = state.clone();
    to_value(&cloned).map_err(JsValue::from)
}

#[wasm_bindgen(js_name = "startGame")]
pub fn start_game(state: JsValue, level: u8) -> Result<JsValue, JsValue> {
    let mut state: GameState = from_value(state).map_err(JsValue::from)?;
    let mut engine = RoundEngine::new();
    match engine.start_game(&mut state, level) {
        Ok(events) => to_value(&RuleResolution::new(state, events)).map_err(JsValue::from),
        Err(error) => Err(to_js_error(error)),
    }
}

#[wasm_bindgen(js_name = "beginComputerTurn")]
pub fn begin_computer_turn(state: JsValue) -> Result<JsValue, JsValue> {
    let mut state: GameState = from_value(state).map_err(JsValue::from)?;
    let mut engine = RoundEngine::new();
    match engine.begin_computer_turn(&mut state) {
        Ok(events) => {
            let response = RevealResponse {
                plan: RevealPlan::for_sequence(&state.target_sequence),
                resolution: RuleResolution::new(state, events),
            };
            to_value(&response).map_err(JsValue::from)
        }
        Err(error) => Err(to_js_error(error)),
    }
}

#[wasm_bindgen(js_name = "turnReady")]
pub fn turn_ready(state: JsValue) -> Result<JsValue, JsValue> {
    let mut state: GameState = from_value(state).map_err(JsValue::from)?;
    let mut engine = RoundEngine::new();
    let events = engine.turn_ready(&mut state);
    to_value(&RuleResolution::new(state, events)).map_err(JsValue::from)
}

#[wasm_bindgen(js_name = "submitPress")]
pub fn submit_press(state: JsValue, color: &str) -> Result<JsValue, JsValue> {
    let mut state: GameState = from_value(state).map_err(JsValue::from)?;
    let pad = parse_pad(color)?;
    let mut engine = RoundEngine::new();
    match engine.submit_press(&mut state, pad) {
        Ok((outcome, events)) => {
            let response = PressResponse {
                outcome,
                resolution: RuleResolution::new(state, events),
            };
            to_value(&response).map_err(JsValue::from)
        }
        Err(error) => Err(to_js_error(error)),
    }
}

/// 纯计算：给出当前目标序列的揭示时间表。
#[wasm_bindgen(js_name = "revealPlan")]
pub fn reveal_plan(state: JsValue) -> Result<JsValue, JsValue> {
    let state: GameState = from_value(state).map_err(JsValue::from)?;
    let plan = RevealPlan::for_sequence(&state.target_sequence);
    to_value(&plan).map_err(JsValue::from)
}

#[wasm_bindgen(js_name = "maxRoundsForLevel")]
pub fn max_rounds_for_level_js(level: u8) -> Option<u32> {
    max_rounds_for_level(level)
}

#[wasm_bindgen(js_name = "validateState")]
pub fn validate_state(state: JsValue) -> Result<(), JsValue> {
    let state: GameState = from_value(state).map_err(JsValue::from)?;
    state
        .integrity_check()
        .map_err(|error| to_js_error(RuleError::IntegrityViolation { error }))?;
    Ok(())
}

#[cfg(feature = "console_error_panic_hook")]
fn set_panic_hook() {
    console_error_panic_hook::set_once();
}

#[cfg(not(feature = "console_error_panic_hook"))]
fn set_panic_hook() {}
