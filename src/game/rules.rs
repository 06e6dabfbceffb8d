use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::state::{
    max_rounds_for_level, GameEvent, GameOutcome, GamePhase, GameState, IntegrityError, Pad,
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PressOutcome {
    Continue,
    RoundAdvanced,
    Won,
    Mismatch,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum RuleError {
    UnknownLevel {
        level: u8,
    },
    InvalidPhase {
        expected: GamePhase,
        actual: GamePhase,
    },
    RevealAlreadyQueued {
        round: u32,
    },
    IntegrityViolation {
        error: IntegrityError,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleResolution {
    pub state: GameState,
    pub events: Vec<GameEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<GameOutcome>,
}

impl RuleResolution {
    pub fn new(state: GameState, mut events: Vec<GameEvent>) -> Self {
        let outcome = state.outcome.clone();
        if let Some(ref ending) = outcome {
            let has_terminal = events
                .iter()
                .any(|event| matches!(event, GameEvent::GameWon { .. } | GameEvent::GameLost { .. }));
            if !has_terminal {
                events.push(match ending {
                    GameOutcome::Won { rounds } => GameEvent::GameWon { rounds: *rounds },
                    GameOutcome::Lost {
                        position,
                        expected,
                        actual,
                    } => GameEvent::GameLost {
                        position: *position,
                        expected: *expected,
                        actual: *actual,
                    },
                });
            }
        }

        Self {
            state,
            events,
            outcome,
        }
    }
}

/// 回合引擎：序列生成、回合交替、按键校验与胜负判定都在这里。
/// 所有揭示延时由外部调度器驱动，引擎本身不碰定时器。
pub struct RoundEngine {
    rng: SmallRng,
}

impl RoundEngine {
    pub fn new() -> Self {
        Self {
            rng: SmallRng::from_entropy(),
        }
    }

    /// 固定种子，单局走向完全可复现。
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    fn ensure_phase(state: &GameState, expected: GamePhase) -> Result<(), RuleError> {
        if state.phase != expected {
            return Err(RuleError::InvalidPhase {
                expected,
                actual: state.phase,
            });
        }
        Ok(())
    }

    fn ensure_integrity(state: &GameState) -> Result<(), RuleError> {
        state
            .integrity_check()
            .map_err(|error| RuleError::IntegrityViolation { error })
    }

    fn next_pad(&mut self) -> Pad {
        let index = self.rng.gen_range(0..Pad::ALL.len());
        Pad::ALL[index]
    }

    /// 开新局。只允许从 Idle 或 GameOver 进入；未知关卡时状态保持不变。
    pub fn start_game(
        &mut self,
        state: &mut GameState,
        level: u8,
    ) -> Result<Vec<GameEvent>, RuleError> {
        match state.phase {
            GamePhase::Idle | GamePhase::GameOver => {}
            actual => {
                return Err(RuleError::InvalidPhase {
                    expected: GamePhase::Idle,
                    actual,
                })
            }
        }

        let max_rounds = max_rounds_for_level(level).ok_or(RuleError::UnknownLevel { level })?;

        state.level = level;
        state.max_rounds = max_rounds;
        state.round = 1;
        state.target_sequence.clear();
        state.player_sequence.clear();
        state.event_log.clear();
        state.outcome = None;
        state.phase = GamePhase::ComputerTurn;

        let event = GameEvent::GameStarted { level, max_rounds };
        state.record_event(event.clone());
        Ok(vec![event])
    }

    /// 目标序列增长一步并进入揭示。每回合只允许调用一次；
    /// 揭示时间表由调用方通过 `RevealPlan::for_sequence` 取得。
    pub fn begin_computer_turn(
        &mut self,
        state: &mut GameState,
    ) -> Result<Vec<GameEvent>, RuleError> {
        Self::ensure_phase(state, GamePhase::ComputerTurn)?;
        Self::ensure_integrity(state)?;

        if state.reveal_queued() {
            return Err(RuleError::RevealAlreadyQueued { round: state.round });
        }

        let pad = self.next_pad();
        state.target_sequence.push(pad);
        state.player_sequence.clear();

        let mut events = Vec::new();
        let round_event = GameEvent::RoundStarted {
            round: state.round,
            sequence_len: state.target_sequence.len(),
        };
        state.record_event(round_event.clone());
        events.push(round_event);

        let extend_event = GameEvent::SequenceExtended { pad };
        state.record_event(extend_event.clone());
        events.push(extend_event);

        Ok(events)
    }

    /// 揭示延时结束后由调度器触发，交棒给玩家。
    /// 延时回调无法取消，过期触发（阶段已不再是 ComputerTurn，
    /// 或本回合还没有生成揭示）一律静默忽略。
    pub fn turn_ready(&mut self, state: &mut GameState) -> Vec<GameEvent> {
        if state.phase != GamePhase::ComputerTurn || !state.reveal_queued() {
            return Vec::new();
        }

        state.phase = GamePhase::PlayerTurn;
        state.player_sequence.clear();

        let event = GameEvent::InputPhaseEntered {
            presses_expected: state.target_sequence.len(),
        };
        state.record_event(event.clone());
        vec![event]
    }

    /// 校验一次按键。只在 PlayerTurn 合法；错按立即终局，
    /// 两条序列保留为只读直到下一次 start_game。
    pub fn submit_press(
        &mut self,
        state: &mut GameState,
        pad: Pad,
    ) -> Result<(PressOutcome, Vec<GameEvent>), RuleError> {
        Self::ensure_phase(state, GamePhase::PlayerTurn)?;
        Self::ensure_integrity(state)?;

        let position = state.player_sequence.len();
        let expected = match state.target_sequence.get(position).copied() {
            Some(expected) => expected,
            None => {
                return Err(RuleError::IntegrityViolation {
                    error: IntegrityError::PlayerSequenceOverrun {
                        player_len: position + 1,
                        target_len: state.target_sequence.len(),
                    },
                })
            }
        };
        state.player_sequence.push(pad);

        if pad != expected {
            state.phase = GamePhase::GameOver;
            state.outcome = Some(GameOutcome::Lost {
                position,
                expected,
                actual: pad,
            });
            let event = GameEvent::GameLost {
                position,
                expected,
                actual: pad,
            };
            state.record_event(event.clone());
            return Ok((PressOutcome::Mismatch, vec![event]));
        }

        if state.player_sequence.len() < state.target_sequence.len() {
            let event = GameEvent::PressAccepted {
                pad,
                position,
                remaining: state.presses_remaining(),
            };
            state.record_event(event.clone());
            return Ok((PressOutcome::Continue, vec![event]));
        }

        self.complete_round(state)
    }

    /// 玩家刚刚完整复现了目标序列：按回合数对最大回合数判定胜负或推进。
    fn complete_round(
        &mut self,
        state: &mut GameState,
    ) -> Result<(PressOutcome, Vec<GameEvent>), RuleError> {
        let mut events = Vec::new();
        let completed = GameEvent::RoundCompleted { round: state.round };
        state.record_event(completed.clone());
        events.push(completed);

        if state.round == state.max_rounds {
            state.phase = GamePhase::GameOver;
            state.outcome = Some(GameOutcome::Won {
                rounds: state.round,
            });
            let event = GameEvent::GameWon {
                rounds: state.round,
            };
            state.record_event(event.clone());
            events.push(event);
            return Ok((PressOutcome::Won, events));
        }

        state.round += 1;
        state.player_sequence.clear();
        state.phase = GamePhase::ComputerTurn;
        Ok((PressOutcome::RoundAdvanced, events))
    }
}

impl Default for RoundEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::reveal::RevealPlan;

    fn started_state(engine: &mut RoundEngine, level: u8) -> GameState {
        let mut state = GameState::new();
        engine
            .start_game(&mut state, level)
            .expect("start_game should succeed");
        state
    }

    /// 让玩家正确复现整条目标序列，返回最后一次按键的结果。
    fn replay_round(engine: &mut RoundEngine, state: &mut GameState) -> PressOutcome {
        engine
            .begin_computer_turn(state)
            .expect("begin_computer_turn should succeed");
        let _ = engine.turn_ready(state);

        let target = state.target_sequence.clone();
        let mut last = None;
        for (index, pad) in target.iter().enumerate() {
            let (outcome, _events) = engine
                .submit_press(state, *pad)
                .expect("correct press should be accepted");
            if index + 1 < target.len() {
                assert_eq!(outcome, PressOutcome::Continue);
            }
            last = Some(outcome);
        }
        last.expect("target sequence should not be empty")
    }

    #[test]
    fn start_game_resolves_max_rounds_from_table() {
        let mut engine = RoundEngine::with_seed(1);
        for (level, expected) in [(1u8, 8u32), (2, 14), (3, 20), (4, 31)] {
            let state = started_state(&mut engine, level);
            assert_eq!(state.max_rounds, expected);
            assert_eq!(state.round, 1);
            assert_eq!(state.phase, GamePhase::ComputerTurn);
            assert!(state.target_sequence.is_empty());
            assert!(state.player_sequence.is_empty());
        }
    }

    #[test]
    fn start_game_rejects_unknown_level() {
        let mut engine = RoundEngine::with_seed(1);
        let mut state = GameState::new();
        let error = engine
            .start_game(&mut state, 9)
            .expect_err("level 9 is not in the table");
        assert_eq!(error, RuleError::UnknownLevel { level: 9 });
        assert_eq!(state.phase, GamePhase::Idle, "state must be untouched");
        assert_eq!(state, GameState::new());
    }

    #[test]
    fn start_game_rejects_mid_game_restart() {
        let mut engine = RoundEngine::with_seed(1);
        let mut state = started_state(&mut engine, 1);
        let error = engine
            .start_game(&mut state, 1)
            .expect_err("restart mid game should fail");
        assert_eq!(
            error,
            RuleError::InvalidPhase {
                expected: GamePhase::Idle,
                actual: GamePhase::ComputerTurn,
            }
        );
    }

    #[test]
    fn begin_computer_turn_appends_exactly_one_pad() {
        let mut engine = RoundEngine::with_seed(7);
        let mut state = started_state(&mut engine, 1);

        let events = engine
            .begin_computer_turn(&mut state)
            .expect("first reveal should succeed");
        assert_eq!(state.target_sequence.len(), 1);
        assert!(events
            .iter()
            .any(|event| matches!(event, GameEvent::SequenceExtended { .. })));

        let error = engine
            .begin_computer_turn(&mut state)
            .expect_err("second reveal in the same round should fail");
        assert_eq!(error, RuleError::RevealAlreadyQueued { round: 1 });
        assert_eq!(state.target_sequence.len(), 1);
    }

    #[test]
    fn turn_ready_hands_over_to_player() {
        let mut engine = RoundEngine::with_seed(7);
        let mut state = started_state(&mut engine, 1);
        engine
            .begin_computer_turn(&mut state)
            .expect("reveal should succeed");

        let events = engine.turn_ready(&mut state);
        assert_eq!(state.phase, GamePhase::PlayerTurn);
        assert_eq!(
            events,
            vec![GameEvent::InputPhaseEntered {
                presses_expected: 1
            }]
        );
    }

    #[test]
    fn stale_turn_ready_is_a_no_op() {
        let mut engine = RoundEngine::with_seed(7);

        // GameOver 之后迟到的回调：不得改变任何状态。
        let mut state = started_state(&mut engine, 1);
        engine
            .begin_computer_turn(&mut state)
            .expect("reveal should succeed");
        let _ = engine.turn_ready(&mut state);
        let wrong = if state.target_sequence[0] == Pad::Red {
            Pad::Blue
        } else {
            Pad::Red
        };
        let _ = engine.submit_press(&mut state, wrong);
        let snapshot = state.clone();
        assert!(engine.turn_ready(&mut state).is_empty());
        assert_eq!(state, snapshot);

        // 揭示尚未生成时的触发同样忽略。
        let mut fresh = started_state(&mut engine, 1);
        assert!(engine.turn_ready(&mut fresh).is_empty());
        assert_eq!(fresh.phase, GamePhase::ComputerTurn);
    }

    #[test]
    fn submit_press_outside_player_turn_is_invalid() {
        let mut engine = RoundEngine::with_seed(3);
        let mut state = started_state(&mut engine, 1);
        let error = engine
            .submit_press(&mut state, Pad::Red)
            .expect_err("presses during the computer turn must be rejected");
        assert_eq!(
            error,
            RuleError::InvalidPhase {
                expected: GamePhase::PlayerTurn,
                actual: GamePhase::ComputerTurn,
            }
        );
    }

    #[test]
    fn correct_round_advances_and_grows_sequence() {
        let mut engine = RoundEngine::with_seed(11);
        let mut state = started_state(&mut engine, 1);

        let outcome = replay_round(&mut engine, &mut state);
        assert_eq!(outcome, PressOutcome::RoundAdvanced);
        assert_eq!(state.round, 2);
        assert_eq!(state.phase, GamePhase::ComputerTurn);
        assert!(state.player_sequence.is_empty());

        engine
            .begin_computer_turn(&mut state)
            .expect("next reveal should succeed");
        assert_eq!(state.target_sequence.len(), 2, "sequence grows by one");
    }

    #[test]
    fn earlier_rounds_entries_never_change() {
        let mut engine = RoundEngine::with_seed(19);
        let mut state = started_state(&mut engine, 2);

        let mut previous: Vec<Pad> = Vec::new();
        for _ in 0..5 {
            assert_eq!(
                replay_round(&mut engine, &mut state),
                PressOutcome::RoundAdvanced
            );
            assert_eq!(&state.target_sequence[..previous.len()], &previous[..]);
            previous = state.target_sequence.clone();
        }
    }

    #[test]
    fn mismatch_ends_the_game_and_retains_sequences() {
        let mut engine = RoundEngine::with_seed(5);
        let mut state = GameState::new();
        engine
            .start_game(&mut state, 1)
            .expect("start_game should succeed");
        state.target_sequence = vec![Pad::Red, Pad::Blue];
        state.round = 2;
        state.phase = GamePhase::PlayerTurn;

        let (outcome, _events) = engine
            .submit_press(&mut state, Pad::Red)
            .expect("first press matches");
        assert_eq!(outcome, PressOutcome::Continue);

        let (outcome, events) = engine
            .submit_press(&mut state, Pad::Green)
            .expect("wrong press still resolves");
        assert_eq!(outcome, PressOutcome::Mismatch);
        assert_eq!(state.phase, GamePhase::GameOver);
        assert_eq!(
            state.outcome,
            Some(GameOutcome::Lost {
                position: 1,
                expected: Pad::Blue,
                actual: Pad::Green,
            })
        );
        assert_eq!(
            events,
            vec![GameEvent::GameLost {
                position: 1,
                expected: Pad::Blue,
                actual: Pad::Green,
            }]
        );
        assert_eq!(state.target_sequence, vec![Pad::Red, Pad::Blue]);
        assert_eq!(state.player_sequence, vec![Pad::Red, Pad::Green]);
    }

    #[test]
    fn final_round_win_at_level_one() {
        let mut engine = RoundEngine::with_seed(23);
        let mut state = started_state(&mut engine, 1);

        for round in 1..=8u32 {
            let outcome = replay_round(&mut engine, &mut state);
            if round < 8 {
                assert_eq!(outcome, PressOutcome::RoundAdvanced);
                assert_eq!(state.round, round + 1);
            } else {
                assert_eq!(outcome, PressOutcome::Won);
            }
        }

        assert_eq!(state.phase, GamePhase::GameOver);
        assert_eq!(state.outcome, Some(GameOutcome::Won { rounds: 8 }));
        assert!(state
            .event_log
            .iter()
            .any(|event| matches!(event, GameEvent::GameWon { rounds: 8 })));
    }

    #[test]
    fn restart_after_game_over_resets_everything() {
        let mut engine = RoundEngine::with_seed(29);
        let mut state = started_state(&mut engine, 1);
        engine
            .begin_computer_turn(&mut state)
            .expect("reveal should succeed");
        let _ = engine.turn_ready(&mut state);
        let wrong = if state.target_sequence[0] == Pad::Yellow {
            Pad::Green
        } else {
            Pad::Yellow
        };
        let _ = engine.submit_press(&mut state, wrong);
        assert_eq!(state.phase, GamePhase::GameOver);

        engine
            .start_game(&mut state, 3)
            .expect("restart from GameOver should succeed");
        assert_eq!(state.round, 1);
        assert_eq!(state.max_rounds, 20);
        assert!(state.target_sequence.is_empty());
        assert!(state.player_sequence.is_empty());
        assert!(state.outcome.is_none());
        assert_eq!(
            state.event_log,
            vec![GameEvent::GameStarted {
                level: 3,
                max_rounds: 20
            }]
        );
    }

    #[test]
    fn seeded_engines_reproduce_the_same_sequence() {
        let mut first = RoundEngine::with_seed(42);
        let mut second = RoundEngine::with_seed(42);
        let mut state_a = started_state(&mut first, 2);
        let mut state_b = started_state(&mut second, 2);

        for _ in 0..4 {
            replay_round(&mut first, &mut state_a);
            replay_round(&mut second, &mut state_b);
        }
        assert_eq!(state_a.target_sequence, state_b.target_sequence);
    }

    #[test]
    fn reveal_plan_covers_the_whole_target() {
        let mut engine = RoundEngine::with_seed(13);
        let mut state = started_state(&mut engine, 1);
        replay_round(&mut engine, &mut state);
        engine
            .begin_computer_turn(&mut state)
            .expect("reveal should succeed");

        let plan = RevealPlan::for_sequence(&state.target_sequence);
        assert_eq!(plan.cues.len(), state.target_sequence.len());
        assert!(plan.input_open_ms > plan.cues.last().expect("cues exist").delay_ms);
    }

    #[test]
    fn resolution_backfills_terminal_event() {
        let mut state = GameState::sample();
        state.phase = GamePhase::GameOver;
        state.outcome = Some(GameOutcome::Won { rounds: 8 });
        let resolution = RuleResolution::new(state, Vec::new());
        assert_eq!(resolution.events, vec![GameEvent::GameWon { rounds: 8 }]);
    }
}
