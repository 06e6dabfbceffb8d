//! 游戏核心逻辑模块（回合状态机、按键校验、揭示时间表）。

pub mod reveal;
pub mod rules;
pub mod state;

pub use reveal::{
    RevealCue,
    RevealPlan,
    PAD_ACTIVE_MS,
    REVEAL_STEP_MS,
    ROUND_BREAK_MS,
    TURN_HANDOFF_MS,
};
pub use rules::{PressOutcome, RoundEngine, RuleError, RuleResolution};
pub use state::{
    known_levels,
    max_rounds_for_level,
    GameEvent,
    GameOutcome,
    GamePhase,
    GameState,
    IntegrityError,
    Pad,
};
