use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

/// 关卡到最大回合数的映射表。
static LEVEL_TABLE: Lazy<HashMap<u8, u32>> = Lazy::new(|| {
    let mut table = HashMap::new();
    table.insert(1, 8);
    table.insert(2, 14);
    table.insert(3, 20);
    table.insert(4, 31);
    table
});

pub fn max_rounds_for_level(level: u8) -> Option<u32> {
    LEVEL_TABLE.get(&level).copied()
}

pub fn known_levels() -> Vec<u8> {
    let mut levels: Vec<u8> = LEVEL_TABLE.keys().copied().collect();
    levels.sort_unstable();
    levels
}

/// 四个彩色面板之一。面板目录在编译期固定，游戏中不会增减。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Pad {
    Red,
    Green,
    Blue,
    Yellow,
}

impl Pad {
    pub const ALL: [Pad; 4] = [Pad::Red, Pad::Green, Pad::Blue, Pad::Yellow];

    pub fn color(self) -> &'static str {
        match self {
            Pad::Red => "red",
            Pad::Green => "green",
            Pad::Blue => "blue",
            Pad::Yellow => "yellow",
        }
    }
}

impl FromStr for Pad {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "red" => Ok(Pad::Red),
            "green" => Ok(Pad::Green),
            "blue" => Ok(Pad::Blue),
            "yellow" => Ok(Pad::Yellow),
            _ => Err(()),
        }
    }
}

/// 游戏阶段。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum GamePhase {
    Idle,
    ComputerTurn,
    PlayerTurn,
    GameOver,
}

impl Default for GamePhase {
    fn default() -> Self {
        Self::Idle
    }
}

/// 单局结束的结果。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum GameOutcome {
    Won {
        rounds: u32,
    },
    Lost {
        position: usize,
        expected: Pad,
        actual: Pad,
    },
}

/// 游戏事件流。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum GameEvent {
    GameStarted {
        level: u8,
        max_rounds: u32,
    },
    RoundStarted {
        round: u32,
        sequence_len: usize,
    },
    SequenceExtended {
        pad: Pad,
    },
    InputPhaseEntered {
        presses_expected: usize,
    },
    PressAccepted {
        pad: Pad,
        position: usize,
        remaining: usize,
    },
    RoundCompleted {
        round: u32,
    },
    GameWon {
        rounds: u32,
    },
    GameLost {
        position: usize,
        expected: Pad,
        actual: Pad,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum IntegrityError {
    PlayerSequenceOverrun {
        player_len: usize,
        target_len: usize,
    },
    TargetSequenceOverrun {
        target_len: usize,
        round: u32,
    },
    RoundOutOfRange {
        round: u32,
        max_rounds: u32,
    },
    MissingLevel,
}

/// 游戏整体状态。目标序列与玩家序列都由引擎独占持有。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameState {
    pub level: u8,
    pub max_rounds: u32,
    pub round: u32,
    pub phase: GamePhase,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub target_sequence: Vec<Pad>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub player_sequence: Vec<Pad>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub event_log: Vec<GameEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<GameOutcome>,
}

impl GameState {
    pub fn new() -> Self {
        Self {
            level: 0,
            max_rounds: 0,
            round: 0,
            phase: GamePhase::Idle,
            target_sequence: Vec::new(),
            player_sequence: Vec::new(),
            event_log: Vec::new(),
            outcome: None,
        }
    }

    pub fn record_event(&mut self, event: GameEvent) {
        self.event_log.push(event);
    }

    pub fn is_finished(&self) -> bool {
        self.phase == GamePhase::GameOver
    }

    pub fn presses_remaining(&self) -> usize {
        self.target_sequence
            .len()
            .saturating_sub(self.player_sequence.len())
    }

    /// 本回合的揭示是否已经生成（目标序列长度追上了回合数）。
    pub fn reveal_queued(&self) -> bool {
        self.target_sequence.len() as u32 >= self.round
    }

    pub fn integrity_check(&self) -> Result<(), IntegrityError> {
        if self.phase == GamePhase::Idle {
            return Ok(());
        }

        if self.max_rounds == 0 {
            return Err(IntegrityError::MissingLevel);
        }
        if self.round > self.max_rounds {
            return Err(IntegrityError::RoundOutOfRange {
                round: self.round,
                max_rounds: self.max_rounds,
            });
        }
        if self.target_sequence.len() as u32 > self.round {
            return Err(IntegrityError::TargetSequenceOverrun {
                target_len: self.target_sequence.len(),
                round: self.round,
            });
        }
        if self.player_sequence.len() > self.target_sequence.len() {
            return Err(IntegrityError::PlayerSequenceOverrun {
                player_len: self.player_sequence.len(),
                target_len: self.target_sequence.len(),
            });
        }

        Ok(())
    }

    /// 返回一个进行中的示例状态，方便前端调试。
    pub fn sample() -> Self {
        let mut state = GameState::new();
        state.level = 1;
        state.max_rounds = 8;
        state.round = 2;
        state.phase = GamePhase::PlayerTurn;
        state.target_sequence = vec![Pad::Red, Pad::Blue];
        state.player_sequence = vec![Pad::Red];
        state.record_event(GameEvent::GameStarted {
            level: 1,
            max_rounds: 8,
        });
        state.record_event(GameEvent::RoundStarted {
            round: 2,
            sequence_len: 2,
        });
        state.record_event(GameEvent::PressAccepted {
            pad: Pad::Red,
            position: 0,
            remaining: 1,
        });
        state
    }
}

impl Default for GameState {
    fn default() -> Self {
        Self::new()
    }
}
