use serde::{Deserialize, Serialize};

use super::state::Pad;

/// 相邻两次揭示之间的间隔。
pub const REVEAL_STEP_MS: u32 = 1000;
/// 单个面板亮起的持续时间。
pub const PAD_ACTIVE_MS: u32 = 500;
/// 最后一次揭示结束到玩家回合开始的间隔。
pub const TURN_HANDOFF_MS: u32 = 1000;
/// 回合完成到下一轮揭示开始的间隔。
pub const ROUND_BREAK_MS: u32 = 1000;

/// 单次亮灯/提示音的调度信息。延迟从玩家回合交出的时刻起算。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RevealCue {
    pub pad: Pad,
    pub delay_ms: u32,
    pub hold_ms: u32,
}

/// 一整轮揭示的时间表。引擎只负责计算，不持有任何定时器；
/// 由外部调度器按表触发 `reveal`，并在 `input_open_ms` 后调用 `turn_ready`。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RevealPlan {
    pub cues: Vec<RevealCue>,
    pub input_open_ms: u32,
}

impl RevealPlan {
    /// 第 i 个提示在 (i + 1) * REVEAL_STEP_MS 触发，保证严格递增、互不重叠。
    pub fn for_sequence(sequence: &[Pad]) -> Self {
        let cues = sequence
            .iter()
            .enumerate()
            .map(|(index, &pad)| RevealCue {
                pad,
                delay_ms: (index as u32 + 1) * REVEAL_STEP_MS,
                hold_ms: PAD_ACTIVE_MS,
            })
            .collect();
        let input_open_ms = sequence.len() as u32 * REVEAL_STEP_MS + TURN_HANDOFF_MS;
        Self {
            cues,
            input_open_ms,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cues.is_empty()
    }
}
