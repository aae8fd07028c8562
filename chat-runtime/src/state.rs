//! # State 模块
//!
//! 定义播放状态机的阶段模型、等待模型和可序列化状态。
//!
//! ## 设计原则
//!
//! - 所有状态必须**显式建模**（挂起 = 显式阶段 + 待办值，而非回调链）
//! - 所有状态必须**可序列化**（支持存档/读档）
//! - 不允许隐式全局状态

use serde::{Deserialize, Serialize};

use crate::message::{ChannelId, DataRequest, MessageIntent, StepIndex};
use crate::script::ChoiceOption;

/// 等待原因
///
/// Runtime 在执行过程中可能进入等待状态，需要特定输入才能继续。
/// Host 根据此状态决定如何采集输入。
///
/// # 状态转换
///
/// ```text
/// None         -> 继续执行，不等待
/// Timer        -> Host 等待指定时长后回 tick(TimerElapsed)
/// Choice       -> 等待玩家选择，收到 SelectChoice 输入后继续
/// ExternalData -> Host 完成数据请求后回 tick(DataResolved / DataFailed)
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Waiting {
    /// 不等待，继续执行
    None,

    /// 等待人工延迟到期
    ///
    /// Runtime 不需要知道真实时间流逝，计时完全由 Host 负责。
    Timer {
        /// 延迟所属频道（打字指示正显示在这里）
        channel: ChannelId,
        /// 时长（毫秒）
        duration_ms: u64,
    },

    /// 等待玩家选择
    ///
    /// `choice_count` 记录选项数量，用于验证输入合法性
    Choice { choice_count: usize },

    /// 等待外部数据
    ///
    /// `timeout_ms` 是 Host 裁剪等待的上限：超过即以
    /// `DataFailed` 回报，步骤降级为可见错误消息而不是挂死。
    ExternalData {
        request: DataRequest,
        timeout_ms: u64,
    },
}

impl Waiting {
    /// 是否处于等待状态
    pub fn is_waiting(&self) -> bool {
        !matches!(self, Self::None)
    }

    /// 创建延迟等待
    pub fn timer(channel: impl Into<ChannelId>, duration_ms: u64) -> Self {
        Self::Timer {
            channel: channel.into(),
            duration_ms,
        }
    }

    /// 创建选择等待
    pub fn choice(count: usize) -> Self {
        Self::Choice {
            choice_count: count,
        }
    }

    /// 创建外部数据等待
    pub fn external_data(request: DataRequest, timeout_ms: u64) -> Self {
        Self::ExternalData {
            request,
            timeout_ms,
        }
    }
}

impl Default for Waiting {
    fn default() -> Self {
        Self::None
    }
}

/// 播放状态机阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackPhase {
    /// 空闲（未开始，或当前分支没有更多内容——非全局终止）
    Idle,
    /// 正在拉取并路由脚本步骤
    Advancing,
    /// 人工延迟或外部数据挂起中
    SuspendedDelay,
    /// 等待玩家选择
    AwaitingChoice,
    /// 回放某频道的延迟队列
    Replaying,
}

/// 未决的选择集
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingChoices {
    /// 浮出选择集的步骤索引（选择回显消息沿用它作幂等键）
    pub step: StepIndex,
    /// 选项列表
    pub options: Vec<ChoiceOption>,
}

/// 播放游标
///
/// 仅由播放状态机持有；`last_step` 与频道、内容指纹一起
/// 构成跨重载的幂等键。
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlaybackCursor {
    /// 下一个步骤的索引（已处理 0..last_step）
    pub last_step: StepIndex,
    /// 未决的选择集（等待玩家输入期间保留，供重新上屏）
    pub pending_choices: Option<PendingChoices>,
}

impl PlaybackCursor {
    /// 分配下一个步骤索引
    pub fn next_step(&mut self) -> StepIndex {
        let index = self.last_step;
        self.last_step += 1;
        index
    }
}

/// 在途投递
///
/// 延迟挂起期间"正在打字"的那条消息。前台切换不取消它：
/// 到期后落入**原频道**（此时可能已在后台），绝不丢失。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingDelivery {
    /// 目标频道（路由已完成）
    pub channel: ChannelId,
    /// 待落地的意图
    pub intent: MessageIntent,
    /// 生效延迟（毫秒），读档后据此重建等待状态
    pub delay_ms: u64,
    /// 是否来自延迟队列回放（落地时弹出队首并递减未读）
    pub from_replay: bool,
}

/// Runtime 状态
///
/// 播放状态机的**唯一编排状态**（频道内容与延迟状态各自建模）。
/// 所有字段都可序列化，支持存档/读档。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeState {
    /// 当前阶段
    pub phase: PlaybackPhase,
    /// 播放游标
    pub cursor: PlaybackCursor,
    /// 逻辑时钟（每次落地递增；频道内 sent_at 非递减由此保证）
    pub clock: u64,
    /// 在途投递（SuspendedDelay 阶段使用）
    pub pending: Option<PendingDelivery>,
    /// 等待外部数据的意图（SuspendedDelay 阶段使用）
    pub pending_fetch: Option<MessageIntent>,
    /// 回放结束后要恢复的阶段
    pub resume_phase: Option<PlaybackPhase>,
}

impl RuntimeState {
    /// 创建初始状态
    pub fn new() -> Self {
        Self {
            phase: PlaybackPhase::Idle,
            cursor: PlaybackCursor::default(),
            clock: 0,
            pending: None,
            pending_fetch: None,
            resume_phase: None,
        }
    }

    /// 推进逻辑时钟，返回新时刻
    pub fn tick_clock(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
}

impl Default for RuntimeState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_waiting_predicates() {
        assert!(!Waiting::None.is_waiting());
        assert!(Waiting::timer("main", 800).is_waiting());
        assert!(Waiting::choice(3).is_waiting());
        assert!(
            Waiting::external_data(
                DataRequest {
                    source: "weather".to_string(),
                    query: "today".to_string(),
                    params: Vec::new(),
                },
                5000,
            )
            .is_waiting()
        );
    }

    #[test]
    fn test_cursor_step_allocation() {
        let mut cursor = PlaybackCursor::default();
        assert_eq!(cursor.next_step(), 0);
        assert_eq!(cursor.next_step(), 1);
        assert_eq!(cursor.last_step, 2);
    }

    #[test]
    fn test_clock_monotonic() {
        let mut state = RuntimeState::new();
        let a = state.tick_clock();
        let b = state.tick_clock();
        assert!(b > a);
    }

    #[test]
    fn test_state_serialization() {
        let mut state = RuntimeState::new();
        state.phase = PlaybackPhase::SuspendedDelay;
        state.pending = Some(PendingDelivery {
            channel: "main".to_string(),
            intent: MessageIntent::new(4),
            delay_ms: 800,
            from_replay: false,
        });
        state.tick_clock();

        let json = serde_json::to_string(&state).unwrap();
        let deserialized: RuntimeState = serde_json::from_str(&json).unwrap();
        assert_eq!(state, deserialized);
    }
}
