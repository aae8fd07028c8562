//! # Event 模块
//!
//! 定义 Runtime 向 Host 发出的事件。
//! 事件是 Runtime 与 UI 层之间的**唯一通信方式**。
//!
//! ## 设计原则
//!
//! - **声明式**：事件描述"发生了什么"，不描述"怎么呈现"
//! - **无副作用**：事件本身不执行任何操作
//! - **引擎无关**：不包含任何 UI 框架的类型

use serde::{Deserialize, Serialize};

use crate::channel::Presence;
use crate::message::{ChannelId, Message, ReceiptState};
use crate::script::ChoiceOption;

/// Runtime 向 Host 发出的事件
///
/// Host 订阅事件流并转换为实际的界面更新、提示音等操作。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RuntimeEvent {
    /// 一条消息落入了某频道的历史
    MessageDelivered {
        /// 落地的完整消息记录
        message: Message,
    },

    /// 某条消息在不可见处被缓存，提醒玩家
    NotificationRaised {
        /// 缓存消息的频道
        channel: ChannelId,
        /// 预览文本（媒体消息为路径）
        preview: String,
    },

    /// 打字指示开始
    TypingStart {
        /// 指示所在频道
        channel: ChannelId,
        /// 此刻"正在输入"的说话者
        speaker: Option<String>,
    },

    /// 打字指示结束
    TypingEnd {
        /// 指示所在频道
        channel: ChannelId,
    },

    /// 出现选择分支，等待玩家选择
    ChoicesAvailable {
        /// 选项列表
        options: Vec<ChoiceOption>,
    },

    /// 某条消息的回执状态变化
    ReceiptChanged {
        channel: ChannelId,
        message_id: u64,
        receipt: ReceiptState,
    },

    /// 频道在场状态变化
    PresenceChanged {
        channel: ChannelId,
        presence: Presence,
    },

    /// 频道历史被清空（`clear` 指令）
    HistoryCleared { channel: ChannelId },

    /// 前台频道切换（玩家或脚本驱动）
    ForegroundChanged { channel: ChannelId },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = RuntimeEvent::NotificationRaised {
            channel: "group".to_string(),
            preview: "新消息".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        let deserialized: RuntimeEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, deserialized);
    }

    #[test]
    fn test_typing_events_carry_channel() {
        let start = RuntimeEvent::TypingStart {
            channel: "main".to_string(),
            speaker: Some("小雨".to_string()),
        };
        let end = RuntimeEvent::TypingEnd {
            channel: "main".to_string(),
        };
        assert!(matches!(start, RuntimeEvent::TypingStart { ref channel, .. } if channel == "main"));
        assert!(matches!(end, RuntimeEvent::TypingEnd { ref channel } if channel == "main"));
    }
}
