//! # Message 模块
//!
//! 定义消息的两种形态：
//!
//! - [`MessageIntent`]：Tag 解释器产出的**瞬态**投递意图，
//!   在一次路由转换内创建并消耗，不持久化。
//! - [`Message`]：落入频道历史的**持久**记录，追加为主，
//!   仅 `receipt` 字段允许后续变更。
//!
//! ## 设计原则
//!
//! - 频道内不变量：`id` 顺序 == 到达顺序 == `sent_at` 非递减
//! - 指纹必须跨进程稳定（与从磁盘恢复的历史比较），
//!   因此使用 `FxHasher` 而非随机化的 `DefaultHasher`

use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// 频道标识符
pub type ChannelId = String;

/// 步骤索引（脚本引擎输出序列中的位置，单调递增）
pub type StepIndex = u64;

/// 消息种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    /// 普通文本
    Text,
    /// 图片（payload 为路径）
    Image,
    /// 音频（payload 为路径）
    Audio,
    /// 视频（payload 为路径）
    Video,
    /// 系统消息（错误提示、降级内容等）
    System,
    /// 玩家发出的消息（选择回显）
    Outgoing,
}

impl MessageKind {
    /// 指纹用的稳定判别值
    ///
    /// 不依赖枚举内存布局，新增变体追加在末尾即可保持兼容。
    fn discriminant(self) -> u8 {
        match self {
            MessageKind::Text => 0,
            MessageKind::Image => 1,
            MessageKind::Audio => 2,
            MessageKind::Video => 3,
            MessageKind::System => 4,
            MessageKind::Outgoing => 5,
        }
    }
}

/// 回执状态
///
/// 生命周期：`Sent`（玩家侧发出）/ `Delivered`（落入后台频道）
/// → `Read`（频道前台时落地，或频道被打开时批量转换）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReceiptState {
    /// 已发出
    Sent,
    /// 已送达（尚未被查看）
    Delivered,
    /// 已读
    Read,
}

/// 外部数据请求
///
/// 脚本步骤可以要求在投递前取回一份外部数据；
/// Runtime 以挂起状态暴露给 Host，由 Host 的采集器完成请求。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataRequest {
    /// 数据源标识
    pub source: String,
    /// 查询内容
    pub query: String,
    /// 附加参数（透传，Runtime 不解释）
    pub params: Vec<(String, String)>,
}

/// 消息投递意图
///
/// 一个 Text 步骤经 Tag 解释后的结构化产物。
/// 由路由器在单次转换内消耗；落入延迟队列时随队列一同持久化。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageIntent {
    /// 显式指定的目标频道（`channel:` 标注）
    pub explicit_target: Option<ChannelId>,
    /// 说话者
    pub speaker: Option<String>,
    /// 消息种类
    pub kind: MessageKind,
    /// 内容（文本或媒体路径）
    pub payload: String,
    /// 展示用时间提示（`time:` / `date:` 标注，Runtime 不解释）
    pub timestamp_hint: Option<String>,
    /// 本条消息请求的人工延迟（毫秒）
    pub requested_delay_ms: Option<u64>,
    /// 跳过延迟投递，即使目标频道在后台也直接落地
    pub skip_deferral: bool,
    /// 投递前清空目标频道历史
    pub clear_history: bool,
    /// 脚本驱动的前台切换目标
    pub view_switch: Option<ChannelId>,
    /// 在场状态更新
    pub presence: Option<crate::channel::Presence>,
    /// 投递前需要完成的外部数据请求
    pub fetch: Option<DataRequest>,
    /// 未识别标注的透传（key, value）
    pub extra: Vec<(String, String)>,
    /// 产生本意图的步骤索引
    pub source_step: StepIndex,
}

impl MessageIntent {
    /// 创建空意图（所有字段取默认值）
    pub fn new(source_step: StepIndex) -> Self {
        Self {
            explicit_target: None,
            speaker: None,
            kind: MessageKind::Text,
            payload: String::new(),
            timestamp_hint: None,
            requested_delay_ms: None,
            skip_deferral: false,
            clear_history: false,
            view_switch: None,
            presence: None,
            fetch: None,
            extra: Vec::new(),
            source_step,
        }
    }

    /// 是否有可展示内容
    ///
    /// 纯状态标记（仅有 presence / clear / view 等指令，无内容）
    /// 不产生消息，也不触发通知。
    pub fn is_displayable(&self) -> bool {
        !self.payload.is_empty()
    }

    /// 计算内容指纹（跨进程稳定）
    pub fn fingerprint(&self) -> u64 {
        fingerprint(self.kind, &self.payload)
    }
}

/// 消息记录
///
/// 频道历史中的一个条目。创建后除 `receipt` 外不再变更，
/// 仅显式 `clear` 指令可整体删除。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// 频道内单调递增的消息 ID
    pub id: u64,
    /// 所属频道
    pub channel: ChannelId,
    /// 消息种类
    pub kind: MessageKind,
    /// 内容
    pub payload: String,
    /// 说话者
    pub speaker: Option<String>,
    /// 展示用时间提示
    pub timestamp_hint: Option<String>,
    /// 逻辑时刻（运行时逻辑时钟，频道内非递减）
    pub sent_at: u64,
    /// 回执状态
    pub receipt: ReceiptState,
    /// 幂等键的一半：产生本消息的步骤索引
    pub source_step: StepIndex,
}

impl Message {
    /// 计算内容指纹（与 [`MessageIntent::fingerprint`] 同一算法）
    pub fn fingerprint(&self) -> u64 {
        fingerprint(self.kind, &self.payload)
    }
}

/// 指纹算法：FxHash(kind 判别值, payload)
pub(crate) fn fingerprint(kind: MessageKind, payload: &str) -> u64 {
    let mut hasher = FxHasher::default();
    kind.discriminant().hash(&mut hasher);
    payload.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intent_default_fields() {
        let intent = MessageIntent::new(7);
        assert_eq!(intent.source_step, 7);
        assert_eq!(intent.kind, MessageKind::Text);
        assert!(!intent.is_displayable());
        assert!(intent.explicit_target.is_none());
    }

    #[test]
    fn test_fingerprint_stability() {
        // 同内容同指纹，跨实例一致
        let mut a = MessageIntent::new(1);
        a.payload = "你好".to_string();
        let mut b = MessageIntent::new(99);
        b.payload = "你好".to_string();
        assert_eq!(a.fingerprint(), b.fingerprint());

        // 种类参与指纹
        b.kind = MessageKind::Image;
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_message_intent_fingerprint_match() {
        let mut intent = MessageIntent::new(3);
        intent.payload = "内容".to_string();

        let message = Message {
            id: 1,
            channel: "main".to_string(),
            kind: MessageKind::Text,
            payload: "内容".to_string(),
            speaker: None,
            timestamp_hint: None,
            sent_at: 0,
            receipt: ReceiptState::Read,
            source_step: 3,
        };

        assert_eq!(intent.fingerprint(), message.fingerprint());
    }

    #[test]
    fn test_message_serialization() {
        let message = Message {
            id: 2,
            channel: "group".to_string(),
            kind: MessageKind::Image,
            payload: "photos/cat.png".to_string(),
            speaker: Some("小雨".to_string()),
            timestamp_hint: Some("22:15".to_string()),
            sent_at: 41,
            receipt: ReceiptState::Delivered,
            source_step: 12,
        };

        let json = serde_json::to_string(&message).unwrap();
        let deserialized: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(message, deserialized);
    }
}
