//! # Channel 模块
//!
//! 定义会话频道的数据模型和频道仓库（arena）。
//!
//! ## 设计原则
//!
//! - 频道仓库是**单写者**结构：只有播放状态机可以变更，
//!   外部只能读取快照或通过输入队列提交意图
//! - 任意时刻恰好一个频道处于前台
//! - `unread_count` 与延迟队列长度始终相等

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::config::{ChannelDef, ChannelKind};
use crate::error::RuntimeError;
use crate::message::{ChannelId, Message, MessageIntent, ReceiptState, StepIndex};

/// 在场状态
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Presence {
    /// 未知（初始值）
    #[default]
    Unknown,
    /// 在线
    Online,
    /// 离线
    Offline,
    /// 离开
    Away,
    /// 自定义状态文本（`status:*` 标注）
    Custom(String),
}

impl Presence {
    /// 从标注值解析（不区分大小写；未识别的值作为自定义状态保留）
    pub fn parse(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "online" => Self::Online,
            "offline" => Self::Offline,
            "away" => Self::Away,
            other if other.is_empty() => Self::Unknown,
            _ => Self::Custom(value.to_string()),
        }
    }
}

/// 频道显示状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisplayState {
    /// 从未打开
    Closed,
    /// 打开过但当前不在前台
    Background,
    /// 当前显示给玩家
    Foreground,
}

/// 会话频道
///
/// 会话生命周期内常驻：配置加载时创建，teardown 时销毁。
/// 历史追加为主，仅 `clear` 指令可整体清空。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    /// 频道标识
    pub id: ChannelId,
    /// 显示名称
    pub display_name: String,
    /// 频道类型
    pub kind: ChannelKind,
    /// 显示状态
    pub display: DisplayState,
    /// 消息历史（id 顺序 == 到达顺序 == sent_at 非递减）
    pub history: Vec<Message>,
    /// 延迟队列（FIFO，后台期间生成的消息在此等待回放）
    pub deferred: VecDeque<MessageIntent>,
    /// 未读数（不变量：== deferred.len()）
    pub unread_count: usize,
    /// 在场状态
    pub presence: Presence,
    /// 历史上限（0 = 不限）
    #[serde(default)]
    max_history: usize,
    /// 下一个消息 ID（频道内单调）
    next_message_id: u64,
    /// 已投递幂等键缓存（从 history + deferred 重建，不序列化）
    #[serde(skip)]
    seen: FxHashSet<(StepIndex, u64)>,
}

impl Channel {
    /// 从频道定义创建
    pub fn from_def(def: &ChannelDef) -> Self {
        Self {
            id: def.id.clone(),
            display_name: def.display_name.clone(),
            kind: def.kind,
            display: DisplayState::Closed,
            history: Vec::new(),
            deferred: VecDeque::new(),
            unread_count: 0,
            presence: Presence::Unknown,
            max_history: def.max_history,
            next_message_id: 0,
            seen: FxHashSet::default(),
        }
    }

    /// 是否在前台
    pub fn is_foreground(&self) -> bool {
        self.display == DisplayState::Foreground
    }

    /// 幂等键是否已出现（历史或延迟队列中）
    pub fn has_seen(&self, source_step: StepIndex, fingerprint: u64) -> bool {
        self.seen.contains(&(source_step, fingerprint))
    }

    /// 将消息落入历史，分配频道内单调 ID
    ///
    /// # 参数
    ///
    /// - `sent_at`: 运行时逻辑时刻，调用方保证非递减
    pub fn commit(&mut self, intent: &MessageIntent, sent_at: u64, receipt: ReceiptState) -> Message {
        let message = Message {
            id: self.next_message_id,
            channel: self.id.clone(),
            kind: intent.kind,
            payload: intent.payload.clone(),
            speaker: intent.speaker.clone(),
            timestamp_hint: intent.timestamp_hint.clone(),
            sent_at,
            receipt,
            source_step: intent.source_step,
        };
        self.next_message_id += 1;
        self.seen.insert((intent.source_step, intent.fingerprint()));
        self.history.push(message.clone());

        // 超过上限时移除最早的消息（幂等键保留，裁掉的步骤不会重新投递）
        if self.max_history > 0 {
            while self.history.len() > self.max_history {
                self.history.remove(0);
            }
        }

        message
    }

    /// 将意图压入延迟队列（同步维护未读数与幂等键缓存）
    pub fn defer(&mut self, intent: MessageIntent) {
        self.seen.insert((intent.source_step, intent.fingerprint()));
        self.deferred.push_back(intent);
        self.unread_count = self.deferred.len();
    }

    /// 取出延迟队列队首（未读数在落地时一并递减）
    pub fn pop_deferred(&mut self) -> Option<MessageIntent> {
        let intent = self.deferred.pop_front();
        self.unread_count = self.deferred.len();
        intent
    }

    /// 原子清空历史（`clear` 指令）
    ///
    /// 幂等键缓存随之重建：清掉的消息允许重新投递。
    pub fn clear_history(&mut self) {
        self.history.clear();
        self.rebuild_seen();
    }

    /// 将所有已送达消息转为已读，返回发生变化的消息 ID
    pub fn mark_read(&mut self) -> Vec<u64> {
        let mut changed = Vec::new();
        for message in &mut self.history {
            if message.receipt == ReceiptState::Delivered {
                message.receipt = ReceiptState::Read;
                changed.push(message.id);
            }
        }
        changed
    }

    /// 从 history + deferred 重建幂等键缓存（读档后调用）
    pub fn rebuild_seen(&mut self) {
        self.seen.clear();
        for message in &self.history {
            self.seen.insert((message.source_step, message.fingerprint()));
        }
        for intent in &self.deferred {
            self.seen.insert((intent.source_step, intent.fingerprint()));
        }
    }
}

/// 频道只读快照
///
/// UI 层读取用；不含延迟队列内容（队列属于 Runtime 内部）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSnapshot {
    pub id: ChannelId,
    pub display_name: String,
    pub kind: ChannelKind,
    pub display: DisplayState,
    pub history: Vec<Message>,
    pub unread_count: usize,
    pub presence: Presence,
}

/// 频道仓库
///
/// 以 `Vec` 保存以保证序列化顺序稳定（频道数量很小，线性查找足够）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channels {
    channels: Vec<Channel>,
    /// 当前前台频道
    foreground: ChannelId,
}

impl Channels {
    /// 从频道定义列表创建
    ///
    /// 第一个定义成为初始前台频道。
    pub fn new(defs: &[ChannelDef]) -> Result<Self, RuntimeError> {
        if defs.is_empty() {
            return Err(RuntimeError::EmptyChannelConfig);
        }
        let mut channels: Vec<Channel> = defs.iter().map(Channel::from_def).collect();
        channels[0].display = DisplayState::Foreground;
        let foreground = channels[0].id.clone();
        Ok(Self {
            channels,
            foreground,
        })
    }

    /// 按 ID 查找
    pub fn get(&self, id: &str) -> Option<&Channel> {
        self.channels.iter().find(|c| c.id == id)
    }

    /// 按 ID 查找（可变）
    pub fn get_mut(&mut self, id: &str) -> Option<&mut Channel> {
        self.channels.iter_mut().find(|c| c.id == id)
    }

    /// 频道是否存在
    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// 当前前台频道 ID
    pub fn foreground_id(&self) -> &ChannelId {
        &self.foreground
    }

    /// 补建定义中有、仓库里还没有的频道
    ///
    /// 读档场景：存档之后配置可能新增了频道，补建为全新空频道，
    /// 已有频道（历史、队列、未读数）不受影响。
    pub fn merge_defs(&mut self, defs: &[ChannelDef]) {
        for def in defs {
            if !self.contains(&def.id) {
                self.channels.push(Channel::from_def(def));
            }
        }
    }

    /// 切换前台频道
    ///
    /// 原前台转入后台。目标不存在时返回 `false`，前台保持不变。
    pub fn set_foreground(&mut self, id: &str) -> bool {
        if !self.contains(id) {
            return false;
        }
        if self.foreground == id {
            return true;
        }
        let previous = self.foreground.clone();
        if let Some(channel) = self.get_mut(&previous) {
            channel.display = DisplayState::Background;
        }
        if let Some(channel) = self.get_mut(id) {
            channel.display = DisplayState::Foreground;
        }
        self.foreground = id.to_string();
        true
    }

    /// 全部频道
    pub fn iter(&self) -> impl Iterator<Item = &Channel> {
        self.channels.iter()
    }

    /// 生成只读快照
    pub fn snapshot(&self) -> Vec<ChannelSnapshot> {
        self.channels
            .iter()
            .map(|c| ChannelSnapshot {
                id: c.id.clone(),
                display_name: c.display_name.clone(),
                kind: c.kind,
                display: c.display,
                history: c.history.clone(),
                unread_count: c.unread_count,
                presence: c.presence.clone(),
            })
            .collect()
    }

    /// 读档后重建所有频道的幂等键缓存
    pub fn rebuild_seen(&mut self) {
        for channel in &mut self.channels {
            channel.rebuild_seen();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageIntent;

    fn defs() -> Vec<ChannelDef> {
        vec![
            ChannelDef::new("main", "主线", ChannelKind::Direct),
            ChannelDef::new("group", "班级群", ChannelKind::Group),
        ]
    }

    #[test]
    fn test_channels_creation() {
        let channels = Channels::new(&defs()).unwrap();
        assert_eq!(channels.foreground_id(), "main");
        assert!(channels.get("main").unwrap().is_foreground());
        assert_eq!(channels.get("group").unwrap().display, DisplayState::Closed);
    }

    #[test]
    fn test_empty_config_rejected() {
        assert_eq!(
            Channels::new(&[]).unwrap_err(),
            RuntimeError::EmptyChannelConfig
        );
    }

    #[test]
    fn test_foreground_switch() {
        let mut channels = Channels::new(&defs()).unwrap();
        assert!(channels.set_foreground("group"));
        assert_eq!(channels.foreground_id(), "group");
        // 原前台转入后台
        assert_eq!(
            channels.get("main").unwrap().display,
            DisplayState::Background
        );
        // 不存在的目标不改变前台
        assert!(!channels.set_foreground("nope"));
        assert_eq!(channels.foreground_id(), "group");
    }

    #[test]
    fn test_commit_assigns_monotonic_ids() {
        let mut channels = Channels::new(&defs()).unwrap();
        let channel = channels.get_mut("main").unwrap();

        let mut intent = MessageIntent::new(0);
        intent.payload = "一".to_string();
        channel.commit(&intent, 1, ReceiptState::Read);
        intent.source_step = 1;
        intent.payload = "二".to_string();
        channel.commit(&intent, 2, ReceiptState::Read);

        let ids: Vec<u64> = channel.history.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![0, 1]);
    }

    #[test]
    fn test_max_history_trims_oldest() {
        let def = ChannelDef::new("main", "主线", ChannelKind::Direct).with_max_history(3);
        let mut channel = Channel::from_def(&def);

        for step in 0..5u64 {
            let mut intent = MessageIntent::new(step);
            intent.payload = format!("第 {step} 条");
            channel.commit(&intent, step + 1, ReceiptState::Read);
        }

        assert_eq!(channel.history.len(), 3);
        // 保留最后 3 条，ID 仍然单调
        let ids: Vec<u64> = channel.history.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![2, 3, 4]);
        // 被裁掉的步骤幂等键仍在
        let mut probe = MessageIntent::new(0);
        probe.payload = "第 0 条".to_string();
        assert!(channel.has_seen(0, probe.fingerprint()));
    }

    #[test]
    fn test_unread_tracks_deferred_len() {
        let mut channels = Channels::new(&defs()).unwrap();
        let channel = channels.get_mut("group").unwrap();

        let mut intent = MessageIntent::new(0);
        intent.payload = "排队".to_string();
        channel.defer(intent.clone());
        intent.source_step = 1;
        channel.defer(intent);
        assert_eq!(channel.unread_count, 2);
        assert_eq!(channel.unread_count, channel.deferred.len());

        channel.pop_deferred();
        assert_eq!(channel.unread_count, 1);
        assert_eq!(channel.unread_count, channel.deferred.len());
    }

    #[test]
    fn test_seen_rebuild_after_deserialize() {
        let mut channels = Channels::new(&defs()).unwrap();
        let mut intent = MessageIntent::new(5);
        intent.payload = "重复".to_string();
        let fp = intent.fingerprint();
        channels
            .get_mut("main")
            .unwrap()
            .commit(&intent, 1, ReceiptState::Read);

        // seen 标记 #[serde(skip)]，反序列化后为空，需要重建
        let json = serde_json::to_string(&channels).unwrap();
        let mut loaded: Channels = serde_json::from_str(&json).unwrap();
        assert!(!loaded.get("main").unwrap().has_seen(5, fp));
        loaded.rebuild_seen();
        assert!(loaded.get("main").unwrap().has_seen(5, fp));
    }

    #[test]
    fn test_clear_history_allows_redelivery() {
        let mut channels = Channels::new(&defs()).unwrap();
        let channel = channels.get_mut("main").unwrap();
        let mut intent = MessageIntent::new(2);
        intent.payload = "内容".to_string();
        let fp = intent.fingerprint();
        channel.commit(&intent, 1, ReceiptState::Read);
        assert!(channel.has_seen(2, fp));

        channel.clear_history();
        assert!(channel.history.is_empty());
        assert!(!channel.has_seen(2, fp));
    }

    #[test]
    fn test_mark_read() {
        let mut channels = Channels::new(&defs()).unwrap();
        let channel = channels.get_mut("group").unwrap();
        let mut intent = MessageIntent::new(0);
        intent.payload = "后台消息".to_string();
        channel.commit(&intent, 1, ReceiptState::Delivered);

        let changed = channel.mark_read();
        assert_eq!(changed, vec![0]);
        assert_eq!(channel.history[0].receipt, ReceiptState::Read);
        // 已读消息不再重复上报
        assert!(channel.mark_read().is_empty());
    }
}
