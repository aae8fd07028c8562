//! # Config 模块
//!
//! 频道枚举定义与运行时设置。
//!
//! ## 设计说明
//!
//! 配置是外部表面：由宿主从文件或内置数据反序列化后传入，
//! Runtime 只消费不修改。频道在配置加载时创建，会话期间常驻。

use serde::{Deserialize, Serialize};

use crate::message::ChannelId;

/// 频道类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelKind {
    /// 单人对话
    Direct,
    /// 群聊
    Group,
    /// 系统频道（降级消息、错误提示的兜底去处）
    System,
}

/// 频道定义
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelDef {
    /// 频道标识
    pub id: ChannelId,
    /// 显示名称
    pub display_name: String,
    /// 频道类型
    pub kind: ChannelKind,

    /// 历史上限（0 = 不限；超限时移除最早的消息，不影响 ID 单调性）
    #[serde(default)]
    pub max_history: usize,
}

impl ChannelDef {
    /// 创建频道定义
    pub fn new(id: impl Into<ChannelId>, display_name: impl Into<String>, kind: ChannelKind) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            kind,
            max_history: 0,
        }
    }

    /// 设置历史上限
    pub fn with_max_history(mut self, max: usize) -> Self {
        self.max_history = max;
        self
    }
}

/// 运行时配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// 频道列表（第一个为初始前台频道）
    pub channels: Vec<ChannelDef>,

    /// 兜底系统频道 ID
    ///
    /// 未知频道、脚本故障消息的去处。若不在 `channels` 中，
    /// Runtime 构造时会自动补建一个 [`ChannelKind::System`] 频道。
    #[serde(default = "default_fallback")]
    pub fallback_channel: ChannelId,

    /// 减少动效：所有人工延迟压为 0，不发打字指示
    #[serde(default)]
    pub reduced_motion: bool,

    /// 回放延迟队列时的默认延迟（毫秒），意图未显式指定时使用
    #[serde(default = "default_replay_delay_ms")]
    pub replay_delay_ms: u64,

    /// 外部数据请求的超时上限（毫秒），Host 据此裁剪等待
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
}

fn default_fallback() -> ChannelId {
    "system".to_string()
}

fn default_replay_delay_ms() -> u64 {
    600
}

fn default_fetch_timeout_ms() -> u64 {
    5000
}

impl RuntimeConfig {
    /// 创建配置（其余字段取默认值）
    pub fn new(channels: Vec<ChannelDef>) -> Self {
        Self {
            channels,
            fallback_channel: default_fallback(),
            reduced_motion: false,
            replay_delay_ms: default_replay_delay_ms(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
        }
    }

    /// 设置兜底频道
    pub fn with_fallback(mut self, id: impl Into<ChannelId>) -> Self {
        self.fallback_channel = id.into();
        self
    }

    /// 开启减少动效
    pub fn with_reduced_motion(mut self, on: bool) -> Self {
        self.reduced_motion = on;
        self
    }

    /// 设置回放默认延迟
    pub fn with_replay_delay(mut self, ms: u64) -> Self {
        self.replay_delay_ms = ms;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_from_json() {
        let json = r#"{
            "channels": [
                { "id": "main", "display_name": "主线", "kind": "Direct" }
            ]
        }"#;
        let config: RuntimeConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.channels[0].max_history, 0);
        assert_eq!(config.fallback_channel, "system");
        assert!(!config.reduced_motion);
        assert_eq!(config.replay_delay_ms, 600);
        assert_eq!(config.fetch_timeout_ms, 5000);
    }

    #[test]
    fn test_config_builders() {
        let config = RuntimeConfig::new(vec![ChannelDef::new("a", "A", ChannelKind::Direct)])
            .with_fallback("debug")
            .with_reduced_motion(true)
            .with_replay_delay(0);
        assert_eq!(config.fallback_channel, "debug");
        assert!(config.reduced_motion);
        assert_eq!(config.replay_delay_ms, 0);
    }
}
