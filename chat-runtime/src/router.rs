//! # Router 模块
//!
//! 频道路由器：对每个定稿的投递意图做四件事——
//! 解析目标频道、幂等去重、可见性裁决、清史指令。
//!
//! ## 职责
//!
//! - 目标解析：显式 `channel:` 标注 > 章节默认频道 > 当前前台频道
//! - 未知频道**绝不静默丢弃**：改道到兜底系统频道并附错误元数据
//! - 幂等键 = (步骤索引, 目标频道, 内容指纹)；命中即丢弃
//!   （断点重放的预期行为，不是错误）
//! - 前台或 `immediate` 直接投递（附生效延迟）；否则入延迟队列

use tracing::{debug, warn};

use crate::channel::Channels;
use crate::config::RuntimeConfig;
use crate::delay::Delays;
use crate::message::{ChannelId, MessageIntent};

/// 路由结果
///
/// 发生改道时原目标记录在意图的 `extra` 元数据里并写入日志，
/// 不单独携带。
#[derive(Debug, Clone, PartialEq)]
pub struct Routed {
    /// 解析出的目标频道
    pub channel: ChannelId,
    /// 本次路由是否清空了目标频道历史
    pub cleared: bool,
    /// 裁决
    pub decision: Decision,
}

/// 可见性裁决
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// 直接投递：目标在前台，或意图标记了 `immediate`
    Deliver {
        /// 定稿意图（含改道附加的错误元数据）
        intent: MessageIntent,
        /// 生效延迟（毫秒）：意图自带请求优先，否则消费频道的 DelayToken
        delay_ms: u64,
    },

    /// 已入目标频道的延迟队列，应发通知
    Deferred {
        /// 通知预览文本
        preview: String,
    },

    /// 幂等键重复，已丢弃
    Duplicate,

    /// 纯状态标记，无可展示内容（presence / 延迟请求等已生效）
    Marker,
}

/// 频道路由器
pub struct Router {
    /// 兜底系统频道
    fallback: ChannelId,
    /// 减少动效：生效延迟一律为 0
    reduced_motion: bool,
}

impl Router {
    /// 从配置创建
    pub fn new(config: &RuntimeConfig) -> Self {
        Self {
            fallback: config.fallback_channel.clone(),
            reduced_motion: config.reduced_motion,
        }
    }

    /// 路由一个定稿意图
    ///
    /// # 参数
    ///
    /// - `section_channel`: 产生本步骤的章节默认频道
    ///
    /// 对频道与延迟状态的变更（清史、入队、消费 DelayToken）
    /// 在这里完成；消息落地与事件发出由状态机负责。
    pub fn route(
        &self,
        mut intent: MessageIntent,
        section_channel: Option<&str>,
        channels: &mut Channels,
        delays: &mut Delays,
    ) -> Routed {
        // 1. 目标解析：显式标注 > 章节默认 > 前台
        let requested = intent
            .explicit_target
            .clone()
            .or_else(|| section_channel.map(|s| s.to_string()))
            .unwrap_or_else(|| channels.foreground_id().clone());

        let channel = if channels.contains(&requested) {
            requested
        } else {
            warn!(target = %requested, fallback = %self.fallback, "未知频道，改道到兜底频道");
            intent
                .extra
                .push(("error".to_string(), format!("unknown-channel:{requested}")));
            intent.kind = crate::message::MessageKind::System;
            if channels.contains(&self.fallback) {
                self.fallback.clone()
            } else {
                // 兜底频道未配置时退回前台，仍不丢消息
                channels.foreground_id().clone()
            }
        };

        // 2. 清史指令：原子清空后再继续
        let mut cleared = false;
        if intent.clear_history {
            if let Some(target) = channels.get_mut(&channel) {
                target.clear_history();
                cleared = true;
            }
        }

        // 3. 纯状态标记：不产生消息，但捕获延迟请求
        if !intent.is_displayable() {
            if let Some(ms) = intent.requested_delay_ms {
                delays.request(&channel, ms);
            }
            return Routed {
                channel,
                cleared,
                decision: Decision::Marker,
            };
        }

        // 4. 幂等去重：断点重放不会二次投递
        let fingerprint = intent.fingerprint();
        if let Some(target) = channels.get(&channel) {
            if target.has_seen(intent.source_step, fingerprint) {
                debug!(
                    channel = %channel,
                    step = intent.source_step,
                    "幂等键重复，丢弃"
                );
                return Routed {
                    channel,
                    cleared,
                    decision: Decision::Duplicate,
                };
            }
        }

        // 5. 可见性裁决
        let foreground = channels.foreground_id() == &channel;
        if foreground || intent.skip_deferral {
            // 意图自带的请求就是"最新一次请求"，未消费的旧 token 一并作废
            let token = delays.take(&channel);
            let delay_ms = if self.reduced_motion {
                0
            } else {
                intent.requested_delay_ms.or(token).unwrap_or(0)
            };
            Routed {
                channel,
                cleared,
                decision: Decision::Deliver { intent, delay_ms },
            }
        } else {
            let preview = intent.payload.clone();
            if let Some(target) = channels.get_mut(&channel) {
                target.defer(intent);
            }
            Routed {
                channel,
                cleared,
                decision: Decision::Deferred { preview },
            }
        }
    }
}
