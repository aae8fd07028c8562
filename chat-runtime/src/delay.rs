//! # Delay 模块
//!
//! 延迟与打字模拟器。
//!
//! ## 设计说明
//!
//! - DelayToken：每频道的待消费延迟（毫秒）。同频道重复请求
//!   **后者覆盖前者**（last-request-wins），由该频道下一条落地的
//!   消息恰好消费一次
//! - 打字指示是每频道的布尔量：重复开启是幂等的（重启计时而非叠加），
//!   关闭只在显示中时生效——任意时刻不会双重显示，也不会泄漏
//! - 挂起本身不在这里发生：状态机把 [`crate::state::Waiting::Timer`]
//!   交给 Host，Host 睡眠后回 tick（参照宿主驱动的计时模型）

use serde::{Deserialize, Serialize};

use crate::message::ChannelId;

/// 延迟与打字状态
///
/// 以 `Vec` 保存以保证序列化顺序稳定（频道数量很小）。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Delays {
    /// 各频道的待消费延迟（毫秒）
    tokens: Vec<(ChannelId, u64)>,
    /// 正在显示打字指示的频道
    typing: Vec<ChannelId>,
}

impl Delays {
    /// 创建空状态
    pub fn new() -> Self {
        Self::default()
    }

    /// 请求延迟（last-request-wins：覆盖同频道的未消费请求）
    pub fn request(&mut self, channel: &str, ms: u64) {
        if let Some(entry) = self.tokens.iter_mut().find(|(id, _)| id == channel) {
            entry.1 = ms;
        } else {
            self.tokens.push((channel.to_string(), ms));
        }
    }

    /// 消费延迟（恰好一次：取走后该频道回到无请求状态）
    pub fn take(&mut self, channel: &str) -> Option<u64> {
        let index = self.tokens.iter().position(|(id, _)| id == channel)?;
        Some(self.tokens.remove(index).1)
    }

    /// 查看未消费的延迟（不消费）
    pub fn pending(&self, channel: &str) -> Option<u64> {
        self.tokens
            .iter()
            .find(|(id, _)| id == channel)
            .map(|(_, ms)| *ms)
    }

    /// 丢弃所有未消费的延迟
    ///
    /// 选择分支浮出时调用：延迟属于请求它的叙事节拍，
    /// 不跨越选择带到之后的消息上。
    pub fn clear_tokens(&mut self) {
        self.tokens.clear();
    }

    /// 开启打字指示
    ///
    /// # 返回
    ///
    /// `true` 表示指示从隐藏变为显示（应发出 TypingStart）；
    /// 已在显示中时返回 `false`（重启计时，不重复发事件）。
    pub fn begin_typing(&mut self, channel: &str) -> bool {
        if self.typing.iter().any(|id| id == channel) {
            return false;
        }
        self.typing.push(channel.to_string());
        true
    }

    /// 关闭打字指示
    ///
    /// # 返回
    ///
    /// `true` 表示指示从显示变为隐藏（应发出 TypingEnd）。
    pub fn end_typing(&mut self, channel: &str) -> bool {
        let Some(index) = self.typing.iter().position(|id| id == channel) else {
            return false;
        };
        self.typing.remove(index);
        true
    }

    /// 某频道是否正在显示打字指示
    pub fn is_typing(&self, channel: &str) -> bool {
        self.typing.iter().any(|id| id == channel)
    }
}
