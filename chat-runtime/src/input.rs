//! # Input 模块
//!
//! 定义 Host 向 Runtime 传递的输入事件。
//!
//! ## 设计说明
//!
//! - `ViewerInput` 是 Host 采集玩家操作（或完成协作任务）后，
//!   传递给 Runtime 的语义化输入
//! - Runtime 不直接处理指针/定时器，只处理语义化输入
//! - 输入严格一次一条：`tick(input)` 每次最多消费一条

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::ChannelId;

/// Host 向 Runtime 传递的输入
///
/// Runtime 通过 `tick(input)` 接收输入，并根据当前等待状态决定如何处理。
///
/// # 设计说明
///
/// - `TimerElapsed`：人工延迟到期（解除 `Waiting::Timer`）
/// - `SelectChoice`：玩家选择了某个选项（解除 `Waiting::Choice`）
/// - `OpenChannel`：玩家切换前台频道，任何阶段都可提交
/// - `DataResolved` / `DataFailed`：外部数据请求的结果
///   （解除 `Waiting::ExternalData`；超时由 Host 按配置上限裁剪，
///   以 `DataFailed` 的形式回报）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ViewerInput {
    /// 人工延迟到期
    TimerElapsed,

    /// 玩家选择了某个选项（`index` 从 0 开始）
    SelectChoice { index: usize },

    /// 玩家打开某个频道（切换前台）
    OpenChannel { id: ChannelId },

    /// 外部数据请求成功
    DataResolved { value: Value },

    /// 外部数据请求失败或超时
    DataFailed { reason: String },
}

impl ViewerInput {
    /// 创建延迟到期输入
    pub fn timer() -> Self {
        Self::TimerElapsed
    }

    /// 创建选择输入
    pub fn choice(index: usize) -> Self {
        Self::SelectChoice { index }
    }

    /// 创建频道切换输入
    pub fn open(id: impl Into<ChannelId>) -> Self {
        Self::OpenChannel { id: id.into() }
    }
}
