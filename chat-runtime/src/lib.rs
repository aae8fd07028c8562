//! # Chat Runtime
//!
//! 聊天叙事播放器的核心运行时库。
//!
//! ## 架构概述
//!
//! `chat-runtime` 是纯逻辑核心，不依赖任何 IO 或渲染引擎。
//! 它把线性/分支的叙事脚本驱动成多个常驻聊天频道里的消息流，
//! 通过 **事件驱动模式** 与宿主层（Host）通信：
//!
//! ```text
//! Host                            Runtime
//!   │                                │
//!   │──── ViewerInput ─────────────►│
//!   │                                │ tick()
//!   │◄─── (Vec<RuntimeEvent>, Waiting) ──│
//!   │                                │
//! ```
//!
//! Runtime 自身不计时、不做 IO：所有延迟（打字指示的人工停顿、
//! 外部数据请求）都以 [`Waiting`] 的形态交给 Host，Host 完成后
//! 再回 tick。因此整个状态机是确定性的、可序列化的。
//!
//! ## 核心类型
//!
//! - [`ChatRuntime`]：播放状态机（唯一的频道状态写者）
//! - [`RuntimeEvent`]：Runtime 向 Host 发出的事件
//! - [`ViewerInput`]：Host 向 Runtime 传递的输入
//! - [`Waiting`]：Runtime 的等待状态
//! - [`ScriptEngine`]：脚本引擎边界（[`MemoryScript`] 为内置实现）
//! - [`SaveData`]：版本化的存档数据
//!
//! ## 模块结构
//!
//! - [`message`]：消息意图与消息记录
//! - [`channel`]：频道、历史、延迟队列
//! - [`config`]：频道与运行时配置
//! - [`tag`]：步骤标注解释器
//! - [`script`]：脚本引擎边界与内存实现
//! - [`router`]：频道路由与可见性裁决
//! - [`delay`]：延迟请求与打字状态
//! - [`event`]：RuntimeEvent 定义
//! - [`input`]：ViewerInput 定义
//! - [`state`]：编排状态与 Waiting 定义
//! - [`save`]：存档数据模型
//! - [`error`]：错误类型定义
//! - [`runtime`]：执行引擎

pub mod channel;
pub mod config;
pub mod delay;
pub mod error;
pub mod event;
pub mod input;
pub mod message;
pub mod router;
pub mod runtime;
pub mod save;
pub mod script;
pub mod state;
pub mod tag;

// 重导出核心类型
pub use channel::{Channel, ChannelSnapshot, Channels, DisplayState, Presence};
pub use config::{ChannelDef, ChannelKind, RuntimeConfig};
pub use delay::Delays;
pub use error::{ChatError, ChatResult, RuntimeError, SaveError, ScriptError};
pub use event::RuntimeEvent;
pub use input::ViewerInput;
pub use message::{
    ChannelId, DataRequest, Message, MessageIntent, MessageKind, ReceiptState, StepIndex,
};
pub use runtime::ChatRuntime;
pub use save::{SaveData, SaveVersion};
pub use script::{ChoiceBranch, ChoiceOption, MemoryScript, ScriptEngine, ScriptNode, Step};
pub use state::{PlaybackPhase, RuntimeState, Waiting};
