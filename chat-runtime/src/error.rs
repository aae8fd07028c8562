//! # Error 模块
//!
//! 定义 chat-runtime 中使用的错误类型。
//!
//! ## 设计说明
//!
//! 核心状态机对脚本层故障**自愈**（降级为系统消息、记录日志、继续播放），
//! 因此 `RuntimeError` 只覆盖 Host 契约层面的硬错误
//! （非法选择索引、与等待状态矛盾的输入等），不包含可恢复故障。

use thiserror::Error;

/// 脚本引擎错误
///
/// 由 `ScriptEngine` 实现方返回。Runtime 收到后将当前步骤降级为
/// 系统消息并继续，不会中断状态机。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScriptError {
    /// 步骤格式错误
    #[error("第 {step} 步格式错误: {message}")]
    MalformedStep { step: u64, message: String },

    /// 游标无法解析
    #[error("游标无法解析: {message}")]
    InvalidCursor { message: String },

    /// 选择目标未找到
    #[error("选择目标 '{target}' 未找到")]
    ChoiceTargetNotFound { target: String },
}

/// 运行时错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeError {
    /// 无效的选择索引
    #[error("无效的选择索引 {index}，有效范围是 0..{max}")]
    InvalidChoiceIndex { index: usize, max: usize },

    /// 状态不匹配
    #[error("当前状态不允许此操作：期望 {expected}，实际 {actual}")]
    StateMismatch { expected: String, actual: String },

    /// 配置中没有任何频道
    #[error("配置中没有任何频道")]
    EmptyChannelConfig,

    /// 游标恢复失败
    #[error("游标恢复失败: {0}")]
    CursorRestore(#[from] ScriptError),
}

/// 存档错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SaveError {
    /// 序列化失败
    #[error("序列化失败: {0}")]
    SerializationFailed(String),

    /// 反序列化失败
    #[error("反序列化失败: {0}")]
    DeserializationFailed(String),

    /// 版本不兼容
    #[error("存档版本不兼容: 存档版本 {save_version} vs 当前版本 {current_version}")]
    IncompatibleVersion {
        save_version: String,
        current_version: String,
    },
}

/// chat-runtime 统一错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChatError {
    /// 脚本引擎错误
    #[error("脚本错误: {0}")]
    Script(#[from] ScriptError),

    /// 运行时错误
    #[error("运行时错误: {0}")]
    Runtime(#[from] RuntimeError),

    /// 存档错误
    #[error("存档错误: {0}")]
    Save(#[from] SaveError),
}

/// Result 类型别名
pub type ChatResult<T> = Result<T, ChatError>;
