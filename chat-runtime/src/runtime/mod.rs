//! # Runtime 模块
//!
//! 播放状态机核心，负责驱动脚本、路由消息和编排挂起。
//!
//! ## 模块结构
//!
//! - [`engine`]：核心执行引擎

pub mod engine;

pub use engine::ChatRuntime;
