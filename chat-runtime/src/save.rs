//! # Save 模块
//!
//! 存档/读档系统的数据模型。
//!
//! ## 设计原则
//!
//! - 所有存档数据必须可序列化（JSON）
//! - 必须有版本号，支持向后兼容检测
//! - 脚本位置以不透明游标形态存储，Runtime 不解释其内容
//! - 恢复后从游标处重放：频道历史里已落地的消息
//!   依靠幂等键（步骤索引 + 内容指纹）去重，不会重复上屏

use serde::{Deserialize, Serialize};

use crate::channel::Channels;
use crate::delay::Delays;
use crate::error::SaveError;
use crate::state::RuntimeState;

/// 存档格式版本
///
/// 版本号含义：
/// - MAJOR: 不兼容的格式变更
/// - MINOR: 向后兼容的新字段
pub const SAVE_VERSION_MAJOR: u32 = 1;
pub const SAVE_VERSION_MINOR: u32 = 0;

/// 存档版本信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveVersion {
    pub major: u32,
    pub minor: u32,
}

impl SaveVersion {
    /// 当前版本
    pub fn current() -> Self {
        Self {
            major: SAVE_VERSION_MAJOR,
            minor: SAVE_VERSION_MINOR,
        }
    }

    /// 检查是否兼容
    ///
    /// 兼容规则：
    /// - major 必须相同
    /// - minor 可以不同（向后兼容）
    pub fn is_compatible(&self) -> bool {
        self.major == SAVE_VERSION_MAJOR
    }

    /// 格式化版本号
    pub fn render(&self) -> String {
        format!("{}.{}", self.major, self.minor)
    }
}

impl Default for SaveVersion {
    fn default() -> Self {
        Self::current()
    }
}

/// 存档数据
///
/// 包含恢复播放状态所需的所有信息。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveData {
    /// 存档格式版本
    pub version: SaveVersion,
    /// 脚本引擎的不透明游标
    pub cursor_opaque: String,
    /// 编排状态
    pub state: RuntimeState,
    /// 全部频道（历史、延迟队列、未读数、在场状态）
    pub channels: Channels,
    /// 未消费的延迟请求与打字状态
    pub delays: Delays,
}

impl SaveData {
    /// 创建新的存档数据
    pub fn new(
        cursor_opaque: String,
        state: RuntimeState,
        channels: Channels,
        delays: Delays,
    ) -> Self {
        Self {
            version: SaveVersion::current(),
            cursor_opaque,
            state,
            channels,
            delays,
        }
    }

    /// 序列化为 JSON 字符串
    pub fn to_json(&self) -> Result<String, SaveError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| SaveError::SerializationFailed(e.to_string()))
    }

    /// 从 JSON 字符串反序列化
    pub fn from_json(json: &str) -> Result<Self, SaveError> {
        let data: SaveData = serde_json::from_str(json)
            .map_err(|e| SaveError::DeserializationFailed(e.to_string()))?;

        // 检查版本兼容性
        if !data.version.is_compatible() {
            return Err(SaveError::IncompatibleVersion {
                save_version: data.version.render(),
                current_version: SaveVersion::current().render(),
            });
        }

        Ok(data)
    }
}
