//! # Script 模块
//!
//! 脚本引擎边界。
//!
//! ## 设计说明
//!
//! 叙事脚本语言的解析/编译是外部协作者，Runtime 只通过
//! [`ScriptEngine`] 这个窄接口消费其产物：一个惰性的步骤序列。
//! 序列只能通过完整重载（`restore_cursor`）回到过去，不支持就地回退。
//!
//! [`MemoryScript`] 是内置的最小实现，供测试与终端宿主使用。

use serde::{Deserialize, Serialize};

use crate::error::ScriptError;
use crate::message::ChannelId;

/// 选择项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceOption {
    /// 选项显示文本
    pub text: String,
}

impl ChoiceOption {
    /// 创建选择项
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// 脚本引擎输出的一个步骤
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Step {
    /// 一个内容单元
    Text {
        /// 正文
        content: String,
        /// 原始标注 token（由 Tag 解释器消费）
        tags: Vec<String>,
        /// 产生本步骤的章节默认频道（显式 `channel:` 标注优先于它）
        section_channel: Option<ChannelId>,
    },

    /// 一组选择分支
    Choices {
        /// 选项列表
        options: Vec<ChoiceOption>,
    },

    /// 当前分支没有更多内容（非全局终止：选择或重载后可能继续）
    End,
}

/// 脚本引擎边界
///
/// # 契约
///
/// - `advance` 惰性产出下一个步骤；返回 `Choices` 后，
///   在 `choose` 被调用前重复 `advance` 应重复产出同一组选项
/// - `save_cursor` 产出不透明游标；`restore_cursor` 用它把引擎
///   恢复到对应位置，此后 `advance` 重放与当初一致的步骤序列
pub trait ScriptEngine {
    /// 产出下一个步骤
    fn advance(&mut self) -> Result<Step, ScriptError>;

    /// 把玩家的选择转发给脚本（`index` 从 0 开始）
    fn choose(&mut self, index: usize) -> Result<(), ScriptError>;

    /// 保存不透明游标
    fn save_cursor(&self) -> String;

    /// 从不透明游标恢复
    fn restore_cursor(&mut self, cursor: &str) -> Result<(), ScriptError>;
}

/// 内存脚本的一个节点
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScriptNode {
    /// 内容节点
    Text {
        content: String,
        tags: Vec<String>,
        section_channel: Option<ChannelId>,
    },

    /// 选择节点：每个选项跳转到对应的节点索引
    Choice { options: Vec<ChoiceBranch> },

    /// 无条件跳转（分支汇合用）
    Jump { target: usize },

    /// 故障节点（测试脚本故障路径用）
    Faulty { message: String },
}

/// 选择分支
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceBranch {
    /// 选项显示文本
    pub text: String,
    /// 跳转目标节点索引
    pub target: usize,
}

impl ChoiceBranch {
    /// 创建选择分支
    pub fn new(text: impl Into<String>, target: usize) -> Self {
        Self {
            text: text.into(),
            target,
        }
    }
}

/// 内存脚本游标（`save_cursor` 的序列化形态）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct MemoryCursor {
    position: usize,
    awaiting_choice: Option<usize>,
}

/// 内置的内存脚本引擎
///
/// 节点以索引寻址（选择分支直接记录目标索引），
/// 游标为内部位置的 JSON 序列化。
#[derive(Debug, Clone)]
pub struct MemoryScript {
    nodes: Vec<ScriptNode>,
    /// 下一个要产出的节点索引
    position: usize,
    /// 等待选择时，记录选择节点的索引
    awaiting_choice: Option<usize>,
}

impl MemoryScript {
    /// 从节点列表创建
    pub fn new(nodes: Vec<ScriptNode>) -> Self {
        Self {
            nodes,
            position: 0,
            awaiting_choice: None,
        }
    }
}

impl ScriptEngine for MemoryScript {
    fn advance(&mut self) -> Result<Step, ScriptError> {
        // 未决的选择：重复产出同一组选项
        if let Some(index) = self.awaiting_choice {
            if let Some(ScriptNode::Choice { options }) = self.nodes.get(index) {
                return Ok(Step::Choices {
                    options: options
                        .iter()
                        .map(|b| ChoiceOption::new(b.text.clone()))
                        .collect(),
                });
            }
        }

        loop {
            let node = match self.nodes.get(self.position) {
                Some(node) => node.clone(),
                None => return Ok(Step::End),
            };

            match node {
                ScriptNode::Text {
                    content,
                    tags,
                    section_channel,
                } => {
                    self.position += 1;
                    return Ok(Step::Text {
                        content,
                        tags,
                        section_channel,
                    });
                }
                ScriptNode::Choice { options } => {
                    self.awaiting_choice = Some(self.position);
                    return Ok(Step::Choices {
                        options: options
                            .iter()
                            .map(|b| ChoiceOption::new(b.text.clone()))
                            .collect(),
                    });
                }
                ScriptNode::Jump { target } => {
                    self.position = target;
                }
                ScriptNode::Faulty { message } => {
                    // 故障步骤也要前进，避免状态机重试时死循环
                    let step = self.position as u64;
                    self.position += 1;
                    return Err(ScriptError::MalformedStep { step, message });
                }
            }
        }
    }

    fn choose(&mut self, index: usize) -> Result<(), ScriptError> {
        let node_index = self.awaiting_choice.ok_or(ScriptError::MalformedStep {
            step: self.position as u64,
            message: "当前没有未决的选择".to_string(),
        })?;

        let Some(ScriptNode::Choice { options }) = self.nodes.get(node_index) else {
            return Err(ScriptError::ChoiceTargetNotFound {
                target: format!("节点 {node_index}"),
            });
        };
        let branch = options
            .get(index)
            .ok_or_else(|| ScriptError::ChoiceTargetNotFound {
                target: format!("选项 {index}"),
            })?;

        self.position = branch.target;
        self.awaiting_choice = None;
        Ok(())
    }

    fn save_cursor(&self) -> String {
        let cursor = MemoryCursor {
            position: self.position,
            awaiting_choice: self.awaiting_choice,
        };
        // MemoryCursor 的字段都是平凡类型，序列化不会失败
        serde_json::to_string(&cursor).unwrap_or_default()
    }

    fn restore_cursor(&mut self, cursor: &str) -> Result<(), ScriptError> {
        let cursor: MemoryCursor =
            serde_json::from_str(cursor).map_err(|e| ScriptError::InvalidCursor {
                message: e.to_string(),
            })?;
        self.position = cursor.position;
        self.awaiting_choice = cursor.awaiting_choice;
        Ok(())
    }
}

/// 便捷构造：无标注文本节点
pub fn text(content: impl Into<String>) -> ScriptNode {
    ScriptNode::Text {
        content: content.into(),
        tags: Vec::new(),
        section_channel: None,
    }
}

/// 便捷构造：带标注文本节点
pub fn tagged(content: impl Into<String>, tags: &[&str]) -> ScriptNode {
    ScriptNode::Text {
        content: content.into(),
        tags: tags.iter().map(|s| s.to_string()).collect(),
        section_channel: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MemoryScript {
        MemoryScript::new(vec![
            text("第一句"),
            ScriptNode::Choice {
                options: vec![ChoiceBranch::new("去操场", 2), ChoiceBranch::new("回家", 3)],
            },
            text("操场分支"),
            text("回家分支"),
        ])
    }

    #[test]
    fn test_advance_text_then_end() {
        let mut script = MemoryScript::new(vec![text("唯一一句")]);
        assert!(matches!(
            script.advance().unwrap(),
            Step::Text { content, .. } if content == "唯一一句"
        ));
        assert_eq!(script.advance().unwrap(), Step::End);
        // End 可重复产出
        assert_eq!(script.advance().unwrap(), Step::End);
    }

    #[test]
    fn test_choice_repeats_until_chosen() {
        let mut script = sample();
        script.advance().unwrap();

        let first = script.advance().unwrap();
        let second = script.advance().unwrap();
        assert_eq!(first, second);
        assert!(matches!(first, Step::Choices { ref options } if options.len() == 2));

        script.choose(1).unwrap();
        assert!(matches!(
            script.advance().unwrap(),
            Step::Text { content, .. } if content == "回家分支"
        ));
    }

    #[test]
    fn test_choose_out_of_range() {
        let mut script = sample();
        script.advance().unwrap();
        script.advance().unwrap();
        assert!(matches!(
            script.choose(9),
            Err(ScriptError::ChoiceTargetNotFound { .. })
        ));
    }

    #[test]
    fn test_cursor_roundtrip_replays_identically() {
        let mut script = sample();
        script.advance().unwrap();
        let cursor = script.save_cursor();

        let continued = script.advance().unwrap();

        let mut restored = sample();
        restored.restore_cursor(&cursor).unwrap();
        assert_eq!(restored.advance().unwrap(), continued);
    }

    #[test]
    fn test_invalid_cursor_rejected() {
        let mut script = sample();
        assert!(matches!(
            script.restore_cursor("不是 JSON"),
            Err(ScriptError::InvalidCursor { .. })
        ));
    }

    #[test]
    fn test_faulty_node_reports_and_advances() {
        let mut script = MemoryScript::new(vec![
            ScriptNode::Faulty {
                message: "坏节点".to_string(),
            },
            text("之后的内容"),
        ]);
        assert!(matches!(
            script.advance(),
            Err(ScriptError::MalformedStep { .. })
        ));
        // 故障后继续前进，不会卡死
        assert!(matches!(script.advance().unwrap(), Step::Text { .. }));
    }

    #[test]
    fn test_jump_node() {
        let mut script = MemoryScript::new(vec![
            ScriptNode::Jump { target: 2 },
            text("被跳过"),
            text("落点"),
        ]);
        assert!(matches!(
            script.advance().unwrap(),
            Step::Text { content, .. } if content == "落点"
        ));
    }
}
