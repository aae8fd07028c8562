//! # Tag 模块
//!
//! Tag 解释器：把脚本步骤携带的标注 token 解释为结构化的投递意图补丁。
//!
//! ## 设计说明
//!
//! - token 语法为 `key` 或 `key:value`
//! - 识别的词汇表收敛为封闭枚举 [`Tag`]，穷尽匹配 + 显式 `Unknown` 兜底，
//!   未识别的 key 以键值对透传，不导致步骤失败
//! - 同一步骤内标注**叠加生效**，后出现的覆盖先出现的同名字段
//! - 解释是纯函数，前瞻求值时可安全重跑

use crate::channel::Presence;
use crate::message::{ChannelId, DataRequest, MessageIntent, MessageKind, StepIndex};

/// 一条已识别的标注
#[derive(Debug, Clone, PartialEq)]
pub enum Tag {
    /// `speaker:名字` — 说话者
    Speaker(String),
    /// `type:text|image|audio|video|system` — 消息种类
    Kind(MessageKind),
    /// `time:值` — 展示用时间提示
    Time(String),
    /// `date:值` — 展示用日期提示
    Date(String),
    /// `presence:值` / `status:值` — 在场状态
    Presence(Presence),
    /// `delay:毫秒` — 人工延迟请求
    Delay(u64),
    /// `channel:id` — 显式目标频道
    Channel(ChannelId),
    /// `image:路径` / `audio:路径` / `video:路径` — 媒体消息
    Media { kind: MessageKind, path: String },
    /// `immediate` — 跳过延迟投递
    Immediate,
    /// `clear` — 投递前清空目标频道历史
    Clear,
    /// `view:id` — 脚本驱动的前台切换
    ViewSwitch(ChannelId),
    /// `fetch:source/query` — 投递前的外部数据请求
    Fetch(DataRequest),
    /// 未识别的标注，以键值对透传
    Unknown { key: String, value: String },
}

impl Tag {
    /// 解析单个 token
    ///
    /// 永不失败：未识别的 key、或识别的 key 带非法值，
    /// 都退化为 [`Tag::Unknown`] 透传。
    pub fn parse(token: &str) -> Self {
        let (key, value) = match token.split_once(':') {
            Some((k, v)) => (k.trim(), v.trim()),
            None => (token.trim(), ""),
        };

        match key {
            "speaker" if !value.is_empty() => Tag::Speaker(value.to_string()),
            "type" => match parse_kind(value) {
                Some(kind) => Tag::Kind(kind),
                None => unknown(key, value),
            },
            "time" => Tag::Time(value.to_string()),
            "date" => Tag::Date(value.to_string()),
            "presence" | "status" => Tag::Presence(Presence::parse(value)),
            "delay" => match value.parse::<u64>() {
                Ok(ms) => Tag::Delay(ms),
                Err(_) => unknown(key, value),
            },
            "channel" if !value.is_empty() => Tag::Channel(value.to_string()),
            "image" => Tag::Media {
                kind: MessageKind::Image,
                path: value.to_string(),
            },
            "audio" => Tag::Media {
                kind: MessageKind::Audio,
                path: value.to_string(),
            },
            "video" => Tag::Media {
                kind: MessageKind::Video,
                path: value.to_string(),
            },
            "immediate" => Tag::Immediate,
            "clear" => Tag::Clear,
            "view" if !value.is_empty() => Tag::ViewSwitch(value.to_string()),
            "fetch" => match parse_fetch(value) {
                Some(request) => Tag::Fetch(request),
                None => unknown(key, value),
            },
            _ => unknown(key, value),
        }
    }
}

fn unknown(key: &str, value: &str) -> Tag {
    Tag::Unknown {
        key: key.to_string(),
        value: value.to_string(),
    }
}

/// `type:` 值 → 消息种类
fn parse_kind(value: &str) -> Option<MessageKind> {
    match value.to_lowercase().as_str() {
        "text" => Some(MessageKind::Text),
        "image" => Some(MessageKind::Image),
        "audio" => Some(MessageKind::Audio),
        "video" => Some(MessageKind::Video),
        "system" => Some(MessageKind::System),
        _ => None,
    }
}

/// `fetch:` 值语法：`source/query`
fn parse_fetch(value: &str) -> Option<DataRequest> {
    let (source, query) = value.split_once('/')?;
    if source.is_empty() {
        return None;
    }
    Some(DataRequest {
        source: source.to_string(),
        query: query.to_string(),
        params: Vec::new(),
    })
}

/// 把一条标注套用到意图补丁上
///
/// 后套用的覆盖先套用的同名字段（最后写入者生效）。
pub fn apply(intent: &mut MessageIntent, tag: Tag) {
    match tag {
        Tag::Speaker(name) => intent.speaker = Some(name),
        Tag::Kind(kind) => intent.kind = kind,
        Tag::Time(value) => intent.timestamp_hint = Some(value),
        Tag::Date(value) => {
            // date 与 time 共用展示位：date 在前则被 time 覆盖
            intent.timestamp_hint = Some(value);
        }
        Tag::Presence(presence) => intent.presence = Some(presence),
        Tag::Delay(ms) => intent.requested_delay_ms = Some(ms),
        Tag::Channel(id) => intent.explicit_target = Some(id),
        Tag::Media { kind, path } => {
            intent.kind = kind;
            intent.payload = path;
        }
        Tag::Immediate => intent.skip_deferral = true,
        Tag::Clear => intent.clear_history = true,
        Tag::ViewSwitch(id) => intent.view_switch = Some(id),
        Tag::Fetch(request) => intent.fetch = Some(request),
        Tag::Unknown { key, value } => intent.extra.push((key, value)),
    }
}

/// 解释一个 Text 步骤：内容 + 标注 → 完整投递意图
///
/// # 参数
///
/// - `content`: 步骤正文（媒体标注会覆盖为路径）
/// - `tokens`: 原始标注 token，按出现顺序套用
/// - `source_step`: 产生本步骤的索引（幂等键的一半）
pub fn interpret_step(content: &str, tokens: &[String], source_step: StepIndex) -> MessageIntent {
    let mut intent = MessageIntent::new(source_step);
    intent.payload = content.to_string();
    for token in tokens {
        apply(&mut intent, Tag::parse(token));
    }
    intent
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_recognized_tags() {
        assert_eq!(Tag::parse("speaker:小雨"), Tag::Speaker("小雨".to_string()));
        assert_eq!(Tag::parse("delay:800"), Tag::Delay(800));
        assert_eq!(Tag::parse("channel:group"), Tag::Channel("group".to_string()));
        assert_eq!(Tag::parse("immediate"), Tag::Immediate);
        assert_eq!(Tag::parse("clear"), Tag::Clear);
        assert_eq!(Tag::parse("type:image"), Tag::Kind(MessageKind::Image));
        assert_eq!(
            Tag::parse("presence:online"),
            Tag::Presence(Presence::Online)
        );
        assert_eq!(
            Tag::parse("status:对方正在输入"),
            Tag::Presence(Presence::Custom("对方正在输入".to_string()))
        );
    }

    #[test]
    fn test_parse_unknown_passthrough() {
        assert_eq!(
            Tag::parse("mood:happy"),
            Tag::Unknown {
                key: "mood".to_string(),
                value: "happy".to_string()
            }
        );
        // 识别的 key 带非法值同样透传，不失败
        assert_eq!(
            Tag::parse("delay:很久"),
            Tag::Unknown {
                key: "delay".to_string(),
                value: "很久".to_string()
            }
        );
        assert_eq!(
            Tag::parse("type:sticker"),
            Tag::Unknown {
                key: "type".to_string(),
                value: "sticker".to_string()
            }
        );
    }

    #[test]
    fn test_interpret_step_accumulates() {
        let intent = interpret_step(
            "放学一起走吗",
            &tokens(&["speaker:小雨", "channel:main", "delay:500", "time:17:02"]),
            3,
        );
        assert_eq!(intent.speaker.as_deref(), Some("小雨"));
        assert_eq!(intent.explicit_target.as_deref(), Some("main"));
        assert_eq!(intent.requested_delay_ms, Some(500));
        assert_eq!(intent.timestamp_hint.as_deref(), Some("17:02"));
        assert_eq!(intent.payload, "放学一起走吗");
        assert_eq!(intent.source_step, 3);
    }

    #[test]
    fn test_later_tag_overwrites_earlier() {
        let intent = interpret_step("", &tokens(&["delay:300", "delay:900"]), 0);
        assert_eq!(intent.requested_delay_ms, Some(900));

        let intent = interpret_step("", &tokens(&["channel:a", "channel:b"]), 0);
        assert_eq!(intent.explicit_target.as_deref(), Some("b"));
    }

    #[test]
    fn test_media_tag_sets_kind_and_payload() {
        let intent = interpret_step("", &tokens(&["image:photos/cat.png"]), 0);
        assert_eq!(intent.kind, MessageKind::Image);
        assert_eq!(intent.payload, "photos/cat.png");
        assert!(intent.is_displayable());
    }

    #[test]
    fn test_pure_marker_not_displayable() {
        let intent = interpret_step("", &tokens(&["presence:offline"]), 0);
        assert!(!intent.is_displayable());
        assert_eq!(intent.presence, Some(Presence::Offline));
    }

    #[test]
    fn test_fetch_tag() {
        let intent = interpret_step("今天天气：{data}", &tokens(&["fetch:weather/today"]), 0);
        let request = intent.fetch.unwrap();
        assert_eq!(request.source, "weather");
        assert_eq!(request.query, "today");
        // 缺少 source 的 fetch 透传
        let intent = interpret_step("", &tokens(&["fetch:/today"]), 0);
        assert!(intent.fetch.is_none());
        assert_eq!(intent.extra.len(), 1);
    }

    #[test]
    fn test_interpret_is_rerunnable() {
        // 纯函数：同输入两次解释结果一致（前瞻求值依赖此性质）
        let toks = tokens(&["speaker:阿树", "delay:200", "mood:calm"]);
        let a = interpret_step("好", &toks, 9);
        let b = interpret_step("好", &toks, 9);
        assert_eq!(a, b);
    }
}
