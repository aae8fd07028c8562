//! 终端宿主
//!
//! 用内置的小剧本驱动 chat-runtime，把事件渲染成带频道前缀的
//! 文本行。演示人工延迟、后台频道与通知、选择分支和频道切换。
//!
//! 操作：出现选项时输入对应数字。

use std::io::{self, Write};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};

use chat_runtime::{
    ChannelDef, ChannelKind, ChatRuntime, ChoiceBranch, MemoryScript, RuntimeConfig, RuntimeEvent,
    ScriptNode, ViewerInput, Waiting,
};

fn main() -> Result<()> {
    let config = RuntimeConfig::new(vec![
        ChannelDef::new("xiaoyu", "小雨", ChannelKind::Direct),
        ChannelDef::new("class", "班级群", ChannelKind::Group),
    ]);
    let mut runtime =
        ChatRuntime::new(config, episode()).context("创建 Runtime 失败")?;

    let mut input: Option<ViewerInput> = None;
    loop {
        let (events, waiting) = runtime.tick(input.take()).context("tick 失败")?;
        render(&events);

        input = match waiting {
            Waiting::None => {
                if runtime.is_idle() {
                    println!("—— 剧本播放完毕 ——");
                    return Ok(());
                }
                None
            }
            Waiting::Timer { duration_ms, .. } => {
                thread::sleep(Duration::from_millis(duration_ms));
                Some(ViewerInput::timer())
            }
            Waiting::Choice { choice_count } => Some(read_choice(choice_count)?),
            Waiting::ExternalData { request, .. } => {
                // 终端宿主没有真实数据源，直接回报失败演示降级路径
                Some(ViewerInput::DataFailed {
                    reason: format!("{}/{} 不可用", request.source, request.query),
                })
            }
        };
    }
}

/// 渲染一批事件
fn render(events: &[RuntimeEvent]) {
    for event in events {
        match event {
            RuntimeEvent::MessageDelivered { message } => {
                let speaker = message.speaker.as_deref().unwrap_or("·");
                println!("[{}] {}: {}", message.channel, speaker, message.payload);
            }
            RuntimeEvent::NotificationRaised { channel, preview } => {
                println!("  ♪ 新消息 @{channel}: {preview}");
            }
            RuntimeEvent::TypingStart { channel, speaker } => {
                let who = speaker.as_deref().unwrap_or("对方");
                println!("  [{channel}] {who} 正在输入…");
            }
            RuntimeEvent::TypingEnd { .. } => {}
            RuntimeEvent::ChoicesAvailable { options } => {
                println!("  请选择：");
                for (i, option) in options.iter().enumerate() {
                    println!("    {}. {}", i + 1, option.text);
                }
            }
            RuntimeEvent::ForegroundChanged { channel } => {
                println!("  —— 切换到 [{channel}] ——");
            }
            RuntimeEvent::PresenceChanged { channel, presence } => {
                println!("  [{channel}] 在场状态: {presence:?}");
            }
            RuntimeEvent::HistoryCleared { channel } => {
                println!("  [{channel}] 历史已清空");
            }
            RuntimeEvent::ReceiptChanged { .. } => {}
        }
    }
}

/// 读取一个选择（1-based 输入转 0-based 索引）
fn read_choice(count: usize) -> Result<ViewerInput> {
    loop {
        print!("> ");
        io::stdout().flush()?;
        let mut line = String::new();
        io::stdin().read_line(&mut line).context("读取输入失败")?;
        match line.trim().parse::<usize>() {
            Ok(n) if n >= 1 && n <= count => return Ok(ViewerInput::choice(n - 1)),
            _ => println!("请输入 1..={count} 之间的数字"),
        }
    }
}

/// 内置演示剧本
///
/// 分支通过节点索引跳转，汇合用 `Jump`。
fn episode() -> MemoryScript {
    MemoryScript::new(vec![
        // 0-3: 开场，两个频道各有消息
        node("晚自习结束了吗？", &["speaker:小雨", "delay:800"]),
        node("我在校门口等你", &["speaker:小雨", "delay:1200"]),
        node("明天春游记得带伞，山上会下雨", &["channel:class", "speaker:班长", "delay:600"]),
        node("集合时间改到七点半", &["channel:class", "speaker:班长", "delay:600"]),
        // 4: 选择
        ScriptNode::Choice {
            options: vec![
                ChoiceBranch::new("马上到", 5),
                ChoiceBranch::new("先看看班级群", 7),
            ],
        },
        // 5-6: 分支一
        node("好，我买了两串糖葫芦", &["speaker:小雨", "delay:900"]),
        ScriptNode::Jump { target: 8 },
        // 7: 分支二，脚本主动切到班级群
        node("看完了吗？我先去占座啦", &["speaker:小雨", "delay:900", "view:class"]),
        // 8: 汇合
        node("到了叫我一声", &["speaker:小雨", "delay:700"]),
    ])
}

fn node(content: &str, tags: &[&str]) -> ScriptNode {
    ScriptNode::Text {
        content: content.to_string(),
        tags: tags.iter().map(|s| s.to_string()).collect(),
        section_channel: None,
    }
}
