//! # Engine 模块
//!
//! 播放状态机核心执行引擎。
//!
//! ## 执行模型
//!
//! ```text
//! tick(input) -> (Vec<RuntimeEvent>, Waiting)
//! ```
//!
//! 1. 处理输入（计时到期 / 选择 / 切换频道 / 数据结果）
//! 2. 若仍有未决挂起（计时或数据在 Host 手里），原样返回
//! 3. 否则继续驱动：优先回放前台延迟队列，再拉取脚本步骤，
//!    直到下一个挂起点
//! 4. 返回本次产生的事件和新的等待状态
//!
//! ## 阶段转换
//!
//! ```text
//! Idle ──────────► Advancing        开始播放 / 选择已决
//! Advancing ─────► SuspendedDelay   步骤带正延迟（或等外部数据）
//! SuspendedDelay ► Advancing        计时到期 / 数据返回
//! Advancing ─────► AwaitingChoice   脚本浮出选择集
//! AwaitingChoice ► Advancing        玩家选择，转发脚本引擎
//! Advancing ─────► Idle             当前分支无更多内容（非全局终止）
//! 任意阶段 ──────► Replaying        前台切到有积压队列的频道
//! Replaying ─────► 切换前的阶段     队列清空
//! ```

use tracing::{debug, warn};

use crate::channel::{ChannelSnapshot, Channels};
use crate::config::{ChannelDef, ChannelKind, RuntimeConfig};
use crate::delay::Delays;
use crate::error::RuntimeError;
use crate::event::RuntimeEvent;
use crate::input::ViewerInput;
use crate::message::{MessageIntent, MessageKind, ReceiptState};
use crate::router::{Decision, Router};
use crate::save::SaveData;
use crate::script::{ScriptEngine, Step};
use crate::state::{PendingChoices, PendingDelivery, PlaybackPhase, RuntimeState, Waiting};
use crate::tag;

/// 播放状态机
///
/// 这是 chat-runtime 的核心类型：唯一的频道状态写者。
/// UI 层只读取快照或通过 `tick(input)` 提交意图。
///
/// # 使用示例
///
/// ```ignore
/// let mut runtime = ChatRuntime::new(config, script)?;
///
/// loop {
///     let (events, waiting) = runtime.tick(input)?;
///
///     // Host 呈现 events...
///
///     input = match waiting {
///         Waiting::None => None,
///         Waiting::Timer { duration_ms, .. } => {
///             sleep(duration_ms);
///             Some(ViewerInput::timer())
///         }
///         Waiting::Choice { .. } => read_player_choice(),
///         Waiting::ExternalData { request, timeout_ms } => {
///             Some(fetch_with_timeout(request, timeout_ms))
///         }
///     };
/// }
/// ```
pub struct ChatRuntime<E: ScriptEngine> {
    /// 脚本引擎
    engine: E,
    /// 运行时配置
    config: RuntimeConfig,
    /// 频道路由器
    router: Router,
    /// 频道仓库
    channels: Channels,
    /// 延迟与打字状态
    delays: Delays,
    /// 编排状态
    state: RuntimeState,
}

impl<E: ScriptEngine> ChatRuntime<E> {
    /// 创建新的 Runtime 实例
    ///
    /// 兜底系统频道不在配置中时自动补建。
    pub fn new(config: RuntimeConfig, engine: E) -> Result<Self, RuntimeError> {
        let channels = Channels::new(&channel_defs(&config))?;
        let router = Router::new(&config);
        Ok(Self {
            engine,
            config,
            router,
            channels,
            delays: Delays::new(),
            state: RuntimeState::new(),
        })
    }

    /// 从存档恢复 Runtime
    ///
    /// 脚本引擎被恢复到存档时的游标位置；频道历史的消息 ID
    /// 与顺序原样回到内存，幂等键缓存就地重建。
    /// 存档之后配置新增的频道补建为空频道，不会改道到兜底。
    pub fn restore(config: RuntimeConfig, mut engine: E, data: SaveData) -> Result<Self, RuntimeError> {
        engine.restore_cursor(&data.cursor_opaque)?;
        let router = Router::new(&config);
        let mut channels = data.channels;
        channels.merge_defs(&channel_defs(&config));
        channels.rebuild_seen();
        Ok(Self {
            engine,
            config,
            router,
            channels,
            delays: data.delays,
            state: data.state,
        })
    }

    /// 生成存档数据
    pub fn save(&self) -> SaveData {
        SaveData::new(
            self.engine.save_cursor(),
            self.state.clone(),
            self.channels.clone(),
            self.delays.clone(),
        )
    }

    /// 核心驱动函数
    ///
    /// 根据输入推进播放，返回产生的事件和新的等待状态。
    pub fn tick(
        &mut self,
        input: Option<ViewerInput>,
    ) -> Result<(Vec<RuntimeEvent>, Waiting), RuntimeError> {
        let mut events = Vec::new();

        // 1. 处理输入
        if let Some(input) = input {
            self.handle_input(input, &mut events)?;
        }

        // 2. 计时或数据仍在 Host 手里，原样返回
        if self.state.pending.is_some() || self.state.pending_fetch.is_some() {
            return Ok((events, self.waiting()));
        }

        // 3. 继续驱动直到下一个挂起点
        let waiting = self.run(&mut events);
        Ok((events, waiting))
    }

    /// 当前等待状态
    pub fn waiting(&self) -> Waiting {
        if let Some(pending) = &self.state.pending {
            return Waiting::timer(pending.channel.clone(), pending.delay_ms);
        }
        if let Some(intent) = &self.state.pending_fetch {
            if let Some(request) = &intent.fetch {
                return Waiting::external_data(request.clone(), self.config.fetch_timeout_ms);
            }
        }
        if self.state.phase == PlaybackPhase::AwaitingChoice {
            let count = self
                .state
                .cursor
                .pending_choices
                .as_ref()
                .map(|p| p.options.len())
                .unwrap_or(0);
            return Waiting::choice(count);
        }
        Waiting::None
    }

    /// 频道只读快照（UI 层读取用）
    pub fn snapshot(&self) -> Vec<ChannelSnapshot> {
        self.channels.snapshot()
    }

    /// 频道仓库只读访问
    pub fn channels(&self) -> &Channels {
        &self.channels
    }

    /// 编排状态只读访问
    pub fn state(&self) -> &RuntimeState {
        &self.state
    }

    /// 当前分支是否已无更多内容
    pub fn is_idle(&self) -> bool {
        self.state.phase == PlaybackPhase::Idle
    }

    /// 处理一条输入
    fn handle_input(
        &mut self,
        input: ViewerInput,
        events: &mut Vec<RuntimeEvent>,
    ) -> Result<(), RuntimeError> {
        match input {
            ViewerInput::TimerElapsed => {
                let Some(pending) = self.state.pending.take() else {
                    // 存读档边界可能产生迟到的计时回调，忽略
                    return Ok(());
                };
                self.land(pending, events);
                if self.state.phase != PlaybackPhase::Replaying {
                    self.state.phase = PlaybackPhase::Advancing;
                }
                Ok(())
            }

            ViewerInput::SelectChoice { index } => self.handle_choice(index, events),

            ViewerInput::OpenChannel { id } => {
                self.open_channel(&id, events);
                Ok(())
            }

            ViewerInput::DataResolved { value } => {
                self.finish_fetch(Ok(value), events);
                Ok(())
            }

            ViewerInput::DataFailed { reason } => {
                self.finish_fetch(Err(reason), events);
                Ok(())
            }
        }
    }

    /// 处理玩家选择
    fn handle_choice(
        &mut self,
        index: usize,
        events: &mut Vec<RuntimeEvent>,
    ) -> Result<(), RuntimeError> {
        // 回放必须先跑完，期间的选择输入不被接受
        if self.state.phase == PlaybackPhase::Replaying {
            debug!("回放未完成，选择输入被忽略");
            return Ok(());
        }
        if self.state.phase != PlaybackPhase::AwaitingChoice {
            return Err(RuntimeError::StateMismatch {
                expected: "AwaitingChoice".to_string(),
                actual: format!("{:?}", self.state.phase),
            });
        }
        let Some(pending) = self.state.cursor.pending_choices.clone() else {
            return Err(RuntimeError::StateMismatch {
                expected: "待决选择集".to_string(),
                actual: "无".to_string(),
            });
        };
        if index >= pending.options.len() {
            return Err(RuntimeError::InvalidChoiceIndex {
                index,
                max: pending.options.len(),
            });
        }

        // 回显玩家的选择到前台频道（幂等键沿用选择步骤的索引）
        let mut echo = MessageIntent::new(pending.step);
        echo.kind = MessageKind::Outgoing;
        echo.payload = pending.options[index].text.clone();
        echo.skip_deferral = true;
        let routed = self
            .router
            .route(echo, None, &mut self.channels, &mut self.delays);
        if let Decision::Deliver { intent, .. } = routed.decision {
            self.commit(&routed.channel, &intent, ReceiptState::Sent, events);
        }

        // 转发给脚本引擎
        if let Err(e) = self.engine.choose(index) {
            warn!(error = %e, "脚本引擎拒绝选择，降级为系统消息");
            self.degrade_step(&e.to_string(), events);
        }

        self.state.cursor.pending_choices = None;
        self.state.phase = PlaybackPhase::Advancing;
        Ok(())
    }

    /// 切换前台频道（玩家或脚本驱动）
    fn open_channel(&mut self, id: &str, events: &mut Vec<RuntimeEvent>) {
        if !self.channels.contains(id) {
            warn!(channel = %id, "尝试打开未配置的频道，忽略");
            return;
        }
        if self.channels.foreground_id() != id {
            self.channels.set_foreground(id);
            events.push(RuntimeEvent::ForegroundChanged {
                channel: id.to_string(),
            });
        }
        // 已送达的历史批量转已读
        if let Some(channel) = self.channels.get_mut(id) {
            for message_id in channel.mark_read() {
                events.push(RuntimeEvent::ReceiptChanged {
                    channel: id.to_string(),
                    message_id,
                    receipt: ReceiptState::Read,
                });
            }
        }
    }

    /// 外部数据请求完成（成功或失败）
    fn finish_fetch(
        &mut self,
        result: Result<serde_json::Value, String>,
        events: &mut Vec<RuntimeEvent>,
    ) {
        let Some(mut intent) = self.state.pending_fetch.take() else {
            debug!("没有未决的数据请求，忽略");
            return;
        };
        intent.fetch = None;

        match result {
            Ok(value) => {
                let rendered = match value {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                if intent.payload.contains("{data}") {
                    intent.payload = intent.payload.replace("{data}", &rendered);
                } else if intent.payload.is_empty() {
                    intent.payload = rendered;
                }
            }
            Err(reason) => {
                // 步骤失败但播放继续：以可见的错误消息替代预期内容
                warn!(reason = %reason, "外部数据请求失败，以错误消息替代");
                intent.kind = MessageKind::System;
                intent.payload = format!("内容加载失败：{reason}");
            }
        }

        self.state.phase = PlaybackPhase::Advancing;
        self.apply_intent(intent, None, events);
    }

    /// 继续驱动，直到下一个挂起点
    fn run(&mut self, events: &mut Vec<RuntimeEvent>) -> Waiting {
        loop {
            // 本轮产生了新的挂起，交还 Host
            if self.state.pending.is_some() || self.state.pending_fetch.is_some() {
                return self.waiting();
            }

            // 回放优先：前台频道有积压队列
            let foreground = self.channels.foreground_id().clone();
            let front = self
                .channels
                .get(&foreground)
                .and_then(|c| c.deferred.front().cloned());
            if let Some(intent) = front {
                if self.state.phase != PlaybackPhase::Replaying {
                    self.state.resume_phase = Some(self.state.phase);
                    self.state.phase = PlaybackPhase::Replaying;
                }
                // 挂起期间队首保持在队列里（不变量：未读数 == 队列长度），
                // 落地时才弹出。回放落地同样是一次投递，
                // 频道的待消费 DelayToken 在此消费
                let token = self.delays.take(&foreground);
                let delay_ms = if self.config.reduced_motion {
                    0
                } else {
                    intent
                        .requested_delay_ms
                        .or(token)
                        .unwrap_or(self.config.replay_delay_ms)
                };
                if delay_ms == 0 {
                    if let Some(channel) = self.channels.get_mut(&foreground) {
                        channel.pop_deferred();
                    }
                    self.commit(&foreground, &intent, ReceiptState::Read, events);
                    continue;
                }
                if self.delays.begin_typing(&foreground) {
                    events.push(RuntimeEvent::TypingStart {
                        channel: foreground.clone(),
                        speaker: intent.speaker.clone(),
                    });
                }
                self.state.pending = Some(PendingDelivery {
                    channel: foreground,
                    intent,
                    delay_ms,
                    from_replay: true,
                });
                return self.waiting();
            }

            // 队列清空：恢复切换前的阶段
            if self.state.phase == PlaybackPhase::Replaying {
                let resumed = self
                    .state
                    .resume_phase
                    .take()
                    .unwrap_or(PlaybackPhase::Advancing);
                self.state.phase = match resumed {
                    PlaybackPhase::AwaitingChoice => PlaybackPhase::AwaitingChoice,
                    _ => PlaybackPhase::Advancing,
                };
            }

            // 选择集未决：不再拉取脚本
            if self.state.phase == PlaybackPhase::AwaitingChoice {
                return self.waiting();
            }

            // 拉取并处理下一个步骤
            self.state.phase = PlaybackPhase::Advancing;
            match self.engine.advance() {
                Ok(Step::Text {
                    content,
                    tags,
                    section_channel,
                }) => {
                    let step = self.state.cursor.next_step();
                    let intent = tag::interpret_step(&content, &tags, step);
                    self.process_intent(intent, section_channel.as_deref(), events);
                }

                Ok(Step::Choices { options }) => {
                    // 未消费的延迟不跨越选择
                    self.delays.clear_tokens();
                    let step = self.state.cursor.next_step();
                    self.state.cursor.pending_choices = Some(PendingChoices {
                        step,
                        options: options.clone(),
                    });
                    events.push(RuntimeEvent::ChoicesAvailable { options });
                    self.state.phase = PlaybackPhase::AwaitingChoice;
                    return self.waiting();
                }

                Ok(Step::End) => {
                    self.state.phase = PlaybackPhase::Idle;
                    return Waiting::None;
                }

                Err(e) => {
                    // 脚本求值错误不中断状态机
                    warn!(error = %e, "脚本求值失败，降级为系统消息");
                    self.degrade_step(&e.to_string(), events);
                }
            }
        }
    }

    /// 处理一个解释完成的意图（可能因外部数据而挂起）
    fn process_intent(
        &mut self,
        mut intent: MessageIntent,
        section: Option<&str>,
        events: &mut Vec<RuntimeEvent>,
    ) {
        if intent.fetch.is_some() {
            // 目标先固化，恢复时不再依赖章节上下文
            if intent.explicit_target.is_none() {
                if let Some(section) = section {
                    intent.explicit_target = Some(section.to_string());
                }
            }
            self.state.pending_fetch = Some(intent);
            self.state.phase = PlaybackPhase::SuspendedDelay;
            return;
        }
        self.apply_intent(intent, section, events);
    }

    /// 路由意图并套用结果
    fn apply_intent(
        &mut self,
        intent: MessageIntent,
        section: Option<&str>,
        events: &mut Vec<RuntimeEvent>,
    ) {
        let presence = intent.presence.clone();
        let view_switch = intent.view_switch.clone();

        let routed = self
            .router
            .route(intent, section, &mut self.channels, &mut self.delays);

        if routed.cleared {
            events.push(RuntimeEvent::HistoryCleared {
                channel: routed.channel.clone(),
            });
        }

        if let Some(presence) = presence {
            if let Some(channel) = self.channels.get_mut(&routed.channel) {
                if channel.presence != presence {
                    channel.presence = presence.clone();
                    events.push(RuntimeEvent::PresenceChanged {
                        channel: routed.channel.clone(),
                        presence,
                    });
                }
            }
        }

        match routed.decision {
            Decision::Deliver { intent, delay_ms } => {
                if delay_ms == 0 {
                    // 零延迟：不做打字括弧，直接落地
                    let foreground = self.channels.foreground_id() == &routed.channel;
                    let receipt = if foreground {
                        ReceiptState::Read
                    } else {
                        ReceiptState::Delivered
                    };
                    self.commit(&routed.channel, &intent, receipt, events);
                } else {
                    if self.delays.begin_typing(&routed.channel) {
                        events.push(RuntimeEvent::TypingStart {
                            channel: routed.channel.clone(),
                            speaker: intent.speaker.clone(),
                        });
                    }
                    self.state.pending = Some(PendingDelivery {
                        channel: routed.channel.clone(),
                        intent,
                        delay_ms,
                        from_replay: false,
                    });
                    self.state.phase = PlaybackPhase::SuspendedDelay;
                }
            }

            Decision::Deferred { preview } => {
                events.push(RuntimeEvent::NotificationRaised {
                    channel: routed.channel.clone(),
                    preview,
                });
            }

            Decision::Duplicate | Decision::Marker => {}
        }

        // 脚本驱动的前台切换（回放检查在主循环里接手）
        if let Some(target) = view_switch {
            self.open_channel(&target, events);
        }
    }

    /// 在途消息落地
    ///
    /// 前台切换不取消在途消息：它落入原频道，
    /// 若该频道已在后台则附带一条通知，绝不丢失。
    fn land(&mut self, pending: PendingDelivery, events: &mut Vec<RuntimeEvent>) {
        if pending.from_replay {
            if let Some(channel) = self.channels.get_mut(&pending.channel) {
                channel.pop_deferred();
            }
        }
        let foreground = self.channels.foreground_id() == &pending.channel;
        let receipt = if foreground {
            ReceiptState::Read
        } else {
            ReceiptState::Delivered
        };
        self.commit(&pending.channel, &pending.intent, receipt, events);
    }

    /// 把意图落入频道历史并发事件
    ///
    /// TypingEnd 严格先于 MessageDelivered；落在后台时附带通知。
    fn commit(
        &mut self,
        channel_id: &str,
        intent: &MessageIntent,
        receipt: ReceiptState,
        events: &mut Vec<RuntimeEvent>,
    ) {
        let sent_at = self.state.tick_clock();
        if self.delays.end_typing(channel_id) {
            events.push(RuntimeEvent::TypingEnd {
                channel: channel_id.to_string(),
            });
        }
        let foreground = self.channels.foreground_id() == channel_id;
        let Some(channel) = self.channels.get_mut(channel_id) else {
            return;
        };
        let message = channel.commit(intent, sent_at, receipt);
        events.push(RuntimeEvent::MessageDelivered { message });
        if !foreground {
            events.push(RuntimeEvent::NotificationRaised {
                channel: channel_id.to_string(),
                preview: intent.payload.clone(),
            });
        }
    }

    /// 把失败的步骤降级为兜底频道里的系统消息
    fn degrade_step(&mut self, reason: &str, events: &mut Vec<RuntimeEvent>) {
        let step = self.state.cursor.next_step();
        let mut intent = MessageIntent::new(step);
        intent.kind = MessageKind::System;
        intent.payload = format!("脚本步骤执行失败，已跳过：{reason}");
        intent.explicit_target = Some(self.config.fallback_channel.clone());
        self.apply_intent(intent, None, events);
    }
}

/// 配置里的频道定义，兜底系统频道缺失时补上
fn channel_defs(config: &RuntimeConfig) -> Vec<ChannelDef> {
    let mut defs = config.channels.clone();
    if !defs.iter().any(|d| d.id == config.fallback_channel) {
        defs.push(ChannelDef::new(
            config.fallback_channel.clone(),
            "系统",
            ChannelKind::System,
        ));
    }
    defs
}
