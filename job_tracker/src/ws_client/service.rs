// job_tracker/src/ws_client/service.rs

//! 连接编排器：单条持久连接的状态机。
//!
//! `JobTrackerCore` 把传输层、重连策略、订阅登记表、心跳与任务状态存储组合在一起。
//! 它本身不做任何等待：所有状态转换都由以下输入之一触发，并且每个输入都会被完整处理后才处理下一个：
//!
//! - 调用方命令：`connect` / `disconnect` / `subscribe` / `unsubscribe` / `clear_job`
//! - 传输层信号：`handle_signal` (打开、消息、关闭、错误)
//! - 两个定时器到期：`on_reconnect_timer` / `on_heartbeat_tick`
//!
//! 定时器只以截止时间的形式保存 (`reconnect_deadline` / `heartbeat_deadline`)，
//! 由外部驱动任务负责等待，取消定时器就是清空截止时间。
//! 每个传输实例都有唯一的 `ConnectionId`，来自已被替换实例的信号一律忽略。

use crate::config::TrackerConfig;
use crate::event::ConnectionStatus;
use crate::ws_client::heartbeat::HeartbeatMonitor;
use crate::ws_client::reconnect::{ReconnectPolicy, RetryDecision};
use crate::ws_client::registry::SubscriptionRegistry;
use crate::ws_client::store::JobStateStore;
use job_models::{ClientMessage, ConnectionState, JobProgress, JobResult, JobView, ServerMessage};
use log::{debug, error, info, warn};
use rust_websocket_utils::event::CLOSE_NORMAL;
use rust_websocket_utils::{CloseInfo, ConnectionId, Connector, SignalSender, TransportEvent, TransportHandle, TransportSignal};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

pub const CONNECTION_LOST_PREFIX: &str = "Connection lost";
pub const MAX_ATTEMPTS_REACHED: &str = "Max reconnection attempts reached";
pub const TRANSPORT_ERROR_MESSAGE: &str = "WebSocket connection error";

/// 已安排的重连定时器。
#[derive(Debug, Clone, Copy)]
struct PendingRetry {
    deadline: Instant,
    delay: Duration,
}

/// 当前被跟踪的传输实例。
struct ActiveTransport<H> {
    id: ConnectionId,
    handle: H,
}

pub struct JobTrackerCore<C: Connector> {
    url: String,
    connector: C,
    signal_tx: SignalSender,
    state: ConnectionState,
    reconnect_attempts: u32,
    last_error: Option<String>,
    transport: Option<ActiveTransport<C::Handle>>,
    next_connection_id: ConnectionId,
    retry: Option<PendingRetry>,
    policy: ReconnectPolicy,
    heartbeat: HeartbeatMonitor,
    registry: SubscriptionRegistry,
    store: JobStateStore,
    status_tx: watch::Sender<ConnectionStatus>,
}

impl<C: Connector> JobTrackerCore<C> {
    /// 创建编排器。`signal_tx` 会交给每个新打开的传输实例，驱动任务持有对应的接收端。
    pub fn new(config: &TrackerConfig, url: impl Into<String>, connector: C, signal_tx: SignalSender) -> Self {
        let (status_tx, _) = watch::channel(ConnectionStatus::default());
        Self {
            url: url.into(),
            connector,
            signal_tx,
            state: ConnectionState::Disconnected,
            reconnect_attempts: 0,
            last_error: None,
            transport: None,
            next_connection_id: 0,
            retry: None,
            policy: ReconnectPolicy::new(config.reconnect.clone()),
            heartbeat: HeartbeatMonitor::new(config.heartbeat_interval()),
            registry: SubscriptionRegistry::new(),
            store: JobStateStore::new(),
            status_tx,
        }
    }

    // ---------------------------------------------------------------------
    // 调用方命令
    // ---------------------------------------------------------------------

    /// 建立连接。已连接，或正在连接且传输实例仍然存活时为空操作。
    ///
    /// 从 `Disconnected` 手动连接会开始新的连接生命周期，重连计数归零。
    pub fn connect(&mut self) {
        match self.state {
            ConnectionState::Connected => {
                debug!("[任务跟踪] 已处于连接状态，忽略 connect()");
                return;
            }
            ConnectionState::Connecting if self.transport.is_some() => {
                debug!("[任务跟踪] 连接正在建立中，忽略 connect()");
                return;
            }
            ConnectionState::Disconnected => self.reconnect_attempts = 0,
            ConnectionState::Connecting | ConnectionState::Reconnecting => {}
        }
        self.open_transport();
        self.publish_status();
    }

    /// 主动断开。取消所有定时器，以正常关闭码关闭传输实例，并清空订阅登记表。
    pub fn disconnect(&mut self) {
        info!("[任务跟踪] 主动断开连接");
        self.retry = None;
        self.heartbeat.stop();
        if let Some(transport) = self.transport.take() {
            transport.handle.close(CLOSE_NORMAL, "Client disconnect");
        }
        self.registry.clear();
        self.state = ConnectionState::Disconnected;
        self.publish_status();
    }

    /// 订阅任务。未连接时订阅被推迟，连接建立后由重放步骤发送。
    pub fn subscribe(&mut self, job_id: &str) {
        self.registry.add(job_id);
        self.store.seed(job_id);
        if self.state.is_connected() {
            self.send(&ClientMessage::subscribe(job_id));
        } else {
            debug!("[任务跟踪] 尚未连接，任务 {} 的订阅将在连接建立后发送", job_id);
        }
    }

    /// 取消订阅，不影响该任务的进度与结果。
    pub fn unsubscribe(&mut self, job_id: &str) {
        self.registry.remove(job_id);
        if self.state.is_connected() {
            self.send(&ClientMessage::unsubscribe(job_id));
        }
    }

    /// 取消订阅并删除该任务的进度与结果。
    pub fn clear_job(&mut self, job_id: &str) {
        self.unsubscribe(job_id);
        self.store.clear(job_id);
    }

    // ---------------------------------------------------------------------
    // 传输层信号
    // ---------------------------------------------------------------------

    /// 处理一个传输层信号。来自非当前实例的信号被忽略。
    pub fn handle_signal(&mut self, signal: TransportSignal) {
        let current = self.transport.as_ref().map(|t| t.id);
        if current != Some(signal.connection_id) {
            debug!(
                "[任务跟踪] 忽略来自已替换连接实例 #{} 的信号 (当前: {:?}): {:?}",
                signal.connection_id, current, signal.event
            );
            return;
        }
        match signal.event {
            TransportEvent::Opened => self.on_open(),
            TransportEvent::Message(text) => self.on_message(&text),
            TransportEvent::Closed(info) => self.on_closed(info),
            TransportEvent::Error(detail) => self.on_error(&detail),
        }
        self.publish_status();
    }

    fn on_open(&mut self) {
        info!("[任务跟踪] 连接已建立: {}", self.url);
        self.state = ConnectionState::Connected;
        self.reconnect_attempts = 0;
        self.last_error = None;

        let mut replayed = 0usize;
        for job_id in self.registry.replay() {
            self.send(&ClientMessage::subscribe(job_id));
            replayed += 1;
        }
        if replayed > 0 {
            info!("[任务跟踪] 已重放 {} 个任务订阅", replayed);
        }
        self.heartbeat.start();
    }

    fn on_message(&mut self, text: &str) {
        let message = match ServerMessage::decode(text) {
            Ok(message) => message,
            Err(e) => {
                warn!("[任务跟踪] 丢弃无法解析的服务端消息: {}，原始内容: {}", e, text);
                return;
            }
        };
        debug!("[任务跟踪] 收到 '{}' 消息 (任务: {:?})", message.kind(), message.job_id());
        if let ServerMessage::Error { job_id, message, .. } = &message {
            warn!("[任务跟踪] 任务 {} 失败: {}", job_id, message);
        }
        match message {
            ServerMessage::Pong { .. } => self.heartbeat.record_pong(),
            other => {
                self.store.apply(other);
            }
        }
    }

    fn on_closed(&mut self, info: CloseInfo) {
        self.transport = None;
        self.heartbeat.stop();
        if info.is_clean() {
            info!("[任务跟踪] 连接已正常关闭 (code: {})", info.code);
            self.state = ConnectionState::Disconnected;
            return;
        }
        warn!("[任务跟踪] 连接意外断开 (code: {}, reason: '{}')", info.code, info.reason);
        self.last_error = Some(format!("{} (code: {})", CONNECTION_LOST_PREFIX, info.code));
        self.schedule_retry();
    }

    /// 只记录错误，状态转换由随后的关闭信号驱动。
    fn on_error(&mut self, detail: &str) {
        error!("[任务跟踪] 传输层错误: {}", detail);
        self.last_error = Some(TRANSPORT_ERROR_MESSAGE.to_string());
    }

    // ---------------------------------------------------------------------
    // 定时器
    // ---------------------------------------------------------------------

    /// 重连定时器到期：计数加一并重新连接。
    pub fn on_reconnect_timer(&mut self) {
        let Some(retry) = self.retry.take() else {
            return;
        };
        self.reconnect_attempts += 1;
        info!(
            "[任务跟踪] 第 {}/{} 次重连 (等待了 {:?})",
            self.reconnect_attempts,
            self.policy.max_attempts(),
            retry.delay
        );
        self.open_transport();
        self.publish_status();
    }

    /// 心跳定时器到期：连接中则发送一次探测。
    pub fn on_heartbeat_tick(&mut self) {
        if self.heartbeat.on_tick() && self.state.is_connected() {
            self.send(&ClientMessage::Ping);
        }
    }

    pub fn reconnect_deadline(&self) -> Option<Instant> {
        self.retry.map(|r| r.deadline)
    }

    pub fn heartbeat_deadline(&self) -> Option<Instant> {
        self.heartbeat.next_due()
    }

    // ---------------------------------------------------------------------
    // 读取
    // ---------------------------------------------------------------------

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    pub fn current_connection_id(&self) -> Option<ConnectionId> {
        self.transport.as_ref().map(|t| t.id)
    }

    pub fn subscribed_jobs(&self) -> Vec<String> {
        self.registry.snapshot()
    }

    pub fn is_subscribed(&self, job_id: &str) -> bool {
        self.registry.contains(job_id)
    }

    pub fn progress(&self, job_id: &str) -> Option<JobProgress> {
        self.store.progress(job_id).cloned()
    }

    pub fn result(&self, job_id: &str) -> Option<JobResult> {
        self.store.result(job_id).cloned()
    }

    pub fn job_view(&self, job_id: &str) -> JobView {
        self.store.view(job_id)
    }

    pub fn watch_job(&mut self, job_id: &str) -> watch::Receiver<JobView> {
        self.store.watch(job_id)
    }

    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus {
            state: self.state,
            is_connected: self.state.is_connected(),
            last_error: self.last_error.clone(),
            reconnect_attempts: self.reconnect_attempts,
            last_pong_at: self.heartbeat.last_pong_at(),
        }
    }

    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_tx.subscribe()
    }

    /// 仅在快照变化时通知订阅者。
    pub fn publish_status(&self) {
        let status = self.status();
        self.status_tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }

    // ---------------------------------------------------------------------
    // 内部转换
    // ---------------------------------------------------------------------

    /// 丢弃旧实例并打开新的传输实例。同步失败时转入重连策略。
    fn open_transport(&mut self) {
        self.retry = None;
        if let Some(stale) = self.transport.take() {
            debug!("[任务跟踪] 丢弃旧的连接实例 #{}", stale.id);
            stale.handle.close(CLOSE_NORMAL, "Superseded");
        }
        self.state = ConnectionState::Connecting;
        self.last_error = None;

        self.next_connection_id += 1;
        let id = self.next_connection_id;
        match self.connector.open(&self.url, id, self.signal_tx.clone()) {
            Ok(handle) => {
                debug!("[任务跟踪] 连接实例 #{} 已创建，等待握手完成", id);
                self.transport = Some(ActiveTransport { id, handle });
            }
            Err(e) => {
                error!("[任务跟踪] 无法打开到 {} 的连接: {}", self.url, e);
                self.last_error = Some(format!("Failed to open connection: {}", e));
                self.state = ConnectionState::Disconnected;
                self.schedule_retry();
            }
        }
    }

    /// 按当前重连次数安排下一次重连，或在达到上限后放弃。
    fn schedule_retry(&mut self) {
        match self.policy.decide(self.reconnect_attempts) {
            RetryDecision::GiveUp => {
                warn!("[任务跟踪] 已重连 {} 次，放弃自动重连", self.reconnect_attempts);
                self.retry = None;
                self.state = ConnectionState::Disconnected;
                self.last_error = Some(MAX_ATTEMPTS_REACHED.to_string());
            }
            RetryDecision::Retry(delay) => {
                info!("[任务跟踪] {:?} 后尝试重连 (已重连 {} 次)", delay, self.reconnect_attempts);
                self.state = ConnectionState::Reconnecting;
                self.retry = Some(PendingRetry { deadline: Instant::now() + delay, delay });
            }
        }
    }

    fn send(&self, message: &ClientMessage) -> bool {
        let Some(transport) = self.transport.as_ref() else {
            debug!("[任务跟踪] 没有可用的连接实例，消息未发送: {:?}", message);
            return false;
        };
        let text = match message.encode() {
            Ok(text) => text,
            Err(e) => {
                error!("[任务跟踪] 序列化出站消息失败: {}", e);
                return false;
            }
        };
        match transport.handle.send_text(text) {
            Ok(()) => true,
            Err(e) => {
                warn!("[任务跟踪] 通过连接实例 #{} 发送消息失败: {}", transport.id, e);
                false
            }
        }
    }
}
