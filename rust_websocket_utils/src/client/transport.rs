// rust_websocket_utils/src/client/transport.rs

//! 客户端 WebSocket 传输层核心逻辑。
//!
//! `Connector::open` 是同步的：它只校验 URL 并派生一个后台任务，真正的握手在任务中异步完成。
//! 后台任务把连接上发生的一切转成 `TransportSignal` 送入调用方提供的通道，
//! 调用方则通过返回的 `TransportHandle` 发送文本消息或请求关闭。

use crate::error::WsError;
use crate::event::{CloseInfo, ConnectionId, TransportEvent, TransportSignal, CLOSE_NO_STATUS};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tokio_tungstenite::{
    connect_async,
    tungstenite::protocol::frame::coding::CloseCode,
    tungstenite::protocol::{CloseFrame, Message},
    tungstenite::Error as TungsteniteError,
};
use url::Url;

/// 传输层信号的发送端，由上层编排器创建并在每次打开连接时传入。
pub type SignalSender = mpsc::UnboundedSender<TransportSignal>;

/// 能够打开新连接实例的工厂。
///
/// 编排器对它是泛型的，测试时可注入记录型的模拟实现。
pub trait Connector: Send + 'static {
    type Handle: TransportHandle;

    /// 打开一个新的连接实例。
    ///
    /// 返回 `Err` 表示同步的打开失败 (例如 URL 非法)，此时不会有任何信号发出。
    /// 返回 `Ok` 之后，该实例的所有事件都以 `connection_id` 标记送入 `signals`，
    /// 并且最终一定会发出一次 `TransportEvent::Closed`。
    fn open(
        &mut self,
        url: &str,
        connection_id: ConnectionId,
        signals: SignalSender,
    ) -> Result<Self::Handle, WsError>;
}

/// 对一个已打开连接实例的控制句柄。
pub trait TransportHandle: Send + 'static {
    /// 发送一条文本消息。
    fn send_text(&self, text: String) -> Result<(), WsError>;

    /// 以指定状态码请求关闭连接。不会阻塞。
    fn close(&self, code: u16, reason: &str);
}

/// 发往连接任务的指令。
#[derive(Debug)]
enum Outbound {
    Text(String),
    Close { code: u16, reason: String },
}

/// 本地发出关闭帧后等待对端完成关闭握手的默认时长。
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// 基于 `tokio-tungstenite` 的连接工厂。
#[derive(Debug, Clone)]
pub struct WsConnector {
    close_timeout: Duration,
}

impl Default for WsConnector {
    fn default() -> Self {
        Self { close_timeout: DEFAULT_CLOSE_TIMEOUT }
    }
}

impl WsConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置关闭握手的等待上限，超时后直接结束连接任务。
    pub fn with_close_timeout(mut self, close_timeout: Duration) -> Self {
        self.close_timeout = close_timeout;
        self
    }
}

impl Connector for WsConnector {
    type Handle = WsHandle;

    fn open(
        &mut self,
        url: &str,
        connection_id: ConnectionId,
        signals: SignalSender,
    ) -> Result<WsHandle, WsError> {
        let parsed_url = Url::parse(url)
            .map_err(|e| WsError::InvalidUrl(format!("无效的 WebSocket URL '{}': {}", url, e)))?;
        if !matches!(parsed_url.scheme(), "ws" | "wss") {
            return Err(WsError::InvalidUrl(format!(
                "WebSocket URL 必须以 ws:// 或 wss:// 开头，实际为 '{}'",
                url
            )));
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| WsError::NoRuntime)?;

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        info!("[传输层] 连接实例 #{} 开始连接到 {}", connection_id, parsed_url);
        runtime.spawn(run_connection(parsed_url, connection_id, self.close_timeout, outbound_rx, signals));
        Ok(WsHandle { connection_id, outbound: outbound_tx })
    }
}

/// `WsConnector` 打开的连接实例句柄。
///
/// 句柄被丢弃时，连接任务会以正常关闭码结束该连接。
#[derive(Debug)]
pub struct WsHandle {
    connection_id: ConnectionId,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl TransportHandle for WsHandle {
    fn send_text(&self, text: String) -> Result<(), WsError> {
        self.outbound
            .send(Outbound::Text(text))
            .map_err(|_| WsError::SendErrorClosed)
    }

    fn close(&self, code: u16, reason: &str) {
        if self
            .outbound
            .send(Outbound::Close { code, reason: reason.to_string() })
            .is_err()
        {
            debug!("[传输层] 连接实例 #{} 已结束，忽略关闭请求", self.connection_id);
        }
    }
}

fn emit(signals: &SignalSender, connection_id: ConnectionId, event: TransportEvent) {
    if signals.send(TransportSignal { connection_id, event }).is_err() {
        debug!("[传输层] 连接实例 #{} 的信号接收端已关闭，事件被丢弃", connection_id);
    }
}

/// 无截止时间时永远不会完成的等待。
async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn close_info_from_frame(frame: Option<CloseFrame<'_>>) -> CloseInfo {
    match frame {
        Some(frame) => CloseInfo::new(u16::from(frame.code), frame.reason.into_owned()),
        None => CloseInfo::new(CLOSE_NO_STATUS, ""),
    }
}

/// 单个连接实例的完整生命周期：握手、收发循环、关闭通知。
async fn run_connection(
    url: Url,
    connection_id: ConnectionId,
    close_timeout: Duration,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    signals: SignalSender,
) {
    let ws_stream = match connect_async(url.as_str()).await {
        Ok((ws_stream, response)) => {
            info!(
                "[传输层] 连接实例 #{} 已连接到 {} (HTTP 状态码: {})",
                connection_id,
                url,
                response.status()
            );
            ws_stream
        }
        Err(e) => {
            error!("[传输层] 连接实例 #{} 连接到 {} 失败: {}", connection_id, url, e);
            emit(&signals, connection_id, TransportEvent::Error(WsError::from(e).to_string()));
            emit(&signals, connection_id, TransportEvent::Closed(CloseInfo::abnormal()));
            return;
        }
    };
    emit(&signals, connection_id, TransportEvent::Opened);

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let mut received_close: Option<CloseInfo> = None;
    // 本地发出关闭帧后不再接受新的出站消息，但继续读取直到对端完成关闭握手或等待超时
    let mut outbound_open = true;
    let mut local_close: Option<(CloseInfo, Instant)> = None;

    loop {
        tokio::select! {
            command = outbound.recv(), if outbound_open => match command {
                Some(Outbound::Text(text)) => {
                    debug!("[传输层] 连接实例 #{} 发送消息: {}", connection_id, text);
                    if let Err(e) = ws_sender.send(Message::Text(text)).await {
                        warn!("[传输层] 连接实例 #{} 发送消息失败: {}", connection_id, e);
                        emit(&signals, connection_id, TransportEvent::Error(WsError::from(e).to_string()));
                    }
                }
                Some(Outbound::Close { code, reason }) => {
                    info!("[传输层] 连接实例 #{} 请求关闭 (code: {}, reason: '{}')", connection_id, code, reason);
                    outbound_open = false;
                    local_close = Some((CloseInfo::new(code, reason.clone()), Instant::now() + close_timeout));
                    let frame = CloseFrame { code: CloseCode::from(code), reason: reason.into() };
                    if let Err(e) = ws_sender.send(Message::Close(Some(frame))).await {
                        debug!("[传输层] 连接实例 #{} 发送关闭帧失败: {}", connection_id, e);
                        break;
                    }
                }
                None => {
                    debug!("[传输层] 连接实例 #{} 的句柄已被丢弃，正常关闭连接", connection_id);
                    outbound_open = false;
                    local_close = Some((CloseInfo::normal(""), Instant::now() + close_timeout));
                    let frame = CloseFrame { code: CloseCode::Normal, reason: "".into() };
                    if ws_sender.send(Message::Close(Some(frame))).await.is_err() {
                        break;
                    }
                }
            },
            incoming = ws_receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    debug!("[传输层] 连接实例 #{} 收到文本消息: '{}'", connection_id, text);
                    emit(&signals, connection_id, TransportEvent::Message(text));
                }
                Some(Ok(Message::Binary(bin))) => {
                    debug!("[传输层] 连接实例 #{} 收到非预期的二进制消息 ({} 字节)，已忽略", connection_id, bin.len());
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!("[传输层] 连接实例 #{} 收到关闭帧: {:?}", connection_id, frame);
                    received_close = Some(close_info_from_frame(frame));
                }
                // Ping/Pong 由 tungstenite 自动处理
                Some(Ok(_)) => {}
                Some(Err(TungsteniteError::ConnectionClosed | TungsteniteError::AlreadyClosed)) => break,
                Some(Err(e)) => {
                    warn!("[传输层] 连接实例 #{} 接收消息时发生错误: {}", connection_id, e);
                    emit(&signals, connection_id, TransportEvent::Error(WsError::from(e).to_string()));
                    break;
                }
                None => break,
            },
            _ = sleep_until_opt(local_close.as_ref().map(|(_, deadline)| *deadline)), if local_close.is_some() => {
                warn!(
                    "[传输层] 连接实例 #{} 在 {:?} 内未收到对端的关闭确认，直接结束连接",
                    connection_id, close_timeout
                );
                received_close = local_close.take().map(|(info, _)| info);
                break;
            }
        }
    }

    let close_info = received_close.unwrap_or_else(CloseInfo::abnormal);
    info!(
        "[传输层] 连接实例 #{} 已关闭 (code: {}, reason: '{}')",
        connection_id, close_info.code, close_info.reason
    );
    emit(&signals, connection_id, TransportEvent::Closed(close_info));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    /// URL 无法解析属于同步打开失败。
    fn test_open_rejects_unparseable_url() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let result = WsConnector::new().open("not a url", 1, tx);
        assert!(matches!(result, Err(WsError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_open_rejects_non_websocket_scheme() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let result = WsConnector::new().open("http://127.0.0.1:8088/ws", 1, tx);
        assert!(matches!(result, Err(WsError::InvalidUrl(_))));
        // 同步失败不会产生任何信号
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_open_requires_tokio_runtime() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let result = WsConnector::new().open("ws://127.0.0.1:8088/ws", 1, tx);
        assert!(matches!(result, Err(WsError::NoRuntime)));
    }

    #[test]
    fn test_close_frame_without_payload_maps_to_no_status() {
        assert_eq!(close_info_from_frame(None).code, CLOSE_NO_STATUS);
        let frame = CloseFrame { code: CloseCode::from(4001), reason: "restart".into() };
        assert_eq!(close_info_from_frame(Some(frame)), CloseInfo::new(4001, "restart"));
    }
}
