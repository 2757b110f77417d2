// rust_websocket_utils/src/error.rs

//! 定义 WebSocket 传输层相关的错误类型。

use thiserror::Error;

/// WebSocket 传输层的统一错误类型。
#[derive(Error, Debug)]
pub enum WsError {
    /// 无效的 URL 格式，或不是 `ws://` / `wss://` 地址。
    /// 属于同步的打开失败，调用方应立即按连接失败处理。
    #[error("无效的URL: {0}")]
    InvalidUrl(String),

    /// 当前线程不在 Tokio 运行时中，无法派生连接任务。
    #[error("当前上下文没有可用的 Tokio 运行时")]
    NoRuntime,

    /// 当尝试向已经结束的连接任务发送消息时发生。
    #[error("发送错误: 通道已关闭")]
    SendErrorClosed,

    /// WebSocket 协议相关的错误，例如握手失败、连接被重置等。
    #[error("WebSocket协议错误: {0}")]
    WebSocketProtocolError(#[from] tokio_tungstenite::tungstenite::Error),
}
