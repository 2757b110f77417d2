//! `rust_websocket_utils` 是任务跟踪客户端使用的 WebSocket 传输层 Crate。
//!
//! 它把一条双工、面向消息的网络连接包装成四种信号 (打开 / 消息 / 关闭 / 错误)，
//! 并通过 `Connector` / `TransportHandle` 两个 trait 暴露给上层编排器，
//! 这样编排器既可以使用基于 `tokio-tungstenite` 的真实实现，也可以在测试中注入模拟实现。
//!
//! 主要模块包括：
//! - `event`: 传输层信号 (`TransportSignal`, `TransportEvent`, `CloseInfo`)。
//! - `error`: 库中使用的错误类型 `WsError`。
//! - `client`: 客户端传输层实现 (`WsConnector`)。

pub mod client;
pub mod error;
pub mod event;

pub use client::transport::{Connector, SignalSender, TransportHandle, WsConnector, WsHandle};
pub use error::WsError;
pub use event::{CloseInfo, ConnectionId, TransportEvent, TransportSignal};
