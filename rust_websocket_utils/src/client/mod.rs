// rust_websocket_utils/src/client/mod.rs

//! WebSocket 客户端模块。
//!
//! `transport` 子模块封装了 `tokio-tungstenite` 的细节：
//! 同步地校验地址并派生连接任务，之后通过信号通道异步报告打开、消息、关闭与错误。

pub mod transport;
