// rust_websocket_utils/src/event.rs

//! 传输层向上层发出的信号。
//!
//! 每个连接实例都有一个单调递增的 `ConnectionId`，所有信号都带着它。
//! 上层在替换连接实例后，可以据此忽略旧实例迟到的信号。

/// 连接实例的标识。
pub type ConnectionId = u64;

/// 正常关闭 (RFC 6455)。
pub const CLOSE_NORMAL: u16 = 1000;
/// 收到的关闭帧没有携带状态码。
pub const CLOSE_NO_STATUS: u16 = 1005;
/// 连接在没有关闭帧的情况下结束 (网络中断、握手失败等)。
pub const CLOSE_ABNORMAL: u16 = 1006;

/// 连接关闭的详细信息。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    pub code: u16,
    pub reason: String,
}

impl CloseInfo {
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self { code, reason: reason.into() }
    }

    pub fn normal(reason: impl Into<String>) -> Self {
        Self::new(CLOSE_NORMAL, reason)
    }

    /// 没有经过关闭握手就结束的连接。
    pub fn abnormal() -> Self {
        Self::new(CLOSE_ABNORMAL, "")
    }

    /// 只有状态码为 1000 的关闭才算干净关闭，其余一律视为意外断开。
    pub fn is_clean(&self) -> bool {
        self.code == CLOSE_NORMAL
    }
}

/// 单个连接实例上发生的事件。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// 握手完成，连接可用。
    Opened,
    /// 收到一条文本消息 (原始文本，尚未解码)。
    Message(String),
    /// 连接已结束。每个实例恰好发出一次，且总是最后一个事件。
    Closed(CloseInfo),
    /// 传输层错误。本身不代表连接结束，随后的 `Closed` 才驱动状态变化。
    Error(String),
}

/// 带有连接实例标识的事件。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportSignal {
    pub connection_id: ConnectionId,
    pub event: TransportEvent,
}
