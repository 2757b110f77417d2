//! 通用枚举模块。
//!
//! 这些枚举会被序列化后交给展示层使用，因此统一派生
//! `Serialize`, `Deserialize`, `Debug`, `Clone`, `Copy`, `PartialEq`, `Eq`。

use serde::{Deserialize, Serialize};
use std::fmt;

/// 持久连接的生命周期状态。
///
/// 任一时刻只有一个取值有效，由连接编排器独占维护；
/// 展示层通常只关心派生出的 `is_connected()`。
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// 正在建立连接 (传输层已创建，尚未收到打开信号)。
    Connecting,
    /// 连接已打开，可以收发控制消息。
    Connected,
    /// 未连接。初始状态，也是主动断开或重连次数耗尽后的终态。
    #[default]
    Disconnected,
    /// 意外断开后，正在等待重连定时器触发。
    Reconnecting,
}

impl ConnectionState {
    /// 展示层使用的派生布尔值：仅 `Connected` 视为已连接。
    pub fn is_connected(self) -> bool {
        self == ConnectionState::Connected
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Reconnecting => "reconnecting",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    /// 只有 Connected 状态派生为已连接。
    fn test_connection_state_is_connected() {
        assert!(ConnectionState::Connected.is_connected());
        assert!(!ConnectionState::Connecting.is_connected());
        assert!(!ConnectionState::Reconnecting.is_connected());
        assert!(!ConnectionState::Disconnected.is_connected(), "Disconnected 不应被视为已连接");
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_connection_state_serializes_lowercase() {
        let json = serde_json::to_string(&ConnectionState::Reconnecting).unwrap();
        assert_eq!(json, "\"reconnecting\"");
        assert_eq!(ConnectionState::Connecting.to_string(), "connecting");
    }
}
