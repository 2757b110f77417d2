// job_tracker/src/event.rs

//! 提供给展示层的事件负载定义。

use chrono::{DateTime, Utc};
use job_models::ConnectionState;
use serde::Serialize;

/// 连接状态快照。
///
/// 每次状态机完成一次转换后都会发布一份新的快照，
/// 展示层通过 `JobTrackerHandle::status()` 订阅它即可实时更新界面。
#[derive(Clone, Serialize, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    /// 由 `state` 派生，仅在 `Connected` 时为 `true`。
    pub is_connected: bool,
    /// 最近一次连接级别的错误，连接成功后清空。
    pub last_error: Option<String>,
    /// 当前连接生命周期内已经执行的重连次数。
    pub reconnect_attempts: u32,
    /// 最近一次收到心跳回复的时间，仅供展示，不参与断线判断。
    pub last_pong_at: Option<DateTime<Utc>>,
}
