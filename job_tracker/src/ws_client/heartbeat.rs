// job_tracker/src/ws_client/heartbeat.rs

//! 心跳监视器。
//!
//! 连接期间按固定间隔发送 `{"type":"ping"}`，防止中间设备因空闲而断开连接。
//! 它只是保活：收不到回复不会触发重连，重连完全由传输层的关闭信号驱动。
//! 收到的回复时间仅被记录下来供展示。

use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
pub struct HeartbeatMonitor {
    interval: Duration,
    /// 下一次发送探测的时间，`None` 表示未运行。
    next_due: Option<Instant>,
    last_pong_at: Option<DateTime<Utc>>,
}

impl HeartbeatMonitor {
    pub fn new(interval: Duration) -> Self {
        Self { interval, next_due: None, last_pong_at: None }
    }

    /// 连接打开后启动，第一次探测在一个间隔之后。
    pub fn start(&mut self) {
        self.next_due = Some(Instant::now() + self.interval);
        log::debug!("[心跳] 心跳已启动，间隔 {:?}", self.interval);
    }

    pub fn stop(&mut self) {
        if self.next_due.take().is_some() {
            log::debug!("[心跳] 心跳已停止");
        }
    }

    pub fn is_running(&self) -> bool {
        self.next_due.is_some()
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.next_due
    }

    /// 定时器到期。返回是否应当发送一次探测，并安排下一次。
    pub fn on_tick(&mut self) -> bool {
        if self.next_due.is_none() {
            return false;
        }
        self.next_due = Some(Instant::now() + self.interval);
        true
    }

    pub fn record_pong(&mut self) {
        self.last_pong_at = Some(Utc::now());
    }

    pub fn last_pong_at(&self) -> Option<DateTime<Utc>> {
        self.last_pong_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tick_only_fires_while_running() {
        let mut heartbeat = HeartbeatMonitor::new(Duration::from_secs(25));
        assert!(!heartbeat.on_tick(), "未启动时不应发送探测");

        heartbeat.start();
        let first_due = heartbeat.next_due().unwrap();
        assert!(heartbeat.on_tick());
        assert!(heartbeat.next_due().unwrap() >= first_due);

        heartbeat.stop();
        assert!(!heartbeat.is_running());
        assert!(!heartbeat.on_tick());
    }

    #[test]
    fn test_record_pong_sets_timestamp() {
        let mut heartbeat = HeartbeatMonitor::new(Duration::from_secs(1));
        assert!(heartbeat.last_pong_at().is_none());
        heartbeat.record_pong();
        assert!(heartbeat.last_pong_at().is_some());
    }
}
