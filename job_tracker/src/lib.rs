//! 长时间运行的服务端任务的实时跟踪客户端。
//!
//! 通过一条持久 WebSocket 连接订阅任务，把服务端推送的进度与结果整理成
//! 按任务 ID 查询的只读状态，并在连接中断后自动重连、重放订阅。

// --- 公开模块声明 ---
pub mod config; // 客户端配置加载与连接地址解析。
pub mod error; // 客户端错误类型。
pub mod event; // 提供给展示层的状态负载。
pub mod ws_client; // 连接编排器及其组件。

pub use config::TrackerConfig;
pub use error::TrackerError;
pub use event::ConnectionStatus;
pub use ws_client::{global_tracker, spawn_tracker, JobTrackerCore, JobTrackerHandle};
