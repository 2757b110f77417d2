// job_tracker/src/ws_client/mod.rs

//! 任务跟踪的 WebSocket 客户端核心逻辑模块。
//!
//! 本模块维护一条与任务服务的持久连接，在其上复用所有任务的进度与结果通知，
//! 并在网络故障后透明地恢复连接和全部订阅，调用方无需感知断线。
//!
//! # 核心组件
//! - `service::JobTrackerCore`: 连接编排器状态机，所有状态转换都在这里。
//! - `runtime::JobTrackerHandle`: 驱动编排器的后台任务的句柄，供调用方使用。
//! - `reconnect` / `heartbeat` / `registry` / `store`: 编排器依赖的重连策略、心跳、订阅登记表与任务状态存储。

pub mod heartbeat;
pub mod reconnect;
pub mod registry;
pub mod runtime;
pub mod service;
pub mod store;

pub use runtime::{global_tracker, spawn_tracker, JobTrackerHandle};
pub use service::JobTrackerCore;
