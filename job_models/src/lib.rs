//! `job_models` 公共模型库 crate。
//!
//! 本 crate 集中定义了任务跟踪客户端 (`job_tracker`) 与 WebSocket 传输层之间共享的数据结构：
//! - **WebSocket 消息负载 (`ws_payloads`)**: 服务端推送的进度/完成/错误/心跳回复等消息，
//!   以及客户端发出的订阅/取消订阅/心跳探测控制消息。
//! - **任务状态 (`job_state`)**: 按任务 ID 维护的进度 (`JobProgress`) 与结果 (`JobResult`)。
//! - **通用枚举 (`enums`)**: 连接状态 (`ConnectionState`) 等。
//!
//! 所有模型都派生 `Serialize`/`Deserialize`/`Debug`/`Clone`，字段在线上使用 camelCase 命名。

pub mod enums;
pub mod job_state;
pub mod ws_payloads;

pub use enums::ConnectionState;
pub use job_state::{JobProgress, JobResult, JobView};
pub use ws_payloads::{ClientMessage, PayloadError, ServerMessage};
