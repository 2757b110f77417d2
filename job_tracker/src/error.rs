// job_tracker/src/error.rs

//! 任务跟踪客户端的错误类型。
//!
//! 连接层面的失败不会以 `Err` 的形式交给调用方，而是体现为
//! `ConnectionStatus` 中的状态与 `last_error`。这里只包含调用本身无法完成的情况。

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrackerError {
    /// 后台驱动任务已经结束，命令无法送达。
    #[error("任务跟踪服务未在运行")]
    NotRunning,

    /// 配置内容无法使用，例如无法从页面来源推导出 WebSocket 地址。
    #[error("配置错误: {0}")]
    Config(String),
}
