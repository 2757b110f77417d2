// job_tracker/src/ws_client/runtime.rs

//! 编排器的异步驱动任务与对外句柄。
//!
//! `spawn_tracker` 派生一个独占 `JobTrackerCore` 的 tokio 任务，调用方命令、传输层信号
//! 与两个定时器都在同一个 `select!` 循环里依次处理，因此编排器状态不需要任何锁。
//! 所有 `JobTrackerHandle` 都被丢弃后，驱动任务执行一次 `disconnect()` 并退出。

use crate::config::TrackerConfig;
use crate::error::TrackerError;
use crate::event::ConnectionStatus;
use crate::ws_client::service::JobTrackerCore;
use job_models::{JobProgress, JobResult, JobView};
use log::{error, info};
use rust_websocket_utils::{Connector, WsConnector};
use std::sync::OnceLock;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

/// 发往驱动任务的命令。
enum Command {
    Connect,
    Disconnect,
    Subscribe(String),
    Unsubscribe(String),
    ClearJob(String),
    Progress(String, oneshot::Sender<Option<JobProgress>>),
    Result(String, oneshot::Sender<Option<JobResult>>),
    SubscribedJobs(oneshot::Sender<Vec<String>>),
    WatchJob(String, oneshot::Sender<watch::Receiver<JobView>>),
}

/// 任务跟踪客户端的句柄，可自由克隆并在任务间传递。
#[derive(Clone, Debug)]
pub struct JobTrackerHandle {
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<ConnectionStatus>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Connect => write!(f, "Connect"),
            Command::Disconnect => write!(f, "Disconnect"),
            Command::Subscribe(id) => write!(f, "Subscribe({})", id),
            Command::Unsubscribe(id) => write!(f, "Unsubscribe({})", id),
            Command::ClearJob(id) => write!(f, "ClearJob({})", id),
            Command::Progress(id, _) => write!(f, "Progress({})", id),
            Command::Result(id, _) => write!(f, "Result({})", id),
            Command::SubscribedJobs(_) => write!(f, "SubscribedJobs"),
            Command::WatchJob(id, _) => write!(f, "WatchJob({})", id),
        }
    }
}

/// 使用给定的连接工厂启动一个任务跟踪客户端。
///
/// 必须在 tokio 运行时中调用。返回的 `JoinHandle` 在所有句柄被丢弃、驱动任务完成清理后结束。
pub fn spawn_tracker<C: Connector>(
    config: TrackerConfig,
    connector: C,
) -> Result<(JobTrackerHandle, JoinHandle<()>), TrackerError> {
    config.validate()?;
    let url = config.resolve_endpoint()?;
    let runtime = tokio::runtime::Handle::try_current()
        .map_err(|_| TrackerError::Config("任务跟踪客户端必须在 tokio 运行时中启动".to_string()))?;

    let (signal_tx, signal_rx) = mpsc::unbounded_channel();
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    info!("[任务跟踪] 启动任务跟踪客户端，目标地址: {}", url);
    let core = JobTrackerCore::new(&config, url, connector, signal_tx);
    let status = core.watch_status();
    let driver = runtime.spawn(run_driver(core, command_rx, signal_rx));
    Ok((JobTrackerHandle { commands: command_tx, status }, driver))
}

/// 无截止时间时永远不会完成的等待。
async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn run_driver<C: Connector>(
    mut core: JobTrackerCore<C>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    mut signals: mpsc::UnboundedReceiver<rust_websocket_utils::TransportSignal>,
) {
    loop {
        let reconnect_at = core.reconnect_deadline();
        let heartbeat_at = core.heartbeat_deadline();
        tokio::select! {
            command = commands.recv() => match command {
                Some(command) => handle_command(&mut core, command),
                None => {
                    info!("[任务跟踪] 所有句柄均已释放，断开连接并结束驱动任务");
                    core.disconnect();
                    break;
                }
            },
            // core 持有 signal_tx，通道不会关闭
            Some(signal) = signals.recv() => core.handle_signal(signal),
            _ = sleep_until_opt(reconnect_at), if reconnect_at.is_some() => core.on_reconnect_timer(),
            _ = sleep_until_opt(heartbeat_at), if heartbeat_at.is_some() => core.on_heartbeat_tick(),
        }
    }
}

fn handle_command<C: Connector>(core: &mut JobTrackerCore<C>, command: Command) {
    match command {
        Command::Connect => core.connect(),
        Command::Disconnect => core.disconnect(),
        Command::Subscribe(job_id) => core.subscribe(&job_id),
        Command::Unsubscribe(job_id) => core.unsubscribe(&job_id),
        Command::ClearJob(job_id) => core.clear_job(&job_id),
        Command::Progress(job_id, reply) => {
            let _ = reply.send(core.progress(&job_id));
        }
        Command::Result(job_id, reply) => {
            let _ = reply.send(core.result(&job_id));
        }
        Command::SubscribedJobs(reply) => {
            let _ = reply.send(core.subscribed_jobs());
        }
        Command::WatchJob(job_id, reply) => {
            let _ = reply.send(core.watch_job(&job_id));
        }
    }
}

impl JobTrackerHandle {
    fn send(&self, command: Command) -> Result<(), TrackerError> {
        self.commands.send(command).map_err(|e| {
            error!("[任务跟踪] 驱动任务已结束，命令 {:?} 无法送达", e.0);
            TrackerError::NotRunning
        })
    }

    async fn query<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, TrackerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(build(reply_tx))?;
        reply_rx.await.map_err(|_| TrackerError::NotRunning)
    }

    pub fn connect(&self) -> Result<(), TrackerError> {
        self.send(Command::Connect)
    }

    pub fn disconnect(&self) -> Result<(), TrackerError> {
        self.send(Command::Disconnect)
    }

    pub fn subscribe(&self, job_id: impl Into<String>) -> Result<(), TrackerError> {
        self.send(Command::Subscribe(job_id.into()))
    }

    pub fn unsubscribe(&self, job_id: impl Into<String>) -> Result<(), TrackerError> {
        self.send(Command::Unsubscribe(job_id.into()))
    }

    pub fn clear_job(&self, job_id: impl Into<String>) -> Result<(), TrackerError> {
        self.send(Command::ClearJob(job_id.into()))
    }

    pub async fn progress(&self, job_id: impl Into<String>) -> Result<Option<JobProgress>, TrackerError> {
        let job_id = job_id.into();
        self.query(|reply| Command::Progress(job_id, reply)).await
    }

    pub async fn result(&self, job_id: impl Into<String>) -> Result<Option<JobResult>, TrackerError> {
        let job_id = job_id.into();
        self.query(|reply| Command::Result(job_id, reply)).await
    }

    pub async fn subscribed_jobs(&self) -> Result<Vec<String>, TrackerError> {
        self.query(Command::SubscribedJobs).await
    }

    /// 某个任务的实时只读视图。
    pub async fn watch_job(&self, job_id: impl Into<String>) -> Result<watch::Receiver<JobView>, TrackerError> {
        let job_id = job_id.into();
        self.query(|reply| Command::WatchJob(job_id, reply)).await
    }

    /// 连接状态的实时快照。
    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }

    pub fn current_status(&self) -> ConnectionStatus {
        self.status.borrow().clone()
    }

    /// 等待连接状态满足条件，返回满足条件时的快照。
    pub async fn wait_for_status<F>(&self, mut predicate: F) -> Result<ConnectionStatus, TrackerError>
    where
        F: FnMut(&ConnectionStatus) -> bool,
    {
        let mut status = self.status.clone();
        let snapshot = status.wait_for(|s| predicate(s)).await.map_err(|_| TrackerError::NotRunning)?;
        Ok(snapshot.clone())
    }
}

static GLOBAL_TRACKER: OnceLock<JobTrackerHandle> = OnceLock::new();

/// 进程范围内共享的任务跟踪客户端，首次调用时按默认配置文件创建。
///
/// 必须在 tokio 运行时中调用。实例在进程生命周期内一直存在，只能通过 `disconnect()` 断开。
/// 需要注入连接工厂或配置时请直接使用 `spawn_tracker`。
pub fn global_tracker() -> Result<JobTrackerHandle, TrackerError> {
    if let Some(handle) = GLOBAL_TRACKER.get() {
        return Ok(handle.clone());
    }
    let config = TrackerConfig::load().map_err(|e| TrackerError::Config(format!("{:#}", e)))?;
    let (handle, _driver) = spawn_tracker(config, WsConnector::new())?;
    // 并发初始化时只保留第一个实例，多余的句柄被丢弃后其驱动任务自行结束
    Ok(GLOBAL_TRACKER.get_or_init(|| handle).clone())
}
