// job_tracker/src/main.rs

//! `job-watch`：在终端中跟踪一个或多个任务直到它们结束。

use anyhow::{Context, Result};
use clap::Parser;
use job_tracker::config::{TrackerConfig, DEFAULT_CONFIG_PATH, WS_URL_ENV};
use job_tracker::spawn_tracker;
use job_models::JobView;
use log::{error, info, warn, LevelFilter};
use rust_websocket_utils::WsConnector;
use std::path::PathBuf;
use tokio::task::JoinSet;

/// 订阅任务并输出其进度，直到全部任务得到结果。
#[derive(Parser, Debug)]
#[command(name = "job-watch", version, about)]
struct Args {
    /// WebSocket 地址，优先于配置文件。
    #[arg(long, env = WS_URL_ENV)]
    url: Option<String>,

    /// 页面来源，用于推导同源的 WebSocket 地址 (例如 https://studio.example.com)。
    #[arg(long)]
    origin: Option<String>,

    /// 配置文件路径。
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// 需要跟踪的任务 ID。
    #[arg(required = true)]
    job_ids: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // 默认级别为 Info，本项目各 crate 的日志级别设置为 Debug
    env_logger::Builder::new()
        .filter_level(LevelFilter::Info)
        .filter_module("job_tracker", LevelFilter::Debug)
        .filter_module("rust_websocket_utils", LevelFilter::Debug)
        .parse_default_env()
        .try_init()
        .context("初始化 env_logger 日志服务失败 (job-watch)")?;

    let args = Args::parse();
    let mut config = TrackerConfig::load_from(&args.config)?.with_ws_url_override(args.url);
    if args.origin.is_some() {
        config.page_origin = args.origin;
    }

    let (tracker, driver) = spawn_tracker(config, WsConnector::new()).context("启动任务跟踪客户端失败")?;

    let mut watchers = JoinSet::new();
    for job_id in &args.job_ids {
        tracker.subscribe(job_id.as_str())?;
        let mut view = tracker.watch_job(job_id.as_str()).await?;
        let job_id = job_id.clone();
        watchers.spawn(async move {
            loop {
                let snapshot: JobView = view.borrow_and_update().clone();
                report(&job_id, &snapshot);
                if snapshot.is_finished() || view.changed().await.is_err() {
                    return snapshot;
                }
            }
        });
    }

    let mut status = tracker.status();
    let status_logger = tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let current = status.borrow_and_update().clone();
            match current.last_error {
                Some(reason) => warn!("[job-watch] 连接状态: {} ({})", current.state, reason),
                None => info!("[job-watch] 连接状态: {}", current.state),
            }
        }
    });

    tracker.connect()?;

    let mut failed = 0usize;
    tokio::select! {
        _ = async {
            while let Some(joined) = watchers.join_next().await {
                match joined {
                    Ok(view) if view.result.as_ref().is_some_and(|r| !r.success) => failed += 1,
                    Ok(_) => {}
                    Err(e) => error!("[job-watch] 任务观察协程异常结束: {}", e),
                }
            }
        } => info!("[job-watch] 所有任务均已结束"),
        _ = tokio::signal::ctrl_c() => warn!("[job-watch] 收到中断信号，停止跟踪"),
    }

    tracker.disconnect()?;
    drop(tracker);
    status_logger.abort();
    driver.await.context("等待任务跟踪客户端退出失败")?;

    if failed > 0 {
        anyhow::bail!("{} 个任务失败", failed);
    }
    Ok(())
}

fn report(job_id: &str, view: &JobView) {
    match &view.result {
        Some(result) if result.success => info!(
            "[job-watch] 任务 {} 完成，下载地址: {}",
            job_id,
            result.download_url.as_deref().unwrap_or("-")
        ),
        Some(result) => error!(
            "[job-watch] 任务 {} 失败: {}",
            job_id,
            result.error.as_deref().unwrap_or("未知错误")
        ),
        None => info!(
            "[job-watch] 任务 {}: {:.0}%{}",
            job_id,
            view.progress.percent,
            view.progress.stage.as_deref().map(|s| format!(" ({})", s)).unwrap_or_default()
        ),
    }
}
