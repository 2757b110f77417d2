// job_tracker/src/ws_client/store.rs

//! 任务状态存储：进度表与结果表，由入站消息驱动更新，供展示层读取。
//!
//! 除了点查询之外，还可以为单个任务获取一个自动更新的只读视图
//! (`tokio::sync::watch::Receiver<JobView>`)，未知任务回落为 `{percent: 0}` 且没有结果。

use job_models::{JobProgress, JobResult, JobView, ServerMessage};
use log::debug;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::watch;

#[derive(Debug, Default)]
pub struct JobStateStore {
    progress: HashMap<String, JobProgress>,
    results: HashMap<String, JobResult>,
    /// 按任务 ID 的实时视图发布端，只为被观察过的任务创建。
    watchers: HashMap<String, watch::Sender<JobView>>,
}

impl JobStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 发起订阅时为任务写入初始进度 `{percent: 0}`，已有进度时保持不变。
    pub fn seed(&mut self, job_id: &str) {
        if self.progress.contains_key(job_id) {
            return;
        }
        self.progress.insert(job_id.to_string(), JobProgress::pending());
        self.notify(job_id);
    }

    /// 把一条入站消息应用到存储上，返回状态是否发生变化。
    ///
    /// 心跳回复与订阅确认不改变任何状态。
    pub fn apply(&mut self, message: ServerMessage) -> bool {
        match message {
            ServerMessage::Progress { job_id, percent, stage } => self.update_progress(&job_id, percent, stage),
            ServerMessage::Complete { job_id, download_url, duration, processing_report } => {
                self.complete(&job_id, download_url, processing_report, duration);
                true
            }
            ServerMessage::Error { job_id, message, .. } => {
                self.fail(&job_id, message);
                true
            }
            ServerMessage::Pong { .. } | ServerMessage::Subscribed { .. } | ServerMessage::Unsubscribed { .. } => false,
        }
    }

    /// 更新进度。任务已经成功完成时忽略，保证 "成功 ⇒ 100%"。
    pub fn update_progress(&mut self, job_id: &str, percent: f64, stage: Option<String>) -> bool {
        if self.results.get(job_id).is_some_and(|r| r.success) {
            debug!("[任务状态] 任务 {} 已完成，忽略迟到的进度更新 ({}%)", job_id, percent);
            return false;
        }
        self.progress.insert(job_id.to_string(), JobProgress::new(percent, stage));
        self.notify(job_id);
        true
    }

    /// 记录成功结果，并把进度强制设为 100%。
    pub fn complete(
        &mut self,
        job_id: &str,
        download_url: Option<String>,
        processing_report: Option<Value>,
        duration: Option<f64>,
    ) {
        self.results.insert(
            job_id.to_string(),
            JobResult::succeeded(download_url, processing_report, duration),
        );
        self.progress.insert(job_id.to_string(), JobProgress::completed());
        self.notify(job_id);
    }

    /// 记录失败结果，进度保持不变。
    pub fn fail(&mut self, job_id: &str, message: impl Into<String>) {
        self.results.insert(job_id.to_string(), JobResult::failed(message));
        self.notify(job_id);
    }

    /// 同时删除任务的进度与结果。
    pub fn clear(&mut self, job_id: &str) {
        let had_progress = self.progress.remove(job_id).is_some();
        let had_result = self.results.remove(job_id).is_some();
        if had_progress || had_result {
            self.notify(job_id);
        } else if self.watchers.get(job_id).is_some_and(|s| s.receiver_count() == 0) {
            self.watchers.remove(job_id);
        }
    }

    pub fn progress(&self, job_id: &str) -> Option<&JobProgress> {
        self.progress.get(job_id)
    }

    pub fn result(&self, job_id: &str) -> Option<&JobResult> {
        self.results.get(job_id)
    }

    /// 单个任务的当前视图，未知任务得到默认视图。
    pub fn view(&self, job_id: &str) -> JobView {
        JobView {
            progress: self.progress.get(job_id).cloned().unwrap_or_default(),
            result: self.results.get(job_id).cloned(),
        }
    }

    /// 获取某个任务的实时视图。顺带清理接收端已全部释放的发布端。
    pub fn watch(&mut self, job_id: &str) -> watch::Receiver<JobView> {
        self.watchers.retain(|_, sender| sender.receiver_count() > 0);
        if let Some(sender) = self.watchers.get(job_id) {
            return sender.subscribe();
        }
        let (sender, receiver) = watch::channel(self.view(job_id));
        self.watchers.insert(job_id.to_string(), sender);
        receiver
    }

    fn notify(&mut self, job_id: &str) {
        let view = self.view(job_id);
        let abandoned = match self.watchers.get(job_id) {
            Some(sender) if sender.receiver_count() > 0 => {
                sender.send_replace(view);
                false
            }
            Some(_) => true,
            None => false,
        };
        if abandoned {
            self.watchers.remove(job_id);
        }
    }
}
