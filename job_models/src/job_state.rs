//! 按任务 ID 维护的进度与结果模型。
//!
//! 这些结构体是展示层读取的只读数据，由任务跟踪客户端根据入站消息更新。

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 单个任务的进度。`percent` 始终位于 `[0, 100]`。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct JobProgress {
    pub percent: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
}

impl JobProgress {
    /// 创建进度记录，超出范围的百分比会被截断到 `[0, 100]`。
    pub fn new(percent: f64, stage: Option<String>) -> Self {
        let percent = if percent.is_nan() { 0.0 } else { percent.clamp(0.0, 100.0) };
        Self { percent, stage }
    }

    /// 刚发起订阅、尚未收到任何服务端消息时的进度。
    pub fn pending() -> Self {
        Self::default()
    }

    /// 任务完成时强制写入的进度。
    pub fn completed() -> Self {
        Self { percent: 100.0, stage: None }
    }
}

/// 单个任务的最终结果。收到 complete 或 error 消息之前不存在。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_report: Option<Value>,
    /// 服务端报告的处理耗时 (秒)。
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

impl JobResult {
    pub fn succeeded(
        download_url: Option<String>,
        processing_report: Option<Value>,
        duration: Option<f64>,
    ) -> Self {
        Self { success: true, download_url, error: None, processing_report, duration }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            download_url: None,
            error: Some(message.into()),
            processing_report: None,
            duration: None,
        }
    }
}

/// 针对单个任务的只读视图，未知任务回落为 `{percent: 0}` 且无结果。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct JobView {
    pub progress: JobProgress,
    pub result: Option<JobResult>,
}

impl JobView {
    /// 任务是否已经有了最终结果 (成功或失败)。
    pub fn is_finished(&self) -> bool {
        self.result.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_percent_is_clamped() {
        assert_eq!(JobProgress::new(150.0, None).percent, 100.0);
        assert_eq!(JobProgress::new(-3.0, None).percent, 0.0);
        assert_eq!(JobProgress::new(f64::NAN, None).percent, 0.0);
        assert_eq!(JobProgress::new(42.5, Some("Mixing".into())).stage.as_deref(), Some("Mixing"));
    }

    #[test]
    fn test_result_serializes_camel_case() {
        let result = JobResult::succeeded(Some("/d/1".into()), None, None);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json, serde_json::json!({"success": true, "downloadUrl": "/d/1"}));

        let failed = JobResult::failed("decoder crashed");
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("decoder crashed"));
    }

    #[test]
    fn test_default_view_is_unknown_job() {
        let view = JobView::default();
        assert_eq!(view.progress, JobProgress::pending());
        assert!(!view.is_finished());
    }
}
