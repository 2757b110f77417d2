//! 任务跟踪协议中使用的 WebSocket 消息负载定义。
//!
//! 线上格式是以 `type` 字段区分的扁平 JSON 对象，例如
//! `{"type":"progress","jobId":"job-123","percent":50,"stage":"Analyzing"}`。
//! 入站消息 (`ServerMessage`) 的解码是穷尽且可失败的：未知或畸形的 `type`
//! 会得到可恢复的 `PayloadError`，调用方记录日志后丢弃即可。

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// 服务端可能推送的全部消息类型标签。
pub const PROGRESS_MESSAGE_TYPE: &str = "progress";
pub const COMPLETE_MESSAGE_TYPE: &str = "complete";
pub const ERROR_MESSAGE_TYPE: &str = "error";
pub const PONG_MESSAGE_TYPE: &str = "pong";
pub const SUBSCRIBED_MESSAGE_TYPE: &str = "subscribed";
pub const UNSUBSCRIBED_MESSAGE_TYPE: &str = "unsubscribed";

const KNOWN_SERVER_MESSAGE_TYPES: [&str; 6] = [
    PROGRESS_MESSAGE_TYPE,
    COMPLETE_MESSAGE_TYPE,
    ERROR_MESSAGE_TYPE,
    PONG_MESSAGE_TYPE,
    SUBSCRIBED_MESSAGE_TYPE,
    UNSUBSCRIBED_MESSAGE_TYPE,
];

/// 负载编解码错误。
#[derive(Error, Debug)]
pub enum PayloadError {
    /// 文本不是合法的 JSON。
    #[error("无效的 JSON 负载: {0}")]
    InvalidJson(#[source] serde_json::Error),

    /// JSON 对象缺少字符串类型的 `type` 字段。
    #[error("消息缺少 type 字段")]
    MissingType,

    /// `type` 字段的取值不在协议之内。
    #[error("未知的消息类型: '{0}'")]
    UnknownType(String),

    /// `type` 合法，但其余字段不符合该类型的结构。
    #[error("类型为 '{kind}' 的消息字段无效: {source}")]
    InvalidFields {
        kind: String,
        #[source]
        source: serde_json::Error,
    },

    /// 出站消息序列化失败。
    #[error("序列化控制消息失败: {0}")]
    Serialization(#[source] serde_json::Error),
}

/// 服务端推送给客户端的消息 (入站)。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    /// 任务进度更新。
    Progress {
        #[serde(rename = "jobId")]
        job_id: String,
        percent: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stage: Option<String>,
    },
    /// 任务成功完成。
    Complete {
        #[serde(rename = "jobId")]
        job_id: String,
        #[serde(rename = "downloadUrl", default, skip_serializing_if = "Option::is_none")]
        download_url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration: Option<f64>,
        #[serde(rename = "processingReport", default, skip_serializing_if = "Option::is_none")]
        processing_report: Option<Value>,
    },
    /// 任务失败。只影响该任务自身的结果，不影响共享连接。
    Error {
        #[serde(rename = "jobId")]
        job_id: String,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<Value>,
    },
    /// 心跳回复，仅用于确认连接存活。
    Pong {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<f64>,
    },
    /// 订阅确认。
    Subscribed {
        #[serde(rename = "jobId")]
        job_id: String,
    },
    /// 取消订阅确认。
    Unsubscribed {
        #[serde(rename = "jobId")]
        job_id: String,
    },
}

impl ServerMessage {
    /// 从一条文本帧解码入站消息。
    ///
    /// 先检查 `type` 标签，再按该类型解析其余字段，
    /// 这样日志里能区分 "未知类型" 与 "已知类型但字段错误"。
    pub fn decode(text: &str) -> Result<ServerMessage, PayloadError> {
        let value: Value = serde_json::from_str(text).map_err(PayloadError::InvalidJson)?;
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(PayloadError::MissingType)?
            .to_owned();
        if !KNOWN_SERVER_MESSAGE_TYPES.contains(&kind.as_str()) {
            return Err(PayloadError::UnknownType(kind));
        }
        serde_json::from_value(value).map_err(|source| PayloadError::InvalidFields { kind, source })
    }

    /// 消息的 `type` 标签。
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Progress { .. } => PROGRESS_MESSAGE_TYPE,
            ServerMessage::Complete { .. } => COMPLETE_MESSAGE_TYPE,
            ServerMessage::Error { .. } => ERROR_MESSAGE_TYPE,
            ServerMessage::Pong { .. } => PONG_MESSAGE_TYPE,
            ServerMessage::Subscribed { .. } => SUBSCRIBED_MESSAGE_TYPE,
            ServerMessage::Unsubscribed { .. } => UNSUBSCRIBED_MESSAGE_TYPE,
        }
    }

    /// 消息关联的任务 ID (心跳回复没有)。
    pub fn job_id(&self) -> Option<&str> {
        match self {
            ServerMessage::Progress { job_id, .. }
            | ServerMessage::Complete { job_id, .. }
            | ServerMessage::Error { job_id, .. }
            | ServerMessage::Subscribed { job_id }
            | ServerMessage::Unsubscribed { job_id } => Some(job_id),
            ServerMessage::Pong { .. } => None,
        }
    }
}

/// 客户端发给服务端的控制消息 (出站)。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    Subscribe {
        #[serde(rename = "jobId")]
        job_id: String,
    },
    Unsubscribe {
        #[serde(rename = "jobId")]
        job_id: String,
    },
    /// 心跳探测。
    Ping,
}

impl ClientMessage {
    pub fn subscribe(job_id: impl Into<String>) -> Self {
        ClientMessage::Subscribe { job_id: job_id.into() }
    }

    pub fn unsubscribe(job_id: impl Into<String>) -> Self {
        ClientMessage::Unsubscribe { job_id: job_id.into() }
    }

    /// 序列化为一条文本帧。
    pub fn encode(&self) -> Result<String, PayloadError> {
        serde_json::to_string(self).map_err(PayloadError::Serialization)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_progress_with_stage() {
        let msg = ServerMessage::decode(
            r#"{"type":"progress","jobId":"job-123","percent":50,"stage":"Analyzing"}"#,
        )
        .expect("progress 消息应能解码");
        assert_eq!(
            msg,
            ServerMessage::Progress {
                job_id: "job-123".to_string(),
                percent: 50.0,
                stage: Some("Analyzing".to_string()),
            }
        );
        assert_eq!(msg.kind(), PROGRESS_MESSAGE_TYPE);
        assert_eq!(msg.job_id(), Some("job-123"));
    }

    #[test]
    fn test_decode_complete_with_report() {
        let text = json!({
            "type": "complete",
            "jobId": "job-9",
            "downloadUrl": "/download/job-9",
            "duration": 12.5,
            "processingReport": {"lufs": -14.0}
        })
        .to_string();
        match ServerMessage::decode(&text).unwrap() {
            ServerMessage::Complete { job_id, download_url, duration, processing_report } => {
                assert_eq!(job_id, "job-9");
                assert_eq!(download_url.as_deref(), Some("/download/job-9"));
                assert_eq!(duration, Some(12.5));
                assert_eq!(processing_report, Some(json!({"lufs": -14.0})));
            }
            other => panic!("解码结果类型错误: {:?}", other),
        }
    }

    #[test]
    /// error 消息的 code 既可能是字符串也可能是数字。
    fn test_decode_error_accepts_any_code() {
        let msg = ServerMessage::decode(r#"{"type":"error","jobId":"j","message":"boom","code":500}"#).unwrap();
        assert_eq!(
            msg,
            ServerMessage::Error { job_id: "j".into(), message: "boom".into(), code: Some(json!(500)) }
        );
        let msg = ServerMessage::decode(r#"{"type":"error","jobId":"j","message":"boom"}"#).unwrap();
        assert_eq!(msg.kind(), ERROR_MESSAGE_TYPE);
    }

    #[test]
    fn test_decode_pong_without_timestamp() {
        let msg = ServerMessage::decode(r#"{"type":"pong"}"#).unwrap();
        assert_eq!(msg, ServerMessage::Pong { timestamp: None });
        assert_eq!(msg.job_id(), None);
    }

    #[test]
    fn test_decode_rejects_malformed_payloads() {
        assert!(matches!(ServerMessage::decode("not json"), Err(PayloadError::InvalidJson(_))));
        assert!(matches!(ServerMessage::decode(r#"{"jobId":"x"}"#), Err(PayloadError::MissingType)));
        assert!(matches!(
            ServerMessage::decode(r#"{"type":"teleport","jobId":"x"}"#),
            Err(PayloadError::UnknownType(kind)) if kind == "teleport"
        ));
        // 已知类型但缺少必需字段
        assert!(matches!(
            ServerMessage::decode(r#"{"type":"progress","jobId":"x"}"#),
            Err(PayloadError::InvalidFields { kind, .. }) if kind == "progress"
        ));
    }

    #[test]
    fn test_encode_control_messages() {
        let subscribe: Value = serde_json::from_str(&ClientMessage::subscribe("job-1").encode().unwrap()).unwrap();
        assert_eq!(subscribe, json!({"type": "subscribe", "jobId": "job-1"}));

        let unsubscribe: Value = serde_json::from_str(&ClientMessage::unsubscribe("job-1").encode().unwrap()).unwrap();
        assert_eq!(unsubscribe, json!({"type": "unsubscribe", "jobId": "job-1"}));

        let ping: Value = serde_json::from_str(&ClientMessage::Ping.encode().unwrap()).unwrap();
        assert_eq!(ping, json!({"type": "ping"}));
    }
}
