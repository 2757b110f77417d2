// job_tracker/src/config.rs

//! 任务跟踪客户端的配置管理模块。
//!
//! 配置以 JSON 文件保存 (默认 `config/job_tracker_config.json`)，所有字段都有默认值，
//! 文件中只需写出需要覆盖的部分。环境变量 `JOB_TRACKER_WS_URL` 可覆盖连接地址。

use crate::error::TrackerError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;
use url::Url;

/// 默认配置文件的相对路径。
pub const DEFAULT_CONFIG_PATH: &str = "config/job_tracker_config.json";
/// 覆盖 WebSocket 地址的环境变量名。
pub const WS_URL_ENV: &str = "JOB_TRACKER_WS_URL";
/// 既没有显式地址也没有页面来源时使用的地址。
pub const DEFAULT_WS_URL: &str = "ws://127.0.0.1:8088/ws";

/// 持久连接的重连退避参数。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ReconnectConfig {
    /// 第一次重连前的基础等待时间 (毫秒)，之后每次翻倍。
    pub base_delay_ms: u64,
    /// 单次等待时间的上限 (毫秒)，包含抖动。
    pub max_delay_ms: u64,
    /// 随机抖动的上界 (毫秒，不含)，抖动在 `[0, max_jitter_ms)` 内均匀分布。
    pub max_jitter_ms: u64,
    /// 连续重连次数达到此值后放弃，直到调用方手动 `connect()`。
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            max_jitter_ms: 1_000,
            max_attempts: 10,
        }
    }
}

/// 任务跟踪客户端配置。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct TrackerConfig {
    /// 显式指定的 WebSocket 地址，优先级最高。
    pub ws_url: Option<String>,
    /// 页面来源 (例如 `https://studio.example.com`)，用于推导同源的 WebSocket 地址。
    pub page_origin: Option<String>,
    /// 从页面来源推导地址时使用的路径。
    pub ws_path: String,
    /// 心跳探测的发送间隔 (毫秒)。
    pub heartbeat_interval_ms: u64,
    pub reconnect: ReconnectConfig,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            ws_url: None,
            page_origin: None,
            ws_path: "/ws".to_string(),
            heartbeat_interval_ms: 25_000,
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl TrackerConfig {
    /// 从默认路径加载配置，并应用环境变量覆盖。
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(DEFAULT_CONFIG_PATH))
    }

    /// 从指定路径加载配置，并应用环境变量覆盖。
    ///
    /// 文件不存在时使用默认配置；文件存在但无法读取或解析时返回带上下文的错误。
    pub fn load_from(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("无法读取配置文件 '{}'，请检查文件权限和路径", path.display()))?;
            let config: TrackerConfig = serde_json::from_str(&content).with_context(|| {
                format!(
                    "解析配置文件 '{}' 失败，请确保内容是有效的 JSON 且符合 {} 结构",
                    path.display(),
                    std::any::type_name::<TrackerConfig>()
                )
            })?;
            log::info!("[配置模块] 已从 '{}' 加载任务跟踪配置", path.display());
            config
        } else {
            log::info!("[配置模块] 配置文件 '{}' 不存在，使用默认配置", path.display());
            TrackerConfig::default()
        };
        config.validate().with_context(|| format!("配置文件 '{}' 中的取值无效", path.display()))?;
        Ok(config.with_ws_url_override(env::var(WS_URL_ENV).ok()))
    }

    /// 用外部提供的地址 (环境变量或命令行参数) 覆盖 `ws_url`，空字符串被忽略。
    pub fn with_ws_url_override(mut self, ws_url: Option<String>) -> Self {
        if let Some(url) = ws_url.filter(|u| !u.trim().is_empty()) {
            log::info!("[配置模块] WebSocket 地址被覆盖为 {}", url);
            self.ws_url = Some(url);
        }
        self
    }

    /// 检查取值是否可用。心跳间隔为 0 会让探测在每次循环中立即到期。
    pub fn validate(&self) -> Result<(), TrackerError> {
        if self.heartbeat_interval_ms == 0 {
            return Err(TrackerError::Config("heartbeat_interval_ms 必须大于 0".to_string()));
        }
        if self.reconnect.max_delay_ms < self.reconnect.base_delay_ms {
            return Err(TrackerError::Config(format!(
                "reconnect.max_delay_ms ({}) 不能小于 reconnect.base_delay_ms ({})",
                self.reconnect.max_delay_ms, self.reconnect.base_delay_ms
            )));
        }
        Ok(())
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// 解析最终使用的 WebSocket 地址。
    ///
    /// 优先级：显式地址 > 由页面来源推导 (`http→ws`, `https→wss`) > 默认地址。
    pub fn resolve_endpoint(&self) -> Result<String, TrackerError> {
        if let Some(url) = self.ws_url.as_deref().filter(|u| !u.trim().is_empty()) {
            return Ok(url.to_string());
        }
        let Some(origin) = self.page_origin.as_deref() else {
            return Ok(DEFAULT_WS_URL.to_string());
        };

        let mut url = Url::parse(origin)
            .map_err(|e| TrackerError::Config(format!("无效的页面来源 '{}': {}", origin, e)))?;
        let ws_scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => {
                return Err(TrackerError::Config(format!(
                    "无法从协议 '{}' 推导 WebSocket 地址 (来源: '{}')",
                    other, origin
                )))
            }
        };
        url.set_scheme(ws_scheme)
            .map_err(|_| TrackerError::Config(format!("无法为 '{}' 设置协议 {}", origin, ws_scheme)))?;
        url.set_path(&self.ws_path);
        url.set_query(None);
        url.set_fragment(None);
        Ok(url.to_string())
    }
}
