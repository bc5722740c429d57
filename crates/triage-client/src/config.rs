//! 客户端配置
//!
//! 配置来源依次为：内置默认值、可选配置文件、`TRIAGE_` 前缀环境变量。
//! `TRIAGE_API_URL`（或 `NEXT_PUBLIC_API_URL`）可直接覆盖服务地址。

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info};
use triage_core::{Result, TriageError};

/// 默认服务地址
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";

/// 默认探活超时（毫秒）
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 5000;

const ENV_PREFIX: &str = "TRIAGE";
const BASE_URL_OVERRIDES: [&str; 2] = ["TRIAGE_API_URL", "NEXT_PUBLIC_API_URL"];

/// 客户端完整配置
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// 服务接口配置
    pub api: ApiConfig,
    /// 探活配置
    pub health: HealthConfig,
    /// 重试配置
    pub retry: RetryConfig,
}

/// 服务接口配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
}

/// 探活配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// 单次探活超时
    pub probe_timeout_ms: u64,
    /// 后台轮询间隔，未设置时只在启动和手动重试时探活
    pub poll_interval_secs: Option<u64>,
}

/// 重试配置（只用于幂等的读取接口）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

type ValidationRule = (&'static str, fn(&ClientConfig) -> std::result::Result<(), String>);

const VALIDATION_RULES: &[ValidationRule] = &[
    ("api.base_url", validate_base_url),
    ("health.probe_timeout_ms", validate_probe_timeout),
    ("retry.max_attempts", validate_retry_attempts),
];

fn validate_base_url(config: &ClientConfig) -> std::result::Result<(), String> {
    let url = reqwest::Url::parse(&config.api.base_url)
        .map_err(|e| format!("'{}' is not a valid URL: {}", config.api.base_url, e))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(format!("unsupported scheme '{}'", other)),
    }
}

fn validate_probe_timeout(config: &ClientConfig) -> std::result::Result<(), String> {
    if config.health.probe_timeout_ms == 0 {
        Err("probe timeout cannot be 0".to_string())
    } else {
        Ok(())
    }
}

fn validate_retry_attempts(config: &ClientConfig) -> std::result::Result<(), String> {
    if config.retry.max_attempts == 0 {
        Err("at least one attempt is required".to_string())
    } else {
        Ok(())
    }
}

impl ClientConfig {
    /// 加载配置并校验
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let defaults = Self::default();
        let mut builder = Config::builder()
            .set_default("api.base_url", defaults.api.base_url.clone())
            .and_then(|b| b.set_default("health.probe_timeout_ms", defaults.health.probe_timeout_ms as i64))
            .and_then(|b| b.set_default("retry.max_attempts", defaults.retry.max_attempts as i64))
            .and_then(|b| b.set_default("retry.backoff_ms", defaults.retry.backoff_ms as i64))
            .map_err(config_error)?;

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__"),
        );

        let mut config: ClientConfig = builder
            .build()
            .and_then(|settings| settings.try_deserialize())
            .map_err(config_error)?;

        if let Some(base_url) = base_url_override() {
            config.api.base_url = base_url;
        }
        config.api.base_url = config.api.base_url.trim_end_matches('/').to_string();

        config.validate()?;
        info!("Client configuration loaded, backend at {}", config.api.base_url);
        Ok(config)
    }

    /// 只设置服务地址，其余取默认值
    pub fn with_base_url(base_url: &str) -> Self {
        let mut config = Self::default();
        config.api.base_url = base_url.trim_end_matches('/').to_string();
        config
    }

    /// 校验配置
    pub fn validate(&self) -> Result<()> {
        for (field, rule) in VALIDATION_RULES {
            if let Err(message) = rule(self) {
                error!("Configuration validation failed for {}: {}", field, message);
                return Err(TriageError::Config(format!("{}: {}", field, message)));
            }
        }
        Ok(())
    }
}

impl HealthConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn poll_interval(&self) -> Option<Duration> {
        self.poll_interval_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

impl RetryConfig {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            probe_timeout_ms: DEFAULT_PROBE_TIMEOUT_MS,
            poll_interval_secs: None,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 500,
        }
    }
}

fn base_url_override() -> Option<String> {
    BASE_URL_OVERRIDES
        .iter()
        .filter_map(|key| std::env::var(key).ok())
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

fn config_error(e: config::ConfigError) -> TriageError {
    TriageError::Config(e.to_string())
}
