//! # 分诊服务客户端
//!
//! 与远程分诊服务通信，包括：
//! - 接口定义与地址拼接
//! - 带错误分类的请求客户端
//! - 后端探活与手动重试
//! - 分层配置加载
//! - 幂等读取接口的重试策略

pub mod api;
pub mod client;
pub mod config;
pub mod health;
pub mod retry;

pub use api::{ApiEndpoints, Endpoint};
pub use client::{extract_error_detail, ApiClient, TriageService};
pub use config::{ApiConfig, ClientConfig, HealthConfig, RetryConfig};
pub use health::{HealthMonitor, LivenessProbe};
pub use retry::RetryPolicy;
