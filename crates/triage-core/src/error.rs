//! 错误定义模块

use std::fmt;
use thiserror::Error;

/// 单个字段的校验失败
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

/// 表单级校验结果，保存所有失败字段
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    errors: Vec<FieldError>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: &'static str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.push(field, message);
        errors
    }

    pub fn push(&mut self, field: &'static str, message: impl Into<String>) {
        self.errors.push(FieldError {
            field,
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    /// 指定字段是否校验失败
    pub fn has_field(&self, field: &str) -> bool {
        self.errors.iter().any(|e| e.field == field)
    }

    /// 没有错误时返回 `Ok(())`
    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(TriageError::Validation(self))
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

/// 分诊客户端统一错误类型
#[derive(Error, Debug)]
pub enum TriageError {
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("Cannot connect to the backend server at {origin}. Please ensure the server is running.")]
    BackendUnreachable { origin: String },

    #[error("API Error ({status}): {detail}")]
    Service { status: u16, detail: String },

    #[error("{0}")]
    Unexpected(String),

    #[error("Invalid state transition: {event} is not allowed from {from}")]
    InvalidStateTransition { from: String, event: String },

    #[error("A triage request is already in progress")]
    SubmissionInFlight,

    #[error("Not enough information to complete the assessment (missing: {})", .missing.join(", "))]
    CaptureIncomplete { missing: Vec<String> },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl TriageError {
    /// 网络层错误可以由操作员重试
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::BackendUnreachable { .. } | Self::Service { .. }
        )
    }

    /// 本地校验错误，不会到达网络层
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

impl From<serde_json::Error> for TriageError {
    fn from(e: serde_json::Error) -> Self {
        Self::Unexpected(e.to_string())
    }
}

/// 分诊客户端统一结果类型
pub type Result<T> = std::result::Result<T, TriageError>;
