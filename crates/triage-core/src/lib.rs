//! # Triage Core
//!
//! 分诊客户端的核心模块，提供数据模型、表单校验和统一错误定义。

pub mod error;
pub mod models;
pub mod validation;

pub use error::{FieldError, Result, TriageError, ValidationErrors};
pub use models::*;
