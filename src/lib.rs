//! # MediTriage
//!
//! 分诊评估客户端的统一入口，重新导出各子模块。

pub use triage_client as client;
pub use triage_core as core;
pub use triage_workflow as workflow;
