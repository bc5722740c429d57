//! # 分诊工作流模块
//!
//! 提供分诊评估的完整客户端流程，包括：
//! - 流程状态机：患者信息 → 症状评估 → 分诊结果
//! - 请求聚合：将两份表单合并为一次分诊请求
//! - 症状采集：结构化问卷或对话采集
//! - 结果分级：按分类文本确定展示的严重程度

pub mod aggregator;
pub mod assessment;
pub mod classifier;
pub mod engine;
pub mod state_machine;

// 重新导出主要类型
pub use aggregator::aggregate;
pub use assessment::{
    AssessmentCapture, AssessmentMethod, AssessmentSelector, ConversationalCapture, StructuredForm,
    CHAT_APOLOGY,
};
pub use classifier::{classify, Accent, SeverityTier, TierIcon};
pub use engine::{IntakeSession, TriageWorkflow, WorkflowOverview, SUBMISSION_CANCELLED};
pub use state_machine::{IntakeEvent, IntakeStateMachine, IntakeStep};
