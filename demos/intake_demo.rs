//! 分诊评估演示程序
//!
//! 连接本地分诊服务，完整走一遍三步流程：
//! - 服务探活
//! - 患者信息与症状评估提交
//! - 结果分级展示

use anyhow::{Context, Result};
use meditriage::client::{ApiClient, ClientConfig, HealthMonitor};
use meditriage::core::{ApiStatus, PatientRecord, Severity, SymptomAssessment};
use meditriage::workflow::TriageWorkflow;
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter("info")
        .init();

    info!("🚀 启动分诊评估演示");

    let config = ClientConfig::load(None).context("加载客户端配置失败")?;
    let client = Arc::new(ApiClient::new(&config)?);

    // 服务探活
    let monitor = Arc::new(HealthMonitor::from_config(client.clone(), &config.health));
    if monitor.spawn_initial_probe().await? != ApiStatus::Online {
        warn!("❌ {}", monitor.offline_message());
        return Ok(());
    }
    info!("✅ 分诊服务在线: {}", client.origin());

    demo_direct_triage(&client).await?;

    info!("✅ 分诊评估演示完成");
    Ok(())
}

/// 结构化问卷流程演示
async fn demo_direct_triage(client: &ApiClient) -> Result<()> {
    info!("\n📋 结构化问卷流程");

    let mut workflow = TriageWorkflow::new();
    workflow.submit_patient(PatientRecord::new("Jane Doe", "34", "female"))?;
    info!("   步骤: {} ({}%)", workflow.step().title(), workflow.progress_percent());

    let mut assessment = SymptomAssessment {
        chief_complaint: "fever and cough".to_string(),
        duration_days: "3".to_string(),
        ..Default::default()
    };
    assessment.symptoms.fever = Severity::Moderate;
    assessment.symptoms.cough = Severity::Mild;
    assessment.vitals.temperature = Some("38.2".to_string());

    match workflow.submit_symptoms(assessment, client).await {
        Ok(result) => {
            info!("✅ 分诊结果: {}", result.triage_category);
            info!("   建议: {}", result.recommendation);
            info!("   说明: {}", result.explanation);
            if let Some(tier) = workflow.severity() {
                info!("   等级: {} ({})", tier.label(), tier.accent().as_str());
            }
        }
        Err(e) => {
            warn!("❌ 提交失败: {}", e);
        }
    }

    workflow.new_assessment()?;
    info!("   已重新开始，新会话 {}", workflow.session_id());
    Ok(())
}
