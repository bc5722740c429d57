//! 工作流引擎
//!
//! 协调状态机、请求聚合、症状采集和远程分诊服务，是前端唯一需要驱动的对象。
//! 所有状态都放在 [`IntakeSession`] 中，重新开始评估时整体替换。

use serde::Serialize;
use tracing::{debug, info, warn};
use triage_client::TriageService;
use triage_core::{PatientRecord, Result, SymptomAssessment, TriageError, TriageRequest, TriageResult};
use uuid::Uuid;

use crate::{
    aggregator::aggregate,
    assessment::{AssessmentMethod, AssessmentSelector},
    classifier::{classify, SeverityTier},
    state_machine::{IntakeEvent, IntakeStateMachine, IntakeStep},
};

/// 提交未完成就被放弃时记录的提示
pub const SUBMISSION_CANCELLED: &str = "Triage submission was cancelled before the service answered";

/// 一次分诊评估的全部状态
#[derive(Debug, Clone)]
pub struct IntakeSession {
    pub session_id: Uuid,
    pub step: IntakeStep,
    pub patient: Option<PatientRecord>,
    pub assessment: Option<SymptomAssessment>,
    pub result: Option<TriageResult>,
    pub capture: AssessmentSelector,
    pub submitting: bool,
    pub last_error: Option<String>,
}

impl IntakeSession {
    pub fn new(method: AssessmentMethod) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            step: IntakeStep::PatientInfo,
            patient: None,
            assessment: None,
            result: None,
            capture: AssessmentSelector::new(method),
            submitting: false,
            last_error: None,
        }
    }
}

impl Default for IntakeSession {
    fn default() -> Self {
        Self::new(AssessmentMethod::default())
    }
}

/// 供前端展示的流程快照
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowOverview {
    pub session_id: Uuid,
    pub step: IntakeStep,
    pub progress_percent: u8,
    pub method: AssessmentMethod,
    pub submitting: bool,
    pub severity: Option<SeverityTier>,
    pub last_error: Option<String>,
}

/// 分诊工作流
#[derive(Debug)]
pub struct TriageWorkflow {
    state_machine: IntakeStateMachine,
    session: IntakeSession,
}

impl TriageWorkflow {
    pub fn new() -> Self {
        Self::with_method(AssessmentMethod::default())
    }

    pub fn with_method(method: AssessmentMethod) -> Self {
        let session = IntakeSession::new(method);
        info!("Started triage session {}", session.session_id);
        Self {
            state_machine: IntakeStateMachine::new(),
            session,
        }
    }

    pub fn session(&self) -> &IntakeSession {
        &self.session
    }

    pub fn session_id(&self) -> Uuid {
        self.session.session_id
    }

    pub fn step(&self) -> IntakeStep {
        self.session.step
    }

    pub fn patient(&self) -> Option<&PatientRecord> {
        self.session.patient.as_ref()
    }

    pub fn assessment(&self) -> Option<&SymptomAssessment> {
        self.session.assessment.as_ref()
    }

    pub fn result(&self) -> Option<&TriageResult> {
        self.session.result.as_ref()
    }

    pub fn is_submitting(&self) -> bool {
        self.session.submitting
    }

    /// 最近一次失败的提示信息
    pub fn last_error(&self) -> Option<&str> {
        self.session.last_error.as_deref()
    }

    /// 当前结果的严重程度
    pub fn severity(&self) -> Option<SeverityTier> {
        self.session.result.as_ref().map(|r| classify(&r.triage_category))
    }

    pub fn progress_percent(&self) -> u8 {
        self.session.step.progress_percent()
    }

    pub fn method(&self) -> AssessmentMethod {
        self.session.capture.method()
    }

    pub fn capture(&self) -> &AssessmentSelector {
        &self.session.capture
    }

    /// 采集过程中的编辑（填写问卷、发送对话）直接作用在当前采集方式上
    pub fn capture_mut(&mut self) -> &mut AssessmentSelector {
        &mut self.session.capture
    }

    pub fn overview(&self) -> WorkflowOverview {
        WorkflowOverview {
            session_id: self.session.session_id,
            step: self.session.step,
            progress_percent: self.progress_percent(),
            method: self.method(),
            submitting: self.session.submitting,
            severity: self.severity(),
            last_error: self.session.last_error.clone(),
        }
    }

    /// 第一步：提交患者信息
    pub fn submit_patient(&mut self, record: PatientRecord) -> Result<IntakeStep> {
        let next = self
            .state_machine
            .transition(self.session.step, IntakeEvent::PatientSubmitted)?;

        if let Err(e) = record.validate() {
            debug!("Patient record rejected: {}", e);
            self.session.last_error = Some(e.to_string());
            return Err(e);
        }

        info!("Session {} captured patient information", self.session.session_id);
        self.session.patient = Some(record);
        self.session.last_error = None;
        self.session.step = next;
        Ok(next)
    }

    /// 切换症状采集方式，不改变当前步骤
    pub fn select_method(&mut self, method: AssessmentMethod) -> Result<bool> {
        if self.session.submitting {
            return Err(TriageError::SubmissionInFlight);
        }
        Ok(self.session.capture.select(method))
    }

    /// 校验并聚合症状评估，进入提交中状态，返回待发送的请求
    pub fn begin_submission(&mut self, assessment: SymptomAssessment) -> Result<TriageRequest> {
        if self.session.submitting {
            return Err(TriageError::SubmissionInFlight);
        }
        if !self
            .state_machine
            .can_transition(self.session.step, IntakeEvent::TriageReceived)
        {
            return Err(TriageError::InvalidStateTransition {
                from: format!("{:?}", self.session.step),
                event: format!("{:?}", IntakeEvent::TriageReceived),
            });
        }
        let patient = self.session.patient.as_ref().ok_or_else(|| {
            TriageError::Unexpected("no patient information captured".to_string())
        })?;

        let request = match assessment.validate().and_then(|_| aggregate(patient, &assessment)) {
            Ok(request) => request,
            Err(e) => {
                debug!("Symptom assessment rejected: {}", e);
                self.session.last_error = Some(e.to_string());
                return Err(e);
            }
        };

        self.session.assessment = Some(assessment);
        self.session.submitting = true;
        self.session.last_error = None;
        Ok(request)
    }

    /// 应用服务返回的结果，结束提交中状态
    pub fn complete_submission(&mut self, outcome: Result<TriageResult>) -> Result<IntakeStep> {
        if !self.session.submitting {
            return Err(TriageError::InvalidStateTransition {
                from: format!("{:?}", self.session.step),
                event: format!("{:?}", IntakeEvent::TriageReceived),
            });
        }
        self.session.submitting = false;

        match outcome {
            Ok(result) => {
                let next = self
                    .state_machine
                    .transition(self.session.step, IntakeEvent::TriageReceived)?;
                info!(
                    "Session {} received triage category '{}'",
                    self.session.session_id, result.triage_category
                );
                self.session.result = Some(result);
                self.session.last_error = None;
                self.session.step = next;
                Ok(next)
            }
            Err(e) => {
                warn!("Session {} triage submission failed: {}", self.session.session_id, e);
                self.session.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// 放弃正在等待的提交，保留患者信息和症状评估
    ///
    /// 配合 `begin_submission`/`complete_submission` 使用；之后到达的结果会被拒绝。
    pub fn cancel_submission(&mut self) -> bool {
        if !self.session.submitting {
            return false;
        }
        release_submission(&mut self.session);
        true
    }

    /// 第二步：提交症状评估并等待分诊结果，每次调用只发送一个请求
    ///
    /// 调用方中途丢弃该 future（超时、`select!`）时，提交中状态会被清除，已采集的数据保持不变。
    pub async fn submit_symptoms(
        &mut self,
        assessment: SymptomAssessment,
        service: &dyn TriageService,
    ) -> Result<&TriageResult> {
        let request = self.begin_submission(assessment)?;
        debug!("Session {} submitting triage request", self.session.session_id);
        let outcome = {
            let mut guard = InFlightGuard {
                session: &mut self.session,
                armed: true,
            };
            let outcome = service.direct_triage(&request).await;
            guard.armed = false;
            outcome
        };
        self.complete_submission(outcome)?;

        self.session
            .result
            .as_ref()
            .ok_or_else(|| TriageError::Unexpected("triage result missing after submission".to_string()))
    }

    /// 由当前采集方式产出症状评估后提交
    pub async fn submit_capture(&mut self, service: &dyn TriageService) -> Result<&TriageResult> {
        let assessment = match self.session.capture.produce() {
            Ok(assessment) => assessment,
            Err(e) => {
                debug!("Capture could not produce an assessment: {}", e);
                self.session.last_error = Some(e.to_string());
                return Err(e);
            }
        };
        self.submit_symptoms(assessment, service).await
    }

    /// 返回第一步，丢弃症状评估和采集进度，保留患者信息
    pub fn back(&mut self) -> Result<IntakeStep> {
        if self.session.submitting {
            return Err(TriageError::SubmissionInFlight);
        }
        let previous = self
            .state_machine
            .transition(self.session.step, IntakeEvent::Back)?;

        let method = self.method();
        self.session.assessment = None;
        self.session.capture = AssessmentSelector::new(method);
        self.session.last_error = None;
        self.session.step = previous;
        Ok(previous)
    }

    /// 重新开始评估，所有状态一次性替换
    pub fn new_assessment(&mut self) -> Result<IntakeStep> {
        let next = self
            .state_machine
            .transition(self.session.step, IntakeEvent::NewAssessment)?;

        let previous = self.session.session_id;
        self.session = IntakeSession::new(self.method());
        info!("Session {} reset, new session {}", previous, self.session.session_id);
        Ok(next)
    }
}

impl Default for TriageWorkflow {
    fn default() -> Self {
        Self::new()
    }
}

fn release_submission(session: &mut IntakeSession) {
    warn!("Session {} abandoned its in-flight triage submission", session.session_id);
    session.submitting = false;
    session.last_error = Some(SUBMISSION_CANCELLED.to_string());
}

/// 等待服务应答期间持有会话，未解除时在析构中结束提交中状态
struct InFlightGuard<'a> {
    session: &'a mut IntakeSession,
    armed: bool,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if self.armed && self.session.submitting {
            release_submission(self.session);
        }
    }
}
