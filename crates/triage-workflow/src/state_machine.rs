//! 分诊流程状态机
//!
//! 管理一次分诊评估从患者信息到结果展示的步骤转换

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use triage_core::{Result, TriageError};

/// 流程步骤
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum IntakeStep {
    #[default]
    PatientInfo,
    SymptomCapture,
    Result,
}

impl IntakeStep {
    /// 步骤序号，从1开始
    pub fn number(self) -> u8 {
        match self {
            Self::PatientInfo => 1,
            Self::SymptomCapture => 2,
            Self::Result => 3,
        }
    }

    /// 步骤标题
    pub fn title(self) -> &'static str {
        match self {
            Self::PatientInfo => "Patient Information",
            Self::SymptomCapture => "Symptom Assessment",
            Self::Result => "Triage Result",
        }
    }

    /// 进度百分比
    pub fn progress_percent(self) -> u8 {
        (f64::from(self.number()) * 33.33).round() as u8
    }
}

/// 步骤转换事件
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum IntakeEvent {
    PatientSubmitted,
    TriageReceived,
    Back,
    NewAssessment,
}

/// 分诊流程状态机
#[derive(Debug)]
pub struct IntakeStateMachine {
    transitions: HashMap<(IntakeStep, IntakeEvent), IntakeStep>,
}

impl IntakeStateMachine {
    /// 创建新的状态机实例
    pub fn new() -> Self {
        let mut transitions = HashMap::new();

        transitions.insert((IntakeStep::PatientInfo, IntakeEvent::PatientSubmitted), IntakeStep::SymptomCapture);
        transitions.insert((IntakeStep::SymptomCapture, IntakeEvent::TriageReceived), IntakeStep::Result);
        transitions.insert((IntakeStep::SymptomCapture, IntakeEvent::Back), IntakeStep::PatientInfo);
        transitions.insert((IntakeStep::SymptomCapture, IntakeEvent::NewAssessment), IntakeStep::PatientInfo);
        transitions.insert((IntakeStep::Result, IntakeEvent::NewAssessment), IntakeStep::PatientInfo);

        Self { transitions }
    }

    /// 检查状态转换是否有效
    pub fn can_transition(&self, from: IntakeStep, event: IntakeEvent) -> bool {
        self.transitions.contains_key(&(from, event))
    }

    /// 执行状态转换
    pub fn transition(&self, from: IntakeStep, event: IntakeEvent) -> Result<IntakeStep> {
        match self.transitions.get(&(from, event)) {
            Some(to) => Ok(*to),
            None => Err(TriageError::InvalidStateTransition {
                from: format!("{:?}", from),
                event: format!("{:?}", event),
            }),
        }
    }

    /// 按顺序列出全部步骤
    pub fn all_steps() -> [IntakeStep; 3] {
        [IntakeStep::PatientInfo, IntakeStep::SymptomCapture, IntakeStep::Result]
    }

    /// 当前步骤允许的事件
    pub fn possible_events(&self, current: IntakeStep) -> Vec<IntakeEvent> {
        self.transitions
            .keys()
            .filter(|(step, _)| *step == current)
            .map(|(_, event)| *event)
            .collect()
    }
}

impl Default for IntakeStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        let sm = IntakeStateMachine::new();

        assert!(sm.can_transition(IntakeStep::PatientInfo, IntakeEvent::PatientSubmitted));
        assert!(sm.can_transition(IntakeStep::SymptomCapture, IntakeEvent::TriageReceived));
        assert!(sm.can_transition(IntakeStep::SymptomCapture, IntakeEvent::Back));
        assert!(sm.can_transition(IntakeStep::Result, IntakeEvent::NewAssessment));
    }

    #[test]
    fn test_invalid_transitions() {
        let sm = IntakeStateMachine::new();

        // 不能跳过症状评估
        assert!(!sm.can_transition(IntakeStep::PatientInfo, IntakeEvent::TriageReceived));
        // 结果页只能重新开始
        assert!(!sm.can_transition(IntakeStep::Result, IntakeEvent::Back));
        assert!(!sm.can_transition(IntakeStep::PatientInfo, IntakeEvent::Back));

        let err = sm
            .transition(IntakeStep::Result, IntakeEvent::PatientSubmitted)
            .unwrap_err();
        match err {
            TriageError::InvalidStateTransition { from, event } => {
                assert_eq!(from, "Result");
                assert_eq!(event, "PatientSubmitted");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_state_execution() {
        let sm = IntakeStateMachine::new();

        let step = sm
            .transition(IntakeStep::PatientInfo, IntakeEvent::PatientSubmitted)
            .unwrap();
        assert_eq!(step, IntakeStep::SymptomCapture);

        let step = sm.transition(step, IntakeEvent::TriageReceived).unwrap();
        assert_eq!(step, IntakeStep::Result);

        let step = sm.transition(step, IntakeEvent::NewAssessment).unwrap();
        assert_eq!(step, IntakeStep::PatientInfo);
    }

    #[test]
    fn test_possible_events() {
        let sm = IntakeStateMachine::new();
        let mut events = sm.possible_events(IntakeStep::SymptomCapture);
        events.sort_by_key(|e| format!("{:?}", e));
        assert_eq!(
            events,
            vec![IntakeEvent::Back, IntakeEvent::NewAssessment, IntakeEvent::TriageReceived]
        );
        assert_eq!(sm.possible_events(IntakeStep::Result), vec![IntakeEvent::NewAssessment]);
    }

    #[test]
    fn test_progress_percent() {
        assert_eq!(IntakeStep::PatientInfo.progress_percent(), 33);
        assert_eq!(IntakeStep::SymptomCapture.progress_percent(), 67);
        assert_eq!(IntakeStep::Result.progress_percent(), 100);
        assert_eq!(IntakeStateMachine::all_steps().len(), 3);
    }
}
