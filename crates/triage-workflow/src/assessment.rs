//! 症状采集方式
//!
//! 两种采集方式最终都产出同一个 [`SymptomAssessment`]：
//! - 结构化问卷：操作员逐项填写
//! - 对话采集：与远程助手对话，再从患者的描述中提取症状、病程和生命体征

use regex::Regex;
use std::sync::OnceLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use triage_client::TriageService;
use triage_core::{
    ChatMessage, ChatRole, ChatTriage, Result, Severity, SymptomAssessment, SymptomSeverities,
    TriageError, ValidationErrors, VitalSigns,
};
use triage_core::validation::MIN_CHIEF_COMPLAINT_LEN;

/// 对话失败时追加到记录中的提示
pub const CHAT_APOLOGY: &str = "I'm sorry, I encountered an error. Please try again later.";

/// 采集方式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssessmentMethod {
    #[default]
    Structured,
    Conversational,
}

/// 能产出症状评估的采集方式
pub trait AssessmentCapture {
    fn method(&self) -> AssessmentMethod;

    /// 产出校验通过的症状评估；信息不足时返回错误
    fn produce(&self) -> Result<SymptomAssessment>;
}

/// 结构化问卷
#[derive(Debug, Clone, Default)]
pub struct StructuredForm {
    draft: SymptomAssessment,
}

impl StructuredForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn draft(&self) -> &SymptomAssessment {
        &self.draft
    }

    pub fn draft_mut(&mut self) -> &mut SymptomAssessment {
        &mut self.draft
    }

    pub fn set_draft(&mut self, draft: SymptomAssessment) {
        self.draft = draft;
    }
}

impl AssessmentCapture for StructuredForm {
    fn method(&self) -> AssessmentMethod {
        AssessmentMethod::Structured
    }

    fn produce(&self) -> Result<SymptomAssessment> {
        self.draft.validate()?;
        Ok(self.draft.clone())
    }
}

/// 对话采集
#[derive(Debug, Clone, Default)]
pub struct ConversationalCapture {
    transcript: Vec<ChatMessage>,
    latest_triage: Option<ChatTriage>,
}

impl ConversationalCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }

    /// 服务在对话中给出的分诊建议（如有）
    pub fn latest_triage(&self) -> Option<&ChatTriage> {
        self.latest_triage.as_ref()
    }

    /// 发送一条消息，并把完整对话记录提交给服务
    ///
    /// 失败时记录中追加致歉消息，原错误返回给调用方。
    pub async fn send(&mut self, text: &str, service: &dyn TriageService) -> Result<&ChatMessage> {
        let text = text.trim();
        if text.is_empty() {
            return Err(TriageError::Validation(ValidationErrors::single(
                "message",
                "Message cannot be empty",
            )));
        }

        self.transcript.push(ChatMessage::user(text));
        debug!("Sending chat transcript with {} messages", self.transcript.len());

        match service.chat(&self.transcript).await {
            Ok(reply) => {
                if let Some(triage) = reply.triage_results {
                    info!("Chat reply carried triage category '{}'", triage.category);
                    self.latest_triage = Some(triage);
                }
                self.transcript.push(ChatMessage::assistant(reply.reply));
            }
            Err(e) => {
                warn!("Chat request failed: {}", e);
                self.transcript.push(ChatMessage::assistant(CHAT_APOLOGY));
                return Err(e);
            }
        }

        // 上面刚追加过回复
        self.transcript
            .last()
            .ok_or_else(|| TriageError::Unexpected("chat transcript is empty".to_string()))
    }

    fn user_messages(&self) -> impl Iterator<Item = &str> {
        self.transcript
            .iter()
            .filter(|m| m.role == ChatRole::User)
            .map(|m| m.content.as_str())
    }
}

impl AssessmentCapture for ConversationalCapture {
    fn method(&self) -> AssessmentMethod {
        AssessmentMethod::Conversational
    }

    fn produce(&self) -> Result<SymptomAssessment> {
        let extractor = TranscriptExtractor::shared()?;
        let messages: Vec<&str> = self.user_messages().collect();

        let mut missing = Vec::new();
        let chief_complaint = messages.first().map(|m| m.trim()).unwrap_or_default();
        if chief_complaint.chars().count() < MIN_CHIEF_COMPLAINT_LEN {
            missing.push("chief complaint".to_string());
        }
        let duration_days = extractor.duration_days(&messages);
        if duration_days.is_none() {
            missing.push("duration".to_string());
        }
        if !missing.is_empty() {
            debug!("Conversation not yet sufficient, missing {:?}", missing);
            return Err(TriageError::CaptureIncomplete { missing });
        }

        let additional: Vec<&str> = messages.iter().skip(1).map(|m| m.trim()).collect();
        let assessment = SymptomAssessment {
            chief_complaint: chief_complaint.to_string(),
            duration_days: duration_days.map(|d| d.to_string()).unwrap_or_default(),
            symptoms: extractor.symptoms(&messages),
            vitals: extractor.vitals(&messages),
            additional_symptoms: Some(additional.join(" ")).filter(|s| !s.is_empty()),
        };
        assessment.validate()?;
        Ok(assessment)
    }
}

/// 症状关键字
const SYMPTOM_KEYWORDS: [(&str, &str); 7] = [
    ("fever", r"fever(?:ish)?|chills"),
    ("pain", r"pain(?:ful)?|aches?|hurts?|headache"),
    ("cough", r"cough(?:ing)?"),
    ("shortness_of_breath", r"short(?:ness)? of breath|breathless(?:ness)?|difficulty breathing"),
    ("nausea", r"nause(?:a|ous)|vomit(?:ing)?"),
    ("dizziness", r"dizz(?:y|iness)|light-?headed"),
    ("rash", r"rash(?:es)?|hives"),
];

static EXTRACTOR: OnceLock<std::result::Result<TranscriptExtractor, String>> = OnceLock::new();

/// 从对话中提取结构化信息
struct TranscriptExtractor {
    duration: Regex,
    clause: Regex,
    qualifier: Regex,
    symptoms: Vec<(&'static str, Regex)>,
    temperature: Regex,
    heart_rate: Regex,
    blood_pressure: Regex,
    oxygen: Regex,
}

impl TranscriptExtractor {
    /// 进程内共享的提取器，正则只编译一次
    fn shared() -> Result<&'static Self> {
        EXTRACTOR
            .get_or_init(|| Self::new().map_err(|e| e.to_string()))
            .as_ref()
            .map_err(|message| TriageError::Unexpected(message.clone()))
    }

    fn new() -> Result<Self> {
        let symptoms = SYMPTOM_KEYWORDS
            .iter()
            .map(|(name, pattern)| {
                compile(&format!(r"(?i)\b(?:{})\b", pattern)).map(|regex| (*name, regex))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            duration: compile(r"(?i)\b(\d+)\s*(days?|weeks?)\b")?,
            clause: compile(r"[.!?;,\n]")?,
            qualifier: compile(r"(?i)\b(mild|moderate|severe)\b")?,
            symptoms,
            temperature: compile(r"(?i)\b(?:temperature|temp)\b\D{0,12}?(\d{2,3}(?:\.\d+)?)")?,
            heart_rate: compile(r"(?i)\b(?:heart rate|pulse)\b\D{0,12}?(\d{2,3})\b")?,
            blood_pressure: compile(r"\b(\d{2,3})\s*/\s*(\d{2,3})\b")?,
            oxygen: compile(r"(?i)\b(?:oxygen|spo2|saturation)\b\D{0,12}?(\d{2,3})\b")?,
        })
    }

    /// 第一次提到的病程，周换算为天
    fn duration_days(&self, messages: &[&str]) -> Option<u32> {
        messages.iter().find_map(|message| {
            let caps = self.duration.captures(message)?;
            let count: u32 = caps[1].parse().ok()?;
            let unit = caps[2].to_lowercase();
            if unit.starts_with("week") {
                count.checked_mul(7)
            } else {
                Some(count)
            }
        })
    }

    /// 每个症状取所有提及中最重的程度
    ///
    /// 程度词只修饰其后第一个症状；提到但没有程度词时按中度处理。
    fn symptoms(&self, messages: &[&str]) -> SymptomSeverities {
        let mut severities = SymptomSeverities::default();
        for clause in messages.iter().flat_map(|m| self.clause.split(m)) {
            let mut mentions: Vec<(usize, usize, &'static str)> = self
                .symptoms
                .iter()
                .flat_map(|(name, pattern)| {
                    pattern
                        .find_iter(clause)
                        .map(move |found| (found.start(), found.end(), *name))
                })
                .collect();
            mentions.sort_unstable();

            let mut window_start = 0;
            for (start, end, name) in mentions {
                let severity = self.qualifier_before(&clause[window_start.min(start)..start]);
                if severities.get(name).map_or(true, |current| severity > current) {
                    severities.set(name, severity);
                }
                window_start = end;
            }
        }
        severities
    }

    fn qualifier_before(&self, prefix: &str) -> Severity {
        match self
            .qualifier
            .find_iter(prefix)
            .last()
            .map(|m| m.as_str().to_lowercase())
            .as_deref()
        {
            Some("mild") => Severity::Mild,
            Some("severe") => Severity::Severe,
            _ => Severity::Moderate,
        }
    }

    fn vitals(&self, messages: &[&str]) -> VitalSigns {
        let first = |pattern: &Regex, group: usize| {
            messages
                .iter()
                .find_map(|m| pattern.captures(m))
                .and_then(|caps| caps.get(group).map(|g| g.as_str().to_string()))
        };

        VitalSigns {
            temperature: first(&self.temperature, 1),
            heart_rate: first(&self.heart_rate, 1),
            systolic_bp: first(&self.blood_pressure, 1),
            diastolic_bp: first(&self.blood_pressure, 2),
            oxygen_saturation: first(&self.oxygen, 1),
        }
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| TriageError::Unexpected(format!("invalid pattern '{}': {}", pattern, e)))
}

/// 当前使用的采集方式
#[derive(Debug, Clone)]
pub enum AssessmentSelector {
    Structured(StructuredForm),
    Conversational(ConversationalCapture),
}

impl AssessmentSelector {
    pub fn new(method: AssessmentMethod) -> Self {
        match method {
            AssessmentMethod::Structured => Self::Structured(StructuredForm::new()),
            AssessmentMethod::Conversational => Self::Conversational(ConversationalCapture::new()),
        }
    }

    pub fn method(&self) -> AssessmentMethod {
        self.capture().method()
    }

    /// 切换采集方式；切换后的方式从空白开始，方式相同时保持原状
    pub fn select(&mut self, method: AssessmentMethod) -> bool {
        if self.method() == method {
            return false;
        }
        info!("Switching assessment method to {:?}", method);
        *self = Self::new(method);
        true
    }

    pub fn capture(&self) -> &dyn AssessmentCapture {
        match self {
            Self::Structured(form) => form,
            Self::Conversational(chat) => chat,
        }
    }

    pub fn structured(&self) -> Option<&StructuredForm> {
        match self {
            Self::Structured(form) => Some(form),
            Self::Conversational(_) => None,
        }
    }

    pub fn conversational(&self) -> Option<&ConversationalCapture> {
        match self {
            Self::Conversational(chat) => Some(chat),
            Self::Structured(_) => None,
        }
    }

    pub fn structured_mut(&mut self) -> Option<&mut StructuredForm> {
        match self {
            Self::Structured(form) => Some(form),
            Self::Conversational(_) => None,
        }
    }

    pub fn conversational_mut(&mut self) -> Option<&mut ConversationalCapture> {
        match self {
            Self::Conversational(chat) => Some(chat),
            Self::Structured(_) => None,
        }
    }

    pub fn produce(&self) -> Result<SymptomAssessment> {
        self.capture().produce()
    }
}

impl Default for AssessmentSelector {
    fn default() -> Self {
        Self::new(AssessmentMethod::default())
    }
}
