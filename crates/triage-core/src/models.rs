//! 核心数据模型定义

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// 症状严重程度
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Severity {
    #[default]
    None,     // 无
    Mild,     // 轻度
    Moderate, // 中度
    Severe,   // 重度
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::None,
        Severity::Mild,
        Severity::Moderate,
        Severity::Severe,
    ];

    pub fn level(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Mild => 1,
            Self::Moderate => 2,
            Self::Severe => 3,
        }
    }

    pub fn from_level(level: u8) -> Option<Self> {
        Self::ALL.get(level as usize).copied()
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Mild => "Mild",
            Self::Moderate => "Moderate",
            Self::Severe => "Severe",
        }
    }
}

impl From<Severity> for u8 {
    fn from(severity: Severity) -> Self {
        severity.level()
    }
}

impl TryFrom<u8> for Severity {
    type Error = String;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        Self::from_level(level).ok_or_else(|| format!("severity level must be 0-3, got {}", level))
    }
}

/// 固定的七项症状评分
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymptomSeverities {
    pub fever: Severity,
    pub pain: Severity,
    pub cough: Severity,
    pub shortness_of_breath: Severity,
    pub nausea: Severity,
    pub dizziness: Severity,
    pub rash: Severity,
}

impl SymptomSeverities {
    /// 症状字段名，与服务端特征名一致
    pub const NAMES: [&'static str; 7] = [
        "fever",
        "pain",
        "cough",
        "shortness_of_breath",
        "nausea",
        "dizziness",
        "rash",
    ];

    pub fn get(&self, name: &str) -> Option<Severity> {
        match name {
            "fever" => Some(self.fever),
            "pain" => Some(self.pain),
            "cough" => Some(self.cough),
            "shortness_of_breath" => Some(self.shortness_of_breath),
            "nausea" => Some(self.nausea),
            "dizziness" => Some(self.dizziness),
            "rash" => Some(self.rash),
            _ => None,
        }
    }

    /// 按字段名设置评分，未知字段返回 false
    pub fn set(&mut self, name: &str, severity: Severity) -> bool {
        let slot = match name {
            "fever" => &mut self.fever,
            "pain" => &mut self.pain,
            "cough" => &mut self.cough,
            "shortness_of_breath" => &mut self.shortness_of_breath,
            "nausea" => &mut self.nausea,
            "dizziness" => &mut self.dizziness,
            "rash" => &mut self.rash,
            _ => return false,
        };
        *slot = severity;
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, Severity)> + '_ {
        Self::NAMES
            .iter()
            .filter_map(move |name| self.get(name).map(|severity| (*name, severity)))
    }
}

/// 生命体征（表单原始文本，可为空）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VitalSigns {
    pub temperature: Option<String>,
    pub heart_rate: Option<String>,
    pub systolic_bp: Option<String>,
    pub diastolic_bp: Option<String>,
    pub oxygen_saturation: Option<String>,
}

/// 患者基本信息（第一步）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientRecord {
    pub name: String,
    pub age: String,
    pub gender: String,
    pub weight: Option<String>,
    pub height: Option<String>,
    pub medical_history: Option<String>,
    pub current_medications: Option<String>,
    pub allergies: Option<String>,
}

impl PatientRecord {
    pub fn new(name: impl Into<String>, age: impl Into<String>, gender: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            age: age.into(),
            gender: gender.into(),
            ..Default::default()
        }
    }
}

/// 症状评估（第二步）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymptomAssessment {
    pub chief_complaint: String,
    pub duration_days: String,
    pub symptoms: SymptomSeverities,
    pub vitals: VitalSigns,
    pub additional_symptoms: Option<String>,
}

/// 发送到 `/direct-triage` 的请求体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageRequest {
    pub name: String,
    pub age: u32,
    pub gender: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<String>,
    #[serde(rename = "medicalHistory", skip_serializing_if = "Option::is_none")]
    pub medical_history: Option<String>,
    #[serde(rename = "currentMedications", skip_serializing_if = "Option::is_none")]
    pub current_medications: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allergies: Option<String>,

    #[serde(rename = "chiefComplaint")]
    pub chief_complaint: String,
    pub fever: Severity,
    pub pain: Severity,
    pub cough: Severity,
    pub shortness_of_breath: Severity,
    pub nausea: Severity,
    pub dizziness: Severity,
    pub rash: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heart_rate: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub systolic_bp: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diastolic_bp: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oxygen_saturation: Option<u32>,
    pub duration_days: u32,
    #[serde(rename = "additionalSymptoms", skip_serializing_if = "Option::is_none")]
    pub additional_symptoms: Option<String>,
}

/// 远程分诊服务返回的结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriageResult {
    pub triage_category: String,
    pub recommendation: String,
    pub explanation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
}

/// 后端服务可用状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiStatus {
    Checking,
    Online,
    Offline,
}

impl ApiStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Checking => "checking",
            Self::Online => "online",
            Self::Offline => "offline",
        }
    }
}

/// `/get-patients` 返回的患者摘要
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientSummary {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// 登记接口原样保存年龄，缺失、`null` 或无法识别时为 `None`
    #[serde(
        default,
        deserialize_with = "lenient_age",
        skip_serializing_if = "Option::is_none"
    )]
    pub age: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(
        rename = "triageLevel",
        alias = "triage_category",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub triage_level: Option<String>,
    #[serde(rename = "chiefComplaint", default, skip_serializing_if = "Option::is_none")]
    pub chief_complaint: Option<String>,
}

/// 接受整数、数字字符串或 `null` 形式的年龄
fn lenient_age<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(n) => n.as_u64().and_then(|age| u32::try_from(age).ok()),
        Value::String(s) => s.trim().parse::<u32>().ok(),
        _ => None,
    })
}

/// 对话角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
    System,
}

/// 对话消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// `/chat` 与 `/chat-with-triage` 的请求体
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest<'a> {
    pub messages: &'a [ChatMessage],
}

/// 对话中附带的分诊结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTriage {
    pub category: String,
    pub recommendation: String,
    pub explanation: String,
}

/// 对话接口的响应
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
    pub reply: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triage_results: Option<ChatTriage>,
}

/// 登记接口中的生命体征
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationVitals {
    pub temperature: Option<String>,
    #[serde(rename = "heartRate")]
    pub heart_rate: Option<String>,
    #[serde(rename = "respiratoryRate")]
    pub respiratory_rate: Option<String>,
    #[serde(rename = "bloodPressure")]
    pub blood_pressure: Option<String>,
    #[serde(rename = "oxygenSaturation")]
    pub oxygen_saturation: Option<String>,
}

/// `/register-patient` 的请求体
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientRegistration {
    pub name: String,
    pub age: u32,
    pub gender: String,
    #[serde(rename = "chiefComplaint")]
    pub chief_complaint: String,
    #[serde(rename = "painLevel")]
    pub pain_level: String,
    pub vitals: RegistrationVitals,
    #[serde(rename = "additionalSymptoms", skip_serializing_if = "Option::is_none")]
    pub additional_symptoms: Option<String>,
    #[serde(rename = "medicalHistory", skip_serializing_if = "Option::is_none")]
    pub medical_history: Option<String>,
}

/// 登记回执
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationReceipt {
    #[serde(default)]
    pub patient_id: Option<String>,
}
