//! 表单校验
//!
//! 在数据进入聚合器之前完成字段级校验，校验失败不会触发任何网络请求

use crate::error::{Result, ValidationErrors};
use crate::models::{PatientRecord, SymptomAssessment, VitalSigns};

/// 主诉最短长度
pub const MIN_CHIEF_COMPLAINT_LEN: usize = 5;

/// 解析正整数（去除首尾空白）
pub fn parse_positive_int(text: &str) -> Option<u32> {
    text.trim().parse::<u32>().ok().filter(|n| *n > 0)
}

/// 解析可选整数；空白视为未填写
pub fn parse_optional_int(text: Option<&str>) -> std::result::Result<Option<u32>, String> {
    match text.map(str::trim).filter(|t| !t.is_empty()) {
        None => Ok(None),
        Some(t) => t
            .parse::<u32>()
            .map(Some)
            .map_err(|_| format!("'{}' is not a whole number", t)),
    }
}

/// 解析可选小数；空白视为未填写
pub fn parse_optional_float(text: Option<&str>) -> std::result::Result<Option<f64>, String> {
    match text.map(str::trim).filter(|t| !t.is_empty()) {
        None => Ok(None),
        Some(t) => match t.parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(Some(v)),
            _ => Err(format!("'{}' is not a number", t)),
        },
    }
}

fn is_blank(text: &str) -> bool {
    text.trim().is_empty()
}

impl PatientRecord {
    /// 校验患者信息
    pub fn validate(&self) -> Result<()> {
        let mut errors = ValidationErrors::new();

        if is_blank(&self.name) {
            errors.push("name", "Patient name is required");
        }
        if is_blank(&self.age) {
            errors.push("age", "Age is required");
        } else if parse_positive_int(&self.age).is_none() {
            errors.push("age", "Age must be a positive whole number");
        }
        if is_blank(&self.gender) {
            errors.push("gender", "Gender is required");
        }

        errors.into_result()
    }
}

impl SymptomAssessment {
    /// 校验症状评估
    pub fn validate(&self) -> Result<()> {
        let mut errors = ValidationErrors::new();

        if self.chief_complaint.trim().chars().count() < MIN_CHIEF_COMPLAINT_LEN {
            errors.push("chiefComplaint", "Please describe your main symptoms");
        }
        if is_blank(&self.duration_days) {
            errors.push("duration_days", "Duration is required");
        } else if parse_positive_int(&self.duration_days).is_none() {
            errors.push("duration_days", "Duration must be a positive whole number of days");
        }
        validate_vitals(&self.vitals, &mut errors);

        errors.into_result()
    }
}

fn validate_vitals(vitals: &VitalSigns, errors: &mut ValidationErrors) {
    if let Err(message) = parse_optional_float(vitals.temperature.as_deref()) {
        errors.push("temperature", message);
    }
    let integer_fields = [
        ("heart_rate", &vitals.heart_rate),
        ("systolic_bp", &vitals.systolic_bp),
        ("diastolic_bp", &vitals.diastolic_bp),
        ("oxygen_saturation", &vitals.oxygen_saturation),
    ];
    for (field, value) in integer_fields {
        if let Err(message) = parse_optional_int(value.as_deref()) {
            errors.push(field, message);
        }
    }
}
