//! 分诊请求聚合
//!
//! 将校验后的患者信息和症状评估合并为一个 [`TriageRequest`]。

use triage_core::validation::{parse_optional_float, parse_optional_int, parse_positive_int};
use triage_core::{
    PatientRecord, Result, SymptomAssessment, TriageError, TriageRequest, ValidationErrors,
};

/// 合并两份记录，生命体征按类型转换，未填写的生命体征不出现在请求中
///
/// 年龄、病程和生命体征以外的字段原样带入请求。
pub fn aggregate(patient: &PatientRecord, assessment: &SymptomAssessment) -> Result<TriageRequest> {
    let mut errors = ValidationErrors::new();

    let age = parse_positive_int(&patient.age);
    if age.is_none() {
        errors.push("age", "Age must be a positive whole number");
    }
    let duration_days = parse_positive_int(&assessment.duration_days);
    if duration_days.is_none() {
        errors.push("duration_days", "Duration must be a positive whole number of days");
    }

    let vitals = &assessment.vitals;
    let temperature = parse_optional_float(vitals.temperature.as_deref())
        .map_err(|message| errors.push("temperature", message))
        .ok()
        .flatten();
    let mut int_vital = |field: &'static str, value: &Option<String>| {
        parse_optional_int(value.as_deref())
            .map_err(|message| errors.push(field, message))
            .ok()
            .flatten()
    };
    let heart_rate = int_vital("heart_rate", &vitals.heart_rate);
    let systolic_bp = int_vital("systolic_bp", &vitals.systolic_bp);
    let diastolic_bp = int_vital("diastolic_bp", &vitals.diastolic_bp);
    let oxygen_saturation = int_vital("oxygen_saturation", &vitals.oxygen_saturation);

    let (age, duration_days) = match (age, duration_days) {
        (Some(age), Some(days)) if errors.is_empty() => (age, days),
        _ => return Err(TriageError::Validation(errors)),
    };

    let symptoms = &assessment.symptoms;
    Ok(TriageRequest {
        name: patient.name.clone(),
        age,
        gender: patient.gender.clone(),
        weight: patient.weight.clone(),
        height: patient.height.clone(),
        medical_history: patient.medical_history.clone(),
        current_medications: patient.current_medications.clone(),
        allergies: patient.allergies.clone(),
        chief_complaint: assessment.chief_complaint.clone(),
        fever: symptoms.fever,
        pain: symptoms.pain,
        cough: symptoms.cough,
        shortness_of_breath: symptoms.shortness_of_breath,
        nausea: symptoms.nausea,
        dizziness: symptoms.dizziness,
        rash: symptoms.rash,
        temperature,
        heart_rate,
        systolic_bp,
        diastolic_bp,
        oxygen_saturation,
        duration_days,
        additional_symptoms: assessment.additional_symptoms.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use triage_core::{Severity, VitalSigns};

    fn jane() -> PatientRecord {
        PatientRecord::new("Jane Doe", "34", "female")
    }

    fn assessment() -> SymptomAssessment {
        let mut assessment = SymptomAssessment {
            chief_complaint: "fever and cough".to_string(),
            duration_days: "3".to_string(),
            ..Default::default()
        };
        assessment.symptoms.fever = Severity::Moderate;
        assessment.symptoms.cough = Severity::Mild;
        assessment
    }

    #[test]
    fn test_absent_vitals_are_omitted() {
        let request = aggregate(&jane(), &assessment()).unwrap();
        assert_eq!(request.age, 34);
        assert_eq!(request.duration_days, 3);
        assert_eq!(request.fever, Severity::Moderate);
        assert_eq!(request.temperature, None);

        let json = serde_json::to_value(&request).unwrap();
        let body = json.as_object().unwrap();
        for key in ["temperature", "heart_rate", "systolic_bp", "diastolic_bp", "oxygen_saturation"] {
            assert!(!body.contains_key(key), "{key} should be omitted");
        }
        assert_eq!(body["duration_days"], serde_json::json!(3));
        assert_eq!(body["chiefComplaint"], serde_json::json!("fever and cough"));
    }

    #[test]
    fn test_present_vitals_are_coerced() {
        let mut assessment = assessment();
        assessment.vitals = VitalSigns {
            temperature: Some("38.5".to_string()),
            heart_rate: Some(" 92 ".to_string()),
            systolic_bp: Some("".to_string()),
            diastolic_bp: None,
            oxygen_saturation: Some("97".to_string()),
        };

        let request = aggregate(&jane(), &assessment).unwrap();
        assert_eq!(request.temperature, Some(38.5));
        assert_eq!(request.heart_rate, Some(92));
        assert_eq!(request.systolic_bp, None);
        assert_eq!(request.oxygen_saturation, Some(97));
    }

    #[test]
    fn test_malformed_duration_is_rejected() {
        let mut assessment = assessment();
        assessment.duration_days = "abc".to_string();

        match aggregate(&jane(), &assessment).unwrap_err() {
            TriageError::Validation(errors) => assert!(errors.has_field("duration_days")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_unparseable_vital_is_rejected() {
        let mut assessment = assessment();
        assessment.vitals.heart_rate = Some("fast".to_string());

        match aggregate(&jane(), &assessment).unwrap_err() {
            TriageError::Validation(errors) => {
                assert!(errors.has_field("heart_rate"));
                assert!(!errors.has_field("duration_days"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_patient_text_is_carried_unchanged() {
        let mut patient = PatientRecord::new(" Jane Doe ", "34", "Female ");
        patient.weight = Some("64".to_string());
        patient.allergies = Some("   ".to_string());
        let mut assessment = assessment();
        assessment.chief_complaint = "  fever and cough".to_string();
        assessment.additional_symptoms = Some("night sweats ".to_string());

        let request = aggregate(&patient, &assessment).unwrap();
        assert_eq!(request.name, " Jane Doe ");
        assert_eq!(request.gender, "Female ");
        assert_eq!(request.weight.as_deref(), Some("64"));
        assert_eq!(request.allergies.as_deref(), Some("   "));
        assert_eq!(request.height, None);
        assert_eq!(request.chief_complaint, "  fever and cough");
        assert_eq!(request.additional_symptoms.as_deref(), Some("night sweats "));
    }
}
