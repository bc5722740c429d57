//! 交互式分诊评估
//!
//! 终端版的三步表单，只负责读取输入和展示流程状态。

use anyhow::Result;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use triage_client::ApiClient;
use triage_core::{PatientRecord, Severity, SymptomAssessment, SymptomSeverities, TriageError};
use triage_workflow::{AssessmentMethod, IntakeStep, TriageWorkflow};

const HELP: &str = "Commands: :back  :switch  :new  :quit";

/// 表单中途输入的命令
enum Command {
    Back,
    Switch,
    New,
    Quit,
}

enum Input {
    Text(String),
    Command(Command),
}

struct Prompt {
    lines: Lines<BufReader<Stdin>>,
}

impl Prompt {
    fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }

    /// 读取一行；输入结束时视为退出
    async fn ask(&mut self, label: &str) -> Result<Input> {
        print!("{}: ", label);
        std::io::stdout().flush()?;
        let line = match self.lines.next_line().await? {
            Some(line) => line,
            None => return Ok(Input::Command(Command::Quit)),
        };
        let line = line.trim().to_string();
        Ok(match line.as_str() {
            ":back" => Input::Command(Command::Back),
            ":switch" => Input::Command(Command::Switch),
            ":new" => Input::Command(Command::New),
            ":quit" | ":q" => Input::Command(Command::Quit),
            _ => Input::Text(line),
        })
    }
}

/// 表单字段读取结果
enum Field<T> {
    Value(T),
    Command(Command),
}

macro_rules! field {
    ($expr:expr) => {
        match $expr {
            Field::Value(value) => value,
            Field::Command(command) => return Ok(Field::Command(command)),
        }
    };
}

async fn text(prompt: &mut Prompt, label: &str) -> Result<Field<String>> {
    Ok(match prompt.ask(label).await? {
        Input::Text(text) => Field::Value(text),
        Input::Command(command) => Field::Command(command),
    })
}

/// 必填字段；已有值时作为默认值，直接回车保留
async fn required(prompt: &mut Prompt, label: &str, current: &str) -> Result<Field<String>> {
    let value = field!(text(prompt, &with_default(label, current)).await?);
    Ok(Field::Value(keep_or_replace(value, current)))
}

/// 选填字段；回车保留已有值，输入 `-` 清空
async fn optional(prompt: &mut Prompt, label: &str, current: &Option<String>) -> Result<Field<Option<String>>> {
    let label = with_default(&format!("{} (optional)", label), current.as_deref().unwrap_or(""));
    let value = field!(text(prompt, &label).await?);
    Ok(Field::Value(keep_or_replace_optional(value, current)))
}

async fn severity(prompt: &mut Prompt, name: &str, current: Severity) -> Result<Field<Severity>> {
    let label = format!("{} [0=None 1=Mild 2=Moderate 3=Severe] [{}]", name, current.level());
    loop {
        let value = field!(text(prompt, &label).await?);
        match parse_severity(&value, current) {
            Some(severity) => return Ok(Field::Value(severity)),
            None => println!("  please enter a number from 0 to 3"),
        }
    }
}

fn with_default(label: &str, current: &str) -> String {
    if current.is_empty() {
        label.to_string()
    } else {
        format!("{} [{}]", label, current)
    }
}

fn keep_or_replace(input: String, current: &str) -> String {
    if input.is_empty() {
        current.to_string()
    } else {
        input
    }
}

fn keep_or_replace_optional(input: String, current: &Option<String>) -> Option<String> {
    match input.as_str() {
        "" => current.clone(),
        "-" => None,
        _ => Some(input),
    }
}

fn parse_severity(input: &str, current: Severity) -> Option<Severity> {
    if input.is_empty() {
        return Some(current);
    }
    input.parse::<u8>().ok().and_then(Severity::from_level)
}

/// 运行交互式评估，直到操作员退出
pub async fn run_assessment(client: &ApiClient, method: AssessmentMethod) -> Result<()> {
    let mut prompt = Prompt::new();
    let mut workflow = TriageWorkflow::with_method(method);
    println!("{}", HELP);

    loop {
        let step = workflow.step();
        println!(
            "\n== Step {}/3: {} ({}%) ==",
            step.number(),
            step.title(),
            workflow.progress_percent()
        );

        let command = match step {
            IntakeStep::PatientInfo => patient_step(&mut prompt, &mut workflow).await?,
            IntakeStep::SymptomCapture => match workflow.method() {
                AssessmentMethod::Structured => structured_step(&mut prompt, &mut workflow, client).await?,
                AssessmentMethod::Conversational => {
                    conversational_step(&mut prompt, &mut workflow, client).await?
                }
            },
            IntakeStep::Result => result_step(&mut prompt, &workflow).await?,
        };

        let Some(command) = command else { continue };
        let outcome = match command {
            Command::Quit => return Ok(()),
            Command::Back => workflow.back().map(|_| ()),
            Command::New => workflow.new_assessment().map(|_| ()),
            Command::Switch => {
                let next = match workflow.method() {
                    AssessmentMethod::Structured => AssessmentMethod::Conversational,
                    AssessmentMethod::Conversational => AssessmentMethod::Structured,
                };
                workflow.select_method(next).map(|_| println!("Switched to {:?} capture", next))
            }
        };
        if let Err(e) = outcome {
            println!("  {}", e);
        }
    }
}

async fn patient_step(prompt: &mut Prompt, workflow: &mut TriageWorkflow) -> Result<Option<Command>> {
    let current = workflow.patient().cloned().unwrap_or_default();
    let record = match read_patient(prompt, &current).await? {
        Field::Value(record) => record,
        Field::Command(command) => return Ok(Some(command)),
    };
    if let Err(e) = workflow.submit_patient(record) {
        report(&e);
    }
    Ok(None)
}

async fn read_patient(prompt: &mut Prompt, current: &PatientRecord) -> Result<Field<PatientRecord>> {
    let mut record = PatientRecord::new(
        field!(required(prompt, "Name", &current.name).await?),
        field!(required(prompt, "Age", &current.age).await?),
        field!(required(prompt, "Gender", &current.gender).await?),
    );
    record.weight = field!(optional(prompt, "Weight (kg)", &current.weight).await?);
    record.height = field!(optional(prompt, "Height (cm)", &current.height).await?);
    record.medical_history = field!(optional(prompt, "Medical history", &current.medical_history).await?);
    record.current_medications =
        field!(optional(prompt, "Current medications", &current.current_medications).await?);
    record.allergies = field!(optional(prompt, "Allergies", &current.allergies).await?);
    Ok(Field::Value(record))
}

/// 重新进入症状步骤时的选择
enum Resume {
    Resubmit,
    Edit,
}

fn parse_resume(input: &str) -> Option<Resume> {
    match input.to_ascii_lowercase().as_str() {
        "" | "r" | "resubmit" => Some(Resume::Resubmit),
        "e" | "edit" => Some(Resume::Edit),
        _ => None,
    }
}

async fn structured_step(
    prompt: &mut Prompt,
    workflow: &mut TriageWorkflow,
    client: &ApiClient,
) -> Result<Option<Command>> {
    let current = workflow
        .capture()
        .structured()
        .map(|form| form.draft().clone())
        .unwrap_or_default();

    // 上次提交失败或校验未通过时，草稿仍在，可以原样重新提交
    if current != SymptomAssessment::default() {
        if let Some(error) = workflow.last_error() {
            println!("Last attempt failed: {}", error);
        }
        loop {
            let choice = match prompt.ask("Enter to resubmit the kept answers, or 'edit' to change them").await? {
                Input::Text(text) => text,
                Input::Command(command) => return Ok(Some(command)),
            };
            match parse_resume(&choice) {
                Some(Resume::Resubmit) => {
                    submit(workflow, client).await;
                    return Ok(None);
                }
                Some(Resume::Edit) => break,
                None => println!("  press Enter or type 'edit'"),
            }
        }
        println!("Press Enter to keep a value shown in brackets, '-' clears an optional field.");
    }

    let draft = match read_assessment(prompt, &current).await? {
        Field::Value(draft) => draft,
        Field::Command(command) => return Ok(Some(command)),
    };
    if let Some(form) = workflow.capture_mut().structured_mut() {
        form.set_draft(draft);
    }
    submit(workflow, client).await;
    Ok(None)
}

async fn read_assessment(prompt: &mut Prompt, current: &SymptomAssessment) -> Result<Field<SymptomAssessment>> {
    let mut assessment = SymptomAssessment {
        chief_complaint: field!(required(prompt, "Chief complaint", &current.chief_complaint).await?),
        duration_days: field!(required(prompt, "Duration (days)", &current.duration_days).await?),
        ..Default::default()
    };

    let mut symptoms = SymptomSeverities::default();
    for name in SymptomSeverities::NAMES {
        let previous = current.symptoms.get(name).unwrap_or_default();
        let level = field!(severity(prompt, name, previous).await?);
        symptoms.set(name, level);
    }
    assessment.symptoms = symptoms;

    let (was, vitals) = (&current.vitals, &mut assessment.vitals);
    vitals.temperature = field!(optional(prompt, "Temperature (°C)", &was.temperature).await?);
    vitals.heart_rate = field!(optional(prompt, "Heart rate (bpm)", &was.heart_rate).await?);
    vitals.systolic_bp = field!(optional(prompt, "Systolic BP", &was.systolic_bp).await?);
    vitals.diastolic_bp = field!(optional(prompt, "Diastolic BP", &was.diastolic_bp).await?);
    vitals.oxygen_saturation = field!(optional(prompt, "Oxygen saturation (%)", &was.oxygen_saturation).await?);
    assessment.additional_symptoms =
        field!(optional(prompt, "Additional symptoms", &current.additional_symptoms).await?);
    Ok(Field::Value(assessment))
}

async fn conversational_step(
    prompt: &mut Prompt,
    workflow: &mut TriageWorkflow,
    client: &ApiClient,
) -> Result<Option<Command>> {
    println!("Describe the symptoms. Type :submit when done.");
    loop {
        let text = match prompt.ask("You").await? {
            Input::Text(text) => text,
            Input::Command(command) => return Ok(Some(command)),
        };
        if text == ":submit" {
            submit(workflow, client).await;
            return Ok(None);
        }
        let Some(chat) = workflow.capture_mut().conversational_mut() else {
            return Ok(None);
        };
        match chat.send(&text, client).await {
            Ok(reply) => println!("Assistant: {}", reply.content),
            Err(e) => {
                if let Some(apology) = chat.transcript().last() {
                    println!("Assistant: {}", apology.content);
                }
                report(&e);
            }
        }
    }
}

async fn submit(workflow: &mut TriageWorkflow, client: &ApiClient) {
    println!("Submitting...");
    if let Err(e) = workflow.submit_capture(client).await {
        report(&e);
    }
}

async fn result_step(prompt: &mut Prompt, workflow: &TriageWorkflow) -> Result<Option<Command>> {
    if let (Some(result), Some(tier)) = (workflow.result(), workflow.severity()) {
        println!("[{} / {}] {}", tier.label(), tier.accent().as_str(), result.triage_category);
        println!("Recommendation: {}", result.recommendation);
        println!("Explanation: {}", result.explanation);
    }
    println!("Type :new to start a new assessment or :quit to exit.");
    loop {
        if let Input::Command(command) = prompt.ask(">").await? {
            return Ok(Some(command));
        }
    }
}

fn report(error: &TriageError) {
    match error {
        TriageError::Validation(errors) => {
            for e in errors.errors() {
                println!("  {}: {}", e.field, e.message);
            }
        }
        TriageError::CaptureIncomplete { missing } => {
            println!("  still need: {}", missing.join(", "));
        }
        other => println!("  {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_input_keeps_current_value() {
        assert_eq!(keep_or_replace(String::new(), "fever"), "fever");
        assert_eq!(keep_or_replace("cough".to_string(), "fever"), "cough");
        assert_eq!(with_default("Duration (days)", "3"), "Duration (days) [3]");
        assert_eq!(with_default("Duration (days)", ""), "Duration (days)");
    }

    #[test]
    fn test_optional_field_can_be_kept_or_cleared() {
        let current = Some("38.5".to_string());
        assert_eq!(keep_or_replace_optional(String::new(), &current), current);
        assert_eq!(keep_or_replace_optional("-".to_string(), &current), None);
        assert_eq!(keep_or_replace_optional("39".to_string(), &current), Some("39".to_string()));
        assert_eq!(keep_or_replace_optional(String::new(), &None), None);
    }

    #[test]
    fn test_severity_defaults_to_previous_answer() {
        assert_eq!(parse_severity("", Severity::Severe), Some(Severity::Severe));
        assert_eq!(parse_severity("1", Severity::Severe), Some(Severity::Mild));
        assert_eq!(parse_severity("7", Severity::Severe), None);
        assert_eq!(parse_severity("x", Severity::None), None);
    }

    #[test]
    fn test_resume_choice() {
        assert!(matches!(parse_resume(""), Some(Resume::Resubmit)));
        assert!(matches!(parse_resume("EDIT"), Some(Resume::Edit)));
        assert!(parse_resume("maybe").is_none());
    }
}
