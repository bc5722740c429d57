//! 请求客户端
//!
//! 所有对远程分诊服务的调用都经过 [`ApiClient`]，传输层错误和服务端错误
//! 在这里统一归类为 [`TriageError`]，调用方不再自行检查错误细节。

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use triage_core::{
    ChatMessage, ChatReply, ChatRequest, PatientRegistration, PatientSummary, RegistrationReceipt,
    Result, TriageError, TriageRequest, TriageResult,
};

use crate::api::{ApiEndpoints, Endpoint};
use crate::config::ClientConfig;
use crate::retry::RetryPolicy;

/// 工作流依赖的远程服务能力
#[async_trait]
pub trait TriageService: Send + Sync {
    /// 提交聚合后的分诊请求
    async fn direct_triage(&self, request: &TriageRequest) -> Result<TriageResult>;

    /// 发送完整对话记录，返回助手回复
    async fn chat(&self, messages: &[ChatMessage]) -> Result<ChatReply>;
}

/// 远程分诊服务HTTP客户端
#[derive(Debug, Clone)]
pub struct ApiClient {
    endpoints: ApiEndpoints,
    http: reqwest::Client,
    retry: RetryPolicy,
}

impl ApiClient {
    /// 根据配置创建客户端
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .default_headers(json_headers())
            .build()
            .map_err(|e| TriageError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            endpoints: ApiEndpoints::new(&config.api.base_url),
            http,
            retry: RetryPolicy::from_config(&config.retry),
        })
    }

    /// 配置的服务地址
    pub fn origin(&self) -> &str {
        self.endpoints.origin()
    }

    pub fn endpoints(&self) -> &ApiEndpoints {
        &self.endpoints
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// 发送请求并返回JSON响应体
    pub async fn send<B>(&self, endpoint: Endpoint, payload: Option<&B>) -> Result<Value>
    where
        B: Serialize + ?Sized,
    {
        self.send_with_status(endpoint.method(), endpoint, payload)
            .await
            .map(|(_, body)| body)
    }

    async fn send_with_status<B>(
        &self,
        method: Method,
        endpoint: Endpoint,
        payload: Option<&B>,
    ) -> Result<(StatusCode, Value)>
    where
        B: Serialize + ?Sized,
    {
        let url = self.endpoints.url(endpoint);
        debug!("{} {}", method, url);

        let mut request = self.http.request(method, &url);
        if let Some(body) = payload {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| self.classify_transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = extract_error_detail(&body, status);
            warn!("Request to {} failed with status {}: {}", url, status, detail);
            return Err(TriageError::Service {
                status: status.as_u16(),
                detail,
            });
        }

        let body = response
            .json::<Value>()
            .await
            .map_err(|e| self.classify_transport_error(e))?;
        Ok((status, body))
    }

    /// 将reqwest错误归类：连接、DNS、超时等传输错误视为服务不可达
    fn classify_transport_error(&self, error: reqwest::Error) -> TriageError {
        if error.is_connect() || error.is_timeout() || (error.is_request() && !error.is_builder()) {
            warn!("Backend at {} is unreachable: {}", self.origin(), error);
            TriageError::BackendUnreachable {
                origin: self.origin().to_string(),
            }
        } else {
            TriageError::Unexpected(error.to_string())
        }
    }

    /// 普通对话
    pub async fn chat_messages(&self, messages: &[ChatMessage]) -> Result<ChatReply> {
        let body = self.send(Endpoint::Chat, Some(&ChatRequest { messages })).await?;
        decode(Endpoint::Chat, body)
    }

    /// 对话并在信息充分时附带分诊结果
    pub async fn chat_with_triage(&self, messages: &[ChatMessage]) -> Result<ChatReply> {
        let body = self
            .send(Endpoint::ChatWithTriage, Some(&ChatRequest { messages }))
            .await?;
        decode(Endpoint::ChatWithTriage, body)
    }

    /// 获取已登记患者列表，连接失败时按重试策略重试
    pub async fn get_patients(&self) -> Result<Vec<PatientSummary>> {
        let body = self
            .retry
            .run("get-patients", || self.send::<()>(Endpoint::GetPatients, None))
            .await?;
        let patients: Vec<PatientSummary> = decode(Endpoint::GetPatients, body)?;
        info!("Fetched {} patients", patients.len());
        Ok(patients)
    }

    /// 登记患者
    pub async fn register_patient(&self, registration: &PatientRegistration) -> Result<RegistrationReceipt> {
        let body = self.send(Endpoint::RegisterPatient, Some(registration)).await?;
        let receipt: RegistrationReceipt = decode(Endpoint::RegisterPatient, body)?;
        info!("Registered patient {:?}", receipt.patient_id);
        Ok(receipt)
    }

    /// 直接提交分诊请求
    pub async fn submit_triage(&self, request: &TriageRequest) -> Result<TriageResult> {
        let (status, body) = self
            .send_with_status(Endpoint::DirectTriage.method(), Endpoint::DirectTriage, Some(request))
            .await?;

        // 模型未加载时服务端以2xx返回 {"error": "..."}
        if let Some(message) = body.get("error").and_then(Value::as_str) {
            warn!("Triage service reported an error: {}", message);
            return Err(TriageError::Service {
                status: status.as_u16(),
                detail: message.to_string(),
            });
        }

        let result: TriageResult = decode(Endpoint::DirectTriage, body)?;
        info!("Received triage category '{}'", result.triage_category);
        Ok(result)
    }
}

#[async_trait]
impl TriageService for ApiClient {
    async fn direct_triage(&self, request: &TriageRequest) -> Result<TriageResult> {
        self.submit_triage(request).await
    }

    async fn chat(&self, messages: &[ChatMessage]) -> Result<ChatReply> {
        self.chat_messages(messages).await
    }
}

fn json_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers
}

fn decode<T: DeserializeOwned>(endpoint: Endpoint, body: Value) -> Result<T> {
    serde_json::from_value(body).map_err(|e| {
        TriageError::Unexpected(format!(
            "Unexpected response from {}: {}",
            endpoint.path(),
            e
        ))
    })
}

/// 从错误响应体中提取 `detail` 或 `message`，无法解析时使用状态描述
pub fn extract_error_detail(body: &str, status: StatusCode) -> String {
    let status_text = status.canonical_reason().unwrap_or_default().to_string();

    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return status_text;
    };

    for key in ["detail", "message"] {
        match value.get(key) {
            Some(Value::String(text)) if !text.is_empty() => return text.clone(),
            Some(Value::String(_)) | Some(Value::Null) | None => continue,
            // FastAPI的校验错误是结构化的列表
            Some(other) => return other.to_string(),
        }
    }

    status_text
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderMap as AxumHeaders;
    use axum::response::IntoResponse;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::json;
    use triage_core::Severity;

    async fn spawn_server(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn client_for(base_url: &str) -> ApiClient {
        let mut config = ClientConfig::with_base_url(base_url);
        config.retry.backoff_ms = 1;
        ApiClient::new(&config).unwrap()
    }

    fn sample_request() -> TriageRequest {
        TriageRequest {
            name: "Jane Doe".to_string(),
            age: 34,
            gender: "female".to_string(),
            weight: None,
            height: None,
            medical_history: None,
            current_medications: None,
            allergies: None,
            chief_complaint: "fever and cough".to_string(),
            fever: Severity::Moderate,
            pain: Severity::None,
            cough: Severity::Mild,
            shortness_of_breath: Severity::None,
            nausea: Severity::None,
            dizziness: Severity::None,
            rash: Severity::None,
            temperature: Some(101.2),
            heart_rate: None,
            systolic_bp: None,
            diastolic_bp: None,
            oxygen_saturation: None,
            duration_days: 3,
            additional_symptoms: None,
        }
    }

    #[tokio::test]
    async fn test_direct_triage_sends_json_headers_and_payload() {
        let router = Router::new().route(
            "/direct-triage",
            post(|headers: AxumHeaders, Json(body): Json<Value>| async move {
                let declared = |name: &str| {
                    headers
                        .get(name)
                        .and_then(|v| v.to_str().ok())
                        .map(|v| v.starts_with("application/json"))
                        .unwrap_or(false)
                };
                if !declared("content-type") || !declared("accept") {
                    return (axum::http::StatusCode::BAD_REQUEST, "missing headers").into_response();
                }
                if body.get("heart_rate").is_some() || body["duration_days"] != json!(3) {
                    return (axum::http::StatusCode::BAD_REQUEST, "bad payload").into_response();
                }
                Json(json!({
                    "patient_id": "p-1",
                    "triage_category": "Moderate",
                    "recommendation": "Schedule Appointment",
                    "explanation": "Fever with cough for three days."
                }))
                .into_response()
            }),
        );
        let base = spawn_server(router).await;

        let result = client_for(&base).submit_triage(&sample_request()).await.unwrap();
        assert_eq!(result.triage_category, "Moderate");
        assert_eq!(result.recommendation, "Schedule Appointment");
        assert_eq!(result.patient_id.as_deref(), Some("p-1"));
    }

    #[tokio::test]
    async fn test_error_detail_is_surfaced() {
        let router = Router::new().route(
            "/direct-triage",
            post(|| async {
                (
                    axum::http::StatusCode::UNPROCESSABLE_ENTITY,
                    Json(json!({"detail": "age must be a number"})),
                )
            }),
        );
        let base = spawn_server(router).await;

        let err = client_for(&base).submit_triage(&sample_request()).await.unwrap_err();
        match err {
            TriageError::Service { status, detail } => {
                assert_eq!(status, 422);
                assert_eq!(detail, "age must be a number");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unparsable_error_body_falls_back_to_status_text() {
        let router = Router::new().route(
            "/get-patients",
            get(|| async { (axum::http::StatusCode::INTERNAL_SERVER_ERROR, "<html>boom</html>") }),
        );
        let base = spawn_server(router).await;

        let err = client_for(&base).get_patients().await.unwrap_err();
        assert_eq!(err.to_string(), "API Error (500): Internal Server Error");
    }

    #[tokio::test]
    async fn test_service_error_in_success_body() {
        let router = Router::new().route(
            "/direct-triage",
            post(|| async { Json(json!({"error": "Triage model not loaded. Please train the model first."})) }),
        );
        let base = spawn_server(router).await;

        let err = client_for(&base).submit_triage(&sample_request()).await.unwrap_err();
        match err {
            TriageError::Service { status, detail } => {
                assert_eq!(status, 200);
                assert!(detail.contains("model not loaded"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_connection_refused_is_backend_unreachable() {
        // 绑定后立即释放，得到一个无人监听的端口
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let client = client_for(&base);
        let err = client.submit_triage(&sample_request()).await.unwrap_err();
        match &err {
            TriageError::BackendUnreachable { origin } => assert_eq!(origin, &base),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().contains(&base));
    }

    #[tokio::test]
    async fn test_undecodable_success_body_is_unexpected() {
        let router = Router::new().route("/get-patients", get(|| async { "not json" }));
        let base = spawn_server(router).await;

        let err = client_for(&base).get_patients().await.unwrap_err();
        assert!(matches!(err, TriageError::Unexpected(_)));
    }

    #[tokio::test]
    async fn test_get_patients_and_chat() {
        let router = Router::new()
            .route(
                "/get-patients",
                get(|| async {
                    Json(json!([
                        {"id": "a", "name": "Jane Doe", "age": 34, "gender": "female", "triageLevel": "Mild"},
                        {"id": "b", "name": "John Roe", "age": 61}
                    ]))
                }),
            )
            .route(
                "/chat",
                post(|Json(body): Json<Value>| async move {
                    let count = body["messages"].as_array().map(|m| m.len()).unwrap_or(0);
                    Json(json!({"reply": format!("received {} messages", count)}))
                }),
            );
        let base = spawn_server(router).await;
        let client = client_for(&base);

        let patients = client.get_patients().await.unwrap();
        assert_eq!(patients.len(), 2);
        assert_eq!(patients[0].triage_level.as_deref(), Some("Mild"));
        assert_eq!(patients[1].gender, None);

        let messages = vec![ChatMessage::user("I have a headache")];
        let reply = client.chat(&messages).await.unwrap();
        assert_eq!(reply.reply, "received 1 messages");
    }

    #[tokio::test]
    async fn test_get_patients_with_loosely_typed_ages() {
        let router = Router::new().route(
            "/get-patients",
            get(|| async {
                Json(json!([
                    {"id": "a", "name": "Jane Doe", "age": 34},
                    {"id": "b", "name": "No Age", "age": null},
                    {"id": "c", "name": "Typed Age", "age": "61"},
                    {"id": "d", "name": "Skipped Age", "triage_category": "Mild"}
                ]))
            }),
        );
        let base = spawn_server(router).await;
        let client = client_for(&base);

        let patients = client.get_patients().await.unwrap();
        let ages: Vec<Option<u32>> = patients.iter().map(|p| p.age).collect();
        assert_eq!(ages, vec![Some(34), None, Some(61), None]);
        assert_eq!(patients[3].triage_level.as_deref(), Some("Mild"));
    }

    #[tokio::test]
    async fn test_register_patient_and_chat_with_triage() {
        let router = Router::new()
            .route(
                "/register-patient",
                post(|Json(body): Json<Value>| async move {
                    if body["chiefComplaint"] != json!("chest pain") || body["vitals"]["heartRate"] != json!("110") {
                        return (axum::http::StatusCode::BAD_REQUEST, "bad payload").into_response();
                    }
                    Json(json!({"message": "Patient registered", "patient_id": "p-42"})).into_response()
                }),
            )
            .route(
                "/chat-with-triage",
                post(|| async {
                    Json(json!({
                        "reply": "Please go to the emergency department.",
                        "triage_results": {
                            "category": "Emergency",
                            "recommendation": "Go to ER",
                            "explanation": "Chest pain with tachycardia"
                        }
                    }))
                }),
            );
        let base = spawn_server(router).await;
        let client = client_for(&base);

        let registration = PatientRegistration {
            name: "John Roe".to_string(),
            age: 61,
            gender: "male".to_string(),
            chief_complaint: "chest pain".to_string(),
            pain_level: "8".to_string(),
            vitals: triage_core::RegistrationVitals {
                heart_rate: Some("110".to_string()),
                ..Default::default()
            },
            additional_symptoms: None,
            medical_history: None,
        };
        let receipt = client.register_patient(&registration).await.unwrap();
        assert_eq!(receipt.patient_id.as_deref(), Some("p-42"));

        let reply = client
            .chat_with_triage(&[ChatMessage::user("crushing chest pain")])
            .await
            .unwrap();
        assert_eq!(reply.triage_results.unwrap().category, "Emergency");
    }

    #[test]
    fn test_extract_error_detail() {
        assert_eq!(
            extract_error_detail(r#"{"message":"bad input"}"#, StatusCode::BAD_REQUEST),
            "bad input"
        );
        assert_eq!(
            extract_error_detail(r#"{"detail":[{"loc":["age"]}]}"#, StatusCode::UNPROCESSABLE_ENTITY),
            r#"[{"loc":["age"]}]"#
        );
        assert_eq!(
            extract_error_detail(r#"{"other":1}"#, StatusCode::NOT_FOUND),
            "Not Found"
        );
        assert_eq!(extract_error_detail("", StatusCode::BAD_GATEWAY), "Bad Gateway");
    }
}
