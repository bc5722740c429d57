//! 远程分诊服务的接口定义

use reqwest::Method;

/// 远程服务提供的接口
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Root,
    Chat,
    ChatWithTriage,
    GetPatients,
    RegisterPatient,
    DirectTriage,
}

impl Endpoint {
    /// 接口路径
    pub fn path(&self) -> &'static str {
        match self {
            Self::Root => "/",
            Self::Chat => "/chat",
            Self::ChatWithTriage => "/chat-with-triage",
            Self::GetPatients => "/get-patients",
            Self::RegisterPatient => "/register-patient",
            Self::DirectTriage => "/direct-triage",
        }
    }

    /// 请求方法，只有探活和患者列表是 GET
    pub fn method(&self) -> Method {
        match self {
            Self::Root | Self::GetPatients => Method::GET,
            _ => Method::POST,
        }
    }

    /// 可以安全自动重试的接口
    pub fn is_idempotent(&self) -> bool {
        self.method() == Method::GET
    }
}

/// 基于配置的基础地址拼接完整接口URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiEndpoints {
    origin: String,
}

impl ApiEndpoints {
    /// 去掉末尾斜杠后保存服务地址
    pub fn new(base_url: &str) -> Self {
        Self {
            origin: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// 不带末尾斜杠的服务地址
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// 接口的完整URL
    pub fn url(&self, endpoint: Endpoint) -> String {
        format!("{}{}", self.origin, endpoint.path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls_are_derived_from_origin() {
        let endpoints = ApiEndpoints::new("http://127.0.0.1:8000/");
        assert_eq!(endpoints.origin(), "http://127.0.0.1:8000");
        assert_eq!(
            endpoints.url(Endpoint::DirectTriage),
            "http://127.0.0.1:8000/direct-triage"
        );
        assert_eq!(endpoints.url(Endpoint::Root), "http://127.0.0.1:8000/");
    }

    #[test]
    fn test_only_reads_are_idempotent() {
        assert!(Endpoint::GetPatients.is_idempotent());
        assert!(Endpoint::Root.is_idempotent());
        assert!(!Endpoint::DirectTriage.is_idempotent());
        assert!(!Endpoint::RegisterPatient.is_idempotent());
    }
}
