//! 后端探活
//!
//! 启动时探测一次服务可用性，之后只在手动重试或后台轮询时再次探测。
//! 每次探测都领取一个递增的代号，完成时若代号已不是最新的，结果直接丢弃，
//! 避免慢的旧探测覆盖新结果。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use triage_core::{ApiStatus, Result, TriageError};

use crate::api::Endpoint;
use crate::client::ApiClient;
use crate::config::HealthConfig;

/// 探活能力
#[async_trait]
pub trait LivenessProbe: Send + Sync {
    /// 服务地址，用于提示信息
    fn origin(&self) -> &str;

    /// 请求服务根路径，成功状态码返回 `Ok(())`
    async fn check_liveness(&self) -> Result<()>;
}

#[async_trait]
impl LivenessProbe for ApiClient {
    fn origin(&self) -> &str {
        ApiClient::origin(self)
    }

    async fn check_liveness(&self) -> Result<()> {
        let url = self.endpoints().url(Endpoint::Root);
        let response = self.http().get(&url).send().await.map_err(|e| {
            debug!("Liveness probe to {} failed: {}", url, e);
            TriageError::BackendUnreachable {
                origin: ApiClient::origin(self).to_string(),
            }
        })?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(TriageError::Service {
                status: status.as_u16(),
                detail: status.canonical_reason().unwrap_or_default().to_string(),
            })
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct HealthState {
    status: ApiStatus,
    last_checked: Option<DateTime<Utc>>,
}

/// 服务可用状态监视器
pub struct HealthMonitor {
    probe: Arc<dyn LivenessProbe>,
    timeout: Duration,
    state: RwLock<HealthState>,
    generation: AtomicU64,
    retrying: AtomicBool,
}

/// 重试结束（包括被取消）时释放重试标记
struct RetryGuard<'a>(&'a AtomicBool);

impl Drop for RetryGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl HealthMonitor {
    pub fn new(probe: Arc<dyn LivenessProbe>, timeout: Duration) -> Self {
        Self {
            probe,
            timeout,
            state: RwLock::new(HealthState {
                status: ApiStatus::Checking,
                last_checked: None,
            }),
            generation: AtomicU64::new(0),
            retrying: AtomicBool::new(false),
        }
    }

    pub fn from_config(probe: Arc<dyn LivenessProbe>, config: &HealthConfig) -> Self {
        Self::new(probe, config.probe_timeout())
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn status(&self) -> ApiStatus {
        self.state.read().await.status
    }

    /// 最近一次被采纳的探测时间
    pub async fn last_checked(&self) -> Option<DateTime<Utc>> {
        self.state.read().await.last_checked
    }

    /// 是否有手动重试正在进行
    pub fn is_retrying(&self) -> bool {
        self.retrying.load(Ordering::Acquire)
    }

    /// 离线时展示给操作员的提示
    pub fn offline_message(&self) -> String {
        format!(
            "Cannot connect to the backend server. Please ensure the server is running at {}.",
            self.probe.origin()
        )
    }

    /// 探测一次，返回探测后的当前状态
    pub async fn probe(&self) -> ApiStatus {
        let token = self.next_generation();
        self.run_probe(token).await
    }

    /// 手动重试：先进入 `Checking`，再探测。已有重试进行中时不再发起请求。
    pub async fn retry(&self) -> ApiStatus {
        if self
            .retrying
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Retry already in progress, ignoring");
            return self.status().await;
        }
        let _guard = RetryGuard(&self.retrying);

        info!("Retrying backend connection at {}", self.probe.origin());
        let token = self.next_generation();
        self.state.write().await.status = ApiStatus::Checking;
        self.run_probe(token).await
    }

    /// 启动时的首次探测
    pub fn spawn_initial_probe(self: &Arc<Self>) -> JoinHandle<ApiStatus> {
        let monitor = Arc::clone(self);
        tokio::spawn(async move { monitor.probe().await })
    }

    /// 后台定期探测，不会重新进入 `Checking`
    pub fn spawn_periodic(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let status = monitor.probe().await;
                debug!("Periodic health probe: {}", status.as_str());
            }
        })
    }

    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    async fn run_probe(&self, token: u64) -> ApiStatus {
        let observed = match tokio::time::timeout(self.timeout, self.probe.check_liveness()).await {
            Ok(Ok(())) => ApiStatus::Online,
            Ok(Err(e)) => {
                warn!("Backend health check failed: {}", e);
                ApiStatus::Offline
            }
            Err(_) => {
                warn!(
                    "Backend health check timed out after {}ms",
                    self.timeout.as_millis()
                );
                ApiStatus::Offline
            }
        };

        let mut state = self.state.write().await;
        if self.generation.load(Ordering::Acquire) != token {
            debug!("Discarding stale health probe result #{}", token);
            return state.status;
        }
        if state.status != observed {
            info!("Backend status changed: {} -> {}", state.status.as_str(), observed.as_str());
        }
        state.status = observed;
        state.last_checked = Some(Utc::now());
        observed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    /// 按顺序返回预设结果的探针
    struct ScriptedProbe {
        script: Mutex<VecDeque<(Duration, bool)>>,
        calls: AtomicUsize,
    }

    impl ScriptedProbe {
        fn new(script: Vec<(Duration, bool)>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LivenessProbe for ScriptedProbe {
        fn origin(&self) -> &str {
            "http://127.0.0.1:8000"
        }

        async fn check_liveness(&self) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let (delay, ok) = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or((Duration::ZERO, true));
            tokio::time::sleep(delay).await;
            if ok {
                Ok(())
            } else {
                Err(TriageError::BackendUnreachable {
                    origin: self.origin().to_string(),
                })
            }
        }
    }

    fn monitor(probe: Arc<ScriptedProbe>) -> Arc<HealthMonitor> {
        Arc::new(HealthMonitor::new(probe, Duration::from_millis(5000)))
    }

    #[tokio::test]
    async fn test_starts_checking_then_online() {
        let probe = ScriptedProbe::new(vec![(Duration::ZERO, true)]);
        let monitor = monitor(probe);
        assert_eq!(monitor.status().await, ApiStatus::Checking);
        assert!(monitor.last_checked().await.is_none());

        let status = monitor.spawn_initial_probe().await.unwrap();
        assert_eq!(status, ApiStatus::Online);
        assert_eq!(monitor.status().await, ApiStatus::Online);
        assert!(monitor.last_checked().await.is_some());
    }

    #[tokio::test]
    async fn test_failed_probe_is_offline() {
        let probe = ScriptedProbe::new(vec![(Duration::ZERO, false)]);
        let monitor = monitor(probe);
        assert_eq!(monitor.probe().await, ApiStatus::Offline);
        assert!(monitor.offline_message().contains("http://127.0.0.1:8000"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_times_out_at_configured_bound() {
        let probe = ScriptedProbe::new(vec![(Duration::from_secs(30), true)]);
        let monitor = monitor(probe);

        let started = tokio::time::Instant::now();
        let status = monitor.probe().await;
        let elapsed = started.elapsed();

        assert_eq!(status, ApiStatus::Offline);
        assert!(elapsed >= Duration::from_millis(5000), "fired early: {elapsed:?}");
        assert!(elapsed < Duration::from_millis(5050), "fired late: {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_probe_does_not_overwrite_newer_result() {
        // 第一次探测慢且成功，第二次快且失败
        let probe = ScriptedProbe::new(vec![
            (Duration::from_secs(3), true),
            (Duration::from_secs(1), false),
        ]);
        let monitor = monitor(probe);

        let slow = {
            let monitor = Arc::clone(&monitor);
            tokio::spawn(async move { monitor.probe().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(monitor.probe().await, ApiStatus::Offline);
        assert_eq!(slow.await.unwrap(), ApiStatus::Offline);
        assert_eq!(monitor.status().await, ApiStatus::Offline);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_retries_issue_one_request() {
        let probe = ScriptedProbe::new(vec![
            (Duration::ZERO, false),
            (Duration::from_secs(2), true),
        ]);
        let monitor = monitor(Arc::clone(&probe));
        assert_eq!(monitor.probe().await, ApiStatus::Offline);

        let first = {
            let monitor = Arc::clone(&monitor);
            tokio::spawn(async move { monitor.retry().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(monitor.is_retrying());
        assert_eq!(monitor.status().await, ApiStatus::Checking);

        // 第二次重试不发请求，直接返回当前状态
        assert_eq!(monitor.retry().await, ApiStatus::Checking);
        assert_eq!(probe.calls(), 2);

        assert_eq!(first.await.unwrap(), ApiStatus::Online);
        assert!(!monitor.is_retrying());
        assert_eq!(probe.calls(), 2);
    }

    #[tokio::test]
    async fn test_api_client_probes_service_root() {
        use crate::config::ClientConfig;
        use axum::routing::get;
        use axum::Router;

        let router = Router::new().route("/", get(|| async { "ok" }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let client = ApiClient::new(&ClientConfig::with_base_url(&base)).unwrap();
        let monitor = HealthMonitor::new(Arc::new(client), Duration::from_secs(5));
        assert_eq!(monitor.probe().await, ApiStatus::Online);

        // 不存在的路径返回404，不算在线
        let client = ApiClient::new(&ClientConfig::with_base_url(&format!("{}/missing", base))).unwrap();
        assert!(matches!(
            client.check_liveness().await,
            Err(TriageError::Service { status: 404, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_probe_keeps_status_fresh() {
        let probe = ScriptedProbe::new(vec![
            (Duration::ZERO, true),
            (Duration::ZERO, false),
        ]);
        let monitor = monitor(Arc::clone(&probe));
        assert_eq!(monitor.probe().await, ApiStatus::Online);

        let handle = monitor.spawn_periodic(Duration::from_secs(10));
        tokio::time::sleep(Duration::from_secs(11)).await;
        handle.abort();

        assert_eq!(probe.calls(), 2);
        assert_eq!(monitor.status().await, ApiStatus::Offline);
    }
}
