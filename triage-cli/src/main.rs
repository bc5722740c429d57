//! 分诊评估命令行客户端

mod interactive;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};
use triage_client::{ApiClient, ClientConfig, HealthMonitor};
use triage_core::ApiStatus;
use triage_workflow::AssessmentMethod;

/// 未配置轮询间隔时 `status --watch` 使用的间隔
const DEFAULT_WATCH_INTERVAL: Duration = Duration::from_secs(10);

/// 命令行参数
#[derive(Parser, Debug)]
#[command(name = "triage-cli")]
#[command(about = "分诊评估客户端：服务探活、患者列表和交互式分诊评估")]
struct Args {
    /// 配置文件路径
    #[arg(short, long)]
    config: Option<String>,

    /// 分诊服务地址，覆盖配置文件和环境变量
    #[arg(long)]
    api_url: Option<String>,

    /// 日志级别
    #[arg(short, long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 检查分诊服务是否在线
    Status {
        /// 持续监视，输入回车手动重试，Ctrl+C 退出
        #[arg(short, long)]
        watch: bool,
    },
    /// 列出服务端已登记的患者
    Patients,
    /// 交互式分诊评估
    Assess {
        /// 症状采集方式
        #[arg(short, long, value_enum, default_value_t = MethodArg::Structured)]
        method: MethodArg,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum MethodArg {
    Structured,
    Conversational,
}

impl From<MethodArg> for AssessmentMethod {
    fn from(method: MethodArg) -> Self {
        match method {
            MethodArg::Structured => AssessmentMethod::Structured,
            MethodArg::Conversational => AssessmentMethod::Conversational,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(&args.log_level)
        .init();

    let mut config = ClientConfig::load(args.config.as_deref()).context("加载客户端配置失败")?;
    if let Some(api_url) = &args.api_url {
        config.api.base_url = api_url.trim_end_matches('/').to_string();
        config.validate().context("服务地址无效")?;
    }
    info!("分诊服务地址: {}", config.api.base_url);

    let client = Arc::new(ApiClient::new(&config)?);

    let outcome = match args.command {
        Command::Status { watch } => run_status(client, &config, watch).await,
        Command::Patients => run_patients(&client).await,
        Command::Assess { method } => interactive::run_assessment(&client, method.into()).await,
    };

    if let Err(e) = &outcome {
        error!("命令执行失败: {:#}", e);
    }
    outcome
}

/// 服务探活
async fn run_status(client: Arc<ApiClient>, config: &ClientConfig, watch: bool) -> Result<()> {
    let monitor = Arc::new(HealthMonitor::from_config(client, &config.health));
    println!("Checking backend status...");
    let status = monitor.spawn_initial_probe().await?;
    print_status(&monitor, status).await;

    if !watch {
        return Ok(());
    }

    let interval = config.health.poll_interval().unwrap_or(DEFAULT_WATCH_INTERVAL);
    let poller = monitor.spawn_periodic(interval);
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("Watching every {}s. Press Enter to retry now, Ctrl+C to stop.", interval.as_secs());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                let status = monitor.status().await;
                print_status(&monitor, status).await;
            }
            line = lines.next_line() => {
                if line?.is_none() {
                    break;
                }
                println!("Retrying...");
                let status = monitor.retry().await;
                print_status(&monitor, status).await;
            }
        }
    }

    poller.abort();
    Ok(())
}

async fn print_status(monitor: &HealthMonitor, status: ApiStatus) {
    let checked = monitor
        .last_checked()
        .await
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "never".to_string());
    match status {
        ApiStatus::Online => println!("[{}] backend online", checked),
        ApiStatus::Checking => println!("[{}] checking backend status...", checked),
        ApiStatus::Offline => println!("[{}] backend offline: {}", checked, monitor.offline_message()),
    }
}

/// 患者列表
async fn run_patients(client: &ApiClient) -> Result<()> {
    let patients = client.get_patients().await.context("获取患者列表失败")?;
    if patients.is_empty() {
        println!("No patients registered.");
        return Ok(());
    }

    println!("{:<12} {:<24} {:>4}  {:<10} {:<20} {}", "ID", "NAME", "AGE", "GENDER", "TRIAGE", "COMPLAINT");
    for patient in &patients {
        let age = patient.age.map(|age| age.to_string()).unwrap_or_else(|| "-".to_string());
        println!(
            "{:<12} {:<24} {:>4}  {:<10} {:<20} {}",
            patient.id,
            patient.name,
            age,
            patient.gender.as_deref().unwrap_or("-"),
            patient.triage_level.as_deref().unwrap_or("-"),
            patient.chief_complaint.as_deref().unwrap_or("-"),
        );
    }
    println!("{} patient(s)", patients.len());
    Ok(())
}
