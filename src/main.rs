use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use ams_orders::models::{Credentials, UiEvent};
use ams_orders::utils::logging::{log_startup, print_final_outcome};
use ams_orders::{
    logger, Config, PdbsProducer, ProgressSink, ReportPipeline, RunCredentials, SapProducer,
    SessionLock, SnapshotEngine, TaskKind, TaskOrchestrator,
};

/// 每日订单报表自动化
#[derive(Debug, Parser)]
#[command(name = "ams_orders", version)]
struct Cli {
    /// 要运行的任务
    #[arg(value_enum)]
    task: TaskKind,

    /// 配置文件搜索起点（默认当前目录）
    #[arg(long)]
    config_dir: Option<PathBuf>,

    /// PDBS 用户名
    #[arg(long, env = "PDBS_USERNAME", default_value = "")]
    web_user: String,

    /// PDBS 密码
    #[arg(long, env = "PDBS_PASSWORD", hide_env_values = true, default_value = "")]
    web_password: String,

    /// SAP 用户名
    #[arg(long, env = "SAP_USERNAME", default_value = "")]
    sap_user: String,

    /// SAP 密码
    #[arg(long, env = "SAP_PASSWORD", hide_env_values = true, default_value = "")]
    sap_password: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 加载配置
    let start_dir = match cli.config_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("无法获取当前目录")?,
    };
    let config = Config::load(&start_dir)?;

    // 初始化日志
    let log_path = logger::init(&config.log_dir)?;
    log_startup(cli.task, &config);

    let engine = Arc::new(SnapshotEngine::new());
    let lock = SessionLock::new();
    let lock_timeout = config.report.session_lock_timeout();

    let web = PdbsProducer::new(
        config.web.clone(),
        config.work_dir.clone(),
        engine.clone(),
        lock.clone(),
        lock_timeout,
    );
    let sap = SapProducer::new(config.sap.clone(), config.work_dir.clone());
    let report = ReportPipeline::new(engine, lock, config.report.clone(), config.work_dir.clone());

    let (sink, mut events) = ProgressSink::channel();
    let orchestrator = TaskOrchestrator::new(Arc::new(web), Arc::new(sap), Arc::new(report), sink);

    let credentials = RunCredentials {
        web: Credentials::new(cli.web_user, cli.web_password),
        sap: Credentials::new(cli.sap_user, cli.sap_password),
    };
    let handle = orchestrator.spawn(cli.task, credentials)?;

    // 前端：逐行打印进度
    while let Some(event) = events.recv().await {
        match event {
            UiEvent::Line(line) => println!("{}", line),
            UiEvent::Finished { success, message } => {
                println!("{} {}", if success { "✅" } else { "❌" }, message);
                break;
            }
        }
    }

    let summary = handle.await.context("后台任务异常退出")?;
    print_final_outcome(&summary, &log_path);
    if !summary.success() {
        std::process::exit(1);
    }
    Ok(())
}
