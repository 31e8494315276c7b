//! ERP 导出生产者
//!
//! 流程：启动登录面板 → 快捷方式登录 → 三个事务脚本并发执行 → 备份 DAILY MO MB25。
//! 事务脚本由配置的脚本宿主作为子进程运行；登录面板进程在任何退出路径上都会被结束。

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use tokio::process::{Child, Command};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::sub_jobs::{join_sub_jobs, SubJob};
use super::DownloadProducer;
use crate::config::SapConfig;
use crate::error::{AppError, AppResult, SessionError};
use crate::models::{Credentials, ProgressSink};
use crate::services::business_day::previous_business_day;
use crate::services::file_utils::find_and_copy_file;

/// 导出后需要备份的文件前缀
const DAILY_EXPORT_PREFIX: &str = "DAILY MO MB25";

/// 单个 ERP 事务
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transaction {
    /// 子任务名（日志与超时报告使用）
    pub name: &'static str,
    /// 脚本文件名（位于 scripts_dir）
    pub script: &'static str,
    /// 使用第几个会话窗口
    pub session_index: usize,
    /// 事务代码
    pub code: &'static str,
    /// 选择变式
    pub variant: &'static str,
    pub export_file: &'static str,
}

/// 三个并发事务
pub const TRANSACTIONS: [Transaction; 3] = [
    Transaction {
        name: "MO_Backorders",
        script: "mo_backorders.vbs",
        session_index: 0,
        code: "MB25",
        variant: "MO CHECKER",
        export_file: "MB25 Backorders.XLSX",
    },
    Transaction {
        name: "MB51",
        script: "mb51.vbs",
        session_index: 1,
        code: "MB51",
        variant: "MB51 CHECKER",
        export_file: "MB51.XLSX",
    },
    Transaction {
        name: "DAILY_MO_MB25",
        script: "daily_mo_mb25.vbs",
        session_index: 2,
        code: "MB25",
        variant: "DAILY MO MB25",
        export_file: "DAILY MO MB25.XLSX",
    },
];

/// 登录阶段的等待时间
#[derive(Debug, Clone, Copy)]
pub struct SapTimings {
    /// 启动登录面板后
    pub logon_pad: Duration,
    /// 快捷方式登录后
    pub login: Duration,
}

impl Default for SapTimings {
    fn default() -> Self {
        Self {
            logon_pad: Duration::from_secs(7),
            login: Duration::from_secs(5),
        }
    }
}

/// ERP 导出生产者
pub struct SapProducer {
    config: SapConfig,
    work_dir: PathBuf,
    timings: SapTimings,
}

impl SapProducer {
    pub fn new(config: SapConfig, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            work_dir: work_dir.into(),
            timings: SapTimings::default(),
        }
    }

    pub fn with_timings(mut self, timings: SapTimings) -> Self {
        self.timings = timings;
        self
    }

    /// 启动登录面板
    fn start_logon_pad(path: &Path) -> AppResult<Child> {
        Command::new(path)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AppError::io(format!("无法启动 {}", path.display()), e))
    }

    /// 通过快捷方式程序登录
    async fn login(&self, credentials: &Credentials) -> AppResult<()> {
        let sapshcut = self.config.sapshcut_path()?;
        let status = Command::new(sapshcut)
            .arg(format!("-system={}", self.config.system()?))
            .arg(format!("-client={}", self.config.client()?))
            .arg(format!("-user={}", credentials.username))
            .arg(format!("-pw={}", credentials.password))
            .arg(format!("-language={}", self.config.language()))
            .status()
            .await
            .map_err(|e| AppError::io(format!("无法运行 {}", sapshcut.display()), e))?;
        if !status.success() {
            return Err(SessionError::ProcessExit {
                program: sapshcut.display().to_string(),
                status: status.to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// 构建事务脚本命令
    fn transaction_command(
        &self,
        tx: &Transaction,
        today: NaiveDate,
        prev_day: NaiveDate,
    ) -> AppResult<Command> {
        let mut cmd = Command::new(self.config.script_host()?);
        cmd.arg(self.config.scripts_dir()?.join(tx.script))
            .arg(tx.session_index.to_string())
            .arg(tx.code)
            .arg(tx.variant)
            .arg(self.config.variant_username()?)
            .arg(prev_day.format("%m/%d/%Y").to_string())
            .arg(today.format("%m/%d/%Y").to_string())
            .arg(&self.work_dir)
            .arg(tx.export_file)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        Ok(cmd)
    }

    async fn run_transactions(&self, sink: &ProgressSink) -> AppResult<()> {
        let today = Local::now().date_naive();
        let prev_day = previous_business_day(today);
        info!(
            "[SAP] 今天: {}，上一个工作日: {}",
            today.format("%m/%d/%Y"),
            prev_day.format("%m/%d/%Y")
        );

        let mut jobs = Vec::with_capacity(TRANSACTIONS.len());
        for tx in TRANSACTIONS.iter() {
            let cmd = self.transaction_command(tx, today, prev_day)?;
            sink.line(format!("[SAP] ▶ {} ({})", tx.name, tx.code));
            jobs.push(SubJob::spawn(tx.name, run_script(tx.name, cmd)));
        }
        join_sub_jobs(jobs, self.config.transaction_timeout(), sink).await?;

        // DAILY MO MB25 导出后备份一份
        find_and_copy_file(
            &self.work_dir,
            &self.work_dir.join("Backup"),
            DAILY_EXPORT_PREFIX,
            today,
        )
        .await?;
        Ok(())
    }
}

/// 运行一个事务脚本，非零退出码视为会话错误
async fn run_script(name: &'static str, mut cmd: Command) -> AppResult<()> {
    debug!("[SAP] 启动事务脚本 {}", name);
    let output = cmd
        .output()
        .await
        .map_err(|e| AppError::io(format!("无法运行事务脚本 {}", name), e))?;
    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(AppError::session(
            name,
            format!("{} {}", output.status, stderr.trim()),
        ))
    }
}

async fn terminate(mut child: Child, program: &Path) {
    match child.kill().await {
        Ok(()) => debug!("[SAP] 已结束 {}", program.display()),
        Err(e) => warn!("⚠️ [SAP] 结束 {} 失败: {}", program.display(), e),
    }
}

#[async_trait]
impl DownloadProducer for SapProducer {
    fn name(&self) -> &str {
        "SAP"
    }

    async fn run(&self, credentials: &Credentials, sink: &ProgressSink) -> AppResult<()> {
        let logon_path = self.config.saplogon_path()?;
        sink.line("[SAP] 🚀 启动 SAP Logon...");
        let logon_pad = Self::start_logon_pad(logon_path)?;
        sleep(self.timings.logon_pad).await;

        let result: AppResult<()> = async {
            self.login(credentials).await?;
            sink.line("[SAP] ✓ 已登录，等待会话就绪...");
            sleep(self.timings.login).await;
            self.run_transactions(sink).await
        }
        .await;

        terminate(logon_pad, logon_path).await;
        match &result {
            Ok(()) => sink.line("[SAP] ✓ 所有事务已完成"),
            Err(e) => sink.line(format!("[SAP] ❌ {}", e)),
        }
        result
    }
}
