//! 任务与结果类型

use std::fmt;

use clap::ValueEnum;

/// 可运行的任务
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum TaskKind {
    /// 门户网站下载
    #[value(name = "website")]
    WebsiteDownload,
    /// ERP 导出
    #[value(name = "sap")]
    SapExtraction,
    /// 报表工作簿更新
    #[value(name = "excel-report")]
    ExcelReport,
    /// 两个下载并行
    Both,
    /// 两个下载并行，成功后更新报表
    All,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskKind::WebsiteDownload => "PDBS 下载",
            TaskKind::SapExtraction => "SAP 导出",
            TaskKind::ExcelReport => "Excel 报表",
            TaskKind::Both => "PDBS + SAP",
            TaskKind::All => "完整下载 + Excel",
        };
        f.write_str(name)
    }
}

/// 单个任务的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Success,
    Failure(String),
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Success)
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            TaskOutcome::Success => None,
            TaskOutcome::Failure(reason) => Some(reason),
        }
    }
}

impl<E: fmt::Display> From<Result<(), E>> for TaskOutcome {
    fn from(result: Result<(), E>) -> Self {
        match result {
            Ok(()) => TaskOutcome::Success,
            Err(e) => TaskOutcome::Failure(e.to_string()),
        }
    }
}

/// 编排器状态：`Idle → Running → {Succeeded, PartiallyFailed, Failed}`
///
/// 编排器本身只停留在 `Idle` / `Running`，终态随 [`RunSummary`] 返回。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Succeeded,
    PartiallyFailed,
    Failed,
}

/// 一次运行的最终汇总
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub task: TaskKind,
    pub state: RunState,
    pub message: String,
}

impl RunSummary {
    pub fn success(&self) -> bool {
        self.state == RunState::Succeeded
    }
}

/// 登录凭据
#[derive(Clone, Default)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// 两套登录凭据（门户 / ERP）
#[derive(Debug, Clone, Default)]
pub struct RunCredentials {
    pub web: Credentials,
    pub sap: Credentials,
}
