use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 目标不存在（工作簿、列、关键字行）
    #[error("未找到: {0}")]
    NotFound(#[from] NotFoundError),
    /// 超时（锁、异步计算、子任务）
    #[error("超时: {0}")]
    Timeout(#[from] TimeoutError),
    /// 外部自动化会话错误
    #[error("外部会话错误: {0}")]
    Session(#[from] SessionError),
    /// 登录凭据被拒绝
    #[error("认证错误: {0}")]
    Auth(#[from] AuthError),
    /// 浏览器相关错误
    #[error("浏览器错误: {0}")]
    Browser(#[from] BrowserError),
    /// 文件操作错误
    #[error("文件错误: {0}")]
    File(#[from] FileError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 组合任务部分失败
    #[error("部分成功: {succeeded} ✓, {failed} ✗ ({reason})")]
    PartialFailure {
        succeeded: String,
        failed: String,
        reason: String,
    },
    /// 已有任务在运行
    #[error("已有任务正在运行，请等待其完成")]
    AlreadyRunning,
    /// 其他错误
    #[error("{0}")]
    Other(String),
}

/// 目标不存在
#[derive(Debug, Error)]
pub enum NotFoundError {
    /// 工作目录中没有匹配的引擎工作簿
    #[error("工作目录 {dir} 中没有匹配 {patterns} 的工作簿")]
    EngineWorkbook { dir: PathBuf, patterns: String },
    /// 工作表不存在
    #[error("工作表 '{0}' 不存在")]
    Sheet(String),
    /// 数据透视表不存在
    #[error("数据透视表 '{sheet}!{pivot}' 不存在")]
    Pivot { sheet: String, pivot: String },
    /// 列表不存在
    #[error("表格 '{sheet}!{table}' 不存在")]
    Table { sheet: String, table: String },
    /// 目标列标题不存在
    #[error("{table} 中没有列 '{header}'")]
    Column { table: String, header: String },
    /// 关键字行不存在
    #[error("{source_ref} 中找不到关键字 '{keyword}'")]
    KeywordRow { source_ref: String, keyword: String },
}

/// 超时
#[derive(Debug, Error)]
pub enum TimeoutError {
    /// 等待会话锁超时
    #[error("等待外部会话锁超过 {0:?}")]
    SessionLock(Duration),
    /// 子任务超时
    #[error("子任务未在 {timeout:?} 内完成: {jobs}")]
    SubJobs { jobs: String, timeout: Duration },
    /// 下载超时
    #[error("等待下载 '{prefix}' 超过 {timeout:?}")]
    Download { prefix: String, timeout: Duration },
}

/// 外部自动化会话错误
#[derive(Debug, Error)]
pub enum SessionError {
    /// 会话调用失败
    #[error("{operation} 失败: {message}")]
    CommandFailed { operation: String, message: String },
    /// 单元格超出表格范围
    #[error("表格 '{table}' 没有第 {row} 行第 {column} 列")]
    OutOfRange {
        table: String,
        row: usize,
        column: usize,
    },
    /// 外部进程以非零状态退出
    #[error("进程 '{program}' 退出状态 {status}")]
    ProcessExit { program: String, status: String },
}

/// 登录凭据被拒绝
#[derive(Debug, Error)]
pub enum AuthError {
    /// 用户名或密码错误
    #[error("用户名或密码无效: {0}")]
    InvalidCredentials(String),
    /// 服务器无响应
    #[error("登录失败，服务器无响应")]
    NoResponse,
}

/// 浏览器相关错误
#[derive(Debug, Error)]
pub enum BrowserError {
    /// 浏览器配置失败
    #[error("浏览器配置失败: {0}")]
    ConfigurationFailed(String),
    /// CDP 调用失败
    #[error(transparent)]
    Cdp(#[from] chromiumoxide::error::CdpError),
    /// 页面脚本返回了意外的结果
    #[error("页面脚本失败: {0}")]
    Script(String),
}

/// 文件操作错误
#[derive(Debug, Error)]
pub enum FileError {
    /// IO 失败
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
    /// 快照解析失败
    #[error("无法解析工作簿快照 {path}: {source}")]
    Snapshot {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    /// glob 模式无效
    #[error(transparent)]
    Pattern(#[from] glob::PatternError),
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 配置文件不存在
    #[error("找不到 config.toml 或 config.example.toml (搜索起点: {0})")]
    FileNotFound(PathBuf),
    /// TOML 解析失败
    #[error("无法解析配置文件 {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    /// 首次使用时缺少键
    #[error("配置缺少键 '{0}'")]
    MissingKey(&'static str),
}

// ========== 从常见错误类型转换 ==========

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::File(FileError::Io {
            context: "IO 错误".to_string(),
            source: err,
        })
    }
}

impl From<chromiumoxide::error::CdpError> for AppError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        AppError::Browser(BrowserError::Cdp(err))
    }
}

impl From<glob::PatternError> for AppError {
    fn from(err: glob::PatternError) -> Self {
        AppError::File(FileError::Pattern(err))
    }
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建外部会话调用失败错误
    pub fn session(operation: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Session(SessionError::CommandFailed {
            operation: operation.into(),
            message: message.into(),
        })
    }

    /// 创建带上下文的 IO 错误
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        AppError::File(FileError::Io {
            context: context.into(),
            source,
        })
    }

    /// 创建页面脚本错误
    pub fn script(message: impl Into<String>) -> Self {
        AppError::Browser(BrowserError::Script(message.into()))
    }

    /// 是否为"未找到"类错误
    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::NotFound(_))
    }

    /// 是否为超时类错误
    pub fn is_timeout(&self) -> bool {
        matches!(self, AppError::Timeout(_))
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_nests_family_message() {
        let err = AppError::from(NotFoundError::KeywordRow {
            source_ref: "UTILITY!PivotTable6".to_string(),
            keyword: "eStore".to_string(),
        });
        assert!(err.is_not_found());
        assert_eq!(
            err.to_string(),
            "未找到: UTILITY!PivotTable6 中找不到关键字 'eStore'"
        );
    }

    #[test]
    fn test_partial_failure_names_both_sides() {
        let err = AppError::PartialFailure {
            succeeded: "PDBS".to_string(),
            failed: "SAP".to_string(),
            reason: "登录失败".to_string(),
        };
        assert_eq!(err.to_string(), "部分成功: PDBS ✓, SAP ✗ (登录失败)");
    }

    #[test]
    fn test_timeout_classification() {
        let err = AppError::from(TimeoutError::SessionLock(Duration::from_secs(60)));
        assert!(err.is_timeout());
        assert!(!err.is_not_found());
    }
}
