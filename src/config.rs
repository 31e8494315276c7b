//! 程序配置
//!
//! 从 `config.toml` 读取（找不到时退回 `config.example.toml` 并给出警告），
//! 再用环境变量覆盖。生产者专用的键在首次使用时才校验。

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{info, warn};

use crate::error::{AppResult, ConfigError};

const CONFIG_FILE: &str = "config.toml";
const EXAMPLE_CONFIG_FILE: &str = "config.example.toml";
/// 向上查找配置文件的最大层数
const SEARCH_DEPTH: usize = 4;

/// 程序配置
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 工作目录（下载文件、引擎工作簿所在目录）
    pub work_dir: PathBuf,
    /// 日志目录
    pub log_dir: PathBuf,
    pub sap: SapConfig,
    pub web: WebConfig,
    pub report: ReportConfig,
}

/// ERP 连接参数
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct SapConfig {
    pub saplogon_path: Option<PathBuf>,
    pub sapshcut_path: Option<PathBuf>,
    pub system: Option<String>,
    pub client: Option<String>,
    pub language: Option<String>,
    pub variant_username: Option<String>,
    /// 事务脚本的宿主程序（例如 cscript）
    pub script_host: Option<PathBuf>,
    pub scripts_dir: Option<PathBuf>,
    /// 单个事务脚本超时（秒）
    pub transaction_timeout_secs: u64,
}

/// 门户参数
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    pub pdbs_url: Option<String>,
    pub browser_executable: Option<PathBuf>,
    /// 设置后连接到已打开的浏览器而不是启动新浏览器
    pub browser_debug_port: Option<u16>,
    pub headless: bool,
    pub download_timeout_secs: u64,
}

/// 报表流水线参数
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// 引擎工作簿的文件名模式，靠前者优先
    pub engine_patterns: Vec<String>,
    pub refresh_cycles: u32,
    pub refresh_wait_secs: u64,
    pub final_wait_secs: u64,
    pub session_lock_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("."),
            log_dir: PathBuf::from("logs"),
            sap: SapConfig::default(),
            web: WebConfig::default(),
            report: ReportConfig::default(),
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            pdbs_url: None,
            browser_executable: None,
            browser_debug_port: None,
            headless: true,
            download_timeout_secs: 300,
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            engine_patterns: vec![
                "*AO MO SO CHECKER*.xlsm".to_string(),
                "*AO MO SO CHECKER*.xlsx".to_string(),
            ],
            refresh_cycles: 3,
            refresh_wait_secs: 120,
            final_wait_secs: 60,
            session_lock_timeout_secs: 60,
        }
    }
}

impl Config {
    /// 从 `start_dir` 向上查找并加载配置，然后应用环境变量覆盖
    pub fn load(start_dir: &Path) -> AppResult<Self> {
        let path = find_config_file(start_dir)?;
        Ok(Self::from_file(&path)?.with_env_overrides())
    }

    /// 解析单个 TOML 文件
    pub fn from_file(path: &Path) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::error::AppError::io(format!("无法读取 {}", path.display()), e))?;
        let config = Self::from_toml_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!("✓ 已加载配置: {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// 环境变量覆盖
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("AMS_WORK_DIR") {
            self.work_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("AMS_LOG_DIR") {
            self.log_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("PDBS_URL") {
            self.web.pdbs_url = Some(v);
        }
        if let Ok(v) = std::env::var("SAP_SYSTEM") {
            self.sap.system = Some(v);
        }
        if let Ok(v) = std::env::var("SAP_CLIENT") {
            self.sap.client = Some(v);
        }
        self
    }
}

impl SapConfig {
    pub fn saplogon_path(&self) -> AppResult<&Path> {
        require(self.saplogon_path.as_deref(), "sap.saplogon_path")
    }

    pub fn sapshcut_path(&self) -> AppResult<&Path> {
        require(self.sapshcut_path.as_deref(), "sap.sapshcut_path")
    }

    pub fn system(&self) -> AppResult<&str> {
        require(self.system.as_deref(), "sap.system")
    }

    pub fn client(&self) -> AppResult<&str> {
        require(self.client.as_deref(), "sap.client")
    }

    pub fn language(&self) -> &str {
        self.language.as_deref().unwrap_or("EN")
    }

    pub fn variant_username(&self) -> AppResult<&str> {
        require(self.variant_username.as_deref(), "sap.variant_username")
    }

    pub fn script_host(&self) -> AppResult<&Path> {
        require(self.script_host.as_deref(), "sap.script_host")
    }

    pub fn scripts_dir(&self) -> AppResult<&Path> {
        require(self.scripts_dir.as_deref(), "sap.scripts_dir")
    }

    pub fn transaction_timeout(&self) -> Duration {
        if self.transaction_timeout_secs == 0 {
            Duration::from_secs(600)
        } else {
            Duration::from_secs(self.transaction_timeout_secs)
        }
    }
}

impl WebConfig {
    pub fn pdbs_url(&self) -> AppResult<&str> {
        require(self.pdbs_url.as_deref(), "web.pdbs_url")
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }
}

impl ReportConfig {
    pub fn refresh_wait(&self) -> Duration {
        Duration::from_secs(self.refresh_wait_secs)
    }

    pub fn final_wait(&self) -> Duration {
        Duration::from_secs(self.final_wait_secs)
    }

    pub fn session_lock_timeout(&self) -> Duration {
        Duration::from_secs(self.session_lock_timeout_secs)
    }
}

fn require<'a, T: ?Sized>(value: Option<&'a T>, key: &'static str) -> AppResult<&'a T> {
    value.ok_or_else(|| ConfigError::MissingKey(key).into())
}

/// 从 `start_dir` 起最多向上 3 层查找 config.toml / config.example.toml
fn find_config_file(start_dir: &Path) -> AppResult<PathBuf> {
    for dir in start_dir.ancestors().take(SEARCH_DEPTH) {
        let config = dir.join(CONFIG_FILE);
        if config.exists() {
            return Ok(config);
        }
        let example = dir.join(EXAMPLE_CONFIG_FILE);
        if example.exists() {
            warn!(
                "⚠️ 未找到 {}，使用 {} 中的默认值。请复制一份并填写实际值。",
                CONFIG_FILE,
                example.display()
            );
            return Ok(example);
        }
    }
    Err(ConfigError::FileNotFound(start_dir.to_path_buf()).into())
}
