//! 日志初始化
//!
//! 控制台层输出到 stderr（默认 INFO，可用 `RUST_LOG` 覆盖），
//! 文件层写入 `<log_dir>/ams_orders.log`（DEBUG，无颜色）。
//! 启动时日志文件超过 10 MiB 则轮转为 `.1` … `.5`。

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::{AppError, AppResult};

pub const LOG_FILE: &str = "ams_orders.log";
pub const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;
/// 保留的历史日志份数
pub const LOG_GENERATIONS: usize = 5;

const CONSOLE_FILTER: &str = "info";
const FILE_FILTER: &str = "debug,chromiumoxide=warn";

/// 初始化全局日志，返回日志文件路径
pub fn init(log_dir: &Path) -> AppResult<PathBuf> {
    fs::create_dir_all(log_dir)
        .map_err(|e| AppError::io(format!("无法创建日志目录 {}", log_dir.display()), e))?;
    let path = log_dir.join(LOG_FILE);
    rotate_log(&path, MAX_LOG_BYTES, LOG_GENERATIONS)
        .map_err(|e| AppError::io(format!("无法轮转日志 {}", path.display()), e))?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| AppError::io(format!("无法打开日志文件 {}", path.display()), e))?;

    let console = fmt::layer()
        .with_writer(io::stderr)
        .with_target(false)
        .with_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(CONSOLE_FILTER)),
        );
    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .with_filter(EnvFilter::new(FILE_FILTER));

    tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .try_init()
        .map_err(|e| AppError::Other(format!("日志初始化失败: {}", e)))?;
    Ok(path)
}

fn generation(path: &Path, n: usize) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(format!(".{}", n));
    PathBuf::from(name)
}

/// 文件超过 `max_bytes` 时轮转：`log` → `log.1` → … → `log.<generations>`，最旧的一份被删除
///
/// 返回是否发生了轮转。
pub fn rotate_log(path: &Path, max_bytes: u64, generations: usize) -> io::Result<bool> {
    let size = match fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };
    if size <= max_bytes {
        return Ok(false);
    }
    if generations == 0 {
        fs::remove_file(path)?;
        return Ok(true);
    }

    let oldest = generation(path, generations);
    if oldest.exists() {
        fs::remove_file(&oldest)?;
    }
    for n in (1..generations).rev() {
        let from = generation(path, n);
        if from.exists() {
            fs::rename(&from, generation(path, n + 1))?;
        }
    }
    fs::rename(path, generation(path, 1))?;
    Ok(true)
}
