//! 下载目录文件工具 - 业务能力层

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::NaiveDate;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult, TimeoutError};

/// 每次运行前要清理的旧下载文件前缀
pub const DOWNLOAD_PREFIXES: [&str; 4] = [
    "Billing Only",
    "DailyReport Completed",
    "DailyReport Incompletes",
    "MatShortageRpt",
];

/// 浏览器下载中的临时文件后缀
const PARTIAL_SUFFIXES: [&str; 2] = [".crdownload", ".part"];

const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// `dir` 中以 `prefix` 开头、修改时间最新的文件
fn newest_with_prefix(dir: &Path, prefix: &str) -> AppResult<Option<(PathBuf, SystemTime)>> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| AppError::io(format!("无法读取目录 {}", dir.display()), e))?;
    let newest = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.file_name().to_string_lossy().starts_with(prefix))
        .filter_map(|entry| {
            let meta = entry.metadata().ok()?;
            meta.is_file()
                .then(|| (entry.path(), meta.modified().unwrap_or(SystemTime::UNIX_EPOCH)))
        })
        .max_by_key(|(_, mtime)| *mtime);
    Ok(newest)
}

/// 删除 `dir` 中以任一前缀开头的文件，返回删除数量
///
/// 目录不存在时只记录错误。
pub async fn remove_old_files(dir: &Path, prefixes: &[&str]) -> AppResult<usize> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("⚠️ 目录不存在: {}", dir.display());
            return Ok(0);
        }
        Err(e) => return Err(AppError::io(format!("无法读取目录 {}", dir.display()), e)),
    };

    let mut removed = 0;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| AppError::io(format!("无法读取目录 {}", dir.display()), e))?
    {
        let name = entry.file_name().to_string_lossy().into_owned();
        if !prefixes.iter().any(|p| name.starts_with(p)) {
            continue;
        }
        if !entry.file_type().await.map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }
        match tokio::fs::remove_file(entry.path()).await {
            Ok(()) => {
                info!("已删除旧文件: {}", name);
                removed += 1;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("⚠️ 文件已被其他进程删除: {}", name);
            }
            Err(e) => warn!("⚠️ 无法删除 {}: {}", name, e),
        }
    }
    Ok(removed)
}

/// 等待以 `prefix` 开头的下载完成
///
/// 忽略仍在下载中的临时文件；给出 `after` 时忽略修改时间更早的文件。
pub async fn wait_for_download(
    dir: &Path,
    prefix: &str,
    timeout: Duration,
    after: Option<SystemTime>,
) -> AppResult<PathBuf> {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if let Some((path, mtime)) = newest_with_prefix(dir, prefix)? {
            let name = path.to_string_lossy();
            let stale = after.is_some_and(|after| mtime < after);
            let partial = PARTIAL_SUFFIXES.iter().any(|s| name.ends_with(s));
            if !stale && !partial {
                info!("✓ 下载完成: {}", path.display());
                return Ok(path);
            }
            debug!("等待下载: {} (stale={}, partial={})", name, stale, partial);
        }
        sleep(POLL_INTERVAL).await;
    }
    Err(TimeoutError::Download {
        prefix: prefix.to_string(),
        timeout,
    }
    .into())
}

/// 把 `source_dir` 中最新的 `prefix` 文件复制到 `dest_dir`，文件名追加日期
///
/// 目标已存在时依次追加 ` (1)`、` (2)`……。没有匹配文件时返回 `None`。
pub async fn find_and_copy_file(
    source_dir: &Path,
    dest_dir: &Path,
    prefix: &str,
    date: NaiveDate,
) -> AppResult<Option<PathBuf>> {
    let Some((source, _)) = newest_with_prefix(source_dir, prefix)? else {
        info!("{} 中没有以 '{}' 开头的文件", source_dir.display(), prefix);
        return Ok(None);
    };

    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = source
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let base = format!("{}_{}", stem, date.format("%Y-%m-%d"));

    let mut dest = dest_dir.join(format!("{}{}", base, ext));
    let mut counter = 1;
    while dest.exists() {
        dest = dest_dir.join(format!("{} ({}){}", base, counter, ext));
        counter += 1;
    }

    tokio::fs::create_dir_all(dest_dir)
        .await
        .map_err(|e| AppError::io(format!("无法创建目录 {}", dest_dir.display()), e))?;
    tokio::fs::copy(&source, &dest)
        .await
        .map_err(|e| AppError::io(format!("无法复制 {}", source.display()), e))?;
    info!("✓ 已复制 {} → {}", source.display(), dest.display());
    Ok(Some(dest))
}
