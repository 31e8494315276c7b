//! 引擎工作簿的查找与备份 - 业务能力层

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::NaiveDate;
use tracing::{debug, info};

use crate::error::{AppError, AppResult, NotFoundError};

/// 备份子目录
pub const BACKUP_DIR: &str = "Backup";

/// 在 `dir` 中查找引擎工作簿
///
/// 模式按顺序尝试，靠前者优先；同一模式有多个匹配时取修改时间最新的。
pub fn find_engine_file(dir: &Path, patterns: &[String]) -> AppResult<PathBuf> {
    let escaped_dir = glob::Pattern::escape(&dir.to_string_lossy());
    for pattern in patterns {
        let full = format!("{}/{}", escaped_dir, pattern);
        let newest = glob::glob(&full)?
            .filter_map(Result::ok)
            .filter(|p| p.is_file())
            .max_by_key(|p| modified(p));
        if let Some(path) = newest {
            debug!("模式 {} 匹配到 {}", pattern, path.display());
            return Ok(path);
        }
    }
    Err(NotFoundError::EngineWorkbook {
        dir: dir.to_path_buf(),
        patterns: patterns.join(", "),
    }
    .into())
}

fn modified(path: &Path) -> SystemTime {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .unwrap_or(SystemTime::UNIX_EPOCH)
}

/// 备份文件名：`<原文件名>_<MMDDYYYY>.<扩展名>`
pub fn backup_file_name(engine: &Path, archive_date: NaiveDate) -> String {
    let stem = engine
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let date = archive_date.format("%m%d%Y");
    match engine.extension() {
        Some(ext) => format!("{}_{}.{}", stem, date, ext.to_string_lossy()),
        None => format!("{}_{}", stem, date),
    }
}

/// 把引擎工作簿复制到同目录下的 `Backup/`，文件名带归档日期
pub async fn backup_engine_file(engine: &Path, archive_date: NaiveDate) -> AppResult<PathBuf> {
    let folder = engine
        .parent()
        .map(|p| p.join(BACKUP_DIR))
        .unwrap_or_else(|| PathBuf::from(BACKUP_DIR));
    tokio::fs::create_dir_all(&folder)
        .await
        .map_err(|e| AppError::io(format!("无法创建备份目录 {}", folder.display()), e))?;

    let dest = folder.join(backup_file_name(engine, archive_date));
    tokio::fs::copy(engine, &dest)
        .await
        .map_err(|e| AppError::io(format!("无法备份 {}", engine.display()), e))?;
    info!("✓ 引擎工作簿已备份: {}", dest.display());
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn patterns() -> Vec<String> {
        vec![
            "*AO MO SO CHECKER*.xlsm".to_string(),
            "*AO MO SO CHECKER*.xlsx".to_string(),
        ]
    }

    fn touch(path: &Path, age_secs: u64) {
        std::fs::write(path, b"{}").unwrap();
        let file = std::fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(age_secs))
            .unwrap();
    }

    #[test]
    fn test_prefers_first_pattern_then_newest() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("Daily AO MO SO CHECKER.xlsx"), 0);
        touch(&dir.path().join("Old AO MO SO CHECKER.xlsm"), 7200);
        touch(&dir.path().join("New AO MO SO CHECKER.xlsm"), 60);

        let found = find_engine_file(dir.path(), &patterns()).unwrap();
        assert_eq!(found, dir.path().join("New AO MO SO CHECKER.xlsm"));
    }

    #[test]
    fn test_falls_back_to_second_pattern() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("AO MO SO CHECKER.xlsx"), 0);
        touch(&dir.path().join("unrelated.xlsm"), 0);

        let found = find_engine_file(dir.path(), &patterns()).unwrap();
        assert_eq!(found, dir.path().join("AO MO SO CHECKER.xlsx"));
    }

    #[test]
    fn test_nothing_matches() {
        let dir = tempfile::tempdir().unwrap();
        let err = find_engine_file(dir.path(), &patterns()).unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_backup_uses_archive_date() {
        let dir = tempfile::tempdir().unwrap();
        let engine = dir.path().join("AO MO SO CHECKER.xlsm");
        touch(&engine, 0);

        let date = NaiveDate::from_ymd_opt(2024, 3, 14).unwrap();
        let backup = backup_engine_file(&engine, date).await.unwrap();
        assert_eq!(
            backup,
            dir.path().join("Backup").join("AO MO SO CHECKER_03142024.xlsm")
        );
        assert!(backup.exists());
    }
}
