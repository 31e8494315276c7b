//! JSON 快照引擎 - 基础设施层
//!
//! 把 `MemoryWorkbook` 以 JSON 形式存放在磁盘上，实现 `SpreadsheetEngine`。
//! 下载文件的格式转换交给 [`xls_convert`]。

use std::path::Path;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::{AppError, AppResult, FileError};
use crate::infrastructure::memory_workbook::MemoryWorkbook;
use crate::infrastructure::workbook::{SpreadsheetEngine, Workbook};
use crate::infrastructure::xls_convert;

/// JSON 快照引擎
#[derive(Debug, Clone, Default)]
pub struct SnapshotEngine;

impl SnapshotEngine {
    pub fn new() -> Self {
        Self
    }

    /// 读取快照
    pub async fn load(path: &Path) -> AppResult<MemoryWorkbook> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| AppError::io(format!("无法读取工作簿 {}", path.display()), e))?;
        let workbook: MemoryWorkbook =
            serde_json::from_str(&content).map_err(|source| FileError::Snapshot {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(workbook.with_path(path))
    }
}

#[async_trait]
impl SpreadsheetEngine for SnapshotEngine {
    async fn open(&self, path: &Path) -> AppResult<Box<dyn Workbook>> {
        debug!("打开工作簿快照: {}", path.display());
        let workbook = Self::load(path).await?;
        Ok(Box::new(workbook))
    }

    async fn convert_to_xlsx(&self, source: &Path, dest: &Path) -> AppResult<()> {
        let (src, dst) = (source.to_path_buf(), dest.to_path_buf());
        let sheets = tokio::task::spawn_blocking(move || xls_convert::convert_to_xlsx(&src, &dst))
            .await
            .map_err(|e| AppError::session("转换 xlsx", format!("转换任务异常退出: {}", e)))??;
        info!("✓ 转换完成: {} ({} 个工作表)", dest.display(), sheets);
        Ok(())
    }
}
