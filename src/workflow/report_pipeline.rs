//! 报表流水线 - 流程层
//!
//! 核心职责：定义"更新一次报表工作簿"的完整流程
//!
//! 流程顺序：
//! 1. Discover：在工作目录中查找引擎工作簿
//! 2. Backup：按上一个工作日归档到 `Backup/`
//! 3. Open：打开工作簿，写入 UTILITY 日期
//! 4. Refresh：刷新 N 次，每次等待异步计算
//! 5. ExecuteOperations：按计划顺序执行提取操作（单个失败不影响后续）
//! 6. FinalRefresh → Save → Closed
//!
//! 任一阶段失败都会进入 Failed 并向上返回；工作簿总会被关闭，会话锁总会被释放。

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use tracing::{debug, error, info, warn};

use crate::config::ReportConfig;
use crate::error::AppResult;
use crate::infrastructure::{SessionLock, SpreadsheetEngine, Workbook};
use crate::models::{CellValue, Operation, ProgressReporter, ProgressSink};
use crate::services::extraction::{self, ExtractOutcome};
use crate::services::{
    backup_engine_file, build_operations, find_engine_file, previous_business_day,
    wait_for_calculations, WaitOutcome, SOURCE_SHEET,
};

/// UTILITY 工作表上的日期单元格 (行, 列)
const TODAY_CELL: (usize, usize) = (3, 6);
const PREV_DAY_CELL: (usize, usize) = (3, 5);

/// 操作进度占用的百分比区间
const OPERATIONS_START: usize = 20;
const OPERATIONS_SPAN: usize = 70;

/// 由 (今天, 上一个工作日) 两个表格日期戳构建操作计划
pub type PlanBuilder = fn(&str, &str) -> Vec<Operation>;

/// 流水线状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Discover,
    Backup,
    Open,
    Refresh,
    ExecuteOperations,
    FinalRefresh,
    Save,
    Closed,
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// 一次运行的操作统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineReport {
    pub applied: usize,
    /// 已跳过的操作及原因
    pub skipped: Vec<String>,
    /// 执行出错的操作及错误
    pub failed: Vec<String>,
}

impl PipelineReport {
    pub fn total(&self) -> usize {
        self.applied + self.skipped.len() + self.failed.len()
    }
}

impl fmt::Display for PipelineReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} 个操作完成, {} 个跳过, {} 个失败",
            self.applied,
            self.skipped.len(),
            self.failed.len()
        )
    }
}

/// 编排器眼中的报表任务
#[async_trait]
pub trait ReportTask: Send + Sync {
    async fn run(&self, sink: &ProgressSink) -> AppResult<PipelineReport>;
}

/// 报表流水线
///
/// - 只通过 `SpreadsheetEngine` / `Workbook` 访问工作簿
/// - 整个运行期间持有外部会话锁
pub struct ReportPipeline {
    engine: Arc<dyn SpreadsheetEngine>,
    lock: SessionLock,
    config: ReportConfig,
    work_dir: PathBuf,
    today: Option<NaiveDate>,
    plan: PlanBuilder,
}

impl ReportPipeline {
    pub fn new(
        engine: Arc<dyn SpreadsheetEngine>,
        lock: SessionLock,
        config: ReportConfig,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            engine,
            lock,
            config,
            work_dir: work_dir.into(),
            today: None,
            plan: build_operations,
        }
    }

    /// 固定"今天"，不设置时使用本地日期
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    /// 替换操作计划
    pub fn with_plan(mut self, plan: PlanBuilder) -> Self {
        self.plan = plan;
        self
    }

    async fn execute(
        &self,
        state: &mut PipelineState,
        progress: &mut ProgressReporter,
    ) -> AppResult<PipelineReport> {
        let _guard = self.lock.acquire(self.config.session_lock_timeout()).await?;

        let today = self.today.unwrap_or_else(|| Local::now().date_naive());
        let prev_day = previous_business_day(today);

        let engine_path = find_engine_file(&self.work_dir, &self.config.engine_patterns)?;
        let file_name = engine_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        progress.emit(0, format!("找到引擎工作簿: {}", file_name));

        enter(state, PipelineState::Backup);
        progress.emit(2, "备份引擎工作簿...");
        backup_engine_file(&engine_path, prev_day).await?;

        enter(state, PipelineState::Open);
        progress.emit(5, "打开引擎工作簿...");
        let mut workbook = self.engine.open(&engine_path).await?;

        let result = self
            .process(workbook.as_mut(), today, prev_day, state, progress)
            .await;

        if let Err(e) = workbook.close().await {
            warn!("⚠️ 关闭工作簿失败: {}", e);
        }
        result
    }

    async fn process(
        &self,
        workbook: &mut dyn Workbook,
        today: NaiveDate,
        prev_day: NaiveDate,
        state: &mut PipelineState,
        progress: &mut ProgressReporter,
    ) -> AppResult<PipelineReport> {
        // 长时间刷新期间让用户看到工作簿
        workbook.set_visible(true).await?;
        let (row, col) = TODAY_CELL;
        workbook
            .write_cell(SOURCE_SHEET, row, col, us_date(today))
            .await?;
        let (row, col) = PREV_DAY_CELL;
        workbook
            .write_cell(SOURCE_SHEET, row, col, us_date(prev_day))
            .await?;

        enter(state, PipelineState::Refresh);
        progress.emit(10, "刷新工作簿数据...");
        for cycle in 1..=self.config.refresh_cycles {
            workbook.refresh_all().await?;
            let outcome = wait_for_calculations(&mut *workbook, self.config.refresh_wait()).await?;
            debug!("第 {} 次刷新: {:?}", cycle, outcome);
        }
        progress.emit(20, "刷新完成");
        workbook.set_visible(false).await?;

        enter(state, PipelineState::ExecuteOperations);
        let operations = (self.plan)(
            &today.format("%Y-%m-%d").to_string(),
            &prev_day.format("%Y-%m-%d").to_string(),
        );
        let report = run_operations(&mut *workbook, &operations, progress).await;
        info!("📊 {}", report);

        enter(state, PipelineState::FinalRefresh);
        progress.emit(92, "最终刷新...");
        workbook.refresh_all().await?;
        if wait_for_calculations(&mut *workbook, self.config.final_wait()).await? == WaitOutcome::TimedOut {
            warn!("⚠️ 最终刷新未在限定时间内完成，仍然保存");
        }

        enter(state, PipelineState::Save);
        workbook.save().await?;
        workbook.set_visible(true).await?;
        progress.emit(100, "Excel 报表完成!");
        Ok(report)
    }
}

/// 依次执行所有操作，单个操作出错只记录不中断
async fn run_operations(
    workbook: &mut dyn Workbook,
    operations: &[Operation],
    progress: &mut ProgressReporter,
) -> PipelineReport {
    let mut report = PipelineReport::default();
    let total = operations.len().max(1);

    for (idx, op) in operations.iter().enumerate() {
        match extraction::apply(&mut *workbook, op).await {
            Ok(ExtractOutcome::Applied) => report.applied += 1,
            Ok(ExtractOutcome::Skipped(reason)) => {
                report.skipped.push(format!("{}: {}", op.name, reason));
            }
            Err(e) => {
                error!("❌ 操作 '{}' 失败: {}", op.name, e);
                report.failed.push(format!("{}: {}", op.name, e));
            }
        }
        let percent = OPERATIONS_START + (idx + 1) * OPERATIONS_SPAN / total;
        progress.emit(percent as u8, op.name.clone());
    }
    report
}

fn enter(state: &mut PipelineState, next: PipelineState) {
    debug!("流水线: {} → {}", state, next);
    *state = next;
}

fn us_date(date: NaiveDate) -> CellValue {
    CellValue::from(date.format("%m/%d/%Y").to_string())
}

#[async_trait]
impl ReportTask for ReportPipeline {
    async fn run(&self, sink: &ProgressSink) -> AppResult<PipelineReport> {
        let mut progress = ProgressReporter::new(sink.clone());
        let mut state = PipelineState::Discover;

        match self.execute(&mut state, &mut progress).await {
            Ok(report) => {
                enter(&mut state, PipelineState::Closed);
                Ok(report)
            }
            Err(e) => {
                error!("❌ Excel 报表在 {} 阶段失败: {}", state, e);
                enter(&mut state, PipelineState::Failed);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppError, TimeoutError};
    use crate::infrastructure::{MemoryWorkbook, SnapshotEngine};
    use crate::models::{Grid, OperationKind, PivotRef, TableRef, UiEvent};
    use std::path::Path;
    use std::time::Duration;

    const ENGINE_FILE: &str = "AO MO SO CHECKER.xlsm";

    fn today() -> NaiveDate {
        // 周一，上一个工作日为 2024-03-15
        NaiveDate::from_ymd_opt(2024, 3, 18).unwrap()
    }

    fn numbers(values: &[f64]) -> Vec<CellValue> {
        values.iter().map(|v| CellValue::Number(*v)).collect()
    }

    fn single_op_plan(today: &str, _prev: &str) -> Vec<Operation> {
        vec![Operation::new(
            "Incomplete Inventory > 0",
            TableRef::new("MO YR SUMMARY", "YR_INCOMP"),
            OperationKind::CopyDataBody {
                pivot: PivotRef::new(SOURCE_SHEET, "PivotTable5"),
                date_stamp: Some(crate::models::DateStamp::new(2, today)),
                column_offset: |j| j + 2,
            },
        )]
    }

    async fn write_engine(dir: &Path) -> PathBuf {
        let path = dir.join(ENGINE_FILE);
        let mut wb = MemoryWorkbook::new("checker").with_path(&path);
        wb.set_sheet_cell(SOURCE_SHEET, 1, 1, CellValue::from("UTILITY"));
        let mut full = vec![vec![CellValue::from("Row Labels"); 5]];
        full.push([vec![CellValue::from("A")], numbers(&[1.0, 2.0, 3.0, 6.0])].concat());
        full.push([vec![CellValue::from("Grand Total")], numbers(&[1.0, 2.0, 3.0, 6.0])].concat());
        wb.add_pivot(SOURCE_SHEET, "PivotTable5", Grid::new(full));
        wb.add_table("MO YR SUMMARY", "YR_INCOMP", &["Idx", "Date", "C1", "C2", "C3", "Total"]);
        wb.save().await.unwrap();
        path
    }

    fn pipeline(dir: &Path, lock: SessionLock) -> ReportPipeline {
        ReportPipeline::new(
            Arc::new(SnapshotEngine::new()),
            lock,
            ReportConfig::default(),
            dir,
        )
        .with_today(today())
    }

    fn drain(rx: &mut tokio::sync::mpsc::UnboundedReceiver<UiEvent>) -> Vec<String> {
        let mut lines = Vec::new();
        while let Ok(UiEvent::Line(line)) = rx.try_recv() {
            lines.push(line);
        }
        lines
    }

    #[tokio::test]
    async fn test_single_operation_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_engine(dir.path()).await;
        let (sink, mut rx) = ProgressSink::channel();

        let report = pipeline(dir.path(), SessionLock::new())
            .with_plan(single_op_plan)
            .run(&sink)
            .await
            .unwrap();
        assert_eq!(report.applied, 1);

        let saved = SnapshotEngine::load(&path).await.unwrap();
        let table = TableRef::new("MO YR SUMMARY", "YR_INCOMP");
        let rows = saved.table_rows(&table).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][1], CellValue::from("2024-03-18"));
        assert_eq!(&rows[0][2..5], numbers(&[1.0, 2.0, 3.0]).as_slice());
        assert_eq!(rows[0][5], CellValue::Empty);
        assert_eq!(
            saved.sheet_cell(SOURCE_SHEET, 3, 6),
            CellValue::from("03/18/2024")
        );
        assert_eq!(
            saved.sheet_cell(SOURCE_SHEET, 3, 5),
            CellValue::from("03/15/2024")
        );

        let backup = dir.path().join("Backup").join("AO MO SO CHECKER_03152024.xlsm");
        assert!(backup.exists());

        let lines = drain(&mut rx);
        assert_eq!(lines.first().map(String::as_str), Some("[0%] 找到引擎工作簿: AO MO SO CHECKER.xlsm"));
        assert!(lines.contains(&"[90%] Incomplete Inventory > 0".to_string()));
        assert_eq!(lines.last().map(String::as_str), Some("[100%] Excel 报表完成!"));
    }

    #[tokio::test]
    async fn test_failed_operations_do_not_stop_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_engine(dir.path()).await;
        let (sink, mut rx) = ProgressSink::channel();

        let report = pipeline(dir.path(), SessionLock::new())
            .run(&sink)
            .await
            .unwrap();
        // 只有 PivotTable5 / YR_INCOMP 存在
        assert_eq!(report.applied, 1);
        assert_eq!(report.total(), 19);
        assert!(!report.failed.is_empty());

        let saved = SnapshotEngine::load(&path).await.unwrap();
        assert_eq!(
            saved
                .table_rows(&TableRef::new("MO YR SUMMARY", "YR_INCOMP"))
                .unwrap()
                .len(),
            1
        );

        let percents: Vec<u8> = drain(&mut rx)
            .iter()
            .filter_map(|l| l.strip_prefix('[')?.split('%').next()?.parse().ok())
            .collect();
        assert!(percents.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(percents.last(), Some(&100));
    }

    #[tokio::test]
    async fn test_missing_engine_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let lock = SessionLock::new();
        let err = pipeline(dir.path(), lock.clone())
            .run(&ProgressSink::disabled())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(!lock.is_locked());
    }

    #[tokio::test]
    async fn test_unreadable_workbook_fails_and_keeps_backup() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(ENGINE_FILE), b"not json").unwrap();
        let err = pipeline(dir.path(), SessionLock::new())
            .run(&ProgressSink::disabled())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::File(_)));
        assert!(dir.path().join("Backup").exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_session_lock_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let lock = SessionLock::new();
        let _held = lock.acquire(Duration::from_secs(1)).await.unwrap();

        let err = pipeline(dir.path(), lock.clone())
            .run(&ProgressSink::disabled())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Timeout(TimeoutError::SessionLock(_))));
    }
}
