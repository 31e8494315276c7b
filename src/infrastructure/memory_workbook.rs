//! 内存工作簿 - 基础设施层
//!
//! `Workbook` 的完整内存实现：工作表单元格、由完整区域推导数值区的数据透视表、
//! 只追加的列表。可序列化为 JSON 快照，由 `SnapshotEngine` 读写磁盘。

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{AppError, AppResult, FileError, NotFoundError, SessionError};
use crate::infrastructure::workbook::{CalculationHandle, CalculationState, PivotRegion, Workbook};
use crate::models::{CellRange, CellValue, Grid, PivotRef, TableRef};

/// 数据透视表：只保存完整区域
///
/// 完整区域 = 标题行 + 数据行 + 总计行；首列为行标签，末列为总计。
/// 数值区 = 去掉标题行、总计行和行标签列，因此列数比完整区域少 1。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryPivot {
    full_range: Grid,
}

impl MemoryPivot {
    pub fn new(full_range: Grid) -> Self {
        Self { full_range }
    }

    pub fn full_range(&self) -> &Grid {
        &self.full_range
    }

    pub fn data_body(&self) -> Grid {
        let rows = self.full_range.row_count();
        let cols = self.full_range.column_count();
        if rows < 3 || cols < 2 {
            return Grid::default();
        }
        self.full_range.slice((2, rows - 1), (2, cols))
    }
}

/// 只追加的列表
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryTable {
    headers: Vec<String>,
    #[serde(default)]
    rows: Vec<Vec<CellValue>>,
}

impl MemoryTable {
    pub fn new(headers: &[&str]) -> Self {
        Self {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn rows(&self) -> &[Vec<CellValue>] {
        &self.rows
    }

    fn append(&mut self) -> usize {
        self.rows.push(vec![CellValue::Empty; self.headers.len()]);
        self.rows.len()
    }
}

/// 工作表
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemorySheet {
    #[serde(default)]
    cells: Vec<Vec<CellValue>>,
    #[serde(default)]
    pivots: BTreeMap<String, MemoryPivot>,
    #[serde(default)]
    tables: BTreeMap<String, MemoryTable>,
}

impl MemorySheet {
    fn cell(&self, row: usize, col: usize) -> CellValue {
        self.cells
            .get(row.wrapping_sub(1))
            .and_then(|r| r.get(col.wrapping_sub(1)))
            .cloned()
            .unwrap_or_default()
    }

    /// 坐标从 1 开始，0 行或 0 列不写入并返回 false
    fn set_cell(&mut self, row: usize, col: usize, value: CellValue) -> bool {
        if row == 0 || col == 0 {
            return false;
        }
        if self.cells.len() < row {
            self.cells.resize_with(row, Vec::new);
        }
        let line = &mut self.cells[row - 1];
        if line.len() < col {
            line.resize(col, CellValue::Empty);
        }
        line[col - 1] = value;
        true
    }
}

/// 内存工作簿
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct MemoryWorkbook {
    name: String,
    #[serde(default)]
    sheets: BTreeMap<String, MemorySheet>,
    /// 每次刷新后需要轮询多少次计算状态才会完成
    #[serde(default)]
    calculation_polls: u32,
    #[serde(skip)]
    path: Option<PathBuf>,
    #[serde(skip)]
    pending_polls: AtomicU32,
    #[serde(skip)]
    bulk_reads: AtomicUsize,
    #[serde(skip)]
    refresh_count: u32,
    #[serde(skip)]
    visible: bool,
    #[serde(skip)]
    saved: bool,
    #[serde(skip)]
    closed: bool,
}

impl MemoryWorkbook {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// 绑定快照文件，`save` 时写回
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_calculation_polls(mut self, polls: u32) -> Self {
        self.calculation_polls = polls;
        self
    }

    pub fn add_pivot(&mut self, sheet: &str, name: &str, full_range: Grid) -> &mut Self {
        self.sheets
            .entry(sheet.to_string())
            .or_default()
            .pivots
            .insert(name.to_string(), MemoryPivot::new(full_range));
        self
    }

    pub fn add_table(&mut self, sheet: &str, name: &str, headers: &[&str]) -> &mut Self {
        self.sheets
            .entry(sheet.to_string())
            .or_default()
            .tables
            .insert(name.to_string(), MemoryTable::new(headers));
        self
    }

    /// 预置表格行
    pub fn push_table_row(&mut self, table: &TableRef, values: Vec<CellValue>) -> AppResult<()> {
        let t = self.table_mut(table)?;
        let row = t.append();
        for (i, value) in values.into_iter().enumerate().take(t.headers.len()) {
            t.rows[row - 1][i] = value;
        }
        Ok(())
    }

    pub fn set_sheet_cell(&mut self, sheet: &str, row: usize, col: usize, value: CellValue) {
        let written = self
            .sheets
            .entry(sheet.to_string())
            .or_default()
            .set_cell(row, col, value);
        if !written {
            warn!("⚠️ 忽略无效坐标 {}!R{}C{}", sheet, row, col);
        }
    }

    pub fn sheet_cell(&self, sheet: &str, row: usize, col: usize) -> CellValue {
        self.sheets
            .get(sheet)
            .map(|s| s.cell(row, col))
            .unwrap_or_default()
    }

    pub fn table_rows(&self, table: &TableRef) -> Option<&[Vec<CellValue>]> {
        self.sheets
            .get(&table.sheet)
            .and_then(|s| s.tables.get(&table.name))
            .map(MemoryTable::rows)
    }

    /// 批量读取次数
    pub fn bulk_reads(&self) -> usize {
        self.bulk_reads.load(Ordering::SeqCst)
    }

    pub fn refresh_count(&self) -> u32 {
        self.refresh_count
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn is_saved(&self) -> bool {
        self.saved
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn ensure_open(&self) -> AppResult<()> {
        if self.closed {
            return Err(AppError::session("工作簿访问", format!("{} 已关闭", self.name)));
        }
        Ok(())
    }

    fn sheet(&self, sheet: &str) -> AppResult<&MemorySheet> {
        self.sheets
            .get(sheet)
            .ok_or_else(|| NotFoundError::Sheet(sheet.to_string()).into())
    }

    fn table(&self, table: &TableRef) -> AppResult<&MemoryTable> {
        self.sheet(&table.sheet)?
            .tables
            .get(&table.name)
            .ok_or_else(|| table_not_found(table))
    }

    fn table_mut(&mut self, table: &TableRef) -> AppResult<&mut MemoryTable> {
        self.sheets
            .get_mut(&table.sheet)
            .and_then(|s| s.tables.get_mut(&table.name))
            .ok_or_else(|| table_not_found(table))
    }

    fn count_read(&self) {
        self.bulk_reads.fetch_add(1, Ordering::SeqCst);
    }
}

fn table_not_found(table: &TableRef) -> AppError {
    NotFoundError::Table {
        sheet: table.sheet.clone(),
        table: table.name.clone(),
    }
    .into()
}

#[async_trait]
impl CalculationHandle for MemoryWorkbook {
    async fn calculation_state(&self) -> AppResult<CalculationState> {
        self.ensure_open()?;
        let remaining = self.pending_polls.load(Ordering::SeqCst);
        if remaining == 0 {
            return Ok(CalculationState::Done);
        }
        self.pending_polls.store(remaining - 1, Ordering::SeqCst);
        Ok(CalculationState::Calculating)
    }

    async fn finish_pending_queries(&mut self) -> AppResult<()> {
        self.ensure_open()?;
        self.pending_polls.store(0, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl Workbook for MemoryWorkbook {
    fn name(&self) -> &str {
        &self.name
    }

    async fn set_visible(&mut self, visible: bool) -> AppResult<()> {
        self.ensure_open()?;
        self.visible = visible;
        Ok(())
    }

    async fn refresh_all(&mut self) -> AppResult<()> {
        self.ensure_open()?;
        self.refresh_count += 1;
        self.pending_polls
            .store(self.calculation_polls, Ordering::SeqCst);
        debug!("{} 第 {} 次刷新", self.name, self.refresh_count);
        Ok(())
    }

    async fn read_pivot(&self, pivot: &PivotRef, region: PivotRegion) -> AppResult<Grid> {
        self.ensure_open()?;
        let p = self
            .sheet(&pivot.sheet)?
            .pivots
            .get(&pivot.name)
            .ok_or_else(|| NotFoundError::Pivot {
                sheet: pivot.sheet.clone(),
                pivot: pivot.name.clone(),
            })?;
        self.count_read();
        Ok(match region {
            PivotRegion::DataBody => p.data_body(),
            PivotRegion::FullRange => p.full_range().clone(),
        })
    }

    async fn read_range(&self, sheet: &str, range: CellRange) -> AppResult<Grid> {
        self.ensure_open()?;
        let s = self.sheet(sheet)?;
        self.count_read();
        let rows = (range.start_row..=range.end_row)
            .map(|r| {
                (range.start_col..=range.end_col)
                    .map(|c| s.cell(r, c))
                    .collect()
            })
            .collect();
        Ok(Grid::new(rows))
    }

    async fn write_cell(
        &mut self,
        sheet: &str,
        row: usize,
        col: usize,
        value: CellValue,
    ) -> AppResult<()> {
        self.ensure_open()?;
        if row == 0 || col == 0 {
            return Err(AppError::session(
                "写入单元格",
                format!("{}!R{}C{} 无效", sheet, row, col),
            ));
        }
        self.sheets
            .get_mut(sheet)
            .ok_or_else(|| NotFoundError::Sheet(sheet.to_string()))?
            .set_cell(row, col, value);
        Ok(())
    }

    async fn table_header(&self, table: &TableRef) -> AppResult<Vec<CellValue>> {
        self.ensure_open()?;
        let t = self.table(table)?;
        self.count_read();
        Ok(t.headers.iter().map(|h| CellValue::from(h.as_str())).collect())
    }

    async fn table_body(&self, table: &TableRef) -> AppResult<Grid> {
        self.ensure_open()?;
        let t = self.table(table)?;
        self.count_read();
        Ok(Grid::new(t.rows.clone()))
    }

    async fn table_row_count(&self, table: &TableRef) -> AppResult<usize> {
        self.ensure_open()?;
        Ok(self.table(table)?.rows.len())
    }

    async fn append_table_row(&mut self, table: &TableRef) -> AppResult<usize> {
        self.ensure_open()?;
        Ok(self.table_mut(table)?.append())
    }

    async fn write_table_cell(
        &mut self,
        table: &TableRef,
        row: usize,
        col: usize,
        value: CellValue,
    ) -> AppResult<()> {
        self.ensure_open()?;
        let t = self.table_mut(table)?;
        let out_of_range = || {
            AppError::from(SessionError::OutOfRange {
                table: table.to_string(),
                row,
                column: col,
            })
        };
        if col == 0 || col > t.headers.len() {
            return Err(out_of_range());
        }
        // 紧贴表格下方写入时表格自动扩展一行
        if row == t.rows.len() + 1 {
            t.append();
        }
        let line = row
            .checked_sub(1)
            .and_then(|r| t.rows.get_mut(r))
            .ok_or_else(out_of_range)?;
        line[col - 1] = value;
        Ok(())
    }

    async fn save(&mut self) -> AppResult<()> {
        self.ensure_open()?;
        if let Some(path) = &self.path {
            let json = serde_json::to_string_pretty(self).map_err(|source| FileError::Snapshot {
                path: path.clone(),
                source,
            })?;
            tokio::fs::write(path, json)
                .await
                .map_err(|e| AppError::io(format!("无法保存 {}", path.display()), e))?;
        }
        self.saved = true;
        Ok(())
    }

    async fn close(&mut self) -> AppResult<()> {
        self.closed = true;
        self.visible = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pivot_grid() -> Grid {
        Grid::new(vec![
            vec!["Row Labels".into(), "Jan".into(), "Feb".into(), "Grand Total".into()],
            vec!["Available".into(), 1.0.into(), 2.0.into(), 3.0.into()],
            vec!["Grand Total".into(), 1.0.into(), 2.0.into(), 3.0.into()],
        ])
    }

    #[test]
    fn test_zero_coordinates_are_ignored() {
        let mut wb = MemoryWorkbook::new("engine");
        wb.set_sheet_cell("UTILITY", 0, 3, CellValue::from(1.0));
        wb.set_sheet_cell("UTILITY", 2, 0, CellValue::from(1.0));
        wb.set_sheet_cell("UTILITY", 2, 3, CellValue::from(5.0));
        assert_eq!(wb.sheet_cell("UTILITY", 2, 3), CellValue::Number(5.0));
        assert_eq!(wb.sheet_cell("UTILITY", 0, 3), CellValue::Empty);
        assert_eq!(wb.sheet_cell("UTILITY", 1, 1), CellValue::Empty);
    }

    #[test]
    fn test_data_body_has_one_fewer_column() {
        let pivot = MemoryPivot::new(pivot_grid());
        let body = pivot.data_body();
        assert_eq!(body.row_count(), 1);
        assert_eq!(pivot.full_range().column_count(), body.column_count() + 1);
        assert_eq!(body.cell(1, 1), Some(&CellValue::Number(1.0)));
    }

    #[tokio::test]
    async fn test_write_below_table_extends_it() {
        let table = TableRef::new("S", "T");
        let mut wb = MemoryWorkbook::new("wb");
        wb.add_table("S", "T", &["a", "b"]);

        wb.write_table_cell(&table, 1, 2, 5.0.into()).await.unwrap();
        assert_eq!(wb.table_row_count(&table).await.unwrap(), 1);

        let err = wb.write_table_cell(&table, 3, 1, 1.0.into()).await.unwrap_err();
        assert!(matches!(err, AppError::Session(SessionError::OutOfRange { .. })));
        let err = wb.write_table_cell(&table, 1, 3, 1.0.into()).await.unwrap_err();
        assert!(matches!(err, AppError::Session(SessionError::OutOfRange { .. })));
    }

    #[tokio::test]
    async fn test_refresh_sets_pending_calculations() {
        let mut wb = MemoryWorkbook::new("wb").with_calculation_polls(2);
        wb.refresh_all().await.unwrap();
        assert_eq!(wb.calculation_state().await.unwrap(), CalculationState::Calculating);
        assert_eq!(wb.calculation_state().await.unwrap(), CalculationState::Calculating);
        assert_eq!(wb.calculation_state().await.unwrap(), CalculationState::Done);
    }

    #[tokio::test]
    async fn test_closed_workbook_rejects_access() {
        let mut wb = MemoryWorkbook::new("wb");
        wb.add_pivot("UTILITY", "P", pivot_grid());
        wb.close().await.unwrap();
        let pivot = PivotRef::new("UTILITY", "P");
        assert!(wb.read_pivot(&pivot, PivotRegion::FullRange).await.is_err());
    }

    #[tokio::test]
    async fn test_read_range_pads_missing_cells() {
        let mut wb = MemoryWorkbook::new("wb");
        wb.set_sheet_cell("MO %", 4, 3, 7.0.into());
        let grid = wb.read_range("MO %", CellRange::new(4, 3, 4, 5)).await.unwrap();
        assert_eq!(grid.column_count(), 3);
        assert_eq!(grid.cell(1, 1), Some(&CellValue::Number(7.0)));
        assert_eq!(grid.cell(1, 3), Some(&CellValue::Empty));
        assert_eq!(wb.bulk_reads(), 1);
    }
}
