//! 表格文档抽象 - 基础设施层
//!
//! 外部电子表格引擎（工作簿的打开、刷新、读写、保存）只通过这里的 trait 暴露能力。
//! 读取一律是整块读取：一次调用返回整个矩形区域。

use std::path::Path;

use async_trait::async_trait;

use crate::error::AppResult;
use crate::models::{CellRange, CellValue, Grid, PivotRef, TableRef};

/// 数据透视表的可寻址区域
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PivotRegion {
    /// 数值区（不含标题行、总计行和行标签列）
    DataBody,
    /// 完整区域（含标题行和末尾总计列）
    FullRange,
}

/// 异步计算状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalculationState {
    Done,
    Calculating,
    Pending,
}

/// 暴露"计算中"标志的句柄
#[async_trait]
pub trait CalculationHandle: Send + Sync {
    /// 当前计算状态
    async fn calculation_state(&self) -> AppResult<CalculationState>;

    /// 等待所有挂起的异步查询结束
    async fn finish_pending_queries(&mut self) -> AppResult<()>;
}

/// 已打开的工作簿
#[async_trait]
pub trait Workbook: CalculationHandle {
    /// 工作簿名称（用于日志）
    fn name(&self) -> &str;

    /// 显示 / 隐藏工作簿窗口
    async fn set_visible(&mut self, visible: bool) -> AppResult<()>;

    /// 刷新所有外部数据连接
    async fn refresh_all(&mut self) -> AppResult<()>;

    /// 批量读取数据透视表区域
    async fn read_pivot(&self, pivot: &PivotRef, region: PivotRegion) -> AppResult<Grid>;

    /// 批量读取工作表矩形区域
    async fn read_range(&self, sheet: &str, range: CellRange) -> AppResult<Grid>;

    /// 写入单个工作表单元格
    async fn write_cell(&mut self, sheet: &str, row: usize, col: usize, value: CellValue)
        -> AppResult<()>;

    /// 表格标题行
    async fn table_header(&self, table: &TableRef) -> AppResult<Vec<CellValue>>;

    /// 表格数据区
    async fn table_body(&self, table: &TableRef) -> AppResult<Grid>;

    /// 表格行数
    async fn table_row_count(&self, table: &TableRef) -> AppResult<usize>;

    /// 在表格末尾追加一行，返回新行号（从 1 开始）
    async fn append_table_row(&mut self, table: &TableRef) -> AppResult<usize>;

    /// 写入表格数据区单元格（行列均从 1 开始）
    async fn write_table_cell(
        &mut self,
        table: &TableRef,
        row: usize,
        col: usize,
        value: CellValue,
    ) -> AppResult<()>;

    /// 保存
    async fn save(&mut self) -> AppResult<()>;

    /// 关闭（不保存）
    async fn close(&mut self) -> AppResult<()>;
}

/// 外部电子表格引擎
#[async_trait]
pub trait SpreadsheetEngine: Send + Sync {
    /// 以读写方式打开工作簿
    async fn open(&self, path: &Path) -> AppResult<Box<dyn Workbook>>;

    /// 把旧格式文件另存为 xlsx
    async fn convert_to_xlsx(&self, source: &Path, dest: &Path) -> AppResult<()>;
}
