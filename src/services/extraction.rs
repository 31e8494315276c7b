//! 模式提取引擎 - 业务能力层
//!
//! ## 职责
//!
//! 从汇总视图（数据透视表或工作表区域）读取数据，向历史表格追加一行并填充。
//! 六种结构形态对应 `OperationKind` 的六个变体，由 [`apply`] 分派。
//!
//! ## 约定
//!
//! - 源区域一律整块读取一次，之后只在内存中查找
//! - 关键字行：从 `row_start` 开始自上而下第一个首列包含关键字的行
//! - 找不到关键字或目标列时记录警告并返回 [`ExtractOutcome::Skipped`]，不算失败
//! - 源区域读取失败时目标表格不会被修改

use tracing::{info, warn};

use crate::error::{AppResult, NotFoundError};
use crate::infrastructure::{PivotRegion, Workbook};
use crate::models::{
    CellRange, CellValue, ColumnOffset, DateStamp, Grid, Operation, OperationKind, PivotRef,
    TableRef,
};

/// 单个操作的执行结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractOutcome {
    Applied,
    /// 找不到源数据或目标列，已记录警告
    Skipped(String),
}

impl ExtractOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, ExtractOutcome::Applied)
    }
}

/// 执行单个提取操作
pub async fn apply<W>(workbook: &mut W, op: &Operation) -> AppResult<ExtractOutcome>
where
    W: Workbook + ?Sized,
{
    let dest = &op.dest;
    let outcome = match &op.kind {
        OperationKind::CopyDataBody {
            pivot,
            date_stamp,
            column_offset,
        } => copy_data_body(workbook, pivot, dest, date_stamp.as_ref(), *column_offset).await?,
        OperationKind::KeywordRow {
            pivot,
            keyword,
            row_start,
            date_stamp,
            column_offset,
        } => {
            let source = workbook.read_pivot(pivot, PivotRegion::FullRange).await?;
            let row = append_row(workbook, dest, date_stamp.as_ref()).await?;
            match source.find_keyword_row(keyword, *row_start) {
                Some((_, values)) => {
                    // 跳过行标签列和末尾总计列
                    let n = source.column_count();
                    write_columns(workbook, dest, row, values, 2..n, *column_offset).await?;
                    ExtractOutcome::Applied
                }
                None => keyword_missing(keyword, pivot),
            }
        }
        OperationKind::FillFirstEmpty {
            pivot,
            keyword,
            dest_col_header,
        } => fill_first_empty(workbook, pivot, keyword, dest, dest_col_header).await?,
        OperationKind::SingleCell {
            pivot,
            keyword,
            row_start,
            extract_column,
        } => {
            let source = workbook.read_pivot(pivot, PivotRegion::FullRange).await?;
            match source.find_keyword_row(keyword, *row_start) {
                Some((_, values)) => match extract_column.checked_sub(1).and_then(|c| values.get(c)) {
                    Some(value) => {
                        let row = workbook.append_table_row(dest).await?;
                        workbook.write_table_cell(dest, row, 1, value.clone()).await?;
                        ExtractOutcome::Applied
                    }
                    None => {
                        let reason = format!("{} 没有第 {} 列", pivot, extract_column);
                        warn!("⚠️ {}", reason);
                        ExtractOutcome::Skipped(reason)
                    }
                },
                None => keyword_missing(keyword, pivot),
            }
        }
        OperationKind::KeywordRowZeroFill {
            pivot,
            keyword,
            row_start,
            date_stamp,
            column_offset,
        } => {
            let source = workbook.read_pivot(pivot, PivotRegion::FullRange).await?;
            let row = append_row(workbook, dest, date_stamp.as_ref()).await?;
            match source.find_keyword_row(keyword, *row_start) {
                Some((_, values)) => {
                    let n = source.column_count();
                    let no_activity = values.iter().skip(1).all(CellValue::is_empty_or_zero);
                    if no_activity {
                        let zeros = vec![CellValue::Number(0.0); n];
                        write_columns(workbook, dest, row, &zeros, 2..n + 1, *column_offset).await?;
                    } else {
                        write_columns(workbook, dest, row, values, 2..n + 1, *column_offset).await?;
                    }
                    ExtractOutcome::Applied
                }
                None => keyword_missing(keyword, pivot),
            }
        }
        OperationKind::RangeCopy {
            sheet,
            range,
            date_stamp,
            column_offset,
        } => range_copy(workbook, sheet, *range, dest, date_stamp.as_ref(), *column_offset).await?,
    };

    if outcome.is_applied() {
        info!("✓ [{}] {} 完成", op.pattern(), op.name);
    }
    Ok(outcome)
}

/// A：数据区每一行写入目标表格的连续行，跳过最后一列
async fn copy_data_body<W>(
    workbook: &mut W,
    pivot: &PivotRef,
    dest: &TableRef,
    date_stamp: Option<&DateStamp>,
    column_offset: ColumnOffset,
) -> AppResult<ExtractOutcome>
where
    W: Workbook + ?Sized,
{
    let body = workbook.read_pivot(pivot, PivotRegion::DataBody).await?;
    let first = append_row(workbook, dest, date_stamp).await?;
    if body.is_empty() {
        let reason = format!("{} 数据区为空", pivot);
        warn!("⚠️ {}", reason);
        return Ok(ExtractOutcome::Skipped(reason));
    }

    let cols = body.column_count();
    for (i, values) in body.rows().enumerate() {
        write_columns(workbook, dest, first + i, values, 1..cols, column_offset).await?;
    }
    Ok(ExtractOutcome::Applied)
}

/// C：关键字行最后一列的值写入目标列的第一个空单元格
async fn fill_first_empty<W>(
    workbook: &mut W,
    pivot: &PivotRef,
    keyword: &str,
    dest: &TableRef,
    dest_col_header: &str,
) -> AppResult<ExtractOutcome>
where
    W: Workbook + ?Sized,
{
    let header = workbook.table_header(dest).await?;
    let wanted = dest_col_header.trim();
    let Some(dest_col) = header
        .iter()
        .position(|h| h.to_string().trim().eq_ignore_ascii_case(wanted))
        .map(|i| i + 1)
    else {
        return Ok(skipped(NotFoundError::Column {
            table: dest.to_string(),
            header: dest_col_header.to_string(),
        }));
    };

    let body = workbook.table_body(dest).await?;
    let target_row = first_empty_row(&body, dest_col);

    let source = workbook.read_pivot(pivot, PivotRegion::FullRange).await?;
    let Some((_, values)) = source.find_keyword_row(keyword, 1) else {
        return Ok(keyword_missing(keyword, pivot));
    };

    match values.last() {
        Some(last) if !last.is_empty() => {
            workbook
                .write_table_cell(dest, target_row, dest_col, last.clone())
                .await?;
            Ok(ExtractOutcome::Applied)
        }
        _ => {
            let reason = format!("{} 的 '{}' 行最后一列没有数据", pivot, keyword);
            warn!("⚠️ {}", reason);
            Ok(ExtractOutcome::Skipped(reason))
        }
    }
}

/// 目标列中第一个空单元格所在行；没有空行时为紧接末行的下一行。0 算作有值
fn first_empty_row(body: &Grid, column: usize) -> usize {
    body.rows()
        .position(|row| row.get(column - 1).map_or(true, CellValue::is_empty))
        .map(|i| i + 1)
        .unwrap_or(body.row_count() + 1)
}

/// F：按阅读顺序复制矩形区域的每个单元格
async fn range_copy<W>(
    workbook: &mut W,
    sheet: &str,
    range: CellRange,
    dest: &TableRef,
    date_stamp: Option<&DateStamp>,
    column_offset: ColumnOffset,
) -> AppResult<ExtractOutcome>
where
    W: Workbook + ?Sized,
{
    let source = workbook.read_range(sheet, range).await?;
    let row = append_row(workbook, dest, date_stamp).await?;
    for (i, value) in source.cells().enumerate() {
        workbook
            .write_table_cell(dest, row, column_offset(i + 1), value.clone())
            .await?;
    }
    Ok(ExtractOutcome::Applied)
}

/// 追加一行并写入日期戳，返回新行号
async fn append_row<W>(
    workbook: &mut W,
    dest: &TableRef,
    date_stamp: Option<&DateStamp>,
) -> AppResult<usize>
where
    W: Workbook + ?Sized,
{
    let row = workbook.append_table_row(dest).await?;
    if let Some(stamp) = date_stamp {
        workbook
            .write_table_cell(dest, row, stamp.column, stamp.value.clone())
            .await?;
    }
    Ok(row)
}

/// 把 `values` 中 `columns`（从 1 开始）的值写入目标行的偏移列
async fn write_columns<W>(
    workbook: &mut W,
    dest: &TableRef,
    row: usize,
    values: &[CellValue],
    columns: std::ops::Range<usize>,
    column_offset: ColumnOffset,
) -> AppResult<()>
where
    W: Workbook + ?Sized,
{
    for j in columns {
        let value = values.get(j - 1).cloned().unwrap_or_default();
        workbook
            .write_table_cell(dest, row, column_offset(j), value)
            .await?;
    }
    Ok(())
}

fn keyword_missing(keyword: &str, pivot: &PivotRef) -> ExtractOutcome {
    skipped(NotFoundError::KeywordRow {
        source_ref: pivot.to_string(),
        keyword: keyword.to_string(),
    })
}

fn skipped(err: NotFoundError) -> ExtractOutcome {
    warn!("⚠️ {}", err);
    ExtractOutcome::Skipped(err.to_string())
}
