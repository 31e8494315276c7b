//! 操作计划 - 业务能力层
//!
//! 固定顺序的 19 个提取操作，分属五个报表区域。
//! 追加顺序就是历史表格里可见的行顺序，因此列表顺序不能调整。

use crate::models::operation::{KEYWORD_ROW_START, KEYWORD_ROW_START_SKIP_HEADER};
use crate::models::{CellRange, DateStamp, Operation, OperationKind, PivotRef, TableRef};

/// 所有数据透视表所在的工作表
pub const SOURCE_SHEET: &str = "UTILITY";

const MO_YR_SUMMARY: &str = "MO YR SUMMARY";
const DN_AO_YR_SUMMARY: &str = "DN AO YR SUMMARY";
const SO_YR_COMP: &str = "SO YR COMP";
const SO_YR_INCMP: &str = "SO YR INCMP";
const MO_PERCENT: &str = "MO %";

/// 日期戳写入新行的第 2 列
const DATE_COLUMN: usize = 2;

fn pivot(name: &str) -> PivotRef {
    PivotRef::new(SOURCE_SHEET, name)
}

fn stamp(date: &str) -> Option<DateStamp> {
    Some(DateStamp::new(DATE_COLUMN, date))
}

fn keyword_row(
    name: &str,
    (sheet, table): (&str, &str),
    pivot_name: &str,
    keyword: &str,
    row_start: usize,
    date_stamp: Option<DateStamp>,
    column_offset: fn(usize) -> usize,
) -> Operation {
    Operation::new(
        name,
        TableRef::new(sheet, table),
        OperationKind::KeywordRow {
            pivot: pivot(pivot_name),
            keyword: keyword.to_string(),
            row_start,
            date_stamp,
            column_offset,
        },
    )
}

fn zero_fill_row(
    name: &str,
    table: &str,
    keyword: &str,
    date_stamp: Option<DateStamp>,
    column_offset: fn(usize) -> usize,
) -> Operation {
    Operation::new(
        name,
        TableRef::new(SO_YR_INCMP, table),
        OperationKind::KeywordRowZeroFill {
            pivot: pivot("PivotTable8"),
            keyword: keyword.to_string(),
            row_start: KEYWORD_ROW_START_SKIP_HEADER,
            date_stamp,
            column_offset,
        },
    )
}

fn fill_first_empty(name: &str, (sheet, table): (&str, &str), pivot_name: &str, header: &str) -> Operation {
    Operation::new(
        name,
        TableRef::new(sheet, table),
        OperationKind::FillFirstEmpty {
            pivot: pivot(pivot_name),
            keyword: "PREVIOUS FULL DAY".to_string(),
            dest_col_header: header.to_string(),
        },
    )
}

fn single_cell(name: &str, (sheet, table): (&str, &str), pivot_name: &str, extract_column: usize) -> Operation {
    Operation::new(
        name,
        TableRef::new(sheet, table),
        OperationKind::SingleCell {
            pivot: pivot(pivot_name),
            keyword: "eStore".to_string(),
            row_start: KEYWORD_ROW_START_SKIP_HEADER,
            extract_column,
        },
    )
}

fn copy_data_body(
    name: &str,
    table: &str,
    pivot_name: &str,
    date_stamp: Option<DateStamp>,
    column_offset: fn(usize) -> usize,
) -> Operation {
    Operation::new(
        name,
        TableRef::new(MO_YR_SUMMARY, table),
        OperationKind::CopyDataBody {
            pivot: pivot(pivot_name),
            date_stamp,
            column_offset,
        },
    )
}

/// 构建完整的操作计划
///
/// `today` 与 `prev_business_day` 为表格日期戳（`YYYY-MM-DD`）。
pub fn build_operations(today: &str, prev_business_day: &str) -> Vec<Operation> {
    vec![
        // ── MO YR SUMMARY ──
        copy_data_body("Incomplete Inventory > 0", "YR_INCOMP", "PivotTable5", stamp(today), |j| j + 2),
        copy_data_body("No Inventory = 0", "YR_NOINV", "PivotTable7", None, |j| j),
        copy_data_body("Total MO Created", "MB51_submit18", "PivotTable4", None, |j| j),
        keyword_row(
            "Daily Reservation Submitted",
            (MO_YR_SUMMARY, "MB51_submit"),
            "PivotTable11",
            "CURRENT UNIL 6 PM",
            KEYWORD_ROW_START,
            None,
            |j| j - 1,
        ),
        fill_first_empty(
            "Prev Full Day Submitted",
            (MO_YR_SUMMARY, "MB51_submit"),
            "PivotTable11",
            "Full Day SUBMIT",
        ),
        // ── DN AO YR SUMMARY ──
        keyword_row(
            "DN AO Inventory Available",
            (DN_AO_YR_SUMMARY, "AO_INV_AVAIL"),
            "PivotTable3",
            "Available",
            KEYWORD_ROW_START,
            stamp(today),
            |j| j + 1,
        ),
        keyword_row(
            "DN AO No Inventory",
            (DN_AO_YR_SUMMARY, "AO_NO_INV"),
            "PivotTable3",
            "No Inventory",
            KEYWORD_ROW_START,
            None,
            |j| j - 1,
        ),
        keyword_row(
            "DN AO Partial Inventory",
            (DN_AO_YR_SUMMARY, "AO_PART_INV"),
            "PivotTable3",
            "Partial",
            KEYWORD_ROW_START,
            None,
            |j| j - 1,
        ),
        keyword_row(
            "Daily DN AO Submitted",
            (DN_AO_YR_SUMMARY, "Table16"),
            "PivotTable1",
            "CURRENT UNIL 6 PM",
            KEYWORD_ROW_START,
            None,
            |j| j - 1,
        ),
        fill_first_empty(
            "Prev Full Day AO Submitted",
            (DN_AO_YR_SUMMARY, "Table16"),
            "PivotTable1",
            "FULL DAY SUBMIT",
        ),
        // ── SO YR COMP ──
        keyword_row(
            "SO YR COMP - Assembly Completed",
            (SO_YR_COMP, "Table9"),
            "PivotTable6",
            "ASSEMBLY COMPLETED",
            KEYWORD_ROW_START_SKIP_HEADER,
            stamp(prev_business_day),
            |j| j + 1,
        ),
        single_cell("SO YR COMP - eStore", (SO_YR_COMP, "Table11"), "PivotTable6", 6),
        keyword_row(
            "SO YR COMP - HUB ORDER",
            (SO_YR_COMP, "Table15"),
            "PivotTable6",
            "HUB ORDER",
            KEYWORD_ROW_START_SKIP_HEADER,
            None,
            |j| j - 1,
        ),
        keyword_row(
            "SO YR COMP - REGULAR",
            (SO_YR_COMP, "Table19"),
            "PivotTable6",
            "REGULAR",
            KEYWORD_ROW_START_SKIP_HEADER,
            None,
            |j| j - 1,
        ),
        // ── SO YR INCMP ──
        zero_fill_row(
            "SO YR INCMP - Assembly Completed",
            "Table21",
            "ASSEMBLY COMPLETED",
            stamp(today),
            |j| j + 1,
        ),
        single_cell("SO YR INCMP - eStore", (SO_YR_INCMP, "Table2326"), "PivotTable8", 7),
        zero_fill_row("SO YR INCMP - HUB ORDER", "Table27", "HUB ORDER", None, |j| j - 1),
        zero_fill_row("SO YR INCMP - REGULAR", "Table28", "REGULAR", None, |j| j - 1),
        // ── MO % ──
        Operation::new(
            "MO % Sheet Copy",
            TableRef::new(MO_PERCENT, "Table18"),
            OperationKind::RangeCopy {
                sheet: MO_PERCENT.to_string(),
                // C4:DB4
                range: CellRange::new(4, 3, 4, 106),
                date_stamp: stamp(today),
                column_offset: |i| i + 11,
            },
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Pattern;

    #[test]
    fn test_plan_order_and_patterns() {
        let ops = build_operations("2024-03-15", "2024-03-14");
        assert_eq!(ops.len(), 19);

        let patterns: String = ops.iter().map(|op| op.pattern().to_string()).collect();
        assert_eq!(patterns, "AAABCBBBBCBDBBEDEEF");

        assert_eq!(ops[0].name, "Incomplete Inventory > 0");
        assert_eq!(ops[18].dest, TableRef::new("MO %", "Table18"));
    }

    #[test]
    fn test_date_stamps() {
        let ops = build_operations("2024-03-15", "2024-03-14");
        let stamped: Vec<(&str, String)> = ops
            .iter()
            .filter_map(|op| {
                let stamp = match &op.kind {
                    OperationKind::CopyDataBody { date_stamp, .. }
                    | OperationKind::KeywordRow { date_stamp, .. }
                    | OperationKind::KeywordRowZeroFill { date_stamp, .. }
                    | OperationKind::RangeCopy { date_stamp, .. } => date_stamp.as_ref(),
                    _ => None,
                };
                stamp.map(|s| (op.name.as_str(), s.value.to_string()))
            })
            .collect();

        assert_eq!(stamped.len(), 5);
        // 只有 SO YR COMP 用上一个工作日
        assert!(stamped.contains(&("SO YR COMP - Assembly Completed", "2024-03-14".to_string())));
        assert_eq!(
            stamped.iter().filter(|(_, v)| v == "2024-03-15").count(),
            4
        );
    }

    #[test]
    fn test_all_pivots_on_utility_sheet() {
        for op in build_operations("t", "p") {
            match &op.kind {
                OperationKind::RangeCopy { sheet, .. } => assert_eq!(sheet, "MO %"),
                OperationKind::CopyDataBody { pivot, .. }
                | OperationKind::KeywordRow { pivot, .. }
                | OperationKind::FillFirstEmpty { pivot, .. }
                | OperationKind::SingleCell { pivot, .. }
                | OperationKind::KeywordRowZeroFill { pivot, .. } => {
                    assert_eq!(pivot.sheet, SOURCE_SHEET)
                }
            }
        }
    }

    #[test]
    fn test_range_copy_offsets() {
        let ops = build_operations("t", "p");
        let OperationKind::RangeCopy { range, column_offset, .. } = &ops[18].kind else {
            panic!("最后一个操作应为区域复制");
        };
        assert_eq!(range.end_col - range.start_col + 1, 104);
        assert_eq!(column_offset(1), 12);
        assert_eq!(ops[18].pattern(), Pattern::F);
    }
}
