//! 二维单元格块
//!
//! 每一次批量读取都返回一个 `Grid`，调用方在内存中遍历，不再逐格访问外部文档。

use serde::{Deserialize, Serialize};

use super::cell::CellValue;

/// 矩形单元格块（行优先）
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Grid {
    rows: Vec<Vec<CellValue>>,
}

impl Grid {
    /// 由行构建，短行用空单元格补齐为矩形
    pub fn new(mut rows: Vec<Vec<CellValue>>) -> Self {
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        for row in rows.iter_mut() {
            row.resize(width, CellValue::Empty);
        }
        Self { rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.rows.first().map(Vec::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// 第 `row` 行（从 1 开始）
    pub fn row(&self, row: usize) -> Option<&[CellValue]> {
        row.checked_sub(1)
            .and_then(|i| self.rows.get(i))
            .map(Vec::as_slice)
    }

    /// 第 `row` 行第 `column` 列（均从 1 开始）
    pub fn cell(&self, row: usize, column: usize) -> Option<&CellValue> {
        self.row(row)
            .and_then(|r| column.checked_sub(1).and_then(|c| r.get(c)))
    }

    pub fn rows(&self) -> impl Iterator<Item = &[CellValue]> {
        self.rows.iter().map(Vec::as_slice)
    }

    /// 行优先展开所有单元格
    pub fn cells(&self) -> impl Iterator<Item = &CellValue> {
        self.rows.iter().flatten()
    }

    /// 从第 `row_start` 行（从 1 开始）向下查找第一个首列包含关键字的行
    ///
    /// 返回行号（从 1 开始）和该行内容。
    pub fn find_keyword_row(&self, keyword: &str, row_start: usize) -> Option<(usize, &[CellValue])> {
        let skip = row_start.saturating_sub(1);
        self.rows
            .iter()
            .enumerate()
            .skip(skip)
            .find(|(_, row)| row.first().is_some_and(|cell| cell.contains(keyword)))
            .map(|(i, row)| (i + 1, row.as_slice()))
    }

    /// 截取子块（行列均从 1 开始，闭区间），超出部分忽略
    pub fn slice(&self, rows: (usize, usize), columns: (usize, usize)) -> Grid {
        let rows = self
            .rows
            .iter()
            .skip(rows.0.saturating_sub(1))
            .take((rows.1 + 1).saturating_sub(rows.0))
            .map(|row| {
                row.iter()
                    .skip(columns.0.saturating_sub(1))
                    .take((columns.1 + 1).saturating_sub(columns.0))
                    .cloned()
                    .collect()
            })
            .collect();
        Grid { rows }
    }
}

impl From<Vec<Vec<CellValue>>> for Grid {
    fn from(rows: Vec<Vec<CellValue>>) -> Self {
        Grid::new(rows)
    }
}
