//! 提取操作定义
//!
//! 每个操作描述"从哪个汇总视图读什么，追加到哪个历史表格"。
//! 六种结构形态各对应一个变体，只携带该算法需要的字段。

use std::fmt;

use super::cell::CellValue;

/// 列偏移函数：源列位置 → 目标列位置（均从 1 开始）
pub type ColumnOffset = fn(usize) -> usize;

/// 数据透视表引用
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PivotRef {
    pub sheet: String,
    pub name: String,
}

impl PivotRef {
    pub fn new(sheet: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            sheet: sheet.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for PivotRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}!{}", self.sheet, self.name)
    }
}

/// 列表（历史表格）引用
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub sheet: String,
    pub name: String,
}

impl TableRef {
    pub fn new(sheet: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            sheet: sheet.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}!{}", self.sheet, self.name)
    }
}

/// 工作表上的矩形区域（行列均从 1 开始，闭区间）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRange {
    pub start_row: usize,
    pub start_col: usize,
    pub end_row: usize,
    pub end_col: usize,
}

impl CellRange {
    pub fn new(start_row: usize, start_col: usize, end_row: usize, end_col: usize) -> Self {
        Self {
            start_row,
            start_col,
            end_row,
            end_col,
        }
    }
}

/// 写入新行的日期戳
#[derive(Debug, Clone, PartialEq)]
pub struct DateStamp {
    /// 新行中的列（从 1 开始）
    pub column: usize,
    pub value: CellValue,
}

impl DateStamp {
    pub fn new(column: usize, value: impl Into<CellValue>) -> Self {
        Self {
            column,
            value: value.into(),
        }
    }
}

/// 结构形态代号
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pattern {
    A,
    B,
    C,
    D,
    E,
    F,
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let letter = match self {
            Pattern::A => "A",
            Pattern::B => "B",
            Pattern::C => "C",
            Pattern::D => "D",
            Pattern::E => "E",
            Pattern::F => "F",
        };
        f.write_str(letter)
    }
}

/// 操作种类
#[derive(Debug, Clone)]
pub enum OperationKind {
    /// A：复制数据区全部行（跳过最后的总计列）
    CopyDataBody {
        pivot: PivotRef,
        date_stamp: Option<DateStamp>,
        column_offset: ColumnOffset,
    },
    /// B：按关键字定位行，复制第 2..N-1 列
    KeywordRow {
        pivot: PivotRef,
        keyword: String,
        row_start: usize,
        date_stamp: Option<DateStamp>,
        column_offset: ColumnOffset,
    },
    /// C：把关键字行最后一列的值写入目标列的第一个空单元格
    FillFirstEmpty {
        pivot: PivotRef,
        keyword: String,
        dest_col_header: String,
    },
    /// D：按关键字定位行，提取单个值写入新行第一格
    SingleCell {
        pivot: PivotRef,
        keyword: String,
        row_start: usize,
        extract_column: usize,
    },
    /// E：同 B 但包含最后一列；整行为空或零时统一写 0
    KeywordRowZeroFill {
        pivot: PivotRef,
        keyword: String,
        row_start: usize,
        date_stamp: Option<DateStamp>,
        column_offset: ColumnOffset,
    },
    /// F：直接复制工作表上的矩形区域
    RangeCopy {
        sheet: String,
        range: CellRange,
        date_stamp: Option<DateStamp>,
        column_offset: ColumnOffset,
    },
}

/// B 的默认起始行
pub const KEYWORD_ROW_START: usize = 1;
/// D / E 的默认起始行（跳过标题行）
pub const KEYWORD_ROW_START_SKIP_HEADER: usize = 2;

/// 单个提取操作
#[derive(Debug, Clone)]
pub struct Operation {
    pub name: String,
    pub dest: TableRef,
    pub kind: OperationKind,
}

impl Operation {
    pub fn new(name: impl Into<String>, dest: TableRef, kind: OperationKind) -> Self {
        Self {
            name: name.into(),
            dest,
            kind,
        }
    }

    pub fn pattern(&self) -> Pattern {
        match self.kind {
            OperationKind::CopyDataBody { .. } => Pattern::A,
            OperationKind::KeywordRow { .. } => Pattern::B,
            OperationKind::FillFirstEmpty { .. } => Pattern::C,
            OperationKind::SingleCell { .. } => Pattern::D,
            OperationKind::KeywordRowZeroFill { .. } => Pattern::E,
            OperationKind::RangeCopy { .. } => Pattern::F,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} → {}", self.pattern(), self.name, self.dest)
    }
}
