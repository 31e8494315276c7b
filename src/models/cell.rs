//! 单元格值

use serde::{Deserialize, Serialize};
use std::fmt;

/// 单元格值
///
/// 对应外部表格文档中单个单元格的内容。批量读取返回的二维块由它组成。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum CellValue {
    /// 空单元格
    #[default]
    Empty,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl CellValue {
    /// 是否为空（无值或空字符串）
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    /// 是否为空或零
    pub fn is_empty_or_zero(&self) -> bool {
        match self {
            CellValue::Number(n) => *n == 0.0,
            other => other.is_empty(),
        }
    }

    /// 文本是否包含关键字（空单元格永远不匹配）
    ///
    /// 数字按显示形式匹配：整数值不带小数部分，`1.0` 显示为 `"1"`。
    pub fn contains(&self, keyword: &str) -> bool {
        !self.is_empty() && self.to_string().contains(keyword)
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Bool(b) => write!(f, "{}", b),
            CellValue::Number(n) => write!(f, "{}", n),
            CellValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

impl From<i64> for CellValue {
    fn from(n: i64) -> Self {
        CellValue::Number(n as f64)
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}
