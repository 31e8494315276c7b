//! 旧格式工作簿转换
//!
//! 用 calamine 读取下载的 `.xls`（按内容识别格式，不看扩展名），
//! 再用 rust_xlsxwriter 逐个工作表写出 `.xlsx`。只保留单元格值。

use std::io::Cursor;
use std::path::Path;

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use rust_xlsxwriter::{Workbook as XlsxWorkbook, Worksheet};
use tracing::debug;

use crate::error::{AppError, AppResult};

const OPERATION: &str = "转换 xlsx";

/// 转换 `source` 为 `dest`，返回写出的工作表数量
pub fn convert_to_xlsx(source: &Path, dest: &Path) -> AppResult<usize> {
    let bytes = std::fs::read(source)
        .map_err(|e| AppError::io(format!("无法读取 {}", source.display()), e))?;
    let mut reader = open_workbook_auto_from_rs(Cursor::new(bytes)).map_err(|e| {
        AppError::session(OPERATION, format!("{} 不是可识别的工作簿: {}", source.display(), e))
    })?;

    let mut output = XlsxWorkbook::new();
    let names = reader.sheet_names();
    for name in &names {
        let range = reader
            .worksheet_range(name)
            .map_err(|e| AppError::session(OPERATION, format!("读取工作表 '{}' 失败: {}", name, e)))?;
        let sheet = output.add_worksheet();
        sheet
            .set_name(name)
            .map_err(|e| AppError::session(OPERATION, e.to_string()))?;

        let (first_row, first_col) = range.start().unwrap_or((0, 0));
        for (i, row) in range.rows().enumerate() {
            for (j, cell) in row.iter().enumerate() {
                let r = first_row + i as u32;
                let c = first_col as usize + j;
                write_cell(sheet, r, c, cell)?;
            }
        }
        debug!("工作表 '{}' 已转换 ({} 行)", name, range.height());
    }

    output
        .save(dest)
        .map_err(|e| AppError::session(OPERATION, format!("无法写入 {}: {}", dest.display(), e)))?;
    Ok(names.len())
}

fn write_cell(sheet: &mut Worksheet, row: u32, col: usize, cell: &Data) -> AppResult<()> {
    let col = u16::try_from(col)
        .map_err(|_| AppError::session(OPERATION, format!("第 {} 列超出 xlsx 范围", col + 1)))?;
    let result = match cell {
        Data::Empty => return Ok(()),
        Data::Int(i) => sheet.write_number(row, col, *i as f64).map(|_| ()),
        Data::Float(f) => sheet.write_number(row, col, *f).map(|_| ()),
        Data::Bool(b) => sheet.write_boolean(row, col, *b).map(|_| ()),
        Data::DateTime(dt) => sheet.write_number(row, col, dt.as_f64()).map(|_| ()),
        Data::String(s) => sheet.write_string(row, col, s).map(|_| ()),
        other => sheet.write_string(row, col, other.to_string()).map(|_| ()),
    };
    result.map_err(|e| AppError::session(OPERATION, e.to_string()))
}
