#![allow(dead_code)]

use std::path::Path;

use calamine::{DataType, Reader, Xlsx, open_workbook};
use rust_xlsxwriter::Workbook;

pub const ENTRIES_SHEET: &str = "调整分录";
pub const CHECK_SHEET: &str = "资产负债表";

/// One adjustment line: entity, entry number, account, amount.
pub type Entry<'a> = (&'a str, f64, &'a str, f64);

/// Path table with two title rows above the header on row 3.
pub fn write_path_table(path: &Path, rows: &[(&str, &str, &str)]) {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.write_string(0, 0, "文件夹名称").expect("title");
    sheet.write_string(0, 1, "TB文件").expect("folder");
    for (col, header) in ["账套名称", "类型", "文件名称", "法人文件夹", "相对路径"]
        .iter()
        .enumerate()
    {
        sheet.write_string(2, col as u16, *header).expect("header");
    }
    for (idx, (entity, tier, relative_path)) in rows.iter().enumerate() {
        let row = 3 + idx as u32;
        sheet.write_string(row, 0, *entity).expect("entity");
        if !tier.is_empty() {
            sheet.write_string(row, 1, *tier).expect("tier");
        }
        sheet.write_string(row, 4, *relative_path).expect("path");
    }
    workbook.save(path).expect("path table saved");
}

pub fn write_adjustments(path: &Path, entries: &[Entry<'_>]) {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    for (col, header) in ["账套名称", "编号", "科目", "金额"].iter().enumerate() {
        sheet.write_string(0, col as u16, *header).expect("header");
    }
    for (idx, (entity, key, account, amount)) in entries.iter().enumerate() {
        let row = 1 + idx as u32;
        sheet.write_string(row, 0, *entity).expect("entity");
        sheet.write_number(row, 1, *key).expect("key");
        sheet.write_string(row, 2, *account).expect("account");
        sheet.write_number(row, 3, *amount).expect("amount");
    }
    workbook.save(path).expect("adjustments saved");
}

/// Entity workbook with a balance sheet (H45 retained earnings, A3 balance
/// flag) and an entries sheet with five header rows followed by stale entries
/// on rows 6..=`last_row` in columns A..C. `extra` cells are `(row, col, text)`
/// with zero-based coordinates.
pub fn write_entity_workbook(path: &Path, retained: f64, last_row: u32, extra: &[(u32, u16, &str)]) {
    let mut workbook = Workbook::new();
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name(CHECK_SHEET).expect("sheet name");
        sheet.write_string(2, 0, "平").expect("balance flag");
        sheet.write_number(44, 7, retained).expect("retained earnings");
    }
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name(ENTRIES_SHEET).expect("sheet name");
        for row in 0..5u32 {
            sheet
                .write_string(row, 0, format!("header {}", row + 1))
                .expect("header row");
        }
        for row in 5..last_row {
            for col in 0..3u16 {
                sheet.write_string(row, col, "stale").expect("stale entry");
            }
        }
        for (row, col, text) in extra {
            sheet.write_string(*row, *col, *text).expect("extra cell");
        }
    }
    workbook.save(path).expect("entity workbook saved");
}

/// Reads a sheet as a zero-based grid accessor.
pub fn read_sheet(path: &Path, sheet: &str) -> calamine::Range<DataType> {
    let mut workbook: Xlsx<_> = open_workbook(path).expect("workbook opened");
    workbook
        .worksheet_range(sheet)
        .expect("sheet present")
        .expect("sheet read")
}

pub fn text_at(range: &calamine::Range<DataType>, row: u32, col: u32) -> String {
    match range.get_value((row, col)) {
        Some(DataType::String(value)) => value.clone(),
        Some(DataType::Float(value)) => value.to_string(),
        Some(DataType::Int(value)) => value.to_string(),
        Some(DataType::Empty) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Formula text stored at a zero-based position, without the leading `=`.
pub fn formula_at(path: &Path, sheet: &str, row: u32, col: u32) -> String {
    let mut workbook: Xlsx<_> = open_workbook(path).expect("workbook opened");
    let formulas = workbook
        .worksheet_formula(sheet)
        .expect("sheet present")
        .expect("formulas read");
    formulas
        .get_value((row, col))
        .map(|formula| formula.trim_start_matches('=').to_string())
        .unwrap_or_default()
}
