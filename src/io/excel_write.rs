use std::path::Path;

use rust_xlsxwriter::{Color, Format, Workbook, Worksheet};

use crate::error::Result;
use crate::layout::Layout;
use crate::model::{CellValue, EntityResult};

const YELLOW: u32 = 0xFFFF00;
const RED: u32 = 0xFF0000;
const GREEN: u32 = 0x00FF00;

/// Writes the run summary: one header row followed by one row per result.
pub fn write_summary(path: &Path, layout: &Layout, results: &[EntityResult]) -> Result<()> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(&layout.output.summary_sheet)?;

    for (col_idx, header) in layout.output.summary_headers.iter().enumerate() {
        worksheet.write_string(0, col_idx as u16, header)?;
    }

    for (row_idx, result) in results.iter().enumerate() {
        for (col_idx, value) in result.to_row().iter().enumerate() {
            write_value(worksheet, (row_idx + 1) as u32, col_idx as u16, value)?;
        }
    }

    workbook.save(path)?;
    Ok(())
}

/// Writes the starter adjustment entries workbook. The entity header is
/// highlighted yellow and the placeholder for the user's own headers red.
pub fn write_adjustment_template(path: &Path, layout: &Layout) -> Result<()> {
    let yellow = fill(YELLOW);
    let red = fill(RED);

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(&layout.entity_workbook.entries_sheet)?;
    worksheet.write_string_with_format(0, 0, &layout.adjustments.entity_column, &yellow)?;
    worksheet.write_string_with_format(0, 1, "从这里复制你的调整分录表头", &red)?;

    workbook.save(path)?;
    Ok(())
}

/// Writes the starter path table workbook. B1 (green) holds the folder name
/// that the relative-path formula on row 4 joins with the legal-entity
/// folder and file name.
pub fn write_path_table_template(path: &Path, layout: &Layout) -> Result<()> {
    let yellow = fill(YELLOW);
    let green = fill(GREEN);
    let header_row = layout.path_table.header_row.saturating_sub(1);

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name("路径表")?;
    worksheet.write_string(0, 0, "文件夹名称")?;
    worksheet.write_blank(0, 1, &green)?;

    worksheet.write_string_with_format(header_row, 0, &layout.path_table.entity_column, &yellow)?;
    worksheet.write_string(header_row, 1, &layout.path_table.tier_column)?;
    worksheet.write_string(header_row, 2, "文件名称")?;
    worksheet.write_string(header_row, 3, "法人文件夹")?;
    worksheet.write_string(header_row, 4, &layout.path_table.path_column)?;

    let first_data = header_row + 1;
    let excel_row = first_data + 1;
    worksheet.write_formula(
        first_data,
        4,
        format!("=_xlfn.TEXTJOIN(\"/\",TRUE,$B$1,D{excel_row},C{excel_row})").as_str(),
    )?;

    workbook.save(path)?;
    Ok(())
}

fn write_value(worksheet: &mut Worksheet, row: u32, col: u16, value: &CellValue) -> Result<()> {
    match value {
        CellValue::Text(text) => {
            worksheet.write_string(row, col, text)?;
        }
        CellValue::Number(number) => {
            worksheet.write_number(row, col, *number)?;
        }
        CellValue::Date(serial) => {
            let format = Format::new().set_num_format(CellValue::date_format_code(*serial));
            worksheet.write_number_with_format(row, col, *serial, &format)?;
        }
        CellValue::Boolean(flag) => {
            worksheet.write_boolean(row, col, *flag)?;
        }
        CellValue::Empty => {}
    }
    Ok(())
}

fn fill(rgb: u32) -> Format {
    Format::new().set_background_color(Color::RGB(rgb))
}
