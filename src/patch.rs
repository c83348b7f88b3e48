//! In-place editing of entity workbooks.
//!
//! Check values are read through calamine, which only sees cached results and
//! never touches the file. Edits go through umya-spreadsheet so that every
//! other sheet, style and formula survives the round trip.

use std::path::Path;

use tracing::{debug, instrument};
use umya_spreadsheet::helper::coordinate::{coordinate_from_index_with_lock, index_from_coordinate};
use umya_spreadsheet::{Spreadsheet, Worksheet};

use crate::error::{Result, ToolError};
use crate::io::excel_read::read_check_values;
use crate::layout::{EntityWorkbookLayout, Layout};
use crate::model::{CellValue, EntityResult, InsertBlock};

/// How the entries region of one workbook is rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionPlan {
    /// Inclusive row span cleared before writing, if any rows exist there.
    pub clear_rows: Option<(u32, u32)>,
    /// Columns `1..=clear_columns` are cleared on each of those rows.
    pub clear_columns: u32,
    /// Blank rows inserted at `write_from_row` before writing.
    pub rows_to_insert: u32,
    pub write_from_row: u32,
    pub rows_to_write: u32,
}

impl RegionPlan {
    /// Number of cell positions the clearing pass visits.
    pub fn cleared_cells(&self) -> u64 {
        match self.clear_rows {
            Some((first, last)) => u64::from(last - first + 1) * u64::from(self.clear_columns),
            None => 0,
        }
    }
}

/// Sizes the rewrite of a sheet whose last used row is `last_row` for a block
/// of `block_rows` × `block_columns` values.
pub fn plan_region(
    last_row: u32,
    block_rows: usize,
    block_columns: usize,
    layout: &EntityWorkbookLayout,
) -> RegionPlan {
    let clear_rows = (last_row >= layout.clear_from_row).then_some((layout.clear_from_row, last_row));
    let shortfall =
        block_rows as i64 - i64::from(last_row) + i64::from(layout.insert_headroom);

    RegionPlan {
        clear_rows,
        clear_columns: block_columns as u32,
        rows_to_insert: shortfall.max(0) as u32,
        write_from_row: layout.write_from_row,
        rows_to_write: block_rows as u32,
    }
}

/// Patches one entity workbook and reports its check values before and after.
///
/// The file is read twice without modification (before and after) and saved
/// exactly once in between.
#[instrument(level = "info", skip(block, layout), fields(path = %path.display()))]
pub fn patch_entity(
    entity: &str,
    path: &Path,
    block: &InsertBlock,
    layout: &Layout,
) -> Result<EntityResult> {
    if !path.exists() {
        return Err(ToolError::MissingInput(path.to_path_buf()));
    }

    let before = read_check_values(path, layout)?;
    let plan = apply_insert_block(path, block, &layout.entity_workbook)?;
    debug!(
        cleared_cells = plan.cleared_cells(),
        rows_inserted = plan.rows_to_insert,
        rows_written = plan.rows_to_write,
        "entries region rewritten"
    );
    let after = read_check_values(path, layout)?;

    Ok(EntityResult {
        entity: entity.to_string(),
        before,
        after,
    })
}

/// Clears the entries region, makes room for `block` and writes it, then
/// saves the workbook in place.
pub fn apply_insert_block(
    path: &Path,
    block: &InsertBlock,
    layout: &EntityWorkbookLayout,
) -> Result<RegionPlan> {
    let mut book = open_for_edit(path)?;

    let plan = {
        let sheet = entries_sheet(&mut book, path, layout)?;
        let plan = plan_region(
            sheet.get_highest_row(),
            block.row_count(),
            block.column_count(),
            layout,
        );
        clear_region(sheet, &plan);
        if plan.rows_to_insert > 0 {
            sheet.insert_new_row(&plan.write_from_row, &plan.rows_to_insert);
        }
        write_block(sheet, block, plan.write_from_row);
        plan
    };

    if plan.rows_to_insert > 0 {
        let rewritten = shift_external_references(
            &mut book,
            &layout.entries_sheet,
            plan.write_from_row,
            plan.rows_to_insert,
        );
        debug!(rewritten, "formulas on other sheets shifted");
    }

    save(&book, path)?;
    Ok(plan)
}

/// Opens and re-saves a workbook so that spreadsheet applications refresh its
/// formulas the next time it is opened. No formulas are evaluated here.
#[instrument(level = "debug", fields(path = %path.display()))]
pub fn force_recalculation(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(ToolError::MissingInput(path.to_path_buf()));
    }
    let book = open_for_edit(path)?;
    save(&book, path)
}

fn entries_sheet<'a>(
    book: &'a mut Spreadsheet,
    path: &Path,
    layout: &EntityWorkbookLayout,
) -> Result<&'a mut Worksheet> {
    book.get_sheet_by_name_mut(&layout.entries_sheet)
        .ok_or_else(|| ToolError::MissingSheet {
            path: path.to_path_buf(),
            sheet: layout.entries_sheet.clone(),
        })
}

/// Moves references into `sheet_name` held by formulas on every other sheet,
/// so that rows at or below `at_row` keep pointing at the same cells after
/// `count` rows were inserted. Returns the number of rewritten formulas.
///
/// The worksheet-level insert only rewrites the inserted sheet itself, and the
/// workbook-level one shifts the cells of every sheet.
fn shift_external_references(
    book: &mut Spreadsheet,
    sheet_name: &str,
    at_row: u32,
    count: u32,
) -> usize {
    let mut rewritten = 0;
    for sheet in book.get_sheet_collection_mut().iter_mut() {
        if sheet.get_name() == sheet_name {
            continue;
        }
        for cell in sheet.get_cell_collection_mut() {
            if !cell.is_formula() {
                continue;
            }
            if let Some(formula) = shift_formula_rows(cell.get_formula(), sheet_name, at_row, count)
            {
                cell.set_formula(formula);
                rewritten += 1;
            }
        }
    }
    rewritten
}

/// Rewrites `sheet_name!ref` and `'sheet_name'!ref` operands of `formula`.
/// Returns `None` when nothing changed.
fn shift_formula_rows(formula: &str, sheet_name: &str, at_row: u32, count: u32) -> Option<String> {
    let prefixes = [
        format!("'{}'!", sheet_name.replace('\'', "''")),
        format!("{sheet_name}!"),
    ];
    let mut out = String::with_capacity(formula.len());
    let mut idx = 0;
    let mut in_string = false;
    let mut changed = false;

    while idx < formula.len() {
        let rest = &formula[idx..];
        if !in_string {
            let at_boundary = formula[..idx]
                .chars()
                .next_back()
                .is_none_or(|prev| !(prev.is_alphanumeric() || prev == '_' || prev == '.'));
            let prefix = prefixes
                .iter()
                .find(|prefix| at_boundary && rest.starts_with(prefix.as_str()));
            if let Some(prefix) = prefix {
                let tail = &rest[prefix.len()..];
                let reference_len = tail
                    .find(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '$' || ch == ':'))
                    .unwrap_or(tail.len());
                let reference = &tail[..reference_len];
                let shifted = shift_reference_rows(reference, at_row, count);
                changed |= shifted != reference;
                out.push_str(prefix);
                out.push_str(&shifted);
                idx += prefix.len() + reference_len;
                continue;
            }
        }

        let Some(ch) = rest.chars().next() else {
            break;
        };
        if ch == '"' {
            in_string = !in_string;
        }
        out.push(ch);
        idx += ch.len_utf8();
    }

    changed.then_some(out)
}

fn shift_reference_rows(reference: &str, at_row: u32, count: u32) -> String {
    reference
        .split(':')
        .map(|segment| {
            let (col, row, col_lock, row_lock) = index_from_coordinate(segment);
            match (col, row) {
                (Some(col), Some(row)) if row >= at_row => coordinate_from_index_with_lock(
                    &col,
                    &(row + count),
                    &col_lock.unwrap_or(false),
                    &row_lock.unwrap_or(false),
                ),
                (None, Some(row)) if row >= at_row => {
                    let lock = if row_lock.unwrap_or(false) { "$" } else { "" };
                    format!("{lock}{}", row + count)
                }
                _ => segment.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join(":")
}

fn clear_region(sheet: &mut Worksheet, plan: &RegionPlan) {
    let Some((first, last)) = plan.clear_rows else {
        return;
    };

    for row in first..=last {
        for col in 1..=plan.clear_columns {
            if sheet.get_cell((col, row)).is_none() {
                continue;
            }
            let cell = sheet.get_cell_mut((col, row));
            cell.get_cell_value_mut().remove_formula();
            cell.set_blank();
        }
    }
}

fn write_block(sheet: &mut Worksheet, block: &InsertBlock, first_row: u32) {
    for (row_offset, values) in block.rows.iter().enumerate() {
        let row = first_row + row_offset as u32;
        for (col_offset, value) in values.iter().enumerate() {
            let col = col_offset as u32 + 1;
            match value {
                CellValue::Text(text) if !text.is_empty() => {
                    sheet.get_cell_mut((col, row)).set_value_string(text.clone());
                }
                CellValue::Number(number) => {
                    sheet.get_cell_mut((col, row)).set_value_number(*number);
                }
                CellValue::Date(serial) => {
                    let cell = sheet.get_cell_mut((col, row));
                    cell.set_value_number(*serial);
                    cell.get_style_mut()
                        .get_number_format_mut()
                        .set_format_code(CellValue::date_format_code(*serial));
                }
                CellValue::Boolean(flag) => {
                    sheet.get_cell_mut((col, row)).set_value_bool(*flag);
                }
                CellValue::Text(_) | CellValue::Empty => {}
            }
        }
    }
}

fn open_for_edit(path: &Path) -> Result<Spreadsheet> {
    umya_spreadsheet::reader::xlsx::read(path).map_err(|error| ToolError::Workbook {
        path: path.to_path_buf(),
        message: error.to_string(),
    })
}

fn save(book: &Spreadsheet, path: &Path) -> Result<()> {
    umya_spreadsheet::writer::xlsx::write(book, path).map_err(|error| ToolError::Workbook {
        path: path.to_path_buf(),
        message: error.to_string(),
    })
}
