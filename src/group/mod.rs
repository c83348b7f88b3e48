//! Turns one entity's adjustment rows into the block written into its
//! workbook: rows clustered by entry number, one blank row after each group,
//! entity column removed.

use crate::model::{AdjustmentRow, CellValue, InsertBlock};

/// Builds the insert block for the rows of a single entity.
///
/// `columns` are the headers of the full adjustment table (entity column
/// first) and `group_index` points at the grouping column within them. Rows
/// shorter than the header are padded with empty cells.
pub fn build_insert_block(
    columns: &[String],
    rows: &[&AdjustmentRow],
    group_index: usize,
) -> InsertBlock {
    let width = columns.len();
    let block_columns: Vec<String> = columns.iter().skip(1).cloned().collect();

    let mut ordered: Vec<&AdjustmentRow> = rows.to_vec();
    // Stable sort keeps source order within each group.
    ordered.sort_by(|lhs, rhs| group_key(lhs, group_index).key_cmp(group_key(rhs, group_index)));

    let mut block_rows: Vec<Vec<CellValue>> = Vec::with_capacity(ordered.len() * 2);
    let mut current: Option<&CellValue> = None;

    for row in ordered {
        let key = group_key(row, group_index);
        if let Some(previous) = current {
            if !previous.same_key(key) {
                block_rows.push(blank_row(block_columns.len()));
            }
        }
        current = Some(key);
        block_rows.push(strip_entity(row, width));
    }

    if current.is_some() {
        block_rows.push(blank_row(block_columns.len()));
    }

    InsertBlock {
        columns: block_columns,
        rows: block_rows,
    }
}

fn group_key(row: &AdjustmentRow, group_index: usize) -> &CellValue {
    static EMPTY: CellValue = CellValue::Empty;
    row.cells.get(group_index).unwrap_or(&EMPTY)
}

fn strip_entity(row: &AdjustmentRow, width: usize) -> Vec<CellValue> {
    (1..width)
        .map(|idx| row.cells.get(idx).cloned().unwrap_or_default())
        .collect()
}

fn blank_row(width: usize) -> Vec<CellValue> {
    vec![CellValue::Empty; width]
}
