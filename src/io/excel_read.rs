use std::collections::HashSet;
use std::path::Path;

use calamine::{DataType, Reader, Xlsx, open_workbook};
use tracing::{debug, instrument, warn};

use crate::error::{Result, ToolError};
use crate::layout::{AdjustmentTableLayout, CellPosition, Layout, PathTableLayout};
use crate::model::{
    AdjustmentRow, AdjustmentTable, CellValue, CheckValues, EntityPathRecord, PathTable,
};

type Grid = Vec<Vec<CellValue>>;

/// Reads the path table from the first sheet of `path`.
#[instrument(level = "debug", skip(layout), fields(path = %path.display()))]
pub fn read_path_table(path: &Path, layout: &PathTableLayout) -> Result<PathTable> {
    let grid = read_first_sheet(path)?;
    let table_name = path.display().to_string();
    let header = header_row(&grid, layout.header_row);

    let entity_idx = find_column(&header, &layout.entity_column, &table_name)?;
    let tier_idx = find_column(&header, &layout.tier_column, &table_name)?;
    let path_idx = find_column(&header, &layout.path_column, &table_name)?;

    let mut seen: HashSet<String> = HashSet::new();
    let mut records = Vec::new();

    for row in grid.iter().skip(layout.header_row as usize) {
        let entity = cell_text(row, entity_idx);
        let relative_path = cell_text(row, path_idx);
        if entity.is_empty() && relative_path.is_empty() {
            continue;
        }
        let tier = layout.tier_for_label(&cell_text(row, tier_idx));

        if !entity.is_empty() && !seen.insert(entity.clone()) {
            warn!(entity = %entity, "duplicate path table entry ignored for lookups");
        }

        records.push(EntityPathRecord {
            entity,
            tier,
            relative_path,
        });
    }

    debug!(records = records.len(), "path table loaded");
    Ok(PathTable { records })
}

/// Reads the adjustment entries table from the first sheet of `path`.
#[instrument(level = "debug", skip(layout), fields(path = %path.display()))]
pub fn read_adjustments(path: &Path, layout: &AdjustmentTableLayout) -> Result<AdjustmentTable> {
    let grid = read_first_sheet(path)?;
    let table_name = path.display().to_string();

    let mut columns: Vec<String> = header_row(&grid, layout.header_row)
        .iter()
        .map(|cell| cell.to_string().trim().to_string())
        .collect();
    while columns.last().is_some_and(|name| name.is_empty()) {
        columns.pop();
    }

    let entity_idx = find_column(&columns, &layout.entity_column, &table_name)?;
    if entity_idx != 0 {
        return Err(ToolError::InvalidWorkbook(format!(
            "column '{}' must be the first column of {table_name}",
            layout.entity_column
        )));
    }
    let group_index = find_column(&columns, &layout.group_column, &table_name)?;

    let width = columns.len();
    let mut rows = Vec::new();
    for (offset, row) in grid.iter().enumerate().skip(layout.header_row as usize) {
        if row.iter().take(width).all(CellValue::is_empty) {
            continue;
        }
        let entity = cell_text(row, 0);
        if entity.is_empty() {
            warn!(row = offset + 1, "adjustment row without entity skipped");
            continue;
        }

        let mut cells: Vec<CellValue> = row.iter().take(width).cloned().collect();
        cells.resize(width, CellValue::Empty);
        rows.push(AdjustmentRow { entity, cells });
    }

    debug!(rows = rows.len(), columns = width, "adjustment table loaded");
    Ok(AdjustmentTable {
        columns,
        group_index,
        rows,
    })
}

/// Reads the cached retained-earnings and balance-check values of an entity
/// workbook without modifying it.
pub fn read_check_values(path: &Path, layout: &Layout) -> Result<CheckValues> {
    let retained_cell = layout.retained_earnings_cell()?;
    let balance_cell = layout.balance_check_cell()?;
    let sheet = &layout.entity_workbook.check_sheet;

    let mut workbook: Xlsx<_> = open_workbook(path)?;
    let range = read_required_sheet(&mut workbook, path, sheet)?;

    Ok(CheckValues {
        retained_earnings: value_at(&range, retained_cell),
        balance_check: value_at(&range, balance_cell),
    })
}

/// Reads every sheet cell of the first worksheet into an absolute grid.
pub fn read_first_sheet(path: &Path) -> Result<Grid> {
    if !path.exists() {
        return Err(ToolError::MissingInput(path.to_path_buf()));
    }
    let mut workbook: Xlsx<_> = open_workbook(path)?;
    let first = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| ToolError::InvalidWorkbook(format!("{} has no sheets", path.display())))?;
    let range = read_required_sheet(&mut workbook, path, &first)?;
    Ok(range_to_grid(&range))
}

fn read_required_sheet<R: std::io::Read + std::io::Seek>(
    workbook: &mut Xlsx<R>,
    path: &Path,
    name: &str,
) -> Result<calamine::Range<DataType>> {
    let range_result = workbook
        .worksheet_range(name)
        .ok_or_else(|| ToolError::MissingSheet {
            path: path.to_path_buf(),
            sheet: name.to_string(),
        })?;
    let range = range_result.map_err(ToolError::from)?;
    Ok(range)
}

fn range_to_grid(range: &calamine::Range<DataType>) -> Grid {
    let Some((last_row, last_col)) = range.end() else {
        return Vec::new();
    };

    (0..=last_row)
        .map(|row| {
            (0..=last_col)
                .map(|col| to_cell_value(range.get_value((row, col))))
                .collect()
        })
        .collect()
}

fn value_at(range: &calamine::Range<DataType>, position: CellPosition) -> CellValue {
    to_cell_value(range.get_value(position.zero_based()))
}

fn header_row(grid: &Grid, header_row: u32) -> Vec<CellValue> {
    grid.get(header_row.saturating_sub(1) as usize)
        .cloned()
        .unwrap_or_default()
}

fn find_column<T: ToString>(header: &[T], name: &str, table: &str) -> Result<usize> {
    header
        .iter()
        .position(|cell| cell.to_string().trim() == name)
        .ok_or_else(|| ToolError::MissingColumn {
            table: table.to_string(),
            column: name.to_string(),
        })
}

fn cell_text(row: &[CellValue], idx: usize) -> String {
    row.get(idx)
        .map(|cell| cell.to_string().trim().to_string())
        .unwrap_or_default()
}

fn to_cell_value(cell: Option<&DataType>) -> CellValue {
    match cell {
        Some(DataType::String(value)) => CellValue::Text(value.clone()),
        Some(DataType::Float(value)) => CellValue::Number(*value),
        Some(DataType::Int(value)) => CellValue::Number(*value as f64),
        Some(DataType::Bool(value)) => CellValue::Boolean(*value),
        Some(DataType::DateTime(value)) => CellValue::Date(*value),
        Some(DataType::Empty) | None => CellValue::Empty,
        Some(other) => CellValue::Text(other.to_string()),
    }
}
