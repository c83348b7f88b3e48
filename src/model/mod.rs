use std::cmp::Ordering;
use std::fmt;
use std::path::PathBuf;

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};

/// Identifier of a legal-entity workbook, as written in the input tables.
pub type EntityId = String;

/// A single spreadsheet cell value as read from or written to a workbook.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum CellValue {
    Text(String),
    Number(f64),
    /// Excel serial date, days since 1899-12-30 with the time as a fraction.
    Date(f64),
    Boolean(bool),
    #[default]
    Empty,
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(text) => text.is_empty(),
            _ => false,
        }
    }

    /// Ordering used when clustering rows by a grouping key: numbers, then
    /// dates, then booleans, then text, with empty keys last.
    pub fn key_cmp(&self, other: &Self) -> Ordering {
        fn rank(value: &CellValue) -> u8 {
            match value {
                _ if value.is_empty() => 4,
                CellValue::Number(_) => 0,
                CellValue::Date(_) => 1,
                CellValue::Boolean(_) => 2,
                CellValue::Text(_) => 3,
                CellValue::Empty => 4,
            }
        }

        if self.is_empty() || other.is_empty() {
            return rank(self).cmp(&rank(other));
        }

        match (self, other) {
            (CellValue::Number(lhs), CellValue::Number(rhs))
            | (CellValue::Date(lhs), CellValue::Date(rhs)) => lhs.total_cmp(rhs),
            (CellValue::Boolean(lhs), CellValue::Boolean(rhs)) => lhs.cmp(rhs),
            (CellValue::Text(lhs), CellValue::Text(rhs)) => lhs.cmp(rhs),
            _ => rank(self).cmp(&rank(other)),
        }
    }

    /// Whether two values fall into the same group.
    pub fn same_key(&self, other: &Self) -> bool {
        self.key_cmp(other) == Ordering::Equal
    }

    /// Number format applied when a date is written back to a workbook.
    pub fn date_format_code(serial: f64) -> &'static str {
        if serial.fract() == 0.0 {
            DATE_FORMAT
        } else {
            DATE_TIME_FORMAT
        }
    }
}

pub const DATE_FORMAT: &str = "yyyy-mm-dd";
pub const DATE_TIME_FORMAT: &str = "yyyy-mm-dd hh:mm:ss";

fn excel_serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let offset = TimeDelta::try_milliseconds((serial * 86_400_000.0).round() as i64)?;
    epoch.checked_add_signed(offset)
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Text(text) => f.write_str(text),
            CellValue::Number(number) => write!(f, "{number}"),
            CellValue::Date(serial) => match excel_serial_to_datetime(*serial) {
                Some(value) if serial.fract() == 0.0 => write!(f, "{}", value.format("%Y-%m-%d")),
                Some(value) => write!(f, "{}", value.format("%Y-%m-%d %H:%M:%S")),
                None => write!(f, "{serial}"),
            },
            CellValue::Boolean(flag) => write!(f, "{flag}"),
            CellValue::Empty => Ok(()),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

/// One adjustment-entry line. `cells` covers every column of the source table,
/// including the entity column at index 0.
#[derive(Debug, Clone, PartialEq)]
pub struct AdjustmentRow {
    pub entity: EntityId,
    pub cells: Vec<CellValue>,
}

/// The adjustment entries table as loaded from disk.
#[derive(Debug, Clone, PartialEq)]
pub struct AdjustmentTable {
    pub columns: Vec<String>,
    /// Index of the grouping ("entry number") column within `columns`.
    pub group_index: usize,
    pub rows: Vec<AdjustmentRow>,
}

impl AdjustmentTable {
    /// Sorted, de-duplicated entity identifiers present in the table.
    pub fn entities(&self) -> Vec<EntityId> {
        let mut entities: Vec<EntityId> = self.rows.iter().map(|row| row.entity.clone()).collect();
        entities.sort();
        entities.dedup();
        entities
    }

    /// Rows owned by `entity`, in source order.
    pub fn rows_for<'a>(&'a self, entity: &'a str) -> impl Iterator<Item = &'a AdjustmentRow> + 'a {
        self.rows.iter().filter(move |row| row.entity == entity)
    }
}

/// Consolidation level a workbook may belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MergeTier {
    Small,
    Medium,
    Large,
}

impl MergeTier {
    /// Recalculation order.
    pub const ALL: [MergeTier; 3] = [MergeTier::Small, MergeTier::Medium, MergeTier::Large];

    pub fn index(self) -> usize {
        match self {
            MergeTier::Small => 0,
            MergeTier::Medium => 1,
            MergeTier::Large => 2,
        }
    }
}

/// One row of the path table.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityPathRecord {
    pub entity: EntityId,
    pub tier: Option<MergeTier>,
    pub relative_path: String,
}

/// Entity → workbook lookup loaded from the path table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PathTable {
    pub records: Vec<EntityPathRecord>,
}

impl PathTable {
    /// First record for `entity`; later duplicates are never consulted.
    pub fn lookup(&self, entity: &str) -> Option<&EntityPathRecord> {
        self.records.iter().find(|record| record.entity == entity)
    }

    /// Non-empty relative paths tagged with `tier`, in table order.
    pub fn tier_paths(&self, tier: MergeTier) -> impl Iterator<Item = &str> {
        self.records
            .iter()
            .filter(move |record| record.tier == Some(tier) && !record.relative_path.is_empty())
            .map(|record| record.relative_path.as_str())
    }
}

/// Grouped, blank-separated rows ready to be written into an entity workbook.
/// The entity column is not part of the block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InsertBlock {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl InsertBlock {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }
}

/// The two balance-sheet figures captured around a patch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckValues {
    pub retained_earnings: CellValue,
    pub balance_check: CellValue,
}

/// One row of the run summary.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityResult {
    pub entity: EntityId,
    pub before: CheckValues,
    pub after: CheckValues,
}

impl EntityResult {
    /// Values in summary column order.
    pub fn to_row(&self) -> Vec<CellValue> {
        vec![
            CellValue::Text(self.entity.clone()),
            self.before.retained_earnings.clone(),
            self.before.balance_check.clone(),
            self.after.retained_earnings.clone(),
            self.after.balance_check.clone(),
        ]
    }
}

/// Aggregate outcome of a completed run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub success_count: usize,
    pub failure_count: usize,
    pub results: Vec<EntityResult>,
    pub summary_path: PathBuf,
    pub recalculation_failures: usize,
    /// Set when a stop request arrived during the recalculation phase.
    pub recalculation_interrupted: bool,
}
