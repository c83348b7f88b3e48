//! Workbook conventions shared by the readers, the patch engine and the
//! orchestrator.
//!
//! The defaults describe the consolidation package layout the tool was built
//! for. A JSON file can override any subset of the fields.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;
use umya_spreadsheet::helper::coordinate::index_from_coordinate;

use crate::error::{Result, ToolError};
use crate::model::MergeTier;

/// A one-based cell position parsed from an A1-style reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellPosition {
    pub column: u32,
    pub row: u32,
}

impl CellPosition {
    /// Parses references such as `H45` or `$A$3`.
    pub fn parse(reference: &str) -> Result<Self> {
        let (column, row, _, _) = index_from_coordinate(reference.trim());
        match (column, row) {
            (Some(column), Some(row)) if column > 0 && row > 0 => Ok(Self { column, row }),
            _ => Err(ToolError::InvalidCellReference(reference.to_string())),
        }
    }

    /// Zero-based `(row, column)` pair as used by calamine ranges.
    pub fn zero_based(&self) -> (u32, u32) {
        (self.row - 1, self.column - 1)
    }
}

/// Column conventions of the path table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathTableLayout {
    /// One-based row holding the column headers.
    pub header_row: u32,
    pub entity_column: String,
    pub tier_column: String,
    pub path_column: String,
    /// Labels for tier 1, tier 2 and tier 3, in that order.
    pub tier_labels: [String; 3],
}

impl Default for PathTableLayout {
    fn default() -> Self {
        Self {
            header_row: 3,
            entity_column: "账套名称".to_string(),
            tier_column: "类型".to_string(),
            path_column: "相对路径".to_string(),
            tier_labels: [
                "小合并".to_string(),
                "中合并".to_string(),
                "大合并".to_string(),
            ],
        }
    }
}

impl PathTableLayout {
    /// Maps a tier label to its tier; anything else is unclassified.
    pub fn tier_for_label(&self, label: &str) -> Option<MergeTier> {
        let label = label.trim();
        MergeTier::ALL
            .into_iter()
            .zip(self.tier_labels.iter())
            .find(|(_, candidate)| candidate.as_str() == label)
            .map(|(tier, _)| tier)
    }

    pub fn label_for_tier(&self, tier: MergeTier) -> &str {
        &self.tier_labels[tier.index()]
    }
}

/// Column conventions of the adjustment entries table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdjustmentTableLayout {
    pub header_row: u32,
    /// Must be the first column of the table.
    pub entity_column: String,
    pub group_column: String,
}

impl Default for AdjustmentTableLayout {
    fn default() -> Self {
        Self {
            header_row: 1,
            entity_column: "账套名称".to_string(),
            group_column: "编号".to_string(),
        }
    }
}

/// Where check values live and where adjustment entries are written inside
/// each entity workbook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityWorkbookLayout {
    pub check_sheet: String,
    pub retained_earnings_cell: String,
    pub balance_check_cell: String,
    pub entries_sheet: String,
    /// First row of the region cleared before writing.
    pub clear_from_row: u32,
    /// Row where the first entry is written and where blank rows are inserted.
    pub write_from_row: u32,
    /// Added to `entries - last_row` when sizing the blank-row insertion.
    pub insert_headroom: u32,
}

impl Default for EntityWorkbookLayout {
    fn default() -> Self {
        Self {
            check_sheet: "资产负债表".to_string(),
            retained_earnings_cell: "H45".to_string(),
            balance_check_cell: "A3".to_string(),
            entries_sheet: "调整分录".to_string(),
            clear_from_row: 6,
            write_from_row: 7,
            insert_headroom: 4,
        }
    }
}

/// Names of the files produced by a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputLayout {
    pub run_log_file: String,
    /// First line of a fresh run log.
    pub run_log_header: String,
    /// Placed between the entity and the error on each failure line.
    pub run_log_failure_note: String,
    pub summary_prefix: String,
    pub summary_sheet: String,
    pub summary_headers: [String; 5],
}

impl Default for OutputLayout {
    fn default() -> Self {
        Self {
            run_log_file: "日志.txt".to_string(),
            run_log_header: "处理日志:".to_string(),
            run_log_failure_note: "调整分录录入有误，Check:".to_string(),
            summary_prefix: "录入结果".to_string(),
            summary_sheet: "汇总数据".to_string(),
            summary_headers: [
                "账套名称".to_string(),
                "调整前未分配利润".to_string(),
                "调整前资产负债表平否".to_string(),
                "调整后未分配利润".to_string(),
                "调整后资产负债表平否".to_string(),
            ],
        }
    }
}

/// Full set of workbook conventions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Layout {
    pub path_table: PathTableLayout,
    pub adjustments: AdjustmentTableLayout,
    pub entity_workbook: EntityWorkbookLayout,
    pub output: OutputLayout,
}

impl Layout {
    /// Loads a layout from a JSON file; omitted fields keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ToolError::MissingInput(path.to_path_buf()));
        }
        let source = fs::read_to_string(path)?;
        let layout: Layout = serde_json::from_str(&source)?;
        layout.validate()?;
        debug!(path = %path.display(), "loaded layout overrides");
        Ok(layout)
    }

    /// Checks that cell references parse and row numbers are one-based.
    pub fn validate(&self) -> Result<()> {
        self.retained_earnings_cell()?;
        self.balance_check_cell()?;

        let workbook = &self.entity_workbook;
        if workbook.clear_from_row == 0 || workbook.write_from_row == 0 {
            return Err(ToolError::InvalidWorkbook(
                "entry rows are one-based and must be at least 1".into(),
            ));
        }
        if self.path_table.header_row == 0 || self.adjustments.header_row == 0 {
            return Err(ToolError::InvalidWorkbook(
                "header rows are one-based and must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn retained_earnings_cell(&self) -> Result<CellPosition> {
        CellPosition::parse(&self.entity_workbook.retained_earnings_cell)
    }

    pub fn balance_check_cell(&self) -> Result<CellPosition> {
        CellPosition::parse(&self.entity_workbook.balance_check_cell)
    }
}
