//! Starter files for a new working folder.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, instrument};

use crate::error::{Result, ToolError};
use crate::io::excel_write::{write_adjustment_template, write_path_table_template};
use crate::layout::Layout;

/// Folder holding the two input workbooks.
pub const CONFIG_DIR: &str = "配置文件";
/// Folder the entity workbooks are expected to live under.
pub const WORKBOOK_DIR: &str = "TB文件";
pub const ADJUSTMENTS_FILE: &str = "调整分录.xlsx";
pub const PATH_TABLE_FILE: &str = "路径表.xlsx";

#[derive(Debug, Clone, PartialEq)]
pub enum ScaffoldOutcome {
    Created {
        adjustments: PathBuf,
        path_table: PathBuf,
    },
    /// The configuration folder was already there; nothing was written.
    AlreadyExists(PathBuf),
}

/// Creates the configuration and workbook folders plus the two template
/// workbooks inside `folder`.
#[instrument(level = "info", skip(layout), fields(folder = %folder.display()))]
pub fn scaffold(folder: &Path, layout: &Layout) -> Result<ScaffoldOutcome> {
    if !folder.is_dir() {
        return Err(ToolError::MissingInput(folder.to_path_buf()));
    }

    let config_dir = folder.join(CONFIG_DIR);
    if config_dir.exists() {
        return Ok(ScaffoldOutcome::AlreadyExists(config_dir));
    }

    fs::create_dir_all(&config_dir)?;
    fs::create_dir_all(folder.join(WORKBOOK_DIR))?;

    let adjustments = config_dir.join(ADJUSTMENTS_FILE);
    write_adjustment_template(&adjustments, layout)?;

    let path_table = config_dir.join(PATH_TABLE_FILE);
    write_path_table_template(&path_table, layout)?;

    info!("configuration templates written");
    Ok(ScaffoldOutcome::Created {
        adjustments,
        path_table,
    })
}
