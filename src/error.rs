use std::path::PathBuf;

use thiserror::Error;

/// Convenient alias for fallible results returned throughout the crate.
pub type Result<T> = std::result::Result<T, ToolError>;

/// Error type covering the different failure cases that can occur while the
/// tool loads its input tables, patches entity workbooks, or writes outputs.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Wrapper for IO failures such as reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Raised when a layout file cannot be parsed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Errors bubbled up from the Excel writer implementation.
    #[error("Excel write error: {0}")]
    ExcelWrite(#[from] rust_xlsxwriter::XlsxError),

    /// Errors bubbled up from the Excel reader implementation.
    #[error("Excel read error: {0}")]
    ExcelRead(#[from] calamine::XlsxError),

    /// Raised when an entity workbook cannot be opened or saved for editing.
    #[error("workbook error in {path}: {message}")]
    Workbook { path: PathBuf, message: String },

    /// Raised when a workbook lacks a sheet the layout relies on.
    #[error("sheet '{sheet}' not found in {path}")]
    MissingSheet { path: PathBuf, sheet: String },

    /// Raised when an input table lacks a required header.
    #[error("column '{column}' not found in {table}")]
    MissingColumn { table: String, column: String },

    /// Raised when a sheet does not follow the expected conventions.
    #[error("invalid workbook structure: {0}")]
    InvalidWorkbook(String),

    /// Raised when a layout names a cell that is not an A1-style reference.
    #[error("invalid cell reference '{0}'")]
    InvalidCellReference(String),

    /// Raised when an entity has no row in the path table.
    #[error("entity '{0}' has no entry in the path table")]
    UnknownEntity(String),

    /// Raised when an entity's path table row has an empty relative path.
    #[error("entity '{0}' has an empty relative path")]
    MissingPath(String),

    /// Raised by the CLI when a batch run ends in a global failure.
    #[error("run aborted: {0}")]
    RunAborted(String),

    /// Raised when the user provides a path that does not exist.
    #[error("input file not found: {0}")]
    MissingInput(PathBuf),

    /// Raised when the tracing subscriber fails to initialise.
    #[error("failed to initialise logging: {0}")]
    Logging(String),
}
