//! Core library for the adjustment-automator command line application.
//!
//! The library drives the batch entry of adjustment entries into per-entity
//! trial-balance workbooks. IO adapters live under [`io`], data
//! representations inside [`model`], the grouping of entries in [`group`],
//! in-place workbook edits in [`patch`], and the run orchestration under
//! [`batch`], which reports to its caller through [`events`].

pub mod batch;
pub mod error;
pub mod events;
pub mod group;
pub mod io;
pub mod layout;
pub mod model;
pub mod patch;
pub mod scaffold;

pub use error::{Result, ToolError};
