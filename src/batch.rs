//! The batch run: patch every entity named in the adjustment table, write the
//! summary workbook, then refresh consolidation workbooks tier by tier.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;
use std::thread::{self, JoinHandle};

use chrono::{DateTime, Local};
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, ToolError};
use crate::events::{CancellationFlag, Event, EventSender};
use crate::group::build_insert_block;
use crate::io::excel_read::{read_adjustments, read_path_table};
use crate::io::excel_write::write_summary;
use crate::layout::{Layout, OutputLayout};
use crate::model::{
    AdjustmentRow, AdjustmentTable, EntityResult, MergeTier, PathTable, RunSummary,
};
use crate::patch::{force_recalculation, patch_entity};

/// The three inputs a caller supplies for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchRequest {
    /// Folder that relative workbook paths, the run log and the summary live in.
    pub folder: PathBuf,
    pub path_table: PathBuf,
    pub adjustments: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Running,
    Completed,
    Cancelled,
    GlobalFailed,
}

/// Final state of a run.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed(RunSummary),
    /// Stopped during the entity loop; no summary or recalculation happened.
    Cancelled {
        success_count: usize,
        failure_count: usize,
        results: Vec<EntityResult>,
    },
    GlobalFailed(String),
}

impl RunOutcome {
    pub fn phase(&self) -> RunPhase {
        match self {
            RunOutcome::Completed(_) => RunPhase::Completed,
            RunOutcome::Cancelled { .. } => RunPhase::Cancelled,
            RunOutcome::GlobalFailed(_) => RunPhase::GlobalFailed,
        }
    }
}

struct RunState {
    success_count: usize,
    failure_count: usize,
    results: Vec<EntityResult>,
    total_tasks: usize,
    completed_tasks: usize,
}

impl RunState {
    fn new(entity_count: usize) -> Self {
        Self {
            success_count: 0,
            failure_count: 0,
            results: Vec::new(),
            total_tasks: entity_count + MergeTier::ALL.len(),
            completed_tasks: 0,
        }
    }

    fn advance(&mut self, events: &EventSender) {
        self.completed_tasks += 1;
        events.send(Event::Progress {
            completed: self.completed_tasks,
            total: self.total_tasks,
        });
    }

    fn into_cancelled(self) -> RunOutcome {
        RunOutcome::Cancelled {
            success_count: self.success_count,
            failure_count: self.failure_count,
            results: self.results,
        }
    }
}

/// Plain-text log of entity failures kept next to the workbooks. It is
/// recreated at the start of every run.
#[derive(Debug)]
pub struct RunLog {
    path: PathBuf,
    failure_note: String,
}

impl RunLog {
    pub fn create(path: &Path, output: &OutputLayout) -> Result<Self> {
        fs::write(path, format!("{}\n", output.run_log_header))?;
        Ok(Self {
            path: path.to_path_buf(),
            failure_note: output.run_log_failure_note.clone(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record_failure(&self, entity: &str, error: &ToolError) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{entity} {} {error}", self.failure_note)?;
        Ok(())
    }
}

/// Result of the consolidation refresh phase.
struct RecalculationReport {
    failures: usize,
    interrupted: bool,
}

/// Drives one run. The processor is single use: `run` consumes the phase
/// machine from `Idle` to a terminal phase.
pub struct BatchProcessor {
    request: BatchRequest,
    layout: Layout,
    events: EventSender,
    cancel: CancellationFlag,
    phase: RunPhase,
}

impl BatchProcessor {
    pub fn new(
        request: BatchRequest,
        layout: Layout,
        events: EventSender,
        cancel: CancellationFlag,
    ) -> Self {
        Self {
            request,
            layout,
            events,
            cancel,
            phase: RunPhase::Idle,
        }
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Runs the batch on a dedicated worker thread.
    pub fn spawn(request: BatchRequest, layout: Layout) -> Result<BatchHandle> {
        let (events, receiver) = EventSender::channel();
        let cancel = CancellationFlag::new();
        let mut processor = BatchProcessor::new(request, layout, events, cancel.clone());

        let worker = thread::Builder::new()
            .name("adjustment-batch".to_string())
            .spawn(move || processor.run())?;

        Ok(BatchHandle {
            events: receiver,
            cancel,
            worker,
        })
    }

    /// Executes the run to a terminal phase. Global failures are reported on
    /// the event channel as well as returned.
    #[instrument(
        level = "info",
        skip_all,
        fields(folder = %self.request.folder.display())
    )]
    pub fn run(&mut self) -> RunOutcome {
        self.phase = RunPhase::Running;
        let outcome = match self.execute() {
            Ok(outcome) => outcome,
            Err(error) => {
                let message = error.to_string();
                self.events.error(format!("global error: {message}"));
                self.events.send(Event::GlobalError(message.clone()));
                RunOutcome::GlobalFailed(message)
            }
        };
        self.phase = outcome.phase();
        outcome
    }

    fn execute(&mut self) -> Result<RunOutcome> {
        let path_table = read_path_table(&self.request.path_table, &self.layout.path_table)?;
        let adjustments = read_adjustments(&self.request.adjustments, &self.layout.adjustments)?;
        let entities = adjustments.entities();
        info!(entities = entities.len(), "inputs loaded");

        let mut state = RunState::new(entities.len());
        let run_log = RunLog::create(
            &self.request.folder.join(&self.layout.output.run_log_file),
            &self.layout.output,
        )?;

        for entity in &entities {
            if self.cancel.is_cancelled() {
                self.events.warning("processing cancelled");
                return Ok(state.into_cancelled());
            }

            self.events.info(format!("processing {entity}..."));
            match self.process_entity(entity, &path_table, &adjustments) {
                Ok(result) => {
                    state.results.push(result);
                    state.success_count += 1;
                    self.events.success(format!("{entity} done"));
                }
                Err(error) => {
                    state.failure_count += 1;
                    self.events.error(format!("{entity} failed: {error}"));
                    self.log_failure(&run_log, entity, &error);
                }
            }
            state.advance(&self.events);
        }

        let summary_path = self
            .request
            .folder
            .join(summary_file_name(&self.layout.output, Local::now()));
        write_summary(&summary_path, &self.layout, &state.results)?;
        debug!(path = %summary_path.display(), "summary written");

        let report = self.recalculate_tiers(&path_table, &mut state);

        self.events.success("all operations completed");
        self.events.send(Event::Completed {
            success_count: state.success_count,
            failure_count: state.failure_count,
            summary_path: summary_path.clone(),
        });

        Ok(RunOutcome::Completed(RunSummary {
            success_count: state.success_count,
            failure_count: state.failure_count,
            results: state.results,
            summary_path,
            recalculation_failures: report.failures,
            recalculation_interrupted: report.interrupted,
        }))
    }

    /// A run log that can no longer be written never stops the batch.
    fn log_failure(&self, run_log: &RunLog, entity: &str, error: &ToolError) {
        if let Err(log_error) = run_log.record_failure(entity, error) {
            warn!(
                path = %run_log.path().display(),
                error = %log_error,
                "run log not updated"
            );
            self.events.warning(format!(
                "{} not updated for {entity}: {log_error}",
                run_log.path().display()
            ));
        }
    }

    fn process_entity(
        &self,
        entity: &str,
        path_table: &PathTable,
        adjustments: &AdjustmentTable,
    ) -> Result<EntityResult> {
        let record = path_table
            .lookup(entity)
            .ok_or_else(|| ToolError::UnknownEntity(entity.to_string()))?;
        if record.relative_path.is_empty() {
            return Err(ToolError::MissingPath(entity.to_string()));
        }
        let workbook_path = self.request.folder.join(&record.relative_path);

        let rows: Vec<&AdjustmentRow> = adjustments.rows_for(entity).collect();
        let block = build_insert_block(&adjustments.columns, &rows, adjustments.group_index);
        debug!(entity, rows = block.row_count(), "insert block built");

        patch_entity(entity, &workbook_path, &block, &self.layout)
    }

    fn recalculate_tiers(
        &self,
        path_table: &PathTable,
        state: &mut RunState,
    ) -> RecalculationReport {
        let mut report = RecalculationReport {
            failures: 0,
            interrupted: false,
        };
        self.events.info("refreshing consolidation workbooks...");

        for tier in MergeTier::ALL {
            let label = self.layout.path_table.label_for_tier(tier);
            for relative_path in path_table.tier_paths(tier) {
                if self.cancel.is_cancelled() {
                    self.events.warning("processing cancelled");
                    report.interrupted = true;
                    return report;
                }

                match force_recalculation(&self.request.folder.join(relative_path)) {
                    Ok(()) => self
                        .events
                        .success(format!("{label} {relative_path} refreshed")),
                    Err(error) => {
                        report.failures += 1;
                        self.events
                            .error(format!("{label} {relative_path} refresh failed: {error}"));
                    }
                }
            }
            state.advance(&self.events);
        }

        report
    }
}

/// Caller side of a spawned run.
pub struct BatchHandle {
    pub events: Receiver<Event>,
    cancel: CancellationFlag,
    worker: JoinHandle<RunOutcome>,
}

impl BatchHandle {
    /// Asks the worker to stop at its next safe point.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_flag(&self) -> CancellationFlag {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    pub fn join(self) -> RunOutcome {
        self.worker
            .join()
            .unwrap_or_else(|_| RunOutcome::GlobalFailed("batch worker panicked".to_string()))
    }
}

/// `<prefix>_<YYYY-MM-DD_HH-MM-SS>.xlsx`
pub fn summary_file_name(output: &OutputLayout, timestamp: DateTime<Local>) -> String {
    format!(
        "{}_{}.xlsx",
        output.summary_prefix,
        timestamp.format("%Y-%m-%d_%H-%M-%S")
    )
}
