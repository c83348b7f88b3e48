use std::io::BufRead;
use std::path::PathBuf;
use std::sync::mpsc::RecvTimeoutError;
use std::thread;
use std::time::Duration;

use adjustment_automator::batch::{BatchProcessor, BatchRequest, RunOutcome};
use adjustment_automator::events::{CancellationFlag, Event, Severity};
use adjustment_automator::layout::Layout;
use adjustment_automator::scaffold::{self, ScaffoldOutcome};
use adjustment_automator::{Result, ToolError};
use clap::{Parser, Subcommand};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

fn main() {
    let cli = Cli::parse();
    if let Err(error) = init_logging().and_then(|()| run(cli)) {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

fn init_logging() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|error| ToolError::Logging(error.to_string()))
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Run(args) => execute_run(args),
        Command::Init(args) => execute_init(args),
    }
}

fn execute_run(args: RunArgs) -> Result<()> {
    for input in [&args.folder, &args.path_table, &args.adjustments] {
        if !input.exists() {
            return Err(ToolError::MissingInput(input.clone()));
        }
    }
    let layout = load_layout(args.layout.as_ref())?;
    let run_log = args.folder.join(&layout.output.run_log_file);

    let request = BatchRequest {
        folder: args.folder,
        path_table: args.path_table,
        adjustments: args.adjustments,
    };
    let handle = BatchProcessor::spawn(request, layout)?;
    watch_stdin(handle.cancellation_flag());
    info!("type 'stop' and press enter to cancel after the current workbook");

    loop {
        match handle.events.recv_timeout(POLL_INTERVAL) {
            Ok(event) => render(event),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    match handle.join() {
        RunOutcome::Completed(summary) => {
            println!("processed successfully: {}", summary.success_count);
            println!("failed: {}", summary.failure_count);
            println!("summary workbook: {}", summary.summary_path.display());
            println!("run log: {}", run_log.display());
            Ok(())
        }
        RunOutcome::Cancelled {
            success_count,
            failure_count,
            ..
        } => {
            println!("cancelled after {success_count} succeeded and {failure_count} failed");
            Ok(())
        }
        RunOutcome::GlobalFailed(message) => Err(ToolError::RunAborted(message)),
    }
}

fn execute_init(args: InitArgs) -> Result<()> {
    let layout = load_layout(args.layout.as_ref())?;
    match scaffold::scaffold(&args.folder, &layout)? {
        ScaffoldOutcome::Created {
            adjustments,
            path_table,
        } => {
            println!("created {}", adjustments.display());
            println!("created {}", path_table.display());
        }
        ScaffoldOutcome::AlreadyExists(config_dir) => {
            println!(
                "{} already exists, nothing to generate",
                config_dir.display()
            );
        }
    }
    Ok(())
}

fn load_layout(path: Option<&PathBuf>) -> Result<Layout> {
    match path {
        Some(path) => Layout::from_json_file(path),
        None => Ok(Layout::default()),
    }
}

fn render(event: Event) {
    match event {
        Event::Log { message, severity } => match severity {
            Severity::Info => info!("{message}"),
            Severity::Success => info!(status = "ok", "{message}"),
            Severity::Warning => warn!("{message}"),
            Severity::Error => error!("{message}"),
        },
        Event::Progress { completed, total } => debug!(completed, total, "progress"),
        Event::Completed {
            success_count,
            failure_count,
            summary_path,
        } => info!(
            success_count,
            failure_count,
            summary = %summary_path.display(),
            "run completed"
        ),
        Event::GlobalError(message) => error!("run aborted: {message}"),
    }
}

/// Treats a `stop` or `q` line on stdin as a stop request.
fn watch_stdin(cancel: CancellationFlag) {
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if matches!(line.trim(), "stop" | "q") {
                cancel.cancel();
                break;
            }
        }
    });
}

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Write adjustment entries into entity trial-balance workbooks."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply the adjustment entries to every listed entity workbook.
    Run(RunArgs),
    /// Create the configuration folder and starter workbooks.
    Init(InitArgs),
}

#[derive(clap::Args)]
struct RunArgs {
    /// Working folder that relative workbook paths are resolved against.
    #[arg(long)]
    folder: PathBuf,

    /// Path table workbook mapping entities to workbook paths and merge tiers.
    #[arg(long)]
    path_table: PathBuf,

    /// Adjustment entries workbook.
    #[arg(long)]
    adjustments: PathBuf,

    /// Optional JSON file overriding workbook conventions.
    #[arg(long)]
    layout: Option<PathBuf>,
}

#[derive(clap::Args)]
struct InitArgs {
    /// Working folder to scaffold.
    #[arg(long)]
    folder: PathBuf,

    /// Optional JSON file overriding workbook conventions.
    #[arg(long)]
    layout: Option<PathBuf>,
}
