//! Messages flowing from the batch worker to its caller, and the stop signal
//! flowing the other way.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, Sender, channel};

/// How a log line should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Success => write!(f, "success"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// Events delivered to the caller in the order they were produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Log {
        message: String,
        severity: Severity,
    },
    Progress {
        completed: usize,
        total: usize,
    },
    Completed {
        success_count: usize,
        failure_count: usize,
        summary_path: PathBuf,
    },
    GlobalError(String),
}

/// Sending half of the event channel. A dropped receiver is not an error for
/// the worker.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: Sender<Event>,
}

impl EventSender {
    pub fn new(tx: Sender<Event>) -> Self {
        Self { tx }
    }

    /// Creates a connected sender/receiver pair.
    pub fn channel() -> (Self, Receiver<Event>) {
        let (tx, rx) = channel();
        (Self::new(tx), rx)
    }

    pub fn log(&self, severity: Severity, message: impl Into<String>) {
        self.send(Event::Log {
            message: message.into(),
            severity,
        });
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(Severity::Info, message);
    }

    pub fn success(&self, message: impl Into<String>) {
        self.log(Severity::Success, message);
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.log(Severity::Warning, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(Severity::Error, message);
    }

    pub fn send(&self, event: Event) {
        let _ = self.tx.send(event);
    }
}

/// Cooperative stop signal shared between the caller and the worker. The
/// worker only reads it between units of work.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
