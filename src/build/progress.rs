//! Task progress reporting.
//!
//! Provides a progress reporting system for task runs. Supports console
//! output (with colors) and JSON lines for machine consumption.
//!
//! # Example
//!
//! ```ignore
//! use assetflow::build::progress::{ProgressReporter, ConsoleProgress, ProgressEvent};
//!
//! let reporter = ConsoleProgress::new();
//! reporter.report(ProgressEvent::TaskStarted { task: TaskId::Styles });
//! reporter.report(ProgressEvent::TaskCompleted {
//!     task: TaskId::Styles,
//!     status: TaskStatus::Success,
//!     duration_ms: 150,
//! });
//! ```

use crate::build::result::TaskStatus;
use crate::tasks::TaskId;
use std::io::Write;
use std::sync::Mutex;

/// Events that can be reported during a run.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// A top-level task was requested
    RunStarted {
        /// Requested task
        task: TaskId,
    },
    /// A task started
    TaskStarted { task: TaskId },
    /// A task finished
    TaskCompleted {
        task: TaskId,
        status: TaskStatus,
        duration_ms: u64,
    },
    /// Completion notice from a task ("Styles task complete.")
    Notice { task: TaskId, message: String },
    /// The requested task and everything it depends on finished
    RunCompleted {
        success: bool,
        duration_ms: u64,
        succeeded: usize,
        skipped: usize,
        failed: usize,
    },
    /// A warning was generated
    Warning { task: Option<TaskId>, message: String },
    /// An error occurred
    Error { task: Option<TaskId>, message: String },
}

/// Trait for progress reporters.
pub trait ProgressReporter: Send + Sync {
    /// Report a progress event.
    fn report(&self, event: ProgressEvent);

    /// Check if this reporter wants verbose output.
    fn is_verbose(&self) -> bool {
        false
    }
}

/// A progress reporter that discards all events.
#[derive(Debug, Default)]
pub struct NullProgress;

impl NullProgress {
    /// Create a new null progress reporter.
    pub fn new() -> Self {
        Self
    }
}

impl ProgressReporter for NullProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Console progress reporter with optional colors.
pub struct ConsoleProgress {
    /// Whether to use colors
    use_colors: bool,
    /// Whether to show verbose output
    verbose: bool,
    /// Output writer (for testing)
    output: Mutex<Box<dyn Write + Send>>,
}

impl std::fmt::Debug for ConsoleProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleProgress")
            .field("use_colors", &self.use_colors)
            .field("verbose", &self.verbose)
            .finish()
    }
}

impl ConsoleProgress {
    /// Create a new console progress reporter writing to stderr.
    pub fn new() -> Self {
        Self { use_colors: true, verbose: false, output: Mutex::new(Box::new(std::io::stderr())) }
    }

    /// Create a console progress reporter that writes to a custom output.
    pub fn with_output<W: Write + Send + 'static>(output: W) -> Self {
        Self { use_colors: false, verbose: false, output: Mutex::new(Box::new(output)) }
    }

    /// Set whether to use colors.
    pub fn with_colors(mut self, use_colors: bool) -> Self {
        self.use_colors = use_colors;
        self
    }

    /// Set verbose mode.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    fn color(&self, text: &str, color: &str) -> String {
        if self.use_colors {
            format!("{}{}\x1b[0m", color, text)
        } else {
            text.to_string()
        }
    }

    fn green(&self, text: &str) -> String {
        self.color(text, "\x1b[32m")
    }

    fn yellow(&self, text: &str) -> String {
        self.color(text, "\x1b[33m")
    }

    fn red(&self, text: &str) -> String {
        self.color(text, "\x1b[31m")
    }

    fn cyan(&self, text: &str) -> String {
        self.color(text, "\x1b[36m")
    }

    fn writeln(&self, line: &str) {
        if let Ok(mut output) = self.output.lock() {
            let _ = writeln!(output, "{}", line);
        }
    }
}

impl Default for ConsoleProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for ConsoleProgress {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::RunStarted { task } => {
                self.writeln(&format!("{} Running '{}'...", self.cyan("[run]"), task));
            }
            ProgressEvent::TaskStarted { task } => {
                if self.verbose {
                    self.writeln(&format!("{} Starting '{}'", self.cyan("[task]"), task));
                }
            }
            ProgressEvent::TaskCompleted { task, status, duration_ms } => {
                let status_str = match &status {
                    TaskStatus::Success => self.green("ok"),
                    TaskStatus::Skipped => self.yellow("up to date"),
                    TaskStatus::Failed(_) => self.red("FAILED"),
                };
                self.writeln(&format!(
                    "{} {} '{}' ({})",
                    self.cyan("[task]"),
                    status_str,
                    task,
                    format_duration(duration_ms)
                ));
                if let TaskStatus::Failed(err) = status {
                    for line in err.lines() {
                        self.writeln(&format!("       {}", self.red(line)));
                    }
                }
            }
            ProgressEvent::Notice { message, .. } => {
                self.writeln(&format!("{} {}", self.green("[notify]"), message));
            }
            ProgressEvent::RunCompleted { success, duration_ms, succeeded, skipped, failed } => {
                let duration_str = format_duration(duration_ms);
                if success {
                    self.writeln(&format!(
                        "{} {} ran, {} up to date in {}",
                        self.green("[done]"),
                        succeeded + skipped,
                        skipped,
                        duration_str
                    ));
                } else {
                    self.writeln(&format!(
                        "{} {} succeeded, {} up to date, {} failed in {}",
                        self.red("[error]"),
                        succeeded,
                        skipped,
                        failed,
                        duration_str
                    ));
                }
            }
            ProgressEvent::Warning { task, message } => {
                let prefix = task.map(|t| format!("{}: ", t)).unwrap_or_default();
                self.writeln(&format!("{} {}{}", self.yellow("[warn]"), prefix, message));
            }
            ProgressEvent::Error { task, message } => {
                let prefix = task.map(|t| format!("{}: ", t)).unwrap_or_default();
                self.writeln(&format!("{} {}{}", self.red("[error]"), prefix, message));
            }
        }
    }

    fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// JSON lines progress reporter for machine-readable output.
pub struct JsonProgress {
    output: Mutex<Box<dyn Write + Send>>,
}

impl std::fmt::Debug for JsonProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonProgress").finish()
    }
}

impl JsonProgress {
    /// Create a new JSON progress reporter writing to stderr.
    pub fn new() -> Self {
        Self { output: Mutex::new(Box::new(std::io::stderr())) }
    }

    /// Create a JSON progress reporter that writes to a custom output.
    pub fn with_output<W: Write + Send + 'static>(output: W) -> Self {
        Self { output: Mutex::new(Box::new(output)) }
    }
}

impl Default for JsonProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        use serde_json::json;

        let value = match event {
            ProgressEvent::RunStarted { task } => {
                json!({"event": "run_started", "task": task.name()})
            }
            ProgressEvent::TaskStarted { task } => {
                json!({"event": "task_started", "task": task.name()})
            }
            ProgressEvent::TaskCompleted { task, status, duration_ms } => {
                let mut value = json!({
                    "event": "task_completed",
                    "task": task.name(),
                    "status": match &status {
                        TaskStatus::Success => "success",
                        TaskStatus::Skipped => "skipped",
                        TaskStatus::Failed(_) => "failed",
                    },
                    "duration_ms": duration_ms,
                });
                if let TaskStatus::Failed(e) = status {
                    value["error"] = json!(e);
                }
                value
            }
            ProgressEvent::Notice { task, message } => {
                json!({"event": "notice", "task": task.name(), "message": message})
            }
            ProgressEvent::RunCompleted { success, duration_ms, succeeded, skipped, failed } => {
                json!({
                    "event": "run_completed",
                    "success": success,
                    "duration_ms": duration_ms,
                    "succeeded": succeeded,
                    "skipped": skipped,
                    "failed": failed,
                })
            }
            ProgressEvent::Warning { task, message } => {
                json!({"event": "warning", "task": task.map(|t| t.name()), "message": message})
            }
            ProgressEvent::Error { task, message } => {
                json!({"event": "error", "task": task.map(|t| t.name()), "message": message})
            }
        };
        if let Ok(mut output) = self.output.lock() {
            let _ = writeln!(output, "{}", value);
        }
    }
}

/// Format a duration in milliseconds to a human-readable string.
pub fn format_duration(ms: u64) -> String {
    if ms < 1000 {
        format!("{}ms", ms)
    } else if ms < 60_000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        let minutes = ms / 60_000;
        let seconds = (ms % 60_000) / 1000;
        format!("{}m {}s", minutes, seconds)
    }
}
