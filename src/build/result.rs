//! Task result types.
//!
//! Contains types for representing the outcome of task runs.

use crate::tasks::TaskId;
use std::path::PathBuf;
use std::time::Duration;

/// What a task action produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskOutput {
    /// Files written
    pub outputs: Vec<PathBuf>,
    /// Inputs skipped because their outputs were up to date (or cached)
    pub up_to_date: usize,
    /// Non-fatal problems
    pub warnings: Vec<String>,
}

impl TaskOutput {
    /// Output listing written files.
    pub fn written(outputs: Vec<PathBuf>) -> Self {
        Self { outputs, ..Default::default() }
    }

    /// Set the up-to-date count.
    pub fn with_up_to_date(mut self, count: usize) -> Self {
        self.up_to_date = count;
        self
    }

    /// Add warnings.
    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings.extend(warnings);
        self
    }
}

/// Status of a single task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    /// Task ran and did work
    Success,
    /// Task ran but everything was already up to date
    Skipped,
    /// Task failed with error
    Failed(String),
}

impl TaskStatus {
    /// Check if the status indicates success.
    pub fn is_success(&self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Skipped)
    }

    /// Check if the status indicates failure.
    pub fn is_failure(&self) -> bool {
        matches!(self, TaskStatus::Failed(_))
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Success => write!(f, "success"),
            TaskStatus::Skipped => write!(f, "skipped"),
            TaskStatus::Failed(err) => write!(f, "failed: {}", err),
        }
    }
}

/// Result of running a single task.
#[derive(Debug, Clone)]
pub struct TaskResult {
    /// Task that ran
    pub task: TaskId,
    /// Outcome
    pub status: TaskStatus,
    /// Files written
    pub outputs: Vec<PathBuf>,
    /// Run time
    pub duration: Duration,
    /// Warning messages (if any)
    pub warnings: Vec<String>,
}

impl TaskResult {
    /// Build a result from an action's output.
    ///
    /// A task that wrote nothing but found up-to-date inputs is reported as
    /// skipped.
    pub fn from_output(task: TaskId, output: TaskOutput, duration: Duration) -> Self {
        let status = if output.outputs.is_empty() && output.up_to_date > 0 {
            TaskStatus::Skipped
        } else {
            TaskStatus::Success
        };
        Self { task, status, outputs: output.outputs, duration, warnings: output.warnings }
    }

    /// Create a successful result with no outputs.
    pub fn success(task: TaskId, duration: Duration) -> Self {
        Self { task, status: TaskStatus::Success, outputs: vec![], duration, warnings: vec![] }
    }

    /// Create a failed result.
    pub fn failed(task: TaskId, error: String, duration: Duration) -> Self {
        Self { task, status: TaskStatus::Failed(error), outputs: vec![], duration, warnings: vec![] }
    }

    /// Check if this result is successful.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Result of a complete invocation.
#[derive(Debug, Default)]
pub struct RunReport {
    /// Results in completion order
    pub tasks: Vec<TaskResult>,
    /// Total duration
    pub total_duration: Duration,
}

impl RunReport {
    /// Create a new empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a task result.
    pub fn add_result(&mut self, result: TaskResult) {
        self.tasks.push(result);
    }

    /// Check if all tasks succeeded.
    pub fn is_success(&self) -> bool {
        self.tasks.iter().all(|t| t.is_success())
    }

    /// Result of a specific task, if it ran.
    pub fn get(&self, task: TaskId) -> Option<&TaskResult> {
        self.tasks.iter().find(|t| t.task == task)
    }

    /// Number of tasks that did work.
    pub fn success_count(&self) -> usize {
        self.tasks.iter().filter(|t| t.status == TaskStatus::Success).count()
    }

    /// Number of tasks that found everything up to date.
    pub fn skipped_count(&self) -> usize {
        self.tasks.iter().filter(|t| t.status == TaskStatus::Skipped).count()
    }

    /// Number of failed tasks.
    pub fn failed_count(&self) -> usize {
        self.tasks.iter().filter(|t| t.status.is_failure()).count()
    }

    /// All files written.
    pub fn all_outputs(&self) -> Vec<&PathBuf> {
        self.tasks.iter().flat_map(|t| &t.outputs).collect()
    }

    /// Failed task results.
    pub fn failures(&self) -> Vec<&TaskResult> {
        self.tasks.iter().filter(|t| t.status.is_failure()).collect()
    }

    /// One-line summary.
    pub fn summary(&self) -> String {
        if self.is_success() {
            format!(
                "Finished {} task{} ({} up to date) in {:.2}s",
                self.tasks.len(),
                if self.tasks.len() == 1 { "" } else { "s" },
                self.skipped_count(),
                self.total_duration.as_secs_f64()
            )
        } else {
            format!(
                "Failed: {} of {} task{} failed in {:.2}s",
                self.failed_count(),
                self.tasks.len(),
                if self.tasks.len() == 1 { "" } else { "s" },
                self.total_duration.as_secs_f64()
            )
        }
    }
}
