//! Task graph execution.
//!
//! A [`Runner`] executes one invocation over a [`TaskGraph`]:
//!
//! 1. Validate the graph (unknown references and cycles are rejected before
//!    any task starts)
//! 2. Run a task's prerequisites concurrently on scoped threads
//! 3. Run its body; sequence groups run in order
//! 4. Memoize the outcome so a task shared by several dependents runs once,
//!    even when the dependents ask for it at the same time
//!
//! A failed task prevents everything that waits for it from running.

use super::graph::{TaskBody, TaskEnv, TaskGraph};
use super::{GraphError, TaskId};
use crate::build::{BuildContext, ProgressEvent, ProgressReporter, RunReport, TaskResult};
use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};
use std::time::Instant;

/// Why an invocation did not complete.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RunError {
    /// A task failed
    #[error("Task '{task}' failed: {message}")]
    TaskFailed { task: TaskId, message: String },
    /// The graph is invalid
    #[error(transparent)]
    Graph(#[from] GraphError),
}

#[derive(Debug, Clone)]
struct Failure {
    task: TaskId,
    message: String,
}

type Outcome = Result<(), Failure>;

/// Executes tasks from a graph, each at most once.
pub struct Runner<'g> {
    graph: &'g TaskGraph,
    reporter: &'g dyn ProgressReporter,
    slots: HashMap<TaskId, OnceLock<Outcome>>,
    results: Mutex<Vec<TaskResult>>,
}

impl<'g> Runner<'g> {
    /// Create a runner for one invocation.
    pub fn new(graph: &'g TaskGraph, reporter: &'g dyn ProgressReporter) -> Self {
        let slots = graph.tasks().map(|def| (def.id, OnceLock::new())).collect();
        Self { graph, reporter, slots, results: Mutex::new(Vec::new()) }
    }

    /// Run `roots` concurrently along with everything they need.
    pub fn run(&self, roots: &[TaskId], context: &BuildContext) -> Result<RunReport, RunError> {
        self.graph.validate()?;
        for &root in roots {
            if self.graph.get(root).is_none() {
                return Err(GraphError::Undefined(root).into());
            }
        }

        let start = Instant::now();
        for &task in roots {
            self.reporter.report(ProgressEvent::RunStarted { task });
        }

        let outcome = self.run_group(roots, context);

        let mut report = RunReport::new();
        if let Ok(mut results) = self.results.lock() {
            report.tasks = std::mem::take(&mut *results);
        }
        report.total_duration = start.elapsed();

        if let Err(failure) = &outcome {
            self.reporter.report(ProgressEvent::Error {
                task: Some(failure.task),
                message: failure.message.clone(),
            });
        }
        self.reporter.report(ProgressEvent::RunCompleted {
            success: outcome.is_ok(),
            duration_ms: report.total_duration.as_millis() as u64,
            succeeded: report.success_count(),
            skipped: report.skipped_count(),
            failed: report.failed_count(),
        });

        match outcome {
            Ok(()) => Ok(report),
            Err(failure) => {
                Err(RunError::TaskFailed { task: failure.task, message: failure.message })
            }
        }
    }

    fn run_group(&self, tasks: &[TaskId], context: &BuildContext) -> Outcome {
        match tasks {
            [] => Ok(()),
            [task] => self.run_one(*task, context),
            _ => {
                let outcomes: Vec<Outcome> = std::thread::scope(|s| {
                    let handles: Vec<_> = tasks
                        .iter()
                        .map(|&task| (task, s.spawn(move || self.run_one(task, context))))
                        .collect();
                    handles
                        .into_iter()
                        .map(|(task, handle)| {
                            handle.join().unwrap_or_else(|_| {
                                Err(Failure { task, message: "task panicked".to_string() })
                            })
                        })
                        .collect()
                });
                outcomes.into_iter().collect()
            }
        }
    }

    fn run_one(&self, task: TaskId, context: &BuildContext) -> Outcome {
        match self.slots.get(&task) {
            Some(slot) => slot.get_or_init(|| self.execute(task, context)).clone(),
            None => Err(Failure { task, message: "task is not defined".to_string() }),
        }
    }

    fn execute(&self, task: TaskId, context: &BuildContext) -> Outcome {
        let Some(def) = self.graph.get(task) else {
            return Err(Failure { task, message: "task is not defined".to_string() });
        };

        self.run_group(&def.after, context)?;

        self.reporter.report(ProgressEvent::TaskStarted { task });
        tracing::debug!(%task, mode = %context.mode(), "starting task");
        let start = Instant::now();

        let (result, outcome) = match &def.body {
            TaskBody::Action(action) => {
                let env = TaskEnv { task, context, graph: self.graph, reporter: self.reporter };
                match action(&env) {
                    Ok(output) => (TaskResult::from_output(task, output, start.elapsed()), Ok(())),
                    Err(e) => {
                        let message = e.to_string();
                        (
                            TaskResult::failed(task, message.clone(), start.elapsed()),
                            Err(Failure { task, message }),
                        )
                    }
                }
            }
            TaskBody::Sequence { mode, groups } => {
                let scoped = match mode {
                    Some(mode) => context.clone().with_mode(*mode),
                    None => context.clone(),
                };
                let outcome = groups.iter().try_for_each(|group| self.run_group(group, &scoped));
                match outcome {
                    Ok(()) => (TaskResult::success(task, start.elapsed()), Ok(())),
                    Err(failure) => (
                        TaskResult::failed(
                            task,
                            format!("'{}' failed", failure.task),
                            start.elapsed(),
                        ),
                        Err(failure),
                    ),
                }
            }
        };

        for warning in &result.warnings {
            self.reporter.report(ProgressEvent::Warning { task: Some(task), message: warning.clone() });
        }
        self.reporter.report(ProgressEvent::TaskCompleted {
            task,
            status: result.status.clone(),
            duration_ms: result.duration.as_millis() as u64,
        });
        if let Ok(mut results) = self.results.lock() {
            results.push(result);
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::{Mode, NullProgress, TaskOutput, TaskStatus};
    use crate::config::default_config;
    use crate::tasks::{TaskDef, TaskError};
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    type Log = Arc<Mutex<Vec<String>>>;

    fn context() -> BuildContext {
        BuildContext::new(default_config(), PathBuf::from("/project"))
    }

    fn logged(id: TaskId, log: &Log) -> TaskDef {
        let log = Arc::clone(log);
        TaskDef::action(id, move |env| {
            log.lock().unwrap().push(format!("start:{}", env.task));
            std::thread::sleep(Duration::from_millis(10));
            log.lock().unwrap().push(format!("end:{}", env.task));
            Ok(TaskOutput::default())
        })
    }

    fn position(log: &[String], entry: &str) -> usize {
        log.iter().position(|e| e == entry).unwrap_or_else(|| panic!("{} not in {:?}", entry, log))
    }

    #[test]
    fn test_shared_dependency_runs_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let graph = TaskGraph::new()
            .task(TaskDef::action(TaskId::Cache, move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(20));
                Ok(TaskOutput::default())
            }))
            .task(TaskDef::action(TaskId::Clean, |_| Ok(TaskOutput::default())).after(&[TaskId::Cache]))
            .task(TaskDef::action(TaskId::Copy, |_| Ok(TaskOutput::default())).after(&[TaskId::Cache]));

        let runner = Runner::new(&graph, &NullProgress);
        let report = runner.run(&[TaskId::Clean, TaskId::Copy], &context()).unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(report.tasks.len(), 3);
    }

    #[test]
    fn test_sequence_groups_run_in_order() {
        let log: Log = Arc::default();
        let graph = TaskGraph::new()
            .task(logged(TaskId::Cache, &log))
            .task(logged(TaskId::Clean, &log).after(&[TaskId::Cache]))
            .task(logged(TaskId::Styles, &log))
            .task(logged(TaskId::Lint, &log))
            .task(logged(TaskId::Scripts, &log))
            .task(logged(TaskId::Images, &log))
            .task(logged(TaskId::Copy, &log))
            .task(
                TaskDef::sequence(
                    TaskId::Default,
                    Some(Mode::Production),
                    vec![
                        vec![TaskId::Styles],
                        vec![TaskId::Lint, TaskId::Scripts, TaskId::Images, TaskId::Copy],
                    ],
                )
                .after(&[TaskId::Clean]),
            );

        Runner::new(&graph, &NullProgress).run(&[TaskId::Default], &context()).unwrap();
        let log = log.lock().unwrap();

        assert!(position(&log, "end:cache") < position(&log, "start:clean"));
        assert!(position(&log, "end:clean") < position(&log, "start:styles"));
        for task in ["lint", "scripts", "images", "copy"] {
            assert!(position(&log, "end:styles") < position(&log, &format!("start:{}", task)));
        }
    }

    #[test]
    fn test_sequence_mode_override() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let record = |id| {
            let seen = Arc::clone(&seen);
            TaskDef::action(id, move |env| {
                seen.lock().unwrap().push((env.task, env.context.mode()));
                Ok(TaskOutput::default())
            })
        };
        let graph = TaskGraph::new()
            .task(record(TaskId::Clean))
            .task(record(TaskId::Styles))
            .task(
                TaskDef::sequence(TaskId::Default, Some(Mode::Production), vec![vec![TaskId::Styles]])
                    .after(&[TaskId::Clean]),
            );

        Runner::new(&graph, &NullProgress).run(&[TaskId::Default], &context()).unwrap();
        let seen = seen.lock().unwrap();

        assert!(seen.contains(&(TaskId::Clean, Mode::Development)));
        assert!(seen.contains(&(TaskId::Styles, Mode::Production)));
    }

    #[test]
    fn test_failed_dependency_blocks_dependent() {
        let ran = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ran);
        let graph = TaskGraph::new()
            .task(TaskDef::action(TaskId::Lint, |_| {
                Err(TaskError::LintFailed { errors: 2, warnings: 0 })
            }))
            .task(
                TaskDef::action(TaskId::Serve, move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(TaskOutput::default())
                })
                .after(&[TaskId::Lint]),
            );

        let err = Runner::new(&graph, &NullProgress).run(&[TaskId::Serve], &context()).unwrap_err();

        assert_eq!(ran.load(Ordering::SeqCst), 0);
        match err {
            RunError::TaskFailed { task, message } => {
                assert_eq!(task, TaskId::Lint);
                assert!(message.contains("2 errors"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_cycle_rejected_before_running() {
        let ran = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ran);
        let graph = TaskGraph::new()
            .task(
                TaskDef::action(TaskId::Cache, move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(TaskOutput::default())
                })
                .after(&[TaskId::Clean]),
            )
            .task(TaskDef::action(TaskId::Clean, |_| Ok(TaskOutput::default())).after(&[TaskId::Cache]))
            .task(TaskDef::action(TaskId::Lint, |_| Ok(TaskOutput::default())));

        let err = Runner::new(&graph, &NullProgress).run(&[TaskId::Lint], &context()).unwrap_err();

        assert!(matches!(err, RunError::Graph(GraphError::Cycle(_))));
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_report_statuses() {
        let graph = TaskGraph::new()
            .task(TaskDef::action(TaskId::Copy, |_| Ok(TaskOutput::default().with_up_to_date(4))))
            .task(TaskDef::action(TaskId::Images, |_| {
                Ok(TaskOutput::written(vec![PathBuf::from("a.png")]))
            }));

        let report = Runner::new(&graph, &NullProgress)
            .run(&[TaskId::Copy, TaskId::Images], &context())
            .unwrap();

        assert_eq!(report.get(TaskId::Copy).unwrap().status, TaskStatus::Skipped);
        assert_eq!(report.get(TaskId::Images).unwrap().status, TaskStatus::Success);
        assert_eq!(report.all_outputs().len(), 1);
    }
}
