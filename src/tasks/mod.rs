//! Named build tasks and the graph that connects them.
//!
//! Every task is identified by a [`TaskId`]. [`default_graph`] wires the
//! standard tasks together:
//!
//! | Task | Runs after | Body |
//! |---|---|---|
//! | `cache` | | clear the image optimizer cache |
//! | `clean` | `cache` | delete the output and temporary directories |
//! | `lint` | | lint scripts |
//! | `images` | | optimize images |
//! | `copy` | | copy static files |
//! | `styles` | | compile stylesheets |
//! | `scripts` | | concatenate scripts |
//! | `serve` | `scripts`, `styles` | dev proxy with live reload |
//! | `serve-dist` | `default` | proxy for the production output |
//! | `default` | `clean` | production: `styles`, then `lint`, `scripts`, `images`, `copy` |

pub mod clean;
pub mod copy;
pub mod graph;
pub mod images;
pub mod lint;
pub mod runner;
pub mod scripts;
pub mod serve;
pub mod styles;

pub use graph::{GraphError, TaskBody, TaskDef, TaskEnv, TaskGraph};
pub use runner::{RunError, Runner};

use crate::build::{DiscoveryError, Mode, TransformError};
use crate::cache::CacheError;
use std::path::PathBuf;
use std::str::FromStr;

/// Identifier of a task in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskId {
    Cache,
    Clean,
    Lint,
    Images,
    Copy,
    Styles,
    Scripts,
    Serve,
    ServeDist,
    Default,
}

impl TaskId {
    /// Every task, in display order.
    pub const ALL: [TaskId; 10] = [
        TaskId::Default,
        TaskId::Cache,
        TaskId::Clean,
        TaskId::Lint,
        TaskId::Images,
        TaskId::Copy,
        TaskId::Styles,
        TaskId::Scripts,
        TaskId::Serve,
        TaskId::ServeDist,
    ];

    /// Name used on the command line.
    pub fn name(self) -> &'static str {
        match self {
            TaskId::Cache => "cache",
            TaskId::Clean => "clean",
            TaskId::Lint => "lint",
            TaskId::Images => "images",
            TaskId::Copy => "copy",
            TaskId::Styles => "styles",
            TaskId::Scripts => "scripts",
            TaskId::Serve => "serve",
            TaskId::ServeDist => "serve-dist",
            TaskId::Default => "default",
        }
    }

    /// One-line description for `assetflow tasks`.
    pub fn description(self) -> &'static str {
        match self {
            TaskId::Cache => "Clear the image optimizer cache",
            TaskId::Clean => "Delete the output and temporary directories",
            TaskId::Lint => "Lint scripts",
            TaskId::Images => "Optimize images",
            TaskId::Copy => "Copy static files to the output directory",
            TaskId::Styles => "Compile, inline and minify stylesheets",
            TaskId::Scripts => "Concatenate and minify scripts",
            TaskId::Serve => "Run the dev proxy with live reload",
            TaskId::ServeDist => "Build, then serve the production output",
            TaskId::Default => "Clean, then build everything for production",
        }
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Unknown task name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown task '{0}'")]
pub struct UnknownTask(pub String);

impl FromStr for TaskId {
    type Err = UnknownTask;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskId::ALL.iter().copied().find(|t| t.name() == s).ok_or_else(|| UnknownTask(s.to_string()))
    }
}

/// Error from a task body.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum TaskError {
    /// Lint found error-level problems outside a dev session
    #[error("Lint failed with {errors} error{} and {warnings} warning{}", plural(.errors), plural(.warnings))]
    LintFailed { errors: usize, warnings: usize },
    /// A pipeline step failed
    #[error(transparent)]
    Transform(#[from] TransformError),
    /// Source discovery failed
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
    /// Image cache failure
    #[error(transparent)]
    Cache(#[from] CacheError),
    /// File system failure outside a pipeline
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Dev server failure
    #[error("Server error: {0}")]
    Server(String),
}

impl TaskError {
    /// Wrap an IO error with the path it concerns.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TaskError::Io { path: path.into(), source }
    }
}

fn plural(n: &usize) -> &'static str {
    if *n == 1 {
        ""
    } else {
        "s"
    }
}

/// The standard task graph.
pub fn default_graph() -> TaskGraph {
    TaskGraph::new()
        .task(TaskDef::action(TaskId::Cache, clean::clear_cache))
        .task(TaskDef::action(TaskId::Clean, clean::run).after(&[TaskId::Cache]))
        .task(TaskDef::action(TaskId::Lint, lint::run))
        .task(TaskDef::action(TaskId::Images, images::run))
        .task(TaskDef::action(TaskId::Copy, copy::run))
        .task(TaskDef::action(TaskId::Styles, styles::run))
        .task(TaskDef::action(TaskId::Scripts, scripts::run))
        .task(TaskDef::action(TaskId::Serve, serve::run).after(&[TaskId::Scripts, TaskId::Styles]))
        .task(TaskDef::action(TaskId::ServeDist, serve::run_dist).after(&[TaskId::Default]))
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
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_id_names_roundtrip() {
        for task in TaskId::ALL {
            assert_eq!(task.name().parse::<TaskId>().unwrap(), task);
        }
        assert_eq!("serve-dist".parse::<TaskId>().unwrap(), TaskId::ServeDist);
        assert_eq!("bogus".parse::<TaskId>().unwrap_err(), UnknownTask("bogus".to_string()));
    }

    #[test]
    fn test_default_graph_is_valid() {
        let graph = default_graph();
        graph.validate().unwrap();
        for task in TaskId::ALL {
            assert!(graph.get(task).is_some(), "missing {}", task);
        }
    }

    #[test]
    fn test_default_plan_order() {
        let plan = default_graph().plan(&[TaskId::Default]).unwrap();
        assert_eq!(
            plan,
            vec![
                vec![TaskId::Cache],
                vec![TaskId::Clean],
                vec![TaskId::Styles],
                vec![TaskId::Lint, TaskId::Scripts, TaskId::Images, TaskId::Copy],
                vec![TaskId::Default],
            ]
        );
    }

    #[test]
    fn test_lint_failed_message() {
        let err = TaskError::LintFailed { errors: 1, warnings: 2 };
        assert_eq!(err.to_string(), "Lint failed with 1 error and 2 warnings");
    }
}
