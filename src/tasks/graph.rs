//! Typed task graph.
//!
//! A [`TaskGraph`] maps each [`TaskId`] to a [`TaskDef`]: the tasks that must
//! complete before it (`after`) and a body. A body is either an action or a
//! sequence of groups; groups run in order and the members of a group run
//! concurrently.
//!
//! The graph is validated before anything runs: references to tasks that are
//! not defined and cycles are rejected.

use super::{TaskError, TaskId};
use crate::build::{BuildContext, Mode, ProgressEvent, ProgressReporter, TaskOutput};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// Everything a task action can see while it runs.
pub struct TaskEnv<'a> {
    /// Task being run
    pub task: TaskId,
    /// Configuration, directories and mode
    pub context: &'a BuildContext,
    /// Graph the task belongs to
    pub graph: &'a TaskGraph,
    /// Progress sink
    pub reporter: &'a dyn ProgressReporter,
}

impl TaskEnv<'_> {
    /// Report a completion notice for the running task.
    pub fn notify(&self, message: impl Into<String>) {
        self.reporter.report(ProgressEvent::Notice { task: self.task, message: message.into() });
    }

    /// Report a warning for the running task.
    pub fn warn(&self, message: impl Into<String>) {
        self.reporter.report(ProgressEvent::Warning { task: Some(self.task), message: message.into() });
    }
}

/// Body of an action task.
pub type ActionFn = Arc<dyn Fn(&TaskEnv<'_>) -> Result<TaskOutput, TaskError> + Send + Sync>;

/// What a task does once everything it runs after has completed.
#[derive(Clone)]
pub enum TaskBody {
    /// Run a function
    Action(ActionFn),
    /// Run groups of tasks in order, optionally switching the mode for them
    Sequence { mode: Option<Mode>, groups: Vec<Vec<TaskId>> },
}

impl std::fmt::Debug for TaskBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskBody::Action(_) => f.write_str("Action"),
            TaskBody::Sequence { mode, groups } => {
                f.debug_struct("Sequence").field("mode", mode).field("groups", groups).finish()
            }
        }
    }
}

/// A task definition.
#[derive(Debug, Clone)]
pub struct TaskDef {
    pub id: TaskId,
    /// Tasks that must complete before the body starts
    pub after: Vec<TaskId>,
    pub body: TaskBody,
}

impl TaskDef {
    /// Task running a function.
    pub fn action<F>(id: TaskId, action: F) -> Self
    where
        F: Fn(&TaskEnv<'_>) -> Result<TaskOutput, TaskError> + Send + Sync + 'static,
    {
        Self { id, after: vec![], body: TaskBody::Action(Arc::new(action)) }
    }

    /// Task running groups of other tasks in order.
    pub fn sequence(id: TaskId, mode: Option<Mode>, groups: Vec<Vec<TaskId>>) -> Self {
        Self { id, after: vec![], body: TaskBody::Sequence { mode, groups } }
    }

    /// Add prerequisites.
    pub fn after(mut self, tasks: &[TaskId]) -> Self {
        self.after.extend_from_slice(tasks);
        self
    }

    /// Every task this one waits for, prerequisites first.
    pub fn children(&self) -> Vec<TaskId> {
        let mut children = self.after.clone();
        if let TaskBody::Sequence { groups, .. } = &self.body {
            children.extend(groups.iter().flatten().copied());
        }
        children
    }
}

/// Invalid task graph.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum GraphError {
    /// A task refers to a task that is not defined
    #[error("Task '{referenced_by}' refers to undefined task '{task}'")]
    UnknownTask { task: TaskId, referenced_by: TaskId },
    /// A requested task is not defined
    #[error("Task '{0}' is not defined")]
    Undefined(TaskId),
    /// The graph contains a cycle
    #[error("Circular task dependency: {}", format_cycle(.0))]
    Cycle(Vec<TaskId>),
}

fn format_cycle(cycle: &[TaskId]) -> String {
    cycle.iter().map(|t| t.name()).collect::<Vec<_>>().join(" -> ")
}

/// Tasks by id.
#[derive(Debug, Clone, Default)]
pub struct TaskGraph {
    tasks: BTreeMap<TaskId, TaskDef>,
}

impl TaskGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a task.
    pub fn task(mut self, def: TaskDef) -> Self {
        self.tasks.insert(def.id, def);
        self
    }

    /// Look up a task.
    pub fn get(&self, id: TaskId) -> Option<&TaskDef> {
        self.tasks.get(&id)
    }

    /// Defined tasks, in id order.
    pub fn tasks(&self) -> impl Iterator<Item = &TaskDef> {
        self.tasks.values()
    }

    /// Check references and reject cycles.
    pub fn validate(&self) -> Result<(), GraphError> {
        for def in self.tasks.values() {
            for child in def.children() {
                if !self.tasks.contains_key(&child) {
                    return Err(GraphError::UnknownTask { task: child, referenced_by: def.id });
                }
            }
        }

        let mut visited = HashSet::new();
        let mut stack = Vec::new();
        for &id in self.tasks.keys() {
            self.visit(id, &mut visited, &mut stack)?;
        }
        Ok(())
    }

    fn visit(
        &self,
        id: TaskId,
        visited: &mut HashSet<TaskId>,
        stack: &mut Vec<TaskId>,
    ) -> Result<(), GraphError> {
        if visited.contains(&id) {
            return Ok(());
        }
        if let Some(pos) = stack.iter().position(|&t| t == id) {
            let mut cycle = stack[pos..].to_vec();
            cycle.push(id);
            return Err(GraphError::Cycle(cycle));
        }

        stack.push(id);
        if let Some(def) = self.tasks.get(&id) {
            for child in def.children() {
                self.visit(child, visited, stack)?;
            }
        }
        stack.pop();
        visited.insert(id);
        Ok(())
    }

    /// Execution waves for running `roots`.
    ///
    /// Each wave starts once the previous one has finished; tasks within a
    /// wave may run concurrently. A task appears only in the first wave that
    /// needs it.
    pub fn plan(&self, roots: &[TaskId]) -> Result<Vec<Vec<TaskId>>, GraphError> {
        self.validate()?;
        for &root in roots {
            if !self.tasks.contains_key(&root) {
                return Err(GraphError::Undefined(root));
            }
        }

        let waves = parallel(roots.iter().map(|&r| self.stages(r)).collect());

        let mut seen = HashSet::new();
        Ok(waves
            .into_iter()
            .map(|wave| wave.into_iter().filter(|t| seen.insert(*t)).collect::<Vec<_>>())
            .filter(|wave| !wave.is_empty())
            .collect())
    }

    fn stages(&self, id: TaskId) -> Vec<Vec<TaskId>> {
        let Some(def) = self.tasks.get(&id) else {
            return vec![];
        };

        let mut waves = parallel(def.after.iter().map(|&d| self.stages(d)).collect());
        if let TaskBody::Sequence { groups, .. } = &def.body {
            for group in groups {
                waves.extend(parallel(group.iter().map(|&m| self.stages(m)).collect()));
            }
        }
        waves.push(vec![id]);
        waves
    }
}

/// Merge stage lists that run side by side, wave by wave.
fn parallel(branches: Vec<Vec<Vec<TaskId>>>) -> Vec<Vec<TaskId>> {
    let depth = branches.iter().map(|b| b.len()).max().unwrap_or(0);
    let mut waves: Vec<Vec<TaskId>> = vec![Vec::new(); depth];
    for branch in branches {
        for (i, wave) in branch.into_iter().enumerate() {
            for task in wave {
                if !waves[i].contains(&task) {
                    waves[i].push(task);
                }
            }
        }
    }
    waves
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(id: TaskId) -> TaskDef {
        TaskDef::action(id, |_| Ok(TaskOutput::default()))
    }

    #[test]
    fn test_validate_rejects_unknown_reference() {
        let graph = TaskGraph::new().task(noop(TaskId::Clean).after(&[TaskId::Cache]));
        assert_eq!(
            graph.validate().unwrap_err(),
            GraphError::UnknownTask { task: TaskId::Cache, referenced_by: TaskId::Clean }
        );
    }

    #[test]
    fn test_validate_rejects_cycle() {
        let graph = TaskGraph::new()
            .task(noop(TaskId::Cache).after(&[TaskId::Clean]))
            .task(noop(TaskId::Clean).after(&[TaskId::Styles]))
            .task(noop(TaskId::Styles).after(&[TaskId::Cache]));

        let err = graph.validate().unwrap_err();
        assert!(matches!(err, GraphError::Cycle(ref c) if c.len() == 4));
        assert!(err.to_string().starts_with("Circular task dependency: "));
    }

    #[test]
    fn test_validate_rejects_cycle_through_sequence() {
        let graph = TaskGraph::new()
            .task(TaskDef::sequence(TaskId::Default, None, vec![vec![TaskId::Styles]]))
            .task(noop(TaskId::Styles).after(&[TaskId::Default]));
        assert!(matches!(graph.validate(), Err(GraphError::Cycle(_))));
    }

    #[test]
    fn test_plan_parallel_prerequisites() {
        let graph = TaskGraph::new()
            .task(noop(TaskId::Scripts))
            .task(noop(TaskId::Styles))
            .task(noop(TaskId::Serve).after(&[TaskId::Scripts, TaskId::Styles]));

        assert_eq!(
            graph.plan(&[TaskId::Serve]).unwrap(),
            vec![vec![TaskId::Scripts, TaskId::Styles], vec![TaskId::Serve]]
        );
    }

    #[test]
    fn test_plan_shared_task_appears_once() {
        let graph = TaskGraph::new()
            .task(noop(TaskId::Cache))
            .task(noop(TaskId::Clean).after(&[TaskId::Cache]))
            .task(noop(TaskId::Copy).after(&[TaskId::Cache, TaskId::Clean]));

        assert_eq!(
            graph.plan(&[TaskId::Copy]).unwrap(),
            vec![vec![TaskId::Cache], vec![TaskId::Clean], vec![TaskId::Copy]]
        );
    }

    #[test]
    fn test_plan_undefined_root() {
        let graph = TaskGraph::new().task(noop(TaskId::Lint));
        assert_eq!(graph.plan(&[TaskId::Copy]).unwrap_err(), GraphError::Undefined(TaskId::Copy));
    }
}
