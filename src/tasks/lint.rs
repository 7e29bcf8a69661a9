//! `lint` task.

use super::{TaskEnv, TaskError};
use crate::build::{discover_files, read_sources, GlobSet, TaskOutput};
use crate::lint::{LintReport, Linter};

/// Lint every script below the scripts source directory.
///
/// The report is printed to stderr. Error-level violations fail the task
/// unless a dev server session is active.
pub fn run(env: &TaskEnv<'_>) -> Result<TaskOutput, TaskError> {
    let context = env.context;
    let config = &context.config().lint;
    let src = &context.paths().scripts.src;

    for rule in Linter::unknown_rules(config) {
        env.warn(format!("Unknown lint rule '{}' ignored", rule));
    }

    let paths = discover_files(src, &GlobSet::including(&["**/*.js".to_string()])?)?;
    let sources = read_sources(src, &paths)?;
    let mut texts = Vec::with_capacity(sources.len());
    for file in &sources {
        texts.push((file.path(), file.text("eslint")?));
    }

    let report = Linter::new(config).lint_files(texts);
    check(env, &report)
}

fn check(env: &TaskEnv<'_>, report: &LintReport) -> Result<TaskOutput, TaskError> {
    if !report.is_clean() {
        eprintln!("{}", report.format_stylish());
    }

    let errors = report.error_count();
    let warnings = report.warning_count();
    if errors > 0 && !env.context.in_dev_session() {
        return Err(TaskError::LintFailed { errors, warnings });
    }

    env.notify("Lint task complete.");
    Ok(TaskOutput::default())
}
