//! Command implementations (build, serve, serve-dist, run, tasks)

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use super::{GlobalArgs, EXIT_ERROR, EXIT_INVALID_ARGS, EXIT_SUCCESS};
use crate::build::{BuildContext, ConsoleProgress, JsonProgress, Mode, ProgressReporter};
use crate::config::loader::{find_config, load_config, merge_cli_overrides, CliOverrides, ConfigError};
use crate::tasks::{default_graph, RunError, Runner, TaskBody, TaskId};

/// Load the project configuration and build the context for a run.
///
/// The project root is the directory holding `assetflow.toml`, or the
/// current directory when there is none.
pub(crate) fn load_context(
    global: &GlobalArgs,
    overrides: &CliOverrides,
) -> Result<BuildContext, ConfigError> {
    let cwd = std::env::current_dir()?;
    let config_path = global.config.clone().or_else(find_config);

    let (mut config, project_root) = match config_path {
        Some(path) => {
            if global.verbose {
                println!("Using config: {}", path.display());
            }
            let config = load_config(Some(&path))?;
            (config, project_root_of(&path, &cwd))
        }
        None => {
            if global.verbose {
                println!("No assetflow.toml found, using defaults");
            }
            (crate::config::loader::default_config(), cwd)
        }
    };

    merge_cli_overrides(&mut config, overrides);
    Ok(BuildContext::new(config, project_root).with_force(global.force).with_verbose(global.verbose))
}

fn project_root_of(config_path: &Path, cwd: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if parent.as_os_str().is_empty() => cwd.to_path_buf(),
        Some(parent) if parent.is_absolute() => parent.to_path_buf(),
        Some(parent) => cwd.join(parent),
        None => cwd.to_path_buf(),
    }
}

fn reporter(global: &GlobalArgs) -> Box<dyn ProgressReporter> {
    if global.json {
        Box::new(JsonProgress::new())
    } else {
        Box::new(
            ConsoleProgress::new()
                .with_colors(std::io::stderr().is_terminal())
                .with_verbose(global.verbose),
        )
    }
}

/// Print the waves `roots` would run in.
fn print_plan(roots: &[TaskId]) -> ExitCode {
    match default_graph().plan(roots) {
        Ok(waves) => {
            println!("Dry run - would run:");
            for (i, wave) in waves.iter().enumerate() {
                let names: Vec<&str> = wave.iter().map(|t| t.name()).collect();
                println!("  {}. {}", i + 1, names.join(", "));
            }
            ExitCode::from(EXIT_SUCCESS)
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}

/// Run `roots` over the standard graph.
fn run_tasks(global: &GlobalArgs, overrides: &CliOverrides, roots: &[TaskId], mode: Mode) -> ExitCode {
    let context = match load_context(global, overrides) {
        Ok(context) => context.with_mode(mode),
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    let graph = default_graph();
    let reporter = reporter(global);
    tracing::debug!(?roots, %mode, root = %context.project_root().display(), "running");

    match Runner::new(&graph, reporter.as_ref()).run(roots, &context) {
        Ok(report) => {
            if global.verbose {
                println!("{}", report.summary());
            }
            ExitCode::from(EXIT_SUCCESS)
        }
        // Already reported as a progress error
        Err(RunError::TaskFailed { .. }) => ExitCode::from(EXIT_ERROR),
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}

/// Run the default production build
pub fn run_default(global: &GlobalArgs, dry_run: bool) -> ExitCode {
    if dry_run {
        return print_plan(&[TaskId::Default]);
    }
    run_tasks(global, &CliOverrides::default(), &[TaskId::Default], Mode::Production)
}

/// Run the serve command
pub fn run_serve(global: &GlobalArgs, port: Option<u16>) -> ExitCode {
    println!("Press Ctrl+C to stop");
    let overrides = CliOverrides { port, ..Default::default() };
    run_tasks(global, &overrides, &[TaskId::Serve], Mode::Development)
}

/// Run the serve-dist command
pub fn run_serve_dist(global: &GlobalArgs) -> ExitCode {
    println!("Press Ctrl+C to stop");
    run_tasks(global, &CliOverrides::default(), &[TaskId::ServeDist], Mode::Production)
}

/// Run the run command
pub fn run_named(global: &GlobalArgs, names: &[String], production: bool, dry_run: bool) -> ExitCode {
    let mut roots = Vec::with_capacity(names.len());
    for name in names {
        match name.parse::<TaskId>() {
            Ok(task) => roots.push(task),
            Err(e) => {
                eprintln!("Error: {}", e);
                eprintln!("Run 'assetflow tasks' to list available tasks");
                return ExitCode::from(EXIT_INVALID_ARGS);
            }
        }
    }

    if dry_run {
        return print_plan(&roots);
    }
    let mode = if production { Mode::Production } else { Mode::Development };
    run_tasks(global, &CliOverrides::default(), &roots, mode)
}

/// Describe how a task is wired into the graph.
fn describe(task: TaskId) -> Option<String> {
    let graph = default_graph();
    let def = graph.get(task)?;
    let mut parts = Vec::new();
    if !def.after.is_empty() {
        let after: Vec<&str> = def.after.iter().map(|t| t.name()).collect();
        parts.push(format!("after {}", after.join(", ")));
    }
    if let TaskBody::Sequence { mode, groups } = &def.body {
        let groups: Vec<String> = groups
            .iter()
            .map(|g| format!("[{}]", g.iter().map(|t| t.name()).collect::<Vec<_>>().join(", ")))
            .collect();
        let mode = mode.map(|m| format!(" ({})", m)).unwrap_or_default();
        parts.push(format!("then {}{}", groups.join(" -> "), mode));
    }
    Some(parts.join("; "))
}

/// Run the tasks command
pub fn run_list() -> ExitCode {
    let width = TaskId::ALL.iter().map(|t| t.name().len()).max().unwrap_or(0);
    for task in TaskId::ALL {
        println!("  {:width$}  {}", task.name(), task.description(), width = width);
        if let Some(wiring) = describe(task).filter(|w| !w.is_empty()) {
            println!("  {:width$}    {}", "", wiring, width = width);
        }
    }
    ExitCode::from(EXIT_SUCCESS)
}
