//! Watch mode for the dev session
//!
//! Watches the source tree with debouncing and maps changed files to
//! actions: rerun tasks, reload connected browsers, or both.

use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebouncedEventKind};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, RecvTimeoutError};
use std::time::{Duration, Instant};

use crate::build::{BuildContext, DiscoveryError, GlobSet, ProgressReporter};
use crate::tasks::{RunError, Runner, TaskGraph, TaskId};

/// How often the loop checks whether it should stop.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Error during watch mode
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// Failed to initialize file watcher
    #[error("Failed to initialize file watcher: {0}")]
    WatcherInit(#[source] notify::Error),
    /// Failed to add watch path
    #[error("Failed to watch path: {0}")]
    WatchPath(#[source] notify::Error),
    /// Channel receive error
    #[error("Watch channel error: {0}")]
    ChannelError(String),
    /// Source directory not found
    #[error("Source directory not found: {}", .0.display())]
    SourceNotFound(PathBuf),
    /// A watch pattern failed to compile
    #[error(transparent)]
    Pattern(#[from] DiscoveryError),
}

/// What to do when a watched file changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchAction {
    /// Reload connected browsers
    Reload,
    /// Run tasks in the dev session
    RunTasks(Vec<TaskId>),
    /// Run tasks, then reload if they succeeded
    RunThenReload(Vec<TaskId>),
}

/// Pattern set (relative to the source directory) and its action.
#[derive(Debug, Clone)]
pub struct WatchRule {
    pub set: GlobSet,
    pub action: WatchAction,
}

impl WatchRule {
    fn new(pattern: String, action: WatchAction) -> Result<Self, DiscoveryError> {
        Ok(Self { set: GlobSet::including(&[pattern])?, action })
    }
}

fn brace_list(items: &[String]) -> String {
    match items {
        [single] => single.clone(),
        _ => format!("{{{}}}", items.join(",")),
    }
}

/// The dev session's rules.
///
/// | Pattern | Action |
/// |---|---|
/// | `**/*.{templates}` | reload |
/// | `scripts/**/*.js` | lint and scripts |
/// | `styles/**/*.scss` | styles, then reload |
/// | `images/**/*.{images}` | reload |
pub fn dev_rules(context: &BuildContext) -> Result<Vec<WatchRule>, DiscoveryError> {
    let config = context.config();
    let mut rules = Vec::new();
    if !config.server.template_extensions.is_empty() {
        rules.push(WatchRule::new(
            format!("**/*.{}", brace_list(&config.server.template_extensions)),
            WatchAction::Reload,
        )?);
    }
    rules.push(WatchRule::new(
        "scripts/**/*.js".to_string(),
        WatchAction::RunTasks(vec![TaskId::Lint, TaskId::Scripts]),
    )?);
    rules.push(WatchRule::new(
        "styles/**/*.scss".to_string(),
        WatchAction::RunThenReload(vec![TaskId::Styles]),
    )?);
    if !config.images.extensions.is_empty() {
        rules.push(WatchRule::new(
            format!("images/**/*.{}", brace_list(&config.images.extensions)),
            WatchAction::Reload,
        )?);
    }
    Ok(rules)
}

/// Work triggered by one batch of changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchPlan {
    /// Tasks to run, without duplicates
    pub tasks: Vec<TaskId>,
    /// Reload whatever happens to the tasks
    pub reload_always: bool,
    /// Reload once the tasks succeeded
    pub reload_on_success: bool,
}

impl WatchPlan {
    /// Whether the batch touched anything watched.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty() && !self.reload_always && !self.reload_on_success
    }

    fn add_tasks(&mut self, tasks: &[TaskId]) {
        for &task in tasks {
            if !self.tasks.contains(&task) {
                self.tasks.push(task);
            }
        }
    }

    fn add(&mut self, action: &WatchAction) {
        match action {
            WatchAction::Reload => self.reload_always = true,
            WatchAction::RunTasks(tasks) => self.add_tasks(tasks),
            WatchAction::RunThenReload(tasks) => {
                self.add_tasks(tasks);
                self.reload_on_success = true;
            }
        }
    }
}

/// Build the plan for changed paths, each relative to the source directory.
pub fn plan_for(rules: &[WatchRule], changed: &[PathBuf]) -> WatchPlan {
    let mut plan = WatchPlan::default();
    for path in changed {
        for rule in rules.iter().filter(|rule| rule.set.matches(path)) {
            plan.add(&rule.action);
        }
    }
    plan
}

/// Clear the terminal screen
fn clear_screen() {
    // ANSI escape code to clear screen and move cursor to top-left
    print!("\x1B[2J\x1B[1;1H");
}

/// Format duration for display
fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis < 1000 {
        format!("{}ms", millis)
    } else {
        format!("{:.2}s", duration.as_secs_f64())
    }
}

/// Get current timestamp for logging
fn timestamp() -> String {
    use std::time::SystemTime;
    let now = SystemTime::now().duration_since(SystemTime::UNIX_EPOCH).unwrap_or_default();
    let secs = now.as_secs() % 86400; // seconds since midnight
    let hours = (secs / 3600) % 24;
    let minutes = (secs / 60) % 60;
    let seconds = secs % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}

/// Watches the source tree of one dev session.
pub struct WatchSession<'a> {
    context: &'a BuildContext,
    graph: &'a TaskGraph,
    reporter: &'a dyn ProgressReporter,
    rules: Vec<WatchRule>,
    root: PathBuf,
}

impl<'a> WatchSession<'a> {
    /// Prepare a session over the context's source directory.
    pub fn new(
        context: &'a BuildContext,
        graph: &'a TaskGraph,
        reporter: &'a dyn ProgressReporter,
    ) -> Result<Self, WatchError> {
        let src = &context.paths().base.src;
        // Events carry canonical paths on some platforms
        let root = src.canonicalize().map_err(|_| WatchError::SourceNotFound(src.clone()))?;
        Ok(Self { context, graph, reporter, rules: dev_rules(context)?, root })
    }

    /// Directory being watched.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Plan the work for absolute changed paths.
    pub fn plan(&self, changed: &[PathBuf]) -> WatchPlan {
        let relative: Vec<PathBuf> = changed
            .iter()
            .filter_map(|path| {
                path.strip_prefix(&self.root)
                    .or_else(|_| path.strip_prefix(&self.context.paths().base.src))
                    .ok()
                    .map(Path::to_path_buf)
            })
            .collect();
        plan_for(&self.rules, &relative)
    }

    /// Run the plan's tasks and reload as it asks.
    ///
    /// Task failures are logged; the return value says whether the tasks
    /// succeeded.
    pub fn dispatch(&self, plan: &WatchPlan, reload: &dyn Fn()) -> bool {
        let mut success = true;
        if !plan.tasks.is_empty() {
            let names: Vec<&str> = plan.tasks.iter().map(|t| t.name()).collect();
            println!("[{}] Running {}...", timestamp(), names.join(", "));
            let start = Instant::now();
            match Runner::new(self.graph, self.reporter).run(&plan.tasks, self.context) {
                Ok(_) => {
                    println!("[{}] Finished ({})", timestamp(), format_duration(start.elapsed()))
                }
                Err(RunError::TaskFailed { .. }) => {
                    println!("[{}] Failed ({})", timestamp(), format_duration(start.elapsed()));
                    success = false;
                }
                Err(e) => {
                    eprintln!("[{}] Error: {}", timestamp(), e);
                    success = false;
                }
            }
        }
        if plan.reload_always || (plan.reload_on_success && success) {
            reload();
        }
        success
    }

    /// Watch until `stop` returns true.
    ///
    /// Watch errors are logged and watching continues.
    pub fn run(&self, reload: &dyn Fn(), stop: &dyn Fn() -> bool) -> Result<(), WatchError> {
        let (tx, rx) = channel();
        let debounce = Duration::from_millis(u64::from(self.context.config().watch.debounce_ms));
        let mut debouncer = new_debouncer(debounce, tx).map_err(WatchError::WatcherInit)?;
        debouncer.watcher().watch(&self.root, RecursiveMode::Recursive).map_err(WatchError::WatchPath)?;

        println!("[{}] Watching {} for changes...", timestamp(), self.root.display());

        while !stop() {
            match rx.recv_timeout(POLL_INTERVAL) {
                Ok(Ok(events)) => {
                    let changed: Vec<PathBuf> = events
                        .into_iter()
                        .filter(|e| matches!(e.kind, DebouncedEventKind::Any))
                        .map(|e| e.path)
                        .collect();
                    let plan = self.plan(&changed);
                    if plan.is_empty() {
                        continue;
                    }

                    if self.context.config().watch.clear_screen {
                        clear_screen();
                    }
                    for path in &changed {
                        if let Some(name) = path.file_name() {
                            println!("[{}] Changed: {}", timestamp(), name.to_string_lossy());
                        }
                    }
                    self.dispatch(&plan, reload);
                }
                Ok(Err(error)) => {
                    eprintln!("[{}] Watch error: {:?}", timestamp(), error);
                    eprintln!("[{}] Continuing to watch...", timestamp());
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(WatchError::ChannelError("watcher disconnected".to_string()));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::NullProgress;
    use crate::config::default_config;
    use crate::tasks::default_graph;
    use std::cell::Cell;
    use std::fs;
    use tempfile::TempDir;

    fn rules() -> Vec<WatchRule> {
        let ctx = BuildContext::new(default_config(), PathBuf::from("/site"));
        dev_rules(&ctx).unwrap()
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(50)), "50ms");
        assert_eq!(format_duration(Duration::from_millis(999)), "999ms");
        assert_eq!(format_duration(Duration::from_millis(1000)), "1.00s");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
    }

    #[test]
    fn test_timestamp_format() {
        let ts = timestamp();
        assert_eq!(ts.len(), 8);
        assert_eq!(ts.matches(':').count(), 2);
    }

    #[test]
    fn test_template_change_reloads() {
        let plan = plan_for(&rules(), &[PathBuf::from("index.php"), PathBuf::from("views/page.php")]);
        assert!(plan.reload_always);
        assert!(plan.tasks.is_empty());
    }

    #[test]
    fn test_script_change_runs_lint_and_scripts() {
        let plan = plan_for(&rules(), &[PathBuf::from("scripts/plugins/menu.js")]);
        assert_eq!(plan.tasks, vec![TaskId::Lint, TaskId::Scripts]);
        assert!(!plan.reload_always);
        assert!(!plan.reload_on_success);
    }

    #[test]
    fn test_style_change_runs_styles_then_reloads() {
        let plan = plan_for(&rules(), &[PathBuf::from("styles/_base.scss"), PathBuf::from("styles/main.scss")]);
        assert_eq!(plan.tasks, vec![TaskId::Styles]);
        assert!(plan.reload_on_success);
        assert!(!plan.reload_always);
    }

    #[test]
    fn test_image_change_reloads() {
        let plan = plan_for(&rules(), &[PathBuf::from("images/icons/logo.svg")]);
        assert!(plan.reload_always);
        assert!(plan_for(&rules(), &[PathBuf::from("images/notes.txt")]).is_empty());
    }

    #[test]
    fn test_unwatched_change_is_ignored() {
        assert!(plan_for(&rules(), &[PathBuf::from("README.md"), PathBuf::from("styles/notes.css")]).is_empty());
    }

    #[test]
    fn test_session_requires_source_dir() {
        let temp = TempDir::new().unwrap();
        let ctx = BuildContext::new(default_config(), temp.path().to_path_buf());
        let graph = default_graph();
        let result = WatchSession::new(&ctx, &graph, &NullProgress);
        assert!(matches!(result, Err(WatchError::SourceNotFound(_))));
    }

    #[test]
    fn test_dispatch_runs_styles_and_reloads() {
        let temp = TempDir::new().unwrap();
        let styles = temp.path().join("app/styles");
        fs::create_dir_all(&styles).unwrap();
        fs::write(styles.join("main.scss"), ".a { .b { color: red; } }\n").unwrap();

        let ctx = BuildContext::new(default_config(), temp.path().to_path_buf()).with_dev_session(true);
        let graph = default_graph();
        let session = WatchSession::new(&ctx, &graph, &NullProgress).unwrap();

        let plan = session.plan(&[session.root().join("styles/main.scss")]);
        let reloads = Cell::new(0);
        assert!(session.dispatch(&plan, &|| reloads.set(reloads.get() + 1)));
        assert_eq!(reloads.get(), 1);
        assert!(temp.path().join(".tmp/styles/main.min.css").exists());
    }

    #[test]
    fn test_dispatch_failure_skips_reload() {
        let temp = TempDir::new().unwrap();
        let styles = temp.path().join("app/styles");
        fs::create_dir_all(&styles).unwrap();
        fs::write(styles.join("main.scss"), ".a { color: $missing; }\n").unwrap();

        let ctx = BuildContext::new(default_config(), temp.path().to_path_buf()).with_dev_session(true);
        let graph = default_graph();
        let session = WatchSession::new(&ctx, &graph, &NullProgress).unwrap();

        let plan = session.plan(&[session.root().join("styles/main.scss")]);
        let reloads = Cell::new(0);
        assert!(!session.dispatch(&plan, &|| reloads.set(reloads.get() + 1)));
        assert_eq!(reloads.get(), 0);
    }
}
