//! `copy` task: static files from the source root to the output root.

use super::{TaskEnv, TaskError};
use crate::build::{discover_files, read_sources, write_files, GlobSet, Newer, Pipeline, TaskOutput};

/// Copy every file matched by the copy include/exclude lists to the
/// production output directory.
///
/// Files whose destination is not older than the source are skipped.
pub fn run(env: &TaskEnv<'_>) -> Result<TaskOutput, TaskError> {
    let context = env.context;
    let config = &context.config().copy;
    let base = &context.paths().base;

    let set = GlobSet::new(&config.include, &config.exclude, config.dot)?;
    let paths = discover_files(&base.src, &set)?;
    let sources = read_sources(&base.src, &paths)?;
    let total = sources.len();

    let pipeline = Pipeline::new().pipe_if(!context.is_forced(), Newer::into_dir(base.dest.clone()));
    let files = pipeline.run(sources)?;
    let written = write_files(&files, &base.dest)?;

    tracing::debug!(copied = written.len(), total, "copy finished");
    env.notify("Copy task complete.");
    Ok(TaskOutput::written(written).with_up_to_date(total - files.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::{BuildContext, NullProgress};
    use crate::config::default_config;
    use crate::tasks::{TaskGraph, TaskId};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, rel).unwrap();
    }

    fn copy(root: &Path) -> TaskOutput {
        let ctx = BuildContext::new(default_config(), root.to_path_buf());
        let graph = TaskGraph::new();
        run(&TaskEnv { task: TaskId::Copy, context: &ctx, graph: &graph, reporter: &NullProgress }).unwrap()
    }

    #[test]
    fn test_copy_respects_exclusions() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        for rel in [
            "app/index.php",
            "app/.htaccess",
            "app/.gitignore",
            "app/includes/header.php",
            "app/includes/cache/page.html",
            "app/styles/main.scss",
            "app/scripts/app.js",
            "app/images/logo.png",
            "app/fonts/a.woff",
        ] {
            write(root, rel);
        }

        let output = copy(root);
        assert_eq!(output.outputs.len(), 4);

        let public = root.join("public");
        assert!(public.join("index.php").exists());
        assert!(public.join(".htaccess").exists());
        assert!(public.join("includes/header.php").exists());
        assert!(public.join("fonts/a.woff").exists());
        assert!(!public.join(".gitignore").exists());
        assert!(!public.join("includes/cache").exists());
        assert!(!public.join("styles").exists());
        assert!(!public.join("scripts").exists());
        assert!(!public.join("images").exists());
    }

    #[test]
    fn test_copy_skips_up_to_date_files() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "app/index.php");

        assert_eq!(copy(temp.path()).outputs.len(), 1);

        let second = copy(temp.path());
        assert!(second.outputs.is_empty());
        assert_eq!(second.up_to_date, 1);
    }
}
