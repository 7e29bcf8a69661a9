//! `styles` task: SCSS to CSS.

use super::{TaskEnv, TaskError};
use crate::build::{
    discover_files, newest_modified, read_sources, write_files, FileRecord, GlobSet, Newer, Pipeline,
    TaskOutput, TransformError,
};
use crate::sourcemap::CommentStyle;
use crate::transforms::css::{browser_targets, CssMinify, GlobImports, SassCompile};
use crate::transforms::inline::InlineAssets;
use crate::transforms::{with_suffix, Rename, SourceMapInit, SourceMapWrite};
use std::path::{Path, PathBuf};

/// Partials (`_name.scss`) are only compiled through imports.
fn is_partial(path: &Path) -> bool {
    path.file_name().and_then(|n| n.to_str()).is_some_and(|n| n.starts_with('_'))
}

/// Output path of a stylesheet below `out_dir`.
fn output_path(out_dir: &Path, file: &FileRecord, suffix: &str) -> PathBuf {
    out_dir.join(with_suffix(&file.relative.with_extension("css"), suffix))
}

/// Compile every non-partial stylesheet.
///
/// Development output keeps the configured formatting and an inline source
/// map and goes to the temporary directory. Production output is minified
/// and goes to the destination directory.
pub fn run(env: &TaskEnv<'_>) -> Result<TaskOutput, TaskError> {
    let context = env.context;
    let config = &context.config().styles;
    let triple = &context.paths().styles;
    let out_dir = context.output_dir(triple);
    let production = !context.mode().is_development();

    let all = discover_files(&triple.src, &GlobSet::including(&["**/*.scss".to_string()])?)?;
    let entries: Vec<PathBuf> = all.iter().filter(|p| !is_partial(p)).cloned().collect();
    let sources = read_sources(&triple.src, &entries)?;
    let total = sources.len();

    let browsers = browser_targets(&config.browsers)
        .map_err(|e| TransformError::new("autoprefixer", &triple.src, e.to_string()))?;

    let target_dir = out_dir.clone();
    let suffix = config.suffix.clone();
    let newer = Newer::per_file(move |file| output_path(&target_dir, file, &suffix))
        .with_dependencies_modified(newest_modified(&all));

    let pipeline = Pipeline::new()
        .pipe_if(!context.is_forced(), newer)
        .pipe(SourceMapInit)
        .pipe(GlobImports)
        .pipe(SassCompile::new(config.output_style))
        .pipe(InlineAssets::new(&config.inline_extensions, &context.paths().base.src))
        .pipe_if(production, CssMinify::new(browsers, config.keep_first_comment))
        .pipe_if(!production, SourceMapWrite::inline(CommentStyle::Css))
        .pipe(Rename::suffix(config.suffix.as_str()));
    if env.reporter.is_verbose() {
        tracing::info!(steps = ?pipeline.step_names(), out_dir = %out_dir.display(), "styles pipeline");
    }

    let files = pipeline.run(sources)?;
    let written = write_files(&files, &out_dir)?;

    env.notify("Styles task complete.");
    Ok(TaskOutput::written(written).with_up_to_date(total - files.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::{BuildContext, Mode, NullProgress};
    use crate::config::default_config;
    use crate::tasks::{TaskGraph, TaskId};
    use std::fs;
    use tempfile::TempDir;

    fn project() -> TempDir {
        let temp = TempDir::new().unwrap();
        let styles = temp.path().join("app/styles");
        fs::create_dir_all(styles.join("components")).unwrap();
        fs::create_dir_all(temp.path().join("app/images")).unwrap();
        fs::write(temp.path().join("app/images/dot.gif"), [0x47u8, 0x49, 0x46]).unwrap();
        fs::write(styles.join("_vars.scss"), "$brand: #ff0000;\n").unwrap();
        fs::write(styles.join("components/_button.scss"), ".button { color: $brand; }\n").unwrap();
        fs::write(
            styles.join("main.scss"),
            "/* Theme */\n@import \"vars\";\n@import \"components/*\";\n\
             .logo { background: url(../images/dot.gif); }\n.box { display: flex; }\n",
        )
        .unwrap();
        temp
    }

    fn styles(root: &Path, mode: Mode) -> TaskOutput {
        let ctx = BuildContext::new(default_config(), root.to_path_buf()).with_mode(mode);
        let graph = TaskGraph::new();
        run(&TaskEnv { task: TaskId::Styles, context: &ctx, graph: &graph, reporter: &NullProgress }).unwrap()
    }

    #[test]
    fn test_development_output() {
        let temp = project();
        let output = styles(temp.path(), Mode::Development);

        let path = temp.path().join(".tmp/styles/main.min.css");
        assert_eq!(output.outputs, vec![path.clone()]);
        let css = fs::read_to_string(path).unwrap();
        assert!(css.contains(".button {\n  color: #ff0000;\n}"));
        assert!(css.contains("data:image/gif;base64,R0lG"));
        assert!(css.contains("/*# sourceMappingURL=data:application/json;charset=utf8;base64,"));
        assert!(!temp.path().join(".tmp/styles/_vars.min.css").exists());
    }

    #[test]
    fn test_production_output() {
        let temp = project();
        styles(temp.path(), Mode::Production);

        let css = fs::read_to_string(temp.path().join("public/styles/main.min.css")).unwrap();
        assert!(css.starts_with("/* Theme */"));
        assert!(css.contains(".button{color:red}"));
        assert!(css.contains("display:-ms-flexbox"));
        assert!(!css.contains("sourceMappingURL"));
        assert!(!temp.path().join(".tmp").exists());
    }

    #[test]
    fn test_partial_change_triggers_rebuild() {
        let temp = project();
        styles(temp.path(), Mode::Development);
        assert_eq!(styles(temp.path(), Mode::Development).up_to_date, 1);

        let partial = temp.path().join("app/styles/_vars.scss");
        let future = std::time::SystemTime::now() + std::time::Duration::from_secs(60);
        fs::File::options().write(true).open(&partial).unwrap().set_modified(future).unwrap();

        let rebuilt = styles(temp.path(), Mode::Development);
        assert_eq!(rebuilt.outputs.len(), 1);
    }

    #[test]
    fn test_compile_error_names_step() {
        let temp = project();
        fs::write(temp.path().join("app/styles/broken.scss"), ".a { color: $missing; }\n").unwrap();

        let ctx = BuildContext::new(default_config(), temp.path().to_path_buf());
        let graph = TaskGraph::new();
        let err = run(&TaskEnv { task: TaskId::Styles, context: &ctx, graph: &graph, reporter: &NullProgress })
            .unwrap_err();
        assert!(err.to_string().starts_with("sass:"));
    }
}
