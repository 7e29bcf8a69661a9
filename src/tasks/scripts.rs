//! `scripts` task: ordered concatenation into one bundle.

use super::{TaskEnv, TaskError};
use crate::build::{discover_ordered, read_sources, write_files, Newer, Pipeline, TaskOutput};
use crate::sourcemap::CommentStyle;
use crate::transforms::js::{JsMinify, StripDebug};
use crate::transforms::{with_suffix, Concat, Rename, SourceMapInit, SourceMapWrite};
use std::path::Path;

/// Concatenate the configured script sequence into a single bundle.
///
/// Production strips debug statements (when enabled) and minifies.
/// Development appends an inline source map covering every input.
pub fn run(env: &TaskEnv<'_>) -> Result<TaskOutput, TaskError> {
    let context = env.context;
    let config = &context.config().scripts;
    let triple = &context.paths().scripts;
    let out_dir = context.output_dir(triple);
    let production = !context.mode().is_development();

    let paths = discover_ordered(&triple.src, &config.sequence)?;
    if paths.is_empty() {
        env.warn(format!("No scripts matched {:?}", config.sequence));
        return Ok(TaskOutput::default());
    }
    let sources = read_sources(&triple.src, &paths)?;
    let total = sources.len();

    let bundle = with_suffix(Path::new(&config.output), &config.suffix);
    let pipeline = Pipeline::new()
        .pipe_if(!context.is_forced(), Newer::combined(out_dir.join(&bundle)))
        .pipe(SourceMapInit)
        .pipe(Concat::into_file(&config.output))
        .pipe_if(production && config.strip_debug, StripDebug)
        .pipe(Rename::suffix(config.suffix.as_str()))
        .pipe_if(production, JsMinify)
        .pipe_if(!production, SourceMapWrite::inline(CommentStyle::Js));

    let files = pipeline.run(sources)?;
    if files.is_empty() {
        tracing::debug!(bundle = %bundle.display(), "scripts up to date");
        return Ok(TaskOutput::default().with_up_to_date(total));
    }
    let written = write_files(&files, &out_dir)?;

    env.notify("Scripts task complete.");
    Ok(TaskOutput::written(written))
}
