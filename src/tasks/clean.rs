//! `cache` and `clean` tasks.

use super::{TaskEnv, TaskError};
use crate::build::TaskOutput;
use crate::cache::ImageCache;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

/// Delete the image optimizer cache.
pub fn clear_cache(env: &TaskEnv<'_>) -> Result<TaskOutput, TaskError> {
    let dir = env.context.cache_dir();
    if ImageCache::clear(&dir)? {
        tracing::debug!(dir = %dir.display(), "cleared image cache");
    }
    Ok(TaskOutput::default())
}

/// Delete the production and development output directories.
///
/// Directories that do not exist are skipped.
pub fn run(env: &TaskEnv<'_>) -> Result<TaskOutput, TaskError> {
    let base = &env.context.paths().base;
    for dir in [&base.dest, &base.tmp] {
        remove_dir(dir)?;
    }
    Ok(TaskOutput::default())
}

fn remove_dir(dir: &Path) -> Result<(), TaskError> {
    match fs::remove_dir_all(dir) {
        Ok(()) => {
            tracing::debug!(dir = %dir.display(), "removed");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(TaskError::io(dir, e)),
    }
}
