//! File pipelines.
//!
//! A pipeline reads a set of source files into [`FileRecord`]s, passes them
//! through an ordered list of [`Transform`] steps and writes the survivors to
//! an output directory. Steps may rewrite contents, rename files, merge
//! several records into one or drop records entirely.

use crate::sourcemap::SourceMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// A failed pipeline step.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{step}: {}: {message}", path.display())]
pub struct TransformError {
    /// Name of the step that failed
    pub step: &'static str,
    /// File being processed
    pub path: PathBuf,
    /// Failure description
    pub message: String,
}

impl TransformError {
    /// Create a new transform error.
    pub fn new(step: &'static str, path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self { step, path: path.into(), message: message.into() }
    }
}

/// A file travelling through a pipeline.
#[derive(Debug, Clone)]
pub struct FileRecord {
    /// Directory the relative path is resolved against
    pub base: PathBuf,
    /// Path relative to `base`; this is the path used when writing output
    pub relative: PathBuf,
    /// Current contents
    pub contents: Vec<u8>,
    /// Source map, once tracking has started
    pub source_map: Option<SourceMap>,
    /// Modification time of the source file(s)
    pub modified: Option<SystemTime>,
}

impl FileRecord {
    /// Create an in-memory record.
    pub fn new(base: impl Into<PathBuf>, relative: impl Into<PathBuf>, contents: Vec<u8>) -> Self {
        Self {
            base: base.into(),
            relative: relative.into(),
            contents,
            source_map: None,
            modified: None,
        }
    }

    /// Read `path` from disk as a record relative to `base`.
    pub fn read(base: &Path, path: &Path) -> std::io::Result<Self> {
        let contents = fs::read(path)?;
        let modified = fs::metadata(path).and_then(|m| m.modified()).ok();
        let relative = path.strip_prefix(base).unwrap_or(path).to_path_buf();
        Ok(Self { modified, ..Self::new(base, relative, contents) })
    }

    /// Full path of the record (base joined with relative path).
    pub fn path(&self) -> PathBuf {
        self.base.join(&self.relative)
    }

    /// Contents as UTF-8 text.
    pub fn text(&self, step: &'static str) -> Result<&str, TransformError> {
        std::str::from_utf8(&self.contents)
            .map_err(|e| TransformError::new(step, self.path(), format!("not valid UTF-8: {}", e)))
    }

    /// Replace the contents with text.
    pub fn set_text(&mut self, text: String) {
        self.contents = text.into_bytes();
    }

    /// Change the extension of the relative path.
    pub fn set_extension(&mut self, extension: &str) {
        self.relative.set_extension(extension);
    }

    /// File name of the relative path.
    pub fn file_name(&self) -> String {
        self.relative.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
    }
}

/// A single pipeline step.
pub trait Transform: Send + Sync {
    /// Short step name used in errors and verbose output.
    fn name(&self) -> &'static str;

    /// Apply the step to every record.
    fn apply(&self, files: Vec<FileRecord>) -> Result<Vec<FileRecord>, TransformError>;
}

/// Ordered list of transform steps.
pub struct Pipeline {
    steps: Vec<Box<dyn Transform>>,
}

impl Pipeline {
    /// Create an empty pipeline.
    pub fn new() -> Self {
        Self { steps: vec![] }
    }

    /// Append a step.
    pub fn pipe<T: Transform + 'static>(mut self, step: T) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    /// Append a step only when `condition` holds.
    pub fn pipe_if<T: Transform + 'static>(self, condition: bool, step: T) -> Self {
        if condition {
            self.pipe(step)
        } else {
            self
        }
    }

    /// Names of the steps, in order.
    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Run every step in order.
    ///
    /// An empty record list short-circuits the remaining steps.
    pub fn run(&self, mut files: Vec<FileRecord>) -> Result<Vec<FileRecord>, TransformError> {
        for step in &self.steps {
            if files.is_empty() {
                break;
            }
            tracing::trace!(step = step.name(), files = files.len(), "applying step");
            files = step.apply(files)?;
        }
        Ok(files)
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Read every path into a record relative to `base`.
pub fn read_sources(base: &Path, paths: &[PathBuf]) -> Result<Vec<FileRecord>, TransformError> {
    paths
        .iter()
        .map(|path| {
            FileRecord::read(base, path).map_err(|e| TransformError::new("src", path, e.to_string()))
        })
        .collect()
}

/// Write records below `out_dir`, creating directories as needed.
///
/// Returns the written paths.
pub fn write_files(files: &[FileRecord], out_dir: &Path) -> Result<Vec<PathBuf>, TransformError> {
    let mut written = Vec::with_capacity(files.len());
    for file in files {
        let target = out_dir.join(&file.relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| TransformError::new("dest", parent, e.to_string()))?;
        }
        fs::write(&target, &file.contents)
            .map_err(|e| TransformError::new("dest", &target, e.to_string()))?;
        written.push(target);
    }
    Ok(written)
}

/// Apply a fallible function to each record.
pub fn each<F>(files: Vec<FileRecord>, mut f: F) -> Result<Vec<FileRecord>, TransformError>
where
    F: FnMut(FileRecord) -> Result<FileRecord, TransformError>,
{
    files.into_iter().map(&mut f).collect()
}
