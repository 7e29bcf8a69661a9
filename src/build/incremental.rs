//! Incremental build support.
//!
//! Skips work whose output is already up to date. A destination is up to
//! date when it exists and its modification time is not older than the
//! newest input that contributes to it.
//!
//! # How It Works
//!
//! The [`Newer`] step runs first in a pipeline:
//!
//! 1. Map each record (or the whole set) to the output path it produces
//! 2. Compare the output's modification time with the inputs'
//! 3. Drop records whose output is up to date
//!
//! Extra dependencies (for example SCSS partials, which are never outputs
//! themselves) can be folded into the comparison.

use crate::build::pipeline::{FileRecord, Transform, TransformError};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

type TargetFn = Box<dyn Fn(&FileRecord) -> PathBuf + Send + Sync>;

enum Target {
    /// Every record maps to its own output
    PerFile(TargetFn),
    /// All records feed a single output; either all pass or none do
    Combined(PathBuf),
}

/// Pipeline step that drops records with up-to-date outputs.
pub struct Newer {
    target: Target,
    dependencies_modified: Option<SystemTime>,
}

impl Newer {
    /// Compare each record against the output path produced by `target`.
    pub fn per_file<F>(target: F) -> Self
    where
        F: Fn(&FileRecord) -> PathBuf + Send + Sync + 'static,
    {
        Self { target: Target::PerFile(Box::new(target)), dependencies_modified: None }
    }

    /// Compare each record against the same relative path below `dir`.
    pub fn into_dir(dir: PathBuf) -> Self {
        Self::per_file(move |file| dir.join(&file.relative))
    }

    /// Compare the whole set against one output file.
    pub fn combined(output: PathBuf) -> Self {
        Self { target: Target::Combined(output), dependencies_modified: None }
    }

    /// Treat `modified` as an additional input time for every output.
    pub fn with_dependencies_modified(mut self, modified: Option<SystemTime>) -> Self {
        self.dependencies_modified = modified;
        self
    }

    fn input_time(&self, own: Option<SystemTime>) -> Option<SystemTime> {
        match (own, self.dependencies_modified) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }
}

impl Transform for Newer {
    fn name(&self) -> &'static str {
        "newer"
    }

    fn apply(&self, files: Vec<FileRecord>) -> Result<Vec<FileRecord>, TransformError> {
        match &self.target {
            Target::PerFile(target) => Ok(files
                .into_iter()
                .filter(|file| {
                    let stale = !is_up_to_date(self.input_time(file.modified), &target(file));
                    if !stale {
                        tracing::debug!(file = %file.relative.display(), "up to date");
                    }
                    stale
                })
                .collect()),
            Target::Combined(output) => {
                let newest = newest_of(files.iter().map(|f| f.modified));
                if is_up_to_date(self.input_time(newest), output) {
                    tracing::debug!(output = %output.display(), "up to date");
                    Ok(vec![])
                } else {
                    Ok(files)
                }
            }
        }
    }
}

/// Whether `dest` exists and is not older than `input`.
///
/// Unknown input times are treated as stale.
pub fn is_up_to_date(input: Option<SystemTime>, dest: &Path) -> bool {
    let Some(input) = input else {
        return false;
    };
    match fs::metadata(dest).and_then(|m| m.modified()) {
        Ok(dest_time) => dest_time >= input,
        Err(_) => false,
    }
}

/// Newest modification time among `paths`.
pub fn newest_modified(paths: &[PathBuf]) -> Option<SystemTime> {
    newest_of(paths.iter().map(|p| fs::metadata(p).and_then(|m| m.modified()).ok()))
}

fn newest_of(times: impl Iterator<Item = Option<SystemTime>>) -> Option<SystemTime> {
    times.flatten().max()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn record_at(relative: &str, modified: SystemTime) -> FileRecord {
        let mut f = FileRecord::new("/src", relative, vec![]);
        f.modified = Some(modified);
        f
    }

    fn file_modified(path: &Path) -> SystemTime {
        fs::metadata(path).unwrap().modified().unwrap()
    }

    #[test]
    fn test_is_up_to_date() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("out.css");
        assert!(!is_up_to_date(Some(SystemTime::now()), &dest));

        fs::write(&dest, "x").unwrap();
        let written = file_modified(&dest);
        assert!(is_up_to_date(Some(written), &dest));
        assert!(is_up_to_date(Some(written - Duration::from_secs(60)), &dest));
        assert!(!is_up_to_date(Some(written + Duration::from_secs(60)), &dest));
        assert!(!is_up_to_date(None, &dest));
    }

    #[test]
    fn test_newer_per_file() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("old.txt"), "x").unwrap();
        let dest_time = file_modified(&temp.path().join("old.txt"));

        let files = vec![
            record_at("old.txt", dest_time - Duration::from_secs(60)),
            record_at("new.txt", dest_time),
        ];
        let out = Newer::into_dir(temp.path().to_path_buf()).apply(files).unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].relative, PathBuf::from("new.txt"));
    }

    #[test]
    fn test_newer_combined_all_or_nothing() {
        let temp = TempDir::new().unwrap();
        let output = temp.path().join("app.min.js");
        fs::write(&output, "x").unwrap();
        let dest_time = file_modified(&output);

        let stale = vec![
            record_at("a.js", dest_time - Duration::from_secs(60)),
            record_at("b.js", dest_time + Duration::from_secs(60)),
        ];
        assert_eq!(Newer::combined(output.clone()).apply(stale).unwrap().len(), 2);

        let fresh = vec![
            record_at("a.js", dest_time - Duration::from_secs(60)),
            record_at("b.js", dest_time - Duration::from_secs(30)),
        ];
        assert!(Newer::combined(output).apply(fresh).unwrap().is_empty());
    }

    #[test]
    fn test_newer_dependency_time_forces_rebuild() {
        let temp = TempDir::new().unwrap();
        let output = temp.path().join("main.min.css");
        fs::write(&output, "x").unwrap();
        let dest_time = file_modified(&output);

        let files = vec![record_at("main.scss", dest_time - Duration::from_secs(60))];
        let step = Newer::per_file(move |_| output.clone())
            .with_dependencies_modified(Some(dest_time + Duration::from_secs(60)));

        assert_eq!(step.apply(files).unwrap().len(), 1);
    }

    #[test]
    fn test_newest_modified() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a");
        fs::write(&a, "x").unwrap();

        assert_eq!(newest_modified(&[a.clone(), temp.path().join("missing")]), Some(file_modified(&a)));
        assert_eq!(newest_modified(&[]), None);
    }
}
