//! Per-asset directory resolution.

use std::path::{Path, PathBuf};

use super::schema::ProjectConfig;

/// Temporary, source and destination directories of one asset category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTriple {
    /// Development output
    pub tmp: PathBuf,
    /// Sources
    pub src: PathBuf,
    /// Production output
    pub dest: PathBuf,
}

impl PathTriple {
    /// Join `name` onto each base directory.
    pub fn new(base: &BaseDirs, name: &str) -> Self {
        Self { tmp: base.tmp.join(name), src: base.src.join(name), dest: base.dest.join(name) }
    }
}

/// Base directories every triple derives from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseDirs {
    pub tmp: PathBuf,
    pub src: PathBuf,
    pub dest: PathBuf,
}

/// Resolved directories for the whole project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetPaths {
    pub base: BaseDirs,
    pub images: PathTriple,
    pub styles: PathTriple,
    pub scripts: PathTriple,
}

impl AssetPaths {
    /// Resolve the layout of `project` against `root`.
    ///
    /// Absolute directories in the config are kept as they are.
    pub fn resolve(project: &ProjectConfig, root: &Path) -> Self {
        let resolve = |p: &Path| if p.is_absolute() { p.to_path_buf() } else { root.join(p) };
        let base = BaseDirs {
            tmp: resolve(&project.tmp),
            src: resolve(&project.src),
            dest: resolve(&project.dest),
        };

        Self {
            images: PathTriple::new(&base, "images"),
            styles: PathTriple::new(&base, "styles"),
            scripts: PathTriple::new(&base, "scripts"),
            base,
        }
    }
}
