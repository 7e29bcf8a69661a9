//! Build context containing configuration and state for a task run.

use crate::config::{AssetConfig, AssetPaths, PathTriple};
use std::path::{Path, PathBuf};

/// Build mode.
///
/// Development writes unminified output with inline source maps to the
/// temporary directory; production writes minified output to the
/// destination directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Mode {
    #[default]
    Development,
    Production,
}

impl Mode {
    /// Whether this is development mode.
    pub fn is_development(self) -> bool {
        matches!(self, Mode::Development)
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Development => write!(f, "development"),
            Mode::Production => write!(f, "production"),
        }
    }
}

/// Build context containing configuration and paths for a task run.
///
/// The context is passed by reference into every task. It is cheap to clone,
/// and sequence bodies that switch mode clone it with [`BuildContext::with_mode`]
/// instead of mutating shared state.
#[derive(Debug, Clone)]
pub struct BuildContext {
    /// The loaded configuration
    config: AssetConfig,
    /// Project root directory (where assetflow.toml is located)
    project_root: PathBuf,
    /// Resolved asset directories
    paths: AssetPaths,
    /// Current build mode
    mode: Mode,
    /// Whether a live dev server session is running
    dev_session: bool,
    /// Whether to ignore up-to-date checks
    force: bool,
    /// Whether to run in verbose mode
    verbose: bool,
}

impl BuildContext {
    /// Create a new build context in development mode.
    pub fn new(config: AssetConfig, project_root: PathBuf) -> Self {
        let paths = AssetPaths::resolve(&config.project, &project_root);
        Self {
            config,
            project_root,
            paths,
            mode: Mode::Development,
            dev_session: false,
            force: false,
            verbose: false,
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &AssetConfig {
        &self.config
    }

    /// Get the project root directory.
    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Get the resolved asset directories.
    pub fn paths(&self) -> &AssetPaths {
        &self.paths
    }

    /// Current build mode.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Whether a live dev server session is running.
    pub fn in_dev_session(&self) -> bool {
        self.dev_session
    }

    /// Whether up-to-date checks are bypassed.
    pub fn is_forced(&self) -> bool {
        self.force
    }

    /// Whether verbose mode is enabled.
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Set the build mode.
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Mark the context as belonging to a live dev server session.
    pub fn with_dev_session(mut self, active: bool) -> Self {
        self.dev_session = active;
        self
    }

    /// Set force mode.
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Set verbose mode.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Output directory of an asset category for the current mode.
    pub fn output_dir(&self, triple: &PathTriple) -> PathBuf {
        match self.mode {
            Mode::Development => triple.tmp.clone(),
            Mode::Production => triple.dest.clone(),
        }
    }

    /// Resolve a path relative to the project root.
    ///
    /// If the path is absolute, returns it unchanged.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }

    /// Location of the image optimizer cache.
    pub fn cache_dir(&self) -> PathBuf {
        self.resolve_path(&self.config.images.cache_dir)
    }
}
