//! Build pipeline module for assetflow
//!
//! Provides the building blocks every task is assembled from.
//!
//! # Overview
//!
//! - **Context**: configuration, resolved directories and the build [`Mode`]
//! - **Discovery**: find source files using glob patterns from config
//! - **Pipeline**: pass [`FileRecord`]s through ordered [`Transform`] steps
//! - **Incremental**: drop records whose outputs are already up to date
//! - **Progress / Result**: report what each task did
//!
//! # Example
//!
//! ```ignore
//! use assetflow::build::{read_sources, write_files, BuildContext, Mode, Pipeline};
//! use assetflow::config::load_config;
//!
//! let config = load_config(None)?;
//! let context = BuildContext::new(config, project_root).with_mode(Mode::Production);
//! let files = read_sources(&src, &paths)?;
//! let written = write_files(&pipeline.run(files)?, &context.output_dir(&triple))?;
//! ```

pub mod context;
pub mod discovery;
pub mod incremental;
pub mod pipeline;
pub mod progress;
pub mod result;

pub use context::*;
pub use discovery::*;
pub use incremental::*;
pub use pipeline::*;
pub use progress::*;
pub use result::*;
