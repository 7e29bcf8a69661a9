//! `images` task: optimize images through the content cache.

use super::{TaskEnv, TaskError};
use crate::build::{
    discover_files, read_sources, relative_str, write_files, FileRecord, GlobSet, TaskOutput, TransformError,
};
use crate::cache::ImageCache;
use crate::optimize::Optimizer;
use rayon::prelude::*;

struct Optimized {
    file: FileRecord,
    key: String,
    original_size: u64,
    cached: bool,
}

/// Optimize every image below the images source directory into the
/// production images directory.
///
/// Images are processed in parallel. Results are looked up in and stored to
/// the image cache, so unchanged images are never optimized twice. The
/// number of cache hits is reported as the up-to-date count.
pub fn run(env: &TaskEnv<'_>) -> Result<TaskOutput, TaskError> {
    let context = env.context;
    let config = &context.config().images;
    let triple = &context.paths().images;

    let patterns: Vec<String> = config.extensions.iter().map(|ext| format!("**/*.{}", ext)).collect();
    let paths = discover_files(&triple.src, &GlobSet::including(&patterns)?)?;
    let sources = read_sources(&triple.src, &paths)?;

    let optimizer = Optimizer::new(config.optimization_level);
    let fingerprint = optimizer.fingerprint();
    let mut cache = ImageCache::open(&context.cache_dir())?;

    let results: Vec<Optimized> = {
        let cache = &cache;
        sources
            .into_par_iter()
            .map(|mut file| -> Result<Optimized, TransformError> {
                let key = ImageCache::key(&fingerprint, &file.contents);
                let original_size = file.contents.len() as u64;
                if let Some(bytes) = cache.get(&key) {
                    file.contents = bytes;
                    return Ok(Optimized { file, key, original_size, cached: true });
                }
                file.contents = optimizer
                    .optimize(&file.relative, &file.contents)
                    .map_err(|e| TransformError::new("imagemin", file.path(), e.to_string()))?;
                Ok(Optimized { file, key, original_size, cached: false })
            })
            .collect::<Result<_, _>>()?
    };

    let hits = results.iter().filter(|r| r.cached).count();
    let misses = results.len() - hits;
    for result in results.iter().filter(|r| !r.cached) {
        let source = relative_str(&result.file.relative);
        cache.insert(&result.key, &source, result.original_size, &result.file.contents)?;
    }
    cache.save()?;

    let files: Vec<FileRecord> = results.into_iter().map(|r| r.file).collect();
    let written = write_files(&files, &triple.dest)?;

    tracing::debug!(hits, misses, saved = cache.bytes_saved(), "image cache");
    env.notify(format!("Images task complete ({} cached, {} optimized).", hits, misses));
    Ok(TaskOutput::written(written).with_up_to_date(hits))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::{BuildContext, NullProgress};
    use crate::config::default_config;
    use crate::tasks::{TaskGraph, TaskId};
    use image::{Rgba, RgbaImage};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn images(root: &Path) -> Result<TaskOutput, TaskError> {
        let ctx = BuildContext::new(default_config(), root.to_path_buf());
        let graph = TaskGraph::new();
        run(&TaskEnv { task: TaskId::Images, context: &ctx, graph: &graph, reporter: &NullProgress })
    }

    fn fixture() -> TempDir {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("app/images/icons");
        fs::create_dir_all(&dir).unwrap();
        RgbaImage::from_pixel(8, 8, Rgba([0, 128, 255, 255])).save(dir.join("dot.png")).unwrap();
        fs::write(dir.join("arrow.svg"), "<svg>\n  <!-- c -->\n  <path d=\"M0 0\"/>\n</svg>\n").unwrap();
        fs::write(temp.path().join("app/images/notes.txt"), "not an image").unwrap();
        temp
    }

    #[test]
    fn test_images_written_to_dest() {
        let temp = fixture();
        let output = images(temp.path()).unwrap();

        assert_eq!(output.outputs.len(), 2);
        let dest = temp.path().join("public/images/icons");
        assert!(dest.join("dot.png").exists());
        assert_eq!(fs::read_to_string(dest.join("arrow.svg")).unwrap(), "<svg><path d=\"M0 0\"/></svg>");
        assert!(!temp.path().join("public/images/notes.txt").exists());
    }

    #[test]
    fn test_second_run_is_all_cache_hits() {
        let temp = fixture();
        assert_eq!(images(temp.path()).unwrap().up_to_date, 0);

        let second = images(temp.path()).unwrap();
        assert_eq!(second.up_to_date, 2);
        assert_eq!(second.outputs.len(), 2);
    }

    #[test]
    fn test_corrupt_png_fails() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("app/images")).unwrap();
        fs::write(temp.path().join("app/images/broken.png"), "nope").unwrap();

        let err = images(temp.path()).unwrap_err();
        assert!(err.to_string().starts_with("imagemin:"));
    }
}
