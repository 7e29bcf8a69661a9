//! Inline small assets referenced from stylesheets as `data:` URIs.

use crate::build::pipeline::{each, FileRecord, Transform, TransformError};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use regex::{Captures, Regex};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

static URL_REGEX: OnceLock<Regex> = OnceLock::new();

/// Replace `url(...)` references to local files with base64 data URIs.
///
/// Relative URLs resolve against the stylesheet's source directory;
/// root-relative URLs (`/images/a.png`) resolve against `root`. Remote,
/// `data:` and unresolvable URLs are kept.
#[derive(Debug, Clone)]
pub struct InlineAssets {
    extensions: Vec<String>,
    root: PathBuf,
}

impl InlineAssets {
    /// Inline files with one of `extensions`.
    pub fn new(extensions: &[String], root: impl Into<PathBuf>) -> Self {
        Self { extensions: extensions.iter().map(|e| e.to_ascii_lowercase()).collect(), root: root.into() }
    }

    /// Resolve a URL to a local file eligible for inlining.
    fn resolve(&self, url: &str, dir: &Path) -> Option<PathBuf> {
        if url.is_empty() || url.starts_with("//") || url.starts_with('#') || url.contains(':') {
            return None;
        }
        let path = url.split(['?', '#']).next().unwrap_or(url);
        let extension = Path::new(path).extension()?.to_str()?.to_ascii_lowercase();
        if !self.extensions.contains(&extension) {
            return None;
        }
        let resolved = match path.strip_prefix('/') {
            Some(rooted) => self.root.join(rooted),
            None => dir.join(path),
        };
        resolved.is_file().then_some(resolved)
    }

    fn inline(&self, css: &str, dir: &Path) -> String {
        let regex = URL_REGEX.get_or_init(|| {
            Regex::new(r#"url\(\s*(?:"([^"]*)"|'([^']*)'|([^)"'\s]*))\s*\)"#).expect("Invalid regex pattern")
        });

        regex
            .replace_all(css, |caps: &Captures<'_>| {
                let whole = caps.get(0).map(|m| m.as_str()).unwrap_or_default().to_string();
                let url = caps.get(1).or(caps.get(2)).or(caps.get(3)).map(|m| m.as_str()).unwrap_or("");
                let Some(path) = self.resolve(url, dir) else {
                    return whole;
                };
                match fs::read(&path) {
                    Ok(bytes) => format!("url(\"data:{};base64,{}\")", mime_type(&path), STANDARD.encode(bytes)),
                    Err(e) => {
                        tracing::debug!(path = %path.display(), error = %e, "cannot inline asset");
                        whole
                    }
                }
            })
            .into_owned()
    }
}

impl Transform for InlineAssets {
    fn name(&self) -> &'static str {
        "base64"
    }

    fn apply(&self, files: Vec<FileRecord>) -> Result<Vec<FileRecord>, TransformError> {
        each(files, |mut file| {
            let source = file.path();
            let dir = source.parent().unwrap_or(Path::new("."));
            let inlined = self.inline(file.text(self.name())?, dir);
            file.set_text(inlined);
            Ok(file)
        })
    }
}

/// MIME type by file extension.
pub fn mime_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase()).as_deref() {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("webp") => "image/webp",
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("ttf") => "font/ttf",
        _ => "application/octet-stream",
    }
}
