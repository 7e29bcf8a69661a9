//! Pipeline steps.
//!
//! General-purpose steps live here; stylesheet and script specific steps
//! live in [`css`], [`inline`] and [`js`].

pub mod css;
pub mod inline;
pub mod js;

use crate::build::pipeline::{each, FileRecord, Transform, TransformError};
use crate::sourcemap::{CommentStyle, SourceMap};
use std::path::{Path, PathBuf};

/// Insert a suffix before the extension: `main.css` → `main.min.css`.
#[derive(Debug, Clone)]
pub struct Rename {
    suffix: String,
}

impl Rename {
    pub fn suffix(suffix: impl Into<String>) -> Self {
        Self { suffix: suffix.into() }
    }
}

impl Transform for Rename {
    fn name(&self) -> &'static str {
        "rename"
    }

    fn apply(&self, files: Vec<FileRecord>) -> Result<Vec<FileRecord>, TransformError> {
        each(files, |mut file| {
            file.relative = with_suffix(&file.relative, &self.suffix);
            Ok(file)
        })
    }
}

/// Path with `suffix` inserted before the extension.
///
/// ```
/// use assetflow::transforms::with_suffix;
/// use std::path::{Path, PathBuf};
///
/// assert_eq!(with_suffix(Path::new("a/main.css"), ".min"), PathBuf::from("a/main.min.css"));
/// ```
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned());
    let extension = path.extension().map(|e| e.to_string_lossy().into_owned());
    let renamed = match (stem, extension) {
        (Some(stem), Some(ext)) => format!("{}{}.{}", stem, suffix, ext),
        (Some(stem), None) => format!("{}{}", stem, suffix),
        _ => return path.to_path_buf(),
    };
    path.with_file_name(renamed)
}

/// Join every record into one, separated by newlines.
///
/// Source maps are merged when every input carries one.
#[derive(Debug, Clone)]
pub struct Concat {
    output: PathBuf,
}

impl Concat {
    pub fn into_file(output: impl Into<PathBuf>) -> Self {
        Self { output: output.into() }
    }
}

impl Transform for Concat {
    fn name(&self) -> &'static str {
        "concat"
    }

    fn apply(&self, files: Vec<FileRecord>) -> Result<Vec<FileRecord>, TransformError> {
        let Some(first) = files.first() else {
            return Ok(files);
        };
        let base = first.base.clone();
        let track_maps = files.iter().all(|f| f.source_map.is_some());

        let mut contents = Vec::new();
        let mut map = SourceMap::default();
        let mut line = 0;
        let mut modified = None;

        for (i, file) in files.iter().enumerate() {
            if i > 0 {
                contents.push(b'\n');
                line += 1;
            }
            if let (true, Some(file_map)) = (track_maps, &file.source_map) {
                map.append(file_map, line);
            }
            contents.extend_from_slice(&file.contents);
            line += file.contents.iter().filter(|&&b| b == b'\n').count();
            modified = modified.max(file.modified);
        }

        let mut joined = FileRecord::new(base, self.output.clone(), contents);
        joined.modified = modified;
        joined.source_map = track_maps.then_some(map);
        Ok(vec![joined])
    }
}

/// Start source map tracking with an identity map per file.
#[derive(Debug, Clone, Default)]
pub struct SourceMapInit;

impl Transform for SourceMapInit {
    fn name(&self) -> &'static str {
        "sourcemaps.init"
    }

    fn apply(&self, files: Vec<FileRecord>) -> Result<Vec<FileRecord>, TransformError> {
        each(files, |mut file| {
            let source = crate::build::discovery::relative_str(&file.relative);
            let map = SourceMap::identity(&source, file.text(self.name())?);
            file.source_map = Some(map);
            Ok(file)
        })
    }
}

/// Append the tracked source map as an inline comment.
#[derive(Debug, Clone)]
pub struct SourceMapWrite {
    style: CommentStyle,
}

impl SourceMapWrite {
    pub fn inline(style: CommentStyle) -> Self {
        Self { style }
    }
}

impl Transform for SourceMapWrite {
    fn name(&self) -> &'static str {
        "sourcemaps.write"
    }

    fn apply(&self, files: Vec<FileRecord>) -> Result<Vec<FileRecord>, TransformError> {
        each(files, |mut file| {
            if let Some(map) = file.source_map.take() {
                let comment = map.inline_comment(&file.file_name(), self.style);
                if !file.contents.ends_with(b"\n") {
                    file.contents.push(b'\n');
                }
                file.contents.extend_from_slice(comment.as_bytes());
                file.contents.push(b'\n');
            }
            Ok(file)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};

    fn record(relative: &str, text: &str) -> FileRecord {
        FileRecord::new("/src", relative, text.as_bytes().to_vec())
    }

    #[test]
    fn test_rename_suffix() {
        let out = Rename::suffix(".min")
            .apply(vec![record("main.css", ""), record("nested/app.js", ""), record("LICENSE", "")])
            .unwrap();
        assert_eq!(out[0].relative, PathBuf::from("main.min.css"));
        assert_eq!(out[1].relative, PathBuf::from("nested/app.min.js"));
        assert_eq!(out[2].relative, PathBuf::from("LICENSE.min"));
    }

    #[test]
    fn test_concat_joins_in_order() {
        let now = SystemTime::now();
        let mut a = record("plugins/a.js", "var a;");
        a.modified = Some(now);
        let mut b = record("app.js", "var b;\n");
        b.modified = Some(now + Duration::from_secs(5));

        let out = Concat::into_file("app.js").apply(vec![a, b]).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].relative, PathBuf::from("app.js"));
        assert_eq!(out[0].contents, b"var a;\nvar b;\n");
        assert_eq!(out[0].modified, Some(now + Duration::from_secs(5)));
        assert!(out[0].source_map.is_none());
    }

    #[test]
    fn test_concat_merges_source_maps() {
        let files = SourceMapInit
            .apply(vec![record("plugins/a.js", "a1\na2"), record("app.js", "b1")])
            .unwrap();
        let out = Concat::into_file("app.js").apply(files).unwrap();

        let map = out[0].source_map.as_ref().unwrap();
        assert_eq!(map.sources, vec!["plugins/a.js", "app.js"]);
        assert_eq!(map.line_count(), 3);
        assert_eq!(map.line(2)[0].source, 1);
    }

    #[test]
    fn test_sourcemap_write_appends_comment() {
        let files = SourceMapInit.apply(vec![record("app.min.js", "x()")]).unwrap();
        let out = SourceMapWrite::inline(CommentStyle::Js).apply(files).unwrap();

        let text = String::from_utf8(out[0].contents.clone()).unwrap();
        assert!(text.starts_with("x()\n//# sourceMappingURL=data:application/json"));
        assert!(out[0].source_map.is_none());
    }

    #[test]
    fn test_sourcemap_write_without_map_is_noop() {
        let out = SourceMapWrite::inline(CommentStyle::Css).apply(vec![record("a.css", "a{}")]).unwrap();
        assert_eq!(out[0].contents, b"a{}");
    }
}
