//! Stylesheet steps: glob imports, SCSS compilation and minification.

use crate::build::discovery::{discover_files, relative_str, GlobSet};
use crate::build::pipeline::{each, FileRecord, Transform, TransformError};
use crate::config::OutputStyle;
use crate::sourcemap::SourceMap;
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

static GLOB_IMPORT_REGEX: OnceLock<Regex> = OnceLock::new();

/// Browser named in a target query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Browser {
    Android,
    BlackBerry,
    Chrome,
    Edge,
    Firefox,
    Ie,
    Ios,
    Opera,
    Safari,
    Samsung,
}

impl Browser {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name.to_ascii_lowercase().as_str() {
            "android" => Browser::Android,
            "bb" | "blackberry" => Browser::BlackBerry,
            "chrome" | "and_chr" => Browser::Chrome,
            "edge" => Browser::Edge,
            "ff" | "firefox" | "and_ff" => Browser::Firefox,
            "ie" | "ie_mob" | "explorer" => Browser::Ie,
            "ios" | "ios_saf" => Browser::Ios,
            "opera" => Browser::Opera,
            "safari" => Browser::Safari,
            "samsung" => Browser::Samsung,
            _ => return None,
        })
    }
}

/// A parsed `"name >= version"` query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrowserQuery {
    pub browser: Browser,
    /// `major << 16 | minor << 8 | patch`
    pub version: u32,
}

/// Malformed browser query.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BrowserQueryError {
    #[error("invalid browser query '{0}', expected 'name >= version'")]
    Syntax(String),
    #[error("unknown browser '{0}'")]
    UnknownBrowser(String),
    #[error("invalid version '{0}'")]
    Version(String),
}

/// Parse a query such as `"android >= 4.4"`.
///
/// A bare `"name version"` is accepted as well.
pub fn parse_browser_query(query: &str) -> Result<BrowserQuery, BrowserQueryError> {
    let parts: Vec<&str> = query.split_whitespace().collect();
    let (name, version) = match parts.as_slice() {
        [name, ">=", version] | [name, version] => (*name, *version),
        _ => return Err(BrowserQueryError::Syntax(query.to_string())),
    };

    let browser =
        Browser::from_name(name).ok_or_else(|| BrowserQueryError::UnknownBrowser(name.to_string()))?;

    let mut numbers = version.split('.').map(|n| n.parse::<u8>());
    let mut next = |required: bool| match numbers.next() {
        Some(Ok(n)) => Ok(n as u32),
        None if !required => Ok(0),
        _ => Err(BrowserQueryError::Version(version.to_string())),
    };
    let (major, minor, patch) = (next(true)?, next(false)?, next(false)?);
    if numbers.next().is_some() {
        return Err(BrowserQueryError::Version(version.to_string()));
    }

    Ok(BrowserQuery { browser, version: (major << 16) | (minor << 8) | patch })
}

/// Minimum versions to support, one per browser.
///
/// When a browser is listed twice the lower version wins. Browsers the
/// minifier has no data for are ignored.
pub fn browser_targets(queries: &[String]) -> Result<Browsers, BrowserQueryError> {
    let mut browsers = Browsers::default();
    for query in queries {
        let BrowserQuery { browser, version } = parse_browser_query(query)?;
        let slot = match browser {
            Browser::Android => &mut browsers.android,
            Browser::Chrome => &mut browsers.chrome,
            Browser::Edge => &mut browsers.edge,
            Browser::Firefox => &mut browsers.firefox,
            Browser::Ie => &mut browsers.ie,
            Browser::Ios => &mut browsers.ios_saf,
            Browser::Opera => &mut browsers.opera,
            Browser::Safari => &mut browsers.safari,
            Browser::Samsung => &mut browsers.samsung,
            Browser::BlackBerry => continue,
        };
        *slot = Some(slot.map_or(version, |v| v.min(version)));
    }
    Ok(browsers)
}

/// Expand `@import "dir/*";` into one import per matching stylesheet.
#[derive(Debug, Clone, Default)]
pub struct GlobImports;

impl GlobImports {
    fn expand(&self, file: &FileRecord, text: &str) -> Result<String, TransformError> {
        let regex = GLOB_IMPORT_REGEX.get_or_init(|| {
            Regex::new(r#"@import\s+["']([^"']*\*[^"']*)["']\s*;"#).expect("Invalid regex pattern")
        });
        if !regex.is_match(text) {
            return Ok(text.to_string());
        }

        let path = file.path();
        let dir = path.parent().unwrap_or(Path::new("."));
        let mut out = String::with_capacity(text.len());
        let mut last = 0;

        for caps in regex.captures_iter(text) {
            let (Some(whole), Some(pattern)) = (caps.get(0), caps.get(1)) else { continue };
            out.push_str(&text[last..whole.start()]);

            let set = GlobSet::including(&[pattern.as_str().to_string()])
                .map_err(|e| TransformError::new(self.name(), &path, e.to_string()))?;
            let mut matches: Vec<String> = discover_files(dir, &set)
                .map_err(|e| TransformError::new(self.name(), &path, e.to_string()))?
                .into_iter()
                .filter(|p| p != &path && is_stylesheet(p))
                .filter_map(|p| p.strip_prefix(dir).ok().map(relative_str))
                .collect();
            matches.sort();

            let imports: Vec<String> = matches.iter().map(|m| format!("@import \"{}\";", m)).collect();
            out.push_str(&imports.join("\n"));
            last = whole.end();
        }
        out.push_str(&text[last..]);
        Ok(out)
    }
}

fn is_stylesheet(path: &Path) -> bool {
    matches!(path.extension().and_then(|e| e.to_str()), Some("scss" | "sass" | "css"))
}

impl Transform for GlobImports {
    fn name(&self) -> &'static str {
        "sass-glob"
    }

    fn apply(&self, files: Vec<FileRecord>) -> Result<Vec<FileRecord>, TransformError> {
        each(files, |mut file| {
            let expanded = self.expand(&file, file.text(self.name())?)?;
            file.set_text(expanded);
            Ok(file)
        })
    }
}

/// Compile SCSS to CSS.
///
/// Imports resolve against the stylesheet's own directory and the base
/// directory. A tracked source map is replaced by one that names the
/// stylesheet without line mappings.
#[derive(Debug, Clone)]
pub struct SassCompile {
    style: OutputStyle,
}

impl SassCompile {
    pub fn new(style: OutputStyle) -> Self {
        Self { style }
    }
}

impl Transform for SassCompile {
    fn name(&self) -> &'static str {
        "sass"
    }

    fn apply(&self, files: Vec<FileRecord>) -> Result<Vec<FileRecord>, TransformError> {
        each(files, |mut file| {
            let path = file.path();
            let dir = path.parent().unwrap_or(Path::new(".")).to_path_buf();
            let style = match self.style {
                OutputStyle::Expanded => grass::OutputStyle::Expanded,
                OutputStyle::Compressed => grass::OutputStyle::Compressed,
            };
            let options =
                grass::Options::default().style(style).load_path(&dir).load_path(&file.base);

            let css = grass::from_string(file.text(self.name())?.to_string(), &options)
                .map_err(|e| TransformError::new(self.name(), &path, e.to_string()))?;

            // grass emits no source map, so the development map keeps the
            // sources but has no line mappings.
            if let Some(map) = file.source_map.take() {
                let sources = map.sources.into_iter().zip(map.sources_content).collect();
                file.source_map = Some(SourceMap::sources_only(sources));
            }
            file.set_text(css);
            file.set_extension("css");
            Ok(file)
        })
    }
}

/// Minify CSS and add vendor prefixes for the configured browsers.
#[derive(Debug, Clone)]
pub struct CssMinify {
    targets: Targets,
    keep_first_comment: bool,
}

impl CssMinify {
    pub fn new(browsers: Browsers, keep_first_comment: bool) -> Self {
        Self { targets: Targets::from(browsers), keep_first_comment }
    }
}

impl Transform for CssMinify {
    fn name(&self) -> &'static str {
        "minify-css"
    }

    fn apply(&self, files: Vec<FileRecord>) -> Result<Vec<FileRecord>, TransformError> {
        each(files, |mut file| {
            let text = file.text(self.name())?;
            let mut minified = minify_css(text, &file.file_name(), self.targets)
                .map_err(|e| TransformError::new(self.name(), file.path(), e))?;

            if self.keep_first_comment {
                if let Some(comment) = first_comment(text) {
                    if !minified.contains(comment) {
                        minified = format!("{}\n{}", comment, minified);
                    }
                }
            }
            file.set_text(minified);
            Ok(file)
        })
    }
}

/// Minify a stylesheet.
pub fn minify_css(css: &str, filename: &str, targets: Targets) -> Result<String, String> {
    let mut sheet = StyleSheet::parse(
        css,
        ParserOptions { filename: filename.to_string(), ..ParserOptions::default() },
    )
    .map_err(|e| e.to_string())?;
    sheet
        .minify(MinifyOptions { targets, ..MinifyOptions::default() })
        .map_err(|e| e.to_string())?;
    let output = sheet
        .to_css(PrinterOptions { minify: true, targets, ..PrinterOptions::default() })
        .map_err(|e| e.to_string())?;
    Ok(output.code)
}

/// The comment a stylesheet opens with, if any.
fn first_comment(css: &str) -> Option<&str> {
    let mut rest = css.trim_start();
    if rest.starts_with("@charset") {
        rest = rest[rest.find(';')? + 1..].trim_start();
    }
    if !rest.starts_with("/*") {
        return None;
    }
    let end = rest.find("*/")? + 2;
    Some(&rest[..end])
}
