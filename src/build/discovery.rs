//! Source file discovery.
//!
//! Resolves include/exclude glob lists against a base directory. Patterns are
//! relative to the base and may use `{a,b}` alternation, which is expanded
//! before the patterns are handed to the `glob` crate.

use glob::{glob_with, MatchOptions, Pattern};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Error during source discovery.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum DiscoveryError {
    /// Invalid glob pattern
    #[error("Invalid glob pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
    /// `{` without `}` or the reverse
    #[error("Unbalanced braces in pattern '{0}'")]
    UnbalancedBraces(String),
    /// IO error during file enumeration
    #[error("IO error during discovery: {0}")]
    Io(#[from] std::io::Error),
}

/// Check that every `{` in a pattern has a matching `}`.
pub fn check_braces(pattern: &str) -> Result<(), DiscoveryError> {
    let mut depth = 0i32;
    for c in pattern.chars() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth < 0 {
                    return Err(DiscoveryError::UnbalancedBraces(pattern.to_string()));
                }
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(DiscoveryError::UnbalancedBraces(pattern.to_string()));
    }
    Ok(())
}

/// Expand `{a,b}` alternation into separate patterns.
///
/// Groups may nest. A group without a comma is kept literally.
///
/// ```
/// use assetflow::build::discovery::expand_braces;
///
/// let expanded = expand_braces("**/*.{jpg,png}").unwrap();
/// assert_eq!(expanded, vec!["**/*.jpg", "**/*.png"]);
/// ```
pub fn expand_braces(pattern: &str) -> Result<Vec<String>, DiscoveryError> {
    check_braces(pattern)?;
    Ok(expand(pattern))
}

fn expand(pattern: &str) -> Vec<String> {
    let Some(open) = pattern.find('{') else {
        return vec![pattern.to_string()];
    };

    // Locate the matching close and the top-level commas of this group
    let mut depth = 0;
    let mut close = None;
    let mut commas = Vec::new();
    for (i, c) in pattern[open..].char_indices() {
        let i = open + i;
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    close = Some(i);
                    break;
                }
            }
            ',' if depth == 1 => commas.push(i),
            _ => {}
        }
    }
    let Some(close) = close else {
        return vec![pattern.to_string()];
    };

    let prefix = &pattern[..open];
    let suffix = &pattern[close + 1..];

    if commas.is_empty() {
        let literal = &pattern[open..=close];
        return expand(suffix).into_iter().map(|s| format!("{}{}{}", prefix, literal, s)).collect();
    }

    let mut bounds = vec![open];
    bounds.extend(&commas);
    bounds.push(close);

    let mut result = Vec::new();
    for pair in bounds.windows(2) {
        let alternative = &pattern[pair[0] + 1..pair[1]];
        for tail in expand(&format!("{}{}", alternative, suffix)) {
            result.push(format!("{}{}", prefix, tail));
        }
    }
    result
}

/// Convert a path relative to a base into a `/`-separated string.
pub fn relative_str(path: &Path) -> String {
    path.components().map(|c| c.as_os_str().to_string_lossy()).collect::<Vec<_>>().join("/")
}

fn match_options(dot: bool) -> MatchOptions {
    MatchOptions { case_sensitive: true, require_literal_separator: true, require_literal_leading_dot: !dot }
}

/// Compiled include/exclude pattern lists.
#[derive(Debug, Clone)]
pub struct GlobSet {
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
    dot: bool,
}

impl GlobSet {
    /// Compile include and exclude pattern lists.
    pub fn new(include: &[String], exclude: &[String], dot: bool) -> Result<Self, DiscoveryError> {
        Ok(Self { include: compile_all(include)?, exclude: compile_all(exclude)?, dot })
    }

    /// Include-only set.
    pub fn including(include: &[String]) -> Result<Self, DiscoveryError> {
        Self::new(include, &[], false)
    }

    /// Check a path relative to the base directory against the set.
    pub fn matches(&self, relative: &Path) -> bool {
        let rel = relative_str(relative);
        let options = match_options(self.dot);
        self.include.iter().any(|p| p.matches_with(&rel, options))
            && !self.exclude.iter().any(|p| p.matches_with(&rel, options))
    }
}

fn compile_all(patterns: &[String]) -> Result<Vec<Pattern>, DiscoveryError> {
    let mut compiled = Vec::new();
    for pattern in patterns {
        for expanded in expand_braces(pattern)? {
            let p = Pattern::new(&expanded).map_err(|source| DiscoveryError::InvalidPattern {
                pattern: pattern.clone(),
                source,
            })?;
            compiled.push(p);
        }
    }
    Ok(compiled)
}

/// List every file below `base`, including dotfiles, sorted.
fn walk_files(base: &Path) -> Result<Vec<PathBuf>, DiscoveryError> {
    if !base.is_dir() {
        return Ok(vec![]);
    }

    let pattern = format!("{}/**/*", Pattern::escape(&base.to_string_lossy()));
    let entries = glob_with(&pattern, match_options(true)).map_err(|source| {
        DiscoveryError::InvalidPattern { pattern: pattern.clone(), source }
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| DiscoveryError::Io(e.into_error()))?;
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Discover files below `base` that match `set`.
///
/// Returned paths are absolute (joined onto `base`) and sorted.
pub fn discover_files(base: &Path, set: &GlobSet) -> Result<Vec<PathBuf>, DiscoveryError> {
    Ok(walk_files(base)?
        .into_iter()
        .filter(|path| path.strip_prefix(base).map(|rel| set.matches(rel)).unwrap_or(false))
        .collect())
}

/// Discover files for an ordered pattern list.
///
/// Files are returned pattern by pattern, sorted within each pattern, and a
/// file matched by an earlier pattern is not repeated.
pub fn discover_ordered(base: &Path, patterns: &[String]) -> Result<Vec<PathBuf>, DiscoveryError> {
    let files = walk_files(base)?;
    let mut seen = HashSet::new();
    let mut ordered = Vec::new();

    for pattern in patterns {
        let set = GlobSet::including(std::slice::from_ref(pattern))?;
        for path in &files {
            let Ok(rel) = path.strip_prefix(base) else { continue };
            if set.matches(rel) && seen.insert(path.clone()) {
                ordered.push(path.clone());
            }
        }
    }

    Ok(ordered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(dir: &Path, rel: &str) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, rel).unwrap();
    }

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_expand_braces_simple() {
        assert_eq!(expand_braces("a.{x,y,z}").unwrap(), vec!["a.x", "a.y", "a.z"]);
        assert_eq!(expand_braces("plain/**/*").unwrap(), vec!["plain/**/*"]);
    }

    #[test]
    fn test_expand_braces_multiple_groups() {
        let expanded = expand_braces("{a,b}/{c,d}").unwrap();
        assert_eq!(expanded, vec!["a/c", "a/d", "b/c", "b/d"]);
    }

    #[test]
    fn test_expand_braces_nested() {
        let expanded = expand_braces("{styles,styles/{a,b}}").unwrap();
        assert_eq!(expanded, vec!["styles", "styles/a", "styles/b"]);
    }

    #[test]
    fn test_expand_braces_unclosed() {
        let err = expand_braces("{includes/cache,includes/cache/**/*").unwrap_err();
        assert!(matches!(err, DiscoveryError::UnbalancedBraces(_)));
        assert!(check_braces("a}b").is_err());
    }

    #[test]
    fn test_glob_set_matches() {
        let set = GlobSet::new(
            &strings(&["**/*"]),
            &strings(&["{styles,styles/**/*}", ".gitignore"]),
            true,
        )
        .unwrap();

        assert!(set.matches(Path::new("index.php")));
        assert!(set.matches(Path::new(".htaccess")));
        assert!(set.matches(Path::new("includes/header.php")));
        assert!(!set.matches(Path::new(".gitignore")));
        assert!(!set.matches(Path::new("styles/main.scss")));
        assert!(!set.matches(Path::new("styles/partials/_a.scss")));
    }

    #[test]
    fn test_glob_set_without_dot() {
        let set = GlobSet::including(&strings(&["**/*"])).unwrap();
        assert!(!set.matches(Path::new(".htaccess")));
        assert!(set.matches(Path::new("robots.txt")));
    }

    #[test]
    fn test_discover_files() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "a.png");
        touch(temp.path(), "sub/b.jpg");
        touch(temp.path(), "sub/c.txt");

        let set = GlobSet::including(&strings(&["**/*.{png,jpg}"])).unwrap();
        let files = discover_files(temp.path(), &set).unwrap();

        assert_eq!(files, vec![temp.path().join("a.png"), temp.path().join("sub/b.jpg")]);
    }

    #[test]
    fn test_discover_missing_base() {
        let set = GlobSet::including(&strings(&["**/*"])).unwrap();
        assert!(discover_files(Path::new("/nonexistent/base"), &set).unwrap().is_empty());
    }

    #[test]
    fn test_discover_ordered() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "app.js");
        touch(temp.path(), "plugins/zeta.js");
        touch(temp.path(), "plugins/alpha.js");
        touch(temp.path(), "other.js");

        let files = discover_ordered(temp.path(), &strings(&["plugins/*.js", "app.js", "*.js"])).unwrap();
        let names: Vec<String> =
            files.iter().map(|p| relative_str(p.strip_prefix(temp.path()).unwrap())).collect();

        assert_eq!(names, vec!["plugins/alpha.js", "plugins/zeta.js", "app.js", "other.js"]);
    }
}
