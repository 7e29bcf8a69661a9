//! Configuration schema types for `assetflow.toml`
//!
//! Defines the structure and validation rules for an asset project. Every
//! section is optional; omitted values fall back to the conventional layout
//! (`app/` sources, `public/` output, `.tmp/` development output).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::build::discovery::check_braces;
use crate::transforms::css::parse_browser_query;

/// Severity of a lint rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuleLevel {
    /// Report and fail the lint task outside a dev session
    Error,
    /// Report only
    #[default]
    Warn,
    /// Rule disabled
    #[serde(alias = "ignore")]
    Off,
}

/// Output formatting used by the SCSS compiler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputStyle {
    /// One declaration per line
    #[default]
    Expanded,
    /// Whitespace removed
    Compressed,
}

/// Project layout section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name, used as the server log prefix when none is configured
    #[serde(default = "default_name")]
    pub name: String,
    /// Source base directory
    #[serde(default = "default_src")]
    pub src: PathBuf,
    /// Production output base directory
    #[serde(default = "default_dest")]
    pub dest: PathBuf,
    /// Development output base directory
    #[serde(default = "default_tmp")]
    pub tmp: PathBuf,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self { name: default_name(), src: default_src(), dest: default_dest(), tmp: default_tmp() }
    }
}

fn default_name() -> String {
    "BaseApp".to_string()
}

fn default_src() -> PathBuf {
    PathBuf::from("app")
}

fn default_dest() -> PathBuf {
    PathBuf::from("public")
}

fn default_tmp() -> PathBuf {
    PathBuf::from(".tmp")
}

fn default_suffix() -> String {
    ".min".to_string()
}

fn default_true() -> bool {
    true
}

fn default_image_extensions() -> Vec<String> {
    ["jpg", "png", "gif", "svg"].iter().map(|s| s.to_string()).collect()
}

/// Stylesheet pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StylesConfig {
    /// SCSS output formatting
    #[serde(default)]
    pub output_style: OutputStyle,
    /// Extensions of `url()` assets inlined as data URIs
    #[serde(default = "default_image_extensions")]
    pub inline_extensions: Vec<String>,
    /// Suffix inserted before the `.css` extension
    #[serde(default = "default_suffix")]
    pub suffix: String,
    /// Vendor-prefix targets, e.g. `"chrome >= 34"`
    #[serde(default = "default_browsers")]
    pub browsers: Vec<String>,
    /// Keep the first comment when minifying
    #[serde(default = "default_true")]
    pub keep_first_comment: bool,
}

impl Default for StylesConfig {
    fn default() -> Self {
        Self {
            output_style: OutputStyle::default(),
            inline_extensions: default_image_extensions(),
            suffix: default_suffix(),
            browsers: default_browsers(),
            keep_first_comment: true,
        }
    }
}

fn default_browsers() -> Vec<String> {
    [
        "ie >= 10",
        "ie_mob >= 10",
        "ff >= 30",
        "chrome >= 34",
        "safari >= 7",
        "opera >= 23",
        "ios >= 7",
        "android >= 4.4",
        "bb >= 10",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Script pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptsConfig {
    /// Ordered source patterns, relative to the scripts source directory
    #[serde(default = "default_sequence")]
    pub sequence: Vec<String>,
    /// Name of the concatenated file before the suffix is applied
    #[serde(default = "default_script_output")]
    pub output: String,
    /// Suffix inserted before the `.js` extension
    #[serde(default = "default_suffix")]
    pub suffix: String,
    /// Remove `console.*`, `alert()` and `debugger` in production
    #[serde(default = "default_true")]
    pub strip_debug: bool,
}

impl Default for ScriptsConfig {
    fn default() -> Self {
        Self {
            sequence: default_sequence(),
            output: default_script_output(),
            suffix: default_suffix(),
            strip_debug: true,
        }
    }
}

fn default_sequence() -> Vec<String> {
    vec!["plugins/*.js".to_string(), "app.js".to_string()]
}

fn default_script_output() -> String {
    "app.js".to_string()
}

/// Image optimizer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImagesConfig {
    /// Extensions picked up by the images task
    #[serde(default = "default_image_extensions")]
    pub extensions: Vec<String>,
    /// Compression effort, 0-7
    #[serde(default = "default_optimization_level")]
    pub optimization_level: u8,
    /// Optimizer cache location, relative to the project root
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            extensions: default_image_extensions(),
            optimization_level: default_optimization_level(),
            cache_dir: default_cache_dir(),
        }
    }
}

fn default_optimization_level() -> u8 {
    4
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(".assetflow-cache")
}

/// Static file copy settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyConfig {
    /// Include patterns, relative to the source base directory
    #[serde(default = "default_copy_include")]
    pub include: Vec<String>,
    /// Exclude patterns, relative to the source base directory
    #[serde(default = "default_copy_exclude")]
    pub exclude: Vec<String>,
    /// Match dotfiles
    #[serde(default = "default_true")]
    pub dot: bool,
}

impl Default for CopyConfig {
    fn default() -> Self {
        Self { include: default_copy_include(), exclude: default_copy_exclude(), dot: true }
    }
}

fn default_copy_include() -> Vec<String> {
    vec!["**/*".to_string()]
}

fn default_copy_exclude() -> Vec<String> {
    [
        ".gitignore",
        "{styles,styles/**/*}",
        "{scripts,scripts/**/*}",
        "{images,images/**/*}",
        "{includes/cache,includes/cache/**/*}",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Script lint settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LintConfig {
    /// Per-rule severity overrides; unlisted rules use their built-in level
    #[serde(default)]
    pub rules: BTreeMap<String, RuleLevel>,
}

/// Upstream virtual host and local port of a proxy server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyTarget {
    /// Upstream host (and optional port) to proxy
    pub proxy: String,
    /// Local listening port
    pub port: u16,
}

/// Development server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Proxy used by `serve`
    #[serde(default = "default_dev_target")]
    pub dev: ProxyTarget,
    /// Proxy used by `serve-dist`
    #[serde(default = "default_dist_target")]
    pub dist: ProxyTarget,
    /// Prefix for server log lines
    #[serde(default = "default_name")]
    pub log_prefix: String,
    /// Mirror scroll position between connected browsers
    #[serde(default = "default_true")]
    pub scroll_proportionally: bool,
    /// Minimum interval between scroll updates sent by a browser
    #[serde(default = "default_scroll_throttle_ms")]
    pub scroll_throttle_ms: u32,
    /// Delay before a reload is broadcast
    #[serde(default = "default_reload_delay_ms")]
    pub reload_delay_ms: u32,
    /// Show an in-page banner after reloads
    #[serde(default)]
    pub notify: bool,
    /// Server-side template extensions that trigger a full reload
    #[serde(default = "default_template_extensions")]
    pub template_extensions: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            dev: default_dev_target(),
            dist: default_dist_target(),
            log_prefix: default_name(),
            scroll_proportionally: true,
            scroll_throttle_ms: default_scroll_throttle_ms(),
            reload_delay_ms: default_reload_delay_ms(),
            notify: false,
            template_extensions: default_template_extensions(),
        }
    }
}

fn default_dev_target() -> ProxyTarget {
    ProxyTarget { proxy: "project.src".to_string(), port: 5555 }
}

fn default_dist_target() -> ProxyTarget {
    ProxyTarget { proxy: "project.dest".to_string(), port: 5556 }
}

fn default_scroll_throttle_ms() -> u32 {
    60
}

fn default_reload_delay_ms() -> u32 {
    200
}

fn default_template_extensions() -> Vec<String> {
    vec!["php".to_string()]
}

/// Watch mode configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Debounce interval for file system events
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u32,
    /// Clear the terminal before each triggered run
    #[serde(default)]
    pub clear_screen: bool,
}

fn default_debounce_ms() -> u32 {
    100
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { debounce_ms: default_debounce_ms(), clear_screen: false }
    }
}

/// Root configuration structure for `assetflow.toml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssetConfig {
    /// Directory layout
    #[serde(default)]
    pub project: ProjectConfig,
    /// Stylesheet pipeline
    #[serde(default)]
    pub styles: StylesConfig,
    /// Script pipeline
    #[serde(default)]
    pub scripts: ScriptsConfig,
    /// Image optimizer
    #[serde(default)]
    pub images: ImagesConfig,
    /// Static file copy
    #[serde(default)]
    pub copy: CopyConfig,
    /// Script linting
    #[serde(default)]
    pub lint: LintConfig,
    /// Dev and dist proxy servers
    #[serde(default)]
    pub server: ServerConfig,
    /// Watch mode
    #[serde(default)]
    pub watch: WatchConfig,
}

/// Configuration validation error
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigValidationError {
    /// Dotted path to the offending field
    pub field: String,
    /// What is wrong with it
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl AssetConfig {
    /// Validate the configuration, returning every problem found.
    pub fn validate(&self) -> Vec<ConfigValidationError> {
        let mut errors = Vec::new();
        let mut push = |field: &str, message: String| {
            errors.push(ConfigValidationError { field: field.to_string(), message });
        };

        let dirs = [
            ("project.src", &self.project.src),
            ("project.dest", &self.project.dest),
            ("project.tmp", &self.project.tmp),
        ];
        for (field, dir) in &dirs {
            if dir.as_os_str().is_empty() {
                push(field, "must not be empty".to_string());
            }
        }
        if self.project.src == self.project.dest || self.project.src == self.project.tmp {
            push("project.src", "must differ from dest and tmp".to_string());
        }
        if self.project.dest == self.project.tmp {
            push("project.dest", "must differ from tmp".to_string());
        }

        if self.styles.suffix.is_empty() {
            push("styles.suffix", "must not be empty".to_string());
        }
        for query in &self.styles.browsers {
            if let Err(e) = parse_browser_query(query) {
                push("styles.browsers", e.to_string());
            }
        }

        if self.scripts.sequence.is_empty() {
            push("scripts.sequence", "must list at least one pattern".to_string());
        }
        if self.scripts.output.is_empty() {
            push("scripts.output", "must not be empty".to_string());
        }

        if self.images.extensions.is_empty() {
            push("images.extensions", "must list at least one extension".to_string());
        }
        if self.images.optimization_level > 7 {
            push(
                "images.optimization_level",
                format!("must be between 0 and 7, got {}", self.images.optimization_level),
            );
        }

        let patterns = self
            .copy
            .include
            .iter()
            .map(|p| ("copy.include", p))
            .chain(self.copy.exclude.iter().map(|p| ("copy.exclude", p)))
            .chain(self.scripts.sequence.iter().map(|p| ("scripts.sequence", p)));
        for (field, pattern) in patterns {
            if let Err(e) = check_braces(pattern) {
                push(field, e.to_string());
            }
        }

        if self.server.dev.port == 0 || self.server.dist.port == 0 {
            push("server", "ports must be non-zero".to_string());
        }
        if self.server.dev.port == self.server.dist.port {
            push("server.dist.port", "must differ from server.dev.port".to_string());
        }
        if self.server.dev.proxy.is_empty() || self.server.dist.proxy.is_empty() {
            push("server", "proxy hosts must not be empty".to_string());
        }

        errors
    }

    /// Check if the configuration is valid.
    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_conventions() {
        let config: AssetConfig = toml::from_str("").unwrap();
        assert_eq!(config.project.src, PathBuf::from("app"));
        assert_eq!(config.project.dest, PathBuf::from("public"));
        assert_eq!(config.project.tmp, PathBuf::from(".tmp"));
        assert_eq!(config.server.dev.port, 5555);
        assert_eq!(config.server.dist.port, 5556);
        assert_eq!(config.server.dev.proxy, "project.src");
        assert_eq!(config.images.optimization_level, 4);
        assert_eq!(config.scripts.sequence, vec!["plugins/*.js", "app.js"]);
        assert!(config.is_valid(), "{:?}", config.validate());
    }

    #[test]
    fn test_full_config_parse() {
        let toml = r#"
[project]
name = "shop"
src = "resources"
dest = "dist"
tmp = ".cache/dev"

[styles]
output_style = "compressed"
suffix = ".bundle"
browsers = ["chrome >= 60"]

[scripts]
sequence = ["vendor/*.js", "main.js"]
output = "bundle.js"
strip_debug = false

[images]
extensions = ["png"]
optimization_level = 2

[lint.rules]
no-console = "off"
eqeqeq = "warn"

[server]
log_prefix = "Shop"
reload_delay_ms = 0

[server.dev]
proxy = "shop.test"
port = 3000

[watch]
debounce_ms = 250
clear_screen = true
"#;
        let config: AssetConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.project.name, "shop");
        assert_eq!(config.styles.output_style, OutputStyle::Compressed);
        assert_eq!(config.scripts.output, "bundle.js");
        assert!(!config.scripts.strip_debug);
        assert_eq!(config.lint.rules.get("no-console"), Some(&RuleLevel::Off));
        assert_eq!(config.lint.rules.get("eqeqeq"), Some(&RuleLevel::Warn));
        assert_eq!(config.server.dev, ProxyTarget { proxy: "shop.test".to_string(), port: 3000 });
        assert_eq!(config.server.dist.port, 5556);
        assert_eq!(config.watch.debounce_ms, 250);
        assert!(config.is_valid(), "{:?}", config.validate());
    }

    #[test]
    fn test_validation_unclosed_brace() {
        let mut config = AssetConfig::default();
        config.copy.exclude.push("{includes/cache,includes/cache/**/*".to_string());
        let errors = config.validate();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "copy.exclude");
    }

    #[test]
    fn test_validation_same_ports() {
        let mut config = AssetConfig::default();
        config.server.dist.port = 5555;
        assert!(config.validate().iter().any(|e| e.field == "server.dist.port"));
    }

    #[test]
    fn test_validation_overlapping_dirs() {
        let mut config = AssetConfig::default();
        config.project.dest = PathBuf::from(".tmp");
        assert!(!config.is_valid());
    }

    #[test]
    fn test_validation_optimization_level() {
        let mut config = AssetConfig::default();
        config.images.optimization_level = 9;
        let errors = config.validate();
        assert!(errors[0].message.contains("between 0 and 7"));
    }

    #[test]
    fn test_validation_bad_browser_query() {
        let mut config = AssetConfig::default();
        config.styles.browsers = vec!["chrome newest".to_string()];
        assert!(config.validate().iter().any(|e| e.field == "styles.browsers"));
    }

    #[test]
    fn test_rule_level_serde() {
        #[derive(Deserialize)]
        struct Wrapper {
            level: RuleLevel,
        }
        let w: Wrapper = toml::from_str("level = \"ignore\"").unwrap();
        assert_eq!(w.level, RuleLevel::Off);
        let w: Wrapper = toml::from_str("level = \"error\"").unwrap();
        assert_eq!(w.level, RuleLevel::Error);
    }
}
