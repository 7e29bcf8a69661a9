//! Script linting.
//!
//! Rules run over the token stream produced by [`crate::tokenizer`]. Each rule
//! has a built-in severity that `[lint.rules]` in `assetflow.toml` can
//! override. Results are collected per file and printed in the familiar
//! "stylish" layout:
//!
//! ```text
//! app/scripts/app.js
//!   3:5  error    Unexpected 'debugger' statement.  no-debugger
//!
//! ✖ 1 problem (1 error, 0 warnings)
//! ```

use crate::config::{LintConfig, RuleLevel};
use crate::tokenizer::{check_brackets, next_significant, prev_significant, tokenize, Token, TokenKind};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Rule names with their built-in severity.
pub const RULES: &[(&str, RuleLevel)] = &[
    ("no-debugger", RuleLevel::Error),
    ("no-console", RuleLevel::Warn),
    ("no-alert", RuleLevel::Warn),
    ("eqeqeq", RuleLevel::Error),
    ("no-trailing-spaces", RuleLevel::Warn),
    ("no-var", RuleLevel::Off),
];

/// Pseudo-rule for sources that cannot be tokenized; always an error.
pub const SYNTAX_RULE: &str = "syntax";

/// Severity of a reported problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// One problem found in a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub line: usize,
    pub column: usize,
    pub severity: Severity,
    pub message: String,
    pub rule: &'static str,
}

/// Problems found in one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReport {
    pub path: PathBuf,
    pub violations: Vec<Violation>,
}

/// Problems across all linted files.
#[derive(Debug, Clone, Default)]
pub struct LintReport {
    pub files: Vec<FileReport>,
}

impl LintReport {
    /// Number of error-level problems.
    pub fn error_count(&self) -> usize {
        self.count(Severity::Error)
    }

    /// Number of warning-level problems.
    pub fn warning_count(&self) -> usize {
        self.count(Severity::Warning)
    }

    fn count(&self, severity: Severity) -> usize {
        self.files.iter().flat_map(|f| &f.violations).filter(|v| v.severity == severity).count()
    }

    /// Whether nothing was reported.
    pub fn is_clean(&self) -> bool {
        self.files.iter().all(|f| f.violations.is_empty())
    }

    /// Format the report; empty when there is nothing to report.
    pub fn format_stylish(&self) -> String {
        if self.is_clean() {
            return String::new();
        }

        let mut out = String::new();
        for file in self.files.iter().filter(|f| !f.violations.is_empty()) {
            out.push_str(&format!("{}\n", file.path.display()));
            let width = file
                .violations
                .iter()
                .map(|v| format!("{}:{}", v.line, v.column).len())
                .max()
                .unwrap_or(0);
            for v in &file.violations {
                out.push_str(&format!(
                    "  {:<width$}  {:<7}  {}  {}\n",
                    format!("{}:{}", v.line, v.column),
                    v.severity.to_string(),
                    v.message,
                    v.rule,
                    width = width
                ));
            }
            out.push('\n');
        }

        let total = self.error_count() + self.warning_count();
        out.push_str(&format!(
            "\u{2716} {} problem{} ({} error{}, {} warning{})\n",
            total,
            if total == 1 { "" } else { "s" },
            self.error_count(),
            if self.error_count() == 1 { "" } else { "s" },
            self.warning_count(),
            if self.warning_count() == 1 { "" } else { "s" },
        ));
        out
    }
}

/// Rule engine with resolved severities.
#[derive(Debug, Clone)]
pub struct Linter {
    levels: BTreeMap<&'static str, Severity>,
}

impl Linter {
    /// Build a linter from config overrides. Unknown rule names are ignored.
    pub fn new(config: &LintConfig) -> Self {
        let levels = RULES
            .iter()
            .filter_map(|&(rule, default)| {
                let level = config.rules.get(rule).copied().unwrap_or(default);
                match level {
                    RuleLevel::Error => Some((rule, Severity::Error)),
                    RuleLevel::Warn => Some((rule, Severity::Warning)),
                    RuleLevel::Off => None,
                }
            })
            .collect();
        Self { levels }
    }

    /// Rule names in the config that no rule answers to.
    pub fn unknown_rules(config: &LintConfig) -> Vec<String> {
        config
            .rules
            .keys()
            .filter(|name| !RULES.iter().any(|(rule, _)| rule == name))
            .cloned()
            .collect()
    }

    /// Lint one source text.
    pub fn lint_source(&self, source: &str) -> Vec<Violation> {
        let mut violations = Vec::new();
        self.check_trailing_spaces(source, &mut violations);

        match tokenize(source).and_then(|tokens| check_brackets(&tokens).map(|_| tokens)) {
            Ok(tokens) => self.check_tokens(&tokens, &mut violations),
            Err(e) => violations.push(Violation {
                line: e.line,
                column: e.column,
                severity: Severity::Error,
                message: format!("Parsing error: {}", e.message),
                rule: SYNTAX_RULE,
            }),
        }

        violations.sort_by_key(|v| (v.line, v.column));
        violations
    }

    /// Lint several files.
    pub fn lint_files<'a>(&self, files: impl IntoIterator<Item = (PathBuf, &'a str)>) -> LintReport {
        LintReport {
            files: files
                .into_iter()
                .map(|(path, source)| FileReport { path, violations: self.lint_source(source) })
                .collect(),
        }
    }

    fn report(
        &self,
        rule: &'static str,
        token: &Token<'_>,
        message: impl Into<String>,
        out: &mut Vec<Violation>,
    ) {
        if let Some(&severity) = self.levels.get(rule) {
            out.push(Violation {
                line: token.line,
                column: token.column,
                severity,
                message: message.into(),
                rule,
            });
        }
    }

    fn check_tokens(&self, tokens: &[Token<'_>], out: &mut Vec<Violation>) {
        for (i, token) in tokens.iter().enumerate() {
            let after_dot = prev_significant(tokens, i).is_some_and(|p| tokens[p].is_punct("."));
            let next = next_significant(tokens, i).map(|n| &tokens[n]);

            match token.kind {
                TokenKind::Identifier if !after_dot => match token.text {
                    "debugger" => {
                        self.report("no-debugger", token, "Unexpected 'debugger' statement.", out)
                    }
                    "console" if next.is_some_and(|n| n.is_punct(".")) => {
                        self.report("no-console", token, "Unexpected console statement.", out)
                    }
                    "alert" | "confirm" | "prompt" if next.is_some_and(|n| n.is_punct("(")) => {
                        self.report("no-alert", token, format!("Unexpected {}.", token.text), out)
                    }
                    "var" => self.report(
                        "no-var",
                        token,
                        "Unexpected var, use let or const instead.",
                        out,
                    ),
                    _ => {}
                },
                TokenKind::Punct if token.text == "==" || token.text == "!=" => {
                    let message = format!("Expected '{}=' and instead saw '{}'.", token.text, token.text);
                    self.report("eqeqeq", token, message, out);
                }
                _ => {}
            }
        }
    }

    fn check_trailing_spaces(&self, source: &str, out: &mut Vec<Violation>) {
        let Some(&severity) = self.levels.get("no-trailing-spaces") else {
            return;
        };
        for (index, line) in source.split('\n').enumerate() {
            let line = line.strip_suffix('\r').unwrap_or(line);
            let trimmed = line.trim_end_matches([' ', '\t']);
            if trimmed.len() < line.len() {
                out.push(Violation {
                    line: index + 1,
                    column: trimmed.chars().count() + 1,
                    severity,
                    message: "Trailing spaces not allowed.".to_string(),
                    rule: "no-trailing-spaces",
                });
            }
        }
    }
}

impl Default for Linter {
    fn default() -> Self {
        Self::new(&LintConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(violations: &[Violation]) -> Vec<&'static str> {
        violations.iter().map(|v| v.rule).collect()
    }

    #[test]
    fn test_default_rules() {
        let src = "function f(a) {\n  debugger;\n  console.log(a);\n  if (a == 1) alert('x');\n}\n";
        let violations = Linter::default().lint_source(src);

        assert_eq!(rules(&violations), vec!["no-debugger", "no-console", "eqeqeq", "no-alert"]);
        assert_eq!((violations[0].line, violations[0].column), (2, 3));
        assert_eq!(violations[0].severity, Severity::Error);
        assert_eq!(violations[1].severity, Severity::Warning);
        assert_eq!(violations[2].message, "Expected '===' and instead saw '=='.");
    }

    #[test]
    fn test_property_access_is_not_flagged() {
        let src = "obj.debugger = 1; x.console.log(1); window.prompt; var a = alert;";
        let violations = Linter::default().lint_source(src);
        assert!(violations.is_empty(), "{:?}", violations);
    }

    #[test]
    fn test_config_overrides() {
        let mut config = LintConfig::default();
        config.rules.insert("no-debugger".to_string(), RuleLevel::Off);
        config.rules.insert("no-var".to_string(), RuleLevel::Error);
        config.rules.insert("no-such-rule".to_string(), RuleLevel::Warn);

        let linter = Linter::new(&config);
        let violations = linter.lint_source("var x = 1;\ndebugger;\n");
        assert_eq!(rules(&violations), vec!["no-var"]);
        assert_eq!(violations[0].severity, Severity::Error);
        assert_eq!(Linter::unknown_rules(&config), vec!["no-such-rule".to_string()]);
    }

    #[test]
    fn test_trailing_spaces() {
        let violations = Linter::default().lint_source("a();  \r\nb();\n\t\n");
        assert_eq!(violations.len(), 2);
        assert_eq!((violations[0].line, violations[0].column), (1, 5));
        assert_eq!((violations[1].line, violations[1].column), (3, 1));
    }

    #[test]
    fn test_syntax_error_reported() {
        let violations = Linter::default().lint_source("function f() {\n  return 'x;\n}\n");
        assert_eq!(rules(&violations), vec!["syntax"]);
        assert_eq!(violations[0].severity, Severity::Error);
        assert!(violations[0].message.starts_with("Parsing error: Unterminated string"));

        let violations = Linter::default().lint_source("if (a) {\n");
        assert_eq!(violations[0].message, "Parsing error: Unclosed '{'");
    }

    #[test]
    fn test_stylish_format() {
        let linter = Linter::default();
        let report = linter.lint_files(vec![
            (PathBuf::from("app/scripts/app.js"), "debugger;\nconsole.log(1);\n"),
            (PathBuf::from("app/scripts/ok.js"), "let a = 1;\n"),
        ]);

        assert_eq!(report.error_count(), 1);
        assert_eq!(report.warning_count(), 1);

        let text = report.format_stylish();
        assert!(text.starts_with("app/scripts/app.js\n"));
        assert!(text.contains("  1:1  error    Unexpected 'debugger' statement.  no-debugger\n"));
        assert!(text.contains("  2:1  warning  Unexpected console statement.  no-console\n"));
        assert!(!text.contains("ok.js"));
        assert!(text.ends_with("\u{2716} 2 problems (1 error, 1 warning)\n"));
    }

    #[test]
    fn test_clean_report_formats_empty() {
        let report = Linter::default().lint_files(vec![(PathBuf::from("a.js"), "let a = 1;\n")]);
        assert!(report.is_clean());
        assert_eq!(report.format_stylish(), "");
    }
}
