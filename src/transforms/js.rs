//! Script steps: debug statement removal and minification.

use crate::build::pipeline::{each, FileRecord, Transform, TransformError};
use crate::tokenizer::{next_significant, prev_significant, tokenize, LexError, Token, TokenKind};

/// Replace `console.*(...)` and `alert(...)` calls with `void 0` and drop
/// `debugger` statements.
///
/// A `debugger` without its own `;` becomes an empty statement so that a
/// braceless `if`/`else`/loop body keeps a body.
///
/// Calls become `void 0` rather than disappearing so that expressions such
/// as `ok && console.log(x)` stay valid.
///
/// ```
/// use assetflow::transforms::js::strip_debug;
///
/// assert_eq!(strip_debug("console.log(a); run();").unwrap(), "void 0; run();");
/// ```
pub fn strip_debug(source: &str) -> Result<String, LexError> {
    let tokens = tokenize(source)?;
    let mut out = String::with_capacity(source.len());
    let mut last = 0;
    let mut i = 0;

    while i < tokens.len() {
        let token = &tokens[i];
        let after_dot = prev_significant(&tokens, i).is_some_and(|p| tokens[p].is_punct("."));

        if token.kind == TokenKind::Identifier && !after_dot {
            let removal = match token.text {
                "debugger" => {
                    let terminated = next_significant(&tokens, i).is_some_and(|n| tokens[n].is_punct(";"));
                    Some((i, if terminated { "" } else { ";" }))
                }
                "console" => call_end(&tokens, i, true).map(|end| (end, "void 0")),
                "alert" => call_end(&tokens, i, false).map(|end| (end, "void 0")),
                _ => None,
            };
            if let Some((end, replacement)) = removal {
                out.push_str(&source[last..token.offset]);
                out.push_str(replacement);
                last = tokens[end].end();
                i = end + 1;
                continue;
            }
        }
        i += 1;
    }

    out.push_str(&source[last..]);
    Ok(out)
}

/// Index of the `)` closing a call that starts at `start`.
///
/// With `member` set the callee must be a property chain (`console.log`).
fn call_end(tokens: &[Token<'_>], start: usize, member: bool) -> Option<usize> {
    let mut index = start;
    if member {
        let mut seen_property = false;
        while let Some(dot) = next_significant(tokens, index).filter(|&d| tokens[d].is_punct(".")) {
            let property = next_significant(tokens, dot)?;
            if tokens[property].kind != TokenKind::Identifier {
                return None;
            }
            index = property;
            seen_property = true;
        }
        if !seen_property {
            return None;
        }
    }

    let open = next_significant(tokens, index).filter(|&o| tokens[o].is_punct("("))?;
    let mut depth = 0usize;
    for (offset, token) in tokens[open..].iter().enumerate() {
        if token.kind != TokenKind::Punct {
            continue;
        }
        match token.text {
            "(" | "[" | "{" => depth += 1,
            ")" | "]" | "}" => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(open + offset);
                }
            }
            _ => {}
        }
    }
    None
}

/// Remove comments and collapse whitespace.
///
/// `/*!` comments are kept on their own line. Line breaks are kept where
/// automatic semicolon insertion could depend on them.
///
/// ```
/// use assetflow::transforms::js::minify_js;
///
/// assert_eq!(minify_js("var a = 1; // one\nvar b = a;").unwrap(), "var a=1;var b=a;");
/// ```
pub fn minify_js(source: &str) -> Result<String, LexError> {
    let tokens = tokenize(source)?;
    let mut out = String::with_capacity(source.len() / 2);
    let mut prev: Option<&Token<'_>> = None;
    let mut pending_space = false;
    let mut pending_newline = false;

    for token in &tokens {
        match token.kind {
            TokenKind::Whitespace | TokenKind::LineComment => pending_space = true,
            TokenKind::Newline => pending_newline = true,
            TokenKind::BlockComment if token.text.starts_with("/*!") => {
                if !out.is_empty() && !out.ends_with('\n') {
                    out.push('\n');
                }
                out.push_str(token.text);
                out.push('\n');
                prev = None;
                pending_space = false;
                pending_newline = false;
            }
            TokenKind::BlockComment => {
                if token.text.contains('\n') {
                    pending_newline = true;
                } else {
                    pending_space = true;
                }
            }
            _ => {
                if let Some(p) = prev {
                    if pending_newline && newline_matters(p, token) {
                        out.push('\n');
                    } else if (pending_space || pending_newline) && needs_space(p, token) {
                        out.push(' ');
                    }
                }
                out.push_str(token.text);
                prev = Some(token);
                pending_space = false;
                pending_newline = false;
            }
        }
    }

    Ok(out)
}

fn is_word_like(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Identifier | TokenKind::Number | TokenKind::String | TokenKind::Template | TokenKind::Regex
    )
}

/// Keywords after which a line break always ends the statement.
const RESTRICTED: &[&str] = &["return", "throw", "break", "continue", "yield"];

/// Whether a line break between `prev` and `next` may end a statement.
fn newline_matters(prev: &Token<'_>, next: &Token<'_>) -> bool {
    if prev.kind == TokenKind::Identifier && RESTRICTED.contains(&prev.text) {
        return true;
    }
    let ends = is_word_like(prev.kind) || matches!(prev.text, ")" | "]" | "}" | "++" | "--");
    let starts = is_word_like(next.kind) || matches!(next.text, "{" | "++" | "--" | "!" | "~");
    ends && starts
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$' || c == '\\' || !c.is_ascii()
}

/// Whether joining `prev` and `next` directly would change how they lex.
fn needs_space(prev: &Token<'_>, next: &Token<'_>) -> bool {
    let (Some(a), Some(b)) = (prev.text.chars().last(), next.text.chars().next()) else {
        return false;
    };
    (is_word_char(a) && is_word_char(b))
        || (a == '+' && b == '+')
        || (a == '-' && b == '-')
        || (a == '/' && (b == '/' || b == '*'))
        || (prev.kind == TokenKind::Number && b == '.')
}

fn lex_error(step: &'static str, file: &FileRecord, e: LexError) -> TransformError {
    TransformError::new(step, file.path(), e.to_string())
}

/// Pipeline step running [`strip_debug`].
#[derive(Debug, Clone, Default)]
pub struct StripDebug;

impl Transform for StripDebug {
    fn name(&self) -> &'static str {
        "strip-debug"
    }

    fn apply(&self, files: Vec<FileRecord>) -> Result<Vec<FileRecord>, TransformError> {
        each(files, |mut file| {
            let stripped = strip_debug(file.text(self.name())?).map_err(|e| lex_error(self.name(), &file, e))?;
            file.set_text(stripped);
            Ok(file)
        })
    }
}

/// Pipeline step running [`minify_js`].
#[derive(Debug, Clone, Default)]
pub struct JsMinify;

impl Transform for JsMinify {
    fn name(&self) -> &'static str {
        "uglify"
    }

    fn apply(&self, files: Vec<FileRecord>) -> Result<Vec<FileRecord>, TransformError> {
        each(files, |mut file| {
            let minified = minify_js(file.text(self.name())?).map_err(|e| lex_error(self.name(), &file, e))?;
            file.set_text(minified);
            Ok(file)
        })
    }
}
