//! Token extraction from script sources
//!
//! A lexer for browser JavaScript, precise enough for linting, debug
//! stripping and whitespace minification. It does not build a syntax tree.
//! Regular expression literals are told apart from division by looking at
//! the previous significant token.

/// Kind of a lexed token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Whitespace without a line break
    Whitespace,
    /// Whitespace containing at least one line break
    Newline,
    LineComment,
    BlockComment,
    /// Single- or double-quoted string
    String,
    /// Template literal, including any `${}` expressions
    Template,
    Regex,
    Number,
    /// Identifier or keyword
    Identifier,
    Punct,
}

/// A token borrowed from the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    /// Byte offset into the source
    pub offset: usize,
    /// 1-based line
    pub line: usize,
    /// 1-based column, in characters
    pub column: usize,
}

impl Token<'_> {
    /// Whitespace or comment.
    pub fn is_trivia(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::Whitespace | TokenKind::Newline | TokenKind::LineComment | TokenKind::BlockComment
        )
    }

    /// Check kind and text at once.
    pub fn is(&self, kind: TokenKind, text: &str) -> bool {
        self.kind == kind && self.text == text
    }

    /// Punctuator with the given text.
    pub fn is_punct(&self, text: &str) -> bool {
        self.is(TokenKind::Punct, text)
    }

    /// Byte offset just past the token.
    pub fn end(&self) -> usize {
        self.offset + self.text.len()
    }
}

/// A source that cannot be tokenized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} ({line}:{column})")]
pub struct LexError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl LexError {
    pub fn new(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self { message: message.into(), line, column }
    }
}

/// Keywords after which a `/` starts a regular expression.
const REGEX_KEYWORDS: &[&str] = &[
    "return", "typeof", "instanceof", "in", "of", "new", "delete", "void", "throw", "case", "do",
    "else", "yield", "await",
];

/// Multi-character punctuators, longest first.
const PUNCTUATORS: &[&str] = &[
    ">>>=", "...", "===", "!==", "**=", "<<=", ">>=", ">>>", "&&=", "||=", "??=", "=>", "==", "!=",
    "<=", ">=", "&&", "||", "??", "?.", "++", "--", "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=",
    "**", "<<", ">>",
];

/// Split `source` into tokens, trivia included.
///
/// Concatenating the token texts reproduces the source exactly.
///
/// # Examples
///
/// ```
/// use assetflow::tokenizer::{tokenize, TokenKind};
///
/// let tokens = tokenize("a = /x/g;").unwrap();
/// let regex = tokens.iter().find(|t| t.kind == TokenKind::Regex).unwrap();
/// assert_eq!(regex.text, "/x/g");
/// ```
pub fn tokenize(source: &str) -> Result<Vec<Token<'_>>, LexError> {
    let mut lexer = Lexer { src: source, pos: 0, line: 1, column: 1, regex_allowed: true };
    let mut tokens = Vec::new();

    while lexer.pos < source.len() {
        let token = lexer.next_token()?;
        if !token.is_trivia() {
            lexer.regex_allowed = regex_may_follow(&token);
        }
        tokens.push(token);
    }

    Ok(tokens)
}

/// Tokens that are neither whitespace nor comments.
pub fn significant<'a, 'b>(tokens: &'b [Token<'a>]) -> impl Iterator<Item = (usize, &'b Token<'a>)> {
    tokens.iter().enumerate().filter(|(_, t)| !t.is_trivia())
}

/// Index of the next significant token after `index`.
pub fn next_significant(tokens: &[Token<'_>], index: usize) -> Option<usize> {
    (index + 1..tokens.len()).find(|&i| !tokens[i].is_trivia())
}

/// Index of the previous significant token before `index`.
pub fn prev_significant(tokens: &[Token<'_>], index: usize) -> Option<usize> {
    (0..index).rev().find(|&i| !tokens[i].is_trivia())
}

/// Check that brackets are balanced and correctly nested.
pub fn check_brackets(tokens: &[Token<'_>]) -> Result<(), LexError> {
    let mut stack: Vec<&Token<'_>> = Vec::new();

    for token in tokens.iter().filter(|t| t.kind == TokenKind::Punct) {
        match token.text {
            "(" | "[" | "{" => stack.push(token),
            ")" | "]" | "}" => {
                let expected = match token.text {
                    ")" => "(",
                    "]" => "[",
                    _ => "{",
                };
                match stack.pop() {
                    Some(open) if open.text == expected => {}
                    _ => {
                        return Err(LexError::new(
                            format!("Unexpected token '{}'", token.text),
                            token.line,
                            token.column,
                        ))
                    }
                }
            }
            _ => {}
        }
    }

    match stack.pop() {
        Some(open) => {
            Err(LexError::new(format!("Unclosed '{}'", open.text), open.line, open.column))
        }
        None => Ok(()),
    }
}

fn regex_may_follow(token: &Token<'_>) -> bool {
    match token.kind {
        TokenKind::Identifier => REGEX_KEYWORDS.contains(&token.text),
        TokenKind::Punct => !matches!(token.text, ")" | "]" | "}" | "++" | "--"),
        _ => false,
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '$' || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '$' || c == '_' || c == '\u{200c}' || c == '\u{200d}'
}

struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    line: usize,
    column: usize,
    regex_allowed: bool,
}

impl<'a> Lexer<'a> {
    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.src[self.pos..].chars().nth(n)
    }

    fn starts_with(&self, s: &str) -> bool {
        self.src[self.pos..].starts_with(s)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn bump_while(&mut self, pred: impl Fn(char) -> bool) {
        while self.peek().is_some_and(&pred) {
            self.bump();
        }
    }

    fn next_token(&mut self) -> Result<Token<'a>, LexError> {
        let offset = self.pos;
        let (line, column) = (self.line, self.column);
        let c = self.peek().ok_or_else(|| LexError::new("Unexpected end of input", line, column))?;

        let kind = if c.is_whitespace() {
            self.bump_while(char::is_whitespace);
            if self.src[offset..self.pos].contains('\n') {
                TokenKind::Newline
            } else {
                TokenKind::Whitespace
            }
        } else if self.starts_with("//") {
            self.bump_while(|c| c != '\n');
            TokenKind::LineComment
        } else if self.starts_with("/*") {
            self.block_comment(line, column)?;
            TokenKind::BlockComment
        } else if c == '"' || c == '\'' {
            self.string(c, line, column)?;
            TokenKind::String
        } else if c == '`' {
            self.template(line, column)?;
            TokenKind::Template
        } else if c.is_ascii_digit() || (c == '.' && self.peek_at(1).is_some_and(|d| d.is_ascii_digit())) {
            self.number();
            TokenKind::Number
        } else if is_ident_start(c) {
            self.bump_while(is_ident_continue);
            TokenKind::Identifier
        } else if c == '/' && self.regex_allowed {
            self.regex(line, column)?;
            TokenKind::Regex
        } else {
            self.punct();
            TokenKind::Punct
        };

        Ok(Token { kind, text: &self.src[offset..self.pos], offset, line, column })
    }

    fn block_comment(&mut self, line: usize, column: usize) -> Result<(), LexError> {
        self.bump();
        self.bump();
        loop {
            if self.starts_with("*/") {
                self.bump();
                self.bump();
                return Ok(());
            }
            if self.bump().is_none() {
                return Err(LexError::new("Unterminated comment", line, column));
            }
        }
    }

    fn string(&mut self, quote: char, line: usize, column: usize) -> Result<(), LexError> {
        self.bump();
        loop {
            match self.bump() {
                None | Some('\n') => return Err(LexError::new("Unterminated string constant", line, column)),
                Some('\\') => {
                    if self.bump().is_none() {
                        return Err(LexError::new("Unterminated string constant", line, column));
                    }
                }
                Some(c) if c == quote => return Ok(()),
                Some(_) => {}
            }
        }
    }

    fn template(&mut self, line: usize, column: usize) -> Result<(), LexError> {
        self.bump();
        loop {
            match self.bump() {
                None => return Err(LexError::new("Unterminated template literal", line, column)),
                Some('\\') => {
                    self.bump();
                }
                Some('`') => return Ok(()),
                Some('$') if self.peek() == Some('{') => {
                    self.bump();
                    self.template_expression(line, column)?;
                }
                Some(_) => {}
            }
        }
    }

    /// Skip a `${ ... }` expression, the opening brace already consumed.
    fn template_expression(&mut self, line: usize, column: usize) -> Result<(), LexError> {
        let mut depth = 1;
        loop {
            let (l, c) = (self.line, self.column);
            match self.peek() {
                None => return Err(LexError::new("Unterminated template literal", line, column)),
                Some('{') => {
                    depth += 1;
                    self.bump();
                }
                Some('}') => {
                    depth -= 1;
                    self.bump();
                    if depth == 0 {
                        return Ok(());
                    }
                }
                Some(q @ ('"' | '\'')) => self.string(q, l, c)?,
                Some('`') => self.template(l, c)?,
                Some('/') if self.starts_with("//") => self.bump_while(|c| c != '\n'),
                Some('/') if self.starts_with("/*") => self.block_comment(l, c)?,
                Some(_) => {
                    self.bump();
                }
            }
        }
    }

    fn number(&mut self) {
        let hex = self.starts_with("0x") || self.starts_with("0X");
        let mut last = '\0';
        while let Some(c) = self.peek() {
            let exponent_sign = (c == '+' || c == '-') && !hex && (last == 'e' || last == 'E');
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' || exponent_sign {
                last = c;
                self.bump();
            } else {
                break;
            }
        }
    }

    fn regex(&mut self, line: usize, column: usize) -> Result<(), LexError> {
        self.bump();
        let mut in_class = false;
        loop {
            match self.bump() {
                None | Some('\n') => {
                    return Err(LexError::new("Unterminated regular expression", line, column))
                }
                Some('\\') => {
                    if matches!(self.bump(), None | Some('\n')) {
                        return Err(LexError::new("Unterminated regular expression", line, column));
                    }
                }
                Some('[') => in_class = true,
                Some(']') => in_class = false,
                Some('/') if !in_class => break,
                Some(_) => {}
            }
        }
        self.bump_while(is_ident_continue);
        Ok(())
    }

    fn punct(&mut self) {
        if let Some(p) = PUNCTUATORS.iter().find(|p| self.starts_with(p)) {
            for _ in 0..p.len() {
                self.bump();
            }
        } else {
            self.bump();
        }
    }
}
