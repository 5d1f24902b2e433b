//! Lexer for the rule language.
//!
//! Input is first folded into logical lines (a trailing `\` joins the next
//! physical line, whose leading whitespace is dropped), then each logical
//! line is split into tokens. Double-quoted tokens may contain whitespace;
//! inside them only `\"` is unescaped, every other backslash is kept so that
//! regular expressions pass through untouched.

use crate::error::{Error, Result};

/// One logical line of input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalLine {
    /// Line number (1-indexed) of the first physical line.
    pub line: usize,
    /// Joined text, without comments and surrounding whitespace.
    pub text: String,
}

/// A token of a logical line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Token text with quotes removed.
    pub text: String,
    /// Whether the token was written in double quotes.
    pub quoted: bool,
}

/// Iterator over the logical lines of a rules file.
pub struct Lexer<'a> {
    lines: std::iter::Enumerate<std::str::Lines<'a>>,
}

impl<'a> Lexer<'a> {
    /// Create a lexer over `input`.
    pub fn new(input: &'a str) -> Self {
        Self {
            lines: input.lines().enumerate(),
        }
    }
}

impl Iterator for Lexer<'_> {
    type Item = LogicalLine;

    fn next(&mut self) -> Option<LogicalLine> {
        loop {
            let (index, first) = self.lines.next()?;
            let trimmed = first.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let mut text = String::new();
            let mut current = trimmed;
            loop {
                match current.strip_suffix('\\') {
                    Some(head) => {
                        text.push_str(head);
                        match self.lines.next() {
                            Some((_, next)) => current = next.trim(),
                            None => break,
                        }
                    }
                    None => {
                        text.push_str(current);
                        break;
                    }
                }
            }

            let text = text.trim().to_string();
            if text.is_empty() {
                continue;
            }
            return Some(LogicalLine {
                line: index + 1,
                text,
            });
        }
    }
}

/// Split a logical line into tokens.
///
/// Unquoted tokens end at whitespace. A `#` outside quotes that starts a
/// token begins a trailing comment.
pub fn tokenize(line: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if c == '#' {
            break;
        }
        if c == '"' {
            chars.next();
            let mut text = String::new();
            let mut closed = false;
            while let Some(c) = chars.next() {
                match c {
                    '\\' => match chars.next() {
                        Some('"') => text.push('"'),
                        Some(other) => {
                            text.push('\\');
                            text.push(other);
                        }
                        None => text.push('\\'),
                    },
                    '"' => {
                        closed = true;
                        break;
                    }
                    other => text.push(other),
                }
            }
            if !closed {
                return Err(Error::parse("unterminated quoted argument", ""));
            }
            tokens.push(Token { text, quoted: true });
            continue;
        }

        let mut text = String::new();
        while let Some(&c) = chars.peek() {
            if c.is_whitespace() {
                break;
            }
            text.push(c);
            chars.next();
        }
        tokens.push(Token {
            text,
            quoted: false,
        });
    }

    Ok(tokens)
}
