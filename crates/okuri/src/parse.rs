//! Reader for the textual input method description format.
//!
//! The format is a sequence of nested lists with three leaf kinds:
//! integers (`10`, `0x20`, `?a` for a character code), symbols, and
//! double-quoted texts with `\` escapes. `;` starts a comment running to end
//! of line. The reader produces the raw [`Value`] tree; all interpretation
//! happens in the loader.
//!
//! Parsed trees can be cached in a binary form with [`dump_description`] and
//! [`load_description`] to skip re-reading on subsequent engine startups.

use std::fmt;

use crate::value::Value;

/// Maximum nesting depth for description lists.
///
/// Descriptions are shallow in practice; the cap exists so a malformed file
/// cannot overflow the stack of the recursive reader.
pub const MAX_NESTING_DEPTH: usize = 64;

/// Error produced by the description reader, with 1-based position.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ParseError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "parse error at {}:{}: {}", self.line, self.column, self.message)
    }
}

impl std::error::Error for ParseError {}

/// Parses a description text into its top-level value list.
pub fn parse_description(source: &str) -> Result<Vec<Value>, ParseError> {
    let mut reader = Reader::new(source);
    let mut values = Vec::new();
    loop {
        reader.skip_blank();
        if reader.at_end() {
            return Ok(values);
        }
        values.push(reader.read_value(0)?);
    }
}

/// Serializes a parsed description tree to a compact binary form.
pub fn dump_description(tree: &[Value]) -> Result<Vec<u8>, postcard::Error> {
    postcard::to_allocvec(tree)
}

/// Restores a description tree from [`dump_description`] output.
pub fn load_description(bytes: &[u8]) -> Result<Vec<Value>, postcard::Error> {
    postcard::from_bytes(bytes)
}

struct Reader<'a> {
    rest: std::str::Chars<'a>,
    peeked: Option<char>,
    line: usize,
    column: usize,
}

impl<'a> Reader<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            rest: source.chars(),
            peeked: None,
            line: 1,
            column: 0,
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            line: self.line,
            column: self.column.max(1),
            message: message.into(),
        }
    }

    fn peek(&mut self) -> Option<char> {
        if self.peeked.is_none() {
            self.peeked = self.rest.next();
        }
        self.peeked
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peeked.take().or_else(|| self.rest.next())?;
        if c == '\n' {
            self.line += 1;
            self.column = 0;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn at_end(&mut self) -> bool {
        self.peek().is_none()
    }

    /// Skips whitespace and `;` comments.
    fn skip_blank(&mut self) {
        while let Some(c) = self.peek() {
            if c == ';' {
                while let Some(c) = self.bump() {
                    if c == '\n' {
                        break;
                    }
                }
            } else if c.is_whitespace() {
                self.bump();
            } else {
                break;
            }
        }
    }

    fn read_value(&mut self, depth: usize) -> Result<Value, ParseError> {
        if depth > MAX_NESTING_DEPTH {
            return Err(self.error("nesting too deep"));
        }
        self.skip_blank();
        match self.peek() {
            None => Err(self.error("unexpected end of input")),
            Some('(') => self.read_list(depth),
            Some(')') => Err(self.error("unexpected ')'")),
            Some('"') => self.read_text(),
            Some('?') => self.read_char_literal(),
            Some(_) => self.read_atom(),
        }
    }

    fn read_list(&mut self, depth: usize) -> Result<Value, ParseError> {
        self.bump(); // consume '('
        let mut items = Vec::new();
        loop {
            self.skip_blank();
            match self.peek() {
                None => return Err(self.error("unterminated list")),
                Some(')') => {
                    self.bump();
                    return Ok(Value::List(items));
                }
                Some(_) => items.push(self.read_value(depth + 1)?),
            }
        }
    }

    fn read_text(&mut self) -> Result<Value, ParseError> {
        self.bump(); // consume '"'
        let mut text = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated text")),
                Some('"') => return Ok(Value::Text(text)),
                Some('\\') => match self.bump() {
                    None => return Err(self.error("unterminated escape")),
                    Some('n') => text.push('\n'),
                    Some('t') => text.push('\t'),
                    Some('e') => text.push('\u{1b}'),
                    Some('u') => text.push(self.read_unicode_escape()?),
                    Some(c) => text.push(c),
                },
                Some(c) => text.push(c),
            }
        }
    }

    /// Reads the hex digits of a `\uXXXX` escape (1..=6 digits).
    fn read_unicode_escape(&mut self) -> Result<char, ParseError> {
        let mut code = 0u32;
        let mut digits = 0;
        while digits < 6 {
            match self.peek() {
                Some(c) if c.is_ascii_hexdigit() => {
                    self.bump();
                    code = code * 16 + c.to_digit(16).expect("hex digit");
                    digits += 1;
                }
                _ => break,
            }
        }
        if digits == 0 {
            return Err(self.error("\\u escape needs hex digits"));
        }
        char::from_u32(code).ok_or_else(|| self.error(format!("invalid character code {code:#x}")))
    }

    /// Reads a `?c` character literal as its integer code.
    fn read_char_literal(&mut self) -> Result<Value, ParseError> {
        self.bump(); // consume '?'
        match self.bump() {
            None => Err(self.error("'?' needs a character")),
            Some('\\') => match self.bump() {
                None => Err(self.error("unterminated escape")),
                Some('n') => Ok(Value::Integer(i64::from(b'\n'))),
                Some('t') => Ok(Value::Integer(i64::from(b'\t'))),
                Some(c) => Ok(Value::Integer(i64::from(u32::from(c)))),
            },
            Some(c) => Ok(Value::Integer(i64::from(u32::from(c)))),
        }
    }

    /// Reads an integer or symbol atom.
    fn read_atom(&mut self) -> Result<Value, ParseError> {
        let mut atom = String::new();
        while let Some(c) = self.peek() {
            if c.is_whitespace() || c == '(' || c == ')' || c == ';' || c == '"' {
                break;
            }
            atom.push(c);
            self.bump();
        }
        debug_assert!(!atom.is_empty());
        if let Some(hex) = atom.strip_prefix("0x").or_else(|| atom.strip_prefix("0X")) {
            if let Ok(n) = i64::from_str_radix(hex, 16) {
                return Ok(Value::Integer(n));
            }
        }
        if atom.starts_with(|c: char| c.is_ascii_digit())
            || (atom.len() > 1 && atom.starts_with('-') && atom[1..].starts_with(|c: char| c.is_ascii_digit()))
        {
            match atom.parse::<i64>() {
                Ok(n) => return Ok(Value::Integer(n)),
                Err(_) => return Err(self.error(format!("malformed integer '{atom}'"))),
            }
        }
        Ok(Value::Symbol(atom))
    }
}
