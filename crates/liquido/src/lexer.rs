//! Template tokenizer
//!
//! Splits template source into literal text runs and the tokens found inside
//! `{{ ... }}` output tags and `{% ... %}` logic tags. The lexer is lazy: it
//! implements [`Iterator`] and only scans as far as the consumer pulls. The
//! first error ends the stream.

use std::cell::Cell;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::SyntaxError;

/// Location in source text
///
/// `line` and `column` are 1-based; `column` counts characters. `offset` is
/// the 0-based byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
    pub offset: usize,
}

impl Position {
    pub fn new(line: usize, column: usize, offset: usize) -> Self {
        Self {
            line,
            column,
            offset,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// Reserved words recognized inside tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    For,
    In,
    EndFor,
    If,
    Elsif,
    Else,
    EndIf,
    Unless,
    EndUnless,
    Case,
    When,
    EndCase,
    Assign,
    Capture,
    EndCapture,
    Comment,
    EndComment,
    Raw,
    EndRaw,
    And,
    Or,
    Contains,
    True,
    False,
    Nil,
}

impl Keyword {
    pub fn from_word(word: &str) -> Option<Self> {
        let keyword = match word {
            "for" => Keyword::For,
            "in" => Keyword::In,
            "endfor" => Keyword::EndFor,
            "if" => Keyword::If,
            "elsif" => Keyword::Elsif,
            "else" => Keyword::Else,
            "endif" => Keyword::EndIf,
            "unless" => Keyword::Unless,
            "endunless" => Keyword::EndUnless,
            "case" => Keyword::Case,
            "when" => Keyword::When,
            "endcase" => Keyword::EndCase,
            "assign" => Keyword::Assign,
            "capture" => Keyword::Capture,
            "endcapture" => Keyword::EndCapture,
            "comment" => Keyword::Comment,
            "endcomment" => Keyword::EndComment,
            "raw" => Keyword::Raw,
            "endraw" => Keyword::EndRaw,
            "and" => Keyword::And,
            "or" => Keyword::Or,
            "contains" => Keyword::Contains,
            "true" => Keyword::True,
            "false" => Keyword::False,
            "nil" | "null" => Keyword::Nil,
            _ => return None,
        };
        Some(keyword)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Keyword::For => "for",
            Keyword::In => "in",
            Keyword::EndFor => "endfor",
            Keyword::If => "if",
            Keyword::Elsif => "elsif",
            Keyword::Else => "else",
            Keyword::EndIf => "endif",
            Keyword::Unless => "unless",
            Keyword::EndUnless => "endunless",
            Keyword::Case => "case",
            Keyword::When => "when",
            Keyword::EndCase => "endcase",
            Keyword::Assign => "assign",
            Keyword::Capture => "capture",
            Keyword::EndCapture => "endcapture",
            Keyword::Comment => "comment",
            Keyword::EndComment => "endcomment",
            Keyword::Raw => "raw",
            Keyword::EndRaw => "endraw",
            Keyword::And => "and",
            Keyword::Or => "or",
            Keyword::Contains => "contains",
            Keyword::True => "true",
            Keyword::False => "false",
            Keyword::Nil => "nil",
        }
    }

    /// Tag that closes a block opened by this keyword
    pub fn closing(self) -> Option<Keyword> {
        match self {
            Keyword::For => Some(Keyword::EndFor),
            Keyword::If => Some(Keyword::EndIf),
            Keyword::Unless => Some(Keyword::EndUnless),
            Keyword::Case => Some(Keyword::EndCase),
            Keyword::Capture => Some(Keyword::EndCapture),
            Keyword::Comment => Some(Keyword::EndComment),
            Keyword::Raw => Some(Keyword::EndRaw),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Text outside of tags, emitted verbatim
    Literal,
    /// `{{` or `{{-`
    OutputOpen,
    /// `}}` or `-}}`
    OutputClose,
    /// `{%` or `{%-`
    TagOpen,
    /// `%}` or `-%}`
    TagClose,
    Identifier,
    Keyword(Keyword),
    /// Quoted string; the token text excludes the quotes
    String,
    Number,
    /// Comparison operator (`==`, `!=`, `<>`, `<`, `>`, `<=`, `>=`)
    Operator,
    /// `=` in `assign`
    Assign,
    Pipe,
    Colon,
    Comma,
    Dot,
    DotDot,
    LBracket,
    RBracket,
    LParen,
    RParen,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    pub position: Position,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delimiter {
    Output,
    Tag,
}

impl Delimiter {
    fn open(self) -> &'static str {
        match self {
            Delimiter::Output => "{{",
            Delimiter::Tag => "{%",
        }
    }

    fn close(self) -> &'static str {
        match self {
            Delimiter::Output => "}}",
            Delimiter::Tag => "%}",
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Mode {
    Text,
    Inside { delimiter: Delimiter, start: usize },
    /// Body of `raw` / `comment`, scanned without tokenizing
    Verbatim { opener: Keyword, start: usize },
}

/// Lazy token stream over template source
pub struct Lexer<'a> {
    source: &'a str,
    line_starts: Vec<usize>,
    /// Last position handed out; columns on the same line count on from it
    last_position: Cell<Position>,
    cursor: usize,
    mode: Mode,
    trim_next: bool,
    last: Option<TokenKind>,
    tag_tokens: usize,
    pending_verbatim: Option<(Keyword, usize)>,
    finished: bool,
}

/// Tokenize template source
pub fn tokenize(source: &str) -> Lexer<'_> {
    Lexer::new(source)
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        let line_starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self {
            source,
            line_starts,
            last_position: Cell::new(Position::new(1, 1, 0)),
            cursor: 0,
            mode: Mode::Text,
            trim_next: false,
            last: None,
            tag_tokens: 0,
            pending_verbatim: None,
            finished: false,
        }
    }

    /// Line/column for a byte offset into the source
    pub fn position_at(&self, offset: usize) -> Position {
        let line = self
            .line_starts
            .partition_point(|&start| start <= offset)
            .saturating_sub(1);
        let last = self.last_position.get();
        let column = if last.line == line + 1 && last.offset <= offset {
            last.column + self.source[last.offset..offset].chars().count()
        } else {
            let line_start = self.line_starts[line];
            self.source[line_start..offset].chars().count() + 1
        };
        let position = Position::new(line + 1, column, offset);
        self.last_position.set(position);
        position
    }

    fn token(&self, kind: TokenKind, start: usize, end: usize) -> Token<'a> {
        Token {
            kind,
            text: &self.source[start..end],
            position: self.position_at(start),
        }
    }

    fn next_token(&mut self) -> Result<Option<Token<'a>>, SyntaxError> {
        match self.mode {
            Mode::Text => {
                if self.cursor >= self.source.len() {
                    return Ok(None);
                }
                let end = find_tag_start(self.source, self.cursor).unwrap_or(self.source.len());
                if let Some(literal) = self.literal(end) {
                    return Ok(Some(literal));
                }
                if self.cursor >= self.source.len() {
                    return Ok(None);
                }
                self.lex_open().map(Some)
            }
            Mode::Inside { delimiter, start } => self.lex_inside(delimiter, start).map(Some),
            Mode::Verbatim { opener, start } => {
                let closing = opener.closing().unwrap_or(opener);
                let end = find_end_tag(self.source, self.cursor, closing.as_str()).ok_or_else(|| {
                    SyntaxError::UnclosedBlock {
                        tag: opener.as_str().to_string(),
                        position: self.position_at(start),
                    }
                })?;
                self.mode = Mode::Text;
                match self.literal(end) {
                    Some(literal) => Ok(Some(literal)),
                    None => self.lex_open().map(Some),
                }
            }
        }
    }

    /// Consume text up to `end`, applying whitespace control on both sides
    fn literal(&mut self, end: usize) -> Option<Token<'a>> {
        let mut start = self.cursor;
        self.cursor = end;
        if std::mem::take(&mut self.trim_next) {
            start = end - self.source[start..end].trim_start().len();
        }
        let rest = &self.source[end..];
        let end = if rest.starts_with("{{-") || rest.starts_with("{%-") {
            start + self.source[start..end].trim_end().len()
        } else {
            end
        };
        (start < end).then(|| self.token(TokenKind::Literal, start, end))
    }

    /// Open a tag; a tag with no closing delimiter anywhere after it fails
    /// here, at its start
    fn lex_open(&mut self) -> Result<Token<'a>, SyntaxError> {
        let start = self.cursor;
        let bytes = self.source.as_bytes();
        let delimiter = if bytes.get(start + 1) == Some(&b'{') {
            Delimiter::Output
        } else {
            Delimiter::Tag
        };
        let mut end = start + 2;
        if bytes.get(end) == Some(&b'-') {
            end += 1;
        }
        if !self.source[end..].contains(delimiter.close()) {
            return Err(SyntaxError::UnterminatedTag {
                delimiter: delimiter.open(),
                position: self.position_at(start),
            });
        }
        self.cursor = end;
        self.mode = Mode::Inside { delimiter, start };
        self.tag_tokens = 0;
        let kind = match delimiter {
            Delimiter::Output => TokenKind::OutputOpen,
            Delimiter::Tag => TokenKind::TagOpen,
        };
        Ok(self.token(kind, start, end))
    }

    fn lex_inside(&mut self, delimiter: Delimiter, tag_start: usize) -> Result<Token<'a>, SyntaxError> {
        let rest = &self.source[self.cursor..];
        self.cursor += rest.len() - rest.trim_start().len();

        let start = self.cursor;
        let rest = &self.source[start..];
        let bytes = self.source.as_bytes();
        let unterminated = || SyntaxError::UnterminatedTag {
            delimiter: delimiter.open(),
            position: self.position_at(tag_start),
        };

        let Some(c) = rest.chars().next() else {
            return Err(unterminated());
        };

        let close = delimiter.close();
        let trim = rest.starts_with('-') && rest[1..].starts_with(close);
        if trim || rest.starts_with(close) {
            let end = start + close.len() + usize::from(trim);
            self.cursor = end;
            self.trim_next = trim;
            self.mode = match self.pending_verbatim.take() {
                Some((opener, opened_at)) => Mode::Verbatim {
                    opener,
                    start: opened_at,
                },
                None => Mode::Text,
            };
            let kind = match delimiter {
                Delimiter::Output => TokenKind::OutputClose,
                Delimiter::Tag => TokenKind::TagClose,
            };
            return Ok(self.token(kind, start, end));
        }

        let next = bytes.get(start + 1).copied();
        let after_dot = self.last == Some(TokenKind::Dot);
        let (kind, end) = match c {
            'a'..='z' | 'A'..='Z' | '_' => {
                let end = scan_identifier(bytes, start);
                let word = &self.source[start..end];
                match Keyword::from_word(word) {
                    Some(keyword) if !after_dot => (TokenKind::Keyword(keyword), end),
                    _ => (TokenKind::Identifier, end),
                }
            }
            '0'..='9' => (TokenKind::Number, scan_number(bytes, start, !after_dot)),
            '-' if next.is_some_and(|b| b.is_ascii_digit()) => {
                (TokenKind::Number, scan_number(bytes, start + 1, !after_dot))
            }
            '"' | '\'' => {
                let close_quote = rest[1..].find(c).ok_or_else(unterminated)?;
                let end = start + 1 + close_quote;
                self.cursor = end + 1;
                self.count_tag_token(TokenKind::String, tag_start);
                return Ok(Token {
                    kind: TokenKind::String,
                    text: &self.source[start + 1..end],
                    position: self.position_at(start),
                });
            }
            '=' if next == Some(b'=') => (TokenKind::Operator, start + 2),
            '=' => (TokenKind::Assign, start + 1),
            '!' if next == Some(b'=') => (TokenKind::Operator, start + 2),
            '<' if matches!(next, Some(b'=') | Some(b'>')) => (TokenKind::Operator, start + 2),
            '>' if next == Some(b'=') => (TokenKind::Operator, start + 2),
            '<' | '>' => (TokenKind::Operator, start + 1),
            '|' => (TokenKind::Pipe, start + 1),
            ':' => (TokenKind::Colon, start + 1),
            ',' => (TokenKind::Comma, start + 1),
            '.' if next == Some(b'.') => (TokenKind::DotDot, start + 2),
            '.' => (TokenKind::Dot, start + 1),
            '[' => (TokenKind::LBracket, start + 1),
            ']' => (TokenKind::RBracket, start + 1),
            '(' => (TokenKind::LParen, start + 1),
            ')' => (TokenKind::RParen, start + 1),
            other => {
                return Err(SyntaxError::UnexpectedCharacter {
                    found: other,
                    position: self.position_at(start),
                })
            }
        };

        self.cursor = end;
        if delimiter == Delimiter::Tag {
            self.count_tag_token(kind, tag_start);
        }
        Ok(self.token(kind, start, end))
    }

    /// `raw` and `comment` switch to verbatim scanning once their tag closes
    fn count_tag_token(&mut self, kind: TokenKind, tag_start: usize) {
        if self.tag_tokens == 0 {
            if let TokenKind::Keyword(keyword @ (Keyword::Raw | Keyword::Comment)) = kind {
                self.pending_verbatim = Some((keyword, tag_start));
            }
        }
        self.tag_tokens += 1;
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Result<Token<'a>, SyntaxError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let item = self.next_token().transpose();
        match &item {
            Some(Ok(token)) => self.last = Some(token.kind),
            None | Some(Err(_)) => self.finished = true,
        }
        item
    }
}

/// Byte offset of the next `{{` or `{%` at or after `from`
fn find_tag_start(source: &str, from: usize) -> Option<usize> {
    let bytes = source.as_bytes();
    let mut from = from;
    while let Some(found) = source[from..].find('{') {
        let at = from + found;
        if matches!(bytes.get(at + 1), Some(b'{') | Some(b'%')) {
            return Some(at);
        }
        from = at + 1;
    }
    None
}

/// Byte offset of the `{%` starting `{% <name> %}`, whitespace control allowed
fn find_end_tag(source: &str, from: usize, name: &str) -> Option<usize> {
    let mut from = from;
    while let Some(found) = source[from..].find("{%") {
        let at = from + found;
        let rest = &source[at + 2..];
        let rest = rest.strip_prefix('-').unwrap_or(rest).trim_start();
        if let Some(after) = rest.strip_prefix(name) {
            let after = after.trim_start();
            if after.starts_with("%}") || after.starts_with("-%}") {
                return Some(at);
            }
        }
        from = at + 2;
    }
    None
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Identifiers may contain inner hyphens (`first-name`) but never end in one,
/// so `name-%}` still closes the tag.
fn scan_identifier(bytes: &[u8], start: usize) -> usize {
    let mut end = start + 1;
    loop {
        match bytes.get(end) {
            Some(&b) if is_word_byte(b) => end += 1,
            Some(b'-') if bytes.get(end + 1).is_some_and(|&b| is_word_byte(b)) => end += 1,
            _ => return end,
        }
    }
}

/// Digits with an optional fraction; `allow_fraction` is off right after a
/// dot so `items.0.1` stays two index segments
fn scan_number(bytes: &[u8], digits_start: usize, allow_fraction: bool) -> usize {
    let digits_end = |from: usize| {
        let mut end = from;
        while bytes.get(end).is_some_and(u8::is_ascii_digit) {
            end += 1;
        }
        end
    };
    let end = digits_end(digits_start);
    if allow_fraction
        && bytes.get(end) == Some(&b'.')
        && bytes.get(end + 1).is_some_and(u8::is_ascii_digit)
    {
        return digits_end(end + 1);
    }
    end
}
