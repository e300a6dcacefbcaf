//! Splitting of database text into tokens and comments.
//!
//! The tokenizer is a lazy iterator over the lexemes of a buffer.  It keeps
//! track of line and column numbers as it goes, and can be restarted at any
//! offset with [`Tokenizer::at`], which is how the worksheet parser scans one
//! statement at a time.

use crate::diag::{DetailedError, Diagnostic};
use crate::statement::{Position, Span};
use crate::util::is_mm_space;

/// The two kinds of lexemes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LexemeKind {
    /// A whitespace-delimited token.
    Token,
    /// A complete `$( ... $)` comment.
    Comment,
}

/// A token or a comment, with its location.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Lexeme<'a> {
    /// What was read.
    pub kind: LexemeKind,
    /// The text of the lexeme; for comments, including the delimiters.
    pub text: &'a str,
    /// The byte range of the lexeme.
    pub span: Span,
    /// Position of the first character.
    pub start: Position,
    /// Position just after the last character.
    pub end: Position,
}

impl Lexeme<'_> {
    /// The text of a comment, without its `$(` and `$)` delimiters.
    #[must_use]
    pub fn comment_body(&self) -> &str {
        debug_assert_eq!(self.kind, LexemeKind::Comment);
        let text = self.text.strip_prefix("$(").unwrap_or(self.text);
        text.strip_suffix("$)").unwrap_or(text)
    }
}

/// A lazy, restartable tokenizer.
#[derive(Clone, Debug)]
pub struct Tokenizer<'a> {
    buf: &'a str,
    pos: usize,
    line: u32,
    line_start: usize,
    done: bool,
}

impl<'a> Tokenizer<'a> {
    /// Starts tokenizing a buffer from its beginning.
    #[must_use]
    pub const fn new(buf: &'a str) -> Self {
        Tokenizer {
            buf,
            pos: 0,
            line: 1,
            line_start: 0,
            done: false,
        }
    }

    /// Starts tokenizing a buffer from the given offset, which should not be
    /// in the middle of a token or comment.
    #[must_use]
    pub fn at(buf: &'a str, offset: usize) -> Self {
        let before = &buf.as_bytes()[..offset];
        let newlines = before.iter().filter(|&&c| c == b'\n').count();
        let line_start = before
            .iter()
            .rposition(|&c| c == b'\n')
            .map_or(0, |p| p + 1);
        Tokenizer {
            buf,
            pos: offset,
            line: 1 + u32::try_from(newlines).unwrap_or(u32::MAX - 1),
            line_start,
            done: false,
        }
    }

    /// The current offset in the buffer.
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.pos
    }

    /// The position of the current offset.
    #[must_use]
    pub fn position(&self) -> Position {
        self.position_at(self.pos)
    }

    fn position_at(&self, offset: usize) -> Position {
        Position::new(self.line, (offset - self.line_start) as u32 + 1)
    }

    fn error(&mut self, diag: Diagnostic, start: Position, end: Position) -> DetailedError {
        self.done = true;
        DetailedError::new(diag, start, end)
    }

    /// Skips whitespace, returning an error for any disallowed byte.
    fn skip_space(&mut self) -> Result<(), DetailedError> {
        let bytes = self.buf.as_bytes();
        while let Some(&c) = bytes.get(self.pos) {
            if !is_mm_space(c) {
                break;
            }
            self.pos += 1;
            if c == b'\n' {
                self.line += 1;
                self.line_start = self.pos;
            }
        }
        Ok(())
    }

    /// Reads the token at the current position, which must not be whitespace.
    fn read_token(&mut self) -> Result<(usize, usize), DetailedError> {
        let bytes = self.buf.as_bytes();
        let start = self.pos;
        while let Some(&c) = bytes.get(self.pos) {
            if is_mm_space(c) {
                break;
            }
            if !c.is_ascii_graphic() {
                let at = self.position_at(self.pos);
                let after = Position::new(at.line, at.column + 1);
                return Err(self.error(Diagnostic::NonAsciiSymbol, at, after));
            }
            self.pos += 1;
        }
        Ok((start, self.pos))
    }

    fn next_lexeme(&mut self) -> Result<Option<Lexeme<'a>>, DetailedError> {
        self.skip_space()?;
        if self.pos >= self.buf.len() {
            return Ok(None);
        }
        let buf = self.buf;
        let start_pos = Tokenizer::position(self);
        let (start, end) = self.read_token()?;
        let text = &buf[start..end];
        if text != "$(" {
            return Ok(Some(Lexeme {
                kind: LexemeKind::Token,
                text,
                span: Span::new(start, end),
                start: start_pos,
                end: Tokenizer::position(self),
            }));
        }
        // a comment ends at the first `$)` token
        loop {
            self.skip_space()?;
            if self.pos >= self.buf.len() {
                let eof = Tokenizer::position(self);
                return Err(self.error(Diagnostic::UnclosedComment, start_pos, eof));
            }
            let (tok_start, tok_end) = self.read_token()?;
            if &buf[tok_start..tok_end] == "$)" {
                return Ok(Some(Lexeme {
                    kind: LexemeKind::Comment,
                    text: &buf[start..tok_end],
                    span: Span::new(start, tok_end),
                    start: start_pos,
                    end: Tokenizer::position(self),
                }));
            }
        }
    }
}

impl<'a> Iterator for Tokenizer<'a> {
    type Item = Result<Lexeme<'a>, DetailedError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_lexeme() {
            Ok(Some(lexeme)) => Some(Ok(lexeme)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => Some(Err(err)),
        }
    }
}

/// Tokenizes a whole buffer, failing at the first lexical error.
pub fn tokenize(buf: &str) -> Result<Vec<Lexeme<'_>>, DetailedError> {
    Tokenizer::new(buf).collect()
}
