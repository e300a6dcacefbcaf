//! The typesetting data.
//!
//! This is the result of parsing the `$t` comments of a database, which tell
//! front ends how to render math symbols:
//!
//! ```text
//! htmldef "ph" as "<IMG SRC='_varphi.gif' WIDTH=11 HEIGHT=19 ALT=' ph' TITLE='ph'>";
//! althtmldef "ph" as "<SPAN CLASS=wff STYLE='color:blue'>&#x1D711;</SPAN>";
//! latexdef "ph" as "\varphi";
//! ```
//!
//! Strings are quoted with `"` or `'`, a doubled quote standing for itself,
//! and can be concatenated with `+`.  Commands end with `;`, and `/* */`
//! comments are allowed between tokens.  Malformed commands are reported as
//! warnings and skipped; they never prevent loading the database.

use crate::database::Database;
use crate::diag::Diagnostic;
use crate::statement::{CommentKind, Statement, StatementIndex, Token};
use crate::util::HashMap;
use log::debug;
use std::collections::hash_map::Entry;
use std::collections::BTreeSet;

/// A token of a typesetting command.
#[derive(Clone, Debug, PartialEq, Eq)]
enum CommandToken<'a> {
    /// An unquoted word, such as `htmldef`, `as` or `+`.
    Keyword(&'a str),
    /// A quoted string, unescaped.
    String(String),
}

/// Splits the body of a `$t` comment into commands.
struct CommandIter<'a> {
    buffer: &'a str,
    index: usize,
}

impl<'a> CommandIter<'a> {
    fn new(buffer: &'a str) -> Self {
        CommandIter { buffer, index: 0 }
    }

    fn has_more(&self) -> bool {
        self.index < self.buffer.len()
    }

    fn next_char(&self) -> u8 {
        self.buffer.as_bytes()[self.index]
    }

    fn fail(&mut self, start: usize) -> Diagnostic {
        let text = self.buffer[start..].split_whitespace().next().unwrap_or_default();
        self.index = self.buffer.len();
        Diagnostic::TypesettingFormat(text.into())
    }

    fn skip_white_spaces(&mut self) -> Result<(), Diagnostic> {
        while self.has_more() {
            match self.next_char() {
                b' ' | b'\t' | b'\n' | b'\r' => self.index += 1,
                b'/' if self.buffer[self.index..].starts_with("/*") => {
                    match self.buffer[self.index + 2..].find("*/") {
                        Some(end) => self.index += end + 4,
                        None => return Err(self.fail(self.index)),
                    }
                }
                _ => break,
            }
        }
        Ok(())
    }

    fn string(&mut self, quote: u8) -> Result<String, Diagnostic> {
        let start = self.index;
        self.index += 1;
        let mut out = String::new();
        loop {
            let Some(len) = self.buffer[self.index..].find(quote as char) else {
                return Err(self.fail(start));
            };
            out.push_str(&self.buffer[self.index..self.index + len]);
            self.index += len + 1;
            if self.has_more() && self.next_char() == quote {
                out.push(quote as char);
                self.index += 1;
            } else {
                return Ok(out);
            }
        }
    }
}

impl<'a> Iterator for CommandIter<'a> {
    type Item = Result<Vec<CommandToken<'a>>, Diagnostic>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Err(diag) = self.skip_white_spaces() {
            return Some(Err(diag));
        }
        if !self.has_more() {
            return None;
        }
        let start = self.index;
        let mut command = Vec::new();
        loop {
            let token = match self.next_char() {
                quote @ (b'\'' | b'"') => match self.string(quote) {
                    Ok(string) => CommandToken::String(string),
                    Err(diag) => return Some(Err(diag)),
                },
                _ => {
                    let token_start = self.index;
                    while self.has_more() && !matches!(self.next_char(), b' ' | b'\t' | b'\n' | b'\r' | b';') {
                        self.index += 1;
                    }
                    let buffer = self.buffer;
                    CommandToken::Keyword(&buffer[token_start..self.index])
                }
            };
            command.push(token);
            if let Err(diag) = self.skip_white_spaces() {
                return Some(Err(diag));
            }
            if !self.has_more() {
                return Some(Err(self.fail(start)));
            }
            if self.next_char() == b';' {
                self.index += 1;
                return Some(Ok(command));
            }
        }
    }
}

/// The three kinds of symbol definitions.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum MarkupKind {
    Html,
    AltHtml,
    Latex,
}

/// All the renderings defined for one math symbol.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SymbolMarkup {
    /// The math symbol.
    pub symbol: String,
    /// From `htmldef`.
    pub html: Option<String>,
    /// From `althtmldef`.
    pub alt_html: Option<String>,
    /// From `latexdef`.
    pub latex: Option<String>,
}

/// The parsed `$t` comment data.
#[derive(Debug, Default, Clone)]
pub struct TypesettingData {
    /// Problems found in the `$t` comments, as warnings.
    pub diagnostics: Vec<(StatementIndex, Diagnostic)>,
    /// `latexdef` replacements, per symbol.
    pub latex_defs: HashMap<Token, Token>,
    /// `htmldef` replacements, per symbol.  Used for the GIF rendering.
    pub html_defs: HashMap<Token, Token>,
    /// `althtmldef` replacements, per symbol.  Used for the unicode rendering.
    pub alt_html_defs: HashMap<Token, Token>,
    /// `htmlvarcolor` pieces, concatenated with spaces for rendering.
    pub html_var_color: Vec<Token>,
    /// `htmltitle`
    pub html_title: Option<Token>,
    /// `htmlhome`
    pub html_home: Option<Token>,
}

impl TypesettingData {
    /// Reads all `$t` comments of a database.
    #[must_use]
    pub fn build(db: &Database) -> Self {
        let mut data = TypesettingData::default();
        for (index, entry) in db.statements().iter().enumerate() {
            if !matches!(entry.statement, Statement::Comment(CommentKind::Typesetting)) {
                continue;
            }
            let body = db.statement_body(index);
            let body = body
                .strip_prefix("$(")
                .and_then(|b| b.strip_suffix("$)"))
                .unwrap_or(body)
                .trim_start();
            let body = body.strip_prefix("$t").unwrap_or(body);
            for command in CommandIter::new(body) {
                if let Err(diag) = command.and_then(|c| data.parse_one(&c)) {
                    data.diagnostics.push((index, diag));
                }
            }
        }
        debug!(
            "typesetting: {} html, {} alt html, {} latex definitions",
            data.html_defs.len(),
            data.alt_html_defs.len(),
            data.latex_defs.len()
        );
        data
    }

    fn parse_one(&mut self, command: &[CommandToken<'_>]) -> Result<(), Diagnostic> {
        let (cmd, mut rest) = match command.split_first() {
            Some((&CommandToken::Keyword(k), rest)) => (k, rest.iter()),
            _ => return Err(Diagnostic::TypesettingFormat("".into())),
        };
        let bad = || Diagnostic::TypesettingFormat(cmd.into());

        let sum = |mut rest: std::slice::Iter<'_, CommandToken<'_>>| {
            let Some(CommandToken::String(first)) = rest.next() else {
                return Err(bad());
            };
            let mut accum = first.clone();
            loop {
                match rest.next() {
                    None => return Ok(Token::from(accum)),
                    Some(CommandToken::Keyword("+")) => {}
                    _ => return Err(bad()),
                }
                match rest.next() {
                    Some(CommandToken::String(s)) => accum.push_str(s),
                    _ => return Err(bad()),
                }
            }
        };
        let as_ = |rest: &mut std::slice::Iter<'_, CommandToken<'_>>| match (rest.next(), rest.next()) {
            (Some(CommandToken::String(symbol)), Some(CommandToken::Keyword("as"))) => Ok(symbol.clone()),
            _ => Err(bad()),
        };

        match cmd {
            "latexdef" => self.insert(MarkupKind::Latex, as_(&mut rest)?, sum(rest)?),
            "htmldef" => self.insert(MarkupKind::Html, as_(&mut rest)?, sum(rest)?),
            "althtmldef" => self.insert(MarkupKind::AltHtml, as_(&mut rest)?, sum(rest)?),
            "htmlvarcolor" => {
                self.html_var_color.push(sum(rest)?);
                Ok(())
            }
            "htmltitle" => {
                self.html_title = Some(sum(rest)?);
                Ok(())
            }
            "htmlhome" => {
                self.html_home = Some(sum(rest)?);
                Ok(())
            }
            // other website generator settings
            _ => Ok(()),
        }
    }

    fn insert(&mut self, kind: MarkupKind, symbol: String, value: Token) -> Result<(), Diagnostic> {
        let map = match kind {
            MarkupKind::Html => &mut self.html_defs,
            MarkupKind::AltHtml => &mut self.alt_html_defs,
            MarkupKind::Latex => &mut self.latex_defs,
        };
        match map.entry(symbol.into()) {
            Entry::Occupied(e) => Err(Diagnostic::DuplicateMarkupDef(e.key().clone())),
            Entry::Vacant(e) => {
                e.insert(value);
                Ok(())
            }
        }
    }

    /// The `althtmldef` rendering of a symbol.
    #[must_use]
    pub fn alt_html_def(&self, symbol: &str) -> Option<&str> {
        self.alt_html_defs.get(symbol).map(|t| &**t)
    }

    /// Lists the renderings of every symbol having at least one, sorted by symbol.
    #[must_use]
    pub fn representations(&self) -> Vec<SymbolMarkup> {
        let symbols = self
            .html_defs
            .keys()
            .chain(self.alt_html_defs.keys())
            .chain(self.latex_defs.keys())
            .collect::<BTreeSet<_>>();
        symbols
            .into_iter()
            .map(|symbol| SymbolMarkup {
                symbol: symbol.to_string(),
                html: self.html_defs.get(symbol).map(ToString::to_string),
                alt_html: self.alt_html_defs.get(symbol).map(ToString::to_string),
                latex: self.latex_defs.get(symbol).map(ToString::to_string),
            })
            .collect()
    }
}
