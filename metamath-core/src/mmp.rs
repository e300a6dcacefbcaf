//! Parser for proof worksheets, the `.mmp` files in which new theorems,
//! axioms, headers, comments and symbol declarations are written before
//! being added to a database.
//!
//! A worksheet is a list of statements.  A statement starts with the first
//! non-whitespace character of a line, and lines starting with whitespace
//! continue the previous statement.  The first token of a statement selects
//! its kind:
//!
//! ```text
//! $theorem a1i
//! * Inference introducing an antecedent.
//! h1::a1i.1      |- ph
//! 2::ax-1        |- ( ph -> ( ps -> ph ) )
//! qed:1,2:ax-mp  |- ( ps -> ph )
//! ```
//!
//! This module only checks the form of each statement.  The checks against
//! a database are done by [`crate::mmpck`], and only run once the worksheet
//! parsed without error.

use crate::diag::{DetailedError, Diagnostic};
use crate::line_cache::LineCache;
use crate::outline::{CommentPath, HeaderPath};
use crate::util::is_valid_label;
use log::trace;

/// A token of a worksheet, with its offset.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MmpToken<'a> {
    /// The token text.
    pub text: &'a str,
    /// Byte offset of the token in the worksheet.
    pub start: usize,
}

impl<'a> MmpToken<'a> {
    /// Byte offset just past the token.
    #[must_use]
    pub const fn end(&self) -> usize {
        self.start + self.text.len()
    }

    fn slice(self, start: usize, end: usize) -> MmpToken<'a> {
        MmpToken {
            text: &self.text[start..end],
            start: self.start + start,
        }
    }

    /// Splits the token at each occurrence of `sep`.
    fn split(self, sep: u8) -> Vec<MmpToken<'a>> {
        let mut parts = Vec::new();
        let mut from = 0;
        for (pos, ch) in self.text.bytes().enumerate() {
            if ch == sep {
                parts.push(self.slice(from, pos));
                from = pos + 1;
            }
        }
        parts.push(self.slice(from, self.text.len()));
        parts
    }
}

/// Splits `text[start..end]` into whitespace separated tokens.
fn tokens_of(text: &str, start: usize, end: usize) -> Vec<MmpToken<'_>> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut ix = start;
    while ix < end {
        if bytes[ix].is_ascii_whitespace() {
            ix += 1;
            continue;
        }
        let token_start = ix;
        while ix < end && !bytes[ix].is_ascii_whitespace() {
            ix += 1;
        }
        tokens.push(MmpToken {
            text: &text[token_start..ix],
            start: token_start,
        });
    }
    tokens
}

/// What a worksheet statement is.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MmpStatementKind {
    /// `$header`, `$comment`, `$axiom` or `$theorem`.
    Label,
    /// `$d`
    DistinctVar,
    /// `$allowdiscouraged`
    AllowDiscouraged,
    /// `$allowincomplete`
    AllowIncomplete,
    /// `$locateafter`, `$locateafterconst` or `$locateaftervar`.
    LocateAfter,
    /// `$c`
    Constant,
    /// `$v`
    Variable,
    /// `$f`
    FloatingHypothesis,
    /// `$=`, an explicit proof.
    ProofStatement,
    /// A proof step.
    ProofLine,
    /// A comment, starting with `*`.
    Comment,
    /// An unknown `$` statement.
    Invalid,
}

impl MmpStatementKind {
    /// The diagnostic reported when a statement of this kind is not allowed
    /// in a worksheet.
    #[must_use]
    pub const fn out_of_place(self) -> Option<Diagnostic> {
        Some(match self {
            MmpStatementKind::Constant => Diagnostic::ConstOutOfPlace,
            MmpStatementKind::Variable => Diagnostic::VarOutOfPlace,
            MmpStatementKind::FloatingHypothesis => Diagnostic::FloatHypOutOfPlace,
            MmpStatementKind::DistinctVar => Diagnostic::DistinctVarOutOfPlace,
            MmpStatementKind::AllowDiscouraged => Diagnostic::AllowDiscouragedOutOfPlace,
            MmpStatementKind::AllowIncomplete => Diagnostic::AllowIncompleteOutOfPlace,
            MmpStatementKind::LocateAfter => Diagnostic::LocateAfterOutOfPlace,
            MmpStatementKind::ProofLine => Diagnostic::ProofLinesOutOfPlace,
            MmpStatementKind::ProofStatement => Diagnostic::ProofStatementOutOfPlace,
            MmpStatementKind::Label | MmpStatementKind::Comment | MmpStatementKind::Invalid => return None,
        })
    }
}

/// A statement of a worksheet.
#[derive(Clone, Debug)]
pub struct MmpStatement<'a> {
    /// What the statement is.
    pub kind: MmpStatementKind,
    /// Offset of the first character.
    pub start: usize,
    /// Offset just past the last non-whitespace character.
    pub end: usize,
    /// The tokens of the statement, the keyword or step prefix first.
    pub tokens: Vec<MmpToken<'a>>,
}

/// The statement naming what a worksheet adds to the database.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MmpLabel<'a> {
    /// `$header path title`
    Header {
        /// Path of the new header.
        path: HeaderPath,
        /// The path as written.
        path_token: MmpToken<'a>,
        /// The title, whitespace normalized.
        title: String,
    },
    /// `$comment path`
    Comment {
        /// Path of the new comment.
        path: CommentPath,
        /// The path as written.
        path_token: MmpToken<'a>,
    },
    /// `$axiom label`
    Axiom(MmpToken<'a>),
    /// `$theorem label`
    Theorem(MmpToken<'a>),
}

/// Where the content of a worksheet is to be inserted.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LocateAfter<'a> {
    /// `$locateafter label`
    Label(MmpToken<'a>),
    /// `$locateafterconst symbol`
    Constant(MmpToken<'a>),
    /// `$locateaftervar symbol`
    Variable(MmpToken<'a>),
}

impl<'a> LocateAfter<'a> {
    /// The label or symbol to locate after.
    #[must_use]
    pub const fn token(&self) -> MmpToken<'a> {
        match *self {
            LocateAfter::Label(token) | LocateAfter::Constant(token) | LocateAfter::Variable(token) => token,
        }
    }
}

/// A `$f` statement of a worksheet.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MmpFloating<'a> {
    /// The hypothesis label.
    pub label: MmpToken<'a>,
    /// The typecode.
    pub typecode: MmpToken<'a>,
    /// The typed variable.
    pub variable: MmpToken<'a>,
}

/// A proof step, `[h|!]name:hypotheses:reference expression`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProofStep<'a> {
    /// Index of the statement holding the step.
    pub statement: usize,
    /// Set for hypothesis steps, whose prefix starts with `h`.
    pub is_hypothesis: bool,
    /// Set for steps whose prefix starts with `!`.
    pub advanced_unification: bool,
    /// The step name, without its `h` or `!` marker.
    pub name: MmpToken<'a>,
    /// The names of the steps proving the hypotheses, `?` if unknown.
    pub hypotheses: Vec<MmpToken<'a>>,
    /// The label of the assertion applied, or of the new hypothesis.
    /// Empty if not given.
    pub reference: MmpToken<'a>,
    /// The expression proved by the step, typecode first.
    pub expression: Vec<MmpToken<'a>>,
}

impl ProofStep<'_> {
    /// Returns true for the final step of a proof.
    #[must_use]
    pub fn is_qed(&self) -> bool {
        !self.is_hypothesis && self.name.text == "qed"
    }
}

/// What a worksheet adds to the database.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WorksheetKind {
    /// A new header.
    Header,
    /// A new comment.
    Comment,
    /// A new axiom.
    Axiom,
    /// A new theorem.
    Theorem,
    /// New constants.
    Constants,
    /// New variables and floating hypotheses.
    Variables,
    /// Nothing.
    Empty,
}

/// A parsed worksheet.
#[derive(Clone, Debug)]
pub struct Worksheet<'a> {
    /// The worksheet text.
    pub text: &'a str,
    /// Line index of the text.
    pub lines: LineCache,
    /// All statements, in order.
    pub statements: Vec<MmpStatement<'a>>,
    /// The `$header`, `$comment`, `$axiom` or `$theorem` statement.
    pub label: Option<MmpLabel<'a>>,
    /// The text of the `*` comments, joined by blank lines.
    pub description: Option<String>,
    /// The symbols of the `$c` statement.
    pub constants: Vec<MmpToken<'a>>,
    /// The symbols of the `$v` statements.
    pub variables: Vec<MmpToken<'a>>,
    /// The `$f` statements.
    pub floating_hypotheses: Vec<MmpFloating<'a>>,
    /// The variables of each `$d` statement.
    pub distinct_vars: Vec<Vec<MmpToken<'a>>>,
    /// Set by `$allowdiscouraged`.
    pub allow_discouraged: bool,
    /// Set by `$allowincomplete`.
    pub allow_incomplete: bool,
    /// The `$locateafter` statement.
    pub locate_after: Option<LocateAfter<'a>>,
    /// The proof steps, in order.
    pub steps: Vec<ProofStep<'a>>,
    /// The labels of the `$=` statement.
    pub proof: Option<Vec<MmpToken<'a>>>,
}

impl<'a> Worksheet<'a> {
    fn new(text: &'a str) -> Self {
        Worksheet {
            text,
            lines: LineCache::new(text),
            statements: Vec::new(),
            label: None,
            description: None,
            constants: Vec::new(),
            variables: Vec::new(),
            floating_hypotheses: Vec::new(),
            distinct_vars: Vec::new(),
            allow_discouraged: false,
            allow_incomplete: false,
            locate_after: None,
            steps: Vec::new(),
            proof: None,
        }
    }

    /// What this worksheet adds to the database.
    #[must_use]
    pub fn kind(&self) -> WorksheetKind {
        match self.label {
            Some(MmpLabel::Header { .. }) => WorksheetKind::Header,
            Some(MmpLabel::Comment { .. }) => WorksheetKind::Comment,
            Some(MmpLabel::Axiom(_)) => WorksheetKind::Axiom,
            Some(MmpLabel::Theorem(_)) => WorksheetKind::Theorem,
            None if !self.constants.is_empty() => WorksheetKind::Constants,
            None if !self.variables.is_empty() || !self.floating_hypotheses.is_empty() => WorksheetKind::Variables,
            None => WorksheetKind::Empty,
        }
    }

    /// The label of the new axiom or theorem.
    #[must_use]
    pub fn assertion_label(&self) -> Option<MmpToken<'a>> {
        match self.label {
            Some(MmpLabel::Axiom(token) | MmpLabel::Theorem(token)) => Some(token),
            _ => None,
        }
    }

    /// The final step, named `qed`.
    #[must_use]
    pub fn qed_step(&self) -> Option<usize> {
        self.steps.iter().position(ProofStep::is_qed)
    }

    /// Builds a positioned diagnostic covering `start..end`.
    #[must_use]
    pub fn error(&self, diagnostic: Diagnostic, start: usize, end: usize) -> DetailedError {
        DetailedError::at_offsets(diagnostic, &self.lines, start, end)
    }

    /// Builds a positioned diagnostic covering a token.
    #[must_use]
    pub fn token_error(&self, diagnostic: Diagnostic, token: MmpToken<'_>) -> DetailedError {
        self.error(diagnostic, token.start, token.end())
    }

    /// Builds a positioned diagnostic covering a whole statement.
    #[must_use]
    pub fn statement_error(&self, diagnostic: Diagnostic, statement: usize) -> DetailedError {
        let statement = &self.statements[statement];
        self.error(diagnostic, statement.start, statement.end)
    }
}

/// Finds the statements of a worksheet, as offset ranges.
///
/// Whitespace before the first statement must consist of whole lines.
fn split_statements(text: &str, lines: &LineCache) -> Result<Vec<(usize, usize)>, DetailedError> {
    let bytes = text.as_bytes();
    let Some(first) = bytes.iter().position(|ch| !ch.is_ascii_whitespace()) else {
        return Ok(Vec::new());
    };
    if first > 0 && bytes[first - 1] != b'\n' {
        let line_start = bytes[..first]
            .iter()
            .rposition(|&ch| ch == b'\n')
            .map_or(0, |pos| pos + 1);
        return Err(DetailedError::at_offsets(
            Diagnostic::WhitespaceBeforeFirstToken,
            lines,
            line_start,
            first,
        ));
    }

    let mut ranges = Vec::new();
    let mut start = first;
    for ix in first + 1..bytes.len() {
        if !bytes[ix].is_ascii_whitespace() && bytes[ix - 1] == b'\n' {
            ranges.push((start, ix));
            start = ix;
        }
    }
    ranges.push((start, bytes.len()));
    Ok(ranges
        .into_iter()
        .map(|(start, end)| {
            let end = start + text[start..end].trim_end().len();
            (start, end)
        })
        .collect())
}

struct MmpParser<'a> {
    ws: Worksheet<'a>,
    errors: Vec<DetailedError>,
    seen_label: bool,
    seen_locate_after: bool,
    comments: Vec<String>,
}

impl<'a> MmpParser<'a> {
    fn token_error(&mut self, diagnostic: Diagnostic, token: MmpToken<'_>) {
        self.errors.push(self.ws.token_error(diagnostic, token));
    }

    /// Reports an error from the start of a token to the end of the statement.
    fn tail_error(&mut self, diagnostic: Diagnostic, token: MmpToken<'_>, statement: &MmpStatement<'_>) {
        self.errors.push(self.ws.error(diagnostic, token.start, statement.end));
    }

    fn statement_error(&mut self, diagnostic: Diagnostic, statement: &MmpStatement<'_>) {
        self.errors.push(self.ws.error(diagnostic, statement.start, statement.end));
    }

    fn parse_statement(&mut self, statement: &mut MmpStatement<'a>) {
        let tokens = statement.tokens.clone();
        let keyword = tokens[0];
        statement.kind = match keyword.text {
            "$c" => {
                if !self.ws.constants.is_empty() {
                    self.statement_error(Diagnostic::TooManyConstStatements, statement);
                }
                if tokens.len() == 1 {
                    self.statement_error(Diagnostic::EmptyConstStatement, statement);
                } else {
                    self.ws.constants.extend_from_slice(&tokens[1..]);
                }
                MmpStatementKind::Constant
            }
            "$v" => {
                if tokens.len() == 1 {
                    self.statement_error(Diagnostic::EmptyVarStatement, statement);
                } else {
                    self.ws.variables.extend_from_slice(&tokens[1..]);
                }
                MmpStatementKind::Variable
            }
            "$f" => {
                match tokens.len() {
                    1 => self.token_error(Diagnostic::FloatHypStatementFormat, keyword),
                    2 | 3 => self.tail_error(Diagnostic::FloatHypStatementFormat, tokens[1], statement),
                    4 if !is_valid_label(tokens[1].text) => {
                        self.token_error(Diagnostic::InvalidLabel(tokens[1].text.into()), tokens[1]);
                    }
                    4 => self.ws.floating_hypotheses.push(MmpFloating {
                        label: tokens[1],
                        typecode: tokens[2],
                        variable: tokens[3],
                    }),
                    _ => self.tail_error(Diagnostic::FloatHypStatementFormat, tokens[4], statement),
                }
                MmpStatementKind::FloatingHypothesis
            }
            "$header" => {
                self.check_single_label(statement);
                match tokens.get(1) {
                    None => self.statement_error(Diagnostic::TooFewHeaderTokens, statement),
                    Some(&path_token) => match path_token.text.parse::<HeaderPath>() {
                        Err(diag) => self.token_error(diag, path_token),
                        Ok(_) if tokens.len() < 3 => self.statement_error(Diagnostic::TooFewHeaderTokens, statement),
                        Ok(path) => {
                            let title = tokens[2..].iter().map(|t| t.text).collect::<Vec<_>>().join(" ");
                            self.ws.label = Some(MmpLabel::Header {
                                path,
                                path_token,
                                title,
                            });
                        }
                    },
                }
                MmpStatementKind::Label
            }
            "$comment" => {
                self.check_single_label(statement);
                match tokens.get(1) {
                    None => self.token_error(Diagnostic::MissingCommentPath, keyword),
                    Some(&path_token) => match path_token.text.parse::<CommentPath>() {
                        Err(diag) => self.token_error(diag, path_token),
                        Ok(path) => self.ws.label = Some(MmpLabel::Comment { path, path_token }),
                    },
                }
                if let Some(&extra) = tokens.get(2) {
                    self.tail_error(Diagnostic::TooManyCommentPathTokens, extra, statement);
                }
                MmpStatementKind::Label
            }
            "$axiom" | "$theorem" => {
                let axiom = keyword.text == "$axiom";
                self.check_single_label(statement);
                match tokens.len() {
                    1 if axiom => self.token_error(Diagnostic::MissingAxiomLabel, keyword),
                    1 => self.token_error(Diagnostic::MissingTheoremLabel, keyword),
                    2 if !is_valid_label(tokens[1].text) => {
                        self.token_error(Diagnostic::InvalidLabel(tokens[1].text.into()), tokens[1]);
                    }
                    2 if axiom => self.ws.label = Some(MmpLabel::Axiom(tokens[1])),
                    2 => self.ws.label = Some(MmpLabel::Theorem(tokens[1])),
                    _ if axiom => self.tail_error(Diagnostic::TooManyAxiomLabelTokens, tokens[2], statement),
                    _ => self.tail_error(Diagnostic::TooManyTheoremLabelTokens, tokens[2], statement),
                }
                MmpStatementKind::Label
            }
            "$d" => {
                if tokens.len() < 3 {
                    self.statement_error(Diagnostic::ZeroOrOneSymbolDisj, statement);
                } else {
                    self.ws.distinct_vars.push(tokens[1..].to_vec());
                }
                MmpStatementKind::DistinctVar
            }
            "$allowdiscouraged" => {
                if self.ws.allow_discouraged {
                    self.statement_error(Diagnostic::MultipleAllowDiscouraged, statement);
                }
                self.ws.allow_discouraged = true;
                if let Some(&extra) = tokens.get(1) {
                    self.tail_error(Diagnostic::TokensAfterAllowDiscouraged, extra, statement);
                }
                MmpStatementKind::AllowDiscouraged
            }
            "$allowincomplete" => {
                if self.ws.allow_incomplete {
                    self.statement_error(Diagnostic::MultipleAllowIncomplete, statement);
                }
                self.ws.allow_incomplete = true;
                if let Some(&extra) = tokens.get(1) {
                    self.tail_error(Diagnostic::TokensAfterAllowIncomplete, extra, statement);
                }
                MmpStatementKind::AllowIncomplete
            }
            "$locateafter" | "$locateafterconst" | "$locateaftervar" => {
                let (too_few, too_many, make): (_, _, fn(MmpToken<'a>) -> LocateAfter<'a>) = match keyword.text {
                    "$locateafter" => (
                        Diagnostic::TooFewLocateAfterTokens,
                        Diagnostic::TooManyLocateAfterTokens,
                        LocateAfter::Label,
                    ),
                    "$locateafterconst" => (
                        Diagnostic::TooFewLocateAfterConstTokens,
                        Diagnostic::TooManyLocateAfterConstTokens,
                        LocateAfter::Constant,
                    ),
                    _ => (
                        Diagnostic::TooFewLocateAfterVarTokens,
                        Diagnostic::TooManyLocateAfterVarTokens,
                        LocateAfter::Variable,
                    ),
                };
                if self.seen_locate_after {
                    self.statement_error(Diagnostic::MultipleLocateAfter, statement);
                }
                self.seen_locate_after = true;
                match tokens.len() {
                    1 => self.token_error(too_few, keyword),
                    2 => self.ws.locate_after = Some(make(tokens[1])),
                    _ => self.tail_error(too_many, tokens[2], statement),
                }
                MmpStatementKind::LocateAfter
            }
            "$=" => {
                if self.ws.proof.is_some() {
                    self.statement_error(Diagnostic::MultipleProofStatements, statement);
                }
                self.ws.proof = Some(tokens[1..].to_vec());
                MmpStatementKind::ProofStatement
            }
            text if text.starts_with('*') => {
                let body = &self.ws.text[keyword.start + 1..statement.end];
                let comment = body.lines().map(str::trim).collect::<Vec<_>>().join("\n");
                self.comments.push(comment.trim().to_owned());
                MmpStatementKind::Comment
            }
            text if text.starts_with('$') => {
                self.token_error(Diagnostic::InvalidDollarToken(text.into()), keyword);
                MmpStatementKind::Invalid
            }
            _ => {
                self.parse_step(&tokens);
                MmpStatementKind::ProofLine
            }
        };
    }

    fn check_single_label(&mut self, statement: &MmpStatement<'_>) {
        if self.seen_label {
            self.statement_error(Diagnostic::MultipleMmpLabels, statement);
        }
        self.seen_label = true;
    }

    fn parse_step(&mut self, tokens: &[MmpToken<'a>]) {
        let prefix = tokens[0];
        let parts = prefix.split(b':');
        if parts.len() > 3 {
            self.token_error(Diagnostic::InvalidMmpStepPrefixFormat, prefix);
            return;
        }

        let mut name = parts[0];
        let mut is_hypothesis = false;
        let mut advanced_unification = false;
        if name.text.starts_with('h') {
            is_hypothesis = true;
            name = name.slice(1, name.text.len());
        } else if name.text.starts_with('!') {
            advanced_unification = true;
            name = name.slice(1, name.text.len());
            if name.text.starts_with('h') {
                self.token_error(Diagnostic::InvalidMmpStepNameStartsWithH, name);
            }
        }
        if name.text.is_empty() || !name.text.bytes().all(|ch| ch.is_ascii_alphanumeric()) {
            self.token_error(Diagnostic::InvalidMmpStepName, name);
        }

        let (hypotheses, reference) = match *parts.as_slice() {
            [_, hyps, reference] => (hyps, reference),
            [_, reference] => (reference.slice(0, 0), reference),
            _ => {
                let empty = prefix.slice(prefix.text.len(), prefix.text.len());
                (empty, empty)
            }
        };
        let hypotheses = if hypotheses.text.is_empty() {
            Vec::new()
        } else {
            hypotheses.split(b',')
        };

        trace!("step {} refs {}", name.text, reference.text);
        self.ws.steps.push(ProofStep {
            statement: self.ws.statements.len(),
            is_hypothesis,
            advanced_unification,
            name,
            hypotheses,
            reference,
            expression: tokens[1..].to_vec(),
        });
    }
}

/// Parses a worksheet, checking the form of each statement.
///
/// All malformed statements are reported, in source order.
pub fn parse_worksheet(text: &str) -> Result<Worksheet<'_>, Vec<DetailedError>> {
    let ws = Worksheet::new(text);
    let ranges = split_statements(text, &ws.lines).map_err(|err| vec![err])?;
    let mut parser = MmpParser {
        ws,
        errors: Vec::new(),
        seen_label: false,
        seen_locate_after: false,
        comments: Vec::new(),
    };
    for (start, end) in ranges {
        let mut statement = MmpStatement {
            kind: MmpStatementKind::Invalid,
            start,
            end,
            tokens: tokens_of(text, start, end),
        };
        parser.parse_statement(&mut statement);
        parser.ws.statements.push(statement);
    }
    if !parser.errors.is_empty() {
        return Err(parser.errors);
    }
    let mut ws = parser.ws;
    if !parser.comments.is_empty() {
        ws.description = Some(parser.comments.join("\n\n"));
    }
    Ok(ws)
}
