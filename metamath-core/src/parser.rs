//! The database build pass.
//!
//! A single left-to-right pass over the lexemes of a database file, which
//! recognizes statements, runs the scope stack on every declaration, and
//! computes the frame of every assertion.  The first lexical or namespace
//! error aborts the pass: later statements may depend on corrected earlier
//! ones, so a database is never partially loaded.
//!
//! Every statement records the span of source text from the end of the
//! previous statement to its own end, so that the statement list covers the
//! whole file.

use crate::diag::{DetailedError, Diagnostic};
use crate::lexer::{Lexeme, LexemeKind, Tokenizer};
use crate::nameck::{LabelKind, Nameset, SymbolTable};
use crate::scopeck::ScopeStack;
use crate::statement::{
    Assertion, CommentKind, Essential, Heading, HeadingLevel, Position, Proof, Span, Statement,
    StatementEntry, StatementIndex,
};
use crate::util::{is_valid_label, is_valid_math_symbol};
use log::trace;
use regex::Regex;
use std::sync::OnceLock;

/// The result of the build pass.
#[derive(Debug)]
pub struct Loaded {
    /// The nameset, extended with all names of this database.
    pub names: Nameset,
    /// All declared symbols and labels.
    pub table: SymbolTable,
    /// The statements in database order.
    pub statements: Vec<StatementEntry>,
    /// Whitespace following the last statement.
    pub trailer: Span,
}

/// Returns true if the token is a Metamath keyword, `$` followed by one character.
#[must_use]
pub fn is_keyword(token: &str) -> bool {
    token.len() == 2 && token.starts_with('$')
}

/// The rulers opening heading comments, by level.
const RULERS: [(&str, HeadingLevel); 4] = [
    ("####", HeadingLevel::MajorPart),
    ("#*#*", HeadingLevel::Section),
    ("=-=-", HeadingLevel::SubSection),
    ("-.-.", HeadingLevel::SubSubSection),
];

/// Parses a heading comment, given the body of a comment (without its `$(`
/// and `$)` delimiters).
///
/// A heading opens with a ruler token; its title is made of the tokens up to
/// the next token starting like the ruler, and the rest of the comment is
/// the description.  Returns `None` if this is not a heading comment, and an
/// error if the title is never closed.
pub fn parse_heading(body: &str) -> Option<Result<Heading, Diagnostic>> {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    let token_regex = TOKEN.get_or_init(|| Regex::new(r"[^ \t\r\n\x0c]+").unwrap());
    let mut tokens = token_regex.find_iter(body);
    let first = tokens.next()?.as_str();
    let &(ruler, level) = RULERS.iter().find(|(ruler, _)| first.starts_with(*ruler))?;
    let mut title = Vec::new();
    for token in tokens {
        if token.as_str().starts_with(ruler) {
            return Some(Ok(Heading {
                level,
                title: title.join(" "),
                description: body[token.end()..].trim().to_owned(),
            }));
        }
        title.push(token.as_str());
    }
    Some(Err(Diagnostic::UnclosedHeader))
}

/// Classifies a comment which is not a heading.
#[must_use]
pub fn comment_kind(body: &str) -> CommentKind {
    match body.split_ascii_whitespace().next() {
        Some("$t") => CommentKind::Typesetting,
        Some("$j") => CommentKind::Extra,
        _ => CommentKind::Normal,
    }
}

struct Parser<'a> {
    text: &'a str,
    lexemes: Tokenizer<'a>,
    scopes: ScopeStack,
    statements: Vec<StatementEntry>,
    last_end: usize,
}

fn error_at(diag: Diagnostic, lexeme: &Lexeme<'_>) -> DetailedError {
    DetailedError::new(diag, lexeme.start, lexeme.end)
}

impl<'a> Parser<'a> {
    fn next_lexeme(&mut self) -> Result<Option<Lexeme<'a>>, DetailedError> {
        self.lexemes.next().transpose()
    }

    fn next_index(&self) -> StatementIndex {
        self.statements.len()
    }

    fn push(&mut self, statement: Statement, start: usize, start_pos: Position, end: usize) {
        trace!("statement {} at {start_pos:?}", self.statements.len());
        self.statements.push(StatementEntry {
            statement,
            span: Span::new(self.last_end, end),
            body: Span::new(start, end),
            start: start_pos,
        });
        self.last_end = end;
    }

    /// Reads math tokens up to one of the given terminating keywords.
    /// Comments inside the statement are skipped.
    fn read_math(
        &mut self,
        first: &Lexeme<'a>,
        terminators: &[&str],
    ) -> Result<(Vec<Lexeme<'a>>, Lexeme<'a>), DetailedError> {
        let mut tokens = Vec::new();
        loop {
            let Some(lexeme) = self.next_lexeme()? else {
                return Err(error_at(Diagnostic::UnclosedStatement, first));
            };
            if lexeme.kind == LexemeKind::Comment {
                continue;
            }
            if terminators.contains(&lexeme.text) {
                return Ok((tokens, lexeme));
            }
            if is_keyword(lexeme.text) {
                return Err(error_at(Diagnostic::UnclosedStatement, first));
            }
            tokens.push(lexeme);
        }
    }

    /// Reads math symbols, checking their syntax.
    fn read_symbols(
        &mut self,
        first: &Lexeme<'a>,
        terminators: &[&str],
    ) -> Result<(Vec<&'a str>, Lexeme<'a>), DetailedError> {
        let (tokens, end) = self.read_math(first, terminators)?;
        for token in &tokens {
            if !is_valid_math_symbol(token.text) {
                return Err(error_at(Diagnostic::InvalidSymbol(token.text.into()), token));
            }
        }
        Ok((tokens.iter().map(|t| t.text).collect(), end))
    }

    fn comment(&mut self, lexeme: &Lexeme<'a>) -> Result<(), DetailedError> {
        let body = lexeme.comment_body();
        let statement = match parse_heading(body) {
            Some(Ok(heading)) => Statement::Heading(heading),
            Some(Err(diag)) => return Err(error_at(diag, lexeme)),
            None => Statement::Comment(comment_kind(body)),
        };
        self.push(statement, lexeme.span.start as usize, lexeme.start, lexeme.span.end as usize);
        Ok(())
    }

    fn description(&self) -> Option<String> {
        match self.statements.last() {
            Some(StatementEntry {
                statement: Statement::Comment(CommentKind::Normal),
                body,
                ..
            }) => {
                let text = body.as_ref(self.text);
                let text = text.strip_prefix("$(").unwrap_or(text);
                Some(text.strip_suffix("$)").unwrap_or(text).trim().to_owned())
            }
            _ => None,
        }
    }

    fn unlabelled(&mut self, keyword: &Lexeme<'a>) -> Result<(), DetailedError> {
        let index = self.next_index();
        let statement = match keyword.text {
            "${" => {
                self.scopes.push_scope(index);
                Statement::OpenScope
            }
            "$}" => {
                self.scopes
                    .pop_scope()
                    .map_err(|diag| error_at(diag, keyword))?;
                Statement::CloseScope
            }
            "$c" | "$v" => {
                let (symbols, end) = self.read_symbols(keyword, &["$."])?;
                if symbols.is_empty() {
                    let diag = if keyword.text == "$c" {
                        Diagnostic::EmptyConstStatement
                    } else {
                        Diagnostic::EmptyVarStatement
                    };
                    return Err(DetailedError::new(diag, keyword.start, end.end));
                }
                let mut atoms = Vec::with_capacity(symbols.len());
                for symbol in symbols {
                    let declared = if keyword.text == "$c" {
                        self.scopes.declare_constant(symbol, index)
                    } else {
                        self.scopes.declare_variable(symbol, index)
                    };
                    atoms.push(declared.map_err(|diag| DetailedError::new(diag, keyword.start, end.end))?);
                }
                let statement = if keyword.text == "$c" {
                    Statement::Constant(atoms.into_boxed_slice())
                } else {
                    Statement::Variable(atoms.into_boxed_slice())
                };
                self.push(statement, keyword.span.start as usize, keyword.start, end.span.end as usize);
                return Ok(());
            }
            "$d" => {
                let (symbols, end) = self.read_symbols(keyword, &["$."])?;
                let vars = self
                    .scopes
                    .declare_disjoint(&symbols)
                    .map_err(|diag| DetailedError::new(diag, keyword.start, end.end))?;
                self.push(
                    Statement::Disjoint(vars),
                    keyword.span.start as usize,
                    keyword.start,
                    end.span.end as usize,
                );
                return Ok(());
            }
            "$f" | "$e" | "$a" | "$p" => return Err(error_at(Diagnostic::MissingLabel, keyword)),
            _ => return Err(error_at(Diagnostic::UnknownKeyword(keyword.text.into()), keyword)),
        };
        self.push(statement, keyword.span.start as usize, keyword.start, keyword.span.end as usize);
        Ok(())
    }

    fn labelled(&mut self, label: &Lexeme<'a>) -> Result<(), DetailedError> {
        let Some(keyword) = self.next_lexeme()? else {
            return Err(error_at(Diagnostic::TokenOutsideStatement(label.text.into()), label));
        };
        if keyword.kind == LexemeKind::Comment || !is_keyword(keyword.text) {
            return Err(error_at(Diagnostic::TokenOutsideStatement(label.text.into()), label));
        }
        let kind = match keyword.text {
            "$f" => LabelKind::Floating,
            "$e" => LabelKind::Essential,
            "$a" => LabelKind::Axiom,
            "$p" => LabelKind::Theorem,
            "$c" | "$v" | "$d" | "${" | "$}" => {
                return Err(error_at(Diagnostic::SpuriousLabel(label.text.into()), label))
            }
            _ => return Err(error_at(Diagnostic::UnknownKeyword(keyword.text.into()), &keyword)),
        };
        if !is_valid_label(label.text) {
            return Err(error_at(Diagnostic::InvalidLabel(label.text.into()), label));
        }
        let index = self.next_index();
        let atom = self
            .scopes
            .declare_label(label.text, index, kind)
            .map_err(|diag| error_at(diag, label))?;
        let terminators: &[&str] = if kind == LabelKind::Theorem {
            &["$.", "$="]
        } else {
            &["$."]
        };
        let (symbols, end) = self.read_symbols(label, terminators)?;
        let span_err = |diag| DetailedError::new(diag, label.start, end.end);
        let statement = match kind {
            LabelKind::Floating => {
                let &[typecode, variable] = symbols.as_slice() else {
                    return Err(span_err(Diagnostic::FloatHypStatementFormat));
                };
                let float = self
                    .scopes
                    .declare_floating_hypothesis(atom, typecode, variable, index)
                    .map_err(span_err)?;
                Statement::Floating(float)
            }
            LabelKind::Essential => {
                let expr = self.scopes.check_expression(&symbols).map_err(span_err)?;
                self.scopes.declare_essential(atom, expr.clone(), index);
                Statement::Essential(Essential { label: atom, expr })
            }
            LabelKind::Axiom | LabelKind::Theorem => {
                let expr = self.scopes.check_expression(&symbols).map_err(span_err)?;
                let frame = self.scopes.build_frame(&expr);
                let description = self.description();
                let (proof, end) = if kind == LabelKind::Theorem {
                    if end.text != "$=" {
                        return Err(span_err(Diagnostic::MissingProof));
                    }
                    let (proof, proof_end) = self.read_proof(label)?;
                    (Some(proof), proof_end)
                } else {
                    (None, end)
                };
                let assertion = Box::new(Assertion {
                    label: atom,
                    expr,
                    frame,
                    proof,
                    description,
                });
                let statement = if kind == LabelKind::Axiom {
                    Statement::Axiom(assertion)
                } else {
                    Statement::Theorem(assertion)
                };
                self.push(statement, label.span.start as usize, label.start, end.span.end as usize);
                return Ok(());
            }
        };
        self.push(statement, label.span.start as usize, label.start, end.span.end as usize);
        Ok(())
    }

    fn read_proof(&mut self, label: &Lexeme<'a>) -> Result<(Proof, Lexeme<'a>), DetailedError> {
        let (tokens, end) = self.read_math(label, &["$."])?;
        let texts = tokens.iter().map(|t| t.text).collect::<Vec<_>>();
        let proof = match texts.iter().position(|&t| t == ")") {
            Some(close) if texts.first() == Some(&"(") => Proof::Compressed {
                labels: texts[1..close].iter().map(|&t| t.into()).collect(),
                steps: texts[close + 1..].concat().into_boxed_str(),
            },
            _ => Proof::Normal(texts.iter().map(|&t| t.into()).collect()),
        };
        Ok((proof, end))
    }

    fn run(&mut self) -> Result<(), DetailedError> {
        while let Some(lexeme) = self.next_lexeme()? {
            if lexeme.kind == LexemeKind::Comment {
                self.comment(&lexeme)?;
            } else if is_keyword(lexeme.text) {
                self.unlabelled(&lexeme)?;
            } else {
                self.labelled(&lexeme)?;
            }
        }
        Ok(())
    }
}

/// Runs the build pass over a database text.
///
/// The given nameset is extended, so atoms which already exist keep their
/// meaning.
pub fn parse_database(text: &str, names: Nameset) -> Result<Loaded, DetailedError> {
    let mut parser = Parser {
        text,
        lexemes: Tokenizer::new(text),
        scopes: ScopeStack::new(names),
        statements: Vec::new(),
        last_end: 0,
    };
    parser.run()?;
    let Parser {
        scopes,
        statements,
        last_end,
        ..
    } = parser;
    let (names, table) = scopes.finish().map_err(|(index, diag)| {
        let start = statements[index].start;
        DetailedError::new(diag, start, Position::new(start.line, start.column + 2))
    })?;
    Ok(Loaded {
        names,
        table,
        statements,
        trailer: Span::new(last_end, text.len()),
    })
}
