//! Toplevel database API.
//!
//! A `Database` object holds the text of a Metamath database, the statements
//! parsed from it, the symbol table and the header tree.  It is built by a
//! single pass over the text ([`Database::parse`]); any lexical or namespace
//! error rejects the text as a whole.
//!
//! ## Analysis passes
//!
//! The remaining analyses are run lazily and cached on the database:
//!
//! * [`Database::verify_pass`] checks all proofs.  Proof errors are recorded
//!   per theorem and never invalidate the rest of the database.
//! * [`Database::grammar_pass`] derives the grammar from syntax axioms and
//!   floating hypotheses, and flags ambiguities.
//! * [`Database::stmt_parse_pass`] parses every hypothesis and assertion with
//!   that grammar.
//! * [`Database::axiom_use_pass`] computes the axioms and definitions each
//!   assertion depends on.
//! * [`Database::typesetting_pass`] reads the `$t` comments.
//!
//! ## Mutation
//!
//! Databases are immutable once built.  [`Database::insert_statement`]
//! splices new text at a statement boundary and builds a new database from
//! the result, reusing the atoms of this one.  The grammar and the statement
//! parses of the old database are carried over, so that the new database
//! only needs to process what the insertion added.

use crate::axiom_use::UsageResult;
use crate::diag::{DetailedError, Diagnostic};
use crate::grammar::{Grammar, StmtParse};
use crate::line_cache::LineCache;
use crate::nameck::{Atom, LabelKind, Nameset, SymbolTable};
use crate::outline::{CommentPath, HeaderPath, Outline};
use crate::parser::parse_database;
use crate::progress::Reporter;
use crate::statement::{Assertion, Span, Statement, StatementEntry, StatementIndex};
use crate::typesetting::TypesettingData;
use crate::verify::VerifyResult;
use log::{debug, info, warn};
use std::fmt::{self, Display};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Structure for options that affect database processing, and must be
/// constant for the lifetime of the database container.
#[derive(Clone, Debug)]
pub struct DbOptions {
    /// If true, the time taken by each pass is logged.
    pub timing: bool,
    /// If true, statements processed by incremental passes are logged.
    pub trace_recalc: bool,
    /// Number of threads used by the verifier.
    pub jobs: usize,
    /// Typecode of provable assertions.
    pub provable_typecode: String,
    /// Typecode as which provable assertions are parsed.
    pub logic_typecode: String,
    /// Number of entries in a page of search results.
    pub page_size: usize,
    /// Maximal number of derivations explored while parsing one expression.
    pub grammar_parse_limit: usize,
}

impl Default for DbOptions {
    fn default() -> Self {
        DbOptions {
            timing: false,
            trace_recalc: false,
            jobs: 1,
            provable_typecode: "|-".to_owned(),
            logic_typecode: "wff".to_owned(),
            page_size: 100,
            grammar_parse_limit: 100_000,
        }
    }
}

/// Runs a pass, logging its duration if timing is enabled.
pub(crate) fn time<R>(opts: &DbOptions, name: &str, f: impl FnOnce() -> R) -> R {
    let now = Instant::now();
    let ret = f();
    if opts.timing {
        info!("{name} {}ms", now.elapsed().as_millis());
    }
    ret
}

/// Identifier of a loaded database, stable across insertions.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DatabaseId(pub u64);

impl DatabaseId {
    fn fresh() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        DatabaseId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl Display for DatabaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "db{}", self.0)
    }
}

/// Where to insert new statements.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InsertAt {
    /// As a new header with the given path.
    Header(HeaderPath),
    /// As a new comment with the given path.
    Comment(CommentPath),
    /// After the statement with the given label.
    AfterLabel(String),
    /// After the statement declaring the given math symbol.
    AfterSymbol(String),
    /// At the end of the database.
    End,
}

/// A Metamath database.
#[derive(Debug, Clone)]
pub struct Database {
    options: Arc<DbOptions>,
    id: DatabaseId,
    text: String,
    names: Nameset,
    table: SymbolTable,
    statements: Vec<StatementEntry>,
    trailer: Span,
    outline: Outline,
    lines: LineCache,
    verify: Option<Arc<VerifyResult>>,
    usage: Option<Arc<UsageResult>>,
    grammar: Option<Arc<Grammar>>,
    grammar_stale: bool,
    stmt_parse: Option<Arc<StmtParse>>,
    stmt_parse_stale: bool,
    typesetting: Option<Arc<TypesettingData>>,
}

impl Database {
    /// Builds a database from its text, running the build pass.
    pub fn parse(text: String, options: DbOptions) -> Result<Database, DetailedError> {
        Self::build(text, Arc::new(options), Nameset::default(), DatabaseId::fresh())
    }

    fn build(
        text: String,
        options: Arc<DbOptions>,
        names: Nameset,
        id: DatabaseId,
    ) -> Result<Database, DetailedError> {
        let loaded = time(&options, "parse", || parse_database(&text, names))?;
        let outline = time(&options, "outline", || Outline::build(&loaded.statements));
        let lines = LineCache::new(&text);
        info!(
            "{id}: loaded {} statements, {} names",
            loaded.statements.len(),
            loaded.names.len()
        );
        Ok(Database {
            options,
            id,
            text,
            names: loaded.names,
            table: loaded.table,
            statements: loaded.statements,
            trailer: loaded.trailer,
            outline,
            lines,
            verify: None,
            usage: None,
            grammar: None,
            grammar_stale: false,
            stmt_parse: None,
            stmt_parse_stale: false,
            typesetting: None,
        })
    }

    /// The options this database was built with.
    #[must_use]
    pub fn options(&self) -> &DbOptions {
        &self.options
    }

    /// The identifier of this database.
    #[must_use]
    pub const fn id(&self) -> DatabaseId {
        self.id
    }

    /// The full database text.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The name interning table.
    #[must_use]
    pub const fn names(&self) -> &Nameset {
        &self.names
    }

    /// The symbol table.
    #[must_use]
    pub const fn table(&self) -> &SymbolTable {
        &self.table
    }

    /// The header tree.
    #[must_use]
    pub const fn outline(&self) -> &Outline {
        &self.outline
    }

    /// All statements, in database order.
    #[must_use]
    pub fn statements(&self) -> &[StatementEntry] {
        &self.statements
    }

    /// Accesses a statement by index.
    #[must_use]
    pub fn statement(&self, index: StatementIndex) -> &StatementEntry {
        &self.statements[index]
    }

    /// Iterates over the axioms and theorems, with their indices.
    pub fn assertions(&self) -> impl Iterator<Item = (StatementIndex, &Assertion)> {
        self.statements
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| Some((index, entry.statement.as_assertion()?)))
    }

    /// Number of theorems.
    #[must_use]
    pub fn theorem_count(&self) -> usize {
        self.statements
            .iter()
            .filter(|entry| matches!(entry.statement, Statement::Theorem(_)))
            .count()
    }

    /// The name of an atom.
    #[must_use]
    pub fn atom_name(&self, atom: Atom) -> &str {
        self.names.atom_name(atom)
    }

    /// Looks up the statement defining a label.
    #[must_use]
    pub fn label_index(&self, label: &str) -> Option<StatementIndex> {
        Some(self.table.label(self.names.lookup(label)?)?.index)
    }

    /// The statement defining a label atom.
    #[must_use]
    pub fn index_of(&self, label: Atom) -> Option<StatementIndex> {
        Some(self.table.label(label)?.index)
    }

    /// Looks up an axiom or theorem by label.
    #[must_use]
    pub fn assertion(&self, label: &str) -> Option<(StatementIndex, &Assertion)> {
        let index = self.label_index(label)?;
        Some((index, self.statements[index].statement.as_assertion()?))
    }

    /// The atom of the provable typecode, if it is declared.
    #[must_use]
    pub fn provable_typecode(&self) -> Option<Atom> {
        self.names.lookup(&self.options.provable_typecode)
    }

    /// Returns true for axioms defining syntax: their typecode is not the
    /// provable typecode and all their hypotheses are floating.
    #[must_use]
    pub fn is_syntax_axiom(&self, assertion: &Assertion) -> bool {
        Some(assertion.typecode()) != self.provable_typecode() && assertion.frame.is_all_floating()
    }

    /// Returns true for axioms whose label marks them as definitions.
    #[must_use]
    pub fn is_definition(&self, assertion: &Assertion) -> bool {
        self.atom_name(assertion.label).starts_with("df-")
    }

    /// The source text of a statement, including its preceding whitespace.
    #[must_use]
    pub fn statement_source(&self, index: StatementIndex) -> &str {
        self.statements[index].span.as_ref(&self.text)
    }

    /// The source text of a statement proper.
    #[must_use]
    pub fn statement_body(&self, index: StatementIndex) -> &str {
        self.statements[index].body.as_ref(&self.text)
    }

    /// Writes the database back to text.
    ///
    /// Statements are written in order, each with the exact text it was
    /// parsed from.
    #[must_use]
    pub fn serialize(&self) -> String {
        let mut out = String::with_capacity(self.text.len());
        for index in 0..self.statements.len() {
            out.push_str(self.statement_source(index));
        }
        out.push_str(self.trailer.as_ref(&self.text));
        out
    }

    /// Attaches a position to a diagnostic about a statement.
    #[must_use]
    pub fn detailed(&self, index: StatementIndex, diagnostic: Diagnostic) -> DetailedError {
        let entry = &self.statements[index];
        DetailedError::new(
            diagnostic,
            entry.start,
            self.lines.from_offset(entry.body.end as usize),
        )
    }

    /// Number of scopes open just before the given statement.
    fn scope_depth_before(&self, index: StatementIndex) -> usize {
        self.statements[..index]
            .iter()
            .fold(0usize, |depth, entry| match entry.statement {
                Statement::OpenScope => depth + 1,
                Statement::CloseScope => depth.saturating_sub(1),
                _ => depth,
            })
    }

    /// Finds the insertion point after a statement, leaving any scope it is in.
    ///
    /// Scopes can't be split: if an assertion or a header shares the scope of
    /// the statement, the insertion is refused.
    fn insertion_after(&self, index: StatementIndex) -> Result<StatementIndex, Diagnostic> {
        let mut depth = self.scope_depth_before(index + 1);
        let mut point = index + 1;
        while depth > 0 {
            let Some(entry) = self.statements.get(point) else {
                return Err(Diagnostic::AddingToInnerScope);
            };
            match entry.statement {
                Statement::OpenScope => depth += 1,
                Statement::CloseScope => depth -= 1,
                Statement::Axiom(_) | Statement::Theorem(_) | Statement::Heading(_) => {
                    return Err(Diagnostic::AddingToInnerScope)
                }
                _ => {}
            }
            point += 1;
        }
        Ok(point)
    }

    /// Computes the statement before which new text is to be inserted.
    pub fn insertion_point(&self, at: &InsertAt) -> Result<StatementIndex, Diagnostic> {
        match at {
            InsertAt::Header(path) => Ok(self.outline.new_header_position(path)?.0),
            InsertAt::Comment(path) => self.outline.new_comment_position(&self.statements, path),
            InsertAt::AfterLabel(label) => {
                let index = self
                    .label_index(label)
                    .ok_or_else(|| Diagnostic::InvalidLocateAfter(label.as_str().into()))?;
                self.insertion_after(index)
            }
            InsertAt::AfterSymbol(symbol) => {
                let info = self
                    .names
                    .lookup(symbol)
                    .and_then(|atom| self.table.symbol(atom))
                    .ok_or_else(|| Diagnostic::InvalidLocateAfter(symbol.as_str().into()))?;
                self.insertion_after(info.declared)
            }
            InsertAt::End => Ok(self.statements.len()),
        }
    }

    /// Builds a new database with `text` inserted at the given position.
    ///
    /// This database is left untouched; on error, nothing is inserted.
    pub fn insert_statement(&self, at: &InsertAt, text: &str) -> Result<Database, Diagnostic> {
        let point = self.insertion_point(at)?;
        let offset = match self.statements.get(point) {
            Some(entry) => entry.span.start as usize,
            None => self.trailer.start as usize,
        };
        let mut new_text = String::with_capacity(self.text.len() + text.len() + 2);
        new_text.push_str(&self.text[..offset]);
        if offset > 0 {
            new_text.push_str("\n\n");
        }
        new_text.push_str(text.trim());
        if point < self.statements.len() || offset == 0 {
            new_text.push('\n');
        }
        new_text.push_str(&self.text[offset..]);
        debug!("{}: inserting {} bytes before statement {point}", self.id, text.len());

        let mut db = Self::build(new_text, self.options.clone(), self.names.clone(), self.id)
            .map_err(|err| {
                warn!("{}: insertion rejected: {err}", self.id);
                err.diagnostic
            })?;
        db.grammar = self.grammar.clone();
        db.grammar_stale = self.grammar.is_some();
        db.stmt_parse = self.stmt_parse.clone();
        db.stmt_parse_stale = self.stmt_parse.is_some();
        Ok(db)
    }

    /// Checks all proofs, caching the result.
    pub fn verify_pass(&mut self) -> &Arc<VerifyResult> {
        if self.verify.is_none() {
            let result = time(&self.options, "verify", || crate::verify::verify_pass(self));
            self.verify = Some(Arc::new(result));
        }
        self.verify.get_or_insert_with(Default::default)
    }

    /// Returns the cached verification result, if the pass already ran.
    #[must_use]
    pub fn verify_result(&self) -> Option<&Arc<VerifyResult>> {
        self.verify.as_ref()
    }

    /// Computes the grammar, caching the result.
    ///
    /// A database built by an insertion updates the grammar of its parent
    /// with the new syntax axioms only.
    pub fn grammar_pass(&mut self, progress: &Reporter<'_>) -> &Arc<Grammar> {
        if self.grammar.is_none() || self.grammar_stale {
            let grammar = time(&self.options, "grammar", || match self.grammar.as_deref() {
                Some(previous) => previous.update(self, progress),
                None => Grammar::build(self, progress),
            });
            self.grammar = Some(Arc::new(grammar));
            self.grammar_stale = false;
        }
        self.grammar.get_or_insert_with(Default::default)
    }

    /// Returns the cached grammar, if the pass already ran.
    #[must_use]
    pub fn grammar_result(&self) -> Option<&Arc<Grammar>> {
        self.grammar.as_ref().filter(|_| !self.grammar_stale)
    }

    /// Parses all hypotheses and assertions, caching the result.
    pub fn stmt_parse_pass(&mut self, progress: &Reporter<'_>) -> &Arc<StmtParse> {
        self.grammar_pass(progress);
        if self.stmt_parse.is_none() || self.stmt_parse_stale {
            let grammar = self.grammar.clone().unwrap_or_default();
            let previous = self.stmt_parse.clone();
            let parse = time(&self.options, "stmt_parse", || {
                StmtParse::build(self, &grammar, previous.as_deref(), progress)
            });
            self.stmt_parse = Some(Arc::new(parse));
            self.stmt_parse_stale = false;
        }
        progress.finish();
        self.stmt_parse.get_or_insert_with(Default::default)
    }

    /// Returns the cached statement parses, if the pass already ran.
    #[must_use]
    pub fn stmt_parse_result(&self) -> Option<&Arc<StmtParse>> {
        self.stmt_parse.as_ref().filter(|_| !self.stmt_parse_stale)
    }

    /// Computes axiom and definition dependencies, caching the result.
    pub fn axiom_use_pass(&mut self) -> &Arc<UsageResult> {
        if self.usage.is_none() {
            let usage = time(&self.options, "axiom_use", || UsageResult::build(self));
            self.usage = Some(Arc::new(usage));
        }
        self.usage.get_or_insert_with(Default::default)
    }

    /// Parses the `$t` typesetting comments, caching the result.
    pub fn typesetting_pass(&mut self) -> &Arc<TypesettingData> {
        if self.typesetting.is_none() {
            let data = time(&self.options, "typesetting", || TypesettingData::build(self));
            self.typesetting = Some(Arc::new(data));
        }
        self.typesetting.get_or_insert_with(Default::default)
    }

    /// Runs the verify, grammar and statement parse passes and collects
    /// their diagnostics, in statement order.
    pub fn diagnostics(&mut self, progress: &Reporter<'_>) -> Vec<(StatementIndex, Diagnostic)> {
        let mut diags = self.verify_pass().diagnostics.clone();
        let grammar = self.grammar_pass(progress).clone();
        diags.extend(grammar.diagnostics(self));
        let parses = self.stmt_parse_pass(progress).clone();
        diags.extend(parses.diagnostics(self));
        diags.sort_by_key(|(index, _)| *index);
        diags
    }

    /// Returns true if any pass run so far reported an error (as opposed to a warning).
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.verify
            .as_ref()
            .is_some_and(|v| v.diagnostics.iter().any(|(_, d)| d.is_error()))
    }

    /// The labels of all assertions of a given kind, in database order.
    pub fn labels_of_kind(&self, kind: LabelKind) -> impl Iterator<Item = &str> {
        self.statements.iter().filter_map(move |entry| {
            let label = entry.statement.label()?;
            (self.table.label(label)?.kind == kind).then(|| self.atom_name(label))
        })
    }
}
