//! The query and mutation service.
//!
//! A [`Workbench`] is the handle a front end holds on the database it has
//! opened.  Queries read the database and the cached results of its
//! analysis passes.  The only mutation is [`Workbench::add_to_database`],
//! which checks a worksheet, splices its content into the database text,
//! writes the file back and brings the grammar up to date before returning.
//! Since it takes `&mut self`, no query can observe a half-updated database.
//!
//! Progress of the grammar and statement parse rebuilds is recorded in a
//! [`ProgressTracker`] shared with the front end, one build ticket per load
//! or insertion.

use crate::database::{Database, DatabaseId, DbOptions};
use crate::diag::{DetailedError, Diagnostic};
use crate::mmp::{MmpLabel, WorksheetKind};
use crate::mmpck::{check_worksheet, WorksheetContext};
use crate::nameck::Atom;
use crate::outline::{CommentPath, HeaderPath};
use crate::progress::{ProgressTracker, Reporter};
use crate::proof::{ProofLine, ProofTreeArray};
use crate::scopeck::Hyp;
use crate::search::{autocomplete, find_labels, AssertionKind, SearchContext, SearchParameters, SearchResult, TheoremListEntry};
use crate::statement::{Floating, Position, Statement, StatementIndex, SymbolType};
use crate::typesetting::SymbolMarkup;
use crate::verify::{verify_theorem, VerifyOptions};
use filetime::FileTime;
use itertools::Itertools;
use log::{debug, info, warn};
use std::fmt::Write;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Number of labels returned by a bounded quick search.
pub const QUICK_SEARCH_LIMIT: usize = 10;

/// What a front end is told after loading a database.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DatabaseSummary {
    /// Identifies the database in progress reports.
    pub database_id: DatabaseId,
    /// Number of `$p` statements.
    pub theorem_count: usize,
}

/// A floating hypothesis, by name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FloatingHypothesisView {
    /// The hypothesis label.
    pub label: String,
    /// The typecode.
    pub typecode: String,
    /// The typed variable.
    pub variable: String,
}

impl FloatingHypothesisView {
    fn new(db: &Database, float: &Floating) -> Self {
        FloatingHypothesisView {
            label: db.atom_name(float.label).to_owned(),
            typecode: db.atom_name(float.typecode).to_owned(),
            variable: db.atom_name(float.variable).to_owned(),
        }
    }
}

/// A variable with the typecode of its first `$f` statement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VariableView {
    /// The variable.
    pub symbol: String,
    /// Its typecode, if a `$f` statement gives one.
    pub typecode: Option<String>,
}

/// One entry listed under a header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HeaderContent {
    /// A comment, with its text.
    Comment(String),
    /// A `$c` statement.
    Constants(Vec<String>),
    /// A `$v` statement.
    Variables(Vec<String>),
    /// A `$f` statement.
    FloatingHypothesis(FloatingHypothesisView),
    /// An axiom or a theorem.
    Assertion {
        /// Its label.
        label: String,
        /// Its category.
        kind: AssertionKind,
    },
}

/// One level of the header tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeaderView {
    /// The title of the header.
    pub title: String,
    /// The text following the title.
    pub description: String,
    /// The statements directly under the header.
    pub content_titles: Vec<HeaderContent>,
    /// The titles of the child headers.
    pub subheader_titles: Vec<String>,
}

/// Everything shown on the page of an axiom or theorem.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TheoremPage {
    /// The assertion itself.
    pub theorem: TheoremListEntry,
    /// The steps of the proof; empty for axioms and incomplete proofs.
    pub proof_lines: Vec<ProofLine>,
    /// Set if the proof failed to verify.
    pub proof_error: Option<Diagnostic>,
    /// The preceding assertion in database order.
    pub previous_label: Option<String>,
    /// The following assertion in database order.
    pub next_label: Option<String>,
    /// The axioms used, in database order.
    pub axiom_dependencies: Vec<String>,
    /// The definitions used, in database order.
    pub definition_dependencies: Vec<String>,
    /// The theorems whose proofs use this assertion.
    pub references: Vec<String>,
}

/// Where [`Workbench::add_to_database`] put the new content.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InsertedAt {
    /// A new header, at this path.
    Header(HeaderPath),
    /// A new comment, at this path.
    Comment(CommentPath),
    /// A new axiom or theorem, with this label.
    Label(String),
    /// New constants or variables.
    Symbols(Vec<String>),
}

/// Modification time and size of a database file, as last read or written.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct FileSnapshot {
    modified: FileTime,
    len: u64,
}

impl FileSnapshot {
    fn of(path: &Path) -> io::Result<Self> {
        let metadata = fs::metadata(path)?;
        Ok(FileSnapshot {
            modified: FileTime::from_last_modification_time(&metadata),
            len: metadata.len(),
        })
    }
}

/// Whether a database file still holds what was last read or written.
///
/// Without a snapshot, only the length of the file is compared with the
/// text last written.
fn file_unchanged(path: &Path, snapshot: Option<&FileSnapshot>, len: usize) -> bool {
    match (FileSnapshot::of(path), snapshot) {
        (Ok(current), Some(snapshot)) => current == *snapshot,
        (Ok(current), None) => current.len == len as u64,
        (Err(_), _) => false,
    }
}

/// The database currently open, and the file it was read from.
#[derive(Debug)]
struct OpenDatabase {
    db: Database,
    file: Option<(PathBuf, Option<FileSnapshot>)>,
}

/// A validated worksheet, ready to be committed.
struct Addition {
    database: Database,
    inserted_at: InsertedAt,
    text: String,
}

/// The service a front end talks to.
#[derive(Debug, Default)]
pub struct Workbench {
    options: DbOptions,
    open: Option<OpenDatabase>,
    progress: Arc<ProgressTracker>,
}

fn label_not_found(label: &str) -> Diagnostic {
    Diagnostic::LabelNotFound(label.into())
}

/// The text of a comment statement, without its delimiters.
fn comment_text(body: &str) -> String {
    body.strip_prefix("$(")
        .and_then(|b| b.strip_suffix("$)"))
        .unwrap_or(body)
        .trim()
        .to_owned()
}

/// Writes a description as a worksheet comment, one source line per line.
fn push_description(out: &mut String, description: &str) {
    for (i, line) in description.lines().map(str::trim).enumerate() {
        let indent = match i {
            0 => "* ",
            _ if line.is_empty() => "",
            _ => "  ",
        };
        let _ = writeln!(out, "{indent}{line}");
    }
}

fn atom_names(db: &Database, atoms: impl IntoIterator<Item = Atom>) -> Vec<String> {
    atoms.into_iter().map(|atom| db.atom_name(atom).to_owned()).collect()
}

fn header_content(db: &Database, index: StatementIndex) -> Option<HeaderContent> {
    Some(match &db.statement(index).statement {
        Statement::Comment(_) => HeaderContent::Comment(comment_text(db.statement_body(index))),
        Statement::Constant(atoms) => HeaderContent::Constants(atom_names(db, atoms.iter().copied())),
        Statement::Variable(atoms) => HeaderContent::Variables(atom_names(db, atoms.iter().copied())),
        Statement::Floating(float) => HeaderContent::FloatingHypothesis(FloatingHypothesisView::new(db, float)),
        Statement::Axiom(assertion) | Statement::Theorem(assertion) => HeaderContent::Assertion {
            label: db.atom_name(assertion.label).to_owned(),
            kind: AssertionKind::of(db, index, assertion),
        },
        _ => return None,
    })
}

/// Checks a worksheet and builds the database it would produce.
fn prepare_addition(db: &mut Database, text: &str) -> Result<Addition, Diagnostic> {
    db.verify_pass();
    if db.has_errors() {
        return Err(Diagnostic::CantAddToDatabase);
    }
    let grammar = db.grammar_pass(&Reporter::none()).clone();
    let parses = db.stmt_parse_pass(&Reporter::none()).clone();
    let db = &*db;
    let ctx = WorksheetContext {
        db,
        grammar: &grammar,
        parses: &parses,
    };
    let checked = match check_worksheet(&ctx, text) {
        Ok(checked) => checked,
        Err(errors) => {
            debug!("{}: worksheet rejected with {} parse errors", db.id(), errors.len());
            return Err(Diagnostic::UnfinishedTheorem);
        }
    };
    let ws = &checked.worksheet;
    if ws.kind() == WorksheetKind::Empty {
        return Err(Diagnostic::MmpFileEmpty);
    }
    if !checked.is_valid() {
        debug!("{}: worksheet rejected with {} diagnostics", db.id(), checked.diagnostics.len());
        return Err(Diagnostic::UnfinishedTheorem);
    }
    let text = checked.database_text(&ctx)?;
    let database = db.insert_statement(&checked.insert_at, &text)?;
    let inserted_at = match &ws.label {
        Some(MmpLabel::Header { path, .. }) => InsertedAt::Header(path.clone()),
        Some(MmpLabel::Comment { path, .. }) => InsertedAt::Comment(path.clone()),
        Some(MmpLabel::Axiom(label)) => InsertedAt::Label(label.text.to_owned()),
        Some(MmpLabel::Theorem(label)) => {
            let options = VerifyOptions {
                allow_discouraged: ws.allow_discouraged,
                allow_incomplete: ws.allow_incomplete,
            };
            if let Err(diag) = verify_theorem(&database, label.text, options) {
                warn!("{}: proof of {} rejected: {diag}", db.id(), label.text);
                return Err(Diagnostic::UnfinishedTheorem);
            }
            InsertedAt::Label(label.text.to_owned())
        }
        None => InsertedAt::Symbols(
            ws.constants
                .iter()
                .chain(&ws.variables)
                .map(|token| token.text.to_owned())
                .collect(),
        ),
    };
    Ok(Addition {
        database,
        inserted_at,
        text,
    })
}

impl Workbench {
    /// Creates a workbench with no database open.
    #[must_use]
    pub fn new(options: DbOptions) -> Self {
        Workbench {
            options,
            open: None,
            progress: Arc::default(),
        }
    }

    /// Creates a workbench reporting progress to an existing tracker.
    #[must_use]
    pub fn with_progress(options: DbOptions, progress: Arc<ProgressTracker>) -> Self {
        Workbench {
            options,
            open: None,
            progress,
        }
    }

    /// The progress tracker of the rebuilds.
    #[must_use]
    pub fn progress_tracker(&self) -> &Arc<ProgressTracker> {
        &self.progress
    }

    /// The last progress reported by the current rebuild of the open database.
    #[must_use]
    pub fn progress(&self) -> Option<u8> {
        self.progress.status(self.open.as_ref()?.db.id())
    }

    /// The open database.
    pub fn database(&self) -> Result<&Database, Diagnostic> {
        Ok(&self.open.as_ref().ok_or(Diagnostic::NoDatabase)?.db)
    }

    fn database_mut(&mut self) -> Result<&mut Database, Diagnostic> {
        Ok(&mut self.open.as_mut().ok_or(Diagnostic::NoDatabase)?.db)
    }

    /// Parses, then builds the grammar and the statement parses with a fresh
    /// build ticket.
    fn open(&mut self, text: String, file: Option<(PathBuf, Option<FileSnapshot>)>) -> Result<DatabaseSummary, DetailedError> {
        let mut db = Database::parse(text, self.options.clone())?;
        let ticket = self.progress.begin(db.id());
        db.stmt_parse_pass(&Reporter::new(&self.progress, ticket));
        let summary = DatabaseSummary {
            database_id: db.id(),
            theorem_count: db.theorem_count(),
        };
        info!("{}: opened, {} theorems", summary.database_id, summary.theorem_count);
        self.open = Some(OpenDatabase { db, file });
        Ok(summary)
    }

    /// Loads a database file, replacing the open database.
    ///
    /// On error, the previously open database stays open.
    pub fn load_database(&mut self, path: impl AsRef<Path>) -> Result<DatabaseSummary, DetailedError> {
        let path = path.as_ref();
        let io_error = |err: io::Error| DetailedError::new(err.into(), Position::default(), Position::default());
        let snapshot = FileSnapshot::of(path).map_err(io_error)?;
        let text = fs::read_to_string(path).map_err(io_error)?;
        self.open(text, Some((path.to_owned(), Some(snapshot))))
    }

    /// Opens a database held in memory.  Additions are not written anywhere.
    pub fn load_text(&mut self, text: impl Into<String>) -> Result<DatabaseSummary, DetailedError> {
        self.open(text.into(), None)
    }

    /// Lists one level of the header tree.
    pub fn get_header(&self, path: &HeaderPath) -> Result<HeaderView, Diagnostic> {
        let db = self.database()?;
        let outline = db.outline();
        let id = outline
            .resolve(path)
            .ok_or_else(|| Diagnostic::InvalidHeaderPath(path.to_string().into()))?;
        let node = outline.node(id);
        let description = match node.statement.map(|index| &db.statement(index).statement) {
            Some(Statement::Heading(heading)) => heading.description.clone(),
            _ => String::new(),
        };
        Ok(HeaderView {
            title: node.title.clone(),
            description,
            content_titles: node.content.iter().filter_map(|&index| header_content(db, index)).collect(),
            subheader_titles: node
                .children
                .iter()
                .map(|&child| outline.node(child).title.clone())
                .collect(),
        })
    }

    /// Writes a header as a worksheet.
    pub fn get_header_mmp_format(&self, path: &HeaderPath) -> Result<String, Diagnostic> {
        let db = self.database()?;
        let outline = db.outline();
        let invalid = || Diagnostic::InvalidHeaderPath(path.to_string().into());
        let id = outline.resolve(path).filter(|_| path.depth() > 0).ok_or_else(invalid)?;
        let node = outline.node(id);
        let mut out = format!("$header {path} {}\n", node.title);
        if let Some(Statement::Heading(heading)) = node.statement.map(|index| &db.statement(index).statement) {
            push_description(&mut out, &heading.description);
        }
        Ok(out)
    }

    /// Writes a comment as a worksheet.
    pub fn get_comment_mmp_format(&self, path: &CommentPath) -> Result<String, Diagnostic> {
        let db = self.database()?;
        let outline = db.outline();
        let index = outline
            .resolve(&path.header)
            .and_then(|id| outline.comments(db.statements(), id).nth(path.index.checked_sub(1)?))
            .ok_or_else(|| Diagnostic::InvalidCommentPath(path.to_string().into()))?;
        let mut out = format!("$comment {path}\n");
        push_description(&mut out, &comment_text(db.statement_body(index)));
        Ok(out)
    }

    /// Writes an axiom or theorem as a worksheet.
    ///
    /// The essential hypotheses come first, as `h` steps.  For a theorem
    /// whose proof verifies, the steps proving expressions of the provable
    /// typecode follow, the last one named `qed`; otherwise the conclusion
    /// alone is written as the `qed` step.
    pub fn get_theorem_mmp_format(&self, label: &str) -> Result<String, Diagnostic> {
        let db = self.database()?;
        let (index, assertion) = db.assertion(label).ok_or_else(|| label_not_found(label))?;
        let keyword = if assertion.proof.is_some() { "$theorem" } else { "$axiom" };
        let mut out = format!("{keyword} {label}\n");
        if let Some(description) = &assertion.description {
            push_description(&mut out, description);
        }
        for &(x, y) in assertion.frame.mandatory_dv.iter() {
            let _ = writeln!(out, "$d {} {}", db.atom_name(x), db.atom_name(y));
        }
        let essentials = assertion.frame.essentials().collect::<Vec<_>>();
        for (k, hyp) in essentials.iter().enumerate() {
            if let Hyp::Essential { label, expr, .. } = hyp {
                let _ = writeln!(out, "h{}::{} {}", k + 1, db.atom_name(*label), db.names().expr_string(expr));
            }
        }

        let lines = match ProofTreeArray::from_theorem(db, index) {
            Ok(Some(proof)) => proof.proof_lines(db, false),
            Ok(None) => Vec::new(),
            Err(diag) => {
                debug!("{}: exporting {label} without its proof: {diag}", db.id());
                Vec::new()
            }
        };
        if lines.is_empty() {
            let _ = writeln!(out, "qed:: {}", db.names().expr_string(&assertion.expr));
            return Ok(out);
        }
        // step names by proof line, hypotheses keeping their `h` numbers
        let mut names: Vec<String> = Vec::with_capacity(lines.len());
        let mut next = essentials.len();
        for (i, line) in lines.iter().enumerate() {
            if let Some(k) = essentials.iter().position(|hyp| db.atom_name(hyp.label()) == line.label) {
                names.push((k + 1).to_string());
                continue;
            }
            let name = if i + 1 == lines.len() {
                "qed".to_owned()
            } else {
                next += 1;
                next.to_string()
            };
            let hypotheses = line.hypotheses.iter().filter_map(|&step| names.get(step - 1)).join(",");
            let _ = writeln!(out, "{name}:{hypotheses}:{} {}", line.label, line.expression);
            names.push(name);
        }
        Ok(out)
    }

    /// Builds the page of an axiom or theorem.
    ///
    /// Unless `show_all` is set, the proof only lists the steps proving
    /// expressions of the provable typecode.
    pub fn get_theorem_page(&mut self, label: &str, show_all: bool) -> Result<TheoremPage, Diagnostic> {
        let db = self.database_mut()?;
        let usage = db.axiom_use_pass().clone();
        let db = &*db;
        let (index, assertion) = db.assertion(label).ok_or_else(|| label_not_found(label))?;

        let mut previous_label = None;
        let mut theorem_number = 0;
        let mut assertions = db.assertions().enumerate();
        for (number, (other, other_assertion)) in assertions.by_ref() {
            if other == index {
                theorem_number = number + 1;
                break;
            }
            previous_label = Some(other_assertion.label);
        }
        let next_label = assertions.next().map(|(_, (_, next))| next.label);

        let (proof_lines, proof_error) = match ProofTreeArray::from_theorem(db, index) {
            Ok(Some(proof)) => (proof.proof_lines(db, show_all), None),
            Ok(None) => (Vec::new(), None),
            Err(diag) => (Vec::new(), Some(diag)),
        };
        Ok(TheoremPage {
            theorem: TheoremListEntry::new(db, index, assertion, theorem_number),
            proof_lines,
            proof_error,
            previous_label: previous_label.map(|l| db.atom_name(l).to_owned()),
            next_label: next_label.map(|l| db.atom_name(l).to_owned()),
            axiom_dependencies: atom_names(db, usage.axioms_of(assertion.label)),
            definition_dependencies: atom_names(db, usage.definitions_of(assertion.label)),
            references: atom_names(db, usage.referenced_by(assertion.label).iter().copied()),
        })
    }

    /// Runs a theorem search.
    pub fn search_theorems(&mut self, params: &SearchParameters) -> Result<SearchResult, Diagnostic> {
        let db = self.database_mut()?;
        let usage = db.axiom_use_pass().clone();
        let parses = db.stmt_parse_pass(&Reporter::none()).clone();
        let grammar = db.grammar_pass(&Reporter::none()).clone();
        SearchContext {
            db: &*db,
            usage: &usage,
            grammar: &grammar,
            parses: &parses,
        }
        .search(params)
    }

    /// Finds labels matching a query, the exact match first.
    ///
    /// With `only_ten`, at most [`QUICK_SEARCH_LIMIT`] labels are returned,
    /// and the flag tells whether more would match.
    pub fn quick_search(&self, query: &str, only_ten: bool) -> Result<(Vec<String>, bool), Diagnostic> {
        let db = self.database()?;
        let limit = if only_ten { QUICK_SEARCH_LIMIT + 1 } else { usize::MAX };
        let mut labels = find_labels(db, query, limit, |_, _| true)
            .into_iter()
            .map(str::to_owned)
            .collect::<Vec<_>>();
        let more = only_ten && labels.len() > QUICK_SEARCH_LIMIT;
        if more {
            labels.pop();
        }
        Ok((labels, more))
    }

    /// Autocompletes an axiom label for a search filter.
    pub fn autocomplete_axioms(&self, query: &str, items: &[String]) -> Result<(bool, Vec<String>), Diagnostic> {
        Ok(autocomplete(self.database()?, query, items, false))
    }

    /// Autocompletes a definition label for a search filter.
    pub fn autocomplete_definitions(&self, query: &str, items: &[String]) -> Result<(bool, Vec<String>), Diagnostic> {
        Ok(autocomplete(self.database()?, query, items, true))
    }

    /// The typesetting definitions of all symbols having one.
    pub fn get_html_representations(&mut self) -> Result<Vec<SymbolMarkup>, Diagnostic> {
        Ok(self.database_mut()?.typesetting_pass().representations())
    }

    /// All constants, in declaration order.
    pub fn get_constants(&self) -> Result<Vec<String>, Diagnostic> {
        let db = self.database()?;
        Ok(atom_names(
            db,
            db.table().symbols_of_type(SymbolType::Constant).into_iter().map(|(atom, _)| atom),
        ))
    }

    /// All variables, in declaration order.
    pub fn get_variables(&self) -> Result<Vec<VariableView>, Diagnostic> {
        let db = self.database()?;
        Ok(db
            .table()
            .symbols_of_type(SymbolType::Variable)
            .into_iter()
            .map(|(atom, info)| VariableView {
                symbol: db.atom_name(atom).to_owned(),
                typecode: info.typecode.map(|t| db.atom_name(t).to_owned()),
            })
            .collect())
    }

    /// The floating hypotheses of the outermost scope, in database order.
    pub fn get_floating_hypotheses(&self) -> Result<Vec<FloatingHypothesisView>, Diagnostic> {
        let db = self.database()?;
        let mut depth = 0usize;
        let mut floats = Vec::new();
        for entry in db.statements() {
            match &entry.statement {
                Statement::OpenScope => depth += 1,
                Statement::CloseScope => depth = depth.saturating_sub(1),
                Statement::Floating(float) if depth == 0 => floats.push(FloatingHypothesisView::new(db, float)),
                _ => {}
            }
        }
        Ok(floats)
    }

    /// Checks a worksheet against the open database, returning all errors
    /// and warnings in source order.
    pub fn validate_worksheet(&mut self, text: &str) -> Result<Vec<DetailedError>, Diagnostic> {
        Ok(crate::mmpck::validate_worksheet(self.database_mut()?, text))
    }

    /// Returns the database text a worksheet would add, without adding it.
    pub fn preview_addition(&mut self, text: &str) -> Result<String, Diagnostic> {
        Ok(prepare_addition(self.database_mut()?, text)?.text)
    }

    /// Adds the content of a worksheet to the database and writes the file.
    ///
    /// Nothing is changed unless every check passes: a database must be
    /// open, its file unchanged since it was read, the database free of
    /// errors, and the worksheet non-empty and free of errors.  The proof of
    /// a new theorem must verify, with `?` steps only accepted under
    /// `$allowincomplete`.
    pub fn add_to_database(&mut self, text: &str) -> Result<InsertedAt, Diagnostic> {
        let open = self.open.as_mut().ok_or(Diagnostic::NoDatabase)?;
        if let Some((path, snapshot)) = &open.file {
            if !file_unchanged(path, snapshot.as_ref(), open.db.text().len()) {
                return Err(Diagnostic::DatabaseHasChanged);
            }
        }
        let addition = prepare_addition(&mut open.db, text)?;
        if let Some((path, snapshot)) = &mut open.file {
            fs::write(&*path, addition.database.text())?;
            *snapshot = FileSnapshot::of(path)
                .map_err(|err| warn!("{}: can't stat {} after writing: {err}", open.db.id(), path.display()))
                .ok();
        }
        open.db = addition.database;
        let ticket = self.progress.begin(open.db.id());
        open.db.stmt_parse_pass(&Reporter::new(&self.progress, ticket));
        info!("{}: added {:?}", open.db.id(), addition.inserted_at);
        Ok(addition.inserted_at)
    }
}
