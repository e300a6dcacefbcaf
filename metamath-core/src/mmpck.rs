//! Validation of proof worksheets against a database.
//!
//! Checking runs in two stages after [`parse_worksheet`]:
//!
//! * the structure of the worksheet: which statements its kind allows, the
//!   header or comment path, the new labels and symbols, and where the new
//!   content goes;
//! * the proof steps: their names, the steps cited as hypotheses, the
//!   assertions referenced, and the expressions, which are parsed with the
//!   grammar of the database.
//!
//! Each stage only runs if the previous one found no error.  A worksheet
//! which checks without error can be turned into database text with
//! [`CheckedWorksheet::database_text`]; the proof of a theorem is assembled
//! from its steps by unification.
//!
//! Each step is also matched against the assertion it references: a step is
//! confirmed when the assertion's conclusion and hypotheses unify with the
//! step and the steps it cites.  Steps of a theorem given without reference
//! are matched against the assertions before the insertion point, and the
//! first one which fits is used in their place.

use crate::database::{Database, InsertAt};
use crate::diag::{DetailedError, Diagnostic};
use crate::formula::{ParseTree, Substitutions};
use crate::grammar::{active_floats, ambiguity, Grammar, Parsed, StmtParse};
use crate::mmp::{
    parse_worksheet, LocateAfter, MmpLabel, MmpStatementKind, MmpToken, ProofStep, Worksheet,
    WorksheetKind,
};
use crate::nameck::Atom;
use crate::progress::Reporter;
use crate::scopeck::Hyp;
use crate::statement::{Assertion, StatementIndex, SymbolType};
use crate::util::{is_valid_label, is_valid_math_symbol, HashMap, HashSet};
use itertools::Itertools;
use log::debug;
use std::fmt::Write;

/// Column at which long proofs are wrapped.
const LINE_WIDTH: usize = 79;

/// The analysis results worksheets are checked against.
#[derive(Copy, Clone, Debug)]
pub struct WorksheetContext<'a> {
    /// The database the worksheet is to be added to.
    pub db: &'a Database,
    /// Its grammar.
    pub grammar: &'a Grammar,
    /// Parse trees of its hypotheses and assertions.
    pub parses: &'a StmtParse,
}

/// A worksheet which went through all checks.
#[derive(Clone, Debug)]
pub struct CheckedWorksheet<'a> {
    /// The parsed worksheet.
    pub worksheet: Worksheet<'a>,
    /// Where its content goes.
    pub insert_at: InsertAt,
    /// Errors and warnings, in source order.
    pub diagnostics: Vec<DetailedError>,
    /// For each step, the steps proving its hypotheses, `None` for `?`.
    pub step_hypotheses: Vec<Vec<Option<usize>>>,
    /// For each step, the parse tree of its expression.
    pub trees: Vec<Option<ParseTree>>,
    /// For each step without reference, the assertion found to justify it.
    pub found_references: Vec<Option<Atom>>,
    /// For each step, whether its assertion unifies with it and the steps
    /// it cites.  Hypothesis steps are confirmed once parsed.
    pub confirmed: Vec<bool>,
    /// For each step, whether it and all the steps it depends on are
    /// confirmed, without `?` in between.
    pub confirmed_recursive: Vec<bool>,
}

/// Returns true if a worksheet of the given kind may contain the statement.
fn is_allowed(kind: WorksheetKind, statement: MmpStatementKind) -> bool {
    use MmpStatementKind as S;
    match kind {
        WorksheetKind::Header | WorksheetKind::Comment => matches!(statement, S::Label | S::Comment),
        WorksheetKind::Constants => !matches!(
            statement,
            S::Variable
                | S::FloatingHypothesis
                | S::DistinctVar
                | S::ProofLine
                | S::AllowDiscouraged
                | S::AllowIncomplete
                | S::ProofStatement
        ),
        WorksheetKind::Variables => !matches!(
            statement,
            S::DistinctVar | S::ProofLine | S::AllowDiscouraged | S::AllowIncomplete | S::ProofStatement
        ),
        WorksheetKind::Axiom => !matches!(
            statement,
            S::Constant | S::AllowDiscouraged | S::AllowIncomplete | S::ProofStatement
        ),
        WorksheetKind::Theorem => statement != S::Constant,
        WorksheetKind::Empty => true,
    }
}

struct Checker<'w, 'a> {
    ctx: WorksheetContext<'w>,
    ws: &'w Worksheet<'a>,
    diagnostics: Vec<DetailedError>,
    /// Symbols declared by the worksheet.
    new_symbols: HashMap<&'a str, SymbolType>,
    /// Labels introduced by the worksheet.
    new_labels: HashSet<&'a str>,
    /// Statement before which the content is inserted.
    point: StatementIndex,
    /// The floating hypotheses active at the insertion point.
    floats: HashMap<Atom, Atom>,
}

impl<'w, 'a> Checker<'w, 'a> {
    fn token_error(&mut self, diagnostic: Diagnostic, token: MmpToken<'_>) {
        self.diagnostics.push(self.ws.token_error(diagnostic, token));
    }

    fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.diagnostic.is_error())
    }

    fn lookup(&self, name: &str) -> Option<Atom> {
        self.ctx.db.names().lookup(name)
    }

    /// The type of a symbol, declared in the database or in the worksheet.
    fn symbol_type(&self, name: &str) -> Option<SymbolType> {
        self.new_symbols.get(name).copied().or_else(|| {
            let atom = self.lookup(name)?;
            self.ctx.db.table().symbol_type(atom)
        })
    }

    fn is_taken(&self, name: &str) -> bool {
        self.new_symbols.contains_key(name)
            || self.new_labels.contains(name)
            || self.lookup(name).is_some_and(|atom| self.ctx.db.table().is_taken(atom))
    }

    /// Checks a new label, returning true if it can be used.
    fn new_label(&mut self, token: MmpToken<'a>) -> bool {
        if !is_valid_label(token.text) {
            self.token_error(Diagnostic::InvalidLabel(token.text.into()), token);
            false
        } else if self.is_taken(token.text) {
            self.token_error(Diagnostic::LabelAlreadyExists(token.text.into()), token);
            false
        } else {
            self.new_labels.insert(token.text);
            true
        }
    }

    fn check_placement(&mut self) {
        let kind = self.ws.kind();
        for (ix, statement) in self.ws.statements.iter().enumerate() {
            if is_allowed(kind, statement.kind) {
                continue;
            }
            if let Some(diag) = statement.kind.out_of_place() {
                self.diagnostics.push(self.ws.statement_error(diag, ix));
            }
        }
        if kind == WorksheetKind::Axiom {
            for step in &self.ws.steps {
                if !step.is_hypothesis && !step.is_qed() {
                    self.diagnostics
                        .push(self.ws.statement_error(Diagnostic::ProofLinesOutOfPlace, step.statement));
                }
            }
        }
    }

    /// Finds where the content goes, checking the header, comment or
    /// locate-after target.
    fn check_position(&mut self) -> InsertAt {
        let (db, ws) = (self.ctx.db, self.ws);
        match &ws.label {
            Some(MmpLabel::Header { path, path_token, .. }) => {
                if let Err(diag) = db.outline().new_header_position(path) {
                    self.token_error(diag, *path_token);
                }
                return InsertAt::Header(path.clone());
            }
            Some(MmpLabel::Comment { path, path_token }) => {
                if let Err(diag) = db.outline().new_comment_position(db.statements(), path) {
                    self.token_error(diag, *path_token);
                }
                return InsertAt::Comment(path.clone());
            }
            _ => {}
        }
        let Some(locate_after) = ws.locate_after else {
            return InsertAt::End;
        };
        let token = locate_after.token();
        let symbol_type = self
            .lookup(token.text)
            .and_then(|atom| db.table().symbol_type(atom));
        let at = match locate_after {
            LocateAfter::Label(_) => InsertAt::AfterLabel(token.text.to_owned()),
            LocateAfter::Constant(_) if symbol_type != Some(SymbolType::Constant) => {
                self.token_error(Diagnostic::InvalidLocateAfter(token.text.into()), token);
                return InsertAt::End;
            }
            LocateAfter::Variable(_) if symbol_type != Some(SymbolType::Variable) => {
                self.token_error(Diagnostic::InvalidLocateAfter(token.text.into()), token);
                return InsertAt::End;
            }
            LocateAfter::Constant(_) | LocateAfter::Variable(_) => InsertAt::AfterSymbol(token.text.to_owned()),
        };
        match db.insertion_point(&at) {
            Ok(point) => self.point = point,
            Err(diag) => self.token_error(diag, token),
        }
        at
    }

    fn check_declarations(&mut self) {
        let ws = self.ws;
        for &symbol in &ws.constants {
            if !is_valid_math_symbol(symbol.text) {
                self.token_error(Diagnostic::InvalidSymbol(symbol.text.into()), symbol);
            } else if self.is_taken(symbol.text) {
                self.token_error(Diagnostic::TwiceDeclaredConst(symbol.text.into()), symbol);
            } else {
                self.new_symbols.insert(symbol.text, SymbolType::Constant);
            }
        }

        for &symbol in &ws.variables {
            let existing = self
                .lookup(symbol.text)
                .filter(|&atom| self.ctx.db.table().is_taken(atom));
            if !is_valid_math_symbol(symbol.text) {
                self.token_error(Diagnostic::InvalidSymbol(symbol.text.into()), symbol);
            } else if self.new_symbols.contains_key(symbol.text) {
                self.token_error(Diagnostic::TwiceDeclaredVar(symbol.text.into()), symbol);
            } else if let Some(atom) = existing {
                let diag = match self.ctx.db.table().symbol_type(atom) {
                    Some(SymbolType::Variable) => Diagnostic::TwiceDeclaredVar(symbol.text.into()),
                    Some(SymbolType::Constant) => Diagnostic::TwiceDeclaredConst(symbol.text.into()),
                    None => Diagnostic::TwiceDeclaredLabel(symbol.text.into()),
                };
                self.token_error(diag, symbol);
            } else {
                self.new_symbols.insert(symbol.text, SymbolType::Variable);
            }
        }

        let mut typed: HashSet<&str> = HashSet::default();
        for float in &ws.floating_hypotheses {
            self.new_label(float.label);
            if self.symbol_type(float.typecode.text) != Some(SymbolType::Constant) {
                self.token_error(Diagnostic::FloatHypTypecode(float.typecode.text.into()), float.typecode);
                continue;
            }
            if self.symbol_type(float.variable.text) != Some(SymbolType::Variable) {
                self.token_error(Diagnostic::FloatHypVariable(float.variable.text.into()), float.variable);
                continue;
            }
            let previous = self
                .lookup(float.variable.text)
                .filter(|_| !self.new_symbols.contains_key(float.variable.text))
                .and_then(|atom| self.ctx.db.table().symbol(atom))
                .and_then(|info| info.typecode);
            if !typed.insert(float.variable.text) {
                self.token_error(Diagnostic::VarTypeDeclaredTwice(float.variable.text.into()), float.variable);
            } else if let Some(typecode) = previous {
                let diag = if self.ctx.db.atom_name(typecode) == float.typecode.text {
                    Diagnostic::VarTypeDeclaredTwice(float.variable.text.into())
                } else {
                    Diagnostic::VarDeclaredMultipleTypes(float.variable.text.into())
                };
                self.token_error(diag, float.variable);
            }
        }

        for group in &ws.distinct_vars {
            for &var in group {
                if self.symbol_type(var.text) != Some(SymbolType::Variable) {
                    self.token_error(Diagnostic::NonVarInDisj(var.text.into()), var);
                }
            }
        }

        if let Some(label) = ws.assertion_label() {
            self.new_label(label);
        }
    }

    fn check_steps(&mut self) -> (Vec<Vec<Option<usize>>>, Vec<Option<ParseTree>>) {
        let ws = self.ws;
        self.floats = active_floats(self.ctx.db, self.point);
        let mut step_hypotheses = Vec::with_capacity(ws.steps.len());
        let mut trees = Vec::with_capacity(ws.steps.len());
        let mut hyp_labels: HashSet<&str> = HashSet::default();

        for (ix, step) in ws.steps.iter().enumerate() {
            let earlier = &ws.steps[..ix];
            if earlier.iter().any(|s| s.name.text == step.name.text) {
                self.token_error(Diagnostic::DuplicateStepName(step.name.text.into()), step.name);
            }

            let mut hyps = Vec::with_capacity(step.hypotheses.len());
            for &hyp in &step.hypotheses {
                if hyp.text == "?" {
                    hyps.push(None);
                } else if let Some(j) = earlier.iter().position(|s| s.name.text == hyp.text) {
                    hyps.push(Some(j));
                } else {
                    self.token_error(Diagnostic::HypNameDoesntExist(hyp.text.into()), hyp);
                }
            }
            step_hypotheses.push(hyps);

            let reference = step.reference;
            if step.is_hypothesis {
                if !reference.text.is_empty() {
                    if !hyp_labels.insert(reference.text) {
                        self.token_error(Diagnostic::DuplicateHypLabels(reference.text.into()), reference);
                    } else {
                        self.new_label(reference);
                    }
                }
            } else if !reference.text.is_empty() {
                let usable = self
                    .ctx
                    .db
                    .assertion(reference.text)
                    .is_some_and(|(index, _)| index < self.point);
                if !usable {
                    self.token_error(Diagnostic::MmpStepRefNotALabel(reference.text.into()), reference);
                }
            }

            trees.push(self.check_expression(&step.expression));
        }

        if matches!(ws.kind(), WorksheetKind::Axiom | WorksheetKind::Theorem) && ws.qed_step().is_none() {
            if let Some(label) = ws.assertion_label() {
                self.token_error(Diagnostic::MissingQedStep, label);
            }
        }
        (step_hypotheses, trees)
    }

    /// Checks the symbols of an expression, and parses it.
    fn check_expression(&mut self, expression: &[MmpToken<'a>]) -> Option<ParseTree> {
        let mut atoms = Vec::with_capacity(expression.len());
        let mut known = true;
        for &token in expression {
            if self.symbol_type(token.text).is_none() {
                self.token_error(Diagnostic::NonSymbolInExpression(token.text.into()), token);
                known = false;
            } else if let Some(atom) = self.lookup(token.text).filter(|_| !self.new_symbols.contains_key(token.text)) {
                atoms.push(atom);
            } else {
                // declared by the worksheet, unknown to the grammar
                known = false;
            }
        }
        let (first, last) = (expression.first()?, expression.last()?);
        if !known {
            return None;
        }
        match self.ctx.grammar.parse_checked(atoms[0], &atoms[1..]) {
            Ok(Parsed { mut tree, ambiguity: found }) => {
                if let Some((a, b)) = found {
                    let diag = ambiguity(self.ctx.db.names(), a, b);
                    self.diagnostics.push(self.ws.error(diag, first.start, last.end()));
                }
                tree.relabel_variables(&self.floats);
                Some(tree)
            }
            Err(diag) => {
                self.diagnostics.push(self.ws.error(diag, first.start, last.end()));
                None
            }
        }
    }
}

/// Checks a worksheet against a database.
///
/// Fails with the errors of [`parse_worksheet`] if the worksheet is
/// malformed.  Otherwise, the diagnostics of the later stages are returned
/// with the checked worksheet.
pub fn check_worksheet<'a>(
    ctx: &WorksheetContext<'_>,
    text: &'a str,
) -> Result<CheckedWorksheet<'a>, Vec<DetailedError>> {
    let ws = parse_worksheet(text)?;
    let mut checker = Checker {
        ctx: *ctx,
        ws: &ws,
        diagnostics: Vec::new(),
        new_symbols: HashMap::default(),
        new_labels: HashSet::default(),
        point: ctx.db.statements().len(),
        floats: HashMap::default(),
    };
    checker.check_placement();
    let insert_at = checker.check_position();
    checker.check_declarations();
    let (step_hypotheses, trees) = if checker.has_errors() {
        (Vec::new(), Vec::new())
    } else {
        checker.check_steps()
    };
    let point = checker.point;
    let mut diagnostics = checker.diagnostics;
    diagnostics.sort_by_key(|err| (err.start, err.end));
    debug!("worksheet: {:?}, {} diagnostics", ws.kind(), diagnostics.len());
    let mut checked = CheckedWorksheet {
        worksheet: ws,
        insert_at,
        diagnostics,
        step_hypotheses,
        trees,
        found_references: Vec::new(),
        confirmed: Vec::new(),
        confirmed_recursive: Vec::new(),
    };
    checked.confirm_steps(ctx, point);
    Ok(checked)
}

/// Checks a worksheet against a database, returning all errors and warnings
/// in source order.
pub fn validate_worksheet(db: &mut Database, text: &str) -> Vec<DetailedError> {
    let grammar = db.grammar_pass(&Reporter::none()).clone();
    let parses = db.stmt_parse_pass(&Reporter::none()).clone();
    let ctx = WorksheetContext {
        db: &*db,
        grammar: &grammar,
        parses: &parses,
    };
    match check_worksheet(&ctx, text) {
        Ok(checked) => checked.diagnostics,
        Err(errors) => errors,
    }
}

/// Appends tokens to `out`, wrapping lines at [`LINE_WIDTH`].
fn write_wrapped<'t>(out: &mut String, indent: &str, tokens: impl IntoIterator<Item = &'t str>) {
    let mut column = out.len() - out.rfind('\n').map_or(0, |pos| pos + 1);
    for token in tokens {
        if column + 1 + token.len() > LINE_WIDTH {
            out.push('\n');
            out.push_str(indent);
            column = indent.len();
        } else {
            out.push(' ');
            column += 1;
        }
        out.push_str(token);
        column += token.len();
    }
}

fn joined(tokens: &[MmpToken<'_>]) -> String {
    tokens.iter().map(|t| t.text).join(" ")
}

impl CheckedWorksheet<'_> {
    /// Returns true if no error, as opposed to warnings, was found.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.diagnostics.iter().any(|d| d.diagnostic.is_error())
    }

    /// The label of a hypothesis step: its reference, or a label derived
    /// from the assertion label and the step name.
    fn hypothesis_label(&self, step: &ProofStep<'_>) -> String {
        if step.reference.text.is_empty() {
            let label = self.worksheet.assertion_label().map_or("", |t| t.text);
            format!("{label}.{}", step.name.text)
        } else {
            step.reference.text.to_owned()
        }
    }

    /// The trees of the steps cited by a step, if none is `?` and all parsed.
    fn cited_trees(&self, ix: usize) -> Option<Vec<&ParseTree>> {
        self.step_hypotheses
            .get(ix)?
            .iter()
            .map(|cited| self.trees.get((*cited)?)?.as_ref())
            .collect()
    }

    /// Returns true if an assertion justifies a step: its conclusion unifies
    /// with the step and its essential hypotheses with the cited steps,
    /// under one substitution.
    fn is_justified_by(&self, ctx: &WorksheetContext<'_>, ix: usize, assertion: &Assertion) -> bool {
        let step = &self.worksheet.steps[ix];
        let Some(tree) = self.trees.get(ix).and_then(Option::as_ref) else {
            return false;
        };
        let Some(cited) = self.cited_trees(ix) else {
            return false;
        };
        let essentials = assertion.frame.essentials().collect::<Vec<_>>();
        let typecode = step.expression.first().map(|t| t.text);
        if essentials.len() != cited.len() || typecode != Some(ctx.db.atom_name(assertion.typecode())) {
            return false;
        }
        let Some(conclusion) = ctx.parses.get(assertion.label) else {
            return false;
        };
        let mut substitutions = Substitutions::new();
        tree.unify(conclusion, &mut substitutions).is_ok()
            && essentials.iter().zip(cited).all(|(hyp, tree)| {
                ctx.parses
                    .get(hyp.label())
                    .is_some_and(|pattern| tree.unify(pattern, &mut substitutions).is_ok())
            })
    }

    /// Finds the first assertion before `point` justifying a step.
    fn find_reference(&self, ctx: &WorksheetContext<'_>, ix: usize, point: StatementIndex) -> Option<Atom> {
        let db = ctx.db;
        db.assertions()
            .take_while(|&(index, _)| index < point)
            .find(|(_, assertion)| !db.is_syntax_axiom(assertion) && self.is_justified_by(ctx, ix, assertion))
            .map(|(_, assertion)| assertion.label)
    }

    /// Looks up the references of steps given without one, and confirms
    /// each step against its assertion.
    fn confirm_steps(&mut self, ctx: &WorksheetContext<'_>, point: StatementIndex) {
        let searching = self.worksheet.kind() == WorksheetKind::Theorem;
        let count = self.trees.len();
        let mut found_references = Vec::with_capacity(count);
        let mut confirmed = Vec::with_capacity(count);
        let mut confirmed_recursive: Vec<bool> = Vec::with_capacity(count);
        for (ix, step) in self.worksheet.steps.iter().enumerate().take(count) {
            let (found, ok) = if step.is_hypothesis {
                (None, self.trees[ix].is_some())
            } else if step.reference.text.is_empty() {
                let found = if searching { self.find_reference(ctx, ix, point) } else { None };
                (found, found.is_some())
            } else {
                let ok = ctx
                    .db
                    .assertion(step.reference.text)
                    .is_some_and(|(_, assertion)| self.is_justified_by(ctx, ix, assertion));
                (None, ok)
            };
            if let Some(label) = found {
                debug!("worksheet: step {} matches {}", step.name.text, ctx.db.atom_name(label));
            }
            let recursive = ok
                && self.step_hypotheses[ix]
                    .iter()
                    .all(|cited| cited.is_some_and(|j| confirmed_recursive.get(j).copied().unwrap_or(false)));
            found_references.push(found);
            confirmed.push(ok);
            confirmed_recursive.push(recursive);
        }
        self.found_references = found_references;
        self.confirmed = confirmed;
        self.confirmed_recursive = confirmed_recursive;
    }

    /// The assertion a step applies: its reference, or the one found for it.
    fn reference<'s>(&'s self, ctx: &WorksheetContext<'s>, ix: usize) -> &'s str {
        match self.found_references.get(ix).copied().flatten() {
            Some(label) => ctx.db.atom_name(label),
            None => self.worksheet.steps[ix].reference.text,
        }
    }

    /// Matches a step against the assertion it references.
    ///
    /// The hypotheses of the assertion are unified with the cited steps, and
    /// its conclusion with the step itself.  Unknown hypotheses are skipped.
    fn unify_step(&self, ctx: &WorksheetContext<'_>, ix: usize, label: Atom, essentials: &[&Hyp]) -> Option<Substitutions> {
        let mut substitutions = Substitutions::new();
        let tree = self.trees.get(ix)?.as_ref()?;
        tree.unify(ctx.parses.get(label)?, &mut substitutions).ok()?;
        let cited = &self.step_hypotheses[ix];
        if cited.len() != essentials.len() {
            return None;
        }
        for (hyp, cited) in essentials.iter().zip(cited) {
            let Some(tree) = cited.and_then(|j| self.trees[j].as_ref()) else {
                continue;
            };
            tree.unify(ctx.parses.get(hyp.label())?, &mut substitutions).ok()?;
        }
        Some(substitutions)
    }

    fn push_step_proof(&self, ctx: &WorksheetContext<'_>, ix: usize, out: &mut Vec<String>) {
        let step = &self.worksheet.steps[ix];
        if step.is_hypothesis {
            out.push(self.hypothesis_label(step));
            return;
        }
        let reference = self.reference(ctx, ix);
        let Some((_, assertion)) = ctx.db.assertion(reference) else {
            out.push("?".to_owned());
            return;
        };
        let essentials = assertion.frame.essentials().collect::<Vec<_>>();
        let Some(substitutions) = self.unify_step(ctx, ix, assertion.label, &essentials) else {
            out.push("?".to_owned());
            return;
        };
        let mut cited = self.step_hypotheses[ix].iter();
        for hyp in assertion.frame.hypotheses.iter() {
            match *hyp {
                Hyp::Floating { variable, .. } => match substitutions.get(variable) {
                    Some(tree) => {
                        let mut labels = Vec::new();
                        ctx.grammar.syntax_proof(tree, &mut labels);
                        out.extend(labels.into_iter().map(|l| ctx.db.atom_name(l).to_owned()));
                    }
                    None => out.push("?".to_owned()),
                },
                Hyp::Essential { .. } => match cited.next().copied().flatten() {
                    Some(j) => self.push_step_proof(ctx, j, out),
                    None => out.push("?".to_owned()),
                },
            }
        }
        out.push(reference.to_owned());
    }

    /// Builds a normal proof of the theorem.
    ///
    /// An explicit `$=` statement is used as is.  Otherwise the proof is
    /// assembled from the `qed` step, filling the floating hypotheses of
    /// each assertion from the unification of its hypotheses and
    /// conclusion.  Steps which can't be resolved are written `?`.
    #[must_use]
    pub fn build_proof(&self, ctx: &WorksheetContext<'_>) -> Vec<String> {
        if let Some(proof) = &self.worksheet.proof {
            return proof.iter().map(|t| t.text.to_owned()).collect();
        }
        let mut out = Vec::new();
        match self.worksheet.qed_step() {
            Some(qed) => self.push_step_proof(ctx, qed, &mut out),
            None => out.push("?".to_owned()),
        }
        out
    }

    /// Writes the content of the worksheet as database text.
    pub fn database_text(&self, ctx: &WorksheetContext<'_>) -> Result<String, Diagnostic> {
        let ws = &self.worksheet;
        let mut out = String::new();
        let description = ws.description.as_deref().unwrap_or("");
        match &ws.label {
            Some(MmpLabel::Header { path, title, .. }) => {
                let (_, level) = ctx.db.outline().new_header_position(path)?;
                let ruler = level.ruler();
                let _ = write!(out, "$(\n{ruler}\n  {title}\n{ruler}\n");
                if !description.is_empty() {
                    let _ = write!(out, "\n  {description}\n");
                }
                out.push_str("$)");
            }
            Some(MmpLabel::Comment { .. }) => {
                let _ = write!(out, "$( {description} $)");
            }
            Some(MmpLabel::Axiom(label) | MmpLabel::Theorem(label)) => {
                let qed = ws.qed_step().ok_or(Diagnostic::MissingQedStep)?;
                let hyps = ws.steps.iter().filter(|s| s.is_hypothesis).collect::<Vec<_>>();
                let scoped = !hyps.is_empty()
                    || !ws.variables.is_empty()
                    || !ws.floating_hypotheses.is_empty()
                    || !ws.distinct_vars.is_empty();
                let indent = if scoped { "  " } else { "" };
                if scoped {
                    out.push_str("${\n");
                }
                if !ws.variables.is_empty() {
                    let _ = writeln!(out, "{indent}$v {} $.", joined(&ws.variables));
                }
                for float in &ws.floating_hypotheses {
                    let _ = writeln!(
                        out,
                        "{indent}{} $f {} {} $.",
                        float.label.text, float.typecode.text, float.variable.text
                    );
                }
                for group in &ws.distinct_vars {
                    let _ = writeln!(out, "{indent}$d {} $.", joined(group));
                }
                for hyp in hyps {
                    let _ = writeln!(out, "{indent}{} $e {} $.", self.hypothesis_label(hyp), joined(&hyp.expression));
                }
                if !description.is_empty() {
                    let _ = writeln!(out, "{indent}$( {description} $)");
                }
                let expression = joined(&ws.steps[qed].expression);
                if matches!(ws.label, Some(MmpLabel::Axiom(_))) {
                    let _ = write!(out, "{indent}{} $a {expression} $.", label.text);
                } else {
                    let _ = write!(out, "{indent}{} $p {expression} $=", label.text);
                    let proof = self.build_proof(ctx);
                    let proof_indent = format!("{indent}    ");
                    write_wrapped(&mut out, &proof_indent, proof.iter().map(String::as_str).chain(["$."]));
                }
                if scoped {
                    out.push_str("\n$}");
                }
            }
            None => {
                if !ws.constants.is_empty() {
                    let _ = write!(out, "$c {} $.", joined(&ws.constants));
                }
                if !ws.variables.is_empty() {
                    let _ = write!(out, "$v {} $.", joined(&ws.variables));
                }
                for float in &ws.floating_hypotheses {
                    let _ = write!(
                        out,
                        "\n{} $f {} {} $.",
                        float.label.text, float.typecode.text, float.variable.text
                    );
                }
            }
        }
        Ok(out.trim_start().to_owned())
    }
}
