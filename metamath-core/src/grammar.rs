//! Grammar processes a database, extracts a Grammar, which it also
//! validates, and parses statements in the system.
//!
//! The grammar has one production per syntax axiom, whose right-hand side is
//! the axiom's expression with each variable replaced by the typecode of its
//! floating hypothesis, and one production per floating hypothesis, deriving
//! the variable itself.  Expressions are recognized with an Earley parser;
//! a derivation is then extracted from the chart, choosing the earliest
//! production in database order and, among splits, the leftmost-shortest.
//!
//! Ambiguities are flagged, never resolved silently.  When a syntax axiom is
//! added, its own expression is parsed again looking for a second
//! derivation, and so are the expressions where it overlaps with another
//! syntax axiom of the same typecode: one axiom's expression substituted for
//! a variable of the other, next to a symbol the inner expression could
//! capture.  Every statement and worksheet expression is also parsed looking
//! for a second derivation.
//!
//! A variable has one production, whichever `$f` statement comes first; the
//! trees of a statement are then relabeled with the floating hypotheses
//! active in its scope.

use crate::database::Database;
use crate::diag::Diagnostic;
use crate::formula::ParseTree;
use crate::nameck::{Atom, Nameset};
use crate::progress::Reporter;
use crate::scopeck::Hyp;
use crate::statement::{Assertion, Floating, Statement, StatementIndex};
use crate::util::{HashMap, HashSet};
use log::{debug, info, warn};

/// A symbol of the right-hand side of a production.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum GrammarSymbol {
    /// A math symbol which must appear literally.
    Terminal(Atom),
    /// Any expression of the given typecode.
    NonTerminal(Atom),
}

/// A production of the grammar.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Production {
    /// The syntax axiom or floating hypothesis this production comes from.
    pub label: Atom,
    /// The typecode produced.
    pub typecode: Atom,
    /// The right-hand side.
    pub rhs: Box<[GrammarSymbol]>,
    /// The variable standing at each non-terminal of the right-hand side.
    pub variables: Box<[Atom]>,
    /// For each floating hypothesis of the axiom, in frame order, the index
    /// of the child holding its substitution.
    pub hyp_order: Box<[usize]>,
    /// For floating hypotheses, the variable derived.
    pub float_variable: Option<Atom>,
}

/// An Earley item: a production, how much of it was recognized, and where
/// its recognition started.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
struct Item {
    production: usize,
    dot: usize,
    origin: usize,
}

type SpanKey = (Atom, usize, usize);

/// The derivation search ran out of budget.
struct Exhausted;

/// The grammar built from the database's syntax axioms.
///
/// It is used to parse expressions into [`ParseTree`]s.  See [`StmtParse`]
/// for the parse trees of the statements of the database.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Grammar {
    productions: Vec<Production>,
    by_typecode: HashMap<Atom, Vec<usize>>,
    float_of: HashMap<Atom, usize>,
    labels: HashSet<Atom>,
    provable_typecode: Option<Atom>,
    logic_typecode: Option<Atom>,
    parse_limit: usize,
    ambiguities: Vec<(Atom, Diagnostic)>,
}

impl Grammar {
    /// Builds the grammar of a database.
    #[must_use]
    pub fn build(db: &Database, progress: &Reporter<'_>) -> Grammar {
        let mut grammar = Grammar {
            provable_typecode: db.provable_typecode(),
            logic_typecode: db.names().lookup(&db.options().logic_typecode),
            parse_limit: db.options().grammar_parse_limit,
            ..Grammar::default()
        };
        let labels = grammar.new_labels(db);
        grammar.add_axioms(db, &labels, progress);
        info!(
            "grammar: {} productions, {} ambiguities",
            grammar.productions.len(),
            grammar.ambiguities.len()
        );
        grammar
    }

    /// Returns a copy of this grammar, extended with the syntax axioms and
    /// floating hypotheses of `db` which it does not know yet.
    ///
    /// Productions are preferred in database order, so new statements
    /// which come before known ones need a full rebuild.
    #[must_use]
    pub fn update(&self, db: &Database, progress: &Reporter<'_>) -> Grammar {
        let mut grammar = self.clone();
        let labels = grammar.new_labels(db);
        if labels.is_empty() {
            return grammar;
        }
        if !grammar.appends(db, &labels) {
            debug!("grammar: {} productions inserted before known ones, rebuilding", labels.len());
            return Grammar::build(db, progress);
        }
        debug!("grammar: adding {} productions", labels.len());
        grammar.add_axioms(db, &labels, progress);
        grammar
    }

    /// Labels of syntax axioms and floating hypotheses not in the grammar, in database order.
    fn new_labels(&self, db: &Database) -> Vec<Atom> {
        grammar_labels(db).filter(|label| !self.labels.contains(label)).collect()
    }

    /// Returns true if all known productions come before the first new one.
    fn appends(&self, db: &Database, new: &[Atom]) -> bool {
        let Some(&first) = new.first() else {
            return true;
        };
        grammar_labels(db)
            .skip_while(|&label| label != first)
            .all(|label| !self.labels.contains(&label))
    }

    /// Adds productions for the given labels, and checks the new syntax
    /// axioms for ambiguity.
    pub fn add_axioms(&mut self, db: &Database, labels: &[Atom], progress: &Reporter<'_>) {
        let mut added = Vec::new();
        for &label in labels {
            if !self.labels.insert(label) {
                continue;
            }
            let Some(index) = db.index_of(label) else {
                continue;
            };
            match &db.statement(index).statement {
                Statement::Floating(float) => self.add_float(float),
                Statement::Axiom(axiom) => {
                    if let Some(production) = self.add_syntax_axiom(axiom) {
                        added.push(production);
                    }
                }
                _ => {}
            }
        }
        let total = added.len() * 2;
        for (done, &production) in added.iter().enumerate() {
            self.check_ambiguity(db.names(), production);
            progress.report(done, total);
        }
    }

    fn push(&mut self, production: Production) -> usize {
        let index = self.productions.len();
        self.by_typecode.entry(production.typecode).or_default().push(index);
        self.productions.push(production);
        index
    }

    fn add_float(&mut self, float: &Floating) {
        if self.float_of.contains_key(&float.variable) {
            return;
        }
        let index = self.push(Production {
            label: float.label,
            typecode: float.typecode,
            rhs: Box::new([GrammarSymbol::Terminal(float.variable)]),
            variables: Box::new([]),
            hyp_order: Box::new([]),
            float_variable: Some(float.variable),
        });
        self.float_of.insert(float.variable, index);
    }

    fn add_syntax_axiom(&mut self, axiom: &Assertion) -> Option<usize> {
        let typecode_of = |atom: Atom| {
            axiom.frame.floating().find_map(|hyp| match *hyp {
                Hyp::Floating { variable, typecode, .. } if variable == atom => Some(typecode),
                _ => None,
            })
        };
        let mut rhs = Vec::with_capacity(axiom.expr.len() - 1);
        let mut variables = Vec::new();
        for &atom in &axiom.expr[1..] {
            match typecode_of(atom) {
                Some(typecode) => {
                    rhs.push(GrammarSymbol::NonTerminal(typecode));
                    variables.push(atom);
                }
                None => rhs.push(GrammarSymbol::Terminal(atom)),
            }
        }
        if rhs.is_empty() {
            debug!("grammar: skipping empty syntax axiom");
            return None;
        }
        let hyp_order = axiom
            .frame
            .floating()
            .filter_map(|hyp| match *hyp {
                Hyp::Floating { variable, .. } => variables.iter().position(|&v| v == variable),
                Hyp::Essential { .. } => None,
            })
            .collect::<Vec<_>>();
        Some(self.push(Production {
            label: axiom.label,
            typecode: axiom.typecode(),
            rhs: rhs.into_boxed_slice(),
            variables: variables.into_boxed_slice(),
            hyp_order: hyp_order.into_boxed_slice(),
            float_variable: None,
        }))
    }

    /// Looks for a second derivation of the expression of a syntax axiom,
    /// and of the expressions where it overlaps with other syntax axioms.
    fn check_ambiguity(&mut self, names: &Nameset, production: usize) {
        let label = self.productions[production].label;
        let typecode = self.productions[production].typecode;
        let mut sentences = vec![(typecode, expression_of(&self.productions[production]))];
        for (outer, slot, inner) in self.overlaps(production) {
            let outer = &self.productions[outer];
            sentences.push((outer.typecode, composed(outer, slot, &self.productions[inner])));
        }
        for (typecode, tokens) in sentences {
            let Ok(trees) = self.derivations(typecode, &tokens, 2) else {
                warn!("grammar: ambiguity check of {} exhausted", names.atom_name(label));
                continue;
            };
            if let [first, second, ..] = trees.as_slice() {
                if let Some((a, b)) = first_difference(first, second, None) {
                    let diag = ambiguity(names, a, b);
                    if !self.is_reported(&diag) {
                        warn!("grammar: {}", diag.message());
                        self.ambiguities.push((label, diag));
                    }
                }
            }
        }
    }

    /// The places where a syntax axiom overlaps with another one, or with
    /// itself, as `(outer, slot, inner)`: the expression of `inner` put at
    /// position `slot` of the right-hand side of `outer` starts or ends with
    /// a non-terminal which could take in the neighbouring symbols.
    fn overlaps(&self, production: usize) -> Vec<(usize, usize, usize)> {
        let overlapping = |outer: &Production, slot: usize, inner: &Production| {
            let starts_open = matches!(inner.rhs.first(), Some(GrammarSymbol::NonTerminal(_)));
            let ends_open = matches!(inner.rhs.last(), Some(GrammarSymbol::NonTerminal(_)));
            (starts_open && slot > 0) || (ends_open && slot + 1 < outer.rhs.len())
        };
        let mut out = Vec::new();
        let this = &self.productions[production];
        for (slot, symbol) in this.rhs.iter().enumerate() {
            let GrammarSymbol::NonTerminal(typecode) = *symbol else {
                continue;
            };
            for &inner in self.by_typecode.get(&typecode).into_iter().flatten() {
                let inner_production = &self.productions[inner];
                if inner_production.float_variable.is_none() && overlapping(this, slot, inner_production) {
                    out.push((production, slot, inner));
                }
            }
        }
        for (outer, other) in self.productions.iter().enumerate() {
            if outer == production || other.float_variable.is_some() {
                continue;
            }
            for (slot, symbol) in other.rhs.iter().enumerate() {
                if *symbol == GrammarSymbol::NonTerminal(this.typecode) && overlapping(other, slot, this) {
                    out.push((outer, slot, production));
                }
            }
        }
        out
    }

    /// Returns true if this ambiguity was found while building the grammar.
    #[must_use]
    pub fn is_reported(&self, diag: &Diagnostic) -> bool {
        self.ambiguities.iter().any(|(_, d)| d == diag)
    }

    /// All productions, in the order they were added.
    #[must_use]
    pub fn productions(&self) -> &[Production] {
        &self.productions
    }

    /// Finds the production of a syntax axiom or floating hypothesis.
    #[must_use]
    pub fn production(&self, label: Atom) -> Option<&Production> {
        self.productions.iter().find(|p| p.label == label)
    }

    /// The floating hypothesis production of a variable, if any.
    #[must_use]
    pub fn float_label(&self, variable: Atom) -> Option<Atom> {
        Some(self.productions[*self.float_of.get(&variable)?].label)
    }

    /// Returns true if the typecode is produced by some production.
    #[must_use]
    pub fn is_typecode(&self, typecode: Atom) -> bool {
        self.by_typecode.contains_key(&typecode)
    }

    /// Ambiguity warnings, with the statements they are reported on.
    #[must_use]
    pub fn diagnostics(&self, db: &Database) -> Vec<(StatementIndex, Diagnostic)> {
        self.ambiguities
            .iter()
            .filter_map(|(label, diag)| Some((db.index_of(*label)?, diag.clone())))
            .collect()
    }

    fn goal(&self, typecode: Atom) -> Result<Atom, Diagnostic> {
        if Some(typecode) == self.provable_typecode {
            self.logic_typecode.ok_or(Diagnostic::ExpressionParse)
        } else {
            Ok(typecode)
        }
    }

    /// Parses an expression, given its typecode and the following symbols.
    ///
    /// The provable typecode is parsed as the logic typecode.
    pub fn parse_expression(&self, typecode: Atom, symbols: &[Atom]) -> Result<ParseTree, Diagnostic> {
        let trees = self
            .derivations(self.goal(typecode)?, symbols, 1)
            .map_err(|Exhausted| Diagnostic::ExpressionParse)?;
        trees.into_iter().next().ok_or(Diagnostic::ExpressionParse)
    }

    /// Parses an expression like [`Grammar::parse_expression`], and looks
    /// for a second derivation.
    ///
    /// If the search for a second derivation runs out of budget, the
    /// expression is taken as unambiguous.
    pub fn parse_checked(&self, typecode: Atom, symbols: &[Atom]) -> Result<Parsed, Diagnostic> {
        let goal = self.goal(typecode)?;
        let trees = match self.derivations(goal, symbols, 2) {
            Ok(trees) => trees,
            Err(Exhausted) => {
                debug!("grammar: second derivation search exhausted");
                self.derivations(goal, symbols, 1)
                    .map_err(|Exhausted| Diagnostic::ExpressionParse)?
            }
        };
        let ambiguity = match trees.as_slice() {
            [first, second, ..] => first_difference(first, second, None),
            _ => None,
        };
        let tree = trees.into_iter().next().ok_or(Diagnostic::ExpressionParse)?;
        Ok(Parsed { tree, ambiguity })
    }

    /// Parses an expression given as symbol names, the typecode first.
    pub fn parse_symbols(&self, names: &Nameset, symbols: &[&str]) -> Result<ParseTree, Diagnostic> {
        let atoms = symbols
            .iter()
            .map(|s| names.lookup(s))
            .collect::<Option<Vec<_>>>()
            .ok_or(Diagnostic::ExpressionParse)?;
        let (&typecode, rest) = atoms.split_first().ok_or(Diagnostic::ExpressionParse)?;
        self.parse_expression(typecode, rest)
    }

    /// Writes a parse tree back as the list of its symbols, without typecode.
    #[must_use]
    pub fn flatten(&self, tree: &ParseTree) -> Vec<Atom> {
        let mut out = Vec::new();
        self.flatten_into(tree, &mut out);
        out
    }

    fn flatten_into(&self, tree: &ParseTree, out: &mut Vec<Atom>) {
        match tree {
            ParseTree::Variable { variable, .. } => out.push(*variable),
            ParseTree::Node { production, children, .. } => {
                let Some(production) = self.production(*production) else {
                    return;
                };
                let mut next_child = children.iter();
                for symbol in production.rhs.iter() {
                    match *symbol {
                        GrammarSymbol::Terminal(atom) => out.push(atom),
                        GrammarSymbol::NonTerminal(_) => {
                            if let Some(child) = next_child.next() {
                                self.flatten_into(child, out);
                            }
                        }
                    }
                }
            }
        }
    }

    /// Writes the syntax proof of a parse tree in reverse polish notation.
    ///
    /// Children are visited in the order of the floating hypotheses of
    /// their axiom, as the proof verifier expects them.
    pub fn syntax_proof(&self, tree: &ParseTree, out: &mut Vec<Atom>) {
        if let ParseTree::Node { production, children, .. } = tree {
            if let Some(production) = self.production(*production) {
                for &child in production.hyp_order.iter() {
                    if let Some(child) = children.get(child) {
                        self.syntax_proof(child, out);
                    }
                }
            }
        }
        out.push(tree.label());
    }

    /// Runs the Earley recognizer, returning the completed spans.
    fn recognize(&self, goal: Atom, tokens: &[Atom]) -> HashMap<SpanKey, Vec<usize>> {
        let n = tokens.len();
        let mut sets: Vec<Vec<Item>> = vec![Vec::new(); n + 1];
        let mut seen: Vec<HashSet<Item>> = vec![HashSet::default(); n + 1];
        let mut predicted: Vec<HashSet<Atom>> = vec![HashSet::default(); n + 1];
        let mut completed: HashMap<SpanKey, Vec<usize>> = HashMap::default();

        let add = |sets: &mut Vec<Vec<Item>>, seen: &mut Vec<HashSet<Item>>, k: usize, item: Item| {
            if seen[k].insert(item) {
                sets[k].push(item);
            }
        };

        predicted[0].insert(goal);
        for &production in self.by_typecode.get(&goal).into_iter().flatten() {
            add(&mut sets, &mut seen, 0, Item { production, dot: 0, origin: 0 });
        }

        for k in 0..=n {
            let mut i = 0;
            while i < sets[k].len() {
                let item = sets[k][i];
                i += 1;
                let production = &self.productions[item.production];
                match production.rhs.get(item.dot) {
                    Some(&GrammarSymbol::Terminal(atom)) => {
                        if k < n && tokens[k] == atom {
                            add(&mut sets, &mut seen, k + 1, Item { dot: item.dot + 1, ..item });
                        }
                    }
                    Some(&GrammarSymbol::NonTerminal(typecode)) => {
                        if predicted[k].insert(typecode) {
                            for &next in self.by_typecode.get(&typecode).into_iter().flatten() {
                                add(&mut sets, &mut seen, k, Item { production: next, dot: 0, origin: k });
                            }
                        }
                    }
                    None => {
                        completed
                            .entry((production.typecode, item.origin, k))
                            .or_default()
                            .push(item.production);
                        let advanced = sets[item.origin]
                            .iter()
                            .filter(|waiting| {
                                self.productions[waiting.production].rhs.get(waiting.dot)
                                    == Some(&GrammarSymbol::NonTerminal(production.typecode))
                            })
                            .map(|waiting| Item { dot: waiting.dot + 1, ..*waiting })
                            .collect::<Vec<_>>();
                        for item in advanced {
                            add(&mut sets, &mut seen, k, item);
                        }
                    }
                }
            }
        }
        for productions in completed.values_mut() {
            productions.sort_unstable();
        }
        completed
    }

    /// Finds up to `limit` derivations of `tokens` as `goal`, in preference order.
    fn derivations(&self, goal: Atom, tokens: &[Atom], limit: usize) -> Result<Vec<ParseTree>, Exhausted> {
        let completed = self.recognize(goal, tokens);
        if !completed.contains_key(&(goal, 0, tokens.len())) {
            return Ok(Vec::new());
        }
        let mut deriver = Deriver {
            grammar: self,
            tokens,
            completed: &completed,
            memo: HashMap::default(),
            active: HashSet::default(),
            budget: self.parse_limit.max(1),
            limit,
        };
        deriver.derive(goal, 0, tokens.len())
    }
}

/// The result of [`Grammar::parse_checked`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Parsed {
    /// The preferred derivation.
    pub tree: ParseTree,
    /// If there is a second derivation, the labels where it first differs.
    pub ambiguity: Option<(Atom, Atom)>,
}

/// The ambiguity warning naming two labels.
#[must_use]
pub fn ambiguity(names: &Nameset, a: Atom, b: Atom) -> Diagnostic {
    Diagnostic::GrammarAmbiguous(names.atom_name(a).into(), names.atom_name(b).into())
}

/// Labels of floating hypotheses and syntax axioms, in database order.
fn grammar_labels(db: &Database) -> impl Iterator<Item = Atom> + '_ {
    db.statements().iter().filter_map(move |entry| match &entry.statement {
        Statement::Floating(float) => Some(float.label),
        Statement::Axiom(axiom) if db.is_syntax_axiom(axiom) => Some(axiom.label),
        _ => None,
    })
}

/// The expression of `outer` with the expression of `inner` put at the
/// non-terminal `slot` of its right-hand side.
fn composed(outer: &Production, slot: usize, inner: &Production) -> Vec<Atom> {
    let mut variables = outer.variables.iter();
    let mut out = Vec::new();
    for (pos, symbol) in outer.rhs.iter().enumerate() {
        match *symbol {
            GrammarSymbol::Terminal(atom) => out.push(atom),
            GrammarSymbol::NonTerminal(_) => {
                let variable = variables.next();
                if pos == slot {
                    out.extend(expression_of(inner));
                } else if let Some(&variable) = variable {
                    out.push(variable);
                }
            }
        }
    }
    out
}

/// The expression of a syntax axiom, without typecode, recovered from its production.
fn expression_of(production: &Production) -> Vec<Atom> {
    let mut next_variable = production.variables.iter();
    production
        .rhs
        .iter()
        .filter_map(|symbol| match *symbol {
            GrammarSymbol::Terminal(atom) => Some(atom),
            GrammarSymbol::NonTerminal(_) => next_variable.next().copied(),
        })
        .collect()
}

/// Extracts derivations from a recognized chart.
struct Deriver<'a> {
    grammar: &'a Grammar,
    tokens: &'a [Atom],
    completed: &'a HashMap<SpanKey, Vec<usize>>,
    memo: HashMap<SpanKey, Vec<ParseTree>>,
    active: HashSet<SpanKey>,
    budget: usize,
    limit: usize,
}

impl Deriver<'_> {
    fn derive(&mut self, typecode: Atom, start: usize, end: usize) -> Result<Vec<ParseTree>, Exhausted> {
        let key = (typecode, start, end);
        if let Some(trees) = self.memo.get(&key) {
            return Ok(trees.clone());
        }
        let (grammar, completed) = (self.grammar, self.completed);
        let Some(productions) = completed.get(&key) else {
            return Ok(Vec::new());
        };
        // unit production cycles
        if !self.active.insert(key) {
            return Ok(Vec::new());
        }
        let mut trees = Vec::new();
        for &index in productions {
            let production = &grammar.productions[index];
            for children in self.match_rhs(index, 0, start, end)? {
                trees.push(match production.float_variable {
                    Some(variable) => ParseTree::Variable {
                        variable,
                        typecode,
                        label: production.label,
                    },
                    None => ParseTree::Node {
                        production: production.label,
                        typecode,
                        children,
                    },
                });
                if trees.len() >= self.limit {
                    break;
                }
            }
            if trees.len() >= self.limit {
                break;
            }
        }
        self.active.remove(&key);
        self.memo.insert(key, trees.clone());
        Ok(trees)
    }

    fn match_rhs(
        &mut self,
        production: usize,
        pos: usize,
        start: usize,
        end: usize,
    ) -> Result<Vec<Vec<ParseTree>>, Exhausted> {
        self.budget = self.budget.checked_sub(1).ok_or(Exhausted)?;
        let grammar = self.grammar;
        let rhs = &grammar.productions[production].rhs;
        let Some(&symbol) = rhs.get(pos) else {
            return Ok(if start == end { vec![Vec::new()] } else { Vec::new() });
        };
        let remaining = rhs.len() - pos - 1;
        if start + remaining >= end {
            return Ok(Vec::new());
        }
        match symbol {
            GrammarSymbol::Terminal(atom) => {
                if self.tokens[start] != atom {
                    return Ok(Vec::new());
                }
                self.match_rhs(production, pos + 1, start + 1, end)
            }
            GrammarSymbol::NonTerminal(typecode) => {
                let mut out = Vec::new();
                for split in start + 1..=end - remaining {
                    if !self.completed.contains_key(&(typecode, start, split)) {
                        continue;
                    }
                    let heads = self.derive(typecode, start, split)?;
                    if heads.is_empty() {
                        continue;
                    }
                    let tails = self.match_rhs(production, pos + 1, split, end)?;
                    for head in &heads {
                        for tail in &tails {
                            let mut children = Vec::with_capacity(tail.len() + 1);
                            children.push(head.clone());
                            children.extend(tail.iter().cloned());
                            out.push(children);
                            if out.len() >= self.limit {
                                return Ok(out);
                            }
                        }
                    }
                }
                Ok(out)
            }
        }
    }
}

/// The syntax axioms at the first place where two derivations differ.
///
/// Where one of them is a variable, the axiom applied above it is named.
fn first_difference(a: &ParseTree, b: &ParseTree, parent: Option<Atom>) -> Option<(Atom, Atom)> {
    if a.label() != b.label() {
        let axiom = |tree: &ParseTree| match *tree {
            ParseTree::Variable { label, .. } => parent.unwrap_or(label),
            ParseTree::Node { production, .. } => production,
        };
        return Some((axiom(a), axiom(b)));
    }
    a.children()
        .iter()
        .zip(b.children())
        .find_map(|(x, y)| first_difference(x, y, Some(a.label())))
}

/// The floating hypothesis active for each variable, followed through the
/// scopes of a database.
#[derive(Debug, Default)]
struct ActiveFloats {
    active: HashMap<Atom, Atom>,
    undo: Vec<Vec<(Atom, Option<Atom>)>>,
}

impl ActiveFloats {
    fn step(&mut self, statement: &Statement) {
        match statement {
            Statement::OpenScope => self.undo.push(Vec::new()),
            Statement::CloseScope => {
                for (variable, previous) in self.undo.pop().unwrap_or_default().into_iter().rev() {
                    match previous {
                        Some(label) => self.active.insert(variable, label),
                        None => self.active.remove(&variable),
                    };
                }
            }
            Statement::Floating(float) => {
                let previous = self.active.insert(float.variable, float.label);
                if let Some(scope) = self.undo.last_mut() {
                    scope.push((float.variable, previous));
                }
            }
            _ => {}
        }
    }
}

/// The floating hypotheses active before statement `end`, by variable.
#[must_use]
pub fn active_floats(db: &Database, end: StatementIndex) -> HashMap<Atom, Atom> {
    let mut floats = ActiveFloats::default();
    for entry in &db.statements()[..end.min(db.statements().len())] {
        floats.step(&entry.statement);
    }
    floats.active
}

/// Parse trees of the hypotheses and assertions of a database.
#[derive(Debug, Default, Clone)]
pub struct StmtParse {
    trees: HashMap<Atom, ParseTree>,
    failures: Vec<Atom>,
    ambiguities: HashMap<Atom, Diagnostic>,
    productions: Vec<Atom>,
}

impl StmtParse {
    /// Parses all expressions of a database.
    ///
    /// Parses are taken over from `previous` where they succeeded, as long
    /// as the grammar only grew since; failed parses are retried.  Variables
    /// are labeled with the floating hypothesis active in the scope of each
    /// statement.
    #[must_use]
    pub fn build(db: &Database, grammar: &Grammar, previous: Option<&StmtParse>, progress: &Reporter<'_>) -> StmtParse {
        let previous = previous.filter(|p| {
            p.productions.len() <= grammar.productions.len()
                && p.productions
                    .iter()
                    .zip(&grammar.productions)
                    .all(|(&label, production)| label == production.label)
        });
        let mut result = StmtParse {
            productions: grammar.productions.iter().map(|p| p.label).collect(),
            ..StmtParse::default()
        };
        let mut floats = ActiveFloats::default();
        let statements = db.statements();
        let total = statements.len() * 2;
        for (index, entry) in statements.iter().enumerate() {
            floats.step(&entry.statement);
            let (label, expr) = match &entry.statement {
                Statement::Essential(hyp) => (hyp.label, &hyp.expr),
                Statement::Axiom(assertion) | Statement::Theorem(assertion) => {
                    (assertion.label, &assertion.expr)
                }
                _ => continue,
            };
            if let Some(tree) = previous.and_then(|p| p.trees.get(&label)) {
                result.trees.insert(label, tree.clone());
                if let Some(diag) = previous.and_then(|p| p.ambiguities.get(&label)) {
                    result.ambiguities.insert(label, diag.clone());
                }
                continue;
            }
            if db.options().trace_recalc {
                info!("parsing {}", db.atom_name(label));
            }
            match grammar.parse_checked(expr[0], &expr[1..]) {
                Ok(Parsed { mut tree, ambiguity: found }) => {
                    tree.relabel_variables(&floats.active);
                    result.trees.insert(label, tree);
                    if let Some((a, b)) = found {
                        let diag = ambiguity(db.names(), a, b);
                        if !grammar.is_reported(&diag) {
                            warn!("{} is ambiguous: {}", db.atom_name(label), diag.message());
                            result.ambiguities.insert(label, diag);
                        }
                    }
                }
                Err(_) => {
                    warn!("failed to parse {}", db.atom_name(label));
                    result.failures.push(label);
                }
            }
            if index % 1024 == 0 {
                progress.report(statements.len() + index, total);
            }
        }
        result
    }

    /// The parse tree of a hypothesis or assertion.
    #[must_use]
    pub fn get(&self, label: Atom) -> Option<&ParseTree> {
        self.trees.get(&label)
    }

    /// Labels of the statements which could not be parsed, in database order.
    #[must_use]
    pub fn failures(&self) -> &[Atom] {
        &self.failures
    }

    /// Parse failures and statements with two derivations, as warnings on
    /// their statements, in statement order.
    #[must_use]
    pub fn diagnostics(&self, db: &Database) -> Vec<(StatementIndex, Diagnostic)> {
        let mut out = self
            .failures
            .iter()
            .map(|&label| (label, Diagnostic::ExpressionParse))
            .chain(self.ambiguities.iter().map(|(&label, diag)| (label, diag.clone())))
            .filter_map(|(label, diag)| Some((db.index_of(label)?, diag)))
            .collect::<Vec<_>>();
        out.sort_by_key(|(index, _)| *index);
        out
    }
}
