//! Theorem search, quick search and label autocompletion.
//!
//! Searches run over all axioms and theorems in database order, numbered
//! from 1.  An assertion is listed when it passes every filter:
//!
//! * its label contains the label query;
//! * its category is selected;
//! * its axiom and definition dependencies contain all of the `all_` labels,
//!   at least one of the `any_` labels (if any are given) and none of the
//!   `avoid_` labels;
//! * its parse trees satisfy every structural condition.
//!
//! Results are paginated, with pages numbered from 0.

use crate::axiom_use::UsageResult;
use crate::database::Database;
use crate::diag::Diagnostic;
use crate::formula::ParseTree;
use crate::grammar::{Grammar, StmtParse};
use crate::nameck::Atom;
use crate::scopeck::Hyp;
use crate::statement::{Assertion, Statement, StatementIndex};
use itertools::Itertools;
use log::debug;

/// Which expressions of an assertion a structural condition looks at.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SearchTarget {
    /// At least one essential hypothesis.
    AnyHypothesis,
    /// Every essential hypothesis.
    AllHypotheses,
    /// The assertion itself.
    Assertion,
    /// At least one of the hypotheses and the assertion.
    AnyExpression,
    /// Every hypothesis and the assertion.
    AllExpressions,
}

/// How an expression is compared with a pattern.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SearchCondition {
    /// The expression is an instance of the pattern.
    Matches,
    /// A subexpression is an instance of the pattern.
    Contains,
}

/// A structural filter on the parse trees of an assertion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseTreeCondition {
    /// The expressions looked at.
    pub target: SearchTarget,
    /// How they are compared.
    pub condition: SearchCondition,
    /// The pattern, as math symbols separated by whitespace.  Its variables
    /// stand for any subexpression of their typecode.
    pub pattern: String,
}

/// The filters of a theorem search.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchParameters {
    /// 0-based page number.
    pub page: usize,
    /// Substring of the label.
    pub label: String,
    /// Axioms which must all be used.
    pub all_axiom_dependencies: Vec<String>,
    /// Axioms of which at least one must be used.
    pub any_axiom_dependencies: Vec<String>,
    /// Axioms which must not be used.
    pub avoid_axiom_dependencies: Vec<String>,
    /// Definitions which must all be used.
    pub all_definition_dependencies: Vec<String>,
    /// Definitions of which at least one must be used.
    pub any_definition_dependencies: Vec<String>,
    /// Definitions which must not be used.
    pub avoid_definition_dependencies: Vec<String>,
    /// Structural conditions, all of which must hold.
    pub parse_tree_conditions: Vec<ParseTreeCondition>,
    /// List theorems.
    pub show_theorems: bool,
    /// List axioms which are neither definitions nor syntax axioms.
    pub show_axioms: bool,
    /// List definitions.
    pub show_definitions: bool,
    /// List syntax axioms.
    pub show_syntax_axioms: bool,
}

impl Default for SearchParameters {
    fn default() -> Self {
        SearchParameters {
            page: 0,
            label: String::new(),
            all_axiom_dependencies: Vec::new(),
            any_axiom_dependencies: Vec::new(),
            avoid_axiom_dependencies: Vec::new(),
            all_definition_dependencies: Vec::new(),
            any_definition_dependencies: Vec::new(),
            avoid_definition_dependencies: Vec::new(),
            parse_tree_conditions: Vec::new(),
            show_theorems: true,
            show_axioms: true,
            show_definitions: true,
            show_syntax_axioms: false,
        }
    }
}

/// The category of an assertion.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AssertionKind {
    /// A `$p` statement.
    Theorem,
    /// An `$a` statement of the provable typecode, not a definition.
    Axiom,
    /// An `$a` statement whose label starts with `df-`.
    Definition,
    /// An `$a` statement introducing syntax.
    SyntaxAxiom,
}

impl AssertionKind {
    /// Classifies an assertion of a database.
    #[must_use]
    pub fn of(db: &Database, index: StatementIndex, assertion: &Assertion) -> Self {
        if matches!(db.statement(index).statement, Statement::Theorem(_)) {
            AssertionKind::Theorem
        } else if db.is_definition(assertion) {
            AssertionKind::Definition
        } else if db.is_syntax_axiom(assertion) {
            AssertionKind::SyntaxAxiom
        } else {
            AssertionKind::Axiom
        }
    }
}

/// One entry of a theorem list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TheoremListEntry {
    /// The label.
    pub label: String,
    /// 1-based position among all assertions.
    pub theorem_number: usize,
    /// The category.
    pub kind: AssertionKind,
    /// Essential hypotheses, as math strings.
    pub hypotheses: Vec<String>,
    /// The assertion, as a math string.
    pub assertion: String,
    /// The description comment.
    pub description: Option<String>,
}

impl TheoremListEntry {
    /// Builds the list entry for an assertion.
    #[must_use]
    pub fn new(db: &Database, index: StatementIndex, assertion: &Assertion, theorem_number: usize) -> Self {
        TheoremListEntry {
            label: db.atom_name(assertion.label).to_owned(),
            theorem_number,
            kind: AssertionKind::of(db, index, assertion),
            hypotheses: assertion
                .frame
                .essentials()
                .filter_map(|hyp| match hyp {
                    Hyp::Essential { expr, .. } => Some(db.names().expr_string(expr)),
                    Hyp::Floating { .. } => None,
                })
                .collect(),
            assertion: db.names().expr_string(&assertion.expr),
            description: assertion.description.clone(),
        }
    }
}

/// One page of search results.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SearchResult {
    /// The entries of the requested page.
    pub entries: Vec<TheoremListEntry>,
    /// Number of pages, at least 1.
    pub page_count: usize,
    /// First and last theorem number of each page.
    pub page_limits: Vec<(usize, usize)>,
}

/// Number of pages needed for `count` results.
#[must_use]
pub fn page_count(count: usize, page_size: usize) -> usize {
    count.div_ceil(page_size.max(1)).max(1)
}

/// The analysis results a search runs on.
#[derive(Copy, Clone, Debug)]
pub struct SearchContext<'a> {
    /// The database searched.
    pub db: &'a Database,
    /// Axiom and definition dependencies.
    pub usage: &'a UsageResult,
    /// The grammar, to parse patterns.
    pub grammar: &'a Grammar,
    /// Parse trees of the hypotheses and assertions.
    pub parses: &'a StmtParse,
}

struct CompiledCondition {
    target: SearchTarget,
    condition: SearchCondition,
    pattern: ParseTree,
}

impl SearchContext<'_> {
    fn atoms(&self, labels: &[String]) -> Vec<Atom> {
        labels.iter().filter_map(|l| self.db.names().lookup(l)).collect()
    }

    /// Parses a pattern.  Patterns without a leading typecode are read as
    /// expressions of the logic typecode.
    fn compile(&self, condition: &ParseTreeCondition) -> Result<CompiledCondition, Diagnostic> {
        let db = self.db;
        let tokens = condition.pattern.split_whitespace().collect::<Vec<_>>();
        let mut atoms = Vec::with_capacity(tokens.len() + 1);
        for token in &tokens {
            let atom = db
                .names()
                .lookup(token)
                .filter(|&atom| db.table().symbol(atom).is_some())
                .ok_or_else(|| Diagnostic::NonSymbolInExpression((*token).into()))?;
            atoms.push(atom);
        }
        let typed = atoms
            .first()
            .is_some_and(|&first| self.grammar.is_typecode(first) || Some(first) == db.provable_typecode());
        if !typed {
            let logic = db.names().lookup(&db.options().logic_typecode).ok_or(Diagnostic::ExpressionParse)?;
            atoms.insert(0, logic);
        }
        let pattern = self.grammar.parse_expression(atoms[0], &atoms[1..])?;
        Ok(CompiledCondition {
            target: condition.target,
            condition: condition.condition,
            pattern,
        })
    }

    fn check(&self, assertion: &Assertion, condition: &CompiledCondition) -> bool {
        let test = |label: Atom| {
            self.parses.get(label).is_some_and(|tree| match condition.condition {
                SearchCondition::Matches => tree.matches(&condition.pattern),
                SearchCondition::Contains => tree.contains(&condition.pattern),
            })
        };
        let mut hyps = assertion.frame.essentials().map(Hyp::label);
        match condition.target {
            SearchTarget::AnyHypothesis => hyps.any(test),
            SearchTarget::AllHypotheses => hyps.all(test),
            SearchTarget::Assertion => test(assertion.label),
            SearchTarget::AnyExpression => test(assertion.label) || hyps.any(test),
            SearchTarget::AllExpressions => test(assertion.label) && hyps.all(test),
        }
    }

    /// Runs a theorem search.
    ///
    /// Fails if a structural pattern can't be parsed.
    pub fn search(&self, params: &SearchParameters) -> Result<SearchResult, Diagnostic> {
        let db = self.db;
        let usage = self.usage;
        let page_size = db.options().page_size.max(1);
        let all_axioms = usage.axiom_set(&self.atoms(&params.all_axiom_dependencies));
        let any_axioms = usage.axiom_set(&self.atoms(&params.any_axiom_dependencies));
        let avoid_axioms = usage.axiom_set(&self.atoms(&params.avoid_axiom_dependencies));
        let all_definitions = usage.definition_set(&self.atoms(&params.all_definition_dependencies));
        let any_definitions = usage.definition_set(&self.atoms(&params.any_definition_dependencies));
        let avoid_definitions = usage.definition_set(&self.atoms(&params.avoid_definition_dependencies));
        let conditions = params
            .parse_tree_conditions
            .iter()
            .map(|c| self.compile(c))
            .collect::<Result<Vec<_>, _>>()?;

        let matching = db
            .assertions()
            .enumerate()
            .filter(|(_, (index, assertion))| {
                let show = match AssertionKind::of(db, *index, assertion) {
                    AssertionKind::Theorem => params.show_theorems,
                    AssertionKind::Axiom => params.show_axioms,
                    AssertionKind::Definition => params.show_definitions,
                    AssertionKind::SyntaxAxiom => params.show_syntax_axioms,
                };
                if !show || !db.atom_name(assertion.label).contains(params.label.as_str()) {
                    return false;
                }
                let Some(used) = usage.usage(assertion.label) else {
                    return false;
                };
                all_axioms.is_subset(&used.axioms)
                    && (any_axioms.is_empty() || any_axioms.intersects(&used.axioms))
                    && !avoid_axioms.intersects(&used.axioms)
                    && all_definitions.is_subset(&used.definitions)
                    && (any_definitions.is_empty() || any_definitions.intersects(&used.definitions))
                    && !avoid_definitions.intersects(&used.definitions)
                    && conditions.iter().all(|c| self.check(assertion, c))
            })
            .collect::<Vec<_>>();

        let page_limits = matching
            .chunks(page_size)
            .filter_map(|page| Some((page.first()?.0 + 1, page.last()?.0 + 1)))
            .collect();
        let entries = matching
            .iter()
            .skip(params.page.saturating_mul(page_size))
            .take(page_size)
            .map(|&(number, (index, assertion))| TheoremListEntry::new(db, index, assertion, number + 1))
            .collect();
        debug!("search: {} results", matching.len());
        Ok(SearchResult {
            entries,
            page_count: page_count(matching.len(), page_size),
            page_limits,
        })
    }
}

/// Finds labels of assertions matching a query: the exact label first, then
/// labels starting with the query, then labels containing it, each group in
/// database order.
pub fn find_labels<'a>(
    db: &'a Database,
    query: &str,
    limit: usize,
    filter: impl Fn(StatementIndex, &Assertion) -> bool,
) -> Vec<&'a str> {
    let candidates = db
        .assertions()
        .filter(|&(index, assertion)| filter(index, assertion))
        .map(|(_, assertion)| db.atom_name(assertion.label))
        .collect::<Vec<_>>();
    let exact = candidates.iter().filter(|&&label| label == query);
    let prefix = candidates
        .iter()
        .filter(|&&label| label != query && label.starts_with(query));
    let inner = candidates
        .iter()
        .filter(|&&label| !label.starts_with(query) && label.contains(query));
    exact.chain(prefix).chain(inner).copied().take(limit).collect_vec()
}

/// Number of suggestions returned by the autocompletion.
pub const AUTOCOMPLETE_LIMIT: usize = 5;

/// Autocompletes a label among the axioms or the definitions, ignoring the
/// labels already selected in `items`.
///
/// Returns whether the query itself is a valid choice, and up to
/// [`AUTOCOMPLETE_LIMIT`] other suggestions.
#[must_use]
pub fn autocomplete(db: &Database, query: &str, items: &[String], definitions: bool) -> (bool, Vec<String>) {
    let eligible = |assertion: &Assertion| {
        let label = db.atom_name(assertion.label);
        assertion.proof.is_none()
            && !db.is_syntax_axiom(assertion)
            && label.starts_with("df-") == definitions
            && !items.iter().any(|item| item == label)
    };
    let valid = db.assertion(query).is_some_and(|(_, assertion)| eligible(assertion));
    let suggestions = find_labels(db, query, AUTOCOMPLETE_LIMIT, |_, assertion| {
        db.atom_name(assertion.label) != query && eligible(assertion)
    });
    (valid, suggestions.into_iter().map(str::to_owned).collect())
}
