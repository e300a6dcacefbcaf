//! Axiom and definition dependencies of assertions.
//!
//! For every assertion this pass computes the set of axioms and the set of
//! definitions (axioms labelled `df-...`) it transitively depends on, as
//! bitsets over the lists of axioms and definitions in database order.  Syntax
//! axioms are not tracked.  It also propagates proof incompleteness: a
//! theorem is incomplete when its own proof contains `?`, or when it uses an
//! incomplete theorem.

use crate::bit_set::Bitset;
use crate::database::Database;
use crate::nameck::Atom;
use crate::statement::Statement;
use crate::util::HashMap;
use log::debug;

/// Dependencies of a single assertion.
#[derive(Debug, Default, Clone)]
pub struct Usage {
    /// Indices into [`UsageResult::axioms`].
    pub axioms: Bitset,
    /// Indices into [`UsageResult::definitions`].
    pub definitions: Bitset,
    /// True if this proof, or the proof of anything used, contains `?`.
    pub incomplete: bool,
}

/// The result of the axiom usage pass.
#[derive(Debug, Default)]
pub struct UsageResult {
    axioms: Vec<Atom>,
    definitions: Vec<Atom>,
    usage: HashMap<Atom, Usage>,
    referenced_by: HashMap<Atom, Vec<Atom>>,
}

impl UsageResult {
    /// Computes the dependencies of all assertions of a database.
    #[must_use]
    pub fn build(db: &Database) -> Self {
        let mut result = UsageResult::default();
        for entry in db.statements() {
            match &entry.statement {
                Statement::Axiom(axiom) => {
                    let mut usage = Usage::default();
                    if db.is_definition(axiom) {
                        usage.definitions.insert(result.definitions.len());
                        result.definitions.push(axiom.label);
                    } else if !db.is_syntax_axiom(axiom) {
                        usage.axioms.insert(result.axioms.len());
                        result.axioms.push(axiom.label);
                    }
                    result.usage.insert(axiom.label, usage);
                }
                Statement::Theorem(theorem) => {
                    let mut usage = Usage::default();
                    if let Some(proof) = &theorem.proof {
                        usage.incomplete = proof.is_incomplete();
                        let mut seen = Vec::new();
                        for label in proof.labels() {
                            let Some(atom) = db.names().lookup(label) else {
                                continue;
                            };
                            if let Some(used) = result.usage.get(&atom) {
                                usage.axioms |= &used.axioms;
                                usage.definitions |= &used.definitions;
                                usage.incomplete |= used.incomplete;
                                if !seen.contains(&atom) {
                                    seen.push(atom);
                                }
                            }
                        }
                        for atom in seen {
                            result.referenced_by.entry(atom).or_default().push(theorem.label);
                        }
                    }
                    result.usage.insert(theorem.label, usage);
                }
                _ => {}
            }
        }
        debug!(
            "axiom usage: {} axioms, {} definitions",
            result.axioms.len(),
            result.definitions.len()
        );
        result
    }

    /// All tracked axioms, in database order.
    #[must_use]
    pub fn axioms(&self) -> &[Atom] {
        &self.axioms
    }

    /// All definitions, in database order.
    #[must_use]
    pub fn definitions(&self) -> &[Atom] {
        &self.definitions
    }

    /// The dependencies of an assertion.
    #[must_use]
    pub fn usage(&self, label: Atom) -> Option<&Usage> {
        self.usage.get(&label)
    }

    /// Returns true if the assertion is incomplete, directly or through its dependencies.
    #[must_use]
    pub fn is_incomplete(&self, label: Atom) -> bool {
        self.usage.get(&label).is_some_and(|u| u.incomplete)
    }

    /// The axioms an assertion depends on, in database order.
    pub fn axioms_of(&self, label: Atom) -> impl Iterator<Item = Atom> + '_ {
        self.usage
            .get(&label)
            .into_iter()
            .flat_map(|u| u.axioms.iter())
            .map(|i| self.axioms[i])
    }

    /// The definitions an assertion depends on, in database order.
    pub fn definitions_of(&self, label: Atom) -> impl Iterator<Item = Atom> + '_ {
        self.usage
            .get(&label)
            .into_iter()
            .flat_map(|u| u.definitions.iter())
            .map(|i| self.definitions[i])
    }

    /// The theorems whose proof uses an assertion, in database order.
    #[must_use]
    pub fn referenced_by(&self, label: Atom) -> &[Atom] {
        self.referenced_by.get(&label).map_or(&[], Vec::as_slice)
    }

    /// Converts a list of axiom labels into a bitset, skipping unknown labels.
    #[must_use]
    pub fn axiom_set(&self, labels: &[Atom]) -> Bitset {
        index_set(&self.axioms, labels)
    }

    /// Converts a list of definition labels into a bitset, skipping unknown labels.
    #[must_use]
    pub fn definition_set(&self, labels: &[Atom]) -> Bitset {
        index_set(&self.definitions, labels)
    }
}

fn index_set(universe: &[Atom], labels: &[Atom]) -> Bitset {
    let mut set = Bitset::new();
    for label in labels {
        if let Some(i) = universe.iter().position(|a| a == label) {
            set.insert(i);
        }
    }
    set
}
