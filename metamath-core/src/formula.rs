//! `ParseTree` stores the result of parsing an expression with the grammar of
//! a database, as the tree of its syntactic derivation.
//!
//! Leaves are variables, with the floating hypothesis typing them.  Inner
//! nodes are applications of syntax axioms, with one child per variable
//! occurrence of the axiom's expression, in order of occurrence.
//!
//! Trees are compared structurally.  [`ParseTree::unify`] matches a tree
//! against a pattern whose variables act as metavariables; this is what the
//! search conditions and the worksheet proof builder are built on.

use crate::nameck::{Atom, Nameset};
use crate::util::HashMap;
use std::fmt;

/// An error occurring during unification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnificationError {
    /// The tree does not have the shape of the pattern.
    ShapeMismatch,
    /// A variable would have to be substituted by two different trees.
    ConflictingSubstitution(Atom),
}

/// A set of substitutions, mapping variables to trees.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Substitutions(HashMap<Atom, ParseTree>);

impl Substitutions {
    /// Creates a new, empty, set of substitutions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets the tree a variable is to be substituted with.
    #[must_use]
    pub fn get(&self, variable: Atom) -> Option<&ParseTree> {
        self.0.get(&variable)
    }

    /// Inserts a substitution.
    pub fn insert(&mut self, variable: Atom, tree: ParseTree) -> Option<ParseTree> {
        self.0.insert(variable, tree)
    }

    /// Number of substituted variables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if nothing is substituted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The derivation tree of an expression.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ParseTree {
    /// A variable, typed by a floating hypothesis.
    Variable {
        /// The variable symbol.
        variable: Atom,
        /// Its typecode.
        typecode: Atom,
        /// The label of the floating hypothesis.
        label: Atom,
    },
    /// An application of a syntax axiom.
    Node {
        /// The label of the syntax axiom.
        production: Atom,
        /// The typecode of the axiom.
        typecode: Atom,
        /// Subtrees for each variable occurrence of the axiom.
        children: Vec<ParseTree>,
    },
}

impl ParseTree {
    /// The typecode of the expression.
    #[must_use]
    pub const fn typecode(&self) -> Atom {
        match *self {
            ParseTree::Variable { typecode, .. } | ParseTree::Node { typecode, .. } => typecode,
        }
    }

    /// The label at the root: a floating hypothesis or a syntax axiom.
    #[must_use]
    pub const fn label(&self) -> Atom {
        match *self {
            ParseTree::Variable { label, .. } => label,
            ParseTree::Node { production, .. } => production,
        }
    }

    /// The children of the root.
    #[must_use]
    pub fn children(&self) -> &[ParseTree] {
        match self {
            ParseTree::Variable { .. } => &[],
            ParseTree::Node { children, .. } => children,
        }
    }

    /// Iterates over all subtrees, depth-first, pre-order.
    pub fn subtrees(&self) -> impl Iterator<Item = &ParseTree> {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            let tree = stack.pop()?;
            stack.extend(tree.children().iter().rev());
            Some(tree)
        })
    }

    /// Iterates over the variables occurring in the tree, with repetitions.
    pub fn variables(&self) -> impl Iterator<Item = Atom> + '_ {
        self.subtrees().filter_map(|tree| match *tree {
            ParseTree::Variable { variable, .. } => Some(variable),
            ParseTree::Node { .. } => None,
        })
    }

    /// Matches this tree against a pattern.
    ///
    /// Variables of the pattern are bound to subtrees of the same typecode;
    /// `substitutions` is completed with the bindings.  On failure, it may
    /// hold partial bindings.
    pub fn unify(&self, pattern: &ParseTree, substitutions: &mut Substitutions) -> Result<(), UnificationError> {
        match pattern {
            ParseTree::Variable { variable, typecode, .. } => {
                if self.typecode() != *typecode {
                    return Err(UnificationError::ShapeMismatch);
                }
                match substitutions.get(*variable) {
                    Some(bound) if bound != self => Err(UnificationError::ConflictingSubstitution(*variable)),
                    Some(_) => Ok(()),
                    None => {
                        substitutions.insert(*variable, self.clone());
                        Ok(())
                    }
                }
            }
            ParseTree::Node { production, children, .. } => match self {
                ParseTree::Node {
                    production: own,
                    children: own_children,
                    ..
                } if own == production && own_children.len() == children.len() => {
                    for (child, pattern_child) in own_children.iter().zip(children) {
                        child.unify(pattern_child, substitutions)?;
                    }
                    Ok(())
                }
                _ => Err(UnificationError::ShapeMismatch),
            },
        }
    }

    /// Returns true if this tree is an instance of the pattern.
    #[must_use]
    pub fn matches(&self, pattern: &ParseTree) -> bool {
        self.unify(pattern, &mut Substitutions::new()).is_ok()
    }

    /// Returns true if some subtree is an instance of the pattern.
    #[must_use]
    pub fn contains(&self, pattern: &ParseTree) -> bool {
        self.subtrees().any(|tree| tree.matches(pattern))
    }

    /// Replaces the variables of this tree by their substitution, if any.
    #[must_use]
    pub fn substitute(&self, substitutions: &Substitutions) -> ParseTree {
        match self {
            ParseTree::Variable { variable, .. } => substitutions
                .get(*variable)
                .cloned()
                .unwrap_or_else(|| self.clone()),
            ParseTree::Node {
                production,
                typecode,
                children,
            } => ParseTree::Node {
                production: *production,
                typecode: *typecode,
                children: children.iter().map(|c| c.substitute(substitutions)).collect(),
            },
        }
    }

    /// Gives each variable the floating hypothesis `labels` maps it to.
    /// Variables not in the map keep theirs.
    pub fn relabel_variables(&mut self, labels: &HashMap<Atom, Atom>) {
        match self {
            ParseTree::Variable { variable, label, .. } => {
                if let Some(&new) = labels.get(&*variable) {
                    *label = new;
                }
            }
            ParseTree::Node { children, .. } => {
                for child in children {
                    child.relabel_variables(labels);
                }
            }
        }
    }

    /// Augments the tree with a nameset, to produce a displayable object.
    #[must_use]
    pub const fn display<'a>(&'a self, names: &'a Nameset) -> TreeDisplay<'a> {
        TreeDisplay { tree: self, names }
    }
}

/// A [`ParseTree`] in the context of a [`Nameset`], displayed as nested
/// labels, e.g. `wi(wph, wps)`.
#[derive(Copy, Clone)]
pub struct TreeDisplay<'a> {
    tree: &'a ParseTree,
    names: &'a Nameset,
}

impl fmt::Display for TreeDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.names.atom_name(self.tree.label()))?;
        let children = self.tree.children();
        if !children.is_empty() {
            f.write_str("(")?;
            for (i, child) in children.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{}", child.display(self.names))?;
            }
            f.write_str(")")?;
        }
        Ok(())
    }
}
