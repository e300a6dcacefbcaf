//! The proof object model, used to display proofs on theorem pages.

use crate::database::Database;
use crate::diag::Diagnostic;
use crate::nameck::Atom;
use crate::statement::StatementIndex;
use crate::util::HashMap;
use crate::verify::{verify_assertion, ProofBuilder, VerifyOptions};
use std::cmp::Ordering;
use std::collections::hash_map::DefaultHasher;
use std::collections::BinaryHeap;
use std::hash::{Hash, Hasher};

/// A node of a proof: an assertion or hypothesis applied to earlier nodes.
#[derive(Clone, Debug, Eq)]
pub struct ProofTree {
    /// The label of the axiom, theorem or hypothesis at the root.
    pub label: Atom,
    /// The hypotheses, in frame order, as indices into the parent `ProofTreeArray`.
    pub children: Vec<usize>,
    /// The precomputed hash for this tree.
    hash: u64,
}

impl PartialEq for ProofTree {
    /// This is a shallow equality check
    fn eq(&self, other: &ProofTree) -> bool {
        self.label == other.label && self.children == other.children
    }
}

impl Hash for ProofTree {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.hash.hash(state);
    }
}

impl ProofTree {
    fn new(parent: &ProofTreeArray, label: Atom, children: Vec<usize>) -> Self {
        let mut hasher = DefaultHasher::new();
        label.hash(&mut hasher);
        for &ix in &children {
            parent.trees[ix].hash.hash(&mut hasher);
        }
        ProofTree {
            label,
            children,
            hash: hasher.finish(),
        }
    }
}

/// One line of a displayed proof.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProofLine {
    /// 1-based number of the line.
    pub step: usize,
    /// Line numbers of the hypotheses used by this step.
    pub hypotheses: Vec<usize>,
    /// The label of the assertion or hypothesis applied.
    pub label: String,
    /// Distance to the final step, the final step having indentation 1.
    pub indentation: usize,
    /// The expression proved by this step.
    pub expression: String,
}

/// The steps of a proof, each distinct subproof stored once.
#[derive(Debug, Clone, Default)]
pub struct ProofTreeArray {
    map: HashMap<ProofTree, usize>,
    /// The list of proof trees
    pub trees: Vec<ProofTree>,
    exprs: Vec<Box<[Atom]>>,
    /// The QED step
    pub qed: usize,
    indent: Vec<u16>,
}

impl ProofTreeArray {
    /// Constructs a new empty `ProofTreeArray`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the proof tree of a theorem.
    ///
    /// Returns `Ok(None)` for axioms and for incomplete proofs.
    pub fn from_theorem(db: &Database, index: StatementIndex) -> Result<Option<ProofTreeArray>, Diagnostic> {
        let mut arr = ProofTreeArray::new();
        let Some(qed) = verify_assertion(db, index, VerifyOptions::PERMISSIVE, &mut arr)? else {
            return Ok(None);
        };
        arr.qed = qed;
        arr.calc_indent();
        Ok(Some(arr))
    }

    /// Get the minimum distance from each step to the QED step
    #[must_use]
    pub fn indent(&self) -> &[u16] {
        &self.indent
    }

    /// The expression proved by each step.
    #[must_use]
    pub fn exprs(&self) -> &[Box<[Atom]>] {
        &self.exprs
    }

    /// Finds the shortest path from each node in the proof tree to the `qed`
    /// step, using Dijkstra's algorithm.
    fn calc_indent(&mut self) {
        #[derive(Copy, Clone, Eq, PartialEq)]
        struct IndentNode {
            index: usize,
            cost: u16,
        }

        // min-heap on the cost
        impl Ord for IndentNode {
            fn cmp(&self, other: &IndentNode) -> Ordering {
                other.cost.cmp(&self.cost)
            }
        }

        impl PartialOrd for IndentNode {
            fn partial_cmp(&self, other: &IndentNode) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }

        let mut dist = vec![u16::MAX; self.trees.len()];
        let mut heap = BinaryHeap::new();
        dist[self.qed] = 0;
        heap.push(IndentNode {
            index: self.qed,
            cost: 0,
        });

        while let Some(IndentNode { index, cost }) = heap.pop() {
            if cost > dist[index] {
                continue;
            }
            for &hix in &self.trees[index].children {
                let next = IndentNode {
                    index: hix,
                    cost: cost.saturating_add(1),
                };
                if next.cost < dist[next.index] {
                    heap.push(next);
                    dist[next.index] = next.cost;
                }
            }
        }

        self.indent = dist;
    }

    /// Lists the proof as numbered lines, hypotheses before their uses.
    ///
    /// Unless `all_steps` is set, only steps proving an expression with the
    /// provable typecode are listed, and the others are skipped in the
    /// hypothesis numbers.
    #[must_use]
    pub fn proof_lines(&self, db: &Database, all_steps: bool) -> Vec<ProofLine> {
        let provable = db.provable_typecode();
        let shown = |ix: usize| all_steps || Some(self.exprs[ix][0]) == provable;
        let mut numbers: Vec<Option<usize>> = vec![None; self.trees.len()];
        let mut visited = vec![false; self.trees.len()];
        let mut lines = Vec::new();
        if self.trees.is_empty() {
            return lines;
        }

        // post-order walk, each shared subproof listed once
        let mut stack = vec![(self.qed, 0usize)];
        while let Some(&mut (ix, ref mut child)) = stack.last_mut() {
            if let Some(&hix) = self.trees[ix].children.get(*child) {
                *child += 1;
                if !visited[hix] {
                    visited[hix] = true;
                    stack.push((hix, 0));
                }
                continue;
            }
            stack.pop();
            if !shown(ix) {
                continue;
            }
            let step = lines.len() + 1;
            numbers[ix] = Some(step);
            let tree = &self.trees[ix];
            lines.push(ProofLine {
                step,
                hypotheses: tree.children.iter().filter_map(|&hix| numbers[hix]).collect(),
                label: db.atom_name(tree.label).to_owned(),
                indentation: usize::from(self.indent[ix]) + 1,
                expression: db.names().expr_string(&self.exprs[ix]),
            });
        }
        lines
    }
}

impl ProofBuilder for ProofTreeArray {
    type Item = usize;
    type Accum = Vec<usize>;

    fn push(&mut self, hyps: &mut Vec<usize>, hyp: usize) {
        hyps.push(hyp);
    }

    fn build(&mut self, label: Atom, trees: Vec<usize>, expr: &[Atom]) -> usize {
        let tree = ProofTree::new(self, label, trees);
        if let Some(&ix) = self.map.get(&tree) {
            return ix;
        }
        let ix = self.trees.len();
        self.map.insert(tree.clone(), ix);
        self.trees.push(tree);
        self.exprs.push(expr.into());
        ix
    }
}
