//! The proof verifier itself.
//!
//! This is structured as an analysis pass, whose only outputs are the error
//! indications.  Checking a proof is a kind of interpretation: there is a
//! stack of known results, and each step is an operation which pops zero or
//! more results off the stack, does local checks, and pushes a new result.
//!
//! Results are expressions, stored as atoms with the typecode first.  A
//! [`ProofBuilder`] can be plugged in to collect extra data while checking a
//! proof; this is how proof trees are built for display.

use crate::database::Database;
use crate::diag::Diagnostic;
use crate::nameck::Atom;
use crate::scopeck::{Frame, Hyp};
use crate::statement::{Assertion, Proof, Statement, StatementIndex};
use crate::util::HashMap;
use log::{debug, info};
use std::panic;
use std::thread;

// Proofs are very fragile and there are very few situations where errors are
// recoverable, so we bail out using Result on any error.
macro_rules! try_assert {
    ( $cond:expr , $($arg:tt)+ ) => {
        if !$cond {
            return Err($($arg)+)
        }
    }
}

type Result<T> = std::result::Result<T, Diagnostic>;

/// Which usages of other assertions are accepted in a proof.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct VerifyOptions {
    /// Accept the usage of assertions marked as discouraged.
    pub allow_discouraged: bool,
    /// Accept `?` steps, and the usage of theorems with incomplete proofs.
    pub allow_incomplete: bool,
}

impl VerifyOptions {
    /// Options accepting everything; used when checking a whole database.
    pub const PERMISSIVE: VerifyOptions = VerifyOptions {
        allow_discouraged: true,
        allow_incomplete: true,
    };
}

/// A constructor trait for plugging in to the verifier, to collect extra data
/// during the verification of a proof.
pub trait ProofBuilder {
    /// The data type being generated
    type Item: Clone;
    /// The hyp gathering type
    type Accum: Default;

    /// Add a new hyp to the accumulation type
    fn push(&mut self, hyps: &mut Self::Accum, hyp: Self::Item);

    /// Create a proof data node from a label, the data for the hypotheses,
    /// and the expression it proves
    fn build(&mut self, label: Atom, hyps: Self::Accum, expr: &[Atom]) -> Self::Item;
}

/// The "null" proof builder, which creates no extra data. This
/// is used for one-shot verification, where no extra data beyond the stack
/// information is needed.
impl ProofBuilder for () {
    type Item = ();
    type Accum = ();

    fn push(&mut self, (): &mut (), (): ()) {}

    fn build(&mut self, _: Atom, (): (), _: &[Atom]) {}
}

/// Preparing a step means that it can be referenced by number in a
/// compressed proof.  Prepared steps are either hypotheses and saved results,
/// which are copied directly onto the stack, or assertions which require
/// substitution before use.
enum PreparedStep<'a, D> {
    Hyp(Box<[Atom]>, D),
    Assert(&'a Assertion),
}
use self::PreparedStep::*;

/// Working memory used by the verifier on one proof.
struct VerifyState<'a, P: ProofBuilder> {
    db: &'a Database,
    /// The theorem being checked
    theorem: &'a Assertion,
    /// Its position in the database
    index: StatementIndex,
    options: VerifyOptions,
    /// Used to produce proof trees as a side effect of verification
    builder: &'a mut P,
    /// Steps which can be invoked in the current proof, grows on every Z
    prepared: Vec<PreparedStep<'a, P::Item>>,
    /// Stack of results
    stack: Vec<(P::Item, Box<[Atom]>)>,
    /// 1-based number of the step being executed
    step: usize,
    /// Memoized transitive incompleteness of used theorems
    incomplete: HashMap<Atom, bool>,
}

impl<'a, P: ProofBuilder> VerifyState<'a, P> {
    fn new(db: &'a Database, theorem: &'a Assertion, index: StatementIndex, options: VerifyOptions, builder: &'a mut P) -> Self {
        VerifyState {
            db,
            theorem,
            index,
            options,
            builder,
            prepared: Vec::new(),
            stack: Vec::new(),
            step: 0,
            incomplete: HashMap::default(),
        }
    }

    fn frame(&self) -> &'a Frame {
        &self.theorem.frame
    }

    fn token(&self, atom: Atom) -> Box<str> {
        self.db.atom_name(atom).into()
    }

    /// Returns true if a theorem's proof, or the proof of anything it uses,
    /// contains `?`.
    fn is_incomplete(&mut self, label: Atom) -> bool {
        if let Some(&known) = self.incomplete.get(&label) {
            return known;
        }
        // iterative, with a first visit expanding and a second one concluding
        let mut stack = vec![(label, false)];
        while let Some((atom, expanded)) = stack.pop() {
            if self.incomplete.contains_key(&atom) && !expanded {
                continue;
            }
            let proof = self
                .db
                .index_of(atom)
                .and_then(|i| self.db.statement(i).statement.as_assertion())
                .and_then(|a| a.proof.as_ref());
            let Some(proof) = proof else {
                self.incomplete.insert(atom, false);
                continue;
            };
            let used = proof.labels().filter_map(|l| self.db.names().lookup(l)).collect::<Vec<_>>();
            if expanded {
                let result = proof.is_incomplete()
                    || used.iter().any(|u| self.incomplete.get(u).copied().unwrap_or(false));
                self.incomplete.insert(atom, result);
            } else {
                // provisional value, breaks cycles
                self.incomplete.insert(atom, proof.is_incomplete());
                stack.push((atom, true));
                stack.extend(used.into_iter().filter(|u| !self.incomplete.contains_key(u)).map(|u| (u, false)));
            }
        }
        self.incomplete.get(&label).copied().unwrap_or(false)
    }
}

fn hyp_expr(hyp: &Hyp) -> Box<[Atom]> {
    match hyp {
        Hyp::Floating { typecode, variable, .. } => Box::new([*typecode, *variable]),
        Hyp::Essential { expr, .. } => expr.clone(),
    }
}

/// Resolves a label used in a proof into a step which can be executed.
fn prepare_step<'a, P: ProofBuilder>(state: &mut VerifyState<'a, P>, label: &str) -> Result<PreparedStep<'a, P::Item>> {
    let step = state.step + 1;
    let frame = state.frame();
    let atom = state.db.names().lookup(label);
    let missing = || Diagnostic::StepMissing(step, label.into());

    // hypotheses of the theorem itself, mandatory or not
    if let Some(hyp) = atom.and_then(|atom| {
        frame
            .hypotheses
            .iter()
            .chain(frame.optional_hyps.iter())
            .find(|hyp| hyp.label() == atom)
    }) {
        let expr = hyp_expr(hyp);
        let data = state.builder.build(hyp.label(), P::Accum::default(), &expr);
        return Ok(Hyp(expr, data));
    }

    let atom = atom.ok_or_else(missing)?;
    let index = state.db.index_of(atom).ok_or_else(missing)?;
    try_assert!(index < state.index, Diagnostic::StepUsedBeforeDefinition(step, label.into()));
    let db = state.db;
    let assertion = match &db.statement(index).statement {
        Statement::Axiom(assertion) | Statement::Theorem(assertion) => assertion,
        Statement::Floating(_) | Statement::Essential(_) => {
            return Err(Diagnostic::StepUsedAfterScope(step, label.into()))
        }
        _ => return Err(missing()),
    };
    if !state.options.allow_discouraged {
        try_assert!(
            !assertion.is_discouraged(),
            Diagnostic::DiscouragedTheoremUsed(step, label.into())
        );
    }
    if !state.options.allow_incomplete && assertion.proof.is_some() {
        try_assert!(
            !state.is_incomplete(atom),
            Diagnostic::IncompleteTheoremUsed(step, label.into())
        );
    }
    Ok(Assert(assertion))
}

/// Applies a substitution to an expression, keeping its typecode.
fn substitute(expr: &[Atom], subst: &HashMap<Atom, &[Atom]>) -> Box<[Atom]> {
    let mut out = Vec::with_capacity(expr.len());
    out.push(expr[0]);
    for atom in &expr[1..] {
        match subst.get(atom) {
            Some(replacement) => out.extend_from_slice(replacement),
            None => out.push(*atom),
        }
    }
    out.into_boxed_slice()
}

fn execute_step<P: ProofBuilder>(state: &mut VerifyState<'_, P>, index: usize) -> Result<()> {
    state.step += 1;
    let step = state.step;
    try_assert!(index < state.prepared.len(), Diagnostic::StepMissing(step, "?".into()));

    let assertion = match &state.prepared[index] {
        Hyp(expr, data) => {
            let item = (data.clone(), expr.clone());
            state.stack.push(item);
            return Ok(());
        }
        Assert(assertion) => *assertion,
    };

    let frame = &assertion.frame;
    try_assert!(
        state.stack.len() >= frame.hypotheses.len(),
        Diagnostic::ProofUnderflow(step)
    );
    let sbase = state.stack.len() - frame.hypotheses.len();

    // floating hypotheses first: essential hypotheses may come before the
    // floating hypotheses of their variables
    let mut subst: HashMap<Atom, &[Atom]> = HashMap::default();
    for (ix, hyp) in frame.hypotheses.iter().enumerate() {
        if let Hyp::Floating { typecode, variable, .. } = hyp {
            let slot = &state.stack[sbase + ix].1;
            try_assert!(slot[0] == *typecode, Diagnostic::StepFloatWrongType(step));
            subst.insert(*variable, &slot[1..]);
        }
    }
    for (ix, hyp) in frame.hypotheses.iter().enumerate() {
        if let Hyp::Essential { expr, .. } = hyp {
            let slot = &state.stack[sbase + ix].1;
            try_assert!(slot[0] == expr[0], Diagnostic::StepEssenWrongType(step));
            try_assert!(*substitute(expr, &subst) == **slot, Diagnostic::StepEssenWrong(step));
        }
    }

    // check $d constraints on the used assertion against the ones of the theorem
    let table = state.db.table();
    for &(x, y) in frame.mandatory_dv.iter() {
        let (Some(sx), Some(sy)) = (subst.get(&x), subst.get(&y)) else {
            continue;
        };
        for &a in sx.iter().filter(|&&a| table.is_variable(a)) {
            for &b in sy.iter().filter(|&&b| table.is_variable(b)) {
                try_assert!(
                    a != b && state.theorem.frame.allows_disjoint(a, b),
                    Diagnostic::ProofDvViolation(step, state.token(a), state.token(b))
                );
            }
        }
    }

    let result = substitute(&assertion.expr, &subst);
    let mut hyps = P::Accum::default();
    for (data, _) in state.stack.drain(sbase..) {
        state.builder.push(&mut hyps, data);
    }
    let data = state.builder.build(assertion.label, hyps, &result);
    state.stack.push((data, result));
    Ok(())
}

fn save_step<P: ProofBuilder>(state: &mut VerifyState<'_, P>) -> Result<()> {
    let (data, expr) = state
        .stack
        .last()
        .ok_or(Diagnostic::ProofInvalidSave(state.step))?;
    let saved = Hyp(expr.clone(), data.clone());
    state.prepared.push(saved);
    Ok(())
}

fn finalize_step<P: ProofBuilder>(state: &mut VerifyState<'_, P>) -> Result<P::Item> {
    // if we get here, it's a valid proof, but was it the _right_ valid proof?
    try_assert!(state.stack.len() <= 1, Diagnostic::ProofExcessEnd);
    let (data, expr) = state.stack.last().ok_or(Diagnostic::ProofNoSteps)?;
    try_assert!(expr[0] == state.theorem.expr[0], Diagnostic::ProofWrongTypeEnd);
    try_assert!(*expr == state.theorem.expr, Diagnostic::ProofWrongExprEnd);
    Ok(data.clone())
}

/// Runs a proof.  Returns `None` when an allowed `?` step stops the check.
fn verify_proof<P: ProofBuilder>(state: &mut VerifyState<'_, P>, proof: &Proof) -> Result<Option<P::Item>> {
    match proof {
        Proof::Normal(labels) => {
            for label in labels.iter() {
                if &**label == "?" {
                    try_assert!(
                        state.options.allow_incomplete,
                        Diagnostic::ProofIncomplete(state.step + 1)
                    );
                    return Ok(None);
                }
                state.prepared.clear();
                let step = prepare_step(state, label)?;
                state.prepared.push(step);
                execute_step(state, 0)?;
            }
        }
        Proof::Compressed { labels, steps } => {
            // compressed proofs preload the mandatory hypotheses
            for hyp in state.frame().hypotheses.iter() {
                let expr = hyp_expr(hyp);
                let data = state.builder.build(hyp.label(), P::Accum::default(), &expr);
                state.prepared.push(Hyp(expr, data));
            }
            for label in labels.iter() {
                let step = prepare_step(state, label)?;
                state.prepared.push(step);
            }

            let mut k = 0usize;
            let mut can_save = false;
            for ch in steps.bytes() {
                match ch {
                    b'A'..=b'T' => {
                        k = k * 20 + (ch - b'A') as usize;
                        execute_step(state, k)?;
                        k = 0;
                        can_save = true;
                    }
                    b'U'..=b'Y' => {
                        k = k * 5 + 1 + (ch - b'U') as usize;
                        try_assert!(k < (u32::MAX as usize / 20) - 1, Diagnostic::ProofMalformedVarint);
                        can_save = false;
                    }
                    b'Z' => {
                        try_assert!(can_save, Diagnostic::ProofInvalidSave(state.step));
                        save_step(state)?;
                        can_save = false;
                    }
                    b'?' => {
                        try_assert!(k == 0, Diagnostic::ProofMalformedVarint);
                        try_assert!(
                            state.options.allow_incomplete,
                            Diagnostic::ProofIncomplete(state.step + 1)
                        );
                        return Ok(None);
                    }
                    _ => return Err(Diagnostic::ProofMalformedVarint),
                }
            }
            try_assert!(k == 0, Diagnostic::ProofMalformedVarint);
        }
    }
    finalize_step(state).map(Some)
}

/// Checks the proof of one assertion with a proof builder.
///
/// Returns `Ok(None)` for axioms, and for incomplete proofs when they are
/// allowed.
pub fn verify_assertion<P: ProofBuilder>(
    db: &Database,
    index: StatementIndex,
    options: VerifyOptions,
    builder: &mut P,
) -> Result<Option<P::Item>> {
    let Some(theorem) = db.statement(index).statement.as_assertion() else {
        return Ok(None);
    };
    let Some(proof) = &theorem.proof else {
        return Ok(None);
    };
    let mut state = VerifyState::new(db, theorem, index, options, builder);
    verify_proof(&mut state, proof)
}

/// Checks the proof of the theorem with the given label.
pub fn verify_theorem(db: &Database, label: &str, options: VerifyOptions) -> Result<()> {
    let index = db
        .label_index(label)
        .ok_or_else(|| Diagnostic::LabelNotFound(label.into()))?;
    verify_assertion(db, index, options, &mut ()).map(|_| ())
}

/// Analysis pass result for the verifier.
#[derive(Default, Clone, Debug)]
pub struct VerifyResult {
    /// The first error of each faulty proof, in statement order.
    pub diagnostics: Vec<(StatementIndex, Diagnostic)>,
}

impl VerifyResult {
    /// The error reported for a statement, if any.
    #[must_use]
    pub fn diagnostic_for(&self, index: StatementIndex) -> Option<&Diagnostic> {
        self.diagnostics
            .binary_search_by_key(&index, |(i, _)| *i)
            .ok()
            .map(|i| &self.diagnostics[i].1)
    }
}

fn verify_range(db: &Database, theorems: &[StatementIndex]) -> Vec<(StatementIndex, Diagnostic)> {
    let mut out = Vec::new();
    for &index in theorems {
        if db.options().trace_recalc {
            info!("verify({})", db.statement_body(index).split_whitespace().next().unwrap_or(""));
        }
        if let Err(diag) = verify_assertion(db, index, VerifyOptions::PERMISSIVE, &mut ()) {
            out.push((index, diag));
        }
    }
    out
}

/// Collects the results of the worker threads, in spawn order.
///
/// A panic in a worker is resumed on the calling thread.
pub(crate) fn join_chunks<T>(handles: Vec<thread::ScopedJoinHandle<'_, Vec<T>>>) -> Vec<T> {
    let mut out = Vec::new();
    for handle in handles {
        match handle.join() {
            Ok(part) => out.extend(part),
            Err(payload) => panic::resume_unwind(payload),
        }
    }
    out
}

/// Checks all proofs of a database, on `jobs` threads.
///
/// Usage of discouraged and incomplete theorems is accepted.
pub(crate) fn verify_pass(db: &Database) -> VerifyResult {
    let theorems = db
        .statements()
        .iter()
        .enumerate()
        .filter(|(_, entry)| matches!(entry.statement, Statement::Theorem(_)))
        .map(|(index, _)| index)
        .collect::<Vec<_>>();
    let jobs = db.options().jobs.max(1);
    let chunk = theorems.len().div_ceil(jobs).max(1);
    let mut diagnostics = if jobs == 1 {
        verify_range(db, &theorems)
    } else {
        thread::scope(|scope| {
            let handles = theorems
                .chunks(chunk)
                .map(|part| scope.spawn(move || verify_range(db, part)))
                .collect::<Vec<_>>();
            join_chunks(handles)
        })
    };
    diagnostics.sort_by_key(|(index, _)| *index);
    debug!("verified {} proofs, {} failed", theorems.len(), diagnostics.len());
    VerifyResult { diagnostics }
}
