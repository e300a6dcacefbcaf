//! The scope stack: symbol activity, hypotheses and frames.
//!
//! This module does three things which are related only by the fact that they
//! can be done at the same time, in a single pass over the statements:
//!
//! 1. For `$c $v $f` and labelled statements (`$e $f $a $p`): Check for
//!    duplication
//!
//! 2. For `$e $d $f $a $p`: Check that all used math symbols are active in
//!    scope
//!
//! 3. For `$a $p`: Compute the frame
//!
//! Scopes are pushed on `${` and popped on `$}`.  Popping a scope deactivates
//! the variables, hypotheses and disjoint variable restrictions declared in
//! it, but the global record of declared names is kept, so that constants and
//! labels stay unique across the whole database.

use crate::diag::Diagnostic;
use crate::nameck::{Atom, LabelKind, Nameset, SymbolTable};
use crate::statement::{Floating, StatementIndex, SymbolType};
use crate::util::{ordered_pair, sorted_insert, HashMap, HashSet};

/// A hypothesis of a frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Hyp {
    /// A floating hypothesis, giving the typecode of a variable.
    Floating {
        /// Hypothesis label.
        label: Atom,
        /// Defining statement.
        index: StatementIndex,
        /// Typecode constant.
        typecode: Atom,
        /// Typed variable.
        variable: Atom,
    },
    /// An essential hypothesis.
    Essential {
        /// Hypothesis label.
        label: Atom,
        /// Defining statement.
        index: StatementIndex,
        /// Hypothesis expression, typecode first.
        expr: Box<[Atom]>,
    },
}

impl Hyp {
    /// The label of the hypothesis.
    #[must_use]
    pub const fn label(&self) -> Atom {
        match *self {
            Hyp::Floating { label, .. } | Hyp::Essential { label, .. } => label,
        }
    }

    /// The statement defining the hypothesis.
    #[must_use]
    pub const fn index(&self) -> StatementIndex {
        match *self {
            Hyp::Floating { index, .. } | Hyp::Essential { index, .. } => index,
        }
    }

    /// The typecode of the hypothesis.
    #[must_use]
    pub fn typecode(&self) -> Atom {
        match self {
            Hyp::Floating { typecode, .. } => *typecode,
            Hyp::Essential { expr, .. } => expr[0],
        }
    }

    /// Returns true for floating hypotheses.
    #[must_use]
    pub const fn is_floating(&self) -> bool {
        matches!(self, Hyp::Floating { .. })
    }
}

/// Hypotheses and disjoint variable restrictions of an assertion.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Frame {
    /// Ordered list of mandatory hypotheses, in database order.
    ///
    /// The last entry corresponds to the top of the stack at application time.
    pub hypotheses: Box<[Hyp]>,
    /// Sorted pairs of mandatory variables which must be kept disjoint.
    pub mandatory_dv: Box<[(Atom, Atom)]>,
    /// Active floating hypotheses for variables not occurring in the
    /// assertion, usable as dummy variables in a proof.
    pub optional_hyps: Box<[Hyp]>,
    /// Sorted pairs of all variables which can be treated as disjoint in a
    /// proof of this assertion.
    pub optional_dv: Box<[(Atom, Atom)]>,
}

impl Frame {
    /// Iterates over the floating hypotheses of this frame.
    pub fn floating(&self) -> impl Iterator<Item = &Hyp> {
        self.hypotheses.iter().filter(|hyp| hyp.is_floating())
    }

    /// Iterates over the essential hypotheses of this frame.
    pub fn essentials(&self) -> impl Iterator<Item = &Hyp> {
        self.hypotheses.iter().filter(|hyp| !hyp.is_floating())
    }

    /// Returns true if all mandatory hypotheses are floating.
    #[must_use]
    pub fn is_all_floating(&self) -> bool {
        self.hypotheses.iter().all(Hyp::is_floating)
    }

    /// Returns true if the two variables may be substituted by expressions
    /// sharing no variable in a proof of this frame.
    #[must_use]
    pub fn allows_disjoint(&self, x: Atom, y: Atom) -> bool {
        self.optional_dv.binary_search(&ordered_pair(x, y)).is_ok()
    }
}

/// An active floating hypothesis.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ActiveFloat {
    /// The `$f` statement.
    pub index: StatementIndex,
    /// The hypothesis.
    pub float: Floating,
}

#[derive(Debug, Default)]
struct ScopeFrame {
    opened_at: StatementIndex,
    variables: Vec<Atom>,
    floats: Vec<Atom>,
    essentials_len: usize,
    dv_len: usize,
}

/// The stack of open scopes, tracking which declarations are active.
#[derive(Debug)]
pub struct ScopeStack {
    names: Nameset,
    table: SymbolTable,
    frames: Vec<ScopeFrame>,
    active_vars: HashSet<Atom>,
    active_floats: HashMap<Atom, ActiveFloat>,
    active_essentials: Vec<Hyp>,
    active_dv: Vec<(Atom, Atom)>,
}

impl ScopeStack {
    /// Starts a scope stack at global scope, interning into the given nameset.
    #[must_use]
    pub fn new(names: Nameset) -> Self {
        ScopeStack {
            names,
            table: SymbolTable::default(),
            frames: vec![ScopeFrame::default()],
            active_vars: HashSet::default(),
            active_floats: HashMap::default(),
            active_essentials: Vec::new(),
            active_dv: Vec::new(),
        }
    }

    /// The nameset being interned into.
    #[must_use]
    pub const fn names(&self) -> &Nameset {
        &self.names
    }

    /// Interns a name.
    pub fn intern(&mut self, name: &str) -> Atom {
        self.names.intern(name)
    }

    /// The symbol table collected so far.
    #[must_use]
    pub const fn table(&self) -> &SymbolTable {
        &self.table
    }

    /// The nesting depth, 0 being global scope.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames.len() - 1
    }

    fn current(&mut self) -> &mut ScopeFrame {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    /// Returns true if the symbol is an active constant.
    #[must_use]
    pub fn is_active_constant(&self, atom: Atom) -> bool {
        self.table.symbol_type(atom) == Some(SymbolType::Constant)
    }

    /// Returns true if the symbol is an active variable.
    #[must_use]
    pub fn is_active_variable(&self, atom: Atom) -> bool {
        self.active_vars.contains(&atom)
    }

    /// Finds the active floating hypothesis of a variable.
    #[must_use]
    pub fn resolve_floating_hypothesis(&self, variable: Atom) -> Option<&ActiveFloat> {
        self.active_floats.get(&variable)
    }

    /// Declares a constant.
    pub fn declare_constant(&mut self, symbol: &str, index: StatementIndex) -> Result<Atom, Diagnostic> {
        if self.depth() > 0 {
            return Err(Diagnostic::ConstStatementScope);
        }
        let atom = self.names.intern(symbol);
        if self.table.is_taken(atom) {
            return Err(Diagnostic::TwiceDeclaredConst(symbol.into()));
        }
        self.table.add_symbol(atom, SymbolType::Constant, index);
        Ok(atom)
    }

    /// Declares a variable, or reactivates a variable declared in a closed scope.
    pub fn declare_variable(&mut self, symbol: &str, index: StatementIndex) -> Result<Atom, Diagnostic> {
        let atom = self.names.intern(symbol);
        if self.table.label(atom).is_some() {
            return Err(Diagnostic::TwiceDeclaredLabel(symbol.into()));
        }
        match self.table.symbol_type(atom) {
            Some(SymbolType::Constant) => return Err(Diagnostic::TwiceDeclaredConst(symbol.into())),
            Some(SymbolType::Variable) if self.active_vars.contains(&atom) => {
                return Err(Diagnostic::TwiceDeclaredVar(symbol.into()))
            }
            _ => {}
        }
        self.table.add_symbol(atom, SymbolType::Variable, index);
        self.active_vars.insert(atom);
        self.current().variables.push(atom);
        Ok(atom)
    }

    /// Registers a statement label, which must not collide with any other name.
    pub fn declare_label(
        &mut self,
        label: &str,
        index: StatementIndex,
        kind: LabelKind,
    ) -> Result<Atom, Diagnostic> {
        let atom = self.names.intern(label);
        if self.table.is_taken(atom) {
            return Err(Diagnostic::TwiceDeclaredLabel(label.into()));
        }
        self.table.add_label(atom, index, kind);
        Ok(atom)
    }

    /// Declares a floating hypothesis; the label must already be declared.
    pub fn declare_floating_hypothesis(
        &mut self,
        label: Atom,
        typecode: &str,
        variable: &str,
        index: StatementIndex,
    ) -> Result<Floating, Diagnostic> {
        let tc = self.names.intern(typecode);
        if !self.is_active_constant(tc) {
            return Err(Diagnostic::FloatHypTypecode(typecode.into()));
        }
        let var = self.names.intern(variable);
        if !self.is_active_variable(var) {
            return Err(Diagnostic::FloatHypVariable(variable.into()));
        }
        if self.active_floats.contains_key(&var) {
            return Err(Diagnostic::VarTypeDeclaredTwice(variable.into()));
        }
        if let Some(previous) = self.table.symbol(var).and_then(|info| info.typecode) {
            if previous != tc {
                return Err(Diagnostic::VarDeclaredMultipleTypes(variable.into()));
            }
        }
        self.table.set_typecode(var, tc);
        let float = Floating {
            label,
            typecode: tc,
            variable: var,
        };
        self.active_floats.insert(var, ActiveFloat { index, float });
        self.current().floats.push(var);
        Ok(float)
    }

    /// Declares an essential hypothesis with an already checked expression.
    pub fn declare_essential(&mut self, label: Atom, expr: Box<[Atom]>, index: StatementIndex) {
        self.active_essentials.push(Hyp::Essential { label, index, expr });
    }

    /// Adds the disjoint variable restrictions of a `$d` statement.
    pub fn declare_disjoint(&mut self, symbols: &[&str]) -> Result<Box<[Atom]>, Diagnostic> {
        if symbols.len() < 2 {
            return Err(Diagnostic::ZeroOrOneSymbolDisj);
        }
        let mut vars = Vec::with_capacity(symbols.len());
        for &symbol in symbols {
            let atom = self.names.intern(symbol);
            if !self.is_active_variable(atom) {
                return Err(Diagnostic::NonVarInDisj(symbol.into()));
            }
            vars.push(atom);
        }
        for (i, &x) in vars.iter().enumerate() {
            for &y in &vars[i + 1..] {
                if x != y && !self.active_dv.contains(&ordered_pair(x, y)) {
                    self.active_dv.push(ordered_pair(x, y));
                }
            }
        }
        Ok(vars.into_boxed_slice())
    }

    /// Opens a new scope.
    pub fn push_scope(&mut self, index: StatementIndex) {
        let frame = ScopeFrame {
            opened_at: index,
            variables: Vec::new(),
            floats: Vec::new(),
            essentials_len: self.active_essentials.len(),
            dv_len: self.active_dv.len(),
        };
        self.frames.push(frame);
    }

    /// Closes the innermost scope, deactivating its declarations.
    pub fn pop_scope(&mut self) -> Result<(), Diagnostic> {
        if self.frames.len() == 1 {
            return Err(Diagnostic::ClosedUnopenedScope);
        }
        if let Some(frame) = self.frames.pop() {
            for var in &frame.variables {
                self.active_vars.remove(var);
            }
            for var in &frame.floats {
                self.active_floats.remove(var);
            }
            self.active_essentials.truncate(frame.essentials_len);
            self.active_dv.truncate(frame.dv_len);
        }
        Ok(())
    }

    /// Checks an expression of a `$e`, `$a` or `$p` statement, and atomizes it.
    pub fn check_expression(&mut self, tokens: &[&str]) -> Result<Box<[Atom]>, Diagnostic> {
        let mut expr = Vec::with_capacity(tokens.len());
        for (i, &token) in tokens.iter().enumerate() {
            let atom = self.names.intern(token);
            if self.is_active_constant(atom) {
                expr.push(atom);
                continue;
            }
            if !self.is_active_variable(atom) {
                return Err(Diagnostic::NonSymbolInExpression(token.into()));
            }
            if i == 0 {
                return Err(Diagnostic::ExprNotConstantPrefix(token.into()));
            }
            if !self.active_floats.contains_key(&atom) {
                return Err(Diagnostic::VariableMissingFloat(token.into()));
            }
            expr.push(atom);
        }
        if expr.is_empty() {
            return Err(Diagnostic::ExprNotConstantPrefix("".into()));
        }
        Ok(expr.into_boxed_slice())
    }

    /// Computes the frame of an assertion with the given expression.
    ///
    /// Mandatory variables are those occurring in the assertion or in an
    /// active essential hypothesis.
    #[must_use]
    pub fn build_frame(&self, expr: &[Atom]) -> Frame {
        let mut mandatory = HashSet::default();
        let used = expr
            .iter()
            .chain(self.active_essentials.iter().flat_map(|hyp| match hyp {
                Hyp::Essential { expr, .. } => &expr[..],
                Hyp::Floating { .. } => &[] as &[Atom],
            }))
            .filter(|&&atom| self.active_vars.contains(&atom));
        for &var in used {
            mandatory.insert(var);
        }

        let mut floats = self.active_floats.values().collect::<Vec<_>>();
        floats.sort_by_key(|af| af.index);
        let mut hypotheses = Vec::new();
        let mut optional_hyps = Vec::new();
        for af in floats {
            let hyp = Hyp::Floating {
                label: af.float.label,
                index: af.index,
                typecode: af.float.typecode,
                variable: af.float.variable,
            };
            if mandatory.contains(&af.float.variable) {
                hypotheses.push(hyp);
            } else {
                optional_hyps.push(hyp);
            }
        }
        hypotheses.extend(self.active_essentials.iter().cloned());
        hypotheses.sort_by_key(Hyp::index);

        let mut optional_dv = Vec::with_capacity(self.active_dv.len());
        for &pair in &self.active_dv {
            sorted_insert(&mut optional_dv, pair);
        }
        let mandatory_dv = optional_dv
            .iter()
            .copied()
            .filter(|(x, y)| mandatory.contains(x) && mandatory.contains(y))
            .collect::<Vec<_>>();

        Frame {
            hypotheses: hypotheses.into_boxed_slice(),
            mandatory_dv: mandatory_dv.into_boxed_slice(),
            optional_hyps: optional_hyps.into_boxed_slice(),
            optional_dv: optional_dv.into_boxed_slice(),
        }
    }

    /// Ends the pass, checking that all scopes were closed.
    ///
    /// On error, returns the index of the first unclosed `${` statement.
    pub fn finish(self) -> Result<(Nameset, SymbolTable), (StatementIndex, Diagnostic)> {
        if let Some(frame) = self.frames.get(1) {
            return Err((frame.opened_at, Diagnostic::UnclosedScope));
        }
        Ok((self.names, self.table))
    }
}
