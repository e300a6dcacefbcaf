//! The name index: interning of symbols and labels, and the symbol table.
//!
//! Every math symbol and statement label is interned as an `Atom`.  The
//! [`Nameset`] only ever grows; when a database is rebuilt after an insertion
//! it is handed the previous nameset, so atoms handed out before the insertion
//! keep designating the same names.
//!
//! The [`SymbolTable`] records, for the database as a whole, what each name
//! was declared as and where.  Scope-dependent questions ("is this variable
//! active here?") are answered by the scope stack instead.

use crate::statement::{StatementIndex, SymbolType, Token};
use crate::util::HashMap;

/// Opacified number representing a single math symbol or label.
///
/// Atoms are not lifetime-tracked or ever reused, so they are efficient to
/// handle and can be compared directly.
#[derive(Copy, Clone, Debug, PartialOrd, Ord, PartialEq, Eq, Default, Hash)]
pub struct Atom(u32);

impl Atom {
    /// The index of this atom in its nameset.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// The interning table for names.
#[derive(Default, Debug, Clone)]
pub struct Nameset {
    atoms: HashMap<Token, Atom>,
    names: Vec<Token>,
}

impl Nameset {
    /// Returns the atom for a name, creating it if necessary.
    pub fn intern(&mut self, name: &str) -> Atom {
        if let Some(&atom) = self.atoms.get(name) {
            return atom;
        }
        let atom = Atom(u32::try_from(self.names.len()).unwrap_or(u32::MAX));
        self.names.push(name.into());
        self.atoms.insert(name.into(), atom);
        atom
    }

    /// Returns the atom for a name, if it was ever interned.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<Atom> {
        self.atoms.get(name).copied()
    }

    /// Maps an atom back to its name.
    #[must_use]
    pub fn atom_name(&self, atom: Atom) -> &str {
        &self.names[atom.index()]
    }

    /// Number of atoms handed out so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns true if no atom was handed out yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Joins the names of a list of atoms with spaces.
    #[must_use]
    pub fn expr_string(&self, expr: &[Atom]) -> String {
        let mut out = String::new();
        for (i, &atom) in expr.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            out.push_str(self.atom_name(atom));
        }
        out
    }
}

/// What a labelled statement is.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum LabelKind {
    /// A `$f` hypothesis.
    Floating,
    /// An `$e` hypothesis.
    Essential,
    /// An `$a` statement.
    Axiom,
    /// A `$p` statement.
    Theorem,
}

impl LabelKind {
    /// Returns true for axioms and theorems.
    #[must_use]
    pub const fn is_assertion(self) -> bool {
        matches!(self, LabelKind::Axiom | LabelKind::Theorem)
    }
}

/// Information recorded about a label.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LabelInfo {
    /// The statement defining the label.
    pub index: StatementIndex,
    /// What kind of statement it is.
    pub kind: LabelKind,
}

/// Information recorded about a math symbol.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SymbolInfo {
    /// Constant or variable.
    pub stype: SymbolType,
    /// The first statement declaring the symbol.
    pub declared: StatementIndex,
    /// For variables, the typecode given by their first `$f` statement.
    pub typecode: Option<Atom>,
}

/// Global record of all declared symbols and labels.
#[derive(Default, Debug, Clone)]
pub struct SymbolTable {
    symbols: HashMap<Atom, SymbolInfo>,
    labels: HashMap<Atom, LabelInfo>,
}

impl SymbolTable {
    /// Looks up a math symbol.
    #[must_use]
    pub fn symbol(&self, atom: Atom) -> Option<&SymbolInfo> {
        self.symbols.get(&atom)
    }

    /// Returns the kind of a math symbol, if it was declared.
    #[must_use]
    pub fn symbol_type(&self, atom: Atom) -> Option<SymbolType> {
        self.symbols.get(&atom).map(|info| info.stype)
    }

    /// Returns true if the atom was declared as a variable somewhere.
    #[must_use]
    pub fn is_variable(&self, atom: Atom) -> bool {
        self.symbol_type(atom) == Some(SymbolType::Variable)
    }

    /// Looks up a label.
    #[must_use]
    pub fn label(&self, atom: Atom) -> Option<LabelInfo> {
        self.labels.get(&atom).copied()
    }

    /// Returns true if the name is used by a symbol or a label.
    #[must_use]
    pub fn is_taken(&self, atom: Atom) -> bool {
        self.symbols.contains_key(&atom) || self.labels.contains_key(&atom)
    }

    pub(crate) fn add_symbol(&mut self, atom: Atom, stype: SymbolType, declared: StatementIndex) {
        self.symbols.entry(atom).or_insert(SymbolInfo {
            stype,
            declared,
            typecode: None,
        });
    }

    pub(crate) fn set_typecode(&mut self, variable: Atom, typecode: Atom) {
        if let Some(info) = self.symbols.get_mut(&variable) {
            info.typecode.get_or_insert(typecode);
        }
    }

    pub(crate) fn add_label(&mut self, atom: Atom, index: StatementIndex, kind: LabelKind) {
        self.labels.insert(atom, LabelInfo { index, kind });
    }

    /// All declared symbols of the given type, in declaration order.
    #[must_use]
    pub fn symbols_of_type(&self, stype: SymbolType) -> Vec<(Atom, SymbolInfo)> {
        let mut symbols = self
            .symbols
            .iter()
            .filter(|(_, info)| info.stype == stype)
            .map(|(&atom, &info)| (atom, info))
            .collect::<Vec<_>>();
        symbols.sort_by_key(|&(atom, info)| (info.declared, atom));
        symbols
    }
}
