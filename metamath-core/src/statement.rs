//! The `Statement` data structure and related API.
//!
//! ## Spans, positions and indices
//!
//! Every statement of a database remembers the byte range of the source text
//! it was parsed from, including the whitespace and comments which precede
//! it.  Concatenating those ranges in order gives back the database file
//! exactly, which is how a database is serialized after an insertion.
//!
//! Statements are identified by their `StatementIndex`, their position in the
//! database order.  Indices change whenever a statement is inserted, so
//! long-lived references should use labels (or `Atom`s) instead.
//!
//! Math symbols and labels are stored as `Atom`s, which are small integers
//! handed out by the [`Nameset`](crate::nameck::Nameset).

use crate::nameck::Atom;
use crate::scopeck::Frame;

/// Semantic type for positions in files.
///
/// Due to the use of half-open ranges, input files are limited to 4 GiB - 1.
pub type FilePos = u32;

/// Semantic type for statement indices, in database order.
pub type StatementIndex = usize;

/// An owned token, typically a symbol or a label.
pub type Token = Box<str>;

/// Semantic type for file-position ranges.
///
/// Spans will generally not be empty.  An empty span at position 0 is called a
/// null span used as a sentinel value by several functions.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct Span {
    /// Index of first character of the range.
    pub start: FilePos,
    /// Index one past last character of the range.
    pub end: FilePos,
}

impl Span {
    /// Coercion from array index pairs.
    #[inline]
    #[must_use]
    pub const fn new(start: usize, end: usize) -> Span {
        Span {
            start: start as FilePos,
            end: end as FilePos,
        }
    }

    /// Variant on `new` taking [`FilePos`] values.
    #[inline]
    #[must_use]
    pub const fn new2(start: FilePos, end: FilePos) -> Span {
        Span { start, end }
    }

    /// Returns the null span.
    pub const NULL: Span = Span::new(0, 0);

    /// Checks for the null span, i.e. zero length at offset zero.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.end == 0
    }

    /// Get the length of the span.
    #[inline]
    #[must_use]
    pub const fn len(self) -> usize {
        self.end as usize - self.start as usize
    }

    /// Is this an empty span?
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.start == self.end
    }

    /// Given a position span, extract the corresponding characters from a
    /// buffer.
    #[inline]
    #[must_use]
    pub fn as_ref(self, buf: &str) -> &str {
        &buf[self.start as usize..self.end as usize]
    }
}

/// A 1-based line and column in a source text.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub struct Position {
    /// Line number, starting at 1.
    pub line: u32,
    /// Column number, starting at 1.
    pub column: u32,
}

impl Position {
    /// Builds a position from a 1-based line and column.
    #[must_use]
    pub const fn new(line: u32, column: u32) -> Self {
        Position { line, column }
    }
}

impl Default for Position {
    fn default() -> Self {
        Position { line: 1, column: 1 }
    }
}

/// The two kinds of math symbols.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SymbolType {
    /// A variable, declared by `$v`.
    Variable,
    /// A constant, declared by `$c`.
    Constant,
}

/// The heading level, for outline headers.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HeadingLevel {
    /// Database level, the root of the header tree.
    #[default]
    Database,
    /// Major part, introduced by a `####` ruler.
    MajorPart,
    /// Section, introduced by a `#*#*` ruler.
    Section,
    /// Subsection, introduced by a `=-=-` ruler.
    SubSection,
    /// Subsubsection, introduced by a `-.-.` ruler.
    SubSubSection,
}

impl HeadingLevel {
    /// The depth of this level in the header tree, the database being depth 0.
    #[must_use]
    pub const fn depth(self) -> usize {
        self as usize
    }

    /// The heading level found at a given depth, if any.
    #[must_use]
    pub const fn from_depth(depth: usize) -> Option<Self> {
        match depth {
            0 => Some(HeadingLevel::Database),
            1 => Some(HeadingLevel::MajorPart),
            2 => Some(HeadingLevel::Section),
            3 => Some(HeadingLevel::SubSection),
            4 => Some(HeadingLevel::SubSubSection),
            _ => None,
        }
    }

    /// The ruler line decorating a header comment of this level.
    #[must_use]
    pub const fn ruler(self) -> &'static str {
        match self {
            HeadingLevel::Database | HeadingLevel::MajorPart => {
                "###############################################################################"
            }
            HeadingLevel::Section => {
                "#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#"
            }
            HeadingLevel::SubSection => {
                "=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-="
            }
            HeadingLevel::SubSubSection => {
                "-.-.-.-.-.-.-.-.-.-.-.-.-.-.-.-.-.-.-.-.-.-.-.-.-.-.-.-.-.-.-.-.-.-.-.-.-.-.-.-"
            }
        }
    }
}

/// The kinds of plain comments.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CommentKind {
    /// An ordinary comment.
    Normal,
    /// A `$t` typesetting comment.
    Typesetting,
    /// A `$j` additional information comment.
    Extra,
}

/// A header comment, starting a new node in the header tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Heading {
    /// The level of the header.
    pub level: HeadingLevel,
    /// The title, taken from the line between the two rulers.
    pub title: String,
    /// The text following the second ruler.
    pub description: String,
}

/// A floating hypothesis `label $f typecode variable $.`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Floating {
    /// The hypothesis label.
    pub label: Atom,
    /// The typecode constant.
    pub typecode: Atom,
    /// The typed variable.
    pub variable: Atom,
}

/// An essential hypothesis `label $e typecode symbols... $.`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Essential {
    /// The hypothesis label.
    pub label: Atom,
    /// The hypothesis expression, typecode first.
    pub expr: Box<[Atom]>,
}

/// The proof of a theorem, as written in the database.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Proof {
    /// A normal proof: a list of labels in reverse polish notation.
    Normal(Box<[Token]>),
    /// A compressed proof: the label roster followed by the encoded steps.
    Compressed {
        /// Labels listed between the parentheses.
        labels: Box<[Token]>,
        /// The concatenated step letters.
        steps: Box<str>,
    },
}

impl Proof {
    /// Returns true if the proof contains unknown `?` steps.
    #[must_use]
    pub fn is_incomplete(&self) -> bool {
        match self {
            Proof::Normal(labels) => labels.iter().any(|l| &**l == "?"),
            Proof::Compressed { steps, .. } => steps.contains('?'),
        }
    }

    /// The labels referenced by the proof, without the `?` placeholders.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        let labels = match self {
            Proof::Normal(labels) | Proof::Compressed { labels, .. } => labels,
        };
        labels.iter().map(|l| &**l).filter(|&l| l != "?")
    }
}

/// The marker flagging an assertion whose usage is discouraged.
pub const DISCOURAGED_MARKER: &str = "(New usage is discouraged.)";

/// An axiom or a theorem.
#[derive(Clone, Debug)]
pub struct Assertion {
    /// The assertion label.
    pub label: Atom,
    /// The asserted expression, typecode first.
    pub expr: Box<[Atom]>,
    /// Mandatory hypotheses and disjoint variable restrictions.
    pub frame: Frame,
    /// The proof, only for theorems.
    pub proof: Option<Proof>,
    /// The comment immediately preceding the assertion.
    pub description: Option<String>,
}

impl Assertion {
    /// Returns true if the description marks this assertion as discouraged.
    #[must_use]
    pub fn is_discouraged(&self) -> bool {
        self.description
            .as_deref()
            .is_some_and(|d| d.contains(DISCOURAGED_MARKER))
    }

    /// The typecode of the asserted expression.
    #[must_use]
    pub fn typecode(&self) -> Atom {
        self.expr[0]
    }
}

/// A database statement.
#[derive(Clone, Debug)]
pub enum Statement {
    /// A plain comment.
    Comment(CommentKind),
    /// A header comment.
    Heading(Heading),
    /// A `$c` statement.
    Constant(Box<[Atom]>),
    /// A `$v` statement.
    Variable(Box<[Atom]>),
    /// A `$f` statement.
    Floating(Floating),
    /// An `$e` statement.
    Essential(Essential),
    /// A `$d` statement.
    Disjoint(Box<[Atom]>),
    /// An `$a` statement.
    Axiom(Box<Assertion>),
    /// A `$p` statement.
    Theorem(Box<Assertion>),
    /// `${`
    OpenScope,
    /// `$}`
    CloseScope,
}

impl Statement {
    /// The label of the statement, if it has one.
    #[must_use]
    pub fn label(&self) -> Option<Atom> {
        match self {
            Statement::Floating(f) => Some(f.label),
            Statement::Essential(e) => Some(e.label),
            Statement::Axiom(a) | Statement::Theorem(a) => Some(a.label),
            _ => None,
        }
    }

    /// The assertion carried by an axiom or theorem.
    #[must_use]
    pub fn as_assertion(&self) -> Option<&Assertion> {
        match self {
            Statement::Axiom(a) | Statement::Theorem(a) => Some(a),
            _ => None,
        }
    }

    /// Returns true for statements which are axioms or theorems.
    #[must_use]
    pub const fn is_assertion(&self) -> bool {
        matches!(self, Statement::Axiom(_) | Statement::Theorem(_))
    }
}

/// A statement together with its source location.
#[derive(Clone, Debug)]
pub struct StatementEntry {
    /// The parsed statement.
    pub statement: Statement,
    /// The full source range, including the preceding whitespace.
    pub span: Span,
    /// The range of the statement proper, from its label or keyword.
    pub body: Span,
    /// Position of the start of `body`.
    pub start: Position,
}
