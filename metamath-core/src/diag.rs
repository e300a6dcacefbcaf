//! Datatypes to represent diagnostics emitted by the database passes and the
//! worksheet validator.
//!
//! This includes an enum-based representation suited for programmatic
//! interpretation and testing, a fieldless [`ErrorKind`] mirror used to name
//! and categorize diagnostics, and a positioned [`DetailedError`] which can be
//! rendered against its source text with `annotate-snippets`.

use crate::line_cache::LineCache;
use crate::statement::{Position, Token};
use annotate_snippets::{Level, Message, Snippet};
use std::error::Error;
use std::fmt::{self, Display};
use std::io;
use typed_arena::Arena;

/// Broad families of diagnostics.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Category {
    /// Malformed characters, tokens, labels or paths.
    Lexical,
    /// Duplicate declarations, scope errors and namespace collisions.
    Namespace,
    /// Grammar construction and expression parsing.
    Grammar,
    /// Proof verification failures.
    Proof,
    /// Structural errors in a proof worksheet.
    Worksheet,
    /// Preconditions of database mutations.
    Mutation,
}

macro_rules! diagnostics {
    ($($variant:ident $(($($field:ty),+))? => $category:ident, $level:ident, $title:literal;)*) => {
        /// List of all diagnostics.  Each kind carries the data needed to
        /// render a specific message; see [`Diagnostic::message`].
        #[derive(Debug, Clone, Eq, PartialEq)]
        #[allow(missing_docs)]
        pub enum Diagnostic {
            $($variant $(($($field),+))?,)*
        }

        /// The kind of a diagnostic, without its data.
        #[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
        #[allow(missing_docs)]
        pub enum ErrorKind {
            $($variant,)*
        }

        impl ErrorKind {
            /// Every error kind, in declaration order.
            pub const ALL: &'static [ErrorKind] = &[$(ErrorKind::$variant,)*];

            /// The stable external name of this kind, e.g. `UnclosedScopeError`.
            #[must_use]
            pub const fn name(self) -> &'static str {
                match self {
                    $(ErrorKind::$variant => concat!(stringify!($variant), "Error"),)*
                }
            }

            /// The human-readable message for this kind.
            #[must_use]
            pub const fn title(self) -> &'static str {
                match self {
                    $(ErrorKind::$variant => $title,)*
                }
            }

            /// The family this kind belongs to.
            #[must_use]
            pub const fn category(self) -> Category {
                match self {
                    $(ErrorKind::$variant => Category::$category,)*
                }
            }

            /// Whether this kind is an error or a warning.
            #[must_use]
            pub const fn severity(self) -> Level {
                match self {
                    $(ErrorKind::$variant => Level::$level,)*
                }
            }
        }

        impl Diagnostic {
            /// The kind of this diagnostic.
            #[must_use]
            pub const fn kind(&self) -> ErrorKind {
                match self {
                    $(Diagnostic::$variant { .. } => ErrorKind::$variant,)*
                }
            }
        }
    };
}

diagnostics! {
    // Lexical and format errors
    NonAsciiSymbol => Lexical, Error, "Only printable ASCII characters and whitespace are allowed.";
    UnclosedComment => Lexical, Error, "This comment is never closed with $).";
    InvalidSymbol(Token) => Lexical, Error, "Math symbols may only contain printable ASCII characters other than $.";
    InvalidLabel(Token) => Lexical, Error, "Labels may only contain letters, digits and the characters - _ .";
    MissingLabel => Lexical, Error, "This statement needs a label.";
    SpuriousLabel(Token) => Lexical, Error, "This statement kind does not take a label.";
    TokenOutsideStatement(Token) => Lexical, Error, "Math symbols may only appear inside a statement.";
    UnknownKeyword(Token) => Lexical, Error, "Unknown keyword.";
    UnclosedStatement => Lexical, Error, "This statement is never closed with $.";
    EmptyConstStatement => Lexical, Error, "Empty $c statement.";
    EmptyVarStatement => Lexical, Error, "Empty $v statement.";
    FloatHypStatementFormat => Lexical, Error, "$f statements must be followed by exactly 3 tokens: The label, the typecode and the variable.";
    ZeroOrOneSymbolDisj => Lexical, Error, "$d statements must be followed by at least 2 variables.";
    MissingProof => Lexical, Error, "$p statements need a proof after $=.";
    UnclosedHeader => Lexical, Error, "This header comment has no closing ruler line.";
    WhitespaceBeforeFirstToken => Lexical, Error, "Statements can't have trailing whitespace.\n\n(This error only shows before the first statement, because other lines with trailing whitespace continue the previous statement.)";
    TypesettingFormat(Token) => Lexical, Warning, "Typesetting commands have the form keyword \"symbol\" as \"text\" + \"text\"... ;";
    DuplicateMarkupDef(Token) => Lexical, Warning, "This symbol already has a typesetting definition of this kind.";
    // Scope and namespace errors
    ConstStatementScope => Namespace, Error, "$c statements are only allowed in the outermost scope.";
    TwiceDeclaredConst(Token) => Namespace, Error, "This constant was already declared as a symbol or used as a label.";
    TwiceDeclaredVar(Token) => Namespace, Error, "This variable is already active in the current scope.";
    TwiceDeclaredLabel(Token) => Namespace, Error, "This label was already used.";
    LabelAlreadyExists(Token) => Namespace, Error, "A statement or symbol with this label already exists in the database.";
    FloatHypTypecode(Token) => Namespace, Error, "The typecode of a $f statement must be an active constant.";
    FloatHypVariable(Token) => Namespace, Error, "The variable of a $f statement must be an active variable.";
    VarTypeDeclaredTwice(Token) => Namespace, Error, "The typecode of this variable was already declared in the current scope.";
    VarDeclaredMultipleTypes(Token) => Namespace, Error, "This variable was already given a different typecode.";
    NonSymbolInExpression(Token) => Namespace, Error, "Expressions may only contain active constants and variables.";
    ExprNotConstantPrefix(Token) => Namespace, Error, "Expressions must start with a constant typecode.";
    VariableMissingFloat(Token) => Namespace, Error, "This variable has no active $f statement giving its typecode.";
    NonVarInDisj(Token) => Namespace, Error, "$d statements may only contain active variables.";
    ClosedUnopenedScope => Namespace, Error, "This $} does not close any open scope.";
    UnclosedScope => Namespace, Error, "This ${ scope is never closed.";
    // Grammar
    GrammarAmbiguous(Token, Token) => Grammar, Warning, "The grammar is ambiguous: two syntax axioms can produce the same expression.";
    ExpressionParse => Grammar, Warning, "This expression could not be parsed with the grammar of the database.";
    // Proof verification
    ProofDvViolation(usize, Token, Token) => Proof, Error, "A disjoint variable restriction is violated.";
    StepFloatWrongType(usize) => Proof, Error, "A floating hypothesis was given an expression of the wrong typecode.";
    StepEssenWrongType(usize) => Proof, Error, "An essential hypothesis was given an expression of the wrong typecode.";
    StepEssenWrong(usize) => Proof, Error, "An essential hypothesis does not match the substituted expression.";
    ProofUnderflow(usize) => Proof, Error, "A step needs more hypotheses than are available on the proof stack.";
    ProofExcessEnd => Proof, Error, "The proof leaves more than one expression on the stack.";
    ProofNoSteps => Proof, Error, "The proof has no steps.";
    ProofWrongTypeEnd => Proof, Error, "The final step proves an expression of the wrong typecode.";
    ProofWrongExprEnd => Proof, Error, "The final step does not prove the assertion.";
    StepMissing(usize, Token) => Proof, Error, "The proof references an unknown label.";
    StepUsedBeforeDefinition(usize, Token) => Proof, Error, "The proof references a statement defined after the theorem.";
    StepUsedAfterScope(usize, Token) => Proof, Error, "The proof references a hypothesis which is not in scope.";
    ProofIncomplete(usize) => Proof, Error, "The proof is incomplete.";
    ProofInvalidSave(usize) => Proof, Error, "Z saves must follow a step.";
    ProofMalformedVarint => Proof, Error, "The compressed proof ends in the middle of a step number.";
    ProofUnterminatedRoster => Proof, Error, "The label list of a compressed proof must be closed with ).";
    DiscouragedTheoremUsed(usize, Token) => Proof, Error, "The proof uses a theorem whose usage is discouraged.\n\n(Add an $allowdiscouraged statement to allow this.)";
    IncompleteTheoremUsed(usize, Token) => Proof, Error, "The proof uses a theorem whose proof is incomplete.\n\n(Add an $allowincomplete statement to allow this.)";
    // Worksheet structure
    TooManyConstStatements => Worksheet, Error, "You can only declare one $c statement per mmp file.\n\n(But you can declare multiple constants in one $c statement.)";
    MultipleMmpLabels => Worksheet, Error, "There can be at most one $theorem, $axiom, $header or $comment statement per mmp file.";
    TooFewHeaderTokens => Worksheet, Error, "$header statements must be followed by the header path and the header title.\n\nExample: $header 3.1.2 Test header";
    InvalidHeaderPathFormat => Worksheet, Error, "Header paths are 1 to 4 numbers separated by dots, e.g. 3.1.2";
    InvalidCommentPathFormat => Worksheet, Error, "Comment paths are an optional header path followed by # and a number, e.g. 3.1#2";
    MissingCommentPath => Worksheet, Error, "$comment statements must be followed by the comment path.";
    TooManyCommentPathTokens => Worksheet, Error, "The comment text must start on the line after the comment path.";
    MissingAxiomLabel => Worksheet, Error, "$axiom statements must be followed by exactly one token: The label of the axiom.";
    TooManyAxiomLabelTokens => Worksheet, Error, "$axiom statements must be followed by exactly one token: The label of the axiom.";
    MissingTheoremLabel => Worksheet, Error, "$theorem statements must be followed by exactly one token: The label of the theorem.";
    TooManyTheoremLabelTokens => Worksheet, Error, "$theorem statements must be followed by exactly one token: The label of the theorem.";
    MultipleAllowDiscouraged => Worksheet, Error, "There should be at most one $allowdiscouraged statement per mmp file.";
    TokensAfterAllowDiscouraged => Worksheet, Error, "$allowdiscouraged statements should not be followed by any tokens.";
    MultipleAllowIncomplete => Worksheet, Error, "There should be at most one $allowincomplete statement per mmp file.";
    TokensAfterAllowIncomplete => Worksheet, Error, "$allowincomplete statements should not be followed by any tokens.";
    MultipleLocateAfter => Worksheet, Error, "There can only be one $locateafter, $locateafterconst or $locateaftervar statement per mmp file.";
    TooFewLocateAfterTokens => Worksheet, Error, "$locateafter statements must be followed by exactly one token: The label the content of the mmp file should be located after.";
    TooManyLocateAfterTokens => Worksheet, Error, "$locateafter statements must be followed by exactly one token: The label the content of the mmp file should be located after.";
    TooFewLocateAfterConstTokens => Worksheet, Error, "$locateafterconst statements must be followed by exactly one token: The constant whose declaration the content of the mmp file should be located after.";
    TooManyLocateAfterConstTokens => Worksheet, Error, "$locateafterconst statements must be followed by exactly one token: The constant whose declaration the content of the mmp file should be located after.";
    TooFewLocateAfterVarTokens => Worksheet, Error, "$locateaftervar statements must be followed by exactly one token: The variable whose declaration the content of the mmp file should be located after.";
    TooManyLocateAfterVarTokens => Worksheet, Error, "$locateaftervar statements must be followed by exactly one token: The variable whose declaration the content of the mmp file should be located after.";
    MultipleProofStatements => Worksheet, Error, "There can be at most one $= statement per mmp file.";
    InvalidDollarToken(Token) => Worksheet, Error, "Unknown $ statement.";
    InvalidMmpStepPrefixFormat => Worksheet, Error, "Proof step prefixes have the form name:hypotheses:reference.";
    InvalidMmpStepNameStartsWithH => Worksheet, Error, "Step names can't start with h, since h marks hypothesis steps.";
    InvalidMmpStepName => Worksheet, Error, "Step names must be non-empty and only contain letters and digits.";
    ConstOutOfPlace => Worksheet, Error, "$c statements are not allowed in this kind of mmp file.";
    VarOutOfPlace => Worksheet, Error, "$v statements are not allowed in this kind of mmp file.";
    FloatHypOutOfPlace => Worksheet, Error, "$f statements are not allowed in this kind of mmp file.";
    DistinctVarOutOfPlace => Worksheet, Error, "$d statements are not allowed in this kind of mmp file.";
    AllowDiscouragedOutOfPlace => Worksheet, Error, "$allowdiscouraged statements are only allowed in theorem mmp files.";
    AllowIncompleteOutOfPlace => Worksheet, Error, "$allowincomplete statements are only allowed in theorem mmp files.";
    LocateAfterOutOfPlace => Worksheet, Error, "$locateafter statements are not allowed in header or comment mmp files.";
    ProofLinesOutOfPlace => Worksheet, Error, "Proof lines are not allowed in this kind of mmp file.";
    ProofStatementOutOfPlace => Worksheet, Error, "$= statements are only allowed in theorem mmp files.";
    InvalidHeaderPath(Token) => Worksheet, Error, "This header path can't be used for a new header: its parent must exist and its index can be at most one more than the number of existing siblings.";
    InvalidCommentPath(Token) => Worksheet, Error, "This comment path can't be used for a new comment: its header must exist and its index can be at most one more than the number of existing comments.";
    DuplicateStepName(Token) => Worksheet, Error, "Another proof step already has this name.";
    HypNameDoesntExist(Token) => Worksheet, Error, "This step references a hypothesis step which is not defined before it.";
    DuplicateHypLabels(Token) => Worksheet, Error, "Another hypothesis step already uses this label.";
    MmpStepRefNotALabel(Token) => Worksheet, Error, "Step references must be labels of theorems or axioms located before the new statement.";
    InvalidLocateAfter(Token) => Worksheet, Error, "The statement to locate after doesn't exist.";
    MissingQedStep => Worksheet, Error, "Theorem mmp files need a final step named qed.";
    // Mutation preconditions
    NoDatabase => Mutation, Error, "No database is loaded.";
    DatabaseHasChanged => Mutation, Error, "The database file changed on disk since it was loaded.";
    CantAddToDatabase => Mutation, Error, "The database has errors, nothing can be added to it.";
    UnfinishedTheorem => Mutation, Error, "The mmp file has errors or an incomplete proof.";
    MmpFileEmpty => Mutation, Error, "The mmp file is empty.";
    AddingToInnerScope => Mutation, Error, "Adding statements inside a scope shared by other statements is not supported.";
    LabelNotFound(Token) => Mutation, Error, "No statement has this label.";
    IoError(String) => Mutation, Error, "The file could not be read or written.";
}

use self::Diagnostic::*;

impl From<io::Error> for Diagnostic {
    fn from(err: io::Error) -> Diagnostic {
        IoError(format!("{err}"))
    }
}

/// Looks up the message for an externally supplied error name.
///
/// Names which do not correspond to any [`ErrorKind`] get a clearly marked
/// sentinel message instead.
#[must_use]
pub fn message_for_name(name: &str) -> String {
    match ErrorKind::from_name(name) {
        Some(kind) => kind.title().to_owned(),
        None => format!("Unexpected error: {name} (this error kind has no message)"),
    }
}

impl ErrorKind {
    /// Finds the kind with the given external name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<ErrorKind> {
        Self::ALL.iter().copied().find(|kind| kind.name() == name)
    }
}

impl Diagnostic {
    /// The stable external name of this diagnostic.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.kind().name()
    }

    /// The general message for this kind of diagnostic.
    #[must_use]
    pub const fn title(&self) -> &'static str {
        self.kind().title()
    }

    /// The severity of this diagnostic.
    #[must_use]
    pub const fn severity(&self) -> Level {
        self.kind().severity()
    }

    /// Returns true unless this diagnostic is only a warning.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self.severity(), Level::Error)
    }

    /// A message specific to this occurrence.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            InvalidSymbol(tok) => format!("{tok} is not a valid math symbol"),
            InvalidLabel(tok) => format!("{tok} is not a valid label"),
            SpuriousLabel(tok) => format!("Label {tok} is not allowed here"),
            TokenOutsideStatement(tok) => format!("{tok} appears outside of any statement"),
            UnknownKeyword(tok) => format!("{tok} is not a Metamath keyword"),
            TwiceDeclaredConst(tok) => format!("{tok} is already declared"),
            TwiceDeclaredVar(tok) => format!("Variable {tok} is already active"),
            TwiceDeclaredLabel(tok) | LabelAlreadyExists(tok) => {
                format!("Label {tok} is already in use")
            }
            FloatHypTypecode(tok) => format!("{tok} is not an active constant"),
            FloatHypVariable(tok) | NonVarInDisj(tok) => format!("{tok} is not an active variable"),
            VarTypeDeclaredTwice(tok) => format!("{tok} already has an active typecode"),
            VarDeclaredMultipleTypes(tok) => format!("{tok} was declared with another typecode"),
            NonSymbolInExpression(tok) => format!("{tok} is not an active math symbol"),
            ExprNotConstantPrefix(tok) => format!("{tok} is not a constant"),
            VariableMissingFloat(tok) => format!("{tok} has no active $f statement"),
            GrammarAmbiguous(first, second) => {
                format!("Syntax axioms {first} and {second} can parse the same expression")
            }
            ProofDvViolation(step, x, y) => {
                format!("Step {step}: variables {x} and {y} must be disjoint")
            }
            StepFloatWrongType(step)
            | StepEssenWrongType(step)
            | StepEssenWrong(step)
            | ProofUnderflow(step)
            | ProofIncomplete(step)
            | ProofInvalidSave(step) => format!("Step {step}: {}", self.title()),
            StepMissing(step, tok)
            | StepUsedBeforeDefinition(step, tok)
            | StepUsedAfterScope(step, tok)
            | DiscouragedTheoremUsed(step, tok)
            | IncompleteTheoremUsed(step, tok) => format!("Step {step} ({tok}): {}", self.title()),
            TypesettingFormat(tok) => format!("Malformed typesetting command {tok}"),
            DuplicateMarkupDef(tok) => format!("{tok} is defined twice"),
            InvalidDollarToken(tok) => format!("{tok} is not a valid mmp statement"),
            InvalidHeaderPath(tok) => format!("Header path {tok} is not valid for a new header"),
            InvalidCommentPath(tok) => format!("Comment path {tok} is not valid for a new comment"),
            DuplicateStepName(tok) => format!("Step name {tok} is used twice"),
            HypNameDoesntExist(tok) => format!("Step {tok} is not defined before this step"),
            DuplicateHypLabels(tok) => format!("Hypothesis label {tok} is used twice"),
            MmpStepRefNotALabel(tok) => format!("{tok} is not a usable theorem or axiom"),
            InvalidLocateAfter(tok) => format!("{tok} doesn't exist"),
            LabelNotFound(tok) => format!("{tok} is not a label of this database"),
            IoError(err) => format!("I/O error: {err}"),
            _ => self.title().to_owned(),
        }
    }
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name(), self.message())
    }
}

impl Error for Diagnostic {}

/// A diagnostic together with its position in a source text.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DetailedError {
    /// What went wrong.
    pub diagnostic: Diagnostic,
    /// Where the offending text starts.
    pub start: Position,
    /// Where the offending text ends (exclusive column).
    pub end: Position,
}

impl DetailedError {
    /// Builds a positioned diagnostic.
    #[must_use]
    pub const fn new(diagnostic: Diagnostic, start: Position, end: Position) -> Self {
        DetailedError {
            diagnostic,
            start,
            end,
        }
    }

    /// Builds a positioned diagnostic covering the byte range `start..end` of a buffer.
    #[must_use]
    pub fn at_offsets(diagnostic: Diagnostic, lc: &LineCache, start: usize, end: usize) -> Self {
        DetailedError {
            diagnostic,
            start: lc.from_offset(start),
            end: lc.from_offset(end),
        }
    }

    /// Renders this error as an annotated snippet of `source`.
    ///
    /// # Arguments
    ///
    /// * `source` - The text the positions refer to
    /// * `origin` - The file name to display
    /// * `f` - A function for continuation passing style (CPS)
    pub fn render<T>(
        &self,
        source: &str,
        origin: &str,
        f: impl for<'a> FnOnce(Message<'a>) -> T,
    ) -> T {
        let arena: Arena<String> = Arena::new();
        let lc = LineCache::new(source);
        let level = self.diagnostic.severity();
        let label = arena.alloc(self.diagnostic.message());
        let title = arena.alloc(format!("{}: {}", self.diagnostic.name(), self.diagnostic.title()));
        let message = level.title(title);
        let range = lc
            .position_to_offset(self.start)
            .zip(lc.position_to_offset(self.end))
            .filter(|&(start, end)| start <= end && end <= source.len());
        match range {
            Some((start, end)) => {
                let source_start = start + 1 - self.start.column as usize;
                let source_end = LineCache::line_end(source, end);
                let snippet = Snippet::source(&source[source_start..source_end])
                    .line_start(self.start.line as usize)
                    .origin(origin)
                    .fold(true)
                    .annotation(level.span(start - source_start..end - source_start).label(label));
                f(message.snippet(snippet))
            }
            None => f(message.footer(Level::Note.title(label))),
        }
    }
}

impl Display for DetailedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}-{}:{}: {}",
            self.start.line, self.start.column, self.end.line, self.end.column, self.diagnostic
        )
    }
}

impl Error for DetailedError {}
