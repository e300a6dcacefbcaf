use crate::database::{Database, DbOptions, InsertAt};
use crate::diag::Diagnostic;
use crate::formula::ParseTree;
use crate::grammar::{Grammar, StmtParse};
use crate::progress::Reporter;
use assert_matches::assert_matches;

/// A small propositional calculus, shared by the tests of the other modules.
pub const PROP_DB: &str = r##"$(
###############################################################################
  Propositional calculus
###############################################################################

  The basic logic.
$)

$c ( ) -> -. wff |- $.
$v ph ps ch $.
wph $f wff ph $.
wps $f wff ps $.
wch $f wff ch $.

$( Negation. $)
wn $a wff -. ph $.
wi $a wff ( ph -> ps ) $.

$(
#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#
  Axioms
#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#
$)

$( Axiom _Simp_. $)
ax-1 $a |- ( ph -> ( ps -> ph ) ) $.
$( Axiom _Frege_. $)
ax-2 $a |- ( ( ph -> ( ps -> ch ) ) -> ( ( ph -> ps ) -> ( ph -> ch ) ) ) $.
${
  min $e |- ph $.
  maj $e |- ( ph -> ps ) $.
  $( Rule of Modus Ponens. $)
  ax-mp $a |- ps $.
$}

$c <-> $.
wb $a wff ( ph <-> ps ) $.
$( Half of a definition of the biconditional. $)
df-bi $a |- ( ( ph <-> ps ) -> ( ph -> ps ) ) $.

$(
#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#
  Theorems
#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#*#
$)

$( A standalone note. $)

${
  a1i.1 $e |- ph $.
  $( Inference introducing an antecedent. $)
  a1i $p |- ( ps -> ph ) $= wph wps wph wi a1i.1 wph wps ax-1 ax-mp $.
$}

${
  a1ic.1 $e |- ph $.
  $( The same inference, with a compressed proof. $)
  a1ic $p |- ( ps -> ph ) $= ( wi ax-1 ax-mp ) ABADCABEF $.
$}

$( Principle of identity. $)
id $p |- ( ph -> ph ) $=
  wph wph wph wi wi wph wph wi wph wph ax-1 wph wph wph wi wph wi wi wph wph
  wph wi wi wph wph wi wi wph wph wph wi ax-1 wph wph wph wi wph ax-2 ax-mp
  ax-mp $.

$( $t
  htmldef "ph" as "<I>ph</I>";
  althtmldef "ph" as "&#x1D711;";
  latexdef "ph" as "\varphi";
  htmldef "->" as " &rarr; ";
$)
"##;

pub fn mkdb(text: &str) -> Database {
    Database::parse(text.to_owned(), DbOptions::default()).unwrap()
}

fn tree_of(db: &Database, grammar: &Grammar, symbols: &str) -> ParseTree {
    let symbols = symbols.split_whitespace().collect::<Vec<_>>();
    grammar.parse_symbols(db.names(), &symbols).unwrap()
}

fn labels(db: &Database, atoms: &[crate::nameck::Atom]) -> Vec<String> {
    atoms.iter().map(|&a| db.atom_name(a).to_owned()).collect()
}

#[test]
fn test_db_stmt_parse() {
    let mut db = mkdb(PROP_DB);
    let grammar = db.grammar_pass(&Reporter::none()).clone();
    let parses = db.stmt_parse_pass(&Reporter::none()).clone();
    assert!(grammar.diagnostics(&db).is_empty());
    assert!(parses.failures().is_empty());
    assert!(parses.diagnostics(&db).is_empty());
    // three floats and three syntax axioms
    assert_eq!(grammar.productions().len(), 6);
    let ax1 = db.names().lookup("ax-1").unwrap();
    let wi = db.names().lookup("wi").unwrap();
    assert_eq!(parses.get(ax1).unwrap().label(), wi);
    assert!(db.grammar_result().is_some());
    // rebuilding gives the same grammar
    assert_eq!(*grammar, Grammar::build(&db, &Reporter::none()));
}

#[test]
fn test_parse_and_flatten() {
    let mut db = mkdb(PROP_DB);
    let grammar = db.grammar_pass(&Reporter::none()).clone();
    let tree = tree_of(&db, &grammar, "|- ( ph -> ( ps -> ph ) )");
    assert_eq!(tree.typecode(), db.names().lookup("wff").unwrap());
    assert_eq!(
        tree.display(db.names()).to_string(),
        "wi(wph, wi(wps, wph))"
    );
    let flat = grammar.flatten(&tree);
    assert_eq!(db.names().expr_string(&flat), "( ph -> ( ps -> ph ) )");

    let mut proof = Vec::new();
    grammar.syntax_proof(&tree, &mut proof);
    assert_eq!(labels(&db, &proof), ["wph", "wps", "wph", "wi", "wi"]);
}

#[test]
fn test_parse_failure() {
    let mut db = mkdb(PROP_DB);
    let grammar = db.grammar_pass(&Reporter::none()).clone();
    let symbols = ["wff", "(", "ph", "->", "ps"];
    assert_matches!(
        grammar.parse_symbols(db.names(), &symbols),
        Err(Diagnostic::ExpressionParse)
    );
    assert_matches!(
        grammar.parse_symbols(db.names(), &["wff", "unknown"]),
        Err(Diagnostic::ExpressionParse)
    );
}

#[test]
fn test_unify() {
    let mut db = mkdb(PROP_DB);
    let grammar = db.grammar_pass(&Reporter::none()).clone();
    let pattern = tree_of(&db, &grammar, "wff ( ph -> ps )");
    let tree = tree_of(&db, &grammar, "wff ( -. ph -> ( ps -> ph ) )");
    let mut subst = crate::formula::Substitutions::new();
    tree.unify(&pattern, &mut subst).unwrap();
    let ph = db.names().lookup("ph").unwrap();
    let ps = db.names().lookup("ps").unwrap();
    assert_eq!(subst.len(), 2);
    assert_eq!(
        db.names().expr_string(&grammar.flatten(subst.get(ph).unwrap())),
        "-. ph"
    );
    assert_eq!(
        db.names().expr_string(&grammar.flatten(subst.get(ps).unwrap())),
        "( ps -> ph )"
    );
    assert_eq!(pattern.substitute(&subst), tree);

    let same = tree_of(&db, &grammar, "wff ( ph -> ph )");
    assert!(!tree.matches(&same));
    assert!(!tree.contains(&same));
    let negation = tree_of(&db, &grammar, "wff -. ps");
    assert!(tree.contains(&negation));
}

const AMBIGUOUS_DB: &str = "
$c ( ) -> wff |- $.
$v ph ps $.
wph $f wff ph $.
wps $f wff ps $.
wi $a wff ( ph -> ps ) $.
wim $a wff ( ph -> ps ) $.
";

#[test]
fn test_ambiguity_is_flagged() {
    let mut db = mkdb(AMBIGUOUS_DB);
    let grammar = db.grammar_pass(&Reporter::none()).clone();
    let diags = grammar.diagnostics(&db);
    assert_eq!(diags.len(), 1);
    assert_matches!(&diags[0].1, Diagnostic::GrammarAmbiguous(a, b) if &**a == "wi" && &**b == "wim");
    assert!(!diags[0].1.is_error());
    // parsing still picks the earliest syntax axiom
    let tree = tree_of(&db, &grammar, "wff ( ph -> ps )");
    assert_eq!(db.atom_name(tree.label()), "wi");
}

#[test]
fn test_grammar_update_matches_rebuild() {
    let mut db = mkdb(PROP_DB);
    db.stmt_parse_pass(&Reporter::none());
    // `/\` is not declared yet
    assert_matches!(
        db.insert_statement(&InsertAt::End, "wa $a wff ( ph /\\ ps ) $."),
        Err(Diagnostic::NonSymbolInExpression(_))
    );

    let mut db = db
        .insert_statement(&InsertAt::End, "$c /\\ $.\nwa $a wff ( ph /\\ ps ) $.")
        .unwrap();
    assert!(db.grammar_result().is_none());
    assert!(db.stmt_parse_result().is_none());
    let updated = db.grammar_pass(&Reporter::none()).clone();
    let rebuilt = Grammar::build(&db, &Reporter::none());
    assert_eq!(*updated, rebuilt);
    let tree = tree_of(&db, &updated, "wff ( ph /\\ ( ps -> ph ) )");
    assert_eq!(db.atom_name(tree.label()), "wa");
    let parses = db.stmt_parse_pass(&Reporter::none()).clone();
    assert!(parses.failures().is_empty());
}

/// Two syntax axioms which overlap: `- ph - ps` reads as `- ( ph - ps )` or
/// `( - ph ) - ps`.
pub const OVERLAPPING_DB: &str = "
$c - wff |- $.
$v ph ps $.
wph $f wff ph $.
wps $f wff ps $.
wn $a wff - ph $.
wm $a wff ph - ps $.
";

#[test]
fn test_overlapping_axioms_are_flagged() {
    let mut db = mkdb(OVERLAPPING_DB);
    let grammar = db.grammar_pass(&Reporter::none()).clone();
    let diags = grammar.diagnostics(&db);
    let pairs = diags
        .iter()
        .map(|(index, diag)| match diag {
            Diagnostic::GrammarAmbiguous(a, b) => (db.statement_body(*index).split_whitespace().next().unwrap(), &**a, &**b),
            other => panic!("unexpected {other:?}"),
        })
        .collect::<Vec<_>>();
    // `- ph - ps` and `ph - ps - ps` both have two derivations
    assert_eq!(pairs, [("wn", "wn", "wm"), ("wm", "wm", "wm")]);
    assert!(diags.iter().all(|(_, diag)| !diag.is_error()));

    let wff = db.names().lookup("wff").unwrap();
    let symbols = ["-", "ph", "-", "ps"].map(|s| db.names().lookup(s).unwrap());
    let parsed = grammar.parse_checked(wff, &symbols).unwrap();
    assert_eq!(parsed.tree.display(db.names()).to_string(), "wn(wm(wph, wps))");
    let (a, b) = parsed.ambiguity.unwrap();
    assert_eq!((db.atom_name(a), db.atom_name(b)), ("wn", "wm"));
    assert_eq!(grammar.parse_expression(wff, &symbols).unwrap(), parsed.tree);

    // unambiguous expressions have a single derivation
    let negation = ["-", "ph"].map(|s| db.names().lookup(s).unwrap());
    assert_eq!(grammar.parse_checked(wff, &negation).unwrap().ambiguity, None);
}

#[test]
fn test_prop_db_has_no_overlaps() {
    let mut db = mkdb(PROP_DB);
    let grammar = db.grammar_pass(&Reporter::none()).clone();
    let parses = db.stmt_parse_pass(&Reporter::none()).clone();
    assert!(grammar.diagnostics(&db).is_empty());
    assert!(parses.diagnostics(&db).is_empty());
}

#[test]
fn test_mid_database_insertion_matches_rebuild() {
    let mut db = mkdb(PROP_DB);
    db.stmt_parse_pass(&Reporter::none());
    let mut db = db
        .insert_statement(&InsertAt::AfterLabel("wi".to_owned()), "$c /\\ $.\nwa $a wff ( ph /\\ ps ) $.")
        .unwrap();
    let updated = db.grammar_pass(&Reporter::none()).clone();
    let rebuilt = Grammar::build(&db, &Reporter::none());
    assert_eq!(*updated, rebuilt);
    let order = updated
        .productions()
        .iter()
        .map(|p| db.atom_name(p.label))
        .collect::<Vec<_>>();
    assert_eq!(order, ["wph", "wps", "wch", "wn", "wi", "wa", "wb"]);

    let parses = db.stmt_parse_pass(&Reporter::none()).clone();
    let fresh = StmtParse::build(&db, &rebuilt, None, &Reporter::none());
    for label in ["ax-1", "ax-2", "df-bi", "a1i", "id", "wa"] {
        let atom = db.names().lookup(label).unwrap();
        assert_eq!(parses.get(atom), fresh.get(atom), "{label}");
        assert!(parses.get(atom).is_some());
    }
}

const SCOPED_FLOATS_DB: &str = "
$c ( ) -> wff |- $.
$v ph ps $.
${
  wph $f wff ph $.
  wps $f wff ps $.
  wi $a wff ( ph -> ps ) $.
$}
${
  wph2 $f wff ph $.
  wps2 $f wff ps $.
  ax $a |- ( ph -> ps ) $.
$}
";

#[test]
fn test_trees_use_floats_in_scope() {
    let mut db = mkdb(SCOPED_FLOATS_DB);
    let grammar = db.grammar_pass(&Reporter::none()).clone();
    let parses = db.stmt_parse_pass(&Reporter::none()).clone();
    let wi = parses.get(db.names().lookup("wi").unwrap()).unwrap();
    assert_eq!(wi.display(db.names()).to_string(), "wi(wph, wps)");
    let ax = parses.get(db.names().lookup("ax").unwrap()).unwrap();
    assert_eq!(ax.display(db.names()).to_string(), "wi(wph2, wps2)");
    let mut proof = Vec::new();
    grammar.syntax_proof(ax, &mut proof);
    assert_eq!(labels(&db, &proof), ["wph2", "wps2", "wi"]);
}
