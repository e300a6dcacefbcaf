use crate::database::{Database, InsertAt};
use crate::diag::Diagnostic;
use crate::grammar::{Grammar, StmtParse};
use crate::grammar_tests::{mkdb, OVERLAPPING_DB, PROP_DB};
use crate::mmpck::{check_worksheet, validate_worksheet, WorksheetContext};
use crate::outline::{CommentPath, HeaderPath};
use crate::progress::Reporter;
use crate::statement::{HeadingLevel, Position};
use assert_matches::assert_matches;
use std::sync::Arc;

const NEW_THEOREM: &str = "$theorem a1i2
* Inference introducing an antecedent.
h1::a1i2.1      |- ph
2::ax-1         |- ( ph -> ( ps -> ph ) )
qed:1,2:ax-mp   |- ( ps -> ph )
";

fn passes(db: &mut Database) -> (Arc<Grammar>, Arc<StmtParse>) {
    let grammar = db.grammar_pass(&Reporter::none()).clone();
    let parses = db.stmt_parse_pass(&Reporter::none()).clone();
    (grammar, parses)
}

/// Checks a worksheet against the propositional database, returning the
/// diagnostics of all stages.
fn diagnostics(text: &str) -> Vec<Diagnostic> {
    let mut db = mkdb(PROP_DB);
    validate_worksheet(&mut db, text)
        .into_iter()
        .map(|e| e.diagnostic)
        .collect()
}

#[test]
fn test_theorem_text() {
    let mut db = mkdb(PROP_DB);
    let (grammar, parses) = passes(&mut db);
    let ctx = WorksheetContext {
        db: &db,
        grammar: &grammar,
        parses: &parses,
    };
    let checked = check_worksheet(&ctx, NEW_THEOREM).unwrap();
    assert!(checked.diagnostics.is_empty());
    assert!(checked.is_valid());
    assert_eq!(checked.insert_at, InsertAt::End);
    assert_eq!(checked.step_hypotheses, [vec![], vec![], vec![Some(0), Some(1)]]);
    assert!(checked.trees.iter().all(Option::is_some));
    assert_eq!(checked.confirmed, [true, true, true]);
    assert_eq!(checked.confirmed_recursive, [true, true, true]);
    assert_eq!(checked.found_references, [None, None, None]);
    assert_eq!(
        checked.build_proof(&ctx),
        ["wph", "wps", "wph", "wi", "a1i2.1", "wph", "wps", "ax-1", "ax-mp"]
    );
    assert_eq!(
        checked.database_text(&ctx).unwrap(),
        "${
  a1i2.1 $e |- ph $.
  $( Inference introducing an antecedent. $)
  a1i2 $p |- ( ps -> ph ) $= wph wps wph wi a1i2.1 wph wps ax-1 ax-mp $.
$}"
    );
}

#[test]
fn test_incomplete_proof() {
    let mut db = mkdb(PROP_DB);
    let (grammar, parses) = passes(&mut db);
    let ctx = WorksheetContext {
        db: &db,
        grammar: &grammar,
        parses: &parses,
    };
    // the second hypothesis of ax-mp is not given
    let text = "$theorem t\nh1::t.1 |- ph\nqed:1,?:ax-mp |- ( ps -> ph )\n";
    let checked = check_worksheet(&ctx, text).unwrap();
    assert!(checked.is_valid());
    assert_eq!(checked.build_proof(&ctx), ["wph", "wps", "wph", "wi", "t.1", "?", "ax-mp"]);

    // a step without a reference is matched against the database
    let text = "$theorem t\nqed:: |- ( ph -> ph )\n";
    let checked = check_worksheet(&ctx, text).unwrap();
    assert_eq!(checked.build_proof(&ctx), ["wph", "id"]);

    // ... but only against the assertions before the new theorem
    let text = "$theorem t\n$locateafter ax-2\nqed:: |- ( ph -> ph )\n";
    let checked = check_worksheet(&ctx, text).unwrap();
    assert!(checked.is_valid());
    assert_eq!(checked.found_references, [None]);
    assert_eq!(checked.build_proof(&ctx), ["?"]);

    // an explicit proof is used as written
    let text = "$theorem t\nqed:: |- ( ph -> ph )\n$= wph ?\n";
    let checked = check_worksheet(&ctx, text).unwrap();
    assert_eq!(checked.build_proof(&ctx), ["wph", "?"]);
    assert_eq!(checked.database_text(&ctx).unwrap(), "t $p |- ( ph -> ph ) $= wph ? $.");
}

#[test]
fn test_long_proof_is_wrapped() {
    let mut db = mkdb(PROP_DB);
    let (grammar, parses) = passes(&mut db);
    let ctx = WorksheetContext {
        db: &db,
        grammar: &grammar,
        parses: &parses,
    };
    let text = "$theorem id2
1::ax-1 |- ( ph -> ( ph -> ph ) )
2::ax-1 |- ( ph -> ( ( ph -> ph ) -> ph ) )
3::ax-2 |- ( ( ph -> ( ( ph -> ph ) -> ph ) ) -> ( ( ph -> ( ph -> ph ) ) -> ( ph -> ph ) ) )
4:2,3:ax-mp |- ( ( ph -> ( ph -> ph ) ) -> ( ph -> ph ) )
qed:1,4:ax-mp |- ( ph -> ph )
";
    let checked = check_worksheet(&ctx, text).unwrap();
    assert!(checked.diagnostics.is_empty());
    let written = checked.database_text(&ctx).unwrap();
    assert!(written.lines().count() > 1);
    assert!(written.lines().all(|line| line.len() <= 79));
    assert!(written.starts_with("id2 $p |- ( ph -> ph ) $= wph wph wph wi wi"));
    assert!(written.ends_with(" ax-mp $."));
    // same proof as `id`
    let expected = "wph wph wph wi wi wph wph wi wph wph ax-1 wph wph wph wi wph wi wi wph wph
        wph wi wi wph wph wi wi wph wph wph wi ax-1 wph wph wph wi wph ax-2 ax-mp ax-mp";
    assert_eq!(checked.build_proof(&ctx), expected.split_whitespace().collect::<Vec<_>>());
}

#[test]
fn test_other_kinds_text() {
    let mut db = mkdb(PROP_DB);
    let (grammar, parses) = passes(&mut db);
    let ctx = WorksheetContext {
        db: &db,
        grammar: &grammar,
        parses: &parses,
    };
    let header = check_worksheet(&ctx, "$header 1.3 More theorems\n* About them.\n").unwrap();
    assert!(header.is_valid());
    assert_eq!(header.insert_at, InsertAt::Header(HeaderPath(vec![1, 3])));
    let ruler = HeadingLevel::Section.ruler();
    assert_eq!(
        header.database_text(&ctx).unwrap(),
        format!("$(\n{ruler}\n  More theorems\n{ruler}\n\n  About them.\n$)")
    );

    let comment = check_worksheet(&ctx, "$comment 1.2#2\n* A remark.\n").unwrap();
    assert!(comment.is_valid());
    assert_eq!(
        comment.insert_at,
        InsertAt::Comment(CommentPath {
            header: HeaderPath(vec![1, 2]),
            index: 2,
        })
    );
    assert_eq!(comment.database_text(&ctx).unwrap(), "$( A remark. $)");

    let axiom = check_worksheet(&ctx, "$axiom ax-3\n$locateafter ax-2\nqed:: |- ( ph -> ph )\n").unwrap();
    assert!(axiom.is_valid());
    assert_eq!(axiom.insert_at, InsertAt::AfterLabel("ax-2".to_owned()));
    assert_eq!(axiom.database_text(&ctx).unwrap(), "ax-3 $a |- ( ph -> ph ) $.");

    let constants = check_worksheet(&ctx, "$c /\\ \\/\n").unwrap();
    assert!(constants.is_valid());
    assert_eq!(constants.database_text(&ctx).unwrap(), "$c /\\ \\/ $.");

    let variables = check_worksheet(&ctx, "$v th ta\n$f wth wff th\n").unwrap();
    assert!(variables.is_valid());
    assert_eq!(variables.database_text(&ctx).unwrap(), "$v th ta $.\nwth $f wff th $.");

    let scoped = check_worksheet(
        &ctx,
        "$theorem t\n$v th\n$f wth wff th\n$d ph th\nqed::ax-1 |- ( ph -> ( ph -> ph ) )\n",
    )
    .unwrap();
    assert!(scoped.is_valid());
    assert_eq!(
        scoped.database_text(&ctx).unwrap(),
        "${
  $v th $.
  wth $f wff th $.
  $d ph th $.
  t $p |- ( ph -> ( ph -> ph ) ) $= wph wph ax-1 $.
$}"
    );
}

#[test]
fn test_placement() {
    assert_eq!(diagnostics("$theorem t\n$c foo\nqed:: |- ph"), [Diagnostic::ConstOutOfPlace]);
    assert_eq!(diagnostics("$header 1.3 Title\n1:: |- ph"), [Diagnostic::ProofLinesOutOfPlace]);
    assert_eq!(diagnostics("$comment 1#1\n$v x"), [Diagnostic::VarOutOfPlace]);
    assert_eq!(diagnostics("$c foo\n$d ph ps"), [Diagnostic::DistinctVarOutOfPlace]);
    assert_eq!(diagnostics("$v x\n$allowincomplete"), [Diagnostic::AllowIncompleteOutOfPlace]);
    assert_eq!(
        diagnostics("$axiom ax-3\n$allowdiscouraged\nqed:: |- ph"),
        [Diagnostic::AllowDiscouragedOutOfPlace]
    );
    assert_eq!(
        diagnostics("$axiom ax-3\n1::ax-1 |- ( ph -> ( ph -> ph ) )\nqed:: |- ph"),
        [Diagnostic::ProofLinesOutOfPlace]
    );
    assert_eq!(diagnostics("$axiom ax-3\n$= wph\nqed:: |- ph"), [Diagnostic::ProofStatementOutOfPlace]);
}

#[test]
fn test_position() {
    assert_eq!(
        diagnostics("$header 1.4 Title"),
        [Diagnostic::InvalidHeaderPath("1.4".into())]
    );
    assert_eq!(
        diagnostics("$comment 1.2#3\n* Text."),
        [Diagnostic::InvalidCommentPath("1.2#3".into())]
    );
    assert_eq!(
        diagnostics("$theorem t\n$locateafter nothing\nqed:: |- ph"),
        [Diagnostic::InvalidLocateAfter("nothing".into())]
    );
    assert_eq!(
        diagnostics("$theorem t\n$locateafter min\nqed:: |- ph"),
        [Diagnostic::AddingToInnerScope]
    );
    assert_eq!(
        diagnostics("$c foo\n$locateafterconst ph"),
        [Diagnostic::InvalidLocateAfter("ph".into())]
    );
    assert!(diagnostics("$v x\n$locateaftervar ph").is_empty());
    // only assertions before the insertion point can be used
    assert_eq!(
        diagnostics("$theorem t\n$locateafter ax-2\nqed::id |- ( ph -> ph )"),
        [Diagnostic::MmpStepRefNotALabel("id".into())]
    );
}

#[test]
fn test_declarations() {
    assert_eq!(diagnostics("$theorem ax-1\nqed:: |- ph"), [Diagnostic::LabelAlreadyExists("ax-1".into())]);
    assert_eq!(diagnostics("$v ph"), [Diagnostic::TwiceDeclaredVar("ph".into())]);
    assert_eq!(diagnostics("$v ->"), [Diagnostic::TwiceDeclaredConst("->".into())]);
    assert_eq!(diagnostics("$v ax-1"), [Diagnostic::TwiceDeclaredLabel("ax-1".into())]);
    assert_eq!(diagnostics("$v x x"), [Diagnostic::TwiceDeclaredVar("x".into())]);
    assert_eq!(diagnostics("$c ph"), [Diagnostic::TwiceDeclaredConst("ph".into())]);
    assert_eq!(diagnostics("$c a$b"), [Diagnostic::InvalidSymbol("a$b".into())]);
    assert_eq!(
        diagnostics("$v x\n$f wx wff x\n$f wx2 wff x"),
        [Diagnostic::VarTypeDeclaredTwice("x".into())]
    );
    assert_eq!(diagnostics("$v x\n$f wph wff x"), [Diagnostic::LabelAlreadyExists("wph".into())]);
    assert_eq!(diagnostics("$v x\n$f wx foo x"), [Diagnostic::FloatHypTypecode("foo".into())]);
    assert_eq!(diagnostics("$v x\n$f wx wff y"), [Diagnostic::FloatHypVariable("y".into())]);
    assert_eq!(diagnostics("$v x\n$f wph2 wff ph"), [Diagnostic::VarTypeDeclaredTwice("ph".into())]);
    assert_eq!(diagnostics("$v x\n$f tph |- ph"), [Diagnostic::VarDeclaredMultipleTypes("ph".into())]);
    assert_eq!(
        diagnostics("$theorem t\n$d ph (\nqed:: |- ph"),
        [Diagnostic::NonVarInDisj("(".into())]
    );
}

#[test]
fn test_steps() {
    assert_eq!(
        diagnostics("$theorem t\n1:2,3:ax-1 |- ph\nqed:1:ax-mp |- ps"),
        [
            Diagnostic::HypNameDoesntExist("2".into()),
            Diagnostic::HypNameDoesntExist("3".into()),
        ]
    );
    assert_eq!(
        diagnostics("$theorem t\n1::nothing |- ph\nqed:1:ax-mp |- ps"),
        [Diagnostic::MmpStepRefNotALabel("nothing".into())]
    );
    assert_eq!(
        diagnostics("$theorem t\n1::ax-1 |- ( ph -> ( ph -> ph ) )\n1::ax-1 |- ( ph -> ( ph -> ph ) )\nqed:: |- ph"),
        [Diagnostic::DuplicateStepName("1".into())]
    );
    assert_eq!(
        diagnostics("$theorem t\nh1::t.1 |- ph\nh2::t.1 |- ps\nqed:: |- ph"),
        [Diagnostic::DuplicateHypLabels("t.1".into())]
    );
    assert_eq!(
        diagnostics("$theorem t\nh1::a1i.1 |- ph\nqed:: |- ph"),
        [Diagnostic::LabelAlreadyExists("a1i.1".into())]
    );
    assert_eq!(diagnostics("$theorem t\n1::ax-1 |- ph"), [Diagnostic::MissingQedStep]);
    assert_eq!(
        diagnostics("$theorem t\nqed:: |- ( ph -> foo )"),
        [Diagnostic::NonSymbolInExpression("foo".into())]
    );
    assert_eq!(diagnostics("$theorem t\nqed:: |- ( ph -> )"), [Diagnostic::ExpressionParse]);
}

#[test]
fn test_undefined_hypothesis_step() {
    let mut db = mkdb(PROP_DB);
    let errors = validate_worksheet(&mut db, "$theorem t\nh1:2,3:ax-1 |- ph\nqed:1:ax-mp |- ps\n");
    let missing = errors
        .iter()
        .filter(|e| e.diagnostic == Diagnostic::HypNameDoesntExist("2".into()))
        .collect::<Vec<_>>();
    assert_eq!(missing.len(), 1);
    // on the line of step h1
    assert_eq!(missing[0].start, Position::new(2, 4));
    assert!(errors
        .iter()
        .any(|e| e.diagnostic == Diagnostic::HypNameDoesntExist("3".into())));
}

#[test]
fn test_diagnostics_are_sorted() {
    let mut db = mkdb(PROP_DB);
    let errors = validate_worksheet(&mut db, "$theorem ax-1\n$c foo\nqed:: |- ph\n");
    let diags = errors.iter().map(|e| e.diagnostic.clone()).collect::<Vec<_>>();
    assert_eq!(
        diags,
        [Diagnostic::LabelAlreadyExists("ax-1".into()), Diagnostic::ConstOutOfPlace]
    );
    assert_eq!(errors[0].start, Position::new(1, 10));
    assert_eq!(errors[1].start, Position::new(2, 1));

    // steps are only checked once the declarations are valid
    let errors = validate_worksheet(&mut db, "$theorem ax-1\nqed:1:nothing |- foo\n");
    assert_eq!(errors.len(), 1);

    // parse errors are returned alone
    let mut db = mkdb(PROP_DB);
    let (grammar, parses) = passes(&mut db);
    let ctx = WorksheetContext {
        db: &db,
        grammar: &grammar,
        parses: &parses,
    };
    assert_matches!(check_worksheet(&ctx, "$theorem\n"), Err(errors) if errors.len() == 1);
}

#[test]
fn test_reference_search() {
    let mut db = mkdb(PROP_DB);
    let (grammar, parses) = passes(&mut db);
    let ctx = WorksheetContext {
        db: &db,
        grammar: &grammar,
        parses: &parses,
    };
    let text = "$theorem t\nh1::t.1 |- ph\nqed:1: |- ( ps -> ph )\n";
    let checked = check_worksheet(&ctx, text).unwrap();
    assert!(checked.diagnostics.is_empty());
    let a1i = db.names().lookup("a1i").unwrap();
    assert_eq!(checked.found_references, [None, Some(a1i)]);
    assert_eq!(checked.confirmed, [true, true]);
    assert_eq!(checked.build_proof(&ctx), ["wph", "wps", "t.1", "a1i"]);

    // no search past a `?` hypothesis, nor for an axiom
    let checked = check_worksheet(&ctx, "$theorem t\nqed:?: |- ( ps -> ph )\n").unwrap();
    assert_eq!(checked.found_references, [None]);
    let checked = check_worksheet(&ctx, "$axiom ax-3\nqed:: |- ( ph -> ph )\n").unwrap();
    assert_eq!(checked.found_references, [None]);
    assert_eq!(checked.confirmed, [false]);
}

#[test]
fn test_step_confirmation() {
    let mut db = mkdb(PROP_DB);
    let (grammar, parses) = passes(&mut db);
    let ctx = WorksheetContext {
        db: &db,
        grammar: &grammar,
        parses: &parses,
    };
    // ax-2 does not prove step 2, which spoils the confirmation of qed
    let text = "$theorem t
h1::t.1 |- ph
2::ax-2 |- ( ph -> ( ps -> ph ) )
qed:1,2:ax-mp |- ( ps -> ph )
";
    let checked = check_worksheet(&ctx, text).unwrap();
    assert!(checked.is_valid());
    assert_eq!(checked.confirmed, [true, false, true]);
    assert_eq!(checked.confirmed_recursive, [true, false, false]);

    // conflicting substitutions, and a `?` hypothesis
    let text = "$theorem t
h1::t.1 |- ph
2::ax-1 |- ( ph -> ( ps -> ph ) )
3:1,2:ax-mp |- ( ps -> ps )
qed:1,?:ax-mp |- ( ps -> ph )
";
    let checked = check_worksheet(&ctx, text).unwrap();
    assert_eq!(checked.confirmed, [true, true, false, false]);
    assert_eq!(checked.confirmed_recursive, [true, true, false, false]);
}

#[test]
fn test_ambiguous_step_is_warned() {
    let mut db = mkdb(OVERLAPPING_DB);
    let errors = validate_worksheet(&mut db, "$theorem t\nqed:: |- - ph - ps\n");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].diagnostic, Diagnostic::GrammarAmbiguous("wn".into(), "wm".into()));
    assert!(!errors[0].diagnostic.is_error());
    // over the expression
    assert_eq!(errors[0].start, Position::new(2, 7));

    assert!(validate_worksheet(&mut db, "$theorem t\nqed:: |- - ph\n").is_empty());
}
