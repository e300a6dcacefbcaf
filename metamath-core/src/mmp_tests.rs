use crate::diag::Diagnostic;
use crate::mmp::{parse_worksheet, LocateAfter, MmpLabel, MmpStatementKind, WorksheetKind};
use crate::outline::HeaderPath;
use crate::statement::Position;
use assert_matches::assert_matches;

const A1I: &str = "$theorem a1i2
* Inference introducing
  an antecedent.
h1::a1i2.1      |- ph
2::ax-1         |- ( ph -> ( ps -> ph ) )
qed:1,2:ax-mp   |- ( ps
                  -> ph )
";

fn errors(text: &str) -> Vec<Diagnostic> {
    parse_worksheet(text)
        .map(|_| Vec::new())
        .unwrap_or_else(|errors| errors.into_iter().map(|e| e.diagnostic).collect())
}

#[test]
fn test_theorem_worksheet() {
    let ws = parse_worksheet(A1I).unwrap();
    assert_eq!(ws.kind(), WorksheetKind::Theorem);
    assert_matches!(ws.label, Some(MmpLabel::Theorem(token)) if token.text == "a1i2");
    assert_eq!(ws.assertion_label().unwrap().start, 9);
    assert_eq!(ws.description.as_deref(), Some("Inference introducing\nan antecedent."));
    assert_eq!(ws.statements.len(), 5);
    assert_eq!(ws.statements[1].kind, MmpStatementKind::Comment);
    assert_eq!(ws.statements[4].kind, MmpStatementKind::ProofLine);

    assert_eq!(ws.steps.len(), 3);
    let hyp = &ws.steps[0];
    assert!(hyp.is_hypothesis);
    assert_eq!(hyp.name.text, "1");
    assert!(hyp.hypotheses.is_empty());
    assert_eq!(hyp.reference.text, "a1i2.1");
    assert_eq!(hyp.statement, 2);

    let qed = &ws.steps[2];
    assert!(qed.is_qed());
    assert_eq!(ws.qed_step(), Some(2));
    let cited = qed.hypotheses.iter().map(|t| t.text).collect::<Vec<_>>();
    assert_eq!(cited, ["1", "2"]);
    assert_eq!(qed.reference.text, "ax-mp");
    // the expression goes on over the continuation line
    let expr = qed.expression.iter().map(|t| t.text).collect::<Vec<_>>();
    assert_eq!(expr, ["|-", "(", "ps", "->", "ph", ")"]);
    assert_eq!(&A1I[qed.reference.start..qed.reference.end()], "ax-mp");
}

#[test]
fn test_step_prefixes() {
    let ws = parse_worksheet("$theorem t\n3 |- ph\n4:ax-1 |- ph\n!5:?,3: |- ph\nh6: |- ph\n").unwrap();
    let steps = &ws.steps;
    assert_eq!(steps[0].name.text, "3");
    assert!(steps[0].reference.text.is_empty());
    assert_eq!(steps[1].reference.text, "ax-1");
    assert!(steps[1].hypotheses.is_empty());
    assert!(steps[2].advanced_unification);
    assert_eq!(steps[2].name.text, "5");
    assert_eq!(steps[2].hypotheses.iter().map(|t| t.text).collect::<Vec<_>>(), ["?", "3"]);
    assert!(steps[2].reference.text.is_empty());
    assert!(steps[3].is_hypothesis);
    assert!(ws.qed_step().is_none());

    assert_eq!(errors("$theorem t\n1:2:3:4 |- ph"), [Diagnostic::InvalidMmpStepPrefixFormat]);
    assert_eq!(errors("$theorem t\n!h1:: |- ph"), [Diagnostic::InvalidMmpStepNameStartsWithH]);
    assert_eq!(errors("$theorem t\n1.5:: |- ph"), [Diagnostic::InvalidMmpStepName]);
    assert_eq!(errors("$theorem t\nh:: |- ph"), [Diagnostic::InvalidMmpStepName]);
}

#[test]
fn test_directives() {
    let ws = parse_worksheet(
        "$theorem t\n$allowdiscouraged\n$allowincomplete\n$locateafter ax-2\n$d ph ps\n  ch\n$v x\n$f wx wff x\n$= wph ?\n",
    )
    .unwrap();
    assert!(ws.allow_discouraged);
    assert!(ws.allow_incomplete);
    assert_matches!(ws.locate_after, Some(LocateAfter::Label(token)) if token.text == "ax-2");
    assert_eq!(ws.distinct_vars.len(), 1);
    assert_eq!(ws.distinct_vars[0].len(), 3);
    assert_eq!(ws.variables[0].text, "x");
    assert_eq!(ws.floating_hypotheses[0].label.text, "wx");
    assert_eq!(ws.floating_hypotheses[0].typecode.text, "wff");
    let proof = ws.proof.as_ref().unwrap().iter().map(|t| t.text).collect::<Vec<_>>();
    assert_eq!(proof, ["wph", "?"]);

    let ws = parse_worksheet("$locateafterconst (\n$c foo bar\n").unwrap();
    assert_eq!(ws.kind(), WorksheetKind::Constants);
    assert_matches!(ws.locate_after, Some(LocateAfter::Constant(_)));
    assert_eq!(ws.constants.len(), 2);

    assert_eq!(parse_worksheet("$v x\n$f wx wff x").unwrap().kind(), WorksheetKind::Variables);
    assert_eq!(parse_worksheet("").unwrap().kind(), WorksheetKind::Empty);
    assert_eq!(parse_worksheet("\n  \n").unwrap().statements.len(), 0);
}

#[test]
fn test_labels() {
    let ws = parse_worksheet("$header 1.2.3 Some   title\n  continued\n").unwrap();
    assert_eq!(ws.kind(), WorksheetKind::Header);
    assert_matches!(
        ws.label,
        Some(MmpLabel::Header { ref path, ref title, .. })
            if *path == HeaderPath(vec![1, 2, 3]) && title == "Some title continued"
    );
    let ws = parse_worksheet("$comment 2#1\n* Text.").unwrap();
    assert_eq!(ws.kind(), WorksheetKind::Comment);
    assert_eq!(ws.description.as_deref(), Some("Text."));
    assert_eq!(parse_worksheet("$axiom ax-3").unwrap().kind(), WorksheetKind::Axiom);

    assert_eq!(errors("$theorem"), [Diagnostic::MissingTheoremLabel]);
    assert_eq!(errors("$axiom"), [Diagnostic::MissingAxiomLabel]);
    assert_eq!(errors("$theorem a b"), [Diagnostic::TooManyTheoremLabelTokens]);
    assert_eq!(errors("$axiom a b"), [Diagnostic::TooManyAxiomLabelTokens]);
    assert_eq!(errors("$theorem a:b"), [Diagnostic::InvalidLabel("a:b".into())]);
    assert_eq!(errors("$header 1.2"), [Diagnostic::TooFewHeaderTokens]);
    assert_eq!(errors("$header"), [Diagnostic::TooFewHeaderTokens]);
    assert_eq!(errors("$header 1..2 Title"), [Diagnostic::InvalidHeaderPathFormat]);
    assert_eq!(errors("$comment"), [Diagnostic::MissingCommentPath]);
    assert_eq!(errors("$comment 1#2 x"), [Diagnostic::TooManyCommentPathTokens]);
    assert_eq!(errors("$comment 1.2"), [Diagnostic::InvalidCommentPathFormat]);
}

#[test]
fn test_statement_errors() {
    assert_eq!(errors("$c"), [Diagnostic::EmptyConstStatement]);
    assert_eq!(errors("$c a\n$c b"), [Diagnostic::TooManyConstStatements]);
    assert_eq!(errors("$v"), [Diagnostic::EmptyVarStatement]);
    assert_eq!(errors("$f wx wff"), [Diagnostic::FloatHypStatementFormat]);
    assert_eq!(errors("$f wx wff x y"), [Diagnostic::FloatHypStatementFormat]);
    assert_eq!(errors("$d x"), [Diagnostic::ZeroOrOneSymbolDisj]);
    assert_eq!(errors("$allowincomplete\n$allowincomplete"), [Diagnostic::MultipleAllowIncomplete]);
    assert_eq!(errors("$allowdiscouraged now"), [Diagnostic::TokensAfterAllowDiscouraged]);
    assert_eq!(errors("$locateafter a\n$locateaftervar b"), [Diagnostic::MultipleLocateAfter]);
    assert_eq!(errors("$locateafterconst"), [Diagnostic::TooFewLocateAfterConstTokens]);
    assert_eq!(errors("$locateaftervar a b"), [Diagnostic::TooManyLocateAfterVarTokens]);
    assert_eq!(errors("$=\n$= x"), [Diagnostic::MultipleProofStatements]);
    assert_eq!(errors("$e |- ph"), [Diagnostic::InvalidDollarToken("$e".into())]);
}

#[test]
fn test_error_positions() {
    let err = parse_worksheet("$theorem a\n* text\n$axiom b\n").unwrap_err();
    assert_eq!(err.len(), 1);
    assert_eq!(err[0].diagnostic, Diagnostic::MultipleMmpLabels);
    assert_eq!(err[0].start, Position::new(3, 1));
    assert_eq!(err[0].end, Position::new(3, 9));
    assert_eq!(errors("$theorem a\n$theorem b"), [Diagnostic::MultipleMmpLabels]);

    let err = parse_worksheet("\n  $theorem a\n").unwrap_err();
    assert_eq!(err[0].diagnostic, Diagnostic::WhitespaceBeforeFirstToken);
    assert_eq!(err[0].start, Position::new(2, 1));
    assert_eq!(err[0].end, Position::new(2, 3));

    // all errors are reported, in order
    let err = parse_worksheet("$theorem\n$c\n$foo").unwrap_err();
    let diags = err.iter().map(|e| e.diagnostic.clone()).collect::<Vec<_>>();
    assert_eq!(
        diags,
        [
            Diagnostic::MissingTheoremLabel,
            Diagnostic::EmptyConstStatement,
            Diagnostic::InvalidDollarToken("$foo".into()),
        ]
    );
    assert_eq!(err[2].start, Position::new(3, 1));
}

#[test]
fn test_descriptions_are_joined() {
    let ws = parse_worksheet("* First.\n$axiom ax-3\n*Second line\n   continued.\n").unwrap();
    assert_eq!(ws.description.as_deref(), Some("First.\n\nSecond line\ncontinued."));
    assert!(parse_worksheet("$axiom ax-3").unwrap().description.is_none());
}
