use crate::database::DbOptions;
use crate::diag::{message_for_name, Diagnostic};
use crate::grammar_tests::PROP_DB;
use crate::outline::{CommentPath, HeaderPath};
use crate::search::{AssertionKind, SearchParameters};
use crate::service::{FloatingHypothesisView, HeaderContent, InsertedAt, VariableView, Workbench};
use crate::verify::{verify_theorem, VerifyOptions};
use assert_matches::assert_matches;
use std::fs;
use std::path::PathBuf;

const A1I2: &str = "$theorem a1i2
* Inference introducing an antecedent.
h1::a1i2.1      |- ph
2::ax-1         |- ( ph -> ( ps -> ph ) )
qed:1,2:ax-mp   |- ( ps -> ph )
";

fn workbench() -> Workbench {
    let mut workbench = Workbench::new(DbOptions::default());
    workbench.load_text(PROP_DB).unwrap();
    workbench
}

fn path(s: &str) -> HeaderPath {
    s.parse().unwrap()
}

fn assertion(label: &str, kind: AssertionKind) -> HeaderContent {
    HeaderContent::Assertion {
        label: label.to_owned(),
        kind,
    }
}

fn temp_file(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("metamath-workbench-{}-{name}.mm", std::process::id()))
}

#[test]
fn test_no_database() {
    let mut workbench = Workbench::new(DbOptions::default());
    assert_matches!(workbench.database(), Err(Diagnostic::NoDatabase));
    assert_matches!(workbench.add_to_database(A1I2), Err(Diagnostic::NoDatabase));
    assert_matches!(workbench.quick_search("ax", true), Err(Diagnostic::NoDatabase));
    assert_matches!(workbench.get_header(&HeaderPath(vec![])), Err(Diagnostic::NoDatabase));
    assert_eq!(workbench.progress(), None);
}

#[test]
fn test_load() {
    let mut workbench = Workbench::new(DbOptions::default());
    let summary = workbench.load_text(PROP_DB).unwrap();
    assert_eq!(summary.theorem_count, 3);
    assert_eq!(workbench.database().unwrap().id(), summary.database_id);
    assert_eq!(workbench.progress(), Some(100));

    // a failed load keeps the open database
    let err = workbench.load_text("$c wff $. $c wff $.").unwrap_err();
    assert_matches!(err.diagnostic, Diagnostic::TwiceDeclaredConst(_));
    assert_eq!(workbench.database().unwrap().id(), summary.database_id);
    let err = workbench.load_database(temp_file("missing")).unwrap_err();
    assert_matches!(err.diagnostic, Diagnostic::IoError(_));

    let second = workbench.load_text(PROP_DB).unwrap();
    assert_ne!(second.database_id, summary.database_id);
}

#[test]
fn test_get_header() {
    let workbench = workbench();
    let root = workbench.get_header(&HeaderPath(vec![])).unwrap();
    assert_eq!(root.subheader_titles, ["Propositional calculus"]);
    assert!(root.content_titles.is_empty());

    let part = workbench.get_header(&path("1")).unwrap();
    assert_eq!(part.title, "Propositional calculus");
    assert_eq!(part.description, "The basic logic.");
    assert_eq!(part.subheader_titles, ["Axioms", "Theorems"]);
    assert_eq!(
        part.content_titles,
        [
            HeaderContent::Constants(["(", ")", "->", "-.", "wff", "|-"].map(String::from).to_vec()),
            HeaderContent::Variables(["ph", "ps", "ch"].map(String::from).to_vec()),
            HeaderContent::FloatingHypothesis(FloatingHypothesisView {
                label: "wph".to_owned(),
                typecode: "wff".to_owned(),
                variable: "ph".to_owned(),
            }),
            HeaderContent::FloatingHypothesis(FloatingHypothesisView {
                label: "wps".to_owned(),
                typecode: "wff".to_owned(),
                variable: "ps".to_owned(),
            }),
            HeaderContent::FloatingHypothesis(FloatingHypothesisView {
                label: "wch".to_owned(),
                typecode: "wff".to_owned(),
                variable: "ch".to_owned(),
            }),
            assertion("wn", AssertionKind::SyntaxAxiom),
            assertion("wi", AssertionKind::SyntaxAxiom),
        ]
    );

    let axioms = workbench.get_header(&path("1.1")).unwrap();
    assert_eq!(
        axioms.content_titles,
        [
            assertion("ax-1", AssertionKind::Axiom),
            assertion("ax-2", AssertionKind::Axiom),
            assertion("ax-mp", AssertionKind::Axiom),
            HeaderContent::Constants(vec!["<->".to_owned()]),
            assertion("wb", AssertionKind::SyntaxAxiom),
            assertion("df-bi", AssertionKind::Definition),
        ]
    );
    assert!(axioms.subheader_titles.is_empty());

    // descriptions and typesetting comments are not listed
    let theorems = workbench.get_header(&path("1.2")).unwrap();
    assert_eq!(
        theorems.content_titles,
        [
            HeaderContent::Comment("A standalone note.".to_owned()),
            assertion("a1i", AssertionKind::Theorem),
            assertion("a1ic", AssertionKind::Theorem),
            assertion("id", AssertionKind::Theorem),
        ]
    );
    assert_matches!(
        workbench.get_header(&path("1.3")),
        Err(Diagnostic::InvalidHeaderPath(ref p)) if &**p == "1.3"
    );
}

#[test]
fn test_export_worksheets() {
    let mut workbench = workbench();
    let a1i = workbench.get_theorem_mmp_format("a1i").unwrap();
    assert_eq!(
        a1i,
        "$theorem a1i
* Inference introducing an antecedent.
h1::a1i.1 |- ph
2::ax-1 |- ( ph -> ( ps -> ph ) )
qed:1,2:ax-mp |- ( ps -> ph )
"
    );
    // under a new label, the worksheet gives back the same proof
    let copy = a1i.replace("a1i", "a1j");
    assert!(workbench.validate_worksheet(&copy).unwrap().is_empty());
    assert_eq!(
        workbench.preview_addition(&copy).unwrap(),
        "${
  a1j.1 $e |- ph $.
  $( Inference introducing an antecedent. $)
  a1j $p |- ( ps -> ph ) $= wph wps wph wi a1j.1 wph wps ax-1 ax-mp $.
$}"
    );

    assert_eq!(
        workbench.get_theorem_mmp_format("ax-mp").unwrap(),
        "$axiom ax-mp
* Rule of Modus Ponens.
h1::min |- ph
h2::maj |- ( ph -> ps )
qed:: |- ps
"
    );
    assert_matches!(
        workbench.get_theorem_mmp_format("nothing"),
        Err(Diagnostic::LabelNotFound(_))
    );

    assert_eq!(
        workbench.get_header_mmp_format(&path("1")).unwrap(),
        "$header 1 Propositional calculus\n* The basic logic.\n"
    );
    assert_eq!(workbench.get_header_mmp_format(&path("1.1")).unwrap(), "$header 1.1 Axioms\n");
    assert_matches!(
        workbench.get_header_mmp_format(&HeaderPath(vec![])),
        Err(Diagnostic::InvalidHeaderPath(_))
    );
    let note = "1.2#1".parse::<CommentPath>().unwrap();
    assert_eq!(
        workbench.get_comment_mmp_format(&note).unwrap(),
        "$comment 1.2#1\n* A standalone note.\n"
    );
    let missing = "1.2#2".parse::<CommentPath>().unwrap();
    assert_matches!(
        workbench.get_comment_mmp_format(&missing),
        Err(Diagnostic::InvalidCommentPath(_))
    );
}

#[test]
fn test_theorem_page() {
    let mut workbench = workbench();
    let page = workbench.get_theorem_page("a1i", false).unwrap();
    assert_eq!(page.theorem.label, "a1i");
    assert_eq!(page.theorem.theorem_number, 8);
    assert_eq!(page.theorem.hypotheses, ["|- ph"]);
    assert_eq!(page.theorem.description.as_deref(), Some("Inference introducing an antecedent."));
    assert_eq!(page.previous_label.as_deref(), Some("df-bi"));
    assert_eq!(page.next_label.as_deref(), Some("a1ic"));
    assert_eq!(page.proof_lines.len(), 3);
    assert_eq!(page.proof_lines[2].label, "ax-mp");
    assert_eq!(page.proof_error, None);
    assert_eq!(page.axiom_dependencies, ["ax-1", "ax-mp"]);
    assert!(page.definition_dependencies.is_empty());
    assert!(page.references.is_empty());
    assert_eq!(workbench.get_theorem_page("a1i", true).unwrap().proof_lines.len(), 6);

    let page = workbench.get_theorem_page("ax-1", false).unwrap();
    assert_eq!(page.theorem.kind, AssertionKind::Axiom);
    assert!(page.proof_lines.is_empty());
    assert_eq!(page.axiom_dependencies, ["ax-1"]);
    assert_eq!(page.references, ["a1i", "a1ic", "id"]);

    let first = workbench.get_theorem_page("wn", false).unwrap();
    assert_eq!(first.theorem.theorem_number, 1);
    assert_eq!(first.previous_label, None);
    assert_eq!(workbench.get_theorem_page("id", false).unwrap().next_label, None);

    assert_matches!(
        workbench.get_theorem_page("nothing", false),
        Err(Diagnostic::LabelNotFound(ref l)) if &**l == "nothing"
    );
}

#[test]
fn test_broken_proof_page() {
    let mut workbench = Workbench::new(DbOptions::default());
    workbench
        .load_text(format!("{PROP_DB}\nbad $p |- ph $= wph wph $.\n"))
        .unwrap();
    let page = workbench.get_theorem_page("bad", false).unwrap();
    assert!(page.proof_lines.is_empty());
    assert_eq!(page.proof_error, Some(Diagnostic::ProofExcessEnd));
}

#[test]
fn test_searches() {
    let mut workbench = workbench();
    let result = workbench.search_theorems(&SearchParameters::default()).unwrap();
    assert_eq!(result.entries.len(), 7);

    assert_eq!(
        workbench.quick_search("a1i", true).unwrap(),
        (vec!["a1i".to_owned(), "a1ic".to_owned()], false)
    );
    // exactly ten assertions
    let (labels, more) = workbench.quick_search("", true).unwrap();
    assert_eq!(labels.len(), 10);
    assert!(!more);
    let (labels, more) = workbench.quick_search("", false).unwrap();
    assert_eq!(labels.len(), 10);
    assert!(!more);

    assert_eq!(
        workbench.autocomplete_axioms("ax-", &["ax-1".to_owned()]).unwrap(),
        (false, vec!["ax-2".to_owned(), "ax-mp".to_owned()])
    );
    assert_eq!(
        workbench.autocomplete_definitions("df-bi", &[]).unwrap(),
        (true, vec![])
    );
}

#[test]
fn test_symbols() {
    let mut workbench = workbench();
    assert_eq!(
        workbench.get_constants().unwrap(),
        ["(", ")", "->", "-.", "wff", "|-", "<->"]
    );
    let variables = workbench.get_variables().unwrap();
    assert_eq!(variables.len(), 3);
    assert_eq!(
        variables[0],
        VariableView {
            symbol: "ph".to_owned(),
            typecode: Some("wff".to_owned()),
        }
    );
    let floats = workbench.get_floating_hypotheses().unwrap();
    let labels = floats.iter().map(|f| f.label.as_str()).collect::<Vec<_>>();
    assert_eq!(labels, ["wph", "wps", "wch"]);

    let markup = workbench.get_html_representations().unwrap();
    assert_eq!(markup.len(), 2);
    assert_eq!(markup[0].symbol, "->");
    assert_eq!(markup[0].html.as_deref(), Some(" &rarr; "));
    assert_eq!(markup[0].latex, None);
    assert_eq!(markup[1].symbol, "ph");
    assert_eq!(markup[1].html.as_deref(), Some("<I>ph</I>"));
    assert_eq!(markup[1].alt_html.as_deref(), Some("&#x1D711;"));
    assert_eq!(markup[1].latex.as_deref(), Some("\\varphi"));
}

#[test]
fn test_add_theorem() {
    let mut workbench = workbench();
    let before = workbench.database().unwrap().id();
    assert_eq!(workbench.add_to_database(A1I2), Ok(InsertedAt::Label("a1i2".to_owned())));
    let db = workbench.database().unwrap();
    // same database, new content
    assert_eq!(db.id(), before);
    assert_eq!(db.theorem_count(), 4);
    assert!(db
        .text()
        .contains("\n\n${\n  a1i2.1 $e |- ph $.\n  $( Inference introducing an antecedent. $)\n  a1i2 $p"));
    assert_eq!(workbench.progress(), Some(100));

    let page = workbench.get_theorem_page("a1i2", false).unwrap();
    assert_eq!(page.theorem.theorem_number, 11);
    assert_eq!(page.previous_label.as_deref(), Some("id"));
    assert_eq!(page.proof_lines.len(), 3);
    assert_eq!(page.axiom_dependencies, ["ax-1", "ax-mp"]);
    // the label is now taken
    assert_eq!(workbench.add_to_database(A1I2), Err(Diagnostic::UnfinishedTheorem));
}

#[test]
fn test_add_other_kinds() {
    let mut workbench = workbench();
    assert_eq!(
        workbench.add_to_database("$header 1.3 More theorems\n* About them.\n"),
        Ok(InsertedAt::Header(path("1.3")))
    );
    let header = workbench.get_header(&path("1.3")).unwrap();
    assert_eq!(header.title, "More theorems");
    assert_eq!(header.description, "About them.");
    assert_eq!(
        workbench.get_header(&path("1")).unwrap().subheader_titles,
        ["Axioms", "Theorems", "More theorems"]
    );

    let comment = "$comment 1.2#1\n* First note.\n";
    assert_eq!(
        workbench.preview_addition(comment).unwrap(),
        "$( First note. $)"
    );
    assert_eq!(
        workbench.add_to_database(comment),
        Ok(InsertedAt::Comment("1.2#1".parse::<CommentPath>().unwrap()))
    );
    let theorems = workbench.get_header(&path("1.2")).unwrap();
    assert_eq!(theorems.content_titles[0], HeaderContent::Comment("First note.".to_owned()));
    assert_eq!(theorems.content_titles[1], HeaderContent::Comment("A standalone note.".to_owned()));

    assert_eq!(
        workbench.add_to_database("$c foo bar\n"),
        Ok(InsertedAt::Symbols(vec!["foo".to_owned(), "bar".to_owned()]))
    );
    assert!(workbench.get_constants().unwrap().ends_with(&["foo".to_owned(), "bar".to_owned()]));

    assert_eq!(
        workbench.add_to_database("$v th\n$f wth wff th\n"),
        Ok(InsertedAt::Symbols(vec!["th".to_owned()]))
    );
    assert_eq!(
        workbench.get_floating_hypotheses().unwrap().last().map(|f| f.label.as_str()),
        Some("wth")
    );

    // the new variable is known to the grammar
    let uses = "$theorem th-id\nqed::ax-1 |- ( th -> ( th -> th ) )\n";
    assert_eq!(workbench.add_to_database(uses), Ok(InsertedAt::Label("th-id".to_owned())));
}

#[test]
fn test_add_rejected() {
    let mut workbench = workbench();
    let text = workbench.database().unwrap().text().to_owned();
    assert_eq!(workbench.add_to_database(""), Err(Diagnostic::MmpFileEmpty));
    assert_eq!(workbench.add_to_database("* Only a comment.\n"), Err(Diagnostic::MmpFileEmpty));
    assert_eq!(workbench.add_to_database("$theorem\n"), Err(Diagnostic::UnfinishedTheorem));
    assert_eq!(
        workbench.add_to_database("$theorem ax-1\nqed:: |- ph\n"),
        Err(Diagnostic::UnfinishedTheorem)
    );
    // an incomplete proof needs $allowincomplete
    let incomplete = "$theorem t\nqed:: |- ( ps -> ( ph -> ph ) )\n";
    assert_eq!(workbench.add_to_database(incomplete), Err(Diagnostic::UnfinishedTheorem));
    assert_eq!(
        workbench.add_to_database("$locateafter a1i\n$axiom ax-3\nqed:: |- ( ph -> ph )\n$allowincomplete\n"),
        Err(Diagnostic::UnfinishedTheorem)
    );
    assert_eq!(workbench.database().unwrap().text(), text);

    let allowed = "$theorem t\n$allowincomplete\nqed:: |- ( ph -> ph )\n";
    assert_eq!(workbench.add_to_database(allowed), Ok(InsertedAt::Label("t".to_owned())));

    let mut broken = Workbench::new(DbOptions::default());
    broken
        .load_text(format!("{PROP_DB}\nbad $p |- ph $= wph wph $.\n"))
        .unwrap();
    assert_eq!(
        broken.add_to_database("$comment 1.2#2\n* A note.\n"),
        Err(Diagnostic::CantAddToDatabase)
    );
}

#[test]
fn test_reinsert_theorem() {
    let start = PROP_DB.find("$( Principle of identity. $)").unwrap();
    let end = PROP_DB.find("$( $t").unwrap();
    let proof = PROP_DB[start..end]
        .split_whitespace()
        .skip_while(|&t| t != "$=")
        .skip(1)
        .take_while(|&t| t != "$.")
        .collect::<Vec<_>>()
        .join(" ");
    let mut workbench = Workbench::new(DbOptions::default());
    workbench
        .load_text(format!("{}{}", &PROP_DB[..start], &PROP_DB[end..]))
        .unwrap();
    assert!(workbench.get_theorem_page("id", false).is_err());

    let worksheet = format!("$theorem id\n* Principle of identity.\nqed:: |- ( ph -> ph )\n$= {proof}\n");
    assert_eq!(workbench.add_to_database(&worksheet), Ok(InsertedAt::Label("id".to_owned())));
    let db = workbench.database().unwrap();
    assert_eq!(verify_theorem(db, "id", VerifyOptions::default()), Ok(()));
    assert_eq!(
        workbench.get_theorem_page("id", false).unwrap().axiom_dependencies,
        ["ax-1", "ax-2", "ax-mp"]
    );
}

#[test]
fn test_new_header_numbering() {
    let cut = PROP_DB.find("  Theorems\n").unwrap();
    let start = PROP_DB[..cut].rfind("$(").unwrap();
    let mut workbench = Workbench::new(DbOptions::default());
    workbench.load_text(&PROP_DB[..start]).unwrap();
    assert_eq!(workbench.get_header(&path("1")).unwrap().subheader_titles, ["Axioms"]);

    let errors = workbench.validate_worksheet("$header 1.3 Gap\n").unwrap();
    let diags = errors.iter().map(|e| e.diagnostic.clone()).collect::<Vec<_>>();
    assert_eq!(diags, [Diagnostic::InvalidHeaderPath("1.3".into())]);
    assert_eq!(workbench.add_to_database("$header 1.3 Gap\n"), Err(Diagnostic::UnfinishedTheorem));

    assert_eq!(
        workbench.add_to_database("$header 1.2 Theorems\n"),
        Ok(InsertedAt::Header(path("1.2")))
    );
    assert_eq!(
        workbench.get_header(&path("1")).unwrap().subheader_titles,
        ["Axioms", "Theorems"]
    );
}

#[test]
fn test_add_to_file() {
    let file = temp_file("add");
    fs::write(&file, PROP_DB).unwrap();
    let mut workbench = Workbench::new(DbOptions::default());
    workbench.load_database(&file).unwrap();
    assert_eq!(workbench.add_to_database(A1I2), Ok(InsertedAt::Label("a1i2".to_owned())));
    let written = fs::read_to_string(&file).unwrap();
    assert_eq!(written, workbench.database().unwrap().text());
    assert!(written.contains("a1i2 $p |- ( ps -> ph ) $="));

    // the snapshot follows our own writes
    assert_eq!(
        workbench.add_to_database("$c foo\n"),
        Ok(InsertedAt::Symbols(vec!["foo".to_owned()]))
    );

    fs::write(&file, format!("{written}\n$( Edited elsewhere. $)\n")).unwrap();
    assert_eq!(
        workbench.add_to_database("$c bar\n"),
        Err(Diagnostic::DatabaseHasChanged)
    );
    let _ = fs::remove_file(&file);
}

#[test]
fn test_error_messages() {
    assert_eq!(message_for_name("NoDatabaseError"), "No database is loaded.");
    assert_eq!(Diagnostic::MmpFileEmpty.name(), "MmpFileEmptyError");
    let unknown = message_for_name("NoSuchError");
    assert!(unknown.starts_with("Unexpected error"));
    assert!(unknown.contains("NoSuchError"));
}
