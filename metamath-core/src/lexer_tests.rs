use crate::diag::Diagnostic;
use crate::lexer::{tokenize, LexemeKind, Tokenizer};
use crate::statement::Position;
use assert_matches::assert_matches;

#[test]
fn tokens_and_comments() {
    let lexemes = tokenize("$c ( ) $.\n  $( a\n comment $) wff $.").unwrap();
    let texts = lexemes.iter().map(|l| l.text).collect::<Vec<_>>();
    assert_eq!(texts, ["$c", "(", ")", "$.", "$( a\n comment $)", "wff", "$."]);
    assert_eq!(lexemes[4].kind, LexemeKind::Comment);
    assert_eq!(lexemes[4].comment_body(), " a\n comment ");
    assert_eq!(lexemes[4].start, Position::new(2, 3));
    assert_eq!(lexemes[4].end, Position::new(3, 12));
    assert_eq!(lexemes[5].start, Position::new(3, 13));
}

#[test]
fn comment_end_must_be_a_token() {
    let lexemes = tokenize("$( a$) b $) c").unwrap();
    assert_eq!(lexemes.len(), 2);
    assert_eq!(lexemes[1].text, "c");
}

#[test]
fn unclosed_comment() {
    let err = tokenize("$c x $.\n$( never closed").unwrap_err();
    assert_matches!(err.diagnostic, Diagnostic::UnclosedComment);
    assert_eq!(err.start, Position::new(2, 1));
}

#[test]
fn non_ascii_symbol() {
    let err = tokenize("$c a\n b\u{e9} $.").unwrap_err();
    assert_matches!(err.diagnostic, Diagnostic::NonAsciiSymbol);
    assert_eq!(err.start, Position::new(2, 3));
}

#[test]
fn tokenizer_is_lazy_and_restartable() {
    let text = "x y\nz w";
    let mut tokenizer = Tokenizer::new(text);
    assert_eq!(tokenizer.next().unwrap().unwrap().text, "x");
    let restarted = Tokenizer::at(text, 4).next().unwrap().unwrap();
    assert_eq!(restarted.text, "z");
    assert_eq!(restarted.start, Position::new(2, 1));
    assert_eq!(tokenizer.next().unwrap().unwrap().text, "y");
}
