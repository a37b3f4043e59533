//! Interpreter Tests
//!
//! Tests for statement completeness, word splitting and command evaluation.

use vizserver::command::{
    split_commands, CommandEvaluator, Interpreter, OpSpec, OpTable, Outcome, StatementBuffer,
};
use vizserver::VizError;

// =============================================================================
// Helper Functions
// =============================================================================

fn interpreter() -> Interpreter<Vec<Vec<String>>> {
    fn push(ctx: &mut Vec<Vec<String>>, argv: &[String]) -> vizserver::Result<Outcome> {
        ctx.push(argv.to_vec());
        Ok(Outcome::Ok(argv.len().to_string()))
    }
    fn flush(ctx: &mut Vec<Vec<String>>, argv: &[String]) -> vizserver::Result<Outcome> {
        ctx.push(argv.to_vec());
        Ok(Outcome::Flush)
    }
    fn fail(_: &mut Vec<Vec<String>>, _: &[String]) -> vizserver::Result<Outcome> {
        Err(VizError::Command("failed on purpose".to_string()))
    }

    Interpreter::new(OpTable::new(
        0,
        vec![
            OpSpec::new("echo", 4, 1, 0, "?word...?", push),
            OpSpec::new("fail", 4, 1, 1, "", fail),
            OpSpec::new("flush", 5, 1, 1, "", flush),
        ],
    ))
}

// =============================================================================
// Completeness Tests
// =============================================================================

#[test]
fn test_complete_statements() {
    let interp = interpreter();
    for text in ["echo a\n", "echo {a b}\n", "echo \"a b\"\n", "\n", "# comment {\n"] {
        assert!(interp.is_complete(text), "{:?}", text);
    }
}

#[test]
fn test_incomplete_statements() {
    let interp = interpreter();
    for text in ["echo {a\n", "echo {a {b}\n", "echo \"a\n", "echo a \\\n"] {
        assert!(!interp.is_complete(text), "{:?}", text);
    }
}

#[test]
fn test_statement_buffer_joins_lines() {
    let interp = interpreter();
    let mut buffer = StatementBuffer::new();

    assert_eq!(buffer.push_line(b"echo {one\n", |s| interp.is_complete(s)), None);
    assert!(buffer.is_pending());
    assert_eq!(buffer.push_line(b"two\n", |s| interp.is_complete(s)), None);
    assert_eq!(
        buffer.push_line(b"three}\n", |s| interp.is_complete(s)).as_deref(),
        Some("echo {one\ntwo\nthree}\n")
    );
    assert!(!buffer.is_pending());
}

// =============================================================================
// Word Splitting Tests
// =============================================================================

#[test]
fn test_split_multi_line_braces() {
    let commands = split_commands("echo {one\ntwo} x\n").unwrap();
    assert_eq!(commands, vec![vec!["echo", "one\ntwo", "x"]]);
}

#[test]
fn test_split_nested_braces_and_quotes() {
    let commands = split_commands("echo {a {b c}} \"d {e\"\n").unwrap();
    assert_eq!(commands, vec![vec!["echo", "a {b c}", "d {e"]]);
}

#[test]
fn test_split_continuation_and_separators() {
    let commands = split_commands("echo a \\\n b; echo c\n\n").unwrap();
    assert_eq!(commands, vec![vec!["echo", "a", "b"], vec!["echo", "c"]]);
}

#[test]
fn test_split_rejects_trailing_garbage_after_quote() {
    assert!(split_commands("echo \"a\"b\n").is_err());
}

// =============================================================================
// Evaluation Tests
// =============================================================================

#[test]
fn test_evaluate_runs_every_command() {
    let interp = interpreter();
    let mut seen = Vec::new();

    let outcome = interp.evaluate(&mut seen, "echo a; echo b c\n").unwrap();
    assert_eq!(seen, vec![vec!["echo", "a"], vec!["echo", "b", "c"]]);
    assert_eq!(outcome, Outcome::Ok("3".to_string()));
}

#[test]
fn test_flush_is_sticky_within_a_statement() {
    let interp = interpreter();
    let mut seen = Vec::new();

    let outcome = interp.evaluate(&mut seen, "flush; echo after\n").unwrap();
    assert_eq!(outcome, Outcome::Flush);
    assert_eq!(seen.len(), 2);
}

#[test]
fn test_error_stops_the_statement() {
    let interp = interpreter();
    let mut seen = Vec::new();

    let err = interp.evaluate(&mut seen, "echo a; fail; echo b\n").unwrap_err();
    assert_eq!(err.to_string(), "failed on purpose");
    assert!(!err.is_fatal());
    assert_eq!(seen, vec![vec!["echo", "a"]]);
}

#[test]
fn test_unknown_command_is_not_fatal() {
    let interp = interpreter();
    let err = interp.evaluate(&mut Vec::new(), "frobnicate\n").unwrap_err();
    assert!(matches!(err, VizError::UnknownOperation(_)));
    assert!(!err.is_fatal());
}
