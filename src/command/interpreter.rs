//! Command interpreter
//!
//! A small Tcl-flavoured evaluator: it splits a statement into commands and
//! words, judges whether buffered text is a complete statement, and sends
//! each command through the top-level operation table.
//!
//! ## Syntax
//! - words are separated by blanks; commands by newlines or `;`
//! - `"..."` groups words and processes backslash escapes
//! - `{...}` groups words verbatim and nests
//! - `#` at the start of a command comments out the rest of the line
//! - backslash-newline joins lines

use crate::error::{Result, VizError};
use super::{OpTable, Outcome};

/// Something that can judge and execute statements against a context
pub trait CommandEvaluator<C> {
    /// Whether `statement` can be executed as is (quotes and braces closed)
    fn is_complete(&self, statement: &str) -> bool;

    /// Execute a complete statement
    fn evaluate(&self, ctx: &mut C, statement: &str) -> Result<Outcome>;
}

/// Evaluator backed by an operation table of top-level commands
pub struct Interpreter<C> {
    commands: OpTable<C>,
}

impl<C> Interpreter<C> {
    pub fn new(commands: OpTable<C>) -> Self {
        Self { commands }
    }

    pub fn commands(&self) -> &OpTable<C> {
        &self.commands
    }
}

impl<C> CommandEvaluator<C> for Interpreter<C> {
    fn is_complete(&self, statement: &str) -> bool {
        !matches!(parse(statement), Err(ParseError::Incomplete(_)))
    }

    fn evaluate(&self, ctx: &mut C, statement: &str) -> Result<Outcome> {
        let commands = split_commands(statement)?;

        let mut outcome = Outcome::ok();
        for words in commands {
            tracing::trace!("Evaluating {:?}", words);
            match self.commands.dispatch(ctx, &words)? {
                Outcome::Flush => outcome = Outcome::Flush,
                Outcome::Ok(text) => {
                    if outcome != Outcome::Flush {
                        outcome = Outcome::Ok(text);
                    }
                }
            }
        }
        Ok(outcome)
    }
}

// =============================================================================
// Parsing
// =============================================================================

#[derive(Debug, PartialEq, Eq)]
enum ParseError {
    /// More input could still make this valid
    Incomplete(&'static str),
    /// No amount of further input helps
    Syntax(String),
}

/// Split a complete statement into commands of words
pub fn split_commands(statement: &str) -> Result<Vec<Vec<String>>> {
    parse(statement).map_err(|e| match e {
        ParseError::Incomplete(what) => VizError::Command(format!("incomplete statement: {}", what)),
        ParseError::Syntax(msg) => VizError::Command(msg),
    })
}

fn parse(script: &str) -> std::result::Result<Vec<Vec<String>>, ParseError> {
    let chars: Vec<char> = script.chars().collect();
    let mut commands = Vec::new();
    let mut words: Vec<String> = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            ' ' | '\t' | '\r' => i += 1,
            '\n' | ';' => {
                if !words.is_empty() {
                    commands.push(std::mem::take(&mut words));
                }
                i += 1;
            }
            '\\' if chars.get(i + 1) == Some(&'\n') => {
                if i + 2 >= chars.len() {
                    return Err(ParseError::Incomplete("line continuation"));
                }
                i += 2;
            }
            '#' if words.is_empty() => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '{' => {
                let (word, next) = braced_word(&chars, i)?;
                check_word_end(&chars, next, "close-brace")?;
                words.push(word);
                i = next;
            }
            '"' => {
                let (word, next) = quoted_word(&chars, i)?;
                check_word_end(&chars, next, "close-quote")?;
                words.push(word);
                i = next;
            }
            _ => {
                let (word, next) = bare_word(&chars, i)?;
                words.push(word);
                i = next;
            }
        }
    }

    if !words.is_empty() {
        commands.push(words);
    }
    Ok(commands)
}

fn is_word_end(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n' | ';')
}

fn check_word_end(chars: &[char], i: usize, what: &str) -> std::result::Result<(), ParseError> {
    match chars.get(i) {
        Some(&c) if !is_word_end(c) => Err(ParseError::Syntax(format!(
            "extra characters after {}",
            what
        ))),
        _ => Ok(()),
    }
}

/// `{...}` with nesting; contents kept verbatim
fn braced_word(chars: &[char], start: usize) -> std::result::Result<(String, usize), ParseError> {
    let mut depth = 1;
    let mut word = String::new();
    let mut j = start + 1;

    loop {
        let Some(&c) = chars.get(j) else {
            return Err(ParseError::Incomplete("missing close-brace"));
        };
        match c {
            '\\' => {
                let Some(&next) = chars.get(j + 1) else {
                    return Err(ParseError::Incomplete("missing close-brace"));
                };
                word.push(c);
                word.push(next);
                j += 2;
                continue;
            }
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Ok((word, j + 1));
                }
            }
            _ => {}
        }
        word.push(c);
        j += 1;
    }
}

/// `"..."` with backslash escapes
fn quoted_word(chars: &[char], start: usize) -> std::result::Result<(String, usize), ParseError> {
    let mut word = String::new();
    let mut j = start + 1;

    loop {
        match chars.get(j) {
            None => return Err(ParseError::Incomplete("missing \"")),
            Some('"') => return Ok((word, j + 1)),
            Some('\\') => {
                let (c, next) = escape(chars, j, "missing \"")?;
                word.push(c);
                j = next;
            }
            Some(&c) => {
                word.push(c);
                j += 1;
            }
        }
    }
}

fn bare_word(chars: &[char], start: usize) -> std::result::Result<(String, usize), ParseError> {
    let mut word = String::new();
    let mut j = start;

    while let Some(&c) = chars.get(j) {
        if is_word_end(c) {
            break;
        }
        if c == '\\' {
            if chars.get(j + 1) == Some(&'\n') {
                break;
            }
            let (c, next) = escape(chars, j, "dangling backslash")?;
            word.push(c);
            j = next;
        } else {
            word.push(c);
            j += 1;
        }
    }
    Ok((word, j))
}

fn escape(
    chars: &[char],
    j: usize,
    incomplete: &'static str,
) -> std::result::Result<(char, usize), ParseError> {
    let c = match chars.get(j + 1) {
        None => return Err(ParseError::Incomplete(incomplete)),
        Some('n') => '\n',
        Some('t') => '\t',
        Some('r') => '\r',
        Some('\n') => ' ',
        Some(&other) => other,
    };
    Ok((c, j + 2))
}
