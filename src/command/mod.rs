//! Command Module
//!
//! Statement assembly, abbreviation-aware operation tables and the
//! interpreter that ties them together.
//!
//! ## Command Surface
//! ```text
//! object  verb   args...
//!   │      │
//!   │      └── resolved in the object's sub-table (oper_pos 1)
//!   └───────── resolved in the top-level table (oper_pos 0)
//! ```

mod op_table;
mod interpreter;
mod statement;

pub use op_table::{OpHandler, OpSpec, OpTable, Resolution, SearchMode};
pub use interpreter::{split_commands, CommandEvaluator, Interpreter};
pub use statement::StatementBuffer;

/// What a successfully executed command asks of the server loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Done; carries the command's result string (often empty)
    Ok(String),
    /// Render now, even if more commands are already buffered
    Flush,
}

impl Outcome {
    /// Success with an empty result
    pub fn ok() -> Self {
        Outcome::Ok(String::new())
    }

    /// Result string, empty for `Flush`
    pub fn text(&self) -> &str {
        match self {
            Outcome::Ok(text) => text,
            Outcome::Flush => "",
        }
    }
}
