//! Operation tables
//!
//! Resolves a possibly abbreviated operation word against a name-sorted table
//! of operation specs, validates the argument count and calls the handler.
//! The same resolution code serves every table, nested or top level.
//!
//! ## Resolution
//! 1. Candidates are the entries whose name starts with the token
//!    (first character compared first).
//! 2. An entry whose full name equals the token wins outright.
//! 3. Otherwise a candidate is accepted when the token is at least its
//!    `min_abbrev` characters long.
//! 4. Exactly one accepted candidate resolves; anything else with candidates
//!    present is ambiguous; no candidates at all is not-found.

use crate::error::{Result, VizError};
use super::Outcome;

/// Handler invoked with the context and the full word list of the command
pub type OpHandler<C> = Box<dyn Fn(&mut C, &[String]) -> Result<Outcome> + Send + Sync>;

/// How a table is searched; both give identical results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchMode {
    #[default]
    Binary,
    Linear,
}

/// Outcome of resolving one token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Index into the table
    Unique(usize),
    /// Every candidate sharing the prefix, in table order
    Ambiguous(Vec<String>),
    NotFound,
}

/// One named operation
pub struct OpSpec<C> {
    name: String,
    /// Shortest accepted abbreviation
    min_abbrev: usize,
    /// Inclusive bounds on the total word count; `max_args == 0` is unbounded
    min_args: usize,
    max_args: usize,
    usage: String,
    handler: OpHandler<C>,
}

impl<C> OpSpec<C> {
    pub fn new<F>(
        name: impl Into<String>,
        min_abbrev: usize,
        min_args: usize,
        max_args: usize,
        usage: impl Into<String>,
        handler: F,
    ) -> Self
    where
        F: Fn(&mut C, &[String]) -> Result<Outcome> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            min_abbrev,
            min_args,
            max_args,
            usage: usage.into(),
            handler: Box::new(handler),
        }
    }

    /// An operation that dispatches the next word through a sub-table
    pub fn nested(
        name: impl Into<String>,
        min_abbrev: usize,
        table: OpTable<C>,
    ) -> Self
    where
        C: 'static,
    {
        let min_args = table.oper_pos + 1;
        Self::new(name, min_abbrev, min_args, 0, "oper ?args?", move |ctx: &mut C, argv: &[String]| {
            table.dispatch(ctx, argv)
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn usage(&self) -> &str {
        &self.usage
    }

    pub fn min_abbrev(&self) -> usize {
        self.min_abbrev
    }

    fn accepts_argc(&self, argc: usize) -> bool {
        argc >= self.min_args && (self.max_args == 0 || argc <= self.max_args)
    }
}

impl<C> std::fmt::Debug for OpSpec<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpSpec")
            .field("name", &self.name)
            .field("min_abbrev", &self.min_abbrev)
            .field("min_args", &self.min_args)
            .field("max_args", &self.max_args)
            .finish()
    }
}

/// Name-sorted table of operations
pub struct OpTable<C> {
    specs: Vec<OpSpec<C>>,
    /// Index of the operation word in the command's word list
    oper_pos: usize,
    search: SearchMode,
}

impl<C> OpTable<C> {
    /// Build a table; `oper_pos` is where the operation word sits in argv
    /// (0 for top-level commands, 1 for `object verb ...`, and so on)
    pub fn new(oper_pos: usize, mut specs: Vec<OpSpec<C>>) -> Self {
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        debug_assert!(
            specs.windows(2).all(|w| w[0].name != w[1].name),
            "duplicate operation names"
        );
        Self {
            specs,
            oper_pos,
            search: SearchMode::Binary,
        }
    }

    /// Switch the search strategy
    pub fn with_search(mut self, search: SearchMode) -> Self {
        self.search = search;
        self
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn spec(&self, index: usize) -> &OpSpec<C> {
        &self.specs[index]
    }

    /// Operation names in table order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.specs.iter().map(|s| s.name.as_str())
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    /// Resolve a token with the table's configured search
    pub fn resolve(&self, token: &str) -> Resolution {
        self.resolve_with(self.search, token)
    }

    /// Resolve a token with an explicit search strategy
    pub fn resolve_with(&self, search: SearchMode, token: &str) -> Resolution {
        let candidates = match search {
            SearchMode::Binary => self.candidates_binary(token),
            SearchMode::Linear => self.candidates_linear(token),
        };
        self.select(token, &candidates)
    }

    /// Sorted range of names starting with the token
    fn candidates_binary(&self, token: &str) -> Vec<usize> {
        let Some(first) = token.bytes().next() else {
            return Vec::new();
        };
        let start = self.specs.partition_point(|s| s.name.as_str() < token);
        (start..self.specs.len())
            .take_while(|&i| {
                let name = &self.specs[i].name;
                name.as_bytes().first() == Some(&first) && name.starts_with(token)
            })
            .collect()
    }

    fn candidates_linear(&self, token: &str) -> Vec<usize> {
        let Some(first) = token.bytes().next() else {
            return Vec::new();
        };
        self.specs
            .iter()
            .enumerate()
            .filter(|(_, s)| s.name.as_bytes().first() == Some(&first) && s.name.starts_with(token))
            .map(|(i, _)| i)
            .collect()
    }

    fn select(&self, token: &str, candidates: &[usize]) -> Resolution {
        if candidates.is_empty() {
            return Resolution::NotFound;
        }
        if let Some(&exact) = candidates.iter().find(|&&i| self.specs[i].name == token) {
            return Resolution::Unique(exact);
        }

        let mut accepted = candidates
            .iter()
            .copied()
            .filter(|&i| token.len() >= self.specs[i].min_abbrev);
        match (accepted.next(), accepted.next()) {
            (Some(index), None) => Resolution::Unique(index),
            _ => Resolution::Ambiguous(
                candidates.iter().map(|&i| self.specs[i].name.clone()).collect(),
            ),
        }
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    /// Resolve `argv[oper_pos]`, check the word count and run the handler
    pub fn dispatch(&self, ctx: &mut C, argv: &[String]) -> Result<Outcome> {
        let Some(token) = argv.get(self.oper_pos) else {
            return Err(VizError::WrongArgs(format!(
                "wrong # args: should be one of...{}",
                self.usage_listing(argv)
            )));
        };

        let index = match self.resolve(token) {
            Resolution::Unique(index) => index,
            Resolution::Ambiguous(names) => {
                return Err(VizError::AmbiguousOperation(format!(
                    "ambiguous{} operation \"{}\" matches: {}",
                    self.parent_word(argv),
                    token,
                    names.join(" ")
                )));
            }
            Resolution::NotFound => {
                return Err(VizError::UnknownOperation(format!(
                    "bad{} operation \"{}\": should be one of...{}",
                    self.parent_word(argv),
                    token,
                    self.usage_listing(argv)
                )));
            }
        };

        let spec = &self.specs[index];
        if !spec.accepts_argc(argv.len()) {
            return Err(VizError::WrongArgs(format!(
                "wrong # args: should be \"{}{} {}\"",
                self.prefix_words(argv),
                spec.name,
                spec.usage
            )));
        }

        tracing::trace!("Dispatching \"{}\" to {}", token, spec.name);
        (spec.handler)(ctx, argv)
    }

    /// `\n  <prefix> name usage` for every operation
    pub fn usage_listing(&self, argv: &[String]) -> String {
        let prefix = self.prefix_words(argv);
        self.specs
            .iter()
            .map(|s| format!("\n  {}{} {}", prefix, s.name, s.usage))
            .collect()
    }

    /// Words before the operation, each followed by a space
    fn prefix_words(&self, argv: &[String]) -> String {
        argv.iter()
            .take(self.oper_pos)
            .map(|w| format!("{} ", w))
            .collect()
    }

    fn parent_word(&self, argv: &[String]) -> String {
        match self.oper_pos.checked_sub(1).and_then(|i| argv.get(i)) {
            Some(parent) => format!(" {}", parent),
            None => String::new(),
        }
    }
}
