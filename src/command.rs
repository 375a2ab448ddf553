//! Command model for the profiler
//!
//! A command is the program name followed by its arguments, exactly as the
//! caller supplied it. It is validated once on construction and never
//! modified afterwards.

use std::fmt;
use thiserror::Error;

/// Errors raised while building a [`Command`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("Command is empty")]
    Empty,

    #[error("Command token {index} is empty")]
    EmptyToken { index: usize },
}

/// An ordered, non-empty sequence of command tokens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    tokens: Vec<String>,
}

impl Command {
    /// Build a command from pre-split tokens
    pub fn new<I, S>(tokens: I) -> Result<Self, CommandError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tokens: Vec<String> = tokens.into_iter().map(Into::into).collect();
        if tokens.is_empty() {
            return Err(CommandError::Empty);
        }
        if let Some(index) = tokens.iter().position(|t| t.is_empty()) {
            return Err(CommandError::EmptyToken { index });
        }
        Ok(Self { tokens })
    }

    /// Build a command from a single whitespace-delimited string
    ///
    /// No shell quoting is interpreted: `python -c 'print(1)'` yields the
    /// token `'print(1)'` with its quotes. Pass pre-split tokens through
    /// [`Command::new`] when arguments contain whitespace.
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        Self::new(line.split_whitespace())
    }

    /// The program token (always present)
    pub fn program(&self) -> &str {
        &self.tokens[0]
    }

    /// Arguments after the program token
    pub fn args(&self) -> &[String] {
        &self.tokens[1..]
    }

    /// All tokens, program first
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Always false; kept for API symmetry with `len`
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tokens.join(" "))
    }
}
