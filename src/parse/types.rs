//! Types produced by the scanner and the invocation parser, consumed by the
//! command tree and the dispatcher.

use std::fmt;

/// A single command extracted from comment text, with the marker stripped.
///
/// Always starts with a non-whitespace character and carries no surrounding
/// whitespace. Only the scanner creates these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    text: String,
}

impl CommandLine {
    pub(crate) fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// The command text after the marker.
    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl AsRef<str> for CommandLine {
    fn as_ref(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// The words of one parsed invocation: a command name followed by its arguments.
///
/// Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentVector(Vec<String>);

impl ArgumentVector {
    /// Wrap a token list. Returns `None` for an empty list.
    pub fn new(tokens: Vec<String>) -> Option<Self> {
        if tokens.is_empty() {
            None
        } else {
            Some(Self(tokens))
        }
    }

    /// The command name (token 0).
    pub fn name(&self) -> &str {
        &self.0[0]
    }

    /// Everything after the command name.
    pub fn args(&self) -> &[String] {
        &self.0[1..]
    }

    /// All tokens, name included.
    pub fn tokens(&self) -> &[String] {
        &self.0
    }

    pub fn into_tokens(self) -> Vec<String> {
        self.0
    }

    /// Join the tokens back into a single line, quoting where needed so the
    /// line parses back into the same tokens.
    pub fn to_command_line(&self) -> Result<String, shlex::QuoteError> {
        shlex::try_join(self.0.iter().map(String::as_str))
    }
}

impl fmt::Display for ArgumentVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(" "))
    }
}

/// Why a command line could not be turned into an [`ArgumentVector`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("empty command")]
    Empty,
    /// The line is not valid shell syntax (unterminated quote, stray operator).
    #[error("malformed command: {0}")]
    Malformed(String),
    /// Pipelines, lists, redirections, assignments and compound statements.
    #[error("unsupported shell construct: {0}")]
    Unsupported(String),
    #[error("only one command per line is supported")]
    MultipleStatements,
    #[error("shell grammar unavailable: {0}")]
    Grammar(String),
}
