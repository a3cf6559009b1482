//! Commands: the tree that resolves argument vectors, the handler trait, and
//! the built-in GitHub commands.
//!
//! A handler only runs after its command has been resolved and authorized;
//! it performs exactly one side effect against the GitHub API.

/// Built-in issue and pull request commands (close, labels, assignees, workflows).
pub mod builtin;
/// Command tree, arity contracts and action identifiers.
pub mod tree;

pub use tree::{
    ACTION_SEPARATOR, ActionIdentifier, Arity, CommandNode, CommandTree, CommandTreeError,
    Resolved, ResolutionError,
};

use crate::dispatch::ExecutionContext;
use crate::github::ApiError;

/// Why an authorized command failed to run.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("cancelled before the command could run")]
    Cancelled,
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("{0}")]
    Unsupported(String),
    #[error(transparent)]
    Api(ApiError),
}

impl From<ApiError> for HandlerError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Cancelled => HandlerError::Cancelled,
            other => HandlerError::Api(other),
        }
    }
}

/// Performs the side effect of one executable command.
pub trait CommandHandler: Send + Sync {
    /// Run the command with the arguments left over after resolution.
    fn execute(&self, ctx: &ExecutionContext<'_>, args: &[String]) -> Result<(), HandlerError>;
}

impl<F> CommandHandler for F
where
    F: Fn(&ExecutionContext<'_>, &[String]) -> Result<(), HandlerError> + Send + Sync,
{
    fn execute(&self, ctx: &ExecutionContext<'_>, args: &[String]) -> Result<(), HandlerError> {
        self(ctx, args)
    }
}
