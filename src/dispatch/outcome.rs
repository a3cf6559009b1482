use std::fmt;

use crate::commands::{ActionIdentifier, HandlerError};

/// Which terminal state a command line reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeKind {
    SkippedParseError,
    Denied,
    ExecutionError,
    Succeeded,
}

impl OutcomeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeKind::SkippedParseError => "skipped-parse-error",
            OutcomeKind::Denied => "denied",
            OutcomeKind::ExecutionError => "execution-error",
            OutcomeKind::Succeeded => "succeeded",
        }
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of dispatching one command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The line did not parse, or did not resolve to a command.
    SkippedParseError { command: String, reason: String },
    /// The policy decision point did not allow the action.
    Denied {
        command: String,
        action: ActionIdentifier,
        reason: String,
    },
    /// The handler ran and failed.
    ExecutionError {
        command: String,
        action: ActionIdentifier,
        error: String,
    },
    Succeeded {
        command: String,
        action: ActionIdentifier,
    },
}

impl DispatchOutcome {
    pub(crate) fn execution_error(
        command: String,
        action: ActionIdentifier,
        error: &HandlerError,
    ) -> Self {
        DispatchOutcome::ExecutionError {
            command,
            action,
            error: error.to_string(),
        }
    }

    pub fn kind(&self) -> OutcomeKind {
        match self {
            DispatchOutcome::SkippedParseError { .. } => OutcomeKind::SkippedParseError,
            DispatchOutcome::Denied { .. } => OutcomeKind::Denied,
            DispatchOutcome::ExecutionError { .. } => OutcomeKind::ExecutionError,
            DispatchOutcome::Succeeded { .. } => OutcomeKind::Succeeded,
        }
    }

    /// The command line as extracted from the comment (marker removed).
    pub fn command(&self) -> &str {
        match self {
            DispatchOutcome::SkippedParseError { command, .. }
            | DispatchOutcome::Denied { command, .. }
            | DispatchOutcome::ExecutionError { command, .. }
            | DispatchOutcome::Succeeded { command, .. } => command,
        }
    }

    /// The resolved action; `None` when the line never resolved.
    pub fn action(&self) -> Option<&ActionIdentifier> {
        match self {
            DispatchOutcome::SkippedParseError { .. } => None,
            DispatchOutcome::Denied { action, .. }
            | DispatchOutcome::ExecutionError { action, .. }
            | DispatchOutcome::Succeeded { action, .. } => Some(action),
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            DispatchOutcome::SkippedParseError { reason, .. }
            | DispatchOutcome::Denied { reason, .. } => Some(reason),
            DispatchOutcome::ExecutionError { error, .. } => Some(error),
            DispatchOutcome::Succeeded { .. } => None,
        }
    }
}

impl fmt::Display for DispatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind(), self.command())?;
        if let Some(reason) = self.reason() {
            write!(f, " ({reason})")?;
        }
        Ok(())
    }
}
