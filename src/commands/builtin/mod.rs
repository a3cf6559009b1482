//! The commands available out of the box. Each one maps to a single GitHub
//! API call against the issue or pull request the comment was posted on.

mod assign;
mod close;
mod label;
mod workflow;

use std::sync::Arc;

pub use assign::{AssignHandler, Assignee, UnassignHandler};
pub use close::CloseHandler;
pub use label::{AddLabelHandler, RemoveLabelHandler};
pub use workflow::WorkflowRunHandler;

use super::{Arity, CommandNode, CommandTree, CommandTreeError, HandlerError};
use crate::dispatch::ExecutionContext;
use crate::github::IssueApi;

/// Canonical names of every built-in command, in registration order.
pub const BUILTIN_COMMANDS: &[&str] = &[
    "close",
    "add-label",
    "remove-label",
    "assign",
    "self-assign",
    "unassign",
    "self-unassign",
    "workflow-run",
];

/// Build the node for one built-in command, or `None` if `name` is not one.
pub fn builtin_command(name: &str, api: &Arc<dyn IssueApi>) -> Option<CommandNode> {
    let api = Arc::clone(api);
    let node = match name {
        "close" => CommandNode::leaf("close", Arity::at_most(1), CloseHandler::new(api))
            .summary("Close the issue, optionally with a reason"),
        "add-label" => CommandNode::leaf("add-label", Arity::exact(1), AddLabelHandler::new(api))
            .alias("label")
            .summary("Add a label"),
        "remove-label" => {
            CommandNode::leaf("remove-label", Arity::exact(1), RemoveLabelHandler::new(api))
                .summary("Remove a label")
        }
        "assign" => CommandNode::leaf(
            "assign",
            Arity::exact(1),
            AssignHandler::new(api, Assignee::Argument),
        )
        .summary("Assign a user"),
        "self-assign" => CommandNode::leaf(
            "self-assign",
            Arity::NONE,
            AssignHandler::new(api, Assignee::Author),
        )
        .summary("Assign the comment author"),
        "unassign" => CommandNode::leaf(
            "unassign",
            Arity::exact(1),
            UnassignHandler::new(api, Assignee::Argument),
        )
        .summary("Unassign a user"),
        "self-unassign" => CommandNode::leaf(
            "self-unassign",
            Arity::NONE,
            UnassignHandler::new(api, Assignee::Author),
        )
        .summary("Unassign the comment author"),
        "workflow-run" => CommandNode::leaf(
            "workflow-run",
            Arity::at_least(1),
            WorkflowRunHandler::new(api),
        )
        .summary("Dispatch a workflow on the pull request's head branch"),
        _ => return None,
    };
    Some(node)
}

/// Build a command tree holding the `enabled` built-ins.
///
/// Unknown names are skipped with a warning so a stale config entry does not
/// take the whole tool down.
pub fn command_tree(
    api: Arc<dyn IssueApi>,
    enabled: &[String],
) -> Result<CommandTree, CommandTreeError> {
    let mut tree = CommandTree::new();
    for name in enabled {
        match builtin_command(name, &api) {
            Some(node) => tree.register(node)?,
            None => log::warn!("ignoring unknown built-in command in config: {name}"),
        }
    }
    Ok(tree)
}

/// Log a side effect that dry-run mode suppresses. Returns `true` when the
/// caller should stop.
fn skipped_for_dry_run(ctx: &ExecutionContext<'_>, effect: &str) -> bool {
    if ctx.dry_run {
        log::info!("dry run: would {effect}");
    }
    ctx.dry_run
}

fn ensure_not_cancelled(ctx: &ExecutionContext<'_>) -> Result<(), HandlerError> {
    if ctx.cancellation.is_cancelled() {
        return Err(HandlerError::Cancelled);
    }
    Ok(())
}
