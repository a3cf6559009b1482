use std::collections::BTreeMap;
use std::sync::Arc;

use super::{ensure_not_cancelled, skipped_for_dry_run};
use crate::commands::{CommandHandler, HandlerError};
use crate::dispatch::ExecutionContext;
use crate::github::IssueApi;

/// `workflow-run <workflow-file> [key=value ...]`: dispatch a workflow on the
/// head branch of the pull request the comment was posted on.
pub struct WorkflowRunHandler {
    api: Arc<dyn IssueApi>,
}

impl WorkflowRunHandler {
    pub fn new(api: Arc<dyn IssueApi>) -> Self {
        Self { api }
    }
}

/// Split `key=value` arguments into workflow inputs. The value may itself
/// contain `=`; the key may not be empty.
fn parse_inputs(args: &[String]) -> Result<BTreeMap<String, String>, HandlerError> {
    args.iter()
        .map(|arg| match arg.split_once('=') {
            Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
            _ => Err(HandlerError::InvalidArgument(format!(
                "invalid input: {arg:?}"
            ))),
        })
        .collect()
}

/// A workflow is named by its file name or numeric id, never by a path.
fn check_workflow_name(workflow: &str) -> Result<(), HandlerError> {
    let invalid = workflow.is_empty()
        || matches!(workflow, "." | "..")
        || workflow.contains(['/', '\\', '?', '#']);
    if invalid {
        return Err(HandlerError::InvalidArgument(format!(
            "invalid workflow name: {workflow:?}"
        )));
    }
    Ok(())
}

impl CommandHandler for WorkflowRunHandler {
    fn execute(&self, ctx: &ExecutionContext<'_>, args: &[String]) -> Result<(), HandlerError> {
        ensure_not_cancelled(ctx)?;
        let Some((workflow, rest)) = args.split_first() else {
            return Err(HandlerError::InvalidArgument(
                "missing workflow file".into(),
            ));
        };
        check_workflow_name(workflow)?;
        let issue = &ctx.event.issue;
        if !issue.is_pull_request() {
            return Err(HandlerError::Unsupported(format!(
                "#{} is not a pull request; workflows run on pull request branches",
                issue.number
            )));
        }
        let inputs = parse_inputs(rest)?;

        let repo = &ctx.event.repository;
        let git_ref = self
            .api
            .pull_request_head_ref(ctx.cancellation, repo, issue.number)?;
        let effect = format!(
            "dispatch {workflow} on {git_ref} with {} input(s)",
            inputs.len()
        );
        if skipped_for_dry_run(ctx, &effect) {
            return Ok(());
        }
        log::info!("{effect}");
        self.api
            .dispatch_workflow(ctx.cancellation, repo, workflow, &git_ref, &inputs)?;
        Ok(())
    }
}
