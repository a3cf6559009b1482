use std::sync::Arc;

use super::{ensure_not_cancelled, skipped_for_dry_run};
use crate::commands::{CommandHandler, HandlerError};
use crate::dispatch::ExecutionContext;
use crate::github::IssueApi;

/// Who an assignment command targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assignee {
    /// The login given as the first argument. A leading `@` is dropped.
    Argument,
    /// The author of the comment.
    Author,
}

impl Assignee {
    fn login(self, ctx: &ExecutionContext<'_>, args: &[String]) -> Result<String, HandlerError> {
        let login = match self {
            Assignee::Argument => args
                .first()
                .map(|a| a.trim().trim_start_matches('@'))
                .unwrap_or_default(),
            Assignee::Author => ctx.event.author(),
        };
        if login.is_empty() {
            return Err(HandlerError::InvalidArgument("user login is empty".into()));
        }
        Ok(login.to_string())
    }
}

/// `assign <login>` and `self-assign`.
pub struct AssignHandler {
    api: Arc<dyn IssueApi>,
    assignee: Assignee,
}

impl AssignHandler {
    pub fn new(api: Arc<dyn IssueApi>, assignee: Assignee) -> Self {
        Self { api, assignee }
    }
}

impl CommandHandler for AssignHandler {
    fn execute(&self, ctx: &ExecutionContext<'_>, args: &[String]) -> Result<(), HandlerError> {
        ensure_not_cancelled(ctx)?;
        let login = self.assignee.login(ctx, args)?;
        let number = ctx.event.issue.number;
        let effect = format!("assign {login} to #{number}");
        if skipped_for_dry_run(ctx, &effect) {
            return Ok(());
        }
        log::info!("{effect}");
        self.api
            .add_assignees(ctx.cancellation, &ctx.event.repository, number, &[login])?;
        Ok(())
    }
}

/// `unassign <login>` and `self-unassign`.
pub struct UnassignHandler {
    api: Arc<dyn IssueApi>,
    assignee: Assignee,
}

impl UnassignHandler {
    pub fn new(api: Arc<dyn IssueApi>, assignee: Assignee) -> Self {
        Self { api, assignee }
    }
}

impl CommandHandler for UnassignHandler {
    fn execute(&self, ctx: &ExecutionContext<'_>, args: &[String]) -> Result<(), HandlerError> {
        ensure_not_cancelled(ctx)?;
        let login = self.assignee.login(ctx, args)?;
        let number = ctx.event.issue.number;
        let effect = format!("unassign {login} from #{number}");
        if skipped_for_dry_run(ctx, &effect) {
            return Ok(());
        }
        log::info!("{effect}");
        self.api
            .remove_assignees(ctx.cancellation, &ctx.event.repository, number, &[login])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::builtin::fake::{RecordingApi, event};
    use crate::dispatch::Cancellation;

    fn run(handler: &dyn CommandHandler, args: &[&str]) -> Result<(), HandlerError> {
        let event = event(false);
        let cancel = Cancellation::new();
        let ctx = ExecutionContext::new(&event, &cancel);
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        handler.execute(&ctx, &args)
    }

    #[test]
    fn assigns_named_user() {
        let api = Arc::new(RecordingApi::default());
        run(&AssignHandler::new(api.clone(), Assignee::Argument), &["@hubot"]).unwrap();
        assert_eq!(api.calls(), [r#"add-assignees acme/widgets#42 ["hubot"]"#]);
    }

    #[test]
    fn self_assign_uses_comment_author() {
        let api = Arc::new(RecordingApi::default());
        run(&AssignHandler::new(api.clone(), Assignee::Author), &[]).unwrap();
        assert_eq!(api.calls(), [r#"add-assignees acme/widgets#42 ["octocat"]"#]);
    }

    #[test]
    fn unassigns_author() {
        let api = Arc::new(RecordingApi::default());
        run(&UnassignHandler::new(api.clone(), Assignee::Author), &[]).unwrap();
        assert_eq!(api.calls(), [r#"remove-assignees acme/widgets#42 ["octocat"]"#]);
    }

    #[test]
    fn bare_at_sign_is_rejected() {
        let api = Arc::new(RecordingApi::default());
        let err = run(&UnassignHandler::new(api.clone(), Assignee::Argument), &["@"]).unwrap_err();
        assert!(matches!(err, HandlerError::InvalidArgument(_)));
        assert!(api.calls().is_empty());
    }
}
