use std::sync::Arc;

use super::{ensure_not_cancelled, skipped_for_dry_run};
use crate::commands::{CommandHandler, HandlerError};
use crate::dispatch::ExecutionContext;
use crate::github::IssueApi;

/// `close [reason]`: close the issue or pull request. The optional reason is
/// sent as GitHub's `state_reason` (`completed`, `not_planned`, ...).
pub struct CloseHandler {
    api: Arc<dyn IssueApi>,
}

impl CloseHandler {
    pub fn new(api: Arc<dyn IssueApi>) -> Self {
        Self { api }
    }
}

impl CommandHandler for CloseHandler {
    fn execute(&self, ctx: &ExecutionContext<'_>, args: &[String]) -> Result<(), HandlerError> {
        ensure_not_cancelled(ctx)?;
        let number = ctx.event.issue.number;
        let reason = args.first().map(String::as_str);
        let effect = match reason {
            Some(reason) => format!("close #{number} as {reason}"),
            None => format!("close #{number}"),
        };
        if skipped_for_dry_run(ctx, &effect) {
            return Ok(());
        }
        log::info!("{effect}");
        self.api
            .close_issue(ctx.cancellation, &ctx.event.repository, number, reason)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::builtin::fake::{RecordingApi, event};
    use crate::dispatch::Cancellation;

    fn run(api: &Arc<RecordingApi>, args: &[&str], dry_run: bool) -> Result<(), HandlerError> {
        let event = event(false);
        let cancel = Cancellation::new();
        let ctx = ExecutionContext::new(&event, &cancel).dry_run(dry_run);
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        CloseHandler::new(api.clone()).execute(&ctx, &args)
    }

    #[test]
    fn closes_with_reason() {
        let api = Arc::new(RecordingApi::default());
        run(&api, &["wontfix"], false).unwrap();
        assert_eq!(api.calls(), ["close acme/widgets#42 Some(\"wontfix\")"]);
    }

    #[test]
    fn closes_without_reason() {
        let api = Arc::new(RecordingApi::default());
        run(&api, &[], false).unwrap();
        assert_eq!(api.calls(), ["close acme/widgets#42 None"]);
    }

    #[test]
    fn dry_run_makes_no_call() {
        let api = Arc::new(RecordingApi::default());
        run(&api, &["completed"], true).unwrap();
        assert!(api.calls().is_empty());
    }

    #[test]
    fn api_failure_is_reported() {
        let api = Arc::new(RecordingApi {
            fail_with_status: Some(403),
            ..Default::default()
        });
        let err = run(&api, &[], false).unwrap_err();
        assert!(matches!(err, HandlerError::Api(_)));
    }

    #[test]
    fn cancelled_context_is_not_executed() {
        let api = Arc::new(RecordingApi::default());
        let event = event(false);
        let cancel = Cancellation::new();
        cancel.cancel();
        let ctx = ExecutionContext::new(&event, &cancel);
        let err = CloseHandler::new(api.clone()).execute(&ctx, &[]).unwrap_err();
        assert!(matches!(err, HandlerError::Cancelled));
        assert!(api.calls().is_empty());
    }
}
