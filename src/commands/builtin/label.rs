use std::sync::Arc;

use super::{ensure_not_cancelled, skipped_for_dry_run};
use crate::commands::{CommandHandler, HandlerError};
use crate::dispatch::ExecutionContext;
use crate::github::IssueApi;

fn label_argument(args: &[String]) -> Result<&str, HandlerError> {
    match args.first().map(|l| l.trim()) {
        Some(label) if !label.is_empty() => Ok(label),
        _ => Err(HandlerError::InvalidArgument("label name is empty".into())),
    }
}

/// `add-label <name>` (alias `label`).
pub struct AddLabelHandler {
    api: Arc<dyn IssueApi>,
}

impl AddLabelHandler {
    pub fn new(api: Arc<dyn IssueApi>) -> Self {
        Self { api }
    }
}

impl CommandHandler for AddLabelHandler {
    fn execute(&self, ctx: &ExecutionContext<'_>, args: &[String]) -> Result<(), HandlerError> {
        ensure_not_cancelled(ctx)?;
        let label = label_argument(args)?;
        let number = ctx.event.issue.number;
        let effect = format!("add label {label:?} to #{number}");
        if skipped_for_dry_run(ctx, &effect) {
            return Ok(());
        }
        log::info!("{effect}");
        self.api.add_labels(
            ctx.cancellation,
            &ctx.event.repository,
            number,
            &[label.to_string()],
        )?;
        Ok(())
    }
}

/// `remove-label <name>`.
pub struct RemoveLabelHandler {
    api: Arc<dyn IssueApi>,
}

impl RemoveLabelHandler {
    pub fn new(api: Arc<dyn IssueApi>) -> Self {
        Self { api }
    }
}

impl CommandHandler for RemoveLabelHandler {
    fn execute(&self, ctx: &ExecutionContext<'_>, args: &[String]) -> Result<(), HandlerError> {
        ensure_not_cancelled(ctx)?;
        let label = label_argument(args)?;
        let number = ctx.event.issue.number;
        let effect = format!("remove label {label:?} from #{number}");
        if skipped_for_dry_run(ctx, &effect) {
            return Ok(());
        }
        log::info!("{effect}");
        self.api
            .remove_label(ctx.cancellation, &ctx.event.repository, number, label)?;
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
    fn adds_label_with_spaces() {
        let api = Arc::new(RecordingApi::default());
        run(&AddLabelHandler::new(api.clone()), &["help wanted"]).unwrap();
        assert_eq!(api.calls(), [r#"add-labels acme/widgets#42 ["help wanted"]"#]);
    }

    #[test]
    fn removes_label() {
        let api = Arc::new(RecordingApi::default());
        run(&RemoveLabelHandler::new(api.clone()), &["bug"]).unwrap();
        assert_eq!(api.calls(), ["remove-label acme/widgets#42 bug"]);
    }

    #[test]
    fn blank_label_is_rejected_without_a_call() {
        let api = Arc::new(RecordingApi::default());
        let err = run(&AddLabelHandler::new(api.clone()), &["  "]).unwrap_err();
        assert!(matches!(err, HandlerError::InvalidArgument(_)));
        assert!(api.calls().is_empty());
    }
}
