//! Per-event dispatch: scan the comment, then parse, resolve, authorize and
//! execute each command line in order.
//!
//! Batch policy:
//! - a line that does not parse or resolve is skipped and the batch continues;
//! - a denied line (including a decision error or cancellation during
//!   authorization) is recorded and the batch continues;
//! - a handler error stops the batch, and later lines are not attempted.

mod context;
mod outcome;

pub use context::{Cancellation, ExecutionContext};
pub use outcome::{DispatchOutcome, OutcomeKind};

use std::sync::Arc;

use cedar_policy::PolicySet;

use crate::authz::{
    AuthorizationContext, Decision, EntityGraph, EntityLoader, PolicyDecisionPoint, PolicyLoader,
};
use crate::commands::{CommandTree, HandlerError};
use crate::github::IssueCommentEvent;
use crate::logging::AuditLog;
use crate::parse::{CommandLine, Scanner, parse};

/// The dispatcher was wired incompletely.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("no policy decision point configured")]
    MissingDecisionPoint,
    #[error("no command tree configured")]
    MissingCommandTree,
    #[error("failed to load policies: {0}")]
    Policies(#[source] crate::authz::LoadError),
    #[error("failed to load entities: {0}")]
    Entities(#[source] crate::authz::LoadError),
}

/// A handler failed; the batch stopped at `command`.
#[derive(Debug, thiserror::Error)]
#[error("command {command:?} failed: {error}")]
pub struct BatchAborted {
    /// Outcomes up to and including the failed command.
    pub outcomes: Vec<DispatchOutcome>,
    pub command: String,
    #[source]
    pub error: HandlerError,
}

/// Runs extracted commands through authorize-then-execute.
///
/// The command tree, policies and static entities are read-only once built,
/// so one dispatcher can serve many events.
pub struct Dispatcher {
    tree: Arc<CommandTree>,
    pdp: Arc<dyn PolicyDecisionPoint>,
    policies: PolicySet,
    entities: EntityGraph,
    audit: AuditLog,
    scanner: Scanner,
    dry_run: bool,
}

impl Dispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::default()
    }

    pub fn tree(&self) -> &CommandTree {
        &self.tree
    }

    pub fn policies(&self) -> &PolicySet {
        &self.policies
    }

    /// Dispatch every command line in `text`, in line order.
    pub fn dispatch_batch(
        &self,
        event: &IssueCommentEvent,
        text: &str,
        cancel: &Cancellation,
    ) -> Result<Vec<DispatchOutcome>, BatchAborted> {
        let authz = AuthorizationContext::from_event(event, &self.entities);
        let ctx = ExecutionContext::new(event, cancel).dry_run(self.dry_run);
        let mut outcomes = Vec::new();

        for line in self.scanner.commands(text) {
            let result = self.dispatch_line(&authz, &ctx, &line);
            let outcome = match &result {
                Ok(outcome) => outcome.clone(),
                Err((outcome, _)) => outcome.clone(),
            };
            self.audit
                .record(authz.principal(), authz.resource(), &outcome);
            outcomes.push(outcome);

            if let Err((_, error)) = result {
                log::error!("command {:?} failed, stopping: {error}", line.as_str());
                return Err(BatchAborted {
                    outcomes,
                    command: line.as_str().to_string(),
                    error,
                });
            }
        }

        Ok(outcomes)
    }

    /// Dispatch the body of the event's comment.
    pub fn dispatch_event(
        &self,
        event: &IssueCommentEvent,
        cancel: &Cancellation,
    ) -> Result<Vec<DispatchOutcome>, BatchAborted> {
        self.dispatch_batch(event, event.body(), cancel)
    }

    fn dispatch_line(
        &self,
        authz: &AuthorizationContext,
        ctx: &ExecutionContext<'_>,
        line: &CommandLine,
    ) -> Result<DispatchOutcome, (DispatchOutcome, HandlerError)> {
        let command = line.as_str().to_string();

        let argv = match parse(line.as_str()) {
            Ok(argv) => argv,
            Err(e) => {
                log::warn!("skipping unparsable command {command:?}: {e}");
                return Ok(DispatchOutcome::SkippedParseError {
                    command,
                    reason: e.to_string(),
                });
            }
        };
        let resolved = match self.tree.resolve(&argv) {
            Ok(resolved) => resolved,
            Err(e) => {
                log::warn!("skipping command {command:?}: {e}");
                return Ok(DispatchOutcome::SkippedParseError {
                    command,
                    reason: e.to_string(),
                });
            }
        };
        let action = resolved.action().clone();

        let request = authz.request(&action);
        log::debug!(
            "authorizing principal={} action={} resource={}",
            request.principal,
            request.action,
            request.resource
        );
        let decision = self
            .pdp
            .decide(&request, authz.entities(), &self.policies, ctx.cancellation);
        match decision {
            Ok(Decision::Allow) => {}
            Ok(Decision::Deny) => {
                let reason = request.denial_message();
                log::warn!("{reason}");
                return Ok(DispatchOutcome::Denied {
                    command,
                    action,
                    reason,
                });
            }
            Err(e) => {
                let reason = request.denial_message();
                log::warn!("{reason} (decision failed: {e})");
                return Ok(DispatchOutcome::Denied {
                    command,
                    action,
                    reason,
                });
            }
        }

        if ctx.cancellation.is_cancelled() {
            let error = HandlerError::Cancelled;
            return Err((
                DispatchOutcome::execution_error(command, action, &error),
                error,
            ));
        }

        log::info!("executing {action} with {} argument(s)", resolved.args().len());
        match resolved.handler().execute(ctx, resolved.args()) {
            Ok(()) => Ok(DispatchOutcome::Succeeded { command, action }),
            Err(error) => Err((
                DispatchOutcome::execution_error(command, action, &error),
                error,
            )),
        }
    }
}

/// Wires a [`Dispatcher`]. A policy decision point and a command tree are
/// required; everything else has a default (no policies means default-deny).
#[derive(Default)]
pub struct DispatcherBuilder {
    tree: Option<Arc<CommandTree>>,
    pdp: Option<Arc<dyn PolicyDecisionPoint>>,
    policies: Option<PolicySet>,
    policy_loader: Option<Box<dyn PolicyLoader>>,
    entity_loader: Option<Box<dyn EntityLoader>>,
    audit: Option<AuditLog>,
    marker: Option<char>,
    dry_run: bool,
}

impl DispatcherBuilder {
    pub fn tree(mut self, tree: impl Into<Arc<CommandTree>>) -> Self {
        self.tree = Some(tree.into());
        self
    }

    pub fn decision_point(mut self, pdp: Arc<dyn PolicyDecisionPoint>) -> Self {
        self.pdp = Some(pdp);
        self
    }

    /// Use an already loaded policy set. Takes precedence over a loader.
    pub fn policies(mut self, policies: PolicySet) -> Self {
        self.policies = Some(policies);
        self
    }

    pub fn policy_loader(mut self, loader: impl PolicyLoader + 'static) -> Self {
        self.policy_loader = Some(Box::new(loader));
        self
    }

    /// Static entities, consulted after the event-derived ones.
    pub fn entity_loader(mut self, loader: impl EntityLoader + 'static) -> Self {
        self.entity_loader = Some(Box::new(loader));
        self
    }

    pub fn audit_log(mut self, audit: AuditLog) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn marker(mut self, marker: char) -> Self {
        self.marker = Some(marker);
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn build(self) -> Result<Dispatcher, BuildError> {
        let pdp = self.pdp.ok_or(BuildError::MissingDecisionPoint)?;
        let tree = self.tree.ok_or(BuildError::MissingCommandTree)?;

        let policies = match (self.policies, self.policy_loader) {
            (Some(policies), _) => policies,
            (None, Some(loader)) => loader.load().map_err(BuildError::Policies)?,
            (None, None) => {
                log::warn!("no policy loader available, all authorization requests will be denied");
                PolicySet::new()
            }
        };
        let entities = match self.entity_loader {
            Some(loader) => loader.load().map_err(BuildError::Entities)?,
            None => EntityGraph::new(),
        };

        Ok(Dispatcher {
            tree,
            pdp,
            policies,
            entities,
            audit: self.audit.unwrap_or_default(),
            scanner: self.marker.map(Scanner::new).unwrap_or_default(),
            dry_run: self.dry_run,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::authz::{AuthorizationRequest, DecisionError};
    use crate::commands::{Arity, CommandNode};

    /// Allows a fixed set of action ids; records every request it sees.
    #[derive(Default)]
    struct ListPdp {
        allow: Vec<&'static str>,
        fail: bool,
        seen: Mutex<Vec<String>>,
    }

    impl PolicyDecisionPoint for ListPdp {
        fn decide(
            &self,
            request: &AuthorizationRequest,
            _entities: &EntityGraph,
            _policies: &PolicySet,
            cancel: &Cancellation,
        ) -> Result<Decision, DecisionError> {
            self.seen.lock().unwrap().push(request.action.id.clone());
            if cancel.is_cancelled() {
                return Err(DecisionError::Cancelled);
            }
            if self.fail {
                return Err(DecisionError::Evaluation {
                    errors: vec!["boom".into()],
                    permitted: true,
                });
            }
            Ok(if self.allow.contains(&request.action.id.as_str()) {
                Decision::Allow
            } else {
                Decision::Deny
            })
        }
    }

    type Calls = Arc<Mutex<Vec<String>>>;

    fn recording(calls: Calls, name: &'static str) -> impl crate::commands::CommandHandler {
        move |_: &ExecutionContext<'_>, args: &[String]| -> Result<(), HandlerError> {
            calls.lock().unwrap().push(format!("{name} {}", args.join(",")));
            Ok(())
        }
    }

    fn failing(_: &ExecutionContext<'_>, _: &[String]) -> Result<(), HandlerError> {
        Err(HandlerError::Unsupported("always fails".into()))
    }

    fn tree(calls: &Calls) -> CommandTree {
        CommandTree::new()
            .with(CommandNode::leaf("close", Arity::at_most(1), recording(calls.clone(), "close")))
            .unwrap()
            .with(CommandNode::leaf("label", Arity::exact(1), recording(calls.clone(), "label")))
            .unwrap()
            .with(CommandNode::leaf("explode", Arity::NONE, failing))
            .unwrap()
    }

    fn dispatcher(calls: &Calls, pdp: ListPdp) -> Dispatcher {
        Dispatcher::builder()
            .tree(tree(calls))
            .decision_point(Arc::new(pdp))
            .build()
            .unwrap()
    }

    fn allow(actions: &[&'static str]) -> ListPdp {
        ListPdp {
            allow: actions.to_vec(),
            ..Default::default()
        }
    }

    fn event() -> IssueCommentEvent {
        IssueCommentEvent::from_json(
            r#"{"comment":{"body":"","user":{"login":"octocat"}},
                "issue":{"number":1},
                "repository":{"name":"widgets","owner":{"login":"acme"}}}"#,
        )
        .unwrap()
    }

    fn kinds(outcomes: &[DispatchOutcome]) -> Vec<OutcomeKind> {
        outcomes.iter().map(DispatchOutcome::kind).collect()
    }

    #[test]
    fn build_requires_decision_point() {
        let calls = Calls::default();
        let err = Dispatcher::builder().tree(tree(&calls)).build().err().unwrap();
        assert!(matches!(err, BuildError::MissingDecisionPoint));
    }

    #[test]
    fn allowed_command_runs_with_its_arguments() {
        let calls = Calls::default();
        let d = dispatcher(&calls, allow(&["close"]));
        let out = d
            .dispatch_batch(&event(), "/close wontfix", &Cancellation::new())
            .unwrap();
        assert_eq!(kinds(&out), [OutcomeKind::Succeeded]);
        assert_eq!(*calls.lock().unwrap(), ["close wontfix"]);
    }

    #[test]
    fn denied_command_does_not_run_and_batch_continues() {
        let calls = Calls::default();
        let d = dispatcher(&calls, allow(&["label"]));
        let out = d
            .dispatch_batch(&event(), "/close\n/label bug", &Cancellation::new())
            .unwrap();
        assert_eq!(kinds(&out), [OutcomeKind::Denied, OutcomeKind::Succeeded]);
        assert_eq!(*calls.lock().unwrap(), ["label bug"]);
        assert_eq!(
            out[0].reason().unwrap(),
            r#"principal GitHub::User::"octocat" is not authorized to perform GitHub::Action::"close" on GitHub::Issue::"acme/widgets#1""#
        );
    }

    #[test]
    fn decision_error_is_a_denial() {
        let calls = Calls::default();
        let pdp = ListPdp {
            allow: vec!["close"],
            fail: true,
            ..Default::default()
        };
        let d = dispatcher(&calls, pdp);
        let out = d.dispatch_batch(&event(), "/close", &Cancellation::new()).unwrap();
        assert_eq!(kinds(&out), [OutcomeKind::Denied]);
        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn parse_and_resolution_errors_are_skipped() {
        let calls = Calls::default();
        let d = dispatcher(&calls, allow(&["close", "label"]));
        let text = "/close \"unterminated\n/unknown\n/label\n/label a b\n/close done";
        let out = d.dispatch_batch(&event(), text, &Cancellation::new()).unwrap();
        assert_eq!(
            kinds(&out),
            [
                OutcomeKind::SkippedParseError,
                OutcomeKind::SkippedParseError,
                OutcomeKind::SkippedParseError,
                OutcomeKind::SkippedParseError,
                OutcomeKind::Succeeded,
            ]
        );
        assert_eq!(*calls.lock().unwrap(), ["close done"]);
    }

    #[test]
    fn handler_error_aborts_remaining_lines() {
        let calls = Calls::default();
        let d = dispatcher(&calls, allow(&["close", "explode"]));
        let err = d
            .dispatch_batch(&event(), "/close\n/explode\n/close again", &Cancellation::new())
            .unwrap_err();
        assert_eq!(err.command, "explode");
        assert!(matches!(err.error, HandlerError::Unsupported(_)));
        assert_eq!(
            kinds(&err.outcomes),
            [OutcomeKind::Succeeded, OutcomeKind::ExecutionError]
        );
        assert_eq!(*calls.lock().unwrap(), ["close "]);
    }

    #[test]
    fn cancellation_denies_instead_of_running() {
        let calls = Calls::default();
        let d = dispatcher(&calls, allow(&["close"]));
        let cancel = Cancellation::new();
        cancel.cancel();
        let out = d.dispatch_batch(&event(), "/close", &cancel).unwrap();
        assert_eq!(kinds(&out), [OutcomeKind::Denied]);
        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn custom_marker_is_used() {
        let calls = Calls::default();
        let d = Dispatcher::builder()
            .tree(tree(&calls))
            .decision_point(Arc::new(allow(&["close"])))
            .marker('!')
            .build()
            .unwrap();
        let out = d
            .dispatch_batch(&event(), "/close\n!close", &Cancellation::new())
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].command(), "close");
    }

    #[test]
    fn text_without_commands_yields_nothing() {
        let calls = Calls::default();
        let pdp = allow(&["close"]);
        let d = dispatcher(&calls, pdp);
        let out = d
            .dispatch_batch(&event(), "looks good to me\n/ close", &Cancellation::new())
            .unwrap();
        assert!(out.is_empty());
    }
}
