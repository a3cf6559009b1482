use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::github::IssueCommentEvent;

/// Caller-supplied cancellation signal, shared by every stage of a batch.
///
/// Fires when [`cancel`](Self::cancel) is called on any clone, or when the
/// optional deadline passes.
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl Cancellation {
    /// A signal that only fires when cancelled explicitly.
    pub fn new() -> Self {
        Self::default()
    }

    /// A signal that also fires once `timeout` has elapsed.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            flag: Arc::default(),
            deadline: Instant::now().checked_add(timeout),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst) || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Time left before the deadline, if there is one.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }
}

/// What a command handler gets to see besides its arguments.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionContext<'a> {
    /// The event that carried the command.
    pub event: &'a IssueCommentEvent,
    pub cancellation: &'a Cancellation,
    /// Log the side effect instead of performing it.
    pub dry_run: bool,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(event: &'a IssueCommentEvent, cancellation: &'a Cancellation) -> Self {
        Self {
            event,
            cancellation,
            dry_run: false,
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_signal_is_not_cancelled() {
        let cancel = Cancellation::new();
        assert!(!cancel.is_cancelled());
        assert!(cancel.remaining().is_none());
    }

    #[test]
    fn cancel_is_visible_through_clones() {
        let cancel = Cancellation::new();
        let observer = cancel.clone();
        cancel.cancel();
        assert!(observer.is_cancelled());
    }

    #[test]
    fn elapsed_deadline_cancels() {
        let cancel = Cancellation::with_timeout(Duration::ZERO);
        assert!(cancel.is_cancelled());
        assert_eq!(cancel.remaining(), Some(Duration::ZERO));
    }

    #[test]
    fn future_deadline_does_not_cancel() {
        let cancel = Cancellation::with_timeout(Duration::from_secs(3600));
        assert!(!cancel.is_cancelled());
        assert!(cancel.remaining().is_some_and(|r| r > Duration::from_secs(3000)));
    }
}
