//! GitHub integration: the triggering event payload and the REST client.

pub mod client;
pub mod event;

pub use client::{ApiError, GithubClient, IssueApi};
pub use event::{Comment, ISSUE_COMMENT_EVENT, Issue, IssueCommentEvent, Label, Repository, User};
