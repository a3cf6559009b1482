//! The `issue_comment` webhook payload, reduced to the fields the pipeline uses.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The only event name the binary accepts.
pub const ISSUE_COMMENT_EVENT: &str = "issue_comment";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct User {
    pub login: String,
    #[serde(default)]
    pub id: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Label {
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Comment {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub body: Option<String>,
    pub user: User,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Issue {
    #[serde(default)]
    pub id: u64,
    pub number: u64,
    #[serde(default)]
    pub labels: Vec<Label>,
    /// Present (with API links) when the issue is a pull request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_request: Option<Value>,
}

impl Issue {
    pub fn is_pull_request(&self) -> bool {
        self.pull_request.is_some()
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Repository {
    pub name: String,
    pub owner: User,
}

impl Repository {
    /// `owner/name`.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner.login, self.name)
    }
}

/// A comment was created or edited on an issue or pull request.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct IssueCommentEvent {
    #[serde(default)]
    pub action: Option<String>,
    pub comment: Comment,
    pub issue: Issue,
    pub repository: Repository,
}

impl IssueCommentEvent {
    /// Decode an event payload.
    pub fn from_json(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }

    /// The comment text, empty when the payload has none.
    pub fn body(&self) -> &str {
        self.comment.body.as_deref().unwrap_or_default()
    }

    /// Login of the comment author.
    pub fn author(&self) -> &str {
        &self.comment.user.login
    }
}
