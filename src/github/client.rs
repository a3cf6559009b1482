//! GitHub REST client used by the built-in command handlers and the remote
//! configuration source.

use std::collections::BTreeMap;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::json;

use super::event::Repository;
use crate::config::GithubConfig;
use crate::dispatch::Cancellation;

const MAX_ERROR_BODY_CHARS: usize = 200;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("request cancelled")]
    Cancelled,
    #[error("invalid github client configuration: {0}")]
    Config(String),
    #[error("refusing to use {0:?} as a github api path segment")]
    PathSegment(String),
    #[error("github {operation} failed: {source}")]
    Transport {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("github {operation} failed with status {status}: {body}")]
    Status {
        operation: &'static str,
        status: u16,
        body: String,
    },
}

/// Issue and pull request operations the built-in commands need.
///
/// Every call receives the caller's cancellation signal and must not start a
/// request once it has fired.
pub trait IssueApi: Send + Sync {
    fn close_issue(
        &self,
        cancel: &Cancellation,
        repo: &Repository,
        number: u64,
        reason: Option<&str>,
    ) -> Result<(), ApiError>;

    fn add_labels(
        &self,
        cancel: &Cancellation,
        repo: &Repository,
        number: u64,
        labels: &[String],
    ) -> Result<(), ApiError>;

    fn remove_label(
        &self,
        cancel: &Cancellation,
        repo: &Repository,
        number: u64,
        label: &str,
    ) -> Result<(), ApiError>;

    fn add_assignees(
        &self,
        cancel: &Cancellation,
        repo: &Repository,
        number: u64,
        assignees: &[String],
    ) -> Result<(), ApiError>;

    fn remove_assignees(
        &self,
        cancel: &Cancellation,
        repo: &Repository,
        number: u64,
        assignees: &[String],
    ) -> Result<(), ApiError>;

    /// The head branch of a pull request.
    fn pull_request_head_ref(
        &self,
        cancel: &Cancellation,
        repo: &Repository,
        number: u64,
    ) -> Result<String, ApiError>;

    /// Trigger a `workflow_dispatch` run of `workflow` (a file name) on `git_ref`.
    fn dispatch_workflow(
        &self,
        cancel: &Cancellation,
        repo: &Repository,
        workflow: &str,
        git_ref: &str,
        inputs: &BTreeMap<String, String>,
    ) -> Result<(), ApiError>;
}

fn checked_segment(segment: &str) -> Result<&str, ApiError> {
    if segment.is_empty() || matches!(segment, "." | "..") {
        return Err(ApiError::PathSegment(segment.to_string()));
    }
    Ok(segment)
}

/// Blocking GitHub REST client.
#[derive(Clone)]
pub struct GithubClient {
    http: Client,
    api_base: Url,
}

impl GithubClient {
    /// Build a client; requests are anonymous when `token` is `None`.
    pub fn new(config: &GithubConfig, token: Option<&str>) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .map_err(|e| ApiError::Config(format!("invalid user agent: {e}")))?,
        );
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "x-github-api-version",
            HeaderValue::from_static("2022-11-28"),
        );
        if let Some(token) = token.map(str::trim).filter(|t| !t.is_empty()) {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| ApiError::Config(format!("invalid authorization header: {e}")))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let http = Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ApiError::Config(e.to_string()))?;

        let api_base = Url::parse(&config.api_base)
            .map_err(|e| ApiError::Config(format!("invalid api base {:?}: {e}", config.api_base)))?;
        if api_base.cannot_be_a_base() {
            return Err(ApiError::Config(format!(
                "api base {:?} cannot hold a path",
                config.api_base
            )));
        }

        Ok(Self { http, api_base })
    }

    /// `{api_base}/repos/{owner}/{name}/{segments...}`.
    ///
    /// Every segment is percent-encoded on its own, so a `/`, `?` or `#`
    /// inside one can never change the path, query or fragment. `.` and `..`
    /// are refused outright.
    fn repo_url<'s>(
        &self,
        repo: &Repository,
        segments: impl IntoIterator<Item = &'s str>,
    ) -> Result<Url, ApiError> {
        let mut url = self.api_base.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|()| ApiError::Config("api base cannot hold a path".into()))?;
            path.pop_if_empty()
                .push("repos")
                .push(checked_segment(&repo.owner.login)?)
                .push(checked_segment(&repo.name)?);
            for segment in segments {
                path.push(checked_segment(segment)?);
            }
        }
        Ok(url)
    }

    /// URL of a repository-relative file path for the contents API.
    fn contents_url(&self, repo: &Repository, path: &str) -> Result<Url, ApiError> {
        let parts = path.split('/').filter(|part| !part.is_empty());
        self.repo_url(repo, std::iter::once("contents").chain(parts))
    }

    fn send(
        &self,
        cancel: &Cancellation,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<Response, ApiError> {
        if cancel.is_cancelled() {
            return Err(ApiError::Cancelled);
        }
        let request = match cancel.remaining() {
            Some(remaining) => request.timeout(remaining),
            None => request,
        };

        log::debug!("github request: {operation}");
        let response = request
            .send()
            .map_err(|source| ApiError::Transport { operation, source })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().unwrap_or_default();
        Err(ApiError::Status {
            operation,
            status: status.as_u16(),
            body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
        })
    }

    /// Fetch a file from the repository's default branch as text.
    ///
    /// Returns `None` when the path does not exist.
    pub fn file_contents(
        &self,
        cancel: &Cancellation,
        repo: &Repository,
        path: &str,
    ) -> Result<Option<String>, ApiError> {
        let request = self
            .http
            .get(self.contents_url(repo, path)?)
            .header(ACCEPT, "application/vnd.github.raw+json");
        match self.send(cancel, "read contents", request) {
            Ok(response) => response
                .text()
                .map(Some)
                .map_err(|source| ApiError::Transport {
                    operation: "read contents",
                    source,
                }),
            Err(ApiError::Status { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// List the file names in a repository directory.
    ///
    /// Returns `None` when the path does not exist or is not a directory.
    pub fn directory_files(
        &self,
        cancel: &Cancellation,
        repo: &Repository,
        path: &str,
    ) -> Result<Option<Vec<String>>, ApiError> {
        #[derive(Deserialize)]
        struct Entry {
            name: String,
            #[serde(rename = "type")]
            kind: String,
        }

        let request = self.http.get(self.contents_url(repo, path)?);
        let response = match self.send(cancel, "list contents", request) {
            Ok(response) => response,
            Err(ApiError::Status { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let value: serde_json::Value =
            response.json().map_err(|source| ApiError::Transport {
                operation: "list contents",
                source,
            })?;
        let Ok(entries) = serde_json::from_value::<Vec<Entry>>(value) else {
            return Ok(None);
        };
        Ok(Some(
            entries
                .into_iter()
                .filter(|e| e.kind == "file")
                .map(|e| e.name)
                .collect(),
        ))
    }
}

impl IssueApi for GithubClient {
    fn close_issue(
        &self,
        cancel: &Cancellation,
        repo: &Repository,
        number: u64,
        reason: Option<&str>,
    ) -> Result<(), ApiError> {
        let mut payload = json!({ "state": "closed" });
        if let Some(reason) = reason {
            payload["state_reason"] = json!(reason);
        }
        let request = self
            .http
            .patch(self.repo_url(repo, ["issues", &number.to_string()])?)
            .json(&payload);
        self.send(cancel, "close issue", request).map(drop)
    }

    fn add_labels(
        &self,
        cancel: &Cancellation,
        repo: &Repository,
        number: u64,
        labels: &[String],
    ) -> Result<(), ApiError> {
        let request = self
            .http
            .post(self.repo_url(repo, ["issues", &number.to_string(), "labels"])?)
            .json(&json!({ "labels": labels }));
        self.send(cancel, "add labels", request).map(drop)
    }

    fn remove_label(
        &self,
        cancel: &Cancellation,
        repo: &Repository,
        number: u64,
        label: &str,
    ) -> Result<(), ApiError> {
        let url = self.repo_url(repo, ["issues", &number.to_string(), "labels", label])?;
        let request = self.http.delete(url);
        self.send(cancel, "remove label", request).map(drop)
    }

    fn add_assignees(
        &self,
        cancel: &Cancellation,
        repo: &Repository,
        number: u64,
        assignees: &[String],
    ) -> Result<(), ApiError> {
        let request = self
            .http
            .post(self.repo_url(repo, ["issues", &number.to_string(), "assignees"])?)
            .json(&json!({ "assignees": assignees }));
        self.send(cancel, "add assignees", request).map(drop)
    }

    fn remove_assignees(
        &self,
        cancel: &Cancellation,
        repo: &Repository,
        number: u64,
        assignees: &[String],
    ) -> Result<(), ApiError> {
        let request = self
            .http
            .delete(self.repo_url(repo, ["issues", &number.to_string(), "assignees"])?)
            .json(&json!({ "assignees": assignees }));
        self.send(cancel, "remove assignees", request).map(drop)
    }

    fn pull_request_head_ref(
        &self,
        cancel: &Cancellation,
        repo: &Repository,
        number: u64,
    ) -> Result<String, ApiError> {
        #[derive(Deserialize)]
        struct Head {
            #[serde(rename = "ref")]
            git_ref: String,
        }
        #[derive(Deserialize)]
        struct PullRequest {
            head: Head,
        }

        let request = self
            .http
            .get(self.repo_url(repo, ["pulls", &number.to_string()])?);
        let pr: PullRequest = self
            .send(cancel, "get pull request", request)?
            .json()
            .map_err(|source| ApiError::Transport {
                operation: "get pull request",
                source,
            })?;
        Ok(pr.head.git_ref)
    }

    fn dispatch_workflow(
        &self,
        cancel: &Cancellation,
        repo: &Repository,
        workflow: &str,
        git_ref: &str,
        inputs: &BTreeMap<String, String>,
    ) -> Result<(), ApiError> {
        let url = self.repo_url(repo, ["actions", "workflows", workflow, "dispatches"])?;
        let request = self
            .http
            .post(url)
            .json(&json!({ "ref": git_ref, "inputs": inputs }));
        self.send(cancel, "dispatch workflow", request).map(drop)
    }
}
