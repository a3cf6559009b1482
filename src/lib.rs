//! octoslash: slash commands in GitHub issue and pull request comments,
//! gated by Cedar policies.
//!
//! A comment like
//!
//! ```text
//! Thanks for the report!
//! /add-label "needs triage"
//! /assign octocat
//! ```
//!
//! carries two commands. Each one is parsed with shell-like quoting
//! (tree-sitter-bash, nothing is ever executed by a shell), resolved against a
//! [`CommandTree`](commands::CommandTree), authorized for the comment author
//! by a [`PolicyDecisionPoint`](authz::PolicyDecisionPoint), and only then
//! handed to its handler.
//!
//! # Architecture
//!
//! - **[`parse`]**: comment scanning and invocation parsing.
//! - **[`commands`]**: the command tree, the handler trait and built-in commands.
//! - **[`authz`]**: entities, policies, request construction and the Cedar decision point.
//! - **[`dispatch`]**: the per-event pipeline and its outcomes.
//! - **[`github`]**: the triggering event and the REST client.
//! - **[`config`]**: embedded defaults plus repository overlay.
//! - **[`logging`]**: log setup and the audit trail.

/// Entities, policy loading and authorization decisions.
pub mod authz;
/// Command tree, handler trait and built-in commands.
pub mod commands;
/// Configuration types, loading, and overlay merge logic.
pub mod config;
/// Scan, parse, resolve, authorize, execute.
pub mod dispatch;
/// GitHub event payloads and API client.
pub mod github;
/// Log initialization and the dispatch audit log.
pub mod logging;
/// Comment scanning and shell-like invocation parsing.
pub mod parse;

use parse::{ArgumentVector, CommandLine, ParseError};

/// Extract and parse every command in `text` with the default marker.
///
/// Lines that look like commands but do not parse are returned with their
/// error, in line order. Nothing is resolved or authorized.
pub fn parse_commands(text: &str) -> Vec<(CommandLine, Result<ArgumentVector, ParseError>)> {
    parse::scan(text)
        .into_iter()
        .map(|line| {
            let parsed = parse::parse(line.as_str());
            (line, parsed)
        })
        .collect()
}
