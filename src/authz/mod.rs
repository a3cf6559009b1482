//! Authorization: who the principal is, what the resource is, which entities
//! and policies apply, and the decision point that weighs them.

pub mod cedar;
pub mod entity;
pub mod policy;
pub mod request;
pub mod source;

pub use cedar::{CedarDecisionPoint, Decision, DecisionError, PolicyDecisionPoint};
pub use entity::{
    Entity, EntityGraph, EntityLoader, EntityLoaders, EntityUid, EventEntityLoader,
    FileEntityLoader,
};
pub use policy::{FilePolicyLoader, PolicyLoader, PolicyLoaders, StaticPolicies};
pub use request::{AuthorizationContext, AuthorizationRequest};
pub use source::{ConfigSource, DEFAULT_CONFIG_DIR, GithubContents, LocalDir};

use crate::github::ApiError;

/// Failure to load policies or entities from a configured source.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {message}")]
    Parse { path: String, message: String },
    #[error(transparent)]
    Remote(#[from] ApiError),
}
