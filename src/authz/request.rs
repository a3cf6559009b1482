use std::fmt;

use super::entity::{EntityGraph, EntityUid, EventEntityLoader};
use crate::commands::ActionIdentifier;
use crate::github::IssueCommentEvent;

/// Who wants to do what to which item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    pub principal: EntityUid,
    pub action: EntityUid,
    pub resource: EntityUid,
}

impl fmt::Display for AuthorizationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "principal {} is not authorized to perform {} on {}",
            self.principal, self.action, self.resource
        )
    }
}

impl AuthorizationRequest {
    /// Message reported when this request is denied.
    pub fn denial_message(&self) -> String {
        self.to_string()
    }
}

/// Per-event authorization state: the principal and resource are fixed by the
/// event, and the entity graph is built once and shared by every command in
/// the batch.
#[derive(Debug, Clone)]
pub struct AuthorizationContext {
    principal: EntityUid,
    resource: EntityUid,
    entities: EntityGraph,
}

impl AuthorizationContext {
    /// Event-derived entities come first, so statically configured entities
    /// cannot redefine the item, its repository or the owner.
    pub fn from_event(event: &IssueCommentEvent, static_entities: &EntityGraph) -> Self {
        let mut entities = EventEntityLoader::new(event).graph();
        entities.merge(static_entities.clone());

        let issue = &event.issue;
        Self {
            principal: EntityUid::user(event.author()),
            resource: EntityUid::issue(&event.repository, issue.number, issue.is_pull_request()),
            entities,
        }
    }

    pub fn request(&self, action: &ActionIdentifier) -> AuthorizationRequest {
        AuthorizationRequest {
            principal: self.principal.clone(),
            action: EntityUid::action(action),
            resource: self.resource.clone(),
        }
    }

    pub fn principal(&self) -> &EntityUid {
        &self.principal
    }

    pub fn resource(&self) -> &EntityUid {
        &self.resource
    }

    pub fn entities(&self) -> &EntityGraph {
        &self.entities
    }
}
