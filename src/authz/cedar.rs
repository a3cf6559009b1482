//! Policy Decision Point backed by the Cedar authorizer.

use std::str::FromStr;

use cedar_policy::{
    Authorizer, Context, Entities, EntityId, EntityTypeName, EntityUid as CedarUid, PolicySet,
    Request,
};

use super::entity::{EntityGraph, EntityUid};
use super::request::AuthorizationRequest;
use crate::dispatch::Cancellation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

/// Why a decision could not be made. Callers treat every variant as a denial.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DecisionError {
    #[error("authorization cancelled")]
    Cancelled,
    #[error("invalid authorization request: {0}")]
    InvalidRequest(String),
    #[error("invalid entities: {0}")]
    Entities(String),
    /// Some policies could not be evaluated. `permitted` records whether
    /// the remaining policies would have allowed the request.
    #[error("{}", evaluation_message(.errors, .permitted))]
    Evaluation { errors: Vec<String>, permitted: bool },
}

fn evaluation_message(errors: &[String], permitted: &bool) -> String {
    let mut message = format!("policy evaluation failed: {}", errors.join("; "));
    if *permitted {
        message.push_str(" (a permit policy matched, denied because of the errors)");
    }
    message
}

/// Evaluates a request against policies and entities.
///
/// Implementations must be safe for concurrent use and must give up with
/// [`DecisionError::Cancelled`] once `cancel` has fired.
pub trait PolicyDecisionPoint: Send + Sync {
    fn decide(
        &self,
        request: &AuthorizationRequest,
        entities: &EntityGraph,
        policies: &PolicySet,
        cancel: &Cancellation,
    ) -> Result<Decision, DecisionError>;
}

pub struct CedarDecisionPoint {
    authorizer: Authorizer,
}

impl Default for CedarDecisionPoint {
    fn default() -> Self {
        Self::new()
    }
}

impl CedarDecisionPoint {
    pub fn new() -> Self {
        Self {
            authorizer: Authorizer::new(),
        }
    }
}

fn cedar_uid(uid: &EntityUid) -> Result<CedarUid, DecisionError> {
    let type_name = EntityTypeName::from_str(&uid.type_name).map_err(|e| {
        DecisionError::InvalidRequest(format!("invalid entity type name '{}': {e}", uid.type_name))
    })?;
    Ok(CedarUid::from_type_name_and_id(type_name, EntityId::new(&uid.id)))
}

impl PolicyDecisionPoint for CedarDecisionPoint {
    fn decide(
        &self,
        request: &AuthorizationRequest,
        entities: &EntityGraph,
        policies: &PolicySet,
        cancel: &Cancellation,
    ) -> Result<Decision, DecisionError> {
        if cancel.is_cancelled() {
            return Err(DecisionError::Cancelled);
        }

        let cedar_request = Request::new(
            cedar_uid(&request.principal)?,
            cedar_uid(&request.action)?,
            cedar_uid(&request.resource)?,
            Context::empty(),
            None,
        )
        .map_err(|e| DecisionError::InvalidRequest(e.to_string()))?;
        let cedar_entities = Entities::from_json_value(entities.to_json_value(), None)
            .map_err(|e| DecisionError::Entities(e.to_string()))?;

        let response = self
            .authorizer
            .is_authorized(&cedar_request, policies, &cedar_entities);

        let errors: Vec<String> = response
            .diagnostics()
            .errors()
            .map(ToString::to_string)
            .collect();
        if !errors.is_empty() {
            for error in &errors {
                log::warn!("while authorizing {}: {error}", request.action);
            }
            let permitted = response.decision() == cedar_policy::Decision::Allow;
            if permitted {
                log::warn!(
                    "{} was permitted by {}, but evaluation errors force a deny",
                    request.action,
                    response
                        .diagnostics()
                        .reason()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(", ")
                );
            }
            return Err(DecisionError::Evaluation { errors, permitted });
        }
        if cancel.is_cancelled() {
            return Err(DecisionError::Cancelled);
        }

        let reasons: Vec<String> = response
            .diagnostics()
            .reason()
            .map(ToString::to_string)
            .collect();
        Ok(match response.decision() {
            cedar_policy::Decision::Allow => {
                log::debug!("allowed by policies: {}", reasons.join(", "));
                Decision::Allow
            }
            cedar_policy::Decision::Deny if reasons.is_empty() => {
                log::debug!("denied: no permit policy matched");
                Decision::Deny
            }
            cedar_policy::Decision::Deny => {
                log::debug!("denied by policies: {}", reasons.join(", "));
                Decision::Deny
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use serde_json::json;

    use super::*;
    use crate::authz::entity::{Entity, ISSUE, USER};
    use crate::commands::ActionIdentifier;

    fn request(user: &str, action: &str) -> AuthorizationRequest {
        AuthorizationRequest {
            principal: EntityUid::user(user),
            action: EntityUid::action(&ActionIdentifier::from_path([action])),
            resource: EntityUid::new(ISSUE, "acme/widgets#1"),
        }
    }

    fn graph() -> EntityGraph {
        [
            Entity::new(EntityUid::new(USER, "maintainer")).attr("maintainer", json!(true)),
            Entity::new(EntityUid::new(ISSUE, "acme/widgets#1"))
                .attr("labels", json!(["bug"]))
                .parent(EntityUid::new("GitHub::Repository", "acme/widgets")),
            Entity::new(EntityUid::new("GitHub::Repository", "acme/widgets")),
        ]
        .into_iter()
        .collect()
    }

    fn decide(policies: &str, request: &AuthorizationRequest) -> Result<Decision, DecisionError> {
        let policies = PolicySet::from_str(policies).unwrap();
        CedarDecisionPoint::new().decide(request, &graph(), &policies, &Cancellation::new())
    }

    #[test]
    fn empty_policy_set_denies() {
        assert_eq!(decide("", &request("maintainer", "close")).unwrap(), Decision::Deny);
    }

    #[test]
    fn permit_on_action_allows() {
        let policies = r#"permit(principal, action == GitHub::Action::"close", resource);"#;
        assert_eq!(decide(policies, &request("anyone", "close")).unwrap(), Decision::Allow);
        assert_eq!(decide(policies, &request("anyone", "assign")).unwrap(), Decision::Deny);
    }

    #[test]
    fn attributes_and_hierarchy_are_visible() {
        let policies = r#"
            permit(principal, action, resource in GitHub::Repository::"acme/widgets")
            when { principal has maintainer && principal.maintainer };
        "#;
        assert_eq!(decide(policies, &request("maintainer", "close")).unwrap(), Decision::Allow);
        assert_eq!(decide(policies, &request("stranger", "close")).unwrap(), Decision::Deny);
    }

    #[test]
    fn forbid_overrides_permit() {
        let policies = r#"
            permit(principal, action, resource);
            forbid(principal, action, resource) when { resource.labels.contains("bug") };
        "#;
        assert_eq!(decide(policies, &request("maintainer", "close")).unwrap(), Decision::Deny);
    }

    #[test]
    fn evaluation_error_is_an_error_not_an_allow() {
        let policies = r#"permit(principal, action, resource) when { principal.missing == 1 };"#;
        assert!(matches!(
            decide(policies, &request("maintainer", "close")),
            Err(DecisionError::Evaluation { permitted: false, .. })
        ));
    }

    #[test]
    fn erroring_policy_denies_even_when_another_permits() {
        let policies = r#"
            permit(principal, action, resource) when { principal.maintainer };
            permit(principal, action == GitHub::Action::"self-assign", resource);
        "#;
        let err = decide(policies, &request("stranger", "self-assign")).unwrap_err();
        let DecisionError::Evaluation { errors, permitted } = &err else {
            panic!("unexpected error: {err}");
        };
        assert!(*permitted);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("policy0"), "{}", errors[0]);
        assert!(err.to_string().contains("a permit policy matched"));
    }

    #[test]
    fn cancelled_signal_is_not_evaluated() {
        let policies = PolicySet::from_str("permit(principal, action, resource);").unwrap();
        let cancel = Cancellation::new();
        cancel.cancel();
        let result =
            CedarDecisionPoint::new().decide(&request("a", "close"), &graph(), &policies, &cancel);
        assert!(matches!(result, Err(DecisionError::Cancelled)));
    }

    #[test]
    fn malformed_type_name_is_rejected() {
        let mut bad = request("a", "close");
        bad.principal = EntityUid::new("Not A Type", "a");
        let policies = PolicySet::from_str("permit(principal, action, resource);").unwrap();
        let result = CedarDecisionPoint::new().decide(&bad, &graph(), &policies, &Cancellation::new());
        assert!(matches!(result, Err(DecisionError::InvalidRequest(_))));
    }
}
