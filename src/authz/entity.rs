//! Entities the policy engine reasons about, and the loaders that supply them.
//!
//! Entities use Cedar's JSON entity format (`uid`, `attrs`, `parents`) so a
//! hand-written `principals.json` can be loaded unchanged.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::source::ConfigSource;
use super::LoadError;
use crate::commands::ActionIdentifier;
use crate::github::{IssueCommentEvent, Repository};

pub const USER: &str = "GitHub::User";
pub const OWNER: &str = "GitHub::Owner";
pub const REPOSITORY: &str = "GitHub::Repository";
pub const ISSUE: &str = "GitHub::Issue";
pub const PULL_REQUEST: &str = "GitHub::PullRequest";
pub const ACTION: &str = "GitHub::Action";

/// File holding statically configured entities, relative to the config dir.
pub const PRINCIPALS_FILE: &str = "principals.json";

/// Typed entity identifier, displayed the way Cedar prints it:
/// `GitHub::User::"octocat"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityUid {
    #[serde(rename = "type")]
    pub type_name: String,
    pub id: String,
}

impl EntityUid {
    pub fn new(type_name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            id: id.into(),
        }
    }

    pub fn user(login: &str) -> Self {
        Self::new(USER, login)
    }

    pub fn owner(login: &str) -> Self {
        Self::new(OWNER, login)
    }

    pub fn repository(repo: &Repository) -> Self {
        Self::new(REPOSITORY, repo.full_name())
    }

    /// The commented-on item. The id is the same for issues and pull
    /// requests; only the type differs.
    pub fn issue(repo: &Repository, number: u64, pull_request: bool) -> Self {
        let type_name = if pull_request { PULL_REQUEST } else { ISSUE };
        Self::new(type_name, format!("{}#{number}", repo.full_name()))
    }

    pub fn action(action: &ActionIdentifier) -> Self {
        Self::new(ACTION, action.as_str())
    }
}

impl fmt::Display for EntityUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{:?}", self.type_name, self.id)
    }
}

/// One entity record: attributes plus parents for hierarchical membership.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub uid: EntityUid,
    #[serde(default)]
    pub attrs: BTreeMap<String, Value>,
    #[serde(default)]
    pub parents: Vec<EntityUid>,
}

impl Entity {
    pub fn new(uid: EntityUid) -> Self {
        Self {
            uid,
            attrs: BTreeMap::new(),
            parents: Vec::new(),
        }
    }

    pub fn attr(mut self, name: &str, value: Value) -> Self {
        self.attrs.insert(name.to_string(), value);
        self
    }

    pub fn parent(mut self, parent: EntityUid) -> Self {
        self.parents.push(parent);
        self
    }
}

/// Entities keyed by identifier.
///
/// Merging is first-wins: an identifier already present is never replaced,
/// so whichever source is merged first owns it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityGraph {
    entities: BTreeMap<EntityUid, Entity>,
}

impl EntityGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert unless the identifier is already present. Returns whether the
    /// entity was inserted.
    pub fn insert(&mut self, entity: Entity) -> bool {
        match self.entities.entry(entity.uid.clone()) {
            std::collections::btree_map::Entry::Occupied(_) => false,
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(entity);
                true
            }
        }
    }

    /// Add every entity of `other` whose identifier is not yet present.
    pub fn merge(&mut self, other: EntityGraph) {
        for entity in other.entities.into_values() {
            let uid = entity.uid.clone();
            if !self.insert(entity) {
                log::debug!("entity {uid} already defined by an earlier source, ignoring");
            }
        }
    }

    pub fn get(&self, uid: &EntityUid) -> Option<&Entity> {
        self.entities.get(uid)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// Parse a Cedar entity JSON array. Duplicate identifiers keep the first.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        let entities: Vec<Entity> = serde_json::from_str(text)?;
        Ok(entities.into_iter().collect())
    }

    /// The graph as a Cedar entity JSON array.
    pub fn to_json_value(&self) -> Value {
        Value::Array(
            self.iter()
                .map(|e| json!({ "uid": e.uid, "attrs": e.attrs, "parents": e.parents }))
                .collect(),
        )
    }
}

impl FromIterator<Entity> for EntityGraph {
    fn from_iter<I: IntoIterator<Item = Entity>>(iter: I) -> Self {
        let mut graph = EntityGraph::new();
        for entity in iter {
            graph.insert(entity);
        }
        graph
    }
}

/// A source of entities.
pub trait EntityLoader: Send + Sync {
    fn load(&self) -> Result<EntityGraph, LoadError>;
}

/// The entities implied by the triggering event: the item, its repository and
/// the repository owner.
pub struct EventEntityLoader<'a> {
    event: &'a IssueCommentEvent,
}

impl<'a> EventEntityLoader<'a> {
    pub fn new(event: &'a IssueCommentEvent) -> Self {
        Self { event }
    }

    pub fn graph(&self) -> EntityGraph {
        let repo = &self.event.repository;
        let issue = &self.event.issue;
        let owner_login = &repo.owner.login;

        let owner = Entity::new(EntityUid::owner(owner_login)).attr("login", json!(owner_login));
        let repository = Entity::new(EntityUid::repository(repo))
            .attr("name", json!(repo.name))
            .attr("owner", json!(owner_login))
            .parent(owner.uid.clone());
        let labels: Vec<&str> = issue.labels.iter().map(|l| l.name.as_str()).collect();
        let item = Entity::new(EntityUid::issue(repo, issue.number, issue.is_pull_request()))
            .attr("id", json!(issue.id))
            .attr("number", json!(issue.number))
            .attr("labels", json!(labels))
            .parent(repository.uid.clone());

        [owner, repository, item].into_iter().collect()
    }
}

impl EntityLoader for EventEntityLoader<'_> {
    fn load(&self) -> Result<EntityGraph, LoadError> {
        Ok(self.graph())
    }
}

/// An already built graph loads as itself.
impl EntityLoader for EntityGraph {
    fn load(&self) -> Result<EntityGraph, LoadError> {
        Ok(self.clone())
    }
}

/// Reads [`PRINCIPALS_FILE`] from a configuration source. A missing file
/// yields an empty graph.
pub struct FileEntityLoader {
    source: Arc<dyn ConfigSource>,
}

impl FileEntityLoader {
    pub fn new(source: Arc<dyn ConfigSource>) -> Self {
        Self { source }
    }
}

impl EntityLoader for FileEntityLoader {
    fn load(&self) -> Result<EntityGraph, LoadError> {
        let Some(text) = self.source.read(PRINCIPALS_FILE)? else {
            log::debug!("no {PRINCIPALS_FILE} in {}", self.source.describe());
            return Ok(EntityGraph::new());
        };
        let graph = EntityGraph::from_json(&text).map_err(|e| LoadError::Parse {
            path: PRINCIPALS_FILE.to_string(),
            message: e.to_string(),
        })?;
        log::debug!("loaded {} entities from {PRINCIPALS_FILE}", graph.len());
        Ok(graph)
    }
}

/// Loaders consulted in order; the first loader defining an identifier wins.
#[derive(Default)]
pub struct EntityLoaders {
    loaders: Vec<Box<dyn EntityLoader>>,
}

impl EntityLoaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, loader: impl EntityLoader + 'static) {
        self.loaders.push(Box::new(loader));
    }

    pub fn with(mut self, loader: impl EntityLoader + 'static) -> Self {
        self.push(loader);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.loaders.is_empty()
    }
}

impl EntityLoader for EntityLoaders {
    fn load(&self) -> Result<EntityGraph, LoadError> {
        let mut graph = EntityGraph::new();
        for loader in &self.loaders {
            graph.merge(loader.load()?);
        }
        Ok(graph)
    }
}
