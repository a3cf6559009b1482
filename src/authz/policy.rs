//! Policy loading.
//!
//! Policies are Cedar text. Each loaded policy gets a stable id derived from
//! the file it came from, so audit and debug output can point at a file.

use std::str::FromStr;
use std::sync::Arc;

use cedar_policy::{PolicyId, PolicySet};

use super::LoadError;
use super::source::ConfigSource;

/// Top-level policy file, relative to the config directory.
pub const POLICY_FILE: &str = "policy.cedar";
/// Directory of additional `*.cedar` files.
pub const POLICY_DIR: &str = "policies";

const POLICY_EXTENSION: &str = ".cedar";

/// A source of policies.
pub trait PolicyLoader: Send + Sync {
    fn load(&self) -> Result<PolicySet, LoadError>;
}

/// Parse `text` and give its policies ids based on `stem`: the stem itself
/// when the file holds one policy, `stem.0`, `stem.1`, ... otherwise.
pub fn parse_policies(stem: &str, path: &str, text: &str) -> Result<PolicySet, LoadError> {
    let parse_error = |message: String| LoadError::Parse {
        path: path.to_string(),
        message,
    };

    let parsed = PolicySet::from_str(text).map_err(|e| parse_error(e.to_string()))?;
    if parsed.templates().next().is_some() {
        return Err(parse_error("policy templates are not supported".into()));
    }

    let policies: Vec<_> = parsed.policies().collect();
    let single = policies.len() == 1;
    let mut out = PolicySet::new();
    for (n, policy) in policies.into_iter().enumerate() {
        let id = if single {
            stem.to_string()
        } else {
            format!("{stem}.{n}")
        };
        out.add(policy.new_id(PolicyId::new(id)))
            .map_err(|e| parse_error(e.to_string()))?;
    }
    Ok(out)
}

/// Append every policy of `from` to `into`; ids must be unique.
fn extend(into: &mut PolicySet, from: PolicySet, origin: &str) -> Result<(), LoadError> {
    let error = |message: String| LoadError::Parse {
        path: origin.to_string(),
        message,
    };
    for policy in from.policies() {
        if into.policy(policy.id()).is_some() {
            return Err(error(format!(
                "policy id {:?} is already taken by an earlier file; ids come from file stems, rename one of them",
                policy.id().to_string()
            )));
        }
        into.add(policy.clone()).map_err(|e| error(e.to_string()))?;
    }
    Ok(())
}

/// Reads [`POLICY_FILE`] and every `*.cedar` file in [`POLICY_DIR`], the
/// latter in name order.
///
/// Ids share one namespace across both locations: `policy.cedar` and
/// `policies/policy.cedar` both claim `policy`, and a two-policy
/// `labels.cedar` claims `labels.0`, as does a one-policy `labels.0.cedar`.
/// Such a clash is a [`LoadError::Parse`] naming the later file.
pub struct FilePolicyLoader {
    source: Arc<dyn ConfigSource>,
}

impl FilePolicyLoader {
    pub fn new(source: Arc<dyn ConfigSource>) -> Self {
        Self { source }
    }
}

impl PolicyLoader for FilePolicyLoader {
    fn load(&self) -> Result<PolicySet, LoadError> {
        let mut policies = PolicySet::new();

        if let Some(text) = self.source.read(POLICY_FILE)? {
            let stem = POLICY_FILE.trim_end_matches(POLICY_EXTENSION);
            extend(&mut policies, parse_policies(stem, POLICY_FILE, &text)?, POLICY_FILE)?;
        }

        let mut names = self.source.list(POLICY_DIR)?.unwrap_or_default();
        names.retain(|name| name.ends_with(POLICY_EXTENSION));
        names.sort();
        for name in names {
            let path = format!("{POLICY_DIR}/{name}");
            let Some(text) = self.source.read(&path)? else {
                continue;
            };
            let stem = name.trim_end_matches(POLICY_EXTENSION);
            extend(&mut policies, parse_policies(stem, &path, &text)?, &path)?;
        }

        log::debug!(
            "loaded {} policies from {}",
            policies.policies().count(),
            self.source.describe()
        );
        Ok(policies)
    }
}

/// Loaders whose policies are combined in order.
#[derive(Default)]
pub struct PolicyLoaders {
    loaders: Vec<Box<dyn PolicyLoader>>,
}

impl PolicyLoaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, loader: impl PolicyLoader + 'static) {
        self.loaders.push(Box::new(loader));
    }

    pub fn with(mut self, loader: impl PolicyLoader + 'static) -> Self {
        self.push(loader);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.loaders.is_empty()
    }
}

impl PolicyLoader for PolicyLoaders {
    fn load(&self) -> Result<PolicySet, LoadError> {
        if self.loaders.is_empty() {
            log::warn!("no policy loader available, all authorization requests will be denied");
        }
        let mut policies = PolicySet::new();
        for loader in &self.loaders {
            extend(&mut policies, loader.load()?, "policy loader")?;
        }
        Ok(policies)
    }
}

/// Policies given directly as text, mostly for embedding and tests.
pub struct StaticPolicies {
    name: String,
    text: String,
}

impl StaticPolicies {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }
}

impl PolicyLoader for StaticPolicies {
    fn load(&self) -> Result<PolicySet, LoadError> {
        parse_policies(&self.name, &self.name, &self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::source::LocalDir;

    const PERMIT_CLOSE: &str =
        r#"permit(principal, action == GitHub::Action::"close", resource);"#;

    fn ids(set: &PolicySet) -> Vec<String> {
        let mut ids: Vec<String> = set.policies().map(|p| p.id().to_string()).collect();
        ids.sort();
        ids
    }

    fn loader(dir: &tempfile::TempDir) -> FilePolicyLoader {
        FilePolicyLoader::new(Arc::new(LocalDir::new(dir.path())))
    }

    #[test]
    fn empty_directory_yields_no_policies() {
        let dir = tempfile::tempdir().unwrap();
        assert!(loader(&dir).load().unwrap().is_empty());
    }

    #[test]
    fn ids_follow_file_names() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(POLICY_FILE), PERMIT_CLOSE).unwrap();
        std::fs::create_dir(dir.path().join(POLICY_DIR)).unwrap();
        std::fs::write(
            dir.path().join("policies/labels.cedar"),
            format!("{PERMIT_CLOSE}\nforbid(principal, action, resource) when {{ false }};"),
        )
        .unwrap();
        std::fs::write(dir.path().join("policies/README.md"), "not a policy").unwrap();

        let set = loader(&dir).load().unwrap();
        assert_eq!(ids(&set), ["labels.0", "labels.1", "policy"]);
    }

    #[test]
    fn syntax_error_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join(POLICY_DIR)).unwrap();
        std::fs::write(dir.path().join("policies/broken.cedar"), "permit(").unwrap();
        match loader(&dir).load() {
            Err(LoadError::Parse { path, .. }) => assert_eq!(path, "policies/broken.cedar"),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    fn clash_message(dir: &tempfile::TempDir) -> (String, String) {
        match loader(dir).load() {
            Err(LoadError::Parse { path, message }) => (path, message),
            other => panic!("expected an id clash, got {other:?}"),
        }
    }

    #[test]
    fn top_level_and_directory_file_with_same_stem_clash() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(POLICY_FILE), PERMIT_CLOSE).unwrap();
        std::fs::create_dir(dir.path().join(POLICY_DIR)).unwrap();
        std::fs::write(dir.path().join("policies/policy.cedar"), PERMIT_CLOSE).unwrap();

        let (path, message) = clash_message(&dir);
        assert_eq!(path, "policies/policy.cedar");
        assert!(message.contains(r#"policy id "policy" is already taken"#), "{message}");
    }

    #[test]
    fn numbered_ids_clash_with_a_dotted_stem() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join(POLICY_DIR)).unwrap();
        std::fs::write(
            dir.path().join("policies/labels.0.cedar"),
            PERMIT_CLOSE,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("policies/labels.cedar"),
            format!("{PERMIT_CLOSE}\n{PERMIT_CLOSE}"),
        )
        .unwrap();

        let (path, message) = clash_message(&dir);
        assert_eq!(path, "policies/labels.cedar");
        assert!(message.contains(r#""labels.0""#), "{message}");
    }

    #[test]
    fn templates_are_rejected() {
        let err = parse_policies(
            "t",
            "t.cedar",
            "permit(principal == ?principal, action, resource);",
        )
        .unwrap_err();
        assert!(err.to_string().contains("templates"));
    }

    #[test]
    fn composite_combines_in_order_and_rejects_duplicate_ids() {
        let loaders = PolicyLoaders::new()
            .with(StaticPolicies::new("a", PERMIT_CLOSE))
            .with(StaticPolicies::new("b", PERMIT_CLOSE));
        assert_eq!(ids(&loaders.load().unwrap()), ["a", "b"]);

        let clash = PolicyLoaders::new()
            .with(StaticPolicies::new("a", PERMIT_CLOSE))
            .with(StaticPolicies::new("a", PERMIT_CLOSE));
        assert!(clash.load().is_err());
    }

    #[test]
    fn no_loaders_is_an_empty_set() {
        assert!(PolicyLoaders::new().load().unwrap().is_empty());
    }
}
