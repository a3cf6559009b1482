//! Registry of invocable commands and subcommands, and resolution of an
//! argument vector to a command plus its arguments.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::CommandHandler;
use crate::parse::ArgumentVector;

/// Joins command names into an [`ActionIdentifier`].
pub const ACTION_SEPARATOR: &str = ":";

/// Hierarchical name of a resolved command: the canonical names from the first
/// level below the root down to the resolved node, joined by
/// [`ACTION_SEPARATOR`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActionIdentifier(String);

impl ActionIdentifier {
    pub fn from_path<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names: Vec<S> = names.into_iter().collect();
        Self(
            names
                .iter()
                .map(AsRef::as_ref)
                .collect::<Vec<_>>()
                .join(ACTION_SEPARATOR),
        )
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split(ACTION_SEPARATOR)
    }
}

impl fmt::Display for ActionIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How many arguments a command accepts (after its name).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arity {
    min: usize,
    max: Option<usize>,
}

impl Arity {
    pub const NONE: Arity = Arity::exact(0);
    pub const ANY: Arity = Arity::at_least(0);

    pub const fn exact(n: usize) -> Self {
        Self { min: n, max: Some(n) }
    }

    pub const fn range(min: usize, max: usize) -> Self {
        Self { min, max: Some(max) }
    }

    pub const fn at_least(min: usize) -> Self {
        Self { min, max: None }
    }

    pub const fn at_most(max: usize) -> Self {
        Self { min: 0, max: Some(max) }
    }

    pub fn min(&self) -> usize {
        self.min
    }

    pub fn max(&self) -> Option<usize> {
        self.max
    }

    pub fn accepts(&self, count: usize) -> bool {
        count >= self.min && self.max.is_none_or(|max| count <= max)
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let plural = |n: usize| if n == 1 { "" } else { "s" };
        match (self.min, self.max) {
            (min, Some(max)) if min == max => write!(f, "exactly {min} argument{}", plural(min)),
            (0, Some(max)) => write!(f, "at most {max} argument{}", plural(max)),
            (min, Some(max)) => write!(f, "between {min} and {max} arguments"),
            (0, None) => f.write_str("any number of arguments"),
            (min, None) => write!(f, "at least {min} argument{}", plural(min)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolutionError {
    #[error("unknown command: {name}")]
    UnknownCommand { name: String },
    #[error("unknown subcommand {name:?} for {command}")]
    UnknownSubcommand {
        command: ActionIdentifier,
        name: String,
    },
    #[error("{command} requires a subcommand")]
    MissingSubcommand { command: ActionIdentifier },
    #[error("{command} accepts {expected}, got {got}")]
    Arity {
        command: ActionIdentifier,
        expected: Arity,
        got: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandTreeError {
    #[error("{name:?} is already registered under {parent}")]
    Duplicate { parent: String, name: String },
}

/// A named entry in the command tree.
///
/// Leaves carry a handler and an arity. Groups carry children and are only
/// executable when they also declare a default handler.
pub struct CommandNode {
    name: String,
    aliases: Vec<String>,
    summary: String,
    arity: Arity,
    handler: Option<Arc<dyn CommandHandler>>,
    children: BTreeMap<String, CommandNode>,
    /// alias -> canonical child name
    child_aliases: BTreeMap<String, String>,
}

impl CommandNode {
    /// An executable command.
    pub fn leaf(name: impl Into<String>, arity: Arity, handler: impl CommandHandler + 'static) -> Self {
        Self {
            handler: Some(Arc::new(handler)),
            arity,
            ..Self::group(name)
        }
    }

    /// A command that only groups subcommands.
    pub fn group(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
            summary: String::new(),
            arity: Arity::ANY,
            handler: None,
            children: BTreeMap::new(),
            child_aliases: BTreeMap::new(),
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    /// Make a group executable when no subcommand matches.
    pub fn default_handler(mut self, arity: Arity, handler: impl CommandHandler + 'static) -> Self {
        self.handler = Some(Arc::new(handler));
        self.arity = arity;
        self
    }

    /// Builder form of [`add_child`](Self::add_child).
    pub fn subcommand(mut self, child: CommandNode) -> Result<Self, CommandTreeError> {
        self.add_child(child)?;
        Ok(self)
    }

    /// Register a child; its name and aliases must not clash with a sibling's.
    pub fn add_child(&mut self, child: CommandNode) -> Result<(), CommandTreeError> {
        for key in std::iter::once(&child.name).chain(&child.aliases) {
            if self.children.contains_key(key) || self.child_aliases.contains_key(key) {
                return Err(CommandTreeError::Duplicate {
                    parent: self.name.clone(),
                    name: key.clone(),
                });
            }
        }
        for alias in &child.aliases {
            self.child_aliases.insert(alias.clone(), child.name.clone());
        }
        self.children.insert(child.name.clone(), child);
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    pub fn summary_text(&self) -> &str {
        &self.summary
    }

    pub fn arity(&self) -> Arity {
        self.arity
    }

    pub fn is_executable(&self) -> bool {
        self.handler.is_some()
    }

    pub fn handler(&self) -> Option<&Arc<dyn CommandHandler>> {
        self.handler.as_ref()
    }

    pub fn children(&self) -> impl Iterator<Item = &CommandNode> {
        self.children.values()
    }

    /// Look up a child by exact name, then by alias.
    pub fn child(&self, token: &str) -> Option<&CommandNode> {
        self.children.get(token).or_else(|| {
            self.child_aliases
                .get(token)
                .and_then(|name| self.children.get(name))
        })
    }
}

impl fmt::Debug for CommandNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandNode")
            .field("name", &self.name)
            .field("aliases", &self.aliases)
            .field("arity", &self.arity)
            .field("executable", &self.is_executable())
            .field("children", &self.children.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// A command resolved from an argument vector.
pub struct Resolved<'a> {
    node: &'a CommandNode,
    handler: &'a Arc<dyn CommandHandler>,
    action: ActionIdentifier,
    args: &'a [String],
}

impl<'a> Resolved<'a> {
    pub fn node(&self) -> &'a CommandNode {
        self.node
    }

    pub fn action(&self) -> &ActionIdentifier {
        &self.action
    }

    /// Tokens left over after the command path.
    pub fn args(&self) -> &'a [String] {
        self.args
    }

    pub fn handler(&self) -> &'a Arc<dyn CommandHandler> {
        self.handler
    }
}

impl fmt::Debug for Resolved<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolved")
            .field("action", &self.action)
            .field("args", &self.args)
            .finish()
    }
}

/// The root of all commands. Built once, read-only afterwards.
#[derive(Debug)]
pub struct CommandTree {
    root: CommandNode,
}

impl Default for CommandTree {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandTree {
    pub fn new() -> Self {
        Self {
            root: CommandNode::group(env!("CARGO_PKG_NAME")),
        }
    }

    pub fn register(&mut self, node: CommandNode) -> Result<(), CommandTreeError> {
        self.root.add_child(node)
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(mut self, node: CommandNode) -> Result<Self, CommandTreeError> {
        self.register(node)?;
        Ok(self)
    }

    /// Top-level commands, ordered by name.
    pub fn commands(&self) -> impl Iterator<Item = &CommandNode> {
        self.root.children()
    }

    /// Walk the tokens from the root: each token that names a child of the
    /// current node descends one level; the first token that does not stops the
    /// walk and it and everything after it become the command's arguments.
    pub fn resolve<'a>(&'a self, argv: &'a ArgumentVector) -> Result<Resolved<'a>, ResolutionError> {
        let tokens = argv.tokens();
        let mut node = self
            .root
            .child(argv.name())
            .ok_or_else(|| ResolutionError::UnknownCommand {
                name: argv.name().to_string(),
            })?;
        let mut path = vec![node.name()];
        let mut consumed = 1;

        while let Some(child) = tokens.get(consumed).and_then(|t| node.child(t)) {
            node = child;
            path.push(node.name());
            consumed += 1;
        }

        let action = ActionIdentifier::from_path(&path);
        let args = &tokens[consumed..];

        let Some(handler) = node.handler() else {
            return Err(match args.first() {
                Some(name) => ResolutionError::UnknownSubcommand {
                    command: action,
                    name: name.clone(),
                },
                None => ResolutionError::MissingSubcommand { command: action },
            });
        };
        if !node.arity().accepts(args.len()) {
            return Err(ResolutionError::Arity {
                command: action,
                expected: node.arity(),
                got: args.len(),
            });
        }

        Ok(Resolved {
            node,
            handler,
            action,
            args,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::HandlerError;
    use crate::dispatch::ExecutionContext;

    fn noop(_: &ExecutionContext<'_>, _: &[String]) -> Result<(), HandlerError> {
        Ok(())
    }

    fn argv(tokens: &[&str]) -> ArgumentVector {
        ArgumentVector::new(tokens.iter().map(|t| t.to_string()).collect()).unwrap()
    }

    fn tree() -> CommandTree {
        let workflow = CommandNode::group("workflow")
            .subcommand(CommandNode::leaf("run", Arity::at_least(1), noop))
            .unwrap()
            .subcommand(CommandNode::leaf("list", Arity::NONE, noop))
            .unwrap();
        let label = CommandNode::group("label")
            .default_handler(Arity::exact(1), noop)
            .subcommand(CommandNode::leaf("remove", Arity::exact(1), noop))
            .unwrap();
        CommandTree::new()
            .with(CommandNode::leaf("close", Arity::at_most(1), noop))
            .unwrap()
            .with(CommandNode::leaf("add-label", Arity::exact(1), noop).alias("tag"))
            .unwrap()
            .with(CommandNode::leaf("run", Arity::ANY, noop))
            .unwrap()
            .with(workflow)
            .unwrap()
            .with(label)
            .unwrap()
    }

    fn action(tokens: &[&str]) -> String {
        let tree = tree();
        let argv = argv(tokens);
        tree.resolve(&argv).unwrap().action().to_string()
    }

    #[test]
    fn top_level_leaf() {
        let tree = tree();
        let argv = argv(&["close", "wontfix"]);
        let resolved = tree.resolve(&argv).unwrap();
        assert_eq!(resolved.action().as_str(), "close");
        assert_eq!(resolved.args(), ["wontfix".to_string()]);
    }

    #[test]
    fn nested_action_is_joined() {
        assert_eq!(action(&["workflow", "run", "ci.yml"]), "workflow:run");
    }

    #[test]
    fn nested_and_top_level_names_are_distinct() {
        assert_eq!(action(&["run"]), "run");
        assert_ne!(action(&["run"]), action(&["workflow", "run", "x"]));
    }

    #[test]
    fn alias_resolves_to_canonical_name() {
        assert_eq!(action(&["tag", "bug"]), "add-label");
    }

    #[test]
    fn group_default_handler_takes_unmatched_tokens() {
        let tree = tree();
        let argv = argv(&["label", "bug"]);
        let resolved = tree.resolve(&argv).unwrap();
        assert_eq!(resolved.action().as_str(), "label");
        assert_eq!(resolved.args(), ["bug".to_string()]);
        assert_eq!(action(&["label", "remove", "bug"]), "label:remove");
    }

    #[test]
    fn resolution_is_deterministic() {
        assert_eq!(
            action(&["workflow", "run", "a"]),
            action(&["workflow", "run", "a"])
        );
    }

    #[test]
    fn unknown_command() {
        let tree = tree();
        let argv = argv(&["reopen"]);
        assert_eq!(
            tree.resolve(&argv).unwrap_err(),
            ResolutionError::UnknownCommand {
                name: "reopen".into()
            }
        );
    }

    #[test]
    fn unknown_subcommand() {
        let tree = tree();
        let argv = argv(&["workflow", "delete"]);
        assert!(matches!(
            tree.resolve(&argv),
            Err(ResolutionError::UnknownSubcommand { .. })
        ));
    }

    #[test]
    fn missing_subcommand() {
        let tree = tree();
        let argv = argv(&["workflow"]);
        assert!(matches!(
            tree.resolve(&argv),
            Err(ResolutionError::MissingSubcommand { .. })
        ));
    }

    #[test]
    fn arity_violation() {
        let tree = tree();
        let argv = argv(&["close", "a", "b"]);
        let err = tree.resolve(&argv).unwrap_err();
        assert_eq!(
            err,
            ResolutionError::Arity {
                command: ActionIdentifier::from_path(["close"]),
                expected: Arity::at_most(1),
                got: 2,
            }
        );
        assert_eq!(err.to_string(), "close accepts at most 1 argument, got 2");
    }

    #[test]
    fn duplicate_names_and_aliases_rejected() {
        let mut tree = tree();
        assert!(tree.register(CommandNode::leaf("close", Arity::ANY, noop)).is_err());
        assert!(tree.register(CommandNode::leaf("tag", Arity::ANY, noop)).is_err());
        assert!(
            tree.register(CommandNode::leaf("other", Arity::ANY, noop).alias("close"))
                .is_err()
        );
    }

    #[test]
    fn arity_bounds() {
        assert!(Arity::exact(1).accepts(1));
        assert!(!Arity::exact(1).accepts(0));
        assert!(Arity::range(1, 2).accepts(2));
        assert!(!Arity::range(1, 2).accepts(3));
        assert!(Arity::at_least(1).accepts(10));
        assert!(Arity::at_most(1).accepts(0));
        assert_eq!(Arity::exact(0).to_string(), "exactly 0 arguments");
        assert_eq!(Arity::at_least(1).to_string(), "at least 1 argument");
    }
}
