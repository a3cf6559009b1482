use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::authz::{ConfigSource, LoadError};

/// Embedded default configuration.
const DEFAULT_CONFIG: &str = include_str!("../config.default.toml");

/// Overlay file name inside the configuration directory.
pub const OVERLAY_FILE: &str = "config.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid {origin}: {source}")]
    Parse {
        origin: String,
        #[source]
        source: toml::de::Error,
    },
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("invalid settings: {0}")]
    Invalid(String),
}

// ── Final (merged) config types ──

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub github: GithubConfig,
    #[serde(default)]
    pub authz: AuthzConfig,
    #[serde(default)]
    pub commands: Commands,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    /// Character that starts a command line.
    #[serde(default = "default_marker")]
    pub marker: char,
    /// Handlers log what they would do instead of calling the API.
    #[serde(default)]
    pub dry_run: bool,
    /// Audit log path; empty disables it. `~` and `$VAR` are expanded.
    #[serde(default)]
    pub audit_log: String,
}

fn default_marker() -> char {
    crate::parse::DEFAULT_MARKER
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            marker: default_marker(),
            dry_run: false,
            audit_log: String::new(),
        }
    }
}

impl Settings {
    /// The expanded audit log path, if one is configured.
    pub fn audit_log_path(&self) -> Result<Option<PathBuf>, ConfigError> {
        let raw = self.audit_log.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        let expanded = shellexpand::full(raw)
            .map_err(|e| ConfigError::Invalid(format!("audit_log: {e}")))?;
        Ok(Some(PathBuf::from(expanded.as_ref())))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GithubConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_api_base() -> String {
    "https://api.github.com".to_string()
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_user_agent() -> String {
    concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string()
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            request_timeout_ms: default_request_timeout_ms(),
            user_agent: default_user_agent(),
        }
    }
}

impl GithubConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Which configured sources feed the policy decision point.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthzConfig {
    /// Load `policy.cedar` and `policies/*.cedar`.
    #[serde(default = "enabled")]
    pub policy_files: bool,
    /// Load `principals.json`.
    #[serde(default = "enabled")]
    pub entity_files: bool,
}

fn enabled() -> bool {
    true
}

impl Default for AuthzConfig {
    fn default() -> Self {
        Self {
            policy_files: true,
            entity_files: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Commands {
    /// Built-in commands registered in the command tree.
    #[serde(default)]
    pub enabled: Vec<String>,
}

// ── Overlay types (repository config that merges with defaults) ──

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ConfigOverlay {
    #[serde(default)]
    settings: SettingsOverlay,
    #[serde(default)]
    github: GithubOverlay,
    #[serde(default)]
    authz: AuthzOverlay,
    #[serde(default)]
    commands: CommandsOverlay,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SettingsOverlay {
    marker: Option<char>,
    dry_run: Option<bool>,
    audit_log: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct GithubOverlay {
    api_base: Option<String>,
    request_timeout_ms: Option<u64>,
    user_agent: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct AuthzOverlay {
    policy_files: Option<bool>,
    entity_files: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CommandsOverlay {
    #[serde(default)]
    replace: bool,
    #[serde(default)]
    enabled: Vec<String>,
    #[serde(default)]
    remove_enabled: Vec<String>,
}

// ── Merge logic ──

/// Merge an overlay list into a default list.
/// In replace mode: overlay list replaces default entirely.
/// In merge mode: remove items first, then extend with additions (deduped).
fn merge_list(base: &mut Vec<String>, add: Vec<String>, remove: &[String], replace: bool) {
    if replace {
        *base = add;
    } else {
        base.retain(|item| !remove.contains(item));
        for item in add {
            if !base.contains(&item) {
                base.push(item);
            }
        }
    }
}

fn set<T>(target: &mut T, value: Option<T>) {
    if let Some(v) = value {
        *target = v;
    }
}

impl Config {
    /// Load the default embedded configuration.
    pub fn default_config() -> Self {
        toml::from_str(DEFAULT_CONFIG).expect("embedded default config must parse")
    }

    /// Embedded defaults with the overlay from `source` (if it has one) merged
    /// on top.
    ///
    /// Lists extend and scalars override. Set `replace = true` in a section
    /// to replace its default list entirely, or use `remove_<field>` lists
    /// to subtract specific items.
    pub fn load(source: &dyn ConfigSource) -> Result<Self, ConfigError> {
        let mut config = Self::default_config();
        match source.read(OVERLAY_FILE)? {
            Some(text) => {
                log::debug!("applying {OVERLAY_FILE} from {}", source.describe());
                config.apply_overlay_str(&text, OVERLAY_FILE)?;
            }
            None => log::debug!("no {OVERLAY_FILE} in {}, using defaults", source.describe()),
        }
        config.validate()?;
        Ok(config)
    }

    /// Parse and apply an overlay given as TOML text.
    pub fn apply_overlay_str(&mut self, text: &str, origin: &str) -> Result<(), ConfigError> {
        let overlay: ConfigOverlay = toml::from_str(text).map_err(|source| ConfigError::Parse {
            origin: origin.to_string(),
            source,
        })?;
        self.apply_overlay(overlay);
        Ok(())
    }

    /// Apply an overlay on top of this config (merge semantics).
    fn apply_overlay(&mut self, overlay: ConfigOverlay) {
        let s = overlay.settings;
        set(&mut self.settings.marker, s.marker);
        set(&mut self.settings.dry_run, s.dry_run);
        set(&mut self.settings.audit_log, s.audit_log);

        let g = overlay.github;
        set(&mut self.github.api_base, g.api_base);
        set(&mut self.github.request_timeout_ms, g.request_timeout_ms);
        set(&mut self.github.user_agent, g.user_agent);

        let a = overlay.authz;
        set(&mut self.authz.policy_files, a.policy_files);
        set(&mut self.authz.entity_files, a.entity_files);

        let c = overlay.commands;
        merge_list(
            &mut self.commands.enabled,
            c.enabled,
            &c.remove_enabled,
            c.replace,
        );
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.settings.marker.is_whitespace() {
            return Err(ConfigError::Invalid(
                "marker must not be whitespace".into(),
            ));
        }
        if self.github.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_ms must be positive".into(),
            ));
        }
        Ok(())
    }

    /// The configuration as TOML, for `--dump-config`.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}
