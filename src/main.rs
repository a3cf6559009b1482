use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::Parser;
use log::LevelFilter;

use octoslash::authz::{
    CedarDecisionPoint, ConfigSource, DEFAULT_CONFIG_DIR, EntityLoaders, FileEntityLoader,
    FilePolicyLoader, GithubContents, LocalDir, PolicyLoaders,
};
use octoslash::commands::builtin;
use octoslash::config::Config;
use octoslash::dispatch::{Cancellation, Dispatcher, OutcomeKind};
use octoslash::github::{GithubClient, ISSUE_COMMENT_EVENT, IssueApi, IssueCommentEvent};
use octoslash::logging::{self, AuditLog};

/// Run the slash commands found in a GitHub issue comment, after checking
/// each one against the repository's Cedar policies.
#[derive(Debug, Parser)]
#[command(name = "octoslash", version, about)]
struct Cli {
    /// Name of the triggering event; only `issue_comment` is supported.
    #[arg(long, env = "GITHUB_EVENT_NAME")]
    event_name: Option<String>,

    /// Path to the event payload (JSON).
    #[arg(long, env = "GITHUB_EVENT_PATH")]
    event_path: Option<PathBuf>,

    /// Configuration directory [default: $GITHUB_WORKSPACE/.github/octoslash]
    #[arg(long)]
    config_path: Option<PathBuf>,

    /// GitHub API token.
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// GitHub API base URL; overrides the configuration.
    #[arg(long, env = "GITHUB_API_URL")]
    api_url: Option<String>,

    /// Log what each command would do instead of doing it.
    #[arg(long)]
    dry_run: bool,

    #[arg(long, default_value = "info", env = "OCTOSLASH_LOG_LEVEL")]
    log_level: LevelFilter,

    /// Also write logs to this file.
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Give up on the whole run after this many seconds.
    #[arg(long, default_value_t = 120)]
    timeout_secs: u64,

    /// Print the merged configuration and exit.
    #[arg(long)]
    dump_config: bool,
}

impl Cli {
    fn config_dir(&self) -> PathBuf {
        if let Some(path) = &self.config_path {
            return path.clone();
        }
        match std::env::var_os("GITHUB_WORKSPACE") {
            Some(workspace) => PathBuf::from(workspace).join(DEFAULT_CONFIG_DIR),
            None => PathBuf::from(DEFAULT_CONFIG_DIR),
        }
    }
}

fn in_github_actions() -> bool {
    std::env::var("GITHUB_ACTIONS").is_ok_and(|v| v == "true")
}

fn read_event(cli: &Cli) -> anyhow::Result<IssueCommentEvent> {
    let name = cli.event_name.as_deref().unwrap_or_default();
    if name != ISSUE_COMMENT_EVENT {
        bail!("unsupported event {name:?}, only {ISSUE_COMMENT_EVENT} is handled");
    }
    let path = cli
        .event_path
        .as_ref()
        .context("no event payload given (--event-path or GITHUB_EVENT_PATH)")?;
    log::debug!("loading event from {}", path.display());
    let payload = std::fs::read_to_string(path)
        .with_context(|| format!("loading event {}", path.display()))?;
    IssueCommentEvent::from_json(&payload).context("decoding event")
}

/// The local configuration directory if it exists; otherwise, inside GitHub
/// Actions, the same directory read through the API.
fn config_source(
    cli: &Cli,
    client: &GithubClient,
    event: &IssueCommentEvent,
    cancel: &Cancellation,
) -> anyhow::Result<Option<Arc<dyn ConfigSource>>> {
    let local = LocalDir::new(cli.config_dir());
    if local.exists() {
        log::debug!("using configuration from {}", local.describe());
        return Ok(Some(Arc::new(local)));
    }
    if in_github_actions() {
        let remote = GithubContents::new(
            client.clone(),
            event.repository.clone(),
            DEFAULT_CONFIG_DIR,
        )
        .with_cancellation(cancel.clone());
        if remote
            .exists()
            .context("opening octoslash config from GitHub")?
        {
            log::debug!("using configuration from {}", remote.describe());
            return Ok(Some(Arc::new(remote)));
        }
    }
    log::debug!("no configuration directory found, using defaults");
    Ok(None)
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    if cli.dump_config {
        let config = Config::load(&LocalDir::new(cli.config_dir()))?;
        print!("{}", config.to_toml()?);
        return Ok(ExitCode::SUCCESS);
    }

    let event = read_event(&cli)?;
    let cancel = Cancellation::with_timeout(Duration::from_secs(cli.timeout_secs));

    let mut bootstrap = Config::default_config().github;
    if let Some(url) = &cli.api_url {
        bootstrap.api_base = url.clone();
    }
    let bootstrap_client = GithubClient::new(&bootstrap, cli.token.as_deref())?;
    let source = config_source(&cli, &bootstrap_client, &event, &cancel)?;

    let mut config = match &source {
        Some(source) => Config::load(source.as_ref())?,
        None => Config::default_config(),
    };
    if let Some(url) = &cli.api_url {
        config.github.api_base = url.clone();
    }
    config.settings.dry_run |= cli.dry_run;

    let audit = match config.settings.audit_log_path()? {
        Some(path) => AuditLog::open(&path)
            .with_context(|| format!("opening audit log {}", path.display()))?,
        None => AuditLog::disabled(),
    };

    let client = GithubClient::new(&config.github, cli.token.as_deref())?;
    let api: Arc<dyn IssueApi> = Arc::new(client);
    let tree = builtin::command_tree(api, &config.commands.enabled)?;

    let mut policies = PolicyLoaders::new();
    let mut entities = EntityLoaders::new();
    if let Some(source) = &source {
        if config.authz.policy_files {
            policies.push(FilePolicyLoader::new(Arc::clone(source)));
        }
        if config.authz.entity_files {
            entities.push(FileEntityLoader::new(Arc::clone(source)));
        }
    }

    let dispatcher = Dispatcher::builder()
        .tree(tree)
        .decision_point(Arc::new(CedarDecisionPoint::new()))
        .policy_loader(policies)
        .entity_loader(entities)
        .audit_log(audit)
        .marker(config.settings.marker)
        .dry_run(config.settings.dry_run)
        .build()?;

    let outcomes = dispatcher.dispatch_event(&event, &cancel)?;
    if outcomes.is_empty() {
        log::info!("no commands to run");
    }
    let count = |kind: OutcomeKind| outcomes.iter().filter(|o| o.kind() == kind).count();
    log::info!(
        "{} succeeded, {} denied, {} skipped",
        count(OutcomeKind::Succeeded),
        count(OutcomeKind::Denied),
        count(OutcomeKind::SkippedParseError)
    );
    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = logging::init(cli.log_level, cli.log_file.as_deref()) {
        eprintln!("octoslash: {e}");
        return ExitCode::FAILURE;
    }

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            log::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
