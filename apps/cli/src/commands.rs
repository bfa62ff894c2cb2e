//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use url::Url;

use callsync_core::{Pipeline, ProgressReporter, PullConfig, PullTarget, pull_meeting};
use callsync_shared::{
    AppConfig, RunConfig, RunSummary, init_config, load_config, require_env, validate_base_url,
};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// callsync: deliver the best meeting transcript for every CRM list member.
#[derive(Parser)]
#[command(
    name = "callsync",
    version,
    about = "Match CRM list members to their owners' meetings and deliver plain-text transcripts to a webhook.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Process every member of the CRM list and print a run summary.
    Run(RunArgs),

    /// Pull one meeting's transcript to a webhook and/or a file.
    Pull {
        /// Meeting identifier.
        #[arg(long)]
        meeting_id: String,

        /// Webhook that receives the transcript record.
        #[arg(long)]
        webhook_url: Option<String>,

        /// Email stamped on the delivered record.
        #[arg(long)]
        reference_email: Option<String>,

        /// File that receives the plain transcript.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Overrides for a list run. Unset flags fall back to the config file.
#[derive(clap::Args)]
pub(crate) struct RunArgs {
    /// CRM list id (overrides the list id env var).
    #[arg(long)]
    list_id: Option<String>,

    /// Destination webhook (overrides the webhook env var).
    #[arg(long)]
    webhook_url: Option<String>,

    /// Process only this leaf email (repeatable).
    #[arg(long = "only-email")]
    only_email: Vec<String>,

    /// Lookback window in days.
    #[arg(long, env = "DATE_FILTER_DAYS")]
    days: Option<u32>,

    /// Meetings requested per page.
    #[arg(long, env = "AVOMA_LIMIT")]
    limit: Option<u32>,

    /// Maximum meeting pages per organizer.
    #[arg(long, env = "AVOMA_PAGES")]
    pages: Option<u32>,

    /// Seconds to pause between paced calls.
    #[arg(long, env = "RATE_LIMIT_DELAY")]
    delay: Option<f64>,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs go to stderr so stdout
/// carries only the summary.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "callsync=info",
        1 => "callsync=debug",
        _ => "callsync=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Run(args) => cmd_run(args).await,
        Command::Pull {
            meeting_id,
            webhook_url,
            reference_email,
            output,
        } => cmd_pull(meeting_id, webhook_url, reference_email, output).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(args: RunArgs) -> Result<()> {
    let app = load_config()?;
    let config = run_config(&app, args)?;

    info!(
        list_id = %config.list_id,
        days = config.lookback_days,
        pages = config.max_pages,
        "starting list run"
    );

    let pipeline = Pipeline::new(config)?;
    let reporter = CliProgress::new();
    let summary = pipeline.run(&reporter).await;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

/// Merge file config, environment, and flags into a [`RunConfig`].
fn run_config(app: &AppConfig, args: RunArgs) -> Result<RunConfig> {
    let mut app = app.clone();
    if let Some(days) = args.days {
        app.run.lookback_days = days;
    }
    if let Some(limit) = args.limit {
        app.conversations.page_limit = limit;
    }
    if let Some(pages) = args.pages {
        app.conversations.max_pages = pages;
    }
    if let Some(delay) = args.delay {
        if !delay.is_finite() || delay < 0.0 {
            return Err(eyre!("--delay must be a non-negative number of seconds"));
        }
        app.run.delay_secs = delay;
    }

    let config = RunConfig::resolve(&app, args.list_id, args.webhook_url)?
        .with_only_emails(&args.only_email);
    Ok(config)
}

async fn cmd_pull(
    meeting_id: String,
    webhook_url: Option<String>,
    reference_email: Option<String>,
    output: Option<PathBuf>,
) -> Result<()> {
    if webhook_url.is_none() && output.is_none() {
        return Err(eyre!("give --webhook-url, --output, or both"));
    }

    let app = load_config()?;
    let api_key = require_env(&[app.conversations.api_key_env.as_str()])?
        .pop()
        .ok_or_else(|| eyre!("missing {}", app.conversations.api_key_env))?;
    let webhook_url = webhook_url
        .map(|raw| Url::parse(raw.trim()).map_err(|e| eyre!("invalid webhook URL '{raw}': {e}")))
        .transpose()?;

    let config = PullConfig {
        base_url: validate_base_url(&app.conversations.base_url)?,
        api_key,
        http: app.http.clone(),
        source_tag: app.run.source_tag.clone(),
    };
    let target = PullTarget {
        meeting_id,
        webhook_url,
        reference_email,
        output,
    };

    info!(meeting_id = %target.meeting_id, "pulling single meeting");
    let outcome = pull_meeting(&config, &target).await?;

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    if outcome.is_complete() {
        Ok(())
    } else {
        Err(eyre!(
            "pull finished with errors: {}",
            outcome.summary.errors().join("; ")
        ))
    }
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner on stderr.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn organizer(&self, email: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Meetings [{current}/{total}] {email}"));
    }

    fn delivered(&self, meeting_id: &str, accepted: bool) {
        let verdict = if accepted { "delivered" } else { "rejected" };
        self.spinner.set_message(format!("Transcript {verdict}: {meeting_id}"));
    }

    fn done(&self, _summary: &RunSummary) {
        self.spinner.finish_and_clear();
    }
}
