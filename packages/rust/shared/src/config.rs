//! Application configuration for callsync.
//!
//! User config lives at `~/.callsync/callsync.toml`.
//! CLI flags override config file values, which override defaults.
//! Secrets are never stored in the file; it only names the environment
//! variables that hold them.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{CallsyncError, Result};
use crate::types::normalize_email;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "callsync.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".callsync";

/// Upper bound the CRM accepts for a single batch read.
pub const MAX_BATCH_SIZE: usize = 100;

// ---------------------------------------------------------------------------
// Config structs (matching callsync.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// CRM endpoint and credential settings.
    #[serde(default)]
    pub crm: CrmConfig,

    /// Conversation-intelligence API settings.
    #[serde(default)]
    pub conversations: ConversationsConfig,

    /// Retry/backoff and timeout policy shared by every outbound call.
    #[serde(default)]
    pub http: HttpConfig,

    /// Per-run defaults.
    #[serde(default)]
    pub run: RunDefaults,
}

/// `[crm]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrmConfig {
    /// API origin.
    #[serde(default = "default_crm_base_url")]
    pub base_url: String,

    /// Name of the env var holding the private app token.
    #[serde(default = "default_crm_token_env")]
    pub token_env: String,

    /// Name of the env var holding the list identifier.
    #[serde(default = "default_list_id_env")]
    pub list_id_env: String,

    /// Page size for list membership paging.
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Records per batch read (capped at [`MAX_BATCH_SIZE`]).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for CrmConfig {
    fn default() -> Self {
        Self {
            base_url: default_crm_base_url(),
            token_env: default_crm_token_env(),
            list_id_env: default_list_id_env(),
            page_size: default_page_size(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_crm_base_url() -> String {
    "https://api.hubapi.com".into()
}
fn default_crm_token_env() -> String {
    "HUBSPOT_TOKEN".into()
}
fn default_list_id_env() -> String {
    "HUBSPOT_LIST_ID".into()
}
fn default_page_size() -> u32 {
    100
}
fn default_batch_size() -> usize {
    MAX_BATCH_SIZE
}

/// `[conversations]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationsConfig {
    /// API origin.
    #[serde(default = "default_conversations_base_url")]
    pub base_url: String,

    /// Name of the env var holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Meetings requested per page.
    #[serde(default = "default_page_limit")]
    pub page_limit: u32,

    /// Maximum pages read per organizer and parameter convention.
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
}

impl Default for ConversationsConfig {
    fn default() -> Self {
        Self {
            base_url: default_conversations_base_url(),
            api_key_env: default_api_key_env(),
            page_limit: default_page_limit(),
            max_pages: default_max_pages(),
        }
    }
}

fn default_conversations_base_url() -> String {
    "https://api.avoma.com".into()
}
fn default_api_key_env() -> String {
    "AVOMA_API_KEY".into()
}
fn default_page_limit() -> u32 {
    100
}
fn default_max_pages() -> u32 {
    5
}

/// `[http]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Hard timeout for a single HTTP call.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Total attempts per call, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry; doubles on each further retry.
    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: f64,

    /// Ceiling for a single backoff delay.
    #[serde(default = "default_backoff_cap_secs")]
    pub backoff_cap_secs: f64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
            backoff_base_secs: default_backoff_base_secs(),
            backoff_cap_secs: default_backoff_cap_secs(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    45
}
fn default_max_attempts() -> u32 {
    5
}
fn default_backoff_base_secs() -> f64 {
    0.7
}
fn default_backoff_cap_secs() -> f64 {
    12.0
}

/// `[run]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunDefaults {
    /// How far back meetings are considered.
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,

    /// Pause after each paginated fetch, batch read, and delivery.
    #[serde(default = "default_delay_secs")]
    pub delay_secs: f64,

    /// Name of the env var holding the destination webhook URL.
    #[serde(default = "default_webhook_url_env")]
    pub webhook_url_env: String,

    /// Value of the `source` field in every delivered payload.
    #[serde(default = "default_source_tag")]
    pub source_tag: String,
}

impl Default for RunDefaults {
    fn default() -> Self {
        Self {
            lookback_days: default_lookback_days(),
            delay_secs: default_delay_secs(),
            webhook_url_env: default_webhook_url_env(),
            source_tag: default_source_tag(),
        }
    }
}

fn default_lookback_days() -> u32 {
    365
}
fn default_delay_secs() -> f64 {
    0.5
}
fn default_webhook_url_env() -> String {
    "WEBHOOK_URL".into()
}
fn default_source_tag() -> String {
    "hs_list_avoma_plaintext".into()
}

// ---------------------------------------------------------------------------
// Run config (runtime, merged from config + env + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime configuration for one pipeline run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// CRM API origin, without trailing slash.
    pub crm_base_url: String,
    /// CRM bearer token.
    pub crm_token: String,
    /// CRM list whose members are processed.
    pub list_id: String,
    /// List membership page size.
    pub crm_page_size: u32,
    /// Records per batch read.
    pub batch_size: usize,
    /// Conversation API origin, without trailing slash.
    pub conversations_base_url: String,
    /// Conversation API bearer key.
    pub conversations_api_key: String,
    /// Meetings requested per page.
    pub page_limit: u32,
    /// Maximum pages per organizer and convention.
    pub max_pages: u32,
    /// Destination for delivery records.
    pub webhook_url: Url,
    /// Lookback window in days.
    pub lookback_days: u32,
    /// Inter-call pacing delay.
    pub delay: Duration,
    /// If non-empty, only these leaf emails are processed.
    pub only_emails: BTreeSet<String>,
    /// Retry/timeout policy.
    pub http: HttpConfig,
    /// `source` tag stamped on payloads.
    pub source_tag: String,
}

impl RunConfig {
    /// Resolve a run config from the app config and the process environment.
    ///
    /// `list_id` and `webhook_url` take precedence over their env vars when given.
    pub fn resolve(
        app: &AppConfig,
        list_id: Option<String>,
        webhook_url: Option<String>,
    ) -> Result<Self> {
        Self::resolve_with(app, list_id, webhook_url, |name| std::env::var(name).ok())
    }

    /// Like [`RunConfig::resolve`], reading variables through `lookup`.
    pub fn resolve_with(
        app: &AppConfig,
        list_id: Option<String>,
        webhook_url: Option<String>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let fetch = |env: &str, explicit: Option<String>| {
            explicit
                .filter(|v| !v.trim().is_empty())
                .or_else(|| lookup(env).filter(|v| !v.trim().is_empty()))
        };

        let token = fetch(&app.crm.token_env, None);
        let list = fetch(&app.crm.list_id_env, list_id);
        let key = fetch(&app.conversations.api_key_env, None);
        let hook = fetch(&app.run.webhook_url_env, webhook_url);

        let (Some(token), Some(list), Some(key), Some(hook)) =
            (token.clone(), list.clone(), key.clone(), hook.clone())
        else {
            let missing: Vec<&str> = [
                (&app.crm.token_env, &token),
                (&app.crm.list_id_env, &list),
                (&app.conversations.api_key_env, &key),
                (&app.run.webhook_url_env, &hook),
            ]
            .into_iter()
            .filter(|(_, value)| value.is_none())
            .map(|(env, _)| env.as_str())
            .collect();
            return Err(CallsyncError::config(format!(
                "Missing env: {}",
                missing.join(", ")
            )));
        };

        let webhook_url = Url::parse(hook.trim())
            .map_err(|e| CallsyncError::config(format!("invalid webhook URL: {e}")))?;

        Ok(Self {
            crm_base_url: validate_base_url(&app.crm.base_url)?,
            crm_token: token,
            list_id: list.trim().to_string(),
            crm_page_size: app.crm.page_size.max(1),
            batch_size: app.crm.batch_size.clamp(1, MAX_BATCH_SIZE),
            conversations_base_url: validate_base_url(&app.conversations.base_url)?,
            conversations_api_key: key,
            page_limit: app.conversations.page_limit.max(1),
            max_pages: app.conversations.max_pages.max(1),
            webhook_url,
            lookback_days: app.run.lookback_days,
            delay: secs_to_duration(app.run.delay_secs),
            only_emails: BTreeSet::new(),
            http: app.http.clone(),
            source_tag: app.run.source_tag.clone(),
        })
    }

    /// Restrict the run to the given leaf emails (case-insensitive).
    pub fn with_only_emails<I, S>(mut self, emails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.only_emails = emails
            .into_iter()
            .filter_map(|e| normalize_email(e.as_ref()))
            .collect();
        self
    }
}

/// Check that a base URL parses and strip any trailing slash.
pub fn validate_base_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    Url::parse(trimmed)
        .map_err(|e| CallsyncError::config(format!("invalid base URL '{raw}': {e}")))?;
    Ok(trimmed.to_string())
}

/// Convert fractional seconds to a `Duration`, treating negatives and NaN as zero.
pub fn secs_to_duration(secs: f64) -> Duration {
    if secs.is_finite() && secs > 0.0 {
        Duration::from_nanos((secs * 1e9).round() as u64)
    } else {
        Duration::ZERO
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.callsync/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| CallsyncError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.callsync/callsync.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| CallsyncError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| CallsyncError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| CallsyncError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| CallsyncError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| CallsyncError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read each named env var, failing with one error that lists every missing name.
pub fn require_env(names: &[&str]) -> Result<Vec<String>> {
    let mut values = Vec::with_capacity(names.len());
    let mut missing = Vec::new();

    for name in names {
        match std::env::var(name) {
            Ok(val) if !val.trim().is_empty() => values.push(val),
            _ => missing.push(*name),
        }
    }

    if missing.is_empty() {
        Ok(values)
    } else {
        Err(CallsyncError::config(format!(
            "Missing env: {}",
            missing.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("HUBSPOT_TOKEN"));
        assert!(toml_str.contains("AVOMA_API_KEY"));
        assert!(toml_str.contains("backoff_base_secs"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.run.lookback_days, 365);
        assert_eq!(parsed.conversations.max_pages, 5);
        assert_eq!(parsed.http.max_attempts, 5);
        assert_eq!(parsed.http.backoff_base_secs, 0.7);
        assert_eq!(parsed.http.backoff_cap_secs, 12.0);
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let toml_str = r#"
[conversations]
max_pages = 2

[run]
delay_secs = 0.0
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.conversations.max_pages, 2);
        assert_eq!(config.conversations.page_limit, 100);
        assert_eq!(config.run.delay_secs, 0.0);
        assert_eq!(config.run.lookback_days, 365);
        assert_eq!(config.crm.base_url, "https://api.hubapi.com");
    }

    #[test]
    fn resolve_reports_every_missing_variable() {
        let app = AppConfig::default();
        let err = RunConfig::resolve_with(&app, None, None, env_of(&[("HUBSPOT_TOKEN", "t")]))
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("HUBSPOT_LIST_ID"));
        assert!(msg.contains("AVOMA_API_KEY"));
        assert!(msg.contains("WEBHOOK_URL"));
        assert!(!msg.contains("HUBSPOT_TOKEN"));
    }

    #[test]
    fn resolve_prefers_explicit_values() {
        let app = AppConfig::default();
        let env = env_of(&[
            ("HUBSPOT_TOKEN", "crm-token"),
            ("HUBSPOT_LIST_ID", "from-env"),
            ("AVOMA_API_KEY", "conv-key"),
            ("WEBHOOK_URL", "https://hooks.example.com/env"),
        ]);
        let run = RunConfig::resolve_with(
            &app,
            Some("42".into()),
            Some("https://hooks.example.com/flag".into()),
            env,
        )
        .expect("resolve");

        assert_eq!(run.list_id, "42");
        assert_eq!(run.webhook_url.as_str(), "https://hooks.example.com/flag");
        assert_eq!(run.crm_token, "crm-token");
        assert_eq!(run.delay, Duration::from_millis(500));
        assert_eq!(run.batch_size, MAX_BATCH_SIZE);
    }

    #[test]
    fn resolve_rejects_bad_webhook_url() {
        let app = AppConfig::default();
        let env = env_of(&[
            ("HUBSPOT_TOKEN", "t"),
            ("HUBSPOT_LIST_ID", "1"),
            ("AVOMA_API_KEY", "k"),
            ("WEBHOOK_URL", "not a url"),
        ]);
        let err = RunConfig::resolve_with(&app, None, None, env).unwrap_err();
        assert!(err.to_string().contains("invalid webhook URL"));
    }

    #[test]
    fn only_emails_are_normalized() {
        let app = AppConfig::default();
        let env = env_of(&[
            ("HUBSPOT_TOKEN", "t"),
            ("HUBSPOT_LIST_ID", "1"),
            ("AVOMA_API_KEY", "k"),
            ("WEBHOOK_URL", "https://hooks.example.com"),
        ]);
        let run = RunConfig::resolve_with(&app, None, None, env)
            .expect("resolve")
            .with_only_emails([" Ada@Example.com ", ""]);
        assert_eq!(run.only_emails.len(), 1);
        assert!(run.only_emails.contains("ada@example.com"));
    }

    #[test]
    fn base_url_trailing_slash_is_stripped() {
        assert_eq!(
            validate_base_url("https://api.example.com/").unwrap(),
            "https://api.example.com"
        );
        assert!(validate_base_url("::nope").is_err());
    }

    #[test]
    fn require_env_lists_missing() {
        let result = require_env(&["CALLSYNC_TEST_NONEXISTENT_KEY_12345"]);
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("CALLSYNC_TEST_NONEXISTENT_KEY_12345")
        );
    }

    #[test]
    fn negative_delay_is_zero() {
        assert_eq!(secs_to_duration(-1.0), Duration::ZERO);
        assert_eq!(secs_to_duration(f64::NAN), Duration::ZERO);
        assert_eq!(secs_to_duration(0.25), Duration::from_millis(250));
    }
}
