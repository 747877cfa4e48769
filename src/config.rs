//! Layered configuration: `enroll.toml` → environment → CLI.
//!
//! # Configuration File Format
//!
//! ```toml
//! [defaults]
//! country_code = "+91"
//! batch_size = 5
//! retry_attempts = 2
//! retry_backoff_ms = 2000
//! search_timeout_secs = 15
//! login_timeout_secs = 60
//! settle_ms = 1000
//!
//! [markers]
//! already_in_group = "Already added to community"
//! invite = "Invite"
//!
//! [driver]
//! app_url = "https://web.whatsapp.com"
//! profile_dir = "/home/me/.config/enroll/profile"
//! # chrome_executable = "/usr/bin/chromium"
//! # debugging_url = "http://127.0.0.1:9222"
//! headless = false
//!
//! [selectors]
//! search_field = "//div[@role='dialog']//div[@contenteditable='true']"
//! contact_entry = "//div[@role='listitem']"
//! ```
//!
//! Every key is optional. `{name}` in `selectors.group_title` is replaced by
//! the quoted group name.

use crate::errors::EnrollError;
use crate::retry::RetryPolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = "enroll.toml";
pub const DEFAULT_STATE_DIR: &str = ".enroll";

/// Run defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsSection {
    /// Prepended to roster numbers that have no leading `+`
    #[serde(default = "default_country_code")]
    pub country_code: String,
    /// Batch target used when the operator accepts the default
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Attempts per identity before asking the operator
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// How long to wait for search results to render
    #[serde(default = "default_search_timeout_secs")]
    pub search_timeout_secs: u64,
    /// How long to wait for the app to load after the browser opens
    #[serde(default = "default_login_timeout_secs")]
    pub login_timeout_secs: u64,
    /// Pause after typing a number into the search field
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

fn default_country_code() -> String {
    "+91".to_string()
}

fn default_batch_size() -> usize {
    5
}

fn default_retry_attempts() -> u32 {
    2
}

fn default_retry_backoff_ms() -> u64 {
    2000
}

fn default_search_timeout_secs() -> u64 {
    15
}

fn default_login_timeout_secs() -> u64 {
    60
}

fn default_settle_ms() -> u64 {
    1000
}

impl Default for DefaultsSection {
    fn default() -> Self {
        Self {
            country_code: default_country_code(),
            batch_size: default_batch_size(),
            retry_attempts: default_retry_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            search_timeout_secs: default_search_timeout_secs(),
            login_timeout_secs: default_login_timeout_secs(),
            settle_ms: default_settle_ms(),
        }
    }
}

/// UI texts the driver adapter looks for inside a contact entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkersSection {
    #[serde(default = "default_already_in_group")]
    pub already_in_group: String,
    #[serde(default = "default_invite")]
    pub invite: String,
}

fn default_already_in_group() -> String {
    "Already added to community".to_string()
}

fn default_invite() -> String {
    "Invite".to_string()
}

impl Default for MarkersSection {
    fn default() -> Self {
        Self {
            already_in_group: default_already_in_group(),
            invite: default_invite(),
        }
    }
}

/// Browser the run is driven through.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverSection {
    #[serde(default = "default_app_url")]
    pub app_url: String,
    /// Browser profile to reuse so the app stays logged in between runs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_dir: Option<PathBuf>,
    /// Chrome binary to launch instead of the one found on the system
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chrome_executable: Option<PathBuf>,
    /// Attach to a Chrome started with `--remote-debugging-port` instead of
    /// launching one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debugging_url: Option<String>,
    #[serde(default)]
    pub headless: bool,
}

fn default_app_url() -> String {
    "https://web.whatsapp.com".to_string()
}

impl Default for DriverSection {
    fn default() -> Self {
        Self {
            app_url: default_app_url(),
            profile_dir: None,
            chrome_executable: None,
            debugging_url: None,
            headless: false,
        }
    }
}

/// XPath expressions used by the browser adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorsSection {
    #[serde(default = "default_app_ready")]
    pub app_ready: String,
    #[serde(default = "default_group_title")]
    pub group_title: String,
    #[serde(default = "default_search_field")]
    pub search_field: String,
    #[serde(default = "default_contact_entry")]
    pub contact_entry: String,
    #[serde(default = "default_checked_entry")]
    pub checked_entry: String,
}

fn default_app_ready() -> String {
    "//div[contains(concat(' ', normalize-space(@class), ' '), ' two ')]".to_string()
}

fn default_group_title() -> String {
    "//span[@title={name}]".to_string()
}

fn default_search_field() -> String {
    "//div[@role='dialog']//div[@contenteditable='true']".to_string()
}

fn default_contact_entry() -> String {
    "//div[@role='listitem']".to_string()
}

fn default_checked_entry() -> String {
    "//div[@role='listitem'][.//input[@type='checkbox' and @checked]]".to_string()
}

impl Default for SelectorsSection {
    fn default() -> Self {
        Self {
            app_ready: default_app_ready(),
            group_title: default_group_title(),
            search_field: default_search_field(),
            contact_entry: default_contact_entry(),
            checked_entry: default_checked_entry(),
        }
    }
}

/// The complete enroll.toml structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnrollToml {
    #[serde(default)]
    pub defaults: DefaultsSection,
    #[serde(default)]
    pub markers: MarkersSection,
    #[serde(default)]
    pub driver: DriverSection,
    #[serde(default)]
    pub selectors: SelectorsSection,
}

impl EnrollToml {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse enroll.toml")
    }

    /// Load `enroll.toml` from the state directory, or defaults if absent.
    pub fn load_or_default(state_dir: &Path) -> Result<Self> {
        let path = state_dir.join(CONFIG_FILE_NAME);
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Apply `ENROLL_*` overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(code) = lookup("ENROLL_COUNTRY_CODE") {
            self.defaults.country_code = code;
        }
        if let Some(size) = lookup("ENROLL_BATCH_SIZE") {
            self.defaults.batch_size = size
                .trim()
                .parse()
                .with_context(|| format!("ENROLL_BATCH_SIZE is not a number: '{}'", size))?;
        }
        if let Some(url) = lookup("ENROLL_DEBUGGING_URL") {
            self.driver.debugging_url = Some(url);
        }
        if let Some(path) = lookup("ENROLL_CHROME") {
            self.driver.chrome_executable = Some(PathBuf::from(path));
        }
        if let Some(dir) = lookup("ENROLL_PROFILE_DIR") {
            self.driver.profile_dir = Some(PathBuf::from(dir));
        }
        Ok(())
    }

    /// Non-fatal problems worth showing before a run.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.defaults.batch_size == 0 {
            warnings.push("defaults.batch_size is 0; batches will use a size of 1".to_string());
        }
        if self.defaults.retry_attempts == 0 {
            warnings.push(
                "defaults.retry_attempts is 0; each number still gets one attempt".to_string(),
            );
        }
        if !self.defaults.country_code.chars().any(|c| c.is_ascii_digit()) {
            warnings.push(format!(
                "defaults.country_code '{}' contains no digits",
                self.defaults.country_code
            ));
        }
        if self.markers.already_in_group.trim().is_empty() {
            warnings.push("markers.already_in_group is empty; every entry will look like a member".to_string());
        }
        if self.markers.invite.trim().is_empty() {
            warnings.push("markers.invite is empty; every entry will look invitable".to_string());
        }
        if !self.selectors.group_title.contains("{name}") {
            warnings.push("selectors.group_title has no {name} placeholder".to_string());
        }
        warnings
    }
}

/// Command-line overrides.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub state_dir: Option<PathBuf>,
    pub config_file: Option<PathBuf>,
    pub batch_size: Option<usize>,
    pub country_code: Option<String>,
    pub debugging_url: Option<String>,
    pub yes: bool,
    pub verbose: bool,
}

/// Resolved configuration for one run.
#[derive(Debug, Clone)]
pub struct Config {
    pub group: String,
    pub roster_file: PathBuf,
    pub state_dir: PathBuf,
    pub toml: EnrollToml,
    /// Fixed batch target; skips the per-batch size prompt
    pub batch_size: Option<usize>,
    pub yes: bool,
    pub verbose: bool,
}

impl Config {
    pub fn new(
        group: String,
        roster_file: PathBuf,
        cli: CliOverrides,
    ) -> Result<Self, EnrollError> {
        Self::with_env(group, roster_file, cli, |key| std::env::var(key).ok())
    }

    pub fn with_env<F>(
        group: String,
        roster_file: PathBuf,
        cli: CliOverrides,
        lookup: F,
    ) -> Result<Self, EnrollError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if group.trim().is_empty() {
            return Err(EnrollError::Usage("group name must not be empty".to_string()));
        }
        let state_dir = cli
            .state_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DIR));

        let mut toml = match &cli.config_file {
            Some(path) => EnrollToml::load(path),
            None => EnrollToml::load_or_default(&state_dir),
        }
        .and_then(|mut t| {
            t.apply_env(&lookup)?;
            Ok(t)
        })
        .map_err(|e| EnrollError::Config(format!("{:#}", e)))?;

        if let Some(code) = cli.country_code {
            toml.defaults.country_code = code;
        }
        if let Some(url) = cli.debugging_url {
            toml.driver.debugging_url = Some(url);
        }
        if cli.batch_size == Some(0) {
            return Err(EnrollError::Usage("--batch-size must be at least 1".to_string()));
        }

        Ok(Self {
            group,
            roster_file,
            state_dir,
            toml,
            batch_size: cli.batch_size,
            yes: cli.yes,
            verbose: cli.verbose,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.toml.defaults.retry_attempts,
            Duration::from_millis(self.toml.defaults.retry_backoff_ms),
        )
    }

    pub fn default_batch_size(&self) -> usize {
        self.toml.defaults.batch_size.max(1)
    }

    pub fn search_timeout(&self) -> Duration {
        Duration::from_secs(self.toml.defaults.search_timeout_secs)
    }

    pub fn login_timeout(&self) -> Duration {
        Duration::from_secs(self.toml.defaults.login_timeout_secs)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.toml.defaults.settle_ms)
    }

    pub fn validate(&self) -> Vec<String> {
        self.toml.validate()
    }
}
