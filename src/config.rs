use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

use crate::api::{DEFAULT_FANOUT_LIMIT, DEFAULT_MAX_SEARCH_HITS};
use crate::session::{Credentials, RenewalPolicy};

const URL_ENV: &str = "DEVPORTAL_URL";
const EMAIL_ENV: &str = "DEVPORTAL_EMAIL";
const PASSWORD_ENV: &str = "DEVPORTAL_PASSWORD";
const FANOUT_ENV: &str = "DEVPORTAL_FANOUT_LIMIT";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub base_url: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_fanout_limit")]
    pub fanout_limit: usize,
    #[serde(default = "default_max_search_hits")]
    pub max_search_hits: usize,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub renewal: RenewalPolicy,
}

fn default_fanout_limit() -> usize {
    DEFAULT_FANOUT_LIMIT
}
fn default_max_search_hits() -> usize {
    DEFAULT_MAX_SEARCH_HITS
}
fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            email: None,
            password: None,
            fanout_limit: default_fanout_limit(),
            max_search_hits: default_max_search_hits(),
            request_timeout_secs: default_request_timeout_secs(),
            renewal: RenewalPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Load a JSON config file, then apply environment overrides.
    pub fn from_file(path: &str) -> Result<Self> {
        let raw = fs::read_to_string(path).with_context(|| format!("reading config file {path}"))?;
        let cfg: ClientConfig = serde_json::from_str(&raw).context("parsing config JSON")?;
        cfg.with_env_overrides()
    }

    /// Defaults plus environment overrides, for running without a file.
    pub fn from_env() -> Result<Self> {
        Self::default().with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(url) = std::env::var(URL_ENV) {
            self.base_url = url;
        }
        if let Ok(email) = std::env::var(EMAIL_ENV) {
            self.email = Some(email);
        }
        if let Ok(password) = std::env::var(PASSWORD_ENV) {
            self.password = Some(password);
        }
        if let Ok(limit) = std::env::var(FANOUT_ENV) {
            self.fanout_limit = limit
                .parse()
                .with_context(|| format!("{FANOUT_ENV} must be a positive integer, got {limit:?}"))?;
        }
        if self.fanout_limit == 0 {
            anyhow::bail!("fanout_limit must be at least 1");
        }
        Ok(self)
    }

    pub fn credentials(&self) -> Result<Credentials> {
        let email = self
            .email
            .clone()
            .with_context(|| format!("no login email configured (set {EMAIL_ENV})"))?;
        let password = self
            .password
            .clone()
            .with_context(|| format!("no password configured (set {PASSWORD_ENV})"))?;
        Ok(Credentials::new(email, password))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
