//! Runtime configuration.
//!
//! Settings come from an optional JSON file, then environment variables
//! (after `.env` is loaded by the binary) override individual fields:
//!
//! ```json
//! {
//!   "live_base_url": "https://eta.example.com/api",
//!   "timezone": "Asia/Kolkata",
//!   "max_radius_km": 2.0,
//!   "refresh_interval_secs": 30
//! }
//! ```
//!
//! The live API credential is never compiled in; it is read from
//! `LIVE_ETA_TOKEN` (or the file) and sent as a header or query parameter.

use anyhow::{Context, Result, anyhow};
use chrono::Duration;
use chrono_tz::Tz;
use serde::Deserialize;
use std::time::Duration as StdDuration;

use crate::clock::TimeWindow;
use crate::fetch::auth::{ApiKey, UrlParam};
use crate::fetch::{BasicClient, HttpClient};
use crate::live::{LiveClient, NormalizeOptions};
use crate::locator::DEFAULT_MAX_RADIUS_KM;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Live ETA endpoint. Without it the live tier is skipped.
    pub live_base_url: Option<String>,
    pub live_token: Option<String>,
    /// Header carrying the token; `Authorization` gets a `Bearer` prefix.
    pub live_token_header: String,
    /// When set, the token goes in this query parameter instead of a header.
    pub live_token_param: Option<String>,
    pub timezone: String,
    pub stop_layer: String,
    pub max_radius_km: f64,
    pub window_minutes: i64,
    pub live_grace_minutes: i64,
    pub fresh_telemetry_minutes: i64,
    pub refresh_interval_secs: u64,
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            live_base_url: None,
            live_token: None,
            live_token_header: "Authorization".to_string(),
            live_token_param: None,
            timezone: "Asia/Kolkata".to_string(),
            stop_layer: "bus-stops".to_string(),
            max_radius_km: DEFAULT_MAX_RADIUS_KM,
            window_minutes: 60,
            live_grace_minutes: 5,
            fresh_telemetry_minutes: 10,
            refresh_interval_secs: 30,
            request_timeout_secs: 30,
            connect_timeout_secs: 10,
        }
    }
}

impl Config {
    /// Loads the JSON file at `path`.
    pub fn load(path: &str) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("reading config file '{path}'"))?;
        serde_json::from_str(&content).with_context(|| format!("parsing config file '{path}'"))
    }

    /// File (when given) plus environment overrides.
    pub fn resolve(path: Option<&str>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::load(p)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.normalize_options()?;
        Ok(config)
    }

    /// Overrides fields from `lookup`, which maps environment variable
    /// names to values.
    pub fn apply_overrides<F: Fn(&str) -> Option<String>>(&mut self, lookup: F) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = non_empty("LIVE_ETA_BASE_URL") {
            self.live_base_url = Some(v);
        }
        if let Some(v) = non_empty("LIVE_ETA_TOKEN") {
            self.live_token = Some(v);
        }
        if let Some(v) = non_empty("LIVE_ETA_TOKEN_HEADER") {
            self.live_token_header = v;
        }
        if let Some(v) = non_empty("LIVE_ETA_TOKEN_PARAM") {
            self.live_token_param = Some(v);
        }
        if let Some(v) = non_empty("TRANSIT_TZ") {
            self.timezone = v;
        }
    }

    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| anyhow!("invalid timezone '{}': {}", self.timezone, e))
    }

    pub fn time_window(&self) -> Result<TimeWindow> {
        TimeWindow::try_minutes(self.window_minutes)
            .with_context(|| format!("window_minutes {} is out of range", self.window_minutes))
    }

    pub fn normalize_options(&self) -> Result<NormalizeOptions> {
        let window = self
            .time_window()?
            .try_with_grace_minutes(self.live_grace_minutes)
            .with_context(|| format!("live_grace_minutes {} is out of range", self.live_grace_minutes))?;
        let fresh_for = Duration::try_minutes(self.fresh_telemetry_minutes).with_context(|| {
            format!("fresh_telemetry_minutes {} is out of range", self.fresh_telemetry_minutes)
        })?;
        Ok(NormalizeOptions {
            window,
            fresh_for,
            ..NormalizeOptions::default()
        })
    }

    pub fn refresh_interval(&self) -> StdDuration {
        StdDuration::from_secs(self.refresh_interval_secs.max(1))
    }

    /// HTTP client with timeouts and the configured credential applied.
    pub fn http_client(&self) -> Result<Box<dyn HttpClient>> {
        let basic = BasicClient::with_timeouts(
            StdDuration::from_secs(self.request_timeout_secs),
            StdDuration::from_secs(self.connect_timeout_secs),
        )?;

        let Some(token) = &self.live_token else {
            return Ok(Box::new(basic));
        };

        if let Some(param) = &self.live_token_param {
            let client = UrlParam::new(basic, param, token).context("building live ETA credential parameter")?;
            return Ok(Box::new(client));
        }

        let client = if self.live_token_header.eq_ignore_ascii_case("authorization") {
            ApiKey::bearer(basic, token)
        } else {
            ApiKey::new(basic, &self.live_token_header, token)
        }
        .context("building live ETA credential header")?;
        Ok(Box::new(client))
    }

    /// Live client, or `None` when no endpoint is configured.
    pub fn live_client(&self) -> Result<Option<LiveClient<Box<dyn HttpClient>>>> {
        let Some(base_url) = &self.live_base_url else {
            return Ok(None);
        };
        Ok(Some(LiveClient::new(
            self.http_client()?,
            base_url.clone(),
            self.normalize_options()?,
        )))
    }
}
