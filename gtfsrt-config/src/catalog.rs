//! Raw feed catalog schema (pre-flattening)
//!
//! Mirrors the YAML layout: file-level defaults plus a list of agencies,
//! each carrying either direct feeds or named systems that carry feeds.

use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

use crate::error::{ConfigError, ConfigResult};
use crate::spec::{AuthSpec, FeedType};
use crate::validation::{validate_range, validate_secret_name, validate_slug};
use gtfsrt_resilience::RetryPolicy;

/// Per-feed-type default polling intervals in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntervalDefaults {
    pub vehicle_positions: u32,
    pub trip_updates: u32,
    pub service_alerts: u32,
}

impl Default for IntervalDefaults {
    fn default() -> Self {
        Self {
            vehicle_positions: 20,
            trip_updates: 20,
            service_alerts: 60,
        }
    }
}

impl IntervalDefaults {
    /// Default interval for a feed type.
    pub fn for_feed_type(&self, feed_type: FeedType) -> u32 {
        match feed_type {
            FeedType::VehiclePositions => self.vehicle_positions,
            FeedType::TripUpdates => self.trip_updates,
            FeedType::ServiceAlerts => self.service_alerts,
        }
    }
}

/// File-level defaults applied to feeds that do not override them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Defaults {
    pub intervals: IntervalDefaults,
    pub timeout_seconds: u32,
    pub retry: RetryPolicy,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            intervals: IntervalDefaults::default(),
            timeout_seconds: 30,
            retry: RetryPolicy::default(),
        }
    }
}

/// One realtime feed under an agency or system, before flattening.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedEntry {
    pub feed_type: FeedType,
    pub url: Url,
    pub name: Option<String>,
    pub interval_seconds: Option<u32>,
    pub timeout_seconds: Option<u32>,
    pub retry: Option<RetryPolicy>,
    pub auth: Option<AuthSpec>,
}

/// A sub-system within an agency (e.g. a bus division).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemEntry {
    pub id: String,
    pub name: String,
    pub schedule_url: Option<Url>,
    pub auth: Option<AuthSpec>,
    pub feeds: Vec<FeedEntry>,
}

/// A transit agency with either direct feeds or systems, never both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgencyEntry {
    pub id: String,
    pub name: String,
    pub schedule_url: Option<Url>,
    pub auth: Option<AuthSpec>,
    pub feeds: Option<Vec<FeedEntry>>,
    pub systems: Option<Vec<SystemEntry>>,
}

/// Top-level catalog file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogFile {
    #[serde(default)]
    pub defaults: Defaults,
    pub agencies: Vec<AgencyEntry>,
}

impl CatalogFile {
    /// Load and validate a catalog from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let catalog: CatalogFile = serde_yaml::from_str(&content)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Validate every node, reporting the catalog path of the first failure.
    pub fn validate(&self) -> ConfigResult<()> {
        self.defaults
            .retry
            .validate()
            .map_err(|m| ConfigError::validation("defaults.retry", m))?;
        validate_range(
            self.defaults.timeout_seconds,
            1,
            120,
            "timeout_seconds",
            "defaults",
        )?;
        for (feed_type, interval) in [
            (FeedType::VehiclePositions, self.defaults.intervals.vehicle_positions),
            (FeedType::TripUpdates, self.defaults.intervals.trip_updates),
            (FeedType::ServiceAlerts, self.defaults.intervals.service_alerts),
        ] {
            validate_range(
                interval,
                5,
                3600,
                feed_type.as_str(),
                "defaults.intervals",
            )?;
        }

        for agency in &self.agencies {
            agency.validate()?;
        }
        Ok(())
    }
}

impl AgencyEntry {
    fn validate(&self) -> ConfigResult<()> {
        let path = format!("agency {:?}", self.id);
        validate_slug(&self.id, "id", &path)?;

        let has_feeds = self.feeds.as_ref().is_some_and(|f| !f.is_empty());
        let has_systems = self.systems.as_ref().is_some_and(|s| !s.is_empty());
        match (has_feeds, has_systems) {
            (true, true) => {
                return Err(ConfigError::validation(
                    path,
                    "agency cannot have both feeds and systems",
                ))
            }
            (false, false) => {
                return Err(ConfigError::validation(
                    path,
                    "agency must have either feeds or systems",
                ))
            }
            _ => {}
        }

        if let Some(auth) = &self.auth {
            auth.validate(&path)?;
        }
        for (i, feed) in self.feeds.iter().flatten().enumerate() {
            feed.validate(&format!("{path} feed[{i}]"))?;
        }
        for system in self.systems.iter().flatten() {
            system.validate(&path)?;
        }
        Ok(())
    }
}

impl SystemEntry {
    fn validate(&self, agency_path: &str) -> ConfigResult<()> {
        let path = format!("{agency_path} system {:?}", self.id);
        validate_slug(&self.id, "id", &path)?;
        if self.feeds.is_empty() {
            return Err(ConfigError::validation(
                path,
                "system must have at least one feed",
            ));
        }
        if let Some(auth) = &self.auth {
            auth.validate(&path)?;
        }
        for (i, feed) in self.feeds.iter().enumerate() {
            feed.validate(&format!("{path} feed[{i}]"))?;
        }
        Ok(())
    }
}

impl FeedEntry {
    fn validate(&self, path: &str) -> ConfigResult<()> {
        match self.url.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(ConfigError::validation(
                    path,
                    format!("url scheme must be http or https, got {scheme:?}"),
                ))
            }
        }
        if let Some(interval) = self.interval_seconds {
            validate_range(interval, 5, 3600, "interval_seconds", path)?;
        }
        if let Some(timeout) = self.timeout_seconds {
            validate_range(timeout, 1, 120, "timeout_seconds", path)?;
        }
        if let Some(retry) = &self.retry {
            retry
                .validate()
                .map_err(|m| ConfigError::validation(path, m))?;
        }
        if let Some(auth) = &self.auth {
            auth.validate(path)?;
        }
        Ok(())
    }
}

impl AuthSpec {
    pub(crate) fn validate(&self, path: &str) -> ConfigResult<()> {
        validate_secret_name(&self.secret_name, path)?;
        if self.key.is_empty() {
            return Err(ConfigError::validation(path, "auth key cannot be empty"));
        }
        Ok(())
    }
}
