//! Flattened runtime feed specification
//!
//! [`FeedSpec`] is the immutable per-feed record the scheduler and fetcher
//! work from. Flattening walks the catalog tree applying inheritance in the
//! order feed, system, agency, file defaults.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use url::Url;

use crate::catalog::{AgencyEntry, CatalogFile, Defaults, FeedEntry, SystemEntry};
use crate::error::{ConfigError, ConfigResult};
use gtfsrt_resilience::RetryPolicy;

/// Types of GTFS-Realtime feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedType {
    VehiclePositions,
    TripUpdates,
    ServiceAlerts,
}

impl FeedType {
    /// Snake-case form used in object keys and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedType::VehiclePositions => "vehicle_positions",
            FeedType::TripUpdates => "trip_updates",
            FeedType::ServiceAlerts => "service_alerts",
        }
    }

    /// Hyphenated form used in generated feed ids.
    pub fn hyphenated(&self) -> &'static str {
        match self {
            FeedType::VehiclePositions => "vehicle-positions",
            FeedType::TripUpdates => "trip-updates",
            FeedType::ServiceAlerts => "service-alerts",
        }
    }

    /// Title-cased form used in generated feed names.
    pub fn title(&self) -> &'static str {
        match self {
            FeedType::VehiclePositions => "Vehicle Positions",
            FeedType::TripUpdates => "Trip Updates",
            FeedType::ServiceAlerts => "Service Alerts",
        }
    }

    pub fn all() -> [FeedType; 3] {
        [
            FeedType::VehiclePositions,
            FeedType::TripUpdates,
            FeedType::ServiceAlerts,
        ]
    }
}

impl fmt::Display for FeedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeedType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vehicle_positions" => Ok(FeedType::VehiclePositions),
            "trip_updates" => Ok(FeedType::TripUpdates),
            "service_alerts" => Ok(FeedType::ServiceAlerts),
            other => Err(format!("unknown feed type {other:?}")),
        }
    }
}

/// Where the resolved credential is placed on the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthPlacement {
    Header,
    Query,
}

/// Feed authentication resolved against the secret store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSpec {
    /// Credential placement on the outgoing request
    #[serde(rename = "type")]
    pub placement: AuthPlacement,

    /// Identifier of the secret in the external store
    pub secret_name: String,

    /// Header name or query parameter name
    pub key: String,

    /// Optional template; `${SECRET}` is replaced with the fetched value
    pub value: Option<String>,

    /// Populated once by the secret resolver, never serialized
    #[serde(skip)]
    pub resolved_value: Option<String>,
}

impl AuthSpec {
    /// Compute the concrete credential from a fetched secret.
    pub fn render(&self, secret: &str) -> String {
        match &self.value {
            Some(template) => template.replace("${SECRET}", secret),
            None => secret.to_string(),
        }
    }
}

/// Configuration for a single GTFS-RT feed, flattened for runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSpec {
    /// Stable unique identifier: `{agency_id}[-{system_id}]-{feed_type}`
    pub id: String,
    pub name: String,
    pub url: Url,
    pub feed_type: FeedType,

    // Agency/system context
    pub agency_id: String,
    pub agency_name: String,
    pub system_id: Option<String>,
    pub system_name: Option<String>,
    pub schedule_url: Option<Url>,

    // Runtime settings
    pub interval_seconds: u32,
    pub timeout_seconds: u32,
    pub retry: RetryPolicy,
    pub auth: Option<AuthSpec>,
}

/// Load a catalog file and flatten it into runtime feed specs.
pub fn load_feed_specs(path: impl AsRef<Path>) -> ConfigResult<Vec<FeedSpec>> {
    let catalog = CatalogFile::load(path)?;
    flatten_catalog(&catalog)
}

/// Flatten a validated catalog into one [`FeedSpec`] per realtime feed.
pub fn flatten_catalog(catalog: &CatalogFile) -> ConfigResult<Vec<FeedSpec>> {
    let mut specs = Vec::new();
    let mut seen = HashSet::new();

    for agency in &catalog.agencies {
        for feed in agency.feeds.iter().flatten() {
            specs.push(flatten_feed(feed, agency, None, &catalog.defaults));
        }
        for system in agency.systems.iter().flatten() {
            for feed in &system.feeds {
                specs.push(flatten_feed(feed, agency, Some(system), &catalog.defaults));
            }
        }
    }

    for spec in &specs {
        if !seen.insert(spec.id.clone()) {
            return Err(ConfigError::validation(
                format!("feed {:?}", spec.id),
                "duplicate feed id after flattening",
            ));
        }
    }

    Ok(specs)
}

fn flatten_feed(
    feed: &FeedEntry,
    agency: &AgencyEntry,
    system: Option<&SystemEntry>,
    defaults: &Defaults,
) -> FeedSpec {
    let id = match system {
        Some(system) => format!("{}-{}-{}", agency.id, system.id, feed.feed_type.hyphenated()),
        None => format!("{}-{}", agency.id, feed.feed_type.hyphenated()),
    };

    let name = feed.name.clone().unwrap_or_else(|| match system {
        Some(system) => format!("{} {} {}", agency.name, system.name, feed.feed_type.title()),
        None => format!("{} {}", agency.name, feed.feed_type.title()),
    });

    // Inheritance: feed, then system, then agency, then file defaults.
    let auth = feed
        .auth
        .clone()
        .or_else(|| system.and_then(|s| s.auth.clone()))
        .or_else(|| agency.auth.clone());

    let schedule_url = system
        .and_then(|s| s.schedule_url.clone())
        .or_else(|| agency.schedule_url.clone());

    FeedSpec {
        id,
        name,
        url: feed.url.clone(),
        feed_type: feed.feed_type,
        agency_id: agency.id.clone(),
        agency_name: agency.name.clone(),
        system_id: system.map(|s| s.id.clone()),
        system_name: system.map(|s| s.name.clone()),
        schedule_url,
        interval_seconds: feed
            .interval_seconds
            .unwrap_or_else(|| defaults.intervals.for_feed_type(feed.feed_type)),
        timeout_seconds: feed.timeout_seconds.unwrap_or(defaults.timeout_seconds),
        retry: feed.retry.clone().unwrap_or_else(|| defaults.retry.clone()),
        auth,
    }
}
