//! Feed catalog configuration for the GTFS-RT archiver.
//!
//! The catalog is a hierarchical YAML file (agencies, optional systems,
//! realtime feeds) that is validated and flattened into a flat [`FeedSpec`]
//! list at startup. Runtime knobs come from environment variables via
//! [`Settings`].

pub mod catalog;
pub mod error;
pub mod settings;
pub mod spec;
pub mod validation;

pub use catalog::{AgencyEntry, CatalogFile, Defaults, FeedEntry, IntervalDefaults, SystemEntry};
pub use error::{ConfigError, ConfigResult};
pub use settings::{LogFormat, Settings};
pub use spec::{flatten_catalog, load_feed_specs, AuthPlacement, AuthSpec, FeedSpec, FeedType};
