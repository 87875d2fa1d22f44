//! Environment-derived runtime settings

use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{ConfigError, ConfigResult};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Text,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "text" => Ok(LogFormat::Text),
            other => Err(format!("LOG_FORMAT must be json or text, got {other:?}")),
        }
    }
}

/// Application settings loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Path to the feed catalog YAML
    pub config_path: PathBuf,

    /// Target bucket for archived protobuf snapshots
    pub bucket: String,

    /// Global cap on concurrent fetch+write pipelines
    pub max_concurrent: usize,

    /// Port for the health/metrics server
    pub health_port: u16,

    pub log_level: String,
    pub log_format: LogFormat,

    /// Sharding for multi-replica deployments
    pub shard_index: u32,
    pub total_shards: u32,
}

impl Settings {
    /// Read settings from the process environment.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read settings through a lookup function (injectable for tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ConfigResult<Self> {
        let config_path = lookup("CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./feeds.yaml"));

        let bucket = lookup("GCS_BUCKET_RT_PROTOBUF")
            .ok_or_else(|| ConfigError::Env("GCS_BUCKET_RT_PROTOBUF is not set".to_string()))?;

        let max_concurrent = parse_or(&lookup, "MAX_CONCURRENT", 100usize)?;
        if !(1..=500).contains(&max_concurrent) {
            return Err(ConfigError::Env(format!(
                "MAX_CONCURRENT must be in [1, 500], got {max_concurrent}"
            )));
        }

        let health_port = parse_or(&lookup, "HEALTH_PORT", 8080u16)?;
        if health_port == 0 {
            return Err(ConfigError::Env("HEALTH_PORT cannot be 0".to_string()));
        }

        let log_level = lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string());
        let log_format = match lookup("LOG_FORMAT") {
            Some(raw) => raw.parse().map_err(ConfigError::Env)?,
            None => LogFormat::Json,
        };

        let shard_index = parse_or(&lookup, "SHARD_INDEX", 0u32)?;
        let total_shards = parse_or(&lookup, "TOTAL_SHARDS", 1u32)?;
        if total_shards == 0 {
            return Err(ConfigError::Env("TOTAL_SHARDS must be >= 1".to_string()));
        }
        if shard_index >= total_shards {
            return Err(ConfigError::Env(format!(
                "SHARD_INDEX ({shard_index}) must be less than TOTAL_SHARDS ({total_shards})"
            )));
        }

        Ok(Self {
            config_path,
            bucket,
            max_concurrent,
            health_port,
            log_level,
            log_format,
            shard_index,
            total_shards,
        })
    }
}

fn parse_or<T: FromStr>(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> ConfigResult<T>
where
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(raw) => raw
            .parse()
            .map_err(|e| ConfigError::Env(format!("invalid {name}: {e}"))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> ConfigResult<Settings> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let s = settings(&[("GCS_BUCKET_RT_PROTOBUF", "my-bucket")]).unwrap();
        assert_eq!(s.bucket, "my-bucket");
        assert_eq!(s.max_concurrent, 100);
        assert_eq!(s.health_port, 8080);
        assert_eq!(s.log_format, LogFormat::Json);
        assert_eq!(s.shard_index, 0);
        assert_eq!(s.total_shards, 1);
    }

    #[test]
    fn test_bucket_required() {
        assert!(settings(&[]).is_err());
    }

    #[test]
    fn test_max_concurrent_range() {
        let err = settings(&[
            ("GCS_BUCKET_RT_PROTOBUF", "b"),
            ("MAX_CONCURRENT", "501"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("MAX_CONCURRENT"));

        let err = settings(&[("GCS_BUCKET_RT_PROTOBUF", "b"), ("MAX_CONCURRENT", "0")]).unwrap_err();
        assert!(err.to_string().contains("MAX_CONCURRENT"));
    }

    #[test]
    fn test_shard_invariant() {
        let err = settings(&[
            ("GCS_BUCKET_RT_PROTOBUF", "b"),
            ("SHARD_INDEX", "3"),
            ("TOTAL_SHARDS", "3"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("SHARD_INDEX"));

        let ok = settings(&[
            ("GCS_BUCKET_RT_PROTOBUF", "b"),
            ("SHARD_INDEX", "2"),
            ("TOTAL_SHARDS", "3"),
        ])
        .unwrap();
        assert_eq!(ok.shard_index, 2);
    }

    #[test]
    fn test_log_format_parse() {
        let s = settings(&[("GCS_BUCKET_RT_PROTOBUF", "b"), ("LOG_FORMAT", "text")]).unwrap();
        assert_eq!(s.log_format, LogFormat::Text);

        assert!(settings(&[("GCS_BUCKET_RT_PROTOBUF", "b"), ("LOG_FORMAT", "xml")]).is_err());
    }
}
