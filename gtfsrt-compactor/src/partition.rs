//! Compaction partition model

use chrono::NaiveDate;
use std::fmt;
use std::str::FromStr;

use gtfsrt_config::FeedType;
use gtfsrt_storage::{encode_feed_url, partition_key_to_url};

/// One unit of compaction work: a feed type, a UTC calendar day and a feed
/// identified by its canonical URL (scheme stripped, `~` prefix for HTTP).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionKey {
    pub feed_type: FeedType,
    pub date: NaiveDate,
    pub feed_key: String,
}

impl PartitionKey {
    pub fn new(
        feed_type: FeedType,
        date: &str,
        feed_key: impl Into<String>,
    ) -> Result<Self, String> {
        let date = NaiveDate::from_str(date).map_err(|e| format!("invalid date {date:?}: {e}"))?;
        Ok(Self {
            feed_type,
            date,
            feed_key: feed_key.into(),
        })
    }

    /// The feed URL this partition covers.
    pub fn feed_url(&self) -> String {
        partition_key_to_url(&self.feed_key)
    }

    /// Listing prefix for the partition's calendar day.
    pub fn input_prefix(&self) -> String {
        format!("{}/date={}/", self.feed_type.as_str(), self.date)
    }

    /// Key fragment selecting this feed's objects within the day.
    pub fn feed_fragment(&self) -> String {
        format!("base64url={}/", encode_feed_url(&self.feed_url()))
    }

    /// Destination key for the compacted output.
    pub fn output_key(&self) -> String {
        format!(
            "{}/date={}/base64url={}/data.parquet",
            self.feed_type.as_str(),
            self.date,
            encode_feed_url(&self.feed_url()),
        )
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}", self.feed_type, self.date, self.feed_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_round_trips_url() {
        let partition =
            PartitionKey::new(FeedType::TripUpdates, "2025-01-15", "gtfs.example.com/rt").unwrap();
        assert_eq!(partition.feed_url(), "https://gtfs.example.com/rt");

        let http =
            PartitionKey::new(FeedType::TripUpdates, "2025-01-15", "~legacy.example.com/feed")
                .unwrap();
        assert_eq!(http.feed_url(), "http://legacy.example.com/feed");
    }

    #[test]
    fn test_prefixes_and_output_key() {
        let partition =
            PartitionKey::new(FeedType::VehiclePositions, "2025-01-15", "gtfs.example.com/rt")
                .unwrap();
        assert_eq!(partition.input_prefix(), "vehicle_positions/date=2025-01-15/");
        assert_eq!(
            partition.feed_fragment(),
            "base64url=aHR0cHM6Ly9ndGZzLmV4YW1wbGUuY29tL3J0/"
        );
        assert_eq!(
            partition.output_key(),
            "vehicle_positions/date=2025-01-15/base64url=aHR0cHM6Ly9ndGZzLmV4YW1wbGUuY29tL3J0/data.parquet"
        );
    }

    #[test]
    fn test_invalid_date_rejected() {
        assert!(PartitionKey::new(FeedType::TripUpdates, "2025-13-01", "x").is_err());
        assert!(PartitionKey::new(FeedType::TripUpdates, "not-a-date", "x").is_err());
    }
}
