//! Partition-oriented compactor for archived GTFS-RT snapshots.
//!
//! For one `(feed_type, date, feed)` partition, reads every archived `.pb`
//! object, decodes it, denormalizes entities into flat rows under a fixed
//! schema and writes a single snappy-compressed Parquet file. Stateless
//! across partitions; orchestration lives outside this crate.

pub mod compactor;
pub mod partition;
pub mod rows;
pub mod schema;

pub use compactor::{CompactError, Compactor, PartitionSummary};
pub use partition::PartitionKey;
