//! GTFS-Realtime protobuf messages.
//!
//! Hand-maintained `prost` types for the subset of the `transit_realtime`
//! package the archiver pipeline decodes. Field numbers follow the upstream
//! `gtfs-realtime.proto`; proto2 optional scalars map to `Option<T>` so
//! "field was set" stays distinguishable from a zero value.

pub mod transit_realtime;

pub use transit_realtime::{FeedEntity, FeedHeader, FeedMessage};
