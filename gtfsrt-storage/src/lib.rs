//! Blob-store layout and writer for archived GTFS-RT snapshots.
//!
//! The archiver and the compactor communicate only through this layout; the
//! key codec here is the contract between them.

pub mod keys;
pub mod writer;

pub use keys::{
    decode_feed_url, encode_feed_url, object_key, parse_object_key, partition_key_to_url,
    sidecar_key, url_to_partition_key, ParsedObjectKey,
};
pub use writer::{BlobWriter, SidecarMetadata, StorageError};
