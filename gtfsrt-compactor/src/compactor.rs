//! Partition compaction

use std::io::{Read, Seek, SeekFrom};
use std::sync::Arc;

use futures::TryStreamExt;
use object_store::path::Path;
use object_store::{Attribute, Attributes, ObjectStore, PutOptions};
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use prost::Message;
use thiserror::Error;
use tracing::{info, warn};

use crate::partition::PartitionKey;
use crate::{rows, schema};
use gtfsrt_config::FeedType;
use gtfsrt_proto::FeedMessage;

/// Compaction errors. Individual undecodable inputs are skipped, not raised.
#[derive(Debug, Error)]
pub enum CompactError {
    #[error("blob store error: {0}")]
    Store(#[from] object_store::Error),

    #[error("parquet write error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("arrow batch error: {0}")]
    Arrow(#[from] arrow_schema::ArrowError),

    #[error("scratch file error: {0}")]
    Io(#[from] std::io::Error),
}

/// What a partition run did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionSummary {
    pub input_objects: usize,
    pub rows_written: usize,
}

/// Compacts one partition at a time; stateless between invocations.
pub struct Compactor {
    input: Arc<dyn ObjectStore>,
    output: Arc<dyn ObjectStore>,
}

impl Compactor {
    pub fn new(input: Arc<dyn ObjectStore>, output: Arc<dyn ObjectStore>) -> Self {
        Self { input, output }
    }

    /// Compact every archived snapshot of `partition` into one Parquet file.
    ///
    /// Inputs are processed in lexicographic (= temporal) order, one record
    /// batch per input file. The output object appears only after every input
    /// has been processed; zero rows produce no object at all.
    pub async fn compact(&self, partition: &PartitionKey) -> Result<PartitionSummary, CompactError> {
        let keys = self.enumerate(partition).await?;
        if keys.is_empty() {
            info!(partition = %partition, "no inputs, nothing to compact");
            return Ok(PartitionSummary {
                input_objects: 0,
                rows_written: 0,
            });
        }

        let feed_url = partition.feed_url();
        let output_schema = match partition.feed_type {
            FeedType::VehiclePositions => schema::vehicle_positions_schema(),
            FeedType::TripUpdates => schema::trip_updates_schema(),
            FeedType::ServiceAlerts => schema::service_alerts_schema(),
        };

        // Stream batches through a scratch file so memory is bounded by one
        // decoded input, not the whole day.
        let scratch = tempfile::tempfile()?;
        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();
        let mut writer = ArrowWriter::try_new(scratch.try_clone()?, output_schema, Some(props))?;

        let mut rows_written = 0usize;
        for key in &keys {
            let bytes = self
                .input
                .get(&Path::from(key.as_str()))
                .await?
                .bytes()
                .await?;

            let message = match FeedMessage::decode(bytes.as_ref()) {
                Ok(message) => message,
                Err(err) => {
                    warn!(key = %key, %err, "skipping undecodable input");
                    continue;
                }
            };

            let batch = match partition.feed_type {
                FeedType::VehiclePositions => {
                    rows::vehicle_positions_batch(&rows::vehicle_position_rows(
                        &message, key, &feed_url,
                    ))?
                }
                FeedType::TripUpdates => {
                    rows::trip_updates_batch(&rows::trip_update_rows(&message, key, &feed_url))?
                }
                FeedType::ServiceAlerts => {
                    rows::service_alerts_batch(&rows::service_alert_rows(&message, key, &feed_url))?
                }
            };

            if batch.num_rows() > 0 {
                rows_written += batch.num_rows();
                writer.write(&batch)?;
            }
        }
        writer.close()?;

        if rows_written == 0 {
            info!(partition = %partition, inputs = keys.len(), "no rows extracted, no output written");
            return Ok(PartitionSummary {
                input_objects: keys.len(),
                rows_written: 0,
            });
        }

        let mut scratch = scratch;
        scratch.seek(SeekFrom::Start(0))?;
        let mut body = Vec::new();
        scratch.read_to_end(&mut body)?;

        let opts = PutOptions::from(Attributes::from_iter([(
            Attribute::ContentType,
            "application/octet-stream",
        )]));
        let output_key = partition.output_key();
        self.output
            .put_opts(&Path::from(output_key.as_str()), body.into(), opts)
            .await?;

        info!(
            partition = %partition,
            inputs = keys.len(),
            rows = rows_written,
            key = %output_key,
            "partition compacted"
        );
        Ok(PartitionSummary {
            input_objects: keys.len(),
            rows_written,
        })
    }

    /// List the partition's `.pb` objects in lexicographic order.
    async fn enumerate(&self, partition: &PartitionKey) -> Result<Vec<String>, CompactError> {
        let prefix = Path::from(partition.input_prefix().trim_end_matches('/'));
        let fragment = partition.feed_fragment();

        let mut keys: Vec<String> = self
            .input
            .list(Some(&prefix))
            .map_ok(|meta| meta.location.as_ref().to_string())
            .try_filter(|key| {
                futures::future::ready(key.contains(&fragment) && key.ends_with(".pb"))
            })
            .try_collect()
            .await?;

        keys.sort();
        Ok(keys)
    }
}
