//! Arrow schemas for the three output row sets
//!
//! Column order and primitive types are stable; consumers depend on them.
//! Identifiers are strings, epoch timestamps uint64, coordinates and speeds
//! float32, delays and enum codes int32. Fields absent in a protobuf message
//! are null, never zero.

use std::sync::Arc;

use arrow_schema::{DataType, Field, Schema, SchemaRef};

fn source_fields() -> Vec<Field> {
    vec![
        Field::new("source_file", DataType::Utf8, false),
        Field::new("feed_url", DataType::Utf8, false),
        Field::new("feed_timestamp", DataType::UInt64, true),
        Field::new("entity_id", DataType::Utf8, false),
    ]
}

fn trip_descriptor_fields() -> Vec<Field> {
    vec![
        Field::new("trip_id", DataType::Utf8, true),
        Field::new("route_id", DataType::Utf8, true),
        Field::new("direction_id", DataType::UInt32, true),
        Field::new("start_time", DataType::Utf8, true),
        Field::new("start_date", DataType::Utf8, true),
        Field::new("schedule_relationship", DataType::Int32, true),
    ]
}

/// One row per vehicle position entity.
pub fn vehicle_positions_schema() -> SchemaRef {
    let mut fields = source_fields();
    fields.extend(trip_descriptor_fields());
    fields.extend([
        Field::new("vehicle_id", DataType::Utf8, true),
        Field::new("vehicle_label", DataType::Utf8, true),
        Field::new("license_plate", DataType::Utf8, true),
        Field::new("latitude", DataType::Float32, true),
        Field::new("longitude", DataType::Float32, true),
        Field::new("bearing", DataType::Float32, true),
        Field::new("odometer", DataType::Float64, true),
        Field::new("speed", DataType::Float32, true),
        Field::new("current_stop_sequence", DataType::UInt32, true),
        Field::new("stop_id", DataType::Utf8, true),
        Field::new("current_status", DataType::Int32, true),
        Field::new("timestamp", DataType::UInt64, true),
        Field::new("congestion_level", DataType::Int32, true),
        Field::new("occupancy_status", DataType::Int32, true),
        Field::new("occupancy_percentage", DataType::UInt32, true),
    ]);
    Arc::new(Schema::new(fields))
}

/// Denormalized: one row per stop_time_update within each trip update.
pub fn trip_updates_schema() -> SchemaRef {
    let mut fields = source_fields();
    fields.extend(trip_descriptor_fields());
    fields.extend([
        Field::new("vehicle_id", DataType::Utf8, true),
        Field::new("vehicle_label", DataType::Utf8, true),
        Field::new("trip_timestamp", DataType::UInt64, true),
        Field::new("trip_delay", DataType::Int32, true),
        Field::new("stop_sequence", DataType::UInt32, true),
        Field::new("stop_id", DataType::Utf8, true),
        Field::new("arrival_delay", DataType::Int32, true),
        Field::new("arrival_time", DataType::Int64, true),
        Field::new("arrival_uncertainty", DataType::Int32, true),
        Field::new("departure_delay", DataType::Int32, true),
        Field::new("departure_time", DataType::Int64, true),
        Field::new("departure_uncertainty", DataType::Int32, true),
        Field::new("stop_schedule_relationship", DataType::Int32, true),
    ]);
    Arc::new(Schema::new(fields))
}

/// Denormalized: one row per informed_entity within each alert.
pub fn service_alerts_schema() -> SchemaRef {
    let mut fields = source_fields();
    fields.extend([
        Field::new("cause", DataType::Int32, true),
        Field::new("effect", DataType::Int32, true),
        Field::new("severity_level", DataType::Int32, true),
        Field::new("active_period_start", DataType::UInt64, true),
        Field::new("active_period_end", DataType::UInt64, true),
        Field::new("header_text", DataType::Utf8, true),
        Field::new("description_text", DataType::Utf8, true),
        Field::new("url", DataType::Utf8, true),
        Field::new("agency_id", DataType::Utf8, true),
        Field::new("route_id", DataType::Utf8, true),
        Field::new("route_type", DataType::Int32, true),
        Field::new("stop_id", DataType::Utf8, true),
        Field::new("trip_id", DataType::Utf8, true),
        Field::new("trip_route_id", DataType::Utf8, true),
        Field::new("trip_direction_id", DataType::UInt32, true),
    ]);
    Arc::new(Schema::new(fields))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_shapes() {
        assert_eq!(vehicle_positions_schema().fields().len(), 25);
        assert_eq!(trip_updates_schema().fields().len(), 23);
        assert_eq!(service_alerts_schema().fields().len(), 19);
    }

    #[test]
    fn test_provenance_columns_lead_every_schema() {
        for schema in [
            vehicle_positions_schema(),
            trip_updates_schema(),
            service_alerts_schema(),
        ] {
            let names: Vec<&str> = schema
                .fields()
                .iter()
                .take(4)
                .map(|f| f.name().as_str())
                .collect();
            assert_eq!(
                names,
                ["source_file", "feed_url", "feed_timestamp", "entity_id"]
            );
            assert!(!schema.field(0).is_nullable());
            assert!(!schema.field(3).is_nullable());
        }
    }
}
