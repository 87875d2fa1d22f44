//! Entity flattening into schema rows
//!
//! Field presence comes straight from the decoded protobuf: an unset optional
//! is null in the output, a zero value stays zero.

use std::sync::Arc;

use arrow_array::builder::{
    Float32Builder, Float64Builder, Int32Builder, Int64Builder, StringBuilder, UInt32Builder,
    UInt64Builder,
};
use arrow_array::{ArrayRef, RecordBatch};
use arrow_schema::ArrowError;

use crate::schema;
use gtfsrt_proto::transit_realtime::{FeedMessage, TranslatedString, TripDescriptor};

/// One row of the vehicle positions output.
#[derive(Debug, Clone, Default)]
pub struct VehiclePositionRow {
    pub source_file: String,
    pub feed_url: String,
    pub feed_timestamp: Option<u64>,
    pub entity_id: String,
    pub trip_id: Option<String>,
    pub route_id: Option<String>,
    pub direction_id: Option<u32>,
    pub start_time: Option<String>,
    pub start_date: Option<String>,
    pub schedule_relationship: Option<i32>,
    pub vehicle_id: Option<String>,
    pub vehicle_label: Option<String>,
    pub license_plate: Option<String>,
    pub latitude: Option<f32>,
    pub longitude: Option<f32>,
    pub bearing: Option<f32>,
    pub odometer: Option<f64>,
    pub speed: Option<f32>,
    pub current_stop_sequence: Option<u32>,
    pub stop_id: Option<String>,
    pub current_status: Option<i32>,
    pub timestamp: Option<u64>,
    pub congestion_level: Option<i32>,
    pub occupancy_status: Option<i32>,
    pub occupancy_percentage: Option<u32>,
}

/// One row of the trip updates output (one per stop_time_update).
#[derive(Debug, Clone, Default)]
pub struct TripUpdateRow {
    pub source_file: String,
    pub feed_url: String,
    pub feed_timestamp: Option<u64>,
    pub entity_id: String,
    pub trip_id: Option<String>,
    pub route_id: Option<String>,
    pub direction_id: Option<u32>,
    pub start_time: Option<String>,
    pub start_date: Option<String>,
    pub schedule_relationship: Option<i32>,
    pub vehicle_id: Option<String>,
    pub vehicle_label: Option<String>,
    pub trip_timestamp: Option<u64>,
    pub trip_delay: Option<i32>,
    pub stop_sequence: Option<u32>,
    pub stop_id: Option<String>,
    pub arrival_delay: Option<i32>,
    pub arrival_time: Option<i64>,
    pub arrival_uncertainty: Option<i32>,
    pub departure_delay: Option<i32>,
    pub departure_time: Option<i64>,
    pub departure_uncertainty: Option<i32>,
    pub stop_schedule_relationship: Option<i32>,
}

/// One row of the service alerts output (one per informed_entity).
#[derive(Debug, Clone, Default)]
pub struct ServiceAlertRow {
    pub source_file: String,
    pub feed_url: String,
    pub feed_timestamp: Option<u64>,
    pub entity_id: String,
    pub cause: Option<i32>,
    pub effect: Option<i32>,
    pub severity_level: Option<i32>,
    pub active_period_start: Option<u64>,
    pub active_period_end: Option<u64>,
    pub header_text: Option<String>,
    pub description_text: Option<String>,
    pub url: Option<String>,
    pub agency_id: Option<String>,
    pub route_id: Option<String>,
    pub route_type: Option<i32>,
    pub stop_id: Option<String>,
    pub trip_id: Option<String>,
    pub trip_route_id: Option<String>,
    pub trip_direction_id: Option<u32>,
}

fn trip_fields(
    trip: Option<&TripDescriptor>,
) -> (
    Option<String>,
    Option<String>,
    Option<u32>,
    Option<String>,
    Option<String>,
    Option<i32>,
) {
    match trip {
        Some(trip) => (
            trip.trip_id.clone(),
            trip.route_id.clone(),
            trip.direction_id,
            trip.start_time.clone(),
            trip.start_date.clone(),
            trip.schedule_relationship,
        ),
        None => (None, None, None, None, None, None),
    }
}

/// First translation's text, English not required.
fn first_translation(text: Option<&TranslatedString>) -> Option<String> {
    text.and_then(|t| t.translation.first())
        .map(|t| t.text.clone())
}

/// Flatten vehicle position entities, one row each.
pub fn vehicle_position_rows(
    feed: &FeedMessage,
    source_file: &str,
    feed_url: &str,
) -> Vec<VehiclePositionRow> {
    let feed_timestamp = feed.header.timestamp;
    let mut rows = Vec::new();

    for entity in &feed.entity {
        let Some(vp) = &entity.vehicle else { continue };
        let (trip_id, route_id, direction_id, start_time, start_date, schedule_relationship) =
            trip_fields(vp.trip.as_ref());

        rows.push(VehiclePositionRow {
            source_file: source_file.to_string(),
            feed_url: feed_url.to_string(),
            feed_timestamp,
            entity_id: entity.id.clone(),
            trip_id,
            route_id,
            direction_id,
            start_time,
            start_date,
            schedule_relationship,
            vehicle_id: vp.vehicle.as_ref().and_then(|v| v.id.clone()),
            vehicle_label: vp.vehicle.as_ref().and_then(|v| v.label.clone()),
            license_plate: vp.vehicle.as_ref().and_then(|v| v.license_plate.clone()),
            latitude: vp.position.as_ref().map(|p| p.latitude),
            longitude: vp.position.as_ref().map(|p| p.longitude),
            bearing: vp.position.as_ref().and_then(|p| p.bearing),
            odometer: vp.position.as_ref().and_then(|p| p.odometer),
            speed: vp.position.as_ref().and_then(|p| p.speed),
            current_stop_sequence: vp.current_stop_sequence,
            stop_id: vp.stop_id.clone(),
            current_status: vp.current_status,
            timestamp: vp.timestamp,
            congestion_level: vp.congestion_level,
            occupancy_status: vp.occupancy_status,
            occupancy_percentage: vp.occupancy_percentage,
        });
    }

    rows
}

/// Flatten trip update entities, one row per stop_time_update; entities with
/// no updates still emit one row with the stop columns null.
pub fn trip_update_rows(feed: &FeedMessage, source_file: &str, feed_url: &str) -> Vec<TripUpdateRow> {
    let feed_timestamp = feed.header.timestamp;
    let mut rows = Vec::new();

    for entity in &feed.entity {
        let Some(tu) = &entity.trip_update else { continue };
        let (trip_id, route_id, direction_id, start_time, start_date, schedule_relationship) =
            trip_fields(Some(&tu.trip));

        let base = TripUpdateRow {
            source_file: source_file.to_string(),
            feed_url: feed_url.to_string(),
            feed_timestamp,
            entity_id: entity.id.clone(),
            trip_id,
            route_id,
            direction_id,
            start_time,
            start_date,
            schedule_relationship,
            vehicle_id: tu.vehicle.as_ref().and_then(|v| v.id.clone()),
            vehicle_label: tu.vehicle.as_ref().and_then(|v| v.label.clone()),
            trip_timestamp: tu.timestamp,
            trip_delay: tu.delay,
            ..TripUpdateRow::default()
        };

        if tu.stop_time_update.is_empty() {
            rows.push(base);
            continue;
        }

        for stu in &tu.stop_time_update {
            let mut row = base.clone();
            row.stop_sequence = stu.stop_sequence;
            row.stop_id = stu.stop_id.clone();
            row.arrival_delay = stu.arrival.as_ref().and_then(|e| e.delay);
            row.arrival_time = stu.arrival.as_ref().and_then(|e| e.time);
            row.arrival_uncertainty = stu.arrival.as_ref().and_then(|e| e.uncertainty);
            row.departure_delay = stu.departure.as_ref().and_then(|e| e.delay);
            row.departure_time = stu.departure.as_ref().and_then(|e| e.time);
            row.departure_uncertainty = stu.departure.as_ref().and_then(|e| e.uncertainty);
            row.stop_schedule_relationship = stu.schedule_relationship;
            rows.push(row);
        }
    }

    rows
}

/// Flatten alert entities, one row per informed_entity; alerts with no
/// informed entities still emit one row with the entity columns null.
pub fn service_alert_rows(
    feed: &FeedMessage,
    source_file: &str,
    feed_url: &str,
) -> Vec<ServiceAlertRow> {
    let feed_timestamp = feed.header.timestamp;
    let mut rows = Vec::new();

    for entity in &feed.entity {
        let Some(alert) = &entity.alert else { continue };

        let first_period = alert.active_period.first();
        let base = ServiceAlertRow {
            source_file: source_file.to_string(),
            feed_url: feed_url.to_string(),
            feed_timestamp,
            entity_id: entity.id.clone(),
            cause: alert.cause,
            effect: alert.effect,
            severity_level: alert.severity_level,
            active_period_start: first_period.and_then(|p| p.start),
            active_period_end: first_period.and_then(|p| p.end),
            header_text: first_translation(alert.header_text.as_ref()),
            description_text: first_translation(alert.description_text.as_ref()),
            url: first_translation(alert.url.as_ref()),
            ..ServiceAlertRow::default()
        };

        if alert.informed_entity.is_empty() {
            rows.push(base);
            continue;
        }

        for ie in &alert.informed_entity {
            let mut row = base.clone();
            row.agency_id = ie.agency_id.clone();
            row.route_id = ie.route_id.clone();
            row.route_type = ie.route_type;
            row.stop_id = ie.stop_id.clone();
            row.trip_id = ie.trip.as_ref().and_then(|t| t.trip_id.clone());
            row.trip_route_id = ie.trip.as_ref().and_then(|t| t.route_id.clone());
            row.trip_direction_id = ie.trip.as_ref().and_then(|t| t.direction_id);
            rows.push(row);
        }
    }

    rows
}

macro_rules! string_column {
    ($rows:expr, $field:ident) => {{
        let mut builder = StringBuilder::new();
        for row in $rows {
            builder.append_option(row.$field.as_deref());
        }
        Arc::new(builder.finish()) as ArrayRef
    }};
}

macro_rules! required_string_column {
    ($rows:expr, $field:ident) => {{
        let mut builder = StringBuilder::new();
        for row in $rows {
            builder.append_value(&row.$field);
        }
        Arc::new(builder.finish()) as ArrayRef
    }};
}

macro_rules! primitive_column {
    ($rows:expr, $field:ident, $builder:ty) => {{
        let mut builder = <$builder>::new();
        for row in $rows {
            builder.append_option(row.$field);
        }
        Arc::new(builder.finish()) as ArrayRef
    }};
}

/// Build a vehicle positions record batch in schema column order.
pub fn vehicle_positions_batch(rows: &[VehiclePositionRow]) -> Result<RecordBatch, ArrowError> {
    let columns: Vec<ArrayRef> = vec![
        required_string_column!(rows, source_file),
        required_string_column!(rows, feed_url),
        primitive_column!(rows, feed_timestamp, UInt64Builder),
        required_string_column!(rows, entity_id),
        string_column!(rows, trip_id),
        string_column!(rows, route_id),
        primitive_column!(rows, direction_id, UInt32Builder),
        string_column!(rows, start_time),
        string_column!(rows, start_date),
        primitive_column!(rows, schedule_relationship, Int32Builder),
        string_column!(rows, vehicle_id),
        string_column!(rows, vehicle_label),
        string_column!(rows, license_plate),
        primitive_column!(rows, latitude, Float32Builder),
        primitive_column!(rows, longitude, Float32Builder),
        primitive_column!(rows, bearing, Float32Builder),
        primitive_column!(rows, odometer, Float64Builder),
        primitive_column!(rows, speed, Float32Builder),
        primitive_column!(rows, current_stop_sequence, UInt32Builder),
        string_column!(rows, stop_id),
        primitive_column!(rows, current_status, Int32Builder),
        primitive_column!(rows, timestamp, UInt64Builder),
        primitive_column!(rows, congestion_level, Int32Builder),
        primitive_column!(rows, occupancy_status, Int32Builder),
        primitive_column!(rows, occupancy_percentage, UInt32Builder),
    ];
    RecordBatch::try_new(schema::vehicle_positions_schema(), columns)
}

/// Build a trip updates record batch in schema column order.
pub fn trip_updates_batch(rows: &[TripUpdateRow]) -> Result<RecordBatch, ArrowError> {
    let columns: Vec<ArrayRef> = vec![
        required_string_column!(rows, source_file),
        required_string_column!(rows, feed_url),
        primitive_column!(rows, feed_timestamp, UInt64Builder),
        required_string_column!(rows, entity_id),
        string_column!(rows, trip_id),
        string_column!(rows, route_id),
        primitive_column!(rows, direction_id, UInt32Builder),
        string_column!(rows, start_time),
        string_column!(rows, start_date),
        primitive_column!(rows, schedule_relationship, Int32Builder),
        string_column!(rows, vehicle_id),
        string_column!(rows, vehicle_label),
        primitive_column!(rows, trip_timestamp, UInt64Builder),
        primitive_column!(rows, trip_delay, Int32Builder),
        primitive_column!(rows, stop_sequence, UInt32Builder),
        string_column!(rows, stop_id),
        primitive_column!(rows, arrival_delay, Int32Builder),
        primitive_column!(rows, arrival_time, Int64Builder),
        primitive_column!(rows, arrival_uncertainty, Int32Builder),
        primitive_column!(rows, departure_delay, Int32Builder),
        primitive_column!(rows, departure_time, Int64Builder),
        primitive_column!(rows, departure_uncertainty, Int32Builder),
        primitive_column!(rows, stop_schedule_relationship, Int32Builder),
    ];
    RecordBatch::try_new(schema::trip_updates_schema(), columns)
}

/// Build a service alerts record batch in schema column order.
pub fn service_alerts_batch(rows: &[ServiceAlertRow]) -> Result<RecordBatch, ArrowError> {
    let columns: Vec<ArrayRef> = vec![
        required_string_column!(rows, source_file),
        required_string_column!(rows, feed_url),
        primitive_column!(rows, feed_timestamp, UInt64Builder),
        required_string_column!(rows, entity_id),
        primitive_column!(rows, cause, Int32Builder),
        primitive_column!(rows, effect, Int32Builder),
        primitive_column!(rows, severity_level, Int32Builder),
        primitive_column!(rows, active_period_start, UInt64Builder),
        primitive_column!(rows, active_period_end, UInt64Builder),
        string_column!(rows, header_text),
        string_column!(rows, description_text),
        string_column!(rows, url),
        string_column!(rows, agency_id),
        string_column!(rows, route_id),
        primitive_column!(rows, route_type, Int32Builder),
        string_column!(rows, stop_id),
        string_column!(rows, trip_id),
        string_column!(rows, trip_route_id),
        primitive_column!(rows, trip_direction_id, UInt32Builder),
    ];
    RecordBatch::try_new(schema::service_alerts_schema(), columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gtfsrt_proto::transit_realtime::{
        trip_update::{StopTimeEvent, StopTimeUpdate},
        translated_string::Translation,
        Alert, EntitySelector, FeedEntity, FeedHeader, Position, TimeRange, TripUpdate,
        VehiclePosition,
    };

    fn feed(entities: Vec<FeedEntity>) -> FeedMessage {
        FeedMessage {
            header: FeedHeader {
                gtfs_realtime_version: "2.0".to_string(),
                incrementality: None,
                timestamp: Some(1_736_950_000),
            },
            entity: entities,
        }
    }

    fn entity(id: &str) -> FeedEntity {
        FeedEntity {
            id: id.to_string(),
            is_deleted: None,
            trip_update: None,
            vehicle: None,
            alert: None,
        }
    }

    fn trip_update_with_stops(id: &str, stops: usize) -> FeedEntity {
        let mut e = entity(id);
        e.trip_update = Some(TripUpdate {
            trip: TripDescriptor {
                trip_id: Some(format!("trip-{id}")),
                route_id: Some("route-1".to_string()),
                direction_id: None,
                start_time: None,
                start_date: None,
                schedule_relationship: None,
            },
            vehicle: None,
            stop_time_update: (0..stops)
                .map(|i| StopTimeUpdate {
                    stop_sequence: Some(i as u32 + 1),
                    stop_id: Some(format!("stop-{i}")),
                    arrival: Some(StopTimeEvent {
                        delay: Some(0),
                        time: Some(1_736_950_100 + i as i64 * 60),
                        uncertainty: None,
                    }),
                    departure: None,
                    schedule_relationship: None,
                })
                .collect(),
            timestamp: Some(1_736_949_990),
            delay: None,
        });
        e
    }

    #[test]
    fn test_vehicle_rows_one_per_entity() {
        let mut vehicle = entity("v1");
        vehicle.vehicle = Some(VehiclePosition {
            trip: None,
            vehicle: None,
            position: Some(Position {
                latitude: 39.95,
                longitude: -75.16,
                bearing: None,
                odometer: None,
                speed: None,
            }),
            current_stop_sequence: None,
            stop_id: None,
            current_status: None,
            timestamp: None,
            congestion_level: None,
            occupancy_status: None,
            occupancy_percentage: None,
        });
        let skipped = trip_update_with_stops("t1", 2);

        let rows = vehicle_position_rows(&feed(vec![vehicle, skipped]), "f.pb", "https://u");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].entity_id, "v1");
        assert_eq!(rows[0].latitude, Some(39.95));
        // Trip absent: all trip columns null
        assert!(rows[0].trip_id.is_none());
        assert!(rows[0].bearing.is_none());
        assert_eq!(rows[0].feed_timestamp, Some(1_736_950_000));
    }

    #[test]
    fn test_trip_rows_denormalize_by_stop_time_update() {
        let feed = feed(vec![
            trip_update_with_stops("a", 3),
            trip_update_with_stops("b", 0),
        ]);
        let rows = trip_update_rows(&feed, "f.pb", "https://u");

        // 3 stop rows for "a" plus one null-padded row for "b"
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].stop_sequence, Some(1));
        assert_eq!(rows[2].stop_sequence, Some(3));

        let padded = &rows[3];
        assert_eq!(padded.entity_id, "b");
        assert!(padded.stop_sequence.is_none());
        assert!(padded.stop_id.is_none());
        assert!(padded.arrival_delay.is_none());
        // Trip-level columns still populated on the padded row
        assert_eq!(padded.trip_id.as_deref(), Some("trip-b"));
    }

    #[test]
    fn test_zero_delay_is_not_null() {
        let feed = feed(vec![trip_update_with_stops("a", 1)]);
        let rows = trip_update_rows(&feed, "f.pb", "https://u");
        assert_eq!(rows[0].arrival_delay, Some(0));
        assert!(rows[0].departure_delay.is_none());
    }

    #[test]
    fn test_alert_rows_denormalize_by_informed_entity() {
        let mut with_entities = entity("alert-1");
        with_entities.alert = Some(Alert {
            active_period: vec![
                TimeRange {
                    start: Some(100),
                    end: None,
                },
                TimeRange {
                    start: Some(999),
                    end: Some(1_000),
                },
            ],
            informed_entity: vec![
                EntitySelector {
                    agency_id: None,
                    route_id: Some("route-9".to_string()),
                    route_type: Some(3),
                    trip: None,
                    stop_id: None,
                    direction_id: None,
                },
                EntitySelector {
                    agency_id: None,
                    route_id: None,
                    route_type: None,
                    trip: Some(TripDescriptor {
                        trip_id: Some("trip-x".to_string()),
                        route_id: Some("route-x".to_string()),
                        direction_id: Some(1),
                        start_time: None,
                        start_date: None,
                        schedule_relationship: None,
                    }),
                    stop_id: None,
                    direction_id: None,
                },
            ],
            cause: Some(9),
            effect: Some(4),
            url: None,
            header_text: Some(TranslatedString {
                translation: vec![
                    Translation {
                        text: "Detour on Route 9".to_string(),
                        language: Some("en".to_string()),
                    },
                    Translation {
                        text: "Desvio en la Ruta 9".to_string(),
                        language: Some("es".to_string()),
                    },
                ],
            }),
            description_text: None,
            severity_level: None,
        });

        let mut bare = entity("alert-2");
        bare.alert = Some(Alert {
            active_period: vec![],
            informed_entity: vec![],
            cause: None,
            effect: None,
            url: None,
            header_text: None,
            description_text: None,
            severity_level: None,
        });

        let rows = service_alert_rows(&feed(vec![with_entities, bare]), "f.pb", "https://u");
        assert_eq!(rows.len(), 3);

        // First active period and first translation only
        assert_eq!(rows[0].active_period_start, Some(100));
        assert!(rows[0].active_period_end.is_none());
        assert_eq!(rows[0].header_text.as_deref(), Some("Detour on Route 9"));
        assert_eq!(rows[0].route_id.as_deref(), Some("route-9"));

        assert_eq!(rows[1].trip_id.as_deref(), Some("trip-x"));
        assert_eq!(rows[1].trip_route_id.as_deref(), Some("route-x"));
        assert_eq!(rows[1].trip_direction_id, Some(1));
        assert!(rows[1].route_id.is_none());

        let padded = &rows[2];
        assert_eq!(padded.entity_id, "alert-2");
        assert!(padded.agency_id.is_none());
        assert!(padded.active_period_start.is_none());
    }

    #[test]
    fn test_batches_match_schemas() {
        let feed = feed(vec![trip_update_with_stops("a", 2)]);
        let rows = trip_update_rows(&feed, "f.pb", "https://u");
        let batch = trip_updates_batch(&rows).unwrap();
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.num_columns(), 23);
        assert_eq!(batch.schema(), schema::trip_updates_schema());

        let empty = vehicle_positions_batch(&[]).unwrap();
        assert_eq!(empty.num_rows(), 0);
        assert_eq!(empty.num_columns(), 25);
    }
}
