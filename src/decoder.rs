//! Protobuf decoding of GTFS Realtime vehicle position feeds.

use anyhow::Result;
use chrono::{DateTime, Utc};
use prost::Message;

use crate::geo::Point;
use crate::gtfs_rt::FeedMessage;
use crate::snapshot::{TripRef, VehicleRecord, VehicleStatus};
use crate::store::VehicleKey;

/// Vehicle id used when the feed omits the descriptor.
const UNKNOWN_VEHICLE: &str = "unknown";

/// Timestamps above this are taken to be milliseconds since the epoch.
/// GTFS-RT defines the field as POSIX seconds, but some providers ship
/// milliseconds anyway.
const MILLISECOND_THRESHOLD: i64 = 1_000_000_000_000;

/// Decodes a protobuf-encoded GTFS-RT [`FeedMessage`] from raw bytes.
///
/// # Errors
///
/// Returns an error if the bytes are not valid protobuf for a `FeedMessage`.
pub fn parse_feed(bytes: &[u8]) -> Result<FeedMessage> {
    Ok(FeedMessage::decode(bytes)?)
}

/// One vehicle report lifted out of the feed, with feed-level quirks
/// (missing ids, millisecond timestamps, absent status) already resolved.
/// Carries no delay; that is the estimator's job.
#[derive(Debug, Clone)]
pub struct Observation {
    pub vehicle_id: String,
    pub trip: TripRef,
    pub position: Point,
    pub bearing: Option<f32>,
    pub speed: Option<f32>,
    /// When the vehicle reported this position, per the feed.
    pub reported_at: DateTime<Utc>,
    pub status: VehicleStatus,
}

impl Observation {
    pub fn key(&self) -> VehicleKey {
        VehicleKey::new(self.vehicle_id.clone(), self.trip.trip_id.as_deref())
    }

    /// Pairs the observation with its estimated delay to form an output
    /// record.
    pub fn into_record(self, delay_seconds: u32) -> VehicleRecord {
        VehicleRecord {
            id: self.vehicle_id,
            lat: self.position.lat,
            lng: self.position.lng,
            bearing: self.bearing,
            speed: self.speed,
            trip: self.trip,
            timestamp: self.reported_at,
            delay_seconds,
            current_status: self.status,
        }
    }
}

/// Extracts every usable vehicle observation from a decoded feed, in feed
/// order. Entities without a vehicle or without a position are skipped;
/// everything else is kept, however sparse.
pub fn decode_positions(feed: &FeedMessage, now: DateTime<Utc>) -> Vec<Observation> {
    let mut observations = Vec::with_capacity(feed.entity.len());

    for entity in &feed.entity {
        let Some(vehicle) = &entity.vehicle else {
            continue;
        };
        let Some(position) = &vehicle.position else {
            continue;
        };

        let trip = vehicle
            .trip
            .as_ref()
            .map(|t| TripRef {
                trip_id: t.trip_id.clone(),
                route_id: t.route_id.clone(),
                direction_id: t.direction_id,
            })
            .unwrap_or_default();

        observations.push(Observation {
            vehicle_id: vehicle
                .vehicle
                .as_ref()
                .and_then(|d| d.id.clone())
                .unwrap_or_else(|| UNKNOWN_VEHICLE.to_string()),
            trip,
            position: Point::new(f64::from(position.latitude), f64::from(position.longitude)),
            bearing: position.bearing,
            speed: position.speed,
            reported_at: normalize_timestamp(vehicle.timestamp, now),
            status: vehicle.current_status().into(),
        });
    }

    observations
}

/// Resolves a raw feed timestamp to UTC. Values past [`MILLISECOND_THRESHOLD`]
/// are read as milliseconds, the rest as seconds. Missing or unrepresentable
/// values fall back to `now`, which deliberately makes the report look fresh
/// rather than inventing a stale one.
pub fn normalize_timestamp(raw: Option<u64>, now: DateTime<Utc>) -> DateTime<Utc> {
    let Some(value) = raw else {
        return now;
    };

    i64::try_from(value)
        .ok()
        .and_then(|v| {
            if v > MILLISECOND_THRESHOLD {
                DateTime::from_timestamp_millis(v)
            } else {
                DateTime::from_timestamp(v, 0)
            }
        })
        .unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gtfs_rt::vehicle_position::VehicleStopStatus;
    use crate::gtfs_rt::{
        FeedEntity, FeedHeader, FeedMessage, Position, TripDescriptor, VehicleDescriptor,
        VehiclePosition,
    };

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn feed_with(entities: Vec<FeedEntity>) -> FeedMessage {
        FeedMessage {
            header: FeedHeader {
                gtfs_realtime_version: "2.0".to_string(),
                incrementality: None,
                timestamp: Some(1_700_000_000),
                feed_version: None,
            },
            entity: entities,
        }
    }

    fn vehicle_entity(id: &str, lat: f32, lng: f32) -> FeedEntity {
        FeedEntity {
            id: id.to_string(),
            vehicle: Some(VehiclePosition {
                vehicle: Some(VehicleDescriptor {
                    id: Some(id.to_string()),
                    ..Default::default()
                }),
                position: Some(Position {
                    latitude: lat,
                    longitude: lng,
                    ..Default::default()
                }),
                timestamp: Some(1_699_999_990),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_empty_bytes_returns_default_feed() {
        // An empty byte array decodes to a FeedMessage with default values,
        // which is valid protobuf behavior.
        let feed = parse_feed(&[]).unwrap();
        assert_eq!(feed.header.gtfs_realtime_version, "");
        assert!(feed.entity.is_empty());
    }

    #[test]
    fn test_parse_invalid_bytes() {
        let invalid_bytes = vec![0xFF, 0xFE, 0x00, 0x01];
        assert!(parse_feed(&invalid_bytes).is_err());
    }

    #[test]
    fn test_parse_roundtrip() {
        let feed = feed_with(vec![vehicle_entity("bus_9", 42.35, -71.06)]);
        let parsed = parse_feed(&feed.encode_to_vec()).unwrap();

        assert_eq!(parsed.header.gtfs_realtime_version, "2.0");
        assert_eq!(parsed.entity.len(), 1);
    }

    #[test]
    fn test_decode_skips_entities_without_position() {
        let mut no_position = vehicle_entity("bus_1", 0.0, 0.0);
        no_position.vehicle.as_mut().unwrap().position = None;
        let no_vehicle = FeedEntity {
            id: "alert_1".to_string(),
            ..Default::default()
        };

        let feed = feed_with(vec![
            no_position,
            no_vehicle,
            vehicle_entity("bus_2", 42.35, -71.06),
        ]);
        let observations = decode_positions(&feed, now());

        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].vehicle_id, "bus_2");
    }

    #[test]
    fn test_decode_fills_in_defaults() {
        // Bare-minimum vehicle: position only.
        let feed = feed_with(vec![FeedEntity {
            id: "e1".to_string(),
            vehicle: Some(VehiclePosition {
                position: Some(Position {
                    latitude: 42.35,
                    longitude: -71.06,
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }]);

        let observations = decode_positions(&feed, now());
        assert_eq!(observations.len(), 1);

        let o = &observations[0];
        assert_eq!(o.vehicle_id, "unknown");
        assert_eq!(o.trip, TripRef::default());
        assert_eq!(o.status, VehicleStatus::InTransitTo);
        assert_eq!(o.reported_at, now());
        assert!(o.bearing.is_none());
        assert!(o.speed.is_none());
    }

    #[test]
    fn test_decode_carries_trip_and_status() {
        let mut entity = vehicle_entity("bus_3", 42.0, -71.0);
        {
            let v = entity.vehicle.as_mut().unwrap();
            v.trip = Some(TripDescriptor {
                trip_id: Some("trip_42".to_string()),
                route_id: Some("route_7".to_string()),
                direction_id: Some(1),
                ..Default::default()
            });
            v.current_status = Some(VehicleStopStatus::StoppedAt as i32);
            v.position.as_mut().unwrap().bearing = Some(180.0);
            v.position.as_mut().unwrap().speed = Some(6.5);
        }

        let observations = decode_positions(&feed_with(vec![entity]), now());
        let o = &observations[0];

        assert_eq!(o.trip.trip_id.as_deref(), Some("trip_42"));
        assert_eq!(o.trip.route_id.as_deref(), Some("route_7"));
        assert_eq!(o.trip.direction_id, Some(1));
        assert_eq!(o.status, VehicleStatus::StoppedAt);
        assert_eq!(o.bearing, Some(180.0));
        assert_eq!(o.speed, Some(6.5));
        assert_eq!(o.key(), VehicleKey::new("bus_3", Some("trip_42")));
    }

    #[test]
    fn test_normalize_timestamp_seconds() {
        let ts = normalize_timestamp(Some(1_700_000_000), now());
        assert_eq!(ts, DateTime::from_timestamp(1_700_000_000, 0).unwrap());
    }

    #[test]
    fn test_normalize_timestamp_milliseconds() {
        let ts = normalize_timestamp(Some(1_700_000_000_500), now());
        assert_eq!(ts, DateTime::from_timestamp_millis(1_700_000_000_500).unwrap());
    }

    #[test]
    fn test_normalize_timestamp_missing_or_absurd_falls_back() {
        assert_eq!(normalize_timestamp(None, now()), now());
        assert_eq!(normalize_timestamp(Some(u64::MAX), now()), now());
    }

    #[test]
    fn test_into_record_keeps_report_time_and_delay() {
        let feed = feed_with(vec![vehicle_entity("bus_4", 42.35, -71.06)]);
        let o = decode_positions(&feed, now()).remove(0);
        let reported_at = o.reported_at;

        let record = o.into_record(75);
        assert_eq!(record.id, "bus_4");
        assert_eq!(record.delay_seconds, 75);
        assert_eq!(record.timestamp, reported_at);
        assert_eq!(record.lat, 42.35f32 as f64);
    }
}
