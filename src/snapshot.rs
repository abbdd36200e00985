//! Output data model: the per-vehicle records computed each polling cycle and
//! the immutable snapshot published for concurrent readers.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::gtfs_rt::vehicle_position::VehicleStopStatus;

/// Stop status of a vehicle, defaulting to [`VehicleStatus::InTransitTo`]
/// when the feed omits it. Serialized with the GTFS-RT spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VehicleStatus {
    IncomingAt,
    StoppedAt,
    InTransitTo,
}

impl VehicleStatus {
    /// True when the vehicle reports being docked at a stop.
    pub fn is_stopped(self) -> bool {
        self == VehicleStatus::StoppedAt
    }
}

impl Default for VehicleStatus {
    fn default() -> Self {
        VehicleStatus::InTransitTo
    }
}

impl From<VehicleStopStatus> for VehicleStatus {
    fn from(status: VehicleStopStatus) -> Self {
        match status {
            VehicleStopStatus::IncomingAt => VehicleStatus::IncomingAt,
            VehicleStopStatus::StoppedAt => VehicleStatus::StoppedAt,
            VehicleStopStatus::InTransitTo => VehicleStatus::InTransitTo,
        }
    }
}

/// Trip linkage of a vehicle; all fields absent when the vehicle is not
/// currently assigned to a trip.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TripRef {
    pub trip_id: Option<String>,
    pub route_id: Option<String>,
    pub direction_id: Option<u32>,
}

/// One vehicle in a published snapshot. `delay_seconds` is always present; it
/// is derived locally by the estimator, never read from the feed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleRecord {
    pub id: String,
    pub lat: f64,
    pub lng: f64,
    pub bearing: Option<f32>,
    pub speed: Option<f32>,
    pub trip: TripRef,
    pub timestamp: DateTime<Utc>,
    pub delay_seconds: u32,
    pub current_status: VehicleStatus,
}

/// The complete result of one polling cycle. Immutable once published;
/// replaced wholesale by the next successful cycle.
#[derive(Debug, Default)]
pub struct Snapshot {
    pub vehicles: Vec<VehicleRecord>,
    /// `None` only before the first successful cycle.
    pub last_update: Option<DateTime<Utc>>,
}

impl Snapshot {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Health of the upstream connection as of the most recent attempted cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Ok,
    Degraded,
}

/// The value held by the publication channel: the latest snapshot plus the
/// connection status. A failed cycle flips `connection` while leaving the
/// previous snapshot in place.
#[derive(Debug, Clone)]
pub struct Published {
    pub snapshot: Arc<Snapshot>,
    pub connection: ConnectionStatus,
}

impl Default for Published {
    fn default() -> Self {
        Self {
            snapshot: Arc::new(Snapshot::empty()),
            connection: ConnectionStatus::Ok,
        }
    }
}

/// Formats a delay for human-readable output: `"45s"`, `"3m"`, `"1h 5m"`.
pub fn format_delay(seconds: u32) -> String {
    if seconds < 60 {
        format!("{seconds}s")
    } else if seconds < 3600 {
        format!("{}m", seconds / 60)
    } else {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    }
}
