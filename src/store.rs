//! In-memory per-vehicle tracking state carried between polling cycles.
//!
//! The store is owned by the poller task and mutated only there; nothing else
//! holds a reference to it. Entries expire once a key has not been seen for
//! the retention horizon.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

use crate::geo::Point;

/// Seconds an unseen key survives before the per-cycle prune removes it.
pub const RETENTION_SECS: i64 = 5 * 60;

/// Identity of one tracked vehicle. Provider vehicle ids are reused across
/// unrelated trips, so the trip id is part of the key, with a sentinel for
/// vehicles not assigned to any trip.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VehicleKey {
    pub vehicle_id: String,
    pub trip_id: String,
}

impl VehicleKey {
    pub const UNKNOWN_TRIP: &'static str = "unknown";

    pub fn new(vehicle_id: impl Into<String>, trip_id: Option<&str>) -> Self {
        Self {
            vehicle_id: vehicle_id.into(),
            trip_id: trip_id.unwrap_or(Self::UNKNOWN_TRIP).to_string(),
        }
    }
}

/// What the engine remembers about one vehicle key between cycles.
#[derive(Debug, Clone)]
pub struct TrackedVehicle {
    pub last_position: Point,
    /// Engine wall-clock time of the last observation, not feed time.
    pub last_seen_at: DateTime<Utc>,
    /// Running delay estimate carried forward cycle to cycle.
    pub delay_seconds: f64,
}

/// Map of vehicle keys to their tracking state.
#[derive(Debug, Default)]
pub struct TrackingStore {
    vehicles: HashMap<VehicleKey, TrackedVehicle>,
}

impl TrackingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &VehicleKey) -> Option<&TrackedVehicle> {
        self.vehicles.get(key)
    }

    pub fn put(&mut self, key: VehicleKey, state: TrackedVehicle) {
        self.vehicles.insert(key, state);
    }

    /// Removes every entry whose `last_seen_at` predates `now - horizon`.
    /// Returns the number of entries removed.
    pub fn prune_older_than(&mut self, now: DateTime<Utc>, horizon: Duration) -> usize {
        let cutoff = now - horizon;
        let before = self.vehicles.len();
        self.vehicles.retain(|_, state| state.last_seen_at >= cutoff);
        before - self.vehicles.len()
    }

    pub fn len(&self) -> usize {
        self.vehicles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty()
    }
}
