//! Heuristic schedule-delay inference from successive position reports.
//!
//! The upstream feed carries no delay field, so delay is estimated from
//! locally observable signals only: how far a vehicle moved between
//! sightings, how old its report is, and whether it says it is docked at a
//! stop. The estimate is smoothed across cycles to avoid flapping between
//! "on time" and "delayed" on single noisy reports.

use chrono::{DateTime, Utc};

use crate::decoder::Observation;
use crate::geo::haversine_km;
use crate::store::{TrackedVehicle, TrackingStore};

/// Thresholds driving the delay heuristic. The defaults are the empirically
/// chosen production values; they carry no documented derivation and should
/// be treated as opaque knobs.
#[derive(Debug, Clone)]
pub struct Tuning {
    /// Seconds that must pass between sightings before movement is judged.
    pub movement_grace_secs: f64,
    /// Seconds of standstill after which delay starts accumulating.
    pub standstill_after_secs: f64,
    /// Displacement below this many km counts as "has not moved".
    pub standstill_radius_km: f64,
    /// Displacement above this many km counts as "clearly moving".
    pub moving_radius_km: f64,
    /// Seconds of delay forgiven per cycle while clearly moving.
    pub decay_step_secs: f64,
    /// Report age beyond which the feed itself is considered stale.
    pub stale_report_secs: f64,
    /// Grace subtracted from the report age when raising the staleness floor.
    pub stale_grace_secs: f64,
    /// Minimum delay attributed to a vehicle docked at a stop.
    pub stopped_floor_secs: f64,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            movement_grace_secs: 30.0,
            standstill_after_secs: 60.0,
            standstill_radius_km: 0.05,
            moving_radius_km: 0.1,
            decay_step_secs: 10.0,
            stale_report_secs: 120.0,
            stale_grace_secs: 60.0,
            stopped_floor_secs: 60.0,
        }
    }
}

/// Computes the raw (unrounded) delay for one observation given the prior
/// state for its key, if any. Always non-negative.
///
/// Applied per vehicle key on every cycle:
/// 1. carry the prior delay forward, accumulating while effectively
///    stationary over a non-trivial interval and decaying while clearly
///    moving;
/// 2. floor at `report age - grace` when the report itself is stale, so
///    staleness is visible as delay even for never-before-seen vehicles;
/// 3. floor at the stopped minimum when the vehicle reports being docked.
pub fn estimate(
    tuning: &Tuning,
    prior: Option<&TrackedVehicle>,
    obs: &Observation,
    now: DateTime<Utc>,
) -> f64 {
    let time_since_report = (now - obs.reported_at).num_milliseconds() as f64 / 1000.0;

    let mut delay = match prior {
        Some(prev) => {
            let time_diff = (now - prev.last_seen_at).num_milliseconds() as f64 / 1000.0;

            if time_diff > tuning.movement_grace_secs {
                let moved_km = haversine_km(prev.last_position, obs.position);

                if moved_km < tuning.standstill_radius_km
                    && time_diff > tuning.standstill_after_secs
                {
                    // Standing still well past the grace window: delay grows
                    // by the time spent beyond it.
                    prev.delay_seconds + (time_diff - tuning.movement_grace_secs)
                } else if moved_km > tuning.moving_radius_km {
                    (prev.delay_seconds - tuning.decay_step_secs).max(0.0)
                } else {
                    // Ambiguous displacement: hold the estimate.
                    prev.delay_seconds
                }
            } else {
                prev.delay_seconds
            }
        }
        None => 0.0,
    };

    if time_since_report > tuning.stale_report_secs {
        delay = delay.max((time_since_report - tuning.stale_grace_secs).floor());
    }

    if obs.status.is_stopped() {
        delay = delay.max(tuning.stopped_floor_secs);
    }

    delay
}

/// Applies one observation to the store: computes the new delay from the
/// prior state, writes the updated state back, and returns the rounded
/// delay for the output record.
pub fn observe(
    tuning: &Tuning,
    store: &mut TrackingStore,
    obs: &Observation,
    now: DateTime<Utc>,
) -> u32 {
    let key = obs.key();
    let raw = estimate(tuning, store.get(&key), obs, now);

    store.put(
        key,
        TrackedVehicle {
            last_position: obs.position,
            last_seen_at: now,
            delay_seconds: raw,
        },
    );

    raw.round() as u32
}
