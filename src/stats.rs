use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::live_index::LiveIndex;

/// Coverage figures of one live generation, logged on refresh and served on `/health`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerationStats {
    pub built_at: DateTime<Utc>,
    pub feed_timestamp: i64,

    // entity counts
    pub trip_updates: usize,
    pub vehicle_positions: usize,
    pub alerts: usize,
    pub trips: usize,

    // trip fields
    pub with_position: usize,
    pub with_bearing: usize,
    pub with_occupancy: usize,
    pub with_vehicle_ref: usize,

    pub missing_feeds: Vec<String>,
    pub warnings: Vec<String>,
}

impl GenerationStats {
    pub fn from_live(live: &LiveIndex, built_at: DateTime<Utc>) -> Self {
        let mut s = GenerationStats {
            built_at,
            feed_timestamp: live.feed_timestamp(),
            trip_updates: live.trip_update_count(),
            vehicle_positions: live.vehicle_position_count(),
            alerts: live.alerts().len(),
            trips: live.trips().len(),
            missing_feeds: live
                .missing_feeds()
                .iter()
                .map(|kind| kind.as_str().to_string())
                .collect(),
            warnings: live.warnings().summaries(),
            ..Default::default()
        };

        for trip in live.trips() {
            if trip.position.is_some() {
                s.with_position += 1;
            }

            if trip.bearing.is_some() {
                s.with_bearing += 1;
            }

            if trip.occupancy_status.is_some() {
                s.with_occupancy += 1;
            }

            if trip.vehicle_ref.is_some() {
                s.with_vehicle_ref += 1;
            }
        }

        s
    }

    pub fn pct(part: usize, total: usize) -> f64 {
        if total == 0 {
            0.0
        } else {
            (part as f64 / total as f64) * 100.0
        }
    }

    pub fn position_pct(&self) -> f64 {
        Self::pct(self.with_position, self.trips)
    }

    pub fn bearing_pct(&self) -> f64 {
        Self::pct(self.with_bearing, self.trips)
    }
}
