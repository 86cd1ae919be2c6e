//! Service alerts and their reverse indexes.

use std::collections::HashMap;

use crate::gtfs_rt::{Alert, EntitySelector, FeedMessage, TranslatedString, alert};
use crate::static_index::StaticIndex;

/// What an informed entity of an alert points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InformedEntity {
    Trip {
        trip_id: String,
        route_id: Option<String>,
        start_date: Option<String>,
    },
    Stop {
        stop_id: String,
        route_id: Option<String>,
    },
    Route {
        route_id: String,
    },
    Agency {
        agency_id: String,
    },
}

impl InformedEntity {
    fn from_selector(selector: &EntitySelector) -> Option<Self> {
        if let Some(trip) = &selector.trip {
            if let Some(trip_id) = trip.trip_id.clone().filter(|id| !id.is_empty()) {
                return Some(InformedEntity::Trip {
                    trip_id,
                    route_id: trip
                        .route_id
                        .clone()
                        .or_else(|| selector.route_id.clone())
                        .filter(|id| !id.is_empty()),
                    start_date: trip.start_date.clone().filter(|d| !d.is_empty()),
                });
            }
        }
        let route_id = selector.route_id.clone().filter(|id| !id.is_empty());
        if let Some(stop_id) = selector.stop_id.clone().filter(|id| !id.is_empty()) {
            return Some(InformedEntity::Stop { stop_id, route_id });
        }
        if let Some(route_id) = route_id {
            return Some(InformedEntity::Route { route_id });
        }
        selector
            .agency_id
            .clone()
            .filter(|id| !id.is_empty())
            .map(|agency_id| InformedEntity::Agency { agency_id })
    }
}

#[derive(Debug, Clone)]
pub struct LiveAlert {
    pub id: String,
    pub header: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub cause: alert::Cause,
    pub effect: alert::Effect,
    /// Earliest active-period start, `0` when unbounded.
    pub start: i64,
    /// Latest active-period end, `0` when any period is open-ended.
    pub end: i64,
    pub route_ids: Vec<String>,
    pub stop_ids: Vec<String>,
    pub trip_ids: Vec<String>,
    pub entities: Vec<InformedEntity>,
}

impl LiveAlert {
    fn from_feed(id: &str, alert: &Alert, static_index: &StaticIndex) -> Self {
        let (start, end) = active_bounds(alert);
        let entities: Vec<InformedEntity> = alert
            .informed_entity
            .iter()
            .filter_map(InformedEntity::from_selector)
            .collect();

        let mut route_ids = Vec::new();
        let mut stop_ids = Vec::new();
        let mut trip_ids = Vec::new();
        for entity in &entities {
            match entity {
                InformedEntity::Trip {
                    trip_id, route_id, ..
                } => {
                    push_unique(&mut trip_ids, trip_id);
                    let route = route_id.as_deref().or_else(|| {
                        static_index.trip(trip_id).map(|t| t.route_id.as_str())
                    });
                    if let Some(route) = route {
                        push_unique(&mut route_ids, route);
                    }
                }
                InformedEntity::Stop { stop_id, route_id } => {
                    push_unique(&mut stop_ids, stop_id);
                    if let Some(route) = route_id {
                        push_unique(&mut route_ids, route);
                    }
                }
                InformedEntity::Route { route_id } => push_unique(&mut route_ids, route_id),
                InformedEntity::Agency { .. } => {}
            }
        }

        Self {
            id: id.to_string(),
            header: alert.header_text.as_ref().and_then(pick_translation),
            description: alert.description_text.as_ref().and_then(pick_translation),
            url: alert.url.as_ref().and_then(pick_translation),
            cause: alert.cause(),
            effect: alert.effect(),
            start,
            end,
            route_ids,
            stop_ids,
            trip_ids,
            entities,
        }
    }

    /// Closed once the end has passed; `end == at` is still open.
    pub fn is_closed_at(&self, at: i64) -> bool {
        self.end > 0 && self.end < at
    }
}

fn active_bounds(alert: &Alert) -> (i64, i64) {
    if alert.active_period.is_empty() {
        return (0, 0);
    }
    let start = alert
        .active_period
        .iter()
        .map(|p| p.start.unwrap_or(0) as i64)
        .min()
        .unwrap_or(0);
    let open_ended = alert.active_period.iter().any(|p| p.end.unwrap_or(0) == 0);
    let end = if open_ended {
        0
    } else {
        alert
            .active_period
            .iter()
            .map(|p| p.end.unwrap_or(0) as i64)
            .max()
            .unwrap_or(0)
    };
    (start, end)
}

/// English (or untagged) text first, otherwise the first translation.
fn pick_translation(text: &TranslatedString) -> Option<String> {
    text.translation
        .iter()
        .find(|t| match t.language.as_deref() {
            None | Some("") => true,
            Some(lang) => lang.eq_ignore_ascii_case("en") || lang.to_ascii_lowercase().starts_with("en-"),
        })
        .or_else(|| text.translation.first())
        .map(|t| t.text.clone())
        .filter(|s| !s.is_empty())
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|v| v == value) {
        list.push(value.to_string());
    }
}

/// All alerts of one generation with lookups by route, stop and trip.
#[derive(Debug, Default)]
pub struct AlertIndex {
    alerts: Vec<LiveAlert>,
    by_route: HashMap<String, Vec<usize>>,
    by_stop: HashMap<String, Vec<usize>>,
    by_trip: HashMap<String, Vec<usize>>,
}

impl AlertIndex {
    pub fn build(message: Option<&FeedMessage>, static_index: &StaticIndex) -> Self {
        let mut index = AlertIndex::default();
        let Some(message) = message else {
            return index;
        };

        for entity in &message.entity {
            if entity.is_deleted.unwrap_or(false) {
                continue;
            }
            let Some(alert) = &entity.alert else {
                continue;
            };
            let live = LiveAlert::from_feed(&entity.id, alert, static_index);
            let at = index.alerts.len();
            for route_id in &live.route_ids {
                index.by_route.entry(route_id.clone()).or_default().push(at);
            }
            for stop_id in &live.stop_ids {
                index.by_stop.entry(stop_id.clone()).or_default().push(at);
            }
            for trip_id in &live.trip_ids {
                index.by_trip.entry(trip_id.clone()).or_default().push(at);
            }
            index.alerts.push(live);
        }
        index
    }

    pub fn all(&self) -> &[LiveAlert] {
        &self.alerts
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }

    pub fn for_route(&self, route_id: &str) -> &[usize] {
        self.by_route.get(route_id).map_or(&[][..], Vec::as_slice)
    }

    pub fn for_stop(&self, stop_id: &str) -> &[usize] {
        self.by_stop.get(stop_id).map_or(&[][..], Vec::as_slice)
    }

    pub fn for_trip(&self, trip_id: &str) -> &[usize] {
        self.by_trip.get(trip_id).map_or(&[][..], Vec::as_slice)
    }

    pub fn get(&self, position: usize) -> Option<&LiveAlert> {
        self.alerts.get(position)
    }
}
