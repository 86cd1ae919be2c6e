//! Consolidated data-quality warnings.
//!
//! Conversion never fails on missing fields; it records a warning with an
//! example entity id and carries on with a fallback. At the end of a build
//! one line per warning kind is logged.

use std::collections::BTreeMap;

use tracing::warn;

const MAX_EXAMPLES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WarningKind {
    NoTripId,
    NoRouteId,
    NoStartDate,
    TripNotInStatic,
    NoStaticTimes,
    NoLatLon,
    NoOnwardStops,
    NoRouteShortName,
    NoStopId,
    DuplicateTrip,
}

impl WarningKind {
    pub fn code(self) -> &'static str {
        match self {
            WarningKind::NoTripId => "no_trip_id",
            WarningKind::NoRouteId => "no_route_id",
            WarningKind::NoStartDate => "no_start_date",
            WarningKind::TripNotInStatic => "trip_not_in_static",
            WarningKind::NoStaticTimes => "no_static_times",
            WarningKind::NoLatLon => "no_lat_lon",
            WarningKind::NoOnwardStops => "no_onward_stops",
            WarningKind::NoRouteShortName => "no_route_short_name",
            WarningKind::NoStopId => "no_stop_id",
            WarningKind::DuplicateTrip => "duplicate_trip",
        }
    }

    /// What the consumer loses and which fallback is used.
    pub fn impact(self) -> &'static str {
        match self {
            WarningKind::NoTripId => "entities without trip_id were dropped",
            WarningKind::NoRouteId => "LineRef falls back to the static route or UNKNOWN",
            WarningKind::NoStartDate => "service date inferred from the closest scheduled time",
            WarningKind::TripNotInStatic => "origin, destination and aimed times are omitted",
            WarningKind::NoStaticTimes => "delays default to PT0S and statuses to onTime",
            WarningKind::NoLatLon => "location interpolated from the schedule or omitted",
            WarningKind::NoOnwardStops => "no MonitoredCall and no stop-monitoring visits",
            WarningKind::NoRouteShortName => "PublishedLineName falls back to the route id",
            WarningKind::NoStopId => "stop time updates without a resolvable stop were dropped",
            WarningKind::DuplicateTrip => "only the first entity for the trip was kept",
        }
    }
}

#[derive(Debug, Default, Clone)]
struct Entry {
    count: usize,
    examples: Vec<String>,
}

/// Per-build warning accumulator.
#[derive(Debug, Default, Clone)]
pub struct Warnings {
    entries: BTreeMap<WarningKind, Entry>,
}

impl Warnings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, kind: WarningKind, example: &str) {
        let entry = self.entries.entry(kind).or_default();
        entry.count += 1;
        if entry.examples.len() < MAX_EXAMPLES && !entry.examples.iter().any(|e| e == example) {
            entry.examples.push(example.to_string());
        }
    }

    pub fn count(&self, kind: WarningKind) -> usize {
        self.entries.get(&kind).map_or(0, |e| e.count)
    }

    pub fn examples(&self, kind: WarningKind) -> &[String] {
        self.entries
            .get(&kind)
            .map_or(&[][..], |e| e.examples.as_slice())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn merge(&mut self, other: Warnings) {
        for (kind, theirs) in other.entries {
            let ours = self.entries.entry(kind).or_default();
            ours.count += theirs.count;
            for example in theirs.examples {
                if ours.examples.len() >= MAX_EXAMPLES {
                    break;
                }
                if !ours.examples.contains(&example) {
                    ours.examples.push(example);
                }
            }
        }
    }

    /// One human-readable line per kind, in a stable order.
    pub fn summaries(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|(kind, entry)| {
                format!(
                    "{}: {} occurrence(s), {} (e.g. {})",
                    kind.code(),
                    entry.count,
                    kind.impact(),
                    entry.examples.join(", ")
                )
            })
            .collect()
    }

    /// Logs the consolidated lines under `context`.
    pub fn emit(&self, context: &str) {
        for (kind, entry) in &self.entries {
            warn!(
                context,
                warning = kind.code(),
                count = entry.count,
                examples = ?entry.examples,
                "{}",
                kind.impact()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_and_caps_examples() {
        let mut w = Warnings::new();
        for id in ["t1", "t2", "t2", "t3", "t4"] {
            w.record(WarningKind::NoLatLon, id);
        }
        assert_eq!(w.count(WarningKind::NoLatLon), 5);
        assert_eq!(w.examples(WarningKind::NoLatLon), &["t1", "t2", "t3"]);
        assert_eq!(w.count(WarningKind::NoRouteId), 0);
        assert!(w.examples(WarningKind::NoRouteId).is_empty());
    }

    #[test]
    fn test_one_summary_per_kind() {
        let mut w = Warnings::new();
        w.record(WarningKind::NoStartDate, "a");
        w.record(WarningKind::NoRouteId, "b");
        w.record(WarningKind::NoRouteId, "c");
        let lines = w.summaries();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("no_route_id: 2 occurrence(s)"));
        assert!(lines[0].ends_with("(e.g. b, c)"));
        assert!(lines[1].starts_with("no_start_date: 1"));
    }

    #[test]
    fn test_merge() {
        let mut a = Warnings::new();
        a.record(WarningKind::NoOnwardStops, "x");
        let mut b = Warnings::new();
        b.record(WarningKind::NoOnwardStops, "x");
        b.record(WarningKind::NoOnwardStops, "y");
        b.record(WarningKind::TripNotInStatic, "z");
        a.merge(b);
        assert_eq!(a.count(WarningKind::NoOnwardStops), 3);
        assert_eq!(a.examples(WarningKind::NoOnwardStops), &["x", "y"]);
        assert_eq!(a.count(WarningKind::TripNotInStatic), 1);
        assert!(!a.is_empty());
    }
}
