//! `SituationExchangeDelivery`: one situation per service alert.

use std::collections::BTreeSet;

use tracing::debug;

use super::BuildContext;
use crate::error::BuildError;
use crate::gtfs_rt::alert::{Cause, Effect};
use crate::live_index::{InformedEntity, LiveAlert};
use crate::siri::{
    AffectedLine, AffectedNetwork, AffectedStopPoint, AffectedVehicleJourney, Affects, Consequence,
    Consequences, InfoLink, InfoLinks, Networks, PtSituationElement, SituationExchangeDelivery, Situations, Source,
    StopPoints, ValidityPeriod, VehicleJourneys,
};

/// Every alert of the live index.
pub fn build(ctx: &BuildContext<'_>) -> Result<SituationExchangeDelivery, BuildError> {
    let alerts = ctx.live.alerts().all();
    let mut elements = Vec::with_capacity(alerts.len());
    for alert in alerts {
        elements.push(situation(ctx, alert));
        ctx.cancel.check()?;
    }
    debug!(situations = elements.len(), "Situation exchange built");
    Ok(delivery(ctx, elements))
}

/// The alerts at the given positions of the alert index.
pub fn build_for(ctx: &BuildContext<'_>, positions: &BTreeSet<usize>) -> Result<SituationExchangeDelivery, BuildError> {
    let mut elements = Vec::with_capacity(positions.len());
    for alert in positions.iter().filter_map(|i| ctx.live.alerts().get(*i)) {
        elements.push(situation(ctx, alert));
        ctx.cancel.check()?;
    }
    Ok(delivery(ctx, elements))
}

fn delivery(ctx: &BuildContext<'_>, elements: Vec<PtSituationElement>) -> SituationExchangeDelivery {
    SituationExchangeDelivery {
        response_timestamp: ctx.response_timestamp(),
        situations: Situations {
            pt_situation_element: elements,
        },
    }
}

fn situation(ctx: &BuildContext<'_>, alert: &LiveAlert) -> PtSituationElement {
    let progress = if alert.is_closed_at(ctx.live.feed_timestamp()) {
        "closed"
    } else {
        "open"
    };
    let description = alert.description.as_ref().map(|text| match description_prefix(alert.effect) {
        Some(prefix) => format!("{prefix}{text}"),
        None => text.clone(),
    });

    PtSituationElement {
        participant_ref: ctx.codespace().to_string(),
        situation_number: ctx.situation_number(&alert.id),
        source: Source {
            source_type: "directReport".to_string(),
        },
        progress: progress.to_string(),
        validity_period: ValidityPeriod {
            start_time: (alert.start > 0).then(|| ctx.utc(alert.start)),
            end_time: (alert.end > 0).then(|| ctx.utc(alert.end)),
        },
        undefined_reason: String::new(),
        severity: severity(alert.effect).to_string(),
        report_type: report_type(alert.cause).to_string(),
        summary: alert.header.clone(),
        description,
        info_links: alert.url.as_ref().map(|uri| InfoLinks {
            info_link: vec![InfoLink { uri: uri.clone() }],
        }),
        affects: affects(ctx, alert),
        consequences: condition(alert.effect).map(|condition| Consequences {
            consequence: vec![Consequence {
                condition: condition.to_string(),
            }],
        }),
    }
}

pub fn severity(effect: Effect) -> &'static str {
    match effect {
        Effect::NoService => "noService",
        Effect::ReducedService | Effect::SignificantDelays => "severe",
        Effect::Detour | Effect::ModifiedService | Effect::StopMoved => "slight",
        Effect::AdditionalService => "normal",
        Effect::NoEffect => "noImpact",
        _ => "undefined",
    }
}

pub fn report_type(cause: Cause) -> &'static str {
    match cause {
        Cause::Strike | Cause::Accident | Cause::PoliceActivity | Cause::MedicalEmergency => "incident",
        _ => "general",
    }
}

pub fn condition(effect: Effect) -> Option<&'static str> {
    match effect {
        Effect::NoService => Some("NoService"),
        Effect::ReducedService => Some("ReducedService"),
        Effect::SignificantDelays => Some("SevereDelays"),
        Effect::Detour => Some("Diversion"),
        _ => None,
    }
}

fn description_prefix(effect: Effect) -> Option<&'static str> {
    match effect {
        Effect::Detour => Some("Detour: "),
        Effect::ModifiedService => Some("Modified Service: "),
        Effect::StopMoved => Some("Stop Moved: "),
        Effect::AdditionalService => Some("Additional Service: "),
        _ => None,
    }
}

/// One affected object, before grouping into the `Affects` sections.
#[derive(Debug, Clone, PartialEq)]
enum Affected {
    Line(AffectedLine),
    StopPoint(AffectedStopPoint),
    VehicleJourney(AffectedVehicleJourney),
}

fn affected(ctx: &BuildContext<'_>, alert: &LiveAlert) -> Vec<Affected> {
    let line = |route_id: &str| Affected::Line(AffectedLine {
        line_ref: ctx.line_ref(route_id),
    });
    let mut seen_trips: Vec<&str> = Vec::new();
    let mut out = Vec::new();
    for entity in &alert.entities {
        match entity {
            InformedEntity::Trip {
                trip_id,
                route_id,
                start_date,
            } => {
                if seen_trips.contains(&trip_id.as_str()) {
                    continue;
                }
                seen_trips.push(trip_id.as_str());
                let route_id = route_id
                    .as_deref()
                    .or_else(|| ctx.static_index.trip(trip_id).map(|t| t.route_id.as_str()));
                out.push(Affected::VehicleJourney(AffectedVehicleJourney {
                    framed_vehicle_journey_ref: ctx.framed_journey_ref(trip_id, start_date.as_deref(), false),
                    line_ref: route_id.map(|r| ctx.line_ref(r)),
                }));
            }
            InformedEntity::Route { route_id } => out.push(line(route_id)),
            InformedEntity::Stop { stop_id, route_id } => {
                out.push(Affected::StopPoint(AffectedStopPoint {
                    stop_point_ref: ctx.settings.field_mutators.stop_point_ref(stop_id),
                    stop_point_name: ctx.static_index.stop_name(stop_id).map(str::to_string),
                }));
                if let Some(route_id) = route_id {
                    out.push(line(route_id));
                }
            }
            InformedEntity::Agency { .. } => {}
        }
    }
    out
}

fn affects(ctx: &BuildContext<'_>, alert: &LiveAlert) -> Affects {
    let mut lines: Vec<AffectedLine> = Vec::new();
    let mut stops: Vec<AffectedStopPoint> = Vec::new();
    let mut journeys: Vec<AffectedVehicleJourney> = Vec::new();
    for item in affected(ctx, alert) {
        match item {
            Affected::Line(l) if !lines.contains(&l) => lines.push(l),
            Affected::StopPoint(s) if !stops.contains(&s) => stops.push(s),
            Affected::VehicleJourney(j) => journeys.push(j),
            _ => {}
        }
    }
    Affects {
        networks: (!lines.is_empty()).then(|| Networks {
            affected_network: vec![AffectedNetwork { affected_line: lines }],
        }),
        stop_points: (!stops.is_empty()).then(|| StopPoints {
            affected_stop_point: stops,
        }),
        vehicle_journeys: (!journeys.is_empty()).then(|| VehicleJourneys {
            affected_vehicle_journey: journeys,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::{CancelToken, ConverterSettings};
    use crate::gtfs_rt::{
        Alert, EntitySelector, FeedEntity, FeedHeader, FeedMessage, TimeRange, TranslatedString,
        TripDescriptor, translated_string::Translation,
    };
    use crate::live_index::{LiveIndex, RealtimeMessages};
    use crate::snapshot::Snapshot;
    use crate::static_index::loader::MemorySource;
    use crate::static_index::{StaticIndex, StaticOptions};

    const FEED_TS: i64 = 1_700_000_000;

    fn static_index() -> StaticIndex {
        let mut source = MemorySource::default()
            .with_table("agency.txt", "agency_id,agency_timezone\nMTA,UTC\n")
            .with_table("routes.txt", "route_id\nR\nR9\n")
            .with_table("stops.txt", "stop_id,stop_name\nS,Main St\n")
            .with_table("trips.txt", "route_id,service_id,trip_id\nR9,WK,T9\n")
            .with_table("stop_times.txt", "trip_id,stop_id,stop_sequence\nT9,S,1\n");
        StaticIndex::load(&mut source, &StaticOptions::default()).unwrap()
    }

    fn text(value: &str) -> TranslatedString {
        TranslatedString {
            translation: vec![Translation {
                text: value.into(),
                language: None,
            }],
        }
    }

    fn alert_message(alerts: Vec<(&str, Alert)>) -> RealtimeMessages {
        RealtimeMessages {
            alerts: Some(FeedMessage {
                header: FeedHeader {
                    gtfs_realtime_version: "2.0".into(),
                    timestamp: Some(FEED_TS as u64),
                    ..Default::default()
                },
                entity: alerts
                    .into_iter()
                    .map(|(id, alert)| FeedEntity {
                        id: id.into(),
                        alert: Some(alert),
                        ..Default::default()
                    })
                    .collect(),
            }),
            ..Default::default()
        }
    }

    fn run(index: &StaticIndex, messages: &RealtimeMessages, settings: &ConverterSettings) -> SituationExchangeDelivery {
        let live = LiveIndex::build(messages, index, FEED_TS);
        let snapshot = Snapshot::build(&live, index, FEED_TS);
        let cancel = CancelToken::new();
        let ctx = BuildContext {
            static_index: index,
            live: &live,
            snapshot: &snapshot,
            settings,
            now: FEED_TS,
            cancel: &cancel,
        };
        build(&ctx).unwrap()
    }

    #[test]
    fn test_detour_alert_on_route_and_stop() {
        let index = static_index();
        let alert = Alert {
            active_period: vec![TimeRange {
                start: Some((FEED_TS - 3600) as u64),
                end: Some((FEED_TS + 3600) as u64),
            }],
            informed_entity: vec![
                EntitySelector {
                    route_id: Some("R".into()),
                    ..Default::default()
                },
                EntitySelector {
                    stop_id: Some("S".into()),
                    ..Default::default()
                },
            ],
            cause: Some(Cause::Construction as i32),
            effect: Some(Effect::Detour as i32),
            header_text: Some(text("Detour on R")),
            description_text: Some(text("Use Elm St")),
            url: Some(text("https://example.org/detours/r")),
            ..Default::default()
        };
        let mut settings = ConverterSettings::default();
        settings.field_mutators.stop_point_ref = vec![("S".into(), "MTA_S".into())];
        let delivery = run(&index, &alert_message(vec![("a1", alert)]), &settings);

        let element = &delivery.situations.pt_situation_element[0];
        assert_eq!(element.situation_number, "MTA:SituationNumber:a1");
        assert_eq!(element.progress, "open");
        assert_eq!(element.severity, "slight");
        assert_eq!(element.report_type, "general");
        assert_eq!(element.summary.as_deref(), Some("Detour on R"));
        assert_eq!(element.description.as_deref(), Some("Detour: Use Elm St"));
        assert_eq!(element.undefined_reason, "");
        assert_eq!(element.validity_period.start_time.as_deref(), Some("2023-11-14T21:13:20Z"));
        let links = element.info_links.as_ref().unwrap();
        assert_eq!(links.info_link[0].uri, "https://example.org/detours/r");

        let networks = element.affects.networks.as_ref().unwrap();
        assert_eq!(networks.affected_network[0].affected_line[0].line_ref, "MTA:Line:R");
        let stops = element.affects.stop_points.as_ref().unwrap();
        assert_eq!(stops.affected_stop_point[0].stop_point_ref, "MTA_S");
        assert_eq!(stops.affected_stop_point[0].stop_point_name.as_deref(), Some("Main St"));
        assert!(element.affects.vehicle_journeys.is_none());
        let consequences = element.consequences.as_ref().unwrap();
        assert_eq!(consequences.consequence[0].condition, "Diversion");
    }

    #[test]
    fn test_progress_closes_strictly_after_end() {
        let index = static_index();
        let window = |end: i64| Alert {
            active_period: vec![TimeRange {
                start: Some(1),
                end: Some(end as u64),
            }],
            ..Default::default()
        };
        let messages = alert_message(vec![("open", window(FEED_TS)), ("closed", window(FEED_TS - 1))]);
        let delivery = run(&index, &messages, &ConverterSettings::default());
        let elements = &delivery.situations.pt_situation_element;
        assert_eq!(elements[0].progress, "open");
        assert_eq!(elements[1].progress, "closed");
        assert_eq!(elements[0].severity, "undefined");
        assert!(elements[0].consequences.is_none());
        assert!(elements[0].info_links.is_none());
    }

    #[test]
    fn test_trip_entities_are_deduplicated() {
        let index = static_index();
        let trip = EntitySelector {
            trip: Some(TripDescriptor {
                trip_id: Some("T9".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let alert = Alert {
            informed_entity: vec![trip.clone(), trip],
            cause: Some(Cause::Strike as i32),
            effect: Some(Effect::NoService as i32),
            ..Default::default()
        };
        let delivery = run(&index, &alert_message(vec![("s", alert)]), &ConverterSettings::default());
        let element = &delivery.situations.pt_situation_element[0];
        let journeys = &element.affects.vehicle_journeys.as_ref().unwrap().affected_vehicle_journey;
        assert_eq!(journeys.len(), 1);
        assert_eq!(journeys[0].line_ref.as_deref(), Some("MTA:Line:R9"));
        assert_eq!(element.report_type, "incident");
        assert_eq!(element.severity, "noService");
        assert!(element.validity_period.start_time.is_none());
    }

    #[test]
    fn test_mappings() {
        assert_eq!(severity(Effect::SignificantDelays), "severe");
        assert_eq!(severity(Effect::StopMoved), "slight");
        assert_eq!(severity(Effect::AdditionalService), "normal");
        assert_eq!(severity(Effect::NoEffect), "noImpact");
        assert_eq!(severity(Effect::AccessibilityIssue), "undefined");
        assert_eq!(report_type(Cause::MedicalEmergency), "incident");
        assert_eq!(report_type(Cause::Weather), "general");
        assert_eq!(condition(Effect::ReducedService), Some("ReducedService"));
        assert_eq!(condition(Effect::SignificantDelays), Some("SevereDelays"));
        assert_eq!(condition(Effect::ModifiedService), None);
    }
}
