//! Ordered identifier substitutions applied to emitted stop references.

use serde::Deserialize;

/// `(from, to)` pairs per output field. The first matching `from` wins and
/// the value is rewritten once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FieldMutators {
    #[serde(rename = "OriginRef", default)]
    pub origin_ref: Vec<(String, String)>,
    #[serde(rename = "StopPointRef", default)]
    pub stop_point_ref: Vec<(String, String)>,
    #[serde(rename = "DestinationRef", default)]
    pub destination_ref: Vec<(String, String)>,
}

impl FieldMutators {
    pub fn origin_ref(&self, value: &str) -> String {
        mutate(&self.origin_ref, value)
    }

    pub fn stop_point_ref(&self, value: &str) -> String {
        mutate(&self.stop_point_ref, value)
    }

    pub fn destination_ref(&self, value: &str) -> String {
        mutate(&self.destination_ref, value)
    }
}

pub fn mutate(pairs: &[(String, String)], value: &str) -> String {
    pairs
        .iter()
        .find(|(from, _)| from == value)
        .map_or_else(|| value.to_string(), |(_, to)| to.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(list: &[(&str, &str)]) -> Vec<(String, String)> {
        list.iter().map(|(a, b)| (a.to_string(), b.to_string())).collect()
    }

    #[test]
    fn test_first_match_wins_single_pass() {
        let p = pairs(&[("A", "B"), ("B", "C"), ("A", "Z")]);
        assert_eq!(mutate(&p, "A"), "B");
        assert_eq!(mutate(&p, "B"), "C");
        assert_eq!(mutate(&p, "Q"), "Q");
    }

    #[test]
    fn test_idempotent_when_targets_are_not_sources() {
        let p = pairs(&[("A", "X"), ("B", "Y")]);
        for v in ["A", "B", "C"] {
            let once = mutate(&p, v);
            assert_eq!(mutate(&p, &once), once);
        }
    }

    #[test]
    fn test_deserialize_from_pair_lists() {
        let m: FieldMutators =
            serde_json::from_str(r#"{"StopPointRef": [["S", "MTA_S"]], "OriginRef": []}"#).unwrap();
        assert_eq!(m.stop_point_ref("S"), "MTA_S");
        assert_eq!(m.origin_ref("S"), "S");
        assert!(m.destination_ref.is_empty());
    }
}
