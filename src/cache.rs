//! Rendered responses of one live generation, keyed by validated request.

use bytes::Bytes;
use dashmap::DashMap;

use crate::request::SiriRequest;

/// Response bytes by request. A new generation starts with an empty cache,
/// so entries never outlive the live index they were built from.
#[derive(Debug, Default)]
pub struct ResponseCache {
    entries: DashMap<SiriRequest, Bytes>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, request: &SiriRequest) -> Option<Bytes> {
        self.entries.get(request).map(|entry| entry.value().clone())
    }

    /// Stores `bytes`; a racing insert for the same key replaces it.
    pub fn insert(&self, request: SiriRequest, bytes: Bytes) {
        self.entries.insert(request, bytes);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{Call, Format, StopMonitoringQuery};

    fn sm(stop: &str, max_visits: Option<usize>) -> SiriRequest {
        SiriRequest {
            call: Call::StopMonitoring(StopMonitoringQuery {
                monitoring_ref: stop.into(),
                maximum_stop_visits: max_visits,
                ..Default::default()
            }),
            format: Format::Json,
        }
    }

    #[test]
    fn test_keys_distinguish_every_parameter() {
        let cache = ResponseCache::new();
        cache.insert(sm("S1", None), Bytes::from_static(b"a"));
        cache.insert(sm("S1", Some(3)), Bytes::from_static(b"b"));
        assert_eq!(cache.get(&sm("S1", None)), Some(Bytes::from_static(b"a")));
        assert_eq!(cache.get(&sm("S1", Some(3))), Some(Bytes::from_static(b"b")));
        assert_eq!(cache.get(&sm("S2", None)), None);

        let xml = SiriRequest {
            format: Format::Xml,
            ..sm("S1", None)
        };
        assert_eq!(cache.get(&xml), None);
    }

    #[test]
    fn test_last_insert_wins_and_clear() {
        let cache = ResponseCache::new();
        cache.insert(sm("S1", None), Bytes::from_static(b"old"));
        cache.insert(sm("S1", None), Bytes::from_static(b"new"));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&sm("S1", None)), Some(Bytes::from_static(b"new")));
        cache.clear();
        assert!(cache.is_empty());
    }
}
