//! Contiguous storage for every shape in the feed.

use std::collections::HashMap;
use std::ops::Range;

use crate::geometry::{Coord, Polyline, cumulative_km};

/// All shape points of a feed in one arena, addressed by shape id.
#[derive(Debug, Default)]
pub struct ShapeStore {
    points: Vec<Coord>,
    cum_km: Vec<f64>,
    ranges: HashMap<String, Range<usize>>,
}

impl ShapeStore {
    /// Builds the arena from `(shape_id, sequence, point)` rows in any order.
    ///
    /// Points of a shape are ordered by sequence, ties in input order, and the
    /// cumulative distance table is computed once per shape.
    pub fn from_rows(rows: Vec<(String, u32, Coord)>) -> Self {
        let mut grouped: HashMap<String, Vec<(u32, Coord)>> = HashMap::new();
        for (shape_id, sequence, point) in rows {
            grouped.entry(shape_id).or_default().push((sequence, point));
        }

        let mut ids: Vec<String> = grouped.keys().cloned().collect();
        ids.sort();

        let mut store = ShapeStore::default();
        for id in ids {
            let Some(mut shape) = grouped.remove(&id) else {
                continue;
            };
            shape.sort_by_key(|(sequence, _)| *sequence);

            let start = store.points.len();
            let points: Vec<Coord> = shape.into_iter().map(|(_, p)| p).collect();
            store.cum_km.extend(cumulative_km(&points));
            store.points.extend(points);
            store.ranges.insert(id, start..store.points.len());
        }
        store
    }

    pub fn get(&self, shape_id: &str) -> Option<Polyline<'_>> {
        let range = self.ranges.get(shape_id)?.clone();
        Some(Polyline::new(
            &self.points[range.clone()],
            &self.cum_km[range],
        ))
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}
