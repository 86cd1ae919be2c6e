//! Great-circle distances and projection of points onto route polylines.
//!
//! Shape points live in contiguous slices; a [`Polyline`] is a borrowed view
//! over one shape's points and its cumulative distance table, so the hot loops
//! never allocate per point.

const EARTH_RADIUS_KM: f64 = 6371.0;

/// A WGS84 position in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coord {
    pub lon: f64,
    pub lat: f64,
}

impl Coord {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }
}

/// Haversine distance between two coordinates, in kilometers.
pub fn haversine_km(from: Coord, to: Coord) -> f64 {
    let d_lat = (to.lat - from.lat).to_radians();
    let d_lon = (to.lon - from.lon).to_radians();
    let h = (d_lat * 0.5).sin().powi(2)
        + from.lat.to_radians().cos() * to.lat.to_radians().cos() * (d_lon * 0.5).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

/// Cumulative great-circle kilometers from the first point to each point.
///
/// The result has the same length as `points`, starts at `0.0` and never
/// decreases.
pub fn cumulative_km(points: &[Coord]) -> Vec<f64> {
    let mut cum = Vec::with_capacity(points.len());
    let mut total = 0.0;
    for (i, p) in points.iter().enumerate() {
        if i > 0 {
            total += haversine_km(points[i - 1], *p);
        }
        cum.push(total);
    }
    cum
}

/// Where a point lands when snapped onto a polyline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    /// Index of the segment start point.
    pub segment: usize,
    /// Clamped position along the segment, in `[0, 1]`.
    pub t: f64,
    pub snapped: Coord,
}

/// Borrowed view over a polyline and its cumulative distances.
#[derive(Debug, Clone, Copy)]
pub struct Polyline<'a> {
    points: &'a [Coord],
    cum_km: &'a [f64],
}

impl<'a> Polyline<'a> {
    /// `cum_km` must be [`cumulative_km`] of `points`.
    pub fn new(points: &'a [Coord], cum_km: &'a [f64]) -> Self {
        debug_assert_eq!(points.len(), cum_km.len());
        Self { points, cum_km }
    }

    pub fn points(&self) -> &'a [Coord] {
        self.points
    }

    pub fn cum_km(&self) -> &'a [f64] {
        self.cum_km
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn length_km(&self) -> f64 {
        self.cum_km.last().copied().unwrap_or(0.0)
    }

    /// Nearest segment to `p` using squared planar distance in lon/lat space.
    ///
    /// Ties keep the lowest segment index. A single-point polyline projects
    /// everything onto that point.
    pub fn project(&self, p: Coord) -> Option<Projection> {
        match self.points.len() {
            0 => None,
            1 => Some(Projection {
                segment: 0,
                t: 0.0,
                snapped: self.points[0],
            }),
            _ => {
                let mut best: Option<(f64, Projection)> = None;
                for (i, pair) in self.points.windows(2).enumerate() {
                    let (t, snapped) = project_onto_segment(pair[0], pair[1], p);
                    let d = squared_planar(snapped, p);
                    let better = match &best {
                        None => true,
                        Some((best_d, _)) => d < *best_d,
                    };
                    if better {
                        best = Some((
                            d,
                            Projection {
                                segment: i,
                                t,
                                snapped,
                            },
                        ));
                    }
                }
                best.map(|(_, projection)| projection)
            }
        }
    }

    /// Distance along the polyline of the snapped position of `p`, in km.
    pub fn distance_along(&self, p: Coord) -> Option<f64> {
        let projection = self.project(p)?;
        Some(self.distance_of(&projection))
    }

    fn distance_of(&self, projection: &Projection) -> f64 {
        let start = self.cum_km[projection.segment];
        match self.cum_km.get(projection.segment + 1) {
            Some(end) => start + projection.t * (end - start),
            None => start,
        }
    }

    /// Coordinate at `distance_km` from the first point.
    ///
    /// Distances outside the polyline clamp to its endpoints.
    pub fn coordinate_at(&self, distance_km: f64) -> Option<Coord> {
        let first = *self.points.first()?;
        let last = *self.points.last()?;
        if distance_km <= 0.0 {
            return Some(first);
        }
        if distance_km >= self.length_km() {
            return Some(last);
        }

        // first index whose cumulative distance exceeds the target
        let upper = self.cum_km.partition_point(|&c| c <= distance_km);
        if upper == 0 {
            return Some(first);
        }
        if upper >= self.points.len() {
            return Some(last);
        }
        let lower = upper - 1;
        let seg_len = self.cum_km[upper] - self.cum_km[lower];
        if seg_len <= 0.0 {
            return Some(self.points[lower]);
        }
        let t = (distance_km - self.cum_km[lower]) / seg_len;
        Some(lerp(self.points[lower], self.points[upper], t))
    }
}

/// A polyline that owns its points, used when a trip has no shape and the
/// path is rebuilt from its stop coordinates.
#[derive(Debug, Clone, Default)]
pub struct OwnedPolyline {
    points: Vec<Coord>,
    cum_km: Vec<f64>,
}

impl OwnedPolyline {
    pub fn new(points: Vec<Coord>) -> Self {
        let cum_km = cumulative_km(&points);
        Self { points, cum_km }
    }

    pub fn view(&self) -> Polyline<'_> {
        Polyline::new(&self.points, &self.cum_km)
    }
}

fn project_onto_segment(a: Coord, b: Coord, p: Coord) -> (f64, Coord) {
    let dx = b.lon - a.lon;
    let dy = b.lat - a.lat;
    let len_sq = dx * dx + dy * dy;
    if len_sq == 0.0 {
        return (0.0, a);
    }
    let t = (((p.lon - a.lon) * dx + (p.lat - a.lat) * dy) / len_sq).clamp(0.0, 1.0);
    (t, lerp(a, b, t))
}

fn squared_planar(a: Coord, b: Coord) -> f64 {
    let dx = a.lon - b.lon;
    let dy = a.lat - b.lat;
    dx * dx + dy * dy
}

fn lerp(a: Coord, b: Coord, t: f64) -> Coord {
    Coord {
        lon: a.lon + (b.lon - a.lon) * t,
        lat: a.lat + (b.lat - a.lat) * t,
    }
}
