use geo::algorithm::line_intersection::{LineIntersection, line_intersection};
use geo::{Coord, Line, LineString, RemoveRepeatedPoints, Simplify};

/// Absolute tolerance used when two coordinates produced by different code
/// paths (concatenation, re-threading) are compared. Node identity is always
/// decided by id, this only guards geometry bookkeeping.
pub const COORD_EPSILON: f64 = 1e-9;

/// Axis-aligned bounding box as (min, max) corners.
pub type Envelope = ([f64; 2], [f64; 2]);

pub fn segment_length(a: Coord, b: Coord) -> f64 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    (dx * dx + dy * dy).sqrt()
}

/// Euclidean length of a polyline.
pub fn polyline_length(coords: &[Coord]) -> f64 {
    coords.windows(2).map(|w| segment_length(w[0], w[1])).sum()
}

pub fn bbox(coords: &[Coord]) -> Envelope {
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (f64::MAX, f64::MAX, f64::MIN, f64::MIN);
    for pt in coords {
        min_x = min_x.min(pt.x);
        min_y = min_y.min(pt.y);
        max_x = max_x.max(pt.x);
        max_y = max_y.max(pt.y);
    }
    ([min_x, min_y], [max_x, max_y])
}

pub fn envelopes_intersect(a: &Envelope, b: &Envelope) -> bool {
    !(a.1[0] < b.0[0] || b.1[0] < a.0[0] || a.1[1] < b.0[1] || b.1[1] < a.0[1])
}

pub fn coords_eq(a: Coord, b: Coord, tolerance: f64) -> bool {
    (a.x - b.x).abs() <= tolerance && (a.y - b.y).abs() <= tolerance
}

pub fn is_finite(c: Coord) -> bool {
    c.x.is_finite() && c.y.is_finite()
}

/// First and last vertex are the exact same coordinate.
pub fn is_closed(coords: &[Coord]) -> bool {
    coords.len() > 1 && coords.first() == coords.last()
}

pub fn centroid(points: &[Coord]) -> Coord {
    if points.is_empty() {
        return Coord { x: 0.0, y: 0.0 };
    }
    let n = points.len() as f64;
    let (sum_x, sum_y) = points
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
    Coord {
        x: sum_x / n,
        y: sum_y / n,
    }
}

/// Drop consecutive duplicate vertices.
pub fn remove_repeated(coords: &[Coord]) -> Vec<Coord> {
    LineString::new(coords.to_vec()).remove_repeated_points().0
}

/// Douglas-Peucker simplification. A tolerance of zero (or less) leaves the
/// line untouched, and a closed ring is never reduced below four vertices.
pub fn simplify_polyline(coords: &[Coord], tolerance: f64) -> Vec<Coord> {
    if tolerance <= 0.0 || coords.len() <= 2 {
        return coords.to_vec();
    }
    let simplified = LineString::new(coords.to_vec()).simplify(&tolerance).0;
    if simplified.len() < 2 || (is_closed(coords) && simplified.len() < 4) {
        return coords.to_vec();
    }
    simplified
}

/// Angle in degrees (0..=180) between the rays vertex->prev and vertex->next.
/// 180 means the three points are collinear and the line goes straight on.
pub fn turning_angle(prev: Coord, vertex: Coord, next: Coord) -> f64 {
    let v1 = (prev.x - vertex.x, prev.y - vertex.y);
    let v2 = (next.x - vertex.x, next.y - vertex.y);
    let len1 = (v1.0 * v1.0 + v1.1 * v1.1).sqrt();
    let len2 = (v2.0 * v2.0 + v2.1 * v2.1).sqrt();
    if len1 == 0.0 || len2 == 0.0 {
        return 0.0;
    }
    let cos_angle = (v1.0 * v2.0 + v1.1 * v2.1) / (len1 * len2);
    cos_angle.clamp(-1.0, 1.0).acos().to_degrees()
}

/// Points where the two polylines cross: single-point intersections that
/// are not an endpoint of either line. Collinear overlaps are touching, not
/// crossing, and are ignored. Points come back in order along `a`, without
/// repeats.
pub fn crossing_points(a: &[Coord], b: &[Coord]) -> Vec<Coord> {
    if a.len() < 2 || b.len() < 2 {
        return Vec::new();
    }
    let endpoints = [a[0], a[a.len() - 1], b[0], b[b.len() - 1]];
    let mut points: Vec<Coord> = Vec::new();

    for seg_a in a.windows(2) {
        let line_a = Line::new(seg_a[0], seg_a[1]);
        let env_a = bbox(seg_a);
        for seg_b in b.windows(2) {
            if !envelopes_intersect(&env_a, &bbox(seg_b)) {
                continue;
            }
            let line_b = Line::new(seg_b[0], seg_b[1]);
            let Some(LineIntersection::SinglePoint { intersection, .. }) =
                line_intersection(line_a, line_b)
            else {
                continue;
            };
            if endpoints.contains(&intersection) {
                continue;
            }
            if points
                .iter()
                .any(|p| coords_eq(*p, intersection, COORD_EPSILON))
            {
                continue;
            }
            points.push(intersection);
        }
    }
    points
}

/// Rotate a closed ring so that it starts and ends at `anchor`.
///
/// Returns the ring unchanged when it is not closed, already starts at the
/// anchor, or never passes through the anchor.
pub fn thread_from_anchor(ring: &[Coord], anchor: Coord, tolerance: f64) -> Vec<Coord> {
    let n = ring.len();
    if n < 4 || !coords_eq(ring[0], ring[n - 1], tolerance) || coords_eq(ring[0], anchor, tolerance)
    {
        return ring.to_vec();
    }
    let Some(k) = ring[..n - 1]
        .iter()
        .position(|c| coords_eq(*c, anchor, tolerance))
    else {
        return ring.to_vec();
    };
    let mut threaded = Vec::with_capacity(n);
    threaded.extend_from_slice(&ring[k..n - 1]);
    threaded.extend_from_slice(&ring[..k]);
    threaded.push(ring[k]);
    threaded
}

pub fn coord(x: f64, y: f64) -> Coord {
    Coord { x, y }
}
