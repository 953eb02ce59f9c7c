// ===========================================================================
// Feature adapter
// ===========================================================================
//
// Converts caller features (id, tagged geometry, attribute bag) into strokes
// the loader can turn into edges, and edges back into output features.
// ===========================================================================

use crate::geometry;
use crate::graph_types::{Edge, EdgeId};
use geo::Coord;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque attribute bag carried from input to output untouched.
pub type Attributes = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FeatureId(pub String);

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FeatureId {
    fn from(value: &str) -> Self {
        FeatureId(value.to_string())
    }
}

impl From<String> for FeatureId {
    fn from(value: String) -> Self {
        FeatureId(value)
    }
}

impl From<u64> for FeatureId {
    fn from(value: u64) -> Self {
        FeatureId(value.to_string())
    }
}

/// Every geometry kind an input feature may carry.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureGeometry {
    Empty,
    Point(Coord),
    MultiPoint(Vec<Coord>),
    LineString(Vec<Coord>),
    MultiLineString(Vec<Vec<Coord>>),
    Polygon(Vec<Vec<Coord>>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct InputFeature {
    pub id: FeatureId,
    pub geometry: FeatureGeometry,
    pub attributes: Attributes,
}

impl InputFeature {
    pub fn new(id: impl Into<FeatureId>, geometry: FeatureGeometry, attributes: Attributes) -> Self {
        Self {
            id: id.into(),
            geometry,
            attributes,
        }
    }

    /// Single line feature with no attributes.
    pub fn line(id: impl Into<FeatureId>, coords: Vec<Coord>) -> Self {
        Self::new(id, FeatureGeometry::LineString(coords), Attributes::new())
    }
}

/// A validated feature: one or more strokes, each with at least two
/// distinct consecutive vertices.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedFeature {
    pub id: FeatureId,
    pub parts: Vec<Vec<Coord>>,
    pub attributes: Attributes,
}

impl PreparedFeature {
    pub fn is_multipart(&self) -> bool {
        self.parts.len() > 1
    }
}

/// Why a feature never reached the graph. The point, when there is one,
/// is where the diagnostic marker goes.
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    Point(Coord),
    Invalid(Option<Coord>),
}

pub fn prepare(feature: InputFeature) -> Result<PreparedFeature, Rejection> {
    let InputFeature {
        id,
        geometry,
        attributes,
    } = feature;

    let raw_parts = match geometry {
        FeatureGeometry::Empty => return Err(Rejection::Invalid(None)),
        FeatureGeometry::Point(c) => return Err(Rejection::Point(c)),
        FeatureGeometry::MultiPoint(points) => {
            return Err(match points.first() {
                Some(c) => Rejection::Point(*c),
                None => Rejection::Invalid(None),
            });
        }
        FeatureGeometry::Polygon(rings) => {
            let first = rings.iter().flatten().copied().find(|c| geometry::is_finite(*c));
            return Err(Rejection::Invalid(first));
        }
        FeatureGeometry::LineString(coords) => vec![coords],
        FeatureGeometry::MultiLineString(parts) => parts,
    };

    let first_finite = raw_parts
        .iter()
        .flatten()
        .copied()
        .find(|c| geometry::is_finite(*c));
    if raw_parts.iter().flatten().any(|c| !geometry::is_finite(*c)) {
        return Err(Rejection::Invalid(first_finite));
    }

    let parts: Vec<Vec<Coord>> = raw_parts
        .iter()
        .map(|p| geometry::remove_repeated(p))
        .filter(|p| p.len() >= 2 && geometry::polyline_length(p) > 0.0)
        .collect();
    let parts = stitch_parts(parts);

    if parts.is_empty() {
        return Err(Rejection::Invalid(first_finite));
    }

    Ok(PreparedFeature {
        id,
        parts,
        attributes,
    })
}

/// Join consecutive parts where one ends exactly where the next begins.
fn stitch_parts(parts: Vec<Vec<Coord>>) -> Vec<Vec<Coord>> {
    let mut stitched: Vec<Vec<Coord>> = Vec::with_capacity(parts.len());
    for part in parts {
        match stitched.last_mut() {
            Some(prev) if prev.last() == part.first() => {
                prev.extend_from_slice(&part[1..]);
            }
            _ => stitched.push(part),
        }
    }
    stitched
}

/// A cleaned edge handed back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputFeature {
    pub id: EdgeId,
    pub source: FeatureId,
    pub geometry: Vec<Coord>,
    pub attributes: Attributes,
}

impl From<&Edge> for OutputFeature {
    fn from(edge: &Edge) -> Self {
        Self {
            id: edge.id,
            source: edge.source.clone(),
            geometry: edge.geometry.clone(),
            attributes: edge.attributes.clone(),
        }
    }
}
