// ===========================================================================
// Loader
// ===========================================================================
//
// Turns input features into edges and nodes. Endpoints are shared by exact
// coordinate only; tolerance-based joining is the snapping pass's job.
//
// The two-phase variant first keeps every feature as a loose stroke in a
// bbox index (the pseudo graph), splits strokes wherever they share a vertex
// with another stroke or revisit one of their own, and only then loads the
// pieces with topology.
// ===========================================================================

use crate::error::{CleanError, CleanResult};
use crate::feature::{FeatureGeometry, InputFeature, PreparedFeature, Rejection, prepare};
use crate::geometry;
use crate::graph_types::{CoordKey, EdgeId, Graph, MarkerKind, NodeId, coord_key};
use crate::progress::ProgressReporter;
use crate::spatial_index::BboxIndex;
use ahash::{AHashMap, AHashSet};
use geo::Coord;
use log::{debug, info, warn};

impl Graph {
    /// Node at exactly `point`, created and registered on first use.
    pub fn load_point(&mut self, point: Coord) -> NodeId {
        let key = coord_key(point);
        if let Some(id) = self.point_lookup.get(&key) {
            return *id;
        }
        let id = self.add_node(point);
        self.point_lookup.insert(key, id);
        id
    }

    /// Load every feature as an edge between exact-match endpoint nodes.
    /// Unusable geometry is skipped and reported as an error marker.
    pub fn load_edges(
        &mut self,
        features: Vec<InputFeature>,
        angle_threshold: f64,
        progress: &mut ProgressReporter,
    ) -> CleanResult<Vec<EdgeId>> {
        let total = features.len();
        let mut loaded = Vec::with_capacity(total);
        for (i, feature) in features.into_iter().enumerate() {
            progress.step(i, total)?;
            if let Some(prepared) = self.prepare_or_report(feature) {
                loaded.push(self.load_prepared(prepared, angle_threshold)?);
            }
        }
        info!(
            "loaded {} of {} features: {} nodes, {} edges",
            loaded.len(),
            total,
            self.num_nodes(),
            self.num_edges()
        );
        Ok(loaded)
    }

    fn load_prepared(&mut self, prepared: PreparedFeature, angle_threshold: f64) -> CleanResult<EdgeId> {
        let PreparedFeature {
            id,
            parts,
            attributes,
        } = prepared;
        let mut strokes = parts
            .iter()
            .map(|part| geometry::simplify_polyline(part, angle_threshold));
        let Some(primary) = strokes.next() else {
            return Err(CleanError::invariant(
                "load_edges",
                format!("feature {} prepared without parts", id),
            ));
        };
        let detached: Vec<Vec<Coord>> = strokes.collect();
        let (Some(first), Some(last)) = (primary.first().copied(), primary.last().copied()) else {
            return Err(CleanError::invariant(
                "load_edges",
                format!("feature {} prepared without vertices", id),
            ));
        };
        let start = self.load_point(first);
        let end = self.load_point(last);
        self.add_edge(primary, attributes, id, start, end, detached)
    }

    fn prepare_or_report(&mut self, feature: InputFeature) -> Option<PreparedFeature> {
        let id = feature.id.clone();
        match prepare(feature) {
            Ok(prepared) => Some(prepared),
            Err(Rejection::Point(at)) => {
                debug!("feature {} is a point, skipped", id);
                self.record_error(MarkerKind::Point, at);
                None
            }
            Err(Rejection::Invalid(Some(at))) => {
                debug!("feature {} has unusable geometry, skipped", id);
                self.record_error(MarkerKind::Invalid, at);
                None
            }
            Err(Rejection::Invalid(None)) => {
                warn!("feature {} has no usable coordinates, skipped without a marker", id);
                None
            }
        }
    }

    /// First phase of the break pipeline: validate features and index their
    /// strokes, without creating any topology.
    pub fn load_edges_w_o_topology(
        &mut self,
        features: Vec<InputFeature>,
        progress: &mut ProgressReporter,
    ) -> CleanResult<PseudoGraph> {
        let total = features.len();
        let mut prepared = Vec::with_capacity(total);
        for (i, feature) in features.into_iter().enumerate() {
            progress.step(i, total)?;
            if let Some(p) = self.prepare_or_report(feature) {
                prepared.push(p);
            }
        }
        Ok(PseudoGraph::new(prepared))
    }
}

/// Features held as loose strokes, indexed by (feature, part).
pub struct PseudoGraph {
    pub(crate) features: Vec<PreparedFeature>,
    pub(crate) index: BboxIndex<(usize, usize)>,
}

/// The pieces one feature breaks into, plus the markers the break produced.
#[derive(Debug, Clone)]
pub struct BrokenFeature {
    pub pieces: Vec<InputFeature>,
    pub markers: Vec<(MarkerKind, Coord)>,
}

impl PseudoGraph {
    pub fn new(features: Vec<PreparedFeature>) -> Self {
        Self {
            index: stroke_index(&features),
            features,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.features.len()
    }

    /// Every (feature, part) key, in input order.
    pub(crate) fn stroke_keys(&self) -> Vec<(usize, usize)> {
        self.features
            .iter()
            .enumerate()
            .flat_map(|(f, feature)| (0..feature.parts.len()).map(move |p| (f, p)))
            .collect()
    }

    /// Rebuild the bbox index after strokes were edited in place.
    pub(crate) fn reindex(&mut self) {
        self.index = stroke_index(&self.features);
    }

    /// Break each feature in input order.
    pub fn break_features_iter(&self) -> impl Iterator<Item = BrokenFeature> + '_ {
        self.features
            .iter()
            .enumerate()
            .map(move |(f, feature)| self.break_feature(f, feature))
    }

    fn break_feature(&self, f: usize, feature: &PreparedFeature) -> BrokenFeature {
        let mut pieces = Vec::new();
        let mut markers = Vec::new();
        let multipart = feature.is_multipart();

        for (p, part) in feature.parts.iter().enumerate() {
            let breaks = self.break_indices(f, p, part);
            for &k in &breaks[1..breaks.len() - 1] {
                markers.push((MarkerKind::Broken, part[k]));
            }
            for w in breaks.windows(2) {
                pieces.push(InputFeature::new(
                    feature.id.clone(),
                    FeatureGeometry::LineString(part[w[0]..=w[1]].to_vec()),
                    feature.attributes.clone(),
                ));
            }
            if multipart {
                markers.push((MarkerKind::Multipart, part[0]));
                markers.push((MarkerKind::Multipart, part[part.len() - 1]));
            }
        }
        if pieces.len() > feature.parts.len() {
            debug!("feature {} broken into {} pieces", feature.id, pieces.len());
        }
        BrokenFeature { pieces, markers }
    }

    /// Sorted vertex indices the part is cut at, always including both ends.
    fn break_indices(&self, f: usize, p: usize, part: &[Coord]) -> Vec<usize> {
        let last = part.len() - 1;

        let mut own: AHashMap<CoordKey, usize> = AHashMap::new();
        for c in part {
            *own.entry(coord_key(*c)).or_insert(0) += 1;
        }

        let mut shared: AHashSet<CoordKey> = AHashSet::new();
        for (cf, cp) in self.index.intersecting(&geometry::bbox(part)) {
            if (cf, cp) == (f, p) {
                continue;
            }
            shared.extend(self.features[cf].parts[cp].iter().map(|c| coord_key(*c)));
        }

        let mut breaks = vec![0];
        for (k, c) in part.iter().enumerate().take(last).skip(1) {
            let key = coord_key(*c);
            let repeated = own.get(&key).is_some_and(|count| *count > 1);
            if repeated || shared.contains(&key) {
                breaks.push(k);
            }
        }
        breaks.push(last);
        breaks
    }
}

fn stroke_index(features: &[PreparedFeature]) -> BboxIndex<(usize, usize)> {
    BboxIndex::bulk_load(features.iter().enumerate().flat_map(|(f, feature)| {
        feature
            .parts
            .iter()
            .enumerate()
            .map(move |(p, part)| ((f, p), geometry::bbox(part)))
    }))
}
