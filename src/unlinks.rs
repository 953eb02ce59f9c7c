// ===========================================================================
// Unlinks
// ===========================================================================
//
// An unlink is a place where two lines cross without meeting: a bridge or a
// tunnel. Fix-unlinks nudges a vertex that sits exactly on such a crossing
// so the two lines no longer share that coordinate. In the break pipeline it
// has to run on the loose strokes, before breaking turns the shared vertex
// into a node. The generator reports every crossing that is not a shared
// node.
//
// Each vertex moves at most once, so an index built before nudging still
// finds every candidate when its query box is grown by the nudge.
// ===========================================================================

use crate::error::CleanResult;
use crate::geometry::{self, Envelope};
use crate::graph_types::{EdgeId, Graph};
use crate::loader::PseudoGraph;
use crate::progress::ProgressReporter;
use crate::spatial_index::EdgeIndex;
use geo::Coord;
use log::{debug, info};

/// Move every interior vertex that lies exactly on a crossing with another
/// edge by `nudge` on both axes. Returns the number of vertices moved.
pub fn fix_unlinks(graph: &mut Graph, nudge: f64, progress: &mut ProgressReporter) -> CleanResult<usize> {
    let index = EdgeIndex::from_graph(graph);
    let ids = graph.edge_ids();
    let total = ids.len();
    let mut moved = 0;

    for (i, id) in ids.iter().enumerate() {
        progress.step(i, total)?;
        let crossings = crossings_with_candidates(graph, &index, *id, nudge.abs(), |_| true)?;
        if crossings.is_empty() {
            continue;
        }
        moved += nudge_interior(&mut graph.edge_mut(*id)?.geometry, &crossings, nudge);
    }
    if moved > 0 {
        info!("nudged {} vertices off grade-separated crossings", moved);
    }
    Ok(moved)
}

impl PseudoGraph {
    /// Fix-unlinks over the loose strokes of the break pipeline. Must run
    /// before `break_features_iter`, which would otherwise cut both strokes
    /// at the shared vertex.
    pub fn fix_unlinks(&mut self, nudge: f64, progress: &mut ProgressReporter) -> CleanResult<usize> {
        let keys = self.stroke_keys();
        let total = keys.len();
        let mut moved = 0;

        for (i, &(f, p)) in keys.iter().enumerate() {
            progress.step(i, total)?;
            let stroke = &self.features[f].parts[p];
            let mut crossings = Vec::new();
            for (cf, cp) in self.index.intersecting(&grown(geometry::bbox(stroke), nudge.abs())) {
                if (cf, cp) == (f, p) {
                    continue;
                }
                crossings.extend(geometry::crossing_points(stroke, &self.features[cf].parts[cp]));
            }
            if crossings.is_empty() {
                continue;
            }
            moved += nudge_interior(&mut self.features[f].parts[p], &crossings, nudge);
        }
        if moved > 0 {
            self.reindex();
            info!("nudged {} stroke vertices off grade-separated crossings", moved);
        }
        Ok(moved)
    }
}

/// Move the interior vertices of `coords` found in `crossings`. Endpoints
/// stay put.
fn nudge_interior(coords: &mut [Coord], crossings: &[Coord], nudge: f64) -> usize {
    if coords.len() < 3 {
        return 0;
    }
    let last = coords.len() - 1;
    let mut moved = 0;
    for vertex in coords[1..last].iter_mut() {
        if crossings.contains(vertex) {
            vertex.x += nudge;
            vertex.y += nudge;
            moved += 1;
        }
    }
    moved
}

fn grown((min, max): Envelope, by: f64) -> Envelope {
    ([min[0] - by, min[1] - by], [max[0] + by, max[1] + by])
}

/// Record an unlink marker at every crossing between two edges that is not
/// a vertex of the higher-id edge. Returns the number of markers added.
pub fn generate_unlinks(graph: &mut Graph, progress: &mut ProgressReporter) -> CleanResult<usize> {
    let index = EdgeIndex::from_graph(graph);
    let ids = graph.edge_ids();
    let total = ids.len();
    let before = graph.unlinks.len();

    for (i, id) in ids.iter().enumerate() {
        progress.step(i, total)?;
        let crossings = crossings_with_candidates(graph, &index, *id, 0.0, |other| other < *id)?;
        let geometry = &graph.edge(*id)?.geometry;
        let points: Vec<Coord> = crossings
            .into_iter()
            .filter(|p| !geometry.contains(p))
            .collect();
        for point in points {
            debug!("unlink on {} at ({}, {})", id, point.x, point.y);
            graph.record_unlink(point);
        }
    }
    let found = graph.unlinks.len() - before;
    info!("found {} unlinks", found);
    Ok(found)
}

/// Crossing points between `id` and every indexed candidate accepted by
/// `keep`, read from the graph's current geometry. `slack` grows the query
/// box to cover vertices moved since the index was built.
fn crossings_with_candidates(
    graph: &Graph,
    index: &EdgeIndex,
    id: EdgeId,
    slack: f64,
    keep: impl Fn(EdgeId) -> bool,
) -> CleanResult<Vec<Coord>> {
    let geometry = &graph.edge(id)?.geometry;
    let mut points = Vec::new();
    for other in index.intersecting(&grown(geometry::bbox(geometry), slack)) {
        if other == id || !keep(other) {
            continue;
        }
        // candidates removed since the index was built are simply gone
        let Some(other_edge) = graph.edges.get(&other) else {
            continue;
        };
        points.extend(geometry::crossing_points(geometry, &other_edge.geometry));
    }
    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::{Attributes, FeatureGeometry, FeatureId, InputFeature};
    use crate::geometry::coord;
    use crate::graph_types::MarkerKind;
    use crate::loader::BrokenFeature;

    fn edge(g: &mut Graph, points: &[(f64, f64)]) -> EdgeId {
        let coords: Vec<Coord> = points.iter().map(|&(x, y)| coord(x, y)).collect();
        let a = g.load_point(coords[0]);
        let b = g.load_point(coords[coords.len() - 1]);
        g.add_edge(coords, Attributes::new(), FeatureId::from("t"), a, b, Vec::new())
            .unwrap()
    }

    #[test]
    fn test_crossing_yields_one_unlink() {
        let mut g = Graph::new();
        edge(&mut g, &[(0.0, 0.0), (10.0, 10.0)]);
        edge(&mut g, &[(0.0, 10.0), (10.0, 0.0)]);
        let mut p = ProgressReporter::silent();
        assert_eq!(generate_unlinks(&mut g, &mut p).unwrap(), 1);
        assert_eq!(g.unlinks[0].kind, MarkerKind::Unlink);
        assert!(geometry::coords_eq(g.unlinks[0].point, coord(5.0, 5.0), 1e-9));
    }

    #[test]
    fn test_lines_meeting_at_a_node_are_not_unlinks() {
        let mut g = Graph::new();
        edge(&mut g, &[(0.0, 0.0), (5.0, 5.0)]);
        edge(&mut g, &[(5.0, 5.0), (10.0, 0.0)]);
        let mut p = ProgressReporter::silent();
        assert_eq!(generate_unlinks(&mut g, &mut p).unwrap(), 0);
    }

    #[test]
    fn test_double_crossing_yields_two_unlinks() {
        let mut g = Graph::new();
        edge(&mut g, &[(0.0, 5.0), (20.0, 5.0)]);
        edge(&mut g, &[(5.0, 0.0), (5.0, 10.0), (15.0, 10.0), (15.0, 0.0)]);
        let mut p = ProgressReporter::silent();
        assert_eq!(generate_unlinks(&mut g, &mut p).unwrap(), 2);
        assert_eq!(g.unlinks[1].id, 1);
    }

    #[test]
    fn test_stroke_fix_unlinks_runs_before_breaking() {
        let mut g = Graph::new();
        let mut p = ProgressReporter::silent();
        let mut pseudo = g
            .load_edges_w_o_topology(
                vec![
                    InputFeature::line("h", vec![coord(0.0, 5.0), coord(5.0, 5.0), coord(10.0, 5.0)]),
                    InputFeature::line("v", vec![coord(5.0, 0.0), coord(5.0, 5.0), coord(5.0, 10.0)]),
                ],
                &mut p,
            )
            .unwrap();
        assert_eq!(pseudo.fix_unlinks(1.0, &mut p).unwrap(), 1);

        let broken: Vec<BrokenFeature> = pseudo.break_features_iter().collect();
        assert!(broken.iter().all(|b| b.pieces.len() == 1 && b.markers.is_empty()));
        assert_eq!(
            broken[0].pieces[0].geometry,
            FeatureGeometry::LineString(vec![coord(0.0, 5.0), coord(6.0, 6.0), coord(10.0, 5.0)])
        );
        assert_eq!(
            broken[1].pieces[0].geometry,
            FeatureGeometry::LineString(vec![coord(5.0, 0.0), coord(5.0, 5.0), coord(5.0, 10.0)])
        );
    }

    #[test]
    fn test_stroke_fix_unlinks_ignores_shared_endpoints() {
        let mut g = Graph::new();
        let mut p = ProgressReporter::silent();
        let mut pseudo = g
            .load_edges_w_o_topology(
                vec![
                    InputFeature::line("a", vec![coord(0.0, 0.0), coord(5.0, 5.0)]),
                    InputFeature::line("b", vec![coord(5.0, 5.0), coord(10.0, 0.0)]),
                ],
                &mut p,
            )
            .unwrap();
        assert_eq!(pseudo.fix_unlinks(1.0, &mut p).unwrap(), 0);
    }

    #[test]
    fn test_fix_unlinks_moves_only_the_shared_interior_vertex() {
        let mut g = Graph::new();
        let a = edge(&mut g, &[(0.0, 5.0), (5.0, 5.0), (10.0, 5.0)]);
        let b = edge(&mut g, &[(5.0, 0.0), (5.0, 5.0), (5.0, 10.0)]);
        let mut p = ProgressReporter::silent();
        assert_eq!(fix_unlinks(&mut g, 1.0, &mut p).unwrap(), 1);

        let ga = &g.edge(a).unwrap().geometry;
        assert_eq!(ga, &vec![coord(0.0, 5.0), coord(6.0, 6.0), coord(10.0, 5.0)]);
        let gb = &g.edge(b).unwrap().geometry;
        assert_eq!(gb, &vec![coord(5.0, 0.0), coord(5.0, 5.0), coord(5.0, 10.0)]);
    }
}
