// ===========================================================================
// Degree-2 chain merging
// ===========================================================================
//
// A pass-through node is a vertex some line merely continues through: two
// different incident edges. Both merges walk from every other node across
// runs of pass-through nodes and replace each run by a single edge:
//
//   a --e1-- p --e2-- q --e3-- b   =>   a --------e4-------- b
//
// The set of pass-through nodes is fixed when the pass starts. Merging never
// changes the degree of a chain's terminal nodes, so the snapshot stays
// truthful while the pass rewrites the graph.
//
// Rings made only of pass-through nodes have no terminal to start from. They
// are handled afterwards and collapse into a self-loop on the ring's lowest
// node id.
// ===========================================================================

use crate::error::{CleanError, CleanResult};
use crate::feature::{Attributes, FeatureId};
use crate::geometry::{self, COORD_EPSILON};
use crate::graph_types::{EdgeId, Graph, MarkerKind, NodeId};
use crate::progress::ProgressReporter;
use ahash::AHashSet;
use geo::Coord;
use log::{debug, info};
use ordered_float::OrderedFloat;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergeStats {
    /// Chains replaced by a single edge, rings included.
    pub chains: usize,
    pub rings: usize,
    pub edges_consumed: usize,
    pub nodes_removed: usize,
}

/// Collapse every chain of pass-through nodes.
pub fn merge_b_intersections(
    graph: &mut Graph,
    progress: &mut ProgressReporter,
) -> CleanResult<MergeStats> {
    let pass_through: AHashSet<NodeId> = graph
        .nodes
        .values()
        .filter(|n| n.is_pass_through())
        .map(|n| n.id)
        .collect();
    let stats = merge_chains(graph, &pass_through, 0.0, progress)?;
    info!(
        "merged {} chains ({} rings) out of {} edges at intersections",
        stats.chains, stats.rings, stats.edges_consumed
    );
    Ok(stats)
}

/// Collapse chains only through nodes where the line runs within
/// `collinear_threshold` degrees of straight, then simplify each merged
/// geometry with `angle_threshold`.
pub fn merge_collinear(
    graph: &mut Graph,
    collinear_threshold: f64,
    angle_threshold: f64,
    progress: &mut ProgressReporter,
) -> CleanResult<MergeStats> {
    let mut pass_through: AHashSet<NodeId> = AHashSet::new();
    for node in graph.nodes.values() {
        if !node.is_pass_through() {
            continue;
        }
        let prev = graph.node(node.topology[0])?.point;
        let next = graph.node(node.topology[1])?.point;
        let angle = geometry::turning_angle(prev, node.point, next);
        if (180.0 - angle).abs() <= collinear_threshold {
            pass_through.insert(node.id);
        }
    }
    let stats = merge_chains(graph, &pass_through, angle_threshold, progress)?;
    info!(
        "merged {} collinear chains ({} rings) out of {} edges",
        stats.chains, stats.rings, stats.edges_consumed
    );
    Ok(stats)
}

/// One run between two terminals. `edges` holds each edge together with the
/// node the walk entered it from.
struct Chain {
    start: NodeId,
    end: NodeId,
    edges: Vec<(EdgeId, NodeId)>,
    inner: Vec<NodeId>,
}

fn merge_chains(
    graph: &mut Graph,
    pass_through: &AHashSet<NodeId>,
    simplify_tolerance: f64,
    progress: &mut ProgressReporter,
) -> CleanResult<MergeStats> {
    let mut stats = MergeStats::default();
    let mut visited: AHashSet<EdgeId> = AHashSet::new();
    let node_ids = graph.node_ids();
    let total = node_ids.len() * 2;

    for (i, start) in node_ids.iter().enumerate() {
        progress.step(i, total)?;
        if pass_through.contains(start) || !graph.nodes.contains_key(start) {
            continue;
        }
        for first in graph.node(*start)?.adj_edges.clone() {
            if visited.contains(&first) {
                continue;
            }
            let chain = walk(graph, pass_through, *start, first)?;
            visited.extend(chain.edges.iter().map(|(e, _)| *e));
            if chain.edges.len() > 1 {
                let merged = replace_chain(graph, &chain, simplify_tolerance)?;
                // the new edge must not be walked again from the far terminal
                visited.insert(merged);
                stats.record(&chain);
            }
        }
    }

    // What is left unvisited on a pass-through node belongs to a ring with
    // no terminal at all. Visiting in id order makes the anchor the ring's
    // lowest id.
    for (i, anchor) in node_ids.iter().enumerate() {
        progress.step(node_ids.len() + i, total)?;
        if !pass_through.contains(anchor) {
            continue;
        }
        let Some(node) = graph.nodes.get(anchor) else {
            continue;
        };
        let Some(first) = node.adj_edges.iter().copied().find(|e| !visited.contains(e)) else {
            continue;
        };
        let chain = walk(graph, pass_through, *anchor, first)?;
        visited.extend(chain.edges.iter().map(|(e, _)| *e));
        if chain.start != chain.end {
            return Err(CleanError::invariant(
                "merge",
                format!("ring walk from {} ended at {}", anchor, chain.end),
            ));
        }
        let merged = replace_chain(graph, &chain, simplify_tolerance)?;
        visited.insert(merged);
        debug!("closed ring of {} edges anchored at {}", chain.edges.len(), anchor);
        stats.record(&chain);
        stats.rings += 1;
    }
    Ok(stats)
}

impl MergeStats {
    fn record(&mut self, chain: &Chain) {
        self.chains += 1;
        self.edges_consumed += chain.edges.len();
        self.nodes_removed += chain.inner.len();
    }
}

/// Follow `first` away from `start` across pass-through nodes until a
/// terminal, or `start` itself, is reached.
fn walk(
    graph: &Graph,
    pass_through: &AHashSet<NodeId>,
    start: NodeId,
    first: EdgeId,
) -> CleanResult<Chain> {
    let mut edges = Vec::new();
    let mut inner = Vec::new();
    let mut from = start;
    let mut current = first;
    let limit = graph.num_edges();

    loop {
        edges.push((current, from));
        let next = graph.edge(current)?.other_node(from);
        if next == start || !pass_through.contains(&next) {
            return Ok(Chain {
                start,
                end: next,
                edges,
                inner,
            });
        }
        if edges.len() > limit {
            return Err(CleanError::invariant(
                "merge",
                format!("walk from {} did not terminate", start),
            ));
        }
        let node = graph.node(next)?;
        let &[a, b] = node.adj_edges.as_slice() else {
            return Err(CleanError::invariant(
                "merge",
                format!("pass-through {} has degree {}", next, node.degree()),
            ));
        };
        current = if a == current { b } else { a };
        inner.push(next);
        from = next;
    }
}

/// Swap the chain's edges and inner nodes for one edge between its
/// terminals. Returns the new edge id.
fn replace_chain(graph: &mut Graph, chain: &Chain, simplify_tolerance: f64) -> CleanResult<EdgeId> {
    let mut coords: Vec<Coord> = Vec::new();
    let mut detached: Vec<Vec<Coord>> = Vec::new();
    let mut longest: Option<(OrderedFloat<f64>, EdgeId)> = None;
    for (edge_id, from) in &chain.edges {
        let edge = graph.edge(*edge_id)?;
        let piece = edge.geometry_from(*from);
        let skip = usize::from(!coords.is_empty());
        coords.extend_from_slice(&piece[skip..]);
        detached.extend(edge.detached_parts.iter().cloned());

        // longest wins, lowest id on a tie
        let key = (OrderedFloat(edge.length()), *edge_id);
        longest = match longest {
            Some((len, id)) if len > key.0 || (len == key.0 && id < key.1) => Some((len, id)),
            _ => Some(key),
        };
    }
    let Some((_, template)) = longest else {
        return Err(CleanError::invariant("merge", "empty chain"));
    };
    let (attributes, source): (Attributes, FeatureId) = {
        let edge = graph.edge(template)?;
        (edge.attributes.clone(), edge.source.clone())
    };

    if chain.start == chain.end {
        let anchor = graph.node(chain.start)?.point;
        coords = geometry::thread_from_anchor(&coords, anchor, COORD_EPSILON);
    }
    let coords = geometry::simplify_polyline(&coords, simplify_tolerance);

    for (edge_id, _) in &chain.edges {
        graph.remove_edge(*edge_id)?;
    }
    for node_id in &chain.inner {
        let point = graph.node(*node_id)?.point;
        graph.record_error(MarkerKind::Merged, point);
        graph.remove_node(*node_id)?;
    }
    graph.add_edge(coords, attributes, source, chain.start, chain.end, detached)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::coord;
    use crate::validation::check_invariants;
    use serde_json::json;

    fn edge(g: &mut Graph, points: &[(f64, f64)], name: &str) -> EdgeId {
        let coords: Vec<Coord> = points.iter().map(|&(x, y)| coord(x, y)).collect();
        let a = g.load_point(coords[0]);
        let b = g.load_point(coords[coords.len() - 1]);
        let mut attrs = Attributes::new();
        attrs.insert("name".to_string(), json!(name));
        g.add_edge(coords, attrs, FeatureId::from(name), a, b, Vec::new())
            .unwrap()
    }

    #[test]
    fn test_chain_between_junctions_becomes_one_edge() {
        let mut g = Graph::new();
        // a T at each end, a three-edge chain in between
        edge(&mut g, &[(0.0, 0.0), (0.0, 5.0)], "stub_a1");
        edge(&mut g, &[(0.0, 0.0), (0.0, -5.0)], "stub_a2");
        edge(&mut g, &[(0.0, 0.0), (1.0, 0.0)], "short");
        edge(&mut g, &[(1.0, 0.0), (2.0, 1.0), (3.0, 0.0)], "long");
        edge(&mut g, &[(6.0, 0.0), (3.0, 0.0)], "reversed");
        edge(&mut g, &[(6.0, 0.0), (6.0, 5.0)], "stub_b1");
        edge(&mut g, &[(6.0, 0.0), (6.0, -5.0)], "stub_b2");

        let mut p = ProgressReporter::silent();
        let stats = merge_b_intersections(&mut g, &mut p).unwrap();
        assert_eq!(stats.chains, 1);
        assert_eq!(stats.edges_consumed, 3);
        assert_eq!(g.num_edges(), 5);
        check_invariants(&g, "merge").unwrap();

        let merged = g.edges.values().last().unwrap();
        assert_eq!(
            merged.geometry,
            vec![coord(0.0, 0.0), coord(1.0, 0.0), coord(2.0, 1.0), coord(3.0, 0.0), coord(6.0, 0.0)]
        );
        assert_eq!(merged.source, FeatureId::from("reversed"));
        assert_eq!(merged.attributes["name"], json!("reversed"));
        assert_eq!(g.errors.len(), 2);
        assert!(g.errors.iter().all(|m| m.kind == MarkerKind::Merged));
    }

    #[test]
    fn test_single_line_unchanged() {
        let mut g = Graph::new();
        let e = edge(&mut g, &[(0.0, 0.0), (1.0, 1.0)], "only");
        let mut p = ProgressReporter::silent();
        let stats = merge_b_intersections(&mut g, &mut p).unwrap();
        assert_eq!(stats, MergeStats::default());
        assert_eq!(g.edge_ids(), vec![e]);
    }

    #[test]
    fn test_triangle_ring_anchors_on_lowest_node() {
        let mut g = Graph::new();
        edge(&mut g, &[(0.0, 0.0), (4.0, 0.0)], "a");
        edge(&mut g, &[(4.0, 0.0), (2.0, 3.0)], "b");
        edge(&mut g, &[(2.0, 3.0), (0.0, 0.0)], "c");
        let anchor = g.load_point(coord(0.0, 0.0));

        let mut p = ProgressReporter::silent();
        let stats = merge_b_intersections(&mut g, &mut p).unwrap();
        assert_eq!(stats.rings, 1);
        assert_eq!(g.num_edges(), 1);
        assert_eq!(g.num_nodes(), 1);
        let ring = g.edges.values().next().unwrap();
        assert_eq!(ring.nodes, (anchor, anchor));
        assert_eq!(ring.geometry.len(), 4);
        assert_eq!(ring.geometry[0], coord(0.0, 0.0));
        check_invariants(&g, "ring").unwrap();

        let again = merge_b_intersections(&mut g, &mut p).unwrap();
        assert_eq!(again, MergeStats::default());
    }

    #[test]
    fn test_lollipop_closes_on_its_terminal() {
        let mut g = Graph::new();
        edge(&mut g, &[(0.0, 0.0), (-5.0, 0.0)], "stem");
        edge(&mut g, &[(0.0, 0.0), (1.0, 1.0)], "a");
        edge(&mut g, &[(1.0, 1.0), (2.0, 0.0)], "b");
        edge(&mut g, &[(2.0, 0.0), (0.0, 0.0)], "c");
        let knot = g.load_point(coord(0.0, 0.0));

        let mut p = ProgressReporter::silent();
        let stats = merge_b_intersections(&mut g, &mut p).unwrap();
        assert_eq!(stats.chains, 1);
        assert_eq!(stats.rings, 0);
        assert_eq!(stats.edges_consumed, 3);
        assert_eq!(g.num_edges(), 2);
        assert_eq!(g.num_nodes(), 2);
        check_invariants(&g, "lollipop").unwrap();

        let ring = g.edges.values().last().unwrap();
        assert_eq!(ring.nodes, (knot, knot));
        assert_eq!(
            ring.geometry,
            vec![coord(0.0, 0.0), coord(1.0, 1.0), coord(2.0, 0.0), coord(0.0, 0.0)]
        );
        assert_eq!(g.degree(knot).unwrap(), 3);
        assert_eq!(g.errors.iter().filter(|m| m.kind == MarkerKind::Merged).count(), 2);

        let again = merge_b_intersections(&mut g, &mut p).unwrap();
        assert_eq!(again, MergeStats::default());
    }

    #[test]
    fn test_collinear_stops_at_corners() {
        let mut g = Graph::new();
        // straight through (1,0), right angle at (2,0)
        edge(&mut g, &[(0.0, 0.0), (1.0, 0.0)], "a");
        edge(&mut g, &[(1.0, 0.0), (2.0, 0.0)], "b");
        edge(&mut g, &[(2.0, 0.0), (2.0, 1.0)], "c");
        let mut p = ProgressReporter::silent();
        let stats = merge_collinear(&mut g, 10.0, 0.0, &mut p).unwrap();
        assert_eq!(stats.chains, 1);
        assert_eq!(g.num_edges(), 2);
        assert_eq!(g.num_nodes(), 3);
        check_invariants(&g, "collinear").unwrap();
    }

    #[test]
    fn test_collinear_simplifies_merged_geometry() {
        let mut g = Graph::new();
        edge(&mut g, &[(0.0, 0.0), (1.0, 0.01), (2.0, 0.0)], "a");
        edge(&mut g, &[(2.0, 0.0), (4.0, 0.0)], "b");
        let mut p = ProgressReporter::silent();
        merge_collinear(&mut g, 10.0, 0.1, &mut p).unwrap();
        let merged = g.edges.values().next().unwrap();
        assert_eq!(merged.geometry, vec![coord(0.0, 0.0), coord(4.0, 0.0)]);
    }
}
