// ===========================================================================
// Endpoint snapping
// ===========================================================================
//
// Nodes that are not pass-through vertices and lie within the snap
// threshold of each other are clustered transitively (connected components
// over the "within d" relation) and each cluster collapses onto a new node
// at its centroid. Edges are rewired onto the new node; those that shrink
// to nothing in the process are dropped.
// ===========================================================================

use crate::error::CleanResult;
use crate::geometry;
use crate::graph_types::{EdgeId, Graph, MarkerKind, NodeId};
use crate::progress::ProgressReporter;
use crate::spatial_index::NodeIndex;
use ahash::{AHashMap, AHashSet};
use geo::Coord;
use log::{debug, info};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SnapStats {
    pub clusters: usize,
    pub nodes_snapped: usize,
    pub edges_removed: usize,
}

pub fn snap_endpoints(
    graph: &mut Graph,
    threshold: f64,
    progress: &mut ProgressReporter,
) -> CleanResult<SnapStats> {
    let clusters = find_clusters(graph, threshold, progress)?;
    let mut stats = SnapStats::default();
    let total = clusters.len();
    for (i, cluster) in clusters.iter().enumerate() {
        progress.step(i, total)?;
        stats.edges_removed += collapse_cluster(graph, cluster, threshold)?;
        stats.clusters += 1;
        stats.nodes_snapped += cluster.len();
    }
    if stats.clusters > 0 {
        info!(
            "snapped {} nodes into {} clusters, dropped {} collapsed edges",
            stats.nodes_snapped, stats.clusters, stats.edges_removed
        );
    }
    Ok(stats)
}

/// Clusters of two or more snappable nodes, each sorted, in order of their
/// lowest node id.
fn find_clusters(
    graph: &Graph,
    threshold: f64,
    progress: &mut ProgressReporter,
) -> CleanResult<Vec<Vec<NodeId>>> {
    let index = NodeIndex::from_graph(graph);
    let snappable: Vec<NodeId> = graph
        .nodes
        .values()
        .filter(|n| n.degree() != 2)
        .map(|n| n.id)
        .collect();
    let eligible: AHashSet<NodeId> = snappable.iter().copied().collect();

    let mut adj: AHashMap<NodeId, Vec<NodeId>> = AHashMap::new();
    let total = snappable.len();
    for (i, id) in snappable.iter().enumerate() {
        progress.step(i, total)?;
        let point = graph.node(*id)?.point;
        for other in index.within_distance(point, threshold) {
            if other <= *id || !eligible.contains(&other) {
                continue;
            }
            adj.entry(*id).or_default().push(other);
            adj.entry(other).or_default().push(*id);
        }
    }

    let mut visited: AHashSet<NodeId> = AHashSet::new();
    let mut clusters = Vec::new();
    for seed in &snappable {
        if visited.contains(seed) || !adj.contains_key(seed) {
            continue;
        }
        let mut members = Vec::new();
        let mut queue: VecDeque<NodeId> = VecDeque::new();
        queue.push_back(*seed);
        visited.insert(*seed);
        while let Some(curr) = queue.pop_front() {
            members.push(curr);
            if let Some(neighbours) = adj.get(&curr) {
                for n in neighbours {
                    if visited.insert(*n) {
                        queue.push_back(*n);
                    }
                }
            }
        }
        members.sort();
        clusters.push(members);
    }
    Ok(clusters)
}

/// Replace `cluster` by one node at its centroid. Returns how many edges
/// were dropped because they collapsed.
fn collapse_cluster(graph: &mut Graph, cluster: &[NodeId], threshold: f64) -> CleanResult<usize> {
    let mut points = Vec::with_capacity(cluster.len());
    for id in cluster {
        points.push(graph.node(*id)?.point);
    }
    let centre = geometry::centroid(&points);
    let merged = graph.add_node(centre);
    let members: AHashSet<NodeId> = cluster.iter().copied().collect();

    let mut touching: Vec<EdgeId> = Vec::new();
    for id in cluster {
        touching.extend(graph.node(*id)?.adj_edges.iter().copied());
    }
    touching.sort();
    touching.dedup();

    let mut removed = 0;
    for edge_id in touching {
        let edge = graph.edge(edge_id)?;
        let (start, end) = edge.nodes;
        let start_in = members.contains(&start);
        let end_in = members.contains(&end);

        if start_in && end_in {
            let collapsed = with_ends(&edge.geometry, centre, centre);
            let degenerate = if edge.is_self_loop() {
                geometry::polyline_length(&collapsed) <= threshold
            } else {
                collapsed.len() <= 3 || geometry::polyline_length(&collapsed) <= threshold
            };
            if degenerate {
                debug!("{} collapsed while snapping onto {}", edge_id, merged);
                graph.remove_edge(edge_id)?;
                removed += 1;
            } else {
                graph.rewire_edge(edge_id, merged, merged)?;
            }
        } else if start_in {
            graph.rewire_edge(edge_id, merged, end)?;
        } else {
            graph.rewire_edge(edge_id, start, merged)?;
        }
    }

    for (id, point) in cluster.iter().zip(points) {
        graph.record_error(MarkerKind::Snapped, point);
        graph.remove_node(*id)?;
    }
    Ok(removed)
}

fn with_ends(coords: &[Coord], first: Coord, last: Coord) -> Vec<Coord> {
    let mut out = coords.to_vec();
    if let Some(c) = out.first_mut() {
        *c = first;
    }
    if let Some(c) = out.last_mut() {
        *c = last;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::{Attributes, FeatureId};
    use crate::geometry::coord;
    use crate::validation::check_invariants;

    fn edge(g: &mut Graph, points: &[(f64, f64)]) -> EdgeId {
        let coords: Vec<Coord> = points.iter().map(|&(x, y)| coord(x, y)).collect();
        let a = g.load_point(coords[0]);
        let b = g.load_point(coords[coords.len() - 1]);
        g.add_edge(coords, Attributes::new(), FeatureId::from("t"), a, b, Vec::new())
            .unwrap()
    }

    #[test]
    fn test_near_endpoints_join_at_centroid() {
        let mut g = Graph::new();
        let a = edge(&mut g, &[(-10.0, 0.0), (0.0, 0.0)]);
        let b = edge(&mut g, &[(0.5, 0.0), (10.0, 0.0)]);
        let c = edge(&mut g, &[(0.25, 0.5), (0.25, 10.0)]);
        let mut p = ProgressReporter::silent();
        let stats = snap_endpoints(&mut g, 1.0, &mut p).unwrap();
        assert_eq!(stats.clusters, 1);
        assert_eq!(stats.nodes_snapped, 3);

        let centre = coord(0.25, 0.5 / 3.0);
        let shared = g.edge(a).unwrap().end();
        assert_eq!(g.edge(b).unwrap().start(), shared);
        assert_eq!(g.edge(c).unwrap().start(), shared);
        assert!(geometry::coords_eq(g.node(shared).unwrap().point, centre, 1e-12));
        assert_eq!(g.degree(shared).unwrap(), 3);
        assert_eq!(g.errors.iter().filter(|m| m.kind == MarkerKind::Snapped).count(), 3);
        check_invariants(&g, "snap").unwrap();
    }

    #[test]
    fn test_pass_through_nodes_do_not_snap() {
        let mut g = Graph::new();
        edge(&mut g, &[(0.0, 0.0), (5.0, 0.0)]);
        edge(&mut g, &[(5.0, 0.0), (10.0, 0.0)]);
        edge(&mut g, &[(5.2, 0.3), (5.2, 10.0)]);
        let mut p = ProgressReporter::silent();
        let stats = snap_endpoints(&mut g, 1.0, &mut p).unwrap();
        assert_eq!(stats.clusters, 0);
        assert_eq!(g.num_nodes(), 5);
    }

    #[test]
    fn test_short_edge_inside_cluster_is_dropped() {
        let mut g = Graph::new();
        edge(&mut g, &[(-10.0, 0.0), (0.0, 0.0)]);
        edge(&mut g, &[(0.0, 0.0), (0.0, -10.0)]);
        let tiny = edge(&mut g, &[(0.0, 0.0), (0.3, 0.0)]);
        edge(&mut g, &[(0.3, 0.0), (0.3, 10.0)]);
        edge(&mut g, &[(0.3, 0.0), (10.0, 0.0)]);
        let mut p = ProgressReporter::silent();
        let stats = snap_endpoints(&mut g, 0.5, &mut p).unwrap();
        assert_eq!(stats.edges_removed, 1);
        assert!(!g.edges.contains_key(&tiny));
        assert_eq!(g.num_edges(), 4);
        check_invariants(&g, "snap").unwrap();
    }

    #[test]
    fn test_self_loops_drop_when_short_and_survive_when_long() {
        let mut g = Graph::new();
        let small = edge(&mut g, &[(0.0, 0.0), (0.1, 0.1), (0.2, 0.0), (0.0, 0.0)]);
        let big = edge(&mut g, &[(0.0, 0.0), (0.0, 5.0), (5.0, 5.0), (0.0, 0.0)]);
        edge(&mut g, &[(0.0, 0.0), (-10.0, 0.0)]);
        edge(&mut g, &[(0.5, 0.0), (10.0, 0.0)]);
        let mut p = ProgressReporter::silent();
        let stats = snap_endpoints(&mut g, 1.0, &mut p).unwrap();
        assert_eq!(stats.clusters, 1);
        assert_eq!(stats.edges_removed, 1);
        assert!(!g.edges.contains_key(&small));

        let looped = g.edge(big).unwrap();
        assert!(looped.is_self_loop());
        let merged = looped.start();
        assert_eq!(looped.geometry[0], coord(0.25, 0.0));
        assert_eq!(looped.geometry[3], coord(0.25, 0.0));
        assert_eq!(g.degree(merged).unwrap(), 4);
        assert_eq!(g.num_edges(), 3);
        check_invariants(&g, "snap").unwrap();
    }

    #[test]
    fn test_long_edge_between_cluster_members_becomes_a_loop() {
        let mut g = Graph::new();
        edge(&mut g, &[(0.0, 0.0), (-10.0, 0.0)]);
        edge(&mut g, &[(0.0, 0.0), (0.0, -10.0)]);
        edge(&mut g, &[(0.5, 0.0), (10.0, 0.0)]);
        // three vertices only: dropped however long it is
        let short = edge(&mut g, &[(0.0, 0.0), (0.25, 3.0), (0.5, 0.0)]);
        let long = edge(&mut g, &[(0.0, 0.0), (0.0, 5.0), (5.0, 5.0), (0.5, 0.0)]);
        let mut p = ProgressReporter::silent();
        let stats = snap_endpoints(&mut g, 1.0, &mut p).unwrap();
        assert_eq!(stats.clusters, 1);
        assert_eq!(stats.edges_removed, 1);
        assert!(!g.edges.contains_key(&short));

        let looped = g.edge(long).unwrap();
        assert!(looped.is_self_loop());
        assert_eq!(looped.geometry.len(), 4);
        assert_eq!(looped.geometry[0], coord(0.25, 0.0));
        assert_eq!(g.num_edges(), 4);
        check_invariants(&g, "snap").unwrap();
    }

    #[test]
    fn test_chaining_is_transitive() {
        let mut g = Graph::new();
        edge(&mut g, &[(0.0, 0.0), (-10.0, -10.0)]);
        edge(&mut g, &[(0.8, 0.0), (0.8, -10.0)]);
        edge(&mut g, &[(1.6, 0.0), (10.0, -10.0)]);
        let mut p = ProgressReporter::silent();
        let stats = snap_endpoints(&mut g, 1.0, &mut p).unwrap();
        // 0.0 and 1.6 are too far apart but both reach 0.8
        assert_eq!(stats.clusters, 1);
        assert_eq!(stats.nodes_snapped, 3);
    }
}
