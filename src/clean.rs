// ===========================================================================
// Cleaning passes
// ===========================================================================
//
// Duplicate, orphan and closed-polyline removal plus the multipart split.
// Each sub-pass only ever deletes or replaces edges, so running it twice
// changes nothing the second time.
// ===========================================================================

use crate::error::CleanResult;
use crate::graph_types::{EdgeId, Graph, MarkerKind, NodeId};
use crate::progress::ProgressReporter;
use itertools::Itertools;
use log::{debug, info};
use ordered_float::OrderedFloat;

/// Which sub-passes a `clean` call runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CleanPasses {
    pub duplicates: bool,
    pub orphans: bool,
    pub closed_polylines: bool,
    pub multiparts: bool,
}

/// Removal counts of one `clean` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CleanStats {
    pub duplicates: usize,
    pub orphans: usize,
    pub closed_polylines: usize,
    pub multiparts: usize,
}

impl std::ops::AddAssign for CleanStats {
    fn add_assign(&mut self, rhs: Self) {
        self.duplicates += rhs.duplicates;
        self.orphans += rhs.orphans;
        self.closed_polylines += rhs.closed_polylines;
        self.multiparts += rhs.multiparts;
    }
}

/// Run the selected sub-passes in a fixed order, the multipart split last.
pub fn clean(
    graph: &mut Graph,
    passes: CleanPasses,
    progress: &mut ProgressReporter,
) -> CleanResult<CleanStats> {
    let mut stats = CleanStats::default();
    if passes.duplicates {
        stats.duplicates = remove_duplicates(graph, progress)?;
    }
    if passes.orphans {
        stats.orphans = remove_orphans(graph, progress)?;
    }
    if passes.closed_polylines {
        stats.closed_polylines = remove_closed_polylines(graph, progress)?;
    }
    if passes.multiparts {
        stats.multiparts = split_multiparts(graph, progress)?;
    }
    Ok(stats)
}

fn node_pair(a: NodeId, b: NodeId) -> (NodeId, NodeId) {
    if a <= b { (a, b) } else { (b, a) }
}

/// Among edges joining the same two nodes keep the shortest (lowest id on a
/// tie). Returns the number of edges removed.
pub fn remove_duplicates(graph: &mut Graph, progress: &mut ProgressReporter) -> CleanResult<usize> {
    let groups: Vec<((NodeId, NodeId), Vec<EdgeId>)> = graph
        .edges
        .values()
        .map(|e| (node_pair(e.start(), e.end()), e.id))
        .into_group_map()
        .into_iter()
        .filter(|(_, ids)| ids.len() > 1)
        .sorted()
        .collect();

    let total = groups.len();
    let mut removed = 0;
    for (i, ((a, b), ids)) in groups.into_iter().enumerate() {
        progress.step(i, total)?;
        let mut ranked = Vec::with_capacity(ids.len());
        for id in ids {
            ranked.push((OrderedFloat(graph.edge(id)?.length()), id));
        }
        ranked.sort();
        for (_, id) in ranked.iter().skip(1) {
            graph.remove_edge(*id)?;
            removed += 1;
        }
        debug!("kept {} out of {} edges between {} and {}", ranked[0].1, ranked.len(), a, b);

        let (a_pt, b_pt) = (graph.node(a)?.point, graph.node(b)?.point);
        graph.record_error(MarkerKind::Duplicate, a_pt);
        if a != b {
            graph.record_error(MarkerKind::Duplicate, b_pt);
        }
    }
    if removed > 0 {
        info!("removed {} duplicate edges", removed);
    }
    Ok(removed)
}

/// The edge is the only thing touching either of its endpoints.
fn is_isolated(graph: &Graph, edge_id: EdgeId) -> CleanResult<bool> {
    let edge = graph.edge(edge_id)?;
    let start = graph.node(edge.start())?;
    let end = graph.node(edge.end())?;
    Ok(start.adj_edges.iter().all(|e| *e == edge_id) && end.adj_edges.iter().all(|e| *e == edge_id))
}

fn remove_with_nodes(graph: &mut Graph, edge_id: EdgeId, kind: MarkerKind) -> CleanResult<()> {
    let edge = graph.remove_edge(edge_id)?;
    let start_pt = graph.node(edge.start())?.point;
    graph.record_error(kind, start_pt);
    graph.remove_node(edge.start())?;
    if !edge.is_self_loop() {
        let end_pt = graph.node(edge.end())?.point;
        graph.record_error(kind, end_pt);
        graph.remove_node(edge.end())?;
    }
    Ok(())
}

/// Delete edges connected to nothing else, together with their nodes.
pub fn remove_orphans(graph: &mut Graph, progress: &mut ProgressReporter) -> CleanResult<usize> {
    let ids = graph.edge_ids();
    let total = ids.len();
    let mut removed = 0;
    for (i, id) in ids.into_iter().enumerate() {
        progress.step(i, total)?;
        if is_isolated(graph, id)? {
            remove_with_nodes(graph, id, MarkerKind::Orphan)?;
            removed += 1;
        }
    }
    if removed > 0 {
        info!("removed {} orphan edges", removed);
    }
    Ok(removed)
}

/// Delete closed rings that connect to nothing else.
pub fn remove_closed_polylines(
    graph: &mut Graph,
    progress: &mut ProgressReporter,
) -> CleanResult<usize> {
    let loops: Vec<EdgeId> = graph
        .edges
        .values()
        .filter(|e| e.is_self_loop())
        .map(|e| e.id)
        .collect();
    let total = loops.len();
    let mut removed = 0;
    for (i, id) in loops.into_iter().enumerate() {
        progress.step(i, total)?;
        if is_isolated(graph, id)? {
            remove_with_nodes(graph, id, MarkerKind::ClosedPolyline)?;
            removed += 1;
        }
    }
    if removed > 0 {
        info!("removed {} closed polylines", removed);
    }
    Ok(removed)
}

/// Replace every edge that still carries detached strokes by one edge per
/// stroke. The primary stroke stays on the original nodes; the others get
/// fresh nodes of their own. Returns the number of edges split.
pub fn split_multiparts(graph: &mut Graph, progress: &mut ProgressReporter) -> CleanResult<usize> {
    let multiparts: Vec<EdgeId> = graph
        .edges
        .values()
        .filter(|e| e.is_multipart())
        .map(|e| e.id)
        .collect();
    let total = multiparts.len();
    for (i, id) in multiparts.iter().enumerate() {
        progress.step(i, total)?;
        let edge = graph.remove_edge(*id)?;
        let (start, end) = edge.nodes;

        let mut created = vec![graph.add_edge(
            edge.geometry,
            edge.attributes.clone(),
            edge.source.clone(),
            start,
            end,
            Vec::new(),
        )?];
        for part in edge.detached_parts {
            let (Some(first), Some(last)) = (part.first().copied(), part.last().copied()) else {
                continue;
            };
            let part_start = graph.add_node(first);
            let part_end = if crate::geometry::is_closed(&part) {
                part_start
            } else {
                graph.add_node(last)
            };
            created.push(graph.add_edge(
                part,
                edge.attributes.clone(),
                edge.source.clone(),
                part_start,
                part_end,
                Vec::new(),
            )?);
        }

        for new_id in &created {
            let geometry = &graph.edge(*new_id)?.geometry;
            let (first, last) = (geometry[0], geometry[geometry.len() - 1]);
            graph.record_error(MarkerKind::Multipart, first);
            graph.record_error(MarkerKind::Multipart, last);
        }
        debug!("split multipart {} from {} into {} edges", id, edge.source, created.len());
    }
    if total > 0 {
        info!("split {} multipart edges", total);
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::{Attributes, FeatureId};
    use crate::geometry::coord;
    use crate::validation::check_invariants;
    use geo::Coord;

    fn edge(g: &mut Graph, points: &[(f64, f64)]) -> EdgeId {
        let coords: Vec<Coord> = points.iter().map(|&(x, y)| coord(x, y)).collect();
        let a = g.load_point(coords[0]);
        let b = g.load_point(coords[coords.len() - 1]);
        g.add_edge(coords, Attributes::new(), FeatureId::from("t"), a, b, Vec::new())
            .unwrap()
    }

    fn all() -> CleanPasses {
        CleanPasses {
            duplicates: true,
            orphans: true,
            closed_polylines: true,
            multiparts: true,
        }
    }

    #[test]
    fn test_duplicates_keep_shortest() {
        let mut g = Graph::new();
        let long = edge(&mut g, &[(0.0, 0.0), (5.0, 5.0), (10.0, 0.0)]);
        let short = edge(&mut g, &[(10.0, 0.0), (0.0, 0.0)]);
        let mut p = ProgressReporter::silent();
        assert_eq!(remove_duplicates(&mut g, &mut p).unwrap(), 1);
        assert!(g.edges.contains_key(&short));
        assert!(!g.edges.contains_key(&long));
        assert_eq!(g.errors.len(), 2);
        assert!(g.errors.iter().all(|m| m.kind == MarkerKind::Duplicate));
        check_invariants(&g, "duplicates").unwrap();
    }

    #[test]
    fn test_duplicates_tie_keeps_lowest_id() {
        let mut g = Graph::new();
        let first = edge(&mut g, &[(0.0, 0.0), (1.0, 0.0)]);
        edge(&mut g, &[(0.0, 0.0), (1.0, 0.0)]);
        let mut p = ProgressReporter::silent();
        remove_duplicates(&mut g, &mut p).unwrap();
        assert_eq!(g.edge_ids(), vec![first]);
    }

    #[test]
    fn test_orphan_removed_with_nodes() {
        let mut g = Graph::new();
        edge(&mut g, &[(0.0, 0.0), (1.0, 0.0)]);
        edge(&mut g, &[(1.0, 0.0), (2.0, 0.0)]);
        let lonely = edge(&mut g, &[(10.0, 10.0), (11.0, 10.0)]);
        let mut p = ProgressReporter::silent();
        assert_eq!(remove_orphans(&mut g, &mut p).unwrap(), 1);
        assert!(!g.edges.contains_key(&lonely));
        assert_eq!(g.num_nodes(), 3);
        assert_eq!(g.errors.len(), 2);
        check_invariants(&g, "orphans").unwrap();
    }

    #[test]
    fn test_closed_polyline_only_when_isolated() {
        let mut g = Graph::new();
        edge(&mut g, &[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 0.0)]);
        let attached = edge(&mut g, &[(5.0, 5.0), (6.0, 5.0), (6.0, 6.0), (5.0, 5.0)]);
        edge(&mut g, &[(5.0, 5.0), (5.0, 9.0)]);
        let mut p = ProgressReporter::silent();
        assert_eq!(remove_closed_polylines(&mut g, &mut p).unwrap(), 1);
        assert!(g.edges.contains_key(&attached));
        assert_eq!(g.errors[0].kind, MarkerKind::ClosedPolyline);
        check_invariants(&g, "closed").unwrap();
    }

    #[test]
    fn test_multipart_split_gives_one_edge_per_part() {
        let mut g = Graph::new();
        let a = g.load_point(coord(0.0, 0.0));
        let b = g.load_point(coord(1.0, 0.0));
        g.add_edge(
            vec![coord(0.0, 0.0), coord(1.0, 0.0)],
            Attributes::new(),
            FeatureId::from("m"),
            a,
            b,
            vec![vec![coord(5.0, 5.0), coord(6.0, 5.0)]],
        )
        .unwrap();
        let mut p = ProgressReporter::silent();
        assert_eq!(split_multiparts(&mut g, &mut p).unwrap(), 1);
        assert_eq!(g.num_edges(), 2);
        assert_eq!(g.num_nodes(), 4);
        assert!(g.edges.values().all(|e| !e.is_multipart()));
        assert_eq!(g.errors.len(), 4);
        check_invariants(&g, "multiparts").unwrap();
    }

    #[test]
    fn test_clean_is_idempotent() {
        let mut g = Graph::new();
        edge(&mut g, &[(0.0, 0.0), (1.0, 0.0)]);
        edge(&mut g, &[(0.0, 0.0), (0.5, 0.5), (1.0, 0.0)]);
        edge(&mut g, &[(1.0, 0.0), (2.0, 0.0)]);
        edge(&mut g, &[(9.0, 9.0), (9.5, 9.0)]);
        let mut p = ProgressReporter::silent();
        clean(&mut g, all(), &mut p).unwrap();
        let edges = g.edge_ids();
        let second = clean(&mut g, all(), &mut p).unwrap();
        assert_eq!(second, CleanStats::default());
        assert_eq!(g.edge_ids(), edges);
    }
}
