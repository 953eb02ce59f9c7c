use crate::error::{CleanError, CleanResult};
use crate::graph_types::{Edge, Graph, Node};
use log::{debug, warn};

/// Verify the structural invariants of the graph after a pass named
/// `context`. Returns the first violation found.
///
/// Checked per node: parallel adjacency vectors of equal length, every
/// listed edge present and touching the node, and the neighbour entry
/// matching that edge's far end. Checked per edge: at least two vertices,
/// both endpoint nodes present, geometry ends equal to the node points,
/// and exactly one registration per endpoint (two on a self-loop's node).
pub fn check_invariants(graph: &Graph, context: &str) -> CleanResult<()> {
    for node in graph.nodes.values() {
        check_node(graph, node).map_err(|detail| report(context, detail))?;
    }
    for edge in graph.edges.values() {
        check_edge(graph, edge).map_err(|detail| report(context, detail))?;
    }
    debug!(
        "invariants hold after {}: {} nodes, {} edges",
        context,
        graph.num_nodes(),
        graph.num_edges()
    );
    Ok(())
}

fn report(context: &str, detail: String) -> CleanError {
    warn!("invariant violated after {}: {}", context, detail);
    CleanError::invariant(context, detail)
}

fn check_node(graph: &Graph, node: &Node) -> Result<(), String> {
    if node.topology.len() != node.adj_edges.len() {
        return Err(format!(
            "{} has {} neighbours but {} incident edges",
            node.id,
            node.topology.len(),
            node.adj_edges.len()
        ));
    }
    for (neighbour, edge_id) in node.topology.iter().zip(&node.adj_edges) {
        let Some(edge) = graph.edges.get(edge_id) else {
            return Err(format!("{} lists missing edge {}", node.id, edge_id));
        };
        if edge.start() != node.id && edge.end() != node.id {
            return Err(format!("{} lists {} which does not touch it", node.id, edge_id));
        }
        if edge.other_node(node.id) != *neighbour {
            return Err(format!(
                "{} records {} via {}, but the edge leads to {}",
                node.id,
                neighbour,
                edge_id,
                edge.other_node(node.id)
            ));
        }
    }
    Ok(())
}

fn check_edge(graph: &Graph, edge: &Edge) -> Result<(), String> {
    if edge.geometry.len() < 2 {
        return Err(format!("{} has {} vertices", edge.id, edge.geometry.len()));
    }
    let Some(start) = graph.nodes.get(&edge.start()) else {
        return Err(format!("{} starts at missing node {}", edge.id, edge.start()));
    };
    let Some(end) = graph.nodes.get(&edge.end()) else {
        return Err(format!("{} ends at missing node {}", edge.id, edge.end()));
    };
    if edge.geometry.first() != Some(&start.point) || edge.geometry.last() != Some(&end.point) {
        return Err(format!(
            "{} geometry ends do not sit on {} and {}",
            edge.id, start.id, end.id
        ));
    }

    let registrations = |node: &Node| node.adj_edges.iter().filter(|e| **e == edge.id).count();
    if edge.is_self_loop() {
        if registrations(start) != 2 {
            return Err(format!(
                "self-loop {} registered {} times on {}",
                edge.id,
                registrations(start),
                start.id
            ));
        }
    } else if registrations(start) != 1 || registrations(end) != 1 {
        return Err(format!(
            "{} registered {}/{} times on {}/{}",
            edge.id,
            registrations(start),
            registrations(end),
            start.id,
            end.id
        ));
    }
    Ok(())
}
