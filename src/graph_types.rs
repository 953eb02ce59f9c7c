// ===========================================================================
// Arena-backed line graph
// ===========================================================================
//
// Nodes and edges live in id-ordered maps owned by the Graph and refer to
// each other by id only. Adjacency is stored twice per node, as parallel
// vectors: `topology` holds the neighbouring node of each incident edge and
// `adj_edges` the edge itself. A self-loop appears twice in both.
// ===========================================================================

use crate::error::{CleanError, CleanResult};
use crate::feature::{Attributes, FeatureId};
use crate::geometry;
use crate::id_allocator::IdAllocator;
use ahash::AHashMap;
use geo::Coord;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EdgeId(pub u64);

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// Hashable exact-coordinate key. `OrderedFloat` treats 0.0 and -0.0 alike.
pub type CoordKey = (OrderedFloat<f64>, OrderedFloat<f64>);

pub fn coord_key(c: Coord) -> CoordKey {
    (OrderedFloat(c.x), OrderedFloat(c.y))
}

#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub point: Coord,
    pub topology: Vec<NodeId>,
    pub adj_edges: Vec<EdgeId>,
}

impl Node {
    pub fn new(id: NodeId, point: Coord) -> Self {
        Self {
            id,
            point,
            topology: Vec::new(),
            adj_edges: Vec::new(),
        }
    }

    pub fn degree(&self) -> usize {
        self.adj_edges.len()
    }

    /// Degree two through two different edges: a vertex a line merely
    /// passes through.
    pub fn is_pass_through(&self) -> bool {
        self.adj_edges.len() == 2 && self.adj_edges[0] != self.adj_edges[1]
    }
}

#[derive(Debug, Clone)]
pub struct Edge {
    pub id: EdgeId,
    pub geometry: Vec<Coord>,
    pub attributes: Attributes,
    pub source: FeatureId,
    pub nodes: (NodeId, NodeId),
    /// Extra strokes of a disjoint multi-line feature. They take no part in
    /// topology until the multipart split turns them into edges of their own.
    pub detached_parts: Vec<Vec<Coord>>,
}

impl Edge {
    pub fn start(&self) -> NodeId {
        self.nodes.0
    }

    pub fn end(&self) -> NodeId {
        self.nodes.1
    }

    pub fn is_self_loop(&self) -> bool {
        self.nodes.0 == self.nodes.1
    }

    pub fn length(&self) -> f64 {
        geometry::polyline_length(&self.geometry)
    }

    pub fn is_multipart(&self) -> bool {
        !self.detached_parts.is_empty()
    }

    pub fn other_node(&self, n: NodeId) -> NodeId {
        if self.nodes.0 == n {
            self.nodes.1
        } else {
            self.nodes.0
        }
    }

    /// Geometry read from `from` towards the other endpoint.
    pub fn geometry_from(&self, from: NodeId) -> Vec<Coord> {
        if self.nodes.0 == from {
            self.geometry.clone()
        } else {
            self.geometry.iter().rev().copied().collect()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerKind {
    Broken,
    Snapped,
    Merged,
    Duplicate,
    Orphan,
    #[serde(rename = "closed polyline")]
    ClosedPolyline,
    Multipart,
    Point,
    Invalid,
    Unlink,
}

impl MarkerKind {
    pub const ALL: &'static [MarkerKind] = &[
        MarkerKind::Broken,
        MarkerKind::Snapped,
        MarkerKind::Merged,
        MarkerKind::Duplicate,
        MarkerKind::Orphan,
        MarkerKind::ClosedPolyline,
        MarkerKind::Multipart,
        MarkerKind::Point,
        MarkerKind::Invalid,
        MarkerKind::Unlink,
    ];

    /// Cause string handed to the output layer.
    pub fn cause(&self) -> &'static str {
        match self {
            MarkerKind::Broken => "broken",
            MarkerKind::Snapped => "snapped",
            MarkerKind::Merged => "merged",
            MarkerKind::Duplicate => "duplicate",
            MarkerKind::Orphan => "orphan",
            MarkerKind::ClosedPolyline => "closed polyline",
            MarkerKind::Multipart => "multipart",
            MarkerKind::Point => "point",
            MarkerKind::Invalid => "invalid",
            MarkerKind::Unlink => "unlink",
        }
    }
}

impl fmt::Display for MarkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.cause())
    }
}

/// A diagnostic point handed back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub id: u64,
    pub point: Coord,
    pub kind: MarkerKind,
}

pub struct Graph {
    pub nodes: BTreeMap<NodeId, Node>,
    pub edges: BTreeMap<EdgeId, Edge>,
    /// Exact coordinate -> node, only consulted while loading.
    pub(crate) point_lookup: AHashMap<CoordKey, NodeId>,
    node_ids: IdAllocator,
    edge_ids: IdAllocator,
    pub errors: Vec<Marker>,
    pub unlinks: Vec<Marker>,
}

impl Graph {
    pub fn new() -> Self {
        Self {
            nodes: BTreeMap::new(),
            edges: BTreeMap::new(),
            point_lookup: AHashMap::new(),
            node_ids: IdAllocator::default(),
            edge_ids: IdAllocator::default(),
            errors: Vec::new(),
            unlinks: Vec::new(),
        }
    }

    pub fn node(&self, id: NodeId) -> CleanResult<&Node> {
        self.nodes.get(&id).ok_or(CleanError::MissingNode(id))
    }

    pub fn node_mut(&mut self, id: NodeId) -> CleanResult<&mut Node> {
        self.nodes.get_mut(&id).ok_or(CleanError::MissingNode(id))
    }

    pub fn edge(&self, id: EdgeId) -> CleanResult<&Edge> {
        self.edges.get(&id).ok_or(CleanError::MissingEdge(id))
    }

    pub fn edge_mut(&mut self, id: EdgeId) -> CleanResult<&mut Edge> {
        self.edges.get_mut(&id).ok_or(CleanError::MissingEdge(id))
    }

    pub fn degree(&self, id: NodeId) -> CleanResult<usize> {
        Ok(self.node(id)?.degree())
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.keys().copied().collect()
    }

    pub fn edge_ids(&self) -> Vec<EdgeId> {
        self.edges.keys().copied().collect()
    }

    /// Create a node that is not registered in the load-time lookup.
    pub fn add_node(&mut self, point: Coord) -> NodeId {
        let id = NodeId(self.node_ids.next());
        self.nodes.insert(id, Node::new(id, point));
        id
    }

    /// Create an edge between two existing nodes and wire it into both.
    /// The geometry's end vertices are set to the node points.
    pub fn add_edge(
        &mut self,
        mut geometry: Vec<Coord>,
        attributes: Attributes,
        source: FeatureId,
        start: NodeId,
        end: NodeId,
        detached_parts: Vec<Vec<Coord>>,
    ) -> CleanResult<EdgeId> {
        if geometry.len() < 2 {
            return Err(CleanError::invariant(
                "add_edge",
                format!("geometry of {} vertices for {}-{}", geometry.len(), start, end),
            ));
        }
        let start_pt = self.node(start)?.point;
        let end_pt = self.node(end)?.point;
        geometry[0] = start_pt;
        let last = geometry.len() - 1;
        geometry[last] = end_pt;

        let id = EdgeId(self.edge_ids.next());
        self.edges.insert(
            id,
            Edge {
                id,
                geometry,
                attributes,
                source,
                nodes: (start, end),
                detached_parts,
            },
        );
        self.update_topology(start, end, id)?;
        Ok(id)
    }

    /// Register `edge` on both endpoints. A self-loop registers twice on the
    /// same node.
    pub fn update_topology(&mut self, start: NodeId, end: NodeId, edge: EdgeId) -> CleanResult<()> {
        {
            let node = self.node_mut(start)?;
            node.topology.push(end);
            node.adj_edges.push(edge);
        }
        let node = self.node_mut(end)?;
        node.topology.push(start);
        node.adj_edges.push(edge);
        Ok(())
    }

    /// Remove the adjacency entries of `edge` from its endpoints, leaving the
    /// edge itself in the arena.
    pub fn detach_edge(&mut self, edge_id: EdgeId) -> CleanResult<()> {
        let (start, end) = self.edge(edge_id)?.nodes;
        self.unregister(start, edge_id)?;
        self.unregister(end, edge_id)?;
        Ok(())
    }

    fn unregister(&mut self, node_id: NodeId, edge_id: EdgeId) -> CleanResult<()> {
        let node = self.node_mut(node_id)?;
        let Some(pos) = node.adj_edges.iter().position(|e| *e == edge_id) else {
            return Err(CleanError::invariant(
                "detach_edge",
                format!("{} is not registered on {}", edge_id, node_id),
            ));
        };
        node.adj_edges.remove(pos);
        node.topology.remove(pos);
        Ok(())
    }

    /// Remove an edge for good, unwiring it from both endpoints. The nodes
    /// stay, even when left without edges.
    pub fn remove_edge(&mut self, edge_id: EdgeId) -> CleanResult<Edge> {
        self.detach_edge(edge_id)?;
        self.edges
            .remove(&edge_id)
            .ok_or(CleanError::MissingEdge(edge_id))
    }

    /// Remove a node that no edge touches any more.
    pub fn remove_node(&mut self, node_id: NodeId) -> CleanResult<Node> {
        let node = self.node(node_id)?;
        if !node.adj_edges.is_empty() {
            return Err(CleanError::invariant(
                "remove_node",
                format!("{} still has {} incident edges", node_id, node.degree()),
            ));
        }
        let key = coord_key(node.point);
        if self.point_lookup.get(&key) == Some(&node_id) {
            self.point_lookup.remove(&key);
        }
        self.nodes
            .remove(&node_id)
            .ok_or(CleanError::MissingNode(node_id))
    }

    /// Move an edge onto new endpoints, rewriting adjacency on old and new
    /// nodes and the geometry's end vertices in one step.
    pub fn rewire_edge(&mut self, edge_id: EdgeId, start: NodeId, end: NodeId) -> CleanResult<()> {
        self.detach_edge(edge_id)?;
        let start_pt = self.node(start)?.point;
        let end_pt = self.node(end)?.point;
        let edge = self.edge_mut(edge_id)?;
        edge.nodes = (start, end);
        edge.geometry[0] = start_pt;
        let last = edge.geometry.len() - 1;
        edge.geometry[last] = end_pt;
        self.update_topology(start, end, edge_id)
    }

    pub fn record_error(&mut self, kind: MarkerKind, point: Coord) {
        let id = self.errors.len() as u64;
        self.errors.push(Marker { id, point, kind });
    }

    pub fn record_unlink(&mut self, point: Coord) {
        let id = self.unlinks.len() as u64;
        self.unlinks.push(Marker {
            id,
            point,
            kind: MarkerKind::Unlink,
        });
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}
