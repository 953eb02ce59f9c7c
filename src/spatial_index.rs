// ===========================================================================
// Spatial indices over the line graph
// ===========================================================================
//
// R*-trees are cheap to bulk load, so passes that need an index build a
// fresh one on entry instead of tracking every geometry change made by the
// passes before them.
// ===========================================================================

use crate::geometry::{self, Envelope};
use crate::graph_types::{EdgeId, Graph, NodeId};
use geo::Coord;
use rstar::primitives::GeomWithData;
use rstar::{AABB, RTree, RTreeObject};

/// R-tree entry for a bounding box tagged with a key.
pub struct BboxEntry<K> {
    pub key: K,
    min: [f64; 2],
    max: [f64; 2],
}

impl<K> RTreeObject for BboxEntry<K> {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(self.min, self.max)
    }
}

pub struct BboxIndex<K> {
    tree: RTree<BboxEntry<K>>,
}

impl<K: Copy + Ord> BboxIndex<K> {
    pub fn bulk_load(entries: impl IntoIterator<Item = (K, Envelope)>) -> Self {
        let entries: Vec<BboxEntry<K>> = entries
            .into_iter()
            .map(|(key, (min, max))| BboxEntry { key, min, max })
            .collect();
        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    /// Keys whose box intersects `envelope`, in key order.
    pub fn intersecting(&self, envelope: &Envelope) -> Vec<K> {
        let query = AABB::from_corners(envelope.0, envelope.1);
        let mut keys: Vec<K> = self
            .tree
            .locate_in_envelope_intersecting(&query)
            .map(|entry| entry.key)
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }
}

pub type EdgeIndex = BboxIndex<EdgeId>;

impl BboxIndex<EdgeId> {
    /// Index the current geometry of every edge in the graph.
    pub fn from_graph(graph: &Graph) -> Self {
        Self::bulk_load(
            graph
                .edges
                .values()
                .map(|edge| (edge.id, geometry::bbox(&edge.geometry))),
        )
    }
}

/// Point index over node positions.
pub struct NodeIndex {
    tree: RTree<GeomWithData<[f64; 2], NodeId>>,
}

impl NodeIndex {
    pub fn from_graph(graph: &Graph) -> Self {
        let entries: Vec<GeomWithData<[f64; 2], NodeId>> = graph
            .nodes
            .values()
            .map(|node| GeomWithData::new([node.point.x, node.point.y], node.id))
            .collect();
        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    /// Nodes within `distance` of `point` (inclusive), in id order. The
    /// envelope query is buffered by `distance` and refined with the exact
    /// Euclidean distance.
    pub fn within_distance(&self, point: Coord, distance: f64) -> Vec<NodeId> {
        let envelope = AABB::from_corners(
            [point.x - distance, point.y - distance],
            [point.x + distance, point.y + distance],
        );
        let max_sq = distance * distance;
        let mut ids: Vec<NodeId> = self
            .tree
            .locate_in_envelope(&envelope)
            .filter(|entry| {
                let [x, y] = *entry.geom();
                let dx = x - point.x;
                let dy = y - point.y;
                dx * dx + dy * dy <= max_sq
            })
            .map(|entry| entry.data)
            .collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::coord;

    #[test]
    fn test_bbox_index_query() {
        let index: BboxIndex<usize> = BboxIndex::bulk_load(vec![
            (0, ([0.0, 0.0], [1.0, 1.0])),
            (1, ([5.0, 5.0], [6.0, 6.0])),
            (2, ([0.0, 0.0], [10.0, 10.0])),
        ]);
        assert_eq!(index.intersecting(&([0.5, 0.5], [0.6, 0.6])), vec![0, 2]);
        assert_eq!(index.intersecting(&([5.5, 5.5], [5.5, 5.5])), vec![1, 2]);
        assert!(index.intersecting(&([20.0, 20.0], [21.0, 21.0])).is_empty());
    }

    #[test]
    fn test_node_index_radius() {
        let mut g = Graph::new();
        let a = g.add_node(coord(0.0, 0.0));
        let b = g.add_node(coord(0.6, 0.7));
        let _far = g.add_node(coord(0.9, 0.9));
        let index = NodeIndex::from_graph(&g);
        // (0.9, 0.9) is inside the buffered box but ~1.27 away
        assert_eq!(index.within_distance(coord(0.0, 0.0), 1.0), vec![a, b]);
    }
}
