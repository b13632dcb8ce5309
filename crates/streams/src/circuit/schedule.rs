//! Evaluation order of a topology.

use crate::error::TopologyError;
use petgraph::{algo::toposort, graphmap::DiGraphMap};

/// Node index within a topology.
pub type NodeId = usize;

/// A schedule defines the order in which nodes are evaluated.  A valid
/// schedule evaluates each node after all of its upstream nodes, so a single
/// pass over the schedule propagates a record through the entire graph.
#[derive(Clone, Debug)]
pub(crate) struct Schedule {
    order: Vec<NodeId>,
}

impl Schedule {
    /// Compute a schedule by arranging nodes in a topological order.
    pub(crate) fn prepare(
        num_nodes: usize,
        edges: impl IntoIterator<Item = (NodeId, NodeId)>,
    ) -> Result<Self, TopologyError> {
        let mut g = DiGraphMap::<NodeId, ()>::new();
        for node in 0..num_nodes {
            g.add_node(node);
        }
        for (from, to) in edges {
            g.add_edge(from, to, ());
        }

        // The builder only connects new nodes to existing ones, so a cycle
        // cannot happen in practice.
        let order = toposort(&g, None).map_err(|e| TopologyError::Cycle {
            node: e.node_id(),
        })?;

        Ok(Self { order })
    }

    pub(crate) fn order(&self) -> &[NodeId] {
        &self.order
    }
}

#[cfg(test)]
mod test {
    use super::Schedule;
    use crate::error::TopologyError;

    #[test]
    fn respects_dependencies() {
        let edges = [(0, 2), (1, 3), (2, 4), (3, 4), (4, 5)];
        let schedule = Schedule::prepare(6, edges).unwrap();
        let position = |n: usize| schedule.order().iter().position(|x| *x == n).unwrap();

        assert_eq!(schedule.order().len(), 6);
        for (from, to) in edges {
            assert!(position(from) < position(to));
        }
    }

    #[test]
    fn isolated_nodes_are_scheduled() {
        let schedule = Schedule::prepare(3, [] as [(usize, usize); 0]).unwrap();
        assert_eq!(schedule.order().len(), 3);
    }

    #[test]
    fn cycle() {
        let err = Schedule::prepare(2, [(0, 1), (1, 0)]).unwrap_err();
        assert!(matches!(err, TopologyError::Cycle { .. }));
    }
}
