//! The dependency graph.
//!
//! A `Graph` is an arena of immutable [`SimulationNode`]s plus precomputed
//! dependency and dependent indices. It is validated once, at construction:
//! duplicate IDs, dangling references, invalid costs and cycles are all fatal
//! [`GraphError`]s, so the simulator can assume every node is reachable.
//!
//! # Example
//!
//! ```
//! use lantern::graph::GraphBuilder;
//! use lantern::node::{NetworkRequest, SimulationNode};
//!
//! let graph = GraphBuilder::new()
//!     .add(SimulationNode::network(1, NetworkRequest::new("https://example.com", 10_000)))
//!     .add(SimulationNode::cpu(2, 50.0).depends_on(1))
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(graph.root_nodes(), vec![1]);
//! assert_eq!(graph.dependents(1), vec![2]);
//! ```

use std::collections::{HashMap, HashSet, VecDeque};

use thiserror::Error;

use crate::node::SimulationNode;
use crate::types::{NodeId, NodeIndex};

/// Errors raised while constructing a graph.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("Duplicate node ID: {0}")]
    DuplicateNode(NodeId),

    #[error("Node {node} depends on non-existent node {missing}")]
    DanglingDependency { node: NodeId, missing: NodeId },

    #[error("Node {0} depends on itself")]
    SelfDependency(NodeId),

    #[error("Cycle detected among nodes {0:?}")]
    Cycle(Vec<NodeId>),

    #[error("Node {node} has an invalid cost input: {reason}")]
    InvalidCost { node: NodeId, reason: String },
}

/// Result type for graph construction.
pub type GraphResult<T> = Result<T, GraphError>;

/// An immutable, validated DAG of simulation nodes.
#[derive(Clone, Debug)]
pub struct Graph {
    /// Nodes in graph order
    nodes: Vec<SimulationNode>,
    /// Node ID to arena position
    index: HashMap<NodeId, NodeIndex>,
    /// For each node, the positions of the nodes it depends on
    dependencies: Vec<Vec<NodeIndex>>,
    /// For each node, the positions of the nodes that depend on it
    dependents: Vec<Vec<NodeIndex>>,
    /// Node positions in a deterministic topological order
    topological_order: Vec<NodeIndex>,
}

impl Graph {
    /// Validates `nodes` and builds the graph. Graph order is the order of `nodes`.
    pub fn new(nodes: Vec<SimulationNode>) -> GraphResult<Self> {
        let mut index = HashMap::with_capacity(nodes.len());
        for (position, node) in nodes.iter().enumerate() {
            if index.insert(node.id, position).is_some() {
                return Err(GraphError::DuplicateNode(node.id));
            }
            if let Some(reason) = node.invalid_cost() {
                return Err(GraphError::InvalidCost { node: node.id, reason });
            }
        }

        let mut dependencies = vec![Vec::new(); nodes.len()];
        let mut dependents = vec![Vec::new(); nodes.len()];
        for (position, node) in nodes.iter().enumerate() {
            let mut seen = HashSet::new();
            for &dep in &node.dependencies {
                if dep == node.id {
                    return Err(GraphError::SelfDependency(node.id));
                }
                let dep_position = *index.get(&dep).ok_or(GraphError::DanglingDependency {
                    node: node.id,
                    missing: dep,
                })?;
                // Repeated edges collapse into one.
                if seen.insert(dep_position) {
                    dependencies[position].push(dep_position);
                    dependents[dep_position].push(position);
                }
            }
        }

        let topological_order = topological_sort(&nodes, &dependencies, &dependents)?;

        Ok(Self {
            nodes,
            index,
            dependencies,
            dependents,
            topological_order,
        })
    }

    /// Returns the number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns all nodes in graph order.
    pub fn nodes(&self) -> &[SimulationNode] {
        &self.nodes
    }

    /// Returns a node by ID.
    pub fn node(&self, id: NodeId) -> Option<&SimulationNode> {
        self.index.get(&id).map(|&i| &self.nodes[i])
    }

    /// Returns the arena position of a node.
    pub fn index_of(&self, id: NodeId) -> Option<NodeIndex> {
        self.index.get(&id).copied()
    }

    /// Returns the node at an arena position.
    pub fn node_at(&self, index: NodeIndex) -> &SimulationNode {
        &self.nodes[index]
    }

    /// Returns the IDs of nodes with no dependencies, in graph order.
    pub fn root_nodes(&self) -> Vec<NodeId> {
        self.root_indices().map(|i| self.nodes[i].id).collect()
    }

    /// Returns the IDs of nodes nothing depends on, in graph order.
    pub fn leaf_nodes(&self) -> Vec<NodeId> {
        (0..self.nodes.len())
            .filter(|&i| self.dependents[i].is_empty())
            .map(|i| self.nodes[i].id)
            .collect()
    }

    /// Returns the IDs of the nodes that depend on `id`.
    pub fn dependents(&self, id: NodeId) -> Vec<NodeId> {
        self.ids_at(id, &self.dependents)
    }

    /// Returns the IDs of the nodes `id` depends on.
    pub fn dependencies(&self, id: NodeId) -> Vec<NodeId> {
        self.ids_at(id, &self.dependencies)
    }

    /// Returns node IDs in a topological order (dependencies first).
    pub fn topological_order(&self) -> Vec<NodeId> {
        self.topological_order
            .iter()
            .map(|&i| self.nodes[i].id)
            .collect()
    }

    /// Builds a new graph with every node matching `keep` plus all of its
    /// transitive dependencies. Graph order is preserved.
    pub fn subgraph_with_dependencies<F>(&self, keep: F) -> Graph
    where
        F: Fn(&SimulationNode) -> bool,
    {
        let mut included = vec![false; self.nodes.len()];
        let mut stack: Vec<NodeIndex> = (0..self.nodes.len())
            .filter(|&i| keep(&self.nodes[i]))
            .collect();

        while let Some(position) = stack.pop() {
            if included[position] {
                continue;
            }
            included[position] = true;
            stack.extend(self.dependencies[position].iter().copied());
        }

        let nodes: Vec<SimulationNode> = self
            .nodes
            .iter()
            .zip(&included)
            .filter(|(_, &inc)| inc)
            .map(|(node, _)| node.clone())
            .collect();

        // A dependency-closed subset of a valid DAG is itself a valid DAG.
        let index: HashMap<NodeId, NodeIndex> =
            nodes.iter().enumerate().map(|(i, n)| (n.id, i)).collect();
        let mut dependencies = vec![Vec::new(); nodes.len()];
        let mut dependents = vec![Vec::new(); nodes.len()];
        for (position, node) in nodes.iter().enumerate() {
            let old = self.index[&node.id];
            for &dep in &self.dependencies[old] {
                let new_dep = index[&self.nodes[dep].id];
                dependencies[position].push(new_dep);
                dependents[new_dep].push(position);
            }
        }
        let topological_order = kahn(&dependencies, &dependents);

        Graph {
            nodes,
            index,
            dependencies,
            dependents,
            topological_order,
        }
    }

    pub(crate) fn root_indices(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        (0..self.nodes.len()).filter(move |&i| self.dependencies[i].is_empty())
    }

    pub(crate) fn dependency_indices(&self, index: NodeIndex) -> &[NodeIndex] {
        &self.dependencies[index]
    }

    pub(crate) fn dependent_indices(&self, index: NodeIndex) -> &[NodeIndex] {
        &self.dependents[index]
    }

    fn ids_at(&self, id: NodeId, adjacency: &[Vec<NodeIndex>]) -> Vec<NodeId> {
        self.index
            .get(&id)
            .map(|&i| adjacency[i].iter().map(|&j| self.nodes[j].id).collect())
            .unwrap_or_default()
    }
}

/// Kahn's algorithm over arena positions. Seeds and successors are visited in
/// graph order, so the result is deterministic.
fn kahn(dependencies: &[Vec<NodeIndex>], dependents: &[Vec<NodeIndex>]) -> Vec<NodeIndex> {
    let mut in_degree: Vec<usize> = dependencies.iter().map(Vec::len).collect();
    let mut queue: VecDeque<NodeIndex> = (0..in_degree.len())
        .filter(|&i| in_degree[i] == 0)
        .collect();

    let mut order = Vec::with_capacity(in_degree.len());
    while let Some(node) = queue.pop_front() {
        order.push(node);
        for &next in &dependents[node] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                queue.push_back(next);
            }
        }
    }
    order
}

fn topological_sort(
    nodes: &[SimulationNode],
    dependencies: &[Vec<NodeIndex>],
    dependents: &[Vec<NodeIndex>],
) -> GraphResult<Vec<NodeIndex>> {
    let order = kahn(dependencies, dependents);
    if order.len() != nodes.len() {
        let mut sorted = vec![false; nodes.len()];
        for &i in &order {
            sorted[i] = true;
        }
        let cyclic = nodes
            .iter()
            .zip(sorted)
            .filter(|(_, done)| !done)
            .map(|(node, _)| node.id)
            .collect();
        return Err(GraphError::Cycle(cyclic));
    }
    Ok(order)
}

/// Builder for assembling a graph node by node.
#[derive(Default)]
pub struct GraphBuilder {
    nodes: Vec<SimulationNode>,
}

impl GraphBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a node; graph order is the order of `add` calls.
    pub fn add(mut self, node: SimulationNode) -> Self {
        self.nodes.push(node);
        self
    }

    /// Appends several nodes.
    pub fn add_all(mut self, nodes: impl IntoIterator<Item = SimulationNode>) -> Self {
        self.nodes.extend(nodes);
        self
    }

    /// Builds and validates the graph.
    pub fn build(self) -> GraphResult<Graph> {
        Graph::new(self.nodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NetworkRequest;

    fn net(id: NodeId) -> SimulationNode {
        SimulationNode::network(id, NetworkRequest::new("https://example.com", 1000))
    }

    #[test]
    fn test_linear_chain() {
        let graph = Graph::new(vec![
            net(1),
            SimulationNode::cpu(2, 10.0).depends_on(1),
            SimulationNode::cpu(3, 10.0).depends_on(2),
        ])
        .unwrap();

        assert_eq!(graph.len(), 3);
        assert_eq!(graph.root_nodes(), vec![1]);
        assert_eq!(graph.leaf_nodes(), vec![3]);
        assert_eq!(graph.topological_order(), vec![1, 2, 3]);
        assert_eq!(graph.dependencies(3), vec![2]);
    }

    #[test]
    fn test_diamond() {
        //   1
        //  / \
        // 2   3
        //  \ /
        //   4
        let graph = Graph::new(vec![
            net(1),
            net(2).depends_on(1),
            net(3).depends_on(1),
            SimulationNode::cpu(4, 5.0).depends_on_all([2, 3]),
        ])
        .unwrap();

        assert_eq!(graph.dependents(1), vec![2, 3]);
        assert_eq!(graph.dependencies(4), vec![2, 3]);

        let order = graph.topological_order();
        assert_eq!(order[0], 1);
        assert_eq!(order[3], 4);
    }

    #[test]
    fn test_two_cycle_rejected() {
        let result = Graph::new(vec![net(1).depends_on(2), net(2).depends_on(1)]);
        match result {
            Err(GraphError::Cycle(ids)) => assert_eq!(ids, vec![1, 2]),
            other => panic!("Expected cycle error, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_and_dangling() {
        let dup = Graph::new(vec![net(1), net(1)]);
        assert_eq!(dup.unwrap_err(), GraphError::DuplicateNode(1));

        let dangling = Graph::new(vec![net(1).depends_on(9)]);
        assert_eq!(
            dangling.unwrap_err(),
            GraphError::DanglingDependency { node: 1, missing: 9 }
        );

        let own = Graph::new(vec![net(1).depends_on(1)]);
        assert_eq!(own.unwrap_err(), GraphError::SelfDependency(1));
    }

    #[test]
    fn test_invalid_cost_rejected() {
        let result = Graph::new(vec![SimulationNode::cpu(1, f64::NAN)]);
        assert!(matches!(result, Err(GraphError::InvalidCost { node: 1, .. })));
    }

    #[test]
    fn test_repeated_edges_collapse() {
        let graph = Graph::new(vec![net(1), net(2).depends_on(1).depends_on(1)]).unwrap();
        assert_eq!(graph.dependencies(2), vec![1]);
        assert_eq!(graph.dependents(1), vec![2]);
    }

    #[test]
    fn test_subgraph_keeps_dependencies() {
        let graph = Graph::new(vec![
            net(1),
            net(2).depends_on(1),
            net(3).depends_on(1),
            SimulationNode::cpu(4, 5.0).depends_on(2),
        ])
        .unwrap();

        let sub = graph.subgraph_with_dependencies(|n| n.id == 4);
        let ids: Vec<NodeId> = sub.nodes().iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![1, 2, 4]);
        assert_eq!(sub.dependents(1), vec![2]);
        assert_eq!(sub.topological_order(), vec![1, 2, 4]);
    }

    #[test]
    fn test_unknown_id_queries() {
        let graph = Graph::new(vec![net(1)]).unwrap();
        assert!(graph.dependents(42).is_empty());
        assert!(graph.node(42).is_none());
        assert!(graph.index_of(1).is_some());
    }
}
