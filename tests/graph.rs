//! Integration tests for graph construction and queries.
//!
//! These tests verify:
//! - Validation errors (duplicates, dangling references, self loops, cycles, bad costs)
//! - Root/leaf/dependent queries and deterministic topological order
//! - Dependency-closed subgraphs

use lantern::graph::{Graph, GraphBuilder, GraphError};
use lantern::node::{CpuTask, NetworkRequest, SimulationNode};

// ============================================================================
// Helpers
// ============================================================================

fn net(id: u64) -> SimulationNode {
    SimulationNode::network(id, NetworkRequest::new("https://example.com", 1_000))
}

/// Document -> {script, stylesheet} -> cpu
fn diamond() -> Graph {
    GraphBuilder::new()
        .add(net(1))
        .add(net(2).depends_on(1))
        .add(net(3).depends_on(1))
        .add(SimulationNode::cpu(4, 30.0).depends_on_all([2, 3]))
        .build()
        .unwrap()
}

// ============================================================================
// Validation
// ============================================================================

#[test]
fn test_two_node_cycle_rejected() {
    let err = Graph::new(vec![net(1).depends_on(2), net(2).depends_on(1)]).unwrap_err();
    assert_eq!(err, GraphError::Cycle(vec![1, 2]));
}

#[test]
fn test_longer_cycle_behind_valid_prefix() {
    let err = GraphBuilder::new()
        .add(net(1))
        .add(net(2).depends_on_all([1, 4]))
        .add(net(3).depends_on(2))
        .add(net(4).depends_on(3))
        .build()
        .unwrap_err();

    match err {
        GraphError::Cycle(ids) => {
            assert!(!ids.contains(&1));
            assert!(ids.contains(&2) && ids.contains(&3) && ids.contains(&4));
        }
        other => panic!("expected cycle, got {other:?}"),
    }
}

#[test]
fn test_duplicate_id_rejected() {
    let err = Graph::new(vec![net(7), SimulationNode::cpu(7, 1.0)]).unwrap_err();
    assert_eq!(err, GraphError::DuplicateNode(7));
}

#[test]
fn test_dangling_dependency_rejected() {
    let err = Graph::new(vec![net(1).depends_on(99)]).unwrap_err();
    assert_eq!(err, GraphError::DanglingDependency { node: 1, missing: 99 });
}

#[test]
fn test_self_dependency_rejected() {
    let err = Graph::new(vec![net(5).depends_on(5)]).unwrap_err();
    assert_eq!(err, GraphError::SelfDependency(5));
}

#[test]
fn test_invalid_cpu_duration_rejected() {
    for duration in [-1.0, f64::NAN, f64::INFINITY] {
        let node = SimulationNode::cpu_task(3, CpuTask::new(duration));
        let err = Graph::new(vec![node]).unwrap_err();
        assert!(matches!(err, GraphError::InvalidCost { node: 3, .. }));
    }
}

#[test]
fn test_error_messages_name_nodes() {
    let err = Graph::new(vec![net(1).depends_on(42)]).unwrap_err();
    assert_eq!(err.to_string(), "Node 1 depends on non-existent node 42");
}

// ============================================================================
// Queries
// ============================================================================

#[test]
fn test_roots_leaves_and_neighbours() {
    let graph = diamond();

    assert_eq!(graph.len(), 4);
    assert_eq!(graph.root_nodes(), vec![1]);
    assert_eq!(graph.leaf_nodes(), vec![4]);
    assert_eq!(graph.dependents(1), vec![2, 3]);
    assert_eq!(graph.dependencies(4), vec![2, 3]);
    assert!(graph.dependents(4).is_empty());
    assert!(graph.dependents(1234).is_empty());
}

#[test]
fn test_topological_order_respects_edges() {
    let graph = diamond();
    let order = graph.topological_order();

    let position = |id: u64| order.iter().position(|&n| n == id).unwrap();
    assert!(position(1) < position(2));
    assert!(position(1) < position(3));
    assert!(position(2) < position(4));
    assert!(position(3) < position(4));
    assert_eq!(order, diamond().topological_order());
}

#[test]
fn test_graph_order_is_insertion_order() {
    let graph = GraphBuilder::new()
        .add(net(30))
        .add(net(10))
        .add(net(20).depends_on(30))
        .build()
        .unwrap();

    let ids: Vec<u64> = graph.nodes().iter().map(|n| n.id).collect();
    assert_eq!(ids, vec![30, 10, 20]);
    assert_eq!(graph.index_of(10), Some(1));
    assert_eq!(graph.root_nodes(), vec![30, 10]);
}

// ============================================================================
// Subgraphs
// ============================================================================

#[test]
fn test_subgraph_keeps_transitive_dependencies() {
    let graph = diamond();
    let sub = graph.subgraph_with_dependencies(|node| node.id == 2);

    let ids: Vec<u64> = sub.nodes().iter().map(|n| n.id).collect();
    assert_eq!(ids, vec![1, 2]);
    assert_eq!(sub.dependents(1), vec![2]);
    assert_eq!(sub.root_nodes(), vec![1]);
}

#[test]
fn test_subgraph_of_leaf_is_whole_graph() {
    let graph = diamond();
    let sub = graph.subgraph_with_dependencies(|node| node.is_cpu());
    assert_eq!(sub.len(), graph.len());
    assert_eq!(sub.topological_order(), graph.topological_order());
}
