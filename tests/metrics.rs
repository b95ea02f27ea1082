//! Integration tests for metric estimation.
//!
//! These tests verify:
//! - Interpolation of optimistic and pessimistic simulations
//! - Insufficient-data outcomes instead of errors
//! - The FCP -> TTI -> TBT / Max Potential FID chain

use lantern::config::Settings;
use lantern::graph::{Graph, GraphBuilder};
use lantern::metrics::paint::{optimistic_paint_graph, pessimistic_paint_graph};
use lantern::metrics::{
    EstimateContext, FirstContentfulPaint, FirstMeaningfulPaint, Interactive, MaxPotentialFid,
    Metric, MetricName, MetricOutcome, TotalBlockingTime,
};
use lantern::node::{NetworkRequest, Priority, SimulationNode};
use lantern::record::ResourceType;
use lantern::simulator::Simulator;
use lantern::types::approx_eq;

// ============================================================================
// Helpers
// ============================================================================

fn single_task(duration_ms: f64) -> Graph {
    GraphBuilder::new()
        .add(SimulationNode::cpu(1, duration_ms))
        .build()
        .unwrap()
}

/// Short parse, one long script task, one short follow-up.
fn main_thread() -> Graph {
    GraphBuilder::new()
        .add(SimulationNode::cpu(1, 30.0))
        .add(SimulationNode::cpu(2, 200.0).depends_on(1))
        .add(SimulationNode::cpu(3, 10.0).depends_on(2))
        .build()
        .unwrap()
}

fn simulator() -> Simulator {
    Simulator::new(Settings::default()).unwrap()
}

// ============================================================================
// Interpolation
// ============================================================================

#[test]
fn test_midpoint_of_two_passes() {
    let simulator = simulator();
    let optimistic = simulator.simulate(&single_task(1000.0)).unwrap();
    let pessimistic = simulator.simulate(&single_task(2000.0)).unwrap();

    let context = EstimateContext::new();
    let outcome = FirstContentfulPaint.interpolate_results(&optimistic, &pessimistic, &context);
    let estimate = outcome.estimate().unwrap();
    assert_eq!(estimate.metric, MetricName::FirstContentfulPaint);
    assert_eq!(estimate.optimistic_ms, 1000.0);
    assert_eq!(estimate.pessimistic_ms, 2000.0);
    assert_eq!(estimate.value_ms, 1500.0);
}

#[test]
fn test_compute_matches_interpolate_results() {
    let simulator = simulator();
    let optimistic = single_task(1000.0);
    let pessimistic = single_task(2000.0);

    let computed = FirstContentfulPaint
        .compute(&simulator, &optimistic, &pessimistic, &EstimateContext::new())
        .unwrap();
    let interpolated = FirstContentfulPaint.interpolate_results(
        &simulator.simulate(&optimistic).unwrap(),
        &simulator.simulate(&pessimistic).unwrap(),
        &EstimateContext::new(),
    );
    assert_eq!(computed, interpolated);
}

// ============================================================================
// Insufficient Data
// ============================================================================

#[test]
fn test_blocking_time_without_prerequisites() {
    let simulator = simulator();
    let graph = main_thread();

    let outcome = TotalBlockingTime
        .compute(&simulator, &graph, &graph, &EstimateContext::new())
        .unwrap();
    match outcome {
        MetricOutcome::InsufficientData { metric, reason } => {
            assert_eq!(metric, MetricName::TotalBlockingTime);
            assert!(reason.contains("First Contentful Paint"));
        }
        other => panic!("expected insufficient data, got {other:?}"),
    }
}

#[test]
fn test_missing_milestone() {
    let simulator = simulator();
    let graph = main_thread();

    let context = EstimateContext::new().with_milestone(99);
    let outcome = FirstContentfulPaint.compute(&simulator, &graph, &graph, &context).unwrap();
    assert!(!outcome.is_estimated());
    assert_eq!(outcome.metric(), MetricName::FirstContentfulPaint);
}

#[test]
fn test_empty_graph_is_insufficient() {
    let simulator = simulator();
    let empty = GraphBuilder::new().build().unwrap();

    let outcome = Interactive.compute(&simulator, &empty, &empty, &EstimateContext::new()).unwrap();
    assert!(!outcome.is_estimated());
}

// ============================================================================
// Metric Chain
// ============================================================================

#[test]
fn test_paint_interactive_blocking_chain() {
    let simulator = simulator();
    let graph = main_thread();

    let fcp = FirstContentfulPaint
        .compute(&simulator, &graph, &graph, &EstimateContext::new().with_milestone(1))
        .unwrap();
    let fcp = *fcp.estimate().unwrap();
    assert_eq!(fcp.value_ms, 30.0);

    let context = EstimateContext::new().with_first_contentful_paint(fcp);
    let tti = Interactive
        .compute(
            &simulator,
            &Interactive::optimistic_graph(&graph),
            &Interactive::pessimistic_graph(&graph),
            &context,
        )
        .unwrap();
    let tti = *tti.estimate().unwrap();
    assert!(approx_eq(tti.value_ms, 230.0, 1e-9));
    assert_eq!(tti.optimistic_ms, 230.0);

    let context = context.with_interactive(tti);
    // The 200 ms task runs 30..230, entirely inside [FCP, TTI].
    let tbt = TotalBlockingTime.compute(&simulator, &graph, &graph, &context).unwrap();
    assert_eq!(tbt.value(), Some(150.0));

    let fid = MaxPotentialFid.compute(&simulator, &graph, &graph, &context).unwrap();
    assert_eq!(fid.value(), Some(200.0));
}

#[test]
fn test_meaningful_paint_never_before_contentful() {
    let simulator = simulator();
    let graph = main_thread();

    let fcp = FirstContentfulPaint
        .compute(&simulator, &graph, &graph, &EstimateContext::new().with_milestone(2))
        .unwrap();
    let context = EstimateContext::new()
        .with_milestone(1)
        .with_first_contentful_paint(*fcp.estimate().unwrap());

    let fmp = FirstMeaningfulPaint.compute(&simulator, &graph, &graph, &context).unwrap();
    assert_eq!(fmp.value(), Some(230.0));
}

#[test]
fn test_paint_graphs_bound_the_estimate() {
    let graph = GraphBuilder::new()
        .add(
            SimulationNode::network(
                1,
                NetworkRequest::new("https://example.com", 20_000)
                    .with_resource_type(ResourceType::Document)
                    .with_priority(Priority::VeryHigh),
            )
            .observed(0.0, 300.0),
        )
        .add(
            SimulationNode::network(
                2,
                NetworkRequest::new("https://example.com", 60_000)
                    .with_resource_type(ResourceType::Stylesheet)
                    .with_priority(Priority::VeryHigh),
            )
            .depends_on(1)
            .observed(300.0, 600.0),
        )
        .add(
            SimulationNode::network(
                3,
                NetworkRequest::new("https://example.com", 400_000)
                    .with_resource_type(ResourceType::Image)
                    .with_priority(Priority::Low),
            )
            .depends_on(1)
            .observed(300.0, 900.0),
        )
        .add(SimulationNode::cpu(4, 40.0).depends_on(2).observed(600.0, 640.0))
        .build()
        .unwrap();

    let optimistic = optimistic_paint_graph(&graph, 1000.0);
    let pessimistic = pessimistic_paint_graph(&graph, 1000.0);
    assert_eq!(optimistic.len(), 3);
    assert_eq!(pessimistic.len(), 4);

    let simulator = Simulator::new(Settings::mobile_slow_4g()).unwrap();
    let outcome = FirstContentfulPaint
        .compute(&simulator, &optimistic, &pessimistic, &EstimateContext::new())
        .unwrap();
    let estimate = outcome.estimate().unwrap();
    assert!(estimate.optimistic_ms <= estimate.pessimistic_ms);
    assert!(estimate.value_ms >= estimate.optimistic_ms);
    assert!(estimate.value_ms <= estimate.pessimistic_ms);
}
