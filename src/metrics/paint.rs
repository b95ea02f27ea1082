//! Paint metrics: first contentful, first meaningful and largest contentful paint.
//!
//! A paint happens when a milestone node finishes. Graph builders trim an
//! observed graph down to what could have blocked the paint: the optimistic
//! graph keeps only render-blocking requests observed before it, the
//! pessimistic graph keeps every request observed before it. CPU work observed
//! before the paint is kept in both. Roots are always kept, since the main
//! document precedes every paint.

use crate::graph::Graph;
use crate::metrics::{Coefficients, EstimateContext, Metric, MetricName};
use crate::node::{NodeKind, SimulationNode};
use crate::record::ResourceType;
use crate::simulator::SimulationResult;
use crate::types::Millis;

const PAINT_COEFFICIENTS: Coefficients = Coefficients::new(0.0, 0.5, 0.5);

fn observed_before(node: &SimulationNode, cutoff_ms: Millis) -> bool {
    node.observed.map_or(false, |o| o.end_ms <= cutoff_ms)
}

/// Graph of render-blocking requests and CPU work observed before `cutoff_ms`,
/// plus their dependencies.
pub fn optimistic_paint_graph(graph: &Graph, cutoff_ms: Millis) -> Graph {
    graph.subgraph_with_dependencies(|node| {
        if node.dependencies.is_empty() {
            return true;
        }
        if !observed_before(node, cutoff_ms) {
            return false;
        }
        match &node.kind {
            NodeKind::Network(request) => request.priority.is_render_blocking(),
            NodeKind::Cpu(_) => true,
        }
    })
}

/// Like [`optimistic_paint_graph`], but images observed before the paint are
/// kept too, since the largest paint is often an image.
pub fn optimistic_largest_paint_graph(graph: &Graph, cutoff_ms: Millis) -> Graph {
    graph.subgraph_with_dependencies(|node| {
        if node.dependencies.is_empty() {
            return true;
        }
        if !observed_before(node, cutoff_ms) {
            return false;
        }
        match &node.kind {
            NodeKind::Network(request) => {
                request.priority.is_render_blocking()
                    || request.resource_type == ResourceType::Image
            }
            NodeKind::Cpu(_) => true,
        }
    })
}

/// Graph of everything observed before `cutoff_ms`, plus dependencies.
pub fn pessimistic_paint_graph(graph: &Graph, cutoff_ms: Millis) -> Graph {
    graph.subgraph_with_dependencies(|node| {
        node.dependencies.is_empty() || observed_before(node, cutoff_ms)
    })
}

/// Paint time in one pass: the milestone's end, or the end of the graph.
fn paint_time(result: &SimulationResult, context: &EstimateContext) -> Result<Millis, String> {
    if result.node_timings.is_empty() {
        return Err("simulated graph is empty".to_string());
    }
    match context.milestone {
        Some(id) => result
            .timing(id)
            .map(|t| t.end_ms)
            .ok_or_else(|| format!("milestone node {} was not simulated", id)),
        None => Ok(result.total_time_ms),
    }
}

/// Paint time, clamped to the same pass's First Contentful Paint if known.
fn paint_time_after_fcp(
    result: &SimulationResult,
    context: &EstimateContext,
) -> Result<Millis, String> {
    let paint = paint_time(result, context)?;
    let fcp = context
        .pass_value(context.first_contentful_paint.as_ref())
        .unwrap_or(0.0);
    Ok(paint.max(fcp))
}

/// First Contentful Paint.
#[derive(Clone, Copy, Debug, Default)]
pub struct FirstContentfulPaint;

impl Metric for FirstContentfulPaint {
    fn name(&self) -> MetricName {
        MetricName::FirstContentfulPaint
    }

    fn coefficients(&self) -> Coefficients {
        PAINT_COEFFICIENTS
    }

    fn estimate(
        &self,
        result: &SimulationResult,
        context: &EstimateContext,
    ) -> Result<Millis, String> {
        paint_time(result, context)
    }
}

/// First Meaningful Paint. Never earlier than First Contentful Paint when one
/// is known.
#[derive(Clone, Copy, Debug, Default)]
pub struct FirstMeaningfulPaint;

impl Metric for FirstMeaningfulPaint {
    fn name(&self) -> MetricName {
        MetricName::FirstMeaningfulPaint
    }

    fn coefficients(&self) -> Coefficients {
        PAINT_COEFFICIENTS
    }

    fn estimate(
        &self,
        result: &SimulationResult,
        context: &EstimateContext,
    ) -> Result<Millis, String> {
        paint_time_after_fcp(result, context)
    }
}

/// Largest Contentful Paint. Never earlier than First Contentful Paint when
/// one is known.
#[derive(Clone, Copy, Debug, Default)]
pub struct LargestContentfulPaint;

impl Metric for LargestContentfulPaint {
    fn name(&self) -> MetricName {
        MetricName::LargestContentfulPaint
    }

    fn coefficients(&self) -> Coefficients {
        PAINT_COEFFICIENTS
    }

    fn estimate(
        &self,
        result: &SimulationResult,
        context: &EstimateContext,
    ) -> Result<Millis, String> {
        paint_time_after_fcp(result, context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;
    use crate::node::{NetworkRequest, Priority};

    fn observed_graph() -> Graph {
        GraphBuilder::new()
            .add(
                SimulationNode::network(
                    1,
                    NetworkRequest::new("https://a.com", 10_000).with_priority(Priority::VeryHigh),
                )
                .observed(0.0, 100.0),
            )
            .add(
                SimulationNode::network(
                    2,
                    NetworkRequest::new("https://a.com", 5_000).with_priority(Priority::High),
                )
                .depends_on(1)
                .observed(100.0, 200.0),
            )
            .add(
                SimulationNode::network(
                    3,
                    NetworkRequest::new("https://a.com", 50_000).with_priority(Priority::Low),
                )
                .depends_on(1)
                .observed(100.0, 250.0),
            )
            .add(SimulationNode::cpu(4, 20.0).depends_on(2).observed(200.0, 220.0))
            .add(
                SimulationNode::network(5, NetworkRequest::new("https://a.com", 1_000))
                    .depends_on(4)
                    .observed(400.0, 500.0),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_optimistic_graph_keeps_render_blocking() {
        let graph = optimistic_paint_graph(&observed_graph(), 300.0);
        let ids: Vec<u64> = graph.nodes().iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![1, 2, 4]);
    }

    #[test]
    fn test_largest_paint_graph_keeps_images() {
        let graph = GraphBuilder::new()
            .add(
                SimulationNode::network(1, NetworkRequest::new("https://a.com", 10_000))
                    .observed(0.0, 100.0),
            )
            .add(
                SimulationNode::network(
                    2,
                    NetworkRequest::new("https://a.com", 80_000)
                        .with_priority(Priority::Low)
                        .with_resource_type(ResourceType::Image),
                )
                .depends_on(1)
                .observed(100.0, 250.0),
            )
            .build()
            .unwrap();

        assert_eq!(optimistic_paint_graph(&graph, 300.0).len(), 1);
        assert_eq!(optimistic_largest_paint_graph(&graph, 300.0).len(), 2);
    }

    #[test]
    fn test_pessimistic_graph_keeps_everything_before_paint() {
        let graph = pessimistic_paint_graph(&observed_graph(), 300.0);
        let ids: Vec<u64> = graph.nodes().iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_milestone_missing_is_insufficient() {
        let settings = crate::config::Settings::default();
        let simulator = crate::simulator::Simulator::new(settings).unwrap();
        let graph = optimistic_paint_graph(&observed_graph(), 300.0);
        let result = simulator.simulate(&graph).unwrap();

        let context = EstimateContext::new().with_milestone(5);
        assert!(FirstContentfulPaint.estimate(&result, &context).is_err());

        let context = EstimateContext::new().with_milestone(4);
        assert_eq!(
            FirstContentfulPaint.estimate(&result, &context),
            Ok(result.timing(4).unwrap().end_ms)
        );
    }
}
