//! Time to Interactive.
//!
//! The page is interactive once the last long CPU task has finished and the
//! main content has painted.

use crate::graph::Graph;
use crate::metrics::blocking::BLOCKING_THRESHOLD_MS;
use crate::metrics::{Coefficients, EstimateContext, Metric, MetricName};
use crate::node::NodeKind;
use crate::record::ResourceType;
use crate::simulator::{SimulationResult, TimingKind};
use crate::types::Millis;

/// Time to Interactive.
#[derive(Clone, Copy, Debug, Default)]
pub struct Interactive;

impl Interactive {
    /// Graph of every CPU task plus the requests interactivity must wait for:
    /// scripts and render-blocking requests, with their dependencies.
    pub fn optimistic_graph(graph: &Graph) -> Graph {
        graph.subgraph_with_dependencies(|node| match &node.kind {
            NodeKind::Cpu(_) => true,
            NodeKind::Network(request) => {
                request.resource_type == ResourceType::Script
                    || request.priority.is_render_blocking()
                    || node.dependencies.is_empty()
            }
        })
    }

    /// The full graph.
    pub fn pessimistic_graph(graph: &Graph) -> Graph {
        graph.clone()
    }
}

/// End of the last CPU task longer than the blocking threshold, if any.
pub(crate) fn last_long_task_end(result: &SimulationResult) -> Option<Millis> {
    result
        .node_timings
        .values()
        .filter(|t| t.kind == TimingKind::Cpu && t.duration_ms() > BLOCKING_THRESHOLD_MS)
        .map(|t| t.end_ms)
        .reduce(f64::max)
}

impl Metric for Interactive {
    fn name(&self) -> MetricName {
        MetricName::Interactive
    }

    fn coefficients(&self) -> Coefficients {
        Coefficients::new(0.0, 0.45, 0.55)
    }

    fn estimate(
        &self,
        result: &SimulationResult,
        context: &EstimateContext,
    ) -> Result<Millis, String> {
        if result.node_timings.is_empty() {
            return Err("simulated graph is empty".to_string());
        }
        // Meaningful paint when known, else contentful paint.
        let paint_floor = context
            .pass_value(context.first_meaningful_paint.as_ref())
            .or_else(|| context.pass_value(context.first_contentful_paint.as_ref()))
            .unwrap_or(0.0);
        let last_task = last_long_task_end(result).unwrap_or(0.0);
        Ok(paint_floor.max(last_task))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::graph::GraphBuilder;
    use crate::metrics::{MetricEstimate, Pass};
    use crate::node::{NetworkRequest, Priority, SimulationNode};
    use crate::simulator::Simulator;

    fn cpu_graph() -> Graph {
        GraphBuilder::new()
            .add(SimulationNode::cpu(1, 30.0))
            .add(SimulationNode::cpu(2, 80.0).depends_on(1))
            .add(SimulationNode::cpu(3, 10.0).depends_on(2))
            .build()
            .unwrap()
    }

    #[test]
    fn test_last_long_task() {
        let simulator = Simulator::new(Settings::default()).unwrap();
        let result = simulator.simulate(&cpu_graph()).unwrap();

        // Task 2 runs 30..110; task 3 is short.
        assert_eq!(last_long_task_end(&result), Some(110.0));
        let value = Interactive.estimate(&result, &EstimateContext::new()).unwrap();
        assert_eq!(value, 110.0);
    }

    #[test]
    fn test_paint_floor() {
        let simulator = Simulator::new(Settings::default()).unwrap();
        let result = simulator.simulate(&cpu_graph()).unwrap();

        let fmp = MetricEstimate {
            metric: MetricName::FirstMeaningfulPaint,
            value_ms: 450.0,
            optimistic_ms: 400.0,
            pessimistic_ms: 500.0,
        };
        let context = EstimateContext::new().with_first_meaningful_paint(fmp);
        assert_eq!(Interactive.estimate(&result, &context.for_pass(Pass::Optimistic)), Ok(400.0));
        assert_eq!(Interactive.estimate(&result, &context.for_pass(Pass::Pessimistic)), Ok(500.0));
    }

    #[test]
    fn test_optimistic_graph_drops_low_priority_images() {
        let graph = GraphBuilder::new()
            .add(SimulationNode::network(1, NetworkRequest::new("https://a.com", 10_000)))
            .add(
                SimulationNode::network(
                    2,
                    NetworkRequest::new("https://a.com", 10_000)
                        .with_resource_type(ResourceType::Script)
                        .with_priority(Priority::Low),
                )
                .depends_on(1),
            )
            .add(
                SimulationNode::network(
                    3,
                    NetworkRequest::new("https://a.com", 90_000)
                        .with_resource_type(ResourceType::Image)
                        .with_priority(Priority::Low),
                )
                .depends_on(1),
            )
            .add(SimulationNode::cpu(4, 60.0).depends_on(2))
            .build()
            .unwrap();

        let optimistic = Interactive::optimistic_graph(&graph);
        let ids: Vec<u64> = optimistic.nodes().iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![1, 2, 4]);
        assert_eq!(Interactive::pessimistic_graph(&graph).len(), 4);
    }
}
