//! Page-load metric estimators.
//!
//! Every metric is estimated from two simulations: an *optimistic* one over a
//! graph holding only what the metric strictly needs, and a *pessimistic* one
//! over everything that could plausibly block it. The two values are then
//! blended with the metric's [`Coefficients`].
//!
//! ```
//! use lantern::metrics::{interpolate, Coefficients};
//!
//! let value = interpolate(1000.0, 2000.0, Coefficients::new(0.0, 0.5, 0.5));
//! assert_eq!(value, 1500.0);
//! ```

pub mod blocking;
pub mod interactive;
pub mod paint;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::graph::Graph;
use crate::simulator::{RunResult, SimulationResult, Simulator};
use crate::types::{Millis, NodeId};

pub use blocking::{MaxPotentialFid, TotalBlockingTime, BLOCKING_THRESHOLD_MS};
pub use interactive::Interactive;
pub use paint::{FirstContentfulPaint, FirstMeaningfulPaint, LargestContentfulPaint};

/// Weights blending the optimistic and pessimistic estimates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coefficients {
    pub intercept: f64,
    pub optimistic: f64,
    pub pessimistic: f64,
}

impl Coefficients {
    pub const fn new(intercept: f64, optimistic: f64, pessimistic: f64) -> Self {
        Self {
            intercept,
            optimistic,
            pessimistic,
        }
    }
}

/// Blends two estimates.
///
/// A positive intercept is scaled down for fast loads: it only applies in
/// full once the optimistic estimate reaches one second.
pub fn interpolate(optimistic: Millis, pessimistic: Millis, coefficients: Coefficients) -> Millis {
    let intercept_multiplier = if coefficients.intercept > 0.0 {
        (optimistic / 1000.0).min(1.0)
    } else {
        1.0
    };
    coefficients.intercept * intercept_multiplier
        + optimistic * coefficients.optimistic
        + pessimistic * coefficients.pessimistic
}

/// Metrics this crate estimates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MetricName {
    FirstContentfulPaint,
    FirstMeaningfulPaint,
    LargestContentfulPaint,
    Interactive,
    TotalBlockingTime,
    MaxPotentialFid,
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MetricName::FirstContentfulPaint => "FirstContentfulPaint",
            MetricName::FirstMeaningfulPaint => "FirstMeaningfulPaint",
            MetricName::LargestContentfulPaint => "LargestContentfulPaint",
            MetricName::Interactive => "Interactive",
            MetricName::TotalBlockingTime => "TotalBlockingTime",
            MetricName::MaxPotentialFid => "MaxPotentialFID",
        };
        f.write_str(name)
    }
}

/// An estimated metric value with both underlying passes.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricEstimate {
    pub metric: MetricName,
    pub value_ms: Millis,
    pub optimistic_ms: Millis,
    pub pessimistic_ms: Millis,
}

/// Outcome of estimating a metric.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MetricOutcome {
    Estimated(MetricEstimate),
    /// The inputs could not support an estimate, e.g. the milestone node was
    /// not simulated or a prerequisite metric is missing.
    InsufficientData { metric: MetricName, reason: String },
}

impl MetricOutcome {
    pub fn metric(&self) -> MetricName {
        match self {
            MetricOutcome::Estimated(estimate) => estimate.metric,
            MetricOutcome::InsufficientData { metric, .. } => *metric,
        }
    }

    /// The blended value, if estimated.
    pub fn value(&self) -> Option<Millis> {
        self.estimate().map(|e| e.value_ms)
    }

    pub fn estimate(&self) -> Option<&MetricEstimate> {
        match self {
            MetricOutcome::Estimated(estimate) => Some(estimate),
            MetricOutcome::InsufficientData { .. } => None,
        }
    }

    pub fn is_estimated(&self) -> bool {
        matches!(self, MetricOutcome::Estimated(_))
    }
}

/// Which of the two simulations an estimate is computed for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Pass {
    #[default]
    Optimistic,
    Pessimistic,
}

/// Inputs a metric needs besides the simulation itself.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EstimateContext {
    /// Node whose end marks a paint metric. Without one, the paint is the end
    /// of the whole (already trimmed) graph.
    pub milestone: Option<NodeId>,
    /// Earlier estimates that later metrics build on
    pub first_contentful_paint: Option<MetricEstimate>,
    pub first_meaningful_paint: Option<MetricEstimate>,
    pub interactive: Option<MetricEstimate>,
    /// Pass being estimated; set by [`Metric::interpolate_results`]
    pub pass: Pass,
}

impl EstimateContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_milestone(mut self, node: NodeId) -> Self {
        self.milestone = Some(node);
        self
    }

    pub fn with_first_contentful_paint(mut self, estimate: MetricEstimate) -> Self {
        self.first_contentful_paint = Some(estimate);
        self
    }

    pub fn with_first_meaningful_paint(mut self, estimate: MetricEstimate) -> Self {
        self.first_meaningful_paint = Some(estimate);
        self
    }

    pub fn with_interactive(mut self, estimate: MetricEstimate) -> Self {
        self.interactive = Some(estimate);
        self
    }

    /// Copy of this context for one pass.
    pub fn for_pass(&self, pass: Pass) -> Self {
        Self {
            pass,
            ..self.clone()
        }
    }

    /// The value of an earlier estimate matching this context's pass.
    pub fn pass_value(&self, estimate: Option<&MetricEstimate>) -> Option<Millis> {
        estimate.map(|e| match self.pass {
            Pass::Optimistic => e.optimistic_ms,
            Pass::Pessimistic => e.pessimistic_ms,
        })
    }
}

/// A metric estimated from optimistic and pessimistic simulations.
pub trait Metric {
    fn name(&self) -> MetricName;

    fn coefficients(&self) -> Coefficients;

    /// The metric's value in a single simulated pass, or the reason the
    /// result cannot support one.
    fn estimate(
        &self,
        result: &SimulationResult,
        context: &EstimateContext,
    ) -> Result<Millis, String>;

    /// Combines two finished simulations without re-simulating.
    fn interpolate_results(
        &self,
        optimistic: &SimulationResult,
        pessimistic: &SimulationResult,
        context: &EstimateContext,
    ) -> MetricOutcome {
        let optimistic_ms = self.estimate(optimistic, &context.for_pass(Pass::Optimistic));
        let pessimistic_ms = self.estimate(pessimistic, &context.for_pass(Pass::Pessimistic));
        match (optimistic_ms, pessimistic_ms) {
            (Ok(optimistic_ms), Ok(pessimistic_ms)) => MetricOutcome::Estimated(MetricEstimate {
                metric: self.name(),
                value_ms: interpolate(optimistic_ms, pessimistic_ms, self.coefficients()),
                optimistic_ms,
                pessimistic_ms,
            }),
            (Err(reason), _) | (_, Err(reason)) => {
                tracing::debug!(metric = %self.name(), %reason, "insufficient data");
                MetricOutcome::InsufficientData {
                    metric: self.name(),
                    reason,
                }
            }
        }
    }

    /// Simulates both graphs, each with its own pool and DNS cache, and
    /// interpolates. With the `parallel` feature the passes run concurrently.
    fn compute(
        &self,
        simulator: &Simulator,
        optimistic: &Graph,
        pessimistic: &Graph,
        context: &EstimateContext,
    ) -> RunResult<MetricOutcome> {
        let optimistic_label = format!("optimistic{}", self.name());
        let pessimistic_label = format!("pessimistic{}", self.name());

        #[cfg(feature = "parallel")]
        let (optimistic_result, pessimistic_result) = rayon::join(
            || simulator.simulate_labeled(optimistic, optimistic_label),
            || simulator.simulate_labeled(pessimistic, pessimistic_label),
        );

        #[cfg(not(feature = "parallel"))]
        let (optimistic_result, pessimistic_result) = (
            simulator.simulate_labeled(optimistic, optimistic_label),
            simulator.simulate_labeled(pessimistic, pessimistic_label),
        );

        Ok(self.interpolate_results(&optimistic_result?, &pessimistic_result?, context))
    }
}
