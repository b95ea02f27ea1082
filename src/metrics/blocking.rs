//! Main-thread blocking metrics: Total Blocking Time and Max Potential FID.
//!
//! Both are estimated on the same graphs as [`Interactive`](super::Interactive)
//! and need earlier estimates in the [`EstimateContext`]: First Contentful
//! Paint for both, and Time to Interactive for Total Blocking Time.

use crate::metrics::{Coefficients, EstimateContext, Metric, MetricName};
use crate::simulator::{SimulationResult, TimingKind};
use crate::types::Millis;

/// Tasks shorter than this never block input.
pub const BLOCKING_THRESHOLD_MS: Millis = 50.0;

/// Lower bound on Max Potential FID: one frame.
const MIN_POTENTIAL_FID_MS: Millis = 16.0;

fn cpu_tasks(result: &SimulationResult) -> impl Iterator<Item = (Millis, Millis)> + '_ {
    result
        .node_timings
        .values()
        .filter(|t| t.kind == TimingKind::Cpu)
        .map(|t| (t.start_ms, t.end_ms))
}

/// Sum over tasks of the part of each task beyond the blocking threshold,
/// counting only the portion between `start_ms` and `end_ms`.
pub fn sum_of_blocking_time(
    tasks: impl IntoIterator<Item = (Millis, Millis)>,
    start_ms: Millis,
    end_ms: Millis,
) -> Millis {
    let mut total = 0.0;
    for (task_start, task_end) in tasks {
        if task_end - task_start < BLOCKING_THRESHOLD_MS {
            continue;
        }
        if task_end < start_ms || task_start > end_ms {
            continue;
        }
        let clipped = task_end.min(end_ms) - task_start.max(start_ms);
        if clipped < BLOCKING_THRESHOLD_MS {
            continue;
        }
        total += clipped - BLOCKING_THRESHOLD_MS;
    }
    total
}

/// Total Blocking Time between First Contentful Paint and Time to Interactive.
#[derive(Clone, Copy, Debug, Default)]
pub struct TotalBlockingTime;

impl Metric for TotalBlockingTime {
    fn name(&self) -> MetricName {
        MetricName::TotalBlockingTime
    }

    fn coefficients(&self) -> Coefficients {
        Coefficients::new(0.0, 0.5, 0.5)
    }

    fn estimate(
        &self,
        result: &SimulationResult,
        context: &EstimateContext,
    ) -> Result<Millis, String> {
        let fcp = context
            .pass_value(context.first_contentful_paint.as_ref())
            .ok_or("requires a First Contentful Paint estimate")?;
        let tti = context
            .pass_value(context.interactive.as_ref())
            .ok_or("requires an Interactive estimate")?;
        Ok(sum_of_blocking_time(cpu_tasks(result), fcp, tti))
    }
}

/// Longest task that could delay the first input after First Contentful Paint.
#[derive(Clone, Copy, Debug, Default)]
pub struct MaxPotentialFid;

impl Metric for MaxPotentialFid {
    fn name(&self) -> MetricName {
        MetricName::MaxPotentialFid
    }

    fn coefficients(&self) -> Coefficients {
        Coefficients::new(0.0, 0.5, 0.5)
    }

    fn estimate(
        &self,
        result: &SimulationResult,
        context: &EstimateContext,
    ) -> Result<Millis, String> {
        let fcp = context
            .pass_value(context.first_contentful_paint.as_ref())
            .ok_or("requires a First Contentful Paint estimate")?;
        Ok(cpu_tasks(result)
            .filter(|&(_, end)| end > fcp)
            .map(|(start, end)| end - start)
            .fold(MIN_POTENTIAL_FID_MS, f64::max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::approx_eq;

    #[test]
    fn test_short_tasks_do_not_block() {
        let tasks = vec![(0.0, 49.0), (100.0, 150.0)];
        assert_eq!(sum_of_blocking_time(tasks, 0.0, 1000.0), 0.0);
    }

    #[test]
    fn test_blocking_beyond_threshold() {
        let tasks = vec![(0.0, 120.0), (200.0, 260.0)];
        assert!(approx_eq(sum_of_blocking_time(tasks, 0.0, 1000.0), 70.0 + 10.0, 1e-9));
    }

    #[test]
    fn test_blocking_is_clipped_to_window() {
        // 200ms task, only 100ms of it after FCP.
        let tasks = vec![(0.0, 200.0)];
        assert!(approx_eq(sum_of_blocking_time(tasks.clone(), 100.0, 1000.0), 50.0, 1e-9));
        // Fully outside the window.
        assert_eq!(sum_of_blocking_time(tasks, 300.0, 1000.0), 0.0);
    }
}
