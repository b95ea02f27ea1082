//! # Lantern
//!
//! A deterministic discrete-event simulator that estimates page-load metrics
//! (first contentful paint, time to interactive, total blocking time, ...) by
//! replaying a dependency graph of network requests and main-thread CPU tasks
//! under a modeled network and CPU, without performing the load.
//!
//! ## Design Principles
//!
//! - **Graph-Driven**: a validated, immutable [`Graph`] of [`SimulationNode`]s
//!   is the single input describing the page.
//! - **Modeled Concurrency**: parallel fetches and multiple connections are
//!   simulated data. A run is single-threaded and only advances a simulated
//!   clock.
//! - **Deterministic**: identical graph and settings always produce
//!   byte-identical [`SimulationResult`]s. Every run owns a fresh DNS cache and
//!   connection pool.
//! - **Calibrated**: a [`NetworkAnalyzer`] derives per-origin RTT, server time
//!   and throughput from an observed load.
//!
//! ## Features
//!
//! - `parallel` - Run the optimistic and pessimistic passes of a metric
//!   concurrently using rayon
//!
//! ## Quick Start
//!
//! ```rust
//! use lantern::{GraphBuilder, NetworkRequest, Settings, SimulationNode, Simulator};
//!
//! let graph = GraphBuilder::new()
//!     .add(SimulationNode::network(1, NetworkRequest::new("https://example.com", 10_000)))
//!     .add(SimulationNode::cpu(2, 50.0).depends_on(1))
//!     .build()
//!     .unwrap();
//!
//! let simulator = Simulator::new(Settings::mobile_slow_4g()).unwrap();
//! let result = simulator.simulate(&graph).unwrap();
//!
//! assert_eq!(result.critical_path, vec![1, 2]);
//! println!("Total: {:.1} ms", result.total_time_ms);
//! ```
//!
//! ## Estimating a Metric
//!
//! ```rust
//! use lantern::metrics::{EstimateContext, FirstContentfulPaint, Metric};
//! use lantern::{GraphBuilder, NetworkRequest, Settings, SimulationNode, Simulator};
//!
//! let graph = GraphBuilder::new()
//!     .add(SimulationNode::network(1, NetworkRequest::new("https://example.com", 10_000)))
//!     .build()
//!     .unwrap();
//!
//! let simulator = Simulator::new(Settings::desktop_dense_4g()).unwrap();
//! let outcome = FirstContentfulPaint
//!     .compute(&simulator, &graph, &graph, &EstimateContext::new())
//!     .unwrap();
//! assert!(outcome.is_estimated());
//! ```
//!
//! ## Configuration-Driven Setup
//!
//! ```rust,ignore
//! use lantern::config::Settings;
//!
//! let settings = Settings::from_file("throttling.yaml")?;
//! let simulator = lantern::Simulator::new(settings)?;
//! ```

pub mod types;
pub mod record;
pub mod node;
pub mod graph;
pub mod config;
pub mod network;
pub mod simulator;
pub mod metrics;
pub mod stats;

// Re-export commonly used types
pub use types::{Millis, NodeId, NodeIndex, Throughput};
pub use record::{NetworkRecord, Protocol, ResourceTiming, ResourceType};
pub use node::{CpuTask, NetworkRequest, NodeKind, Priority, SimulationNode};
pub use graph::{Graph, GraphBuilder, GraphError, GraphResult};
pub use config::{Settings, SettingsBuilder, SettingsError, SettingsResult, ThrottlingMethod};
pub use network::{
    AnalysisError, ConnectionPool, DnsCache, NetworkAnalysis, NetworkAnalyzer, PoolLimits,
    TcpConnection,
};
pub use simulator::{NodeTiming, RunResult, SimulationError, SimulationResult, Simulator};
pub use metrics::{Metric, MetricEstimate, MetricName, MetricOutcome};
pub use stats::{RunStats, Timer};

/// Initialize the tracing subscriber for logging.
///
/// Call this at the start of your program to enable logging.
///
/// # Example
///
/// ```rust,ignore
/// lantern::init_logging("info");
/// ```
pub fn init_logging(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
