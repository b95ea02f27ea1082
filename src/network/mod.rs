//! Network model: calibration, DNS, connections and pooling.
//!
//! - [`analyzer`] estimates RTT, throughput and server time from an observed load.
//! - [`dns`] charges resolution once per origin per run.
//! - [`tcp`] models a single connection's handshake and slow-start transfer.
//! - [`pool`] owns a run's connections and enforces connection budgets.

pub mod analyzer;
pub mod dns;
pub mod pool;
pub mod tcp;

pub use analyzer::{
    AnalysisError, AnalysisResult, Estimate, EstimateSource, Fallback, NetworkAnalysis,
    NetworkAnalyzer,
};
pub use dns::DnsCache;
pub use pool::{ConnectionHandle, ConnectionPool, PoolLimits, PoolStats};
pub use tcp::{
    maximum_congestion_window, maximum_saturated_connections, slow_start_transfer,
    ConnectionProfile, DownloadTiming, LinkConditions, SlowStartTransfer, TcpConnection,
};
