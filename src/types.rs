//! Core type definitions for the simulator.
//!
//! This module defines the fundamental types used throughout the simulation engine.

use serde::{Deserialize, Serialize};

/// Simulated time in milliseconds since the start of a run.
///
/// Network and CPU cost models produce fractional milliseconds (half round
/// trips, throttled task durations), so simulated time is a float. All
/// arithmetic on it is deterministic for identical inputs.
pub type Millis = f64;

/// Unique identifier for a node in the dependency graph.
///
/// Each node represents either a network request or a main-thread CPU task.
pub type NodeId = u64;

/// Position of a node in the graph arena.
///
/// Graph order is insertion order and doubles as the deterministic tie-break
/// whenever two nodes compete for the same resource.
pub type NodeIndex = usize;

/// Size of a TCP segment in bytes.
pub const TCP_SEGMENT_SIZE: f64 = 1460.0;

/// Link throughput, stored in bits per second.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Throughput(f64);

impl Throughput {
    /// Creates a throughput from bits per second.
    pub fn from_bits_per_second(bps: f64) -> Self {
        Self(bps)
    }

    /// Creates a throughput from kilobits (1024 bits) per second.
    pub fn from_kbps(kbps: f64) -> Self {
        Self(kbps * 1024.0)
    }

    /// Creates a throughput from bytes per millisecond.
    pub fn from_bytes_per_ms(bytes_per_ms: f64) -> Self {
        Self(bytes_per_ms * 8.0 * 1000.0)
    }

    /// An unbounded link; transfers are limited only by round trips.
    pub fn unlimited() -> Self {
        Self(f64::INFINITY)
    }

    /// Returns the throughput in bits per second.
    pub fn bits_per_second(&self) -> f64 {
        self.0
    }

    /// Returns the throughput in bytes per millisecond.
    pub fn bytes_per_ms(&self) -> f64 {
        self.0 / 8.0 / 1000.0
    }

    /// Returns true if the link has no bandwidth ceiling.
    pub fn is_unlimited(&self) -> bool {
        self.0.is_infinite()
    }
}

/// Approximate float comparison used by tests and invariant checks.
pub fn approx_eq(a: f64, b: f64, tolerance: f64) -> bool {
    (a - b).abs() <= tolerance
}
