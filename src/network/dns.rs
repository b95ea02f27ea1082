//! Per-run DNS cache.
//!
//! The first lookup of an origin in a run pays the resolution cost; every later
//! lookup of the same origin is free. A cache belongs to exactly one run: the
//! simulator creates a fresh one for every simulation, so results never depend
//! on what a previous run resolved.

use std::collections::HashSet;

use crate::types::Millis;

/// Tracks which origins have already paid DNS resolution in the current run.
#[derive(Clone, Debug)]
pub struct DnsCache {
    /// Cost of resolving an origin that has not been seen yet
    cost_ms: Millis,
    /// Origins resolved so far in this run
    resolved: HashSet<String>,
    /// Number of lookups that were charged the full cost
    lookups_charged: u64,
}

impl DnsCache {
    /// Creates an empty cache charging `cost_ms` per new origin.
    pub fn new(cost_ms: Millis) -> Self {
        Self {
            cost_ms,
            resolved: HashSet::new(),
            lookups_charged: 0,
        }
    }

    /// Returns the resolution time for `origin`: the full cost the first time,
    /// zero afterwards.
    pub fn lookup(&mut self, origin: &str) -> Millis {
        if self.resolved.contains(origin) {
            return 0.0;
        }
        self.resolved.insert(origin.to_string());
        self.lookups_charged += 1;
        tracing::trace!(origin, cost_ms = self.cost_ms, "dns resolution charged");
        self.cost_ms
    }

    /// Returns true if `origin` has been resolved in this run.
    pub fn is_resolved(&self, origin: &str) -> bool {
        self.resolved.contains(origin)
    }

    /// Forgets every resolved origin.
    pub fn clear(&mut self) {
        self.resolved.clear();
        self.lookups_charged = 0;
    }

    /// Returns how many lookups paid the full cost.
    pub fn lookups_charged(&self) -> u64 {
        self.lookups_charged
    }

    /// Returns the per-origin resolution cost.
    pub fn cost_ms(&self) -> Millis {
        self.cost_ms
    }
}
