//! Per-run connection pool.
//!
//! The pool owns every [`TcpConnection`] of a run and hands out
//! [`ConnectionHandle`]s (arena positions) instead of references, so a run's
//! connections are dropped with the pool and never leak into the next run.
//!
//! Acquisition order for an origin:
//! 1. an idle warm connection, largest congestion window first;
//! 2. a new cold connection, if both the per-origin and global caps allow;
//! 3. a new cold connection replacing the least-recently-used idle connection
//!    of another origin, if only the global cap is in the way;
//! 4. nothing: the request stays ready and is retried after the next completion.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::network::tcp::{ConnectionProfile, DownloadTiming, TcpConnection};
use crate::node::NetworkRequest;
use crate::types::Millis;

/// Index of a connection inside its pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionHandle(usize);

impl ConnectionHandle {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Connection budgets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolLimits {
    pub per_origin: usize,
    pub global: usize,
}

impl PoolLimits {
    pub fn new(per_origin: usize, global: usize) -> Self {
        Self {
            per_origin: per_origin.max(1),
            global: global.max(1),
        }
    }
}

/// Counters kept by the pool over a run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Cold connections created
    pub opened: u64,
    /// Acquisitions served by an idle warm connection
    pub reused: u64,
    /// Idle connections closed to stay under the global cap
    pub evicted: u64,
    /// Acquisitions that found no connection
    pub refused: u64,
}

/// A bounded set of connections per origin.
#[derive(Clone, Debug)]
pub struct ConnectionPool {
    limits: PoolLimits,
    profile: ConnectionProfile,
    /// Connection arena
    connections: Vec<TcpConnection>,
    /// Whether each arena entry is currently carrying a request
    in_use: Vec<bool>,
    /// Arena positions per origin, in creation order
    by_origin: BTreeMap<String, Vec<usize>>,
    stats: PoolStats,
}

impl ConnectionPool {
    /// Creates an empty pool.
    pub fn new(limits: PoolLimits, profile: ConnectionProfile) -> Self {
        Self {
            limits,
            profile,
            connections: Vec::new(),
            in_use: Vec::new(),
            by_origin: BTreeMap::new(),
            stats: PoolStats::default(),
        }
    }

    pub fn limits(&self) -> PoolLimits {
        self.limits
    }

    pub fn profile(&self) -> &ConnectionProfile {
        &self.profile
    }

    /// Opens `count` already-established connections to the request's origin,
    /// emulating a load that starts mid-session. Stops at the caps.
    pub fn prime_warm(&mut self, request: &NetworkRequest, count: usize) -> usize {
        let mut primed = 0;
        for _ in 0..count {
            if self.open_connections(&request.origin) >= self.limits.per_origin
                || self.connections.len() >= self.limits.global
            {
                break;
            }
            let index = self.open(request);
            self.connections[index].set_warm(true);
            primed += 1;
        }
        // Priming is setup, not traffic.
        self.stats.opened -= primed as u64;
        primed
    }

    /// Acquires a connection for `request` at simulated time `time`, or `None`
    /// if the caps are exhausted and every connection that could be reused or
    /// evicted is busy.
    pub fn acquire(&mut self, request: &NetworkRequest, time: Millis) -> Option<ConnectionHandle> {
        let origin = request.origin.as_str();

        if let Some(index) = self.best_idle(origin) {
            self.in_use[index] = true;
            if self.connections[index].is_warm() {
                self.stats.reused += 1;
            }
            let slot = self.connections[index].slot();
            tracing::trace!(origin, time, slot, "connection reused");
            return Some(ConnectionHandle(index));
        }

        if self.open_connections(origin) >= self.limits.per_origin {
            self.stats.refused += 1;
            return None;
        }

        let index = if self.connections.len() < self.limits.global {
            self.open(request)
        } else {
            match self.least_recently_used_idle() {
                Some(victim) => self.replace(victim, request),
                None => {
                    self.stats.refused += 1;
                    return None;
                }
            }
        };

        self.in_use[index] = true;
        tracing::trace!(origin, time, slot = self.connections[index].slot(), "connection opened");
        Some(ConnectionHandle(index))
    }

    /// Returns a connection to the pool after a transfer finished at `time`.
    pub fn release(&mut self, handle: ConnectionHandle, time: Millis, timing: &DownloadTiming) {
        let index = handle.0;
        self.connections[index].mark_used(time, timing);
        self.in_use[index] = false;
    }

    /// Returns the connection behind a handle.
    pub fn connection(&self, handle: ConnectionHandle) -> &TcpConnection {
        &self.connections[handle.0]
    }

    /// Returns the connection behind a handle, mutably.
    pub fn connection_mut(&mut self, handle: ConnectionHandle) -> &mut TcpConnection {
        &mut self.connections[handle.0]
    }

    /// Number of connections currently carrying a request.
    pub fn in_use(&self) -> usize {
        self.in_use.iter().filter(|&&busy| busy).count()
    }

    /// Number of open connections to `origin`.
    pub fn open_connections(&self, origin: &str) -> usize {
        self.by_origin.get(origin).map_or(0, Vec::len)
    }

    /// Number of open connections across all origins.
    pub fn total_connections(&self) -> usize {
        self.connections.len()
    }

    pub fn stats(&self) -> PoolStats {
        self.stats
    }

    fn best_idle(&self, origin: &str) -> Option<usize> {
        let indices = self.by_origin.get(origin)?;
        let mut best: Option<usize> = None;
        for &index in indices {
            if self.in_use[index] {
                continue;
            }
            let candidate = &self.connections[index];
            let better = match best {
                None => true,
                Some(current) => {
                    let current = &self.connections[current];
                    (candidate.is_warm(), candidate.congestion_window())
                        > (current.is_warm(), current.congestion_window())
                }
            };
            if better {
                best = Some(index);
            }
        }
        best
    }

    fn least_recently_used_idle(&self) -> Option<usize> {
        (0..self.connections.len())
            .filter(|&i| !self.in_use[i])
            .min_by(|&a, &b| {
                self.connections[a]
                    .last_used_ms()
                    .total_cmp(&self.connections[b].last_used_ms())
                    .then(a.cmp(&b))
            })
    }

    fn open(&mut self, request: &NetworkRequest) -> usize {
        let index = self.connections.len();
        let slot = self.open_connections(&request.origin);
        self.connections.push(TcpConnection::new(
            request.origin.clone(),
            slot,
            request.secure,
            request.protocol,
            &self.profile,
        ));
        self.in_use.push(false);
        self.by_origin
            .entry(request.origin.clone())
            .or_default()
            .push(index);
        self.stats.opened += 1;
        index
    }

    fn replace(&mut self, victim: usize, request: &NetworkRequest) -> usize {
        let old_origin = self.connections[victim].origin().to_string();
        if let Some(indices) = self.by_origin.get_mut(&old_origin) {
            indices.retain(|&i| i != victim);
            if indices.is_empty() {
                self.by_origin.remove(&old_origin);
            }
        }
        tracing::trace!(evicted = %old_origin, for_origin = %request.origin, "connection evicted");

        let slot = self.open_connections(&request.origin);
        self.connections[victim] = TcpConnection::new(
            request.origin.clone(),
            slot,
            request.secure,
            request.protocol,
            &self.profile,
        );
        self.by_origin
            .entry(request.origin.clone())
            .or_default()
            .push(victim);
        self.stats.opened += 1;
        self.stats.evicted += 1;
        victim
    }
}
