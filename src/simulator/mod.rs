//! Discrete-event page-load simulator.
//!
//! A [`Simulator`] holds the modeled network and CPU; each call to
//! [`Simulator::simulate`] creates a `SimulationRun` with its own DNS cache,
//! connection pool and per-node side table, so runs never influence each
//! other and the graph is never mutated.
//!
//! A run repeats three steps until every node has finished:
//!
//! 1. start every ready node whose resource is free (the single CPU lane, or
//!    a connection from the pool), computing its finish time from the cost
//!    models;
//! 2. advance the clock to the earliest in-flight finish time;
//! 3. complete every node finishing at that time, releasing its resource and
//!    marking dependents ready once all their dependencies are done.
//!
//! Ready nodes are tried in (priority rank, graph order) order, so identical
//! inputs always produce identical results.

pub mod queue;
pub mod result;

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use crate::config::{
    Settings, SettingsResult, ThrottlingMethod, DEFAULT_RTT_MS, DEFAULT_THROUGHPUT_BPS,
    DNS_RTT_MULTIPLIER,
};
use crate::graph::Graph;
use crate::network::analyzer::NetworkAnalysis;
use crate::network::dns::DnsCache;
use crate::network::pool::{ConnectionHandle, ConnectionPool, PoolLimits};
use crate::network::tcp::{
    maximum_saturated_connections, ConnectionProfile, DownloadTiming, LinkConditions,
};
use crate::node::{CpuTask, NetworkRequest, NodeKind};
use crate::stats::{RunStats, Timer};
use crate::types::{Millis, NodeId, NodeIndex, Throughput};

use queue::InFlightQueue;
pub use result::{ConnectionTiming, NodeTiming, SimulationResult, TimingKind};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Errors raised while running a simulation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimulationError {
    /// Nothing is in flight but some nodes never started. Only possible with
    /// a caller-supplied pool whose budgets cannot serve the graph.
    #[error("simulation stalled at {time_ms} ms with {pending} unfinished nodes")]
    Stalled { time_ms: Millis, pending: usize },
}

/// Result type for simulation runs.
pub type RunResult<T> = Result<T, SimulationError>;

/// Modeled network and CPU, ready to simulate graphs.
///
/// A simulator is immutable and `Send + Sync`; one instance can run any
/// number of graphs, concurrently if desired.
#[derive(Clone, Debug)]
pub struct Simulator {
    settings: Settings,
    rtt_ms: Millis,
    throughput: Throughput,
    cpu_multiplier: f64,
    layout_multiplier: f64,
    dns_lookup_ms: Millis,
    additional_rtt_by_origin: BTreeMap<String, Millis>,
    server_response_time_by_origin: BTreeMap<String, Millis>,
    limits: PoolLimits,
    profile: ConnectionProfile,
}

impl Simulator {
    /// Creates a simulator from settings alone.
    ///
    /// Under `provided` and `devtools` there is no observed analysis to
    /// replay, so the default RTT and throughput are used.
    pub fn new(settings: Settings) -> SettingsResult<Self> {
        settings.validate()?;
        let (rtt_ms, throughput) = match settings.throttling_method {
            ThrottlingMethod::Simulate => (
                settings.rtt_ms.unwrap_or(DEFAULT_RTT_MS),
                settings
                    .throughput()
                    .unwrap_or_else(|| Throughput::from_bits_per_second(DEFAULT_THROUGHPUT_BPS)),
            ),
            ThrottlingMethod::Provided | ThrottlingMethod::Devtools => (
                DEFAULT_RTT_MS,
                Throughput::from_bits_per_second(DEFAULT_THROUGHPUT_BPS),
            ),
        };
        Ok(Self::assemble(settings, rtt_ms, throughput, BTreeMap::new(), BTreeMap::new()))
    }

    /// Creates a simulator calibrated from an observed load.
    ///
    /// Per-origin additional RTT and server response times always come from
    /// the analysis. Base RTT and throughput come from the settings under
    /// `simulate` and from the analysis otherwise.
    pub fn from_analysis(settings: Settings, analysis: &NetworkAnalysis) -> SettingsResult<Self> {
        settings.validate()?;
        let (rtt_ms, throughput) = match settings.throttling_method {
            ThrottlingMethod::Simulate => (
                settings.rtt_ms.unwrap_or(DEFAULT_RTT_MS),
                settings
                    .throughput()
                    .unwrap_or_else(|| Throughput::from_bits_per_second(DEFAULT_THROUGHPUT_BPS)),
            ),
            ThrottlingMethod::Provided | ThrottlingMethod::Devtools => {
                (analysis.rtt, analysis.throughput)
            }
        };
        Ok(Self::assemble(
            settings,
            rtt_ms,
            throughput,
            analysis.additional_rtt_by_origin.clone(),
            analysis.server_response_time_by_origin.clone(),
        ))
    }

    fn assemble(
        settings: Settings,
        rtt_ms: Millis,
        throughput: Throughput,
        additional_rtt_by_origin: BTreeMap<String, Millis>,
        server_response_time_by_origin: BTreeMap<String, Millis>,
    ) -> Self {
        let global = match settings.throttling_method {
            ThrottlingMethod::Simulate => settings
                .global_connections
                .min(maximum_saturated_connections(rtt_ms, throughput)),
            ThrottlingMethod::Provided | ThrottlingMethod::Devtools => settings.global_connections,
        };
        let limits = PoolLimits::new(settings.connections_per_origin, global);
        let profile = ConnectionProfile {
            tls_round_trips: settings.tls_round_trips,
            initial_congestion_window: settings.initial_congestion_window,
        };
        let dns_lookup_ms = settings
            .dns_lookup_ms
            .unwrap_or(rtt_ms * DNS_RTT_MULTIPLIER);

        tracing::debug!(
            rtt_ms,
            throughput_bps = throughput.bits_per_second(),
            per_origin = limits.per_origin,
            global = limits.global,
            dns_lookup_ms,
            "simulator configured"
        );

        Self {
            cpu_multiplier: settings.effective_cpu_multiplier(),
            layout_multiplier: settings.effective_layout_multiplier(),
            settings,
            rtt_ms,
            throughput,
            dns_lookup_ms,
            additional_rtt_by_origin,
            server_response_time_by_origin,
            limits,
            profile,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Base round-trip time of the modeled link.
    pub fn rtt_ms(&self) -> Millis {
        self.rtt_ms
    }

    pub fn throughput(&self) -> Throughput {
        self.throughput
    }

    /// Connection budgets each run's pool is created with.
    pub fn limits(&self) -> PoolLimits {
        self.limits
    }

    pub fn dns_lookup_ms(&self) -> Millis {
        self.dns_lookup_ms
    }

    /// Creates an empty pool with this simulator's budgets, for callers that
    /// want to prime warm connections before [`Simulator::simulate_with_pool`].
    pub fn create_pool(&self) -> ConnectionPool {
        ConnectionPool::new(self.limits, self.profile)
    }

    /// Simulates `graph` with a fresh DNS cache and connection pool.
    pub fn simulate(&self, graph: &Graph) -> RunResult<SimulationResult> {
        SimulationRun::new(self, graph, self.create_pool(), None).execute()
    }

    /// Simulates `graph` and tags the result with `label`.
    pub fn simulate_labeled(
        &self,
        graph: &Graph,
        label: impl Into<String>,
    ) -> RunResult<SimulationResult> {
        SimulationRun::new(self, graph, self.create_pool(), Some(label.into())).execute()
    }

    /// Simulates `graph` on a caller-supplied pool. The DNS cache is still fresh.
    pub fn simulate_with_pool(
        &self,
        graph: &Graph,
        pool: ConnectionPool,
    ) -> RunResult<SimulationResult> {
        SimulationRun::new(self, graph, pool, None).execute()
    }

    fn link_to(&self, origin: &str) -> LinkConditions {
        let additional = self.additional_rtt_by_origin.get(origin).copied().unwrap_or(0.0);
        let server = self
            .server_response_time_by_origin
            .get(origin)
            .copied()
            .unwrap_or(self.settings.server_response_time_ms);
        LinkConditions {
            rtt_ms: self.rtt_ms + additional,
            throughput: self.throughput,
            server_response_time_ms: server,
        }
    }

    fn cpu_cost(&self, task: &CpuTask) -> Millis {
        let multiplier = if task.performs_layout {
            self.layout_multiplier
        } else {
            self.cpu_multiplier
        };
        (task.duration_ms * multiplier).min(self.settings.max_cpu_task_ms)
    }
}

/// Cost of a request that never touches a connection.
fn connectionless_cost(request: &NetworkRequest) -> Millis {
    let megabytes = request.resource_size as f64 / BYTES_PER_MB;
    if request.from_disk_cache {
        8.0 + 20.0 * megabytes
    } else {
        2.0 + 10.0 * megabytes
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Status {
    Pending,
    Ready,
    InFlight,
    Done,
}

/// Run-scoped state of one node, indexed by graph position.
#[derive(Clone, Debug)]
struct NodeState {
    status: Status,
    unfinished_dependencies: usize,
    ready_ms: Millis,
    start_ms: Millis,
    end_ms: Millis,
    /// Dependency whose completion made this node ready
    made_ready_by: Option<NodeIndex>,
    /// Node whose completion freed the resource this node queued for
    held_by: Option<NodeIndex>,
    waited: bool,
    transfer: Option<(ConnectionHandle, DownloadTiming)>,
    connection: Option<ConnectionTiming>,
}

struct SimulationRun<'a> {
    simulator: &'a Simulator,
    graph: &'a Graph,
    label: Option<String>,
    dns: DnsCache,
    pool: ConnectionPool,
    states: Vec<NodeState>,
    /// Ready nodes keyed by (priority rank, graph order)
    ready: BTreeSet<(u8, NodeIndex)>,
    in_flight: InFlightQueue,
    cpu_busy: bool,
    /// Nodes that freed the CPU lane or a connection at the current step
    cpu_freed_by: Option<NodeIndex>,
    connection_freed_by: Option<NodeIndex>,
    now: Millis,
    completed: usize,
    time_steps: u64,
    events_processed: u64,
    resource_waits: u64,
}

impl<'a> SimulationRun<'a> {
    fn new(
        simulator: &'a Simulator,
        graph: &'a Graph,
        pool: ConnectionPool,
        label: Option<String>,
    ) -> Self {
        let states = (0..graph.len())
            .map(|i| NodeState {
                status: Status::Pending,
                unfinished_dependencies: graph.dependency_indices(i).len(),
                ready_ms: 0.0,
                start_ms: 0.0,
                end_ms: 0.0,
                made_ready_by: None,
                held_by: None,
                waited: false,
                transfer: None,
                connection: None,
            })
            .collect();

        Self {
            simulator,
            graph,
            label,
            dns: DnsCache::new(simulator.dns_lookup_ms),
            pool,
            states,
            ready: BTreeSet::new(),
            in_flight: InFlightQueue::new(),
            cpu_busy: false,
            cpu_freed_by: None,
            connection_freed_by: None,
            now: 0.0,
            completed: 0,
            time_steps: 0,
            events_processed: 0,
            resource_waits: 0,
        }
    }

    fn execute(mut self) -> RunResult<SimulationResult> {
        let timer = Timer::start();
        let roots: Vec<NodeIndex> = self.graph.root_indices().collect();
        for index in roots {
            self.mark_ready(index, None);
        }

        while self.completed < self.graph.len() {
            self.start_ready_nodes();

            let Some(next) = self.in_flight.next_finish() else {
                return Err(SimulationError::Stalled {
                    time_ms: self.now,
                    pending: self.graph.len() - self.completed,
                });
            };
            self.now = next;
            self.time_steps += 1;
            self.cpu_freed_by = None;
            self.connection_freed_by = None;

            for index in self.in_flight.pop_finished_at(next) {
                self.complete(index);
            }
        }

        let result = self.finish();
        tracing::debug!(
            label = result.label.as_deref().unwrap_or(""),
            nodes = result.node_timings.len(),
            total_time_ms = result.total_time_ms,
            critical_path = result.critical_path.len(),
            wall_ms = timer.elapsed_ms(),
            "simulation complete"
        );
        Ok(result)
    }

    fn mark_ready(&mut self, index: NodeIndex, by: Option<NodeIndex>) {
        let state = &mut self.states[index];
        state.status = Status::Ready;
        state.ready_ms = self.now;
        state.made_ready_by = by;
        let rank = self.graph.node_at(index).priority_rank();
        self.ready.insert((rank, index));
    }

    fn start_ready_nodes(&mut self) {
        let candidates: Vec<(u8, NodeIndex)> = self.ready.iter().copied().collect();
        for key in candidates {
            let index = key.1;
            let graph = self.graph;
            let started = match &graph.node_at(index).kind {
                NodeKind::Cpu(task) => self.try_start_cpu(index, task),
                NodeKind::Network(request) => self.try_start_network(index, request),
            };
            if started {
                self.ready.remove(&key);
            } else if !self.states[index].waited {
                self.states[index].waited = true;
                self.resource_waits += 1;
            }
        }
    }

    fn try_start_cpu(&mut self, index: NodeIndex, task: &CpuTask) -> bool {
        if self.cpu_busy {
            return false;
        }
        self.cpu_busy = true;
        self.note_blocker(index, self.cpu_freed_by);
        let cost = self.simulator.cpu_cost(task);
        self.begin(index, cost);
        true
    }

    fn try_start_network(&mut self, index: NodeIndex, request: &NetworkRequest) -> bool {
        if !request.needs_connection() {
            self.begin(index, connectionless_cost(request));
            return true;
        }

        let Some(handle) = self.pool.acquire(request, self.now) else {
            return false;
        };
        self.note_blocker(index, self.connection_freed_by);
        let connection = self.pool.connection(handle);
        let dns_ms = if connection.is_warm() {
            0.0
        } else {
            self.dns.lookup(&request.origin)
        };
        let link = self.simulator.link_to(&request.origin);
        let timing =
            connection.simulate_download(request.transfer_size, dns_ms, &link, self.pool.profile());

        let state = &mut self.states[index];
        state.connection = Some(ConnectionTiming::from(&timing));
        state.transfer = Some((handle, timing));
        self.begin(index, timing.total_ms);
        true
    }

    /// Records which completion let a queued node start.
    fn note_blocker(&mut self, index: NodeIndex, freed_by: Option<NodeIndex>) {
        let state = &mut self.states[index];
        if self.now > state.ready_ms {
            state.held_by = freed_by;
        }
    }

    fn begin(&mut self, index: NodeIndex, cost: Millis) {
        let finish = self.now + cost;
        let state = &mut self.states[index];
        state.status = Status::InFlight;
        state.start_ms = self.now;
        state.end_ms = finish;
        self.in_flight.push(finish, index);
        self.events_processed += 1;
        tracing::trace!(
            node = self.graph.node_at(index).id,
            start_ms = self.now,
            end_ms = finish,
            "node started"
        );
    }

    fn complete(&mut self, index: NodeIndex) {
        let state = &mut self.states[index];
        state.status = Status::Done;
        let transfer = state.transfer.take();
        self.completed += 1;
        self.events_processed += 1;

        match transfer {
            Some((handle, timing)) => {
                self.pool.release(handle, self.now, &timing);
                self.connection_freed_by = Some(index);
            }
            None => {
                if self.graph.node_at(index).is_cpu() {
                    self.cpu_busy = false;
                    self.cpu_freed_by = Some(index);
                }
            }
        }
        tracing::trace!(node = self.graph.node_at(index).id, end_ms = self.now, "node finished");

        let graph = self.graph;
        for &dependent in graph.dependent_indices(index) {
            let state = &mut self.states[dependent];
            state.unfinished_dependencies -= 1;
            if state.unfinished_dependencies == 0 && state.status == Status::Pending {
                self.mark_ready(dependent, Some(index));
            }
        }
    }

    fn finish(self) -> SimulationResult {
        let mut node_timings = BTreeMap::new();
        let mut stats = RunStats::new();
        let mut last: Option<NodeIndex> = None;

        for (index, state) in self.states.iter().enumerate() {
            let node = self.graph.node_at(index);
            let kind = if node.is_cpu() {
                stats.cpu_nodes += 1;
                TimingKind::Cpu
            } else {
                stats.network_nodes += 1;
                TimingKind::Network
            };
            node_timings.insert(
                node.id,
                NodeTiming {
                    start_ms: state.start_ms,
                    end_ms: state.end_ms,
                    queued_ms: state.start_ms - state.ready_ms,
                    kind,
                    connection: state.connection,
                },
            );
            // Strictly later wins, so ties resolve to graph order.
            if last.map_or(true, |l| state.end_ms > self.states[l].end_ms) {
                last = Some(index);
            }
        }

        // A node that queued for a resource started when its blocker
        // finished, so the path follows the blocker instead.
        let mut critical_path: Vec<NodeId> = Vec::new();
        let mut cursor = last;
        while let Some(index) = cursor {
            critical_path.push(self.graph.node_at(index).id);
            let state = &self.states[index];
            cursor = state.held_by.or(state.made_ready_by);
        }
        critical_path.reverse();

        let total_time_ms = last.map_or(0.0, |l| self.states[l].end_ms);
        let pool_stats = self.pool.stats();
        stats.nodes_simulated = self.states.len();
        stats.time_steps = self.time_steps;
        stats.events_processed = self.events_processed;
        stats.peak_in_flight = self.in_flight.peak();
        stats.connections_opened = pool_stats.opened;
        stats.connections_reused = pool_stats.reused;
        stats.connections_evicted = pool_stats.evicted;
        stats.dns_lookups_charged = self.dns.lookups_charged();
        stats.resource_waits = self.resource_waits;

        SimulationResult {
            label: self.label,
            total_time_ms,
            node_timings,
            critical_path,
            stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SettingsBuilder;
    use crate::graph::GraphBuilder;
    use crate::node::{Priority, SimulationNode};
    use crate::types::approx_eq;

    fn unlimited_settings(rtt: Millis) -> Settings {
        SettingsBuilder::new()
            .rtt_ms(rtt)
            .throughput_bps(f64::MAX)
            .dns_lookup_ms(0.0)
            .build()
            .unwrap()
    }

    #[test]
    fn test_single_cpu_node() {
        let settings = SettingsBuilder::new().cpu_slowdown_multiplier(4.0).build().unwrap();
        let simulator = Simulator::new(settings).unwrap();
        let graph = GraphBuilder::new().add(SimulationNode::cpu(1, 25.0)).build().unwrap();

        let result = simulator.simulate(&graph).unwrap();
        assert_eq!(result.total_time_ms, 100.0);
        assert_eq!(result.critical_path, vec![1]);
    }

    #[test]
    fn test_cpu_lane_is_serial() {
        let simulator = Simulator::new(Settings::default()).unwrap();
        let graph = GraphBuilder::new()
            .add(SimulationNode::cpu(1, 10.0))
            .add(SimulationNode::cpu(2, 20.0))
            .build()
            .unwrap();

        let result = simulator.simulate(&graph).unwrap();
        let second = result.timing(2).unwrap();
        assert_eq!(second.start_ms, 10.0);
        assert_eq!(second.queued_ms, 10.0);
        assert_eq!(result.total_time_ms, 30.0);
        assert_eq!(result.stats.resource_waits, 1);
        // Node 2 has no dependencies but waited for node 1 to free the lane.
        assert_eq!(result.critical_path, vec![1, 2]);
    }

    #[test]
    fn test_critical_path_follows_connection_blocker() {
        let settings = SettingsBuilder::new()
            .connections_per_origin(1)
            .rtt_ms(10.0)
            .throughput_bps(f64::MAX)
            .dns_lookup_ms(0.0)
            .build()
            .unwrap();
        let simulator = Simulator::new(settings).unwrap();
        let graph = GraphBuilder::new()
            .add(SimulationNode::cpu(1, 1.0))
            .add(SimulationNode::network(2, NetworkRequest::new("http://a.com", 1000)))
            .add(
                SimulationNode::network(3, NetworkRequest::new("http://a.com", 1000))
                    .depends_on(1),
            )
            .build()
            .unwrap();

        let result = simulator.simulate(&graph).unwrap();
        // Node 3 became ready at 1 ms but the only connection was busy until 20 ms.
        let third = result.timing(3).unwrap();
        assert!(approx_eq(third.start_ms, 20.0, 1e-9));
        assert!(approx_eq(result.total_time_ms, 30.0, 1e-9));
        assert_eq!(result.critical_path, vec![2, 3]);
    }

    #[test]
    fn test_layout_multiplier_and_cap() {
        let settings = SettingsBuilder::new()
            .cpu_slowdown_multiplier(4.0)
            .max_cpu_task_ms(300.0)
            .build()
            .unwrap();
        let simulator = Simulator::new(settings).unwrap();
        let graph = GraphBuilder::new()
            .add(SimulationNode::cpu_task(1, CpuTask::new(100.0).with_layout()))
            .add(SimulationNode::cpu(2, 100.0).depends_on(1))
            .build()
            .unwrap();

        let result = simulator.simulate(&graph).unwrap();
        assert_eq!(result.timing(1).unwrap().duration_ms(), 200.0);
        assert_eq!(result.timing(2).unwrap().duration_ms(), 300.0);
    }

    #[test]
    fn test_connectionless_requests() {
        let simulator = Simulator::new(Settings::default()).unwrap();
        let graph = GraphBuilder::new()
            .add(SimulationNode::network(
                1,
                NetworkRequest::new("https://a.com", 0)
                    .with_resource_size(1024 * 1024)
                    .from_disk_cache(),
            ))
            .add(SimulationNode::network(
                2,
                NetworkRequest::new("data:", 0).with_resource_size(512 * 1024).non_network(),
            ))
            .build()
            .unwrap();

        let result = simulator.simulate(&graph).unwrap();
        assert_eq!(result.timing(1).unwrap().duration_ms(), 28.0);
        assert_eq!(result.timing(2).unwrap().duration_ms(), 7.0);
        assert!(result.timing(1).unwrap().connection.is_none());
        assert_eq!(result.stats.connections_opened, 0);
    }

    #[test]
    fn test_priority_breaks_ties() {
        let settings = SettingsBuilder::new()
            .connections_per_origin(1)
            .rtt_ms(10.0)
            .throughput_bps(f64::MAX)
            .dns_lookup_ms(0.0)
            .build()
            .unwrap();
        let simulator = Simulator::new(settings).unwrap();
        let graph = GraphBuilder::new()
            .add(SimulationNode::network(
                1,
                NetworkRequest::new("http://a.com", 1000).with_priority(Priority::Low),
            ))
            .add(SimulationNode::network(
                2,
                NetworkRequest::new("http://a.com", 1000).with_priority(Priority::VeryHigh),
            ))
            .build()
            .unwrap();

        let result = simulator.simulate(&graph).unwrap();
        assert_eq!(result.timing(2).unwrap().start_ms, 0.0);
        assert!(result.timing(1).unwrap().start_ms > 0.0);
    }

    #[test]
    fn test_dns_charged_once_per_origin() {
        let settings = SettingsBuilder::new()
            .rtt_ms(20.0)
            .throughput_bps(f64::MAX)
            .dns_lookup_ms(15.0)
            .build()
            .unwrap();
        let simulator = Simulator::new(settings).unwrap();
        let graph = GraphBuilder::new()
            .add(SimulationNode::network(1, NetworkRequest::new("http://a.com", 1000)))
            .add(SimulationNode::network(2, NetworkRequest::new("http://a.com", 1000)))
            .build()
            .unwrap();

        let result = simulator.simulate(&graph).unwrap();
        let first = result.timing(1).unwrap().connection.unwrap();
        let second = result.timing(2).unwrap().connection.unwrap();
        assert_eq!(first.dns_ms, 15.0);
        assert_eq!(second.dns_ms, 0.0);
        assert_eq!(result.stats.dns_lookups_charged, 1);
    }

    #[test]
    fn test_critical_path_follows_ready_dependency() {
        let simulator = Simulator::new(unlimited_settings(10.0)).unwrap();
        let graph = GraphBuilder::new()
            .add(SimulationNode::cpu(1, 5.0))
            .add(SimulationNode::network(2, NetworkRequest::new("http://a.com", 1000)))
            .add(SimulationNode::cpu(3, 1.0).depends_on_all([1, 2]))
            .build()
            .unwrap();

        let result = simulator.simulate(&graph).unwrap();
        // The network request (2 RTTs) finishes after the 5ms task.
        assert!(approx_eq(result.timing(2).unwrap().end_ms, 20.0, 1e-9));
        assert_eq!(result.critical_path, vec![2, 3]);
        assert!(approx_eq(result.total_time_ms, 21.0, 1e-9));
    }

    #[test]
    fn test_stalled_pool() {
        let simulator = Simulator::new(Settings::default()).unwrap();
        let graph = GraphBuilder::new()
            .add(SimulationNode::network(1, NetworkRequest::new("http://a.com", 1000)))
            .build()
            .unwrap();

        // A busy connection to another origin fills the only global slot.
        let mut pool = ConnectionPool::new(PoolLimits::new(1, 1), ConnectionProfile::default());
        pool.acquire(&NetworkRequest::new("http://b.com", 1), 0.0).unwrap();

        let err = simulator.simulate_with_pool(&graph, pool).unwrap_err();
        assert_eq!(err, SimulationError::Stalled { time_ms: 0.0, pending: 1 });
    }

    #[test]
    fn test_empty_graph() {
        let simulator = Simulator::new(Settings::default()).unwrap();
        let graph = GraphBuilder::new().build().unwrap();
        let result = simulator.simulate(&graph).unwrap();
        assert_eq!(result.total_time_ms, 0.0);
        assert!(result.critical_path.is_empty());
    }

    #[test]
    fn test_saturated_connections_cap_global_limit() {
        // 100ms RTT at 2 segments per round trip worth of bandwidth.
        let settings = SettingsBuilder::new()
            .rtt_ms(100.0)
            .throughput_bps(2.0 * 1460.0 * 8.0 * 10.0)
            .build()
            .unwrap();
        let simulator = Simulator::new(settings).unwrap();
        assert_eq!(simulator.limits().global, 2);
    }
}
