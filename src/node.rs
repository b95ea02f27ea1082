//! Simulation node definitions.
//!
//! Nodes are the units of work in the dependency graph. A node is either a
//! network request or a main-thread CPU task; the kind is a tagged union so the
//! simulator dispatches on it with a `match` rather than through a trait object.
//! Nodes are immutable once they are part of a [`Graph`](crate::graph::Graph);
//! all per-run state lives in the simulator's side table.

use serde::{Deserialize, Serialize};

use crate::record::{NetworkRecord, Protocol, ResourceType};
use crate::types::{Millis, NodeId};

/// Scheduling priority of a network request.
///
/// When connections are scarce, ready requests start in priority order and
/// then in graph order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum Priority {
    /// Render-blocking resources (the main document, blocking CSS).
    VeryHigh,
    High,
    #[default]
    Medium,
    Low,
    VeryLow,
}

impl Priority {
    /// Sort rank; lower starts first.
    pub fn rank(&self) -> u8 {
        *self as u8
    }

    /// Returns true for priorities the browser treats as render-blocking.
    pub fn is_render_blocking(&self) -> bool {
        matches!(self, Priority::VeryHigh | Priority::High)
    }
}

/// Everything the simulator needs to know about a network request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NetworkRequest {
    /// Security origin the request is sent to; connections are pooled per origin.
    pub origin: String,
    /// Bytes to transfer over the wire.
    pub transfer_size: u64,
    /// Decoded size, used for cache and non-network cost estimates.
    #[serde(default)]
    pub resource_size: u64,
    #[serde(default)]
    pub protocol: Protocol,
    /// Whether a TLS handshake is needed on a fresh connection.
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub resource_type: ResourceType,
    #[serde(default)]
    pub is_redirect: bool,
    #[serde(default)]
    pub from_disk_cache: bool,
    #[serde(default)]
    pub non_network_protocol: bool,
}

impl NetworkRequest {
    /// Creates a request to `origin` transferring `transfer_size` bytes.
    ///
    /// The request is marked secure when the origin is `https`.
    pub fn new(origin: impl Into<String>, transfer_size: u64) -> Self {
        let origin = origin.into();
        let secure = origin.starts_with("https:");
        Self {
            origin,
            transfer_size,
            resource_size: transfer_size,
            protocol: Protocol::default(),
            secure,
            priority: Priority::default(),
            resource_type: ResourceType::default(),
            is_redirect: false,
            from_disk_cache: false,
            non_network_protocol: false,
        }
    }

    /// Builds a request descriptor from an observed record.
    pub fn from_record(record: &NetworkRecord) -> Self {
        Self {
            origin: record.origin(),
            transfer_size: record.transfer_size,
            resource_size: record.resource_size,
            protocol: record.protocol,
            secure: record.is_secure(),
            priority: Priority::default(),
            resource_type: record.resource_type,
            is_redirect: !record.redirect_chain.is_empty(),
            from_disk_cache: record.from_disk_cache,
            non_network_protocol: record.is_non_network_protocol(),
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn with_resource_type(mut self, resource_type: ResourceType) -> Self {
        self.resource_type = resource_type;
        self
    }

    pub fn with_resource_size(mut self, bytes: u64) -> Self {
        self.resource_size = bytes;
        self
    }

    pub fn redirect(mut self) -> Self {
        self.is_redirect = true;
        self
    }

    pub fn from_disk_cache(mut self) -> Self {
        self.from_disk_cache = true;
        self
    }

    pub fn non_network(mut self) -> Self {
        self.non_network_protocol = true;
        self
    }

    /// Returns true if the request needs a connection from the pool.
    pub fn needs_connection(&self) -> bool {
        !self.from_disk_cache && !self.non_network_protocol
    }
}

/// A main-thread task.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CpuTask {
    /// Unthrottled duration of the task.
    pub duration_ms: Millis,
    /// Layout work is throttled with the layout multiplier instead of the CPU one.
    #[serde(default)]
    pub performs_layout: bool,
    /// Names of notable child events, e.g. paint markers.
    #[serde(default)]
    pub child_event_names: Vec<String>,
}

impl CpuTask {
    pub fn new(duration_ms: Millis) -> Self {
        Self {
            duration_ms,
            performs_layout: false,
            child_event_names: Vec::new(),
        }
    }

    pub fn with_layout(mut self) -> Self {
        self.performs_layout = true;
        self
    }

    pub fn with_child_event(mut self, name: impl Into<String>) -> Self {
        self.child_event_names.push(name.into());
        self
    }
}

/// The kind of work a node represents.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum NodeKind {
    Network(NetworkRequest),
    Cpu(CpuTask),
}

/// Timestamps of the node in the observed load, if known.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObservedTiming {
    pub start_ms: Millis,
    pub end_ms: Millis,
}

/// A node of the dependency graph: identity, kind, and the nodes it waits for.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationNode {
    /// Unique identifier for this node
    pub id: NodeId,
    /// Network request or CPU task
    pub kind: NodeKind,
    /// IDs of the nodes that must finish before this one may start
    #[serde(default)]
    pub dependencies: Vec<NodeId>,
    /// Timing in the observed load, used by metric graph filters
    #[serde(default)]
    pub observed: Option<ObservedTiming>,
}

impl SimulationNode {
    /// Creates a network node.
    pub fn network(id: NodeId, request: NetworkRequest) -> Self {
        Self {
            id,
            kind: NodeKind::Network(request),
            dependencies: Vec::new(),
            observed: None,
        }
    }

    /// Creates a CPU node with the given unthrottled duration.
    pub fn cpu(id: NodeId, duration_ms: Millis) -> Self {
        Self::cpu_task(id, CpuTask::new(duration_ms))
    }

    /// Creates a CPU node from a task description.
    pub fn cpu_task(id: NodeId, task: CpuTask) -> Self {
        Self {
            id,
            kind: NodeKind::Cpu(task),
            dependencies: Vec::new(),
            observed: None,
        }
    }

    /// Adds a dependency on another node.
    pub fn depends_on(mut self, id: NodeId) -> Self {
        self.dependencies.push(id);
        self
    }

    /// Adds dependencies on several nodes.
    pub fn depends_on_all(mut self, ids: impl IntoIterator<Item = NodeId>) -> Self {
        self.dependencies.extend(ids);
        self
    }

    /// Records when this node ran in the observed load.
    pub fn observed(mut self, start_ms: Millis, end_ms: Millis) -> Self {
        self.observed = Some(ObservedTiming { start_ms, end_ms });
        self
    }

    pub fn is_network(&self) -> bool {
        matches!(self.kind, NodeKind::Network(_))
    }

    pub fn is_cpu(&self) -> bool {
        matches!(self.kind, NodeKind::Cpu(_))
    }

    /// Returns the network request if this is a network node.
    pub fn as_network(&self) -> Option<&NetworkRequest> {
        match &self.kind {
            NodeKind::Network(request) => Some(request),
            NodeKind::Cpu(_) => None,
        }
    }

    /// Returns the CPU task if this is a CPU node.
    pub fn as_cpu(&self) -> Option<&CpuTask> {
        match &self.kind {
            NodeKind::Cpu(task) => Some(task),
            NodeKind::Network(_) => None,
        }
    }

    /// Scheduling rank among ready nodes. CPU nodes only compete with each
    /// other, so they share a single rank and fall back to graph order.
    pub fn priority_rank(&self) -> u8 {
        match &self.kind {
            NodeKind::Network(request) => request.priority.rank(),
            NodeKind::Cpu(_) => Priority::default().rank(),
        }
    }

    /// Returns a description of the first invalid cost input, if any.
    pub(crate) fn invalid_cost(&self) -> Option<String> {
        match &self.kind {
            NodeKind::Cpu(task) => {
                if !task.duration_ms.is_finite() || task.duration_ms < 0.0 {
                    return Some(format!("cpu duration {}", task.duration_ms));
                }
            }
            NodeKind::Network(request) => {
                if request.origin.is_empty() && request.needs_connection() {
                    return Some("empty origin".to_string());
                }
            }
        }
        match self.observed {
            Some(o) if !o.start_ms.is_finite() || !o.end_ms.is_finite() => {
                Some("non-finite observed timing".to_string())
            }
            _ => None,
        }
    }
}
