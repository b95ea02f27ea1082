//! Output of a simulation run.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::network::tcp::DownloadTiming;
use crate::stats::RunStats;
use crate::types::{Millis, NodeId};

/// Which resource a node ran on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimingKind {
    Network,
    Cpu,
}

/// Connection-level breakdown of a network node.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConnectionTiming {
    pub dns_ms: Millis,
    pub connect_ms: Millis,
    pub ssl_ms: Millis,
    pub ttfb_ms: Millis,
    pub round_trips: u64,
    /// Whether the connection was warm when the request started
    pub reused: bool,
}

impl From<&DownloadTiming> for ConnectionTiming {
    fn from(timing: &DownloadTiming) -> Self {
        Self {
            dns_ms: timing.dns_ms,
            connect_ms: timing.connect_ms,
            ssl_ms: timing.ssl_ms,
            ttfb_ms: timing.ttfb_ms,
            round_trips: timing.round_trips,
            reused: timing.reused,
        }
    }
}

/// Simulated timing of one node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeTiming {
    pub start_ms: Millis,
    pub end_ms: Millis,
    /// Time spent ready but waiting for the CPU or a connection
    pub queued_ms: Millis,
    pub kind: TimingKind,
    /// Present for network nodes that used a connection
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection: Option<ConnectionTiming>,
}

impl NodeTiming {
    pub fn duration_ms(&self) -> Millis {
        self.end_ms - self.start_ms
    }
}

/// Result of simulating one graph.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    /// Optional caller-supplied label, e.g. "optimisticFirstContentfulPaint"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Latest end time over all nodes
    pub total_time_ms: Millis,
    /// Timing of every node, keyed by id
    pub node_timings: BTreeMap<NodeId, NodeTiming>,
    /// Chain of nodes, root first, that determined the total time. Each step
    /// is the dependency that made a node ready, or the node that freed the
    /// CPU lane or connection it queued for
    pub critical_path: Vec<NodeId>,
    pub stats: RunStats,
}

impl SimulationResult {
    /// Returns the timing of a node.
    pub fn timing(&self, id: NodeId) -> Option<&NodeTiming> {
        self.node_timings.get(&id)
    }

    /// Returns true if `id` lies on the critical path.
    pub fn is_critical(&self, id: NodeId) -> bool {
        self.critical_path.contains(&id)
    }

    /// Exports the result to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Exports the result to a JSON file.
    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let json = self
            .to_json()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }

    /// Exports per-node timings to CSV, one row per node in id order.
    pub fn to_csv(&self) -> String {
        let mut csv = String::new();
        csv.push_str(
            "node_id,kind,start_ms,end_ms,duration_ms,queued_ms,\
             dns_ms,connect_ms,ssl_ms,ttfb_ms,reused,critical\n",
        );

        for (id, timing) in &self.node_timings {
            let kind = match timing.kind {
                TimingKind::Network => "network",
                TimingKind::Cpu => "cpu",
            };
            let connection = match &timing.connection {
                Some(c) => format!(
                    "{:.3},{:.3},{:.3},{:.3},{}",
                    c.dns_ms, c.connect_ms, c.ssl_ms, c.ttfb_ms, c.reused
                ),
                None => ",,,,".to_string(),
            };
            csv.push_str(&format!(
                "{},{},{:.3},{:.3},{:.3},{:.3},{},{}\n",
                id,
                kind,
                timing.start_ms,
                timing.end_ms,
                timing.duration_ms(),
                timing.queued_ms,
                connection,
                self.is_critical(*id),
            ));
        }

        csv
    }

    /// Exports per-node timings to a CSV file.
    pub fn to_csv_file<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        std::fs::write(path, self.to_csv())
    }

    /// Writes a human-readable summary to a writer.
    pub fn write_summary<W: Write>(&self, mut w: W) -> std::io::Result<()> {
        writeln!(w, "=== Simulation Result ===")?;
        if let Some(ref label) = self.label {
            writeln!(w, "Label: {}", label)?;
        }
        writeln!(w, "Total time: {:.2} ms", self.total_time_ms)?;
        writeln!(w, "Nodes: {}", self.node_timings.len())?;
        let path: Vec<String> = self.critical_path.iter().map(|id| id.to_string()).collect();
        writeln!(w, "Critical path: {}", path.join(" -> "))?;
        writeln!(w)?;
        self.stats.write_summary(&mut w)
    }

    /// Returns a summary string.
    pub fn summary(&self) -> String {
        let mut buf = Vec::new();
        // Writing to a Vec never fails.
        let _ = self.write_summary(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }
}
