//! Statistics collection and export for simulation runs.
//!
//! Every [`SimulationResult`](crate::simulator::SimulationResult) carries a
//! [`RunStats`] describing how the run used its resources. Stats export to
//! JSON, CSV and a human-readable summary.

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

/// Aggregate statistics for one simulation run.
///
/// Only simulated quantities are recorded, so stats are identical across
/// repeated runs of the same graph and settings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    /// Nodes simulated
    pub nodes_simulated: usize,

    /// Network nodes simulated
    pub network_nodes: usize,

    /// CPU nodes simulated
    pub cpu_nodes: usize,

    /// Times the clock advanced
    pub time_steps: u64,

    /// Node starts plus node completions
    pub events_processed: u64,

    /// Largest number of nodes in flight at once
    pub peak_in_flight: usize,

    /// Cold connections opened
    pub connections_opened: u64,

    /// Requests served by a warm connection
    pub connections_reused: u64,

    /// Idle connections closed to stay under the global cap
    pub connections_evicted: u64,

    /// Origins that paid DNS resolution
    pub dns_lookups_charged: u64,

    /// Nodes that had to wait for the CPU or a connection after becoming ready
    pub resource_waits: u64,
}

impl RunStats {
    /// Creates an empty statistics container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Exports statistics to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Exports statistics to a JSON file.
    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let json = self.to_json().map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e)
        })?;
        std::fs::write(path, json)
    }

    /// Exports statistics to CSV.
    pub fn to_csv(&self) -> String {
        let mut csv = String::new();

        // Header
        csv.push_str("metric,value\n");

        csv.push_str(&format!("nodes_simulated,{}\n", self.nodes_simulated));
        csv.push_str(&format!("network_nodes,{}\n", self.network_nodes));
        csv.push_str(&format!("cpu_nodes,{}\n", self.cpu_nodes));
        csv.push_str(&format!("time_steps,{}\n", self.time_steps));
        csv.push_str(&format!("events_processed,{}\n", self.events_processed));
        csv.push_str(&format!("peak_in_flight,{}\n", self.peak_in_flight));
        csv.push_str(&format!("connections_opened,{}\n", self.connections_opened));
        csv.push_str(&format!("connections_reused,{}\n", self.connections_reused));
        csv.push_str(&format!("connections_evicted,{}\n", self.connections_evicted));
        csv.push_str(&format!("dns_lookups_charged,{}\n", self.dns_lookups_charged));
        csv.push_str(&format!("resource_waits,{}\n", self.resource_waits));

        csv
    }

    /// Exports statistics to a CSV file.
    pub fn to_csv_file<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        std::fs::write(path, self.to_csv())
    }

    /// Writes a human-readable summary to a writer.
    pub fn write_summary<W: Write>(&self, mut w: W) -> std::io::Result<()> {
        writeln!(w, "--- Nodes ---")?;
        writeln!(
            w,
            "Simulated: {} ({} network, {} cpu)",
            self.nodes_simulated, self.network_nodes, self.cpu_nodes
        )?;
        writeln!(w, "Time steps: {}", self.time_steps)?;
        writeln!(w, "Events processed: {}", self.events_processed)?;
        writeln!(w, "Peak in flight: {}", self.peak_in_flight)?;
        writeln!(w, "Resource waits: {}", self.resource_waits)?;
        writeln!(w)?;

        writeln!(w, "--- Network ---")?;
        writeln!(w, "Connections opened: {}", self.connections_opened)?;
        writeln!(w, "Connections reused: {}", self.connections_reused)?;
        writeln!(w, "Connections evicted: {}", self.connections_evicted)?;
        writeln!(w, "DNS lookups charged: {}", self.dns_lookups_charged)?;

        Ok(())
    }

    /// Returns a summary string.
    pub fn summary(&self) -> String {
        let mut buf = Vec::new();
        // Writing to a Vec never fails.
        let _ = self.write_summary(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }
}

/// A simple timer for measuring wall-clock time.
///
/// Wall time never enters [`RunStats`]; it is only logged.
#[derive(Debug)]
pub struct Timer {
    start: std::time::Instant,
}

impl Timer {
    /// Starts a new timer.
    pub fn start() -> Self {
        Self {
            start: std::time::Instant::now(),
        }
    }

    /// Returns elapsed time in milliseconds.
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::start()
    }
}
