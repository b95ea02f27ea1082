//! Calibration of network conditions from an observed load.
//!
//! The analyzer looks at the [`NetworkRecord`]s of a real page load and
//! estimates per-origin round-trip time, server response time and link
//! throughput. The simulator then replays a graph under those conditions when
//! the throttling method is `provided` or `devtools`.
//!
//! RTT samples come from two families:
//!
//! - **connection timing**: the TCP (and TLS) handshake of a fresh connection,
//!   one round trip each. These are trusted as-is.
//! - **coarse timing**: send start, headers end and post-headers download time
//!   divided by the round trips they must have spanned. These overestimate, so
//!   they are scaled down and only used for origins with no handshake samples.
//!
//! Estimates are memoized per origin for the analyzer's lifetime.

use std::collections::{BTreeMap, HashMap};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{DEFAULT_RTT_MS, DEFAULT_THROUGHPUT_BPS};
use crate::record::{NetworkRecord, Protocol, ResourceTiming};
use crate::types::{Millis, Throughput};

/// RTT estimates are never lower than this.
pub const MIN_RTT_MS: Millis = 3.0;
/// Coarse RTT samples are multiplied by this before use.
pub const COARSE_ESTIMATE_MULTIPLIER: f64 = 0.3;
/// Server response time assumed for origins without usable samples.
pub const DEFAULT_SERVER_RESPONSE_TIME_MS: Millis = 30.0;
/// Bytes a fresh connection delivers in its first round trip.
const INITIAL_WINDOW_BYTES: f64 = 14.0 * 1024.0;
/// Download-timing samples spanning more round trips than this are discarded.
const MAX_DOWNLOAD_ROUND_TRIPS: f64 = 5.0;

/// Errors raised while analyzing observed records.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("no usable network records to analyze")]
    NoRecords,
}

/// Result type for analysis operations.
pub type AnalysisResult<T> = Result<T, AnalysisError>;

/// Where an estimate came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EstimateSource {
    /// Derived from observed records
    Observed,
    /// The analyzer's default, used when the records had nothing usable
    Fallback,
}

/// An estimated value together with its provenance.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Estimate<T> {
    pub value: T,
    pub source: EstimateSource,
}

impl<T> Estimate<T> {
    pub fn observed(value: T) -> Self {
        Self {
            value,
            source: EstimateSource::Observed,
        }
    }

    pub fn fallback(value: T) -> Self {
        Self {
            value,
            source: EstimateSource::Fallback,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.source == EstimateSource::Fallback
    }
}

/// A calibration value that had to fall back to its default.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "estimate", content = "origin", rename_all = "snake_case")]
pub enum Fallback {
    Rtt(String),
    ServerResponseTime(String),
    Throughput,
}

/// Network conditions derived from an observed load.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NetworkAnalysis {
    /// Smallest per-origin RTT; the base RTT of the simulated link
    pub rtt: Millis,
    /// Extra RTT of each origin on top of `rtt`
    pub additional_rtt_by_origin: BTreeMap<String, Millis>,
    /// Server think time per origin
    pub server_response_time_by_origin: BTreeMap<String, Millis>,
    /// Link throughput
    pub throughput: Throughput,
    /// Estimates that used defaults
    pub fallbacks: Vec<Fallback>,
    /// Whether each observed request reused a connection, by request id.
    /// Reported for inspection; simulated runs always start from cold
    /// connections unless a primed pool is supplied.
    #[serde(default)]
    pub connection_reused_by_request: BTreeMap<String, bool>,
}

impl NetworkAnalysis {
    /// Additional RTT for an origin, zero if unknown.
    pub fn additional_rtt(&self, origin: &str) -> Millis {
        self.additional_rtt_by_origin.get(origin).copied().unwrap_or(0.0)
    }

    /// Server response time for an origin, if one was estimated.
    pub fn server_response_time(&self, origin: &str) -> Option<Millis> {
        self.server_response_time_by_origin.get(origin).copied()
    }

    /// Whether an observed request reused a connection, if it was analyzed.
    pub fn was_connection_reused(&self, request_id: &str) -> Option<bool> {
        self.connection_reused_by_request.get(request_id).copied()
    }
}

/// Estimates network conditions from observed records.
#[derive(Debug)]
pub struct NetworkAnalyzer {
    records: Vec<NetworkRecord>,
    /// Positions of usable records per origin
    by_origin: BTreeMap<String, Vec<usize>>,
    default_rtt_ms: Millis,
    default_throughput: Throughput,
    default_server_response_time_ms: Millis,
    force_coarse_estimates: bool,
    rtt_cache: Mutex<HashMap<String, Estimate<Millis>>>,
    throughput_cache: Mutex<HashMap<String, Estimate<Throughput>>>,
    server_cache: Mutex<HashMap<String, Estimate<Millis>>>,
}

impl NetworkAnalyzer {
    /// Creates an analyzer over the records of one observed load.
    ///
    /// Records served from disk cache, over non-network protocols, or that
    /// never finished are ignored. Fails if nothing usable remains.
    pub fn new(records: Vec<NetworkRecord>) -> AnalysisResult<Self> {
        let mut by_origin: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (index, record) in records.iter().enumerate() {
            if is_usable(record) {
                by_origin.entry(record.origin()).or_default().push(index);
            }
        }
        if by_origin.is_empty() {
            return Err(AnalysisError::NoRecords);
        }

        Ok(Self {
            records,
            by_origin,
            default_rtt_ms: DEFAULT_RTT_MS,
            default_throughput: Throughput::from_bits_per_second(DEFAULT_THROUGHPUT_BPS),
            default_server_response_time_ms: DEFAULT_SERVER_RESPONSE_TIME_MS,
            force_coarse_estimates: false,
            rtt_cache: Mutex::new(HashMap::new()),
            throughput_cache: Mutex::new(HashMap::new()),
            server_cache: Mutex::new(HashMap::new()),
        })
    }

    /// Sets the RTT reported for origins without usable samples.
    pub fn with_default_rtt(mut self, rtt_ms: Millis) -> Self {
        self.default_rtt_ms = rtt_ms;
        self
    }

    /// Sets the throughput reported when no transfer can be measured.
    pub fn with_default_throughput(mut self, throughput: Throughput) -> Self {
        self.default_throughput = throughput;
        self
    }

    /// Sets the server response time reported for origins without samples.
    pub fn with_default_server_response_time(mut self, ms: Millis) -> Self {
        self.default_server_response_time_ms = ms;
        self
    }

    /// Ignores connection timing and protocol connection ids, using only the
    /// coarse heuristics.
    pub fn with_coarse_estimates(mut self, force: bool) -> Self {
        self.force_coarse_estimates = force;
        self
    }

    /// Origins with at least one usable record, sorted.
    pub fn origins(&self) -> Vec<String> {
        self.by_origin.keys().cloned().collect()
    }

    /// Estimates the round-trip time to `origin`.
    pub fn estimate_rtt(&self, origin: &str) -> Estimate<Millis> {
        if let Some(cached) = self.rtt_cache.lock().get(origin) {
            return *cached;
        }

        let estimate = match self.min_rtt_sample(origin) {
            Some(rtt) => Estimate::observed(rtt.max(MIN_RTT_MS)),
            None => {
                tracing::warn!(
                    origin,
                    default_ms = self.default_rtt_ms,
                    "no usable RTT samples, using default"
                );
                Estimate::fallback(self.default_rtt_ms)
            }
        };
        self.rtt_cache.lock().insert(origin.to_string(), estimate);
        estimate
    }

    /// Estimates the throughput of the link to `origin` from its largest
    /// completed transfer.
    pub fn estimate_throughput(&self, origin: &str) -> Estimate<Throughput> {
        if let Some(cached) = self.throughput_cache.lock().get(origin) {
            return *cached;
        }

        let largest = self
            .origin_records(origin)
            .filter(|r| r.transfer_size > 0)
            .filter(|r| r.network_end_time > r.response_headers_end_time)
            .max_by(|a, b| {
                a.transfer_size
                    .cmp(&b.transfer_size)
                    // Earliest wins ties.
                    .then(b.network_request_time.total_cmp(&a.network_request_time))
            });

        let estimate = match largest {
            Some(record) => {
                let duration = record.network_end_time - record.response_headers_end_time;
                Estimate::observed(Throughput::from_bytes_per_ms(
                    record.transfer_size as f64 / duration,
                ))
            }
            None => {
                tracing::warn!(origin, "no measurable transfer, using default throughput");
                Estimate::fallback(self.default_throughput)
            }
        };
        self.throughput_cache.lock().insert(origin.to_string(), estimate);
        estimate
    }

    /// Estimates the server think time of `origin`: the median over records of
    /// the provided server time, or time-to-first-byte minus one RTT.
    pub fn estimate_server_response_time(&self, origin: &str) -> Estimate<Millis> {
        if let Some(cached) = self.server_cache.lock().get(origin) {
            return *cached;
        }

        let rtt = self.estimate_rtt(origin).value;
        let mut samples: Vec<Millis> = self
            .origin_records(origin)
            .filter_map(|record| {
                if let Some(provided) = record.server_response_time {
                    return Some(provided.max(0.0));
                }
                let timing = record.timing.as_ref()?;
                if !ResourceTiming::has(timing.send_end)
                    || !ResourceTiming::has(timing.receive_headers_end)
                {
                    return None;
                }
                Some((timing.receive_headers_end - timing.send_end - rtt).max(0.0))
            })
            .collect();

        let estimate = match median(&mut samples) {
            Some(value) => Estimate::observed(value),
            None => {
                tracing::warn!(
                    origin,
                    default_ms = self.default_server_response_time_ms,
                    "no server timing samples, using default"
                );
                Estimate::fallback(self.default_server_response_time_ms)
            }
        };
        self.server_cache.lock().insert(origin.to_string(), estimate);
        estimate
    }

    /// Decides, per request id, whether each request reused a connection.
    /// The result is reported through [`NetworkAnalysis`]; the simulator does
    /// not consume it.
    ///
    /// Protocol connection ids are used when they look trustworthy. Otherwise
    /// a request is assumed to have reused a connection if it was h2 or started
    /// after the first request to its origin finished; the first request to an
    /// origin never reuses.
    pub fn estimate_if_connection_was_reused(&self) -> BTreeMap<String, bool> {
        let usable: Vec<&NetworkRecord> = self
            .by_origin
            .values()
            .flatten()
            .map(|&i| &self.records[i])
            .collect();

        if !self.force_coarse_estimates && can_trust_connection_information(&usable) {
            return usable
                .iter()
                .map(|r| (r.request_id.clone(), r.connection_reused))
                .collect();
        }

        let mut reused = BTreeMap::new();
        for origin in self.by_origin.keys() {
            let records: Vec<&NetworkRecord> = self.origin_records(origin).collect();
            let earliest_reuse = records
                .iter()
                .map(|r| r.network_end_time)
                .fold(f64::INFINITY, f64::min);
            for record in &records {
                let was_reused = record.network_request_time >= earliest_reuse
                    || record.protocol == Protocol::Http2;
                reused.insert(record.request_id.clone(), was_reused);
            }
            let first = records.iter().min_by(|a, b| {
                a.network_request_time.total_cmp(&b.network_request_time)
            });
            if let Some(first) = first {
                reused.insert(first.request_id.clone(), false);
            }
        }
        reused
    }

    /// Estimates link throughput across all origins: total bytes transferred
    /// divided by the time during which at least one transfer was in flight.
    pub fn estimate_global_throughput(&self) -> Estimate<Throughput> {
        let mut boundaries: Vec<(Millis, i32)> = Vec::new();
        let mut total_bytes = 0.0;
        for record in self.by_origin.values().flatten().map(|&i| &self.records[i]) {
            if record.transfer_size == 0
                || record.network_end_time <= record.response_headers_end_time
            {
                continue;
            }
            total_bytes += record.transfer_size as f64;
            boundaries.push((record.response_headers_end_time, 1));
            boundaries.push((record.network_end_time, -1));
        }
        // Ends sort before starts at the same instant.
        boundaries.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        let mut in_flight = 0;
        let mut busy_since = 0.0;
        let mut busy_ms = 0.0;
        for (time, delta) in boundaries {
            if in_flight == 0 && delta > 0 {
                busy_since = time;
            }
            in_flight += delta;
            if in_flight == 0 {
                busy_ms += time - busy_since;
            }
        }

        if busy_ms <= 0.0 {
            tracing::warn!("no measurable transfers, using default throughput");
            return Estimate::fallback(self.default_throughput);
        }
        Estimate::observed(Throughput::from_bytes_per_ms(total_bytes / busy_ms))
    }

    /// Runs every estimate and packages the result for the simulator.
    pub fn analyze(&self) -> NetworkAnalysis {
        let mut fallbacks = Vec::new();
        let mut rtt_by_origin = BTreeMap::new();
        let mut server_response_time_by_origin = BTreeMap::new();

        for origin in self.by_origin.keys() {
            let rtt = self.estimate_rtt(origin);
            if rtt.is_fallback() {
                fallbacks.push(Fallback::Rtt(origin.clone()));
            } else {
                rtt_by_origin.insert(origin.clone(), rtt.value);
            }

            let server = self.estimate_server_response_time(origin);
            if server.is_fallback() {
                fallbacks.push(Fallback::ServerResponseTime(origin.clone()));
            }
            server_response_time_by_origin.insert(origin.clone(), server.value);
        }

        let rtt = rtt_by_origin
            .values()
            .copied()
            .fold(f64::INFINITY, f64::min);
        let rtt = if rtt.is_finite() { rtt } else { self.default_rtt_ms };
        let additional_rtt_by_origin = self
            .by_origin
            .keys()
            .map(|origin| {
                let extra = rtt_by_origin.get(origin).map_or(0.0, |r| r - rtt);
                (origin.clone(), extra)
            })
            .collect();

        let throughput = self.estimate_global_throughput();
        if throughput.is_fallback() {
            fallbacks.push(Fallback::Throughput);
        }

        tracing::debug!(
            origins = self.by_origin.len(),
            rtt,
            throughput_bps = throughput.value.bits_per_second(),
            fallbacks = fallbacks.len(),
            "network analysis complete"
        );

        NetworkAnalysis {
            rtt,
            additional_rtt_by_origin,
            server_response_time_by_origin,
            throughput: throughput.value,
            fallbacks,
            connection_reused_by_request: self.estimate_if_connection_was_reused(),
        }
    }

    fn origin_records<'a>(&'a self, origin: &str) -> impl Iterator<Item = &'a NetworkRecord> + 'a {
        self.by_origin
            .get(origin)
            .into_iter()
            .flatten()
            .map(move |&i| &self.records[i])
    }

    fn min_rtt_sample(&self, origin: &str) -> Option<Millis> {
        let records: Vec<&NetworkRecord> = self.origin_records(origin).collect();

        let mut samples: Vec<Millis> = Vec::new();
        if !self.force_coarse_estimates {
            for record in &records {
                samples.extend(connection_timing_samples(record));
            }
        }
        if samples.is_empty() {
            for record in &records {
                samples.extend(
                    coarse_samples(record)
                        .into_iter()
                        .map(|s| s * COARSE_ESTIMATE_MULTIPLIER),
                );
            }
        }

        samples
            .into_iter()
            .filter(|s| s.is_finite() && *s > 0.0)
            .reduce(f64::min)
    }
}

fn is_usable(record: &NetworkRecord) -> bool {
    record.finished
        && !record.failed
        && !record.from_disk_cache
        && !record.is_non_network_protocol()
}

/// Handshake round trips of a fresh connection.
fn connection_timing_samples(record: &NetworkRecord) -> Vec<Millis> {
    let Some(timing) = record.timing.as_ref() else {
        return Vec::new();
    };
    if record.connection_reused {
        return Vec::new();
    }

    let has_connect =
        ResourceTiming::has(timing.connect_start) && ResourceTiming::has(timing.connect_end);
    if has_connect && record.protocol.is_quic() {
        vec![timing.connect_end - timing.connect_start]
    } else if has_connect
        && ResourceTiming::has(timing.ssl_start)
        && ResourceTiming::has(timing.ssl_end)
    {
        // TLS is assumed to use False Start, so a single round trip.
        vec![
            timing.ssl_start - timing.connect_start,
            timing.connect_end - timing.ssl_start,
        ]
    } else if has_connect {
        vec![timing.connect_end - timing.connect_start]
    } else {
        Vec::new()
    }
}

/// Round trips spent before the request could be sent on a fresh connection.
fn setup_round_trips(record: &NetworkRecord) -> f64 {
    if record.connection_reused {
        return 0.0;
    }
    let mut round_trips = 1.0;
    if record.is_secure() && !record.protocol.is_quic() {
        round_trips += 1.0;
    }
    round_trips
}

/// Timing-derived samples that include more than network latency.
fn coarse_samples(record: &NetworkRecord) -> Vec<Millis> {
    let mut samples = Vec::new();
    let timing = record.timing.as_ref();

    // Post-headers download spans log2(size / initial window) round trips.
    let headers_end = timing
        .map(|t| t.receive_headers_end)
        .filter(|v| ResourceTiming::has(*v))
        .unwrap_or(record.response_headers_end_time - record.network_request_time);
    let size = record.transfer_size as f64;
    if size > INITIAL_WINDOW_BYTES && headers_end >= 0.0 {
        let round_trips = (size / INITIAL_WINDOW_BYTES).log2();
        if round_trips <= MAX_DOWNLOAD_ROUND_TRIPS {
            let download = record.duration() - headers_end;
            samples.push(download / round_trips);
        }
    }

    // Handshake round trips precede send start.
    let setup = setup_round_trips(record);
    if let Some(send_start) = timing.map(|t| t.send_start).filter(|v| ResourceTiming::has(*v)) {
        if setup > 0.0 {
            samples.push(send_start / setup);
        }
    }

    // Headers end covers setup, one request round trip and server think time.
    if headers_end >= 0.0 {
        let server = headers_end * record.resource_type.server_response_share();
        samples.push(((headers_end - server) / (setup + 1.0)).max(MIN_RTT_MS));
    }

    samples
}

/// Whether connection ids and reuse flags in the records are self-consistent.
///
/// Every connection must have started fresh at least once, and more than one
/// connection id must appear.
fn can_trust_connection_information(records: &[&NetworkRecord]) -> bool {
    let mut started: BTreeMap<u64, bool> = BTreeMap::new();
    for record in records {
        let entry = started.entry(record.connection_id).or_insert(false);
        *entry = *entry || !record.connection_reused;
    }
    started.len() > 1 && started.values().all(|&s| s)
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}
