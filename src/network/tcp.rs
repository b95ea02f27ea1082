//! TCP connection timing model.
//!
//! A [`TcpConnection`] models one simulated connection to an origin. A cold
//! connection pays DNS, the TCP handshake and (for secure origins) TLS before
//! the request can be sent; a warm one goes straight to the request. Bytes are
//! then delivered under TCP slow start: the congestion window starts small,
//! doubles every round trip, and stops growing at the link's bandwidth-delay
//! product. [`slow_start_transfer`] is the pure ramp function; everything else
//! in this module is bookkeeping around it.

use serde::{Deserialize, Serialize};

use crate::record::Protocol;
use crate::types::{Millis, Throughput, TCP_SEGMENT_SIZE};

/// Outcome of delivering bytes under slow start.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SlowStartTransfer {
    /// Round trips spent delivering data, counting a partial last one
    pub round_trips: u64,
    /// Time spent delivering data
    pub time_ms: Millis,
    /// Congestion window after the last round trip, in segments
    pub final_window: f64,
    /// Bytes sent; a ramp round trip always carries its whole window, so this
    /// may exceed the bytes requested
    pub bytes_delivered: f64,
}

/// Largest useful congestion window for a link, in segments: the
/// bandwidth-delay product, never below one segment.
pub fn maximum_congestion_window(rtt_ms: Millis, throughput: Throughput) -> f64 {
    if throughput.is_unlimited() {
        return f64::INFINITY;
    }
    let bytes_per_round_trip = throughput.bytes_per_ms() * rtt_ms;
    (bytes_per_round_trip / TCP_SEGMENT_SIZE).max(1.0)
}

/// Delivers `bytes_remaining` starting from `current_window` segments.
///
/// The first round trip carries `min(current_window, max)` segments, and every
/// following round trip doubles the window up to the bandwidth-delay product.
/// Once the window is saturated the remaining round trips are computed in
/// closed form, so huge transfers cost O(log) iterations.
///
/// The first round trip is always charged in full. A saturated last round trip
/// is charged only for the share of the window it fills, which keeps the
/// transfer time continuous and non-decreasing in `rtt_ms` even though the
/// ceiling itself grows with the round trip.
pub fn slow_start_transfer(
    bytes_remaining: f64,
    rtt_ms: Millis,
    throughput_ceiling: Throughput,
    current_window: f64,
) -> SlowStartTransfer {
    let max_window = maximum_congestion_window(rtt_ms, throughput_ceiling);
    let mut window = current_window.max(1.0).min(max_window);

    if bytes_remaining <= 0.0 {
        return SlowStartTransfer {
            round_trips: 0,
            time_ms: 0.0,
            final_window: window,
            bytes_delivered: 0.0,
        };
    }

    let mut round_trips: u64 = 0;
    let mut time_ms = 0.0;
    let mut delivered = 0.0;
    loop {
        round_trips += 1;
        time_ms += rtt_ms;
        delivered += window * TCP_SEGMENT_SIZE;
        if delivered >= bytes_remaining {
            break;
        }
        let next = (window * 2.0).min(max_window);
        if next >= max_window {
            window = max_window;
            // Saturated: full windows, then whatever is left at line rate.
            let per_round_trip = window * TCP_SEGMENT_SIZE;
            let left = bytes_remaining - delivered;
            let full_trips = (left / per_round_trip).floor();
            let tail = (left - full_trips * per_round_trip).max(0.0);
            round_trips += full_trips as u64;
            time_ms += full_trips * rtt_ms;
            if tail > 0.0 {
                round_trips += 1;
                time_ms += rtt_ms * tail / per_round_trip;
            }
            delivered = bytes_remaining;
            break;
        }
        window = next;
    }

    SlowStartTransfer {
        round_trips,
        time_ms,
        final_window: window,
        bytes_delivered: delivered,
    }
}

/// How many connections a link can keep busy at one segment per round trip.
///
/// Requests beyond this only split bandwidth further, so the simulator never
/// runs more network requests concurrently than this (and at least one).
pub fn maximum_saturated_connections(rtt_ms: Millis, throughput: Throughput) -> usize {
    if throughput.is_unlimited() || rtt_ms <= 0.0 {
        return usize::MAX;
    }
    let round_trips_per_second = 1000.0 / rtt_ms;
    let bits_per_connection = round_trips_per_second * TCP_SEGMENT_SIZE * 8.0;
    (throughput.bits_per_second() / bits_per_connection).floor().max(1.0) as usize
}

/// Handshake parameters shared by every connection in a run.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConnectionProfile {
    /// Round trips a fresh secure connection spends in TLS
    pub tls_round_trips: u32,
    /// Congestion window of a fresh connection, in segments
    pub initial_congestion_window: f64,
}

impl Default for ConnectionProfile {
    fn default() -> Self {
        Self {
            tls_round_trips: 1,
            initial_congestion_window: crate::config::DEFAULT_INITIAL_CONGESTION_WINDOW,
        }
    }
}

/// Network conditions to an origin, as seen by one connection.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LinkConditions {
    pub rtt_ms: Millis,
    pub throughput: Throughput,
    pub server_response_time_ms: Millis,
}

/// Breakdown of one download on a connection.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DownloadTiming {
    /// DNS resolution paid before connecting
    pub dns_ms: Millis,
    /// TCP handshake (zero on a warm connection)
    pub connect_ms: Millis,
    /// TLS negotiation (zero on a warm or insecure connection)
    pub ssl_ms: Millis,
    /// Time from request start until the first window arrives
    pub ttfb_ms: Millis,
    /// Total time from request start until the last byte arrives
    pub total_ms: Millis,
    /// Round trips spent delivering data
    pub round_trips: u64,
    /// Congestion window after the transfer
    pub final_window: f64,
    /// h2 bytes received beyond this response, credited to the next one
    pub overflow_bytes: f64,
    /// Whether the connection was already warm
    pub reused: bool,
}

/// One simulated connection. Owned by the
/// [`ConnectionPool`](crate::network::pool::ConnectionPool).
#[derive(Clone, Debug)]
pub struct TcpConnection {
    origin: String,
    slot: usize,
    secure: bool,
    protocol: Protocol,
    warm: bool,
    congestion_window: f64,
    last_used_ms: Millis,
    h2_overflow_bytes: f64,
}

impl TcpConnection {
    /// Creates a cold connection.
    pub fn new(
        origin: impl Into<String>,
        slot: usize,
        secure: bool,
        protocol: Protocol,
        profile: &ConnectionProfile,
    ) -> Self {
        Self {
            origin: origin.into(),
            slot,
            secure,
            protocol,
            warm: false,
            congestion_window: profile.initial_congestion_window,
            last_used_ms: 0.0,
            h2_overflow_bytes: 0.0,
        }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Position of this connection among its origin's connections.
    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn is_warm(&self) -> bool {
        self.warm
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn congestion_window(&self) -> f64 {
        self.congestion_window
    }

    pub fn last_used_ms(&self) -> Millis {
        self.last_used_ms
    }

    /// Marks the connection as established without a transfer.
    pub fn set_warm(&mut self, warm: bool) {
        self.warm = warm;
    }

    /// Simulates downloading `bytes` on this connection.
    ///
    /// `dns_ms` is only charged when the connection is cold. The connection
    /// itself is not modified; call [`TcpConnection::mark_used`] with the
    /// result once the transfer completes.
    pub fn simulate_download(
        &self,
        bytes: u64,
        dns_ms: Millis,
        link: &LinkConditions,
        profile: &ConnectionProfile,
    ) -> DownloadTiming {
        let rtt = link.rtt_ms;
        let requested = bytes as f64;
        let multiplexed = self.warm && self.protocol.is_h2();
        let (bytes, unused_credit) = if multiplexed {
            (
                (requested - self.h2_overflow_bytes).max(0.0),
                (self.h2_overflow_bytes - requested).max(0.0),
            )
        } else {
            (requested, 0.0)
        };

        let (dns_ms, connect_ms, ssl_ms) = if self.warm {
            (0.0, 0.0, 0.0)
        } else if self.protocol.is_quic() {
            // QUIC folds transport and TLS setup into one round trip.
            (dns_ms, rtt, 0.0)
        } else {
            let ssl = if self.secure {
                rtt * profile.tls_round_trips as f64
            } else {
                0.0
            };
            (dns_ms, rtt, ssl)
        };

        let transfer = slow_start_transfer(bytes, rtt, link.throughput, self.congestion_window);
        let server_ms = if multiplexed { 0.0 } else { link.server_response_time_ms };
        let setup_ms = dns_ms + connect_ms + ssl_ms + server_ms;
        let ttfb_ms = if transfer.round_trips > 0 { setup_ms + rtt } else { setup_ms };
        let overflow_bytes = if self.protocol.is_h2() {
            unused_credit + (transfer.bytes_delivered - bytes).max(0.0)
        } else {
            0.0
        };

        DownloadTiming {
            dns_ms,
            connect_ms,
            ssl_ms,
            ttfb_ms,
            total_ms: setup_ms + transfer.time_ms,
            round_trips: transfer.round_trips,
            final_window: transfer.final_window,
            overflow_bytes,
            reused: self.warm,
        }
    }

    /// Records a completed transfer: the connection becomes warm and keeps the
    /// grown congestion window for its next transfer.
    pub fn mark_used(&mut self, at_ms: Millis, timing: &DownloadTiming) {
        self.warm = true;
        self.congestion_window = timing.final_window;
        self.h2_overflow_bytes = timing.overflow_bytes;
        self.last_used_ms = at_ms;
    }
}
