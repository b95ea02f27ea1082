//! Observed network records.
//!
//! A `NetworkRecord` describes one request from a real, previously observed
//! page load. Records are only read: the network analyzer calibrates RTT and
//! throughput from them, and callers may build network nodes from them.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::types::Millis;

/// Application protocol a request was served over.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Protocol {
    #[serde(rename = "http/1.0")]
    Http1_0,
    #[default]
    #[serde(rename = "http/1.1")]
    Http1_1,
    #[serde(rename = "h2")]
    Http2,
    #[serde(rename = "h3")]
    Http3,
    /// `data:` and `blob:` URLs and anything else served without a socket.
    #[serde(rename = "data")]
    NonNetwork,
}

impl Protocol {
    /// Returns true for multiplexed HTTP/2.
    pub fn is_h2(&self) -> bool {
        matches!(self, Protocol::Http2)
    }

    /// Returns true for QUIC-based HTTP/3, whose handshake is a single round trip.
    pub fn is_quic(&self) -> bool {
        matches!(self, Protocol::Http3)
    }
}

/// Resource type reported for a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ResourceType {
    Document,
    Stylesheet,
    Script,
    Image,
    Font,
    #[serde(rename = "XHR")]
    Xhr,
    Fetch,
    Media,
    #[default]
    Other,
}

impl ResourceType {
    /// Share of time-to-first-byte typically spent in server think time.
    pub fn server_response_share(&self) -> f64 {
        match self {
            ResourceType::Document => 0.4,
            ResourceType::Xhr | ResourceType::Fetch => 0.2,
            _ => 0.4,
        }
    }
}

/// Detailed timing of a request, in milliseconds relative to the moment the
/// request was issued. Negative values mean "not available".
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResourceTiming {
    #[serde(default = "unavailable")]
    pub dns_start: Millis,
    #[serde(default = "unavailable")]
    pub dns_end: Millis,
    #[serde(default = "unavailable")]
    pub connect_start: Millis,
    #[serde(default = "unavailable")]
    pub connect_end: Millis,
    #[serde(default = "unavailable")]
    pub ssl_start: Millis,
    #[serde(default = "unavailable")]
    pub ssl_end: Millis,
    #[serde(default = "unavailable")]
    pub send_start: Millis,
    #[serde(default = "unavailable")]
    pub send_end: Millis,
    #[serde(default = "unavailable")]
    pub receive_headers_end: Millis,
}

fn unavailable() -> Millis {
    -1.0
}

impl Default for ResourceTiming {
    fn default() -> Self {
        Self {
            dns_start: -1.0,
            dns_end: -1.0,
            connect_start: -1.0,
            connect_end: -1.0,
            ssl_start: -1.0,
            ssl_end: -1.0,
            send_start: -1.0,
            send_end: -1.0,
            receive_headers_end: -1.0,
        }
    }
}

impl ResourceTiming {
    /// Returns true if the given timing field was recorded.
    pub fn has(value: Millis) -> bool {
        value.is_finite() && value >= 0.0
    }
}

/// One request from an observed page load.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetworkRecord {
    pub request_id: String,
    pub url: String,
    #[serde(default)]
    pub protocol: Protocol,
    #[serde(default)]
    pub resource_type: ResourceType,
    /// Bytes on the wire, including headers.
    #[serde(default)]
    pub transfer_size: u64,
    /// Decoded body size.
    #[serde(default)]
    pub resource_size: u64,
    #[serde(default)]
    pub connection_id: u64,
    #[serde(default)]
    pub connection_reused: bool,
    #[serde(default)]
    pub from_disk_cache: bool,
    #[serde(default)]
    pub failed: bool,
    #[serde(default = "default_finished")]
    pub finished: bool,
    #[serde(default = "default_status")]
    pub status_code: u16,
    /// When the request was issued, in milliseconds.
    pub network_request_time: Millis,
    /// When the response headers were fully received, in milliseconds.
    pub response_headers_end_time: Millis,
    /// When the last byte arrived, in milliseconds.
    pub network_end_time: Millis,
    #[serde(default)]
    pub timing: Option<ResourceTiming>,
    /// Server think time reported by the server itself, if any.
    #[serde(default)]
    pub server_response_time: Option<Millis>,
    /// Request id of the request that initiated this one.
    #[serde(default)]
    pub initiator: Option<String>,
    /// Request ids of the redirects that led to this request, oldest first.
    #[serde(default)]
    pub redirect_chain: Vec<String>,
}

fn default_finished() -> bool {
    true
}

fn default_status() -> u16 {
    200
}

impl NetworkRecord {
    /// Creates a finished record with no detailed timing.
    pub fn new(
        request_id: impl Into<String>,
        url: impl Into<String>,
        network_request_time: Millis,
        network_end_time: Millis,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            url: url.into(),
            protocol: Protocol::default(),
            resource_type: ResourceType::default(),
            transfer_size: 0,
            resource_size: 0,
            connection_id: 0,
            connection_reused: false,
            from_disk_cache: false,
            failed: false,
            finished: true,
            status_code: 200,
            network_request_time,
            response_headers_end_time: network_request_time,
            network_end_time,
            timing: None,
            server_response_time: None,
            initiator: None,
            redirect_chain: Vec::new(),
        }
    }

    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn with_resource_type(mut self, resource_type: ResourceType) -> Self {
        self.resource_type = resource_type;
        self
    }

    pub fn with_transfer_size(mut self, bytes: u64) -> Self {
        self.transfer_size = bytes;
        self.resource_size = self.resource_size.max(bytes);
        self
    }

    pub fn with_connection(mut self, connection_id: u64, reused: bool) -> Self {
        self.connection_id = connection_id;
        self.connection_reused = reused;
        self
    }

    pub fn with_headers_end(mut self, response_headers_end_time: Millis) -> Self {
        self.response_headers_end_time = response_headers_end_time;
        self
    }

    pub fn with_timing(mut self, timing: ResourceTiming) -> Self {
        self.timing = Some(timing);
        self
    }

    pub fn with_server_response_time(mut self, ms: Millis) -> Self {
        self.server_response_time = Some(ms);
        self
    }

    /// Returns the security origin (`scheme://host[:port]`) of the URL.
    ///
    /// URLs that cannot be parsed, and opaque origins such as `data:`, are
    /// returned verbatim so that they still group deterministically.
    pub fn origin(&self) -> String {
        origin_of(&self.url)
    }

    /// Returns the URL scheme, or an empty string if the URL is malformed.
    pub fn scheme(&self) -> String {
        Url::parse(&self.url)
            .map(|u| u.scheme().to_string())
            .unwrap_or_default()
    }

    /// Returns true if the request needed a TLS handshake.
    pub fn is_secure(&self) -> bool {
        matches!(self.scheme().as_str(), "https" | "wss")
    }

    /// Returns true for requests that never touch the network.
    pub fn is_non_network_protocol(&self) -> bool {
        self.protocol == Protocol::NonNetwork
            || matches!(self.scheme().as_str(), "data" | "blob" | "file" | "chrome-extension")
    }

    /// Observed duration from request to last byte.
    pub fn duration(&self) -> Millis {
        self.network_end_time - self.network_request_time
    }
}

/// Returns the security origin of a URL string.
pub fn origin_of(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => {
            let origin = parsed.origin();
            if origin.is_tuple() {
                origin.ascii_serialization()
            } else {
                format!("{}:", parsed.scheme())
            }
        }
        Err(_) => url.to_string(),
    }
}
