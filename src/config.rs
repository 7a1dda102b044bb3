//! Endpoint configuration: transport-parameter defaults, pinned versions, and the TLS
//! collaborator factory (§2a, §6). Built once per endpoint and shared across connections.

use std::sync::Arc;
use std::time::Duration;

use crate::handshake::tls::TlsEngineFactory;
use crate::primitives::varint::VarInt;

/// RFC9002 constants, not configurable per §4.6.
pub const K_PACKET_THRESHOLD: u64 = 3;
pub const K_TIME_THRESHOLD_NUMERATOR: u32 = 9;
pub const K_TIME_THRESHOLD_DENOMINATOR: u32 = 8;
pub const K_GRANULARITY: Duration = Duration::from_millis(1);
pub const K_INITIAL_RTT: Duration = Duration::from_millis(333);
pub const MINIMUM_WINDOW_PACKETS: u64 = 2;

/// Transport parameters exchanged during the handshake (§6 "Transport parameters").
#[derive(Debug, Clone)]
pub struct TransportParameters {
    pub original_destination_connection_id: Option<Vec<u8>>,
    pub max_idle_timeout: Duration,
    pub stateless_reset_token: Option<[u8; 16]>,
    pub max_udp_payload_size: VarInt,
    pub initial_max_data: VarInt,
    pub initial_max_stream_data_bidi_local: VarInt,
    pub initial_max_stream_data_bidi_remote: VarInt,
    pub initial_max_stream_data_uni: VarInt,
    pub initial_max_streams_bidi: VarInt,
    pub initial_max_streams_uni: VarInt,
    pub ack_delay_exponent: u8,
    pub max_ack_delay: Duration,
    pub disable_active_migration: bool,
    pub active_connection_id_limit: VarInt,
    pub initial_source_connection_id: Option<Vec<u8>>,
    pub retry_source_connection_id: Option<Vec<u8>>,
}

impl Default for TransportParameters {
    fn default() -> Self {
        Self {
            original_destination_connection_id: None,
            max_idle_timeout: Duration::from_secs(30),
            stateless_reset_token: None,
            max_udp_payload_size: VarInt::new_u32(1452),
            initial_max_data: VarInt::new_u32(1 << 20),
            initial_max_stream_data_bidi_local: VarInt::new_u32(1 << 16),
            initial_max_stream_data_bidi_remote: VarInt::new_u32(1 << 16),
            initial_max_stream_data_uni: VarInt::new_u32(1 << 16),
            initial_max_streams_bidi: VarInt::new_u32(100),
            initial_max_streams_uni: VarInt::new_u32(100),
            ack_delay_exponent: 3,
            max_ack_delay: Duration::from_millis(25),
            disable_active_migration: false,
            active_connection_id_limit: VarInt::new_u32(2),
            initial_source_connection_id: None,
            retry_source_connection_id: None,
        }
    }
}

/// Shared, immutable per-endpoint configuration. Cheap to clone (`Arc`-backed).
#[derive(Clone)]
pub struct EndpointConfig {
    pub supported_versions: Vec<u32>,
    pub max_datagram_size: usize,
    pub initial_congestion_window: u64,
    pub transport_parameters: TransportParameters,
    pub tls_factory: Arc<dyn TlsEngineFactory>,
}

impl EndpointConfig {
    pub fn new(tls_factory: Arc<dyn TlsEngineFactory>) -> Self {
        Self {
            supported_versions: crate::SUPPORTED_VERSIONS.to_vec(),
            max_datagram_size: 1200,
            initial_congestion_window: 10 * 1200,
            transport_parameters: TransportParameters::default(),
            tls_factory,
        }
    }

    pub fn with_max_datagram_size(mut self, size: usize) -> Self {
        self.max_datagram_size = size;
        self
    }

    pub fn with_transport_parameters(mut self, params: TransportParameters) -> Self {
        self.transport_parameters = params;
        self
    }
}

/// Client-only knobs layered on top of [`EndpointConfig`].
#[derive(Clone)]
pub struct ClientConfig {
    pub endpoint: EndpointConfig,
    pub server_name: String,
}

/// Server-only knobs layered on top of [`EndpointConfig`].
#[derive(Clone)]
pub struct ServerConfig {
    pub endpoint: EndpointConfig,
    pub require_retry: bool,
}
