pub mod bits;
pub mod codec;
pub mod config;
pub mod connection;
pub mod crypto;
pub mod error;
pub mod handshake;
pub mod macros;
pub mod packet;
pub mod primitives;
pub mod recovery;
pub mod runtime;

pub use error::{QuicheError, QuicheResult};

/// draft-ietf-quic-transport version this crate speaks on the wire (§6 pinned version list).
pub const QUIC_VERSION: u32 = 0x0000_0001;

/// Negotiation-only version that signals a VERSION_NEGOTIATION packet.
pub const VERSION_NEGOTIATION: u32 = 0x0000_0000;

/// Versions this endpoint is willing to speak, most preferred first.
pub const SUPPORTED_VERSIONS: &[u32] = &[QUIC_VERSION];
