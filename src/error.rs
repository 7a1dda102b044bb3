use thiserror::Error;

pub type QuicheResult<T> = Result<T, QuicheError>;

/// Transport error codes from RFC9000 §20.1, carried in CONNECTION_CLOSE frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum TransportErrorCode {
    NoError = 0x00,
    InternalError = 0x01,
    ConnectionRefused = 0x02,
    FlowControlError = 0x03,
    StreamLimitError = 0x04,
    StreamStateError = 0x05,
    FinalSizeError = 0x06,
    FrameEncodingError = 0x07,
    TransportParameterError = 0x08,
    ConnectionIdLimitError = 0x09,
    ProtocolViolation = 0x0a,
    InvalidToken = 0x0b,
    ApplicationError = 0x0c,
    CryptoBufferExceeded = 0x0d,
    KeyUpdateError = 0x0e,
    AeadLimitReached = 0x0f,
    NoViablePath = 0x10,
}

impl TransportErrorCode {
    pub fn code(self) -> u64 {
        self as u64
    }

    /// Maps a TLS alert to the 0x100+alert crypto error range (RFC9000 §4.8).
    pub fn from_tls_alert(alert: u8) -> u64 {
        0x0100 + alert as u64
    }
}

/// Application-facing errors for a single QUIC connection. Mirrors §7 of the design.
#[derive(Debug, Error)]
pub enum QuicheError {
    #[error("transport error {code:?} on frame {frame_type:#x}: {reason}")]
    Transport {
        code: TransportErrorCode,
        frame_type: u64,
        reason: String,
    },

    #[error("application error {code}: {reason}")]
    Application { code: u64, reason: String },

    #[error("handshake failed: tls alert {0}")]
    HandshakeFailed(u8),

    #[error("server does not support any of the requested versions")]
    VersionNegotiationFailed,

    #[error("retry with version {0:#x}")]
    NextVersion(u32),

    #[error("operation attempted on a closed connection")]
    ConnectionIsClosed,

    #[error("no QUIC version configured")]
    NoVersionIsSpecified,

    #[error("invalid internal state: {0}")]
    BadThingHappen(String),

    #[error("malformed wire data: {0}")]
    Malformed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for QuicheError {
    fn from(err: tokio::sync::mpsc::error::SendError<T>) -> Self {
        QuicheError::BadThingHappen(err.to_string())
    }
}

pub fn require(cond: bool, msg: &str) -> QuicheResult<()> {
    if !cond {
        return Err(QuicheError::Malformed(msg.to_string()));
    }
    Ok(())
}

pub fn transport_error(
    code: TransportErrorCode,
    frame_type: u64,
    reason: impl Into<String>,
) -> QuicheError {
    QuicheError::Transport {
        code,
        frame_type,
        reason: reason.into(),
    }
}
