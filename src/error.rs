use thiserror::Error;

/// Error taxonomy for the whole crate (spec.md §7).
///
/// Hot audio paths never propagate these; they log and drop instead.
/// Everything that reaches the connection supervisor's status channel
/// is one of these variants.
#[derive(Debug, Error, Clone)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("codec unavailable: {0}")]
    CodecUnavailable(String),

    #[error("audio device error: {0}")]
    Device(String),

    #[error("discovery error: {0}")]
    Discovery(String),

    #[error("malformed signal record: {0}")]
    SignalParse(String),

    #[error("negotiation timed out")]
    NegotiationTimeout,

    #[error("negotiation failed: {0}")]
    Negotiation(String),

    #[error("ice connection failed")]
    IceFailed,

    #[error("ice connection disconnected")]
    IceDisconnected,

    #[error("ice connection closed")]
    IceClosed,

    #[error("peer connection failed")]
    ConnectionFailed,

    #[error("peer connection closed")]
    ConnectionClosed,
}
