//! Core Error Types
//!
//! Protocol violations are a typed, expected error channel; fatal transport
//! failures stay `std::io::Error` and always tear the session down. The two
//! are deliberately never unified under one type.

/// Protocol-level violation detected while encoding or decoding frames.
///
/// Recoverable at the acceptor level: the offending connection is closed,
/// nothing else is affected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("frame body length {length} exceeds maximum {max}")]
    BodyTooLarge { length: usize, max: usize },
}

/// Errors raised while bringing the core up or tearing it down.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("reactor pool requires at least one worker")]
    NoReactorWorkers,

    #[error("reactor thread failed to start: {0}")]
    ReactorStart(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
