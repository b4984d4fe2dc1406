//! Chain connect error types.

use thiserror::Error;

/// What went wrong while connecting through a chain.
#[derive(Debug, Error)]
pub enum ChainErrorKind {
    #[error("resolution: {0}")]
    Resolution(String),
    #[error("timeout during handshake")]
    Timeout,
    #[error("proxy protocol: {0}")]
    Protocol(String),
    #[error("socks5 user/pass authentication not implemented")]
    Unimplemented,
    #[error("upstream: {0}")]
    Upstream(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl From<hopper_proto::ProtocolError> for ChainErrorKind {
    fn from(e: hopper_proto::ProtocolError) -> Self {
        match e {
            hopper_proto::ProtocolError::Io(e) => ChainErrorKind::Io(e),
            other => ChainErrorKind::Protocol(other.to_string()),
        }
    }
}

/// A chain connect failure together with the hop trace accumulated up to
/// the failing hop. The trace feeds the audit log; it is never empty after
/// the first dial attempt.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct ChainError {
    pub kind: ChainErrorKind,
    pub trace: String,
}

impl ChainError {
    pub(crate) fn bare(kind: ChainErrorKind) -> Self {
        Self {
            kind,
            trace: String::new(),
        }
    }
}
