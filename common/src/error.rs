use protocol::Error as ProtocolError;
use thiserror::Error;
use tracing::metadata::ParseLevelError;

/// Transport-level failure kinds shared by every listener. Session- and
/// pool-specific kinds (`PoolTimeout`, `SessionClosed`, `StaleProxy`,
/// `NotFound`, `AuthLength`, `AuthExtra`) live in `server::Error`, which
/// wraps this one.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    ParseLevel(#[from] ParseLevelError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("Frame length {0} exceeds the 16 MiB limit")]
    FrameTooLarge(u64),
    #[error("Connection closed before any byte was read")]
    Eof,
}

impl From<Error> for std::io::Error {
    fn from(value: Error) -> Self {
        std::io::Error::other(format!("{value:?}"))
    }
}
