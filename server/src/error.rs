use common::Error as CommonError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
    #[error(transparent)]
    Common(#[from] CommonError),
    /// SOCKS5 RFC 1929 username or password field declared a length that
    /// violates the 31-byte cap this front door enforces.
    #[error("Socks5 sub-negotiation field exceeds the 31 byte limit")]
    AuthLength,
    /// Trailing bytes were present after the declared username/password
    /// lengths were consumed.
    #[error("Socks5 sub-negotiation carried unexpected trailing bytes")]
    AuthExtra,
    /// `GetProxy` waited `pingTimeoutInterval` with no proxy socket arriving.
    #[error("Timed out waiting for a proxy connection")]
    PoolTimeout,
    /// The control session was torn down while a `GetProxy` call was waiting.
    #[error("Control session closed while waiting for a proxy connection")]
    SessionClosed,
    /// A pooled proxy socket was found dead on dequeue.
    #[error("Proxy socket expired before it could be used")]
    StaleProxy,
    /// The SOCKS5 password named a ClientId with no live control session.
    #[error("No control session for client id [{0}]")]
    NotFound(String),
    #[error("Unsupported socks5 version: {0}")]
    ProtocolVer(u8),
    #[error("Unsupported socks5 command: {0}")]
    Cmd(u8),
    #[error("Unsupported socks5 address type: {0}")]
    AddressType(u8),
}
