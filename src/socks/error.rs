use super::proto::Status;
use std::net::SocketAddr;

/// Everything that can end a session before it reaches the relay.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("client closed the connection")]
    Closed,

    #[error("request truncated: need {need} more bytes, got {got}")]
    Truncated { need: usize, got: usize },

    #[error("domain name is not ascii")]
    InvalidDomain,

    #[error("address type {0:#04x} not supported")]
    UnsupportedAddressType(u8),

    #[error("failed to resolve {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no address found for {0}")]
    NoAddress(String),

    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Status code carried by the connect failure reply for this error.
    pub fn status(&self) -> Status {
        match self {
            Error::UnsupportedAddressType(_) => Status::AddressTypeNotSupported,
            _ => Status::GeneralFailure,
        }
    }
}
