use crate::socks::{
    error::Error,
    proto::{Address, ConnectRequest},
};
use std::{
    net::{IpAddr, SocketAddr},
    time::Duration,
};
use tokio::{
    net::{lookup_host, TcpStream},
    time::timeout,
};

/// `Connector` resolves and dials the destination of a CONNECT request.
#[derive(Clone, Debug, Default)]
pub struct Connector {
    /// Optional connect timeout. Without it a dial waits as long as the
    /// operating system lets it.
    connect_timeout: Option<Duration>,
}

impl Connector {
    pub fn new(connect_timeout: Option<Duration>) -> Self {
        Connector { connect_timeout }
    }

    /// Opens the outbound connection for a decoded request.
    ///
    /// IPv4 and IPv6 destinations are dialed directly. A domain is resolved
    /// first and only the first address returned is dialed; nothing is dialed
    /// when resolution fails.
    ///
    /// # Example
    ///
    /// ```
    /// let connector = Connector::new(None);
    /// let request = ConnectRequest::decode(&[5, 1, 0, 1, 127, 0, 0, 1, 0x1f, 0x90])?;
    /// let stream = connector.dial(&request).await?;
    /// ```
    pub async fn dial(&self, request: &ConnectRequest) -> Result<TcpStream, Error> {
        match &request.address {
            Address::IPv4(ip) => {
                self.connect(SocketAddr::new(IpAddr::V4(*ip), request.port))
                    .await
            }
            Address::Domain(host) => self.connect_with_domain(host, request.port).await,
            Address::IPv6(ip) => {
                self.connect(SocketAddr::new(IpAddr::V6(*ip), request.port))
                    .await
            }
        }
    }

    /// Resolves `host` and returns the first address found.
    pub async fn resolve(&self, host: &str, port: u16) -> Result<SocketAddr, Error> {
        let mut addrs = lookup_host((host, port))
            .await
            .map_err(|source| Error::Resolve {
                host: host.to_owned(),
                source,
            })?;

        let addr = addrs
            .next()
            .ok_or_else(|| Error::NoAddress(host.to_owned()))?;
        tracing::debug!("resolved {} to {}", host, addr);
        Ok(addr)
    }

    #[inline]
    pub async fn connect_with_domain(&self, host: &str, port: u16) -> Result<TcpStream, Error> {
        let addr = self.resolve(host, port).await?;
        self.connect(addr).await
    }

    /// Dials `target_addr`, bounded by the connect timeout when one is set.
    pub async fn connect(&self, target_addr: SocketAddr) -> Result<TcpStream, Error> {
        let res = match self.connect_timeout {
            Some(connect_timeout) => {
                match timeout(connect_timeout, TcpStream::connect(target_addr)).await {
                    Ok(res) => res,
                    Err(elapsed) => Err(elapsed.into()),
                }
            }
            None => TcpStream::connect(target_addr).await,
        };

        res.and_then(|stream| {
            tracing::info!("connect {} via {}", target_addr, stream.local_addr()?);
            Ok(stream)
        })
        .map_err(|source| Error::Connect {
            addr: target_addr,
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};
    use tokio::net::TcpListener;

    fn request(address: Address, port: u16) -> ConnectRequest {
        ConnectRequest {
            version: 5,
            command: 1,
            address,
            port,
        }
    }

    #[tokio::test]
    async fn test_dial_ipv4() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let stream = Connector::default()
            .dial(&request(Address::IPv4(Ipv4Addr::LOCALHOST), port))
            .await
            .unwrap();

        let (_, peer) = listener.accept().await.unwrap();
        assert_eq!(stream.peer_addr().unwrap().to_string(), format!("127.0.0.1:{port}"));
        assert_eq!(peer, stream.local_addr().unwrap());
    }

    #[tokio::test]
    async fn test_dial_ipv6() {
        // Skip where the loopback has no IPv6.
        let Ok(listener) = TcpListener::bind("[::1]:0").await else {
            return;
        };
        let port = listener.local_addr().unwrap().port();

        let stream = Connector::default()
            .dial(&request(Address::IPv6(Ipv6Addr::LOCALHOST), port))
            .await
            .unwrap();

        assert_eq!(stream.peer_addr().unwrap().to_string(), format!("[::1]:{port}"));
    }

    #[tokio::test]
    async fn test_dial_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = Connector::new(Some(Duration::from_secs(5)))
            .connect(addr)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Connect { addr: failed, .. } if failed == addr));
    }

    #[tokio::test]
    async fn test_resolve_failure_is_not_a_connect_error() {
        // .invalid never resolves
        let err = Connector::default()
            .dial(&request(Address::Domain("vsocks.invalid".to_owned()), 80))
            .await
            .unwrap_err();
        assert!(
            matches!(err, Error::Resolve { .. } | Error::NoAddress(_)),
            "unexpected error: {err}"
        );
    }

    #[tokio::test]
    async fn test_resolve_literal() {
        let addr = Connector::default().resolve("127.0.0.1", 8080).await.unwrap();
        assert_eq!(addr, "127.0.0.1:8080".parse().unwrap());
    }
}
