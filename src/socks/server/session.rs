use super::deadline::DeadlineStream;
use crate::{
    connect::Connector,
    socks::{
        error::Error,
        proto::{ConnectRequest, Reply, MAX_GREETING_LEN, MAX_REQUEST_LEN, SOCKS5_VERSION},
    },
};
use std::net::{IpAddr, SocketAddr};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::TcpStream,
};
use tracing::{instrument, Level};

/// Negotiation progress of a session.
///
/// ```plaintext
/// New --greeting read--> Initializing --dialed--> Connected
///  |                          |
///  +--------------------------+-----------------> Error
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    New,
    Initializing,
    Connected,
    Error,
}

/// One client connection, taken from greeting to an open outbound
/// connection. Dropping the session closes both connections.
pub struct Session<S> {
    stream: DeadlineStream<S>,
    peer: SocketAddr,
    state: State,
    outbound: Option<TcpStream>,
    outbound_ip: Option<IpAddr>,
    outbound_port: Option<u16>,
}

impl<S> Session<S> {
    pub fn new(stream: DeadlineStream<S>, peer: SocketAddr) -> Self {
        Session {
            stream,
            peer,
            state: State::New,
            outbound: None,
            outbound_ip: None,
            outbound_port: None,
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn outbound_ip(&self) -> Option<IpAddr> {
        self.outbound_ip
    }

    pub fn outbound_port(&self) -> Option<u16> {
        self.outbound_port
    }

    /// Splits a connected session into the client stream, without its
    /// negotiation deadlines, and the outbound connection.
    pub fn into_parts(self) -> (S, Option<TcpStream>) {
        (self.stream.into_inner(), self.outbound)
    }

    fn set_state(&mut self, state: State) {
        tracing::trace!("[SOCKS5] {} {:?} -> {:?}", self.peer, self.state, state);
        self.state = state;
    }
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Runs the greeting and CONNECT exchange.
    ///
    /// On success the session is `Connected` and owns the outbound
    /// connection. On failure the matching error reply has already been sent,
    /// the client stream is shut down and the session is in `Error`.
    #[instrument(skip_all, fields(peer = %self.peer), level = Level::DEBUG)]
    pub async fn establish(&mut self, connector: &Connector) -> Result<(), Error> {
        if let Err(err) = self.greet().await {
            self.reply_error(Reply::GreetingFailure).await;
            return Err(err);
        }

        if let Err(err) = self.write_reply(Reply::MethodSelection).await {
            self.reply_error(Reply::GreetingFailure).await;
            return Err(err);
        }

        let request = match self.read_request().await {
            Ok(request) => request,
            Err(err) => {
                self.reply_error(Reply::ConnectFailure {
                    status: err.status(),
                    address: None,
                })
                .await;
                return Err(err);
            }
        };

        let outbound = match connector.dial(&request).await {
            Ok(outbound) => outbound,
            Err(err) => {
                self.reply_error(Reply::ConnectFailure {
                    status: err.status(),
                    address: Some(&request.address),
                })
                .await;
                return Err(err);
            }
        };

        if let Err(err) = self.write_reply(Reply::Succeeded(&request.address)).await {
            self.set_state(State::Error);
            return Err(err);
        }

        self.outbound_ip = outbound.peer_addr().ok().map(|addr| addr.ip());
        self.outbound_port = Some(request.port);
        self.outbound = Some(outbound);
        self.set_state(State::Connected);

        tracing::debug!(
            "[SOCKS5] {} connected to {}:{}",
            self.peer,
            request.address,
            request.port
        );
        Ok(())
    }

    /// Reads the method negotiation message. Only the version is looked at,
    /// and a wrong one is logged rather than refused.
    async fn greet(&mut self) -> Result<(), Error> {
        let mut buf = [0u8; MAX_GREETING_LEN];
        let n = self.read_some(&mut buf).await?;

        let (version, nmethods) = (buf[0], buf[1]);
        tracing::debug!(
            "[SOCKS5] {} greeting: version {:#04x}, {} methods, {} bytes",
            self.peer,
            version,
            nmethods,
            n
        );
        tracing::trace!("[SOCKS5] {} greeting bytes {:02x?}", self.peer, &buf[..n]);

        if version != SOCKS5_VERSION {
            tracing::warn!(
                "[SOCKS5] {} version mismatch: expected {:#04x}, received {:#04x}",
                self.peer,
                SOCKS5_VERSION,
                version
            );
        }

        self.set_state(State::Initializing);
        Ok(())
    }

    async fn read_request(&mut self) -> Result<ConnectRequest, Error> {
        let mut buf = [0u8; MAX_REQUEST_LEN];
        let n = self.read_some(&mut buf).await?;
        let request = ConnectRequest::decode(&buf[..n])?;
        tracing::debug!(
            "[SOCKS5] {} request: version {:#04x}, command {:#04x}, {}:{}",
            self.peer,
            request.version,
            request.command,
            request.address,
            request.port
        );

        if !request.is_connect() {
            tracing::debug!(
                "[SOCKS5] {} command {:#04x} treated as CONNECT",
                self.peer,
                request.command
            );
        }
        Ok(request)
    }

    async fn read_some(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        match self.stream.read(buf).await? {
            0 => Err(Error::Closed),
            n => Ok(n),
        }
    }

    async fn write_reply(&mut self, reply: Reply<'_>) -> Result<(), Error> {
        self.stream.write_all(&reply.encode()).await?;
        Ok(())
    }

    /// Moves to `Error`, sends `reply` and closes the client side. The client
    /// may already be gone, so write failures are only logged.
    async fn reply_error(&mut self, reply: Reply<'_>) {
        self.set_state(State::Error);
        if let Err(err) = self.write_reply(reply).await {
            tracing::trace!("[SOCKS5] {} failed to send error reply: {}", self.peer, err);
        }
        let _ = self.stream.shutdown().await;
    }
}
