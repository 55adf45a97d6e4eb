use super::server::session::Session;
use std::{
    future::Future,
    io::{Error, ErrorKind},
};
use tokio::io::{AsyncRead, AsyncWrite};

/// Takes over a session once it reached `Connected` and moves bytes between
/// the client and the outbound connection.
pub trait Relay: Send + Sync + 'static {
    fn handle<S>(&self, session: Session<S>) -> impl Future<Output = std::io::Result<()>> + Send
    where
        S: AsyncRead + AsyncWrite + Unpin + Send;
}

/// Relays with `tokio::io::copy_bidirectional` until either side closes.
#[derive(Clone, Copy, Debug, Default)]
pub struct CopyRelay;

impl Relay for CopyRelay {
    async fn handle<S>(&self, session: Session<S>) -> std::io::Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let peer = session.peer();
        let target = (session.outbound_ip(), session.outbound_port());
        let (mut client, outbound) = session.into_parts();
        let mut outbound =
            outbound.ok_or_else(|| Error::new(ErrorKind::NotConnected, "session not connected"))?;

        match tokio::io::copy_bidirectional(&mut client, &mut outbound).await {
            Ok((from_client, from_server)) => {
                tracing::debug!(
                    "[TCP] {} -> {:?} wrote {} bytes and received {} bytes",
                    peer,
                    target,
                    from_client,
                    from_server
                );
            }
            Err(err) => {
                tracing::trace!("[TCP] {} tunnel error: {}", peer, err);
            }
        }

        Ok(())
    }
}
