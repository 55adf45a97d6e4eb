pub mod admission;
pub mod deadline;
pub mod session;

use self::{
    admission::{Admission, Slot},
    deadline::DeadlineStream,
    session::Session,
};
use super::relay::{CopyRelay, Relay};
use crate::{
    connect::Connector,
    serve::{Context, Serve},
};
use std::{future::Future, io, net::SocketAddr, sync::Arc, time::Duration};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tracing::{instrument, Level};

/// What `stop` does about sessions that are still running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownPolicy {
    /// Return as soon as the acceptor and dispatcher are gone. Running
    /// sessions carry on detached.
    Immediate,

    /// Additionally wait up to the given period for running sessions to end.
    Drain(Duration),
}

/// An accepted connection on its way from the acceptor to the dispatcher.
struct Incoming {
    stream: DeadlineStream<TcpStream>,
    peer: SocketAddr,
}

/// A bound, not yet started, SOCKS5 server.
///
/// `start` consumes the server, so a stopped server cannot be started again.
pub struct Socks5Server<R = CopyRelay> {
    name: String,
    listener: TcpListener,
    admission: Admission,
    read_timeout: Duration,
    write_timeout: Duration,
    shutdown: ShutdownPolicy,
    connector: Arc<Connector>,
    relay: Arc<R>,
}

impl Socks5Server {
    /// Create a new socks5 server bound to `ctx.bind`.
    pub fn new(ctx: Context) -> std::io::Result<Self> {
        let socket = if ctx.bind.is_ipv4() {
            tokio::net::TcpSocket::new_v4()?
        } else {
            tokio::net::TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        socket.bind(ctx.bind)?;

        let backlog = u32::try_from(ctx.concurrent).unwrap_or(u32::MAX);

        Ok(Self {
            name: ctx.name,
            listener: socket.listen(backlog)?,
            admission: Admission::new(ctx.concurrent),
            read_timeout: ctx.read_timeout,
            write_timeout: ctx.write_timeout,
            shutdown: ctx.shutdown,
            connector: Arc::new(ctx.connector),
            relay: Arc::new(CopyRelay),
        })
    }
}

impl<R: Relay> Socks5Server<R> {
    /// Overwrite relay.
    pub fn relay<T: Relay>(self, relay: T) -> Socks5Server<T> {
        Socks5Server {
            name: self.name,
            listener: self.listener,
            admission: self.admission,
            read_timeout: self.read_timeout,
            write_timeout: self.write_timeout,
            shutdown: self.shutdown,
            connector: self.connector,
            relay: Arc::new(relay),
        }
    }

    /// Starts the acceptor and the dispatcher.
    pub fn start(self) -> io::Result<Running> {
        let local_addr = self.listener.local_addr()?;
        tracing::info!(
            "[{}] Socks5 server listening on {} (max {} sessions)",
            self.name,
            local_addr,
            self.admission.capacity()
        );

        let (shutdown, shutdown_rx) = watch::channel(false);
        // The acceptor reserves the single slot before it accepts, which keeps
        // the queue as tight as a rendezvous.
        let (handoff, handoff_rx) = mpsc::channel(1);

        let acceptor = tokio::spawn(accept_loop(
            self.name.clone(),
            self.listener,
            handoff,
            shutdown_rx.clone(),
            self.read_timeout,
            self.write_timeout,
        ));

        let dispatcher = tokio::spawn(dispatch_loop(
            self.name.clone(),
            handoff_rx,
            shutdown_rx,
            self.admission.clone(),
            self.connector,
            self.relay,
        ));

        Ok(Running {
            name: self.name,
            local_addr,
            shutdown,
            acceptor,
            dispatcher,
            admission: self.admission,
            policy: self.shutdown,
        })
    }
}

impl<R: Relay> Serve for Socks5Server<R> {
    async fn serve(self) -> std::io::Result<()> {
        let running = self.start()?;
        let local_addr = running.local_addr();

        let res = running
            .run_until(async {
                if let Err(err) = tokio::signal::ctrl_c().await {
                    tracing::error!("failed to listen for ctrl-c: {}", err);
                }
            })
            .await;

        tracing::info!("Socks5 server on {} exited", local_addr);
        res
    }
}

/// A started server.
pub struct Running {
    name: String,
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    acceptor: JoinHandle<io::Result<()>>,
    dispatcher: JoinHandle<()>,
    admission: Admission,
    policy: ShutdownPolicy,
}

impl Running {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of sessions holding an admission slot.
    pub fn in_flight(&self) -> usize {
        self.admission.in_flight()
    }

    /// Runs until `signal` completes or the acceptor fails, then shuts down.
    /// An accept error is returned to the caller.
    pub async fn run_until<F: Future>(mut self, signal: F) -> io::Result<()> {
        tokio::select! {
            res = &mut self.acceptor => {
                let res = flatten(res);
                self.wind_down().await;
                res
            }
            _ = signal => self.stop().await,
        }
    }

    /// Closes the listener and the handoff queue and waits for the dispatcher
    /// to exit. Whether running sessions are waited for is up to the
    /// configured `ShutdownPolicy`; they are never cut off.
    pub async fn stop(mut self) -> io::Result<()> {
        tracing::info!("[{}] stopping", self.name);
        let _ = self.shutdown.send(true);
        let res = flatten((&mut self.acceptor).await);
        self.wind_down().await;
        res
    }

    async fn wind_down(mut self) {
        let _ = self.shutdown.send(true);
        if let Err(err) = (&mut self.dispatcher).await {
            tracing::error!("[{}] dispatcher failed: {}", self.name, err);
        }

        match self.policy {
            ShutdownPolicy::Immediate => {
                let in_flight = self.in_flight();
                if in_flight > 0 {
                    tracing::info!("[{}] leaving {} sessions running", self.name, in_flight);
                }
            }
            ShutdownPolicy::Drain(grace) => {
                if !self.admission.drain(grace).await {
                    tracing::warn!(
                        "[{}] {} sessions still running after {:?}",
                        self.name,
                        self.in_flight(),
                        grace
                    );
                }
            }
        }
        tracing::info!("[{}] stopped", self.name);
    }
}

#[inline]
fn flatten(res: Result<io::Result<()>, tokio::task::JoinError>) -> io::Result<()> {
    match res {
        Ok(res) => res,
        Err(err) => Err(err.into()),
    }
}

/// Accepts connections, stamps their deadlines and hands them to the
/// dispatcher one at a time. Returning closes both the listener and the
/// handoff queue.
async fn accept_loop(
    name: String,
    listener: TcpListener,
    handoff: mpsc::Sender<Incoming>,
    mut shutdown: watch::Receiver<bool>,
    read_timeout: Duration,
    write_timeout: Duration,
) -> io::Result<()> {
    loop {
        let permit = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            permit = handoff.reserve() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let (stream, peer) = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            res = listener.accept() => match res {
                Ok(conn) => conn,
                Err(err) => {
                    tracing::error!("[{}] error while accepting: {}", name, err);
                    return Err(err);
                }
            },
        };

        tracing::debug!("[{}] received connection request from {}", name, peer);
        permit.send(Incoming {
            stream: DeadlineStream::new(stream, read_timeout, write_timeout),
            peer,
        });
    }

    tracing::debug!("[{}] acceptor stopped", name);
    Ok(())
}

/// Admits connections in acceptance order, one session task per slot.
/// Exits without waiting for sessions once the queue closes or shutdown is
/// signalled.
async fn dispatch_loop<R: Relay>(
    name: String,
    mut handoff: mpsc::Receiver<Incoming>,
    mut shutdown: watch::Receiver<bool>,
    admission: Admission,
    connector: Arc<Connector>,
    relay: Arc<R>,
) {
    loop {
        let incoming = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            incoming = handoff.recv() => match incoming {
                Some(incoming) => incoming,
                None => break,
            },
        };

        let slot = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            slot = admission.acquire() => match slot {
                Ok(slot) => slot,
                Err(_) => break,
            },
        };

        tokio::spawn(run_session(
            incoming,
            slot,
            connector.clone(),
            relay.clone(),
        ));
    }

    tracing::debug!("[{}] dispatcher stopped", name);
}

#[instrument(skip_all, fields(peer = %incoming.peer), level = Level::DEBUG)]
async fn run_session<R: Relay>(
    incoming: Incoming,
    slot: Slot,
    connector: Arc<Connector>,
    relay: Arc<R>,
) {
    // Held for the whole session, relay included.
    let _slot = slot;

    let mut session = Session::new(incoming.stream, incoming.peer);
    if let Err(err) = session.establish(&connector).await {
        tracing::debug!(
            "[SOCKS5] {} {:?}: {}",
            incoming.peer,
            session.state(),
            err
        );
        return;
    }

    if let Err(err) = relay.handle(session).await {
        tracing::debug!("[SOCKS5] {} relay error: {}", incoming.peer, err);
    }
}
