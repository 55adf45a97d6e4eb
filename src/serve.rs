use crate::{
    config::Config,
    connect::Connector,
    socks::{server::ShutdownPolicy, Socks5Server},
    BootArgs, Result,
};
use std::{net::SocketAddr, time::Duration};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// The `Serve` trait defines a common interface for running a proxy server.
///
/// Implementors bind in their constructor and accept connections in `serve`
/// until they are told to stop or the listener fails.
///
/// # Example
///
/// ```rust
/// struct MyServer;
///
/// impl Serve for MyServer {
///     async fn serve(self) -> std::io::Result<()> {
///         // Server implementation
///         Ok(())
///     }
/// }
///
/// let server = MyServer;
/// server.serve().await?;
/// ```
pub trait Serve {
    /// Runs the server until shutdown.
    ///
    /// # Returns
    ///
    /// `Ok(())` after a requested shutdown, or the error that stopped the
    /// accept loop.
    async fn serve(self) -> std::io::Result<()>;
}

/// Run the server with the provided boot arguments.
pub fn run(args: BootArgs) -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive(args.log.into());

    tracing::subscriber::set_global_default(
        FmtSubscriber::builder()
            .with_max_level(args.log)
            .with_env_filter(filter)
            .finish(),
    )?;

    let ctx = Config::load(&args)?.into_context();

    tracing::info!("OS: {}", std::env::consts::OS);
    tracing::info!("Arch: {}", std::env::consts::ARCH);
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Name: {}", ctx.name);
    tracing::info!("Concurrent: {}", ctx.concurrent);
    tracing::info!(
        "Deadlines: read {:?}, write {:?}",
        ctx.read_timeout,
        ctx.write_timeout
    );
    tracing::info!("Shutdown: {:?}", ctx.shutdown);

    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(num_cpus::get())
        .enable_all()
        .build()?
        .block_on(async {
            let server = Socks5Server::new(ctx)?;
            server.serve().await.map_err(Into::into)
        })
}

/// Owned configuration and resources handed to the server at construction.
pub struct Context {
    /// Server name
    pub name: String,

    /// Bind address
    pub bind: SocketAddr,

    /// Maximum number of concurrent sessions
    pub concurrent: usize,

    /// Read deadline, measured from accept
    pub read_timeout: Duration,

    /// Write deadline, measured from accept
    pub write_timeout: Duration,

    /// What `stop` does about sessions still in flight
    pub shutdown: ShutdownPolicy,

    /// Outbound dialer
    pub connector: Connector,
}
