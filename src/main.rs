pub mod alloc;
mod config;
mod connect;
mod error;
mod serve;
mod socks;

use clap::{Args, Parser, Subcommand};
use std::{net::SocketAddr, path::PathBuf};

type Result<T, E = error::Error> = std::result::Result<T, E>;

#[derive(Parser)]
#[clap(author, version, about, arg_required_else_help = true)]
#[command(args_conflicts_with_subcommands = true)]
struct Opt {
    #[clap(subcommand)]
    commands: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run server
    Run(BootArgs),
}

#[derive(Args, Clone)]
pub struct BootArgs {
    /// Log level e.g. trace, debug, info, warn, error
    #[clap(long, env = "VSOCKS_LOG", default_value = "info")]
    log: tracing::Level,

    /// Server name, used to tag log output
    #[clap(short, long, default_value = env!("CARGO_PKG_NAME"))]
    name: String,

    /// Bind address
    #[clap(short, long, default_value = "0.0.0.0:1080")]
    bind: SocketAddr,

    /// Concurrent sessions
    #[clap(short, long, default_value = "1024")]
    concurrent: usize,

    /// Read deadline in seconds, set once when the connection is accepted
    #[clap(long, default_value = "10")]
    read_timeout: u64,

    /// Write deadline in seconds, set once when the connection is accepted
    #[clap(long, default_value = "30")]
    write_timeout: u64,

    /// Outbound connect timeout in seconds (system default if unset)
    #[clap(short = 'T', long)]
    connect_timeout: Option<u64>,

    /// Seconds to wait for in-flight sessions on shutdown, 0 to not wait
    #[clap(long, default_value = "0")]
    shutdown_grace: u64,

    /// JSON config file, overrides the server options above
    #[clap(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let opt = Opt::parse();
    match opt.commands {
        Commands::Run(args) => serve::run(args),
    }
}
