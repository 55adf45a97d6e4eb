use crate::{
    connect::Connector, serve::Context, socks::server::ShutdownPolicy, BootArgs, Result,
};
use serde::Deserialize;
use std::{net::SocketAddr, path::Path, time::Duration};

/// Server settings, either taken from the command line or loaded from a
/// JSON config file layered on top of it.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub name: String,
    pub bind: SocketAddr,
    pub concurrent: usize,
    pub read_timeout: u64,
    pub write_timeout: u64,
    pub connect_timeout: Option<u64>,
    pub shutdown_grace: u64,
}

/// Fields present in a config file. Anything left out keeps the value
/// from the command line.
#[derive(Deserialize, Default, Debug)]
#[serde(deny_unknown_fields)]
struct Overrides {
    name: Option<String>,
    bind: Option<SocketAddr>,
    concurrent: Option<usize>,
    read_timeout: Option<u64>,
    write_timeout: Option<u64>,
    connect_timeout: Option<u64>,
    shutdown_grace: Option<u64>,
}

impl From<&BootArgs> for Config {
    fn from(args: &BootArgs) -> Self {
        Config {
            name: args.name.clone(),
            bind: args.bind,
            concurrent: args.concurrent,
            read_timeout: args.read_timeout,
            write_timeout: args.write_timeout,
            connect_timeout: args.connect_timeout,
            shutdown_grace: args.shutdown_grace,
        }
    }
}

impl Config {
    /// Builds the config for a run: the command line options, overridden by
    /// the `--config` file when one is given.
    pub fn load(args: &BootArgs) -> Result<Self> {
        let base = Config::from(args);
        match &args.config {
            Some(path) => base.merge_file(path),
            None => Ok(base),
        }
    }

    fn merge_file(self, path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        tracing::debug!("loaded config file {}", path.display());
        self.merge_slice(&data)
    }

    fn merge_slice(self, data: &[u8]) -> Result<Self> {
        let overrides: Overrides = serde_json::from_slice(data)?;
        Ok(Config {
            name: overrides.name.unwrap_or(self.name),
            bind: overrides.bind.unwrap_or(self.bind),
            concurrent: overrides.concurrent.unwrap_or(self.concurrent),
            read_timeout: overrides.read_timeout.unwrap_or(self.read_timeout),
            write_timeout: overrides.write_timeout.unwrap_or(self.write_timeout),
            connect_timeout: overrides.connect_timeout.or(self.connect_timeout),
            shutdown_grace: overrides.shutdown_grace.unwrap_or(self.shutdown_grace),
        })
    }

    /// Converts the settings into the owned server context.
    pub fn into_context(self) -> Context {
        let shutdown = match self.shutdown_grace {
            0 => ShutdownPolicy::Immediate,
            secs => ShutdownPolicy::Drain(Duration::from_secs(secs)),
        };

        Context {
            name: self.name,
            bind: self.bind,
            // A zero-sized pool would never admit anything.
            concurrent: self.concurrent.max(1),
            read_timeout: Duration::from_secs(self.read_timeout),
            write_timeout: Duration::from_secs(self.write_timeout),
            shutdown,
            connector: Connector::new(self.connect_timeout.map(Duration::from_secs)),
        }
    }
}
