pub mod error;
pub mod proto;
pub mod relay;
pub mod server;

pub use server::Socks5Server;
