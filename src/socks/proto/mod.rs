//! SOCKS5 wire format, limited to the no-auth CONNECT subset.
//!
//! ```plaintext
//! +----+-----+-------+------+----------+----------+
//! |VER | CMD |  RSV  | ATYP | DST.ADDR | DST.PORT |
//! +----+-----+-------+------+----------+----------+
//! | 1  |  1  | X'00' |  1   | Variable |    2     |
//! +----+-----+-------+------+----------+----------+
//! ```

mod address;
mod reply;
mod request;

pub use self::{
    address::{Address, AddressType},
    reply::{Reply, Status},
    request::ConnectRequest,
};

pub const SOCKS5_VERSION: u8 = 0x05;

pub const METHOD_NO_AUTH: u8 = 0x00;

pub const CMD_CONNECT: u8 = 0x01;

pub const RESERVED: u8 = 0x00;

/// Upper bound of a single greeting read.
pub const MAX_GREETING_LEN: usize = 20;

/// Upper bound of a single connect request read.
pub const MAX_REQUEST_LEN: usize = 200;
