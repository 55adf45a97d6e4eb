use super::{Address, METHOD_NO_AUTH, RESERVED, SOCKS5_VERSION};
use bytes::{BufMut, BytesMut};

/// BND.PORT sent with every success reply. It does not reflect the
/// outbound socket.
const SUCCESS_BOUND_PORT: [u8; 2] = [0x00, 0x50];

/// Trailer sent with every connect failure reply.
const FAILURE_BOUND_PORT: [u8; 2] = [0x01, 0xBB];

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Succeeded = 0x00,
    GeneralFailure = 0x01,
    AddressTypeNotSupported = 0x08,
}

impl From<Status> for u8 {
    fn from(status: Status) -> Self {
        status as u8
    }
}

/// Every message the server writes to a client.
#[derive(Debug, Clone, Copy)]
pub enum Reply<'a> {
    /// `VER METHOD`, accepting "no authentication".
    MethodSelection,

    /// `VER 0x00 RSV ATYP DST.ADDR 0x00 0x50`
    Succeeded(&'a Address),

    /// `VER 0x01`, sent when the greeting could not be read.
    GreetingFailure,

    /// `VER STATUS RSV DST.ADDR 0x01 0xBB`. The address is absent when the
    /// request could not be decoded far enough to know it.
    ConnectFailure {
        status: Status,
        address: Option<&'a Address>,
    },
}

impl Reply<'_> {
    pub fn serialized_len(&self) -> usize {
        match self {
            Reply::MethodSelection | Reply::GreetingFailure => 2,
            Reply::Succeeded(address) => 4 + address.serialized_len() + 2,
            Reply::ConnectFailure { address, .. } => {
                3 + address.map_or(0, Address::serialized_len) + 2
            }
        }
    }

    pub fn write_to_buf<B: BufMut>(&self, buf: &mut B) {
        match self {
            Reply::MethodSelection => {
                buf.put_u8(SOCKS5_VERSION);
                buf.put_u8(METHOD_NO_AUTH);
            }
            Reply::Succeeded(address) => {
                buf.put_u8(SOCKS5_VERSION);
                buf.put_u8(Status::Succeeded.into());
                buf.put_u8(RESERVED);
                buf.put_u8(address.address_type().into());
                address.write_to_buf(buf);
                buf.put_slice(&SUCCESS_BOUND_PORT);
            }
            Reply::GreetingFailure => {
                buf.put_u8(SOCKS5_VERSION);
                buf.put_u8(Status::GeneralFailure.into());
            }
            Reply::ConnectFailure { status, address } => {
                buf.put_u8(SOCKS5_VERSION);
                buf.put_u8((*status).into());
                buf.put_u8(RESERVED);
                if let Some(address) = address {
                    address.write_to_buf(buf);
                }
                buf.put_slice(&FAILURE_BOUND_PORT);
            }
        }
    }

    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(self.serialized_len());
        self.write_to_buf(&mut buf);
        buf
    }
}
