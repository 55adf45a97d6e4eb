use super::{Address, AddressType, CMD_CONNECT};
use crate::socks::error::Error;
use bytes::Buf;
use std::net::{Ipv4Addr, Ipv6Addr};

/// A decoded `VER CMD RSV ATYP DST.ADDR DST.PORT` request.
///
/// Only the address encoding is validated. Version and command are carried
/// along as received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub version: u8,
    pub command: u8,
    pub address: Address,
    pub port: u16,
}

impl ConnectRequest {
    /// Decodes a request from the bytes of a single read. Trailing bytes after
    /// DST.PORT are ignored.
    pub fn decode(mut buf: &[u8]) -> Result<Self, Error> {
        need(buf, 4)?;
        let version = buf.get_u8();
        let command = buf.get_u8();
        let _reserved = buf.get_u8();
        let atyp = AddressType::try_from(buf.get_u8())?;

        let address = match atyp {
            AddressType::IPv4 => {
                need(buf, 4)?;
                let mut octets = [0u8; 4];
                buf.copy_to_slice(&mut octets);
                Address::IPv4(Ipv4Addr::from(octets))
            }
            AddressType::Domain => {
                need(buf, 1)?;
                let len = buf.get_u8() as usize;
                need(buf, len)?;
                let host = &buf[..len];
                if !host.is_ascii() {
                    return Err(Error::InvalidDomain);
                }
                let host = String::from_utf8_lossy(host).into_owned();
                buf.advance(len);
                Address::Domain(host)
            }
            AddressType::IPv6 => {
                need(buf, 16)?;
                let mut octets = [0u8; 16];
                buf.copy_to_slice(&mut octets);
                Address::IPv6(Ipv6Addr::from(octets))
            }
        };

        need(buf, 2)?;
        let port = buf.get_u16();

        Ok(ConnectRequest {
            version,
            command,
            address,
            port,
        })
    }

    pub fn is_connect(&self) -> bool {
        self.command == CMD_CONNECT
    }
}

#[inline]
fn need(buf: &[u8], len: usize) -> Result<(), Error> {
    if buf.remaining() < len {
        return Err(Error::Truncated {
            need: len,
            got: buf.remaining(),
        });
    }
    Ok(())
}
