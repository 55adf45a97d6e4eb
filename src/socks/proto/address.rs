use crate::socks::error::Error;
use bytes::BufMut;
use std::{
    fmt,
    net::{Ipv4Addr, Ipv6Addr},
};

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressType {
    IPv4 = 0x01,
    Domain = 0x03,
    IPv6 = 0x04,
}

impl TryFrom<u8> for AddressType {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0x01 => Ok(AddressType::IPv4),
            0x03 => Ok(AddressType::Domain),
            0x04 => Ok(AddressType::IPv6),
            code => Err(Error::UnsupportedAddressType(code)),
        }
    }
}

impl From<AddressType> for u8 {
    fn from(atyp: AddressType) -> Self {
        atyp as u8
    }
}

/// Destination of a CONNECT request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    IPv4(Ipv4Addr),
    Domain(String),
    IPv6(Ipv6Addr),
}

impl Address {
    pub fn address_type(&self) -> AddressType {
        match self {
            Address::IPv4(_) => AddressType::IPv4,
            Address::Domain(_) => AddressType::Domain,
            Address::IPv6(_) => AddressType::IPv6,
        }
    }

    /// Writes DST.ADDR exactly as it is encoded on the wire: four or sixteen
    /// octets, or a length octet followed by the host name.
    pub fn write_to_buf<B: BufMut>(&self, buf: &mut B) {
        match self {
            Address::IPv4(ip) => buf.put_slice(&ip.octets()),
            Address::Domain(host) => {
                buf.put_u8(host.len() as u8);
                buf.put_slice(host.as_bytes());
            }
            Address::IPv6(ip) => buf.put_slice(&ip.octets()),
        }
    }

    pub fn serialized_len(&self) -> usize {
        match self {
            Address::IPv4(_) => 4,
            Address::Domain(host) => 1 + host.len(),
            Address::IPv6(_) => 16,
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::IPv4(ip) => ip.fmt(f),
            Address::Domain(host) => f.write_str(host),
            Address::IPv6(ip) => write!(f, "[{ip}]"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_type_codes() {
        assert_eq!(AddressType::try_from(0x01).unwrap(), AddressType::IPv4);
        assert_eq!(AddressType::try_from(0x03).unwrap(), AddressType::Domain);
        assert_eq!(AddressType::try_from(0x04).unwrap(), AddressType::IPv6);
        assert!(matches!(
            AddressType::try_from(0x02),
            Err(Error::UnsupportedAddressType(0x02))
        ));
        assert_eq!(u8::from(AddressType::IPv6), 0x04);
    }

    #[test]
    fn test_write_domain_keeps_length_prefix() {
        let address = Address::Domain("example.com".to_owned());
        let mut buf = Vec::new();
        address.write_to_buf(&mut buf);

        assert_eq!(buf[0], 11);
        assert_eq!(&buf[1..], b"example.com");
        assert_eq!(buf.len(), address.serialized_len());
    }

    #[test]
    fn test_display() {
        assert_eq!(Address::IPv4(Ipv4Addr::LOCALHOST).to_string(), "127.0.0.1");
        assert_eq!(Address::IPv6(Ipv6Addr::LOCALHOST).to_string(), "[::1]");
        assert_eq!(Address::Domain("a.b".to_owned()).to_string(), "a.b");
    }
}
