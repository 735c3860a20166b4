//! Network address types (`cidr`, `inet`, `macaddr`, `macaddr8`).

use std::net::IpAddr;

use crate::error::{DecodeError, DecodeErrorKind};

fn decode_err(message: impl Into<String>) -> DecodeError {
    DecodeError {
        kind: DecodeErrorKind::InvalidValue,
        field: None,
        message: message.into(),
    }
}

const PGSQL_AF_INET: u8 = 2;
const PGSQL_AF_INET6: u8 = 3;

/// `inet` — a host address with an optional subnet mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inet {
    pub addr: IpAddr,
    pub prefix_len: u8,
}

impl Inet {
    pub fn parse_text(s: &str) -> Result<Self, DecodeError> {
        match s.split_once('/') {
            Some((addr, prefix)) => Ok(Inet {
                addr: addr.parse().map_err(|_| decode_err(format!("invalid inet address '{s}'")))?,
                prefix_len: prefix.parse().map_err(|_| decode_err(format!("invalid inet prefix '{s}'")))?,
            }),
            None => {
                let addr: IpAddr = s.parse().map_err(|_| decode_err(format!("invalid inet address '{s}'")))?;
                let prefix_len = if addr.is_ipv4() { 32 } else { 128 };
                Ok(Inet { addr, prefix_len })
            }
        }
    }

    pub fn parse_binary(bytes: &[u8]) -> Result<Self, DecodeError> {
        parse_inet_binary(bytes).map(|(addr, prefix_len)| Inet { addr, prefix_len })
    }

    pub fn format_text(&self) -> String {
        let full_prefix = if self.addr.is_ipv4() { 32 } else { 128 };
        if self.prefix_len == full_prefix {
            self.addr.to_string()
        } else {
            format!("{}/{}", self.addr, self.prefix_len)
        }
    }
}

/// `cidr` — a network address; identical wire representation to `inet`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cidr {
    pub addr: IpAddr,
    pub prefix_len: u8,
}

impl Cidr {
    pub fn parse_text(s: &str) -> Result<Self, DecodeError> {
        Inet::parse_text(s).map(|i| Cidr { addr: i.addr, prefix_len: i.prefix_len })
    }

    pub fn parse_binary(bytes: &[u8]) -> Result<Self, DecodeError> {
        parse_inet_binary(bytes).map(|(addr, prefix_len)| Cidr { addr, prefix_len })
    }

    pub fn format_text(&self) -> String {
        format!("{}/{}", self.addr, self.prefix_len)
    }
}

fn parse_inet_binary(bytes: &[u8]) -> Result<(IpAddr, u8), DecodeError> {
    if bytes.len() < 4 {
        return Err(decode_err("inet/cidr binary payload truncated"));
    }
    let family = bytes[0];
    let prefix_len = bytes[1];
    let addr_bytes = &bytes[4..];
    let addr = match family {
        PGSQL_AF_INET => {
            if addr_bytes.len() != 4 {
                return Err(decode_err("inet binary address must be 4 bytes for IPv4"));
            }
            IpAddr::from(<[u8; 4]>::try_from(addr_bytes).unwrap())
        }
        PGSQL_AF_INET6 => {
            if addr_bytes.len() != 16 {
                return Err(decode_err("inet binary address must be 16 bytes for IPv6"));
            }
            IpAddr::from(<[u8; 16]>::try_from(addr_bytes).unwrap())
        }
        other => return Err(decode_err(format!("unknown inet address family {other}"))),
    };
    Ok((addr, prefix_len))
}

/// `macaddr` — a 6-byte hardware address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacAddr6(pub [u8; 6]);

impl MacAddr6 {
    pub fn parse_text(s: &str) -> Result<Self, DecodeError> {
        let bytes = parse_hex_groups(s, 6)?;
        Ok(MacAddr6(bytes.try_into().unwrap()))
    }

    pub fn parse_binary(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() != 6 {
            return Err(decode_err("macaddr binary payload must be 6 bytes"));
        }
        Ok(MacAddr6(bytes.try_into().unwrap()))
    }

    pub fn format_text(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect::<Vec<_>>().join(":")
    }
}

/// `macaddr8` — an 8-byte (EUI-64) hardware address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacAddr8(pub [u8; 8]);

impl MacAddr8 {
    pub fn parse_text(s: &str) -> Result<Self, DecodeError> {
        let bytes = parse_hex_groups(s, 8)?;
        Ok(MacAddr8(bytes.try_into().unwrap()))
    }

    pub fn parse_binary(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() != 8 {
            return Err(decode_err("macaddr8 binary payload must be 8 bytes"));
        }
        Ok(MacAddr8(bytes.try_into().unwrap()))
    }

    pub fn format_text(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect::<Vec<_>>().join(":")
    }
}

fn parse_hex_groups(s: &str, expected_len: usize) -> Result<Vec<u8>, DecodeError> {
    let hex: String = s.chars().filter(|c| c.is_ascii_hexdigit()).collect();
    if hex.len() != expected_len * 2 {
        return Err(decode_err(format!("invalid MAC address literal '{s}'")));
    }
    (0..expected_len)
        .map(|i| u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).map_err(|_| decode_err(format!("invalid MAC address literal '{s}'"))))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inet_parses_with_and_without_prefix() {
        let a = Inet::parse_text("192.168.1.1/24").unwrap();
        assert_eq!(a.prefix_len, 24);
        let b = Inet::parse_text("192.168.1.1").unwrap();
        assert_eq!(b.prefix_len, 32);
        assert_eq!(b.format_text(), "192.168.1.1");
    }

    #[test]
    fn cidr_roundtrips_binary() {
        let bytes = [PGSQL_AF_INET, 24, 0, 4, 10, 0, 0, 0];
        let cidr = Cidr::parse_binary(&bytes).unwrap();
        assert_eq!(cidr.prefix_len, 24);
        assert_eq!(cidr.format_text(), "10.0.0.0/24");
    }

    #[test]
    fn macaddr6_parses_colon_separated_hex() {
        let mac = MacAddr6::parse_text("08:00:2b:01:02:03").unwrap();
        assert_eq!(mac.0, [0x08, 0x00, 0x2b, 0x01, 0x02, 0x03]);
        assert_eq!(mac.format_text(), "08:00:2b:01:02:03");
    }

    #[test]
    fn macaddr8_parses_eight_bytes() {
        let mac = MacAddr8::parse_text("08:00:2b:01:02:03:04:05").unwrap();
        assert_eq!(mac.0.len(), 8);
    }
}
