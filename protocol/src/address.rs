use std::fmt::{Display, Formatter};
use std::net::{Ipv4Addr, Ipv6Addr};

/// The address a SOCKS5 CONNECT request names as its destination.
///
/// Mirrors the three ATYP values this server accepts (IPv4, domain, IPv6);
/// there is no socket-address variant because the server never resolves the
/// name itself — it only ever forwards the `host:port` string to the client
/// over `StartProxy`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetAddress {
    Ipv4 { addr: Ipv4Addr, port: u16 },
    Ipv6 { addr: Ipv6Addr, port: u16 },
    Domain { host: String, port: u16 },
}

impl Display for TargetAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetAddress::Ipv4 { addr, port } => write!(f, "{addr}:{port}"),
            TargetAddress::Ipv6 { addr, port } => write!(f, "[{addr}]:{port}"),
            TargetAddress::Domain { host, port } => write!(f, "{host}:{port}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_ipv4() {
        let addr = TargetAddress::Ipv4 {
            addr: Ipv4Addr::new(93, 184, 216, 34),
            port: 80,
        };
        assert_eq!(addr.to_string(), "93.184.216.34:80");
    }

    #[test]
    fn formats_ipv6() {
        let addr = TargetAddress::Ipv6 {
            addr: "2001:db8::1".parse().unwrap(),
            port: 443,
        };
        assert_eq!(addr.to_string(), "[2001:db8::1]:443");
    }

    #[test]
    fn formats_domain() {
        let addr = TargetAddress::Domain {
            host: "example.com".to_string(),
            port: 80,
        };
        assert_eq!(addr.to_string(), "example.com:80");
    }
}
