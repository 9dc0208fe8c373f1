//! IPv4 addresses and endpoints, parsed from the `"a.b.c.d"` and
//! `"a.b.c.d:port"` textual forms used in configs and console commands.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointParseError;

impl fmt::Display for EndpointParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "not a valid \"a.b.c.d\" or \"a.b.c.d:port\" endpoint")
    }
}

impl std::error::Error for EndpointParseError {}

/// An IPv4 address, newtyped so engine code never has to reach for
/// `std::net` directly at call sites that only ever deal with one family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IpAddress(pub Ipv4Addr);

impl IpAddress {
    pub fn any() -> Self {
        Self(Ipv4Addr::UNSPECIFIED)
    }

    pub fn localhost() -> Self {
        Self(Ipv4Addr::LOCALHOST)
    }

    pub fn broadcast() -> Self {
        Self(Ipv4Addr::BROADCAST)
    }

    pub fn octets(self) -> [u8; 4] {
        self.0.octets()
    }
}

impl FromStr for IpAddress {
    type Err = EndpointParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<Ipv4Addr>().map(IpAddress).map_err(|_| EndpointParseError)
    }
}

impl fmt::Display for IpAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An `(IpAddress, port)` pair, as used for every socket bind/connect call
/// in the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IpEndpoint {
    pub address: IpAddress,
    pub port: u16,
}

impl IpEndpoint {
    pub fn new(address: IpAddress, port: u16) -> Self {
        Self { address, port }
    }
}

impl FromStr for IpEndpoint {
    type Err = EndpointParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s.rsplit_once(':').ok_or(EndpointParseError)?;
        let address: IpAddress = host.parse()?;
        let port: u16 = port.parse().map_err(|_| EndpointParseError)?;
        Ok(Self { address, port })
    }
}

impl fmt::Display for IpEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

impl From<IpEndpoint> for SocketAddr {
    fn from(endpoint: IpEndpoint) -> Self {
        SocketAddr::V4(SocketAddrV4::new(endpoint.address.0, endpoint.port))
    }
}

impl From<SocketAddr> for IpEndpoint {
    fn from(addr: SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(v4) => IpEndpoint::new(IpAddress(*v4.ip()), v4.port()),
            SocketAddr::V6(v6) => IpEndpoint::new(IpAddress::any(), v6.port()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_address_only() {
        let addr: IpAddress = "127.0.0.1".parse().unwrap();
        assert_eq!(addr, IpAddress::localhost());
    }

    #[test]
    fn parses_endpoint_with_port() {
        let endpoint: IpEndpoint = "192.168.0.1:40000".parse().unwrap();
        assert_eq!(endpoint.address.octets(), [192, 168, 0, 1]);
        assert_eq!(endpoint.port, 40000);
    }

    #[test]
    fn rejects_missing_port() {
        assert!("192.168.0.1".parse::<IpEndpoint>().is_err());
    }

    #[test]
    fn roundtrips_through_socket_addr() {
        let endpoint: IpEndpoint = "10.0.0.5:9999".parse().unwrap();
        let socket_addr: std::net::SocketAddr = endpoint.into();
        assert_eq!(IpEndpoint::from(socket_addr), endpoint);
    }
}
