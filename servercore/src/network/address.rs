//! 네트워크 주소

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use crate::error::{CoreError, CoreResult};

/// IP + 포트
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NetAddress(SocketAddr);

impl NetAddress {
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self(SocketAddr::new(ip, port))
    }

    /// "host:port" 형식의 IP 리터럴을 해석합니다.
    pub fn parse(text: &str) -> CoreResult<Self> {
        text.parse::<SocketAddr>()
            .map(Self)
            .map_err(|e| CoreError::InvalidAddress(format!("{text}: {e}")))
    }

    /// 호스트와 포트를 따로 받아 해석합니다.
    pub fn from_host_port(host: &str, port: u16) -> CoreResult<Self> {
        host.parse::<IpAddr>()
            .map(|ip| Self::new(ip, port))
            .map_err(|e| CoreError::InvalidAddress(format!("{host}: {e}")))
    }

    pub fn ip(&self) -> IpAddr {
        self.0.ip()
    }

    pub fn port(&self) -> u16 {
        self.0.port()
    }

    pub fn socket_addr(&self) -> SocketAddr {
        self.0
    }
}

impl From<SocketAddr> for NetAddress {
    fn from(addr: SocketAddr) -> Self {
        Self(addr)
    }
}

impl FromStr for NetAddress {
    type Err = CoreError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        Self::parse(text)
    }
}

impl fmt::Display for NetAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_accessors() {
        let addr = NetAddress::parse("127.0.0.1:7777").unwrap();
        assert_eq!(addr.port(), 7777);
        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_eq!(addr.to_string(), "127.0.0.1:7777");
    }

    #[test]
    fn test_host_port() {
        let addr = NetAddress::from_host_port("::1", 80).unwrap();
        assert!(addr.ip().is_ipv6());
        assert!(NetAddress::from_host_port("localhost", 80).is_err());
    }

    #[test]
    fn test_invalid_address() {
        let err = "not-an-address".parse::<NetAddress>().unwrap_err();
        assert!(matches!(err, CoreError::InvalidAddress(_)));
    }
}
