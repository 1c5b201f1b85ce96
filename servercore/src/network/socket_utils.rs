//! 소켓 유틸리티
//!
//! OS 소켓 호출 실패는 여기서 한 번만 [`CoreError::Io`] 로 변환되며,
//! OS 에러 코드는 [`CoreError::os_error_code`] 로 꺼낼 수 있습니다.

use socket2::{Domain, Protocol, Socket, Type};
use std::time::Duration;
use tracing::debug;

use crate::config::NetworkConfig;
use crate::error::{CoreError, CoreResult};
use crate::network::address::NetAddress;

pub fn set_linger(socket: &Socket, linger: Option<Duration>) -> CoreResult<()> {
    socket
        .set_linger(linger)
        .map_err(|e| CoreError::io("SO_LINGER", e))
}

pub fn set_reuse_address(socket: &Socket, enable: bool) -> CoreResult<()> {
    socket
        .set_reuse_address(enable)
        .map_err(|e| CoreError::io("SO_REUSEADDR", e))
}

pub fn set_recv_buffer_size(socket: &Socket, size: usize) -> CoreResult<()> {
    socket
        .set_recv_buffer_size(size)
        .map_err(|e| CoreError::io("SO_RCVBUF", e))
}

pub fn set_send_buffer_size(socket: &Socket, size: usize) -> CoreResult<()> {
    socket
        .set_send_buffer_size(size)
        .map_err(|e| CoreError::io("SO_SNDBUF", e))
}

pub fn set_tcp_nodelay(socket: &Socket, enable: bool) -> CoreResult<()> {
    socket
        .set_nodelay(enable)
        .map_err(|e| CoreError::io("TCP_NODELAY", e))
}

/// 연결된 소켓에 설정의 소켓 옵션을 적용합니다.
pub fn apply_stream_options(socket: &Socket, config: &NetworkConfig) -> CoreResult<()> {
    set_tcp_nodelay(socket, config.tcp_nodelay)?;
    set_linger(socket, config.linger)?;
    if let Some(size) = config.send_buffer_size {
        set_send_buffer_size(socket, size)?;
    }
    if let Some(size) = config.recv_os_buffer_size {
        set_recv_buffer_size(socket, size)?;
    }
    Ok(())
}

/// 논블로킹 listen 소켓을 만듭니다.
pub fn bind_listener(
    address: &NetAddress,
    config: &NetworkConfig,
) -> CoreResult<std::net::TcpListener> {
    let addr = address.socket_addr();
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
        .map_err(|e| CoreError::io("socket", e))?;

    set_reuse_address(&socket, true)?;
    if let Some(size) = config.recv_os_buffer_size {
        set_recv_buffer_size(&socket, size)?;
    }
    socket
        .bind(&addr.into())
        .map_err(|e| CoreError::io("bind", e))?;
    socket
        .listen(config.backlog)
        .map_err(|e| CoreError::io("listen", e))?;
    socket
        .set_nonblocking(true)
        .map_err(|e| CoreError::io("set_nonblocking", e))?;

    debug!("listen 소켓 생성: {}", address);
    Ok(socket.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use socket2::SockRef;

    fn loopback() -> NetAddress {
        NetAddress::parse("127.0.0.1:0").unwrap()
    }

    #[test]
    fn test_bind_listener_on_ephemeral_port() {
        let listener = bind_listener(&loopback(), &NetworkConfig::default()).unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), 0);
    }

    #[test]
    fn test_bind_conflict_keeps_os_error_code() {
        let first = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let taken = NetAddress::from(first.local_addr().unwrap());
        let err = bind_listener(&taken, &NetworkConfig::default()).unwrap_err();
        assert!(matches!(err, CoreError::Io { context: "bind", .. }));
        assert!(err.os_error_code() > 0);
    }

    #[test]
    fn test_apply_stream_options() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let stream = std::net::TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let config = NetworkConfig {
            tcp_nodelay: true,
            linger: Some(Duration::ZERO),
            ..NetworkConfig::default()
        };
        apply_stream_options(&SockRef::from(&stream), &config).unwrap();
        assert!(stream.nodelay().unwrap());
    }
}
