//! 고정 포트 UDP 바인딩
//!
//! 같은 호스트에서 자기 충돌을 피하려고 방향마다 포트를 나눈다.
//! 수신측은 데이터 포트, 송신측은 ACK 포트에 바인딩.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tracing::warn;

use super::Transport;
use crate::{Error, Result};

pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    /// 지정 주소에 바인딩
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| Error::Bind { addr, source })?;
        Ok(Self { socket })
    }

    /// 모든 인터페이스의 지정 포트에 바인딩
    pub async fn bind_port(port: u16) -> Result<Self> {
        Self::bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port)).await
    }

    /// 지정 주소 바인딩 실패 시 경고 후 OS 할당 포트로 대체
    pub async fn bind_or_ephemeral(addr: SocketAddr) -> Result<Self> {
        match Self::bind(addr).await {
            Ok(transport) => Ok(transport),
            Err(e) => {
                warn!("{} (OS 할당 포트로 계속)", e);
                Self::bind(SocketAddr::new(addr.ip(), 0)).await
            }
        }
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize> {
        self.socket.send_to(buf, target).await
    }

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.socket.recv_from(buf).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}
