//! raw IP 바인딩 (root/CAP_NET_RAW 필요)
//!
//! 전용 포트를 쓸 수 없는 환경용. 같은 태그 패킷을 IP 프로토콜 번호 하나로
//! 주고받으며 포트 개념이 없다. 수신 시 커널이 붙여 주는 IPv4 헤더를 제거한다.
//! 이식성이 떨어지므로 대안일 뿐, 정확성에는 필요 없음.

use std::io;
use std::mem::MaybeUninit;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use async_trait::async_trait;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tokio::io::unix::AsyncFd;

use super::Transport;
use crate::{Error, Result};

pub struct RawTransport {
    fd: AsyncFd<Socket>,
}

impl RawTransport {
    /// 지정 IP 프로토콜 번호로 raw 소켓 생성
    pub fn bind(protocol: u8) -> Result<Self> {
        let unspecified = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0);
        let socket = Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::from(protocol as i32)))
            .map_err(|source| Error::Bind {
                addr: unspecified,
                source,
            })?;
        socket.set_nonblocking(true)?;

        Ok(Self {
            fd: AsyncFd::new(socket)?,
        })
    }
}

fn recv_raw(socket: &Socket, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
    // SAFETY: u8과 MaybeUninit<u8>은 레이아웃이 같고, recv_from은 초기화된 바이트만 기록함
    let uninit = unsafe { &mut *(buf as *mut [u8] as *mut [MaybeUninit<u8>]) };
    let (len, addr) = socket.recv_from(uninit)?;
    let addr = addr
        .as_socket()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "IP가 아닌 출발 주소"))?;
    Ok((len, addr))
}

/// IPv4 헤더 길이 (IHL * 4)
fn ipv4_header_len(packet: &[u8]) -> Option<usize> {
    let first = *packet.first()?;
    if first >> 4 != 4 {
        return None;
    }
    let len = usize::from(first & 0x0f) * 4;
    (len >= 20 && len <= packet.len()).then_some(len)
}

#[async_trait]
impl Transport for RawTransport {
    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize> {
        let target = SockAddr::from(SocketAddr::new(target.ip(), 0));
        loop {
            let mut guard = self.fd.writable().await?;
            match guard.try_io(|inner| inner.get_ref().send_to(buf, &target)) {
                Ok(result) => return result,
                Err(_would_block) => continue,
            }
        }
    }

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        loop {
            let mut guard = self.fd.readable().await?;
            let (len, addr) = match guard.try_io(|inner| recv_raw(inner.get_ref(), buf)) {
                Ok(result) => result?,
                Err(_would_block) => continue,
            };

            let Some(header_len) = ipv4_header_len(&buf[..len]) else {
                continue;
            };
            buf.copy_within(header_len..len, 0);
            return Ok((len - header_len, addr));
        }
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self
            .fd
            .get_ref()
            .local_addr()?
            .as_socket()
            .unwrap_or_else(|| SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0)))
    }
}
