//! 데이터그램 전송 바인딩
//!
//! 신뢰성은 전부 상위 상태 머신이 담당. 바인딩은 손실/순서 뒤바뀜/중복이
//! 있을 수 있는 "보내기 / 출발 주소와 함께 받기"만 제공한다.
//!
//! - [`UdpTransport`]: 방향별 고정 포트 UDP
//! - [`RawTransport`]: raw IP 소켓 (root 권한 필요, unix 전용)
//! - [`MemoryTransport`]: 프로세스 내 결함 주입 링크 (테스트용)

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;

pub mod memory;
#[cfg(unix)]
pub mod raw;
pub mod udp;

pub use memory::{FaultPlan, MemoryTransport};
#[cfg(unix)]
pub use raw::RawTransport;
pub use udp::UdpTransport;

/// 최소 송수신 능력
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// 데이터그램 하나 전송
    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize>;

    /// 데이터그램 하나 수신 (길이, 출발 주소)
    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;

    /// 로컬 주소
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

#[async_trait]
impl<T: Transport> Transport for Arc<T> {
    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize> {
        (**self).send_to(buf, target).await
    }

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        (**self).recv_from(buf).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        (**self).local_addr()
    }
}
