//! 프로세스 내 결함 주입 링크
//!
//! 실제 네트워크 없이 신뢰성 로직을 결정적으로 검증하기 위한 바인딩.
//! 송신 시점에 [`FaultPlan`]을 적용한다:
//!
//! | 결함        | 동작                                             |
//! |-------------|--------------------------------------------------|
//! | 지정 손실   | 특정 타입/시퀀스 패킷의 처음 N개를 버림           |
//! | 랜덤 손실   | `loss_rate` 확률로 버림 (시드 고정 RNG)           |
//! | 중복        | 모든 패킷을 두 번 전달                            |
//! | 순서 뒤섞기 | 패킷마다 0..`max_jitter` 랜덤 지연 후 전달         |

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;

use super::Transport;
use crate::chunk::Seq;
use crate::message::{Message, MessageType};

type Datagram = (Bytes, SocketAddr);

/// 지정 손실 규칙
#[derive(Debug, Clone)]
struct DropRule {
    msg_type: MessageType,
    seq: Option<Seq>,
    remaining: u32,
}

/// 결함 모델
#[derive(Debug)]
pub struct FaultPlan {
    rules: Vec<DropRule>,
    loss_rate: f64,
    duplicate: bool,
    max_jitter: Duration,
    rng: StdRng,
}

impl Default for FaultPlan {
    fn default() -> Self {
        // 기본은 결함 없는 통과
        Self::seeded(0)
    }
}

impl FaultPlan {
    pub fn seeded(seed: u64) -> Self {
        Self {
            rules: Vec::new(),
            loss_rate: 0.0,
            duplicate: false,
            max_jitter: Duration::ZERO,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// 해당 타입/시퀀스 패킷의 처음 `count`개 손실
    pub fn drop_first(mut self, msg_type: MessageType, seq: Option<Seq>, count: u32) -> Self {
        self.rules.push(DropRule {
            msg_type,
            seq,
            remaining: count,
        });
        self
    }

    pub fn loss_rate(mut self, rate: f64) -> Self {
        self.loss_rate = rate.clamp(0.0, 1.0);
        self
    }

    pub fn duplicate_all(mut self) -> Self {
        self.duplicate = true;
        self
    }

    pub fn reorder(mut self, max_jitter: Duration) -> Self {
        self.max_jitter = max_jitter;
        self
    }

    /// 전달할 복사본 수와 각 지연을 결정
    fn decide(&mut self, packet: &[u8]) -> Vec<Duration> {
        if let Some(msg) = Message::from_bytes(packet) {
            let msg_type = msg.msg_type();
            let seq = msg.seq();
            let rule = self.rules.iter_mut().find(|rule| {
                rule.remaining > 0
                    && rule.msg_type == msg_type
                    && rule.seq.map_or(true, |s| s == seq)
            });
            if let Some(rule) = rule {
                rule.remaining -= 1;
                return Vec::new();
            }
        }

        if self.loss_rate > 0.0 && self.rng.gen_bool(self.loss_rate) {
            return Vec::new();
        }

        let copies = if self.duplicate { 2 } else { 1 };
        (0..copies)
            .map(|_| {
                if self.max_jitter.is_zero() {
                    Duration::ZERO
                } else {
                    self.max_jitter.mul_f64(self.rng.gen::<f64>())
                }
            })
            .collect()
    }
}

/// 링크 한쪽 끝
pub struct MemoryTransport {
    local: SocketAddr,
    tx: mpsc::UnboundedSender<Datagram>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Datagram>>,
    faults: Arc<Mutex<FaultPlan>>,
    sent: Arc<Mutex<HashMap<(MessageType, Seq), u32>>>,
}

impl MemoryTransport {
    /// 결함 없는 링크 쌍 생성
    pub fn pair(a: SocketAddr, b: SocketAddr) -> (Self, Self) {
        Self::pair_with_faults(a, b, FaultPlan::default(), FaultPlan::default())
    }

    /// 방향별 결함 모델을 가진 링크 쌍 생성
    ///
    /// `a_faults`는 a → b 방향, `b_faults`는 b → a 방향에 적용
    pub fn pair_with_faults(
        a: SocketAddr,
        b: SocketAddr,
        a_faults: FaultPlan,
        b_faults: FaultPlan,
    ) -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();

        let side_a = Self {
            local: a,
            tx: a_tx,
            rx: tokio::sync::Mutex::new(a_rx),
            faults: Arc::new(Mutex::new(a_faults)),
            sent: Arc::default(),
        };
        let side_b = Self {
            local: b,
            tx: b_tx,
            rx: tokio::sync::Mutex::new(b_rx),
            faults: Arc::new(Mutex::new(b_faults)),
            sent: Arc::default(),
        };
        (side_a, side_b)
    }

    /// 이 끝에서 보낸 (타입, 시퀀스) 패킷 수 (손실 전 기준)
    pub fn sent_count(&self, msg_type: MessageType, seq: Seq) -> u32 {
        self.sent.lock().get(&(msg_type, seq)).copied().unwrap_or(0)
    }

    /// 보낸 패킷 수 조회 핸들 (전송 객체가 소비된 뒤에도 사용)
    pub fn sent_counter(&self) -> SentCounter {
        SentCounter(self.sent.clone())
    }
}

/// 보낸 패킷 수 조회 핸들
#[derive(Clone)]
pub struct SentCounter(Arc<Mutex<HashMap<(MessageType, Seq), u32>>>);

impl SentCounter {
    pub fn get(&self, msg_type: MessageType, seq: Seq) -> u32 {
        self.0.lock().get(&(msg_type, seq)).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send_to(&self, buf: &[u8], _target: SocketAddr) -> io::Result<usize> {
        if let Some(msg) = Message::from_bytes(buf) {
            *self.sent.lock().entry((msg.msg_type(), msg.seq())).or_insert(0) += 1;
        }

        let delays = self.faults.lock().decide(buf);
        let packet = Bytes::copy_from_slice(buf);

        for delay in delays {
            let datagram = (packet.clone(), self.local);
            if delay.is_zero() {
                // 상대가 이미 닫혔으면 조용히 버림 (UDP와 동일)
                let _ = self.tx.send(datagram);
            } else {
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = tx.send(datagram);
                });
            }
        }
        Ok(buf.len())
    }

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        let mut rx = self.rx.lock().await;
        let (packet, from) = rx
            .recv()
            .await
            .ok_or_else(|| io::Error::new(io::ErrorKind::ConnectionAborted, "링크 종료"))?;

        let len = packet.len().min(buf.len());
        buf[..len].copy_from_slice(&packet[..len]);
        Ok((len, from))
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.local)
    }
}
