//! 수신자
//!
//! - DATA: 복호화 성공 시 저장(멱등) 후 항상 ACK, 크기 초과/복호화 실패 시 조용히 버림
//! - END: 첫 관측 때만 EACK 한 번 → DRAINING
//! - DRAINING: 유예 시간 동안 새 트래픽이 없으면 오름차순 조립 후 종료
//!
//! 단일 루프에서 시간 제한 recv와 유예 시간 확인을 번갈아 수행

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::chunk::{Assembler, Seq};
use crate::crypto::{ChunkCipher, SharedKey, CIPHER_OVERHEAD};
use crate::message::Message;
use crate::stats::TransferStats;
use crate::transport::Transport;
use crate::{Config, Error, FinalizePolicy, Result};

/// 수신 단계
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverPhase {
    Receiving,
    Draining,
}

/// 수신 상태
#[derive(Debug, Default)]
pub struct ReceiverState {
    assembler: Assembler,

    /// 첫 END 관측 시각
    end_seen_at: Option<Instant>,

    /// 유예 시간 기준 시각 (END 이후 새 청크가 오면 갱신)
    quiet_since: Option<Instant>,
}

impl ReceiverState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> ReceiverPhase {
        match self.end_seen_at {
            Some(_) => ReceiverPhase::Draining,
            None => ReceiverPhase::Receiving,
        }
    }

    /// 복호화된 청크 저장. 새 청크면 true
    pub fn on_data(&mut self, seq: Seq, plaintext: Bytes, now: Instant) -> bool {
        let inserted = self.assembler.insert(seq, plaintext);
        if inserted && self.quiet_since.is_some() {
            self.quiet_since = Some(now);
        }
        inserted
    }

    /// END 관측. 첫 관측이면 true (EACK 전송 대상)
    pub fn on_end(&mut self, now: Instant) -> bool {
        if self.end_seen_at.is_some() {
            return false;
        }
        self.end_seen_at = Some(now);
        self.quiet_since = Some(now);
        true
    }

    pub fn end_seen_at(&self) -> Option<Instant> {
        self.end_seen_at
    }

    /// 유예 시간 경과 여부
    pub fn is_drained(&self, now: Instant, grace: Duration) -> bool {
        self.quiet_since
            .map_or(false, |since| now.saturating_duration_since(since) >= grace)
    }

    pub fn chunks(&self) -> usize {
        self.assembler.len()
    }

    pub fn missing(&self) -> Vec<Seq> {
        self.assembler.missing()
    }

    /// 오름차순 조립
    pub fn finish(self, policy: FinalizePolicy) -> Result<Bytes> {
        self.assembler.assemble(policy)
    }
}

/// 수신 결과
#[derive(Debug, Clone)]
pub struct ReceiveReport {
    /// 조립된 페이로드
    pub payload: Bytes,

    /// 받은 청크 수
    pub chunks: usize,

    /// 0..=최대 시퀀스 중 누락 (AsObserved 정책에서만 비어있지 않을 수 있음)
    pub missing: Vec<Seq>,

    /// 마지막으로 패킷을 보낸 송신자
    pub sender: Option<SocketAddr>,

    pub stats: TransferStats,
}

/// 수신자
pub struct Receiver<T: Transport> {
    config: Config,
    transport: T,
    cipher: ChunkCipher,
    running: Arc<AtomicBool>,
    expected_sender: Option<IpAddr>,
}

impl<T: Transport> Receiver<T> {
    pub fn new(config: Config, transport: T, key: &SharedKey) -> Self {
        Self {
            config,
            transport,
            cipher: ChunkCipher::new(key),
            running: Arc::new(AtomicBool::new(true)),
            expected_sender: None,
        }
    }

    /// 지정 IP에서 온 패킷만 처리
    pub fn expect_sender(mut self, ip: IpAddr) -> Self {
        self.expected_sender = Some(ip);
        self
    }

    /// 외부 취소 플래그 연결 (false가 되면 중단)
    pub fn with_running_flag(mut self, running: Arc<AtomicBool>) -> Self {
        self.running = running;
        self
    }

    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    /// ACK 회신 주소: ack_port가 0이면 출발 주소 그대로
    fn ack_target(&self, from: SocketAddr) -> SocketAddr {
        match self.config.ack_port {
            0 => from,
            port => SocketAddr::new(from.ip(), port),
        }
    }

    async fn reply(&self, msg: Message, from: SocketAddr) {
        let target = self.ack_target(from);
        if let Err(e) = self.transport.send_to(&msg.to_bytes(), target).await {
            warn!("{:?} 전송 실패 ({}): {}", msg.msg_type(), target, e);
        }
    }

    /// 세션 하나 수신. 취소 시 출력 없이 `Error::Cancelled`
    pub async fn receive(self) -> Result<ReceiveReport> {
        self.config.validate()?;

        let mut state = ReceiverState::new();
        let mut stats = TransferStats::new();
        let mut sender = None;
        let mut buf = vec![0u8; 65535];

        info!(
            "수신 대기: {} (sender 필터: {:?})",
            self.transport.local_addr()?,
            self.expected_sender
        );

        loop {
            if !self.running.load(Ordering::SeqCst) {
                warn!("수신 취소: 출력 없음");
                return Err(Error::Cancelled);
            }
            if state.is_drained(Instant::now(), self.config.quiescence()) {
                break;
            }

            let (len, from) =
                match tokio::time::timeout(self.config.recv_poll(), self.transport.recv_from(&mut buf)).await {
                    Ok(Ok(received)) => received,
                    Ok(Err(e)) => {
                        debug!("수신 에러: {}", e);
                        tokio::time::sleep(self.config.recv_poll()).await;
                        continue;
                    }
                    Err(_) => continue,
                };

            if self.expected_sender.map_or(false, |ip| ip != from.ip()) {
                continue;
            }

            match Message::from_bytes(&buf[..len]) {
                Some(Message::Data { seq, ciphertext }) => {
                    if ciphertext.len() > self.config.chunk_size + CIPHER_OVERHEAD {
                        // 청크 크기를 넘는 DATA는 복호화하지 않고 버림, ACK 없음
                        stats.oversize_chunks += 1;
                        warn!("청크 {} 크기 초과, 버림: {} bytes", seq, ciphertext.len());
                        continue;
                    }

                    let plaintext = match self.cipher.decrypt(seq, &ciphertext) {
                        Ok(plaintext) => plaintext,
                        Err(e) => {
                            // ACK 없음 → 송신측 타임아웃 재전송에 맡김
                            stats.decrypt_failures += 1;
                            warn!("청크 {} 복호화 실패, 버림: {}", seq, e);
                            continue;
                        }
                    };

                    sender = Some(from);
                    let plain_len = plaintext.len() as u64;
                    if state.on_data(seq, Bytes::from(plaintext), Instant::now()) {
                        stats.chunks_received += 1;
                        stats.total_bytes += plain_len;
                        info!("수신: 청크 {}", seq);
                    } else {
                        stats.duplicate_chunks += 1;
                        debug!("중복 청크 {}, ACK 재전송", seq);
                    }

                    // 중복이어도 ACK (ACK 자체가 손실될 수 있음)
                    self.reply(Message::Ack { seq }, from).await;
                }
                Some(Message::End) => {
                    sender = Some(from);
                    if state.on_end(Instant::now()) {
                        self.reply(Message::EndAck, from).await;
                        info!("END 수신, {}ms 유예 후 종료", self.config.quiescence_ms);
                    } else {
                        debug!("END 재수신");
                    }
                }
                Some(other) => debug!("수신측에서 무시: {:?} from {}", other.msg_type(), from),
                None => debug!("잘못된 패킷 무시: {} bytes from {}", len, from),
            }
        }

        let chunks = state.chunks();
        let missing = state.missing();
        if !missing.is_empty() {
            warn!("누락 청크 {} 개: {:?}", missing.len(), missing);
        }

        let payload = state.finish(self.config.finalize_policy)?;
        stats.finish();
        info!("수신 완료: {} bytes, {} 청크", payload.len(), chunks);
        info!("{}", stats.summary());

        Ok(ReceiveReport {
            payload,
            chunks,
            missing,
            sender,
            stats,
        })
    }
}
