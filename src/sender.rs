//! 송신자
//!
//! - Selective-Repeat: 청크별 ACK, 미확인 청크만 타임아웃 후 재전송
//! - 고정 윈도우 `[base, base + W)`
//! - 폴링 루프 + ACK 리스너 태스크, 공유 상태는 Mutex 하나로 직렬화
//!
//! 상태: ACTIVE → TERMINATING (END 전송, EACK 대기) → DONE

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;
use rayon::prelude::*;
use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::chunk::{self, Seq};
use crate::crypto::{ChunkCipher, CryptoError, SharedKey};
use crate::message::Message;
use crate::stats::TransferStats;
use crate::transport::Transport;
use crate::{Config, Error, Result};

/// ACK 처리 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// 새로 확인됨
    New,

    /// 이미 확인된 시퀀스
    Duplicate,

    /// 존재하지 않는 시퀀스
    OutOfRange,
}

/// 송신 윈도우 상태
///
/// 불변식: `base`는 감소하지 않으며 `base` 아래에 미확인 시퀀스는 없다.
#[derive(Debug)]
pub struct SenderState {
    base: Seq,
    total: u32,
    window: u32,

    /// base 이상에서 순서와 무관하게 확인된 시퀀스
    acked: HashSet<Seq>,

    /// 마지막 전송 시각
    timers: HashMap<Seq, Instant>,

    /// 청크별 전송 횟수
    attempts: HashMap<Seq, u32>,
}

impl SenderState {
    pub fn new(total: u32, window: u32) -> Self {
        Self {
            base: 0,
            total,
            window: window.max(1),
            acked: HashSet::new(),
            timers: HashMap::new(),
            attempts: HashMap::new(),
        }
    }

    /// 가장 낮은 미확인 시퀀스
    pub fn base(&self) -> Seq {
        self.base
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn is_complete(&self) -> bool {
        self.base >= self.total
    }

    pub fn is_acked(&self, seq: Seq) -> bool {
        seq < self.base || self.acked.contains(&seq)
    }

    /// 윈도우 끝 (exclusive)
    pub fn window_end(&self) -> Seq {
        self.base.saturating_add(self.window).min(self.total)
    }

    /// 청크 전송 횟수
    pub fn attempts(&self, seq: Seq) -> u32 {
        self.attempts.get(&seq).copied().unwrap_or(0)
    }

    /// 이번 틱에 (재)전송할 시퀀스 목록. 반환된 시퀀스의 타이머는 `now`로 갱신
    pub fn due(&mut self, now: Instant, timeout: Duration) -> Vec<Seq> {
        let due: Vec<Seq> = (self.base..self.window_end())
            .filter(|seq| !self.acked.contains(seq))
            .filter(|seq| {
                self.timers
                    .get(seq)
                    .map_or(true, |sent| now.saturating_duration_since(*sent) >= timeout)
            })
            .collect();

        for &seq in &due {
            self.timers.insert(seq, now);
            *self.attempts.entry(seq).or_insert(0) += 1;
        }
        due
    }

    /// ACK 처리. 멱등이며 연속 구간만큼 base 전진
    pub fn on_ack(&mut self, seq: Seq) -> AckOutcome {
        if seq >= self.total {
            return AckOutcome::OutOfRange;
        }
        if self.is_acked(seq) {
            return AckOutcome::Duplicate;
        }

        self.acked.insert(seq);
        self.timers.remove(&seq);
        while self.acked.remove(&self.base) {
            self.base += 1;
        }
        AckOutcome::New
    }
}

/// 종료 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// 수신자가 EACK로 확인
    Confirmed,

    /// EACK 대기 타임아웃, 완료로 간주
    AssumedByTimeout,
}

/// 송신 결과
#[derive(Debug, Clone)]
pub struct SendReport {
    pub total_chunks: u32,
    pub completion: Completion,
    pub stats: TransferStats,
}

/// 폴링 루프와 리스너가 함께 쓰는 상태
struct Inner {
    state: SenderState,
    stats: TransferStats,
}

struct Shared {
    inner: Mutex<Inner>,

    /// 리스너 → 폴링 루프 (base 전진, base == total, EACK)
    wake: Notify,
    eack: AtomicBool,
    stop: AtomicBool,
}

/// 송신자
pub struct Sender<T: Transport> {
    config: Config,
    transport: Arc<T>,
    cipher: ChunkCipher,
    running: Arc<AtomicBool>,
}

impl<T: Transport> Sender<T> {
    /// 새 송신자 생성
    pub fn new(config: Config, transport: T, key: &SharedKey) -> Self {
        Self {
            config,
            transport: Arc::new(transport),
            cipher: ChunkCipher::new(key),
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// 외부 취소 플래그 연결 (false가 되면 중단)
    pub fn with_running_flag(mut self, running: Arc<AtomicBool>) -> Self {
        self.running = running;
        self
    }

    /// 취소 플래그
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    /// 페이로드 전송. 끝나면 전송 바인딩을 해제한다
    pub async fn send(self, payload: Bytes, peer: SocketAddr) -> Result<SendReport> {
        self.config.validate()?;

        let chunks = chunk::split(&payload, self.config.chunk_size)?;
        let total = chunks.len() as u32;

        // 청크별 독립 암호화 (병렬)
        let sealed: Vec<Bytes> = chunks
            .par_iter()
            .map(|c| {
                let ciphertext = self.cipher.encrypt(c.seq, &c.data)?;
                Ok(Message::Data {
                    seq: c.seq,
                    ciphertext: Bytes::from(ciphertext),
                }
                .to_bytes())
            })
            .collect::<std::result::Result<_, CryptoError>>()?;

        let mut stats = TransferStats::new();
        stats.total_chunks = total as u64;
        stats.total_bytes = payload.len() as u64;

        let shared = Arc::new(Shared {
            inner: Mutex::new(Inner {
                state: SenderState::new(total, self.config.window_size),
                stats,
            }),
            wake: Notify::new(),
            eack: AtomicBool::new(false),
            stop: AtomicBool::new(false),
        });

        info!(
            "송신 시작: {} bytes, {} 청크, 윈도우 {}, 대상 {}",
            payload.len(),
            total,
            self.config.window_size,
            peer
        );

        let listener = tokio::spawn(listen_for_acks(
            self.transport.clone(),
            shared.clone(),
            self.running.clone(),
            self.config.recv_poll(),
        ));

        let result = self.drive(&shared, &sealed, peer).await;

        // DONE: 리스너 정지
        shared.stop.store(true, Ordering::SeqCst);
        if let Err(e) = listener.await {
            warn!("ACK 리스너 종료 실패: {}", e);
        }

        let completion = result?;
        let mut stats = shared.inner.lock().stats.clone();
        stats.finish();

        match completion {
            Completion::Confirmed => info!("수신자가 완료를 확인함"),
            Completion::AssumedByTimeout => warn!("EACK 없음: 타임아웃으로 완료 간주"),
        }
        info!("{}", stats.summary());

        Ok(SendReport {
            total_chunks: total,
            completion,
            stats,
        })
    }

    async fn drive(&self, shared: &Shared, sealed: &[Bytes], peer: SocketAddr) -> Result<Completion> {
        self.run_window(shared, sealed, peer).await?;
        self.terminate(shared, peer).await
    }

    /// ACTIVE: base == total 까지 윈도우 내 청크 (재)전송
    async fn run_window(&self, shared: &Shared, sealed: &[Bytes], peer: SocketAddr) -> Result<()> {
        let timeout = self.config.retransmit_timeout();
        let mut ticker = tokio::time::interval(self.config.tick_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if !self.running.load(Ordering::SeqCst) {
                return Err(Error::Cancelled);
            }

            let due = {
                let mut inner = shared.inner.lock();
                if inner.state.is_complete() {
                    return Ok(());
                }

                let due = inner.state.due(Instant::now(), timeout);
                if let Some(max) = self.config.max_retransmits {
                    if let Some(&seq) = due.iter().find(|&&seq| inner.state.attempts(seq) > max + 1) {
                        return Err(Error::PeerUnreachable {
                            sequence: seq,
                            attempts: max + 1,
                        });
                    }
                }
                for &seq in &due {
                    inner.stats.chunks_sent += 1;
                    if inner.state.attempts(seq) > 1 {
                        inner.stats.retransmitted_chunks += 1;
                    }
                }
                due.into_iter()
                    .map(|seq| (seq, inner.state.attempts(seq)))
                    .collect::<Vec<_>>()
            };

            for (seq, attempt) in due {
                if let Err(e) = self.transport.send_to(&sealed[seq as usize], peer).await {
                    warn!("청크 {} 전송 실패: {}", seq, e);
                    continue;
                }
                if attempt > 1 {
                    info!("재전송: 청크 {} ({}번째)", seq, attempt);
                } else {
                    info!("전송: 청크 {}", seq);
                }
            }

            tokio::select! {
                _ = ticker.tick() => {}
                _ = shared.wake.notified() => {}
            }
        }
    }

    /// TERMINATING: END 중복 전송 후 EACK 대기
    async fn terminate(&self, shared: &Shared, peer: SocketAddr) -> Result<Completion> {
        let end = Message::End.to_bytes();
        for _ in 0..self.config.end_repeat {
            if let Err(e) = self.transport.send_to(&end, peer).await {
                warn!("END 전송 실패: {}", e);
                continue;
            }
            shared.inner.lock().stats.end_sent += 1;
        }
        info!("모든 청크 확인됨, 수신자 완료 확인 대기...");

        let deadline = tokio::time::sleep(self.config.eack_timeout());
        tokio::pin!(deadline);

        loop {
            if shared.eack.load(Ordering::SeqCst) {
                return Ok(Completion::Confirmed);
            }
            if !self.running.load(Ordering::SeqCst) {
                return Err(Error::Cancelled);
            }

            tokio::select! {
                _ = &mut deadline => return Ok(Completion::AssumedByTimeout),
                _ = shared.wake.notified() => {}
                _ = tokio::time::sleep(self.config.recv_poll()) => {}
            }
        }
    }
}

/// ACK 리스너: ACK/EACK를 받아 공유 상태 갱신. `stop`이 설정될 때까지 실행
async fn listen_for_acks<T: Transport>(
    transport: Arc<T>,
    shared: Arc<Shared>,
    running: Arc<AtomicBool>,
    poll: Duration,
) {
    let mut buf = vec![0u8; 65535];

    while running.load(Ordering::SeqCst) && !shared.stop.load(Ordering::SeqCst) {
        let (len, from) = match tokio::time::timeout(poll, transport.recv_from(&mut buf)).await {
            Ok(Ok(received)) => received,
            Ok(Err(e)) => {
                // ICMP port unreachable 등. 짧게 쉬고 계속
                debug!("수신 에러: {}", e);
                tokio::time::sleep(poll).await;
                continue;
            }
            Err(_) => continue,
        };

        match Message::from_bytes(&buf[..len]) {
            Some(Message::Ack { seq }) => {
                let advanced = {
                    let mut inner = shared.inner.lock();
                    let before = inner.state.base();
                    match inner.state.on_ack(seq) {
                        AckOutcome::New => {
                            inner.stats.acks_received += 1;
                            info!("ACK 수신: 청크 {} (base={})", seq, inner.state.base());
                        }
                        AckOutcome::Duplicate => {
                            inner.stats.duplicate_acks += 1;
                            debug!("중복 ACK: 청크 {}", seq);
                        }
                        AckOutcome::OutOfRange => {
                            debug!("범위 밖 ACK 무시: {} from {}", seq, from);
                        }
                    }
                    inner.state.base() != before
                };
                // 윈도우 전진 (완료 포함) → 다음 틱을 기다리지 않음
                if advanced {
                    shared.wake.notify_one();
                }
            }
            Some(Message::EndAck) => {
                // ACTIVE 중의 EACK는 이전 세션의 잔여 패킷. ACK 처리는 계속
                let complete = shared.inner.lock().state.is_complete();
                if !complete {
                    debug!("완료 전 EACK 무시 from {}", from);
                    continue;
                }
                shared.eack.store(true, Ordering::SeqCst);
                shared.wake.notify_one();
                debug!("EACK 수신 from {}", from);
            }
            Some(other) => debug!("송신측에서 무시: {:?} from {}", other.msg_type(), from),
            None => debug!("잘못된 패킷 무시: {} bytes from {}", len, from),
        }
    }
}
