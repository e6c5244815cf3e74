//! 전송 통계

use std::time::{Duration, Instant};

/// 전체 전송 통계
#[derive(Debug, Clone)]
pub struct TransferStats {
    /// 시작 시간
    pub start_time: Instant,

    /// 전체 청크 수 (송신측만 알 수 있음)
    pub total_chunks: u64,

    /// 전송한 DATA 패킷 수 (재전송 포함)
    pub chunks_sent: u64,

    /// 재전송 청크 수
    pub retransmitted_chunks: u64,

    /// 새로 확인된 ACK 수
    pub acks_received: u64,

    /// 중복 ACK 수
    pub duplicate_acks: u64,

    /// 새로 받은 청크 수
    pub chunks_received: u64,

    /// 중복 수신 청크 수
    pub duplicate_chunks: u64,

    /// 복호화 실패로 버린 청크 수
    pub decrypt_failures: u64,

    /// 청크 크기 초과로 버린 DATA 수
    pub oversize_chunks: u64,

    /// 보낸 END 수
    pub end_sent: u64,

    /// 평문 기준 바이트 수
    pub total_bytes: u64,

    /// 종료 시간
    pub finished_at: Option<Instant>,
}

impl TransferStats {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            total_chunks: 0,
            chunks_sent: 0,
            retransmitted_chunks: 0,
            acks_received: 0,
            duplicate_acks: 0,
            chunks_received: 0,
            duplicate_chunks: 0,
            decrypt_failures: 0,
            oversize_chunks: 0,
            end_sent: 0,
            total_bytes: 0,
            finished_at: None,
        }
    }

    /// 종료 시각 기록
    pub fn finish(&mut self) {
        self.finished_at.get_or_insert_with(Instant::now);
    }

    /// 경과 시간
    pub fn elapsed(&self) -> Duration {
        match self.finished_at {
            Some(end) => end.duration_since(self.start_time),
            None => self.start_time.elapsed(),
        }
    }

    /// 처리율 (bytes/sec)
    pub fn throughput(&self) -> f64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed == 0.0 {
            return 0.0;
        }
        self.total_bytes as f64 / elapsed
    }

    /// 재전송 비율
    pub fn retransmit_ratio(&self) -> f64 {
        if self.chunks_sent == 0 {
            return 0.0;
        }
        self.retransmitted_chunks as f64 / self.chunks_sent as f64
    }

    /// 통계 요약 문자열
    pub fn summary(&self) -> String {
        format!(
            "Elapsed: {:.2}s | Chunks: {} | Sent: {} (retx {:.1}%) | ACKs: {} (+{} dup) | Received: {} (+{} dup) | Decrypt failures: {} | Bytes: {} | Throughput: {:.2} KB/s",
            self.elapsed().as_secs_f64(),
            self.total_chunks,
            self.chunks_sent,
            self.retransmit_ratio() * 100.0,
            self.acks_received,
            self.duplicate_acks,
            self.chunks_received,
            self.duplicate_chunks,
            self.decrypt_failures,
            self.total_bytes,
            self.throughput() / 1000.0,
        )
    }
}

impl Default for TransferStats {
    fn default() -> Self {
        Self::new()
    }
}
