//! 프로토콜 설정
//!
//! 우선순위: CLI 플래그 → 설정 파일(JSON) → 기본값

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result, DEFAULT_ACK_PORT, DEFAULT_CHUNK_SIZE, DEFAULT_DATA_PORT, DEFAULT_WINDOW_SIZE};

/// 수신 종료 시 조립 정책
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalizePolicy {
    /// 받은 청크만 순서대로 기록 (빈 구간은 건너뜀)
    #[default]
    AsObserved,

    /// 0..=최대 시퀀스 중 하나라도 비면 실패
    RequireContiguous,
}

/// SRFT 프로토콜 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 청크 크기 (바이트)
    pub chunk_size: usize,

    /// 동시에 미확인 상태로 둘 수 있는 청크 수
    pub window_size: u32,

    /// 청크별 재전송 타임아웃 (밀리초)
    pub retransmit_timeout_ms: u64,

    /// 송신 루프 틱 간격 (밀리초)
    pub tick_interval_ms: u64,

    /// END 중복 전송 횟수
    pub end_repeat: u32,

    /// EACK 대기 타임아웃 (밀리초)
    pub eack_timeout_ms: u64,

    /// END 이후 수신 유예 시간 (밀리초)
    pub quiescence_ms: u64,

    /// 한 번의 recv 대기 상한 (밀리초)
    /// 취소 플래그는 이 간격마다 확인됨
    pub recv_poll_ms: u64,

    /// 청크별 최대 재전송 횟수 (None이면 무제한)
    pub max_retransmits: Option<u32>,

    /// 수신측이 바인딩하는 데이터 포트
    pub data_port: u16,

    /// 송신측이 바인딩하는 ACK 포트
    /// 0이면 수신측은 DATA의 출발 주소로 ACK를 회신
    pub ack_port: u16,

    /// raw 바인딩용 IP 프로토콜 번호
    pub raw_protocol: u8,

    /// 수신 종료 시 조립 정책
    pub finalize_policy: FinalizePolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            window_size: DEFAULT_WINDOW_SIZE,
            retransmit_timeout_ms: 2000,      // 2초
            tick_interval_ms: 100,            // 100ms
            end_repeat: 3,
            eack_timeout_ms: 5000,            // 5초
            quiescence_ms: 3000,              // 3초
            recv_poll_ms: 100,
            max_retransmits: None,
            data_port: DEFAULT_DATA_PORT,
            ack_port: DEFAULT_ACK_PORT,
            raw_protocol: 253,                // RFC 3692 실험용
            finalize_policy: FinalizePolicy::AsObserved,
        }
    }
}

impl Config {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// JSON 설정 파일 로드 (없는 필드는 기본값)
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Config = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// 값 검증
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::InvalidConfig("chunk_size는 0보다 커야 함".into()));
        }
        if self.window_size == 0 {
            return Err(Error::InvalidConfig("window_size는 0보다 커야 함".into()));
        }
        if self.tick_interval_ms == 0 || self.recv_poll_ms == 0 {
            return Err(Error::InvalidConfig("tick/poll 간격은 0보다 커야 함".into()));
        }
        if self.end_repeat == 0 {
            return Err(Error::InvalidConfig("end_repeat는 1 이상이어야 함".into()));
        }
        Ok(())
    }

    pub fn retransmit_timeout(&self) -> Duration {
        Duration::from_millis(self.retransmit_timeout_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn eack_timeout(&self) -> Duration {
        Duration::from_millis(self.eack_timeout_ms)
    }

    pub fn quiescence(&self) -> Duration {
        Duration::from_millis(self.quiescence_ms)
    }

    pub fn recv_poll(&self) -> Duration {
        Duration::from_millis(self.recv_poll_ms)
    }

    /// 손실이 심한 네트워크용 설정
    pub fn lossy_network() -> Self {
        Self {
            chunk_size: 512,                  // 작은 청크
            window_size: 8,
            retransmit_timeout_ms: 1000,
            end_repeat: 5,
            eack_timeout_ms: 10000,
            quiescence_ms: 5000,
            ..Self::default()
        }
    }

    /// 로컬 루프백/테스트용 빠른 설정
    pub fn local_fast() -> Self {
        Self {
            window_size: 16,
            retransmit_timeout_ms: 200,
            tick_interval_ms: 10,
            eack_timeout_ms: 1000,
            quiescence_ms: 300,
            recv_poll_ms: 20,
            ack_port: 0,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_protocol_tunables() {
        let config = Config::default();
        assert_eq!(config.chunk_size, 1024);
        assert_eq!(config.window_size, 4);
        assert_eq!(config.retransmit_timeout(), Duration::from_secs(2));
        assert_eq!(config.tick_interval(), Duration::from_millis(100));
        assert_eq!(config.quiescence(), Duration::from_secs(3));
        assert_eq!(config.eack_timeout(), Duration::from_secs(5));
        assert_ne!(config.data_port, config.ack_port);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_chunk_size() {
        let config = Config {
            chunk_size: 0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_from_file_fills_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("srft.json");
        std::fs::write(
            &path,
            r#"{ "window_size": 8, "finalize_policy": "require_contiguous" }"#,
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.window_size, 8);
        assert_eq!(config.finalize_policy, FinalizePolicy::RequireContiguous);
        assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
    }
}
