//! 에러 타입 정의

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

use crate::crypto::CryptoError;

/// SRFT 프로토콜 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    #[error("암호화 에러: {0}")]
    Crypto(#[from] CryptoError),

    #[error("설정 파일 에러: {0}")]
    ConfigFile(#[from] serde_json::Error),

    #[error("유효하지 않은 설정: {0}")]
    InvalidConfig(String),

    #[error("포트 바인딩 실패: {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("키 파일 에러: {}: {reason}", .path.display())]
    KeyFile { path: PathBuf, reason: String },

    #[error("피어 주소록 에러: {}: {reason}", .path.display())]
    PeerBook { path: PathBuf, reason: String },

    #[error("청크 수 초과: {chunks} chunks (최대 {max})")]
    PayloadTooLarge { chunks: u64, max: u32 },

    #[error("피어 응답 없음: sequence={sequence}, {attempts}회 전송")]
    PeerUnreachable { sequence: u32, attempts: u32 },

    #[error("불완전한 전송: 누락 청크 {} 개 (첫 누락: {})", .missing.len(), .missing.first().copied().unwrap_or_default())]
    IncompleteTransfer { missing: Vec<u32> },

    #[error("raw 소켓 미지원 플랫폼")]
    RawUnsupported,

    #[error("사용자 취소")]
    Cancelled,
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;
