//! # SRFT (Secure Reliable File Transfer)
//!
//! 손실/순서 뒤바뀜/중복이 있는 데이터그램 위의 신뢰성 있는 암호화 전송
//!
//! ## 핵심 특징
//! - **Selective-Repeat ARQ**: 청크별 ACK, 미확인 청크만 타임아웃 재전송
//! - **고정 슬라이딩 윈도우**: 동시에 미확인 상태인 청크 수 제한
//! - **청크별 암호화**: 사전 공유 키 + ChaCha20-Poly1305, 청크마다 독립 복호화
//! - **교체 가능한 바인딩**: 고정 포트 UDP 또는 raw IP
//! - **페이로드 무관**: 바이트열을 받아 바이트열을 돌려줌

pub mod chunk;
pub mod config;
pub mod crypto;
pub mod error;
pub mod message;
pub mod peers;
pub mod receiver;
pub mod sender;
pub mod stats;
pub mod transport;

pub use chunk::{Assembler, Chunk, Seq};
pub use config::{Config, FinalizePolicy};
pub use crypto::{ChunkCipher, CryptoError, SharedKey};
pub use error::{Error, Result};
pub use message::{Message, MessageType};
pub use peers::{Peer, PeerBook};
pub use receiver::{ReceiveReport, Receiver, ReceiverState};
pub use sender::{Completion, SendReport, Sender, SenderState};
pub use stats::TransferStats;
pub use transport::Transport;

/// 기본 청크 크기 (바이트)
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// 기본 윈도우 크기 (청크 수)
pub const DEFAULT_WINDOW_SIZE: u32 = 4;

/// END/EACK 전용 시퀀스 (실제 청크를 가리키지 않음)
pub const END_SEQUENCE: u32 = 999_999_999;

/// 수신측 데이터 포트
pub const DEFAULT_DATA_PORT: u16 = 5005;

/// 송신측 ACK 포트
pub const DEFAULT_ACK_PORT: u16 = 5006;
