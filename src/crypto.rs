//! 암호화 모듈 - 사전 공유 키 + ChaCha20-Poly1305 청크 암호화
//!
//! 흐름:
//! 1. 키 파일이 없으면 OsRng로 32바이트 키 생성 후 저장
//! 2. 양측은 같은 키 파일을 별도 채널로 공유 (와이어로 전송하지 않음)
//! 3. 청크마다 랜덤 nonce로 독립 암호화 → 순서/중복과 무관하게 복호화 가능
//! 4. 시퀀스 번호는 AAD로 묶임 → 헤더 시퀀스를 바꾼 패킷은 복호화 실패

use std::io::Write;
use std::path::Path;

use chacha20poly1305::{
    aead::{Aead, AeadCore, KeyInit, Payload},
    ChaCha20Poly1305, Key, Nonce,
};
use rand_core::{OsRng, RngCore};
use tracing::info;
use zeroize::Zeroize;

use crate::chunk::Seq;
use crate::{Error, Result};

/// 대칭 키 크기 (32 bytes)
pub const KEY_SIZE: usize = 32;

/// ChaCha20-Poly1305 nonce 크기 (12 bytes)
pub const NONCE_SIZE: usize = 12;

/// ChaCha20-Poly1305 태그 크기 (16 bytes)
pub const TAG_SIZE: usize = 16;

/// 청크당 암호문 오버헤드
pub const CIPHER_OVERHEAD: usize = NONCE_SIZE + TAG_SIZE;

/// 암호화 오류
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("암호화 실패: {0}")]
    EncryptionFailed(String),
    #[error("복호화 실패: {0}")]
    DecryptionFailed(String),
    #[error("잘못된 키 크기")]
    InvalidKeySize,
}

/// 사전 공유 대칭 키
///
/// drop 시 zeroize
#[derive(Clone)]
pub struct SharedKey {
    key: [u8; KEY_SIZE],
}

impl SharedKey {
    /// 새 랜덤 키 생성
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut key);
        Self { key }
    }

    pub fn from_bytes(key: [u8; KEY_SIZE]) -> Self {
        Self { key }
    }

    /// hex 문자열에서 복원
    pub fn from_hex(text: &str) -> std::result::Result<Self, CryptoError> {
        let mut key = [0u8; KEY_SIZE];
        hex::decode_to_slice(text.trim(), &mut key).map_err(|_| CryptoError::InvalidKeySize)?;
        Ok(Self { key })
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.key)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.key
    }

    /// 키 파일 로드, 없으면 생성 후 저장
    ///
    /// 파일 형식: 64자 hex + 개행. 32바이트 raw 파일도 허용.
    pub fn load_or_generate(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            return Self::load(path);
        }

        let key = Self::generate();
        key.save(path)?;
        info!("새 암호화 키 생성: {}", path.display());
        Ok(key)
    }

    /// 키 파일 로드
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read(path)?;

        if raw.len() == KEY_SIZE {
            let mut key = [0u8; KEY_SIZE];
            key.copy_from_slice(&raw);
            return Ok(Self { key });
        }

        let text = std::str::from_utf8(&raw).map_err(|_| Error::KeyFile {
            path: path.to_path_buf(),
            reason: "hex 텍스트 또는 32바이트 raw 키가 아님".into(),
        })?;
        Self::from_hex(text).map_err(|e| Error::KeyFile {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// 키 파일 저장 (기존 파일은 덮어쓰지 않음)
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut options = std::fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(path)?;
        let mut text = self.to_hex();
        text.push('\n');
        file.write_all(text.as_bytes())?;
        file.sync_all()?;
        text.zeroize();
        Ok(())
    }
}

impl Drop for SharedKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl std::fmt::Debug for SharedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SharedKey(..)")
    }
}

/// 청크 암호화기
#[derive(Clone)]
pub struct ChunkCipher {
    cipher: ChaCha20Poly1305,
}

impl ChunkCipher {
    pub fn new(key: &SharedKey) -> Self {
        let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
        Self { cipher }
    }

    /// 청크 암호화 (시퀀스 번호를 AAD로 사용)
    /// 반환: nonce(12) + ciphertext(원본 + 16바이트 태그)
    pub fn encrypt(&self, seq: Seq, plaintext: &[u8]) -> std::result::Result<Vec<u8>, CryptoError> {
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let aad = seq.to_be_bytes();

        let ciphertext = self
            .cipher
            .encrypt(
                &nonce,
                Payload {
                    msg: plaintext,
                    aad: &aad,
                },
            )
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

        let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        result.extend_from_slice(&nonce);
        result.extend_from_slice(&ciphertext);
        Ok(result)
    }

    /// 청크 복호화
    /// 입력: nonce(12) + ciphertext. 태그 불일치, 다른 키, 다른 시퀀스면 에러
    pub fn decrypt(&self, seq: Seq, encrypted: &[u8]) -> std::result::Result<Vec<u8>, CryptoError> {
        if encrypted.len() < CIPHER_OVERHEAD {
            return Err(CryptoError::DecryptionFailed("데이터가 너무 짧음".into()));
        }

        let (nonce, ciphertext) = encrypted.split_at(NONCE_SIZE);
        let aad = seq.to_be_bytes();
        self.cipher
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: ciphertext,
                    aad: &aad,
                },
            )
            .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
    }
}
