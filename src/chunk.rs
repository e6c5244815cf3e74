//! 청크 분할과 조립
//!
//! - 송신측: 페이로드를 고정 크기 청크로 분할 (시퀀스 0..total)
//! - 수신측: 시퀀스 키 기반 저장 → 오름차순 조립

use std::collections::BTreeMap;

use bytes::{Bytes, BytesMut};

use crate::{Error, FinalizePolicy, Result};

/// 청크 시퀀스 번호 (32비트)
pub type Seq = u32;

/// 평문 청크
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// 시퀀스 번호
    pub seq: Seq,

    /// 실제 데이터
    pub data: Bytes,
}

/// 전체 청크 수 계산: ceil(len / chunk_size)
pub fn total_chunks(len: usize, chunk_size: usize) -> usize {
    (len + chunk_size - 1) / chunk_size
}

/// 페이로드를 청크들로 분할
///
/// 마지막 청크는 짧을 수 있음. 빈 페이로드는 청크 0개.
pub fn split(payload: &Bytes, chunk_size: usize) -> Result<Vec<Chunk>> {
    if chunk_size == 0 {
        return Err(Error::InvalidConfig("chunk_size는 0보다 커야 함".into()));
    }

    let total = total_chunks(payload.len(), chunk_size);
    if total as u64 >= crate::END_SEQUENCE as u64 {
        return Err(Error::PayloadTooLarge {
            chunks: total as u64,
            max: crate::END_SEQUENCE,
        });
    }

    Ok((0..total)
        .map(|idx| {
            let start = idx * chunk_size;
            let end = (start + chunk_size).min(payload.len());
            Chunk {
                seq: idx as Seq,
                data: payload.slice(start..end),
            }
        })
        .collect())
}

/// 수신 청크 조립기
///
/// 같은 시퀀스는 처음 받은 것만 보관
#[derive(Debug, Default)]
pub struct Assembler {
    chunks: BTreeMap<Seq, Bytes>,
    bytes: usize,
}

impl Assembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// 청크 삽입. 새 청크면 true, 중복이면 false
    pub fn insert(&mut self, seq: Seq, data: Bytes) -> bool {
        if self.chunks.contains_key(&seq) {
            return false;
        }
        self.bytes += data.len();
        self.chunks.insert(seq, data);
        true
    }

    /// 받은 청크 수
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// 관측된 최대 시퀀스
    pub fn highest(&self) -> Option<Seq> {
        self.chunks.keys().next_back().copied()
    }

    /// 0..=highest 범위의 누락 시퀀스
    pub fn missing(&self) -> Vec<Seq> {
        let Some(highest) = self.highest() else {
            return Vec::new();
        };
        (0..=highest).filter(|seq| !self.chunks.contains_key(seq)).collect()
    }

    /// 오름차순으로 조립
    pub fn assemble(self, policy: FinalizePolicy) -> Result<Bytes> {
        if policy == FinalizePolicy::RequireContiguous {
            let missing = self.missing();
            if !missing.is_empty() {
                return Err(Error::IncompleteTransfer { missing });
            }
        }

        let mut out = BytesMut::with_capacity(self.bytes);
        for data in self.chunks.into_values() {
            out.extend_from_slice(&data);
        }
        Ok(out.freeze())
    }
}
