//! 프로토콜 메시지 정의
//!
//! 와이어 형식: 4바이트 ASCII 태그 + 4바이트 빅엔디언 시퀀스 (+ DATA는 암호문)
//!
//! ```text
//! DATA | seq(4) | nonce(12) ciphertext tag(16)
//! ACK! | seq(4)
//! END! | 999999999
//! EACK | 999999999
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::chunk::Seq;
use crate::END_SEQUENCE;

/// 헤더 크기 (태그 + 시퀀스)
pub const HEADER_SIZE: usize = 8;

/// 메시지 타입 (와이어 태그)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// 암호화된 데이터 청크
    Data,

    /// 청크별 확인 응답
    Ack,

    /// 세션 종료 알림
    End,

    /// 종료 확인 응답
    EndAck,
}

impl MessageType {
    pub const fn tag(self) -> &'static [u8; 4] {
        match self {
            MessageType::Data => b"DATA",
            MessageType::Ack => b"ACK!",
            MessageType::End => b"END!",
            MessageType::EndAck => b"EACK",
        }
    }

    pub fn from_tag(tag: &[u8]) -> Option<Self> {
        match tag {
            b"DATA" => Some(MessageType::Data),
            b"ACK!" => Some(MessageType::Ack),
            b"END!" => Some(MessageType::End),
            b"EACK" => Some(MessageType::EndAck),
            _ => None,
        }
    }
}

/// 통합 메시지 enum
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Data { seq: Seq, ciphertext: Bytes },
    Ack { seq: Seq },
    End,
    EndAck,
}

impl Message {
    /// 메시지 타입 반환
    pub fn msg_type(&self) -> MessageType {
        match self {
            Message::Data { .. } => MessageType::Data,
            Message::Ack { .. } => MessageType::Ack,
            Message::End => MessageType::End,
            Message::EndAck => MessageType::EndAck,
        }
    }

    /// 헤더의 시퀀스 필드
    pub fn seq(&self) -> Seq {
        match self {
            Message::Data { seq, .. } | Message::Ack { seq } => *seq,
            Message::End | Message::EndAck => END_SEQUENCE,
        }
    }

    /// 바이트로 직렬화
    pub fn to_bytes(&self) -> Bytes {
        let body_len = match self {
            Message::Data { ciphertext, .. } => ciphertext.len(),
            _ => 0,
        };

        let mut buf = BytesMut::with_capacity(HEADER_SIZE + body_len);
        buf.put_slice(self.msg_type().tag());
        buf.put_u32(self.seq());
        if let Message::Data { ciphertext, .. } = self {
            buf.put_slice(ciphertext);
        }
        buf.freeze()
    }

    /// 바이트에서 역직렬화
    ///
    /// 알 수 없는 태그, 짧은 패킷, 실제 청크를 가리키는 END/EACK는 None
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < HEADER_SIZE {
            return None;
        }

        let msg_type = MessageType::from_tag(&bytes[..4])?;
        let mut header = &bytes[4..HEADER_SIZE];
        let seq = header.get_u32();

        match msg_type {
            MessageType::Data if seq != END_SEQUENCE => Some(Message::Data {
                seq,
                ciphertext: Bytes::copy_from_slice(&bytes[HEADER_SIZE..]),
            }),
            MessageType::Ack if seq != END_SEQUENCE => Some(Message::Ack { seq }),
            MessageType::End if seq == END_SEQUENCE => Some(Message::End),
            MessageType::EndAck if seq == END_SEQUENCE => Some(Message::EndAck),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_layout() {
        let ack = Message::Ack { seq: 258 }.to_bytes();
        assert_eq!(ack.as_ref(), b"ACK!\x00\x00\x01\x02");

        let end = Message::End.to_bytes();
        assert_eq!(&end[..4], b"END!");
        assert_eq!(&end[4..], &999_999_999u32.to_be_bytes());

        let data = Message::Data {
            seq: 1,
            ciphertext: Bytes::from_static(b"sealed"),
        }
        .to_bytes();
        assert_eq!(&data[..8], b"DATA\x00\x00\x00\x01");
        assert_eq!(&data[8..], b"sealed");
    }

    #[test]
    fn test_parse() {
        assert_eq!(
            Message::from_bytes(b"EACK\x3b\x9a\xc9\xff"),
            Some(Message::EndAck)
        );
        assert_eq!(
            Message::from_bytes(b"DATA\x00\x00\x00\x07abc"),
            Some(Message::Data {
                seq: 7,
                ciphertext: Bytes::from_static(b"abc")
            })
        );
    }

    #[test]
    fn test_message_type_as_map_key() {
        use std::collections::HashMap;

        let mut counts: HashMap<(MessageType, Seq), u32> = HashMap::new();
        for packet in [
            Message::Ack { seq: 1 },
            Message::Ack { seq: 1 },
            Message::End,
        ] {
            *counts.entry((packet.msg_type(), packet.seq())).or_insert(0) += 1;
        }
        assert_eq!(counts.get(&(MessageType::Ack, 1)), Some(&2));
        assert_eq!(counts.get(&(MessageType::End, END_SEQUENCE)), Some(&1));
        assert_eq!(counts.get(&(MessageType::Data, 1)), None);
    }

    #[test]
    fn test_rejects_malformed() {
        assert_eq!(Message::from_bytes(b"ACK!"), None);
        assert_eq!(Message::from_bytes(b"NACK\x00\x00\x00\x01"), None);
        // 센티널은 실제 청크를 가리키지 않음
        assert_eq!(Message::from_bytes(b"ACK!\x3b\x9a\xc9\xff"), None);
        assert_eq!(Message::from_bytes(b"END!\x00\x00\x00\x01"), None);
    }
}
