//! 프로토콜 시나리오 테스트
//!
//! 송신자와 수신자를 결함 주입 메모리 링크로 연결해 손실/중복/순서 뒤바뀜을
//! 결정적으로 재현한다.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use srft::transport::memory::SentCounter;
use srft::transport::{FaultPlan, MemoryTransport};
use srft::{
    Completion, Config, Error, MessageType, ReceiveReport, Receiver, SendReport, Sender, SharedKey,
    END_SEQUENCE,
};

const TEST_DEADLINE: Duration = Duration::from_secs(15);

fn addrs() -> (SocketAddr, SocketAddr) {
    ("10.0.0.1:5006".parse().unwrap(), "10.0.0.2:5005".parse().unwrap())
}

fn test_payload(len: usize) -> Bytes {
    Bytes::from((0..len).map(|i| (i * 31 % 251) as u8).collect::<Vec<_>>())
}

struct Outcome {
    sent: SendReport,
    received: ReceiveReport,
    sender_packets: SentCounter,
    receiver_packets: SentCounter,
}

/// `to_receiver`는 송신자 → 수신자, `to_sender`는 수신자 → 송신자 방향 결함
async fn transfer(payload: Bytes, config: Config, to_receiver: FaultPlan, to_sender: FaultPlan) -> Outcome {
    let key = SharedKey::generate();
    let (sender_addr, receiver_addr) = addrs();
    let (sender_link, receiver_link) =
        MemoryTransport::pair_with_faults(sender_addr, receiver_addr, to_receiver, to_sender);
    let sender_packets = sender_link.sent_counter();
    let receiver_packets = receiver_link.sent_counter();

    let receiver = Receiver::new(config.clone(), receiver_link, &key);
    let receiving = tokio::spawn(receiver.receive());

    let sent = tokio::time::timeout(TEST_DEADLINE, Sender::new(config, sender_link, &key).send(payload, receiver_addr))
        .await
        .expect("sender timed out")
        .expect("send failed");
    let received = tokio::time::timeout(TEST_DEADLINE, receiving)
        .await
        .expect("receiver timed out")
        .unwrap()
        .expect("receive failed");

    Outcome {
        sent,
        received,
        sender_packets,
        receiver_packets,
    }
}

#[tokio::test]
async fn test_round_trip_identity() {
    let cases = [(0usize, 1024usize), (1, 1024), (1023, 1024), (1024, 1024), (3000, 1024), (5000, 100), (777, 13)];

    for (len, chunk_size) in cases {
        let config = Config {
            chunk_size,
            ..Config::local_fast()
        };
        let payload = test_payload(len);
        let outcome = transfer(payload.clone(), config, FaultPlan::default(), FaultPlan::default()).await;

        assert_eq!(outcome.received.payload, payload, "len={} chunk_size={}", len, chunk_size);
        assert_eq!(outcome.sent.completion, Completion::Confirmed);
        assert_eq!(outcome.sent.total_chunks as usize, (len + chunk_size - 1) / chunk_size);
        assert_eq!(outcome.sent.stats.retransmitted_chunks, 0);
        assert!(outcome.received.missing.is_empty());
    }
}

#[tokio::test]
async fn test_empty_payload() {
    let outcome = transfer(Bytes::new(), Config::local_fast(), FaultPlan::default(), FaultPlan::default()).await;

    assert_eq!(outcome.sent.total_chunks, 0);
    assert_eq!(outcome.sender_packets.get(MessageType::Data, 0), 0);
    assert_eq!(outcome.sender_packets.get(MessageType::End, END_SEQUENCE), 3);
    assert_eq!(outcome.sent.completion, Completion::Confirmed);
    assert!(outcome.received.payload.is_empty());
    assert_eq!(outcome.received.chunks, 0);
}

#[tokio::test]
async fn test_loss_and_recovery() {
    let config = Config::local_fast();
    let payload = test_payload(3000);

    // 청크 1의 첫 DATA와 첫 ACK 손실
    let outcome = transfer(
        payload.clone(),
        config.clone(),
        FaultPlan::default().drop_first(MessageType::Data, Some(1), 1),
        FaultPlan::default().drop_first(MessageType::Ack, Some(1), 1),
    )
    .await;

    assert_eq!(outcome.sent.total_chunks, 3);
    assert_eq!(outcome.sender_packets.get(MessageType::Data, 0), 1);
    assert_eq!(outcome.sender_packets.get(MessageType::Data, 1), 3);
    assert_eq!(outcome.sender_packets.get(MessageType::Data, 2), 1);
    assert_eq!(outcome.sent.stats.retransmitted_chunks, 2);
    // 재전송은 타임아웃 이후에만 일어남
    assert!(outcome.sent.stats.elapsed() >= config.retransmit_timeout() * 2);

    assert_eq!(outcome.sent.completion, Completion::Confirmed);
    assert_eq!(outcome.received.payload, payload);
    assert_eq!(outcome.received.chunks, 3);
}

#[tokio::test]
async fn test_reordering_and_duplication() {
    let config = Config {
        chunk_size: 512,
        ..Config::local_fast()
    };
    let payload = test_payload(20_000);

    let outcome = transfer(
        payload.clone(),
        config,
        FaultPlan::seeded(1).reorder(Duration::from_millis(30)).duplicate_all(),
        FaultPlan::seeded(2).reorder(Duration::from_millis(30)).duplicate_all(),
    )
    .await;

    assert_eq!(outcome.received.payload, payload);
    assert!(outcome.received.stats.duplicate_chunks > 0);
    assert!(outcome.sent.stats.duplicate_acks > 0);
    // 중복 END에도 EACK는 한 번
    assert_eq!(outcome.receiver_packets.get(MessageType::EndAck, END_SEQUENCE), 1);
}

#[tokio::test]
async fn test_scattered_loss_including_end() {
    let payload = test_payload(8 * 1024);

    let outcome = transfer(
        payload.clone(),
        Config::local_fast(),
        FaultPlan::default()
            .drop_first(MessageType::Data, Some(3), 2)
            .drop_first(MessageType::Data, Some(7), 1)
            .drop_first(MessageType::End, None, 2),
        FaultPlan::default()
            .drop_first(MessageType::Ack, Some(0), 1)
            .drop_first(MessageType::Ack, Some(5), 1),
    )
    .await;

    assert_eq!(outcome.received.payload, payload);
    assert_eq!(outcome.sent.completion, Completion::Confirmed);
    assert!(outcome.sender_packets.get(MessageType::Data, 3) >= 3);
}

#[tokio::test]
async fn test_lost_eack_assumes_completion() {
    let payload = test_payload(2500);

    let outcome = transfer(
        payload.clone(),
        Config::local_fast(),
        FaultPlan::default(),
        FaultPlan::default().drop_first(MessageType::EndAck, None, u32::MAX),
    )
    .await;

    assert_eq!(outcome.sent.completion, Completion::AssumedByTimeout);
    assert_eq!(outcome.received.payload, payload);
}

#[tokio::test]
async fn test_wrong_key_never_acknowledged() {
    let (sender_addr, receiver_addr) = addrs();
    let (sender_link, receiver_link) = MemoryTransport::pair(sender_addr, receiver_addr);
    let receiver_packets = receiver_link.sent_counter();

    let config = Config {
        max_retransmits: Some(2),
        ..Config::local_fast()
    };

    let running = Arc::new(AtomicBool::new(true));
    let receiver = Receiver::new(config.clone(), receiver_link, &SharedKey::generate()).with_running_flag(running.clone());
    let receiving = tokio::spawn(receiver.receive());

    let result = tokio::time::timeout(
        TEST_DEADLINE,
        Sender::new(config, sender_link, &SharedKey::generate()).send(test_payload(3000), receiver_addr),
    )
    .await
    .expect("sender timed out");

    match result {
        Err(Error::PeerUnreachable { attempts, .. }) => assert_eq!(attempts, 3),
        other => panic!("unexpected: {:?}", other.map(|r| r.completion)),
    }

    // 수신자는 복호화 실패 청크를 ACK하지 않고, 취소 시 출력 없음
    running.store(false, Ordering::SeqCst);
    let received = receiving.await.unwrap();
    assert!(matches!(received, Err(Error::Cancelled)));
    for seq in 0..3 {
        assert_eq!(receiver_packets.get(MessageType::Ack, seq), 0);
    }
}

#[tokio::test]
async fn test_receiver_cancellation() {
    let (sender_addr, receiver_addr) = addrs();
    let (_sender_link, receiver_link) = MemoryTransport::pair(sender_addr, receiver_addr);

    let receiver = Receiver::new(Config::local_fast(), receiver_link, &SharedKey::generate());
    let running = receiver.running_flag();
    let receiving = tokio::spawn(receiver.receive());

    tokio::time::sleep(Duration::from_millis(50)).await;
    running.store(false, Ordering::SeqCst);

    let result = tokio::time::timeout(Duration::from_secs(2), receiving)
        .await
        .expect("cancellation not observed")
        .unwrap();
    assert!(matches!(result, Err(Error::Cancelled)));
}

#[tokio::test]
async fn test_sender_filter_ignores_strangers() {
    let key = SharedKey::generate();
    let (sender_addr, receiver_addr) = addrs();
    let (sender_link, receiver_link) = MemoryTransport::pair(sender_addr, receiver_addr);

    let receiver = Receiver::new(Config::local_fast(), receiver_link, &key).expect_sender("10.9.9.9".parse().unwrap());
    let running = receiver.running_flag();
    let receiving = tokio::spawn(receiver.receive());

    let config = Config {
        eack_timeout_ms: 100,
        max_retransmits: Some(1),
        ..Config::local_fast()
    };
    let result = Sender::new(config, sender_link, &key).send(test_payload(100), receiver_addr).await;
    assert!(matches!(result, Err(Error::PeerUnreachable { .. })));

    running.store(false, Ordering::SeqCst);
    assert!(matches!(receiving.await.unwrap(), Err(Error::Cancelled)));
}

#[tokio::test]
async fn test_stale_eack_before_transfer_is_ignored() {
    let key = SharedKey::generate();
    let (sender_addr, receiver_addr) = addrs();
    let (sender_link, receiver_link) = MemoryTransport::pair(sender_addr, receiver_addr);

    // 이전 세션의 늦은 EACK가 송신자 ACK 포트에 먼저 도착
    srft::Transport::send_to(&receiver_link, &srft::Message::EndAck.to_bytes(), sender_addr)
        .await
        .unwrap();

    let config = Config {
        max_retransmits: Some(5),
        ..Config::local_fast()
    };
    let receiving = tokio::spawn(Receiver::new(config.clone(), receiver_link, &key).receive());

    let payload = test_payload(3000);
    let sent = tokio::time::timeout(TEST_DEADLINE, Sender::new(config, sender_link, &key).send(payload.clone(), receiver_addr))
        .await
        .expect("sender timed out")
        .expect("send failed");
    let received = tokio::time::timeout(TEST_DEADLINE, receiving)
        .await
        .expect("receiver timed out")
        .unwrap()
        .expect("receive failed");

    assert_eq!(sent.completion, Completion::Confirmed);
    assert_eq!(sent.stats.retransmitted_chunks, 0);
    assert_eq!(received.payload, payload);
}

#[tokio::test]
async fn test_oversize_data_dropped_without_ack() {
    let key = SharedKey::generate();
    let (sender_addr, receiver_addr) = addrs();
    let (sender_link, receiver_link) = MemoryTransport::pair(sender_addr, receiver_addr);
    let receiver_packets = receiver_link.sent_counter();

    let receiver_config = Config {
        chunk_size: 512,
        ..Config::local_fast()
    };
    let receiver = Receiver::new(receiver_config, receiver_link, &key);
    let running = receiver.running_flag();
    let receiving = tokio::spawn(receiver.receive());

    // 송신측 청크(1024)가 수신측 상한(512 + 28)을 넘음
    let sender_config = Config {
        chunk_size: 1024,
        max_retransmits: Some(1),
        ..Config::local_fast()
    };
    let result = tokio::time::timeout(
        TEST_DEADLINE,
        Sender::new(sender_config, sender_link, &key).send(test_payload(2048), receiver_addr),
    )
    .await
    .expect("sender timed out");
    assert!(matches!(result, Err(Error::PeerUnreachable { .. })));

    running.store(false, Ordering::SeqCst);
    assert!(matches!(receiving.await.unwrap(), Err(Error::Cancelled)));
    assert_eq!(receiver_packets.get(MessageType::Ack, 0), 0);
    assert_eq!(receiver_packets.get(MessageType::Ack, 1), 0);
}
