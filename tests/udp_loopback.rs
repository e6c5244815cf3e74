//! 루프백 UDP 전송 테스트

use std::time::Duration;

use bytes::Bytes;

use srft::transport::UdpTransport;
use srft::{Completion, Config, Receiver, Sender, SharedKey, Transport};

#[tokio::test]
async fn test_udp_loopback_transfer() {
    let key = SharedKey::generate();
    let config = Config::local_fast();

    let receiver_link = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
    let receiver_addr = receiver_link.local_addr().unwrap();
    let sender_link = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();

    let receiving = tokio::spawn(Receiver::new(config.clone(), receiver_link, &key).receive());

    let payload = Bytes::from((0..50_000u32).map(|i| (i % 97) as u8).collect::<Vec<_>>());
    let sent = tokio::time::timeout(
        Duration::from_secs(15),
        Sender::new(config, sender_link, &key).send(payload.clone(), receiver_addr),
    )
    .await
    .expect("sender timed out")
    .expect("send failed");

    let received = tokio::time::timeout(Duration::from_secs(15), receiving)
        .await
        .expect("receiver timed out")
        .unwrap()
        .expect("receive failed");

    assert_eq!(sent.total_chunks, 49);
    assert_eq!(sent.completion, Completion::Confirmed);
    assert_eq!(received.payload, payload);
    assert!(received.missing.is_empty());
    assert_eq!(received.sender.map(|addr| addr.ip()), Some("127.0.0.1".parse().unwrap()));
}
