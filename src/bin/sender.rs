//! SRFT 송신자
//!
//! 파일을 청크 단위로 암호화해 Selective-Repeat ARQ로 전송
//!
//! 사용법:
//!   cargo run --release --bin srft-send -- [OPTIONS]
//!
//! 예시:
//!   # 주소록의 피어에게 전송
//!   cargo run --release --bin srft-send -- --file playlist.json --peer laptop
//!
//!   # 새 피어를 주소록에 저장하면서 전송
//!   cargo run --release --bin srft-send -- -f playlist.json -p 192.168.1.20 --save-as laptop
//!
//!   # raw IP 바인딩 (root 필요)
//!   sudo ./target/release/srft-send -f playlist.json -p 192.168.1.20 --raw

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use srft::transport::UdpTransport;
use srft::{Completion, Config, PeerBook, SendReport, Sender, SharedKey};

/// 송신자 설정
#[derive(Parser, Debug)]
#[command(name = "srft-send", version, about = "SRFT sender - selective-repeat encrypted file transfer")]
struct Args {
    /// 전송할 파일 경로
    #[arg(short, long)]
    file: PathBuf,

    /// 수신자: 주소록 이름, IP, 또는 IP:PORT
    #[arg(short, long)]
    peer: String,

    /// 피어 주소록 파일
    #[arg(long, default_value = "peers.txt")]
    peers_file: PathBuf,

    /// 이 이름으로 수신자를 주소록에 저장
    #[arg(long)]
    save_as: Option<String>,

    /// 공유 키 파일 (없으면 생성)
    #[arg(short, long, default_value = "encryption_key.key")]
    key: PathBuf,

    /// JSON 설정 파일
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// raw IP 바인딩 사용 (root 필요)
    #[arg(long)]
    raw: bool,

    /// 청크 크기 (바이트)
    #[arg(long)]
    chunk_size: Option<usize>,

    /// 윈도우 크기 (청크 수)
    #[arg(short, long)]
    window: Option<u32>,

    /// 청크별 최대 재전송 횟수 (기본: 무제한)
    #[arg(long)]
    max_retransmits: Option<u32>,
}

fn load_config(args: &Args) -> srft::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(chunk_size) = args.chunk_size {
        config.chunk_size = chunk_size;
    }
    if let Some(window) = args.window {
        config.window_size = window;
    }
    if args.max_retransmits.is_some() {
        config.max_retransmits = args.max_retransmits;
    }
    config.validate()?;
    Ok(config)
}

/// --peer 해석: IP:PORT → IP → 주소록 이름 순
fn resolve_peer(args: &Args, config: &Config) -> Result<SocketAddr, Box<dyn std::error::Error>> {
    let mut book = PeerBook::load(&args.peers_file)?;

    let addr = if let Ok(addr) = args.peer.parse::<SocketAddr>() {
        addr
    } else if let Ok(ip) = args.peer.parse::<IpAddr>() {
        SocketAddr::new(ip, config.data_port)
    } else if let Some(peer) = book.find(&args.peer) {
        info!("Peer '{}' resolved from {:?}", peer.name, book.path());
        SocketAddr::new(peer.addr, config.data_port)
    } else {
        return Err(format!("unknown peer '{}' (not an address, not in {:?})", args.peer, args.peers_file).into());
    };

    if let Some(name) = &args.save_as {
        book.add(name, addr.ip())?;
    }
    Ok(addr)
}

#[cfg(unix)]
async fn send_raw(
    config: Config,
    key: &SharedKey,
    running: Arc<AtomicBool>,
    payload: Bytes,
    peer: SocketAddr,
) -> srft::Result<SendReport> {
    let transport = srft::transport::RawTransport::bind(config.raw_protocol)?;
    Sender::new(config, transport, key)
        .with_running_flag(running)
        .send(payload, peer)
        .await
}

#[cfg(not(unix))]
async fn send_raw(
    _config: Config,
    _key: &SharedKey,
    _running: Arc<AtomicBool>,
    _payload: Bytes,
    _peer: SocketAddr,
) -> srft::Result<SendReport> {
    Err(srft::Error::RawUnsupported)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 설정
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;

    info!("SRFT Sender starting...");

    let key = SharedKey::load_or_generate(&args.key)?;
    let peer = resolve_peer(&args, &config)?;
    let payload = Bytes::from(std::fs::read(&args.file)?);

    info!("File: {:?} ({} bytes)", args.file, payload.len());
    info!("Receiver: {}", peer);

    // Ctrl-C → 다음 recv 경계에서 취소
    let running = Arc::new(AtomicBool::new(true));
    let running_signal = running.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping...");
            running_signal.store(false, Ordering::SeqCst);
        }
    });

    let report = if args.raw {
        info!("Binding: raw IP protocol {}", config.raw_protocol);
        send_raw(config, &key, running, payload, peer).await?
    } else {
        // ACK 포트를 못 잡아도 전송은 계속
        let ack_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), config.ack_port);
        let transport = UdpTransport::bind_or_ephemeral(ack_addr).await?;
        info!("Binding: UDP, acks on {}", srft::Transport::local_addr(&transport)?);
        Sender::new(config, transport, &key)
            .with_running_flag(running)
            .send(payload, peer)
            .await?
    };

    match report.completion {
        Completion::Confirmed => info!("Transfer complete: receiver confirmed ({} chunks)", report.total_chunks),
        Completion::AssumedByTimeout => warn!(
            "Transfer assumed complete: no confirmation from receiver ({} chunks)",
            report.total_chunks
        ),
    }
    info!("  {}", report.stats.summary());

    Ok(())
}
