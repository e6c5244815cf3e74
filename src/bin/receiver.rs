//! SRFT 수신자
//!
//! 청크를 받아 ACK를 회신하고, END 이후 유예 시간이 지나면 파일로 저장
//!
//! 사용법:
//!   cargo run --release --bin srft-recv -- [OPTIONS]
//!
//! 예시:
//!   # 특정 송신자로부터 수신
//!   cargo run --release --bin srft-recv -- --sender 192.168.1.10 --output received.json
//!
//!   # 누락 청크가 있으면 저장하지 않음
//!   cargo run --release --bin srft-recv -- -o received.json --require-contiguous

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use srft::transport::UdpTransport;
use srft::{Config, FinalizePolicy, ReceiveReport, Receiver, SharedKey};

/// 수신자 설정
#[derive(Parser, Debug)]
#[command(name = "srft-recv", version, about = "SRFT receiver - selective-repeat encrypted file transfer")]
struct Args {
    /// 수신 데이터 저장 경로
    #[arg(short, long)]
    output: PathBuf,

    /// 이 IP에서 온 패킷만 처리
    #[arg(short, long)]
    sender: Option<IpAddr>,

    /// 공유 키 파일 (없으면 생성)
    #[arg(short, long, default_value = "encryption_key.key")]
    key: PathBuf,

    /// JSON 설정 파일
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 바인드 주소 (기본: 0.0.0.0:<data_port>)
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// raw IP 바인딩 사용 (root 필요)
    #[arg(long)]
    raw: bool,

    /// 0..=최대 시퀀스 중 누락이 있으면 실패
    #[arg(long)]
    require_contiguous: bool,
}

fn load_config(args: &Args) -> srft::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if args.require_contiguous {
        config.finalize_policy = FinalizePolicy::RequireContiguous;
    }
    config.validate()?;
    Ok(config)
}

fn receiver<T: srft::Transport>(
    config: Config,
    transport: T,
    key: &SharedKey,
    sender: Option<IpAddr>,
    running: Arc<AtomicBool>,
) -> Receiver<T> {
    let receiver = Receiver::new(config, transport, key).with_running_flag(running);
    match sender {
        Some(ip) => receiver.expect_sender(ip),
        None => receiver,
    }
}

#[cfg(unix)]
async fn receive_raw(
    config: Config,
    key: &SharedKey,
    sender: Option<IpAddr>,
    running: Arc<AtomicBool>,
) -> srft::Result<ReceiveReport> {
    let transport = srft::transport::RawTransport::bind(config.raw_protocol)?;
    receiver(config, transport, key, sender, running).receive().await
}

#[cfg(not(unix))]
async fn receive_raw(
    _config: Config,
    _key: &SharedKey,
    _sender: Option<IpAddr>,
    _running: Arc<AtomicBool>,
) -> srft::Result<ReceiveReport> {
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

    info!("SRFT Receiver starting...");

    let key = SharedKey::load_or_generate(&args.key)?;

    // Ctrl-C → 다음 recv 경계에서 취소, 출력 파일은 만들지 않음
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
        receive_raw(config, &key, args.sender, running).await?
    } else {
        // 데이터 포트를 못 잡으면 수신 불가 → 종료
        let transport = match args.bind {
            Some(addr) => UdpTransport::bind(addr).await?,
            None => UdpTransport::bind_port(config.data_port).await?,
        };
        receiver(config, transport, &key, args.sender, running)
            .receive()
            .await?
    };

    std::fs::write(&args.output, &report.payload)?;

    info!("File received and saved to {:?}", args.output);
    info!("  Bytes: {}", report.payload.len());
    info!("  Chunks: {}", report.chunks);
    if let Some(sender) = report.sender {
        info!("  Sender: {}", sender);
    }
    if !report.missing.is_empty() {
        warn!("  Missing chunks: {:?} (output truncated)", report.missing);
    }
    info!("  {}", report.stats.summary());

    Ok(())
}
