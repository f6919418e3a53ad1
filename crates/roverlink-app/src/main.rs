//! # roverlink-app
//!
//! Roverlink 텔레옵 클라이언트 바이너리 진입점.
//! 어댑터 생성과 주입, 라이프사이클 관리, 콘솔 조작 루프.

mod console;
mod lifecycle;
mod operator;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use roverlink_core::config::AppConfig;
use roverlink_core::config_manager::ConfigManager;
use roverlink_core::ports::audio::AudioCapture;
use roverlink_media::chunk_recorder::WavChunkRecorder;
use roverlink_media::rtp_sink::UdpRtpSink;
use roverlink_media::webrtc_endpoint::WebRtcEndpointFactory;
use roverlink_network::audio_api::HttpAudioApi;
use roverlink_network::control_channel::SocketIoChannel;
use roverlink_network::http::VehicleHttp;
use roverlink_network::signaling::HttpSignaling;
use roverlink_network::telemetry_client::HttpTelemetry;
use roverlink_session::{SessionPorts, StartOptions, TeleopSession};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::lifecycle::{shutdown_requested, LifecycleManager};
use crate::operator::{Command, Outcome};

/// 첫 연결 대기 (이후에는 백그라운드 재연결)
const INITIAL_CONNECT_WAIT: Duration = Duration::from_secs(5);

/// Roverlink 텔레옵 클라이언트
///
/// 조이스틱 입력을 차량 조종 명령으로 보내고 영상/오디오 세션을 관리한다.
#[derive(Parser, Debug)]
#[command(name = "roverlink")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// 차량 서버 URL (예: http://192.168.0.38:5000)
    #[arg(long, short = 's')]
    server: Option<String>,

    /// 로그 레벨 (trace, debug, info, warn, error)
    #[arg(long, short = 'l', default_value = "info")]
    log_level: String,

    /// 설정 파일 경로 (기본: 플랫폼 설정 디렉토리의 config.json)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// 영상 자동 시작 안 함
    #[arg(long)]
    no_video: bool,

    /// 텔레메트리 폴링 안 함
    #[arg(long)]
    no_telemetry: bool,
}

/// 설정 로드 후 CLI 인자 반영 (파일에는 저장하지 않음)
fn load_config(args: &Args) -> Result<AppConfig> {
    let manager = match &args.config {
        Some(path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    }
    .context("설정 로드 실패")?;
    info!("설정 파일: {}", manager.config_path().display());

    let mut config = manager.get();
    if let Some(server) = &args.server {
        config.server.base_url = server.trim_end_matches('/').to_string();
    }
    config.validate().context("설정 검증 실패")?;
    Ok(config)
}

#[cfg(feature = "microphone")]
fn capture_device() -> Arc<dyn AudioCapture> {
    Arc::new(roverlink_media::capture::CpalCapture::default())
}

#[cfg(not(feature = "microphone"))]
fn capture_device() -> Arc<dyn AudioCapture> {
    warn!("마이크 캡처 비활성 빌드, 'mic start'는 권한 거부로 실패합니다");
    Arc::new(roverlink_media::capture::DisabledCapture)
}

/// 설정으로 어댑터 생성
fn build_ports(config: &AppConfig, channel: Arc<SocketIoChannel>) -> Result<SessionPorts> {
    let http = VehicleHttp::from_config(config).context("HTTP 클라이언트 생성 실패")?;
    let video_sink = UdpRtpSink::from_addr(config.video.rtp_forward_addr.as_deref())
        .context("영상 싱크 생성 실패")?;

    Ok(SessionPorts {
        channel,
        endpoints: Arc::new(WebRtcEndpointFactory::new(config.video.ice_servers.clone())),
        signaling: Arc::new(HttpSignaling::from_config(http.clone(), config)),
        video_sink: Arc::new(video_sink),
        audio_api: Arc::new(HttpAudioApi::new(http.clone())),
        capture: capture_device(),
        recorder: Arc::new(WavChunkRecorder::new()),
        telemetry: Arc::new(HttpTelemetry::new(http)),
    })
}

/// 표준 입력 명령 루프 (quit, EOF, 종료 신호 중 먼저 오는 것까지)
async fn operator_loop(session: &Arc<TeleopSession>, lifecycle: &LifecycleManager) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut shutdown = lifecycle.subscribe();
    println!("{}", operator::HELP);

    loop {
        let line = tokio::select! {
            _ = shutdown_requested(&mut shutdown) => break,
            line = lines.next_line() => line,
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => {
                info!("표준 입력 종료");
                break;
            }
            Err(e) => {
                error!("표준 입력 읽기 실패: {}", e);
                break;
            }
        };

        let command = match Command::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                println!("{e}");
                continue;
            }
        };
        match operator::execute(session, command).await {
            Ok(Outcome::Quit) => break,
            Ok(Outcome::Continue) => {}
            Err(e) => println!("실패: {e}"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_filter = [
        "roverlink",
        "roverlink_app",
        "roverlink_core",
        "roverlink_session",
        "roverlink_network",
        "roverlink_media",
    ]
    .iter()
    .map(|target| format!("{target}={}", args.log_level))
    .collect::<Vec<_>>()
    .join(",");
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_filter)),
        )
        .init();

    let config = load_config(&args)?;
    info!("Roverlink 시작, 차량 서버 {}", config.server.base_url);

    let channel = SocketIoChannel::start(&config).context("제어 채널 시작 실패")?;
    if let Err(e) = channel.wait_connected(INITIAL_CONNECT_WAIT).await {
        warn!("{}, 백그라운드에서 계속 재연결합니다", e);
    }

    let ports = build_ports(&config, channel.clone())?;
    let session = TeleopSession::new(config, ports);
    session.start(StartOptions {
        video: !args.no_video,
        telemetry: !args.no_telemetry,
    });

    let lifecycle = Arc::new(LifecycleManager::new());
    let renderer = tokio::spawn(console::run(
        session.subscribe(),
        lifecycle.subscribe(),
        !args.no_telemetry,
    ));
    let signals = {
        let lifecycle = lifecycle.clone();
        tokio::spawn(async move {
            if let Err(e) = lifecycle.wait_for_signal().await {
                error!("시그널 핸들러 등록 실패: {}", e);
            }
        })
    };

    operator_loop(&session, &lifecycle).await;

    // 최종 정지 명령이 나간 뒤 채널을 닫는다
    lifecycle.shutdown();
    session.shutdown().await;
    channel.close().await;
    signals.abort();
    let _ = renderer.await;
    info!("Roverlink 종료");
    Ok(())
}
