//! 텔레옵 세션 컨텍스트.
//!
//! 제어 채널 연결 하나당 한 번 생성되어 모든 구성 요소를 소유한다.
//! 전역 상태 없이 `Arc`로 나눠 쓴다.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use roverlink_core::config::{AppConfig, UplinkMode};
use roverlink_core::models::message::InboundMessage;
use roverlink_core::ports::audio::{AudioApi, AudioCapture, ChunkRecorder};
use roverlink_core::ports::control_channel::ControlChannel;
use roverlink_core::ports::media::{MediaEndpointFactory, SignalingClient, VideoSink};
use roverlink_core::ports::telemetry::TelemetrySource;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::audio::AudioSessionManager;
use crate::event_bus::{EventBus, SessionEvent};
use crate::indicator::ErrorIndicator;
use crate::media::MediaNegotiator;
use crate::telemetry::TelemetryPoller;
use crate::throttle::CommandThrottle;
use crate::uplink::{ChunkedUplink, PeerUplink, Uplink};

/// 세션이 사용하는 어댑터 묶음
#[derive(Clone)]
pub struct SessionPorts {
    pub channel: Arc<dyn ControlChannel>,
    pub endpoints: Arc<dyn MediaEndpointFactory>,
    pub signaling: Arc<dyn SignalingClient>,
    pub video_sink: Arc<dyn VideoSink>,
    pub audio_api: Arc<dyn AudioApi>,
    pub capture: Arc<dyn AudioCapture>,
    pub recorder: Arc<dyn ChunkRecorder>,
    pub telemetry: Arc<dyn TelemetrySource>,
}

/// 세션 시작 옵션 (CLI 플래그로 설정을 덮어쓸 때 사용)
#[derive(Debug, Clone, Copy)]
pub struct StartOptions {
    /// 영상 자동 시작
    pub video: bool,
    /// 텔레메트리 폴링
    pub telemetry: bool,
}

impl Default for StartOptions {
    fn default() -> Self {
        Self {
            video: true,
            telemetry: true,
        }
    }
}

/// 텔레옵 세션 컨텍스트
pub struct TeleopSession {
    config: AppConfig,
    bus: Arc<EventBus>,
    indicator: Arc<ErrorIndicator>,
    channel: Arc<dyn ControlChannel>,
    throttle: CommandThrottle,
    media: Arc<MediaNegotiator>,
    audio: Arc<AudioSessionManager>,
    telemetry: Arc<TelemetryPoller>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl TeleopSession {
    /// 세션 구성 (tokio 런타임 안에서 호출)
    pub fn new(config: AppConfig, ports: SessionPorts) -> Arc<Self> {
        let bus = Arc::new(EventBus::default());
        let indicator = Arc::new(ErrorIndicator::new(config.error_clear_after(), bus.clone()));

        let throttle = CommandThrottle::spawn(&config.throttle, ports.channel.clone());

        let media = MediaNegotiator::new(
            ports.endpoints.clone(),
            ports.signaling.clone(),
            ports.video_sink.clone(),
            bus.clone(),
            indicator.clone(),
        );

        let uplink: Arc<dyn Uplink> = match config.audio.uplink {
            UplinkMode::Peer => Arc::new(PeerUplink::new(
                ports.audio_api.clone(),
                ports.endpoints.clone(),
                ports.capture.clone(),
            )),
            UplinkMode::Chunked => Arc::new(ChunkedUplink::new(
                ports.channel.clone(),
                ports.capture.clone(),
                ports.recorder.clone(),
                Duration::from_millis(config.audio.chunk_interval_ms),
            )),
        };
        let audio = Arc::new(AudioSessionManager::new(
            ports.audio_api.clone(),
            uplink,
            bus.clone(),
            indicator.clone(),
        ));

        let telemetry = Arc::new(TelemetryPoller::new(
            ports.telemetry.clone(),
            bus.clone(),
            config.telemetry_interval(),
        ));

        Arc::new(Self {
            config,
            bus,
            indicator,
            channel: ports.channel,
            throttle,
            media,
            audio,
            telemetry,
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// 수신 메시지/연결 상태 중계, 영상 자동 시작, 텔레메트리 폴링 시작
    pub fn start(&self, options: StartOptions) {
        let mut tasks = self.tasks.lock();

        let mut inbound = self.channel.subscribe();
        let bus = self.bus.clone();
        let audio = self.audio.clone();
        tasks.push(tokio::spawn(async move {
            loop {
                match inbound.recv().await {
                    Ok(message) => {
                        if let InboundMessage::MicrophoneStatus(state) = &message {
                            // 오디오 명령이 진행 중이어도 중계는 막지 않는다
                            let audio = audio.clone();
                            let state = *state;
                            tokio::spawn(async move { audio.on_microphone_status(state).await });
                        }
                        bus.publish(SessionEvent::Inbound(message));
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        debug!("수신 메시지 {}건 누락", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }));

        let mut status = self.channel.watch_status();
        let bus = self.bus.clone();
        tasks.push(tokio::spawn(async move {
            let initial = *status.borrow_and_update();
            bus.publish(SessionEvent::ControlLink(initial));
            while status.changed().await.is_ok() {
                let current = *status.borrow_and_update();
                bus.publish(SessionEvent::ControlLink(current));
            }
        }));

        match (options.video, self.config.video.autostart_delay_ms) {
            (true, Some(delay)) => {
                info!("영상 자동 시작 예약 ({}ms 후)", delay);
                tasks.push(self.media.schedule_autostart(Duration::from_millis(delay)));
            }
            _ => info!("영상 자동 시작 안 함"),
        }

        if options.telemetry && self.config.telemetry.enabled {
            self.telemetry.start();
        }
    }

    /// 모든 구성 요소 정리: 최종 정지 명령 → 영상 종료 → 오디오 정지 → 폴링 중지
    pub async fn shutdown(&self) {
        info!("세션 종료 시작");
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        self.throttle.shutdown().await;
        self.media.stop().await;
        if let Err(e) = self.audio.stop_all().await {
            debug!("종료 중 오디오 정지 실패: {}", e);
        }
        self.telemetry.stop();
        info!("세션 종료 완료");
    }

    /// 이벤트 구독
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.bus.subscribe()
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn throttle(&self) -> &CommandThrottle {
        &self.throttle
    }

    pub fn media(&self) -> &Arc<MediaNegotiator> {
        &self.media
    }

    pub fn audio(&self) -> &Arc<AudioSessionManager> {
        &self.audio
    }

    pub fn telemetry(&self) -> &Arc<TelemetryPoller> {
        &self.telemetry
    }

    pub fn indicator(&self) -> &Arc<ErrorIndicator> {
        &self.indicator
    }

    /// 제어 채널 연결 여부
    pub fn is_control_connected(&self) -> bool {
        self.channel.is_connected()
    }
}
