//! 통합 테스트용 포트 가짜 구현.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use roverlink_core::error::CoreError;
use roverlink_core::models::audio::{
    AudioFrame, AudioReply, AudioStatus, MicrophoneOffer, ReplyStatus,
};
use roverlink_core::models::control::ControlVector;
use roverlink_core::models::media::{
    EndpointSpec, LinkState, SdpKind, SessionDescription, TrackKind,
};
use roverlink_core::models::message::{ChannelMessage, ConnectionStatus, InboundMessage};
use roverlink_core::models::telemetry::{MemoryUsage, TelemetrySample};
use roverlink_core::ports::audio::{AudioApi, AudioCapture, CaptureStream, ChunkRecorder};
use roverlink_core::ports::control_channel::ControlChannel;
use roverlink_core::ports::media::{
    EndpointEvent, InboundTrack, MediaEndpoint, MediaEndpointFactory, SignalingClient, VideoSink,
};
use roverlink_core::ports::telemetry::TelemetrySource;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::Instant;

pub const ANSWER_SDP: &str = "v=0\r\no=- 1 1 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n";
pub const OFFER_SDP: &str = "v=0\r\no=- 2 2 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n";

// ============================================================
// 제어 채널
// ============================================================

/// 송신 기록 채널
pub struct RecordingChannel {
    pub sent: Mutex<Vec<(Instant, ChannelMessage)>>,
    pub fail_next: AtomicUsize,
    inbound_tx: broadcast::Sender<InboundMessage>,
    status_tx: watch::Sender<ConnectionStatus>,
}

impl RecordingChannel {
    pub fn new() -> Arc<Self> {
        let (inbound_tx, _) = broadcast::channel(16);
        let (status_tx, _) = watch::channel(ConnectionStatus::Connected);
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            fail_next: AtomicUsize::new(0),
            inbound_tx,
            status_tx,
        })
    }

    /// 송신된 조종 벡터 (시각 포함)
    pub fn controls(&self) -> Vec<(Instant, ControlVector)> {
        self.sent
            .lock()
            .iter()
            .filter_map(|(at, m)| match m {
                ChannelMessage::Control(v) => Some((*at, *v)),
                _ => None,
            })
            .collect()
    }

    pub fn vectors(&self) -> Vec<ControlVector> {
        self.controls().into_iter().map(|(_, v)| v).collect()
    }

    pub fn events(&self) -> Vec<&'static str> {
        self.sent.lock().iter().map(|(_, m)| m.event()).collect()
    }

    pub fn messages(&self) -> Vec<ChannelMessage> {
        self.sent.lock().iter().map(|(_, m)| m.clone()).collect()
    }

    pub fn push_inbound(&self, message: InboundMessage) {
        let _ = self.inbound_tx.send(message);
    }

    pub fn set_status(&self, status: ConnectionStatus) {
        let _ = self.status_tx.send(status);
    }
}

#[async_trait]
impl ControlChannel for RecordingChannel {
    async fn send(&self, message: ChannelMessage) -> Result<(), CoreError> {
        let pending = self.fail_next.load(Ordering::SeqCst);
        if pending > 0 {
            self.fail_next.store(pending - 1, Ordering::SeqCst);
            return Err(CoreError::Network("제어 채널 연결 끊김".into()));
        }
        self.sent.lock().push((Instant::now(), message));
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<InboundMessage> {
        self.inbound_tx.subscribe()
    }

    fn is_connected(&self) -> bool {
        *self.status_tx.borrow() == ConnectionStatus::Connected
    }

    fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_tx.subscribe()
    }
}

// ============================================================
// 미디어 엔드포인트
// ============================================================

pub struct FakeTrack {
    pub kind: TrackKind,
}

#[async_trait]
impl InboundTrack for FakeTrack {
    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn id(&self) -> String {
        format!("{:?}-track", self.kind).to_lowercase()
    }

    async fn next_packet(&self) -> Result<Option<Vec<u8>>, CoreError> {
        Ok(None)
    }
}

/// 엔드포인트 동작 스크립트
#[derive(Clone, Copy)]
pub struct EndpointScript {
    /// 원격 디스크립션 적용 시 영상 트랙 + Connected 신호 발생
    pub connect_on_remote: bool,
    pub fail_offer: bool,
    pub fail_remote: bool,
}

impl Default for EndpointScript {
    fn default() -> Self {
        Self {
            connect_on_remote: true,
            fail_offer: false,
            fail_remote: false,
        }
    }
}

pub struct ScriptedEndpoint {
    pub spec: EndpointSpec,
    script: EndpointScript,
    events: mpsc::UnboundedSender<EndpointEvent>,
    pub closed: AtomicBool,
    pub pushed_frames: AtomicUsize,
    pub remote: Mutex<Option<SessionDescription>>,
}

impl ScriptedEndpoint {
    /// 외부에서 연결 상태 신호 주입
    pub fn emit(&self, state: LinkState) {
        let _ = self.events.send(EndpointEvent::StateChanged(state));
    }
}

#[async_trait]
impl MediaEndpoint for ScriptedEndpoint {
    async fn create_offer(&self) -> Result<SessionDescription, CoreError> {
        if self.script.fail_offer {
            return Err(CoreError::Negotiation("offer 생성 실패".into()));
        }
        Ok(SessionDescription::offer(OFFER_SDP))
    }

    async fn apply_remote(&self, description: SessionDescription) -> Result<(), CoreError> {
        if self.script.fail_remote {
            return Err(CoreError::Negotiation("원격 디스크립션 거부".into()));
        }
        *self.remote.lock() = Some(description);
        if self.script.connect_on_remote {
            if self.spec.video.is_some() {
                let _ = self.events.send(EndpointEvent::TrackArrived(Arc::new(FakeTrack {
                    kind: TrackKind::Video,
                })));
            }
            let _ = self
                .events
                .send(EndpointEvent::StateChanged(LinkState::Connecting));
            let _ = self
                .events
                .send(EndpointEvent::StateChanged(LinkState::Connected));
        }
        Ok(())
    }

    async fn create_answer(&self) -> Result<SessionDescription, CoreError> {
        Ok(SessionDescription::answer(ANSWER_SDP))
    }

    async fn push_audio(&self, _frame: AudioFrame) -> Result<(), CoreError> {
        self.pushed_frames.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<(), CoreError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

pub struct ScriptedFactory {
    pub script: Mutex<EndpointScript>,
    pub created: Mutex<Vec<Arc<ScriptedEndpoint>>>,
    pub fail_create: AtomicBool,
}

impl ScriptedFactory {
    pub fn new(script: EndpointScript) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script),
            created: Mutex::new(Vec::new()),
            fail_create: AtomicBool::new(false),
        })
    }

    pub fn last(&self) -> Arc<ScriptedEndpoint> {
        self.created
            .lock()
            .last()
            .cloned()
            .expect("생성된 엔드포인트 없음")
    }

    pub fn count(&self) -> usize {
        self.created.lock().len()
    }
}

#[async_trait]
impl MediaEndpointFactory for ScriptedFactory {
    async fn create(
        &self,
        spec: EndpointSpec,
        events: mpsc::UnboundedSender<EndpointEvent>,
    ) -> Result<Arc<dyn MediaEndpoint>, CoreError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(CoreError::Internal("엔드포인트 생성 실패".into()));
        }
        let endpoint = Arc::new(ScriptedEndpoint {
            spec,
            script: *self.script.lock(),
            events,
            closed: AtomicBool::new(false),
            pushed_frames: AtomicUsize::new(0),
            remote: Mutex::new(None),
        });
        self.created.lock().push(endpoint.clone());
        Ok(endpoint)
    }
}

/// 시그널링 응답 스크립트
pub enum SignalingReply {
    Answer(String),
    Error(CoreError),
}

pub struct ScriptedSignaling {
    /// 다음 응답 (None이면 정상 answer)
    pub reply: Mutex<Option<SignalingReply>>,
    /// `gated`가 켜져 있으면 `gate.notify_one()` 전까지 응답 보류
    pub gate: tokio::sync::Notify,
    pub gated: AtomicBool,
    pub offers: Mutex<Vec<SessionDescription>>,
}

impl ScriptedSignaling {
    pub fn answering() -> Arc<Self> {
        Arc::new(Self {
            reply: Mutex::new(None),
            gate: tokio::sync::Notify::new(),
            gated: AtomicBool::new(false),
            offers: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(error: CoreError) -> Arc<Self> {
        let signaling = Self::answering();
        *signaling.reply.lock() = Some(SignalingReply::Error(error));
        signaling
    }

    pub fn returning(sdp: &str) -> Arc<Self> {
        let signaling = Self::answering();
        *signaling.reply.lock() = Some(SignalingReply::Answer(sdp.to_string()));
        signaling
    }
}

#[async_trait]
impl SignalingClient for ScriptedSignaling {
    async fn exchange(&self, offer: &SessionDescription) -> Result<SessionDescription, CoreError> {
        self.offers.lock().push(offer.clone());
        if self.gated.load(Ordering::SeqCst) {
            self.gate.notified().await;
        }
        match self.reply.lock().take() {
            Some(SignalingReply::Answer(sdp)) => Ok(SessionDescription::answer(sdp)),
            Some(SignalingReply::Error(e)) => Err(e),
            None => Ok(SessionDescription::answer(ANSWER_SDP)),
        }
    }
}

/// 영상 싱크 기록
#[derive(Default)]
pub struct RecordingSink {
    pub attached: AtomicBool,
    pub attach_count: AtomicUsize,
    pub clear_count: AtomicUsize,
}

#[async_trait]
impl VideoSink for RecordingSink {
    async fn attach(&self, _track: Arc<dyn InboundTrack>) -> Result<(), CoreError> {
        self.attached.store(true, Ordering::SeqCst);
        self.attach_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn clear(&self) {
        self.attached.store(false, Ordering::SeqCst);
        self.clear_count.fetch_add(1, Ordering::SeqCst);
    }

    fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }
}

// ============================================================
// 오디오
// ============================================================

/// 호출 기록 오디오 API
#[derive(Default)]
pub struct ScriptedAudioApi {
    pub calls: Mutex<Vec<String>>,
    /// 실패시킬 호출 이름 (예: "play", "microphone_offer")
    pub failing: Mutex<HashSet<&'static str>>,
}

impl ScriptedAudioApi {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn fail(&self, call: &'static str) {
        self.failing.lock().insert(call);
    }

    fn record(&self, call: &'static str, detail: Option<&str>) -> Result<AudioReply, CoreError> {
        match detail {
            Some(detail) => self.calls.lock().push(format!("{call}:{detail}")),
            None => self.calls.lock().push(call.to_string()),
        }
        if self.failing.lock().contains(call) {
            return Err(CoreError::Rejected(format!("{call}: Sound not found")));
        }
        Ok(AudioReply {
            status: ReplyStatus::Success,
            message: None,
        })
    }
}

#[async_trait]
impl AudioApi for ScriptedAudioApi {
    async fn play(&self, sound_id: &str) -> Result<AudioReply, CoreError> {
        self.record("play", Some(sound_id))
    }

    async fn stop(&self) -> Result<AudioReply, CoreError> {
        self.record("stop", None)
    }

    async fn speak(&self, text: &str) -> Result<AudioReply, CoreError> {
        self.record("speak", Some(text))
    }

    async fn microphone_offer(&self) -> Result<MicrophoneOffer, CoreError> {
        self.record("microphone_offer", None)?;
        Ok(MicrophoneOffer {
            connection_id: "conn-1".to_string(),
            sdp: OFFER_SDP.to_string(),
            kind: SdpKind::Offer,
        })
    }

    async fn microphone_answer(
        &self,
        connection_id: &str,
        _answer: &SessionDescription,
    ) -> Result<AudioReply, CoreError> {
        self.record("microphone_answer", Some(connection_id))
    }

    async fn microphone_stop(&self) -> Result<AudioReply, CoreError> {
        self.record("microphone_stop", None)
    }

    async fn status(&self) -> Result<AudioStatus, CoreError> {
        self.record("status", None)?;
        Ok(AudioStatus::default())
    }
}

/// 가짜 캡처 장치
pub struct FakeCapture {
    pub deny: AtomicBool,
    pub opened: AtomicUsize,
    pub released: Arc<AtomicUsize>,
    /// 열릴 때 미리 채워 둘 프레임 수
    pub frames: usize,
    /// 미리 채운 프레임 뒤에 스트림을 끝낼지 (장치 분리 흉내)
    pub end_stream: bool,
}

impl FakeCapture {
    pub fn new(frames: usize) -> Arc<Self> {
        Arc::new(Self {
            deny: AtomicBool::new(false),
            opened: AtomicUsize::new(0),
            released: Arc::new(AtomicUsize::new(0)),
            frames,
            end_stream: false,
        })
    }

    /// `frames`개를 내보낸 뒤 끝나는 스트림
    pub fn ending(frames: usize) -> Arc<Self> {
        Arc::new(Self {
            deny: AtomicBool::new(false),
            opened: AtomicUsize::new(0),
            released: Arc::new(AtomicUsize::new(0)),
            frames,
            end_stream: true,
        })
    }

    pub fn denied() -> Arc<Self> {
        let capture = Self::new(0);
        capture.deny.store(true, Ordering::SeqCst);
        capture
    }
}

#[async_trait]
impl AudioCapture for FakeCapture {
    async fn open(&self) -> Result<CaptureStream, CoreError> {
        if self.deny.load(Ordering::SeqCst) {
            return Err(CoreError::PermissionDenied("마이크 접근 거부".into()));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(self.frames.max(1));
        for _ in 0..self.frames {
            let _ = tx.try_send(AudioFrame {
                samples: vec![0; 480],
                sample_rate: 48_000,
            });
        }
        let released = self.released.clone();
        // 송신측을 해제 콜백에 묶어 두면 해제 전까지 스트림이 열려 있다
        let keep = (!self.end_stream).then_some(tx);
        Ok(CaptureStream::new(48_000, rx, move || {
            drop(keep);
            released.fetch_add(1, Ordering::SeqCst);
        }))
    }
}

/// 지원 형식을 지정할 수 있는 인코더
pub struct FakeRecorder {
    pub supported: Vec<&'static str>,
    pub encoded: AtomicUsize,
}

impl FakeRecorder {
    pub fn supporting(supported: &[&'static str]) -> Arc<Self> {
        Arc::new(Self {
            supported: supported.to_vec(),
            encoded: AtomicUsize::new(0),
        })
    }
}

impl ChunkRecorder for FakeRecorder {
    fn supports(&self, mime: &str) -> bool {
        self.supported.contains(&mime)
    }

    fn encode_chunk(&self, _mime: &str, frames: &[AudioFrame]) -> Result<Vec<u8>, CoreError> {
        self.encoded.fetch_add(1, Ordering::SeqCst);
        Ok(vec![0xAB; frames.len() * 4])
    }
}

// ============================================================
// 텔레메트리
// ============================================================

/// 호출 횟수를 CPU 값으로 돌려주는 소스. `fail_every`번째마다 실패
pub struct CountingTelemetry {
    pub calls: AtomicUsize,
    pub fail_every: usize,
}

impl CountingTelemetry {
    pub fn new(fail_every: usize) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail_every,
        })
    }
}

#[async_trait]
impl TelemetrySource for CountingTelemetry {
    async fn fetch(&self) -> Result<TelemetrySample, CoreError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_every > 0 && n % self.fail_every == 0 {
            return Err(CoreError::Network("시스템 상태 조회 시간 초과".into()));
        }
        Ok(TelemetrySample {
            cpu: n as f64,
            memory: MemoryUsage {
                percent: 10.0,
                used: 1024,
                total: 10240,
            },
            swap: MemoryUsage::default(),
            temperature: Some(45.0),
            received_at: chrono::Utc::now(),
        })
    }
}
