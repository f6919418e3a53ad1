//! 마이크 업링크 전송.
//!
//! 배포마다 하나의 방식만 쓴다 (`audio.uplink` 설정).
//! - [`PeerUplink`]: 차량이 만든 offer에 송신 전용 오디오 엔드포인트로 answer
//! - [`ChunkedUplink`]: 일정 길이 청크를 인코딩해 제어 채널로 업로드

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use parking_lot::Mutex;
use roverlink_core::error::CoreError;
use roverlink_core::models::audio::{AudioFrame, CHUNK_FORMAT_PREFERENCE};
use roverlink_core::models::media::{EndpointSpec, LinkState};
use roverlink_core::models::message::ChannelMessage;
use roverlink_core::ports::audio::{AudioApi, AudioCapture, CaptureStream, ChunkRecorder};
use roverlink_core::ports::control_channel::ControlChannel;
use roverlink_core::ports::media::{EndpointEvent, MediaEndpoint, MediaEndpointFactory};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// 업링크 생성기
#[async_trait]
pub trait Uplink: Send + Sync {
    /// 전송 방식 이름 (로그용)
    fn name(&self) -> &'static str;

    /// 캡처 획득 후 업링크 수립.
    ///
    /// 수립 이후 업링크가 스스로 끝나면 (캡처 종료, 피어 연결 실패) `ended`로 알린다.
    async fn open(&self, ended: UplinkEnded) -> Result<Box<dyn UplinkHandle>, CoreError>;
}

/// 업링크가 스스로 끝났음을 한 번만 알리는 신호.
///
/// 모든 사본이 통지 없이 drop되면 수신측은 에러를 받는다 (정상 해제).
#[derive(Clone)]
pub struct UplinkEnded(Arc<Mutex<Option<oneshot::Sender<String>>>>);

impl UplinkEnded {
    pub fn channel() -> (Self, oneshot::Receiver<String>) {
        let (tx, rx) = oneshot::channel();
        (Self(Arc::new(Mutex::new(Some(tx)))), rx)
    }

    /// 종료 사유 통지 (두 번째 이후 호출은 무시)
    pub fn notify(&self, reason: impl Into<String>) {
        if let Some(tx) = self.0.lock().take() {
            let _ = tx.send(reason.into());
        }
    }
}

/// 수립된 업링크
#[async_trait]
pub trait UplinkHandle: Send {
    /// 캡처 해제, 업링크 해제, 원격 통지
    async fn close(self: Box<Self>) -> Result<(), CoreError>;
}

// ============================================================
// 피어 스트림 업링크
// ============================================================

/// 협상된 피어 스트림 업링크
pub struct PeerUplink {
    api: Arc<dyn AudioApi>,
    factory: Arc<dyn MediaEndpointFactory>,
    capture: Arc<dyn AudioCapture>,
}

impl PeerUplink {
    pub fn new(
        api: Arc<dyn AudioApi>,
        factory: Arc<dyn MediaEndpointFactory>,
        capture: Arc<dyn AudioCapture>,
    ) -> Self {
        Self {
            api,
            factory,
            capture,
        }
    }

    async fn negotiate(
        &self,
        endpoint: &Arc<dyn MediaEndpoint>,
    ) -> Result<(), CoreError> {
        let offer = self.api.microphone_offer().await?;
        let description = offer.description();
        description.validate()?;
        debug!(
            "마이크 offer 수신 (connection_id={}, {}바이트)",
            offer.connection_id,
            offer.sdp.len()
        );

        endpoint.apply_remote(description).await?;
        let answer = endpoint.create_answer().await?;
        self.api
            .microphone_answer(&offer.connection_id, &answer)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Uplink for PeerUplink {
    fn name(&self) -> &'static str {
        "peer"
    }

    async fn open(&self, ended: UplinkEnded) -> Result<Box<dyn UplinkHandle>, CoreError> {
        let capture = self.capture.open().await?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let endpoint = self
            .factory
            .create(EndpointSpec::MIC_SENDER, events_tx)
            .await?;

        if let Err(e) = self.negotiate(&endpoint).await {
            let _ = endpoint.close().await;
            return Err(e);
        }
        info!("마이크 피어 스트림 수립");

        let forward = tokio::spawn(forward_frames(capture, endpoint.clone(), ended.clone()));
        let watch = tokio::spawn(watch_link(events_rx, ended));

        Ok(Box::new(PeerUplinkHandle {
            api: self.api.clone(),
            endpoint,
            forward,
            watch,
        }))
    }
}

async fn forward_frames(
    mut capture: CaptureStream,
    endpoint: Arc<dyn MediaEndpoint>,
    ended: UplinkEnded,
) {
    let mut failures = 0u32;
    while let Some(frame) = capture.next_frame().await {
        if let Err(e) = endpoint.push_audio(frame).await {
            failures += 1;
            if failures == 1 || failures % 100 == 0 {
                warn!("마이크 프레임 전송 실패 ({}회): {}", failures, e);
            }
        }
    }
    debug!("캡처 스트림 종료");
    ended.notify("캡처 스트림 종료");
}

async fn watch_link(mut events: mpsc::UnboundedReceiver<EndpointEvent>, ended: UplinkEnded) {
    while let Some(event) = events.recv().await {
        match event {
            EndpointEvent::StateChanged(LinkState::Connected) => info!("마이크 업링크 연결됨"),
            EndpointEvent::StateChanged(state) if state.is_terminal() => {
                warn!("마이크 업링크 연결 종료: {:?}", state);
                ended.notify(format!("피어 연결 {state:?}"));
                return;
            }
            other => debug!("마이크 엔드포인트 신호: {:?}", other),
        }
    }
}

struct PeerUplinkHandle {
    api: Arc<dyn AudioApi>,
    endpoint: Arc<dyn MediaEndpoint>,
    forward: JoinHandle<()>,
    watch: JoinHandle<()>,
}

#[async_trait]
impl UplinkHandle for PeerUplinkHandle {
    async fn close(self: Box<Self>) -> Result<(), CoreError> {
        // 전달 태스크가 캡처 스트림을 소유하므로 중단 시 장치도 해제된다
        self.forward.abort();
        let _ = self.forward.await;
        self.watch.abort();
        if let Err(e) = self.endpoint.close().await {
            warn!("마이크 엔드포인트 종료 실패: {}", e);
        }
        self.api.microphone_stop().await?;
        info!("마이크 피어 스트림 종료");
        Ok(())
    }
}

// ============================================================
// 청크 업로드 업링크
// ============================================================

/// 청크 업로드 업링크
pub struct ChunkedUplink {
    channel: Arc<dyn ControlChannel>,
    capture: Arc<dyn AudioCapture>,
    recorder: Arc<dyn ChunkRecorder>,
    chunk_interval: Duration,
}

impl ChunkedUplink {
    pub fn new(
        channel: Arc<dyn ControlChannel>,
        capture: Arc<dyn AudioCapture>,
        recorder: Arc<dyn ChunkRecorder>,
        chunk_interval: Duration,
    ) -> Self {
        Self {
            channel,
            capture,
            recorder,
            chunk_interval,
        }
    }

    /// 선호 순서대로 첫 번째 지원 형식
    pub fn select_format(recorder: &dyn ChunkRecorder) -> Option<&'static str> {
        CHUNK_FORMAT_PREFERENCE
            .iter()
            .copied()
            .find(|mime| recorder.supports(mime))
    }
}

#[async_trait]
impl Uplink for ChunkedUplink {
    fn name(&self) -> &'static str {
        "chunked"
    }

    async fn open(&self, ended: UplinkEnded) -> Result<Box<dyn UplinkHandle>, CoreError> {
        let mime = Self::select_format(self.recorder.as_ref()).ok_or_else(|| {
            CoreError::Negotiation(format!(
                "지원되는 청크 인코딩 없음 (후보: {})",
                CHUNK_FORMAT_PREFERENCE.join(", ")
            ))
        })?;

        let capture = self.capture.open().await?;
        self.channel.send(ChannelMessage::StartMicrophone).await?;
        info!(
            "마이크 청크 업로드 시작 (형식 {}, 청크 {}ms)",
            mime,
            self.chunk_interval.as_millis()
        );

        let (stop_tx, stop_rx) = oneshot::channel();
        let sender = ChunkSender {
            channel: self.channel.clone(),
            recorder: self.recorder.clone(),
            mime,
        };
        let task = tokio::spawn(upload_chunks(
            sender,
            capture,
            self.chunk_interval,
            stop_rx,
            ended,
        ));

        Ok(Box::new(ChunkedUplinkHandle {
            channel: self.channel.clone(),
            stop_tx,
            task,
        }))
    }
}

/// 청크 인코딩 + 전송
struct ChunkSender {
    channel: Arc<dyn ControlChannel>,
    recorder: Arc<dyn ChunkRecorder>,
    mime: &'static str,
}

impl ChunkSender {
    async fn flush(&self, buffer: &mut Vec<AudioFrame>) {
        if buffer.is_empty() {
            return;
        }
        let frames = std::mem::take(buffer);
        let chunk = match self.recorder.encode_chunk(self.mime, &frames) {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!("오디오 청크 인코딩 실패: {}", e);
                return;
            }
        };
        let size = chunk.len();
        let audio = base64::engine::general_purpose::STANDARD.encode(&chunk);
        if let Err(e) = self
            .channel
            .send(ChannelMessage::AudioData { audio, size })
            .await
        {
            warn!("오디오 청크 전송 실패 ({}바이트): {}", size, e);
        } else {
            debug!("오디오 청크 전송 ({}바이트)", size);
        }
    }
}

async fn upload_chunks(
    sender: ChunkSender,
    mut capture: CaptureStream,
    chunk_interval: Duration,
    mut stop_rx: oneshot::Receiver<()>,
    ended: UplinkEnded,
) {
    let mut ticker = tokio::time::interval(chunk_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // 첫 tick은 즉시 완료되므로 소비
    ticker.tick().await;

    let mut buffer: Vec<AudioFrame> = Vec::new();
    loop {
        tokio::select! {
            _ = &mut stop_rx => {
                sender.flush(&mut buffer).await;
                break;
            }
            frame = capture.next_frame() => match frame {
                Some(frame) => buffer.push(frame),
                None => {
                    sender.flush(&mut buffer).await;
                    debug!("캡처 스트림 종료");
                    ended.notify("캡처 스트림 종료");
                    break;
                }
            },
            _ = ticker.tick() => {
                sender.flush(&mut buffer).await;
            }
        }
    }
    capture.release();
}

struct ChunkedUplinkHandle {
    channel: Arc<dyn ControlChannel>,
    stop_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

#[async_trait]
impl UplinkHandle for ChunkedUplinkHandle {
    async fn close(self: Box<Self>) -> Result<(), CoreError> {
        let _ = self.stop_tx.send(());
        if let Err(e) = self.task.await {
            warn!("청크 업로드 태스크 비정상 종료: {}", e);
        }
        self.channel.send(ChannelMessage::StopMicrophone).await?;
        info!("마이크 청크 업로드 종료");
        Ok(())
    }
}
