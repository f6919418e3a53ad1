//! webrtc-rs 기반 미디어 엔드포인트.
//!
//! 영상 수신(recvonly 트랜시버)과 마이크 송신(PCMU 로컬 트랙) 두 가지 구성을
//! 지원한다. 트랙 도착과 연결 상태 변화는 생성 시 등록한 콜백에서
//! `EndpointEvent`로 전달된다.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use roverlink_core::error::CoreError;
use roverlink_core::models::audio::AudioFrame;
use roverlink_core::models::media::{
    EndpointSpec, LinkState, SdpKind, SessionDescription, TrackDirection, TrackKind,
};
use roverlink_core::ports::media::{
    EndpointEvent, InboundTrack, MediaEndpoint, MediaEndpointFactory,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_PCMU};
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::media::Sample;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::RTCRtpTransceiverInit;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;
use webrtc::util::Marshal;

use crate::pcmu::{self, PCMU_RATE};

/// ICE 후보 수집 대기 한도
const GATHER_TIMEOUT: Duration = Duration::from_secs(10);

fn rtc_err(context: &str) -> impl Fn(webrtc::Error) -> CoreError + '_ {
    move |e| CoreError::Negotiation(format!("{context}: {e}"))
}

/// webrtc 연결 상태 → 엔드포인트 신호
fn link_state(state: RTCPeerConnectionState) -> Option<LinkState> {
    match state {
        RTCPeerConnectionState::New => Some(LinkState::New),
        RTCPeerConnectionState::Connecting => Some(LinkState::Connecting),
        RTCPeerConnectionState::Connected => Some(LinkState::Connected),
        RTCPeerConnectionState::Disconnected => Some(LinkState::Disconnected),
        RTCPeerConnectionState::Failed => Some(LinkState::Failed),
        RTCPeerConnectionState::Closed => Some(LinkState::Closed),
        RTCPeerConnectionState::Unspecified => None,
    }
}

/// 엔드포인트 생성기: `MediaEndpointFactory` 구현
pub struct WebRtcEndpointFactory {
    ice_servers: Vec<String>,
}

impl WebRtcEndpointFactory {
    /// ICE 서버 URL 목록으로 생성 (비어 있으면 host 후보만 사용)
    pub fn new(ice_servers: Vec<String>) -> Self {
        Self { ice_servers }
    }

    async fn peer_connection(&self) -> Result<Arc<RTCPeerConnection>, CoreError> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(rtc_err("코덱 등록 실패"))?;
        let registry = register_default_interceptors(Registry::new(), &mut media_engine)
            .map_err(rtc_err("인터셉터 등록 실패"))?;
        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let ice_servers = if self.ice_servers.is_empty() {
            Vec::new()
        } else {
            vec![RTCIceServer {
                urls: self.ice_servers.clone(),
                ..Default::default()
            }]
        };
        let config = RTCConfiguration {
            ice_servers,
            ..Default::default()
        };
        let pc = api
            .new_peer_connection(config)
            .await
            .map_err(rtc_err("피어 연결 생성 실패"))?;
        Ok(Arc::new(pc))
    }
}

#[async_trait]
impl MediaEndpointFactory for WebRtcEndpointFactory {
    async fn create(
        &self,
        spec: EndpointSpec,
        events: mpsc::UnboundedSender<EndpointEvent>,
    ) -> Result<Arc<dyn MediaEndpoint>, CoreError> {
        let pc = self.peer_connection().await?;

        // 관찰자는 교환 전에 등록
        let state_tx = events.clone();
        pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            debug!("피어 연결 상태: {}", state);
            if let Some(link) = link_state(state) {
                let _ = state_tx.send(EndpointEvent::StateChanged(link));
            }
            Box::pin(async {})
        }));
        let track_tx = events;
        pc.on_track(Box::new(move |track, _receiver, _transceiver| {
            let inbound = RemoteTrack::new(track);
            info!("원격 트랙 도착: {:?} ({})", inbound.kind(), inbound.id());
            let _ = track_tx.send(EndpointEvent::TrackArrived(Arc::new(inbound)));
            Box::pin(async {})
        }));

        let endpoint = WebRtcEndpoint {
            pc,
            audio_track: None,
            closed: AtomicBool::new(false),
        };
        let endpoint = match endpoint.configure(spec).await {
            Ok(endpoint) => endpoint,
            Err((endpoint, e)) => {
                let _ = endpoint.close().await;
                return Err(e);
            }
        };
        Ok(Arc::new(endpoint))
    }
}

/// 피어 연결 하나
pub struct WebRtcEndpoint {
    pc: Arc<RTCPeerConnection>,
    audio_track: Option<Arc<TrackLocalStaticSample>>,
    closed: AtomicBool,
}

impl WebRtcEndpoint {
    /// 구성에 맞는 트랜시버/트랙 추가. 실패하면 정리할 수 있도록 자신을 돌려준다
    async fn configure(mut self, spec: EndpointSpec) -> Result<Self, (Self, CoreError)> {
        if let Some(direction) = spec.video {
            if let Err(e) = self.add_media(RTPCodecType::Video, direction).await {
                return Err((self, e));
            }
        }
        if let Some(direction) = spec.audio {
            if let Err(e) = self.add_media(RTPCodecType::Audio, direction).await {
                return Err((self, e));
            }
        }
        Ok(self)
    }

    async fn add_media(
        &mut self,
        kind: RTPCodecType,
        direction: TrackDirection,
    ) -> Result<(), CoreError> {
        match (kind, direction) {
            (_, TrackDirection::RecvOnly) => {
                self.pc
                    .add_transceiver_from_kind(
                        kind,
                        Some(RTCRtpTransceiverInit {
                            direction: RTCRtpTransceiverDirection::Recvonly,
                            send_encodings: vec![],
                        }),
                    )
                    .await
                    .map_err(rtc_err("수신 트랜시버 추가 실패"))?;
                debug!("{} 수신 트랜시버 추가", kind);
                Ok(())
            }
            (RTPCodecType::Audio, TrackDirection::SendOnly) => {
                let track = Arc::new(TrackLocalStaticSample::new(
                    RTCRtpCodecCapability {
                        mime_type: MIME_TYPE_PCMU.to_owned(),
                        clock_rate: PCMU_RATE,
                        channels: 1,
                        ..Default::default()
                    },
                    "microphone".to_owned(),
                    format!("roverlink-{}", uuid::Uuid::new_v4()),
                ));
                let sender = self
                    .pc
                    .add_track(Arc::clone(&track) as Arc<dyn TrackLocal + Send + Sync>)
                    .await
                    .map_err(rtc_err("오디오 트랙 추가 실패"))?;

                // RTCP를 읽어 줘야 인터셉터가 동작한다
                tokio::spawn(async move {
                    let mut rtcp_buf = vec![0u8; 1500];
                    while sender.read(&mut rtcp_buf).await.is_ok() {}
                });
                self.audio_track = Some(track);
                debug!("PCMU 송신 트랙 추가");
                Ok(())
            }
            (_, TrackDirection::SendOnly) => Err(CoreError::Internal(format!(
                "지원하지 않는 송신 트랙: {kind}"
            ))),
        }
    }

    /// ICE 수집 완료까지 기다린 뒤 최종 로컬 SDP 반환
    async fn finalize_local(&self, description: RTCSessionDescription) -> Result<String, CoreError> {
        let mut gathered = self.pc.gathering_complete_promise().await;
        self.pc
            .set_local_description(description)
            .await
            .map_err(rtc_err("로컬 디스크립션 설정 실패"))?;
        if tokio::time::timeout(GATHER_TIMEOUT, gathered.recv())
            .await
            .is_err()
        {
            warn!("ICE 후보 수집 시간 초과 ({:?}), 현재 후보로 진행", GATHER_TIMEOUT);
        }

        self.pc
            .local_description()
            .await
            .map(|local| local.sdp)
            .ok_or_else(|| CoreError::Negotiation("로컬 디스크립션 없음".to_string()))
    }
}

#[async_trait]
impl MediaEndpoint for WebRtcEndpoint {
    async fn create_offer(&self) -> Result<SessionDescription, CoreError> {
        let offer = self
            .pc
            .create_offer(None)
            .await
            .map_err(rtc_err("offer 생성 실패"))?;
        let local = self.finalize_local(offer).await?;
        Ok(SessionDescription::offer(local))
    }

    async fn apply_remote(&self, description: SessionDescription) -> Result<(), CoreError> {
        let remote = match description.kind {
            SdpKind::Offer => RTCSessionDescription::offer(description.sdp),
            SdpKind::Answer => RTCSessionDescription::answer(description.sdp),
        }
        .map_err(rtc_err("원격 SDP 해석 실패"))?;
        self.pc
            .set_remote_description(remote)
            .await
            .map_err(rtc_err("원격 디스크립션 적용 실패"))
    }

    async fn create_answer(&self) -> Result<SessionDescription, CoreError> {
        let answer = self
            .pc
            .create_answer(None)
            .await
            .map_err(rtc_err("answer 생성 실패"))?;
        let local = self.finalize_local(answer).await?;
        Ok(SessionDescription::answer(local))
    }

    async fn push_audio(&self, frame: AudioFrame) -> Result<(), CoreError> {
        let Some(track) = &self.audio_track else {
            return Err(CoreError::Internal(
                "송신 오디오 트랙이 없는 엔드포인트".to_string(),
            ));
        };
        if self.closed.load(Ordering::Acquire) {
            return Err(CoreError::Network("엔드포인트 종료됨".to_string()));
        }
        let duration = Duration::from_millis(frame.duration_ms());
        let payload = pcmu::encode_frame(&frame.samples, frame.sample_rate);
        track
            .write_sample(&Sample {
                data: Bytes::from(payload),
                duration,
                ..Default::default()
            })
            .await
            .map_err(|e| CoreError::Network(format!("오디오 샘플 송신 실패: {e}")))
    }

    async fn close(&self) -> Result<(), CoreError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        debug!("피어 연결 종료");
        self.pc
            .close()
            .await
            .map_err(|e| CoreError::Internal(format!("피어 연결 종료 실패: {e}")))
    }
}

/// 원격 트랙 → `InboundTrack`
struct RemoteTrack {
    track: Arc<TrackRemote>,
}

impl RemoteTrack {
    fn new(track: Arc<TrackRemote>) -> Self {
        Self { track }
    }
}

#[async_trait]
impl InboundTrack for RemoteTrack {
    fn kind(&self) -> TrackKind {
        match self.track.kind() {
            RTPCodecType::Audio => TrackKind::Audio,
            _ => TrackKind::Video,
        }
    }

    fn id(&self) -> String {
        self.track.id()
    }

    async fn next_packet(&self) -> Result<Option<Vec<u8>>, CoreError> {
        let (packet, _) = match self.track.read_rtp().await {
            Ok(read) => read,
            Err(e) => {
                // 연결 종료 시 읽기가 에러로 끝난다
                debug!("트랙 {} 읽기 종료: {}", self.track.id(), e);
                return Ok(None);
            }
        };
        let bytes = packet
            .marshal()
            .map_err(|e| CoreError::Internal(format!("RTP 직렬화 실패: {e}")))?;
        Ok(Some(bytes.to_vec()))
    }
}
