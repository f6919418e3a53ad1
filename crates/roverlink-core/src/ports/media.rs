//! 미디어 엔드포인트 포트.
//!
//! 구현: `roverlink-media` crate (webrtc, UDP RTP 포워딩),
//! `roverlink-network` crate (HTTP 시그널링)

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::CoreError;
use crate::models::audio::AudioFrame;
use crate::models::media::{EndpointSpec, LinkState, SessionDescription, TrackKind};

/// 수신 트랙
#[async_trait]
pub trait InboundTrack: Send + Sync {
    /// 트랙 종류
    fn kind(&self) -> TrackKind;

    /// 트랙 식별자
    fn id(&self) -> String;

    /// 다음 RTP 패킷 (직렬화된 바이트). 트랙이 끝나면 `None`
    async fn next_packet(&self) -> Result<Option<Vec<u8>>, CoreError>;
}

/// 엔드포인트가 보내는 비동기 신호
pub enum EndpointEvent {
    /// 원격 트랙 도착
    TrackArrived(Arc<dyn InboundTrack>),
    /// 연결 상태 변경
    StateChanged(LinkState),
}

impl std::fmt::Debug for EndpointEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EndpointEvent::TrackArrived(track) => f
                .debug_struct("TrackArrived")
                .field("kind", &track.kind())
                .field("id", &track.id())
                .finish(),
            EndpointEvent::StateChanged(state) => {
                f.debug_tuple("StateChanged").field(state).finish()
            }
        }
    }
}

/// 미디어 엔드포인트 핸들 (피어 연결 하나)
#[async_trait]
pub trait MediaEndpoint: Send + Sync {
    /// 로컬 offer 생성 후 로컬 디스크립션으로 확정
    ///
    /// ICE 후보 수집이 끝난 최종 디스크립션을 반환한다.
    async fn create_offer(&self) -> Result<SessionDescription, CoreError>;

    /// 원격 디스크립션 적용
    async fn apply_remote(&self, description: SessionDescription) -> Result<(), CoreError>;

    /// 로컬 answer 생성 후 로컬 디스크립션으로 확정 (원격 offer 적용 이후)
    async fn create_answer(&self) -> Result<SessionDescription, CoreError>;

    /// 송신 오디오 트랙에 PCM 프레임 기록
    async fn push_audio(&self, frame: AudioFrame) -> Result<(), CoreError>;

    /// 연결 종료 (여러 번 호출해도 안전)
    async fn close(&self) -> Result<(), CoreError>;
}

/// 엔드포인트 생성기
#[async_trait]
pub trait MediaEndpointFactory: Send + Sync {
    /// 새 엔드포인트 생성
    ///
    /// 트랙 도착, 연결 상태 관찰자를 네트워크 교환 전에 등록하고
    /// `spec`에 따른 트랜시버를 추가한다. 신호는 `events`로 전달된다.
    async fn create(
        &self,
        spec: EndpointSpec,
        events: mpsc::UnboundedSender<EndpointEvent>,
    ) -> Result<Arc<dyn MediaEndpoint>, CoreError>;
}

/// 영상 출력 (단일 writer)
#[async_trait]
pub trait VideoSink: Send + Sync {
    /// 수신 트랙 연결. 기존 트랙은 대체된다
    async fn attach(&self, track: Arc<dyn InboundTrack>) -> Result<(), CoreError>;

    /// 연결된 트랙 해제
    async fn clear(&self);

    /// 트랙 연결 여부
    fn is_attached(&self) -> bool;
}

/// offer/answer 교환 시그널링
#[async_trait]
pub trait SignalingClient: Send + Sync {
    /// 로컬 offer를 보내고 원격 answer를 받는다
    async fn exchange(&self, offer: &SessionDescription) -> Result<SessionDescription, CoreError>;
}
