//! 미디어 협상 모델.
//!
//! 세션 디스크립션(offer/answer), 엔드포인트 연결 상태, 영상 세션 상태.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// 세션 디스크립션 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

/// 세션 디스크립션: JSON으로는 `{"type": "...", "sdp": "..."}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    /// offer 생성
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    /// answer 생성
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }

    /// 최소 형식 검증: `v=0`으로 시작해야 한다
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.sdp.trim_start().starts_with("v=0") {
            Ok(())
        } else {
            Err(CoreError::Negotiation(format!(
                "잘못된 SDP ({:?}, {}바이트)",
                self.kind,
                self.sdp.len()
            )))
        }
    }
}

/// 미디어 엔드포인트 자체의 연결 상태 신호
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl LinkState {
    /// 세션 종료를 유발하는 상태인지
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LinkState::Disconnected | LinkState::Failed | LinkState::Closed
        )
    }
}

/// 영상 세션 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaState {
    #[default]
    Idle,
    Negotiating,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl std::fmt::Display for MediaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaState::Idle => write!(f, "Idle"),
            MediaState::Negotiating => write!(f, "Negotiating"),
            MediaState::Connected => write!(f, "Connected"),
            MediaState::Disconnected => write!(f, "Disconnected"),
            MediaState::Failed => write!(f, "Failed"),
            MediaState::Closed => write!(f, "Closed"),
        }
    }
}

impl From<LinkState> for Option<MediaState> {
    fn from(link: LinkState) -> Self {
        match link {
            LinkState::Connected => Some(MediaState::Connected),
            LinkState::Disconnected => Some(MediaState::Disconnected),
            LinkState::Failed => Some(MediaState::Failed),
            LinkState::Closed => Some(MediaState::Closed),
            LinkState::New | LinkState::Connecting => None,
        }
    }
}

/// 트랙 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

/// 트랙 방향
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackDirection {
    /// 수신 전용
    RecvOnly,
    /// 송신 전용
    SendOnly,
}

/// 엔드포인트 구성: 종류별 트랙 방향 (None이면 해당 미디어 없음)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointSpec {
    pub video: Option<TrackDirection>,
    pub audio: Option<TrackDirection>,
}

impl EndpointSpec {
    /// 영상 1개 수신, 오디오 없음
    pub const VIDEO_RECEIVER: EndpointSpec = EndpointSpec {
        video: Some(TrackDirection::RecvOnly),
        audio: None,
    };

    /// 마이크 송신, 수신 없음
    pub const MIC_SENDER: EndpointSpec = EndpointSpec {
        video: None,
        audio: Some(TrackDirection::SendOnly),
    };
}
