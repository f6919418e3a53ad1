//! 오디오 세션 모델.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::models::media::{SdpKind, SessionDescription};

/// 오디오 모드: 한 번에 하나만 활성
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", content = "sound_id", rename_all = "snake_case")]
pub enum AudioMode {
    #[default]
    Idle,
    /// 차량 측 로컬 재생
    LocalPlayback(String),
    /// 마이크 업링크
    MicUplink,
}

impl AudioMode {
    pub fn is_idle(&self) -> bool {
        matches!(self, AudioMode::Idle)
    }
}

impl std::fmt::Display for AudioMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioMode::Idle => write!(f, "Idle"),
            AudioMode::LocalPlayback(id) => write!(f, "LocalPlayback({id})"),
            AudioMode::MicUplink => write!(f, "MicUplink"),
        }
    }
}

/// 오디오 REST 응답 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyStatus {
    Success,
    Error,
}

/// 오디오 REST 공통 응답 `{status, message?}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioReply {
    pub status: ReplyStatus,
    #[serde(default)]
    pub message: Option<String>,
}

impl AudioReply {
    /// `status == error`이면 `Rejected`로 변환
    pub fn into_result(self, endpoint: &str) -> Result<AudioReply, CoreError> {
        match self.status {
            ReplyStatus::Success => Ok(self),
            ReplyStatus::Error => Err(CoreError::Rejected(format!(
                "{endpoint}: {}",
                self.message.as_deref().unwrap_or("원인 미상")
            ))),
        }
    }
}

/// 차량 측 오디오 상태 (`GET /audio/status`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AudioStatus {
    #[serde(default)]
    pub status: Option<String>,
    /// 로컬 재생 중 여부 (`pygame.is_playing`)
    #[serde(default)]
    pub pygame: Option<PlayerStatus>,
    /// 마이크 수신 상태 (서버 구현에 따라 형식이 다름)
    #[serde(default)]
    pub webrtc: Option<serde_json::Value>,
    #[serde(default)]
    pub available_sounds: Vec<String>,
}

/// 로컬 플레이어 상태
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlayerStatus {
    #[serde(default)]
    pub is_playing: bool,
}

/// 차량이 생성한 마이크 offer (`POST /audio/webrtc/microphone-offer`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MicrophoneOffer {
    pub connection_id: String,
    pub sdp: String,
    #[serde(rename = "type")]
    pub kind: SdpKind,
}

impl MicrophoneOffer {
    pub fn description(&self) -> SessionDescription {
        SessionDescription {
            kind: self.kind,
            sdp: self.sdp.clone(),
        }
    }
}

/// 캡처된 PCM 프레임 (모노, 16비트)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

impl AudioFrame {
    /// 프레임 길이 (밀리초)
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.samples.len() as u64 * 1000 / u64::from(self.sample_rate)
    }
}

/// 청크 업로드 인코딩 선호 순서 (무압축 → 컨테이너 폴백)
pub const CHUNK_FORMAT_PREFERENCE: [&str; 3] = [
    "audio/wav",
    "audio/webm;codecs=opus",
    "audio/ogg;codecs=opus",
];
