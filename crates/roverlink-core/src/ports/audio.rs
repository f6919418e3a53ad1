//! 오디오 포트.
//!
//! 구현: `roverlink-network` crate (REST), `roverlink-media` crate (cpal 캡처, WAV 인코딩)

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::CoreError;
use crate::models::audio::{AudioFrame, AudioReply, AudioStatus, MicrophoneOffer};
use crate::models::media::SessionDescription;

/// 차량 측 오디오 REST API
#[async_trait]
pub trait AudioApi: Send + Sync {
    /// 프리셋 사운드 재생 (`POST /audio/play/{id}`)
    async fn play(&self, sound_id: &str) -> Result<AudioReply, CoreError>;

    /// 로컬 재생 중지 (`POST /audio/stop`)
    async fn stop(&self) -> Result<AudioReply, CoreError>;

    /// TTS 요청 (`POST /audio/speak`)
    async fn speak(&self, text: &str) -> Result<AudioReply, CoreError>;

    /// 차량 측 마이크 offer 요청
    async fn microphone_offer(&self) -> Result<MicrophoneOffer, CoreError>;

    /// 로컬 answer 전달
    async fn microphone_answer(
        &self,
        connection_id: &str,
        answer: &SessionDescription,
    ) -> Result<AudioReply, CoreError>;

    /// 마이크 스트림 종료 통지
    async fn microphone_stop(&self) -> Result<AudioReply, CoreError>;

    /// 오디오 서브시스템 상태 (`GET /audio/status`)
    async fn status(&self) -> Result<AudioStatus, CoreError>;
}

/// 열린 캡처 스트림
///
/// drop 시 장치가 해제된다.
pub struct CaptureStream {
    /// 장치 샘플레이트
    pub sample_rate: u32,
    frames: mpsc::Receiver<AudioFrame>,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl CaptureStream {
    /// 프레임 수신 채널과 해제 콜백으로 생성
    pub fn new(
        sample_rate: u32,
        frames: mpsc::Receiver<AudioFrame>,
        release: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            sample_rate,
            frames,
            release: Some(Box::new(release)),
        }
    }

    /// 다음 프레임. 장치가 멈추면 `None`
    pub async fn next_frame(&mut self) -> Option<AudioFrame> {
        self.frames.recv().await
    }

    /// 장치 해제 (여러 번 호출해도 안전)
    pub fn release(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
        self.frames.close();
    }
}

impl Drop for CaptureStream {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for CaptureStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureStream")
            .field("sample_rate", &self.sample_rate)
            .field("released", &self.release.is_none())
            .finish()
    }
}

/// 마이크 캡처 장치
#[async_trait]
pub trait AudioCapture: Send + Sync {
    /// 캡처 시작
    ///
    /// 장치가 없거나 접근이 거부되면 `CoreError::PermissionDenied`.
    async fn open(&self) -> Result<CaptureStream, CoreError>;
}

/// 청크 인코더 (청크 업링크용)
pub trait ChunkRecorder: Send + Sync {
    /// MIME 타입 지원 여부
    fn supports(&self, mime: &str) -> bool;

    /// PCM 프레임 묶음을 한 청크로 인코딩
    fn encode_chunk(&self, mime: &str, frames: &[AudioFrame]) -> Result<Vec<u8>, CoreError>;
}
