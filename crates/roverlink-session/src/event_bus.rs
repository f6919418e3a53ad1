//! 세션 이벤트 버스.
//!
//! `tokio::broadcast` 기반 UI 알림 라우팅.

use roverlink_core::models::audio::AudioMode;
use roverlink_core::models::media::MediaState;
use roverlink_core::models::message::{ConnectionStatus, InboundMessage};
use roverlink_core::models::telemetry::TelemetrySample;
use tokio::sync::broadcast;
use tracing::debug;

/// UI로 전달되는 세션 이벤트
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// 영상 세션 상태 변경
    MediaStateChanged(MediaState),
    /// 오디오 모드 변경
    AudioModeChanged(AudioMode),
    /// 일시적 에러 표시
    ErrorRaised(String),
    /// 에러 표시 해제
    ErrorCleared,
    /// 새 텔레메트리 샘플
    Telemetry(TelemetrySample),
    /// 제어 채널 연결 상태 변경
    ControlLink(ConnectionStatus),
    /// 차량에서 수신한 메시지
    Inbound(InboundMessage),
}

/// 세션 이벤트 버스
#[derive(Debug)]
pub struct EventBus {
    tx: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    /// 새 이벤트 버스 생성
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// 이벤트 발행 (구독자가 없어도 무시)
    pub fn publish(&self, event: SessionEvent) {
        debug!("이벤트 발행: {:?}", std::mem::discriminant(&event));
        let _ = self.tx.send(event);
    }

    /// 구독자 생성
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
