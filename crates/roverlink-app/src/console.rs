//! 세션 이벤트 콘솔 출력.

use roverlink_core::models::message::InboundMessage;
use roverlink_session::event_bus::SessionEvent;
use tokio::sync::{broadcast, watch};
use tracing::debug;

use crate::lifecycle::shutdown_requested;

/// 이벤트 한 건을 콘솔 한 줄로. 출력하지 않는 이벤트는 None
pub fn render(event: &SessionEvent) -> Option<String> {
    match event {
        SessionEvent::MediaStateChanged(state) => Some(format!("[영상] {state}")),
        SessionEvent::AudioModeChanged(mode) => Some(format!("[오디오] {mode}")),
        SessionEvent::ErrorRaised(message) => Some(format!("[에러] {message}")),
        SessionEvent::ErrorCleared => None,
        SessionEvent::Telemetry(sample) => Some(format!("[시스템] {}", sample.summary())),
        SessionEvent::ControlLink(status) => Some(format!("[제어] {status}")),
        SessionEvent::Inbound(InboundMessage::Ack { ls, rs }) => {
            Some(format!("[모터] L {ls:.2} / R {rs:.2}"))
        }
        SessionEvent::Inbound(InboundMessage::MicrophoneStatus(state)) => {
            Some(format!("[차량 마이크] {state:?}"))
        }
        SessionEvent::Inbound(InboundMessage::Other { event, .. }) => {
            debug!("처리하지 않는 수신 이벤트: {}", event);
            None
        }
    }
}

/// 종료 신호까지 이벤트 출력
pub async fn run(
    mut events: broadcast::Receiver<SessionEvent>,
    mut shutdown: watch::Receiver<bool>,
    show_telemetry: bool,
) {
    loop {
        tokio::select! {
            _ = shutdown_requested(&mut shutdown) => break,
            received = events.recv() => match received {
                Ok(SessionEvent::Telemetry(_)) if !show_telemetry => {}
                Ok(event) => {
                    if let Some(line) = render(&event) {
                        println!("{line}");
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => debug!("이벤트 {}건 건너뜀", n),
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
}
