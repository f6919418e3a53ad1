//! 제어 채널 메시지 모델.
//!
//! 이벤트 이름 + JSON 페이로드 쌍으로 전송된다.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::models::control::ControlVector;

/// 송신 메시지
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelMessage {
    /// 조종 명령 `control {lx, ly}`
    Control(ControlVector),
    /// 청크 업링크 시작 알림
    StartMicrophone,
    /// 청크 업링크 종료 알림
    StopMicrophone,
    /// 인코딩된 오디오 청크 `audio_data {audio, size}`
    AudioData {
        /// base64 인코딩된 청크
        audio: String,
        /// 원본 바이트 수
        size: usize,
    },
}

impl ChannelMessage {
    /// 이벤트 이름
    pub fn event(&self) -> &'static str {
        match self {
            ChannelMessage::Control(_) => "control",
            ChannelMessage::StartMicrophone => "start_microphone",
            ChannelMessage::StopMicrophone => "stop_microphone",
            ChannelMessage::AudioData { .. } => "audio_data",
        }
    }

    /// 이벤트 페이로드 (페이로드 없는 이벤트는 None)
    pub fn payload(&self) -> Option<Value> {
        match self {
            ChannelMessage::Control(v) => Some(json!({
                "lx": wire_axis(v.lx),
                "ly": wire_axis(v.ly),
            })),
            ChannelMessage::StartMicrophone | ChannelMessage::StopMicrophone => None,
            ChannelMessage::AudioData { audio, size } => {
                Some(json!({ "audio": audio, "size": size }))
            }
        }
    }

    /// 정지 명령 여부
    pub fn is_stop(&self) -> bool {
        matches!(self, ChannelMessage::Control(v) if v.is_stop())
    }
}

// f32 → f64 변환 시 생기는 꼬리 자릿수 제거 (0.1 → 0.10000000149...)
fn wire_axis(value: f32) -> f64 {
    (f64::from(value) * 100.0).round() / 100.0
}

/// 제어 채널 연결 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// 연결됨
    Connected,
    /// 연결 끊김
    Disconnected,
    /// 재연결 시도 중
    Reconnecting,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionStatus::Connected => write!(f, "Connected"),
            ConnectionStatus::Disconnected => write!(f, "Disconnected"),
            ConnectionStatus::Reconnecting => write!(f, "Reconnecting"),
        }
    }
}

/// 마이크 수신 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MicrophoneState {
    Started,
    Stopped,
}

/// 수신 메시지
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// 모터 출력 확인 `ack {ls, rs}`
    Ack { ls: f64, rs: f64 },
    /// 차량 측 마이크 수신 상태
    MicrophoneStatus(MicrophoneState),
    /// 그 외 이벤트
    Other { event: String, data: Value },
}

#[derive(Deserialize)]
struct AckPayload {
    ls: f64,
    rs: f64,
}

#[derive(Deserialize)]
struct MicStatusPayload {
    status: MicrophoneState,
}

impl InboundMessage {
    /// 이벤트 이름과 페이로드로부터 해석. 형식이 맞지 않으면 `Other`
    pub fn from_event(event: &str, data: Value) -> Self {
        match event {
            "ack" => match serde_json::from_value::<AckPayload>(data.clone()) {
                Ok(p) => InboundMessage::Ack { ls: p.ls, rs: p.rs },
                Err(_) => InboundMessage::Other {
                    event: event.to_string(),
                    data,
                },
            },
            "microphone_status" => match serde_json::from_value::<MicStatusPayload>(data.clone())
            {
                Ok(p) => InboundMessage::MicrophoneStatus(p.status),
                Err(_) => InboundMessage::Other {
                    event: event.to_string(),
                    data,
                },
            },
            _ => InboundMessage::Other {
                event: event.to_string(),
                data,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_payload_shape() {
        let msg = ChannelMessage::Control(ControlVector::new(0.5, -0.5));
        assert_eq!(msg.event(), "control");
        assert_eq!(msg.payload().unwrap(), json!({"lx": 0.5, "ly": -0.5}));
        assert!(!msg.is_stop());
        assert!(ChannelMessage::Control(ControlVector::STOP).is_stop());
    }

    #[test]
    fn control_payload_has_no_float_noise() {
        let msg = ChannelMessage::Control(ControlVector::new(0.1, -0.3));
        assert_eq!(msg.payload().unwrap().to_string(), r#"{"lx":0.1,"ly":-0.3}"#);
    }

    #[test]
    fn audio_data_payload() {
        let msg = ChannelMessage::AudioData {
            audio: "UklGRg==".into(),
            size: 4,
        };
        assert_eq!(msg.event(), "audio_data");
        assert_eq!(msg.payload().unwrap()["size"], 4);
        assert_eq!(ChannelMessage::StartMicrophone.payload(), None);
    }

    #[test]
    fn inbound_parsing() {
        assert_eq!(
            InboundMessage::from_event("ack", json!({"ls": 0.25, "rs": -0.5})),
            InboundMessage::Ack { ls: 0.25, rs: -0.5 }
        );
        assert_eq!(
            InboundMessage::from_event("microphone_status", json!({"status": "started"})),
            InboundMessage::MicrophoneStatus(MicrophoneState::Started)
        );
        assert!(matches!(
            InboundMessage::from_event("ack", json!("bogus")),
            InboundMessage::Other { .. }
        ));
    }
}
