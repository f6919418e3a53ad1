//! Socket.IO v5 / Engine.IO v4 텍스트 패킷 코덱.
//!
//! WebSocket 전송만 다룬다 (폴링 업그레이드 없음).
//! Engine.IO 패킷 타입 한 글자 뒤에 Socket.IO 패킷이 이어진다.
//!
//! | 프레임 | 의미 |
//! |---|---|
//! | `0{...}` | Engine.IO open (sid, pingInterval, pingTimeout) |
//! | `2` / `3` | ping / pong |
//! | `40` | 기본 네임스페이스 연결 |
//! | `41` | 네임스페이스 연결 해제 |
//! | `42["event",data]` | 이벤트 |
//! | `44{...}` | 연결 에러 |

use roverlink_core::error::CoreError;
use serde::Deserialize;
use serde_json::Value;

/// Engine.IO open 패킷 본문
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub sid: String,
    #[serde(default)]
    pub ping_interval: u64,
    #[serde(default)]
    pub ping_timeout: u64,
}

/// 해석된 수신 패킷
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Open(Handshake),
    Close,
    Ping,
    Pong,
    Connect,
    Disconnect,
    Event { name: String, data: Value },
    ConnectError(String),
    /// 이 클라이언트가 다루지 않는 패킷 (ack, binary 등)
    Ignored,
}

/// 텍스트 프레임 해석
pub fn decode(frame: &str) -> Result<Packet, CoreError> {
    let mut chars = frame.chars();
    let engine = chars
        .next()
        .ok_or_else(|| CoreError::Network("빈 Engine.IO 프레임".to_string()))?;
    let rest = chars.as_str();

    match engine {
        '0' => {
            let handshake: Handshake = serde_json::from_str(rest)
                .map_err(|e| CoreError::Network(format!("Engine.IO open 파싱 실패: {e}")))?;
            Ok(Packet::Open(handshake))
        }
        '1' => Ok(Packet::Close),
        '2' => Ok(Packet::Ping),
        '3' => Ok(Packet::Pong),
        '4' => decode_socket(rest),
        '6' => Ok(Packet::Ignored),
        other => Err(CoreError::Network(format!(
            "알 수 없는 Engine.IO 패킷 타입: {other}"
        ))),
    }
}

fn decode_socket(packet: &str) -> Result<Packet, CoreError> {
    let mut chars = packet.chars();
    let kind = chars
        .next()
        .ok_or_else(|| CoreError::Network("빈 Socket.IO 패킷".to_string()))?;
    let body = chars.as_str();

    match kind {
        '0' => Ok(Packet::Connect),
        '1' => Ok(Packet::Disconnect),
        '2' => decode_event(body),
        '4' => {
            let reason = serde_json::from_str::<Value>(body)
                .ok()
                .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
                .unwrap_or_else(|| body.to_string());
            Ok(Packet::ConnectError(reason))
        }
        _ => Ok(Packet::Ignored),
    }
}

fn decode_event(body: &str) -> Result<Packet, CoreError> {
    // 네임스페이스(`/ns,`)와 ack id는 기본 네임스페이스에서 쓰지 않으므로 배열 시작까지 건너뛴다
    let start = body
        .find('[')
        .ok_or_else(|| CoreError::Network(format!("이벤트 배열 없음: {body}")))?;
    let items: Vec<Value> = serde_json::from_str(&body[start..])
        .map_err(|e| CoreError::Network(format!("이벤트 파싱 실패: {e}")))?;
    let mut items = items.into_iter();
    let name = match items.next() {
        Some(Value::String(name)) => name,
        _ => return Err(CoreError::Network("이벤트 이름 없음".to_string())),
    };
    Ok(Packet::Event {
        name,
        data: items.next().unwrap_or(Value::Null),
    })
}

/// 기본 네임스페이스 연결 요청
pub fn encode_connect() -> String {
    "40".to_string()
}

/// 연결 해제
pub fn encode_disconnect() -> String {
    "41".to_string()
}

/// ping 응답
pub fn encode_pong() -> String {
    "3".to_string()
}

/// 이벤트 프레임 `42["name",data]`
pub fn encode_event(name: &str, data: Option<&Value>) -> Result<String, CoreError> {
    let array = match data {
        Some(data) => serde_json::to_string(&(name, data))?,
        None => serde_json::to_string(&[name])?,
    };
    Ok(format!("42{array}"))
}
