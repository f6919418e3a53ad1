//! 애플리케이션 설정 구조체.
//!
//! 서버 주소, 조종 명령 스로틀, 영상 협상, 오디오 업링크, 텔레메트리,
//! 제어 채널 재연결 설정을 정의한다. `ConfigManager`가 JSON 파일로 로드/저장.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::CoreError;

/// 최상위 애플리케이션 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// 차량 서버 연결 설정
    pub server: ServerConfig,
    /// 조종 명령 스로틀 설정
    #[serde(default)]
    pub throttle: ThrottleConfig,
    /// 영상 협상 설정
    #[serde(default)]
    pub video: VideoConfig,
    /// 오디오 설정
    #[serde(default)]
    pub audio: AudioConfig,
    /// 텔레메트리 폴링 설정
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    /// 제어 채널 설정
    #[serde(default)]
    pub control: ControlConfig,
}

// ============================================================
// 서버 설정
// ============================================================

/// 서버 연결 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 차량 서버 기본 URL (예: "http://192.168.0.38:5000")
    pub base_url: String,
    /// HTTP 요청 타임아웃 (밀리초)
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// 자체 서명 인증서 허용 (차량 측 HTTPS 시그널링용)
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

// ============================================================
// 스로틀 설정
// ============================================================

/// 조종 명령 송신 전략
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThrottleMode {
    /// 최신 값을 고정 주기로 무조건 송신
    #[default]
    LatestOnTimer,
    /// 최소 간격 + 변화량 임계값을 모두 넘을 때만 즉시 송신
    DebouncedOnChange,
}

impl std::fmt::Display for ThrottleMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ThrottleMode::LatestOnTimer => write!(f, "latest_on_timer"),
            ThrottleMode::DebouncedOnChange => write!(f, "debounced_on_change"),
        }
    }
}

/// 스로틀 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// 송신 전략
    #[serde(default)]
    pub mode: ThrottleMode,
    /// `latest_on_timer` 송신 주기 (밀리초)
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// `debounced_on_change` 최소 송신 간격 (밀리초)
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
    /// `debounced_on_change` 축별 변화량 임계값
    #[serde(default = "default_change_threshold")]
    pub change_threshold: f32,
    /// 릴리즈 정지 명령 디바운스 (밀리초)
    #[serde(default = "default_release_debounce_ms")]
    pub release_debounce_ms: u64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            mode: ThrottleMode::default(),
            tick_interval_ms: default_tick_interval_ms(),
            min_interval_ms: default_min_interval_ms(),
            change_threshold: default_change_threshold(),
            release_debounce_ms: default_release_debounce_ms(),
        }
    }
}

// ============================================================
// 영상 설정
// ============================================================

/// 시그널링 전송 형식
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalingMode {
    /// `application/sdp` 본문으로 offer 전송, 응답 본문이 answer SDP
    #[default]
    RawSdp,
    /// `{sdp, type}` JSON 요청/응답
    Json,
}

/// 영상 협상 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoConfig {
    /// 시그널링 엔드포인트 (None이면 `{base_url}/offer`)
    #[serde(default)]
    pub signaling_url: Option<String>,
    /// 시그널링 형식
    #[serde(default)]
    pub signaling: SignalingMode,
    /// 자동 시작 지연 (밀리초, None이면 자동 시작 안 함)
    #[serde(default = "default_autostart_delay_ms")]
    pub autostart_delay_ms: Option<u64>,
    /// ICE 서버 URL 목록
    #[serde(default = "default_ice_servers")]
    pub ice_servers: Vec<String>,
    /// 수신 RTP 패킷 포워딩 주소 (None이면 패킷 폐기)
    #[serde(default = "default_rtp_forward_addr")]
    pub rtp_forward_addr: Option<String>,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            signaling_url: None,
            signaling: SignalingMode::default(),
            autostart_delay_ms: default_autostart_delay_ms(),
            ice_servers: default_ice_servers(),
            rtp_forward_addr: default_rtp_forward_addr(),
        }
    }
}

// ============================================================
// 오디오 설정
// ============================================================

/// 마이크 업링크 전송 방식 (배포별 하나)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UplinkMode {
    /// 협상된 피어 스트림 (microphone-offer/answer)
    #[default]
    Peer,
    /// 제어 채널로 인코딩 청크 업로드
    Chunked,
}

impl std::fmt::Display for UplinkMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UplinkMode::Peer => write!(f, "peer"),
            UplinkMode::Chunked => write!(f, "chunked"),
        }
    }
}

/// 오디오 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// 업링크 방식
    #[serde(default)]
    pub uplink: UplinkMode,
    /// 청크 길이 (밀리초)
    #[serde(default = "default_chunk_interval_ms")]
    pub chunk_interval_ms: u64,
    /// 에러 표시 자동 해제 (밀리초)
    #[serde(default = "default_error_clear_ms")]
    pub error_clear_ms: u64,
    /// 캡처 요청 샘플레이트 (Hz)
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            uplink: UplinkMode::default(),
            chunk_interval_ms: default_chunk_interval_ms(),
            error_clear_ms: default_error_clear_ms(),
            sample_rate: default_sample_rate(),
        }
    }
}

// ============================================================
// 텔레메트리 / 제어 채널 설정
// ============================================================

/// 텔레메트리 폴링 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// 폴링 활성화
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// 폴링 주기 (밀리초)
    #[serde(default = "default_telemetry_poll_ms")]
    pub poll_interval_ms: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_ms: default_telemetry_poll_ms(),
        }
    }
}

/// 제어 채널 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlConfig {
    /// Socket.IO 엔드포인트 경로
    #[serde(default = "default_socketio_path")]
    pub socketio_path: String,
    /// 재연결 최대 지연 (초)
    #[serde(default = "default_reconnect_max_secs")]
    pub reconnect_max_secs: u64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            socketio_path: default_socketio_path(),
            reconnect_max_secs: default_reconnect_max_secs(),
        }
    }
}

// ============================================================
// AppConfig impl
// ============================================================

impl AppConfig {
    /// 기본 설정값 반환
    pub fn default_config() -> Self {
        Self {
            server: ServerConfig {
                base_url: "http://localhost:5000".to_string(),
                request_timeout_ms: default_request_timeout_ms(),
                accept_invalid_certs: false,
            },
            throttle: ThrottleConfig::default(),
            video: VideoConfig::default(),
            audio: AudioConfig::default(),
            telemetry: TelemetryConfig::default(),
            control: ControlConfig::default(),
        }
    }

    /// 설정값 검증
    pub fn validate(&self) -> Result<(), CoreError> {
        let base = self.server.base_url.trim();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(invalid(
                "server.base_url",
                format!("http(s) URL이어야 합니다: {base}"),
            ));
        }

        let intervals = [
            ("server.request_timeout_ms", self.server.request_timeout_ms),
            ("throttle.tick_interval_ms", self.throttle.tick_interval_ms),
            ("throttle.min_interval_ms", self.throttle.min_interval_ms),
            (
                "throttle.release_debounce_ms",
                self.throttle.release_debounce_ms,
            ),
            ("audio.chunk_interval_ms", self.audio.chunk_interval_ms),
            ("audio.error_clear_ms", self.audio.error_clear_ms),
            ("telemetry.poll_interval_ms", self.telemetry.poll_interval_ms),
            ("control.reconnect_max_secs", self.control.reconnect_max_secs),
        ];
        for (field, value) in intervals {
            if value == 0 {
                return Err(invalid(field, "0보다 커야 합니다".to_string()));
            }
        }

        let threshold = self.throttle.change_threshold;
        if !threshold.is_finite() || !(0.0..1.0).contains(&threshold) {
            return Err(invalid(
                "throttle.change_threshold",
                format!("0.0 이상 1.0 미만이어야 합니다: {threshold}"),
            ));
        }

        if self.audio.sample_rate == 0 {
            return Err(invalid("audio.sample_rate", "0보다 커야 합니다".to_string()));
        }

        Ok(())
    }

    /// 서버 요청 타임아웃을 Duration으로 반환
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.server.request_timeout_ms)
    }

    /// 영상 시그널링 URL (미지정 시 `{base_url}/offer`)
    pub fn signaling_url(&self) -> String {
        match &self.video.signaling_url {
            Some(url) => url.clone(),
            None => format!("{}/offer", self.server.base_url.trim_end_matches('/')),
        }
    }

    /// 텔레메트리 폴링 주기를 Duration으로 반환
    pub fn telemetry_interval(&self) -> Duration {
        Duration::from_millis(self.telemetry.poll_interval_ms)
    }

    /// 에러 표시 자동 해제 시간을 Duration으로 반환
    pub fn error_clear_after(&self) -> Duration {
        Duration::from_millis(self.audio.error_clear_ms)
    }
}

fn invalid(field: &str, message: String) -> CoreError {
    CoreError::Validation {
        field: field.to_string(),
        message,
    }
}

// ============================================================
// 기본값 함수
// ============================================================

fn default_true() -> bool {
    true
}

fn default_request_timeout_ms() -> u64 {
    10_000
}
fn default_tick_interval_ms() -> u64 {
    100
}
fn default_min_interval_ms() -> u64 {
    50
}
fn default_change_threshold() -> f32 {
    0.01
}
fn default_release_debounce_ms() -> u64 {
    100
}
fn default_autostart_delay_ms() -> Option<u64> {
    Some(500)
}
fn default_ice_servers() -> Vec<String> {
    vec!["stun:stun.l.google.com:19302".to_string()]
}
fn default_rtp_forward_addr() -> Option<String> {
    Some("127.0.0.1:5004".to_string())
}
fn default_chunk_interval_ms() -> u64 {
    1_000
}
fn default_error_clear_ms() -> u64 {
    2_000
}
fn default_sample_rate() -> u32 {
    48_000
}
fn default_telemetry_poll_ms() -> u64 {
    2_000
}
fn default_socketio_path() -> String {
    "/socket.io/".to_string()
}
fn default_reconnect_max_secs() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default_config();
        assert!(config.validate().is_ok());
        assert_eq!(config.throttle.mode, ThrottleMode::LatestOnTimer);
        assert_eq!(config.throttle.tick_interval_ms, 100);
        assert_eq!(config.video.autostart_delay_ms, Some(500));
        assert_eq!(config.audio.uplink, UplinkMode::Peer);
        assert_eq!(config.telemetry.poll_interval_ms, 2_000);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let json = r#"{
            "server": {"base_url": "http://10.0.0.2:5000"},
            "throttle": {"mode": "debounced_on_change"},
            "video": {"signaling": "json", "autostart_delay_ms": null}
        }"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.throttle.mode, ThrottleMode::DebouncedOnChange);
        assert_eq!(config.throttle.min_interval_ms, 50);
        assert_eq!(config.video.signaling, SignalingMode::Json);
        assert_eq!(config.video.autostart_delay_ms, None);
        assert_eq!(config.server.request_timeout_ms, 10_000);
        assert_eq!(config.signaling_url(), "http://10.0.0.2:5000/offer");
    }

    #[test]
    fn validate_rejects_zero_interval() {
        let mut config = AppConfig::default_config();
        config.throttle.tick_interval_ms = 0;
        match config.validate() {
            Err(CoreError::Validation { field, .. }) => {
                assert_eq!(field, "throttle.tick_interval_ms")
            }
            other => panic!("예상하지 못한 결과: {other:?}"),
        }
    }

    #[test]
    fn validate_rejects_bad_threshold_and_url() {
        let mut config = AppConfig::default_config();
        config.throttle.change_threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default_config();
        config.server.base_url = "ws://rover".to_string();
        assert!(config.validate().is_err());
    }
}
