//! # roverlink-network
//!
//! 차량 서버와 통신하는 네트워크 어댑터.
//!
//! - [`control_channel`]: Socket.IO 제어 채널 (`ControlChannel` 포트, tokio-tungstenite)
//! - [`audio_api`]: 오디오 REST (`AudioApi` 포트, reqwest)
//! - [`signaling`]: 영상 offer/answer 교환 (`SignalingClient` 포트)
//! - [`telemetry_client`]: 시스템 상태 조회 (`TelemetrySource` 포트)
//! - [`connectivity`]: 연결 상태 추적 + 재연결 백오프
//!
//! ```rust,ignore
//! use roverlink_network::control_channel::SocketIoChannel;
//! use roverlink_network::http::VehicleHttp;
//!
//! let channel = SocketIoChannel::start(&config)?;
//! let http = VehicleHttp::from_config(&config)?;
//! ```

pub mod audio_api;
pub mod connectivity;
pub mod control_channel;
pub mod http;
pub mod signaling;
pub mod socketio;
pub mod telemetry_client;
