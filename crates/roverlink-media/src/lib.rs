//! # roverlink-media
//!
//! 미디어 어댑터.
//!
//! - [`webrtc_endpoint`]: webrtc-rs 피어 연결 (`MediaEndpointFactory` 포트)
//! - [`rtp_sink`]: 수신 영상 RTP를 UDP로 포워딩 (`VideoSink` 포트)
//! - [`capture`]: 마이크 캡처 (`AudioCapture` 포트, `microphone` feature)
//! - [`chunk_recorder`]: 청크 업링크용 WAV 인코딩 (`ChunkRecorder` 포트)
//! - [`pcmu`]: G.711 μ-law 인코더

pub mod capture;
pub mod chunk_recorder;
pub mod pcmu;
pub mod rtp_sink;
pub mod webrtc_endpoint;
