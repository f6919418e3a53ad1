//! Roverlink 도메인 모델.
//!
//! 클라이언트와 차량이 주고받는 데이터 구조체를 정의한다.
//! 와이어 형식이 있는 모델은 `serde` Serialize/Deserialize를 구현한다.

pub mod audio;
pub mod control;
pub mod media;
pub mod message;
pub mod telemetry;
