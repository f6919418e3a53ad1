//! # roverlink-session
//!
//! 실시간 세션 코어. 포트(trait)에만 의존하며 어댑터는 `roverlink-app`에서 주입된다.
//!
//! - [`throttle`]: 조종 명령 스로틀 (데드맨 정지 포함)
//! - [`media`]: 영상 협상 상태 머신
//! - [`audio`]: 오디오 세션 관리자
//! - [`uplink`]: 마이크 업링크 전송 (피어 스트림 / 청크 업로드)
//! - [`telemetry`]: 텔레메트리 폴러
//! - [`indicator`]: 자동 해제 에러 표시
//! - [`event_bus`]: UI 이벤트 브로드캐스트
//! - [`session`]: 구성 요소를 묶는 세션 컨텍스트

pub mod audio;
pub mod event_bus;
pub mod indicator;
pub mod media;
pub mod session;
pub mod telemetry;
pub mod throttle;
pub mod uplink;

pub use event_bus::SessionEvent;
pub use session::{SessionPorts, StartOptions, TeleopSession};
