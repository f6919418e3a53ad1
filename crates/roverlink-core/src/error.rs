//! Roverlink 핵심 에러 타입.
//!
//! 모든 어댑터 crate는 라이브러리 에러를 `map_err`로 `CoreError`에 매핑한다.

use thiserror::Error;

/// 에러 분류 (전송 / 협상 / 권한 / 정책 / 내부)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 채널·네트워크 실패, 비정상 HTTP 상태
    Transport,
    /// 잘못되었거나 거부된 세션 디스크립션, 원격 에러 페이로드
    Negotiation,
    /// 캡처 장치 접근 거부
    Permission,
    /// 빈 TTS 입력, 중복 시작 명령 등
    Policy,
    /// 그 외
    Internal,
}

/// 코어 레이어 에러.
#[derive(Debug, Error)]
pub enum CoreError {
    /// 네트워크 에러 (연결 실패, 타임아웃, 비정상 상태 코드)
    #[error("네트워크 에러: {0}")]
    Network(String),

    /// 미디어 협상 실패 (offer/answer 교환, SDP 파싱)
    #[error("협상 에러: {0}")]
    Negotiation(String),

    /// 원격 측이 요청을 거부함 (`{"status":"error"}`)
    #[error("원격 거부: {0}")]
    Rejected(String),

    /// 캡처 장치 권한 거부 또는 장치 없음
    #[error("권한 거부: {0}")]
    PermissionDenied(String),

    /// 정책에 의해 거부됨 (중복 시작 등)
    #[error("정책 거부: {0}")]
    PolicyDenied(String),

    /// 필드 유효성 검증 실패
    #[error("유효성 검증 실패 ({field}): {message}")]
    Validation {
        /// 검증 실패한 필드명
        field: String,
        /// 실패 사유
        message: String,
    },

    /// 설정값 오류
    #[error("설정 에러: {0}")]
    Config(String),

    /// JSON 직렬화/역직렬화 실패
    #[error("직렬화 에러: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O 에러
    #[error("I/O 에러: {0}")]
    Io(#[from] std::io::Error),

    /// 내부 에러 (예상치 못한 상황)
    #[error("내부 에러: {0}")]
    Internal(String),
}

impl CoreError {
    /// 에러 분류
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Network(_) | CoreError::Io(_) => ErrorKind::Transport,
            CoreError::Negotiation(_) | CoreError::Rejected(_) | CoreError::Serialization(_) => {
                ErrorKind::Negotiation
            }
            CoreError::PermissionDenied(_) => ErrorKind::Permission,
            CoreError::PolicyDenied(_) | CoreError::Validation { .. } => ErrorKind::Policy,
            CoreError::Config(_) | CoreError::Internal(_) => ErrorKind::Internal,
        }
    }
}
