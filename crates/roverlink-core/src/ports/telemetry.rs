//! 텔레메트리 포트.
//!
//! 구현: `roverlink-network` crate (reqwest)

use async_trait::async_trait;

use crate::error::CoreError;
use crate::models::telemetry::TelemetrySample;

/// 차량 시스템 상태 조회
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    /// 최신 샘플 1건 조회. `status != "success"` 응답은 에러로 취급
    async fn fetch(&self) -> Result<TelemetrySample, CoreError>;
}
