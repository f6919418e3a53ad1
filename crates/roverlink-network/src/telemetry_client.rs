//! 시스템 상태 조회 클라이언트 (`GET /system-status`).

use async_trait::async_trait;
use chrono::Utc;
use roverlink_core::error::CoreError;
use roverlink_core::models::telemetry::{SystemStatusResponse, TelemetrySample};
use roverlink_core::ports::telemetry::TelemetrySource;

use crate::http::{check_response, read_json, VehicleHttp};

const PATH: &str = "/system-status";

/// `TelemetrySource` 포트 구현
pub struct HttpTelemetry {
    http: VehicleHttp,
}

impl HttpTelemetry {
    pub fn new(http: VehicleHttp) -> Self {
        Self { http }
    }
}

/// 응답 원형을 샘플로 변환. `status != "success"`는 에러
fn into_sample(resp: SystemStatusResponse) -> Result<TelemetrySample, CoreError> {
    if resp.status != "success" {
        return Err(CoreError::Rejected(format!(
            "{PATH}: {}",
            resp.message.as_deref().unwrap_or(&resp.status)
        )));
    }
    let cpu = resp.cpu.unwrap_or_default();
    Ok(TelemetrySample {
        cpu: cpu.percent,
        memory: resp.memory.unwrap_or_default(),
        swap: resp.swap.unwrap_or_default(),
        temperature: cpu.temperature,
        received_at: Utc::now(),
    })
}

#[async_trait]
impl TelemetrySource for HttpTelemetry {
    async fn fetch(&self) -> Result<TelemetrySample, CoreError> {
        let resp = self
            .http
            .send(self.http.client().get(self.http.url(PATH)), PATH)
            .await?;
        let resp = check_response(resp, PATH).await?;
        let body: SystemStatusResponse = read_json(resp, PATH).await?;
        into_sample(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn client(server: &mockito::ServerGuard) -> HttpTelemetry {
        HttpTelemetry::new(VehicleHttp::new(&server.url(), Duration::from_secs(5), false).unwrap())
    }

    #[tokio::test]
    async fn fetch_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/system-status")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"status":"success",
                    "cpu":{"percent":23.5,"temperature":51.2},
                    "memory":{"percent":40.0,"used":1717986918,"total":4294967296},
                    "swap":{"percent":0.0,"used":0,"total":1073741824}}"#,
            )
            .create_async()
            .await;

        let sample = client(&server).fetch().await.unwrap();
        assert_eq!(sample.cpu, 23.5);
        assert_eq!(sample.temperature, Some(51.2));
        assert_eq!(sample.memory.total, 4_294_967_296);
        assert_eq!(sample.swap.total, 1_073_741_824);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn missing_temperature_sensor() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/system-status")
            .with_status(200)
            .with_body(
                r#"{"status":"success","cpu":{"percent":5.0},
                    "memory":{"percent":1.0,"used":1,"total":100},
                    "swap":{"percent":0.0,"used":0,"total":0}}"#,
            )
            .create_async()
            .await;

        let sample = client(&server).fetch().await.unwrap();
        assert_eq!(sample.temperature, None);
    }

    #[tokio::test]
    async fn non_success_status_is_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/system-status")
            .with_status(200)
            .with_body(r#"{"status":"error","message":"psutil not installed"}"#)
            .create_async()
            .await;

        let err = client(&server).fetch().await.unwrap_err();
        assert!(matches!(&err, CoreError::Rejected(m) if m.contains("psutil")));
    }
}
