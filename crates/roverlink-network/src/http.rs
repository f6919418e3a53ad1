//! 차량 HTTP 서버 공통 클라이언트.
//!
//! reqwest 클라이언트 생성, URL 조립, 상태 코드 매핑을 한곳에 모은다.

use std::time::Duration;

use roverlink_core::config::AppConfig;
use roverlink_core::error::CoreError;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::warn;

/// 에러 응답 본문에서 사유를 꺼낼 때 쓰는 형태
#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// 차량 서버 HTTP 클라이언트 (어댑터들이 공유)
#[derive(Clone)]
pub struct VehicleHttp {
    client: reqwest::Client,
    base_url: String,
}

impl VehicleHttp {
    /// 새 클라이언트 생성
    pub fn new(
        base_url: &str,
        timeout: Duration,
        accept_invalid_certs: bool,
    ) -> Result<Self, CoreError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()
            .map_err(|e| CoreError::Network(format!("HTTP 클라이언트 빌드 실패: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// 설정으로부터 생성
    pub fn from_config(config: &AppConfig) -> Result<Self, CoreError> {
        Self::new(
            &config.server.base_url,
            config.request_timeout(),
            config.server.accept_invalid_certs,
        )
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// 기본 URL 기준 경로
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// 전송 실패를 `Network`로 변환
    pub async fn send(
        &self,
        request: reqwest::RequestBuilder,
        endpoint: &str,
    ) -> Result<reqwest::Response, CoreError> {
        request
            .send()
            .await
            .map_err(|e| CoreError::Network(format!("{endpoint} 요청 실패: {e}")))
    }
}

/// 응답 상태 코드 확인 및 에러 매핑
///
/// 본문이 `{message}`나 `{error}` JSON이면 그 내용을 `Rejected` 사유로 쓴다.
/// 5xx는 일시적 전송 에러로 본다.
pub async fn check_response(
    resp: reqwest::Response,
    endpoint: &str,
) -> Result<reqwest::Response, CoreError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let text = resp.text().await.unwrap_or_else(|e| {
        warn!("응답 본문 읽기 실패: {e}");
        String::new()
    });
    let reason = serde_json::from_str::<ErrorBody>(&text)
        .ok()
        .and_then(|body| body.message.or(body.error))
        .unwrap_or(text);

    if status.is_server_error() {
        Err(CoreError::Network(format!(
            "{endpoint} 서버 에러 ({status}): {reason}"
        )))
    } else {
        Err(CoreError::Rejected(format!("{endpoint} ({status}): {reason}")))
    }
}

/// 성공 응답 본문을 JSON으로 파싱
pub async fn read_json<T: DeserializeOwned>(
    resp: reqwest::Response,
    endpoint: &str,
) -> Result<T, CoreError> {
    let text = resp
        .text()
        .await
        .map_err(|e| CoreError::Network(format!("{endpoint} 응답 읽기 실패: {e}")))?;
    serde_json::from_str(&text).map_err(|e| {
        CoreError::Negotiation(format!(
            "{endpoint} 응답 파싱 실패 ({}바이트): {e}",
            text.len()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let http = VehicleHttp::new("http://rover.local:5000/", Duration::from_secs(1), false)
            .unwrap();
        assert_eq!(http.base_url(), "http://rover.local:5000");
        assert_eq!(http.url("/audio/stop"), "http://rover.local:5000/audio/stop");
    }

    #[tokio::test]
    async fn error_body_message_becomes_reason() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/audio/play/missing")
            .with_status(404)
            .with_header("content-type", "application/json")
            .with_body(r#"{"status":"error","message":"Sound not found"}"#)
            .create_async()
            .await;

        let http = VehicleHttp::new(&server.url(), Duration::from_secs(5), false).unwrap();
        let resp = http
            .send(http.client().post(http.url("/audio/play/missing")), "play")
            .await
            .unwrap();
        let err = check_response(resp, "play").await.unwrap_err();

        assert!(matches!(&err, CoreError::Rejected(msg) if msg.contains("Sound not found")));
    }

    #[tokio::test]
    async fn server_error_is_transport_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/system-status")
            .with_status(503)
            .with_body("busy")
            .create_async()
            .await;

        let http = VehicleHttp::new(&server.url(), Duration::from_secs(5), false).unwrap();
        let resp = http
            .send(http.client().get(http.url("/system-status")), "system-status")
            .await
            .unwrap();
        let err = check_response(resp, "system-status").await.unwrap_err();

        assert!(matches!(err, CoreError::Network(_)));
    }
}
