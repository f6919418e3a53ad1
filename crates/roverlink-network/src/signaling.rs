//! 영상 시그널링 HTTP 클라이언트.
//!
//! 두 가지 전송 형식을 지원한다.
//! - `raw_sdp`: `application/sdp` 본문으로 offer를 보내고 응답 본문 전체가 answer SDP
//! - `json`: `{sdp, type}` 요청, `{sdp, type}` 또는 `{error}` 응답

use async_trait::async_trait;
use roverlink_core::config::{AppConfig, SignalingMode};
use roverlink_core::error::CoreError;
use roverlink_core::models::media::{SdpKind, SessionDescription};
use roverlink_core::ports::media::SignalingClient;
use serde::Deserialize;
use tracing::{debug, info};

use crate::http::{check_response, VehicleHttp};

/// JSON 모드 응답
#[derive(Deserialize)]
#[serde(untagged)]
enum JsonAnswer {
    Description(SessionDescription),
    Error { error: String },
}

/// HTTP 시그널링: `SignalingClient` 포트 구현
pub struct HttpSignaling {
    http: VehicleHttp,
    url: String,
    mode: SignalingMode,
}

impl HttpSignaling {
    pub fn new(http: VehicleHttp, url: impl Into<String>, mode: SignalingMode) -> Self {
        Self {
            http,
            url: url.into(),
            mode,
        }
    }

    /// 설정으로부터 생성
    pub fn from_config(http: VehicleHttp, config: &AppConfig) -> Self {
        Self::new(http, config.signaling_url(), config.video.signaling)
    }

    async fn exchange_raw(&self, offer: &SessionDescription) -> Result<SessionDescription, CoreError> {
        let request = self
            .http
            .client()
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/sdp")
            .body(offer.sdp.clone());
        let resp = self.http.send(request, &self.url).await?;
        let resp = check_response(resp, &self.url).await?;
        let sdp = resp
            .text()
            .await
            .map_err(|e| CoreError::Network(format!("answer 읽기 실패: {e}")))?;
        Ok(SessionDescription::answer(sdp))
    }

    async fn exchange_json(
        &self,
        offer: &SessionDescription,
    ) -> Result<SessionDescription, CoreError> {
        let request = self.http.client().post(&self.url).json(offer);
        let resp = self.http.send(request, &self.url).await?;
        let resp = check_response(resp, &self.url).await?;
        let text = resp
            .text()
            .await
            .map_err(|e| CoreError::Network(format!("answer 읽기 실패: {e}")))?;

        match serde_json::from_str::<JsonAnswer>(&text) {
            Ok(JsonAnswer::Description(answer)) if answer.kind == SdpKind::Answer => Ok(answer),
            Ok(JsonAnswer::Description(other)) => Err(CoreError::Negotiation(format!(
                "answer 대신 {:?} 수신",
                other.kind
            ))),
            Ok(JsonAnswer::Error { error }) => Err(CoreError::Negotiation(format!(
                "시그널링 서버 에러: {error}"
            ))),
            Err(e) => Err(CoreError::Negotiation(format!(
                "answer 파싱 실패 ({}바이트): {e}",
                text.len()
            ))),
        }
    }
}

#[async_trait]
impl SignalingClient for HttpSignaling {
    async fn exchange(&self, offer: &SessionDescription) -> Result<SessionDescription, CoreError> {
        info!(
            "offer 전송: {} ({:?}, {}바이트)",
            self.url,
            self.mode,
            offer.sdp.len()
        );
        let answer = match self.mode {
            SignalingMode::RawSdp => self.exchange_raw(offer).await?,
            SignalingMode::Json => self.exchange_json(offer).await?,
        };
        debug!("answer 수신 ({}바이트)", answer.sdp.len());
        Ok(answer)
    }
}
