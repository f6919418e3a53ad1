//! 차량 오디오 REST 클라이언트.
//!
//! `AudioApi` 포트 구현. 모든 엔드포인트는 `{status, message?}`를 돌려주며
//! `status == "error"`는 HTTP 상태와 무관하게 `Rejected`로 매핑된다.

use async_trait::async_trait;
use roverlink_core::error::CoreError;
use roverlink_core::models::audio::{AudioReply, AudioStatus, MicrophoneOffer};
use roverlink_core::models::media::SessionDescription;
use roverlink_core::ports::audio::AudioApi;
use serde_json::{json, Value};
use tracing::debug;

use crate::http::{check_response, read_json, VehicleHttp};

/// 오디오 REST 클라이언트: `AudioApi` 포트 구현
pub struct HttpAudioApi {
    http: VehicleHttp,
}

impl HttpAudioApi {
    pub fn new(http: VehicleHttp) -> Self {
        Self { http }
    }

    async fn post(&self, path: &str, body: Option<Value>) -> Result<AudioReply, CoreError> {
        let mut request = self.http.client().post(self.http.url(path));
        if let Some(body) = &body {
            request = request.json(body);
        }
        let resp = self.http.send(request, path).await?;
        let resp = check_response(resp, path).await?;
        let reply: AudioReply = read_json(resp, path).await?;
        debug!("{} 응답: {:?}", path, reply.status);
        reply.into_result(path)
    }
}

/// 사운드 ID를 경로 세그먼트로 안전하게 인코딩
fn sound_path(sound_id: &str) -> Result<String, CoreError> {
    let mut url = url::Url::parse("http://localhost/audio/play/")
        .map_err(|e| CoreError::Internal(format!("URL 생성 실패: {e}")))?;
    url.path_segments_mut()
        .map_err(|_| CoreError::Internal("URL 경로 조작 불가".to_string()))?
        .pop_if_empty()
        .push(sound_id);
    Ok(url.path().to_string())
}

#[async_trait]
impl AudioApi for HttpAudioApi {
    async fn play(&self, sound_id: &str) -> Result<AudioReply, CoreError> {
        if sound_id.trim().is_empty() {
            return Err(CoreError::Validation {
                field: "sound_id".to_string(),
                message: "빈 사운드 ID".to_string(),
            });
        }
        self.post(&sound_path(sound_id)?, None).await
    }

    async fn stop(&self) -> Result<AudioReply, CoreError> {
        self.post("/audio/stop", None).await
    }

    async fn speak(&self, text: &str) -> Result<AudioReply, CoreError> {
        self.post("/audio/speak", Some(json!({ "text": text }))).await
    }

    async fn microphone_offer(&self) -> Result<MicrophoneOffer, CoreError> {
        const PATH: &str = "/audio/webrtc/microphone-offer";
        let resp = self
            .http
            .send(self.http.client().post(self.http.url(PATH)), PATH)
            .await?;
        let resp = check_response(resp, PATH).await?;
        let body: Value = read_json(resp, PATH).await?;

        if body.get("status").and_then(Value::as_str) == Some("error") {
            let reply: AudioReply = serde_json::from_value(body)?;
            reply.into_result(PATH)?;
            return Err(CoreError::Rejected(format!("{PATH}: 원인 미상")));
        }
        serde_json::from_value(body)
            .map_err(|e| CoreError::Negotiation(format!("{PATH} offer 형식 오류: {e}")))
    }

    async fn microphone_answer(
        &self,
        connection_id: &str,
        answer: &SessionDescription,
    ) -> Result<AudioReply, CoreError> {
        self.post(
            "/audio/webrtc/microphone-answer",
            Some(json!({
                "connection_id": connection_id,
                "sdp": answer.sdp,
                "type": answer.kind,
            })),
        )
        .await
    }

    async fn microphone_stop(&self) -> Result<AudioReply, CoreError> {
        self.post("/audio/webrtc/microphone-stop", None).await
    }

    async fn status(&self) -> Result<AudioStatus, CoreError> {
        const PATH: &str = "/audio/status";
        let resp = self
            .http
            .send(self.http.client().get(self.http.url(PATH)), PATH)
            .await?;
        let resp = check_response(resp, PATH).await?;
        read_json(resp, PATH).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roverlink_core::models::audio::ReplyStatus;
    use roverlink_core::models::media::SdpKind;
    use std::time::Duration;

    fn api(server: &mockito::ServerGuard) -> HttpAudioApi {
        HttpAudioApi::new(VehicleHttp::new(&server.url(), Duration::from_secs(5), false).unwrap())
    }

    #[test]
    fn sound_id_is_percent_encoded() {
        assert_eq!(sound_path("horn").unwrap(), "/audio/play/horn");
        assert_eq!(sound_path("good morning").unwrap(), "/audio/play/good%20morning");
        assert_eq!(sound_path("a/b").unwrap(), "/audio/play/a%2Fb");
    }

    #[tokio::test]
    async fn play_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/audio/play/horn")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"status":"success","message":"Playing horn"}"#)
            .create_async()
            .await;

        let reply = api(&server).play("horn").await.unwrap();
        assert_eq!(reply.status, ReplyStatus::Success);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn missing_sound_is_rejected() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/audio/play/nope")
            .with_status(404)
            .with_body(r#"{"status":"error","message":"Sound not found"}"#)
            .create_async()
            .await;

        let err = api(&server).play("nope").await.unwrap_err();
        assert!(matches!(&err, CoreError::Rejected(m) if m.contains("Sound not found")));
    }

    #[tokio::test]
    async fn error_status_with_200_is_rejected() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/audio/stop")
            .with_status(200)
            .with_body(r#"{"status":"error","message":"mixer not initialized"}"#)
            .create_async()
            .await;

        let err = api(&server).stop().await.unwrap_err();
        assert!(matches!(err, CoreError::Rejected(_)));
    }

    #[tokio::test]
    async fn speak_sends_text_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/audio/speak")
            .match_body(mockito::Matcher::Json(json!({"text": "안녕하세요"})))
            .with_status(200)
            .with_body(r#"{"status":"success"}"#)
            .create_async()
            .await;

        api(&server).speak("안녕하세요").await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn microphone_offer_and_answer() {
        let mut server = mockito::Server::new_async().await;
        let _offer = server
            .mock("POST", "/audio/webrtc/microphone-offer")
            .with_status(200)
            .with_body(r#"{"connection_id":"abc","sdp":"v=0\r\n","type":"offer"}"#)
            .create_async()
            .await;
        let answer_mock = server
            .mock("POST", "/audio/webrtc/microphone-answer")
            .match_body(mockito::Matcher::Json(json!({
                "connection_id": "abc",
                "sdp": "v=0\r\nanswer",
                "type": "answer"
            })))
            .with_status(200)
            .with_body(r#"{"status":"success"}"#)
            .create_async()
            .await;

        let api = api(&server);
        let offer = api.microphone_offer().await.unwrap();
        assert_eq!(offer.connection_id, "abc");
        assert_eq!(offer.kind, SdpKind::Offer);

        api.microphone_answer("abc", &SessionDescription::answer("v=0\r\nanswer"))
            .await
            .unwrap();
        answer_mock.assert_async().await;
    }

    #[tokio::test]
    async fn microphone_offer_error_payload() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/audio/webrtc/microphone-offer")
            .with_status(200)
            .with_body(r#"{"status":"error","message":"aiortc not available"}"#)
            .create_async()
            .await;

        let err = api(&server).microphone_offer().await.unwrap_err();
        assert!(matches!(&err, CoreError::Rejected(m) if m.contains("aiortc")));
    }

    #[tokio::test]
    async fn status_parses_leniently() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/audio/status")
            .with_status(200)
            .with_body(
                r#"{"status":"success","pygame":{"is_playing":true,"initialized":true},
                    "webrtc":{"active_connections":1},"available_sounds":["horn","siren"]}"#,
            )
            .create_async()
            .await;

        let status = api(&server).status().await.unwrap();
        assert!(status.pygame.unwrap().is_playing);
        assert_eq!(status.available_sounds, vec!["horn", "siren"]);
    }
}
