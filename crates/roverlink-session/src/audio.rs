//! 오디오 세션 관리자.
//!
//! `Idle`, `LocalPlayback(id)`, `MicUplink` 세 모드 중 하나만 활성화된다.
//! 명령은 하나씩 직렬 처리되며, 다른 모드로 들어가기 전에 현재 모드를 먼저 정지한다.
//! 시작 단계의 실패는 `Idle`로 되돌리고 일시적 에러를 표시한다.
//! 수립된 업링크가 스스로 끝나거나 차량이 수신 중단을 알리면 같은 방식으로 `Idle`로 돌아간다.

use std::sync::Arc;

use parking_lot::RwLock;
use roverlink_core::error::CoreError;
use roverlink_core::models::audio::{AudioMode, AudioStatus};
use roverlink_core::models::message::MicrophoneState;
use roverlink_core::ports::audio::AudioApi;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, info, warn};

use crate::event_bus::{EventBus, SessionEvent};
use crate::indicator::ErrorIndicator;
use crate::uplink::{Uplink, UplinkEnded, UplinkHandle};

/// 오디오 세션 (관리자가 단독 소유)
struct AudioSession {
    mode: AudioMode,
    uplink: Option<Box<dyn UplinkHandle>>,
    /// 업링크를 열 때마다 증가
    generation: u64,
    /// 현재 업링크에 대해 차량이 `started`를 보냈는지
    remote_started: bool,
}

/// 관리자와 업링크 감시 태스크가 함께 쓰는 상태
struct Shared {
    /// 명령 직렬화
    session: Mutex<AudioSession>,
    /// 동기 조회용 모드 사본
    mode: RwLock<AudioMode>,
    bus: Arc<EventBus>,
    indicator: Arc<ErrorIndicator>,
}

/// 오디오 세션 관리자
pub struct AudioSessionManager {
    api: Arc<dyn AudioApi>,
    uplink: Arc<dyn Uplink>,
    shared: Arc<Shared>,
}

impl AudioSessionManager {
    pub fn new(
        api: Arc<dyn AudioApi>,
        uplink: Arc<dyn Uplink>,
        bus: Arc<EventBus>,
        indicator: Arc<ErrorIndicator>,
    ) -> Self {
        info!("오디오 세션 관리자 생성 (업링크: {})", uplink.name());
        Self {
            api,
            uplink,
            shared: Arc::new(Shared {
                session: Mutex::new(AudioSession {
                    mode: AudioMode::Idle,
                    uplink: None,
                    generation: 0,
                    remote_started: false,
                }),
                mode: RwLock::new(AudioMode::Idle),
                bus,
                indicator,
            }),
        }
    }

    /// 현재 모드 (항상 하나)
    pub fn status(&self) -> AudioMode {
        self.shared.mode.read().clone()
    }

    /// 차량 측 오디오 상태 조회
    pub async fn server_status(&self) -> Result<AudioStatus, CoreError> {
        self.api.status().await
    }

    /// 프리셋 사운드 재생
    pub async fn play(&self, sound_id: &str) -> Result<(), CoreError> {
        let mut session = self.shared.session.lock().await;
        self.stop_active(&mut session).await;

        match self.api.play(sound_id).await {
            Ok(_) => {
                info!("로컬 재생 시작: {}", sound_id);
                self.shared
                    .set_mode(&mut session, AudioMode::LocalPlayback(sound_id.to_string()));
                Ok(())
            }
            Err(e) => Err(self.shared.reject("사운드 재생 실패", e)),
        }
    }

    /// TTS 요청 (모드 변화 없음)
    pub async fn speak(&self, text: &str) -> Result<(), CoreError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(self.shared.reject(
                "음성 합성 거부",
                CoreError::Validation {
                    field: "text".to_string(),
                    message: "빈 문자열".to_string(),
                },
            ));
        }

        let _session = self.shared.session.lock().await;
        match self.api.speak(text).await {
            Ok(_) => {
                debug!("TTS 요청 완료 ({}자)", text.chars().count());
                Ok(())
            }
            Err(e) => Err(self.shared.reject("음성 합성 실패", e)),
        }
    }

    /// 마이크 업링크 시작
    pub async fn start_mic(&self) -> Result<(), CoreError> {
        let mut session = self.shared.session.lock().await;
        if session.mode == AudioMode::MicUplink {
            return Err(self.shared.reject(
                "마이크 시작 거부",
                CoreError::PolicyDenied("마이크 업링크가 이미 활성화됨".to_string()),
            ));
        }
        self.stop_active(&mut session).await;

        let (ended, ended_rx) = UplinkEnded::channel();
        match self.uplink.open(ended).await {
            Ok(handle) => {
                session.generation += 1;
                session.remote_started = false;
                session.uplink = Some(handle);
                info!("마이크 업링크 시작 ({})", self.uplink.name());
                self.shared.set_mode(&mut session, AudioMode::MicUplink);
                tokio::spawn(watch_uplink(
                    self.shared.clone(),
                    session.generation,
                    ended_rx,
                ));
                Ok(())
            }
            Err(e) => Err(self.shared.reject("마이크 시작 실패", e)),
        }
    }

    /// 마이크 업링크 종료 (`MicUplink`가 아니면 아무것도 하지 않음)
    pub async fn stop_mic(&self) -> Result<(), CoreError> {
        let mut session = self.shared.session.lock().await;
        if session.mode != AudioMode::MicUplink {
            debug!("마이크 업링크 비활성 상태, 종료 요청 무시");
            return Ok(());
        }
        let result = Shared::close_uplink(&mut session).await;
        self.shared.set_mode(&mut session, AudioMode::Idle);
        result
    }

    /// 활성 모드 정지 → `Idle`
    pub async fn stop_all(&self) -> Result<(), CoreError> {
        let mut session = self.shared.session.lock().await;
        match session.mode {
            AudioMode::MicUplink => {
                let result = Shared::close_uplink(&mut session).await;
                self.shared.set_mode(&mut session, AudioMode::Idle);
                result
            }
            AudioMode::LocalPlayback(_) => {
                let result = self.api.stop().await.map(|_| ());
                if let Err(e) = &result {
                    warn!("로컬 재생 정지 실패: {}", e);
                }
                self.shared.set_mode(&mut session, AudioMode::Idle);
                result
            }
            AudioMode::Idle => {
                // TTS 등 모드 없는 재생도 멈추도록 요청은 보내되 실패는 무시
                if let Err(e) = self.api.stop().await {
                    debug!("Idle 상태 정지 요청 실패 (무시): {}", e);
                }
                Ok(())
            }
        }
    }

    /// 차량의 `microphone_status` 반영.
    ///
    /// `stopped`는 현재 업링크에 대해 `started`를 받은 뒤에만 종료로 본다.
    /// 이전 업링크 종료에 대한 늦은 응답이 새 업링크를 끊지 않게 한다.
    pub async fn on_microphone_status(&self, state: MicrophoneState) {
        match state {
            MicrophoneState::Started => {
                let mut session = self.shared.session.lock().await;
                if session.mode == AudioMode::MicUplink {
                    session.remote_started = true;
                    debug!("차량 마이크 수신 시작 확인");
                }
            }
            MicrophoneState::Stopped => {
                let generation = {
                    let session = self.shared.session.lock().await;
                    if !session.remote_started {
                        debug!("확인되지 않은 업링크에 대한 stopped 무시");
                        return;
                    }
                    session.generation
                };
                self.shared
                    .end_uplink(generation, "차량이 마이크 수신을 중단함")
                    .await;
            }
        }
    }

    /// 현재 모드 정지 (에러는 기록만 하고 진행)
    async fn stop_active(&self, session: &mut AudioSession) {
        match session.mode {
            AudioMode::MicUplink => {
                if let Err(e) = Shared::close_uplink(session).await {
                    warn!("마이크 업링크 종료 실패 (계속 진행): {}", e);
                }
            }
            AudioMode::LocalPlayback(_) => {
                if let Err(e) = self.api.stop().await {
                    warn!("로컬 재생 정지 실패 (계속 진행): {}", e);
                }
            }
            AudioMode::Idle => return,
        }
        self.shared.set_mode(session, AudioMode::Idle);
    }
}

impl Shared {
    async fn close_uplink(session: &mut AudioSession) -> Result<(), CoreError> {
        session.remote_started = false;
        match session.uplink.take() {
            Some(handle) => handle.close().await,
            None => Ok(()),
        }
    }

    /// 스스로 끝난 업링크 정리 → `Idle` + 에러 표시 (다른 세대면 무시)
    async fn end_uplink(&self, generation: u64, reason: &str) {
        let mut session = self.session.lock().await;
        if session.mode != AudioMode::MicUplink || session.generation != generation {
            debug!("이미 교체된 업링크의 종료 통지 무시: {}", reason);
            return;
        }
        warn!("마이크 업링크 중단: {}", reason);
        if let Err(e) = Self::close_uplink(&mut session).await {
            warn!("중단된 업링크 정리 실패: {}", e);
        }
        self.set_mode(&mut session, AudioMode::Idle);
        self.indicator.raise(format!("마이크 업링크 중단: {reason}"));
    }

    fn set_mode(&self, session: &mut AudioSession, mode: AudioMode) {
        if session.mode == mode {
            return;
        }
        debug!("오디오 모드: {} → {}", session.mode, mode);
        session.mode = mode.clone();
        *self.mode.write() = mode.clone();
        self.bus.publish(SessionEvent::AudioModeChanged(mode));
    }

    fn reject(&self, context: &str, error: CoreError) -> CoreError {
        warn!("{}: {}", context, error);
        self.indicator.raise(format!("{context}: {error}"));
        error
    }
}

/// 업링크 종료 통지 대기. 관리자가 직접 닫으면 신호가 drop되어 그냥 끝난다
async fn watch_uplink(shared: Arc<Shared>, generation: u64, ended: oneshot::Receiver<String>) {
    if let Ok(reason) = ended.await {
        shared.end_uplink(generation, &reason).await;
    }
}
