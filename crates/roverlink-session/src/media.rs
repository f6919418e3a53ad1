//! 영상 협상 상태 머신.
//!
//! `Idle → Negotiating → Connected → {Disconnected, Failed, Closed} → Idle`.
//! 살아 있는 세션은 최대 하나이며, 세션마다 세대 번호를 붙여
//! 대체된 세션의 늦은 신호를 걸러낸다. 잠금은 네트워크 대기 동안 잡지 않고,
//! 대기가 끝날 때마다 세대를 다시 확인한다.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use roverlink_core::error::CoreError;
use roverlink_core::models::media::{EndpointSpec, LinkState, MediaState, TrackKind};
use roverlink_core::ports::media::{
    EndpointEvent, MediaEndpoint, MediaEndpointFactory, SignalingClient, VideoSink,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::event_bus::{EventBus, SessionEvent};
use crate::indicator::ErrorIndicator;

/// 살아 있는 영상 세션
struct MediaSession {
    generation: u64,
    endpoint: Arc<dyn MediaEndpoint>,
    pump: JoinHandle<()>,
}

#[derive(Default)]
struct NegotiatorInner {
    state: MediaState,
    generation: u64,
    session: Option<MediaSession>,
}

/// 영상 협상 상태 머신
pub struct MediaNegotiator {
    factory: Arc<dyn MediaEndpointFactory>,
    signaling: Arc<dyn SignalingClient>,
    sink: Arc<dyn VideoSink>,
    bus: Arc<EventBus>,
    indicator: Arc<ErrorIndicator>,
    inner: Mutex<NegotiatorInner>,
}

impl MediaNegotiator {
    pub fn new(
        factory: Arc<dyn MediaEndpointFactory>,
        signaling: Arc<dyn SignalingClient>,
        sink: Arc<dyn VideoSink>,
        bus: Arc<EventBus>,
        indicator: Arc<ErrorIndicator>,
    ) -> Arc<Self> {
        Arc::new(Self {
            factory,
            signaling,
            sink,
            bus,
            indicator,
            inner: Mutex::new(NegotiatorInner::default()),
        })
    }

    /// 현재 상태
    pub fn state(&self) -> MediaState {
        self.inner.lock().state
    }

    /// 협상 시작
    ///
    /// `Idle`이 아니면 아무것도 하지 않는다. 협상 실패 시 `Failed`를 거쳐
    /// `Idle`로 돌아가고 에러를 반환한다. `Connected`는 엔드포인트의
    /// 연결 상태 신호로 전이된다.
    pub async fn start(self: &Arc<Self>) -> Result<(), CoreError> {
        let generation = {
            let mut inner = self.inner.lock();
            if inner.state != MediaState::Idle {
                debug!("영상 세션 이미 진행 중 ({}), 시작 요청 무시", inner.state);
                return Ok(());
            }
            inner.generation += 1;
            inner.state = MediaState::Negotiating;
            inner.generation
        };
        info!("영상 협상 시작 (세대 {})", generation);
        self.bus
            .publish(SessionEvent::MediaStateChanged(MediaState::Negotiating));

        // 1~2. 엔드포인트 생성 + 관찰자 등록 (네트워크 교환 전)
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let endpoint = match self
            .factory
            .create(EndpointSpec::VIDEO_RECEIVER, events_tx)
            .await
        {
            Ok(endpoint) => endpoint,
            Err(e) => return self.fail(generation, e).await,
        };

        let superseded = {
            let mut inner = self.inner.lock();
            if inner.generation != generation {
                true
            } else {
                let pump = tokio::spawn(self.clone().pump(generation, events_rx));
                inner.session = Some(MediaSession {
                    generation,
                    endpoint: endpoint.clone(),
                    pump,
                });
                false
            }
        };
        if superseded {
            debug!("협상 중 세션 대체됨, 새 엔드포인트 폐기");
            let _ = endpoint.close().await;
            return Ok(());
        }

        // 3. offer 생성 → 전송
        let offer = match endpoint.create_offer().await {
            Ok(offer) => offer,
            Err(e) => return self.fail(generation, e).await,
        };
        if !self.is_current(generation) {
            return Ok(());
        }
        debug!("로컬 offer 생성 ({}바이트)", offer.sdp.len());

        let answer = match self.signaling.exchange(&offer).await {
            Ok(answer) => answer,
            Err(e) => return self.fail(generation, e).await,
        };
        if let Err(e) = answer.validate() {
            return self.fail(generation, e).await;
        }
        if !self.is_current(generation) {
            return Ok(());
        }

        // 4. answer 적용
        if let Err(e) = endpoint.apply_remote(answer).await {
            return self.fail(generation, e).await;
        }
        info!("원격 answer 적용 완료, 연결 대기");
        Ok(())
    }

    /// 세션 종료 (어느 상태에서든 안전, 여러 번 호출해도 안전)
    pub async fn stop(&self) {
        self.teardown(None, true).await;
    }

    /// 지연 후 자동 시작
    pub fn schedule_autostart(self: &Arc<Self>, delay: Duration) -> JoinHandle<()> {
        let negotiator = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = negotiator.start().await {
                warn!("영상 자동 시작 실패: {}", e);
            }
        })
    }

    fn is_current(&self, generation: u64) -> bool {
        self.inner.lock().generation == generation
    }

    async fn fail(&self, generation: u64, error: CoreError) -> Result<(), CoreError> {
        let current = {
            let mut inner = self.inner.lock();
            if inner.generation == generation {
                inner.state = MediaState::Failed;
                true
            } else {
                false
            }
        };
        if current {
            warn!("영상 협상 실패: {}", error);
            self.bus
                .publish(SessionEvent::MediaStateChanged(MediaState::Failed));
            self.indicator.raise(format!("영상 연결 실패: {error}"));
            self.teardown(Some(generation), true).await;
        } else {
            debug!("대체된 세션의 협상 실패 무시: {}", error);
        }
        Err(error)
    }

    /// 핸들 종료 → 싱크 해제 → 핸들 폐기 → `Idle` 발행
    ///
    /// `generation`이 주어지면 그 세대가 현재일 때만 수행한다.
    async fn teardown(&self, generation: Option<u64>, abort_pump: bool) {
        let session = {
            let mut inner = self.inner.lock();
            if let Some(generation) = generation {
                if inner.generation != generation {
                    return;
                }
            }
            if inner.session.is_none() && inner.state == MediaState::Idle {
                return;
            }
            // 진행 중인 start()가 이후 단계를 건너뛰도록 세대를 넘긴다
            inner.generation += 1;
            inner.state = MediaState::Idle;
            inner.session.take()
        };

        if let Some(session) = session {
            debug!("영상 세션 정리 (세대 {})", session.generation);
            if abort_pump {
                session.pump.abort();
            }
            if let Err(e) = session.endpoint.close().await {
                warn!("엔드포인트 종료 실패: {}", e);
            }
        }
        self.sink.clear().await;
        info!("영상 세션 종료 → Idle");
        self.bus
            .publish(SessionEvent::MediaStateChanged(MediaState::Idle));
    }

    async fn pump(
        self: Arc<Self>,
        generation: u64,
        mut events: mpsc::UnboundedReceiver<EndpointEvent>,
    ) {
        while let Some(event) = events.recv().await {
            if !self.is_current(generation) {
                debug!("대체된 세션 신호 무시: {:?}", event);
                break;
            }
            match event {
                EndpointEvent::TrackArrived(track) => {
                    if track.kind() != TrackKind::Video {
                        debug!("영상 외 트랙 무시: {}", track.id());
                        continue;
                    }
                    info!("영상 트랙 수신: {}", track.id());
                    if let Err(e) = self.sink.attach(track).await {
                        warn!("영상 싱크 연결 실패: {}", e);
                    }
                }
                EndpointEvent::StateChanged(link) => {
                    if self.on_link_state(generation, link).await {
                        break;
                    }
                }
            }
        }
    }

    /// 연결 상태 반영. 세션이 끝났으면 true
    async fn on_link_state(&self, generation: u64, link: LinkState) -> bool {
        let Some(next) = Option::<MediaState>::from(link) else {
            debug!("연결 상태: {:?}", link);
            return false;
        };
        {
            let mut inner = self.inner.lock();
            if inner.generation != generation || inner.state == next {
                return false;
            }
            inner.state = next;
        }
        info!("영상 세션 상태: {}", next);
        self.bus.publish(SessionEvent::MediaStateChanged(next));

        if link.is_terminal() {
            self.teardown(Some(generation), false).await;
            return true;
        }
        false
    }
}
