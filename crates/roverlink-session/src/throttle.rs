//! 조종 명령 스로틀.
//!
//! 원시 2축 입력 스트림을 제어 채널 송신 스트림으로 변환한다.
//! 전용 태스크 하나가 송신 상태(`ThrottleState`)를 단독 소유한다.
//!
//! - `latest_on_timer`: 최신 입력만 기억하고 고정 주기로 무조건 송신
//! - `debounced_on_change`: 최소 간격과 변화량 임계값을 모두 넘을 때 즉시 송신,
//!   간격 때문에만 막힌 입력은 간격이 끝나는 시점에 한 번 뒤따라 송신
//!
//! 릴리즈(포인터 업, 터치 종료, 포커스 상실)는 모든 모드에서 정지 벡터 송신을
//! 예약한다. 디바운스 창 안의 연속 릴리즈는 한 번의 정지로 합쳐진다.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use roverlink_core::config::{ThrottleConfig, ThrottleMode};
use roverlink_core::models::control::ControlVector;
use roverlink_core::models::message::ChannelMessage;
use roverlink_core::ports::control_channel::ControlChannel;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// 스로틀 입력
#[derive(Debug)]
enum ThrottleInput {
    Raw(ControlVector),
    Release,
    Shutdown(oneshot::Sender<()>),
}

/// 마지막 송신 상태 (송신 성공 시에만 갱신)
#[derive(Debug, Clone, Copy, Default)]
struct ThrottleState {
    last_sent_at: Option<Instant>,
    last_sent: Option<ControlVector>,
}

/// 조종 명령 스로틀 핸들
pub struct CommandThrottle {
    mode: ThrottleMode,
    tx: mpsc::UnboundedSender<ThrottleInput>,
    last_sent: watch::Receiver<Option<ControlVector>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl CommandThrottle {
    /// 스로틀 태스크 시작
    pub fn spawn(config: &ThrottleConfig, channel: Arc<dyn ControlChannel>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (sent_tx, sent_rx) = watch::channel(None);

        info!(
            "명령 스로틀 시작: mode={}, tick={}ms, min_interval={}ms, threshold={}, release_debounce={}ms",
            config.mode,
            config.tick_interval_ms,
            config.min_interval_ms,
            config.change_threshold,
            config.release_debounce_ms
        );

        let actor = ThrottleActor {
            mode: config.mode,
            tick: Duration::from_millis(config.tick_interval_ms.max(1)),
            min_interval: Duration::from_millis(config.min_interval_ms),
            threshold: config.change_threshold,
            release_debounce: Duration::from_millis(config.release_debounce_ms),
            channel,
            state: ThrottleState::default(),
            sent_tx,
            latest: None,
            held: None,
            timer_engaged: false,
            trailing_at: None,
            stop_at: None,
        };
        let task = tokio::spawn(actor.run(rx));

        Self {
            mode: config.mode,
            tx,
            last_sent: sent_rx,
            task: Mutex::new(Some(task)),
        }
    }

    /// 현재 송신 전략
    pub fn mode(&self) -> ThrottleMode {
        self.mode
    }

    /// 원시 입력 전달
    pub fn update(&self, vector: ControlVector) {
        if self.tx.send(ThrottleInput::Raw(vector)).is_err() {
            debug!("스로틀 종료됨, 입력 무시");
        }
    }

    /// 릴리즈 이벤트 전달
    pub fn release(&self) {
        if self.tx.send(ThrottleInput::Release).is_err() {
            debug!("스로틀 종료됨, 릴리즈 무시");
        }
    }

    /// 마지막으로 송신에 성공한 벡터
    pub fn last_sent(&self) -> Option<ControlVector> {
        *self.last_sent.borrow()
    }

    /// 최종 정지 명령을 보내고 태스크 종료 (여러 번 호출해도 안전)
    pub async fn shutdown(&self) {
        let Some(task) = self.task.lock().take() else {
            return;
        };
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(ThrottleInput::Shutdown(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
        let _ = task.await;
        info!("명령 스로틀 종료");
    }
}

impl Drop for CommandThrottle {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}

struct ThrottleActor {
    mode: ThrottleMode,
    tick: Duration,
    min_interval: Duration,
    threshold: f32,
    release_debounce: Duration,
    channel: Arc<dyn ControlChannel>,
    state: ThrottleState,
    sent_tx: watch::Sender<Option<ControlVector>>,
    /// 가장 최근 원시 입력
    latest: Option<ControlVector>,
    /// 정지 예약 중 도착한 입력 (정지 송신 뒤 처리)
    held: Option<ControlVector>,
    /// `latest_on_timer` 타이머 동작 여부
    timer_engaged: bool,
    /// `debounced_on_change` 후행 송신 시각
    trailing_at: Option<Instant>,
    /// 예약된 정지 송신 시각
    stop_at: Option<Instant>,
}

impl ThrottleActor {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<ThrottleInput>) {
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                // 정지 예약이 입력 처리에 밀리지 않도록 가장 먼저 확인
                biased;

                _ = tokio::time::sleep_until(deadline(self.stop_at)), if self.stop_at.is_some() => {
                    self.fire_stop(&mut ticker).await;
                }

                input = rx.recv() => match input {
                    Some(ThrottleInput::Raw(vector)) => self.on_raw(vector, &mut ticker).await,
                    Some(ThrottleInput::Release) => self.on_release(),
                    Some(ThrottleInput::Shutdown(ack)) => {
                        self.final_stop().await;
                        let _ = ack.send(());
                        break;
                    }
                    None => {
                        self.final_stop().await;
                        break;
                    }
                },

                _ = tokio::time::sleep_until(deadline(self.trailing_at)), if self.trailing_at.is_some() => {
                    self.fire_trailing().await;
                }

                _ = ticker.tick(), if self.timer_engaged && self.stop_at.is_none() => {
                    if let Some(vector) = self.latest {
                        self.send(vector).await;
                    }
                }
            }
        }
    }

    async fn on_raw(&mut self, vector: ControlVector, ticker: &mut tokio::time::Interval) {
        if self.stop_at.is_some() {
            // 정지가 먼저 나가야 한다
            self.held = Some(vector);
            return;
        }
        self.latest = Some(vector);

        if vector.is_stop() {
            self.trailing_at = None;
            if self.state.last_sent == Some(ControlVector::STOP) {
                return;
            }
            // 정지 벡터는 간격 제한을 받지 않는다
            self.send(vector).await;
            return;
        }

        match self.mode {
            ThrottleMode::LatestOnTimer => {
                if !self.timer_engaged {
                    self.timer_engaged = true;
                    ticker.reset();
                    debug!("송신 타이머 시작");
                }
            }
            ThrottleMode::DebouncedOnChange => {
                if !self.exceeds_threshold(&vector) {
                    self.trailing_at = None;
                    return;
                }
                match self.next_allowed_at() {
                    Some(at) if at > Instant::now() => {
                        if self.trailing_at.is_none() {
                            self.trailing_at = Some(at);
                        }
                    }
                    _ => {
                        self.trailing_at = None;
                        self.send(vector).await;
                    }
                }
            }
        }
    }

    fn on_release(&mut self) {
        self.trailing_at = None;
        self.timer_engaged = false;
        self.latest = None;
        self.held = None;
        // 마지막 릴리즈 기준으로 다시 예약
        self.stop_at = Some(Instant::now() + self.release_debounce);
    }

    async fn fire_stop(&mut self, ticker: &mut tokio::time::Interval) {
        self.stop_at = None;
        self.send_stop().await;

        if let Some(vector) = self.held.take() {
            debug!("정지 이후 보류 입력 처리: {:?}", vector);
            self.on_raw(vector, ticker).await;
        }
    }

    async fn fire_trailing(&mut self) {
        self.trailing_at = None;
        if let Some(vector) = self.latest {
            if !vector.is_stop() && self.exceeds_threshold(&vector) {
                self.send(vector).await;
            }
        }
    }

    async fn final_stop(&mut self) {
        self.stop_at = None;
        self.trailing_at = None;
        self.timer_engaged = false;
        self.send_stop().await;
    }

    /// 정지 송신. 실패하면 한 번 재시도
    async fn send_stop(&mut self) {
        if self.send(ControlVector::STOP).await {
            return;
        }
        warn!("정지 명령 송신 실패, 재시도");
        if !self.send(ControlVector::STOP).await {
            warn!("정지 명령 재시도 실패");
        }
    }

    async fn send(&mut self, vector: ControlVector) -> bool {
        match self.channel.send(ChannelMessage::Control(vector)).await {
            Ok(()) => {
                self.state.last_sent_at = Some(Instant::now());
                self.state.last_sent = Some(vector);
                let _ = self.sent_tx.send(Some(vector));
                true
            }
            Err(e) => {
                warn!(
                    "조종 명령 송신 실패 (lx={}, ly={}): {}",
                    vector.lx, vector.ly, e
                );
                false
            }
        }
    }

    fn exceeds_threshold(&self, vector: &ControlVector) -> bool {
        match self.state.last_sent {
            Some(last) => vector.max_axis_delta(&last) > self.threshold,
            None => true,
        }
    }

    fn next_allowed_at(&self) -> Option<Instant> {
        self.state.last_sent_at.map(|at| at + self.min_interval)
    }
}

fn deadline(at: Option<Instant>) -> Instant {
    at.unwrap_or_else(|| Instant::now() + Duration::from_secs(3600))
}
