//! 텔레메트리 폴러.
//!
//! 고정 주기로 차량 시스템 상태를 가져와 최신 샘플을 교체·발행한다.
//! 재시도나 백오프 없이 실패는 기록만 한다.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use roverlink_core::models::telemetry::TelemetrySample;
use roverlink_core::ports::telemetry::TelemetrySource;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::event_bus::{EventBus, SessionEvent};

/// 텔레메트리 폴러
pub struct TelemetryPoller {
    source: Arc<dyn TelemetrySource>,
    bus: Arc<EventBus>,
    interval: Duration,
    latest: Arc<RwLock<Option<TelemetrySample>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl TelemetryPoller {
    pub fn new(source: Arc<dyn TelemetrySource>, bus: Arc<EventBus>, interval: Duration) -> Self {
        Self {
            source,
            bus,
            interval,
            latest: Arc::new(RwLock::new(None)),
            task: Mutex::new(None),
        }
    }

    /// 폴링 시작 (이미 동작 중이면 무시)
    pub fn start(&self) {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            debug!("텔레메트리 폴링 이미 동작 중");
            return;
        }

        let source = self.source.clone();
        let bus = self.bus.clone();
        let latest = self.latest.clone();
        let period = self.interval;

        info!("텔레메트리 폴링 시작 ({}ms 주기)", period.as_millis());
        *task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match source.fetch().await {
                    Ok(sample) => {
                        *latest.write() = Some(sample.clone());
                        bus.publish(SessionEvent::Telemetry(sample));
                    }
                    Err(e) => warn!("시스템 상태 조회 실패: {}", e),
                }
            }
        }));
    }

    /// 폴링 중지 (동작 중이 아니면 무시)
    pub fn stop(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
            info!("텔레메트리 폴링 중지");
        }
    }

    /// 폴링 동작 여부
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|t| !t.is_finished())
    }

    /// 최신 샘플
    pub fn latest(&self) -> Option<TelemetrySample> {
        self.latest.read().clone()
    }
}

impl Drop for TelemetryPoller {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}
