//! 일시적 에러 표시.
//!
//! 마지막으로 올린 에러만 유효하다. 일정 시간 뒤 스스로 해제되며,
//! 그 사이 새 에러가 올라오면 이전 해제 타이머는 무시된다.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use crate::event_bus::{EventBus, SessionEvent};

#[derive(Debug, Default)]
struct IndicatorState {
    generation: u64,
    message: Option<String>,
}

/// 자동 해제 에러 표시기
#[derive(Debug)]
pub struct ErrorIndicator {
    state: Arc<Mutex<IndicatorState>>,
    clear_after: Duration,
    bus: Arc<EventBus>,
}

impl ErrorIndicator {
    pub fn new(clear_after: Duration, bus: Arc<EventBus>) -> Self {
        Self {
            state: Arc::new(Mutex::new(IndicatorState::default())),
            clear_after,
            bus,
        }
    }

    /// 에러 표시. `clear_after` 뒤 자동 해제
    pub fn raise(&self, message: impl Into<String>) {
        let message = message.into();
        let generation = {
            let mut state = self.state.lock();
            state.generation += 1;
            state.message = Some(message.clone());
            state.generation
        };
        self.bus.publish(SessionEvent::ErrorRaised(message));

        let state = self.state.clone();
        let bus = self.bus.clone();
        let clear_after = self.clear_after;
        tokio::spawn(async move {
            tokio::time::sleep(clear_after).await;
            let cleared = {
                let mut state = state.lock();
                if state.generation == generation {
                    state.message = None;
                    true
                } else {
                    false
                }
            };
            if cleared {
                debug!("에러 표시 자동 해제");
                bus.publish(SessionEvent::ErrorCleared);
            }
        });
    }

    /// 현재 표시 중인 에러
    pub fn current(&self) -> Option<String> {
        self.state.lock().message.clone()
    }
}
