//! 제어 채널 연결 상태 관리.
//!
//! 연결/끊김/재연결 상태를 추적하고 재연결 대기 시간(지수 백오프)을 계산한다.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use roverlink_core::models::message::ConnectionStatus;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// 첫 재연결 대기 (초)
const INITIAL_BACKOFF_SECS: u64 = 1;

/// 연결 상태 관리자
pub struct ConnectivityManager {
    /// 연속 실패 횟수
    failure_count: AtomicU64,
    /// 마지막 연결 성공 시각 (Unix timestamp)
    last_success: AtomicU64,
    /// 재연결 최대 대기 (초)
    max_backoff_secs: u64,
    status_tx: watch::Sender<ConnectionStatus>,
}

impl ConnectivityManager {
    /// 새 관리자 생성 (초기 상태 `Disconnected`)
    pub fn new(max_backoff_secs: u64) -> Self {
        let (status_tx, _) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            failure_count: AtomicU64::new(0),
            last_success: AtomicU64::new(0),
            max_backoff_secs: max_backoff_secs.max(INITIAL_BACKOFF_SECS),
            status_tx,
        }
    }

    /// 현재 연결 상태
    pub fn status(&self) -> ConnectionStatus {
        *self.status_tx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    /// 상태 변경 수신기
    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_tx.subscribe()
    }

    /// 연결 성공 기록: 실패 카운터 리셋
    pub fn record_success(&self) {
        let previous = self.failure_count.swap(0, Ordering::Relaxed);
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        self.last_success.store(now, Ordering::Relaxed);

        if previous > 0 {
            info!("제어 채널 복구됨 ({}회 실패 후)", previous);
        } else {
            info!("제어 채널 연결됨");
        }
        self.set(ConnectionStatus::Connected);
    }

    /// 연결 실패/끊김 기록 후 다음 재연결까지 대기 시간 반환
    pub fn record_failure(&self) -> Duration {
        let count = self.failure_count.fetch_add(1, Ordering::Relaxed) + 1;
        let delay = self.backoff_for(count);
        warn!("제어 채널 끊김 (연속 {}회), {:?} 후 재연결", count, delay);
        self.set(ConnectionStatus::Reconnecting);
        delay
    }

    /// 명시적 종료
    pub fn record_closed(&self) {
        debug!("제어 채널 종료");
        self.set(ConnectionStatus::Disconnected);
    }

    /// 연속 실패 횟수
    pub fn failure_count(&self) -> u64 {
        self.failure_count.load(Ordering::Relaxed)
    }

    /// 마지막 연결 성공 이후 경과 시간
    pub fn time_since_last_success(&self) -> Duration {
        let last = self.last_success.load(Ordering::Relaxed);
        if last == 0 {
            return Duration::ZERO;
        }
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        Duration::from_secs(now.saturating_sub(last))
    }

    /// n번째 연속 실패의 대기 시간: 1s → 2s → 4s … → 최대값
    fn backoff_for(&self, failures: u64) -> Duration {
        let exponent = failures.saturating_sub(1).min(16) as u32;
        let secs = INITIAL_BACKOFF_SECS
            .saturating_mul(2u64.saturating_pow(exponent))
            .min(self.max_backoff_secs);
        Duration::from_secs(secs)
    }

    fn set(&self, status: ConnectionStatus) {
        self.status_tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }
}

/// Arc로 감싼 ConnectivityManager
pub type SharedConnectivityManager = Arc<ConnectivityManager>;
