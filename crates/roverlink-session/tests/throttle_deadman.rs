//! 명령 스로틀 통합 테스트: 데드맨 정지, 송신 간격, 변화량 억제.

mod common;

use std::time::Duration;

use common::RecordingChannel;
use roverlink_core::config::{ThrottleConfig, ThrottleMode};
use roverlink_core::models::control::ControlVector;
use roverlink_session::throttle::CommandThrottle;
use tokio::time::sleep;

fn config(mode: ThrottleMode) -> ThrottleConfig {
    ThrottleConfig {
        mode,
        ..ThrottleConfig::default()
    }
}

fn v(lx: f32, ly: f32) -> ControlVector {
    ControlVector::new(lx, ly)
}

#[tokio::test(start_paused = true)]
async fn release_always_ends_with_stop_in_both_modes() {
    for mode in [ThrottleMode::LatestOnTimer, ThrottleMode::DebouncedOnChange] {
        let channel = RecordingChannel::new();
        let throttle = CommandThrottle::spawn(&config(mode), channel.clone());

        for step in 0..20 {
            let x = (step as f32) / 20.0;
            throttle.update(v(x, 1.0 - x));
            sleep(Duration::from_millis(17)).await;
        }
        throttle.release();
        let released_at = tokio::time::Instant::now();
        sleep(Duration::from_millis(400)).await;

        let sent = channel.controls();
        let (last_at, last) = *sent.last().expect("송신 없음");
        assert_eq!(last, ControlVector::STOP, "mode={mode}");
        // 디바운스 창 안에서 정지
        assert!(last_at - released_at <= Duration::from_millis(100), "mode={mode}");
        // 정지는 정확히 한 번
        assert_eq!(
            sent.iter().filter(|(_, v)| v.is_stop()).count(),
            1,
            "mode={mode}"
        );
    }
}

#[tokio::test(start_paused = true)]
async fn non_stop_sends_respect_min_interval() {
    let channel = RecordingChannel::new();
    let throttle = CommandThrottle::spawn(&config(ThrottleMode::DebouncedOnChange), channel.clone());

    // 5ms마다 크게 바뀌는 입력
    for step in 0..100 {
        let x = if step % 2 == 0 { 0.8 } else { -0.8 };
        throttle.update(v(x, (step as f32) / 100.0));
        sleep(Duration::from_millis(5)).await;
    }
    throttle.release();
    sleep(Duration::from_millis(200)).await;

    let moves: Vec<_> = channel
        .controls()
        .into_iter()
        .filter(|(_, v)| !v.is_stop())
        .collect();
    assert!(moves.len() >= 5);
    for pair in moves.windows(2) {
        assert!(
            pair[1].0 - pair[0].0 >= Duration::from_millis(50),
            "간격 위반: {:?}",
            pair[1].0 - pair[0].0
        );
    }
}

#[tokio::test(start_paused = true)]
async fn timer_mode_sends_at_tick_rate() {
    let channel = RecordingChannel::new();
    let throttle = CommandThrottle::spawn(&config(ThrottleMode::LatestOnTimer), channel.clone());

    for step in 0..100 {
        throttle.update(v((step as f32) / 100.0, 0.5));
        sleep(Duration::from_millis(3)).await;
    }
    sleep(Duration::from_millis(50)).await;

    let sent = channel.controls();
    // 350ms 동안 100ms 주기 → 3회
    assert_eq!(sent.len(), 3);
    for pair in sent.windows(2) {
        assert_eq!(pair[1].0 - pair[0].0, Duration::from_millis(100));
    }
}

#[tokio::test(start_paused = true)]
async fn sub_threshold_changes_are_not_sent() {
    let channel = RecordingChannel::new();
    let throttle = CommandThrottle::spawn(&config(ThrottleMode::DebouncedOnChange), channel.clone());

    throttle.update(v(0.3, -0.3));
    sleep(Duration::from_millis(70)).await;
    for _ in 0..10 {
        throttle.update(v(0.304, -0.296));
        sleep(Duration::from_millis(70)).await;
    }

    assert_eq!(channel.vectors(), vec![v(0.3, -0.3)]);
}

#[tokio::test(start_paused = true)]
async fn duplicate_input_then_release_sends_one_move_and_one_stop() {
    let channel = RecordingChannel::new();
    let throttle = CommandThrottle::spawn(&config(ThrottleMode::DebouncedOnChange), channel.clone());

    throttle.update(v(0.5, 0.5));
    sleep(Duration::from_millis(40)).await;
    throttle.update(v(0.5, 0.5));
    sleep(Duration::from_millis(40)).await;
    throttle.release();
    sleep(Duration::from_millis(150)).await;

    assert_eq!(channel.vectors(), vec![v(0.5, 0.5), ControlVector::STOP]);
}

#[tokio::test(start_paused = true)]
async fn send_failure_is_recovered_by_next_tick() {
    let channel = RecordingChannel::new();
    let throttle = CommandThrottle::spawn(&config(ThrottleMode::LatestOnTimer), channel.clone());

    channel.fail_next.store(1, std::sync::atomic::Ordering::SeqCst);
    throttle.update(v(0.6, 0.0));
    sleep(Duration::from_millis(250)).await;

    // 첫 tick 실패, 다음 tick에서 전달
    assert_eq!(channel.vectors(), vec![v(0.6, 0.0)]);
    assert_eq!(throttle.last_sent(), Some(v(0.6, 0.0)));
}

#[tokio::test(start_paused = true)]
async fn stop_fires_on_time_under_input_flood() {
    let channel = RecordingChannel::new();
    let cfg = config(ThrottleMode::DebouncedOnChange);
    let throttle = CommandThrottle::spawn(&cfg, channel.clone());

    throttle.update(v(0.7, 0.7));
    sleep(Duration::from_millis(10)).await;
    throttle.release();
    let released_at = tokio::time::Instant::now();
    sleep(Duration::from_millis(1)).await;

    // 정지 예약 중 쏟아지는 입력
    for step in 0..5_000 {
        throttle.update(v(0.1 + (step % 7) as f32 / 10.0, 0.2));
    }
    sleep(Duration::from_millis(cfg.release_debounce_ms) + Duration::from_millis(5)).await;

    let sent = channel.controls();
    let stop = sent
        .iter()
        .position(|(_, v)| v.is_stop())
        .expect("정지 송신 없음");
    assert_eq!(stop, 1, "정지보다 먼저 나간 입력: {sent:?}");
    assert!(sent[stop].0 - released_at <= Duration::from_millis(cfg.release_debounce_ms));
}
