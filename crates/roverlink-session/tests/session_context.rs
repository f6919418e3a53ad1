//! 세션 컨텍스트 배선 테스트.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::{
    CountingTelemetry, EndpointScript, FakeCapture, FakeRecorder, RecordingChannel,
    RecordingSink, ScriptedAudioApi, ScriptedFactory, ScriptedSignaling,
};
use roverlink_core::config::{AppConfig, UplinkMode};
use roverlink_core::models::audio::AudioMode;
use roverlink_core::models::control::ControlVector;
use roverlink_core::models::media::MediaState;
use roverlink_core::models::message::{ConnectionStatus, InboundMessage, MicrophoneState};
use roverlink_session::{SessionEvent, SessionPorts, StartOptions, TeleopSession};
use tokio::sync::broadcast;
use tokio::time::sleep;

struct Fixture {
    channel: Arc<RecordingChannel>,
    factory: Arc<ScriptedFactory>,
    api: Arc<ScriptedAudioApi>,
    telemetry: Arc<CountingTelemetry>,
}

fn fixture() -> (Fixture, SessionPorts) {
    let channel = RecordingChannel::new();
    let factory = ScriptedFactory::new(EndpointScript::default());
    let api = Arc::new(ScriptedAudioApi::default());
    let telemetry = CountingTelemetry::new(0);
    let ports = SessionPorts {
        channel: channel.clone(),
        endpoints: factory.clone(),
        signaling: ScriptedSignaling::answering(),
        video_sink: Arc::new(RecordingSink::default()),
        audio_api: api.clone(),
        capture: FakeCapture::new(0),
        recorder: FakeRecorder::supporting(&["audio/wav"]),
        telemetry: telemetry.clone(),
    };
    (
        Fixture {
            channel,
            factory,
            api,
            telemetry,
        },
        ports,
    )
}

fn drain(events: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    std::iter::from_fn(|| events.try_recv().ok()).collect()
}

#[tokio::test(start_paused = true)]
async fn start_schedules_video_and_telemetry() {
    let (fx, ports) = fixture();
    let session = TeleopSession::new(AppConfig::default_config(), ports);
    let mut events = session.subscribe();

    session.start(StartOptions::default());
    sleep(Duration::from_millis(100)).await;
    assert_eq!(fx.factory.count(), 0);
    assert_eq!(fx.telemetry.calls.load(Ordering::SeqCst), 1);

    sleep(Duration::from_millis(500)).await;
    assert_eq!(session.media().state(), MediaState::Connected);
    assert!(session.is_control_connected());

    let events = drain(&mut events);
    assert!(events
        .iter()
        .any(|e| matches!(e, SessionEvent::ControlLink(ConnectionStatus::Connected))));
    assert!(events.iter().any(|e| matches!(e, SessionEvent::Telemetry(_))));

    session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn start_options_can_disable_video_and_telemetry() {
    let (fx, ports) = fixture();
    let session = TeleopSession::new(AppConfig::default_config(), ports);

    session.start(StartOptions {
        video: false,
        telemetry: false,
    });
    sleep(Duration::from_secs(5)).await;

    assert_eq!(fx.factory.count(), 0);
    assert_eq!(fx.telemetry.calls.load(Ordering::SeqCst), 0);
    assert_eq!(session.media().state(), MediaState::Idle);
    assert!(!session.telemetry().is_running());
}

#[tokio::test]
async fn inbound_messages_and_link_changes_reach_subscribers() {
    let (fx, ports) = fixture();
    let session = TeleopSession::new(AppConfig::default_config(), ports);
    let mut events = session.subscribe();
    session.start(StartOptions {
        video: false,
        telemetry: false,
    });
    sleep(Duration::from_millis(10)).await;

    fx.channel.push_inbound(InboundMessage::Ack { ls: 0.4, rs: -0.4 });
    fx.channel.set_status(ConnectionStatus::Reconnecting);
    sleep(Duration::from_millis(10)).await;

    let events = drain(&mut events);
    assert!(events.iter().any(|e| matches!(
        e,
        SessionEvent::Inbound(InboundMessage::Ack { ls, .. }) if (*ls - 0.4).abs() < f64::EPSILON
    )));
    assert!(events
        .iter()
        .any(|e| matches!(e, SessionEvent::ControlLink(ConnectionStatus::Reconnecting))));
    assert!(!session.is_control_connected());

    session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn shutdown_sends_final_stop_and_releases_everything() {
    let (fx, ports) = fixture();
    let session = TeleopSession::new(AppConfig::default_config(), ports);
    session.start(StartOptions::default());
    sleep(Duration::from_millis(600)).await;

    session.throttle().update(ControlVector::new(0.7, 0.2));
    session.audio().start_mic().await.unwrap();
    sleep(Duration::from_millis(150)).await;

    session.shutdown().await;

    assert_eq!(fx.channel.vectors().last(), Some(&ControlVector::STOP));
    assert_eq!(session.media().state(), MediaState::Idle);
    assert_eq!(session.audio().status(), AudioMode::Idle);
    assert!(!session.telemetry().is_running());
    assert_eq!(fx.api.calls().last().map(String::as_str), Some("microphone_stop"));
}

#[tokio::test]
async fn chunked_uplink_mode_uses_control_channel() {
    let (fx, ports) = fixture();
    let mut config = AppConfig::default_config();
    config.audio.uplink = UplinkMode::Chunked;
    let session = TeleopSession::new(config, ports);

    session.audio().start_mic().await.unwrap();
    session.audio().stop_mic().await.unwrap();

    assert_eq!(fx.channel.events(), vec!["start_microphone", "stop_microphone"]);
    assert!(fx.api.calls().is_empty());
}

#[tokio::test]
async fn vehicle_microphone_stop_reaches_audio_manager() {
    let (fx, ports) = fixture();
    let mut config = AppConfig::default_config();
    config.audio.uplink = UplinkMode::Chunked;
    let session = TeleopSession::new(config, ports);
    session.start(StartOptions {
        video: false,
        telemetry: false,
    });
    sleep(Duration::from_millis(10)).await;

    session.audio().start_mic().await.unwrap();
    fx.channel
        .push_inbound(InboundMessage::MicrophoneStatus(MicrophoneState::Started));
    sleep(Duration::from_millis(10)).await;
    fx.channel
        .push_inbound(InboundMessage::MicrophoneStatus(MicrophoneState::Stopped));
    sleep(Duration::from_millis(50)).await;

    assert_eq!(session.audio().status(), AudioMode::Idle);
    assert!(session.indicator().current().is_some());
    assert!(fx.channel.events().contains(&"stop_microphone"));
}
