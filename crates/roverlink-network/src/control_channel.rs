//! Socket.IO 제어 채널.
//!
//! `tokio-tungstenite` WebSocket 위에서 Socket.IO v5 이벤트를 주고받는
//! `ControlChannel` 포트 구현. 감독 태스크가 연결을 유지하며 끊기면
//! 지수 백오프로 재연결한다. 연결이 없을 때의 송신은 즉시 실패한다.
//! 송신은 프레임이 소켓에 쓰인 뒤에 완료되며, 쓰기 전에 연결이 끊기면 에러를 돌려준다.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use roverlink_core::config::AppConfig;
use roverlink_core::error::CoreError;
use roverlink_core::models::message::{ChannelMessage, ConnectionStatus, InboundMessage};
use roverlink_core::ports::control_channel::ControlChannel;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::connectivity::ConnectivityManager;
use crate::socketio::{self, Packet};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// 핸드셰이크 대기 한도
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
/// 서버가 pingInterval을 주지 않을 때 쓰는 기본값 (Socket.IO 서버 기본)
const DEFAULT_PING_WINDOW: Duration = Duration::from_secs(45);

/// 한 연결이 끝난 이유
enum ConnectionEnd {
    /// 종료 요청
    Shutdown,
    /// 원격 종료 또는 전송 에러
    Dropped(String),
}

/// 송신 큐 항목: 인코딩된 프레임과 쓰기 결과 통지
struct Outgoing {
    frame: String,
    done: oneshot::Sender<Result<(), CoreError>>,
}

impl Outgoing {
    fn complete(self, result: Result<(), CoreError>) {
        let _ = self.done.send(result);
    }
}

/// 연결 간 공유 상태
struct Shared {
    url: String,
    connectivity: ConnectivityManager,
    /// 현재 연결의 송신 큐 (연결이 없으면 None)
    outbound: Mutex<Option<mpsc::UnboundedSender<Outgoing>>>,
    inbound_tx: broadcast::Sender<InboundMessage>,
}

/// Socket.IO 제어 채널: `ControlChannel` 포트 구현
pub struct SocketIoChannel {
    shared: Arc<Shared>,
    shutdown_tx: watch::Sender<bool>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl SocketIoChannel {
    /// 감독 태스크를 띄우고 채널 반환 (연결은 백그라운드에서 수립)
    pub fn start(config: &AppConfig) -> Result<Arc<Self>, CoreError> {
        let url = socketio_url(&config.server.base_url, &config.control.socketio_path)?;
        info!("제어 채널 시작: {}", url);

        let (inbound_tx, _) = broadcast::channel(256);
        let shared = Arc::new(Shared {
            url,
            connectivity: ConnectivityManager::new(config.control.reconnect_max_secs),
            outbound: Mutex::new(None),
            inbound_tx,
        });
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let supervisor = tokio::spawn(supervise(shared.clone(), shutdown_rx));

        Ok(Arc::new(Self {
            shared,
            shutdown_tx,
            supervisor: Mutex::new(Some(supervisor)),
        }))
    }

    /// 연결될 때까지 대기 (한도 초과 시 Network 에러)
    pub async fn wait_connected(&self, limit: Duration) -> Result<(), CoreError> {
        let mut status = self.shared.connectivity.subscribe();
        let wait = status.wait_for(|s| *s == ConnectionStatus::Connected);
        let result = match tokio::time::timeout(limit, wait).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(CoreError::Network("제어 채널 종료됨".to_string())),
            Err(_) => Err(CoreError::Network(format!(
                "제어 채널 연결 대기 시간 초과 ({limit:?})"
            ))),
        };
        result
    }

    /// 연결 해제 후 감독 태스크 종료 (여러 번 호출해도 안전)
    pub async fn close(&self) {
        let _ = self.shutdown_tx.send(true);
        let supervisor = self.supervisor.lock().take();
        if let Some(supervisor) = supervisor {
            if let Err(e) = supervisor.await {
                warn!("제어 채널 감독 태스크 비정상 종료: {}", e);
            }
        }
    }
}

impl Drop for SocketIoChannel {
    fn drop(&mut self) {
        if let Some(supervisor) = self.supervisor.get_mut().take() {
            supervisor.abort();
        }
    }
}

#[async_trait]
impl ControlChannel for SocketIoChannel {
    async fn send(&self, message: ChannelMessage) -> Result<(), CoreError> {
        let frame = socketio::encode_event(message.event(), message.payload().as_ref())?;
        let outbound = self.shared.outbound.lock().clone();
        let Some(outbound) = outbound else {
            return Err(CoreError::Network(format!(
                "제어 채널 연결 없음 ({} 전송 불가)",
                message.event()
            )));
        };
        let (done, written) = oneshot::channel();
        outbound
            .send(Outgoing { frame, done })
            .map_err(|_| CoreError::Network(format!("제어 채널 끊김 ({})", message.event())))?;
        // 큐 항목이 완료 없이 버려졌다면 연결이 쓰기 전에 끝난 것
        written.await.map_err(|_| {
            CoreError::Network(format!("전송 전 제어 채널 끊김 ({})", message.event()))
        })?
    }

    fn subscribe(&self) -> broadcast::Receiver<InboundMessage> {
        self.shared.inbound_tx.subscribe()
    }

    fn is_connected(&self) -> bool {
        self.shared.connectivity.is_connected()
    }

    fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.connectivity.subscribe()
    }
}

/// `http://host:port` + 경로 → `ws://host:port/socket.io/?EIO=4&transport=websocket`
pub fn socketio_url(base_url: &str, path: &str) -> Result<String, CoreError> {
    let mut url = url::Url::parse(base_url)
        .map_err(|e| CoreError::Config(format!("잘못된 서버 URL {base_url}: {e}")))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(CoreError::Config(format!(
                "지원하지 않는 스킴: {other}"
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| CoreError::Config(format!("스킴 변경 실패: {base_url}")))?;
    url.set_path(path);
    url.set_query(Some("EIO=4&transport=websocket"));
    Ok(url.to_string())
}

/// 연결 유지 루프
async fn supervise(shared: Arc<Shared>, mut shutdown_rx: watch::Receiver<bool>) {
    loop {
        let end = match connect(&shared).await {
            Ok((ws, ping_window)) => run_connection(&shared, ws, ping_window, &mut shutdown_rx).await,
            Err(e) => ConnectionEnd::Dropped(e.to_string()),
        };
        *shared.outbound.lock() = None;

        match end {
            ConnectionEnd::Shutdown => break,
            ConnectionEnd::Dropped(reason) => {
                debug!("제어 채널 연결 종료: {}", reason);
                let delay = shared.connectivity.record_failure();
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = stopped(&mut shutdown_rx) => break,
                }
            }
        }
        if *shutdown_rx.borrow() {
            break;
        }
    }
    shared.connectivity.record_closed();
    debug!("제어 채널 감독 태스크 종료");
}

/// WebSocket 연결 + Engine.IO open + 네임스페이스 연결
async fn connect(shared: &Shared) -> Result<(WsStream, Duration), CoreError> {
    let (mut ws, _) = tokio_tungstenite::connect_async(shared.url.as_str())
        .await
        .map_err(|e| CoreError::Network(format!("WebSocket 연결 실패: {e}")))?;

    let ping_window = tokio::time::timeout(HANDSHAKE_TIMEOUT, handshake(&mut ws))
        .await
        .map_err(|_| CoreError::Network("핸드셰이크 시간 초과".to_string()))??;
    Ok((ws, ping_window))
}

/// open 패킷을 받고 `40`을 보내 네임스페이스 연결 확인까지 대기. ping 허용 간격 반환
async fn handshake(ws: &mut WsStream) -> Result<Duration, CoreError> {
    let mut ping_window = DEFAULT_PING_WINDOW;
    let mut opened = false;
    while let Some(frame) = ws.next().await {
        let frame = frame.map_err(|e| CoreError::Network(format!("핸드셰이크 수신 실패: {e}")))?;
        let Message::Text(text) = frame else {
            continue;
        };
        match socketio::decode(text.as_str())? {
            Packet::Open(handshake) => {
                debug!("Engine.IO open (sid={})", handshake.sid);
                if handshake.ping_interval > 0 {
                    ping_window =
                        Duration::from_millis(handshake.ping_interval + handshake.ping_timeout);
                }
                opened = true;
                ws.send(Message::Text(socketio::encode_connect().into()))
                    .await
                    .map_err(|e| CoreError::Network(format!("네임스페이스 연결 요청 실패: {e}")))?;
            }
            Packet::Connect if opened => return Ok(ping_window),
            Packet::ConnectError(reason) => {
                return Err(CoreError::Network(format!(
                    "네임스페이스 연결 거부: {reason}"
                )));
            }
            Packet::Ping => {
                ws.send(Message::Text(socketio::encode_pong().into()))
                    .await
                    .map_err(|e| CoreError::Network(format!("pong 전송 실패: {e}")))?;
            }
            other => debug!("핸드셰이크 중 패킷 무시: {:?}", other),
        }
    }
    Err(CoreError::Network("핸드셰이크 중 연결 종료".to_string()))
}

/// 종료 요청 대기 (송신측이 사라져도 종료로 본다)
async fn stopped(shutdown_rx: &mut watch::Receiver<bool>) {
    let _ = shutdown_rx.wait_for(|stop| *stop).await;
}

/// 쓰지 못한 큐 항목을 모두 실패 처리
fn fail_pending(out_rx: &mut mpsc::UnboundedReceiver<Outgoing>, reason: &str) {
    out_rx.close();
    let mut failed = 0usize;
    while let Ok(pending) = out_rx.try_recv() {
        pending.complete(Err(CoreError::Network(format!(
            "전송 전 제어 채널 끊김: {reason}"
        ))));
        failed += 1;
    }
    if failed > 0 {
        warn!("제어 채널 끊김으로 {}개 프레임 전송 실패", failed);
    }
}

/// 연결 하나의 송수신 루프
async fn run_connection(
    shared: &Shared,
    ws: WsStream,
    ping_window: Duration,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> ConnectionEnd {
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Outgoing>();
    *shared.outbound.lock() = Some(out_tx);
    shared.connectivity.record_success();

    let end = drive_connection(shared, ws, ping_window, shutdown_rx, &mut out_rx).await;
    if let ConnectionEnd::Dropped(reason) = &end {
        *shared.outbound.lock() = None;
        fail_pending(&mut out_rx, reason);
    }
    end
}

async fn drive_connection(
    shared: &Shared,
    ws: WsStream,
    ping_window: Duration,
    shutdown_rx: &mut watch::Receiver<bool>,
    out_rx: &mut mpsc::UnboundedReceiver<Outgoing>,
) -> ConnectionEnd {
    let (mut write, mut read) = ws.split();

    let mut deadline = Instant::now() + ping_window;
    loop {
        tokio::select! {
            _ = stopped(shutdown_rx) => {
                *shared.outbound.lock() = None;
                // 남은 송신 (최종 정지 명령 등)을 먼저 내보낸다
                out_rx.close();
                while let Ok(pending) = out_rx.try_recv() {
                    let result = write
                        .send(Message::Text(pending.frame.clone().into()))
                        .await
                        .map_err(|e| CoreError::Network(format!("종료 중 전송 실패: {e}")));
                    pending.complete(result);
                }
                let _ = write.send(Message::Text(socketio::encode_disconnect().into())).await;
                let _ = write.close().await;
                info!("제어 채널 연결 해제");
                return ConnectionEnd::Shutdown;
            }
            Some(pending) = out_rx.recv() => {
                let size = pending.frame.len();
                match write.send(Message::Text(pending.frame.clone().into())).await {
                    Ok(()) => pending.complete(Ok(())),
                    Err(e) => {
                        let reason = format!("전송 실패 ({size}바이트): {e}");
                        pending.complete(Err(CoreError::Network(reason.clone())));
                        return ConnectionEnd::Dropped(reason);
                    }
                }
            }
            incoming = read.next() => {
                let text = match incoming {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => {
                        return ConnectionEnd::Dropped("원격 종료".to_string());
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return ConnectionEnd::Dropped(format!("수신 에러: {e}")),
                };
                deadline = Instant::now() + ping_window;
                match socketio::decode(text.as_str()) {
                    Ok(Packet::Ping) => {
                        if let Err(e) = write.send(Message::Text(socketio::encode_pong().into())).await {
                            return ConnectionEnd::Dropped(format!("pong 전송 실패: {e}"));
                        }
                    }
                    Ok(Packet::Event { name, data }) => {
                        let message = InboundMessage::from_event(&name, data);
                        debug!("수신 이벤트: {}", name);
                        let _ = shared.inbound_tx.send(message);
                    }
                    Ok(Packet::Disconnect) | Ok(Packet::Close) => {
                        return ConnectionEnd::Dropped("서버가 연결 해제".to_string());
                    }
                    Ok(other) => debug!("패킷 무시: {:?}", other),
                    Err(e) => warn!("프레임 해석 실패: {}", e),
                }
            }
            _ = sleep_until(deadline) => {
                return ConnectionEnd::Dropped(format!("ping 없음 ({ping_window:?})"));
            }
        }
    }
}
