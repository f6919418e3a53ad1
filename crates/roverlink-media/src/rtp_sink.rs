//! 영상 싱크: 수신 RTP를 로컬 UDP 포트로 포워딩.
//!
//! 디코딩/렌더링은 외부 플레이어(ffplay, GStreamer 등)에 맡긴다.
//! 포워딩 주소가 없으면 패킷을 세기만 하고 버린다.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use roverlink_core::error::CoreError;
use roverlink_core::ports::media::{InboundTrack, VideoSink};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// 현재 연결된 트랙의 펌프 태스크
struct Attached {
    track_id: String,
    pump: JoinHandle<()>,
}

/// UDP RTP 포워딩 싱크
pub struct UdpRtpSink {
    target: Option<SocketAddr>,
    attached: Mutex<Option<Attached>>,
    forwarded: Arc<AtomicU64>,
}

impl UdpRtpSink {
    /// `target`이 None이면 수신 패킷은 버려진다
    pub fn new(target: Option<SocketAddr>) -> Self {
        Self {
            target,
            attached: Mutex::new(None),
            forwarded: Arc::new(AtomicU64::new(0)),
        }
    }

    /// 설정 문자열(`host:port`)로 생성
    pub fn from_addr(addr: Option<&str>) -> Result<Self, CoreError> {
        let target = addr
            .map(|a| {
                a.parse::<SocketAddr>()
                    .map_err(|e| CoreError::Config(format!("잘못된 RTP 포워딩 주소 {a}: {e}")))
            })
            .transpose()?;
        Ok(Self::new(target))
    }

    /// 지금까지 처리한 RTP 패킷 수
    pub fn packets_forwarded(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }

    fn replace(&self, next: Option<Attached>) {
        let previous = std::mem::replace(&mut *self.attached.lock(), next);
        if let Some(previous) = previous {
            debug!("영상 트랙 교체/해제: {}", previous.track_id);
            previous.pump.abort();
        }
    }
}

impl Drop for UdpRtpSink {
    fn drop(&mut self) {
        if let Some(attached) = self.attached.get_mut().take() {
            attached.pump.abort();
        }
    }
}

#[async_trait]
impl VideoSink for UdpRtpSink {
    async fn attach(&self, track: Arc<dyn InboundTrack>) -> Result<(), CoreError> {
        let socket = match self.target {
            Some(_) => Some(UdpSocket::bind("0.0.0.0:0").await?),
            None => None,
        };
        let track_id = track.id();
        info!(
            "영상 트랙 연결: {} → {}",
            track_id,
            self.target
                .map(|t| t.to_string())
                .unwrap_or_else(|| "(버림)".to_string())
        );

        let pump = tokio::spawn(pump(track, socket, self.target, self.forwarded.clone()));
        self.replace(Some(Attached { track_id, pump }));
        Ok(())
    }

    async fn clear(&self) {
        self.replace(None);
    }

    fn is_attached(&self) -> bool {
        self.attached
            .lock()
            .as_ref()
            .is_some_and(|a| !a.pump.is_finished())
    }
}

async fn pump(
    track: Arc<dyn InboundTrack>,
    socket: Option<UdpSocket>,
    target: Option<SocketAddr>,
    forwarded: Arc<AtomicU64>,
) {
    loop {
        let packet = match track.next_packet().await {
            Ok(Some(packet)) => packet,
            Ok(None) => {
                debug!("영상 트랙 종료: {}", track.id());
                return;
            }
            Err(e) => {
                warn!("영상 패킷 수신 실패: {}", e);
                return;
            }
        };
        if let (Some(socket), Some(target)) = (&socket, target) {
            if let Err(e) = socket.send_to(&packet, target).await {
                warn!("RTP 포워딩 실패 ({}): {}", target, e);
                continue;
            }
        }
        forwarded.fetch_add(1, Ordering::Relaxed);
    }
}
