//! 제어 채널 포트.
//!
//! 구현: `roverlink-network` crate (Socket.IO over tokio-tungstenite)

use async_trait::async_trait;
use tokio::sync::{broadcast, watch};

use crate::error::CoreError;
use crate::models::message::{ChannelMessage, ConnectionStatus, InboundMessage};

/// 차량과의 순서 보장 양방향 메시지 채널
#[async_trait]
pub trait ControlChannel: Send + Sync {
    /// 메시지 전송 (전송 순서대로 전달)
    ///
    /// 연결이 끊겨 있으면 즉시 `CoreError::Network`를 반환한다.
    async fn send(&self, message: ChannelMessage) -> Result<(), CoreError>;

    /// 수신 메시지 구독
    fn subscribe(&self) -> broadcast::Receiver<InboundMessage>;

    /// 현재 연결 여부
    fn is_connected(&self) -> bool;

    /// 연결 상태 변경 수신기
    fn watch_status(&self) -> watch::Receiver<ConnectionStatus>;
}
