//! 마이크 캡처.
//!
//! `microphone` feature가 켜지면 cpal로 기본 입력 장치를 연다.
//! cpal 스트림은 `Send`가 아니므로 전용 스레드에서 만들고 유지하며,
//! 해제 콜백이 스레드에 정지 신호를 보낸다.

use async_trait::async_trait;
use roverlink_core::error::CoreError;
use roverlink_core::ports::audio::{AudioCapture, CaptureStream};

/// 캡처가 빠진 빌드에서 쓰는 장치: 항상 권한 거부
#[derive(Debug, Default, Clone)]
pub struct DisabledCapture;

#[async_trait]
impl AudioCapture for DisabledCapture {
    async fn open(&self) -> Result<CaptureStream, CoreError> {
        Err(CoreError::PermissionDenied(
            "마이크 캡처 미지원 빌드 (microphone feature 필요)".to_string(),
        ))
    }
}

#[cfg(feature = "microphone")]
pub use device::CpalCapture;

#[cfg(feature = "microphone")]
mod device {
    use std::sync::mpsc as std_mpsc;
    use std::thread;

    use async_trait::async_trait;
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use roverlink_core::error::CoreError;
    use roverlink_core::models::audio::AudioFrame;
    use roverlink_core::ports::audio::{AudioCapture, CaptureStream};
    use tokio::sync::{mpsc, oneshot};
    use tracing::{debug, error, info, warn};

    /// 프레임 버퍼 (약 2초 분량)
    const FRAME_QUEUE: usize = 100;

    /// cpal 기본 입력 장치 캡처
    #[derive(Debug, Clone)]
    pub struct CpalCapture {
        frame_ms: u32,
    }

    impl CpalCapture {
        /// `frame_ms` 단위로 프레임을 잘라 보낸다
        pub fn new(frame_ms: u32) -> Self {
            Self {
                frame_ms: frame_ms.max(5),
            }
        }
    }

    impl Default for CpalCapture {
        fn default() -> Self {
            Self::new(20)
        }
    }

    #[async_trait]
    impl AudioCapture for CpalCapture {
        async fn open(&self) -> Result<CaptureStream, CoreError> {
            let (ready_tx, ready_rx) = oneshot::channel();
            let (frame_tx, frame_rx) = mpsc::channel(FRAME_QUEUE);
            let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
            let frame_ms = self.frame_ms;

            thread::Builder::new()
                .name("roverlink-mic".to_string())
                .spawn(move || run_device(frame_ms, frame_tx, ready_tx, stop_rx))
                .map_err(|e| CoreError::Internal(format!("캡처 스레드 생성 실패: {e}")))?;

            let sample_rate = ready_rx
                .await
                .map_err(|_| CoreError::PermissionDenied("캡처 스레드 비정상 종료".to_string()))??;
            info!("마이크 캡처 시작 ({} Hz)", sample_rate);
            Ok(CaptureStream::new(sample_rate, frame_rx, move || {
                let _ = stop_tx.send(());
            }))
        }
    }

    /// 장치를 열고 정지 신호가 올 때까지 스트림 유지
    fn run_device(
        frame_ms: u32,
        frames: mpsc::Sender<AudioFrame>,
        ready: oneshot::Sender<Result<u32, CoreError>>,
        stop: std_mpsc::Receiver<()>,
    ) {
        let stream = match build_stream(frame_ms, frames) {
            Ok((stream, sample_rate)) => {
                let _ = ready.send(Ok(sample_rate));
                stream
            }
            Err(e) => {
                let _ = ready.send(Err(e));
                return;
            }
        };

        // 해제 콜백 호출 또는 CaptureStream drop까지 대기
        let _ = stop.recv();
        drop(stream);
        debug!("마이크 장치 해제");
    }

    fn build_stream(
        frame_ms: u32,
        frames: mpsc::Sender<AudioFrame>,
    ) -> Result<(cpal::Stream, u32), CoreError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| CoreError::PermissionDenied("입력 장치 없음".to_string()))?;
        let supported = device
            .default_input_config()
            .map_err(|e| CoreError::PermissionDenied(format!("입력 장치 설정 조회 실패: {e}")))?;

        let sample_rate = supported.sample_rate().0;
        let channels = usize::from(supported.channels().max(1));
        let frame_len = (sample_rate * frame_ms / 1000) as usize;
        let config: cpal::StreamConfig = supported.config();
        let on_error = |e: cpal::StreamError| error!("마이크 스트림 에러: {}", e);

        let mut framer = Framer::new(frame_len, sample_rate, frames);
        let stream = match supported.sample_format() {
            cpal::SampleFormat::F32 => device.build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    framer.push(data.chunks(channels).map(|ch| {
                        let mono = ch.iter().sum::<f32>() / ch.len() as f32;
                        (mono.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16
                    }));
                },
                on_error,
                None,
            ),
            cpal::SampleFormat::I16 => device.build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    framer.push(data.chunks(channels).map(|ch| {
                        let sum: i32 = ch.iter().map(|&s| i32::from(s)).sum();
                        (sum / ch.len() as i32) as i16
                    }));
                },
                on_error,
                None,
            ),
            other => {
                return Err(CoreError::PermissionDenied(format!(
                    "지원하지 않는 샘플 형식: {other:?}"
                )))
            }
        }
        .map_err(|e| CoreError::PermissionDenied(format!("입력 스트림 생성 실패: {e}")))?;

        stream
            .play()
            .map_err(|e| CoreError::PermissionDenied(format!("입력 스트림 시작 실패: {e}")))?;
        Ok((stream, sample_rate))
    }

    /// 모노 샘플을 고정 길이 프레임으로 자른다
    struct Framer {
        frame_len: usize,
        sample_rate: u32,
        pending: Vec<i16>,
        frames: mpsc::Sender<AudioFrame>,
        dropped: u64,
    }

    impl Framer {
        fn new(frame_len: usize, sample_rate: u32, frames: mpsc::Sender<AudioFrame>) -> Self {
            Self {
                frame_len: frame_len.max(1),
                sample_rate,
                pending: Vec::with_capacity(frame_len),
                frames,
                dropped: 0,
            }
        }

        fn push(&mut self, samples: impl Iterator<Item = i16>) {
            for sample in samples {
                self.pending.push(sample);
                if self.pending.len() == self.frame_len {
                    let frame = AudioFrame {
                        samples: std::mem::replace(
                            &mut self.pending,
                            Vec::with_capacity(self.frame_len),
                        ),
                        sample_rate: self.sample_rate,
                    };
                    if self.frames.try_send(frame).is_err() {
                        self.dropped += 1;
                        if self.dropped % 50 == 1 {
                            warn!("캡처 프레임 소비 지연, {}개 버림", self.dropped);
                        }
                    }
                }
            }
        }
    }

}
