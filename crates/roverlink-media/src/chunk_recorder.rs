//! 청크 업링크용 WAV 인코더.

use std::io::Cursor;

use roverlink_core::error::CoreError;
use roverlink_core::models::audio::AudioFrame;
use roverlink_core::ports::audio::ChunkRecorder;
use tracing::trace;

/// 지원 MIME
pub const WAV_MIME: &str = "audio/wav";

/// 프레임 묶음을 16비트 모노 WAV 한 덩어리로 만든다
#[derive(Debug, Default, Clone)]
pub struct WavChunkRecorder;

impl WavChunkRecorder {
    pub fn new() -> Self {
        Self
    }
}

impl ChunkRecorder for WavChunkRecorder {
    fn supports(&self, mime: &str) -> bool {
        mime.eq_ignore_ascii_case(WAV_MIME)
    }

    fn encode_chunk(&self, mime: &str, frames: &[AudioFrame]) -> Result<Vec<u8>, CoreError> {
        if !self.supports(mime) {
            return Err(CoreError::Negotiation(format!(
                "지원하지 않는 청크 형식: {mime}"
            )));
        }
        let sample_rate = frames.first().map(|f| f.sample_rate).unwrap_or(16_000);
        if let Some(odd) = frames.iter().find(|f| f.sample_rate != sample_rate) {
            return Err(CoreError::Internal(format!(
                "청크 내 샘플레이트 불일치: {} != {}",
                odd.sample_rate, sample_rate
            )));
        }

        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec)
                .map_err(|e| CoreError::Internal(format!("WAV 헤더 기록 실패: {e}")))?;
            for sample in frames.iter().flat_map(|f| f.samples.iter()) {
                writer
                    .write_sample(*sample)
                    .map_err(|e| CoreError::Internal(format!("WAV 샘플 기록 실패: {e}")))?;
            }
            writer
                .finalize()
                .map_err(|e| CoreError::Internal(format!("WAV 마무리 실패: {e}")))?;
        }
        let bytes = cursor.into_inner();
        trace!("WAV 청크 인코딩: {}프레임 → {}바이트", frames.len(), bytes.len());
        Ok(bytes)
    }
}
