//! G.711 μ-law (PCMU) 인코더.
//!
//! 마이크 업링크 트랙은 8 kHz 모노 PCMU로 송신한다.

/// PCMU 클럭 (Hz)
pub const PCMU_RATE: u32 = 8_000;

const BIAS: i32 = 0x84;
const CLIP: i32 = 32_635;

/// 16비트 선형 PCM 샘플 하나를 μ-law 바이트로 변환
pub fn encode_sample(sample: i16) -> u8 {
    let mut pcm = i32::from(sample);
    let sign = if pcm < 0 {
        pcm = -pcm;
        0x80
    } else {
        0x00
    };
    let pcm = pcm.min(CLIP) + BIAS;

    // 최상위 비트 위치로 세그먼트(지수) 결정
    let mut exponent = 7;
    let mut mask = 0x4000;
    while exponent > 0 && pcm & mask == 0 {
        exponent -= 1;
        mask >>= 1;
    }
    let mantissa = (pcm >> (exponent + 3)) & 0x0F;
    !(sign | (exponent << 4) as u8 | mantissa as u8)
}

/// 임의 샘플레이트 PCM을 8 kHz로 낮춘 뒤 μ-law 인코딩
///
/// 정수배 감소는 구간 평균, 그 외에는 최근접 샘플을 쓴다.
pub fn encode_frame(samples: &[i16], sample_rate: u32) -> Vec<u8> {
    resample_to_pcmu_rate(samples, sample_rate)
        .into_iter()
        .map(encode_sample)
        .collect()
}

fn resample_to_pcmu_rate(samples: &[i16], sample_rate: u32) -> Vec<i16> {
    if sample_rate == PCMU_RATE || sample_rate == 0 {
        return samples.to_vec();
    }
    if sample_rate % PCMU_RATE == 0 {
        let factor = (sample_rate / PCMU_RATE) as usize;
        return samples
            .chunks(factor)
            .map(|chunk| {
                let sum: i32 = chunk.iter().map(|&s| i32::from(s)).sum();
                (sum / chunk.len() as i32) as i16
            })
            .collect();
    }
    let out_len = (samples.len() as u64 * u64::from(PCMU_RATE) / u64::from(sample_rate)) as usize;
    (0..out_len)
        .map(|i| {
            let src = (i as u64 * u64::from(sample_rate) / u64::from(PCMU_RATE)) as usize;
            samples[src.min(samples.len() - 1)]
        })
        .collect()
}
