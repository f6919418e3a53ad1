//! 텔레메트리 모델.
//!
//! 차량 측 시스템 상태 스냅샷 (`GET /system-status`). 이력은 보관하지 않는다.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// CPU 상태
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CpuStatus {
    pub percent: f64,
    /// 섭씨 온도 (센서가 없으면 None)
    #[serde(default)]
    pub temperature: Option<f64>,
}

/// 메모리/스왑 사용량
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MemoryUsage {
    pub percent: f64,
    /// 사용량 (바이트)
    pub used: u64,
    /// 전체 용량 (바이트)
    pub total: u64,
}

/// `/system-status` 응답 원형
#[derive(Debug, Clone, Deserialize)]
pub struct SystemStatusResponse {
    pub status: String,
    #[serde(default)]
    pub cpu: Option<CpuStatus>,
    #[serde(default)]
    pub memory: Option<MemoryUsage>,
    #[serde(default)]
    pub swap: Option<MemoryUsage>,
    #[serde(default)]
    pub message: Option<String>,
}

/// 텔레메트리 샘플: 폴링마다 통째로 교체된다
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    pub cpu: f64,
    pub memory: MemoryUsage,
    pub swap: MemoryUsage,
    pub temperature: Option<f64>,
    /// 수신 시각
    pub received_at: DateTime<Utc>,
}

impl TelemetrySample {
    /// 콘솔 한 줄 요약
    pub fn summary(&self) -> String {
        let mut line = format!(
            "CPU {:.1}% | MEM {:.1}% ({} / {}) | SWAP {:.1}% ({} / {})",
            self.cpu,
            self.memory.percent,
            format_bytes(self.memory.used),
            format_bytes(self.memory.total),
            self.swap.percent,
            format_bytes(self.swap.used),
            format_bytes(self.swap.total),
        );
        if let Some(temp) = self.temperature {
            line.push_str(&format!(" | {temp:.1}°C"));
        }
        line
    }
}

/// 바이트 수를 B/KB/MB/GB 단위 소수 한 자리로 표시 (끝자리 `.0`은 생략)
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 B".to_string();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rounded = (value * 10.0).round() / 10.0;
    if rounded.fract() == 0.0 {
        format!("{} {}", rounded as u64, UNITS[unit])
    } else {
        format!("{:.1} {}", rounded, UNITS[unit])
    }
}
