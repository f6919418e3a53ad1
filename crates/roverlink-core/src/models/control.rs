//! 조종 벡터 모델.
//!
//! 조이스틱 2축 입력을 정규화한 값. `{0,0}`이 유일한 정지 명령이다.

use serde::{Deserialize, Serialize};

/// 정규화된 이동 의도 (각 축 -1.0 ~ 1.0)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ControlVector {
    /// 좌우 축
    pub lx: f32,
    /// 전후 축 (위쪽이 양수)
    pub ly: f32,
}

impl ControlVector {
    /// 정지 벡터
    pub const STOP: ControlVector = ControlVector { lx: 0.0, ly: 0.0 };

    /// 새 벡터 생성: 범위 밖 값은 잘라내고 소수 둘째 자리로 반올림
    pub fn new(lx: f32, ly: f32) -> Self {
        Self {
            lx: normalize_axis(lx),
            ly: normalize_axis(ly),
        }
    }

    /// 정지 벡터 여부
    pub fn is_stop(&self) -> bool {
        self.lx == 0.0 && self.ly == 0.0
    }

    /// 두 축 중 큰 쪽의 변화량
    pub fn max_axis_delta(&self, other: &ControlVector) -> f32 {
        (self.lx - other.lx).abs().max((self.ly - other.ly).abs())
    }
}

fn normalize_axis(value: f32) -> f32 {
    if !value.is_finite() {
        return 0.0;
    }
    let rounded = (value.clamp(-1.0, 1.0) * 100.0).round() / 100.0;
    // -0.0 정리
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_and_rounds() {
        let v = ControlVector::new(1.7, -0.456);
        assert_eq!(v, ControlVector { lx: 1.0, ly: -0.46 });
    }

    #[test]
    fn non_finite_becomes_zero() {
        let v = ControlVector::new(f32::NAN, f32::INFINITY);
        assert!(v.is_stop());
    }

    #[test]
    fn tiny_values_round_to_stop() {
        let v = ControlVector::new(0.004, -0.003);
        assert!(v.is_stop());
        assert!(v.lx.is_sign_positive());
        assert!(v.ly.is_sign_positive());
    }

    #[test]
    fn delta_uses_largest_axis() {
        let a = ControlVector::new(0.5, 0.5);
        let b = ControlVector::new(0.52, 0.4);
        assert!((a.max_axis_delta(&b) - 0.1).abs() < 1e-6);
    }

    #[test]
    fn serializes_as_lx_ly() {
        let json = serde_json::to_string(&ControlVector::new(0.5, -0.25)).unwrap();
        assert_eq!(json, r#"{"lx":0.5,"ly":-0.25}"#);
    }
}
