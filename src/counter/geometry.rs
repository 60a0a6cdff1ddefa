use crate::pose::Keypoint;

/// b を頂点とする角 abc（度）。長さ0の辺があれば None
pub fn angle_deg(a: &Keypoint, b: &Keypoint, c: &Keypoint) -> Option<f32> {
    let (bax, bay) = (a.x - b.x, a.y - b.y);
    let (bcx, bcy) = (c.x - b.x, c.y - b.y);
    let norm = (bax * bax + bay * bay).sqrt() * (bcx * bcx + bcy * bcy).sqrt();
    if norm <= f32::EPSILON || !norm.is_finite() {
        return None;
    }
    let cos = ((bax * bcx + bay * bcy) / norm).clamp(-1.0, 1.0);
    Some(cos.acos().to_degrees())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kp(x: f32, y: f32) -> Keypoint {
        Keypoint::new(x, y, 1.0)
    }

    #[test]
    fn test_right_angle() {
        let angle = angle_deg(&kp(0.0, 10.0), &kp(0.0, 0.0), &kp(10.0, 0.0)).unwrap();
        assert!((angle - 90.0).abs() < 1e-3);
    }

    #[test]
    fn test_straight_line() {
        let angle = angle_deg(&kp(-5.0, 0.0), &kp(0.0, 0.0), &kp(5.0, 0.0)).unwrap();
        assert!((angle - 180.0).abs() < 1e-3);
    }

    #[test]
    fn test_degenerate() {
        assert!(angle_deg(&kp(0.0, 0.0), &kp(0.0, 0.0), &kp(1.0, 0.0)).is_none());
    }
}
