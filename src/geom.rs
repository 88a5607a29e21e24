pub mod bboxes;
pub mod hull;
pub mod point;
pub mod polygon;
pub mod segment;
pub mod vector;

/// Geometric precision used by exact predicates.
///
/// Feature-level tolerances (snapping, deduplication) come from
/// `PathConfig::epsilon` instead.
pub const EPS: f64 = 1e-10;

/// Tolerant comparison of scalars.
pub trait IsClose {
    fn is_close(&self, other: f64) -> bool;
    fn is_close_eps(&self, other: f64, eps: f64) -> bool;
}

impl IsClose for f64 {
    fn is_close(&self, other: f64) -> bool {
        (self - other).abs() < EPS
    }

    fn is_close_eps(&self, other: f64, eps: f64) -> bool {
        (self - other).abs() < eps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_close() {
        assert!(1.0_f64.is_close(1.0 + 1e-12));
        assert!(!1.0_f64.is_close(1.0001));
        assert!(1.0_f64.is_close_eps(1.0001, 1e-3));
    }
}
