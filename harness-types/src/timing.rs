//! Timing model shared by both backends.

/// Last execution's timing breakdown.
///
/// `is_complete` resolves the "stale read" open question:
/// a sample read after `dispatch()` but before the matching `wait()`
/// reflects the *previous* completed dispatch, with `is_complete = true`
/// for that previous sample; there is no in-flight placeholder value.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TimingSample {
    pub memory_setup_ms: f64,
    pub compute_ms: f64,
    pub memory_teardown_ms: f64,
    pub total_ms: f64,
    pub is_complete: bool,
}

impl TimingSample {
    pub const ZERO: TimingSample = TimingSample {
        memory_setup_ms: 0.0,
        compute_ms: 0.0,
        memory_teardown_ms: 0.0,
        total_ms: 0.0,
        is_complete: false,
    };

    /// Timing well-formedness invariant: non-negative
    /// compute time, and total time must not undercut compute time by more
    /// than a small measurement-skew epsilon.
    pub fn is_well_formed(&self, epsilon_ms: f64) -> bool {
        self.compute_ms >= 0.0 && self.total_ms >= self.compute_ms - epsilon_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_sample_is_well_formed() {
        assert!(TimingSample::ZERO.is_well_formed(1e-6));
    }

    #[test]
    fn negative_compute_time_is_rejected() {
        let sample = TimingSample {
            compute_ms: -1.0,
            ..TimingSample::ZERO
        };
        assert!(!sample.is_well_formed(1e-6));
    }

    #[test]
    fn total_below_compute_minus_epsilon_is_rejected() {
        let sample = TimingSample {
            compute_ms: 5.0,
            total_ms: 1.0,
            ..TimingSample::ZERO
        };
        assert!(!sample.is_well_formed(0.01));
    }
}
