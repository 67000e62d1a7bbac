use serde::{Deserialize, Serialize};

/// Events per partition between checkpoints when no usable override is configured.
pub const DEFAULT_CHECKPOINT_THRESHOLD: u64 = 10;

/// True iff `count` has reached `threshold`.
pub fn should_checkpoint(count: u64, threshold: u64) -> bool {
    count >= threshold
}

/// Decides when accumulated progress on a partition warrants a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointPolicy {
    threshold: u64,
}

impl Default for CheckpointPolicy {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_CHECKPOINT_THRESHOLD,
        }
    }
}

impl CheckpointPolicy {
    /// A zero threshold falls back to the default.
    pub fn new(threshold: u64) -> Self {
        if threshold == 0 {
            return Self::default();
        }
        Self { threshold }
    }

    /// Builds the policy from an external override. Missing, non-numeric or
    /// non-positive values silently yield the default.
    pub fn from_override(raw: Option<&str>) -> Self {
        match raw.map(str::trim).and_then(|v| v.parse::<i64>().ok()) {
            Some(threshold) if threshold > 0 => Self {
                threshold: threshold as u64,
            },
            _ => Self::default(),
        }
    }

    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    pub fn should_checkpoint(&self, count: u64) -> bool {
        should_checkpoint(count, self.threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_is_inclusive() {
        assert!(!should_checkpoint(2, 3));
        assert!(should_checkpoint(3, 3));
        assert!(should_checkpoint(4, 3));
    }

    #[test]
    fn default_threshold_is_ten() {
        assert_eq!(CheckpointPolicy::from_override(None).threshold(), 10);
        assert_eq!(CheckpointPolicy::default().threshold(), 10);
    }

    #[test]
    fn bad_overrides_fall_back_silently() {
        for raw in ["-5", "abc", "0", "", "  ", "3.5"] {
            assert_eq!(
                CheckpointPolicy::from_override(Some(raw)).threshold(),
                DEFAULT_CHECKPOINT_THRESHOLD,
                "override {raw:?}"
            );
        }
    }

    #[test]
    fn positive_override_is_used() {
        let policy = CheckpointPolicy::from_override(Some(" 25 "));
        assert_eq!(policy.threshold(), 25);
        assert!(!policy.should_checkpoint(24));
        assert!(policy.should_checkpoint(25));
    }

    #[test]
    fn zero_threshold_constructor_uses_default() {
        assert_eq!(CheckpointPolicy::new(0), CheckpointPolicy::default());
        assert_eq!(CheckpointPolicy::new(3).threshold(), 3);
    }
}
