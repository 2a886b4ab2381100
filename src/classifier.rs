//! Stable-reading deduplication.
//!
//! The scale re-notifies the same settled weight several times a second. The
//! classifier owns the "last announced stable value" so the consumer is only
//! notified when a *new* stable weight appears; unstable readings update the
//! live value upstream but never notify.

use crate::types::{Reading, UnitKind};
use log::debug;

/// Equality key for a stable reading. Weights come out of a deterministic
/// decoder, so exact bit equality is the right comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StableReadingKey {
    weight_bits: u64,
    unit: UnitKind,
}

impl StableReadingKey {
    fn of(reading: &Reading) -> Self {
        Self {
            weight_bits: reading.weight.to_bits(),
            unit: reading.unit,
        }
    }
}

#[derive(Debug, Default)]
pub struct ReadingClassifier {
    last_stable: Option<StableReadingKey>,
}

impl ReadingClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget the last announced value, e.g. when a new session starts.
    pub fn reset(&mut self) {
        self.last_stable = None;
    }

    /// Returns the reading back when it is a stable value the consumer has
    /// not been told about yet; `None` otherwise.
    pub fn observe(&mut self, reading: &Reading) -> Option<Reading> {
        if !reading.is_stable {
            return None;
        }
        let key = StableReadingKey::of(reading);
        if self.last_stable == Some(key) {
            debug!(
                "stable reading unchanged at {:.1}{}, suppressing",
                reading.weight,
                reading.unit.suffix()
            );
            return None;
        }
        self.last_stable = Some(key);
        Some(reading.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_time::Instant;

    fn reading(weight: f64, unit: UnitKind, is_stable: bool) -> Reading {
        Reading {
            weight,
            unit,
            is_stable,
            observed_at: Instant::now(),
        }
    }

    #[test]
    fn repeated_stable_value_notifies_once() {
        let mut classifier = ReadingClassifier::new();
        let first = reading(120.0, UnitKind::Gram, true);

        assert!(classifier.observe(&first).is_some());
        assert!(classifier.observe(&first).is_none());
        assert!(classifier.observe(&first).is_none());

        let heavier = reading(155.0, UnitKind::Gram, true);
        assert!(classifier.observe(&heavier).is_some());
    }

    #[test]
    fn unstable_readings_never_notify() {
        let mut classifier = ReadingClassifier::new();
        assert!(classifier
            .observe(&reading(80.0, UnitKind::Gram, false))
            .is_none());
        // An unstable repeat of the announced weight does not re-arm dedup.
        assert!(classifier
            .observe(&reading(80.0, UnitKind::Gram, true))
            .is_some());
        assert!(classifier
            .observe(&reading(80.0, UnitKind::Gram, false))
            .is_none());
        assert!(classifier
            .observe(&reading(80.0, UnitKind::Gram, true))
            .is_none());
    }

    #[test]
    fn unit_change_counts_as_new_value() {
        let mut classifier = ReadingClassifier::new();
        assert!(classifier
            .observe(&reading(10.0, UnitKind::Gram, true))
            .is_some());
        assert!(classifier
            .observe(&reading(10.0, UnitKind::Milliliter, true))
            .is_some());
    }

    #[test]
    fn reset_forgets_the_last_value() {
        let mut classifier = ReadingClassifier::new();
        let value = reading(42.0, UnitKind::Gram, true);
        assert!(classifier.observe(&value).is_some());
        assert!(classifier.observe(&value).is_none());
        classifier.reset();
        assert!(classifier.observe(&value).is_some());
    }
}
