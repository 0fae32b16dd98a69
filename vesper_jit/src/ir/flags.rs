//! Arithmetic-usage flags.
//!
//! Each node carries a small bitset describing what its consumers demand
//! of a numeric result, plus feedback bits seeded from the previous
//! tier's exit profile. The demand bits flow from consumers to producers
//! during flag propagation; the feedback bits never propagate.

use bitflags::bitflags;

bitflags! {
    /// Per-node arithmetic flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ArithFlags: u8 {
        /// Some consumer requires the mathematically correct numeric
        /// result rather than a 32-bit truncated integer.
        const USED_AS_NUMBER = 1 << 0;
        /// Some consumer distinguishes +0 from -0.
        const NEEDS_NEG_ZERO = 1 << 1;
        /// The previous tier observed an integer overflow at this
        /// operation.
        const MAY_OVERFLOW = 1 << 2;
        /// The previous tier observed this operation producing -0.
        const MAY_NEG_ZERO = 1 << 3;

        /// The demand bits that propagate to children.
        const USED_AS_MASK = Self::USED_AS_NUMBER.bits() | Self::NEEDS_NEG_ZERO.bits();
    }
}

impl ArithFlags {
    /// Merge flags in, reporting whether the set grew.
    #[inline]
    pub fn merge(&mut self, other: ArithFlags) -> bool {
        let merged = *self | other;
        let changed = merged != *self;
        *self = merged;
        changed
    }

    /// Consumers tolerate a 32-bit truncated result.
    #[inline]
    pub fn can_truncate_integer(self) -> bool {
        !self.contains(ArithFlags::USED_AS_NUMBER)
    }

    /// Consumers never distinguish -0 from +0.
    #[inline]
    pub fn can_ignore_negative_zero(self) -> bool {
        !self.contains(ArithFlags::NEEDS_NEG_ZERO)
    }

    /// Whether integer speculation is worth attempting for a node with
    /// these flags.
    ///
    /// Overflow feedback always vetoes (re-speculating would loop through
    /// the exit). Negative-zero feedback vetoes only when a consumer
    /// actually cares about -0, since int32 cannot represent it.
    #[inline]
    pub fn can_speculate_integer(self) -> bool {
        if self.contains(ArithFlags::MAY_OVERFLOW) {
            return false;
        }
        if self.contains(ArithFlags::MAY_NEG_ZERO) {
            return self.can_ignore_negative_zero();
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_reports_growth() {
        let mut flags = ArithFlags::empty();
        assert!(flags.merge(ArithFlags::USED_AS_NUMBER));
        assert!(!flags.merge(ArithFlags::USED_AS_NUMBER));
        assert!(flags.merge(ArithFlags::NEEDS_NEG_ZERO));
        assert_eq!(flags, ArithFlags::USED_AS_MASK);
    }

    #[test]
    fn test_speculation_without_feedback() {
        // With no feedback from the lower tier, full demand still
        // permits integer speculation (overflow is checked at runtime).
        assert!(ArithFlags::USED_AS_MASK.can_speculate_integer());
        assert!(ArithFlags::empty().can_speculate_integer());
    }

    #[test]
    fn test_overflow_feedback_vetoes() {
        assert!(!ArithFlags::MAY_OVERFLOW.can_speculate_integer());
        assert!(!(ArithFlags::MAY_OVERFLOW | ArithFlags::USED_AS_MASK).can_speculate_integer());
    }

    #[test]
    fn test_neg_zero_feedback_is_conditional() {
        // Producing -0 only matters if some consumer can tell.
        assert!(ArithFlags::MAY_NEG_ZERO.can_speculate_integer());
        let observed = ArithFlags::MAY_NEG_ZERO | ArithFlags::NEEDS_NEG_ZERO;
        assert!(!observed.can_speculate_integer());
    }

    #[test]
    fn test_truncation_demand() {
        assert!(ArithFlags::empty().can_truncate_integer());
        assert!(!ArithFlags::USED_AS_NUMBER.can_truncate_integer());
        assert!(ArithFlags::NEEDS_NEG_ZERO.can_truncate_integer());
    }
}
