//! Change categories carried by field notifications.

bitflags::bitflags! {
    /// What changed about a field.
    ///
    /// Pending notifications for the same path combine with bitwise OR, and a
    /// listener only fires when its subscribed mask intersects the change.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ChangeMask: u16 {
        /// The stored value changed.
        const VALUE = 1 << 0;
        /// A validation run started or finished.
        const VALIDATING = 1 << 1;
        /// The error list changed.
        const ERRORS = 1 << 2;
        /// The warning list changed.
        const WARNINGS = 1 << 3;
        /// The touched flag changed.
        const TOUCHED = 1 << 4;
        /// The dirty flag changed.
        const DIRTY = 1 << 5;
        /// The validated flag changed.
        const VALIDATED = 1 << 6;
        /// The field was reset.
        const RESET = 1 << 7;

        /// Everything that is not the value itself.
        const STATUS = Self::VALIDATING.bits()
            | Self::ERRORS.bits()
            | Self::WARNINGS.bits()
            | Self::TOUCHED.bits()
            | Self::DIRTY.bits()
            | Self::VALIDATED.bits()
            | Self::RESET.bits();
        /// Every category.
        const ALL = Self::VALUE.bits() | Self::STATUS.bits();
    }
}

impl ChangeMask {
    /// True when a listener subscribed to `self` should hear about `change`.
    #[inline]
    pub fn wants(self, change: ChangeMask) -> bool {
        self.intersects(change)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_covers_every_flag() {
        for flag in ChangeMask::all().iter() {
            assert!(ChangeMask::ALL.contains(flag));
        }
        assert!(!ChangeMask::STATUS.contains(ChangeMask::VALUE));
    }

    #[test]
    fn test_wants_is_intersection() {
        let sub = ChangeMask::ERRORS | ChangeMask::WARNINGS;
        assert!(sub.wants(ChangeMask::ERRORS | ChangeMask::VALUE));
        assert!(!sub.wants(ChangeMask::VALUE));
        assert!(!ChangeMask::empty().wants(ChangeMask::ALL));
    }
}
