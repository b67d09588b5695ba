//! Slot Point
//!
//! Wrapping slot counter used as the scheduling clock. A slot point counts
//! slots over the full 1024-frame SFN period of its numerology and wraps
//! back to zero afterwards, so comparisons between two slot points are only
//! meaningful within half a period of each other.

use crate::types::SubcarrierSpacing;
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign, Sub};

/// Number of system frame numbers before the SFN wraps
pub const NOF_SFNS: u32 = 1024;

/// Slot index over the SFN period of one numerology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotPoint {
    scs: SubcarrierSpacing,
    count: u32,
}

impl SlotPoint {
    /// Create a slot point from SFN and slot index within the frame
    pub fn new(scs: SubcarrierSpacing, sfn: u32, slot_index: u32) -> Self {
        let slots_per_frame = scs.slots_per_frame();
        let count = (sfn % NOF_SFNS) * slots_per_frame + slot_index % slots_per_frame;
        Self { scs, count }
    }

    /// Create a slot point from an absolute slot count
    pub fn from_count(scs: SubcarrierSpacing, count: u32) -> Self {
        Self {
            scs,
            count: count % Self::period(scs),
        }
    }

    /// Number of slots before the counter wraps for a numerology
    pub fn period(scs: SubcarrierSpacing) -> u32 {
        NOF_SFNS * scs.slots_per_frame()
    }

    /// Subcarrier spacing of this slot point
    pub fn scs(&self) -> SubcarrierSpacing {
        self.scs
    }

    /// Numerology index
    pub fn numerology(&self) -> u8 {
        self.scs.numerology()
    }

    /// System frame number
    pub fn sfn(&self) -> u32 {
        self.count / self.scs.slots_per_frame()
    }

    /// Slot index within the frame
    pub fn slot_index(&self) -> u32 {
        self.count % self.scs.slots_per_frame()
    }

    /// Absolute slot count within the SFN period
    pub fn to_uint(&self) -> u32 {
        self.count
    }
}

impl Add<u32> for SlotPoint {
    type Output = SlotPoint;

    fn add(self, rhs: u32) -> SlotPoint {
        let period = Self::period(self.scs);
        SlotPoint {
            scs: self.scs,
            count: (self.count + rhs % period) % period,
        }
    }
}

impl AddAssign<u32> for SlotPoint {
    fn add_assign(&mut self, rhs: u32) {
        *self = *self + rhs;
    }
}

impl Sub<u32> for SlotPoint {
    type Output = SlotPoint;

    fn sub(self, rhs: u32) -> SlotPoint {
        let period = Self::period(self.scs);
        SlotPoint {
            scs: self.scs,
            count: (self.count + period - rhs % period) % period,
        }
    }
}

/// Signed distance in slots, taking the shorter way round the wrap
impl Sub<SlotPoint> for SlotPoint {
    type Output = i32;

    fn sub(self, rhs: SlotPoint) -> i32 {
        debug_assert_eq!(self.scs, rhs.scs, "Comparing slots of different numerologies");
        let period = Self::period(self.scs);
        let diff = (self.count + period - rhs.count) % period;
        if diff >= period / 2 {
            diff as i32 - period as i32
        } else {
            diff as i32
        }
    }
}

impl PartialOrd for SlotPoint {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.scs != other.scs {
            return None;
        }
        Some((*self - *other).cmp(&0))
    }
}

impl fmt::Display for SlotPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.sfn(), self.slot_index())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sfn_and_slot_index() {
        let sl = SlotPoint::new(SubcarrierSpacing::Scs30, 3, 7);
        assert_eq!(sl.sfn(), 3);
        assert_eq!(sl.slot_index(), 7);
        assert_eq!(sl.to_uint(), 67);
        assert_eq!(sl.to_string(), "3.7");
    }

    #[test]
    fn test_wraparound() {
        let scs = SubcarrierSpacing::Scs15;
        let last = SlotPoint::new(scs, 1023, 9);
        let next = last + 1;
        assert_eq!(next.sfn(), 0);
        assert_eq!(next.slot_index(), 0);
        assert_eq!(next - last, 1);
        assert_eq!(last - next, -1);
        assert!(next > last);
        assert_eq!(next - 1, last);
    }

    #[test]
    fn test_distance_and_ordering() {
        let scs = SubcarrierSpacing::Scs30;
        let a = SlotPoint::from_count(scs, 100);
        let b = a + 15;
        assert_eq!(b - a, 15);
        assert!(a < b);
        assert!(a <= a);
        let mut c = a;
        c += 15;
        assert_eq!(c, b);
    }

    #[test]
    fn test_period_divides_ring_sizes() {
        for scs in [
            SubcarrierSpacing::Scs15,
            SubcarrierSpacing::Scs30,
            SubcarrierSpacing::Scs60,
            SubcarrierSpacing::Scs120,
            SubcarrierSpacing::Scs240,
        ] {
            assert_eq!(SlotPoint::period(scs) % 20, 0);
            assert_eq!(SlotPoint::period(scs) % 32, 0);
        }
    }
}
