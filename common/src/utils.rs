//! Common Utilities
//!
//! Provides utility functions used across the GNodeB implementation

use crate::types::{Bandwidth, SubcarrierSpacing};
use tracing::trace;

/// Maximum number of PRBs in a carrier (TS 38.101-1 Table 5.3.2-1)
pub const MAX_NOF_PRBS: usize = 275;

/// Number of OFDM symbols in a slot with normal cyclic prefix
pub const NOF_OFDM_SYM_PER_SLOT: usize = 14;

/// Number of resource blocks for a channel bandwidth and subcarrier spacing
///
/// Based on 3GPP TS 38.104 Table 5.3.2-1. Returns `None` for combinations the
/// table does not define.
pub fn nof_rbs(bandwidth: Bandwidth, scs: SubcarrierSpacing) -> Option<u16> {
    let num_rbs = match (bandwidth, scs) {
        (Bandwidth::Bw5, SubcarrierSpacing::Scs15) => 25,
        (Bandwidth::Bw5, SubcarrierSpacing::Scs30) => 11,
        (Bandwidth::Bw10, SubcarrierSpacing::Scs15) => 52,
        (Bandwidth::Bw10, SubcarrierSpacing::Scs30) => 24,
        (Bandwidth::Bw10, SubcarrierSpacing::Scs60) => 11,
        (Bandwidth::Bw15, SubcarrierSpacing::Scs15) => 79,
        (Bandwidth::Bw15, SubcarrierSpacing::Scs30) => 38,
        (Bandwidth::Bw15, SubcarrierSpacing::Scs60) => 18,
        (Bandwidth::Bw20, SubcarrierSpacing::Scs15) => 106,
        (Bandwidth::Bw20, SubcarrierSpacing::Scs30) => 51,
        (Bandwidth::Bw20, SubcarrierSpacing::Scs60) => 24,
        (Bandwidth::Bw25, SubcarrierSpacing::Scs15) => 133,
        (Bandwidth::Bw25, SubcarrierSpacing::Scs30) => 65,
        (Bandwidth::Bw25, SubcarrierSpacing::Scs60) => 31,
        (Bandwidth::Bw30, SubcarrierSpacing::Scs15) => 160,
        (Bandwidth::Bw30, SubcarrierSpacing::Scs30) => 78,
        (Bandwidth::Bw30, SubcarrierSpacing::Scs60) => 38,
        (Bandwidth::Bw40, SubcarrierSpacing::Scs15) => 216,
        (Bandwidth::Bw40, SubcarrierSpacing::Scs30) => 106,
        (Bandwidth::Bw40, SubcarrierSpacing::Scs60) => 51,
        (Bandwidth::Bw50, SubcarrierSpacing::Scs15) => 270,
        (Bandwidth::Bw50, SubcarrierSpacing::Scs30) => 133,
        (Bandwidth::Bw50, SubcarrierSpacing::Scs60) => 65,
        (Bandwidth::Bw50, SubcarrierSpacing::Scs120) => 32,
        (Bandwidth::Bw60, SubcarrierSpacing::Scs30) => 162,
        (Bandwidth::Bw60, SubcarrierSpacing::Scs60) => 79,
        (Bandwidth::Bw80, SubcarrierSpacing::Scs30) => 217,
        (Bandwidth::Bw80, SubcarrierSpacing::Scs60) => 107,
        (Bandwidth::Bw100, SubcarrierSpacing::Scs30) => 273,
        (Bandwidth::Bw100, SubcarrierSpacing::Scs60) => 135,
        (Bandwidth::Bw100, SubcarrierSpacing::Scs120) => 66,
        _ => return None,
    };

    trace!("{} RBs for {}Hz bandwidth with {:?}", num_rbs, bandwidth.as_hz(), scs);

    Some(num_rbs)
}

/// Time utilities for slot/frame calculations
pub mod time {
    use crate::types::SubcarrierSpacing;
    use std::time::Duration;

    /// Duration of one slot of a numerology
    pub fn slot_duration(scs: SubcarrierSpacing) -> Duration {
        // 1 ms subframe split into 2^mu slots
        Duration::from_nanos(1_000_000 >> scs.numerology())
    }
}
