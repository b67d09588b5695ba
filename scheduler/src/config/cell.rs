//! Cell configuration seen by the scheduler

use crate::grid::CrbInterval;
use crate::SchedulerError;
use common::{CellId, Pci, SubcarrierSpacing, MAX_NOF_PRBS};
use serde::{Deserialize, Serialize};

/// Number of rows of TS 38.213 Table 9.2.1-1
pub const NOF_PUCCH_DEFAULT_RESOURCE_SETS: u8 = 16;

/// Static, slot-invariant cell configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellConfiguration {
    /// Cell ID
    pub cell_id: CellId,
    /// Physical Cell ID
    pub pci: Pci,
    /// Subcarrier spacing of the carrier
    pub scs: SubcarrierSpacing,
    /// CRBs of the initial UL BWP
    pub ul_bwp: CrbInterval,
    /// pucch-ResourceCommon, row of TS 38.213 Table 9.2.1-1 (0-15)
    pub pucch_resource_common: u8,
    /// PDSCH slot offsets (k0) of the time domain allocation list
    pub k0_candidates: Vec<u8>,
    /// PDSCH-to-HARQ feedback offsets (dl-DataToUL-ACK, k1)
    pub k1_candidates: Vec<u8>,
}

impl CellConfiguration {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.pucch_resource_common >= NOF_PUCCH_DEFAULT_RESOURCE_SETS {
            return Err(SchedulerError::InvalidConfiguration(format!(
                "pucch-ResourceCommon {} out of range",
                self.pucch_resource_common
            )));
        }

        if self.ul_bwp.is_empty() || self.ul_bwp.stop as usize > MAX_NOF_PRBS {
            return Err(SchedulerError::InvalidConfiguration(format!(
                "Invalid UL BWP {:?}",
                self.ul_bwp
            )));
        }

        if self.k0_candidates.is_empty() || self.k1_candidates.is_empty() {
            return Err(SchedulerError::InvalidConfiguration(
                "k0 and k1 candidate lists must not be empty".into(),
            ));
        }

        Ok(())
    }

    /// Number of PRBs of the initial UL BWP (N_BWP^size)
    pub fn ul_bwp_size(&self) -> u16 {
        self.ul_bwp.length()
    }

    /// Largest PDSCH-to-PUCCH distance in slots this cell can produce
    pub fn max_harq_timing(&self) -> u32 {
        let max_k0 = self.k0_candidates.iter().copied().max().unwrap_or(0) as u32;
        let max_k1 = self.k1_candidates.iter().copied().max().unwrap_or(0) as u32;
        max_k0 + max_k1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_helpers::test_cell_config;

    #[test]
    fn test_valid_cell_config() {
        let cfg = test_cell_config();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.ul_bwp_size(), 51);
        assert_eq!(cfg.max_harq_timing(), 8);
    }

    #[test]
    fn test_invalid_cell_config() {
        let mut cfg = test_cell_config();
        cfg.pucch_resource_common = 16;
        assert!(cfg.validate().is_err());

        let mut cfg = test_cell_config();
        cfg.ul_bwp = CrbInterval::new(0, 300);
        assert!(cfg.validate().is_err());

        let mut cfg = test_cell_config();
        cfg.k1_candidates.clear();
        assert!(cfg.validate().is_err());
    }
}
