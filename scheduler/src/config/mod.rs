//! Static cell and UE configuration consumed by the scheduler
//!
//! Configuration is slot-invariant: the allocator reads it but never mutates
//! it. Reconfiguration is done by the owner recreating the configuration.

pub mod cell;
pub mod pucch;
pub mod ue;

pub use cell::CellConfiguration;
pub use pucch::{
    MaxCodeRate, PucchConfig, PucchFormat, PucchFormatConfig, PucchResource,
    MAX_HARQ_PUCCH_RESOURCES,
};
pub use ue::{SchedulingRequestConfig, UeCellConfiguration};

/// Parameters of the PDCCH that scheduled a PDSCH, needed to derive the
/// common PUCCH resource (TS 38.213 Section 9.2.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DciContext {
    /// Index of the first CCE used by the PDCCH (n_CCE,0)
    pub n_cce: u8,
    /// Number of CCEs in the CORESET carrying the PDCCH (N_CCE)
    pub nof_coreset_cces: u8,
}

impl DciContext {
    /// Check the CCE index lies inside the CORESET
    pub fn validate(&self) -> Result<(), crate::SchedulerError> {
        if self.nof_coreset_cces == 0 || self.n_cce >= self.nof_coreset_cces {
            return Err(crate::SchedulerError::InvalidConfiguration(format!(
                "Invalid DCI context: n_cce={} with {} CORESET CCEs",
                self.n_cce, self.nof_coreset_cces
            )));
        }
        Ok(())
    }
}
