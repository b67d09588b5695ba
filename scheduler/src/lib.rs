//! MAC Scheduler Library
//!
//! This crate implements the slot-synchronous PUCCH resource allocation of the
//! 5G NR MAC scheduler according to 3GPP TS 38.213 Section 9.2.

pub mod config;
pub mod grid;
pub mod pucch;

use common::{Rnti, SlotPoint};
use thiserror::Error;

/// Scheduler errors
///
/// These signal a broken caller contract or configuration. Running out of
/// PUCCH resources is not an error and is reported through the allocation
/// result types instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("Scheduler not initialized: no slot indication received")]
    NotInitialized,

    #[error("Slot regression: received slot {received} after slot {last}")]
    SlotRegression { last: SlotPoint, received: SlotPoint },

    #[error("Slot {slot} is outside the window starting at slot {last}")]
    SlotOutsideWindow { slot: SlotPoint, last: SlotPoint },

    #[error("Slot mismatch: expected slot {expected}, got {received}")]
    SlotMismatch { expected: SlotPoint, received: SlotPoint },

    #[error("No PUCCH grant for rnti={rnti} in slot {slot}")]
    GrantNotFound { rnti: Rnti, slot: SlotPoint },

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Resource unavailable: {0}")]
    ResourceUnavailable(String),
}

pub use config::{CellConfiguration, DciContext, PucchConfig, UeCellConfiguration};
pub use grid::{CellResourceAllocator, CellSlotResourceAllocator};
pub use pucch::{CellPucchAllocator, HarqAckAllocation, PucchAllocator, SrAllocation};
