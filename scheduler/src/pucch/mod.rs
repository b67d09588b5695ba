//! PUCCH Scheduling
//!
//! Allocation of HARQ-ACK and SR resources on the PUCCH of a cell. The
//! [`PucchAllocator`] trait is what the slot scheduler calls; running out of
//! resources is reported through the allocation result types.

pub mod allocator;
pub mod default_resources;
pub mod resource_manager;

pub use allocator::CellPucchAllocator;
pub use default_resources::{get_pucch_default_resource, PucchDefaultResource};
pub use resource_manager::{HarqResourceReservation, PucchResourceManager, RES_MANAGER_RING_BUFFER_SIZE};

use crate::config::{DciContext, UeCellConfiguration};
use crate::grid::{CellResourceAllocator, CellSlotResourceAllocator, PucchInfo, PucchUciBits};
use crate::SchedulerError;
use common::{Rnti, SlotPoint};

/// Whether a HARQ-ACK grant occupies a new PUCCH resource or reuses the UE's
/// existing PDU in the slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarqGrantKind {
    New,
    Update,
}

/// HARQ-ACK grant on PUCCH
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PucchHarqAckGrant {
    /// PUCCH resource indicator to signal in the DCI
    pub pucch_res_indicator: u8,
    pub kind: HarqGrantKind,
    /// The UE's PUCCH PDU after the allocation
    pub pdu: PucchInfo,
}

/// Outcome of a HARQ-ACK allocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HarqAckAllocation {
    Granted(PucchHarqAckGrant),
    /// The UE has a PUSCH in the slot and multiplexes the UCI on it
    OnPusch,
    /// No PUCCH resource available
    Unavailable,
}

/// Outcome of an SR opportunity allocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SrAllocation {
    /// SR on its own PUCCH resource
    Granted(PucchInfo),
    /// SR bit added to the UE's existing PDU
    Merged(PucchInfo),
    /// The UE has a PUSCH in the slot and multiplexes the UCI on it
    OnPusch,
    /// No PUCCH resource available
    Unavailable,
}

impl SrAllocation {
    pub fn pdu(&self) -> Option<&PucchInfo> {
        match self {
            SrAllocation::Granted(pdu) | SrAllocation::Merged(pdu) => Some(pdu),
            _ => None,
        }
    }
}

/// PUCCH allocation interface used by the slot scheduler
///
/// Calls for a slot must be preceded by [`PucchAllocator::slot_indication`]
/// with the same slot the resource grid was advanced to.
pub trait PucchAllocator {
    /// Allocate a HARQ-ACK on the common PUCCH resources for a UE without
    /// dedicated configuration
    fn alloc_common_pucch_harq_ack_ue(
        &mut self,
        res_alloc: &mut CellResourceAllocator,
        tcrnti: Rnti,
        k0: u32,
        k1: u32,
        dci_info: &DciContext,
    ) -> Result<HarqAckAllocation, SchedulerError>;

    /// Allocate a HARQ-ACK on the dedicated PUCCH resources of a UE
    fn alloc_ded_pucch_harq_ack_ue(
        &mut self,
        res_alloc: &mut CellResourceAllocator,
        ue_cell_cfg: &UeCellConfiguration,
        k0: u32,
        k1: u32,
    ) -> Result<HarqAckAllocation, SchedulerError>;

    /// Allocate an SR opportunity of a UE in the given slot
    fn pucch_allocate_sr_opportunity(
        &mut self,
        slot_alloc: &mut CellSlotResourceAllocator,
        ue_cell_cfg: &UeCellConfiguration,
    ) -> Result<SrAllocation, SchedulerError>;

    /// Remove the PUCCH PDU of a UE and return the UCI bits it carried
    fn remove_ue_uci_from_pucch(
        &mut self,
        slot_alloc: &mut CellSlotResourceAllocator,
        crnti: Rnti,
    ) -> Result<PucchUciBits, SchedulerError>;

    /// Advance to a new transmission slot
    fn slot_indication(&mut self, sl_tx: SlotPoint) -> Result<(), SchedulerError>;
}
