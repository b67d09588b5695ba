//! PUCCH Allocator
//!
//! Places HARQ-ACK and SR PUCCH PDUs on the UL resource grid. A UE has at
//! most one PUCCH PDU per slot; HARQ-ACK and SR due in the same slot share
//! that PDU. Dedicated resources come from the [`PucchResourceManager`],
//! common resources are derived from the scheduling PDCCH (TS 38.213
//! Section 9.2.1).

use super::default_resources::{get_pucch_default_resource, PucchDefaultResource, NOF_PUCCH_RES_INDICATORS};
use super::resource_manager::{PucchResourceManager, RES_MANAGER_RING_BUFFER_SIZE};
use super::{HarqAckAllocation, HarqGrantKind, PucchAllocator, PucchHarqAckGrant, SrAllocation};
use crate::config::{CellConfiguration, DciContext, PucchFormat, PucchResource, UeCellConfiguration};
use crate::grid::{
    CellResourceAllocator, CellSlotResourceAllocator, GrantInfo, PucchFormatInfo, PucchInfo,
    PucchResourceSource, PucchUciBits, RESOURCE_GRID_RING_SIZE,
};
use crate::SchedulerError;
use common::{Rnti, SlotPoint};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// PUCCH allocator of one cell
#[derive(Debug)]
pub struct CellPucchAllocator {
    cell_cfg: Arc<CellConfiguration>,
    default_resource: PucchDefaultResource,
    resource_manager: PucchResourceManager,
    last_sl_ind: Option<SlotPoint>,
}

impl CellPucchAllocator {
    /// Create the allocator of a cell
    ///
    /// Fails when the cell configuration is invalid or its HARQ-ACK timing
    /// reaches further than the slots tracked by the grid or the resource
    /// manager.
    pub fn new(cell_cfg: Arc<CellConfiguration>) -> Result<Self, SchedulerError> {
        cell_cfg.validate()?;

        let bwp_size = cell_cfg.ul_bwp_size();
        let default_resource = get_pucch_default_resource(cell_cfg.pucch_resource_common, bwp_size)
            .filter(|res| res.prbs(0, bwp_size).is_some())
            .ok_or_else(|| {
                SchedulerError::InvalidConfiguration(format!(
                    "pucch-ResourceCommon {} does not fit a UL BWP of {} PRBs",
                    cell_cfg.pucch_resource_common, bwp_size
                ))
            })?;

        let max_harq_timing = cell_cfg.max_harq_timing() as usize;
        if max_harq_timing >= RES_MANAGER_RING_BUFFER_SIZE || max_harq_timing >= RESOURCE_GRID_RING_SIZE {
            return Err(SchedulerError::InvalidConfiguration(format!(
                "HARQ-ACK timing of {} slots exceeds the {} slots tracked",
                max_harq_timing,
                RES_MANAGER_RING_BUFFER_SIZE.min(RESOURCE_GRID_RING_SIZE)
            )));
        }

        info!(
            "PUCCH allocator for cell {}: pucch-ResourceCommon={}, UL BWP {} PRBs",
            cell_cfg.cell_id.0, cell_cfg.pucch_resource_common, bwp_size
        );

        Ok(Self {
            cell_cfg,
            default_resource,
            resource_manager: PucchResourceManager::new(),
            last_sl_ind: None,
        })
    }

    /// Checks the grid was advanced to the same slot as the allocator
    fn check_slot(&self, res_alloc: &CellResourceAllocator) -> Result<SlotPoint, SchedulerError> {
        let expected = self.last_sl_ind.ok_or(SchedulerError::NotInitialized)?;
        let received = res_alloc.slot_tx().ok_or(SchedulerError::NotInitialized)?;
        if expected != received {
            return Err(SchedulerError::SlotMismatch { expected, received });
        }
        Ok(expected)
    }

    /// Whether r_PUCCH is unused in the slot and both of its hops can be
    /// occupied, alone or sharing a common PRB with another cyclic shift
    fn common_candidate_free(
        slot_alloc: &CellSlotResourceAllocator,
        r_pucch: u8,
        hops: &(GrantInfo, GrantInfo),
    ) -> bool {
        let taken = slot_alloc.result.pucchs.iter().any(|pucch| {
            matches!(pucch.source, PucchResourceSource::Common { r_pucch: r, .. } if r == r_pucch)
        });
        !taken && common_hop_free(slot_alloc, &hops.0) && common_hop_free(slot_alloc, &hops.1)
    }

    fn common_format(&self, r_pucch: u8) -> PucchFormatInfo {
        let initial_cyclic_shift = self.default_resource.initial_cyclic_shift(r_pucch);
        match self.default_resource.format {
            PucchFormat::Format0 => PucchFormatInfo::Format0 { initial_cyclic_shift },
            _ => PucchFormatInfo::Format1 {
                initial_cyclic_shift,
                time_domain_occ: 0,
            },
        }
    }

    /// Whether both hops of a dedicated resource are clear of every other
    /// occupant of the slot. The PDU at `own` is about to be moved and does
    /// not count.
    fn ded_resource_free(
        &self,
        slot_alloc: &CellSlotResourceAllocator,
        resource: &PucchResource,
        own: Option<usize>,
    ) -> bool {
        let (first_hop, second_hop) = resource.grants(&self.cell_cfg.ul_bwp);
        std::iter::once(first_hop).chain(second_hop).all(|hop| {
            if !slot_alloc.ul_res_grid.collides(&hop) {
                return true;
            }
            let pucchs = &slot_alloc.result.pucchs;
            let by_own = own.is_some_and(|idx| pucchs[idx].overlaps(&hop));
            let by_other = pucchs
                .iter()
                .enumerate()
                .any(|(idx, pucch)| Some(idx) != own && pucch.overlaps(&hop))
                || slot_alloc.result.puschs.iter().any(|pusch| pusch.grant.overlaps(&hop));
            by_own && !by_other
        })
    }

    /// Add a HARQ-ACK bit to the UE's existing dedicated PDU
    fn update_ded_harq(
        &mut self,
        slot_alloc: &mut CellSlotResourceAllocator,
        idx: usize,
        ue_cell_cfg: &UeCellConfiguration,
    ) -> Result<HarqAckAllocation, SchedulerError> {
        let crnti = ue_cell_cfg.crnti;
        let sl_ack = slot_alloc.slot;
        let existing = &slot_alloc.result.pucchs[idx];

        if existing.is_common() {
            debug!(
                "rnti={} already has a common PUCCH in slot {}, dedicated HARQ-ACK not possible",
                crnti, sl_ack
            );
            return Ok(HarqAckAllocation::Unavailable);
        }

        if existing.uci.harq_ack_nof_bits > 0 {
            let Some(pucch_res_indicator) = self.resource_manager.lookup_indicator(sl_ack, crnti)? else {
                warn!(
                    "rnti={} has a HARQ-ACK PUCCH in slot {} without a reserved indicator",
                    crnti, sl_ack
                );
                return Ok(HarqAckAllocation::Unavailable);
            };
            let pdu = &mut slot_alloc.result.pucchs[idx];
            if !add_harq_bit(pdu) {
                debug!("PUCCH of rnti={} in slot {} cannot carry more HARQ-ACK bits", crnti, sl_ack);
                return Ok(HarqAckAllocation::Unavailable);
            }
            debug!(
                "rnti={} HARQ-ACK bits in slot {} increased to {}",
                crnti, sl_ack, pdu.uci.harq_ack_nof_bits
            );
            return Ok(HarqAckAllocation::Granted(PucchHarqAckGrant {
                pucch_res_indicator,
                kind: HarqGrantKind::Update,
                pdu: pdu.clone(),
            }));
        }

        // SR only: move the PDU onto a HARQ-ACK resource carrying both.
        let sr_bits = existing.uci.sr_bits;
        let Some(candidate) = self.resource_manager.next_harq(sl_ack, crnti, &ue_cell_cfg.pucch_cfg)? else {
            return Ok(HarqAckAllocation::Unavailable);
        };
        if !self.ded_resource_free(slot_alloc, candidate.resource, Some(idx)) {
            debug!(
                "HARQ-ACK resource {} of rnti={} is occupied in slot {}",
                candidate.resource.res_id, crnti, sl_ack
            );
            return Ok(HarqAckAllocation::Unavailable);
        }
        let Some(reservation) =
            self.resource_manager
                .reserve_harq(sl_ack, crnti, &ue_cell_cfg.pucch_cfg)?
        else {
            return Ok(HarqAckAllocation::Unavailable);
        };
        let pdu = PucchInfo::dedicated(
            crnti,
            reservation.resource,
            &self.cell_cfg.ul_bwp,
            ue_cell_cfg.pucch_cfg.max_code_rate,
            PucchUciBits {
                harq_ack_nof_bits: 1,
                sr_bits,
            },
        );
        slot_alloc.replace_pucch(idx, pdu.clone());
        debug!(
            "rnti={} SR PUCCH in slot {} moved to HARQ-ACK resource {}",
            crnti, sl_ack, reservation.resource.res_id
        );

        Ok(HarqAckAllocation::Granted(PucchHarqAckGrant {
            pucch_res_indicator: reservation.pucch_res_indicator,
            kind: HarqGrantKind::Update,
            pdu,
        }))
    }

    /// Reserve a HARQ-ACK resource and place a new PDU on it
    fn new_ded_harq(
        &mut self,
        slot_alloc: &mut CellSlotResourceAllocator,
        ue_cell_cfg: &UeCellConfiguration,
    ) -> Result<HarqAckAllocation, SchedulerError> {
        let crnti = ue_cell_cfg.crnti;
        let sl_ack = slot_alloc.slot;

        if slot_alloc.result.pucchs.is_full() {
            debug!("PUCCH PDU list of slot {} is full", sl_ack);
            return Ok(HarqAckAllocation::Unavailable);
        }
        let Some(candidate) = self.resource_manager.next_harq(sl_ack, crnti, &ue_cell_cfg.pucch_cfg)? else {
            return Ok(HarqAckAllocation::Unavailable);
        };
        if !self.ded_resource_free(slot_alloc, candidate.resource, None) {
            debug!(
                "HARQ-ACK resource {} of rnti={} is occupied in slot {}",
                candidate.resource.res_id, crnti, sl_ack
            );
            return Ok(HarqAckAllocation::Unavailable);
        }
        let Some(reservation) =
            self.resource_manager
                .reserve_harq(sl_ack, crnti, &ue_cell_cfg.pucch_cfg)?
        else {
            return Ok(HarqAckAllocation::Unavailable);
        };

        let pdu = PucchInfo::dedicated(
            crnti,
            reservation.resource,
            &self.cell_cfg.ul_bwp,
            ue_cell_cfg.pucch_cfg.max_code_rate,
            PucchUciBits {
                harq_ack_nof_bits: 1,
                sr_bits: 0,
            },
        );
        slot_alloc.push_pucch(pdu.clone())?;
        debug!(
            "rnti={} HARQ-ACK PUCCH in slot {}: resource {}, pri={}",
            crnti, sl_ack, reservation.resource.res_id, reservation.pucch_res_indicator
        );

        Ok(HarqAckAllocation::Granted(PucchHarqAckGrant {
            pucch_res_indicator: reservation.pucch_res_indicator,
            kind: HarqGrantKind::New,
            pdu,
        }))
    }
}

impl PucchAllocator for CellPucchAllocator {
    fn alloc_common_pucch_harq_ack_ue(
        &mut self,
        res_alloc: &mut CellResourceAllocator,
        tcrnti: Rnti,
        k0: u32,
        k1: u32,
        dci_info: &DciContext,
    ) -> Result<HarqAckAllocation, SchedulerError> {
        let sl_tx = self.check_slot(res_alloc)?;
        dci_info.validate()?;

        let slot_alloc = res_alloc.slot_alloc_mut(harq_offset(sl_tx, k0, k1)?)?;
        let sl_ack = slot_alloc.slot;

        if slot_alloc.has_pusch(tcrnti) {
            debug!("rnti={} HARQ-ACK in slot {} goes on PUSCH", tcrnti, sl_ack);
            return Ok(HarqAckAllocation::OnPusch);
        }

        if let Some(idx) = slot_alloc.find_pucch(tcrnti) {
            let existing = &mut slot_alloc.result.pucchs[idx];
            let PucchResourceSource::Common { pucch_res_indicator, .. } = existing.source else {
                debug!(
                    "rnti={} already has a dedicated PUCCH in slot {}, common HARQ-ACK not possible",
                    tcrnti, sl_ack
                );
                return Ok(HarqAckAllocation::Unavailable);
            };
            if !add_harq_bit(existing) {
                debug!("Common PUCCH of rnti={} in slot {} is full", tcrnti, sl_ack);
                return Ok(HarqAckAllocation::Unavailable);
            }
            return Ok(HarqAckAllocation::Granted(PucchHarqAckGrant {
                pucch_res_indicator,
                kind: HarqGrantKind::Update,
                pdu: existing.clone(),
            }));
        }

        if slot_alloc.result.pucchs.is_full() {
            debug!("PUCCH PDU list of slot {} is full", sl_ack);
            return Ok(HarqAckAllocation::Unavailable);
        }

        for pucch_res_indicator in 0..NOF_PUCCH_RES_INDICATORS {
            let r_pucch =
                PucchDefaultResource::r_pucch(dci_info.n_cce, dci_info.nof_coreset_cces, pucch_res_indicator);
            let Some(hops) = self.default_resource.grants(r_pucch, &self.cell_cfg.ul_bwp) else {
                continue;
            };
            if let Some(pusch) = slot_alloc
                .result
                .puschs
                .iter()
                .find(|pusch| pusch.grant.overlaps(&hops.0) || pusch.grant.overlaps(&hops.1))
            {
                debug!(
                    "Common PUCCH r_PUCCH={} of rnti={} in slot {} collides with PUSCH of rnti={}",
                    r_pucch, tcrnti, sl_ack, pusch.crnti
                );
                return Ok(HarqAckAllocation::Unavailable);
            }
            if !Self::common_candidate_free(slot_alloc, r_pucch, &hops) {
                continue;
            }
            let (first_hop, second_hop) = hops;

            let pdu = PucchInfo {
                crnti: tcrnti,
                source: PucchResourceSource::Common {
                    r_pucch,
                    pucch_res_indicator,
                },
                first_hop,
                second_hop: Some(second_hop),
                format: self.common_format(r_pucch),
                uci: PucchUciBits {
                    harq_ack_nof_bits: 1,
                    sr_bits: 0,
                },
            };
            slot_alloc.push_pucch(pdu.clone())?;
            debug!(
                "rnti={} common HARQ-ACK PUCCH in slot {}: r_PUCCH={}, pri={}",
                tcrnti, sl_ack, r_pucch, pucch_res_indicator
            );

            return Ok(HarqAckAllocation::Granted(PucchHarqAckGrant {
                pucch_res_indicator,
                kind: HarqGrantKind::New,
                pdu,
            }));
        }

        debug!("No common PUCCH resource free for rnti={} in slot {}", tcrnti, sl_ack);
        Ok(HarqAckAllocation::Unavailable)
    }

    fn alloc_ded_pucch_harq_ack_ue(
        &mut self,
        res_alloc: &mut CellResourceAllocator,
        ue_cell_cfg: &UeCellConfiguration,
        k0: u32,
        k1: u32,
    ) -> Result<HarqAckAllocation, SchedulerError> {
        let sl_tx = self.check_slot(res_alloc)?;
        let crnti = ue_cell_cfg.crnti;

        let slot_alloc = res_alloc.slot_alloc_mut(harq_offset(sl_tx, k0, k1)?)?;
        if slot_alloc.has_pusch(crnti) {
            debug!("rnti={} HARQ-ACK in slot {} goes on PUSCH", crnti, slot_alloc.slot);
            return Ok(HarqAckAllocation::OnPusch);
        }

        match slot_alloc.find_pucch(crnti) {
            Some(idx) => self.update_ded_harq(slot_alloc, idx, ue_cell_cfg),
            None => self.new_ded_harq(slot_alloc, ue_cell_cfg),
        }
    }

    fn pucch_allocate_sr_opportunity(
        &mut self,
        slot_alloc: &mut CellSlotResourceAllocator,
        ue_cell_cfg: &UeCellConfiguration,
    ) -> Result<SrAllocation, SchedulerError> {
        let crnti = ue_cell_cfg.crnti;
        let sl = slot_alloc.slot;
        let pucch_res_indicator = self.resource_manager.lookup_indicator(sl, crnti)?;

        if slot_alloc.has_pusch(crnti) {
            debug!("rnti={} SR in slot {} goes on PUSCH", crnti, sl);
            return Ok(SrAllocation::OnPusch);
        }

        if let Some(idx) = slot_alloc.find_pucch(crnti) {
            let pdu = &mut slot_alloc.result.pucchs[idx];
            if pdu.uci.sr_bits > 0 {
                return Ok(SrAllocation::Merged(pdu.clone()));
            }

            let uci = PucchUciBits { sr_bits: 1, ..pdu.uci };
            if !pdu.format.can_carry(&uci) {
                debug!("PUCCH of rnti={} in slot {} cannot carry the SR bit", crnti, sl);
                return Ok(SrAllocation::Unavailable);
            }
            pdu.uci = uci;
            debug!(
                "rnti={} SR merged into HARQ-ACK PUCCH in slot {} (pri={:?})",
                crnti, sl, pucch_res_indicator
            );
            return Ok(SrAllocation::Merged(pdu.clone()));
        }

        if slot_alloc.result.pucchs.is_full() {
            debug!("PUCCH PDU list of slot {} is full", sl);
            return Ok(SrAllocation::Unavailable);
        }
        let Some(sr_resource) = ue_cell_cfg.pucch_cfg.sr_resource() else {
            return Ok(SrAllocation::Unavailable);
        };
        if !self.ded_resource_free(slot_alloc, sr_resource, None) {
            debug!("SR resource of rnti={} is occupied in slot {}", crnti, sl);
            return Ok(SrAllocation::Unavailable);
        }
        let Some(resource) = self.resource_manager.reserve_sr(sl, &ue_cell_cfg.pucch_cfg)? else {
            return Ok(SrAllocation::Unavailable);
        };

        let pdu = PucchInfo::dedicated(
            crnti,
            resource,
            &self.cell_cfg.ul_bwp,
            ue_cell_cfg.pucch_cfg.max_code_rate,
            PucchUciBits {
                harq_ack_nof_bits: 0,
                sr_bits: 1,
            },
        );
        slot_alloc.push_pucch(pdu.clone())?;
        debug!("rnti={} SR PUCCH in slot {}: resource {}", crnti, sl, resource.res_id);

        Ok(SrAllocation::Granted(pdu))
    }

    fn remove_ue_uci_from_pucch(
        &mut self,
        slot_alloc: &mut CellSlotResourceAllocator,
        crnti: Rnti,
    ) -> Result<PucchUciBits, SchedulerError> {
        let idx = slot_alloc.find_pucch(crnti).ok_or(SchedulerError::GrantNotFound {
            rnti: crnti,
            slot: slot_alloc.slot,
        })?;

        let removed = slot_alloc.remove_pucch(idx);
        debug!(
            "Removed PUCCH of rnti={} in slot {}: {} HARQ-ACK bits, {} SR bits",
            crnti, slot_alloc.slot, removed.uci.harq_ack_nof_bits, removed.uci.sr_bits
        );
        Ok(removed.uci)
    }

    fn slot_indication(&mut self, sl_tx: SlotPoint) -> Result<(), SchedulerError> {
        self.resource_manager.slot_indication(sl_tx)?;
        self.last_sl_ind = Some(sl_tx);
        Ok(())
    }
}

/// Slot offset of a HARQ-ACK from the PDCCH slot
fn harq_offset(sl_tx: SlotPoint, k0: u32, k1: u32) -> Result<usize, SchedulerError> {
    k0.checked_add(k1)
        .map(|k| k as usize)
        .ok_or(SchedulerError::SlotOutsideWindow {
            slot: sl_tx + k0,
            last: sl_tx,
        })
}

/// Add one HARQ-ACK bit to a PDU if its format can carry it
fn add_harq_bit(pdu: &mut PucchInfo) -> bool {
    let Some(harq_ack_nof_bits) = pdu.uci.harq_ack_nof_bits.checked_add(1) else {
        return false;
    };
    let uci = PucchUciBits {
        harq_ack_nof_bits,
        ..pdu.uci
    };
    if !pdu.format.can_carry(&uci) {
        return false;
    }
    pdu.uci = uci;
    true
}

/// A common PUCCH hop is free when nothing occupies it, or when it is the
/// exact hop of another common PUCCH (shared with a different cyclic shift)
/// and no dedicated PUCCH overlaps it.
fn common_hop_free(slot_alloc: &CellSlotResourceAllocator, hop: &GrantInfo) -> bool {
    if !slot_alloc.ul_res_grid.collides(hop) {
        return true;
    }

    let pucchs = &slot_alloc.result.pucchs;
    let shared = pucchs
        .iter()
        .any(|pucch| pucch.is_common() && pucch.hops().any(|h| h == hop));
    let blocked = pucchs.iter().any(|pucch| !pucch.is_common() && pucch.overlaps(hop));

    shared && !blocked
}
