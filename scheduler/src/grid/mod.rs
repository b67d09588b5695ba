//! Cell Resource Grid
//!
//! Ring of per-slot UL allocators. The scheduler looks ahead up to
//! [`RESOURCE_GRID_RING_SIZE`] - 1 slots from the current transmission slot;
//! an entry is recycled as soon as its slot falls behind the window.

pub mod sched_result;
pub mod ul_grid;

pub use sched_result::{
    PucchFormatInfo, PucchInfo, PucchResourceSource, PucchUciBits, PuschInfo, UlSchedResult,
    MAX_PUCCH_PDUS_PER_SLOT, MAX_PUSCH_PDUS_PER_SLOT,
};
pub use ul_grid::{CrbInterval, GrantInfo, OfdmSymbolRange, UlResourceGrid};

use crate::SchedulerError;
use common::{Rnti, SlotPoint, SubcarrierSpacing};
use tracing::trace;

/// Number of slots tracked by the cell resource grid
pub const RESOURCE_GRID_RING_SIZE: usize = 32;

/// UL allocations of one slot
#[derive(Debug, Clone)]
pub struct CellSlotResourceAllocator {
    /// Slot this allocator currently describes
    pub slot: SlotPoint,
    /// Occupied symbols x CRBs
    pub ul_res_grid: UlResourceGrid,
    /// PDUs scheduled in the slot
    pub result: UlSchedResult,
}

impl CellSlotResourceAllocator {
    pub fn new(slot: SlotPoint) -> Self {
        Self {
            slot,
            ul_res_grid: UlResourceGrid::default(),
            result: UlSchedResult::default(),
        }
    }

    /// Forget every allocation and re-target the allocator to a new slot
    pub fn reset(&mut self, slot: SlotPoint) {
        self.slot = slot;
        self.ul_res_grid.reset();
        self.result.clear();
    }

    /// Position of the PUCCH PDU of a UE, if any
    pub fn find_pucch(&self, crnti: Rnti) -> Option<usize> {
        self.result.pucchs.iter().position(|pucch| pucch.crnti == crnti)
    }

    /// Whether the UE has a PUSCH in this slot
    pub fn has_pusch(&self, crnti: Rnti) -> bool {
        self.result.puschs.iter().any(|pusch| pusch.crnti == crnti)
    }

    /// Place a PUSCH grant on the grid
    pub fn add_pusch(&mut self, crnti: Rnti, grant: GrantInfo) -> Result<(), SchedulerError> {
        if self.ul_res_grid.collides(&grant) {
            return Err(SchedulerError::ResourceUnavailable(format!(
                "PUSCH for rnti={} collides in slot {}",
                crnti, self.slot
            )));
        }
        self.result
            .puschs
            .push(PuschInfo { crnti, grant })
            .map_err(|_| {
                SchedulerError::ResourceUnavailable(format!("PUSCH list full in slot {}", self.slot))
            })?;
        self.ul_res_grid.fill(&grant);
        Ok(())
    }

    /// Append a PUCCH PDU and mark its hops on the grid
    pub fn push_pucch(&mut self, pucch: PucchInfo) -> Result<(), SchedulerError> {
        for hop in pucch.hops() {
            self.ul_res_grid.fill(hop);
        }
        let slot = self.slot;
        self.result.pucchs.push(pucch).map_err(|rejected| {
            // Undo the marking; other occupants of the area are re-marked.
            self.release_areas(&rejected);
            SchedulerError::ResourceUnavailable(format!("PUCCH list full in slot {}", slot))
        })
    }

    /// Swap the PUCCH PDU at `idx` for another one, moving its grid occupancy
    pub fn replace_pucch(&mut self, idx: usize, pucch: PucchInfo) -> PucchInfo {
        let old = std::mem::replace(&mut self.result.pucchs[idx], pucch);
        self.release_areas(&old);
        let hops: heapless::Vec<GrantInfo, 2> = self.result.pucchs[idx].hops().copied().collect();
        for hop in &hops {
            self.ul_res_grid.fill(hop);
        }
        old
    }

    /// Remove the PUCCH PDU at `idx` together with its grid occupancy
    pub fn remove_pucch(&mut self, idx: usize) -> PucchInfo {
        let removed = self.result.pucchs.remove(idx);
        self.release_areas(&removed);
        removed
    }

    // Clears the hops of a PDU no longer in the result, then re-marks every
    // remaining occupant sharing any of those positions.
    fn release_areas(&mut self, released: &PucchInfo) {
        for hop in released.hops() {
            self.ul_res_grid.clear(hop);
        }
        for hop in released.hops() {
            for pucch in self.result.pucchs.iter().filter(|p| p.overlaps(hop)) {
                for area in pucch.hops() {
                    self.ul_res_grid.fill(area);
                }
            }
            for pusch in self.result.puschs.iter().filter(|p| p.grant.overlaps(hop)) {
                self.ul_res_grid.fill(&pusch.grant);
            }
        }
    }
}

/// Ring of per-slot allocators indexed by offset from the current slot
#[derive(Debug)]
pub struct CellResourceAllocator {
    slots: [CellSlotResourceAllocator; RESOURCE_GRID_RING_SIZE],
    last_slot_ind: Option<SlotPoint>,
}

impl CellResourceAllocator {
    pub fn new(scs: SubcarrierSpacing) -> Self {
        Self {
            slots: std::array::from_fn(|i| {
                CellSlotResourceAllocator::new(SlotPoint::from_count(scs, i as u32))
            }),
            last_slot_ind: None,
        }
    }

    /// Move the window so that `sl_tx` is the slot at offset 0
    pub fn slot_indication(&mut self, sl_tx: SlotPoint) {
        for offset in 0..RESOURCE_GRID_RING_SIZE {
            let sl = sl_tx + offset as u32;
            let entry = &mut self.slots[ring_index(sl)];
            if entry.slot != sl {
                trace!("Recycling grid of slot {} for slot {}", entry.slot, sl);
                entry.reset(sl);
            }
        }
        self.last_slot_ind = Some(sl_tx);
    }

    /// Current transmission slot
    pub fn slot_tx(&self) -> Option<SlotPoint> {
        self.last_slot_ind
    }

    /// Allocator of the slot `offset` slots after the current one
    pub fn slot_alloc(&self, offset: usize) -> Result<&CellSlotResourceAllocator, SchedulerError> {
        let sl = self.target_slot(offset)?;
        Ok(&self.slots[ring_index(sl)])
    }

    /// Mutable allocator of the slot `offset` slots after the current one
    pub fn slot_alloc_mut(&mut self, offset: usize) -> Result<&mut CellSlotResourceAllocator, SchedulerError> {
        let sl = self.target_slot(offset)?;
        Ok(&mut self.slots[ring_index(sl)])
    }

    fn target_slot(&self, offset: usize) -> Result<SlotPoint, SchedulerError> {
        let sl_tx = self.last_slot_ind.ok_or(SchedulerError::NotInitialized)?;
        let sl = sl_tx + offset as u32;
        if offset >= RESOURCE_GRID_RING_SIZE {
            return Err(SchedulerError::SlotOutsideWindow { slot: sl, last: sl_tx });
        }
        Ok(sl)
    }
}

fn ring_index(sl: SlotPoint) -> usize {
    sl.to_uint() as usize % RESOURCE_GRID_RING_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_helpers::{f1_resource, test_cell_config};
    use crate::config::MaxCodeRate;

    fn scs() -> SubcarrierSpacing {
        SubcarrierSpacing::Scs30
    }

    fn full_slot(crbs: (u16, u16)) -> GrantInfo {
        GrantInfo::new(OfdmSymbolRange::new(0, 14), CrbInterval::new(crbs.0, crbs.1))
    }

    fn harq_pdu(rnti: u16, res_id: u8, prb: u16) -> PucchInfo {
        PucchInfo::dedicated(
            Rnti(rnti),
            &f1_resource(res_id, prb, 50 - prb),
            &test_cell_config().ul_bwp,
            MaxCodeRate::default(),
            PucchUciBits { harq_ack_nof_bits: 1, sr_bits: 0 },
        )
    }

    #[test]
    fn test_offsets_follow_slot_indication() {
        let mut res_alloc = CellResourceAllocator::new(scs());
        assert_eq!(res_alloc.slot_alloc(0).unwrap_err(), SchedulerError::NotInitialized);

        let sl = SlotPoint::new(scs(), 10, 3);
        res_alloc.slot_indication(sl);
        assert_eq!(res_alloc.slot_alloc(0).unwrap().slot, sl);
        assert_eq!(res_alloc.slot_alloc(5).unwrap().slot, sl + 5);
        assert!(res_alloc.slot_alloc(RESOURCE_GRID_RING_SIZE).is_err());
    }

    #[test]
    fn test_allocations_survive_until_slot_passes() {
        let mut res_alloc = CellResourceAllocator::new(scs());
        let sl = SlotPoint::from_count(scs(), 0);
        res_alloc.slot_indication(sl);
        res_alloc
            .slot_alloc_mut(4)
            .unwrap()
            .add_pusch(Rnti(0x4601), full_slot((20, 30)))
            .unwrap();

        for i in 1..=4 {
            res_alloc.slot_indication(sl + i);
        }
        assert!(res_alloc.slot_alloc(0).unwrap().has_pusch(Rnti(0x4601)));

        // Once the slot is left behind its ring entry is recycled.
        res_alloc.slot_indication(sl + 5);
        let recycled = res_alloc.slot_alloc(RESOURCE_GRID_RING_SIZE - 1).unwrap();
        assert_eq!(recycled.slot, sl + 4 + RESOURCE_GRID_RING_SIZE as u32);
        assert!(recycled.result.puschs.is_empty());
        assert!(recycled.ul_res_grid.is_empty());
    }

    #[test]
    fn test_pusch_collision_rejected() {
        let mut slot_alloc = CellSlotResourceAllocator::new(SlotPoint::from_count(scs(), 0));
        slot_alloc.add_pusch(Rnti(1), full_slot((0, 10))).unwrap();
        assert!(slot_alloc.add_pusch(Rnti(2), full_slot((9, 12))).is_err());
        assert_eq!(slot_alloc.result.puschs.len(), 1);
    }

    #[test]
    fn test_remove_pucch_keeps_shared_positions() {
        let mut slot_alloc = CellSlotResourceAllocator::new(SlotPoint::from_count(scs(), 0));
        let a = harq_pdu(1, 0, 5);
        let b = harq_pdu(2, 0, 5);
        slot_alloc.push_pucch(a.clone()).unwrap();
        slot_alloc.push_pucch(b).unwrap();

        let removed = slot_alloc.remove_pucch(0);
        assert_eq!(removed, a);
        assert!(slot_alloc.ul_res_grid.collides(&a.first_hop));

        slot_alloc.remove_pucch(0);
        assert!(slot_alloc.ul_res_grid.is_empty());
    }

    #[test]
    fn test_replace_pucch_moves_occupancy() {
        let mut slot_alloc = CellSlotResourceAllocator::new(SlotPoint::from_count(scs(), 0));
        let old = harq_pdu(1, 0, 5);
        let new = harq_pdu(1, 1, 6);
        slot_alloc.push_pucch(old.clone()).unwrap();

        slot_alloc.replace_pucch(0, new.clone());
        assert!(!slot_alloc.ul_res_grid.collides(&old.first_hop));
        assert!(slot_alloc.ul_res_grid.collides(&new.first_hop));
        assert_eq!(slot_alloc.result.pucchs.len(), 1);
    }
}
