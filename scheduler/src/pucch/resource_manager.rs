//! PUCCH Resource Manager
//!
//! Keeps track of the dedicated PUCCH resources handed out per slot. Records
//! live in a ring indexed by slot; a record is reset when its slot falls
//! behind the current slot, which frees it for the slot `RING` slots later.

use crate::config::{PucchConfig, PucchResource, MAX_HARQ_PUCCH_RESOURCES};
use crate::SchedulerError;
use common::{Rnti, SlotPoint};
use tracing::{debug, trace, warn};

/// Number of slots for which reservations are tracked
pub const RES_MANAGER_RING_BUFFER_SIZE: usize = 20;

/// Reservations of one slot
#[derive(Debug, Clone, PartialEq, Eq)]
struct SlotResourceRecord {
    sr_resource_available: bool,
    next_pucch_harq_res_idx: usize,
    /// UE holding each HARQ-ACK resource indicator, in indicator order
    rnti_records: heapless::Vec<Rnti, MAX_HARQ_PUCCH_RESOURCES>,
}

impl SlotResourceRecord {
    fn new() -> Self {
        Self {
            sr_resource_available: true,
            next_pucch_harq_res_idx: 0,
            rnti_records: heapless::Vec::new(),
        }
    }

    fn reset(&mut self) {
        *self = Self::new();
    }
}

/// HARQ-ACK resource handed to a UE
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HarqResourceReservation<'a> {
    pub resource: &'a PucchResource,
    pub pucch_res_indicator: u8,
}

/// Per-slot bookkeeping of dedicated HARQ-ACK and SR resources
#[derive(Debug)]
pub struct PucchResourceManager {
    records: [SlotResourceRecord; RES_MANAGER_RING_BUFFER_SIZE],
    last_sl_ind: Option<SlotPoint>,
}

impl Default for PucchResourceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PucchResourceManager {
    pub fn new() -> Self {
        Self {
            records: std::array::from_fn(|_| SlotResourceRecord::new()),
            last_sl_ind: None,
        }
    }

    /// Advance the window to `slot_tx`
    ///
    /// Records of the slots left behind are reset. Indicating the current
    /// slot again does nothing; going back in time is an error.
    pub fn slot_indication(&mut self, slot_tx: SlotPoint) -> Result<(), SchedulerError> {
        let Some(last) = self.last_sl_ind else {
            self.last_sl_ind = Some(slot_tx);
            return Ok(());
        };

        let nof_passed = slot_tx - last;
        if nof_passed < 0 {
            return Err(SchedulerError::SlotRegression {
                last,
                received: slot_tx,
            });
        }
        if nof_passed == 0 {
            return Ok(());
        }
        if nof_passed > 1 {
            warn!(
                "PUCCH resource manager skipped {} slots between {} and {}",
                nof_passed - 1,
                last,
                slot_tx
            );
        }

        for i in 0..(nof_passed as usize).min(RES_MANAGER_RING_BUFFER_SIZE) {
            let sl = last + i as u32;
            trace!("Resetting PUCCH reservations of slot {}", sl);
            self.records[ring_index(sl)].reset();
        }
        self.last_sl_ind = Some(slot_tx);
        Ok(())
    }

    /// HARQ-ACK resource `reserve_harq` would hand out, without reserving it
    pub fn next_harq<'a>(
        &self,
        slot: SlotPoint,
        crnti: Rnti,
        pucch_cfg: &'a PucchConfig,
    ) -> Result<Option<HarqResourceReservation<'a>>, SchedulerError> {
        let record = &self.records[self.window_index(slot)?];

        let pri = match record.rnti_records.iter().position(|rnti| *rnti == crnti) {
            Some(pri) => pri,
            None => {
                let pri = record.next_pucch_harq_res_idx;
                if pri >= MAX_HARQ_PUCCH_RESOURCES || record.rnti_records.is_full() {
                    debug!("No HARQ-ACK PUCCH resource left in slot {} for rnti={}", slot, crnti);
                    return Ok(None);
                }
                pri
            }
        };
        let Some(resource) = pucch_cfg.harq_resource(pri) else {
            debug!(
                "rnti={} has no HARQ-ACK PUCCH resource for indicator {} in slot {}",
                crnti, pri, slot
            );
            return Ok(None);
        };

        Ok(Some(HarqResourceReservation {
            resource,
            pucch_res_indicator: pri as u8,
        }))
    }

    /// Reserve the next free HARQ-ACK resource of `slot` for a UE
    ///
    /// Indicators are handed out in increasing order and are not reused within
    /// the slot. A UE that already holds an indicator in the slot gets the
    /// same one back. Returns `None` when the slot ran out of indicators or
    /// the UE's HARQ-ACK resource set has no resource for the next one.
    pub fn reserve_harq<'a>(
        &mut self,
        slot: SlotPoint,
        crnti: Rnti,
        pucch_cfg: &'a PucchConfig,
    ) -> Result<Option<HarqResourceReservation<'a>>, SchedulerError> {
        let Some(reservation) = self.next_harq(slot, crnti, pucch_cfg)? else {
            return Ok(None);
        };

        let record = &mut self.records[ring_index(slot)];
        if record.rnti_records.contains(&crnti) {
            return Ok(Some(reservation));
        }
        if record.rnti_records.push(crnti).is_err() {
            return Ok(None);
        }
        record.next_pucch_harq_res_idx += 1;
        Ok(Some(reservation))
    }

    /// Reserve the SR resource of `slot`
    ///
    /// The resource stays taken until the slot leaves the window, also when
    /// the PDU placed on it is removed.
    pub fn reserve_sr<'a>(
        &mut self,
        slot: SlotPoint,
        pucch_cfg: &'a PucchConfig,
    ) -> Result<Option<&'a PucchResource>, SchedulerError> {
        let idx = self.window_index(slot)?;
        let record = &mut self.records[idx];
        if !record.sr_resource_available {
            debug!("SR PUCCH resource of slot {} already taken", slot);
            return Ok(None);
        }
        let Some(resource) = pucch_cfg.sr_resource() else {
            return Ok(None);
        };
        record.sr_resource_available = false;
        Ok(Some(resource))
    }

    /// HARQ-ACK resource indicator held by a UE in `slot`
    pub fn lookup_indicator(&self, slot: SlotPoint, crnti: Rnti) -> Result<Option<u8>, SchedulerError> {
        let record = &self.records[self.window_index(slot)?];
        Ok(record
            .rnti_records
            .iter()
            .position(|rnti| *rnti == crnti)
            .map(|pri| pri as u8))
    }

    fn window_index(&self, slot: SlotPoint) -> Result<usize, SchedulerError> {
        let last = self.last_sl_ind.ok_or(SchedulerError::NotInitialized)?;
        let distance = slot - last;
        if !(0..RES_MANAGER_RING_BUFFER_SIZE as i32).contains(&distance) {
            return Err(SchedulerError::SlotOutsideWindow { slot, last });
        }
        Ok(ring_index(slot))
    }
}

fn ring_index(slot: SlotPoint) -> usize {
    slot.to_uint() as usize % RES_MANAGER_RING_BUFFER_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_helpers::test_ue_config;
    use common::SubcarrierSpacing;
    use proptest::prelude::*;

    fn slot(count: u32) -> SlotPoint {
        SlotPoint::from_count(SubcarrierSpacing::Scs30, count)
    }

    fn record_is_empty(manager: &PucchResourceManager, sl: SlotPoint) -> bool {
        manager.records[ring_index(sl)] == SlotResourceRecord::new()
    }

    #[test]
    fn test_requires_slot_indication() {
        let mut manager = PucchResourceManager::new();
        let cfg = test_ue_config(0x4601).pucch_cfg;
        assert_eq!(
            manager.reserve_harq(slot(0), Rnti(0x4601), &cfg),
            Err(SchedulerError::NotInitialized)
        );
        assert_eq!(manager.reserve_sr(slot(0), &cfg), Err(SchedulerError::NotInitialized));
    }

    #[test]
    fn test_harq_exhaustion_and_next_slot() {
        let mut manager = PucchResourceManager::new();
        manager.slot_indication(slot(0)).unwrap();
        let cfg = test_ue_config(0x4601).pucch_cfg;

        for i in 0..8u16 {
            let res = manager.reserve_harq(slot(4), Rnti(0x4601 + i), &cfg).unwrap().unwrap();
            assert_eq!(res.pucch_res_indicator, i as u8);
            assert_eq!(res.resource.res_id, i as u8);
        }
        assert_eq!(manager.reserve_harq(slot(4), Rnti(0x4700), &cfg), Ok(None));
        assert_eq!(manager.lookup_indicator(slot(4), Rnti(0x4700)), Ok(None));

        for i in 0..8u16 {
            let res = manager.reserve_harq(slot(5), Rnti(0x4601 + i), &cfg).unwrap().unwrap();
            assert_eq!(res.pucch_res_indicator, i as u8);
        }
    }

    #[test]
    fn test_same_ue_keeps_its_indicator() {
        let mut manager = PucchResourceManager::new();
        manager.slot_indication(slot(0)).unwrap();
        let cfg = test_ue_config(0x4601).pucch_cfg;

        manager.reserve_harq(slot(3), Rnti(0x4601), &cfg).unwrap();
        let res = manager.reserve_harq(slot(3), Rnti(0x4602), &cfg).unwrap().unwrap();
        assert_eq!(res.pucch_res_indicator, 1);
        let again = manager.reserve_harq(slot(3), Rnti(0x4601), &cfg).unwrap().unwrap();
        assert_eq!(again.pucch_res_indicator, 0);
        assert_eq!(manager.lookup_indicator(slot(3), Rnti(0x4602)), Ok(Some(1)));
    }

    #[test]
    fn test_next_harq_does_not_reserve() {
        let mut manager = PucchResourceManager::new();
        manager.slot_indication(slot(0)).unwrap();
        let cfg = test_ue_config(0x4601).pucch_cfg;

        let peeked = manager.next_harq(slot(4), Rnti(0x4601), &cfg).unwrap().unwrap();
        assert_eq!(peeked.pucch_res_indicator, 0);
        assert!(record_is_empty(&manager, slot(4)));

        let reserved = manager.reserve_harq(slot(4), Rnti(0x4601), &cfg).unwrap().unwrap();
        assert_eq!(reserved, peeked);
        let next = manager.next_harq(slot(4), Rnti(0x4602), &cfg).unwrap().unwrap();
        assert_eq!(next.pucch_res_indicator, 1);
    }

    #[test]
    fn test_short_harq_resource_set() {
        let mut manager = PucchResourceManager::new();
        manager.slot_indication(slot(0)).unwrap();
        let mut cfg = test_ue_config(0x4601).pucch_cfg;
        cfg.harq_resource_ids.truncate(1);

        assert!(manager.reserve_harq(slot(1), Rnti(0x4601), &cfg).unwrap().is_some());
        assert_eq!(manager.reserve_harq(slot(1), Rnti(0x4602), &cfg), Ok(None));
    }

    #[test]
    fn test_single_sr_per_slot() {
        let mut manager = PucchResourceManager::new();
        manager.slot_indication(slot(0)).unwrap();
        let cfg = test_ue_config(0x4601).pucch_cfg;

        let sr = manager.reserve_sr(slot(2), &cfg).unwrap();
        assert_eq!(sr.map(|res| res.res_id), Some(8));
        assert_eq!(manager.reserve_sr(slot(2), &cfg), Ok(None));
        assert!(manager.reserve_sr(slot(3), &cfg).unwrap().is_some());
    }

    #[test]
    fn test_ring_boundary() {
        let mut manager = PucchResourceManager::new();
        let cfg = test_ue_config(0x4601).pucch_cfg;
        manager.slot_indication(slot(5)).unwrap();

        manager.reserve_harq(slot(5), Rnti(0x4601), &cfg).unwrap().unwrap();
        assert_eq!(manager.lookup_indicator(slot(5), Rnti(0x4601)), Ok(Some(0)));

        for count in 6..=24 {
            manager.slot_indication(slot(count)).unwrap();
        }
        assert!(record_is_empty(&manager, slot(5)));

        // Slot 25 maps onto the ring position of slot 5.
        let res = manager.reserve_harq(slot(25), Rnti(0x4602), &cfg).unwrap().unwrap();
        assert_eq!(res.pucch_res_indicator, 0);
        assert_eq!(manager.lookup_indicator(slot(25), Rnti(0x4601)), Ok(None));
    }

    #[test]
    fn test_reservations_survive_until_slot_passes() {
        let mut manager = PucchResourceManager::new();
        let cfg = test_ue_config(0x4601).pucch_cfg;
        manager.slot_indication(slot(0)).unwrap();
        manager.reserve_harq(slot(8), Rnti(0x4601), &cfg).unwrap();

        for count in 1..=8 {
            manager.slot_indication(slot(count)).unwrap();
        }
        assert_eq!(manager.lookup_indicator(slot(8), Rnti(0x4601)), Ok(Some(0)));
    }

    #[test]
    fn test_window_errors() {
        let mut manager = PucchResourceManager::new();
        let cfg = test_ue_config(0x4601).pucch_cfg;
        manager.slot_indication(slot(10)).unwrap();

        assert_eq!(
            manager.slot_indication(slot(9)),
            Err(SchedulerError::SlotRegression { last: slot(10), received: slot(9) })
        );
        assert_eq!(manager.slot_indication(slot(10)), Ok(()));

        assert_eq!(
            manager.reserve_harq(slot(30), Rnti(0x4601), &cfg),
            Err(SchedulerError::SlotOutsideWindow { slot: slot(30), last: slot(10) })
        );
        assert!(manager.lookup_indicator(slot(9), Rnti(0x4601)).is_err());
        assert!(manager.reserve_sr(slot(29), &cfg).unwrap().is_some());
    }

    #[test]
    fn test_slot_gap_resets_whole_ring() {
        let mut manager = PucchResourceManager::new();
        let cfg = test_ue_config(0x4601).pucch_cfg;
        manager.slot_indication(slot(0)).unwrap();
        for count in 0..20 {
            manager.reserve_sr(slot(count), &cfg).unwrap();
        }

        manager.slot_indication(slot(100)).unwrap();
        for count in 100..120 {
            assert!(record_is_empty(&manager, slot(count)));
        }
    }

    #[test]
    fn test_wraps_with_sfn() {
        let mut manager = PucchResourceManager::new();
        let cfg = test_ue_config(0x4601).pucch_cfg;
        let period = SlotPoint::period(SubcarrierSpacing::Scs30);
        let last = slot(period - 2);
        manager.slot_indication(last).unwrap();

        let after_wrap = last + 5;
        assert_eq!(after_wrap.to_uint(), 3);
        assert!(manager.reserve_harq(after_wrap, Rnti(0x4601), &cfg).unwrap().is_some());
        manager.slot_indication(after_wrap).unwrap();
        assert_eq!(manager.lookup_indicator(after_wrap, Rnti(0x4601)), Ok(Some(0)));
    }

    proptest! {
        #[test]
        fn prop_passed_slots_are_reset(steps in prop::collection::vec(1u32..30, 1..40)) {
            let mut manager = PucchResourceManager::new();
            let cfg = test_ue_config(0x4601).pucch_cfg;
            let mut sl = slot(0);
            manager.slot_indication(sl).unwrap();

            for (i, step) in steps.into_iter().enumerate() {
                let far = sl + (RES_MANAGER_RING_BUFFER_SIZE as u32 - 1);
                manager.reserve_harq(far, Rnti(0x4601 + i as u16), &cfg).unwrap();
                manager.reserve_sr(sl, &cfg).unwrap();

                let next = sl + step;
                manager.slot_indication(next).unwrap();
                for passed in 0..step.min(RES_MANAGER_RING_BUFFER_SIZE as u32) {
                    let reused = sl + passed + RES_MANAGER_RING_BUFFER_SIZE as u32;
                    prop_assert!(record_is_empty(&manager, reused));
                }
                sl = next;
            }
        }

        #[test]
        fn prop_indicators_are_unique(rntis in prop::collection::vec(1u16..20, 1..30)) {
            let mut manager = PucchResourceManager::new();
            let cfg = test_ue_config(0x4601).pucch_cfg;
            manager.slot_indication(slot(0)).unwrap();

            let mut holders: Vec<Rnti> = Vec::new();
            for rnti in rntis.into_iter().map(Rnti) {
                let before = holders.len();
                match manager.reserve_harq(slot(4), rnti, &cfg).unwrap() {
                    Some(res) => {
                        let pri = res.pucch_res_indicator as usize;
                        if pri == before {
                            holders.push(rnti);
                        }
                        prop_assert_eq!(holders[pri], rnti);
                    }
                    None => {
                        prop_assert_eq!(before, MAX_HARQ_PUCCH_RESOURCES);
                        prop_assert!(!holders.contains(&rnti));
                    }
                }
            }
            prop_assert!(holders.len() <= MAX_HARQ_PUCCH_RESOURCES);
        }
    }
}
