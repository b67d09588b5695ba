//! Slot driver
//!
//! Plays the role of the DU slot handler: once per slot it advances the UL
//! resource grid and the PUCCH allocator, then places the HARQ-ACK, SR and
//! PUSCH obligations produced by a random traffic model.

use crate::config::TrafficConfig;
use anyhow::Result;
use common::utils::time::slot_duration;
use common::{Rnti, SlotPoint};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use scheduler::grid::{CrbInterval, GrantInfo, OfdmSymbolRange};
use scheduler::pucch::{HarqAckAllocation, SrAllocation};
use scheduler::{
    CellConfiguration, CellPucchAllocator, CellResourceAllocator, DciContext, PucchAllocator,
    SchedulerError, UeCellConfiguration,
};
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// First TC-RNTI handed out to UEs in random access
const FIRST_TC_RNTI: u16 = 0x8000;
/// Number of TC-RNTIs cycled through
const NOF_TC_RNTIS: u16 = 1000;

/// Allocation outcomes counted by the driver
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotStats {
    pub slots: u64,
    pub harq_granted: u64,
    pub harq_on_pusch: u64,
    pub harq_unavailable: u64,
    pub common_granted: u64,
    pub common_unavailable: u64,
    pub sr_granted: u64,
    pub sr_merged: u64,
    pub sr_on_pusch: u64,
    pub sr_unavailable: u64,
    pub puschs: u64,
    pub cancelled: u64,
}

/// Single-cell slot loop
pub struct SlotDriver {
    cell_cfg: Arc<CellConfiguration>,
    ues: Vec<UeCellConfiguration>,
    traffic: TrafficConfig,
    pusch_region: CrbInterval,
    res_alloc: CellResourceAllocator,
    pucch_alloc: CellPucchAllocator,
    rng: StdRng,
    sl_tx: SlotPoint,
    next_tc_rnti: u16,
    stats: SlotStats,
}

impl SlotDriver {
    pub fn new(
        cell_cfg: Arc<CellConfiguration>,
        ues: Vec<UeCellConfiguration>,
        traffic: TrafficConfig,
        pusch_region: CrbInterval,
        rng: StdRng,
    ) -> Result<Self> {
        let pucch_alloc = CellPucchAllocator::new(cell_cfg.clone())?;
        Ok(Self {
            res_alloc: CellResourceAllocator::new(cell_cfg.scs),
            sl_tx: SlotPoint::new(cell_cfg.scs, 0, 0),
            cell_cfg,
            ues,
            traffic,
            pusch_region,
            pucch_alloc,
            rng,
            next_tc_rnti: 0,
            stats: SlotStats::default(),
        })
    }

    pub fn stats(&self) -> &SlotStats {
        &self.stats
    }

    /// Run `nof_slots` slots, or forever when zero
    ///
    /// With `realtime` set, slots are paced at the slot duration of the
    /// numerology, otherwise they run back to back.
    pub async fn run(&mut self, nof_slots: u64, realtime: bool) -> Result<()> {
        let mut interval = tokio::time::interval(slot_duration(self.cell_cfg.scs));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        while nof_slots == 0 || self.stats.slots < nof_slots {
            if realtime {
                interval.tick().await;
            } else {
                tokio::task::yield_now().await;
            }
            self.run_slot()?;
        }
        Ok(())
    }

    /// Process the current slot and move on to the next one
    pub fn run_slot(&mut self) -> Result<()> {
        let sl_tx = self.sl_tx;
        self.res_alloc.slot_indication(sl_tx);
        self.pucch_alloc.slot_indication(sl_tx)?;

        for ue_idx in 0..self.ues.len() {
            self.schedule_pusch(ue_idx)?;
            self.schedule_sr(ue_idx)?;
            self.schedule_pdsch(ue_idx)?;
            self.cancel_pucch(ue_idx)?;
        }
        if self.rng.gen_bool(self.traffic.common_harq_probability) {
            self.schedule_common_pdsch()?;
        }

        self.stats.slots += 1;
        if self.stats.slots % self.traffic.stats_period_slots == 0 {
            self.log_stats();
        }
        self.sl_tx += 1;
        Ok(())
    }

    fn schedule_pusch(&mut self, ue_idx: usize) -> Result<()> {
        if !self.rng.gen_bool(self.traffic.ul_load) {
            return Ok(());
        }
        let nof_prbs = self.traffic.pusch_nof_prbs;
        let Some(last_start) = self.pusch_region.stop.checked_sub(nof_prbs) else {
            return Ok(());
        };
        if last_start < self.pusch_region.start {
            return Ok(());
        }
        let start = self.rng.gen_range(self.pusch_region.start..=last_start);
        let grant = GrantInfo::new(
            OfdmSymbolRange::new(0, common::NOF_OFDM_SYM_PER_SLOT as u8),
            CrbInterval::new(start, start + nof_prbs),
        );

        let crnti = self.ues[ue_idx].crnti;
        let slot_alloc = self.res_alloc.slot_alloc_mut(self.traffic.k2 as usize)?;
        if slot_alloc.has_pusch(crnti) {
            return Ok(());
        }
        match slot_alloc.add_pusch(crnti, grant) {
            Ok(()) => self.stats.puschs += 1,
            Err(e) => debug!("PUSCH of rnti={} not scheduled: {}", crnti, e),
        }
        Ok(())
    }

    fn schedule_sr(&mut self, ue_idx: usize) -> Result<()> {
        let ue = &self.ues[ue_idx];
        let Some(sr_cfg) = ue.sr_cfg else {
            return Ok(());
        };
        if !sr_cfg.is_sr_opportunity(self.sl_tx) {
            return Ok(());
        }

        let slot_alloc = self.res_alloc.slot_alloc_mut(0)?;
        match self.pucch_alloc.pucch_allocate_sr_opportunity(slot_alloc, ue)? {
            SrAllocation::Granted(_) => self.stats.sr_granted += 1,
            SrAllocation::Merged(_) => self.stats.sr_merged += 1,
            SrAllocation::OnPusch => self.stats.sr_on_pusch += 1,
            SrAllocation::Unavailable => {
                warn!("No PUCCH resource for SR of rnti={} in slot {}", ue.crnti, self.sl_tx);
                self.stats.sr_unavailable += 1;
            }
        }
        Ok(())
    }

    fn schedule_pdsch(&mut self, ue_idx: usize) -> Result<()> {
        if !self.rng.gen_bool(self.traffic.dl_load) {
            return Ok(());
        }
        let (k0, k1) = self.pick_harq_timing();
        let ue = &self.ues[ue_idx];

        match self
            .pucch_alloc
            .alloc_ded_pucch_harq_ack_ue(&mut self.res_alloc, ue, k0, k1)?
        {
            HarqAckAllocation::Granted(grant) => {
                debug!(
                    "rnti={} PDSCH in slot {}: HARQ-ACK {:?} with pri={}",
                    ue.crnti,
                    self.sl_tx + k0,
                    grant.kind,
                    grant.pucch_res_indicator
                );
                self.stats.harq_granted += 1;
            }
            HarqAckAllocation::OnPusch => self.stats.harq_on_pusch += 1,
            HarqAckAllocation::Unavailable => {
                warn!(
                    "No PUCCH resource for HARQ-ACK of rnti={} in slot {}, PDSCH dropped",
                    ue.crnti,
                    self.sl_tx + k0 + k1
                );
                self.stats.harq_unavailable += 1;
            }
        }
        Ok(())
    }

    fn schedule_common_pdsch(&mut self) -> Result<()> {
        let tcrnti = Rnti::new(FIRST_TC_RNTI + self.next_tc_rnti);
        self.next_tc_rnti = (self.next_tc_rnti + 1) % NOF_TC_RNTIS;

        let (k0, k1) = self.pick_harq_timing();
        let nof_coreset_cces = self.traffic.coreset_nof_cces;
        let dci = DciContext {
            n_cce: self.rng.gen_range(0..nof_coreset_cces),
            nof_coreset_cces,
        };

        match self
            .pucch_alloc
            .alloc_common_pucch_harq_ack_ue(&mut self.res_alloc, tcrnti, k0, k1, &dci)?
        {
            HarqAckAllocation::Granted(_) | HarqAckAllocation::OnPusch => self.stats.common_granted += 1,
            HarqAckAllocation::Unavailable => {
                warn!(
                    "No common PUCCH resource for rnti={} in slot {}, Msg4 dropped",
                    tcrnti,
                    self.sl_tx + k0 + k1
                );
                self.stats.common_unavailable += 1;
            }
        }
        Ok(())
    }

    fn cancel_pucch(&mut self, ue_idx: usize) -> Result<()> {
        if !self.rng.gen_bool(self.traffic.cancel_probability) {
            return Ok(());
        }
        let (k0, k1) = self.pick_harq_timing();
        let crnti = self.ues[ue_idx].crnti;
        let offset = k0
            .checked_add(k1)
            .ok_or_else(|| anyhow::anyhow!("HARQ-ACK timing k0={} k1={} overflows", k0, k1))?;
        let slot_alloc = self.res_alloc.slot_alloc_mut(offset as usize)?;

        match self.pucch_alloc.remove_ue_uci_from_pucch(slot_alloc, crnti) {
            Ok(uci) => {
                debug!("Cancelled PUCCH of rnti={} carrying {} UCI bits", crnti, uci.total());
                self.stats.cancelled += 1;
            }
            Err(SchedulerError::GrantNotFound { .. }) => {}
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    fn pick_harq_timing(&mut self) -> (u32, u32) {
        let k0 = self.cell_cfg.k0_candidates.choose(&mut self.rng).copied().unwrap_or(0);
        let k1 = self.cell_cfg.k1_candidates.choose(&mut self.rng).copied().unwrap_or(0);
        (k0 as u32, k1 as u32)
    }

    pub fn log_stats(&self) {
        let s = &self.stats;
        info!("PUCCH Statistics after {} slots:", s.slots);
        info!(
            "  HARQ-ACK: granted={}, on PUSCH={}, unavailable={}",
            s.harq_granted, s.harq_on_pusch, s.harq_unavailable
        );
        info!("  Common HARQ-ACK: granted={}, unavailable={}", s.common_granted, s.common_unavailable);
        info!(
            "  SR: granted={}, merged={}, on PUSCH={}, unavailable={}",
            s.sr_granted, s.sr_merged, s.sr_on_pusch, s.sr_unavailable
        );
        info!("  PUSCH: {}, cancelled PUCCHs: {}", s.puschs, s.cancelled);
    }
}
