//! UE dedicated cell configuration

use super::cell::CellConfiguration;
use super::pucch::{PucchConfig, PucchFormatConfig};
use crate::SchedulerError;
use common::{Rnti, SlotPoint};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// SR periodicities in slots accepted by the scheduler (TS 38.331 SchedulingRequestResourceConfig)
const VALID_SR_PERIODS: [u32; 13] = [1, 2, 4, 5, 8, 10, 16, 20, 40, 80, 160, 320, 640];

/// UCI bits the smallest format 2 resource must carry (two HARQ-ACK bits and one SR bit)
const MIN_FORMAT2_PAYLOAD: u32 = 3;

/// Periodic scheduling request opportunities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulingRequestConfig {
    /// Periodicity in slots
    pub period_slots: u32,
    /// Offset in slots within the period
    pub offset: u32,
}

impl SchedulingRequestConfig {
    /// Whether the UE has an SR opportunity in the given slot
    pub fn is_sr_opportunity(&self, slot: SlotPoint) -> bool {
        slot.to_uint() % self.period_slots == self.offset
    }

    fn validate(&self) -> Result<(), String> {
        if !VALID_SR_PERIODS.contains(&self.period_slots) {
            return Err(format!("invalid SR periodicity {}", self.period_slots));
        }
        if self.offset >= self.period_slots {
            return Err(format!(
                "SR offset {} not below periodicity {}",
                self.offset, self.period_slots
            ));
        }
        Ok(())
    }
}

/// Dedicated configuration of one UE in the cell
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UeCellConfiguration {
    /// C-RNTI of the UE
    pub crnti: Rnti,
    /// PUCCH-Config
    pub pucch_cfg: PucchConfig,
    /// SR configuration, if the UE has SR opportunities
    #[serde(default)]
    pub sr_cfg: Option<SchedulingRequestConfig>,
}

impl UeCellConfiguration {
    /// Validate the UE configuration against the cell it belongs to
    pub fn validate(&self, cell_cfg: &CellConfiguration) -> Result<(), SchedulerError> {
        self.validate_inner(cell_cfg)
            .map_err(|e| SchedulerError::InvalidConfiguration(format!("rnti={}: {}", self.crnti, e)))
    }

    fn validate_inner(&self, cell_cfg: &CellConfiguration) -> Result<(), String> {
        let pucch_cfg = &self.pucch_cfg;
        let bwp_size = cell_cfg.ul_bwp_size();

        let mut ids = HashSet::new();
        for res in &pucch_cfg.resources {
            if !ids.insert(res.res_id) {
                return Err(format!("duplicated PUCCH resource id {}", res.res_id));
            }

            res.format
                .validate()
                .map_err(|e| format!("PUCCH resource {}: {}", res.res_id, e))?;

            let nof_prbs = res.format.nof_prbs();
            let hops = std::iter::once(res.starting_prb).chain(res.second_hop_prb);
            for prb in hops {
                if prb + nof_prbs > bwp_size {
                    return Err(format!(
                        "PUCCH resource {} PRB {} outside UL BWP of {} PRBs",
                        res.res_id, prb, bwp_size
                    ));
                }
            }

            if res.second_hop_prb.is_some() && res.format.symbols().length() < 2 {
                return Err(format!(
                    "PUCCH resource {} needs two symbols for frequency hopping",
                    res.res_id
                ));
            }

            if let PucchFormatConfig::Format2 { nof_prbs, nof_symbols, .. } = res.format {
                if pucch_cfg.max_code_rate.format2_capacity(nof_prbs, nof_symbols) < MIN_FORMAT2_PAYLOAD {
                    return Err(format!(
                        "PUCCH resource {} cannot carry HARQ-ACK and SR at {:?}",
                        res.res_id, pucch_cfg.max_code_rate
                    ));
                }
            }
        }

        if pucch_cfg.harq_resource_ids.is_empty() {
            return Err("empty HARQ-ACK PUCCH resource set".into());
        }
        for res_id in &pucch_cfg.harq_resource_ids {
            if pucch_cfg.resource(*res_id).is_none() {
                return Err(format!("HARQ-ACK resource {} not configured", res_id));
            }
        }

        match pucch_cfg.sr_resource() {
            None => return Err(format!("SR resource {} not configured", pucch_cfg.sr_resource_id)),
            Some(res) if matches!(res.format, PucchFormatConfig::Format2 { .. }) => {
                return Err("SR resource must use PUCCH format 0 or 1".into());
            }
            Some(_) => {}
        }

        if let Some(sr_cfg) = &self.sr_cfg {
            sr_cfg.validate()?;
        }

        Ok(())
    }
}
