//! Configuration of the PUCCH slot simulator
//!
//! Cell parameters use the srsRAN YAML field names. The dedicated PUCCH
//! resources of the UEs are generated from the `pucch` section, the same way
//! for every UE.

use anyhow::{anyhow, Context};
use common::{nof_rbs, Bandwidth, CellId, Pci, Rnti, SubcarrierSpacing, NOF_OFDM_SYM_PER_SLOT};
use num_traits::FromPrimitive;
use scheduler::config::{
    MaxCodeRate, PucchConfig, PucchFormatConfig, PucchResource, SchedulingRequestConfig,
    MAX_HARQ_PUCCH_RESOURCES,
};
use scheduler::grid::CrbInterval;
use scheduler::{CellConfiguration, UeCellConfiguration};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimConfig {
    /// Cell configuration
    pub cell_cfg: CellConfig,
    /// Dedicated PUCCH resource generation
    #[serde(default)]
    pub pucch: PucchBuilderConfig,
    /// UEs attached to the cell
    #[serde(default)]
    pub ues: Vec<UeConfig>,
    /// Logging configuration
    #[serde(default)]
    pub log: LogConfig,
    /// Traffic model
    #[serde(default)]
    pub sim: TrafficConfig,
}

/// Cell configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CellConfig {
    /// Channel bandwidth in MHz
    #[serde(rename = "channel_bandwidth_MHz")]
    pub channel_bandwidth_mhz: u32,
    /// Common subcarrier spacing in kHz
    pub common_scs: u32,
    /// Physical Cell ID
    pub pci: u16,
    /// Cell ID
    #[serde(default = "default_cell_id")]
    pub cell_id: u16,
    /// pucch-ResourceCommon
    #[serde(default = "default_pucch_resource_common")]
    pub pucch_resource_common: u8,
    /// PDSCH k0 candidates
    #[serde(default = "default_k0")]
    pub k0: Vec<u8>,
    /// dl-DataToUL-ACK (k1) candidates
    #[serde(default = "default_k1")]
    pub k1: Vec<u8>,
}

fn default_cell_id() -> u16 {
    1
}

fn default_pucch_resource_common() -> u8 {
    11
}

fn default_k0() -> Vec<u8> {
    vec![0]
}

fn default_k1() -> Vec<u8> {
    vec![4, 5, 6, 7, 8]
}

/// Dedicated PUCCH resources, format 1 at both band edges
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PucchBuilderConfig {
    /// Number of HARQ-ACK resources per UE
    #[serde(default = "default_nof_ue_harq_res")]
    pub nof_ue_harq_res: u8,
    /// First PRB of the dedicated resources, clear of the common ones
    #[serde(default = "default_start_prb")]
    pub start_prb: u16,
    /// Symbols of each format 1 resource, ending at the end of the slot
    #[serde(default = "default_f1_nof_symbols")]
    pub f1_nof_symbols: u8,
    /// Mirror the second half of each resource to the other band edge
    #[serde(default = "default_true")]
    pub intraslot_freq_hopping: bool,
    /// Maximum code rate for format 2
    #[serde(default)]
    pub max_code_rate: MaxCodeRate,
}

impl Default for PucchBuilderConfig {
    fn default() -> Self {
        Self {
            nof_ue_harq_res: default_nof_ue_harq_res(),
            start_prb: default_start_prb(),
            f1_nof_symbols: default_f1_nof_symbols(),
            intraslot_freq_hopping: true,
            max_code_rate: MaxCodeRate::default(),
        }
    }
}

fn default_nof_ue_harq_res() -> u8 {
    8
}

fn default_start_prb() -> u16 {
    4
}

fn default_f1_nof_symbols() -> u8 {
    14
}

fn default_true() -> bool {
    true
}

impl PucchBuilderConfig {
    /// PUCCH-Config shared by all UEs. HARQ-ACK resources take ids
    /// 0..nof_ue_harq_res, the SR resource the id after them.
    pub fn pucch_config(&self, bwp_size: u16) -> anyhow::Result<PucchConfig> {
        let nof_harq = self.nof_ue_harq_res as usize;
        if nof_harq == 0 || nof_harq > MAX_HARQ_PUCCH_RESOURCES {
            return Err(anyhow!(
                "nof_ue_harq_res must be between 1 and {}",
                MAX_HARQ_PUCCH_RESOURCES
            ));
        }

        let nof_symbols = self.f1_nof_symbols;
        let format = PucchFormatConfig::Format1 {
            initial_cyclic_shift: 0,
            nof_symbols,
            starting_symbol: (NOF_OFDM_SYM_PER_SLOT as u8).saturating_sub(nof_symbols),
            time_domain_occ: 0,
        };

        let resources = (0..=self.nof_ue_harq_res)
            .map(|res_id| {
                let starting_prb = self.start_prb + res_id as u16;
                PucchResource {
                    res_id,
                    starting_prb,
                    second_hop_prb: self
                        .intraslot_freq_hopping
                        .then(|| bwp_size.saturating_sub(1 + starting_prb)),
                    format,
                }
            })
            .collect();

        let mut harq_resource_ids = heapless::Vec::new();
        for res_id in 0..self.nof_ue_harq_res {
            harq_resource_ids
                .push(res_id)
                .map_err(|_| anyhow!("Too many HARQ-ACK resources"))?;
        }

        Ok(PucchConfig {
            resources,
            harq_resource_ids,
            sr_resource_id: self.nof_ue_harq_res,
            max_code_rate: self.max_code_rate,
        })
    }

    /// CRBs between the dedicated PUCCH resources of both band edges
    pub fn pusch_region(&self, ul_bwp: &CrbInterval) -> CrbInterval {
        let edge = self.start_prb + self.nof_ue_harq_res as u16 + 1;
        CrbInterval::new(ul_bwp.start + edge, ul_bwp.stop.saturating_sub(edge))
    }
}

/// UE configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UeConfig {
    /// C-RNTI
    pub rnti: u16,
    /// SR periodicity in slots
    #[serde(default = "default_sr_period_slots")]
    pub sr_period_slots: u32,
    /// SR offset in slots
    #[serde(default)]
    pub sr_offset: u32,
}

fn default_sr_period_slots() -> u32 {
    40
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogConfig {
    /// Default log level, RUST_LOG takes precedence
    #[serde(default = "default_log_level")]
    pub all_level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            all_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Per-slot traffic model
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrafficConfig {
    /// Probability a UE receives a PDSCH in a slot
    #[serde(default = "default_dl_load")]
    pub dl_load: f64,
    /// Probability a UE gets a PUSCH in a slot
    #[serde(default = "default_ul_load")]
    pub ul_load: f64,
    /// Probability of a common HARQ-ACK for a UE in random access
    #[serde(default = "default_common_harq_probability")]
    pub common_harq_probability: f64,
    /// Probability a UE's planned PUCCH is cancelled
    #[serde(default = "default_cancel_probability")]
    pub cancel_probability: f64,
    /// PUSCH scheduling offset (k2)
    #[serde(default = "default_k2")]
    pub k2: u8,
    /// PUSCH size in PRBs
    #[serde(default = "default_pusch_nof_prbs")]
    pub pusch_nof_prbs: u16,
    /// CCEs of the CORESET used for common PDCCHs
    #[serde(default = "default_coreset_nof_cces")]
    pub coreset_nof_cces: u8,
    /// Slots between statistics reports
    #[serde(default = "default_stats_period_slots")]
    pub stats_period_slots: u64,
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            dl_load: default_dl_load(),
            ul_load: default_ul_load(),
            common_harq_probability: default_common_harq_probability(),
            cancel_probability: default_cancel_probability(),
            k2: default_k2(),
            pusch_nof_prbs: default_pusch_nof_prbs(),
            coreset_nof_cces: default_coreset_nof_cces(),
            stats_period_slots: default_stats_period_slots(),
        }
    }
}

fn default_dl_load() -> f64 {
    0.5
}

fn default_ul_load() -> f64 {
    0.1
}

fn default_common_harq_probability() -> f64 {
    0.05
}

fn default_cancel_probability() -> f64 {
    0.02
}

fn default_k2() -> u8 {
    4
}

fn default_pusch_nof_prbs() -> u16 {
    4
}

fn default_coreset_nof_cces() -> u8 {
    16
}

fn default_stats_period_slots() -> u64 {
    2000
}

impl TrafficConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        let probabilities = [
            ("dl_load", self.dl_load),
            ("ul_load", self.ul_load),
            ("common_harq_probability", self.common_harq_probability),
            ("cancel_probability", self.cancel_probability),
        ];
        for (name, p) in probabilities {
            if !(0.0..=1.0).contains(&p) {
                return Err(anyhow!("{} must be within [0, 1], got {}", name, p));
            }
        }
        if self.coreset_nof_cces == 0 || self.pusch_nof_prbs == 0 || self.stats_period_slots == 0 {
            return Err(anyhow!("Invalid traffic configuration: {:?}", self));
        }
        Ok(())
    }
}

impl SimConfig {
    /// Load configuration from a YAML or, with a `.toml` extension, TOML file
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents =
            std::fs::read_to_string(path).with_context(|| format!("Reading configuration {}", path))?;
        let is_toml = Path::new(path)
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

        let config: SimConfig = if is_toml {
            toml::from_str(&contents)?
        } else {
            serde_yaml::from_str(&contents)?
        };
        config.sim.validate()?;
        Ok(config)
    }

    /// Scheduler view of the cell
    pub fn cell_configuration(&self) -> anyhow::Result<CellConfiguration> {
        let cell = &self.cell_cfg;
        let scs = SubcarrierSpacing::from_u32(cell.common_scs)
            .ok_or_else(|| anyhow!("Invalid subcarrier spacing: {} kHz", cell.common_scs))?;
        let bandwidth = Bandwidth::from_mhz(cell.channel_bandwidth_mhz)
            .ok_or_else(|| anyhow!("Invalid bandwidth: {} MHz", cell.channel_bandwidth_mhz))?;
        let nof_prbs = nof_rbs(bandwidth, scs).ok_or_else(|| {
            anyhow!(
                "No carrier of {} MHz at {} kHz",
                cell.channel_bandwidth_mhz,
                cell.common_scs
            )
        })?;
        let pci = Pci::new(cell.pci).ok_or_else(|| anyhow!("Invalid PCI: {}", cell.pci))?;

        let cell_cfg = CellConfiguration {
            cell_id: CellId(cell.cell_id),
            pci,
            scs,
            ul_bwp: CrbInterval::new(0, nof_prbs),
            pucch_resource_common: cell.pucch_resource_common,
            k0_candidates: cell.k0.clone(),
            k1_candidates: cell.k1.clone(),
        };
        cell_cfg.validate()?;
        Ok(cell_cfg)
    }

    /// Scheduler view of every configured UE
    pub fn ue_configurations(
        &self,
        cell_cfg: &CellConfiguration,
    ) -> anyhow::Result<Vec<UeCellConfiguration>> {
        let pucch_cfg = self.pucch.pucch_config(cell_cfg.ul_bwp_size())?;

        self.ues
            .iter()
            .map(|ue| {
                let crnti = Rnti(ue.rnti);
                if !crnti.is_crnti() {
                    return Err(anyhow!("Invalid C-RNTI {}", crnti));
                }
                let ue_cfg = UeCellConfiguration {
                    crnti,
                    pucch_cfg: pucch_cfg.clone(),
                    sr_cfg: Some(SchedulingRequestConfig {
                        period_slots: ue.sr_period_slots,
                        offset: ue.sr_offset,
                    }),
                };
                ue_cfg.validate(cell_cfg)?;
                Ok(ue_cfg)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
cell_cfg:
  channel_bandwidth_MHz: 20
  common_scs: 30
  pci: 1
ues:
  - rnti: 17921
  - rnti: 17922
    sr_period_slots: 20
    sr_offset: 3
sim:
  dl_load: 0.8
"#;

    #[test]
    fn test_yaml_defaults() {
        let config: SimConfig = serde_yaml::from_str(YAML).unwrap();
        assert_eq!(config.cell_cfg.pucch_resource_common, 11);
        assert_eq!(config.cell_cfg.k1, vec![4, 5, 6, 7, 8]);
        assert_eq!(config.pucch.nof_ue_harq_res, 8);
        assert_eq!(config.ues[0].sr_period_slots, 40);
        assert_eq!(config.log.all_level, "info");
        assert_eq!(config.sim.dl_load, 0.8);
        assert_eq!(config.sim.k2, 4);
    }

    #[test]
    fn test_toml_config() {
        let toml_str = r#"
[cell_cfg]
channel_bandwidth_MHz = 10
common_scs = 15
pci = 500
k1 = [4]

[[ues]]
rnti = 100
"#;
        let config: SimConfig = toml::from_str(toml_str).unwrap();
        let cell = config.cell_configuration().unwrap();
        assert_eq!(cell.scs, SubcarrierSpacing::Scs15);
        assert_eq!(cell.ul_bwp_size(), 52);
        assert_eq!(cell.max_harq_timing(), 4);
    }

    #[test]
    fn test_cell_conversion() {
        let config: SimConfig = serde_yaml::from_str(YAML).unwrap();
        let cell = config.cell_configuration().unwrap();
        assert_eq!(cell.scs, SubcarrierSpacing::Scs30);
        assert_eq!(cell.ul_bwp, CrbInterval::new(0, 51));

        let ues = config.ue_configurations(&cell).unwrap();
        assert_eq!(ues.len(), 2);
        assert_eq!(ues[1].crnti, Rnti(17922));
        let pucch_cfg = &ues[0].pucch_cfg;
        assert_eq!(pucch_cfg.harq_resource_ids.len(), 8);
        assert_eq!(pucch_cfg.sr_resource().map(|r| r.starting_prb), Some(12));
        assert_eq!(pucch_cfg.harq_resource(0).and_then(|r| r.second_hop_prb), Some(46));
    }

    #[test]
    fn test_invalid_cell() {
        let mut config: SimConfig = serde_yaml::from_str(YAML).unwrap();
        config.cell_cfg.common_scs = 45;
        assert!(config.cell_configuration().is_err());

        let mut config: SimConfig = serde_yaml::from_str(YAML).unwrap();
        config.cell_cfg.channel_bandwidth_mhz = 100;
        config.cell_cfg.common_scs = 15;
        assert!(config.cell_configuration().is_err());
    }

    #[test]
    fn test_pusch_region_clear_of_pucch() {
        let builder = PucchBuilderConfig::default();
        let region = builder.pusch_region(&CrbInterval::new(0, 51));
        assert_eq!(region, CrbInterval::new(13, 38));
    }

    #[test]
    fn test_invalid_traffic() {
        let traffic = TrafficConfig {
            dl_load: 1.5,
            ..TrafficConfig::default()
        };
        assert!(traffic.validate().is_err());
        assert!(TrafficConfig::default().validate().is_ok());
    }
}
