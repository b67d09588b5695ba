//! Dedicated PUCCH configuration (TS 38.331 PUCCH-Config)

use crate::grid::{CrbInterval, GrantInfo, OfdmSymbolRange};
use common::NOF_OFDM_SYM_PER_SLOT;
use serde::{Deserialize, Serialize};

/// Maximum number of HARQ-ACK PUCCH resources a UE can be configured with,
/// i.e. the range of the 3-bit PUCCH resource indicator
pub const MAX_HARQ_PUCCH_RESOURCES: usize = 8;

/// PUCCH format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PucchFormat {
    Format0,
    Format1,
    Format2,
}

/// Maximum code rate for UCI on PUCCH format 2 (TS 38.331 PUCCH-MaxCodeRate)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxCodeRate {
    ZeroDot08,
    ZeroDot15,
    ZeroDot25,
    #[default]
    ZeroDot35,
    ZeroDot45,
    ZeroDot60,
    ZeroDot80,
}

impl MaxCodeRate {
    /// Code rate in thousandths
    pub fn per_mille(&self) -> u32 {
        match self {
            MaxCodeRate::ZeroDot08 => 80,
            MaxCodeRate::ZeroDot15 => 150,
            MaxCodeRate::ZeroDot25 => 250,
            MaxCodeRate::ZeroDot35 => 350,
            MaxCodeRate::ZeroDot45 => 450,
            MaxCodeRate::ZeroDot60 => 600,
            MaxCodeRate::ZeroDot80 => 800,
        }
    }

    /// UCI payload bits a format 2 allocation can carry at this rate
    ///
    /// Format 2 maps 8 QPSK data REs per PRB and symbol, i.e. 16 coded bits.
    pub fn format2_capacity(&self, nof_prbs: u8, nof_symbols: u8) -> u32 {
        16 * nof_prbs as u32 * nof_symbols as u32 * self.per_mille() / 1000
    }
}

/// Format specific part of a PUCCH resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PucchFormatConfig {
    Format0 {
        initial_cyclic_shift: u8,
        nof_symbols: u8,
        starting_symbol: u8,
    },
    Format1 {
        initial_cyclic_shift: u8,
        nof_symbols: u8,
        starting_symbol: u8,
        time_domain_occ: u8,
    },
    Format2 {
        nof_prbs: u8,
        nof_symbols: u8,
        starting_symbol: u8,
    },
}

impl PucchFormatConfig {
    /// PUCCH format of this resource
    pub fn format(&self) -> PucchFormat {
        match self {
            PucchFormatConfig::Format0 { .. } => PucchFormat::Format0,
            PucchFormatConfig::Format1 { .. } => PucchFormat::Format1,
            PucchFormatConfig::Format2 { .. } => PucchFormat::Format2,
        }
    }

    /// OFDM symbols spanned by the resource
    pub fn symbols(&self) -> OfdmSymbolRange {
        let (start, len) = match *self {
            PucchFormatConfig::Format0 { nof_symbols, starting_symbol, .. }
            | PucchFormatConfig::Format1 { nof_symbols, starting_symbol, .. }
            | PucchFormatConfig::Format2 { nof_symbols, starting_symbol, .. } => {
                (starting_symbol, nof_symbols)
            }
        };
        OfdmSymbolRange::new(start, start.saturating_add(len))
    }

    /// Number of PRBs per hop
    pub fn nof_prbs(&self) -> u16 {
        match self {
            PucchFormatConfig::Format2 { nof_prbs, .. } => *nof_prbs as u16,
            _ => 1,
        }
    }

    /// Range checks of TS 38.331 PUCCH-format0/1/2
    pub fn validate(&self) -> Result<(), String> {
        let symbols = self.symbols();
        if symbols.stop as usize > NOF_OFDM_SYM_PER_SLOT {
            return Err(format!("symbols {:?} exceed the slot", symbols));
        }
        match *self {
            PucchFormatConfig::Format0 { initial_cyclic_shift, nof_symbols, .. } => {
                if !(1..=2).contains(&nof_symbols) || initial_cyclic_shift > 11 {
                    return Err(format!("invalid format 0 parameters {:?}", self));
                }
            }
            PucchFormatConfig::Format1 { initial_cyclic_shift, nof_symbols, time_domain_occ, .. } => {
                if !(4..=14).contains(&nof_symbols) || initial_cyclic_shift > 11 || time_domain_occ > 6 {
                    return Err(format!("invalid format 1 parameters {:?}", self));
                }
            }
            PucchFormatConfig::Format2 { nof_prbs, nof_symbols, .. } => {
                if !(1..=16).contains(&nof_prbs) || !(1..=2).contains(&nof_symbols) {
                    return Err(format!("invalid format 2 parameters {:?}", self));
                }
            }
        }
        Ok(())
    }
}

/// A configured PUCCH resource (TS 38.331 PUCCH-Resource)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PucchResource {
    /// pucch-ResourceId
    pub res_id: u8,
    /// First PRB, relative to the UL BWP
    pub starting_prb: u16,
    /// PRB of the second hop when intra-slot frequency hopping is enabled
    #[serde(default)]
    pub second_hop_prb: Option<u16>,
    /// Format specific parameters
    pub format: PucchFormatConfig,
}

impl PucchResource {
    /// Grid areas occupied by the resource inside the given UL BWP
    ///
    /// With frequency hopping the symbols are split in two halves, the first
    /// on `starting_prb` and the second on `second_hop_prb`.
    pub fn grants(&self, ul_bwp: &CrbInterval) -> (GrantInfo, Option<GrantInfo>) {
        let symbols = self.format.symbols();
        let nof_prbs = self.format.nof_prbs();
        let first_crb = ul_bwp.start + self.starting_prb;

        match self.second_hop_prb {
            None => (
                GrantInfo::new(symbols, CrbInterval::new(first_crb, first_crb + nof_prbs)),
                None,
            ),
            Some(second_hop_prb) => {
                let split = symbols.start + symbols.length() / 2;
                let second_crb = ul_bwp.start + second_hop_prb;
                (
                    GrantInfo::new(
                        OfdmSymbolRange::new(symbols.start, split),
                        CrbInterval::new(first_crb, first_crb + nof_prbs),
                    ),
                    Some(GrantInfo::new(
                        OfdmSymbolRange::new(split, symbols.stop),
                        CrbInterval::new(second_crb, second_crb + nof_prbs),
                    )),
                )
            }
        }
    }
}

/// Dedicated PUCCH configuration of a UE
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PucchConfig {
    /// All configured PUCCH resources
    pub resources: Vec<PucchResource>,
    /// HARQ-ACK resource set, indexed by PUCCH resource indicator
    pub harq_resource_ids: heapless::Vec<u8, MAX_HARQ_PUCCH_RESOURCES>,
    /// Resource used for scheduling requests
    pub sr_resource_id: u8,
    /// Maximum UCI code rate for format 2 resources
    #[serde(default)]
    pub max_code_rate: MaxCodeRate,
}

impl PucchConfig {
    /// Look up a resource by pucch-ResourceId
    pub fn resource(&self, res_id: u8) -> Option<&PucchResource> {
        self.resources.iter().find(|res| res.res_id == res_id)
    }

    /// Resource selected by a PUCCH resource indicator
    pub fn harq_resource(&self, pucch_res_indicator: usize) -> Option<&PucchResource> {
        self.harq_resource_ids
            .get(pucch_res_indicator)
            .and_then(|res_id| self.resource(*res_id))
    }

    /// Scheduling request resource
    pub fn sr_resource(&self) -> Option<&PucchResource> {
        self.resource(self.sr_resource_id)
    }
}
