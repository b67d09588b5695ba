//! Per-slot UL scheduling result: the PUCCH and PUSCH PDUs of a slot

use super::ul_grid::GrantInfo;
use crate::config::{MaxCodeRate, PucchFormat, PucchFormatConfig, PucchResource};
use crate::grid::CrbInterval;
use common::Rnti;

/// Maximum number of PUCCH PDUs in one slot
pub const MAX_PUCCH_PDUS_PER_SLOT: usize = 64;

/// Maximum number of PUSCH PDUs in one slot
pub const MAX_PUSCH_PDUS_PER_SLOT: usize = 16;

/// Maximum number of HARQ-ACK bits on PUCCH format 0 and 1
pub const MAX_HARQ_ACK_BITS_FORMAT_0_1: u8 = 2;

/// UCI bits carried by a PUCCH grant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PucchUciBits {
    /// Number of HARQ-ACK bits
    pub harq_ack_nof_bits: u8,
    /// Number of SR bits
    pub sr_bits: u8,
}

impl PucchUciBits {
    /// Total UCI payload
    pub fn total(&self) -> u32 {
        self.harq_ack_nof_bits as u32 + self.sr_bits as u32
    }
}

/// Where the PUCCH resource of a grant comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PucchResourceSource {
    /// Default resource of TS 38.213 Table 9.2.1-1
    Common {
        /// r_PUCCH index within the default resource set
        r_pucch: u8,
        /// Delta_PRI signalled in the DCI
        pucch_res_indicator: u8,
    },
    /// Resource of the UE PUCCH-Config
    Dedicated {
        /// pucch-ResourceId
        res_id: u8,
    },
}

/// Format specific fields of a PUCCH PDU
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PucchFormatInfo {
    Format0 {
        initial_cyclic_shift: u8,
    },
    Format1 {
        initial_cyclic_shift: u8,
        time_domain_occ: u8,
    },
    Format2 {
        nof_prbs: u8,
        nof_symbols: u8,
        max_code_rate: MaxCodeRate,
    },
}

impl PucchFormatInfo {
    /// Build the PDU fields of a dedicated resource
    pub fn from_config(format: &PucchFormatConfig, max_code_rate: MaxCodeRate) -> Self {
        match *format {
            PucchFormatConfig::Format0 { initial_cyclic_shift, .. } => {
                PucchFormatInfo::Format0 { initial_cyclic_shift }
            }
            PucchFormatConfig::Format1 { initial_cyclic_shift, time_domain_occ, .. } => {
                PucchFormatInfo::Format1 { initial_cyclic_shift, time_domain_occ }
            }
            PucchFormatConfig::Format2 { nof_prbs, nof_symbols, .. } => PucchFormatInfo::Format2 {
                nof_prbs,
                nof_symbols,
                max_code_rate,
            },
        }
    }

    pub fn format(&self) -> PucchFormat {
        match self {
            PucchFormatInfo::Format0 { .. } => PucchFormat::Format0,
            PucchFormatInfo::Format1 { .. } => PucchFormat::Format1,
            PucchFormatInfo::Format2 { .. } => PucchFormat::Format2,
        }
    }

    /// Initial cyclic shift for sequence based formats
    pub fn initial_cyclic_shift(&self) -> Option<u8> {
        match self {
            PucchFormatInfo::Format0 { initial_cyclic_shift }
            | PucchFormatInfo::Format1 { initial_cyclic_shift, .. } => Some(*initial_cyclic_shift),
            PucchFormatInfo::Format2 { .. } => None,
        }
    }

    /// Whether a PDU of this format can carry the given UCI
    pub fn can_carry(&self, uci: &PucchUciBits) -> bool {
        match self {
            PucchFormatInfo::Format0 { .. } | PucchFormatInfo::Format1 { .. } => {
                uci.harq_ack_nof_bits <= MAX_HARQ_ACK_BITS_FORMAT_0_1 && uci.sr_bits <= 1
            }
            PucchFormatInfo::Format2 { nof_prbs, nof_symbols, max_code_rate } => {
                uci.total() <= max_code_rate.format2_capacity(*nof_prbs, *nof_symbols)
            }
        }
    }
}

/// PUCCH PDU of one UE in one slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PucchInfo {
    pub crnti: Rnti,
    pub source: PucchResourceSource,
    pub first_hop: GrantInfo,
    /// Present only with intra-slot frequency hopping
    pub second_hop: Option<GrantInfo>,
    pub format: PucchFormatInfo,
    pub uci: PucchUciBits,
}

impl PucchInfo {
    /// PDU on a dedicated resource of the UE
    pub fn dedicated(
        crnti: Rnti,
        resource: &PucchResource,
        ul_bwp: &CrbInterval,
        max_code_rate: MaxCodeRate,
        uci: PucchUciBits,
    ) -> Self {
        let (first_hop, second_hop) = resource.grants(ul_bwp);
        Self {
            crnti,
            source: PucchResourceSource::Dedicated { res_id: resource.res_id },
            first_hop,
            second_hop,
            format: PucchFormatInfo::from_config(&resource.format, max_code_rate),
            uci,
        }
    }

    /// Grid areas taken by the PDU
    pub fn hops(&self) -> impl Iterator<Item = &GrantInfo> {
        std::iter::once(&self.first_hop).chain(self.second_hop.as_ref())
    }

    pub fn is_common(&self) -> bool {
        matches!(self.source, PucchResourceSource::Common { .. })
    }

    pub fn overlaps(&self, grant: &GrantInfo) -> bool {
        self.hops().any(|hop| hop.overlaps(grant))
    }
}

/// PUSCH PDU of one UE in one slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PuschInfo {
    pub crnti: Rnti,
    pub grant: GrantInfo,
}

/// UL PDUs scheduled in one slot
#[derive(Debug, Clone, Default)]
pub struct UlSchedResult {
    pub pucchs: heapless::Vec<PucchInfo, MAX_PUCCH_PDUS_PER_SLOT>,
    pub puschs: heapless::Vec<PuschInfo, MAX_PUSCH_PDUS_PER_SLOT>,
}

impl UlSchedResult {
    pub fn clear(&mut self) {
        self.pucchs.clear();
        self.puschs.clear();
    }
}
