//! PUCCH resource sets before dedicated configuration
//!
//! TS 38.213 Section 9.2.1, Table 9.2.1-1. A UE without a dedicated
//! PUCCH-Config sends HARQ-ACK on one of 16 resources of the cell default set
//! selected by pucch-ResourceCommon. The resource is derived from the CCE
//! position of the scheduling PDCCH and the PUCCH resource indicator.

use crate::config::cell::NOF_PUCCH_DEFAULT_RESOURCE_SETS;
use crate::config::PucchFormat;
use crate::grid::{CrbInterval, GrantInfo, OfdmSymbolRange};

/// Values of the 3-bit PUCCH resource indicator
pub const NOF_PUCCH_RES_INDICATORS: u8 = 8;

/// One row of TS 38.213 Table 9.2.1-1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PucchDefaultResource {
    pub row_index: u8,
    pub format: PucchFormat,
    pub first_symbol_index: u8,
    pub nof_symbols: u8,
    /// RB_BWP^offset
    pub rb_bwp_offset: u16,
    /// Set of initial cyclic shift indexes
    pub cs_indexes: &'static [u8],
}

const CS_0_3: &[u8] = &[0, 3];
const CS_0_4_8: &[u8] = &[0, 4, 8];
const CS_0_6: &[u8] = &[0, 6];
const CS_0_3_6_9: &[u8] = &[0, 3, 6, 9];

/// Row 15 uses floor(N_BWP / 4) as PRB offset
const OFFSET_QUARTER_BWP: u16 = u16::MAX;

const DEFAULT_RESOURCE_TABLE: [(PucchFormat, u8, u8, u16, &[u8]); NOF_PUCCH_DEFAULT_RESOURCE_SETS as usize] = [
    (PucchFormat::Format0, 12, 2, 0, CS_0_3),
    (PucchFormat::Format0, 12, 2, 0, CS_0_4_8),
    (PucchFormat::Format0, 12, 2, 3, CS_0_4_8),
    (PucchFormat::Format1, 10, 4, 0, CS_0_6),
    (PucchFormat::Format1, 10, 4, 0, CS_0_3_6_9),
    (PucchFormat::Format1, 10, 4, 2, CS_0_3_6_9),
    (PucchFormat::Format1, 10, 4, 4, CS_0_3_6_9),
    (PucchFormat::Format1, 4, 10, 0, CS_0_6),
    (PucchFormat::Format1, 4, 10, 0, CS_0_3_6_9),
    (PucchFormat::Format1, 4, 10, 2, CS_0_3_6_9),
    (PucchFormat::Format1, 4, 10, 4, CS_0_3_6_9),
    (PucchFormat::Format1, 0, 14, 0, CS_0_6),
    (PucchFormat::Format1, 0, 14, 0, CS_0_3_6_9),
    (PucchFormat::Format1, 0, 14, 2, CS_0_3_6_9),
    (PucchFormat::Format1, 0, 14, 4, CS_0_3_6_9),
    (PucchFormat::Format1, 0, 14, OFFSET_QUARTER_BWP, CS_0_3_6_9),
];

/// Get the default resource set of pucch-ResourceCommon `row_index` for an
/// initial UL BWP of `bwp_size` PRBs
pub fn get_pucch_default_resource(row_index: u8, bwp_size: u16) -> Option<PucchDefaultResource> {
    if row_index >= NOF_PUCCH_DEFAULT_RESOURCE_SETS {
        return None;
    }
    let (format, first_symbol_index, nof_symbols, offset, cs_indexes) =
        *DEFAULT_RESOURCE_TABLE.get(row_index as usize)?;

    let rb_bwp_offset = if offset == OFFSET_QUARTER_BWP {
        bwp_size / 4
    } else {
        offset
    };

    Some(PucchDefaultResource {
        row_index,
        format,
        first_symbol_index,
        nof_symbols,
        rb_bwp_offset,
        cs_indexes,
    })
}

impl PucchDefaultResource {
    /// r_PUCCH = floor(2 * n_CCE,0 / N_CCE) + 2 * Delta_PRI
    pub fn r_pucch(n_cce: u8, nof_coreset_cces: u8, pucch_res_indicator: u8) -> u8 {
        ((2 * n_cce as u16) / nof_coreset_cces.max(1) as u16) as u8 + 2 * pucch_res_indicator
    }

    fn nof_cs(&self) -> u16 {
        self.cs_indexes.len() as u16
    }

    /// PRBs of the first and second hop, relative to the BWP
    ///
    /// Returns `None` when the offset does not fit in the BWP.
    pub fn prbs(&self, r_pucch: u8, bwp_size: u16) -> Option<(u16, u16)> {
        let r = r_pucch as u16;
        if r < 8 {
            let low = self.rb_bwp_offset + r / self.nof_cs();
            let high = bwp_size.checked_sub(1 + low)?;
            Some((low, high))
        } else {
            let low = self.rb_bwp_offset + (r - 8) / self.nof_cs();
            let high = bwp_size.checked_sub(1 + low)?;
            Some((high, low))
        }
    }

    /// Initial cyclic shift of resource `r_pucch`
    pub fn initial_cyclic_shift(&self, r_pucch: u8) -> u8 {
        let r = r_pucch % 8;
        self.cs_indexes[r as usize % self.cs_indexes.len()]
    }

    /// Symbols of the whole resource
    pub fn symbols(&self) -> OfdmSymbolRange {
        OfdmSymbolRange::new(self.first_symbol_index, self.first_symbol_index + self.nof_symbols)
    }

    /// Grid areas of both hops of resource `r_pucch` inside the UL BWP
    ///
    /// Default resources always hop; the first hop has floor(N_symb / 2)
    /// symbols.
    pub fn grants(&self, r_pucch: u8, ul_bwp: &CrbInterval) -> Option<(GrantInfo, GrantInfo)> {
        let (first_prb, second_prb) = self.prbs(r_pucch, ul_bwp.length())?;
        let symbols = self.symbols();
        let split = symbols.start + self.nof_symbols / 2;
        let first_crb = ul_bwp.start + first_prb;
        let second_crb = ul_bwp.start + second_prb;

        Some((
            GrantInfo::new(
                OfdmSymbolRange::new(symbols.start, split),
                CrbInterval::new(first_crb, first_crb + 1),
            ),
            GrantInfo::new(
                OfdmSymbolRange::new(split, symbols.stop),
                CrbInterval::new(second_crb, second_crb + 1),
            ),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_rows() {
        let row0 = get_pucch_default_resource(0, 51).unwrap();
        assert_eq!(row0.format, PucchFormat::Format0);
        assert_eq!(row0.symbols(), OfdmSymbolRange::new(12, 14));
        assert_eq!(row0.cs_indexes, &[0, 3]);

        let row7 = get_pucch_default_resource(7, 51).unwrap();
        assert_eq!(row7.symbols(), OfdmSymbolRange::new(4, 14));

        let row15 = get_pucch_default_resource(15, 51).unwrap();
        assert_eq!(row15.rb_bwp_offset, 12);

        assert!(get_pucch_default_resource(16, 51).is_none());
    }

    #[test]
    fn test_r_pucch() {
        assert_eq!(PucchDefaultResource::r_pucch(0, 4, 0), 0);
        assert_eq!(PucchDefaultResource::r_pucch(2, 4, 0), 1);
        assert_eq!(PucchDefaultResource::r_pucch(3, 4, 7), 15);
        assert_eq!(PucchDefaultResource::r_pucch(8, 16, 3), 7);
    }

    #[test]
    fn test_prbs_and_cyclic_shift() {
        let res = get_pucch_default_resource(11, 51).unwrap();
        // r_PUCCH 0 and 1 share PRB 0 with different cyclic shifts.
        assert_eq!(res.prbs(0, 51), Some((0, 50)));
        assert_eq!(res.prbs(1, 51), Some((0, 50)));
        assert_eq!(res.initial_cyclic_shift(0), 0);
        assert_eq!(res.initial_cyclic_shift(1), 6);
        assert_eq!(res.prbs(7, 51), Some((3, 47)));
        // Second half of the set mirrors the first.
        assert_eq!(res.prbs(8, 51), Some((50, 0)));
        assert_eq!(res.prbs(15, 51), Some((47, 3)));
        assert_eq!(res.initial_cyclic_shift(9), 6);
    }

    #[test]
    fn test_grants_split_symbols() {
        let res = get_pucch_default_resource(3, 24).unwrap();
        let (first, second) = res.grants(2, &CrbInterval::new(10, 34)).unwrap();
        assert_eq!(first.symbols, OfdmSymbolRange::new(10, 12));
        assert_eq!(second.symbols, OfdmSymbolRange::new(12, 14));
        assert_eq!(first.crbs, CrbInterval::new(11, 12));
        assert_eq!(second.crbs, CrbInterval::new(32, 33));
    }

    #[test]
    fn test_offset_larger_than_bwp() {
        let res = get_pucch_default_resource(6, 4).unwrap();
        assert!(res.prbs(0, 4).is_none());
    }
}
