//! Uplink resource grid occupancy
//!
//! Tracks which (OFDM symbol, CRB) positions of one UL slot are already
//! taken. It only records occupancy; who owns a position is kept in the
//! scheduling result of the slot.

use common::{MAX_NOF_PRBS, NOF_OFDM_SYM_PER_SLOT};
use serde::{Deserialize, Serialize};

const BITS_PER_WORD: usize = 64;
const WORDS_PER_SYMBOL: usize = (MAX_NOF_PRBS + BITS_PER_WORD - 1) / BITS_PER_WORD;

/// Half-open interval of common resource blocks `[start, stop)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CrbInterval {
    pub start: u16,
    pub stop: u16,
}

impl CrbInterval {
    pub fn new(start: u16, stop: u16) -> Self {
        Self { start, stop }
    }

    pub fn length(&self) -> u16 {
        self.stop.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.stop <= self.start
    }

    pub fn overlaps(&self, other: &CrbInterval) -> bool {
        self.start < other.stop && other.start < self.stop
    }
}

/// Half-open interval of OFDM symbols within a slot `[start, stop)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OfdmSymbolRange {
    pub start: u8,
    pub stop: u8,
}

impl OfdmSymbolRange {
    pub fn new(start: u8, stop: u8) -> Self {
        Self { start, stop }
    }

    pub fn length(&self) -> u8 {
        self.stop.saturating_sub(self.start)
    }

    pub fn overlaps(&self, other: &OfdmSymbolRange) -> bool {
        self.start < other.stop && other.start < self.stop
    }
}

/// Rectangle of symbols x CRBs taken by a grant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GrantInfo {
    pub symbols: OfdmSymbolRange,
    pub crbs: CrbInterval,
}

impl GrantInfo {
    pub fn new(symbols: OfdmSymbolRange, crbs: CrbInterval) -> Self {
        Self { symbols, crbs }
    }

    pub fn overlaps(&self, other: &GrantInfo) -> bool {
        self.symbols.overlaps(&other.symbols) && self.crbs.overlaps(&other.crbs)
    }
}

/// Per-symbol CRB occupancy bitmap of one UL slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UlResourceGrid {
    symbols: [[u64; WORDS_PER_SYMBOL]; NOF_OFDM_SYM_PER_SLOT],
}

impl Default for UlResourceGrid {
    fn default() -> Self {
        Self {
            symbols: [[0; WORDS_PER_SYMBOL]; NOF_OFDM_SYM_PER_SLOT],
        }
    }
}

impl UlResourceGrid {
    /// Mark the grant area as occupied
    pub fn fill(&mut self, grant: &GrantInfo) {
        for (symbol, word, mask) in positions(grant) {
            self.symbols[symbol][word] |= mask;
        }
    }

    /// Mark the grant area as free
    pub fn clear(&mut self, grant: &GrantInfo) {
        for (symbol, word, mask) in positions(grant) {
            self.symbols[symbol][word] &= !mask;
        }
    }

    /// Whether any position of the grant area is occupied
    pub fn collides(&self, grant: &GrantInfo) -> bool {
        positions(grant).any(|(symbol, word, mask)| self.symbols[symbol][word] & mask != 0)
    }

    /// Whether nothing is allocated in the slot
    pub fn is_empty(&self) -> bool {
        self.symbols.iter().flatten().all(|word| *word == 0)
    }

    /// Free the whole slot
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// (symbol, word index, bit mask) triples covering a grant, clamped to the grid
fn positions(grant: &GrantInfo) -> impl Iterator<Item = (usize, usize, u64)> {
    let sym_start = (grant.symbols.start as usize).min(NOF_OFDM_SYM_PER_SLOT);
    let sym_stop = (grant.symbols.stop as usize).clamp(sym_start, NOF_OFDM_SYM_PER_SLOT);
    let crb_start = (grant.crbs.start as usize).min(MAX_NOF_PRBS);
    let crb_stop = (grant.crbs.stop as usize).clamp(crb_start, MAX_NOF_PRBS);

    (sym_start..sym_stop).flat_map(move |symbol| {
        word_masks(crb_start, crb_stop).map(move |(word, mask)| (symbol, word, mask))
    })
}

fn word_masks(crb_start: usize, crb_stop: usize) -> impl Iterator<Item = (usize, u64)> {
    let first_word = crb_start / BITS_PER_WORD;
    let last_word = (crb_stop + BITS_PER_WORD - 1) / BITS_PER_WORD;

    (first_word..last_word).map(move |word| {
        let lo = (word * BITS_PER_WORD).max(crb_start);
        let hi = ((word + 1) * BITS_PER_WORD).min(crb_stop);
        let nof_bits = hi.saturating_sub(lo);
        let mask = if nof_bits == BITS_PER_WORD {
            u64::MAX
        } else {
            ((1u64 << nof_bits) - 1) << (lo - word * BITS_PER_WORD)
        };
        (word, mask)
    })
}
