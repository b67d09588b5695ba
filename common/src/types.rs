//! Common Types for 5G GNodeB
//!
//! Defines fundamental types used throughout the scheduler

use serde::{Deserialize, Serialize};
use num_derive::{FromPrimitive, ToPrimitive};
use std::fmt;

/// Radio Network Temporary Identifier (RNTI)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rnti(pub u16);

impl Rnti {
    /// First C-RNTI value handed out to UEs
    pub const MIN_CRNTI: Self = Self(0x0001);
    /// Last C-RNTI value handed out to UEs
    pub const MAX_CRNTI: Self = Self(0xFFEF);

    /// Create a new RNTI
    pub fn new(value: u16) -> Self {
        Self(value)
    }

    /// Whether the value lies in the C-RNTI range (TS 38.321 Table 7.1-1)
    pub fn is_crnti(&self) -> bool {
        (Self::MIN_CRNTI.0..=Self::MAX_CRNTI.0).contains(&self.0)
    }
}

impl fmt::Display for Rnti {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

/// Cell Identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellId(pub u16);

/// Physical Cell Identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pci(pub u16);

impl Pci {
    /// Maximum valid PCI value (0-1007)
    pub const MAX: u16 = 1007;

    /// Create a new PCI with validation
    pub fn new(value: u16) -> Option<Self> {
        if value <= Self::MAX {
            Some(Self(value))
        } else {
            None
        }
    }
}

/// Subcarrier spacing values in kHz
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, ToPrimitive, Serialize, Deserialize)]
pub enum SubcarrierSpacing {
    /// 15 kHz
    Scs15 = 15,
    /// 30 kHz
    Scs30 = 30,
    /// 60 kHz
    Scs60 = 60,
    /// 120 kHz
    Scs120 = 120,
    /// 240 kHz
    Scs240 = 240,
}

impl SubcarrierSpacing {
    /// Numerology index mu (TS 38.211 Table 4.2-1)
    pub fn numerology(&self) -> u8 {
        match self {
            SubcarrierSpacing::Scs15 => 0,
            SubcarrierSpacing::Scs30 => 1,
            SubcarrierSpacing::Scs60 => 2,
            SubcarrierSpacing::Scs120 => 3,
            SubcarrierSpacing::Scs240 => 4,
        }
    }

    /// Spacing in kHz
    pub fn to_khz(&self) -> u32 {
        *self as u32
    }

    /// Number of slots in a 1 ms subframe
    pub fn slots_per_subframe(&self) -> u32 {
        1 << self.numerology()
    }

    /// Number of slots in a 10 ms frame
    pub fn slots_per_frame(&self) -> u32 {
        10 * self.slots_per_subframe()
    }
}

/// Bandwidth values in MHz
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bandwidth {
    /// 5 MHz
    Bw5,
    /// 10 MHz
    Bw10,
    /// 15 MHz
    Bw15,
    /// 20 MHz
    Bw20,
    /// 25 MHz
    Bw25,
    /// 30 MHz
    Bw30,
    /// 40 MHz
    Bw40,
    /// 50 MHz
    Bw50,
    /// 60 MHz
    Bw60,
    /// 80 MHz
    Bw80,
    /// 100 MHz
    Bw100,
}

impl Bandwidth {
    /// Parse a channel bandwidth given in MHz
    pub fn from_mhz(mhz: u32) -> Option<Self> {
        let bw = match mhz {
            5 => Bandwidth::Bw5,
            10 => Bandwidth::Bw10,
            15 => Bandwidth::Bw15,
            20 => Bandwidth::Bw20,
            25 => Bandwidth::Bw25,
            30 => Bandwidth::Bw30,
            40 => Bandwidth::Bw40,
            50 => Bandwidth::Bw50,
            60 => Bandwidth::Bw60,
            80 => Bandwidth::Bw80,
            100 => Bandwidth::Bw100,
            _ => return None,
        };
        Some(bw)
    }

    /// Get bandwidth in Hz
    pub fn as_hz(&self) -> u32 {
        match self {
            Bandwidth::Bw5 => 5_000_000,
            Bandwidth::Bw10 => 10_000_000,
            Bandwidth::Bw15 => 15_000_000,
            Bandwidth::Bw20 => 20_000_000,
            Bandwidth::Bw25 => 25_000_000,
            Bandwidth::Bw30 => 30_000_000,
            Bandwidth::Bw40 => 40_000_000,
            Bandwidth::Bw50 => 50_000_000,
            Bandwidth::Bw60 => 60_000_000,
            Bandwidth::Bw80 => 80_000_000,
            Bandwidth::Bw100 => 100_000_000,
        }
    }
}
