pub mod command;
pub mod data;
pub mod registers;
pub mod response;

use command::RCA;
use registers::CID;

pub const BLOCK_SIZE: usize = 512;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum CardClass {
    #[default]
    Unknown,
    SDSC,
    SDHC,
    Error,
}

impl CardClass {
    pub fn high_capacity(self) -> bool {
        self == Self::SDHC
    }

    pub fn ready(self) -> bool {
        matches!(self, Self::SDSC | Self::SDHC)
    }
}

/// Persistent error classification of the last `initialize`
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum ErrorCode {
    #[default]
    None,
    NotPresent,
    VoltageMismatch,
    Protocol,
    Timeout,
}

/// Everything known about the attached card.
///
/// Zero-valued until the init sequence completes, and only replaced as a whole
/// between operations. `read_only` is always false since the write-protect
/// switch is never sampled.
#[derive(Copy, Clone, Debug, Default)]
pub struct Card {
    pub class: CardClass,
    pub rca: RCA,
    pub num_blocks: u32,
    pub error: ErrorCode,
    pub read_only: bool,
    pub cid: CID,
}

impl Card {
    pub fn high_capacity(&self) -> bool {
        self.class.high_capacity()
    }

    pub(crate) fn failed(error: ErrorCode) -> Self {
        Self { class: CardClass::Error, error, ..Default::default() }
    }
}
