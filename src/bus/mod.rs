use crate::delay::Delay;
use crate::sd::command::RCA;
use crate::sd::response::{Kind, R1};
use crate::sd::{data, Card, ErrorCode, BLOCK_SIZE};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Error {
    NoResponse,            // Probably no card
    VoltageMismatch,       // Interface condition not echoed back
    Command(u8, Kind),     // Command index and its failed outcome
    Status(u8, R1),        // Command index and the card status flagging it
    Descriptor,            // CSD capacity not representable
    Transfer(data::Error), // R/W error
    Timeout,               // No respond within expected duration
    OutOfRange,            // Block beyond the volume
    Uninitialized,         // No card brought up yet
}

impl Error {
    pub fn code(self) -> ErrorCode {
        match self {
            Self::NoResponse => ErrorCode::NotPresent,
            Self::VoltageMismatch => ErrorCode::VoltageMismatch,
            Self::Timeout | Self::Transfer(data::Error::Timeout) => ErrorCode::Timeout,
            _ => ErrorCode::Protocol,
        }
    }
}

pub trait Bus {
    /// Bring a freshly powered card to the addressed, ready state
    fn init<D: Delay>(&mut self, delay: &mut D) -> Result<Card, Error>;
    fn before(&mut self, card: &Card) -> Result<(), Error>;
    fn after(&mut self, card: &Card) -> Result<(), Error>;
    fn status(&mut self, rca: RCA) -> Result<R1, Error>;
    fn halt(&mut self, card: &Card) -> Result<(), Error>;
}

pub trait Read {
    fn read(&mut self, address: u32, block: &mut [u8; BLOCK_SIZE]) -> Result<(), Error>;
}

pub trait Write {
    fn write(&mut self, rca: RCA, address: u32, block: &[u8; BLOCK_SIZE]) -> Result<(), Error>;
    /// Erase from `start` to `end` inclusive, card addressing
    fn erase(&mut self, rca: RCA, start: u32, end: u32) -> Result<(), Error>;
}

pub mod sdmmc;
#[cfg(any(test, feature = "std"))]
pub mod sim;
