//! # sdmmc
//!
//! > A polling SD/MMC host driver for `no_std` systems, no DMA and no interrupts
//!
//! ## Using this crate
//!
//! Assuming clocks and pins of the host peripheral are already configured and
//! `SDMMC` implements `sdmmc::bus::sdmmc::Registers`
//!
//! ```ignore
//! let bus = sdmmc::bus::sdmmc::Bus::new(SDMMC, countdown);
//! let mut sd = SD::new(bus);
//! sd.initialize(&mut delay).map_err(|e| format!("{:?}", e))?;
//! let size = Size::from_bytes(sd.num_blocks() as u64 * sd.block_size() as u64);
//! debug!("Size {}", size);
//!
//! let mut buffer = [0u8; 512];
//! sd.read(0, &mut buffer).map_err(|e| format!("{:?}", e))?;
//! let mbr = MasterBootRecord::from_bytes(&buffer).map_err(|e| format!("{:?}", e))?;
//! for partition in mbr.partition_table_entries().iter() {
//!     println!("{:?}", partition);
//! }
//! Ok(())
//! ```

#![cfg_attr(not(any(test, feature = "std")), no_std)]

#[macro_use]
extern crate log;

#[cfg(feature = "embedded-sdmmc")]
pub mod block_device;
pub mod bus;
pub mod config;
pub mod delay;
pub mod sd;

use bus::Error;
use delay::Delay;
use sd::{Card, ErrorCode, BLOCK_SIZE};

pub struct SD<BUS> {
    bus: BUS,
    card: Card,
}

type LBA = u32;

impl<BUS> SD<BUS>
where
    BUS: bus::Read + bus::Write + bus::Bus,
{
    pub fn new(bus: BUS) -> Self {
        Self { bus, card: Card::default() }
    }

    /// Run the card init sequence, must succeed before any block operation
    pub fn initialize(&mut self, delay: &mut impl Delay) -> Result<(), Error> {
        match self.bus.init(delay) {
            Ok(card) => {
                info!("Card {:?} ready, {} blocks", card.class, card.num_blocks);
                self.card = card;
                Ok(())
            }
            Err(e) => {
                self.card = Card::failed(e.code());
                Err(e)
            }
        }
    }

    pub fn card(&self) -> &Card {
        &self.card
    }

    pub fn bus<R>(&mut self, f: impl FnOnce(&mut BUS) -> R) -> R {
        f(&mut self.bus)
    }

    fn address(&self, block: LBA) -> Result<u32, Error> {
        if !self.card.class.ready() {
            return Err(Error::Uninitialized);
        }
        if block >= self.card.num_blocks {
            return Err(Error::OutOfRange);
        }
        match self.card.high_capacity() {
            true => Ok(block),
            false => block.checked_mul(BLOCK_SIZE as u32).ok_or(Error::OutOfRange),
        }
    }

    pub fn read(&mut self, block: LBA, buffer: &mut [u8; BLOCK_SIZE]) -> Result<(), Error> {
        let address = self.address(block)?;
        self.bus.before(&self.card)?;
        let result = self.bus.read(address, buffer);
        let deselected = self.bus.after(&self.card);
        result.and(deselected)
    }

    /// A failed write leaves the target block in an indeterminate state
    pub fn write(&mut self, block: LBA, buffer: &[u8; BLOCK_SIZE]) -> Result<(), Error> {
        let address = self.address(block)?;
        self.bus.before(&self.card)?;
        let result = self.bus.write(self.card.rca, address, buffer);
        let deselected = self.bus.after(&self.card);
        result.and(deselected)
    }

    pub fn erase(&mut self, first: LBA, count: u32) -> Result<(), Error> {
        if count == 0 {
            return Ok(());
        }
        let last = first.checked_add(count - 1).ok_or(Error::OutOfRange)?;
        let (start, end) = (self.address(first)?, self.address(last)?);
        self.bus.before(&self.card)?;
        let result = self.bus.erase(self.card.rca, start, end);
        let deselected = self.bus.after(&self.card);
        result.and(deselected)
    }

    pub fn is_busy(&mut self) -> Result<bool, Error> {
        if !self.card.class.ready() {
            return Err(Error::Uninitialized);
        }
        Ok(self.bus.status(self.card.rca)?.state().is_busy())
    }

    /// Put the card into inactive state, `initialize` is needed again afterwards
    pub fn halt(&mut self) -> Result<(), Error> {
        if !self.card.class.ready() {
            return Err(Error::Uninitialized);
        }
        self.bus.halt(&self.card)?;
        self.card = Card::default();
        Ok(())
    }

    pub fn num_blocks(&self) -> u32 {
        self.card.num_blocks
    }

    pub fn block_size(&self) -> usize {
        BLOCK_SIZE
    }

    pub fn read_only(&self) -> bool {
        self.card.read_only
    }

    pub fn last_error(&self) -> ErrorCode {
        self.card.error
    }
}

#[cfg(test)]
mod test {
    use crate::bus::sdmmc::Bus;
    use crate::bus::sim::{self, NoDelay, SimulatedCard};
    use crate::bus::Error;
    use crate::sd::response::CardState;
    use crate::sd::{data, CardClass, ErrorCode, BLOCK_SIZE};

    use super::SD;

    type Driver = SD<Bus<SimulatedCard, sim::CountDown>>;

    fn uninitialized(card: SimulatedCard) -> Driver {
        SD::new(Bus::new(card, sim::CountDown::default()))
    }

    fn sd(card: SimulatedCard) -> Driver {
        let mut sd = uninitialized(card);
        sd.initialize(&mut NoDelay::default()).unwrap();
        sd
    }

    fn history(sd: &mut Driver) -> Vec<u8> {
        sd.bus(|bus| bus.registers(|card| card.history().to_vec()))
    }

    fn pattern(seed: u8) -> [u8; BLOCK_SIZE] {
        let mut block = [0u8; BLOCK_SIZE];
        for (i, byte) in block.iter_mut().enumerate() {
            *byte = (i as u8).wrapping_mul(31).wrapping_add(seed);
        }
        block
    }

    #[test]
    fn test_round_trip_high_capacity() {
        let mut sd = sd(SimulatedCard::new(sim::Kind::HighCapacity));
        assert_eq!(sd.card().class, CardClass::SDHC);
        let block = pattern(7);
        sd.write(3, &block).unwrap();
        let mut buffer = [0u8; BLOCK_SIZE];
        sd.read(3, &mut buffer).unwrap();
        assert_eq!(buffer[..], block[..]);
        let stored = sd.bus(|bus| bus.registers(|card| card.storage().to_vec()));
        assert_eq!(stored[3 * BLOCK_SIZE..4 * BLOCK_SIZE], block[..]);
    }

    #[test]
    fn test_round_trip_standard_capacity() {
        let mut sd = sd(SimulatedCard::new(sim::Kind::Legacy));
        assert_eq!(sd.card().class, CardClass::SDSC);
        let last = sd.num_blocks() - 1;
        let block = pattern(0xA5);
        sd.write(last, &block).unwrap();
        let mut buffer = [0u8; BLOCK_SIZE];
        sd.read(last, &mut buffer).unwrap();
        assert_eq!(buffer[..], block[..]);
        sd.read(0, &mut buffer).unwrap();
        assert_eq!(buffer, [0u8; BLOCK_SIZE]);
    }

    #[test]
    fn test_write_waits_for_programming() {
        let card = SimulatedCard::new(sim::Kind::HighCapacity).programming_polls(20);
        let mut sd = sd(card);
        sd.write(0, &pattern(1)).unwrap();
        // ready-for-data before CMD24, then 20 busy polls plus the ready one
        let polls = history(&mut sd).iter().filter(|&&i| i == 13).count();
        assert_eq!(polls, 1 + 21);
        assert!(!sd.bus(|bus| bus.registers(|card| card.selected())));
    }

    #[test]
    fn test_block_bounds() {
        let mut sd = sd(SimulatedCard::new(sim::Kind::HighCapacity));
        let mut buffer = [0u8; BLOCK_SIZE];
        let blocks = sd.num_blocks();
        assert_eq!(blocks, sim::HIGH_CAPACITY_BLOCKS);
        assert_eq!(sd.read(blocks, &mut buffer), Err(Error::OutOfRange));
        assert_eq!(sd.write(blocks, &buffer), Err(Error::OutOfRange));
        assert_eq!(sd.erase(blocks - 1, 2), Err(Error::OutOfRange));
        assert!(sd.read(blocks - 1, &mut buffer).is_ok());
    }

    #[test]
    fn test_uninitialized() {
        let mut sd = uninitialized(SimulatedCard::new(sim::Kind::HighCapacity));
        let mut buffer = [0u8; BLOCK_SIZE];
        assert_eq!(sd.num_blocks(), 0);
        assert_eq!(sd.block_size(), 512);
        assert_eq!(sd.last_error(), ErrorCode::None);
        assert_eq!(sd.read(0, &mut buffer), Err(Error::Uninitialized));
        assert_eq!(sd.is_busy(), Err(Error::Uninitialized));
    }

    #[test]
    fn test_failed_initialize_records_error() {
        let mut sd = uninitialized(SimulatedCard::new(sim::Kind::Absent));
        assert_eq!(sd.initialize(&mut NoDelay::default()), Err(Error::NoResponse));
        assert_eq!(sd.last_error(), ErrorCode::NotPresent);
        assert_eq!(sd.card().class, CardClass::Error);
        assert_eq!(sd.num_blocks(), 0);

        let mut sd = uninitialized(SimulatedCard::new(sim::Kind::BadEcho));
        assert_eq!(sd.initialize(&mut NoDelay::default()), Err(Error::VoltageMismatch));
        assert_eq!(sd.last_error(), ErrorCode::VoltageMismatch);

        let csd = 15u128 << 80 | 0xFFFu128 << 62 | 7u128 << 47;
        let mut sd = uninitialized(SimulatedCard::new(sim::Kind::Legacy).descriptor(csd));
        assert_eq!(sd.initialize(&mut NoDelay::default()), Err(Error::Descriptor));
        assert_eq!(sd.last_error(), ErrorCode::Protocol);
        assert_eq!(sd.num_blocks(), 0);
    }

    #[test]
    fn test_largest_byte_address() {
        // 4GB standard capacity card, last block at byte 0xFFFF_FE00
        let csd = 11u128 << 80 | 0xFFFu128 << 62 | 7u128 << 47;
        let mut sd = sd(SimulatedCard::new(sim::Kind::Legacy).descriptor(csd));
        assert_eq!(sd.num_blocks(), 1 << 23);
        let mut buffer = [0u8; BLOCK_SIZE];
        // beyond the simulated storage, refused by the card rather than wrapped
        match sd.read((1 << 23) - 1, &mut buffer) {
            Err(Error::Status(17, status)) => assert!(status.out_of_range()),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(sd.read(1 << 23, &mut buffer), Err(Error::OutOfRange));
        assert_eq!(sd.card().class, CardClass::SDSC);
    }

    #[test]
    fn test_stalled_read_times_out() {
        let mut sd = sd(SimulatedCard::new(sim::Kind::HighCapacity));
        sd.bus(|bus| bus.registers(|card| card.stall(true)));
        let mut buffer = [0u8; BLOCK_SIZE];
        assert_eq!(sd.read(1, &mut buffer), Err(Error::Timeout));
        assert_eq!(sd.write(1, &pattern(2)), Err(Error::Timeout));

        // Descriptor untouched, the single operation can be retried
        assert_eq!(sd.card().class, CardClass::SDHC);
        assert_eq!(sd.last_error(), ErrorCode::None);
        sd.bus(|bus| bus.registers(|card| card.stall(false)));
        sd.write(1, &pattern(2)).unwrap();
        sd.read(1, &mut buffer).unwrap();
        assert_eq!(buffer[..], pattern(2)[..]);
    }

    #[test]
    fn test_is_busy() {
        let mut sd = sd(SimulatedCard::new(sim::Kind::HighCapacity));
        assert_eq!(sd.is_busy(), Ok(false));
        assert!(!sd.read_only());
    }

    #[test]
    fn test_erase() {
        let mut sd = sd(SimulatedCard::new(sim::Kind::Legacy));
        for block in 4..8 {
            sd.write(block, &pattern(block as u8)).unwrap();
        }
        sd.erase(5, 2).unwrap();
        let mut buffer = [0u8; BLOCK_SIZE];
        for block in 4..8 {
            sd.read(block, &mut buffer).unwrap();
            match block {
                5 | 6 => assert_eq!(buffer, [0u8; BLOCK_SIZE]),
                _ => assert_eq!(buffer[..], pattern(block as u8)[..]),
            }
        }
        assert_eq!(sd.erase(0, 0), Ok(()));
    }

    #[test]
    fn test_halt() {
        let mut sd = sd(SimulatedCard::new(sim::Kind::HighCapacity));
        sd.halt().unwrap();
        assert_eq!(sd.num_blocks(), 0);
        assert_eq!(sd.halt(), Err(Error::Uninitialized));
        assert_eq!(history(&mut sd).last(), Some(&15));
        let state = sd.bus(|bus| bus.registers(|card| card.state()));
        assert_eq!(state, CardState::Disabled);
    }

    #[test]
    fn test_transfer_error_code() {
        assert_eq!(Error::Transfer(data::Error::Timeout).code(), ErrorCode::Timeout);
        assert_eq!(Error::Transfer(data::Error::CRC).code(), ErrorCode::Protocol);
        assert_eq!(Error::Timeout.code(), ErrorCode::Timeout);
    }
}
