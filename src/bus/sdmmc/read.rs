use core::time::Duration;

use embedded_hal::timer::CountDown;

use crate::{
    bus::Read,
    sd::{
        command::Command,
        data::{self, DataControl, Direction},
        BLOCK_SIZE,
    },
};

use super::bus::{BUSError, Bus, Registers};
use super::registers::DATA_FLAGS;

impl<R, C> Bus<R, C>
where
    R: Registers,
    C: CountDown<Time = Duration>,
{
    pub(crate) fn start_data_path(&mut self, direction: Direction) {
        self.regs.data_timer(self.config.data_timer);
        self.regs.data_length(BLOCK_SIZE as u32);
        self.regs.data_control(DataControl::block(direction));
    }

    pub(crate) fn stop_data_path(&mut self) {
        self.regs.data_control(DataControl::disabled());
        self.regs.clear(DATA_FLAGS);
    }

    /// Drain the FIFO one word per poll until the data counter runs out
    pub(crate) fn read_block(&mut self, block: &mut [u8; BLOCK_SIZE]) -> Result<(), BUSError> {
        let mut offset = 0;
        self.countdown.start(self.config.data_timeout);
        loop {
            let status = self.regs.status();
            if let Some(e) = status.data_error() {
                return Err(BUSError::Transfer(e));
            }
            if status.rxdavl() {
                if offset == BLOCK_SIZE {
                    return Err(BUSError::Transfer(data::Error::Length));
                }
                let word = self.regs.read_fifo();
                block[offset..offset + 4].copy_from_slice(&word.to_le_bytes());
                offset += 4;
                continue;
            }
            if self.regs.data_count() == 0 {
                break;
            }
            if self.countdown.wait().is_ok() {
                warn!("Read stalled at byte {}", offset);
                return Err(BUSError::Timeout);
            }
        }
        match offset {
            BLOCK_SIZE => Ok(()),
            _ => Err(BUSError::Transfer(data::Error::Length)),
        }
    }
}

impl<R, C> Read for Bus<R, C>
where
    R: Registers,
    C: CountDown<Time = Duration>,
{
    fn read(&mut self, address: u32, block: &mut [u8; BLOCK_SIZE]) -> Result<(), BUSError> {
        self.regs.clear(DATA_FLAGS);
        self.start_data_path(Direction::CardToHost);
        let result = match self.expect(Command::ReadSingleBlock(address)) {
            Ok(_) => self.read_block(block),
            Err(e) => Err(e),
        };
        self.stop_data_path();
        result
    }
}
