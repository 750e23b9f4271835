use core::time::Duration;

use embedded_hal::timer::CountDown;

use crate::{
    bus::Write,
    sd::{
        command::{Command, RCA},
        data::{self, Direction},
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
    /// Keep the FIFO fed one word per half-empty observation until data end
    pub(crate) fn write_block(&mut self, block: &[u8; BLOCK_SIZE]) -> Result<(), BUSError> {
        let mut words = block.chunks_exact(4).map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]));
        if let Some(word) = words.next() {
            self.regs.write_fifo(word);
        }
        self.countdown.start(self.config.data_timeout);
        loop {
            let status = self.regs.status();
            if let Some(e) = status.data_error() {
                return Err(BUSError::Transfer(e));
            }
            if status.dataend() {
                break;
            }
            if status.txfifohe() {
                if let Some(word) = words.next() {
                    self.regs.write_fifo(word);
                    continue;
                }
            }
            if self.countdown.wait().is_ok() {
                warn!("Write stalled with {} words pending", words.len());
                return Err(BUSError::Timeout);
            }
        }
        match words.len() {
            0 => Ok(()),
            _ => Err(BUSError::Transfer(data::Error::Length)),
        }
    }
}

impl<R, C> Write for Bus<R, C>
where
    R: Registers,
    C: CountDown<Time = Duration>,
{
    fn write(&mut self, rca: RCA, address: u32, block: &[u8; BLOCK_SIZE]) -> Result<(), BUSError> {
        self.wait_ready_for_data(rca)?;
        self.expect(Command::WriteBlock(address))?;
        self.regs.clear(DATA_FLAGS);
        self.start_data_path(Direction::HostToCard);
        let result = self.write_block(block);
        self.stop_data_path();
        result?;
        // Card is done committing once it reports ready for data again
        self.wait_ready_for_data(rca)
    }

    fn erase(&mut self, rca: RCA, start: u32, end: u32) -> Result<(), BUSError> {
        self.wait_ready_for_data(rca)?;
        self.expect(Command::EraseWriteBlockStart(start))?;
        self.expect(Command::EraseWriteBlockEnd(end))?;
        self.expect(Command::Erase)?;
        self.wait_ready_for_data(rca)
    }
}
