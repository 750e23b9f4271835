//! SDMMC1 of STM32L4x6, the peripheral is expected clocked and reset, pins in AF12

use stm32l4::stm32l4x6::SDMMC1;

use crate::sd::command::ResponseShape;
use crate::sd::data::{DataControl, Direction};
use crate::sd::registers::BusWidth;

use super::bus::Registers;
use super::registers::Status;

impl Registers for SDMMC1 {
    fn command(&mut self, index: u8, argument: u32, response: ResponseShape) {
        self.arg.write(|w| unsafe { w.cmdarg().bits(argument) });
        let waitresp = match response {
            ResponseShape::None => 0b00,
            ResponseShape::Short => 0b01,
            ResponseShape::Long => 0b11,
        };
        self.cmd.write(|w| unsafe {
            w.cmdindex()
                .bits(index)
                .waitresp()
                .bits(waitresp)
                .waitint()
                .clear_bit()
                .cpsmen()
                .set_bit()
        });
    }

    fn status(&mut self) -> Status {
        Status(self.sta.read().bits())
    }

    fn clear(&mut self, flags: u32) {
        self.icr.write(|w| unsafe { w.bits(flags) });
    }

    fn response_command(&mut self) -> u8 {
        self.respcmd.read().respcmd().bits()
    }

    fn short_response(&mut self) -> u32 {
        self.resp1.read().bits()
    }

    fn long_response(&mut self) -> [u32; 4] {
        // RESP1 holds the most significant word
        [
            self.resp4.read().bits(),
            self.resp3.read().bits(),
            self.resp2.read().bits(),
            self.resp1.read().bits(),
        ]
    }

    fn data_timer(&mut self, cycles: u32) {
        self.dtimer.write(|w| unsafe { w.datatime().bits(cycles) });
    }

    fn data_length(&mut self, bytes: u32) {
        self.dlen.write(|w| unsafe { w.datalength().bits(bytes) });
    }

    fn data_control(&mut self, control: DataControl) {
        self.dctrl.modify(|_, w| unsafe {
            w.dblocksize()
                .bits(control.block_size_shift)
                .dtdir()
                .bit(control.direction == Direction::CardToHost)
                .dtmode()
                .clear_bit()
                .dmaen()
                .clear_bit()
                .dten()
                .bit(control.enable)
        });
    }

    fn data_count(&mut self) -> u32 {
        self.dcount.read().datacount().bits()
    }

    fn read_fifo(&mut self) -> u32 {
        self.fifo.read().bits()
    }

    fn write_fifo(&mut self, word: u32) {
        self.fifo.write(|w| unsafe { w.bits(word) });
    }

    fn bus_width(&mut self, width: BusWidth) {
        let widbus = match width {
            BusWidth::One => 0b00,
            BusWidth::Four => 0b01,
        };
        self.clkcr.modify(|_, w| unsafe { w.widbus().bits(widbus) });
    }
}
