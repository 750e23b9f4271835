//! A host peripheral with one card attached, emulated in memory.

use std::collections::VecDeque;
use std::time::Duration;
use std::vec::Vec;

use crate::bus::sdmmc::{registers::Status, Registers};
use crate::sd::command::{ResponseShape, OCR_VOLTAGE_WINDOW};
use crate::sd::data::{DataControl, Direction};
use crate::sd::registers::BusWidth;
use crate::sd::response::CardState;
use crate::sd::BLOCK_SIZE;

pub const RCA: u16 = 0xB368;
pub const HIGH_CAPACITY_BLOCKS: u32 = 1024;
pub const STANDARD_CAPACITY_BLOCKS: u32 = 1024;

const CID: u128 = 0x0353_4453_494D_5344_1012_3456_7801_4A01; // "SIMSD"
const ILLEGAL_COMMAND: u32 = 1 << 22;
const APP_CMD: u32 = 1 << 5;
const READY_FOR_DATA: u32 = 1 << 8;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Kind {
    /// SD v1.x, rejects CMD8
    Legacy,
    /// SD v2, capacity status clear
    StandardCapacity,
    HighCapacity,
    /// Answers CMD8 with a corrupted check pattern
    BadEcho,
    Absent,
}

/// Command path faults, injected until cleared
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Fault {
    /// Command path never completes
    Hang,
    /// Every response fails its CRC check
    Crc,
    /// Responses echo the wrong command index
    Echo,
}

enum Reply {
    None,
    Silent,
    Rejected,
    Short(u32),
    Ocr(u32),
    Long(u128),
}

struct Transfer {
    offset: usize,
    direction: Direction,
}

pub struct SimulatedCard {
    kind: Kind,
    state: CardState,
    rca: u16,
    app_cmd: bool,
    power_up_polls: usize,
    programming_polls: usize,
    programming: usize,
    block_len: u32,
    erase_range: (u32, u32),
    storage: Vec<u8>,
    csd: u128,
    history: Vec<u8>,
    last_op_cond_hcs: Option<bool>,
    stalled: bool,
    fault: Option<Fault>,

    status: u32,
    respcmd: u8,
    resp: [u32; 4],
    data_length: u32,
    data_count: u32,
    control: DataControl,
    transfer: Option<Transfer>,
    rx: VecDeque<u32>,
    tx: Vec<u32>,
    bus_width: BusWidth,
}

impl SimulatedCard {
    pub fn new(kind: Kind) -> Self {
        let blocks = match kind {
            Kind::HighCapacity => HIGH_CAPACITY_BLOCKS,
            _ => STANDARD_CAPACITY_BLOCKS,
        };
        Self::with_image(kind, vec![0u8; blocks as usize * BLOCK_SIZE])
    }

    /// Card backed by `image`, padded up to a capacity the CSD can express
    pub fn with_image(kind: Kind, mut image: Vec<u8>) -> Self {
        let csd = match kind {
            Kind::HighCapacity => {
                let units = (image.len() + 1024 * BLOCK_SIZE - 1) / (1024 * BLOCK_SIZE);
                let units = units.max(1);
                image.resize(units * 1024 * BLOCK_SIZE, 0);
                1u128 << 126 | ((units - 1) as u128) << 48
            }
            _ => {
                // 9-bit read block length, multiplier 2^(0+2)
                let units = (image.len() + 4 * BLOCK_SIZE - 1) / (4 * BLOCK_SIZE);
                let units = units.clamp(1, 4096);
                image.resize(units * 4 * BLOCK_SIZE, 0);
                9u128 << 80 | ((units - 1) as u128) << 62
            }
        };
        Self {
            kind,
            state: CardState::Idle,
            rca: 0,
            app_cmd: false,
            power_up_polls: 0,
            programming_polls: 2,
            programming: 0,
            block_len: BLOCK_SIZE as u32,
            erase_range: (0, 0),
            storage: image,
            csd,
            history: Vec::new(),
            last_op_cond_hcs: None,
            stalled: false,
            fault: None,
            status: 0,
            respcmd: 0,
            resp: [0; 4],
            data_length: 0,
            data_count: 0,
            control: DataControl::disabled(),
            transfer: None,
            rx: VecDeque::new(),
            tx: Vec::new(),
            bus_width: BusWidth::One,
        }
    }

    /// ACMD41 reports busy this many times before power-up completes
    pub fn power_up_polls(mut self, polls: usize) -> Self {
        self.power_up_polls = polls;
        self
    }

    /// CMD13 reports programming this many times after a write or erase
    pub fn programming_polls(mut self, polls: usize) -> Self {
        self.programming_polls = polls;
        self
    }

    /// Replace the CSD the card reports
    pub fn descriptor(mut self, csd: u128) -> Self {
        self.csd = csd;
        self
    }

    /// Data path never moves a word
    pub fn stall(&mut self, stalled: bool) {
        self.stalled = stalled;
    }

    pub fn fault(&mut self, fault: Option<Fault>) {
        self.fault = fault;
    }

    pub fn history(&self) -> &[u8] {
        &self.history
    }

    pub fn csd(&self) -> u128 {
        self.csd
    }

    pub fn storage(&self) -> &[u8] {
        &self.storage
    }

    pub fn last_op_cond_hcs(&self) -> Option<bool> {
        self.last_op_cond_hcs
    }

    pub fn block_len(&self) -> u32 {
        self.block_len
    }

    pub fn bus_width_setting(&self) -> BusWidth {
        self.bus_width
    }

    pub fn selected(&self) -> bool {
        matches!(
            self.state,
            CardState::Transfer
                | CardState::SendingData
                | CardState::ReceivingData
                | CardState::Programming
        )
    }

    pub fn state(&self) -> CardState {
        self.state
    }

    fn high_capacity(&self) -> bool {
        self.kind == Kind::HighCapacity
    }

    fn byte_offset(&self, address: u32) -> usize {
        match self.high_capacity() {
            true => address as usize * BLOCK_SIZE,
            false => address as usize,
        }
    }

    fn card_status(&mut self) -> u32 {
        let state = match (self.state, self.programming) {
            (CardState::Programming, 0) => {
                self.state = CardState::Transfer;
                CardState::Transfer
            }
            (CardState::Programming, _) => {
                self.programming -= 1;
                CardState::Programming
            }
            (state, _) => state,
        };
        let ready = match state {
            CardState::Transfer | CardState::Standby => READY_FOR_DATA,
            _ => 0,
        };
        (state as u32) << 9 | ready | if self.app_cmd { APP_CMD } else { 0 }
    }

    fn addressed(&self, argument: u32) -> bool {
        self.rca != 0 && (argument >> 16) as u16 == self.rca
    }

    fn execute(&mut self, index: u8, argument: u32) -> Reply {
        let app = core::mem::take(&mut self.app_cmd);
        match (app, index) {
            (_, 0) => {
                self.state = CardState::Idle;
                self.rca = 0;
                Reply::None
            }
            (true, 41) => {
                let hcs = argument & (1 << 30) != 0;
                self.last_op_cond_hcs = Some(hcs);
                if self.power_up_polls > 0 {
                    self.power_up_polls -= 1;
                    return Reply::Ocr(OCR_VOLTAGE_WINDOW);
                }
                self.state = CardState::Ready;
                let ccs = (self.high_capacity() && hcs) as u32;
                Reply::Ocr(1 << 31 | ccs << 30 | OCR_VOLTAGE_WINDOW)
            }
            (true, 6) => {
                self.bus_width = match argument & 0b11 {
                    0b10 => BusWidth::Four,
                    _ => BusWidth::One,
                };
                Reply::Short(self.card_status())
            }
            (_, 2) if self.state == CardState::Ready => {
                self.state = CardState::Identification;
                Reply::Long(CID)
            }
            (_, 3) => {
                self.rca = RCA;
                self.state = CardState::Standby;
                Reply::Short((self.rca as u32) << 16 | (CardState::Identification as u32) << 9)
            }
            (_, 7) if self.addressed(argument) => {
                let status = self.card_status();
                if self.state == CardState::Standby {
                    self.state = CardState::Transfer;
                }
                Reply::Short(status)
            }
            (_, 7) => {
                if self.selected() {
                    self.state = CardState::Standby;
                    self.transfer = None;
                }
                Reply::Silent
            }
            (_, 8) => match self.kind {
                Kind::Legacy => Reply::Rejected,
                Kind::BadEcho => Reply::Short((argument & 0xF00) | ((argument & 0xFF) ^ 0x55)),
                _ => Reply::Short(argument & 0xFFF),
            },
            (_, 9) if self.addressed(argument) => Reply::Long(self.csd),
            (_, 13) if self.addressed(argument) => Reply::Short(self.card_status()),
            (_, 15) if self.addressed(argument) => {
                self.state = CardState::Disabled;
                Reply::None
            }
            (_, 16) if self.selected() => {
                self.block_len = argument;
                Reply::Short(self.card_status())
            }
            (_, 17) | (_, 24) if self.state == CardState::Transfer => {
                let status = self.card_status();
                let offset = self.byte_offset(argument);
                if offset + BLOCK_SIZE > self.storage.len() {
                    return Reply::Short(status | 1 << 31);
                }
                let direction = match index {
                    17 => Direction::CardToHost,
                    _ => Direction::HostToCard,
                };
                self.state = match direction {
                    Direction::CardToHost => CardState::SendingData,
                    Direction::HostToCard => CardState::ReceivingData,
                };
                self.transfer = Some(Transfer { offset, direction });
                self.start_transfer();
                Reply::Short(status)
            }
            (_, 32) if self.state == CardState::Transfer => {
                self.erase_range.0 = argument;
                Reply::Short(self.card_status())
            }
            (_, 33) if self.state == CardState::Transfer => {
                self.erase_range.1 = argument;
                Reply::Short(self.card_status())
            }
            (_, 38) if self.state == CardState::Transfer => {
                let status = self.card_status();
                let (start, end) = self.erase_range;
                let start = self.byte_offset(start);
                let end = (self.byte_offset(end) + BLOCK_SIZE).min(self.storage.len());
                if start < end {
                    self.storage[start..end].fill(0);
                }
                self.state = CardState::Programming;
                self.programming = self.programming_polls;
                Reply::Short(status)
            }
            (_, 55) => {
                self.app_cmd = true;
                Reply::Short(self.card_status())
            }
            _ => Reply::Silent,
        }
    }

    fn start_transfer(&mut self) {
        let transfer = match &self.transfer {
            Some(transfer) if self.control.enable => transfer,
            _ => return,
        };
        if transfer.direction != self.control.direction || self.stalled {
            return;
        }
        if transfer.direction == Direction::CardToHost && self.rx.is_empty() {
            let offset = transfer.offset;
            let length = self.data_length as usize;
            let bytes = &self.storage[offset..offset + length];
            let words = bytes.chunks_exact(4).map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]));
            self.rx.extend(words);
        }
    }

    fn finish_transfer(&mut self) {
        let mut status = Status(self.status);
        status.set_dataend(true);
        status.set_dbckend(true);
        self.status = status.0;
        self.data_count = 0;
        if let Some(Transfer { offset, direction: Direction::HostToCard }) = self.transfer {
            for (i, word) in self.tx.drain(..).enumerate() {
                let at = offset + i * 4;
                self.storage[at..at + 4].copy_from_slice(&word.to_le_bytes());
            }
            self.state = CardState::Programming;
            self.programming = self.programming_polls;
        } else {
            self.state = CardState::Transfer;
        }
        self.transfer = None;
    }
}

impl Registers for SimulatedCard {
    fn command(&mut self, index: u8, argument: u32, response: ResponseShape) {
        self.history.push(index);
        if self.fault == Some(Fault::Hang) {
            return;
        }
        let reply = match self.kind {
            Kind::Absent => Reply::Silent,
            _ => self.execute(index, argument),
        };
        let mut status = Status(self.status);
        if response == ResponseShape::None {
            status.set_cmdsent(true);
            self.status = status.0;
            return;
        }
        match reply {
            Reply::None | Reply::Silent => status.set_ctimeout(true),
            Reply::Rejected => {
                status.set_cmdrend(true);
                self.respcmd = 0x3F;
                self.resp = [ILLEGAL_COMMAND, 0, 0, 0];
            }
            Reply::Short(word) => {
                status.set_cmdrend(true);
                self.respcmd = index;
                self.resp = [word, 0, 0, 0];
            }
            Reply::Ocr(word) => {
                status.set_ccrcfail(true);
                self.respcmd = 0x3F;
                self.resp = [word, 0, 0, 0];
            }
            Reply::Long(value) => {
                status.set_cmdrend(true);
                self.respcmd = 0x3F;
                let words = [value, value >> 32, value >> 64, value >> 96];
                self.resp = words.map(|word| word as u32);
            }
        }
        match self.fault {
            Some(Fault::Crc) if status.cmdrend() => {
                status.set_cmdrend(false);
                status.set_ccrcfail(true);
            }
            Some(Fault::Echo) if status.cmdrend() => self.respcmd ^= 0x01,
            _ => (),
        }
        self.status = status.0;
    }

    fn status(&mut self) -> Status {
        let mut status = Status(self.status);
        let writing = matches!(
            self.transfer,
            Some(Transfer { direction: Direction::HostToCard, .. })
        ) && self.control.enable
            && self.control.direction == Direction::HostToCard;
        status.set_rxdavl(!self.rx.is_empty());
        status.set_rxfifoe(self.rx.is_empty());
        let room = self.tx.len() * 4 < self.data_length as usize;
        status.set_txfifohe(writing && !self.stalled && room);
        status.set_txact(writing);
        status.set_rxact(!self.rx.is_empty());
        status
    }

    fn clear(&mut self, flags: u32) {
        self.status &= !flags;
    }

    fn response_command(&mut self) -> u8 {
        self.respcmd
    }

    fn short_response(&mut self) -> u32 {
        self.resp[0]
    }

    fn long_response(&mut self) -> [u32; 4] {
        self.resp
    }

    fn data_timer(&mut self, _cycles: u32) {}

    fn data_length(&mut self, bytes: u32) {
        self.data_length = bytes;
        self.data_count = bytes;
        self.rx.clear();
        self.tx.clear();
    }

    fn data_control(&mut self, control: DataControl) {
        self.control = control;
        self.start_transfer();
    }

    fn data_count(&mut self) -> u32 {
        self.data_count
    }

    fn read_fifo(&mut self) -> u32 {
        let word = self.rx.pop_front().unwrap_or(0);
        self.data_count = self.data_count.saturating_sub(4);
        if self.data_count == 0 && self.transfer.is_some() {
            self.finish_transfer();
        }
        word
    }

    fn write_fifo(&mut self, word: u32) {
        if self.transfer.is_none() || !self.control.enable {
            let mut status = Status(self.status);
            status.set_txunderr(true);
            self.status = status.0;
            return;
        }
        self.tx.push(word);
        self.data_count = self.data_count.saturating_sub(4);
        if self.data_count == 0 {
            self.finish_transfer();
        }
    }

    fn bus_width(&mut self, width: BusWidth) {
        self.bus_width = width;
    }
}

/// Expires after a fixed number of unsuccessful polls
pub struct CountDown {
    polls: usize,
    remaining: usize,
}

impl CountDown {
    pub fn new(polls: usize) -> Self {
        Self { polls, remaining: polls }
    }
}

impl Default for CountDown {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl embedded_hal::timer::CountDown for CountDown {
    type Time = Duration;

    fn start<T: Into<Duration>>(&mut self, _count: T) {
        self.remaining = self.polls;
    }

    fn wait(&mut self) -> nb::Result<(), void::Void> {
        match self.remaining {
            0 => Ok(()),
            _ => {
                self.remaining -= 1;
                Err(nb::Error::WouldBlock)
            }
        }
    }
}

#[derive(Default)]
pub struct NoDelay {
    pub total_ms: u32,
}

impl embedded_hal::blocking::delay::DelayMs<u32> for NoDelay {
    fn delay_ms(&mut self, ms: u32) {
        self.total_ms += ms;
    }
}
