use bitfield::{bitfield, Bit};

use super::command::{SendInterfaceCondition, RCA};

/// Classification of a single command exchange
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Kind {
    NoResponseSent,
    Accepted,
    Rejected,
    TimedOut,
    CrcFailed,
}

/// Response words, most significant word first
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Response {
    pub kind: Kind,
    words: [u32; 4],
    len: usize,
}

impl Response {
    pub fn new(kind: Kind) -> Self {
        Self { kind, words: [0; 4], len: 0 }
    }

    pub fn short(kind: Kind, word: u32) -> Self {
        Self { kind, words: [word, 0, 0, 0], len: 1 }
    }

    pub fn long(kind: Kind, words: [u32; 4]) -> Self {
        Self { kind, words, len: 4 }
    }

    pub fn words(&self) -> &[u32] {
        &self.words[..self.len]
    }

    pub fn word(&self) -> u32 {
        self.words[0]
    }

    pub fn value(&self) -> u128 {
        self.words.iter().fold(0u128, |value, &word| value << 32 | word as u128)
    }

    pub fn success(&self) -> bool {
        matches!(self.kind, Kind::Accepted | Kind::NoResponseSent)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum CardState {
    Idle = 0,
    Ready,
    Identification,
    Standby,
    Transfer,
    SendingData,
    ReceivingData,
    Programming,
    Disabled,
    Busy, // reserved or unknown
}

impl From<u8> for CardState {
    fn from(code: u8) -> Self {
        match code {
            0 => Self::Idle,
            1 => Self::Ready,
            2 => Self::Identification,
            3 => Self::Standby,
            4 => Self::Transfer,
            5 => Self::SendingData,
            6 => Self::ReceivingData,
            7 => Self::Programming,
            8 => Self::Disabled,
            _ => Self::Busy,
        }
    }
}

impl CardState {
    pub fn is_busy(self) -> bool {
        !matches!(
            self,
            Self::Idle | Self::Ready | Self::Identification | Self::Standby | Self::Transfer
        )
    }
}

bitfield! {
    /// Card status, carried by R1 responses
    #[derive(Copy, Clone, Default, PartialEq, Eq)]
    pub struct R1(u32);
    impl Debug;
    pub out_of_range, _: 31;
    pub address_error, _: 30;
    pub block_len_error, _: 29;
    pub erase_seq_error, _: 28;
    pub erase_param, _: 27;
    pub wp_violation, _: 26;
    pub card_is_locked, _: 25;
    pub com_crc_error, _: 23;
    pub illegal_command, _: 22;
    pub card_ecc_failed, _: 21;
    pub cc_error, _: 20;
    pub error, _: 19;
    pub u8, current_state_code, _: 12, 9;
    pub ready_for_data, _: 8;
    pub app_cmd, _: 5;
}

/// Out of range, address, block length, erase, write protect, ECC, CC and generic errors
const R1_ERRORS: u32 = 0xFC38_0000;

impl R1 {
    pub fn state(self) -> CardState {
        CardState::from(self.current_state_code())
    }

    /// Error bits reported against the command this status answers
    pub fn has_error(self) -> bool {
        self.0 & R1_ERRORS != 0
    }
}

/// OCR, carried by R3 responses
#[derive(Copy, Clone, Default, Debug)]
pub struct R3(pub u32);

impl R3 {
    pub fn powered_up(self) -> bool {
        self.0.bit(31)
    }

    pub fn card_capacity_status(self) -> bool {
        self.0.bit(30)
    }
}

/// Published RCA, carried by R6 responses
#[derive(Copy, Clone, Default, Debug)]
pub struct R6(pub u32);

impl R6 {
    pub fn rca(self) -> RCA {
        (self.0 >> 16) as RCA
    }
}

/// Card interface condition, carried by R7 responses
#[derive(Copy, Clone, Default, Debug)]
pub struct R7(pub u32);

impl R7 {
    pub fn voltage_accepted(self) -> bool {
        self.0.bit(8) // only bit 8 meaningful, for now
    }

    pub fn echo_back_check_pattern(self) -> u8 {
        self.0 as u8
    }

    /// Voltage-accepted bit and check pattern must echo what was sent
    pub fn matches(self, cond: SendInterfaceCondition) -> bool {
        self.voltage_accepted() == cond.voltage_supplied
            && self.echo_back_check_pattern() == cond.check_pattern
    }
}
