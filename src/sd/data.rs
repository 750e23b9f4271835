#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Direction {
    HostToCard,
    CardToHost,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Error {
    CRC,
    Timeout, // data timer expired in hardware
    RxOverrun,
    TxUnderrun,
    Length, // transfer ended early or ran long
}

/// Data path programming for one transfer
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DataControl {
    pub enable: bool,
    pub direction: Direction,
    pub block_size_shift: u8,
}

impl DataControl {
    pub fn block(direction: Direction) -> Self {
        Self { enable: true, direction, block_size_shift: 9 }
    }

    pub fn disabled() -> Self {
        Self { enable: false, direction: Direction::CardToHost, block_size_shift: 9 }
    }
}
