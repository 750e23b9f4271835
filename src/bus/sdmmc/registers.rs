use bitfield::bitfield;

use crate::sd::data;

bitfield! {
    /// Peripheral status register, STM32 SDMMC layout
    #[derive(Copy, Clone, Default, PartialEq, Eq)]
    pub struct Status(u32);
    impl Debug;
    pub ccrcfail, set_ccrcfail: 0;
    pub dcrcfail, set_dcrcfail: 1;
    pub ctimeout, set_ctimeout: 2;
    pub dtimeout, set_dtimeout: 3;
    pub txunderr, set_txunderr: 4;
    pub rxoverr, set_rxoverr: 5;
    pub cmdrend, set_cmdrend: 6;
    pub cmdsent, set_cmdsent: 7;
    pub dataend, set_dataend: 8;
    pub dbckend, set_dbckend: 10;
    pub cmdact, set_cmdact: 11;
    pub txact, set_txact: 12;
    pub rxact, set_rxact: 13;
    pub txfifohe, set_txfifohe: 14;
    pub rxfifohf, set_rxfifohf: 15;
    pub txfifof, set_txfifof: 16;
    pub rxfifof, set_rxfifof: 17;
    pub txfifoe, set_txfifoe: 18;
    pub rxfifoe, set_rxfifoe: 19;
    pub txdavl, set_txdavl: 20;
    pub rxdavl, set_rxdavl: 21;
}

/// Latched command path flags: CCRCFAIL, CTIMEOUT, CMDREND, CMDSENT
pub const COMMAND_FLAGS: u32 = 0x0000_00C5;
/// Latched data path flags: DCRCFAIL, DTIMEOUT, TXUNDERR, RXOVERR, DATAEND, DBCKEND
pub const DATA_FLAGS: u32 = 0x0000_053A;

impl Status {
    pub fn command_done(&self) -> bool {
        self.cmdrend() || self.cmdsent() || self.ctimeout() || self.ccrcfail()
    }

    pub fn data_error(&self) -> Option<data::Error> {
        if self.dcrcfail() {
            return Some(data::Error::CRC);
        }
        if self.dtimeout() {
            return Some(data::Error::Timeout);
        }
        if self.rxoverr() {
            return Some(data::Error::RxOverrun);
        }
        if self.txunderr() {
            return Some(data::Error::TxUnderrun);
        }
        None
    }
}
