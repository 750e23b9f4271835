pub mod bus;
pub mod read;
pub mod registers;
#[cfg(feature = "stm32l4x6")]
pub mod stm32l4;
pub mod write;

use core::time::Duration;

use embedded_hal::timer::CountDown;

use crate::{
    bus as host,
    delay::Delay,
    sd::{
        command::{AppCommand, Command, SendInterfaceCondition, RCA},
        registers::{decode_blocks, BusWidth, CID},
        response::{Kind, R1, R3, R6, R7},
        Card, CardClass, BLOCK_SIZE,
    },
};
pub use bus::{BUSError, Bus, Registers};

impl<R, C> Bus<R, C>
where
    R: Registers,
    C: CountDown<Time = Duration>,
{
    /// Peripheral clock, pins and power must already be enabled
    pub fn init(&mut self, delay: &mut impl Delay) -> Result<Card, BUSError> {
        if !self.command(Command::GoIdleState).success() {
            return Err(BUSError::NoResponse);
        }

        let cond = SendInterfaceCondition::standard();
        let r = self.command(Command::SendIfCond(cond));
        let mut class = match r.kind {
            Kind::Rejected => CardClass::SDSC, // SD v1.x
            Kind::Accepted => match R7(r.word()).matches(cond) {
                true => CardClass::SDHC, // until OCR says otherwise
                false => return Err(BUSError::VoltageMismatch),
            },
            _ => return Err(BUSError::NoResponse),
        };
        debug!("Interface condition {:?}, tentative class {:?}", r.kind, class);

        let ocr = self.wait_powered_up(class.high_capacity(), delay)?;
        if class == CardClass::SDHC && !ocr.card_capacity_status() {
            class = CardClass::SDSC;
        }

        let cid = CID(self.expect(Command::AllSendCID)?.value());
        let rca = R6(self.expect(Command::SendRelativeAddr)?.word()).rca();
        debug!("Card {:?} published RCA {:#06x}", class, rca);

        let csd = self.expect(Command::SendCSD(rca))?;
        let words = [csd.words()[0], csd.words()[1], csd.words()[2], csd.words()[3]];
        let num_blocks = decode_blocks(class, words).ok_or(BUSError::Descriptor)?;
        debug!("Card capacity {} blocks", num_blocks);

        // CMD16 and ACMD6 are only legal in transfer state
        let wide_bus = self.config.wide_bus;
        if class == CardClass::SDSC || wide_bus {
            self.select(rca)?;
            let result = self.configure(class, rca, wide_bus);
            let deselected = self.deselect();
            result.and(deselected)?;
        }

        Ok(Card { class, rca, num_blocks, cid, ..Default::default() })
    }

    fn wait_powered_up(&mut self, hcs: bool, delay: &mut impl Delay) -> Result<R3, BUSError> {
        for _ in 0..self.config.op_cond_attempts {
            let ocr = R3(self.send_app_command(0, AppCommand::SDSendOpCond(hcs))?.word());
            if ocr.powered_up() {
                return Ok(ocr);
            }
            delay.delay_ms(self.config.op_cond_interval_ms);
        }
        warn!("Card still powering up after {} attempts", self.config.op_cond_attempts);
        Err(BUSError::Timeout)
    }

    fn configure(&mut self, class: CardClass, rca: RCA, wide_bus: bool) -> Result<(), BUSError> {
        if class == CardClass::SDSC {
            self.expect(Command::SetBlockLen(BLOCK_SIZE as u32))?;
        }
        if wide_bus {
            self.send_app_command(rca, AppCommand::SetBusWidth(BusWidth::Four))?;
            self.regs.bus_width(BusWidth::Four);
        }
        Ok(())
    }
}

impl<R, C> host::Bus for Bus<R, C>
where
    R: Registers,
    C: CountDown<Time = Duration>,
{
    fn init<D: Delay>(&mut self, delay: &mut D) -> Result<Card, BUSError> {
        Bus::init(self, delay)
    }

    fn before(&mut self, card: &Card) -> Result<(), BUSError> {
        self.select(card.rca)
    }

    fn after(&mut self, _card: &Card) -> Result<(), BUSError> {
        self.deselect()
    }

    fn status(&mut self, rca: RCA) -> Result<R1, BUSError> {
        self.card_status(rca)
    }

    fn halt(&mut self, card: &Card) -> Result<(), BUSError> {
        self.expect(Command::GoInactiveState(card.rca)).map(|_| ())
    }
}
