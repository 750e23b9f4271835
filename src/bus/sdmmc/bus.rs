use core::time::Duration;

use embedded_hal::timer::CountDown;

use crate::bus;
use crate::config::Config;
use crate::sd::command::{AppCommand, Command, CommandFrame, CrcPolicy, ResponseShape, RCA};
use crate::sd::data::DataControl;
use crate::sd::registers::BusWidth;
use crate::sd::response::{Kind, Response, R1};

use super::registers::{Status, COMMAND_FLAGS};

pub type BUSError = bus::Error;

/// Register file of an SD/MMC host peripheral.
///
/// Clocks, pins and power are expected to be up before the first call.
pub trait Registers {
    /// Load the argument register, then start the command path state machine
    fn command(&mut self, index: u8, argument: u32, response: ResponseShape);
    fn status(&mut self) -> Status;
    /// Clear latched status flags
    fn clear(&mut self, flags: u32);
    /// Command index echoed by the last response
    fn response_command(&mut self) -> u8;
    fn short_response(&mut self) -> u32;
    /// Long response registers in hardware order, least significant word first
    fn long_response(&mut self) -> [u32; 4];
    fn data_timer(&mut self, cycles: u32);
    fn data_length(&mut self, bytes: u32);
    fn data_control(&mut self, control: DataControl);
    /// Bytes the data path has yet to transfer
    fn data_count(&mut self) -> u32;
    fn read_fifo(&mut self) -> u32;
    fn write_fifo(&mut self, word: u32);
    fn bus_width(&mut self, width: BusWidth);
}

pub struct Bus<R, C> {
    pub(crate) regs: R,
    pub(crate) countdown: C,
    pub(crate) config: Config,
}

impl<R, C> Bus<R, C>
where
    R: Registers,
    C: CountDown<Time = Duration>,
{
    pub fn new(regs: R, countdown: C) -> Self {
        Self::with_config(regs, countdown, Config::default())
    }

    pub fn with_config(regs: R, countdown: C, config: Config) -> Self {
        Self { regs, countdown, config }
    }

    pub fn registers<T>(&mut self, f: impl FnOnce(&mut R) -> T) -> T {
        f(&mut self.regs)
    }

    /// Issue one command and classify its outcome.
    ///
    /// Must be followed by exactly one [`acknowledge`](Self::acknowledge)
    /// before the next command is issued.
    pub fn send_command(&mut self, frame: CommandFrame) -> Response {
        self.regs.command(frame.index, frame.argument, frame.response);
        self.countdown.start(self.config.command_timeout);
        let status = loop {
            let status = self.regs.status();
            if !status.cmdact() && status.command_done() {
                break status;
            }
            if self.countdown.wait().is_ok() {
                warn!("CMD{} no completion within {:?}", frame.index, self.config.command_timeout);
                return Response::new(Kind::TimedOut);
            }
        };

        let ignore_crc = frame.crc == CrcPolicy::Ignore;
        let kind = if status.cmdrend() {
            match self.regs.response_command() == frame.echo() {
                true => Kind::Accepted,
                false => Kind::Rejected,
            }
        } else if status.ccrcfail() {
            match ignore_crc {
                true => Kind::Accepted,
                false => Kind::CrcFailed,
            }
        } else if status.ctimeout() {
            Kind::TimedOut
        } else {
            Kind::NoResponseSent
        };

        match (kind, frame.response) {
            (Kind::TimedOut | Kind::NoResponseSent, _) | (_, ResponseShape::None) => {
                Response::new(kind)
            }
            (_, ResponseShape::Short) => Response::short(kind, self.regs.short_response()),
            (_, ResponseShape::Long) => {
                let [w0, w1, w2, w3] = self.regs.long_response();
                Response::long(kind, [w3, w2, w1, w0])
            }
        }
    }

    pub fn acknowledge(&mut self) {
        self.regs.clear(COMMAND_FLAGS)
    }

    pub(crate) fn command(&mut self, cmd: Command) -> Response {
        let response = self.send_command(cmd.into());
        self.acknowledge();
        trace!("CMD{}({:#010x}) -> {:?}", cmd.index(), cmd.argument(), response.kind);
        response
    }

    /// Any outcome other than success is an error, so is a card status
    /// flagging the command
    pub(crate) fn expect(&mut self, cmd: Command) -> Result<Response, BUSError> {
        let response = self.command(cmd);
        if !response.success() {
            warn!("CMD{} failed: {:?}", cmd.index(), response.kind);
            return Err(BUSError::Command(cmd.index(), response.kind));
        }
        if cmd.card_status() {
            let status = R1(response.word());
            if status.has_error() {
                warn!("CMD{} refused: {:?}", cmd.index(), status);
                return Err(BUSError::Status(cmd.index(), status));
            }
        }
        Ok(response)
    }

    pub(crate) fn send_app_command(
        &mut self,
        rca: RCA,
        cmd: AppCommand,
    ) -> Result<Response, BUSError> {
        self.expect(Command::AppCommand(rca))?;
        self.expect(Command::App(cmd))
    }

    pub(crate) fn select(&mut self, rca: RCA) -> Result<(), BUSError> {
        self.expect(Command::SelectCard(rca)).map(|_| ())
    }

    pub(crate) fn deselect(&mut self) -> Result<(), BUSError> {
        self.select(0)
    }

    pub(crate) fn card_status(&mut self, rca: RCA) -> Result<R1, BUSError> {
        self.expect(Command::SendStatus(rca)).map(|r| R1(r.word()))
    }

    pub(crate) fn wait_ready_for_data(&mut self, rca: RCA) -> Result<(), BUSError> {
        for _ in 0..self.config.status_attempts {
            if self.card_status(rca)?.ready_for_data() {
                return Ok(());
            }
        }
        warn!("Card not ready for data after {} polls", self.config.status_attempts);
        Err(BUSError::Timeout)
    }
}

#[cfg(test)]
mod test {
    use crate::bus::sim::{self, Fault, SimulatedCard};
    use crate::bus::Error;
    use crate::sd::command::{AppCommand, Command, SendInterfaceCondition};
    use crate::sd::registers::csd_value;
    use crate::sd::response::{Kind, R1, R6, R7};

    use super::{Bus, Registers};

    fn bus(kind: sim::Kind) -> Bus<SimulatedCard, sim::CountDown> {
        Bus::new(SimulatedCard::new(kind), sim::CountDown::default())
    }

    #[test]
    fn test_no_response_command() {
        let mut bus = bus(sim::Kind::HighCapacity);
        let response = bus.command(Command::GoIdleState);
        assert_eq!(response.kind, Kind::NoResponseSent);
        assert!(response.words().is_empty());
    }

    #[test]
    fn test_absent_card_times_out() {
        let mut bus = bus(sim::Kind::Absent);
        assert_eq!(bus.command(Command::GoIdleState).kind, Kind::NoResponseSent);
        let response = bus.command(Command::SendIfCond(SendInterfaceCondition::standard()));
        assert_eq!(response.kind, Kind::TimedOut);
    }

    #[test]
    fn test_echo_classification() {
        let mut bus = bus(sim::Kind::HighCapacity);
        let response = bus.command(Command::SendIfCond(SendInterfaceCondition::standard()));
        assert_eq!(response.kind, Kind::Accepted);
        assert_eq!(response.words(), &[0x1AA]);

        let mut bus = self::bus(sim::Kind::Legacy);
        let response = bus.command(Command::SendIfCond(SendInterfaceCondition::standard()));
        assert_eq!(response.kind, Kind::Rejected);
    }

    #[test]
    fn test_ignored_crc_is_accepted() {
        let mut bus = bus(sim::Kind::HighCapacity);
        bus.expect(Command::AppCommand(0)).unwrap();
        let response = bus.command(Command::App(AppCommand::SDSendOpCond(true)));
        assert_eq!(response.kind, Kind::Accepted);
        assert_eq!(response.words().len(), 1);
    }

    #[test]
    fn test_long_response_order() {
        let mut bus = bus(sim::Kind::HighCapacity);
        bus.command(Command::GoIdleState);
        bus.command(Command::SendIfCond(SendInterfaceCondition::standard()));
        bus.send_app_command(0, AppCommand::SDSendOpCond(true)).unwrap();
        bus.expect(Command::AllSendCID).unwrap();
        let rca = R6(bus.expect(Command::SendRelativeAddr).unwrap().word()).rca();
        let response = bus.expect(Command::SendCSD(rca)).unwrap();
        let csd = bus.registers(|card| card.csd());
        assert_eq!(response.words()[0], (csd >> 96) as u32);
        assert_eq!(response.words()[3], csd as u32);
        assert_eq!(response.value(), csd);
        let words = response.words();
        assert_eq!(csd_value([words[0], words[1], words[2], words[3]]), csd);
    }

    #[test]
    fn test_acknowledge_clears_flags() {
        let mut bus = bus(sim::Kind::HighCapacity);
        let response = bus.send_command(Command::GoIdleState.into());
        assert_eq!(response.kind, Kind::NoResponseSent);
        assert!(bus.regs.status().cmdsent());
        bus.acknowledge();
        assert!(!bus.regs.status().command_done());
    }

    #[test]
    fn test_rejected_command_is_error() {
        let mut bus = bus(sim::Kind::HighCapacity);
        let result = bus.expect(Command::SendCSD(0x1234));
        assert_eq!(result, Err(super::BUSError::Command(9, Kind::TimedOut)));
    }

    #[test]
    fn test_check_patterns() {
        for pattern in [0x00u8, 0x01, 0x5A, 0xAA, 0xFF] {
            let standard = SendInterfaceCondition::standard();
            let cond = SendInterfaceCondition { check_pattern: pattern, ..standard };

            let mut bus = bus(sim::Kind::HighCapacity);
            let response = bus.command(Command::SendIfCond(cond));
            assert_eq!(response.kind, Kind::Accepted);
            assert!(R7(response.word()).matches(cond), "pattern {:#04x}", pattern);

            let mut bus = self::bus(sim::Kind::BadEcho);
            let response = bus.command(Command::SendIfCond(cond));
            assert_eq!(response.kind, Kind::Accepted);
            assert!(!R7(response.word()).matches(cond), "pattern {:#04x}", pattern);
        }
    }

    #[test]
    fn test_crc_failure() {
        let mut bus = bus(sim::Kind::HighCapacity);
        bus.registers(|card| card.fault(Some(Fault::Crc)));
        let response = bus.command(Command::SendIfCond(SendInterfaceCondition::standard()));
        assert_eq!(response.kind, Kind::CrcFailed);
        assert_eq!(bus.expect(Command::AppCommand(0)), Err(Error::Command(55, Kind::CrcFailed)));

        // R3 carries no CRC, still accepted
        let response = bus.command(Command::App(AppCommand::SDSendOpCond(true)));
        assert_eq!(response.kind, Kind::Accepted);

        bus.registers(|card| card.fault(None));
        let response = bus.command(Command::SendIfCond(SendInterfaceCondition::standard()));
        assert_eq!(response.kind, Kind::Accepted);
    }

    #[test]
    fn test_command_never_completes() {
        let mut bus = bus(sim::Kind::HighCapacity);
        bus.registers(|card| card.fault(Some(Fault::Hang)));
        let response = bus.command(Command::SendIfCond(SendInterfaceCondition::standard()));
        assert_eq!(response.kind, Kind::TimedOut);
        assert!(response.words().is_empty());
        assert_eq!(bus.command(Command::GoIdleState).kind, Kind::TimedOut);
        assert_eq!(bus.expect(Command::GoIdleState), Err(Error::Command(0, Kind::TimedOut)));
    }

    #[test]
    fn test_wrong_echo_is_rejected() {
        let mut bus = bus(sim::Kind::HighCapacity);
        bus.registers(|card| card.fault(Some(Fault::Echo)));
        assert_eq!(bus.command(Command::AppCommand(0)).kind, Kind::Rejected);
        let response = bus.command(Command::SendIfCond(SendInterfaceCondition::standard()));
        assert_eq!(response.kind, Kind::Rejected);
        assert_eq!(bus.command(Command::AllSendCID).kind, Kind::TimedOut); // not ready yet
    }

    #[test]
    fn test_card_status_error() {
        let mut bus = bus(sim::Kind::HighCapacity);
        bus.command(Command::GoIdleState);
        bus.command(Command::SendIfCond(SendInterfaceCondition::standard()));
        bus.send_app_command(0, AppCommand::SDSendOpCond(true)).unwrap();
        bus.expect(Command::AllSendCID).unwrap();
        let rca = R6(bus.expect(Command::SendRelativeAddr).unwrap().word()).rca();
        bus.select(rca).unwrap();
        match bus.expect(Command::ReadSingleBlock(1_000_000)) {
            Err(Error::Status(17, status)) => assert!(status.out_of_range()),
            other => panic!("unexpected {:?}", other),
        }
        let status: R1 = bus.card_status(rca).unwrap();
        assert!(!status.has_error());
    }
}
