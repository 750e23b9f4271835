use super::registers::BusWidth;

/// Argument of CMD8; the card echoes the low 12 bits back when it accepts them.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct SendInterfaceCondition {
    pub pcie_1_2v_suppport: bool, // PCIe 1.2V
    pub pcie_availability: bool,
    pub voltage_supplied: bool, // 2.7-3.6V
    pub check_pattern: u8,
}

impl SendInterfaceCondition {
    pub fn standard() -> Self {
        Self { voltage_supplied: true, check_pattern: 0xAA, ..Default::default() }
    }
}

impl From<SendInterfaceCondition> for u32 {
    fn from(cond: SendInterfaceCondition) -> u32 {
        (cond.pcie_1_2v_suppport as u32) << 13
            | (cond.pcie_availability as u32) << 12
            | (cond.voltage_supplied as u32) << 8
            | cond.check_pattern as u32
    }
}

pub type RCA = u16;
pub type Address = u32;

/// OCR voltage window offered with ACMD41, 3.2-3.4V
pub const OCR_VOLTAGE_WINDOW: u32 = 0x0030_0000;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ResponseShape {
    None,
    Short,
    Long,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CrcPolicy {
    Require,
    Ignore,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum AppCommand {
    SetBusWidth(BusWidth),
    SDSendOpCond(bool), // host-capability-support
}

impl AppCommand {
    pub fn index(self) -> u8 {
        match self {
            Self::SetBusWidth(_) => 6,
            Self::SDSendOpCond(_) => 41,
        }
    }

    pub fn argument(self) -> u32 {
        match self {
            Self::SetBusWidth(width) => width as u32,
            Self::SDSendOpCond(hcs) => 1 << 31 | (hcs as u32) << 30 | OCR_VOLTAGE_WINDOW,
        }
    }

    pub fn crc(self) -> CrcPolicy {
        match self {
            Self::SDSendOpCond(_) => CrcPolicy::Ignore, // R3 carries no CRC
            _ => CrcPolicy::Require,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Command {
    GoIdleState,
    AllSendCID,
    SendRelativeAddr,
    SelectCard(RCA), // RCA 0 deselects every card
    SendIfCond(SendInterfaceCondition),
    SendCSD(RCA),
    SendStatus(RCA),
    GoInactiveState(RCA),
    SetBlockLen(u32),
    ReadSingleBlock(Address),
    WriteBlock(Address),
    EraseWriteBlockStart(Address),
    EraseWriteBlockEnd(Address),
    Erase,
    AppCommand(RCA),
    App(AppCommand),
}

impl Command {
    pub fn index(self) -> u8 {
        match self {
            Self::GoIdleState => 0,
            Self::AllSendCID => 2,
            Self::SendRelativeAddr => 3,
            Self::SelectCard(_) => 7,
            Self::SendIfCond(_) => 8,
            Self::SendCSD(_) => 9,
            Self::SendStatus(_) => 13,
            Self::GoInactiveState(_) => 15,
            Self::SetBlockLen(_) => 16,
            Self::ReadSingleBlock(_) => 17,
            Self::WriteBlock(_) => 24,
            Self::EraseWriteBlockStart(_) => 32,
            Self::EraseWriteBlockEnd(_) => 33,
            Self::Erase => 38,
            Self::AppCommand(_) => 55,
            Self::App(command) => command.index(),
        }
    }

    pub fn argument(self) -> u32 {
        match self {
            Self::GoIdleState | Self::AllSendCID | Self::SendRelativeAddr | Self::Erase => 0,
            Self::SendIfCond(cond) => cond.into(),
            Self::SelectCard(rca)
            | Self::SendCSD(rca)
            | Self::SendStatus(rca)
            | Self::GoInactiveState(rca)
            | Self::AppCommand(rca) => (rca as u32) << 16,
            Self::SetBlockLen(length) => length,
            Self::ReadSingleBlock(address)
            | Self::WriteBlock(address)
            | Self::EraseWriteBlockStart(address)
            | Self::EraseWriteBlockEnd(address) => address,
            Self::App(command) => command.argument(),
        }
    }

    pub fn response(self) -> ResponseShape {
        match self {
            Self::GoIdleState | Self::GoInactiveState(_) | Self::SelectCard(0) => {
                ResponseShape::None
            }
            Self::AllSendCID | Self::SendCSD(_) => ResponseShape::Long,
            _ => ResponseShape::Short,
        }
    }

    pub fn crc(self) -> CrcPolicy {
        match self {
            Self::App(command) => command.crc(),
            _ => CrcPolicy::Require,
        }
    }

    /// Response is an R1 card status
    pub fn card_status(self) -> bool {
        match self {
            Self::SendIfCond(_) | Self::SendRelativeAddr => false,
            Self::App(AppCommand::SDSendOpCond(_)) => false,
            _ => self.response() == ResponseShape::Short,
        }
    }
}

/// A command as handed to the command path state machine
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CommandFrame {
    pub index: u8,
    pub argument: u32,
    pub response: ResponseShape,
    pub crc: CrcPolicy,
}

impl CommandFrame {
    /// Value expected in the response command-echo field.
    pub fn echo(&self) -> u8 {
        match (self.response, self.crc) {
            (ResponseShape::Long, _) | (_, CrcPolicy::Ignore) => 0x3F,
            _ => self.index,
        }
    }
}

impl From<Command> for CommandFrame {
    fn from(cmd: Command) -> Self {
        Self {
            index: cmd.index(),
            argument: cmd.argument(),
            response: cmd.response(),
            crc: cmd.crc(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::{AppCommand, Command, CommandFrame, CrcPolicy, ResponseShape};
    use super::{BusWidth, SendInterfaceCondition};

    #[test]
    fn test_command_argument() {
        let cmd = Command::SendIfCond(SendInterfaceCondition::standard());
        assert_eq!(cmd.argument(), 0x1AA);
        assert_eq!(cmd.index(), 8);

        let cmd = Command::App(AppCommand::SDSendOpCond(true));
        assert_eq!(cmd.argument(), 0xC030_0000);
        let cmd = Command::App(AppCommand::SDSendOpCond(false));
        assert_eq!(cmd.argument(), 0x8030_0000);

        assert_eq!(Command::SendCSD(0xB368).argument(), 0xB368_0000);
        assert_eq!(Command::App(AppCommand::SetBusWidth(BusWidth::Four)).argument(), 0b10);
        assert_eq!(Command::SetBlockLen(512).argument(), 512);
    }

    #[test]
    fn test_command_frame() {
        let frame = CommandFrame::from(Command::SelectCard(0));
        assert_eq!(frame.response, ResponseShape::None);
        let frame = CommandFrame::from(Command::SelectCard(1));
        assert_eq!(frame.response, ResponseShape::Short);
        assert_eq!(frame.echo(), 7);

        let frame = CommandFrame::from(Command::SendCSD(1));
        assert_eq!(frame.response, ResponseShape::Long);
        assert_eq!(frame.echo(), 0x3F);

        let frame = CommandFrame::from(Command::App(AppCommand::SDSendOpCond(true)));
        assert_eq!(frame.index, 41);
        assert_eq!(frame.crc, CrcPolicy::Ignore);
        assert_eq!(frame.echo(), 0x3F);
    }

    #[test]
    fn test_card_status_responses() {
        assert!(Command::ReadSingleBlock(0).card_status());
        assert!(Command::SetBlockLen(512).card_status());
        assert!(Command::SelectCard(1).card_status());
        assert!(Command::App(AppCommand::SetBusWidth(BusWidth::Four)).card_status());
        assert!(!Command::SelectCard(0).card_status());
        assert!(!Command::SendIfCond(SendInterfaceCondition::standard()).card_status());
        assert!(!Command::SendRelativeAddr.card_status());
        assert!(!Command::App(AppCommand::SDSendOpCond(true)).card_status());
        assert!(!Command::SendCSD(1).card_status());
    }
}
