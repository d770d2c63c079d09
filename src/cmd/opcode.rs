//! Command and event opcodes

/// Commands understood by the daemon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    GetDeviceInfo,
    Reset,
    Power,
    SetLocalName,
    SetConnectionParameters,
    Scan,
    ReadControllerInfo,
    Connect,
    WriteCommand,
    WriteRequest,
    Read,
    Subscribe,
    Unsubscribe,
}

impl TryFrom<u8> for Command {
    type Error = ();

    fn try_from(val: u8) -> Result<Self, ()> {
        match val {
            0 => Ok(Command::GetDeviceInfo),
            1 => Ok(Command::Reset),
            2 => Ok(Command::Power),
            3 => Ok(Command::SetLocalName),
            4 => Ok(Command::SetConnectionParameters),
            5 => Ok(Command::Scan),
            6 => Ok(Command::ReadControllerInfo),
            7 => Ok(Command::Connect),
            8 => Ok(Command::WriteCommand),
            9 => Ok(Command::WriteRequest),
            10 => Ok(Command::Read),
            11 => Ok(Command::Subscribe),
            12 => Ok(Command::Unsubscribe),
            _ => Err(()),
        }
    }
}

impl From<Command> for u8 {
    fn from(command: Command) -> u8 {
        match command {
            Command::GetDeviceInfo => 0,
            Command::Reset => 1,
            Command::Power => 2,
            Command::SetLocalName => 3,
            Command::SetConnectionParameters => 4,
            Command::Scan => 5,
            Command::ReadControllerInfo => 6,
            Command::Connect => 7,
            Command::WriteCommand => 8,
            Command::WriteRequest => 9,
            Command::Read => 10,
            Command::Subscribe => 11,
            Command::Unsubscribe => 12,
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Command::GetDeviceInfo => write!(f, "Get Device Info"),
            Command::Reset => write!(f, "Reset"),
            Command::Power => write!(f, "Power"),
            Command::SetLocalName => write!(f, "Set Local Name"),
            Command::SetConnectionParameters => write!(f, "Set Connection Parameters"),
            Command::Scan => write!(f, "Scan"),
            Command::ReadControllerInfo => write!(f, "Read Controller Info"),
            Command::Connect => write!(f, "Connect"),
            Command::WriteCommand => write!(f, "Write Command"),
            Command::WriteRequest => write!(f, "Write Request"),
            Command::Read => write!(f, "Read"),
            Command::Subscribe => write!(f, "Subscribe"),
            Command::Unsubscribe => write!(f, "Unsubscribe"),
        }
    }
}

/// Events sent by the daemon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventCode {
    Connected,
    Disconnected,
    ScanStatus,
    ScanResult,
    NewConnectionParameters,
    Notification,
    Indication,
    DiscoverPrimary,
    DiscoverCharacteristic,
    DiscoverDescriptor,
}

impl TryFrom<u8> for EventCode {
    type Error = ();

    fn try_from(val: u8) -> Result<Self, ()> {
        match val {
            0 => Ok(EventCode::Connected),
            1 => Ok(EventCode::Disconnected),
            2 => Ok(EventCode::ScanStatus),
            3 => Ok(EventCode::ScanResult),
            4 => Ok(EventCode::NewConnectionParameters),
            5 => Ok(EventCode::Notification),
            6 => Ok(EventCode::Indication),
            7 => Ok(EventCode::DiscoverPrimary),
            8 => Ok(EventCode::DiscoverCharacteristic),
            9 => Ok(EventCode::DiscoverDescriptor),
            _ => Err(()),
        }
    }
}

impl From<EventCode> for u8 {
    fn from(code: EventCode) -> u8 {
        match code {
            EventCode::Connected => 0,
            EventCode::Disconnected => 1,
            EventCode::ScanStatus => 2,
            EventCode::ScanResult => 3,
            EventCode::NewConnectionParameters => 4,
            EventCode::Notification => 5,
            EventCode::Indication => 6,
            EventCode::DiscoverPrimary => 7,
            EventCode::DiscoverCharacteristic => 8,
            EventCode::DiscoverDescriptor => 9,
        }
    }
}

impl std::fmt::Display for EventCode {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            EventCode::Connected => write!(f, "Connected"),
            EventCode::Disconnected => write!(f, "Disconnected"),
            EventCode::ScanStatus => write!(f, "Scan Status"),
            EventCode::ScanResult => write!(f, "Scan Result"),
            EventCode::NewConnectionParameters => write!(f, "New Connection Parameters"),
            EventCode::Notification => write!(f, "Notification"),
            EventCode::Indication => write!(f, "Indication"),
            EventCode::DiscoverPrimary => write!(f, "Discover Primary"),
            EventCode::DiscoverCharacteristic => write!(f, "Discover Characteristic"),
            EventCode::DiscoverDescriptor => write!(f, "Discover Descriptor"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_values() {
        for raw in 0..=12u8 {
            assert_eq!(raw, u8::from(Command::try_from(raw).unwrap()));
        }

        assert!(Command::try_from(13).is_err());

        for raw in 0..=9u8 {
            assert_eq!(raw, u8::from(EventCode::try_from(raw).unwrap()));
        }

        assert!(EventCode::try_from(10).is_err());
    }
}
