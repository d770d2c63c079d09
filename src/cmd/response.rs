//! Decoding of command responses
//!
//! A response is `adapter | opcode | status | length | data`. On success the data is the
//! result of the command, on failure it is the reason text given by the daemon (which may be
//! empty).

use super::Command;
use crate::address::BluetoothDeviceAddress;
use crate::error::{DaemonStatus, Error, Result};

const HEADER_LEN: usize = 4;

/// Get the opcode of a queued response
pub(crate) fn opcode_of(content: &[u8]) -> Option<u8> {
    content.get(1).copied()
}

/// A response that has not yet been checked against its command
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct RawResponse<'a> {
    pub adapter: u8,
    pub opcode: u8,
    pub status: u8,
    pub data: &'a [u8],
}

impl<'a> RawResponse<'a> {
    pub fn parse(content: &'a [u8]) -> Option<Self> {
        if content.len() < HEADER_LEN {
            return None;
        }

        let declared = content[3] as usize;

        let available = &content[HEADER_LEN..];

        let data = &available[..declared.min(available.len())];

        Some(RawResponse {
            adapter: content[0],
            opcode: content[1],
            status: content[2],
            data,
        })
    }

    /// Convert into the data of a successful response
    pub fn check(self, command: Command) -> Result<&'a [u8]> {
        match DaemonStatus::try_from_raw(self.status) {
            Ok(_) => Ok(self.data),
            Err(status) => {
                let reason = match decode_text(self.data) {
                    text if text.is_empty() => status.to_string(),
                    text => text,
                };

                Err(Error::Daemon { command, status, reason })
            }
        }
    }
}

/// Decode text that may be terminated by a NUL
pub(crate) fn decode_text(raw: &[u8]) -> String {
    let end = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());

    String::from_utf8_lossy(&raw[..end]).into_owned()
}

/// Controller setting flags within [`ControllerInfo`]
pub mod settings {
    pub const POWERED: u32 = 1 << 0;
    pub const CONNECTABLE: u32 = 1 << 1;
    pub const FAST_CONNECTABLE: u32 = 1 << 2;
    pub const DISCOVERABLE: u32 = 1 << 3;
    pub const BONDABLE: u32 = 1 << 4;
    pub const LINK_SECURITY: u32 = 1 << 5;
    pub const SECURE_SIMPLE_PAIRING: u32 = 1 << 6;
    pub const BR_EDR: u32 = 1 << 7;
    pub const HIGH_SPEED: u32 = 1 << 8;
    pub const LE: u32 = 1 << 9;
    pub const ADVERTISING: u32 = 1 << 10;
    pub const SECURE_CONNECTIONS: u32 = 1 << 11;
    pub const DEBUG_KEYS: u32 = 1 << 12;
    pub const PRIVACY: u32 = 1 << 13;
}

/// Information on the controller used by the daemon
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerInfo {
    pub address: BluetoothDeviceAddress,
    pub version: u8,
    /// Company identifier of the manufacturer
    pub manufacturer: u16,
    pub supported_settings: u32,
    pub current_settings: u32,
    pub class_of_device: [u8; 3],
    pub name: String,
}

impl ControllerInfo {
    const MIN_LEN: usize = 20;

    /// Create a `ControllerInfo` from the data of a read controller info response
    pub fn from_raw(raw: &[u8]) -> Result<Self> {
        if raw.len() < Self::MIN_LEN {
            return Err(Error::MalformedResponse {
                command: Command::ReadControllerInfo,
                reason: "controller info is too short",
            });
        }

        let address = BluetoothDeviceAddress::from_le_slice(&raw[0..6]).ok_or(Error::MalformedResponse {
            command: Command::ReadControllerInfo,
            reason: "missing address",
        })?;

        Ok(ControllerInfo {
            address,
            version: raw[6],
            manufacturer: <u16>::from_le_bytes([raw[7], raw[8]]),
            supported_settings: <u32>::from_le_bytes([raw[9], raw[10], raw[11], raw[12]]),
            current_settings: <u32>::from_le_bytes([raw[13], raw[14], raw[15], raw[16]]),
            class_of_device: [raw[17], raw[18], raw[19]],
            name: decode_text(&raw[Self::MIN_LEN..]),
        })
    }

    pub fn is_powered(&self) -> bool {
        self.current_settings & settings::POWERED != 0
    }

    pub fn supports_le(&self) -> bool {
        self.supported_settings & settings::LE != 0
    }

    /// Get the class of device as an integer
    pub fn class_of_device_val(&self) -> u32 {
        <u32>::from_le_bytes([self.class_of_device[0], self.class_of_device[1], self.class_of_device[2], 0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn daemon_reason() {
        let content = [0, 5, 5, 4, b'b', b'u', b's', b'y', 0, 0];

        let raw = RawResponse::parse(&content).unwrap();

        assert_eq!(5, raw.opcode);

        match raw.check(Command::Scan) {
            Err(Error::Daemon { command, status, reason }) => {
                assert_eq!(Command::Scan, command);
                assert_eq!(DaemonStatus::Busy, status);
                assert_eq!("busy", reason);
            }
            other => panic!("unexpected {:?}", other),
        }

        let content = [0, 2, 9, 0];

        match RawResponse::parse(&content).unwrap().check(Command::Power) {
            Err(Error::Daemon { reason, .. }) => assert_eq!("not implemented", reason),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn declared_length_is_clipped() {
        let content = [0, 10, 0, 200, 1, 2, 3];

        assert_eq!(Ok(&[1u8, 2, 3][..]), RawResponse::parse(&content).unwrap().check(Command::Read).map_err(|_| ()));

        assert!(RawResponse::parse(&[0, 10, 0]).is_none());
    }

    #[test]
    fn controller_info() {
        let mut raw = vec![0x55, 0x44, 0x33, 0x22, 0x11, 0x00, 9, 0x02, 0x00];

        raw.extend_from_slice(&(settings::POWERED | settings::LE).to_le_bytes());
        raw.extend_from_slice(&settings::POWERED.to_le_bytes());
        raw.extend_from_slice(&[0x0C, 0x01, 0x1A]);
        raw.extend_from_slice(b"hci0\0garbage");

        let info = ControllerInfo::from_raw(&raw).unwrap();

        assert_eq!("00:11:22:33:44:55", info.address.to_string());

        assert_eq!(9, info.version);

        assert_eq!(2, info.manufacturer);

        assert!(info.is_powered());

        assert!(info.supports_le());

        assert_eq!(0x1A010C, info.class_of_device_val());

        assert_eq!("hci0", info.name);

        assert!(ControllerInfo::from_raw(&raw[..19]).is_err());
    }
}
