//! Bluetooth device addresses

use std::fmt;
use std::str::FromStr;

/// A Bluetooth device address
///
/// The address is stored in the order it is transferred by the controller, least significant
/// octet first. The display format is the conventional one, most significant octet first.
///
/// ```
/// use btled::BluetoothDeviceAddress;
///
/// let address: BluetoothDeviceAddress = "00:11:22:33:44:55".parse().unwrap();
///
/// assert_eq!([0x55, 0x44, 0x33, 0x22, 0x11, 0x00], address.0);
/// assert_eq!("00:11:22:33:44:55", address.to_string());
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BluetoothDeviceAddress(pub [u8; 6]);

impl BluetoothDeviceAddress {
    /// Length of the textual form used by the daemon's commands
    pub const TEXT_LEN: usize = 17;

    /// Create an address from the little endian bytes of a response or event
    ///
    /// `None` is returned if `raw` is shorter than six bytes.
    pub fn from_le_slice(raw: &[u8]) -> Option<Self> {
        raw.get(..6).map(|octets| {
            let mut address = [0u8; 6];

            address.copy_from_slice(octets);

            BluetoothDeviceAddress(address)
        })
    }

    /// Get the wire form of an address within a command
    ///
    /// Commands carry the address as text with the octets in reversed order, the least
    /// significant octet first.
    pub fn to_command_text(&self) -> [u8; Self::TEXT_LEN] {
        let mut text = [0u8; Self::TEXT_LEN];

        let formatted = self
            .0
            .iter()
            .map(|octet| format!("{:02X}", octet))
            .collect::<Vec<_>>()
            .join(":");

        text.copy_from_slice(formatted.as_bytes());

        text
    }
}

impl fmt::Display for BluetoothDeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let a = &self.0;

        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            a[5], a[4], a[3], a[2], a[1], a[0]
        )
    }
}

impl fmt::Debug for BluetoothDeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// The textual address was not six hexadecimal octets separated by colons
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddressFormatError(pub String);

impl fmt::Display for AddressFormatError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "invalid bluetooth device address '{}'", self.0)
    }
}

impl std::error::Error for AddressFormatError {}

impl FromStr for BluetoothDeviceAddress {
    type Err = AddressFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || AddressFormatError(s.to_string());

        let mut address = [0u8; 6];

        let mut octets = s.split(':');

        // written most significant octet first
        for byte in address.iter_mut().rev() {
            let octet = octets.next().ok_or_else(err)?;

            if octet.len() != 2 {
                return Err(err());
            }

            *byte = u8::from_str_radix(octet, 16).map_err(|_| err())?;
        }

        if octets.next().is_some() {
            return Err(err());
        }

        Ok(BluetoothDeviceAddress(address))
    }
}

/// The type of a LE device address
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddressType {
    Public,
    Random,
}

impl AddressType {
    /// Get the value of the address type in a connect command
    pub fn to_command_val(&self) -> u8 {
        match self {
            AddressType::Public => 1,
            AddressType::Random => 2,
        }
    }
}

impl FromStr for AddressType {
    type Err = AddressFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(AddressType::Public),
            "random" => Ok(AddressType::Random),
            _ => Err(AddressFormatError(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display() {
        let address: BluetoothDeviceAddress = "C0:FF:EE:01:02:03".parse().unwrap();

        assert_eq!([0x03, 0x02, 0x01, 0xEE, 0xFF, 0xC0], address.0);

        assert_eq!("C0:FF:EE:01:02:03", address.to_string());

        assert_eq!(b"03:02:01:EE:FF:C0", &address.to_command_text());
    }

    #[test]
    fn invalid_addresses() {
        for bad in ["", "00:11:22:33:44", "00:11:22:33:44:55:66", "0:11:22:33:44:555", "zz:11:22:33:44:55"] {
            assert!(bad.parse::<BluetoothDeviceAddress>().is_err(), "{bad}");
        }
    }

    #[test]
    fn address_from_le_bytes() {
        let address = BluetoothDeviceAddress::from_le_slice(&[1, 2, 3, 4, 5, 6, 7]).unwrap();

        assert_eq!("06:05:04:03:02:01", address.to_string());

        assert_eq!(None, BluetoothDeviceAddress::from_le_slice(&[1, 2, 3]));
    }
}
