//! Encoding of command requests
//!
//! A request is the adapter index and the command opcode followed by the command's parameters.
//! Multi-byte parameters are big endian.

use super::Command;
use crate::address::{AddressType, BluetoothDeviceAddress};
use crate::error::{Error, Result};
use crate::gatt::SubscriptionKind;

/// Maximum length of a local name
pub const MAX_LOCAL_NAME_LEN: usize = 30;

/// Security level requested when connecting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SecurityLevel {
    #[default]
    Low,
    Medium,
    High,
}

impl SecurityLevel {
    pub fn to_command_val(&self) -> u8 {
        match self {
            SecurityLevel::Low => 1,
            SecurityLevel::Medium => 2,
            SecurityLevel::High => 3,
        }
    }
}

impl std::str::FromStr for SecurityLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "low" => Ok(SecurityLevel::Low),
            "medium" => Ok(SecurityLevel::Medium),
            "high" => Ok(SecurityLevel::High),
            _ => Err(Error::InvalidParameter(format!("unknown security level '{}'", s))),
        }
    }
}

/// Connection parameters of a LE connection
///
/// Intervals are in units of 1.25ms and the supervision timeout is in units of 10ms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionParameters {
    pub min_interval: u16,
    pub max_interval: u16,
    pub latency: u16,
    pub supervision_timeout: u16,
}

/// A request under construction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub command: Command,
    payload: Vec<u8>,
}

impl Request {
    pub fn new(adapter: u8, command: Command) -> Self {
        Request {
            command,
            payload: vec![adapter, command.into()],
        }
    }

    /// Create a request with already encoded parameters
    pub fn with_parameters(adapter: u8, command: Command, parameters: &[u8]) -> Self {
        Request::new(adapter, command).bytes(parameters)
    }

    fn u8(mut self, val: u8) -> Self {
        self.payload.push(val);
        self
    }

    fn u16(mut self, val: u16) -> Self {
        self.payload.extend_from_slice(&val.to_be_bytes());
        self
    }

    fn bytes(mut self, val: &[u8]) -> Self {
        self.payload.extend_from_slice(val);
        self
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn power(adapter: u8, on: bool) -> Self {
        Request::new(adapter, Command::Power).u8(on.into())
    }

    pub fn set_local_name(adapter: u8, name: &str) -> Result<Self> {
        if name.len() > MAX_LOCAL_NAME_LEN {
            return Err(Error::InvalidParameter(format!(
                "local name is {} bytes, the maximum is {}",
                name.len(),
                MAX_LOCAL_NAME_LEN
            )));
        }

        Ok(Request::new(adapter, Command::SetLocalName)
            .u8(name.len() as u8)
            .bytes(name.as_bytes()))
    }

    pub fn set_connection_parameters(
        adapter: u8,
        address: BluetoothDeviceAddress,
        parameters: ConnectionParameters,
    ) -> Result<Self> {
        if parameters.min_interval > parameters.max_interval {
            return Err(Error::InvalidParameter(format!(
                "minimum interval {} is larger than the maximum interval {}",
                parameters.min_interval, parameters.max_interval
            )));
        }

        Ok(Request::new(adapter, Command::SetConnectionParameters)
            .bytes(&address.to_command_text())
            .u16(parameters.min_interval)
            .u16(parameters.max_interval)
            .u16(parameters.latency)
            .u16(parameters.supervision_timeout))
    }

    pub fn scan(adapter: u8, start: bool) -> Self {
        Request::new(adapter, Command::Scan).u8(start.into())
    }

    pub fn read_controller_info(adapter: u8) -> Self {
        Request::new(adapter, Command::ReadControllerInfo).u8(0)
    }

    pub fn connect(
        adapter: u8,
        address: BluetoothDeviceAddress,
        address_type: AddressType,
        security_level: SecurityLevel,
    ) -> Self {
        Request::new(adapter, Command::Connect)
            .bytes(&address.to_command_text())
            .u8(address_type.to_command_val())
            .u8(security_level.to_command_val())
    }

    /// Write a characteristic value, with or without a response from the server
    pub fn write(adapter: u8, with_response: bool, handle: u16, value: &[u8]) -> Self {
        let command = if with_response {
            Command::WriteRequest
        } else {
            Command::WriteCommand
        };

        Request::new(adapter, command).u16(handle).bytes(value)
    }

    pub fn read(adapter: u8, handle: u16) -> Self {
        Request::new(adapter, Command::Read).u16(handle)
    }

    pub fn subscribe(adapter: u8, kind: SubscriptionKind, value_handle: u16) -> Self {
        Request::new(adapter, Command::Subscribe)
            .u8(kind.to_command_val())
            .u16(value_handle)
    }

    pub fn unsubscribe(adapter: u8, subscription_id: u8) -> Self {
        Request::new(adapter, Command::Unsubscribe).u8(subscription_id)
    }
}
