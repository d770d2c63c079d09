//! Decoding of events
//!
//! An event is `adapter | event | status | length | data`. The fields within the data are
//! little endian.

use super::request::ConnectionParameters;
use super::response::decode_text;
use super::EventCode;
use crate::address::BluetoothDeviceAddress;
use crate::gatt::{Characteristic, Descriptor, DiscoveryRecord, Service, SubscriptionKind};

/// An advertising report received while scanning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanResult {
    pub flags: u32,
    pub address: BluetoothDeviceAddress,
    /// Address type as reported by the kernel (1 is LE public, 2 is LE random)
    pub address_type: u8,
    pub rssi: i8,
    pub advertising_data: Vec<u8>,
}

/// A decoded event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Connected,
    Disconnected { reason: String },
    ScanStatus { scanning: bool },
    ScanResult(ScanResult),
    NewConnectionParameters(ConnectionParameters),
    /// A notification or indication of a subscribed characteristic value
    Value {
        kind: SubscriptionKind,
        value_handle: u16,
        subscription_id: u8,
        data: Vec<u8>,
    },
    Discovery(DiscoveryRecord),
}

impl Event {
    pub fn code(&self) -> EventCode {
        match self {
            Event::Connected => EventCode::Connected,
            Event::Disconnected { .. } => EventCode::Disconnected,
            Event::ScanStatus { .. } => EventCode::ScanStatus,
            Event::ScanResult(_) => EventCode::ScanResult,
            Event::NewConnectionParameters(_) => EventCode::NewConnectionParameters,
            Event::Value {
                kind: SubscriptionKind::Notification,
                ..
            } => EventCode::Notification,
            Event::Value {
                kind: SubscriptionKind::Indication,
                ..
            } => EventCode::Indication,
            Event::Discovery(DiscoveryRecord::Characteristic(_)) => EventCode::DiscoverCharacteristic,
            Event::Discovery(DiscoveryRecord::Descriptor(_)) => EventCode::DiscoverDescriptor,
            Event::Discovery(_) => EventCode::DiscoverPrimary,
        }
    }
}

/// The reason an event could not be decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventError {
    MissingHeader,
    UnknownEvent(u8),
    Truncated(EventCode),
}

impl std::fmt::Display for EventError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            EventError::MissingHeader => f.write_str("event is shorter than its header"),
            EventError::UnknownEvent(code) => write!(f, "unknown event {}", code),
            EventError::Truncated(code) => write!(f, "{} event is truncated", code),
        }
    }
}

/// Cursor over the little endian fields of an event
struct Fields<'a> {
    code: EventCode,
    raw: &'a [u8],
}

impl<'a> Fields<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8], EventError> {
        if self.raw.len() < len {
            return Err(EventError::Truncated(self.code));
        }

        let (field, rest) = self.raw.split_at(len);

        self.raw = rest;

        Ok(field)
    }

    fn u8(&mut self) -> Result<u8, EventError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, EventError> {
        let raw = self.take(2)?;

        Ok(<u16>::from_le_bytes([raw[0], raw[1]]))
    }

    fn u32(&mut self) -> Result<u32, EventError> {
        let raw = self.take(4)?;

        Ok(<u32>::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    fn uuid(&mut self) -> String {
        decode_text(std::mem::take(&mut self.raw)).to_ascii_lowercase()
    }

    fn rest(&mut self) -> &'a [u8] {
        std::mem::take(&mut self.raw)
    }
}

/// Decode an event, returning the adapter index with the event
pub fn decode(content: &[u8]) -> Result<(u8, Event), EventError> {
    if content.len() < 3 {
        return Err(EventError::MissingHeader);
    }

    let adapter = content[0];

    let code = EventCode::try_from(content[1]).map_err(|_| EventError::UnknownEvent(content[1]))?;

    // events without data may leave out the length
    let declared = content.get(3).map(|len| *len as usize).unwrap_or_default();

    let available = content.get(4..).unwrap_or_default();

    let mut fields = Fields {
        code,
        raw: &available[..declared.min(available.len())],
    };

    let event = match code {
        EventCode::Connected => Event::Connected,
        EventCode::Disconnected => Event::Disconnected {
            reason: decode_text(fields.rest()),
        },
        EventCode::ScanStatus => Event::ScanStatus {
            scanning: fields.u8()? != 0,
        },
        EventCode::ScanResult => {
            let flags = fields.u32()?;

            let address = BluetoothDeviceAddress::from_le_slice(fields.take(6)?).ok_or(EventError::Truncated(code))?;

            let address_type = fields.u8()?;

            let rssi = fields.u8()? as i8;

            let data_len = fields.u8()? as usize;

            let advertising_data = fields.take(data_len)?.to_vec();

            Event::ScanResult(ScanResult {
                flags,
                address,
                address_type,
                rssi,
                advertising_data,
            })
        }
        EventCode::NewConnectionParameters => Event::NewConnectionParameters(ConnectionParameters {
            min_interval: fields.u16()?,
            max_interval: fields.u16()?,
            latency: fields.u16()?,
            supervision_timeout: fields.u16()?,
        }),
        EventCode::Notification | EventCode::Indication => {
            let value_handle = fields.u16()?;

            let data_len = fields.u16()? as usize;

            let subscription_id = fields.u8()?;

            let data = fields.take(data_len)?.to_vec();

            let kind = if code == EventCode::Notification {
                SubscriptionKind::Notification
            } else {
                SubscriptionKind::Indication
            };

            Event::Value {
                kind,
                value_handle,
                subscription_id,
                data,
            }
        }
        EventCode::DiscoverPrimary if declared == 0 => Event::Discovery(DiscoveryRecord::End),
        EventCode::DiscoverPrimary => Event::Discovery(DiscoveryRecord::Service(Service {
            start_handle: fields.u16()?,
            end_handle: fields.u16()?,
            uuid: fields.uuid(),
            characteristics: Vec::new(),
        })),
        EventCode::DiscoverCharacteristic => {
            let handle = fields.u16()?;

            let value_handle = fields.u16()?;

            let extended_properties = fields.u16()?;

            let properties = fields.u8()?;

            Event::Discovery(DiscoveryRecord::Characteristic(Characteristic {
                handle,
                value_handle,
                properties,
                extended_properties,
                uuid: fields.uuid(),
                descriptors: Vec::new(),
            }))
        }
        EventCode::DiscoverDescriptor => Event::Discovery(DiscoveryRecord::Descriptor(Descriptor {
            handle: fields.u16()?,
            uuid16: fields.u16()?,
            uuid: fields.uuid(),
        })),
    };

    Ok((adapter, event))
}
