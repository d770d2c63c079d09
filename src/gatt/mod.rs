//! Generic Attribute Profile client data
//!
//! The attribute database of the connected device is built from the discovery events the daemon
//! sends after a connection is made. The database is a strict tree of services, characteristics,
//! and descriptors, kept in the order the daemon discovered them.

pub mod discovery;
pub mod subscription;

pub use discovery::{Discovery, DiscoveryRecord};
pub use subscription::{Notification, NotificationCallback, Subscription, SubscriptionKind, SubscriptionTable};

/// A primary service of the connected device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    pub start_handle: u16,
    pub end_handle: u16,
    pub uuid: String,
    pub characteristics: Vec<Characteristic>,
}

/// A characteristic within a [`Service`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Characteristic {
    /// Handle of the characteristic declaration
    pub handle: u16,
    pub value_handle: u16,
    pub properties: u8,
    pub extended_properties: u16,
    pub uuid: String,
    pub descriptors: Vec<Descriptor>,
}

/// A descriptor of a [`Characteristic`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    pub handle: u16,
    /// The 16 bit alias of the descriptor's UUID
    pub uuid16: u16,
    pub uuid: String,
}

/// Characteristic property flags
pub mod properties {
    pub const BROADCAST: u8 = 0x01;
    pub const READ: u8 = 0x02;
    pub const WRITE_WITHOUT_RESPONSE: u8 = 0x04;
    pub const WRITE: u8 = 0x08;
    pub const NOTIFY: u8 = 0x10;
    pub const INDICATE: u8 = 0x20;
    pub const AUTHENTICATED_SIGNED_WRITES: u8 = 0x40;
    pub const EXTENDED_PROPERTIES: u8 = 0x80;
}

impl Characteristic {
    pub fn has_property(&self, flag: u8) -> bool {
        self.properties & flag != 0
    }
}

/// The discovered attributes of a connected device
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeDatabase {
    services: Vec<Service>,
}

impl AttributeDatabase {
    pub fn new(services: Vec<Service>) -> Self {
        AttributeDatabase { services }
    }

    pub fn services(&self) -> &[Service] {
        &self.services
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Iterate over every characteristic of every service
    pub fn characteristics(&self) -> impl Iterator<Item = &Characteristic> {
        self.services.iter().flat_map(|service| service.characteristics.iter())
    }

    /// Find the first characteristic whose UUID starts with `uuid`
    ///
    /// `uuid` must already be in the lower case textual form, see
    /// [`UuidNames::resolve`](crate::UuidNames::resolve).
    pub fn characteristic_by_uuid(&self, uuid: &str) -> Option<&Characteristic> {
        self.characteristics().find(|characteristic| characteristic.uuid.starts_with(uuid))
    }

    pub fn characteristic_by_value_handle(&self, value_handle: u16) -> Option<&Characteristic> {
        self.characteristics()
            .find(|characteristic| characteristic.value_handle == value_handle)
    }
}

impl From<AttributeDatabase> for Vec<Service> {
    fn from(database: AttributeDatabase) -> Self {
        database.services
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub const HEART_RATE_MEASUREMENT: &str = "00002a37-0000-1000-8000-00805f9b34fb";

    pub fn characteristic(handle: u16, uuid: &str) -> Characteristic {
        Characteristic {
            handle,
            value_handle: handle + 1,
            properties: properties::READ | properties::NOTIFY,
            extended_properties: 0,
            uuid: uuid.to_string(),
            descriptors: Vec::new(),
        }
    }

    #[test]
    fn lookup_by_uuid_prefix() {
        let database = AttributeDatabase::new(vec![Service {
            start_handle: 1,
            end_handle: 10,
            uuid: "0000180d-0000-1000-8000-00805f9b34fb".into(),
            characteristics: vec![
                characteristic(2, "00002a38-0000-1000-8000-00805f9b34fb"),
                characteristic(4, HEART_RATE_MEASUREMENT),
            ],
        }]);

        assert_eq!(5, database.characteristic_by_uuid(HEART_RATE_MEASUREMENT).unwrap().value_handle);

        assert_eq!(3, database.characteristic_by_uuid("00002a3").unwrap().value_handle);

        assert!(database.characteristic_by_uuid("00002a39").is_none());

        assert_eq!(2, database.characteristic_by_value_handle(3).unwrap().handle);

        assert!(database.characteristic_by_uuid(HEART_RATE_MEASUREMENT).unwrap().has_property(properties::NOTIFY));
    }
}
