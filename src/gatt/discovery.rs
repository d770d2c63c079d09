//! Assembly of the attribute database from discovery events
//!
//! Discovery events arrive one attribute at a time. A discover primary event opens a new
//! service, and the characteristic and descriptor events that follow it belong to that service
//! until the next discover primary event. Discovery ends with an empty discover primary event.
//!
//! ```
//! use btled::gatt::{Discovery, DiscoveryRecord, Service};
//!
//! let service = Service {
//!     start_handle: 1,
//!     end_handle: 5,
//!     uuid: "0000180f-0000-1000-8000-00805f9b34fb".into(),
//!     characteristics: Vec::new(),
//! };
//!
//! let discovery = Discovery::default()
//!     .step(DiscoveryRecord::Service(service))
//!     .step(DiscoveryRecord::End);
//!
//! assert_eq!(1, discovery.database().unwrap().services().len());
//! ```

use super::{AttributeDatabase, Characteristic, Descriptor, Service};

/// One decoded discovery event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryRecord {
    /// A primary service, its characteristic list is ignored
    Service(Service),
    Characteristic(Characteristic),
    Descriptor(Descriptor),
    /// The end of discovery
    End,
}

/// State of the attribute database assembly
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Discovery {
    /// No discovery is in progress
    #[default]
    Idle,
    /// Services are being discovered
    Building {
        finished: Vec<Service>,
        current: Service,
    },
    /// Discovery completed
    Done(AttributeDatabase),
}

impl Discovery {
    /// Advance the assembly by one record
    ///
    /// Characteristics and descriptors are dropped when there is no service to put them in. A
    /// service received after discovery completed starts a new round of discovery.
    pub fn step(self, record: DiscoveryRecord) -> Self {
        match (self, record) {
            (Discovery::Building { mut finished, current }, DiscoveryRecord::Service(service)) => {
                finished.push(current);

                Discovery::Building {
                    finished,
                    current: Self::open(service),
                }
            }
            (_, DiscoveryRecord::Service(service)) => Discovery::Building {
                finished: Vec::new(),
                current: Self::open(service),
            },
            (Discovery::Building { mut finished, mut current }, DiscoveryRecord::Characteristic(mut characteristic)) => {
                characteristic.descriptors.clear();

                current.characteristics.push(characteristic);

                Discovery::Building { finished, current }
            }
            (Discovery::Building { finished, mut current }, DiscoveryRecord::Descriptor(descriptor)) => {
                match current.characteristics.last_mut() {
                    Some(characteristic) => characteristic.descriptors.push(descriptor),
                    None => log::warn!("descriptor 0x{:04x} without a characteristic dropped", descriptor.handle),
                }

                Discovery::Building { finished, current }
            }
            (Discovery::Building { mut finished, current }, DiscoveryRecord::End) => {
                finished.push(current);

                log::info!("discovery complete with {} service(s)", finished.len());

                Discovery::Done(AttributeDatabase::new(finished))
            }
            (Discovery::Idle, DiscoveryRecord::End) => {
                log::info!("discovery complete without any services");

                Discovery::Done(AttributeDatabase::default())
            }
            (state, record) => {
                log::debug!("discovery record dropped outside of discovery: {:?}", record);

                state
            }
        }
    }

    fn open(mut service: Service) -> Service {
        service.characteristics.clear();

        service
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Discovery::Done(_))
    }

    /// Get the database if discovery completed
    pub fn database(&self) -> Option<&AttributeDatabase> {
        match self {
            Discovery::Done(database) => Some(database),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gatt::tests::characteristic;

    fn service(start_handle: u16, uuid: &str) -> DiscoveryRecord {
        DiscoveryRecord::Service(Service {
            start_handle,
            end_handle: start_handle + 9,
            uuid: uuid.to_string(),
            characteristics: Vec::new(),
        })
    }

    fn descriptor(handle: u16) -> DiscoveryRecord {
        DiscoveryRecord::Descriptor(Descriptor {
            handle,
            uuid16: 0x2902,
            uuid: "00002902-0000-1000-8000-00805f9b34fb".into(),
        })
    }

    fn run(records: Vec<DiscoveryRecord>) -> Discovery {
        records.into_iter().fold(Discovery::default(), Discovery::step)
    }

    #[test]
    fn two_services_two_characteristics() {
        let discovery = run(vec![
            service(1, "0000180d"),
            DiscoveryRecord::Characteristic(characteristic(2, "00002a37")),
            descriptor(4),
            DiscoveryRecord::Characteristic(characteristic(5, "00002a38")),
            service(11, "0000180f"),
            DiscoveryRecord::Characteristic(characteristic(12, "00002a19")),
            DiscoveryRecord::Characteristic(characteristic(14, "00002a1a")),
            DiscoveryRecord::End,
        ]);

        let database = discovery.database().unwrap();

        let services = database.services();

        assert_eq!(2, services.len());

        assert_eq!(vec![1, 11], services.iter().map(|s| s.start_handle).collect::<Vec<_>>());

        assert_eq!(
            vec![2, 5],
            services[0].characteristics.iter().map(|c| c.handle).collect::<Vec<_>>()
        );

        assert_eq!(
            vec![12, 14],
            services[1].characteristics.iter().map(|c| c.handle).collect::<Vec<_>>()
        );

        assert_eq!(1, services[0].characteristics[0].descriptors.len());

        assert_eq!(4, services[0].characteristics[0].descriptors[0].handle);

        assert_eq!(
            1,
            database.characteristics().map(|c| c.descriptors.len()).sum::<usize>()
        );
    }

    #[test]
    fn records_without_context_are_dropped() {
        let discovery = run(vec![
            DiscoveryRecord::Characteristic(characteristic(2, "00002a37")),
            descriptor(3),
            service(1, "0000180d"),
            descriptor(3),
            DiscoveryRecord::Characteristic(characteristic(4, "00002a38")),
            DiscoveryRecord::End,
            DiscoveryRecord::Characteristic(characteristic(6, "00002a39")),
        ]);

        let services = discovery.database().unwrap().services();

        assert_eq!(1, services.len());

        assert_eq!(1, services[0].characteristics.len());

        assert!(services[0].characteristics[0].descriptors.is_empty());
    }

    #[test]
    fn end_without_services() {
        let discovery = Discovery::Idle.step(DiscoveryRecord::End);

        assert!(discovery.is_done());

        assert!(discovery.database().unwrap().is_empty());
    }

    #[test]
    fn new_round_after_done() {
        let discovery = run(vec![
            service(1, "0000180d"),
            DiscoveryRecord::End,
            service(20, "0000180f"),
        ]);

        assert!(!discovery.is_done());

        let discovery = discovery.step(DiscoveryRecord::End);

        let services = discovery.database().unwrap().services();

        assert_eq!(1, services.len());

        assert_eq!(20, services[0].start_handle);
    }
}
