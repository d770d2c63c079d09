//! A client for the btled Bluetooth Low Energy daemon
//!
//! The daemon owns the Bluetooth controller and exposes it through a local stream socket. This
//! library is the client side of that socket. It turns the fixed size frames exchanged with the
//! daemon into a typed command, response, and event API.
//!
//! The library is layered the same way the frames are:
//! * a [`Transport`](transport::Transport) carries MTU sized frames to and from the daemon. The
//!   Unix socket implementation is in the `btled-unix` crate.
//! * the [`ipc`] layer frames messages, queues responses, and hands off events.
//! * a [`Session`] sends commands, waits for their responses, and processes events. The
//!   [`gatt`] attribute database of a connected device is built by the session from the
//!   discovery events.
//!
//! ```no_run
//! use btled::transport::Transport;
//! use btled::{AddressType, Config, SecurityLevel, Session};
//!
//! fn run<T: Transport>(transport: T) -> btled::Result<()> {
//!     let session = Session::new(transport, &Config::from_env())?;
//!
//!     session.power_on(0)?;
//!
//!     session.connect(
//!         0,
//!         "00:11:22:33:44:55".parse().unwrap(),
//!         AddressType::Public,
//!         SecurityLevel::Low,
//!         |database| println!("{} services", database.services().len()),
//!     )
//! }
//! ```
//!
//! No logger is installed by this library, it only logs through the [`log`] facade.

pub mod address;
pub mod cmd;
pub mod config;
pub mod error;
pub mod gatt;
pub mod ipc;
pub mod transport;
pub mod uuid;

pub use address::{AddressType, BluetoothDeviceAddress};
pub use cmd::{Command, ConnectionParameters, ControllerInfo, Event, ScanResult, SecurityLevel, Session};
pub use config::Config;
pub use error::{DaemonStatus, Error, Result};
pub use gatt::{AttributeDatabase, Characteristic, Descriptor, Notification, Service};
pub use crate::uuid::{Uuid, UuidNames};
