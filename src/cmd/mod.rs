//! The command session with the daemon
//!
//! A [`Session`] sends commands and waits for their responses, and processes the events sent by
//! the daemon. Only one command is outstanding at a time. Responses carry no identifier other
//! than the command's opcode, so a session serializes its commands and matches a response to
//! the waiting command by opcode. A response for another opcode (such as a late response to a
//! command that timed out) stays queued for a later command with that opcode.
//!
//! Events are processed in the order they are received on a dispatcher thread owned by the
//! session. The attribute database is built there from the discovery events, notifications are
//! routed to their subscription, and user callbacks are called. A slow callback delays the
//! processing of later events but never the responses to commands.
//!
//! # Callbacks
//! Callbacks run on the dispatcher thread. They may call the methods of the session, but they
//! must not wait on an event, as the event is only processed after the callback returns.

pub mod event;
pub mod opcode;
pub mod request;
pub mod response;

pub use event::{Event, EventError, ScanResult};
pub use opcode::{Command, EventCode};
pub use request::{ConnectionParameters, Request, SecurityLevel};
pub use response::ControllerInfo;

use crate::address::{AddressType, BluetoothDeviceAddress};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::gatt::{
    AttributeDatabase, Characteristic, Discovery, NotificationCallback, Notification, Subscription,
    SubscriptionKind, SubscriptionTable,
};
use crate::ipc::Ipc;
use crate::transport::{join_bounded, Transport};
use crate::uuid::{normalize_uuid, UuidNames};
use response::RawResponse;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// Callback for the completion of discovery
pub type DiscoveryCallback = Box<dyn FnOnce(&AttributeDatabase) + Send>;

/// Callback for advertising reports while scanning
pub type ScanCallback = Arc<dyn Fn(&ScanResult) + Send + Sync>;

/// Callback for every decoded event, with the adapter index it was sent for
pub type EventHandler = Arc<dyn Fn(u8, &Event) + Send + Sync>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Messages processed by the dispatcher thread
enum Dispatch {
    Event(Vec<u8>),
    /// Forget the attribute database and start waiting for a new discovery
    ResetDiscovery(DiscoveryCallback),
    Stop,
}

#[derive(Default)]
struct DiscoveryState {
    discovery: Discovery,
    on_complete: Option<DiscoveryCallback>,
}

/// Session state mutated by event processing
#[derive(Default)]
struct Shared {
    discovery: Mutex<DiscoveryState>,
    subscriptions: Mutex<SubscriptionTable>,
    on_scan_result: Mutex<Option<ScanCallback>>,
    event_handler: Mutex<Option<EventHandler>>,
}

impl Shared {
    fn run(&self, mut receiver: UnboundedReceiver<Dispatch>) {
        while let Some(dispatch) = receiver.blocking_recv() {
            match dispatch {
                Dispatch::Event(content) => self.process_event(&content),
                Dispatch::ResetDiscovery(on_complete) => {
                    *lock(&self.discovery) = DiscoveryState {
                        discovery: Discovery::Idle,
                        on_complete: Some(on_complete),
                    };
                }
                Dispatch::Stop => break,
            }
        }

        log::debug!("event dispatcher stopped");
    }

    fn process_event(&self, content: &[u8]) {
        let (adapter, event) = match event::decode(content) {
            Ok(decoded) => decoded,
            Err(e) => {
                log::warn!("dropping event: {}", e);
                return;
            }
        };

        log::debug!("[{}] {} event", adapter, event.code());

        match &event {
            Event::Discovery(record) => self.discover(record.clone()),
            Event::Value {
                value_handle,
                subscription_id,
                data,
                ..
            } => {
                let routed = lock(&self.subscriptions).route(*subscription_id, *value_handle, data.clone());

                match routed {
                    Some((callback, notification)) => callback(notification),
                    None => log::warn!(
                        "value for unknown subscription {} (handle 0x{:04x}) dropped",
                        subscription_id,
                        value_handle
                    ),
                }
            }
            Event::ScanResult(result) => {
                let callback = lock(&self.on_scan_result).clone();

                if let Some(callback) = callback {
                    callback(result)
                }
            }
            Event::Disconnected { reason } => {
                log::info!("[{}] disconnected: {}", adapter, reason);

                lock(&self.subscriptions).clear();
            }
            Event::Connected => log::info!("[{}] connected", adapter),
            Event::ScanStatus { .. } | Event::NewConnectionParameters(_) => (),
        }

        let handler = lock(&self.event_handler).clone();

        if let Some(handler) = handler {
            handler(adapter, &event)
        }
    }

    fn discover(&self, record: crate::gatt::DiscoveryRecord) {
        let mut state = lock(&self.discovery);

        let was_done = state.discovery.is_done();

        state.discovery = std::mem::take(&mut state.discovery).step(record);

        if was_done || !state.discovery.is_done() {
            return;
        }

        let on_complete = state.on_complete.take();

        let database = state.discovery.database().cloned().unwrap_or_default();

        drop(state);

        log::info!("discovery complete with {} service(s)", database.services().len());

        if let Some(on_complete) = on_complete {
            on_complete(&database)
        }
    }
}

/// A session with the daemon
///
/// Every command method takes the index of the adapter within the daemon the command is for.
/// The session is closed when it is dropped.
pub struct Session<T: Transport> {
    ipc: Ipc<T>,
    shared: Arc<Shared>,
    dispatch: UnboundedSender<Dispatch>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    command_lock: Mutex<()>,
    closed: AtomicBool,
    uuid_names: Option<Arc<UuidNames>>,
    command_timeout: Duration,
    connect_timeout: Duration,
    join_timeout: Duration,
}

impl<T: Transport> Session<T> {
    /// Create a session over a connected transport
    pub fn new(transport: T, config: &Config) -> Result<Self> {
        let ipc = Ipc::new(transport, config.loopback);

        let shared = Arc::new(Shared::default());

        let (dispatch, receiver) = unbounded_channel();

        let dispatcher = {
            let shared = shared.clone();

            std::thread::Builder::new()
                .name("btled-dispatch".into())
                .spawn(move || shared.run(receiver))?
        };

        let events = dispatch.clone();

        ipc.start(move |content| {
            if events.send(Dispatch::Event(content)).is_err() {
                log::debug!("event received after the dispatcher stopped");
            }
        })?;

        Ok(Session {
            ipc,
            shared,
            dispatch,
            dispatcher: Mutex::new(Some(dispatcher)),
            command_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
            uuid_names: None,
            command_timeout: config.command_timeout,
            connect_timeout: config.connect_timeout,
            join_timeout: config.join_timeout,
        })
    }

    /// Use a UUID name table for resolving characteristic names
    ///
    /// With a table, the GATT methods that take a UUID also accept the name of a UUID.
    pub fn with_uuid_names(mut self, uuid_names: Arc<UuidNames>) -> Self {
        self.uuid_names = Some(uuid_names);
        self
    }

    pub fn uuid_names(&self) -> Option<&UuidNames> {
        self.uuid_names.as_deref()
    }

    pub fn transport(&self) -> &T {
        self.ipc.transport()
    }

    fn resolve_uuid(&self, uuid: &str) -> String {
        match &self.uuid_names {
            Some(names) => names.resolve(uuid),
            None => normalize_uuid(uuid),
        }
    }

    /// Send a command and wait for its response
    ///
    /// `parameters` are the encoded parameters of the command. The data of a successful response
    /// is returned. A response with a non-zero status is returned as [`Error::Daemon`], and
    /// [`Error::Timeout`] is returned if there is no response within `timeout`. The session can
    /// still be used after either error.
    pub fn send_command(&self, adapter: u8, command: Command, parameters: &[u8], timeout: Duration) -> Result<Vec<u8>> {
        self.execute(&Request::with_parameters(adapter, command, parameters), timeout)
    }

    fn execute(&self, request: &Request, timeout: Duration) -> Result<Vec<u8>> {
        let guard = lock(&self.command_lock);

        self.execute_locked(&guard, request, timeout)
    }

    /// Execute a command while the caller holds the command lock
    fn execute_locked(&self, _guard: &MutexGuard<'_, ()>, request: &Request, timeout: Duration) -> Result<Vec<u8>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Closed);
        }

        let command = request.command;

        let opcode = u8::from(command);

        log::debug!("sending {} command", command);

        self.ipc.send_request(request.payload())?;

        let content = self
            .ipc
            .wait_response(timeout, |content| response::opcode_of(content) == Some(opcode))?
            .ok_or_else(|| {
                log::warn!("no response to {} within {:?}", command, timeout);

                Error::Timeout(command)
            })?;

        let raw = RawResponse::parse(&content).ok_or(Error::MalformedResponse {
            command,
            reason: "response is shorter than its header",
        })?;

        log::debug!("[{}] {} response status {}", raw.adapter, command, raw.status);

        raw.check(command).map(<[u8]>::to_vec)
    }

    /// Get the device information
    ///
    /// The daemon may not implement this command, in which case [`Error::Daemon`] is returned.
    pub fn get_device_info(&self, adapter: u8) -> Result<Vec<u8>> {
        self.execute(&Request::new(adapter, Command::GetDeviceInfo), self.command_timeout)
    }

    pub fn reset(&self, adapter: u8) -> Result<()> {
        self.execute(&Request::new(adapter, Command::Reset), self.command_timeout)
            .map(drop)
    }

    pub fn power_on(&self, adapter: u8) -> Result<()> {
        self.execute(&Request::power(adapter, true), self.command_timeout).map(drop)
    }

    pub fn power_off(&self, adapter: u8) -> Result<()> {
        self.execute(&Request::power(adapter, false), self.command_timeout).map(drop)
    }

    /// Set the local name of the adapter
    ///
    /// The name can be at most 30 bytes.
    pub fn set_local_name(&self, adapter: u8, name: &str) -> Result<()> {
        self.execute(&Request::set_local_name(adapter, name)?, self.command_timeout)
            .map(drop)
    }

    /// Set the connection parameters used for the device with `address`
    pub fn set_connection_parameters(
        &self,
        adapter: u8,
        address: BluetoothDeviceAddress,
        parameters: ConnectionParameters,
    ) -> Result<()> {
        let request = Request::set_connection_parameters(adapter, address, parameters)?;

        self.execute(&request, self.command_timeout).map(drop)
    }

    /// Start scanning
    ///
    /// `on_result` is called with every advertising report until scanning is stopped.
    pub fn scan_start<F>(&self, adapter: u8, on_result: F) -> Result<()>
    where
        F: Fn(&ScanResult) + Send + Sync + 'static,
    {
        *lock(&self.shared.on_scan_result) = Some(Arc::new(on_result));

        let result = self.execute(&Request::scan(adapter, true), self.command_timeout);

        if result.is_err() {
            lock(&self.shared.on_scan_result).take();
        }

        result.map(drop)
    }

    pub fn scan_stop(&self, adapter: u8) -> Result<()> {
        self.execute(&Request::scan(adapter, false), self.command_timeout)?;

        lock(&self.shared.on_scan_result).take();

        Ok(())
    }

    pub fn read_controller_info(&self, adapter: u8) -> Result<ControllerInfo> {
        let data = self.execute(&Request::read_controller_info(adapter), self.command_timeout)?;

        ControllerInfo::from_raw(&data)
    }

    /// Connect to a device
    ///
    /// The attribute database of any previous connection is dropped. The daemon discovers the
    /// attributes of the device after the connection is made, and `on_discovery_complete` is
    /// called with the attribute database once discovery finishes.
    pub fn connect<F>(
        &self,
        adapter: u8,
        address: BluetoothDeviceAddress,
        address_type: AddressType,
        security_level: SecurityLevel,
        on_discovery_complete: F,
    ) -> Result<()>
    where
        F: FnOnce(&AttributeDatabase) + Send + 'static,
    {
        let guard = lock(&self.command_lock);

        // ordered before any discovery event of this connection
        self.dispatch
            .send(Dispatch::ResetDiscovery(Box::new(on_discovery_complete)))
            .map_err(|_| Error::Closed)?;

        lock(&self.shared.subscriptions).clear();

        log::info!("[{}] connecting to {}", adapter, address);

        let request = Request::connect(adapter, address, address_type, security_level);

        self.execute_locked(&guard, &request, self.connect_timeout).map(drop)
    }

    /// Write a characteristic value without a response from the device
    pub fn write_command(&self, adapter: u8, handle: u16, value: &[u8]) -> Result<()> {
        self.execute(&Request::write(adapter, false, handle, value), self.command_timeout)
            .map(drop)
    }

    /// Write a characteristic value and wait for the device to respond
    pub fn write_request(&self, adapter: u8, handle: u16, value: &[u8]) -> Result<()> {
        self.execute(&Request::write(adapter, true, handle, value), self.command_timeout)
            .map(drop)
    }

    /// Read a characteristic value or descriptor
    pub fn read(&self, adapter: u8, handle: u16) -> Result<Vec<u8>> {
        self.execute(&Request::read(adapter, handle), self.command_timeout)
    }

    /// Get the attribute database of the connected device
    ///
    /// `None` is returned until discovery completes.
    pub fn database(&self) -> Option<AttributeDatabase> {
        lock(&self.shared.discovery).discovery.database().cloned()
    }

    /// Find a characteristic of the connected device
    ///
    /// `uuid` is matched as a prefix of the characteristic UUIDs. It may be a full UUID, a 16 bit
    /// UUID in `0x` form, or a name when the session has a UUID name table.
    pub fn characteristic_by_uuid(&self, uuid: &str) -> Option<Characteristic> {
        let query = self.resolve_uuid(uuid);

        lock(&self.shared.discovery)
            .discovery
            .database()?
            .characteristic_by_uuid(&query)
            .cloned()
    }

    /// Subscribe to notifications of a characteristic value
    pub fn subscribe_notification<F>(&self, adapter: u8, uuid: &str, callback: F) -> Result<()>
    where
        F: Fn(Notification) + Send + Sync + 'static,
    {
        self.subscribe(adapter, SubscriptionKind::Notification, uuid, Arc::new(callback))
    }

    /// Subscribe to indications of a characteristic value
    pub fn subscribe_indication<F>(&self, adapter: u8, uuid: &str, callback: F) -> Result<()>
    where
        F: Fn(Notification) + Send + Sync + 'static,
    {
        self.subscribe(adapter, SubscriptionKind::Indication, uuid, Arc::new(callback))
    }

    fn subscribe(&self, adapter: u8, kind: SubscriptionKind, uuid: &str, callback: NotificationCallback) -> Result<()> {
        let guard = lock(&self.command_lock);

        let characteristic = self
            .characteristic_by_uuid(uuid)
            .ok_or_else(|| Error::NotFound(uuid.to_string()))?;

        let value_handle = characteristic.value_handle;

        if lock(&self.shared.subscriptions).by_value_handle(value_handle).is_some() {
            return Err(Error::AlreadySubscribed(uuid.to_string()));
        }

        let request = Request::subscribe(adapter, kind, value_handle);

        let data = self.execute_locked(&guard, &request, self.command_timeout)?;

        let id = *data.first().ok_or(Error::MalformedResponse {
            command: Command::Subscribe,
            reason: "missing subscription id",
        })?;

        log::info!("[{}] subscribed to {} of {} with id {}", adapter, kind, uuid, id);

        lock(&self.shared.subscriptions).insert(Subscription {
            id,
            kind,
            value_handle,
            uuid: characteristic.uuid,
            callback,
        });

        Ok(())
    }

    /// Remove the subscription to a characteristic value
    ///
    /// This removes a subscription made by either [`subscribe_notification`] or
    /// [`subscribe_indication`].
    ///
    /// [`subscribe_notification`]: Session::subscribe_notification
    /// [`subscribe_indication`]: Session::subscribe_indication
    pub fn unsubscribe_notification(&self, adapter: u8, uuid: &str) -> Result<()> {
        let guard = lock(&self.command_lock);

        let value_handle = self
            .characteristic_by_uuid(uuid)
            .ok_or_else(|| Error::NotFound(uuid.to_string()))?
            .value_handle;

        let id = lock(&self.shared.subscriptions)
            .by_value_handle(value_handle)
            .map(|subscription| subscription.id)
            .ok_or_else(|| Error::NotSubscribed(uuid.to_string()))?;

        self.execute_locked(&guard, &Request::unsubscribe(adapter, id), self.command_timeout)?;

        lock(&self.shared.subscriptions).remove(id);

        log::info!("[{}] unsubscribed from {} (id {})", adapter, uuid, id);

        Ok(())
    }

    /// Number of active subscriptions
    pub fn subscription_count(&self) -> usize {
        lock(&self.shared.subscriptions).len()
    }

    /// Set the handler called with every decoded event
    ///
    /// The handler is called after the session has processed the event.
    pub fn set_event_handler<F>(&self, handler: F)
    where
        F: Fn(u8, &Event) + Send + Sync + 'static,
    {
        *lock(&self.shared.event_handler) = Some(Arc::new(handler));
    }

    /// Send a loopback self-test frame containing `TX(<n>)`
    pub fn loopback(&self, n: u32) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Closed);
        }

        self.ipc.send_loopback(n)
    }

    /// Close the session
    ///
    /// The transport is closed and the dispatcher thread is stopped. Closing is idempotent.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        log::info!("closing session");

        let result = self.ipc.close();

        let _ = self.dispatch.send(Dispatch::Stop);

        if let Some(dispatcher) = lock(&self.dispatcher).take() {
            join_bounded(dispatcher, self.join_timeout, "dispatcher");
        }

        result
    }
}

impl<T: Transport> Drop for Session<T> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("failed to close the session: {}", e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::event::tests::{characteristic, descriptor, event, notification, primary};
    use super::*;
    use crate::gatt::properties;
    use crate::ipc::{Message, MessageType};
    use crate::transport::mock::MockTransport;
    use std::sync::mpsc;
    use std::time::Instant;

    const MTU: usize = 102;

    const HRM: &str = "00002a37-0000-1000-8000-00805f9b34fb";

    fn config() -> Config {
        Config {
            command_timeout: Duration::from_millis(100),
            connect_timeout: Duration::from_millis(100),
            ..Config::default()
        }
    }

    /// Build a response frame
    fn response(opcode: u8, status: u8, data: &[u8]) -> Vec<u8> {
        let mut content = vec![0, opcode, status, data.len() as u8];

        content.extend_from_slice(data);

        Message::new(MessageType::Response, content).encode()
    }

    fn event_frame(content: Vec<u8>) -> Vec<u8> {
        Message::new(MessageType::Event, content).encode()
    }

    fn opcode_of(frame: &[u8]) -> Command {
        Command::try_from(Message::decode(frame).unwrap().content[1]).unwrap()
    }

    /// A session whose daemon answers every command with success
    fn session() -> Session<MockTransport> {
        let transport = MockTransport::new(Some(MTU));

        transport.set_responder(|frame| {
            // only requests are answered
            if Message::decode(frame).unwrap().kind != MessageType::Request {
                return Vec::new();
            }

            let command = opcode_of(frame);

            match command {
                Command::Subscribe => vec![response(command.into(), 0, &[7])],
                Command::Read => vec![response(command.into(), 0, &[0xCA, 0xFE])],
                Command::Scan => Vec::new(),
                _ => vec![response(command.into(), 0, &[])],
            }
        });

        Session::new(transport, &config()).unwrap()
    }

    fn wait_until<F: Fn() -> bool>(condition: F) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);

        while Instant::now() < deadline {
            if condition() {
                return true;
            }

            std::thread::sleep(Duration::from_millis(5));
        }

        false
    }

    /// Connect and run discovery of one heart rate service
    fn connect_and_discover(session: &Session<MockTransport>) -> AttributeDatabase {
        let (sender, receiver) = mpsc::channel();

        let address = "00:11:22:33:44:55".parse().unwrap();

        session
            .connect(0, address, AddressType::Public, SecurityLevel::Low, move |database| {
                sender.send(database.clone()).unwrap()
            })
            .unwrap();

        for content in [
            primary(1, 8, "0000180d-0000-1000-8000-00805f9b34fb"),
            characteristic(2, properties::NOTIFY, HRM),
            descriptor(4, 0x2902, "00002902-0000-1000-8000-00805f9b34fb"),
            characteristic(5, properties::READ, "00002a38-0000-1000-8000-00805f9b34fb"),
            event(EventCode::DiscoverPrimary, &[]),
        ] {
            session.transport().inject(&event_frame(content));
        }

        receiver.recv_timeout(Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn connect_builds_database() {
        let session = session();

        let database = connect_and_discover(&session);

        assert_eq!(1, database.services().len());

        assert_eq!(2, database.services()[0].characteristics.len());

        assert_eq!(Some(database), session.database());

        assert_eq!(3, session.characteristic_by_uuid("0x2a37").unwrap().value_handle);

        let sent = session.transport().sent();

        assert_eq!(Command::Connect, opcode_of(&sent[0]));
    }

    #[test]
    fn subscription_lifecycle() {
        let session = session();

        connect_and_discover(&session);

        let (sender, receiver) = mpsc::channel();

        let sender = Mutex::new(sender);

        session
            .subscribe_notification(0, "0x2a37", move |n| sender.lock().unwrap().send(n).unwrap())
            .unwrap();

        assert_eq!(1, session.subscription_count());

        assert!(matches!(
            session.subscribe_notification(0, HRM, |_| ()),
            Err(Error::AlreadySubscribed(_))
        ));

        session.transport().inject(&event_frame(notification(3, 7, &[60])));

        let received = receiver.recv_timeout(Duration::from_secs(5)).unwrap();

        assert_eq!(HRM, received.uuid);

        assert_eq!(3, received.value_handle);

        assert_eq!(vec![60], received.data);

        session.unsubscribe_notification(0, HRM).unwrap();

        assert_eq!(0, session.subscription_count());

        session.transport().inject(&event_frame(notification(3, 7, &[61])));

        assert!(receiver.recv_timeout(Duration::from_millis(100)).is_err());

        assert!(matches!(
            session.unsubscribe_notification(0, HRM),
            Err(Error::NotSubscribed(_))
        ));

        assert!(matches!(
            session.subscribe_notification(0, "0x2a99", |_| ()),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn subscribe_before_discovery() {
        let session = session();

        assert!(matches!(
            session.subscribe_notification(0, HRM, |_| ()),
            Err(Error::NotFound(_))
        ));

        assert!(session.transport().sent().is_empty());
    }

    #[test]
    fn names_resolve_through_table() {
        let names = UuidNames::from_json(
            r#"{ "uuid128": [ { "uuid": "00002a37-0000-1000-8000-00805f9b34fb", "str": "Heart Rate Measurement" } ] }"#,
        )
        .unwrap();

        let session = session().with_uuid_names(Arc::new(names));

        connect_and_discover(&session);

        assert_eq!(
            3,
            session
                .characteristic_by_uuid("Heart Rate Measurement")
                .unwrap()
                .value_handle
        );
    }

    #[test]
    fn timeout_keeps_session_usable() {
        let session = session();

        assert!(matches!(
            session.scan_start(0, |_| ()),
            Err(Error::Timeout(Command::Scan))
        ));

        session.power_on(0).unwrap();

        assert_eq!(vec![0xCA, 0xFE], session.read(0, 0x10).unwrap());
    }

    #[test]
    fn stale_response_is_kept() {
        let transport = MockTransport::new(Some(MTU));

        transport.set_responder(|frame| match opcode_of(frame) {
            // a late scan response arrives ahead of the read response
            Command::Read => vec![response(5, 0, &[]), response(10, 0, &[1, 2, 3])],
            command => vec![response(command.into(), 6, b"already")],
        });

        let session = Session::new(transport, &config()).unwrap();

        assert_eq!(vec![1, 2, 3], session.read(0, 0x0021).unwrap());

        // the stale scan response is taken before the one sent for this command
        session.scan_stop(0).unwrap();

        assert!(matches!(
            session.scan_stop(0),
            Err(Error::Daemon {
                command: Command::Scan,
                status: crate::DaemonStatus::Already,
                ..
            })
        ));
    }

    #[test]
    fn daemon_error() {
        let transport = MockTransport::new(Some(MTU));

        transport.set_responder(|frame| vec![response(opcode_of(frame).into(), 5, b"busy\0")]);

        let session = Session::new(transport, &config()).unwrap();

        match session.power_off(1) {
            Err(e @ Error::Daemon { .. }) => {
                assert!(!e.is_fatal());
                assert_eq!("Power failed: busy (busy)", e.to_string());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn controller_info_response() {
        let transport = MockTransport::new(Some(MTU));

        transport.set_responder(|_| {
            let mut data = vec![1, 2, 3, 4, 5, 6, 8, 0x0F, 0x00];
            data.extend_from_slice(&[0xFF, 0x02, 0, 0, 0x01, 0x02, 0, 0, 0, 0, 0]);
            data.extend_from_slice(b"btled\0");
            vec![response(6, 0, &data)]
        });

        let session = Session::new(transport, &config()).unwrap();

        let info = session.read_controller_info(0).unwrap();

        assert_eq!("06:05:04:03:02:01", info.address.to_string());

        assert_eq!(15, info.manufacturer);

        assert!(info.is_powered());

        assert_eq!("btled", info.name);

        let sent = session.transport().sent();

        assert_eq!(&[0, 3, 0, 6, 0], &sent[0][..5]);
    }

    #[test]
    fn events_reach_handlers() {
        let session = session();

        let (sender, receiver) = mpsc::channel();

        let sender = Mutex::new(sender);

        session.set_event_handler(move |adapter, event| sender.lock().unwrap().send((adapter, event.clone())).unwrap());

        session.transport().inject(&event_frame(event(EventCode::ScanStatus, &[1])));

        session.transport().inject(&event_frame(vec![0, 99, 0, 0]));

        session.transport().inject(&event_frame(event(EventCode::Connected, &[])));

        let timeout = Duration::from_secs(5);

        assert_eq!((0, Event::ScanStatus { scanning: true }), receiver.recv_timeout(timeout).unwrap());

        assert_eq!((0, Event::Connected), receiver.recv_timeout(timeout).unwrap());
    }

    #[test]
    fn scan_results() {
        let transport = MockTransport::new(Some(MTU));

        transport.set_responder(|frame| vec![response(opcode_of(frame).into(), 0, &[])]);

        let session = Session::new(transport, &config()).unwrap();

        let count = Arc::new(Mutex::new(0));

        let counter = count.clone();

        session.scan_start(0, move |_| *counter.lock().unwrap() += 1).unwrap();

        let mut data = vec![0; 4];
        data.extend_from_slice(&[1, 2, 3, 4, 5, 6, 1, 0xB0, 0]);

        session.transport().inject(&event_frame(event(EventCode::ScanResult, &data)));

        assert!(wait_until(|| *count.lock().unwrap() == 1));

        session.scan_stop(0).unwrap();

        session.transport().inject(&event_frame(event(EventCode::ScanResult, &data)));

        session.transport().inject(&event_frame(event(EventCode::ScanStatus, &[0])));

        std::thread::sleep(Duration::from_millis(50));

        assert_eq!(1, *count.lock().unwrap());
    }

    #[test]
    fn loopback_frame() {
        let session = session();

        session.loopback(1).unwrap();

        let sent = session.transport().sent();

        assert_eq!(
            Message::new(MessageType::Loopback, b"TX(1)".to_vec()),
            Message::decode(&sent[0]).unwrap()
        );

        session.power_on(0).unwrap();
    }

    #[test]
    fn hang_up_is_fatal() {
        let transport = MockTransport::new(Some(MTU));

        // the daemon never answers
        transport.set_responder(|_| Vec::new());

        let config = Config {
            command_timeout: Duration::from_secs(5),
            ..config()
        };

        let session = Arc::new(Session::new(transport, &config).unwrap());

        let hang_up = {
            let session = session.clone();

            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                session.transport().hang_up();
            })
        };

        let start = Instant::now();

        let result = session.power_on(0);

        assert!(start.elapsed() < Duration::from_secs(1));

        match result {
            Err(e @ Error::Connection(_)) => assert!(e.is_fatal()),
            other => panic!("unexpected result {:?}", other),
        }

        hang_up.join().unwrap();

        assert!(matches!(session.power_off(0), Err(Error::Connection(_))));
    }

    #[test]
    fn close_is_idempotent() {
        let session = session();

        session.close().unwrap();

        session.close().unwrap();

        assert!(session.transport().is_closed());

        assert!(matches!(session.power_on(0), Err(Error::Closed)));

        assert!(matches!(session.loopback(0), Err(Error::Closed)));
    }

    #[test]
    fn local_name_too_long() {
        let session = session();

        assert!(matches!(
            session.set_local_name(0, "a name that is longer than thirty bytes"),
            Err(Error::InvalidParameter(_))
        ));

        assert!(session.transport().sent().is_empty());

        session.set_local_name(0, "btled").unwrap();
    }
}
