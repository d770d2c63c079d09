//! Framing of messages exchanged with the daemon
//!
//! Every frame starts with a two byte header, the message type followed by the length of the
//! content. The rest of the frame after the content is padding added by the transport.
//!
//! ```text
//! byte 0: message type
//! byte 1: content length N
//! bytes 2..2+N: content
//! ```
//!
//! Responses are put into a queue that command callers wait on. Events are handed to the event
//! handler given to [`Ipc::start`]. The handler runs on the transport's receive thread, so it
//! must not block; the session uses it to forward events to its own dispatcher thread.
//!
//! When the transport loses the connection every waiting caller is woken with
//! [`Error::Connection`], and so is every later send or wait.

use crate::error::{Error, Result};
use crate::transport::Transport;
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};

/// Length of the frame header
pub const HEADER_LEN: usize = 2;

/// Maximum length of the content of one frame
pub const MAX_CONTENT_LEN: usize = 254;

/// The type of a framed message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Request,
    Response,
    Event,
    Info,
    Loopback,
}

impl TryFrom<u8> for MessageType {
    type Error = ();

    fn try_from(val: u8) -> std::result::Result<Self, ()> {
        match val {
            0 => Ok(MessageType::Request),
            1 => Ok(MessageType::Response),
            2 => Ok(MessageType::Event),
            3 => Ok(MessageType::Info),
            4 => Ok(MessageType::Loopback),
            _ => Err(()),
        }
    }
}

impl From<MessageType> for u8 {
    fn from(kind: MessageType) -> u8 {
        match kind {
            MessageType::Request => 0,
            MessageType::Response => 1,
            MessageType::Event => 2,
            MessageType::Info => 3,
            MessageType::Loopback => 4,
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            MessageType::Request => f.write_str("request"),
            MessageType::Response => f.write_str("response"),
            MessageType::Event => f.write_str("event"),
            MessageType::Info => f.write_str("info"),
            MessageType::Loopback => f.write_str("loopback"),
        }
    }
}

/// A decoded frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageType,
    pub content: Vec<u8>,
}

/// The reason a frame could not be decoded into a [`Message`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    TooShort,
    UnknownType(u8),
    BadLength { declared: usize, available: usize },
}

impl std::fmt::Display for FrameError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            FrameError::TooShort => f.write_str("frame is shorter than its header"),
            FrameError::UnknownType(t) => write!(f, "unknown message type {t}"),
            FrameError::BadLength { declared, available } => write!(
                f,
                "declared content length {declared} exceeds the {available} bytes in the frame"
            ),
        }
    }
}

impl Message {
    pub fn new(kind: MessageType, content: Vec<u8>) -> Self {
        Message { kind, content }
    }

    /// Encode the message without padding
    pub fn encode(&self) -> Vec<u8> {
        let mut frame = Vec::with_capacity(HEADER_LEN + self.content.len());

        frame.push(self.kind.into());

        frame.push(self.content.len() as u8);

        frame.extend_from_slice(&self.content);

        frame
    }

    /// Decode a message from a (possibly padded) frame
    pub fn decode(frame: &[u8]) -> std::result::Result<Self, FrameError> {
        if frame.len() < HEADER_LEN {
            return Err(FrameError::TooShort);
        }

        let kind = MessageType::try_from(frame[0]).map_err(|_| FrameError::UnknownType(frame[0]))?;

        let declared = frame[1] as usize;

        let content = frame[HEADER_LEN..]
            .get(..declared)
            .ok_or(FrameError::BadLength {
                declared,
                available: frame.len() - HEADER_LEN,
            })?
            .to_vec();

        Ok(Message { kind, content })
    }
}

#[derive(Default)]
struct ResponseQueue {
    queue: VecDeque<Vec<u8>>,
    closed: bool,
    /// Why the connection was lost
    lost: Option<(io::ErrorKind, String)>,
}

impl ResponseQueue {
    /// The error for a caller of a queue that no longer receives responses
    fn fault(&self) -> Option<Error> {
        match &self.lost {
            Some((kind, reason)) => Some(io::Error::new(*kind, reason.clone()).into()),
            None if self.closed => Some(Error::Closed),
            None => None,
        }
    }
}

/// State shared between the receive thread and command callers
#[derive(Default)]
struct Inbound {
    responses: Mutex<ResponseQueue>,
    ready: Condvar,
}

impl Inbound {
    fn lock(&self) -> MutexGuard<'_, ResponseQueue> {
        // a panicking event handler cannot leave the queue half updated
        self.responses.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn push_response(&self, content: Vec<u8>) {
        let mut responses = self.lock();

        responses.queue.push_back(content);

        log::debug!("response queued, {} pending", responses.queue.len());

        self.ready.notify_all();
    }

    fn connection_lost(&self, error: io::Error) {
        log::error!("connection to the daemon lost: {}", error);

        let mut responses = self.lock();

        responses.closed = true;

        responses.lost = Some((error.kind(), error.to_string()));

        self.ready.notify_all();
    }
}

/// The framing layer
pub struct Ipc<T> {
    transport: Arc<T>,
    inbound: Arc<Inbound>,
    loopback: bool,
}

impl<T: Transport> Ipc<T> {
    /// Create a new framing layer on top of `transport`
    ///
    /// If `loopback` is true, received loopback self-test frames are answered.
    pub fn new(transport: T, loopback: bool) -> Self {
        Ipc {
            transport: Arc::new(transport),
            inbound: Arc::default(),
            loopback,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Start receiving frames
    ///
    /// `on_event` is called with the content of every event in the order the events were
    /// received.
    pub fn start<F>(&self, mut on_event: F) -> Result<()>
    where
        F: FnMut(Vec<u8>) + Send + 'static,
    {
        let inbound = self.inbound.clone();

        let lost = self.inbound.clone();

        let echo: Option<Weak<T>> = self.loopback.then(|| Arc::downgrade(&self.transport));

        self.transport.start(
            Box::new(move |frame| receive(frame, &inbound, echo.as_ref(), &mut on_event)),
            Box::new(move |error| lost.connection_lost(error)),
        )
    }

    /// Send a request
    ///
    /// The request header is prepended to `payload`.
    pub fn send_request(&self, payload: &[u8]) -> Result<()> {
        self.send_message(MessageType::Request, payload)
    }

    /// Send a loopback self-test frame containing `TX(<n>)`
    pub fn send_loopback(&self, n: u32) -> Result<()> {
        self.send_message(MessageType::Loopback, format!("TX({n})").as_bytes())
    }

    fn send_message(&self, kind: MessageType, content: &[u8]) -> Result<()> {
        let mtu = self.transport.mtu().ok_or(Error::NotReady)?;

        if let Some(fault) = self.inbound.lock().fault() {
            return Err(fault);
        }

        if content.len() + HEADER_LEN > mtu || content.len() > MAX_CONTENT_LEN {
            return Err(Error::PayloadTooLarge { len: content.len(), mtu });
        }

        log::trace!("sending {} of {} bytes", kind, content.len());

        self.transport.send(&Message::new(kind, content.to_vec()).encode())
    }

    /// Wait for a response accepted by `matches`
    ///
    /// The oldest queued response that `matches` accepts is removed from the queue and returned.
    /// Responses that are not accepted stay in the queue in the order they were received.
    /// `Ok(None)` is returned if no accepted response arrives before `timeout`. Once the
    /// connection is lost only the responses received before it can still be taken.
    pub fn wait_response<F>(&self, timeout: Duration, matches: F) -> Result<Option<Vec<u8>>>
    where
        F: Fn(&[u8]) -> bool,
    {
        let deadline = Instant::now() + timeout;

        let mut responses = self.inbound.lock();

        loop {
            if responses.closed && responses.lost.is_none() {
                return Err(Error::Closed);
            }

            if let Some(index) = responses.queue.iter().position(|response| matches(response)) {
                if index != 0 {
                    log::debug!("{} unmatched response(s) kept in the queue", index);
                }

                return Ok(responses.queue.remove(index));
            }

            if let Some(fault) = responses.fault() {
                return Err(fault);
            }

            let now = Instant::now();

            if now >= deadline {
                if !responses.queue.is_empty() {
                    log::debug!(
                        "timed out with {} unmatched response(s) in the queue",
                        responses.queue.len()
                    );
                }

                return Ok(None);
            }

            responses = self
                .inbound
                .ready
                .wait_timeout(responses, deadline - now)
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .0;
        }
    }

    /// Number of responses waiting in the queue
    pub fn pending_responses(&self) -> usize {
        self.inbound.lock().queue.len()
    }

    /// Close the framing layer and the transport
    ///
    /// Any caller waiting on a response is woken with [`Error::Closed`].
    pub fn close(&self) -> Result<()> {
        {
            let mut responses = self.inbound.lock();

            responses.closed = true;

            self.inbound.ready.notify_all();
        }

        self.transport.close()
    }
}

/// Classify a received frame
fn receive<T, F>(frame: &[u8], inbound: &Inbound, echo: Option<&Weak<T>>, on_event: &mut F)
where
    T: Transport,
    F: FnMut(Vec<u8>),
{
    let message = match Message::decode(frame) {
        Ok(message) => message,
        Err(e) => {
            log::warn!("dropping frame: {}", e);
            return;
        }
    };

    log::debug!("received {} of {} bytes", message.kind, message.content.len());

    match message.kind {
        MessageType::Response => inbound.push_response(message.content),
        MessageType::Event => on_event(message.content),
        MessageType::Info => log::info!("daemon: {}", String::from_utf8_lossy(&message.content)),
        MessageType::Loopback => match (echo.and_then(Weak::upgrade), loopback_count(&message.content)) {
            (Some(transport), Some(n)) => {
                let reply = Message::new(MessageType::Loopback, format!("TX({})", n.wrapping_add(1)).into_bytes());

                if let Err(e) = transport.send(&reply.encode()) {
                    log::error!("failed to answer loopback frame: {}", e)
                }
            }
            (None, _) => log::debug!("loopback is disabled, frame dropped"),
            (_, None) => log::warn!("malformed loopback frame dropped"),
        },
        MessageType::Request => log::debug!("request received from the daemon, dropped"),
    }
}

/// Parse the counter of a `TX(<n>)` loopback frame
fn loopback_count(content: &[u8]) -> Option<u32> {
    std::str::from_utf8(content)
        .ok()?
        .strip_prefix("TX(")?
        .strip_suffix(')')?
        .parse()
        .ok()
}
