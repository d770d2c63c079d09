//! The transport underneath the framing layer
//!
//! A transport carries fixed size frames between this client and the daemon. Every frame sent
//! or received is exactly one MTU long; the MTU is negotiated once by the transport after it
//! connects. Received frames are handed to a [`FrameDelegate`] from a thread owned by the
//! transport.
//!
//! The Unix socket implementation lives in the `btled-unix` crate.

use crate::error::{Error, Result};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Receiver of frames from the transport
///
/// The delegate is called on the transport's receive thread with exactly one MTU of bytes.
pub type FrameDelegate = Box<dyn FnMut(&[u8]) + Send + 'static>;

/// Receiver of the end of the frame stream
///
/// Called once from the receive thread when it stops because the daemon closed the connection or
/// the socket failed. It is not called when the transport is closed locally.
pub type CloseDelegate = Box<dyn FnOnce(std::io::Error) + Send + 'static>;

/// A framed transport to the daemon
pub trait Transport: Send + Sync + 'static {
    /// Get the negotiated MTU
    ///
    /// `None` is returned if the MTU was never received from the daemon.
    fn mtu(&self) -> Option<usize>;

    /// Send one frame
    ///
    /// The frame is padded with zeros to the MTU before it is sent. This fails with
    /// [`Error::NotReady`] when there is no MTU and with [`Error::FrameTooLarge`] when `frame`
    /// is longer than the MTU. Success is only returned when the full MTU was written.
    fn send(&self, frame: &[u8]) -> Result<()>;

    /// Start delivering received frames to `delegate`
    ///
    /// `on_close` is told why the frames stopped if the connection is lost.
    fn start(&self, delegate: FrameDelegate, on_close: CloseDelegate) -> Result<()>;

    /// Close the transport
    ///
    /// Closing is idempotent.
    fn close(&self) -> Result<()>;
}

/// Pad `frame` with zeros to exactly `mtu` bytes
///
/// This performs the checks required of [`Transport::send`] before any I/O is done.
pub fn pad_frame(mtu: Option<usize>, frame: &[u8]) -> Result<Vec<u8>> {
    let mtu = mtu.ok_or(Error::NotReady)?;

    if frame.len() > mtu {
        return Err(Error::FrameTooLarge { len: frame.len(), mtu });
    }

    let mut padded = Vec::with_capacity(mtu);

    padded.extend_from_slice(frame);

    padded.resize(mtu, 0);

    Ok(padded)
}

/// Reassembly of MTU sized frames from a byte stream
///
/// Reads from a stream socket can return any number of bytes. Bytes are accumulated here until
/// there is at least one MTU, then frames are split off the front. Any bytes past the last
/// complete frame are kept for the next push.
#[derive(Debug)]
pub struct FrameAssembler {
    mtu: usize,
    buffer: Vec<u8>,
}

impl FrameAssembler {
    pub fn new(mtu: usize) -> Self {
        FrameAssembler {
            mtu,
            buffer: Vec::with_capacity(mtu * 2),
        }
    }

    /// Push received bytes, calling `on_frame` for every complete frame
    pub fn push<F>(&mut self, bytes: &[u8], mut on_frame: F)
    where
        F: FnMut(&[u8]),
    {
        self.buffer.extend_from_slice(bytes);

        let mut consumed = 0;

        while self.buffer.len() - consumed >= self.mtu && self.mtu != 0 {
            on_frame(&self.buffer[consumed..consumed + self.mtu]);

            consumed += self.mtu;
        }

        self.buffer.drain(..consumed);
    }

    pub fn mtu(&self) -> usize {
        self.mtu
    }

    /// Number of bytes held for an incomplete frame
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

/// Join a thread, waiting at most `timeout` for it to finish
///
/// A thread that does not finish in time is detached. Returns true if the thread was joined.
/// Calling this from the thread itself detaches it immediately.
pub fn join_bounded(handle: JoinHandle<()>, timeout: Duration, name: &str) -> bool {
    if handle.thread().id() == std::thread::current().id() {
        log::debug!("{} thread closed from within itself, detaching", name);

        return false;
    }

    let deadline = Instant::now() + timeout;

    while !handle.is_finished() {
        if Instant::now() >= deadline {
            log::warn!("{} thread did not exit within {:?}, detaching", name, timeout);

            return false;
        }

        std::thread::sleep(JOIN_POLL_INTERVAL);
    }

    if handle.join().is_err() {
        log::error!("{} thread panicked", name);
    }

    true
}

const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(5);
