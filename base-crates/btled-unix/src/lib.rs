//! Unix socket transport to the btled daemon
//!
//! The daemon listens on a filesystem addressed Unix stream socket. Immediately after accepting
//! a connection it sends the MTU, two bytes with the high byte first. From then on every frame in
//! either direction is exactly one MTU long.
//!
//! Frames from the daemon are received by a thread spawned by [`UnixSocket::start`]. The thread
//! polls the socket so that it notices when the socket is closed.

use btled::transport::{join_bounded, pad_frame, CloseDelegate, FrameAssembler, FrameDelegate, Transport};
use btled::{Config, Error, Result};
use std::io::{self, Read, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

fn negotiate_mtu(stream: &mut UnixStream, timeout: Duration) -> Result<Option<usize>> {
    // a zero timeout is rejected by `set_read_timeout`
    stream.set_read_timeout(Some(timeout.max(Duration::from_millis(1))))?;

    let mut raw = [0u8; 2];

    let mtu = match stream.read_exact(&mut raw) {
        Ok(()) => Some(<u16>::from_be_bytes(raw) as usize),
        Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => None,
        Err(e) => return Err(e.into()),
    };

    stream.set_read_timeout(None)?;

    Ok(mtu)
}

/// Thread receiving frames from the daemon
struct ReceiveThread {
    stream: UnixStream,
    running: Arc<AtomicBool>,
    assembler: FrameAssembler,
    delegate: FrameDelegate,
    on_close: CloseDelegate,
    poll_interval: Duration,
}

impl ReceiveThread {
    fn spawn(self) -> io::Result<JoinHandle<()>> {
        std::thread::Builder::new()
            .name("btled-receive".into())
            .spawn(move || self.task())
    }

    /// Ignores the Unix error EINTR
    fn ignore_eintr<F, R>(mut func: F) -> nix::Result<R>
    where
        F: FnMut() -> nix::Result<R>,
    {
        loop {
            match func() {
                Err(nix::errno::Errno::EINTR) => continue,
                result => break result,
            }
        }
    }

    /// Wait until the socket is readable
    ///
    /// Returns false if the poll interval elapsed first.
    fn wait_readable(&self) -> nix::Result<bool> {
        use nix::poll::{poll, PollFd, PollFlags};

        let timeout = self.poll_interval.as_millis().try_into().unwrap_or(i32::MAX);

        Self::ignore_eintr(|| {
            let mut fds = [PollFd::new(&self.stream, PollFlags::POLLIN)];

            poll(&mut fds, timeout)
        })
        .map(|count| count > 0)
    }

    fn task(mut self) {
        // reads are at most one MTU
        let mut buffer = vec![0u8; self.assembler.mtu()];

        let fault = loop {
            if !self.running.load(Ordering::SeqCst) {
                break None;
            }

            match self.wait_readable() {
                Ok(true) => (),
                Ok(false) => continue,
                Err(e) => break Some(io::Error::from(e)),
            }

            let len = match self.stream.read(&mut buffer) {
                Ok(0) => break Some(io::Error::new(io::ErrorKind::UnexpectedEof, "daemon closed the connection")),
                Ok(len) => len,
                Err(e) if matches!(e.kind(), io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock) => continue,
                Err(e) => break Some(e),
            };

            log::trace!("read {} bytes, {} pending", len, self.assembler.pending());

            let delegate = &mut self.delegate;

            self.assembler.push(&buffer[..len], |frame| delegate(frame));
        };

        // false when the socket was closed locally
        let running = self.running.swap(false, Ordering::SeqCst);

        match fault {
            Some(e) if running => {
                log::info!("receive thread stopped: {}", e);

                (self.on_close)(e)
            }
            _ => log::debug!("receive thread exiting"),
        }
    }
}

/// A connection to the daemon over its Unix socket
pub struct UnixSocket {
    stream: UnixStream,
    mtu: Option<usize>,
    write_lock: Mutex<()>,
    running: Arc<AtomicBool>,
    receiver: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
    poll_interval: Duration,
    join_timeout: Duration,
}

impl UnixSocket {
    /// Connect to the daemon at the socket path of `config`
    ///
    /// This waits up to the MTU timeout of `config` for the daemon to send the MTU. If it never
    /// arrives the socket is still returned, but every send fails with [`Error::NotReady`].
    pub fn connect(config: &Config) -> Result<Self> {
        Self::connect_path(&config.socket_path, config)
    }

    /// Connect to the daemon at `path`, ignoring the socket path of `config`
    pub fn connect_path<P: AsRef<Path>>(path: P, config: &Config) -> Result<Self> {
        let path = path.as_ref();

        let mut stream = UnixStream::connect(path).map_err(|e| {
            log::error!("failed to connect to {}: {}", path.display(), e);
            e
        })?;

        let mtu = negotiate_mtu(&mut stream, config.mtu_timeout)?;

        match mtu {
            Some(mtu) => log::info!("connected to {} with MTU {}", path.display(), mtu),
            None => log::warn!("connected to {} but the daemon did not send the MTU", path.display()),
        }

        Ok(UnixSocket {
            stream,
            mtu,
            write_lock: Mutex::new(()),
            running: Arc::new(AtomicBool::new(false)),
            receiver: Mutex::new(None),
            closed: AtomicBool::new(false),
            poll_interval: config.poll_interval,
            join_timeout: config.join_timeout,
        })
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Transport for UnixSocket {
    fn mtu(&self) -> Option<usize> {
        self.mtu
    }

    fn send(&self, frame: &[u8]) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Closed);
        }

        let padded = pad_frame(self.mtu, frame)?;

        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut written = 0;

        while written < padded.len() {
            match (&self.stream).write(&padded[written..]) {
                Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero).into()),
                Ok(len) => written += len,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(())
    }

    fn start(&self, delegate: FrameDelegate, on_close: CloseDelegate) -> Result<()> {
        let mtu = self.mtu.ok_or(Error::NotReady)?;

        let mut receiver = self.receiver.lock().unwrap_or_else(PoisonError::into_inner);

        if self.is_closed() {
            return Err(Error::Closed);
        }

        if receiver.is_some() {
            return Err(io::Error::new(io::ErrorKind::AlreadyExists, "receive thread already started").into());
        }

        self.running.store(true, Ordering::SeqCst);

        let thread = ReceiveThread {
            stream: self.stream.try_clone()?,
            running: self.running.clone(),
            assembler: FrameAssembler::new(mtu),
            delegate,
            on_close,
            poll_interval: self.poll_interval,
        };

        *receiver = Some(thread.spawn()?);

        Ok(())
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.running.store(false, Ordering::SeqCst);

        if let Err(e) = self.stream.shutdown(Shutdown::Both) {
            if e.kind() != io::ErrorKind::NotConnected {
                log::warn!("failed to shut down the daemon socket: {}", e);
            }
        }

        let receiver = self.receiver.lock().unwrap_or_else(PoisonError::into_inner).take();

        if let Some(receiver) = receiver {
            join_bounded(receiver, self.join_timeout, "receive");
        }

        log::debug!("daemon socket closed");

        Ok(())
    }
}

impl Drop for UnixSocket {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("failed to close the daemon socket: {}", e)
        }
    }
}
