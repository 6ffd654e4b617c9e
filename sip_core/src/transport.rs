use std::io::ErrorKind;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};

use crate::{Result, SipError, SipMessage};

/// Datagram channel the call flows run on. Implementations do not retry.
pub trait Transport {
    fn open(&mut self) -> Result<()>;
    fn close(&mut self);
    fn send(&mut self, data: &[u8]) -> Result<()>;
    /// Waits at most `timeout` for one datagram of up to `max_bytes`.
    fn receive(&mut self, max_bytes: usize, timeout: Duration) -> Result<Vec<u8>>;
    fn is_open(&self) -> bool;
}

/// Creates (closed) transports towards a remote endpoint.
pub trait Connect {
    type Transport: Transport;

    fn connect(&self, host: &str, port: u16) -> Self::Transport;
}

#[derive(Debug)]
pub struct UdpTransport {
    host: String,
    port: u16,
    local: SocketAddr,
    remote: Option<SocketAddr>,
    socket: Option<UdpSocket>,
}

impl UdpTransport {
    pub fn new(host: impl Into<String>, port: u16, local: SocketAddr) -> Self {
        Self {
            host: host.into(),
            port,
            local,
            remote: None,
            socket: None,
        }
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }

    fn socket(&self) -> Result<&UdpSocket> {
        self.socket.as_ref().ok_or(SipError::TransportClosed)
    }
}

impl Transport for UdpTransport {
    fn open(&mut self) -> Result<()> {
        if self.socket.is_some() {
            return Ok(());
        }
        info!("opening connection to {}:{}", self.host, self.port);

        let remote = (self.host.as_str(), self.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                std::io::Error::new(ErrorKind::NotFound, format!("cannot resolve {}", self.host))
            })?;
        let socket = UdpSocket::bind(self.local)?;

        self.remote = Some(remote);
        self.socket = Some(socket);
        Ok(())
    }

    fn close(&mut self) {
        if self.socket.take().is_some() {
            debug!("closing socket to {}:{}", self.host, self.port);
        }
    }

    fn send(&mut self, data: &[u8]) -> Result<()> {
        let socket = self.socket()?;
        let remote = self.remote.ok_or(SipError::TransportClosed)?;
        debug!("sending {} bytes to {}", data.len(), remote);
        socket.send_to(data, remote)?;
        Ok(())
    }

    fn receive(&mut self, max_bytes: usize, timeout: Duration) -> Result<Vec<u8>> {
        let socket = self.socket()?;
        socket.set_read_timeout(Some(timeout.max(Duration::from_millis(1))))?;

        let mut buf = vec![0u8; max_bytes];
        match socket.recv(&mut buf) {
            Ok(len) => {
                buf.truncate(len);
                debug!("received {} bytes", len);
                Ok(buf)
            }
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                debug!("receive timeout after {:?}", timeout);
                Err(SipError::ReceiveTimeout)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn is_open(&self) -> bool {
        self.socket.is_some()
    }
}

/// Opens one UDP socket per remote endpoint on an ephemeral local port.
#[derive(Debug, Clone)]
pub struct UdpConnector {
    local_ip: std::net::IpAddr,
}

impl UdpConnector {
    pub fn new(local_ip: std::net::IpAddr) -> Self {
        Self { local_ip }
    }
}

impl Connect for UdpConnector {
    type Transport = UdpTransport;

    fn connect(&self, host: &str, port: u16) -> UdpTransport {
        UdpTransport::new(host, port, SocketAddr::new(self.local_ip, 0))
    }
}

/// A transport several threads can use; every operation holds the lock, so
/// at most one receive is outstanding on the socket.
#[derive(Debug)]
pub struct SharedTransport<T>(Arc<Mutex<T>>);

impl<T> SharedTransport<T> {
    pub fn new(transport: T) -> Self {
        Self(Arc::new(Mutex::new(transport)))
    }

    fn lock(&self) -> Result<MutexGuard<'_, T>> {
        self.0.lock().map_err(|_| SipError::TransportClosed)
    }
}

impl<T> Clone for SharedTransport<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T: Transport> Transport for SharedTransport<T> {
    fn open(&mut self) -> Result<()> {
        self.lock()?.open()
    }

    fn close(&mut self) {
        if let Ok(mut inner) = self.lock() {
            inner.close();
        }
    }

    fn send(&mut self, data: &[u8]) -> Result<()> {
        self.lock()?.send(data)
    }

    fn receive(&mut self, max_bytes: usize, timeout: Duration) -> Result<Vec<u8>> {
        self.lock()?.receive(max_bytes, timeout)
    }

    fn is_open(&self) -> bool {
        self.lock().map(|inner| inner.is_open()).unwrap_or(false)
    }
}

/// Background receive loop started by [`spawn_listener`].
pub struct Listener {
    running: Arc<AtomicBool>,
    handle: thread::JoinHandle<Result<()>>,
}

impl Listener {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Asks the loop to stop and returns how it ended.
    pub fn stop(self) -> Result<()> {
        self.running.store(false, Ordering::Release);
        self.handle
            .join()
            .map_err(|_| SipError::ListenerPanicked)?
    }
}

/// Hands every parsed datagram to `handler` until stopped.
///
/// Malformed datagrams and receive timeouts are skipped. Any other error ends
/// the loop and is returned from [`Listener::stop`].
pub fn spawn_listener<T, F>(
    transport: SharedTransport<T>,
    max_bytes: usize,
    poll: Duration,
    mut handler: F,
) -> Result<Listener>
where
    T: Transport + Send + 'static,
    F: FnMut(SipMessage) + Send + 'static,
{
    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    let mut transport = transport;

    let handle = thread::Builder::new()
        .name("sip-listener".into())
        .spawn(move || {
            while flag.load(Ordering::Acquire) {
                let received = transport
                    .receive(max_bytes, poll)
                    .and_then(|data| SipMessage::parse(&data));
                match received {
                    Ok(msg) => handler(msg),
                    Err(e) if e.is_transient() => {
                        if !matches!(e, SipError::ReceiveTimeout) {
                            debug!("listener dropped datagram: {e}");
                        }
                    }
                    Err(e) => {
                        warn!("listener stopping: {e}");
                        return Err(e);
                    }
                }
            }
            Ok(())
        })?;

    Ok(Listener { running, handle })
}
