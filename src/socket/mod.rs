//! Non-blocking TCP socket with an optional TLS layer.
//!
//! A [`Socket`] is a [`Device`] that resolves a host, connects without
//! blocking and reports its lifecycle through four optional callbacks:
//! connected, disconnected, ready-to-read and ready-to-write. The secure
//! variant ([`Socket::new_secure`]) runs a TLS handshake between the TCP
//! connect and the connected callback, and routes all I/O through the TLS
//! session afterwards.
//!
//! State machine:
//!
//! ```text
//! Unconnected -> Resolving -> Connecting -> [Handshaking] -> Connected -> Disconnected
//! ```
//!
//! Any failure goes straight to `Disconnected`; the reason is kept in
//! [`Socket::last_error`] and the disconnected callback fires exactly once.

mod secure;

use std::cell::{Cell, RefCell};
use std::io;
use std::net::{SocketAddr, SocketAddrV4, ToSocketAddrs};
use std::rc::{Rc, Weak};
use std::sync::Arc;

use log::{debug, trace, warn};
use rustls::ClientConfig;

use crate::device::{Descriptor, Device};
use crate::error_handling::SocketError;
use crate::initialization::tls_client_config;
use crate::reactor::Reactor;

use secure::{HandshakeStatus, TlsRead, TlsSession};

/// Callback slot type. Callbacks are cloned out of their slot before being
/// invoked, so a callback may replace any slot (including its own).
pub type Callback = Rc<dyn Fn()>;

/// Lifecycle state of a [`Socket`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    Unconnected,
    Resolving,
    Connecting,
    Handshaking,
    Connected,
    Disconnected,
}

#[derive(Default)]
struct Callbacks {
    connected: Option<Callback>,
    disconnected: Option<Callback>,
    ready_read: Option<Callback>,
    ready_write: Option<Callback>,
}

enum Transport {
    Plain,
    /// The session is created when the TCP connection is established.
    Secure(Option<TlsSession>),
}

pub struct Socket {
    this: Weak<Socket>,
    reactor: Weak<Reactor>,
    descriptor: Descriptor,
    state: Cell<SocketState>,
    host: RefCell<String>,
    peer: Cell<Option<SocketAddrV4>>,
    callbacks: RefCell<Callbacks>,
    transport: RefCell<Transport>,
    /// `None` uses the shared default from [`tls_client_config`].
    tls_config: Option<Arc<ClientConfig>>,
    close_pending: Cell<bool>,
    write_armed: Cell<bool>,
    last_error: RefCell<Option<SocketError>>,
}

impl Socket {
    /// Creates an unconnected plaintext socket bound to `reactor`.
    pub fn new(reactor: &Rc<Reactor>) -> Rc<Self> {
        Self::with_transport(reactor, Transport::Plain, None)
    }

    /// Creates an unconnected TLS socket bound to `reactor`, verifying peers
    /// against the webpki root set.
    pub fn new_secure(reactor: &Rc<Reactor>) -> Rc<Self> {
        Self::with_transport(reactor, Transport::Secure(None), None)
    }

    /// Creates an unconnected TLS socket that uses `config` for its sessions.
    pub fn new_secure_with_config(reactor: &Rc<Reactor>, config: Arc<ClientConfig>) -> Rc<Self> {
        Self::with_transport(reactor, Transport::Secure(None), Some(config))
    }

    fn with_transport(
        reactor: &Rc<Reactor>,
        transport: Transport,
        tls_config: Option<Arc<ClientConfig>>,
    ) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            this: this.clone(),
            reactor: Rc::downgrade(reactor),
            descriptor: Descriptor::new(),
            state: Cell::new(SocketState::Unconnected),
            host: RefCell::new(String::new()),
            peer: Cell::new(None),
            callbacks: RefCell::new(Callbacks::default()),
            transport: RefCell::new(transport),
            tls_config,
            close_pending: Cell::new(false),
            write_armed: Cell::new(false),
            last_error: RefCell::new(None),
        })
    }

    pub fn set_on_connected(&self, callback: impl Fn() + 'static) {
        self.callbacks.borrow_mut().connected = Some(Rc::new(callback));
    }

    pub fn set_on_disconnected(&self, callback: impl Fn() + 'static) {
        self.callbacks.borrow_mut().disconnected = Some(Rc::new(callback));
    }

    pub fn set_on_ready_read(&self, callback: impl Fn() + 'static) {
        self.callbacks.borrow_mut().ready_read = Some(Rc::new(callback));
    }

    pub fn set_on_ready_write(&self, callback: impl Fn() + 'static) {
        self.callbacks.borrow_mut().ready_write = Some(Rc::new(callback));
    }

    /// Drops every callback. Used by owners tearing the socket down.
    pub fn clear_callbacks(&self) {
        *self.callbacks.borrow_mut() = Callbacks::default();
    }

    pub fn state(&self) -> SocketState {
        self.state.get()
    }

    pub fn is_secure(&self) -> bool {
        matches!(*self.transport.borrow(), Transport::Secure(_))
    }

    /// Host passed to the last [`Socket::connect`].
    pub fn remote_host(&self) -> String {
        self.host.borrow().clone()
    }

    /// Resolved peer address, once resolution succeeded.
    pub fn peer_addr(&self) -> Option<SocketAddrV4> {
        self.peer.get()
    }

    /// Reason for the last transition to `Disconnected`, if it was a failure.
    pub fn last_error(&self) -> Option<SocketError> {
        self.last_error.borrow().clone()
    }

    /// Starts connecting to `host:port`.
    ///
    /// Resolution is synchronous and uses the first IPv4 address only. The
    /// descriptor is registered with the reactor before the OS connect is
    /// issued, so completion is observed as write readiness. Failures are
    /// reported by running the disconnected callback before this returns.
    pub fn connect(&self, host: &str, port: u16) {
        if self.descriptor.is_open() {
            warn!("connect() on a socket that is already open; disconnecting first");
            self.disconnect();
        }
        *self.host.borrow_mut() = host.to_string();
        *self.last_error.borrow_mut() = None;
        self.close_pending.set(false);
        if let Transport::Secure(session) = &mut *self.transport.borrow_mut() {
            *session = None;
        }

        self.state.set(SocketState::Resolving);
        let addr = match resolve_ipv4(host, port) {
            Ok(addr) => addr,
            Err(e) => {
                warn!("{e}");
                self.fail(e);
                return;
            }
        };
        self.peer.set(Some(addr));
        debug!("{host} resolved to {addr}");

        if let Err(e) = self.open_descriptor() {
            self.fail(e);
            return;
        }

        self.state.set(SocketState::Connecting);
        let sockaddr = sockaddr_in(&addr);
        // SAFETY: `sockaddr` is a valid `sockaddr_in` that outlives the call.
        let rc = unsafe {
            libc::connect(
                self.fd(),
                &sockaddr as *const libc::sockaddr_in as *const libc::sockaddr,
                std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
            )
        };
        if rc == 0 {
            self.on_tcp_connected();
            return;
        }
        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EINPROGRESS) {
            trace!("connect to {addr} in progress");
            return;
        }
        self.fail(SocketError::Connect {
            addr: addr.to_string(),
            reason: err.to_string(),
        });
    }

    fn open_descriptor(&self) -> Result<(), SocketError> {
        // SAFETY: plain syscall, the result is checked below.
        let fd = unsafe {
            libc::socket(
                libc::AF_INET,
                libc::SOCK_STREAM | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
                libc::IPPROTO_TCP,
            )
        };
        if fd < 0 {
            return Err(SocketError::Create(io::Error::last_os_error().to_string()));
        }
        self.descriptor.adopt(fd);

        let reactor = self.reactor()?;
        let device: Rc<dyn Device> = self
            .this
            .upgrade()
            .ok_or_else(|| SocketError::Register("socket is being dropped".to_string()))?;
        reactor
            .add_device(device)
            .map_err(|e| SocketError::Register(e.to_string()))?;
        self.write_armed.set(true);
        Ok(())
    }

    /// Unregisters from the reactor and closes the descriptor. Idempotent;
    /// does not run the disconnected callback.
    pub fn disconnect(&self) {
        if self.descriptor.is_open() {
            if let Transport::Secure(Some(session)) = &mut *self.transport.borrow_mut() {
                if self.state.get() == SocketState::Connected {
                    session.close(&self.descriptor);
                }
            }
            if let Some(reactor) = self.reactor.upgrade() {
                reactor.remove_device(self);
            }
            self.descriptor.close();
            trace!("disconnected from {}", self.host.borrow());
        }
        self.write_armed.set(false);
        if self.state.get() != SocketState::Unconnected {
            self.state.set(SocketState::Disconnected);
        }
    }

    /// Disconnects and runs the disconnected callback, once per connection.
    fn on_disconnect(&self) {
        if self.state.get() == SocketState::Disconnected {
            return;
        }
        self.disconnect();
        self.state.set(SocketState::Disconnected);
        let callback = self.callbacks.borrow().disconnected.clone();
        if let Some(callback) = callback {
            callback();
        }
    }

    fn fail(&self, error: SocketError) {
        debug!("socket to {} failed: {error}", self.host.borrow());
        *self.last_error.borrow_mut() = Some(error);
        self.on_disconnect();
    }

    fn on_tcp_connected(&self) {
        trace!("tcp connection to {} established", self.host.borrow());
        let is_secure = self.is_secure();
        if !is_secure {
            self.on_connected();
            return;
        }
        let host = self.host.borrow().clone();
        let config = match &self.tls_config {
            Some(config) => Ok(Arc::clone(config)),
            None => tls_client_config().map_err(|e| SocketError::TlsSetup(e.to_string())),
        };
        match config.and_then(|config| TlsSession::new(&host, config)) {
            Ok(session) => {
                *self.transport.borrow_mut() = Transport::Secure(Some(session));
                self.state.set(SocketState::Handshaking);
                self.drive_handshake();
            }
            Err(e) => self.fail(e),
        }
    }

    fn drive_handshake(&self) {
        let status = match &mut *self.transport.borrow_mut() {
            Transport::Secure(Some(session)) => session.handshake(&self.descriptor),
            _ => return,
        };
        match status {
            Ok(HandshakeStatus::Done) => {
                debug!("TLS handshake with {} complete", self.host.borrow());
                self.on_connected();
            }
            Ok(HandshakeStatus::InProgress { wants_write }) => self.arm_write(wants_write),
            Err(e) => self.fail(e),
        }
    }

    /// The transport is ready for application data.
    fn on_connected(&self) {
        self.state.set(SocketState::Connected);
        self.arm_write(false);
        let callback = self.callbacks.borrow().connected.clone();
        if let Some(callback) = callback {
            callback();
        }
    }

    fn check_connect_result(&self) {
        match so_error(self.fd()) {
            Ok(()) => self.on_tcp_connected(),
            Err(err) => {
                let addr = self
                    .peer
                    .get()
                    .map(|a| a.to_string())
                    .unwrap_or_else(|| self.host.borrow().clone());
                self.fail(SocketError::Connect {
                    addr,
                    reason: err.to_string(),
                });
            }
        }
    }

    fn arm_write(&self, enabled: bool) {
        if self.write_armed.get() == enabled {
            return;
        }
        if let Some(reactor) = self.reactor.upgrade() {
            reactor.set_write_interest(self, enabled);
        }
        self.write_armed.set(enabled);
    }

    fn reactor(&self) -> Result<Rc<Reactor>, SocketError> {
        self.reactor
            .upgrade()
            .ok_or_else(|| SocketError::Register("reactor is gone".to_string()))
    }

    fn fd(&self) -> libc::c_int {
        self.descriptor.raw().unwrap_or(-1)
    }

    /// Runs `on_disconnect` if end of stream was seen during the last read.
    fn finish_pending_close(&self) {
        if self.close_pending.replace(false) {
            if self.last_error.borrow().is_none() {
                *self.last_error.borrow_mut() = Some(SocketError::PeerClosed);
            }
            self.on_disconnect();
        }
    }

    fn has_buffered_plaintext(&self) -> bool {
        match &mut *self.transport.borrow_mut() {
            Transport::Secure(Some(session)) => session.has_buffered_plaintext(),
            _ => false,
        }
    }

    fn read_plain(&self, max_size: usize) -> Vec<u8> {
        let mut buf = vec![0u8; max_size];
        match self.descriptor.read_into(&mut buf) {
            Ok(0) => {
                trace!("peer {} closed the connection", self.host.borrow());
                self.close_pending.set(true);
                Vec::new()
            }
            Ok(n) => {
                buf.truncate(n);
                buf
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Vec::new(),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Vec::new(),
            Err(e) => {
                debug!("read from {} failed: {e}", self.host.borrow());
                *self.last_error.borrow_mut() = Some(SocketError::Io(e.to_string()));
                self.close_pending.set(true);
                Vec::new()
            }
        }
    }
}

impl Device for Socket {
    fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    /// Reads at most `max_size` application bytes; empty means nothing is
    /// available right now. End of stream and hard errors schedule the
    /// disconnect, which runs once the current read callback returns.
    fn read(&self, max_size: usize) -> Vec<u8> {
        if max_size == 0 || self.state.get() != SocketState::Connected {
            return Vec::new();
        }
        let result = match &mut *self.transport.borrow_mut() {
            Transport::Plain => Ok(TlsRead::Data(self.read_plain(max_size))),
            Transport::Secure(Some(session)) => session.read(&self.descriptor, max_size),
            Transport::Secure(None) => Ok(TlsRead::Data(Vec::new())),
        };
        match result {
            Ok(TlsRead::Data(data)) => data,
            Ok(TlsRead::Closed) => {
                trace!("TLS peer {} closed the connection", self.host.borrow());
                self.close_pending.set(true);
                Vec::new()
            }
            Err(e) => {
                debug!("read from {} failed: {e}", self.host.borrow());
                *self.last_error.borrow_mut() = Some(e);
                self.close_pending.set(true);
                Vec::new()
            }
        }
    }

    /// Writes as much of `data` as the transport accepts now. `Ok(0)` means
    /// "retry on the next ready-write"; write interest is armed for that.
    fn write(&self, data: &[u8]) -> io::Result<usize> {
        if self.state.get() != SocketState::Connected {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "socket is not connected",
            ));
        }
        let result = match &mut *self.transport.borrow_mut() {
            Transport::Plain => match self.descriptor.write(data) {
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
                other => other,
            },
            Transport::Secure(Some(session)) => session.write(&self.descriptor, data),
            Transport::Secure(None) => Ok(0),
        };
        match &result {
            Ok(n) if *n < data.len() || self.tls_backlog() => self.arm_write(true),
            Ok(_) => {}
            Err(e) => debug!("write to {} failed: {e}", self.host.borrow()),
        }
        result
    }

    fn on_ready_read(&self) {
        match self.state.get() {
            SocketState::Handshaking => self.drive_handshake(),
            SocketState::Connected => {
                loop {
                    let callback = self.callbacks.borrow().ready_read.clone();
                    let Some(callback) = callback else {
                        break;
                    };
                    callback();
                    if self.state.get() != SocketState::Connected
                        || self.close_pending.get()
                        || !self.has_buffered_plaintext()
                    {
                        break;
                    }
                }
                self.finish_pending_close();
            }
            _ => {}
        }
    }

    fn on_ready_write(&self) {
        match self.state.get() {
            SocketState::Connecting => self.check_connect_result(),
            SocketState::Handshaking => self.drive_handshake(),
            SocketState::Connected => {
                let flushed = match &mut *self.transport.borrow_mut() {
                    Transport::Secure(Some(session)) => session.flush(&self.descriptor),
                    _ => Ok(true),
                };
                match flushed {
                    Ok(true) => {
                        self.arm_write(false);
                        let callback = self.callbacks.borrow().ready_write.clone();
                        if let Some(callback) = callback {
                            callback();
                        }
                    }
                    Ok(false) => {}
                    Err(e) => self.fail(SocketError::Io(e.to_string())),
                }
            }
            _ => {}
        }
    }

    fn on_hangup(&self, readable: bool) -> bool {
        match self.state.get() {
            SocketState::Unconnected | SocketState::Disconnected => {}
            SocketState::Connected if readable && self.callbacks.borrow().ready_read.is_some() => {
                // Drain what is still buffered; the read that hits end of
                // stream schedules the disconnect.
                self.on_ready_read();
            }
            state => {
                let reason = match so_error(self.fd()) {
                    Err(e) => e.to_string(),
                    Ok(()) => "connection closed by peer".to_string(),
                };
                let error = match state {
                    SocketState::Connecting => SocketError::Connect {
                        addr: self
                            .peer
                            .get()
                            .map(|a| a.to_string())
                            .unwrap_or_else(|| self.host.borrow().clone()),
                        reason,
                    },
                    SocketState::Handshaking => SocketError::Tls(reason),
                    _ => SocketError::PeerClosed,
                };
                self.fail(error);
            }
        }
        true
    }
}

impl Socket {
    fn tls_backlog(&self) -> bool {
        match &*self.transport.borrow() {
            Transport::Secure(Some(session)) => session.wants_write(),
            _ => false,
        }
    }
}

/// Resolves `host` and returns its first IPv4 address.
fn resolve_ipv4(host: &str, port: u16) -> Result<SocketAddrV4, SocketError> {
    let addrs = (host, port)
        .to_socket_addrs()
        .map_err(|e| SocketError::Resolve(format!("{host}: {e}")))?;
    addrs
        .into_iter()
        .find_map(|addr| match addr {
            SocketAddr::V4(v4) => Some(v4),
            SocketAddr::V6(_) => None,
        })
        .ok_or_else(|| SocketError::Resolve(format!("{host}: no IPv4 address")))
}

fn sockaddr_in(addr: &SocketAddrV4) -> libc::sockaddr_in {
    libc::sockaddr_in {
        sin_family: libc::AF_INET as libc::sa_family_t,
        sin_port: addr.port().to_be(),
        sin_addr: libc::in_addr {
            s_addr: u32::from_ne_bytes(addr.ip().octets()),
        },
        sin_zero: [0; 8],
    }
}

/// Pending error of a socket (`SO_ERROR`), as set by an async connect.
fn so_error(fd: libc::c_int) -> io::Result<()> {
    let mut err: libc::c_int = 0;
    let mut len = std::mem::size_of::<libc::c_int>() as libc::socklen_t;
    // SAFETY: `err` and `len` are valid for the duration of the call.
    let rc = unsafe {
        libc::getsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_ERROR,
            &mut err as *mut libc::c_int as *mut libc::c_void,
            &mut len,
        )
    };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    if err != 0 {
        return Err(io::Error::from_raw_os_error(err));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;

    fn listener() -> (TcpListener, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    #[test]
    fn test_sockaddr_in_uses_network_byte_order() {
        let addr: SocketAddrV4 = "127.0.0.1:8080".parse().unwrap();
        let raw = sockaddr_in(&addr);
        assert_eq!(u16::from_be(raw.sin_port), 8080);
        assert_eq!(raw.sin_addr.s_addr.to_ne_bytes(), [127, 0, 0, 1]);
    }

    #[test]
    fn test_resolve_ipv4_literal() {
        let addr = resolve_ipv4("127.0.0.1", 80).unwrap();
        assert_eq!(addr, "127.0.0.1:80".parse().unwrap());
    }

    #[test]
    fn test_resolution_failure_runs_disconnected_callback() {
        let reactor = Reactor::factory("epoll").unwrap();
        let socket = Socket::new(&reactor);
        let calls = Rc::new(Cell::new(0));
        let seen = Rc::clone(&calls);
        socket.set_on_disconnected(move || seen.set(seen.get() + 1));

        socket.connect("host.invalid", 80);

        assert_eq!(calls.get(), 1);
        assert_eq!(socket.state(), SocketState::Disconnected);
        assert!(matches!(socket.last_error(), Some(SocketError::Resolve(_))));
        assert_eq!(reactor.device_count(), 0);
    }

    #[test]
    fn test_connect_write_and_read_over_loopback() {
        let (listener, port) = listener();
        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 4];
            stream.read_exact(&mut buf).unwrap();
            stream.write_all(b"pong").unwrap();
            buf
        });

        let reactor = Reactor::factory("epoll").unwrap();
        let socket = Socket::new(&reactor);
        let received = Rc::new(RefCell::new(Vec::new()));
        let disconnected = Rc::new(Cell::new(false));

        let weak = Rc::downgrade(&socket);
        socket.set_on_connected(move || {
            if let Some(socket) = weak.upgrade() {
                assert_eq!(socket.write(b"ping").unwrap(), 4);
            }
        });
        let weak = Rc::downgrade(&socket);
        let sink = Rc::clone(&received);
        socket.set_on_ready_read(move || {
            if let Some(socket) = weak.upgrade() {
                sink.borrow_mut().extend(socket.read(16));
            }
        });
        let flag = Rc::clone(&disconnected);
        let weak_reactor = Rc::downgrade(&reactor);
        socket.set_on_disconnected(move || {
            flag.set(true);
            if let Some(reactor) = weak_reactor.upgrade() {
                reactor.stop();
            }
        });

        socket.connect("127.0.0.1", port);
        assert_eq!(
            socket.peer_addr(),
            Some(SocketAddrV4::new(std::net::Ipv4Addr::LOCALHOST, port))
        );
        reactor.start().unwrap();

        assert_eq!(&server.join().unwrap(), b"ping");
        assert_eq!(&*received.borrow(), b"pong");
        assert!(disconnected.get());
        assert_eq!(socket.last_error(), Some(SocketError::PeerClosed));
        assert_eq!(reactor.device_count(), 0);
    }

    #[test]
    fn test_connection_refused_reports_connect_error() {
        let (listener, port) = listener();
        drop(listener);

        let reactor = Reactor::factory("epoll").unwrap();
        let socket = Socket::new(&reactor);
        let weak_reactor = Rc::downgrade(&reactor);
        socket.set_on_disconnected(move || {
            if let Some(reactor) = weak_reactor.upgrade() {
                reactor.stop();
            }
        });

        socket.connect("127.0.0.1", port);
        if reactor.device_count() > 0 {
            reactor.start().unwrap();
        }

        assert_eq!(socket.state(), SocketState::Disconnected);
        assert!(matches!(
            socket.last_error(),
            Some(SocketError::Connect { .. })
        ));
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let (listener, port) = listener();
        let reactor = Reactor::factory("epoll").unwrap();
        let socket = Socket::new(&reactor);
        let calls = Rc::new(Cell::new(0));
        let seen = Rc::clone(&calls);
        socket.set_on_disconnected(move || seen.set(seen.get() + 1));

        socket.connect("127.0.0.1", port);
        assert!(socket.descriptor().is_open());
        socket.disconnect();
        socket.disconnect();

        assert!(!socket.descriptor().is_open());
        assert_eq!(socket.state(), SocketState::Disconnected);
        assert_eq!(reactor.device_count(), 0);
        assert_eq!(calls.get(), 0);
        drop(listener);
    }

    #[test]
    fn test_tls_handshake_failure_never_reports_connected() {
        let (listener, port) = listener();
        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut hello = [0u8; 4096];
            let _ = stream.read(&mut hello);
            let _ = stream.write_all(b"HTTP/1.1 400 Bad Request\r\n\r\n");
        });

        let reactor = Reactor::factory("epoll").unwrap();
        let socket = Socket::new_secure(&reactor);
        let connected = Rc::new(Cell::new(0));
        let disconnected = Rc::new(Cell::new(0));
        let seen = Rc::clone(&connected);
        socket.set_on_connected(move || seen.set(seen.get() + 1));
        let seen = Rc::clone(&disconnected);
        let weak_reactor = Rc::downgrade(&reactor);
        socket.set_on_disconnected(move || {
            seen.set(seen.get() + 1);
            if let Some(reactor) = weak_reactor.upgrade() {
                reactor.stop();
            }
        });

        socket.connect("localhost", port);
        if reactor.device_count() > 0 {
            reactor.start().unwrap();
        }
        server.join().unwrap();

        assert_eq!(connected.get(), 0);
        assert_eq!(disconnected.get(), 1);
        assert!(
            matches!(socket.last_error(), Some(SocketError::Tls(_))),
            "{:?}",
            socket.last_error()
        );
        assert_eq!(reactor.device_count(), 0);
    }

    #[test]
    fn test_write_before_connect_fails() {
        let reactor = Reactor::factory("epoll").unwrap();
        let socket = Socket::new_secure(&reactor);
        assert!(socket.is_secure());
        assert!(socket.write(b"data").is_err());
        assert!(socket.read(16).is_empty());
    }
}
