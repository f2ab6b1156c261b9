//! HTTP/1.1 GET client driven by socket readiness callbacks.
//!
//! One [`HttpClient`] runs one logical request at a time:
//!
//! 1. **Dispatch**: a fresh [`Socket`] (TLS for `https`) is created and
//!    connected to the current target.
//! 2. **Connected**: the GET request is written, resuming on write readiness
//!    when the transport takes it in pieces.
//! 3. **Ready-read**: bytes are fed into an [`Exchange`], which decides when
//!    the response is complete, malformed or redirected.
//! 4. **Disconnected**: the exchange is resolved as a close-delimited body or
//!    as a failure.
//! 5. **Redirect**: the transport is torn down and the request restarts
//!    against the `location` target until the redirect budget runs out.
//!
//! Socket callbacks hold only a weak reference to the client plus the number
//! of the attempt they were created for, so callbacks of a transport that was
//! replaced by a redirect are ignored.

use std::cell::RefCell;
use std::io;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use log::{debug, info, warn};
use rustls::ClientConfig;

use crate::config::{
    ACCEPT, CONNECTION_CLOSE, DEFAULT_USER_AGENT, HEADER_ACCEPT, HEADER_CONNECTION, HEADER_HOST,
    HEADER_USER_AGENT, MAX_REDIRECTS,
};
use crate::device::Device;
use crate::error_handling::{FetchError, SocketError};
use crate::http::exchange::{Exchange, Progress};
use crate::reactor::Reactor;
use crate::socket::Socket;
use crate::url::Url;

/// Completion callback of [`HttpClient::execute`]. `Err` is the empty result.
pub type Completion = Box<dyn FnOnce(Result<String, FetchError>)>;

/// Bytes still to be written, resumed across short writes.
#[derive(Debug, Default)]
pub(crate) struct PendingWrite {
    data: Vec<u8>,
    written: usize,
}

impl PendingWrite {
    pub(crate) fn new(data: Vec<u8>) -> Self {
        Self { data, written: 0 }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.written >= self.data.len()
    }

    /// Writes until everything is out or `write` accepts nothing.
    /// `Ok(true)` once all bytes were accepted.
    pub(crate) fn flush<F>(&mut self, mut write: F) -> io::Result<bool>
    where
        F: FnMut(&[u8]) -> io::Result<usize>,
    {
        while !self.is_empty() {
            let accepted = write(&self.data[self.written..])?;
            if accepted == 0 {
                return Ok(false);
            }
            self.written += accepted;
        }
        Ok(true)
    }
}

struct ClientState {
    target: Url,
    url: Url,
    socket: Option<Rc<Socket>>,
    attempt: u64,
    exchange: Exchange,
    outgoing: PendingWrite,
    redirects_left: u8,
    tls_config: Option<Arc<ClientConfig>>,
    on_finished: Option<Completion>,
}

pub struct HttpClient {
    this: Weak<HttpClient>,
    reactor: Weak<Reactor>,
    state: RefCell<ClientState>,
}

/// Formats the request sent for `url`.
pub fn format_request(url: &Url) -> String {
    format!(
        "GET {target} HTTP/1.1\r\n\
         {HEADER_HOST}: {host}\r\n\
         {HEADER_ACCEPT}: {ACCEPT}\r\n\
         {HEADER_USER_AGENT}: {DEFAULT_USER_AGENT}\r\n\
         {HEADER_CONNECTION}: {CONNECTION_CLOSE}\r\n\
         \r\n",
        target = url.request_target(),
        host = url.authority(),
    )
}

impl HttpClient {
    /// Creates a client for `url` bound to `reactor`. Nothing is sent until
    /// [`HttpClient::execute`].
    ///
    /// # Errors
    ///
    /// Returns `FetchError::InvalidUrl` if `url` is not an absolute http/https URL.
    pub fn new(reactor: &Rc<Reactor>, url: &str) -> Result<Rc<Self>, FetchError> {
        let url = Url::parse(url).map_err(FetchError::InvalidUrl)?;
        Ok(Rc::new_cyclic(|this| Self {
            this: this.clone(),
            reactor: Rc::downgrade(reactor),
            state: RefCell::new(ClientState {
                target: url.clone(),
                url,
                socket: None,
                attempt: 0,
                exchange: Exchange::new(),
                outgoing: PendingWrite::default(),
                redirects_left: MAX_REDIRECTS,
                tls_config: None,
                on_finished: None,
            }),
        }))
    }

    /// Starts the request. `on_finished` runs exactly once, with the body or
    /// with the reason there is none, from inside a reactor callback (or from
    /// inside this call when connecting fails immediately).
    ///
    /// A request still in flight is abandoned and its callback receives
    /// `FetchError::Superseded`.
    pub fn execute<F>(&self, on_finished: F)
    where
        F: FnOnce(Result<String, FetchError>) + 'static,
    {
        let previous = {
            let mut state = self.state.borrow_mut();
            state.url = state.target.clone();
            state.redirects_left = MAX_REDIRECTS;
            state.on_finished.replace(Box::new(on_finished))
        };
        if let Some(previous) = previous {
            warn!("execute() called while a request is in flight; abandoning it");
            self.teardown();
            previous(Err(FetchError::Superseded));
        }
        self.dispatch();
    }

    /// Uses `config` for every `https` connection made from now on,
    /// redirects included, instead of the shared webpki configuration.
    pub fn set_tls_config(&self, config: Arc<ClientConfig>) {
        self.state.borrow_mut().tls_config = Some(config);
    }

    /// Current target: the initial URL, or the last redirect target.
    pub fn url(&self) -> Url {
        self.state.borrow().url.clone()
    }

    pub fn redirects_left(&self) -> u8 {
        self.state.borrow().redirects_left
    }

    pub fn is_in_flight(&self) -> bool {
        self.state.borrow().on_finished.is_some()
    }

    fn dispatch(&self) {
        let Some(reactor) = self.reactor.upgrade() else {
            self.finish(Err(SocketError::Register("reactor is gone".to_string()).into()));
            return;
        };
        let (url, attempt, tls_config) = {
            let mut state = self.state.borrow_mut();
            state.attempt += 1;
            state.exchange = Exchange::new();
            state.outgoing = PendingWrite::default();
            (state.url.clone(), state.attempt, state.tls_config.clone())
        };

        let socket = match (url.is_secure(), tls_config) {
            (true, Some(config)) => Socket::new_secure_with_config(&reactor, config),
            (true, None) => Socket::new_secure(&reactor),
            (false, _) => Socket::new(&reactor),
        };
        socket.set_on_connected(self.handler(attempt, Self::on_connected));
        socket.set_on_ready_read(self.handler(attempt, Self::on_ready_read));
        socket.set_on_ready_write(self.handler(attempt, Self::on_ready_write));
        socket.set_on_disconnected(self.handler(attempt, Self::on_disconnected));
        self.state.borrow_mut().socket = Some(Rc::clone(&socket));

        debug!("connecting to {}:{} for {url}", url.host(), url.port());
        socket.connect(url.host(), url.port());
    }

    /// Wraps `method` into a socket callback bound to `attempt`.
    fn handler(&self, attempt: u64, method: fn(&HttpClient)) -> impl Fn() + 'static {
        let client = self.this.clone();
        move || {
            if let Some(client) = client.upgrade() {
                if client.state.borrow().attempt == attempt {
                    method(&client);
                }
            }
        }
    }

    fn current_socket(&self) -> Option<Rc<Socket>> {
        self.state.borrow().socket.clone()
    }

    fn on_connected(&self) {
        let request = {
            let mut state = self.state.borrow_mut();
            let request = format_request(&state.url);
            state.outgoing = PendingWrite::new(request.clone().into_bytes());
            request
        };
        debug!("sending request:\n{}", request.trim_end());
        self.flush_request();
    }

    fn on_ready_write(&self) {
        if !self.state.borrow().outgoing.is_empty() {
            self.flush_request();
        }
    }

    fn flush_request(&self) {
        let Some(socket) = self.current_socket() else {
            return;
        };
        let mut outgoing = std::mem::take(&mut self.state.borrow_mut().outgoing);
        let flushed = outgoing.flush(|chunk| socket.write(chunk));
        self.state.borrow_mut().outgoing = outgoing;

        match flushed {
            Ok(true) => debug!("request sent"),
            Ok(false) => debug!("request partially sent, waiting for write readiness"),
            Err(e) => {
                warn!("failed to send request: {e}");
                self.teardown();
                self.finish(Err(SocketError::Io(e.to_string()).into()));
            }
        }
    }

    fn on_ready_read(&self) {
        let Some(socket) = self.current_socket() else {
            return;
        };
        let size = self.state.borrow().exchange.next_read_size();
        let data = socket.read(size);
        if data.is_empty() {
            return;
        }

        let progress = self.state.borrow_mut().exchange.feed(&data);
        match progress {
            Progress::NeedMore => {}
            Progress::Complete(body) => {
                debug!("response complete, {} body bytes", body.len());
                self.teardown();
                self.finish(Ok(String::from_utf8_lossy(&body).into_owned()));
            }
            Progress::Failed(e) => {
                warn!("{e}");
                self.teardown();
                self.finish(Err(e));
            }
            Progress::Redirect { status, location } => self.handle_redirect(status, &location),
        }
    }

    fn on_disconnected(&self) {
        let socket_error = self.current_socket().and_then(|socket| socket.last_error());
        let resolved = self.state.borrow_mut().exchange.finish_on_close();
        self.teardown();

        let result = match socket_error {
            Some(error) if error != SocketError::PeerClosed => Err(FetchError::Socket(error)),
            _ => resolved.map(|body| String::from_utf8_lossy(&body).into_owned()),
        };
        match &result {
            Ok(body) => debug!("connection closed, close-delimited body of {} bytes", body.len()),
            Err(e) => warn!("{e}"),
        }
        self.finish(result);
    }

    fn handle_redirect(&self, status: u16, location: &str) {
        self.teardown();
        let (redirects_left, next) = {
            let mut state = self.state.borrow_mut();
            state.redirects_left = state.redirects_left.saturating_sub(1);
            (state.redirects_left, state.url.join(location))
        };
        if redirects_left == 0 {
            warn!("too many redirects, last location {location:?}");
            self.finish(Err(FetchError::TooManyRedirects));
            return;
        }
        match next {
            Ok(url) => {
                info!("{status} redirect to {url} ({redirects_left} redirects left)");
                self.state.borrow_mut().url = url;
                self.dispatch();
            }
            Err(e) => {
                warn!("redirect to {location:?} failed: {e}");
                self.finish(Err(FetchError::Redirect(e)));
            }
        }
    }

    /// Drops the current transport. Its callbacks are cleared first so a
    /// late event for it cannot reach this client.
    fn teardown(&self) {
        let socket = self.state.borrow_mut().socket.take();
        if let Some(socket) = socket {
            socket.clear_callbacks();
            socket.disconnect();
            debug!("closed connection to {}", socket.remote_host());
        }
    }

    fn finish(&self, result: Result<String, FetchError>) {
        let callback = self.state.borrow_mut().on_finished.take();
        match callback {
            Some(callback) => callback(result),
            None => debug!("completion already delivered, dropping {result:?}"),
        }
    }
}

impl Drop for HttpClient {
    fn drop(&mut self) {
        if let Some(socket) = self.state.get_mut().socket.take() {
            socket.clear_callbacks();
            socket.disconnect();
        }
    }
}
