// Shared test helpers: a scripted loopback HTTP(S) server and a blocking fetch.
//
// The server runs on its own thread with std networking (and a rustls
// ServerConnection for https); the client side runs the real
// Reactor/Socket/HttpClient stack on the test thread.

use std::cell::{Cell, RefCell};
use std::io::{Read, Write};
use std::net::TcpListener;
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use brief_fetcher::{FetchError, HttpClient, Reactor, Url};

/// What the server sends back on one connection.
#[derive(Debug, Clone)]
pub struct Reply {
    pub bytes: Vec<u8>,
    /// Write in pieces of this many bytes instead of one write.
    pub piece: Option<usize>,
}

impl Reply {
    pub fn raw(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            piece: None,
        }
    }

    /// A 200 response carrying `body` with a matching Content-Length.
    pub fn ok(body: &str) -> Self {
        Self::raw(format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\n\r\n{body}",
            body.len()
        ))
    }

    pub fn redirect(location: &str) -> Self {
        Self::raw(format!(
            "HTTP/1.1 302 Found\r\nLocation: {location}\r\nContent-Length: 16\r\n\r\nredirect body!!!"
        ))
    }

    pub fn in_pieces(mut self, piece: usize) -> Self {
        self.piece = Some(piece);
        self
    }
}

/// Loopback server answering each connection with the responder's reply.
pub struct TestServer {
    pub port: u16,
    requests: Arc<Mutex<Vec<String>>>,
}

impl TestServer {
    /// Starts serving plain HTTP. `respond` gets the connection index and the
    /// request head.
    pub fn start<F>(respond: F) -> Self
    where
        F: FnMut(usize, &str) -> Reply + Send + 'static,
    {
        Self::spawn(None, respond)
    }

    /// Starts serving HTTPS with `config`. A connection whose handshake fails
    /// is logged with an empty request head.
    #[allow(dead_code)] // Used by other test files
    pub fn start_tls<F>(config: Arc<rustls::ServerConfig>, respond: F) -> Self
    where
        F: FnMut(usize, &str) -> Reply + Send + 'static,
    {
        Self::spawn(Some(config), respond)
    }

    fn spawn<F>(tls: Option<Arc<rustls::ServerConfig>>, mut respond: F) -> Self
    where
        F: FnMut(usize, &str) -> Reply + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind test server");
        let port = listener.local_addr().expect("No local address").port();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&requests);

        thread::spawn(move || {
            for (index, stream) in listener.incoming().enumerate() {
                let Ok(stream) = stream else {
                    continue;
                };
                let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
                let _ = stream.set_nodelay(true);
                match &tls {
                    None => serve(stream, index, &log, &mut respond),
                    Some(config) => {
                        let Ok(conn) = rustls::ServerConnection::new(Arc::clone(config)) else {
                            continue;
                        };
                        let mut tls_stream = rustls::StreamOwned::new(conn, stream);
                        serve(&mut tls_stream, index, &log, &mut respond);
                        tls_stream.conn.send_close_notify();
                        let _ = tls_stream.flush();
                    }
                }
                // Dropping the stream closes the connection.
            }
        });

        Self { port, requests }
    }

    #[allow(dead_code)] // Used by other test files
    pub fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{path}", self.port)
    }

    /// `https://localhost:<port><path>`, matching the test certificate's name.
    #[allow(dead_code)] // Used by other test files
    pub fn https_url(&self, path: &str) -> String {
        format!("https://localhost:{}{path}", self.port)
    }

    /// Request heads received so far, in arrival order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().expect("request log poisoned").clone()
    }

    /// Request targets (second word of each request line).
    pub fn targets(&self) -> Vec<String> {
        self.requests()
            .iter()
            .filter_map(|head| head.split(' ').nth(1).map(str::to_string))
            .collect()
    }
}

fn serve<S, F>(mut stream: S, index: usize, log: &Mutex<Vec<String>>, respond: &mut F)
where
    S: Read + Write,
    F: FnMut(usize, &str) -> Reply,
{
    let head = read_request_head(&mut stream);
    log.lock().expect("request log poisoned").push(head.clone());
    let reply = respond(index, &head);
    write_reply(&mut stream, &reply);
}

fn read_request_head(stream: &mut impl Read) -> String {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }
    String::from_utf8_lossy(&head).into_owned()
}

fn write_reply(stream: &mut impl Write, reply: &Reply) {
    match reply.piece {
        None => {
            let _ = stream.write_all(&reply.bytes);
            let _ = stream.flush();
        }
        Some(piece) => {
            for chunk in reply.bytes.chunks(piece.max(1)) {
                if stream.write_all(chunk).is_err() {
                    return;
                }
                let _ = stream.flush();
                thread::sleep(Duration::from_micros(200));
            }
        }
    }
}

/// Outcome of one [`fetch_with`] run.
#[allow(dead_code)] // Fields are read by other test files
pub struct Fetched {
    pub result: Result<String, FetchError>,
    /// The client's target once the request finished.
    pub url: Url,
    pub redirects_left: u8,
}

/// Runs one `execute()` to completion and returns its result.
#[allow(dead_code)] // Used by other test files
pub fn fetch(url: &str) -> Result<String, FetchError> {
    fetch_with(url, |_| {}).result
}

/// Like [`fetch`], with `setup` applied to the client before `execute()`.
///
/// Panics if the completion callback does not fire exactly once, or if a
/// descriptor is still registered afterwards.
pub fn fetch_with(url: &str, setup: impl FnOnce(&HttpClient)) -> Fetched {
    let reactor = Reactor::factory("epoll").expect("Failed to create reactor");
    let client = HttpClient::new(&reactor, url).expect("Invalid test url");
    setup(&client);

    let outcome = Rc::new(RefCell::new(None));
    let calls = Rc::new(Cell::new(0));
    let sink = Rc::clone(&outcome);
    let counter = Rc::clone(&calls);
    let weak_reactor = Rc::downgrade(&reactor);
    client.execute(move |result| {
        counter.set(counter.get() + 1);
        *sink.borrow_mut() = Some(result);
        if let Some(reactor) = weak_reactor.upgrade() {
            reactor.stop();
        }
    });

    if outcome.borrow().is_none() {
        reactor.start().expect("Reactor failed");
    }
    assert_eq!(calls.get(), 1, "completion callback must fire exactly once");
    assert!(!client.is_in_flight());
    let final_url = client.url();
    let redirects_left = client.redirects_left();
    drop(client);
    assert_eq!(reactor.device_count(), 0, "no descriptor may outlive the request");

    let result = outcome.borrow_mut().take();
    Fetched {
        result: result.expect("completion callback did not run"),
        url: final_url,
        redirects_left,
    }
}
