//! TLS record layer over a non-blocking descriptor.
//!
//! [`TlsSession`] wraps a rustls [`ClientConnection`] and moves records
//! between it and the socket descriptor with `read_tls`/`write_tls`. Every
//! method does at most one descriptor read, so it is safe to call from a
//! readiness callback: "would block" is never an error here.

use std::io::{self, Read, Write};
use std::sync::Arc;

use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ClientConnection};

use crate::device::{Descriptor, DescriptorIo};
use crate::error_handling::SocketError;

/// Handshake progress after one readiness step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HandshakeStatus {
    Done,
    InProgress { wants_write: bool },
}

/// Outcome of one plaintext read.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum TlsRead {
    /// Decrypted bytes; empty when nothing is available yet.
    Data(Vec<u8>),
    /// The peer closed the stream, with or without `close_notify`.
    Closed,
}

pub(crate) struct TlsSession {
    conn: ClientConnection,
    peer_eof: bool,
}

impl TlsSession {
    /// Creates a client session for `host`, which is also sent as SNI.
    pub(crate) fn new(host: &str, config: Arc<ClientConfig>) -> Result<Self, SocketError> {
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|e| SocketError::TlsSetup(format!("invalid server name {host:?}: {e}")))?;
        let conn = ClientConnection::new(config, server_name)
            .map_err(|e| SocketError::TlsSetup(e.to_string()))?;
        Ok(Self {
            conn,
            peer_eof: false,
        })
    }

    /// Advances the handshake with whatever the descriptor offers right now.
    pub(crate) fn handshake(&mut self, fd: &Descriptor) -> Result<HandshakeStatus, SocketError> {
        self.flush(fd).map_err(|e| SocketError::Tls(e.to_string()))?;

        if self.conn.is_handshaking() && self.conn.wants_read() {
            match self.conn.read_tls(&mut DescriptorIo(fd)) {
                Ok(0) => {
                    return Err(SocketError::Tls(
                        "connection closed during handshake".to_string(),
                    ))
                }
                Ok(_) => {
                    self.conn
                        .process_new_packets()
                        .map_err(|e| SocketError::Tls(e.to_string()))?;
                    self.flush(fd).map_err(|e| SocketError::Tls(e.to_string()))?;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => return Err(SocketError::Tls(e.to_string())),
            }
        }

        if self.conn.is_handshaking() {
            Ok(HandshakeStatus::InProgress {
                wants_write: self.conn.wants_write(),
            })
        } else {
            Ok(HandshakeStatus::Done)
        }
    }

    /// Reads at most `max_size` plaintext bytes.
    ///
    /// Plaintext already decrypted is served first; otherwise one chunk of
    /// records is pulled from the descriptor.
    pub(crate) fn read(&mut self, fd: &Descriptor, max_size: usize) -> Result<TlsRead, SocketError> {
        let mut buf = vec![0u8; max_size];
        if let Some(n) = self.take_plaintext(&mut buf)? {
            buf.truncate(n);
            return Ok(TlsRead::Data(buf));
        }
        if self.peer_eof {
            return Ok(TlsRead::Closed);
        }

        match self.conn.read_tls(&mut DescriptorIo(fd)) {
            Ok(0) => self.peer_eof = true,
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(TlsRead::Data(Vec::new())),
            Err(e) => return Err(SocketError::Io(e.to_string())),
        }
        self.conn
            .process_new_packets()
            .map_err(|e| SocketError::Tls(e.to_string()))?;
        // Alerts and key updates may be queued by the records just processed.
        let _ = self.flush(fd);

        match self.take_plaintext(&mut buf)? {
            Some(n) => {
                buf.truncate(n);
                Ok(TlsRead::Data(buf))
            }
            None if self.peer_eof => Ok(TlsRead::Closed),
            None => Ok(TlsRead::Data(Vec::new())),
        }
    }

    /// `Some(n)` with decrypted bytes, `None` if nothing is buffered.
    /// A clean `close_notify` or an unclean close both set `peer_eof`.
    fn take_plaintext(&mut self, buf: &mut [u8]) -> Result<Option<usize>, SocketError> {
        if buf.is_empty() {
            return Ok(Some(0));
        }
        match self.conn.reader().read(buf) {
            Ok(0) => {
                self.peer_eof = true;
                Ok(None)
            }
            Ok(n) => Ok(Some(n)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                self.peer_eof = true;
                Ok(None)
            }
            Err(e) => Err(SocketError::Tls(e.to_string())),
        }
    }

    /// Whether decrypted plaintext is waiting to be read.
    pub(crate) fn has_buffered_plaintext(&mut self) -> bool {
        self.conn
            .process_new_packets()
            .map(|state| state.plaintext_bytes_to_read() > 0)
            .unwrap_or(false)
    }

    /// Encrypts `data` and pushes records to the descriptor.
    ///
    /// Returns how many plaintext bytes rustls accepted. Records that could
    /// not be written yet stay queued for [`TlsSession::flush`].
    pub(crate) fn write(&mut self, fd: &Descriptor, data: &[u8]) -> io::Result<usize> {
        let accepted = self.conn.writer().write(data)?;
        self.flush(fd)?;
        Ok(accepted)
    }

    /// Writes queued records. `Ok(true)` once nothing is left queued.
    pub(crate) fn flush(&mut self, fd: &Descriptor) -> io::Result<bool> {
        while self.conn.wants_write() {
            match self.conn.write_tls(&mut DescriptorIo(fd)) {
                Ok(0) => return Ok(false),
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(e) => return Err(e),
            }
        }
        Ok(true)
    }

    pub(crate) fn wants_write(&self) -> bool {
        self.conn.wants_write()
    }

    /// Queues `close_notify` and makes one attempt to send it.
    pub(crate) fn close(&mut self, fd: &Descriptor) {
        self.conn.send_close_notify();
        let _ = self.flush(fd);
    }
}
