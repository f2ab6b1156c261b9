//! Descriptor ownership and the readiness interface of every device.
//!
//! A [`Descriptor`] owns exactly one OS descriptor and exposes the raw
//! read/write primitives over it. A [`Device`] is anything the
//! [`crate::Reactor`] can dispatch readiness to. The base primitives never
//! buffer; short reads and short writes are normal and retrying is the
//! caller's job.

use std::cell::Cell;
use std::io;
use std::os::unix::io::RawFd;

use log::debug;

use crate::config::DESCRIPTOR_READ_LIMIT;

const INVALID_FD: RawFd = -1;

/// Owner of one OS descriptor, closed on drop if still open.
#[derive(Debug)]
pub struct Descriptor {
    fd: Cell<RawFd>,
}

impl Descriptor {
    /// Creates a descriptor holder that owns nothing yet.
    pub fn new() -> Self {
        Self {
            fd: Cell::new(INVALID_FD),
        }
    }

    /// Raw descriptor, `None` once closed or before one was adopted.
    pub fn raw(&self) -> Option<RawFd> {
        let fd = self.fd.get();
        (fd >= 0).then_some(fd)
    }

    pub fn is_open(&self) -> bool {
        self.raw().is_some()
    }

    /// Takes ownership of `fd`, closing any descriptor held before.
    pub(crate) fn adopt(&self, fd: RawFd) {
        self.close();
        self.fd.set(fd);
    }

    /// Closes the descriptor. Closing twice is a no-op.
    pub fn close(&self) {
        let fd = self.fd.replace(INVALID_FD);
        if fd >= 0 {
            // SAFETY: `fd` was owned by this holder and is forgotten right here.
            unsafe {
                libc::close(fd);
            }
        }
    }

    /// Reads at most `max_size` bytes (further capped at `DESCRIPTOR_READ_LIMIT`).
    ///
    /// An empty result means "no data available": would-block, end of stream
    /// and system errors all look the same through this primitive. Callers
    /// that need to tell them apart use [`Descriptor::read_into`].
    pub fn read(&self, max_size: usize) -> Vec<u8> {
        let mut buf = vec![0u8; max_size.min(DESCRIPTOR_READ_LIMIT)];
        if buf.is_empty() {
            return buf;
        }
        match self.read_into(&mut buf) {
            Ok(n) => {
                buf.truncate(n);
                buf
            }
            Err(e) => {
                if e.kind() != io::ErrorKind::WouldBlock {
                    debug!("read failed on fd {:?}: {e}", self.raw());
                }
                Vec::new()
            }
        }
    }

    /// Single `read(2)` into `buf`; `Ok(0)` with a non-empty `buf` is end of stream.
    pub fn read_into(&self, buf: &mut [u8]) -> io::Result<usize> {
        let fd = self.raw().ok_or_else(not_open)?;
        // SAFETY: `buf` is valid for `buf.len()` writable bytes.
        let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
        if n < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(n as usize)
        }
    }

    /// Single `write(2)`; returns how many bytes the OS accepted, which may be
    /// fewer than `data.len()`.
    pub fn write(&self, data: &[u8]) -> io::Result<usize> {
        let fd = self.raw().ok_or_else(not_open)?;
        // SAFETY: `data` is valid for `data.len()` readable bytes.
        let n = unsafe { libc::write(fd, data.as_ptr() as *const libc::c_void, data.len()) };
        if n < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(n as usize)
        }
    }
}

impl Default for Descriptor {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Descriptor {
    fn drop(&mut self) {
        self.close();
    }
}

fn not_open() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "descriptor is not open")
}

/// `io::Read`/`io::Write` view of a descriptor, for code that drives
/// record layers over it (rustls `read_tls`/`write_tls`).
pub(crate) struct DescriptorIo<'a>(pub(crate) &'a Descriptor);

impl io::Read for DescriptorIo<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read_into(buf)
    }
}

impl io::Write for DescriptorIo<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Something the reactor dispatches readiness to.
///
/// The reactor keeps an `Rc` to every registered device, so a device stays
/// alive for the duration of any callback running on it even if its owner
/// drops the last other reference mid-callback.
pub trait Device {
    /// The descriptor this device owns.
    fn descriptor(&self) -> &Descriptor;

    /// Reads at most `max_size` bytes; empty means nothing available.
    fn read(&self, max_size: usize) -> Vec<u8> {
        self.descriptor().read(max_size)
    }

    /// Writes as much of `data` as is accepted right now.
    fn write(&self, data: &[u8]) -> io::Result<usize> {
        self.descriptor().write(data)
    }

    fn on_ready_read(&self);

    fn on_ready_write(&self);

    /// Error or hangup reported for the descriptor. `readable` tells whether
    /// read readiness was reported in the same event.
    ///
    /// Returns `true` when the device dealt with it. Unhandled conditions
    /// stop the reactor with [`crate::ReactorError::UnexpectedEvents`].
    fn on_hangup(&self, _readable: bool) -> bool {
        false
    }
}
