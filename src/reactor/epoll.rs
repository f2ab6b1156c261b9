//! Thin wrapper over epoll (level-triggered).

use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::os::unix::io::RawFd;

const READ_EVENTS: u32 = libc::EPOLLIN as u32;
const WRITE_EVENTS: u32 = libc::EPOLLOUT as u32;
const ERROR_EVENTS: u32 = (libc::EPOLLERR | libc::EPOLLHUP) as u32;

/// One readiness notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Event {
    pub(crate) token: u64,
    pub(crate) events: u32,
}

impl Event {
    pub(crate) fn readable(&self) -> bool {
        self.events & READ_EVENTS != 0
    }

    pub(crate) fn writable(&self) -> bool {
        self.events & WRITE_EVENTS != 0
    }

    pub(crate) fn is_error_or_hangup(&self) -> bool {
        self.events & ERROR_EVENTS != 0
    }
}

pub(crate) struct Poller {
    epfd: OwnedFd,
    buffer: Vec<libc::epoll_event>,
}

impl Poller {
    pub(crate) fn new(max_events: usize) -> io::Result<Self> {
        // SAFETY: plain syscall, the result is checked below.
        let fd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self {
            // SAFETY: `fd` is a fresh descriptor nobody else owns.
            epfd: unsafe { OwnedFd::from_raw_fd(fd) },
            buffer: vec![libc::epoll_event { events: 0, u64: 0 }; max_events.max(1)],
        })
    }

    pub(crate) fn add(&self, fd: RawFd, token: u64, write: bool) -> io::Result<()> {
        self.ctl(libc::EPOLL_CTL_ADD, fd, token, write)
    }

    pub(crate) fn modify(&self, fd: RawFd, token: u64, write: bool) -> io::Result<()> {
        self.ctl(libc::EPOLL_CTL_MOD, fd, token, write)
    }

    pub(crate) fn delete(&self, fd: RawFd) -> io::Result<()> {
        // A non-null event keeps pre-2.6.9 kernels happy.
        let mut ev = libc::epoll_event { events: 0, u64: 0 };
        // SAFETY: `ev` outlives the call.
        let rc = unsafe { libc::epoll_ctl(self.epfd.as_raw_fd(), libc::EPOLL_CTL_DEL, fd, &mut ev) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn ctl(&self, op: libc::c_int, fd: RawFd, token: u64, write: bool) -> io::Result<()> {
        let mut events = READ_EVENTS;
        if write {
            events |= WRITE_EVENTS;
        }
        let mut ev = libc::epoll_event { events, u64: token };
        // SAFETY: `ev` outlives the call.
        let rc = unsafe { libc::epoll_ctl(self.epfd.as_raw_fd(), op, fd, &mut ev) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Blocks until at least one event is ready (`timeout_ms < 0` waits forever)
    /// and replaces the contents of `out` with the batch.
    pub(crate) fn wait(&mut self, out: &mut Vec<Event>, timeout_ms: i32) -> io::Result<()> {
        out.clear();
        // SAFETY: the buffer holds `buffer.len()` initialised entries.
        let n = unsafe {
            libc::epoll_wait(
                self.epfd.as_raw_fd(),
                self.buffer.as_mut_ptr(),
                self.buffer.len() as libc::c_int,
                timeout_ms,
            )
        };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        out.extend(self.buffer[..n as usize].iter().map(|ev| Event {
            token: ev.u64,
            events: ev.events,
        }));
        Ok(())
    }
}
