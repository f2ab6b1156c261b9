//! Readiness-multiplexing event loop.
//!
//! The [`Reactor`] owns the multiplexing facility and a registry mapping each
//! descriptor to the [`Device`] that owns it. [`Reactor::start`] blocks the
//! calling thread, waits for readiness with no timeout and dispatches every
//! notification to its device: read-ready first, then write-ready. This loop
//! is the only scheduling primitive; all work happens in device callbacks.
//!
//! Registrations carry a `(generation, fd)` token, so events still queued for
//! a descriptor number that was closed and reused within one batch are
//! recognised as stale and dropped.

mod epoll;

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::os::unix::io::RawFd;
use std::rc::Rc;

use log::{debug, error, trace};

use crate::config::{EPOLL_BACKEND, MAX_EVENTS};
use crate::device::Device;
use crate::error_handling::ReactorError;

use epoll::{Event, Poller};

struct Registration {
    token: u64,
    device: Rc<dyn Device>,
    write_interest: bool,
}

fn token_for(generation: u32, fd: RawFd) -> u64 {
    (u64::from(generation) << 32) | u64::from(fd as u32)
}

fn fd_of(token: u64) -> RawFd {
    (token & 0xffff_ffff) as u32 as RawFd
}

/// Single-threaded readiness reactor.
pub struct Reactor {
    poller: RefCell<Poller>,
    active: Cell<bool>,
    devices: RefCell<HashMap<RawFd, Registration>>,
    generation: Cell<u32>,
}

impl Reactor {
    /// Creates a reactor for the named backend. Only `"epoll"` exists.
    ///
    /// # Errors
    ///
    /// Returns `UnknownBackend` for any other name, or `Init` if the
    /// multiplexing facility cannot be created.
    pub fn factory(backend: &str) -> Result<Rc<Reactor>, ReactorError> {
        match backend {
            EPOLL_BACKEND => Ok(Rc::new(Self::epoll()?)),
            other => Err(ReactorError::UnknownBackend(other.to_string())),
        }
    }

    fn epoll() -> Result<Self, ReactorError> {
        let poller = Poller::new(MAX_EVENTS).map_err(ReactorError::Init)?;
        Ok(Self {
            poller: RefCell::new(poller),
            active: Cell::new(false),
            devices: RefCell::new(HashMap::new()),
            generation: Cell::new(0),
        })
    }

    /// Registers the device's descriptor for read and write readiness.
    ///
    /// The reactor keeps a strong reference to the device until
    /// [`Reactor::remove_device`]. Remove the device before closing its
    /// descriptor.
    ///
    /// # Errors
    ///
    /// Refuses devices without an open descriptor, descriptors that are
    /// already registered, and descriptors epoll rejects.
    pub fn add_device(&self, device: Rc<dyn Device>) -> Result<(), ReactorError> {
        let Some(fd) = device.descriptor().raw() else {
            error!("Device is not open");
            return Err(ReactorError::DeviceNotOpen);
        };
        let mut devices = self.devices.borrow_mut();
        if devices.contains_key(&fd) {
            error!("fd={fd} is already registered");
            return Err(ReactorError::AlreadyRegistered(fd));
        }

        let generation = self.generation.get().wrapping_add(1);
        self.generation.set(generation);
        let token = token_for(generation, fd);

        if let Err(source) = self.poller.borrow().add(fd, token, true) {
            error!("Failed to add fd to epoll fd={fd}: {source}");
            return Err(ReactorError::Register { fd, source });
        }
        devices.insert(
            fd,
            Registration {
                token,
                device,
                write_interest: true,
            },
        );
        trace!("registered fd={fd}");
        Ok(())
    }

    /// Unregisters the device. Safe to call when it is not registered.
    pub fn remove_device(&self, device: &dyn Device) {
        let Some(fd) = device.descriptor().raw() else {
            return;
        };
        let removed = {
            let mut devices = self.devices.borrow_mut();
            match devices.get(&fd) {
                Some(reg)
                    if Rc::as_ptr(&reg.device).cast::<()>()
                        == std::ptr::from_ref(device).cast::<()>() =>
                {
                    devices.remove(&fd)
                }
                _ => None,
            }
        };
        if removed.is_some() {
            if let Err(e) = self.poller.borrow().delete(fd) {
                debug!("epoll delete failed for fd={fd}: {e}");
            }
            trace!("unregistered fd={fd}");
        }
        // `removed` is dropped only after the registry borrow is released.
    }

    /// Enables or disables write-readiness notification for a registered device.
    ///
    /// Read readiness is always reported. Devices turn write interest off when
    /// they have nothing to write so a level-triggered loop does not spin.
    pub fn set_write_interest(&self, device: &dyn Device, enabled: bool) {
        let Some(fd) = device.descriptor().raw() else {
            return;
        };
        let mut devices = self.devices.borrow_mut();
        let Some(reg) = devices.get_mut(&fd) else {
            return;
        };
        if reg.write_interest == enabled {
            return;
        }
        match self.poller.borrow().modify(fd, reg.token, enabled) {
            Ok(()) => reg.write_interest = enabled,
            Err(e) => error!("Failed to modify epoll interest fd={fd}: {e}"),
        }
    }

    /// Whether the descriptor is currently registered.
    pub fn is_registered(&self, fd: RawFd) -> bool {
        self.devices.borrow().contains_key(&fd)
    }

    pub fn device_count(&self) -> usize {
        self.devices.borrow().len()
    }

    pub fn is_active(&self) -> bool {
        self.active.get()
    }

    /// Runs the loop until [`Reactor::stop`] is called.
    ///
    /// # Errors
    ///
    /// Returns `UnexpectedEvents` when a device does not handle an
    /// error/hangup condition on its descriptor, and `Wait` when waiting
    /// itself fails. The loop is inactive again when this returns.
    pub fn start(&self) -> Result<(), ReactorError> {
        self.active.set(true);
        let result = self.run();
        self.active.set(false);
        result
    }

    /// Makes [`Reactor::start`] return after the current wait cycle.
    /// Safe to call from inside a device callback.
    pub fn stop(&self) {
        self.active.set(false);
    }

    fn run(&self) -> Result<(), ReactorError> {
        let mut events = Vec::with_capacity(MAX_EVENTS);
        while self.active.get() {
            let waited = self.poller.borrow_mut().wait(&mut events, -1);
            if let Err(e) = waited {
                if e.kind() == std::io::ErrorKind::Interrupted {
                    continue;
                }
                error!("epoll_wait failed: {e}");
                return Err(ReactorError::Wait(e));
            }
            for event in &events {
                self.dispatch(event)?;
            }
        }
        Ok(())
    }

    fn dispatch(&self, event: &Event) -> Result<(), ReactorError> {
        let fd = fd_of(event.token);
        let device = {
            let devices = self.devices.borrow();
            match devices.get(&fd) {
                Some(reg) if reg.token == event.token => Rc::clone(&reg.device),
                Some(_) => {
                    trace!("dropping stale event for recycled fd={fd}");
                    return Ok(());
                }
                None => {
                    let _ = self.poller.borrow().delete(fd);
                    trace!("dropping event for unknown fd={fd}");
                    return Ok(());
                }
            }
        };

        if event.is_error_or_hangup() {
            if device.on_hangup(event.readable()) {
                return Ok(());
            }
            self.active.set(false);
            error!("Got unexpected events {:#x} on fd={fd}", event.events);
            return Err(ReactorError::UnexpectedEvents {
                fd,
                events: event.events,
            });
        }

        if event.readable() {
            device.on_ready_read();
        }
        if event.writable() {
            device.on_ready_write();
        }
        Ok(())
    }
}

impl Drop for Reactor {
    fn drop(&mut self) {
        if self.active.get() {
            error!("Destroying active reactor. Something went terribly wrong.");
        }
    }
}
