//! A blocking multi producer, multi consumer queue that doubles as a pollable file descriptor.
//!
//! Every push also bumps an eventfd counter. A readiness loop (epoll, or tokio's `AsyncFd`)
//! can watch that descriptor next to its sockets, and once woken it must call
//! [MessageQueue::consume_event] before draining with [MessageQueue::try_pop] so the
//! descriptor stops reporting readiness.

use std::{
    collections::VecDeque,
    io,
    os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd},
    sync::{Condvar, Mutex, MutexGuard, PoisonError},
};

/// A non-blocking, close-on-exec eventfd.
#[derive(Debug)]
pub struct EventFd(OwnedFd);

impl EventFd {
    pub fn new() -> io::Result<Self> {
        // SAFETY: eventfd has no pointer arguments, the result is checked below.
        let fd = unsafe { libc::eventfd(0, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: `fd` was just created and is owned by nobody else.
        Ok(Self(unsafe { OwnedFd::from_raw_fd(fd) }))
    }

    /// Add one to the counter, making the descriptor readable.
    pub fn signal(&self) -> io::Result<()> {
        let value: u64 = 1;
        // SAFETY: the buffer is a valid u64 that outlives the call.
        let ret = unsafe {
            libc::write(
                self.0.as_raw_fd(),
                &value as *const u64 as *const libc::c_void,
                std::mem::size_of::<u64>(),
            )
        };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Read and reset the counter. Fails with [io::ErrorKind::WouldBlock] when it was zero.
    pub fn consume(&self) -> io::Result<u64> {
        let mut value: u64 = 0;
        // SAFETY: the buffer is a valid, writable u64 that outlives the call.
        let ret = unsafe {
            libc::read(
                self.0.as_raw_fd(),
                &mut value as *mut u64 as *mut libc::c_void,
                std::mem::size_of::<u64>(),
            )
        };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(value)
    }
}

impl AsRawFd for EventFd {
    fn as_raw_fd(&self) -> RawFd {
        self.0.as_raw_fd()
    }
}

impl AsFd for EventFd {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.0.as_fd()
    }
}

#[derive(Debug)]
pub struct MessageQueue<T> {
    items: Mutex<VecDeque<T>>,
    available: Condvar,
    event: EventFd,
}

impl<T> MessageQueue<T> {
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            items: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
            event: EventFd::new()?,
        })
    }

    // A panic while holding the lock cannot leave the deque half modified, so a poisoned
    // lock is still usable.
    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue `item`, wake one blocked consumer and signal the event descriptor.
    pub fn push(&self, item: T) {
        self.lock().push_back(item);
        self.available.notify_one();
        if let Err(err) = self.event.signal() {
            tracing::warn!("Failed to signal queue eventfd: {err}");
        }
    }

    /// Block until an item is available and take it.
    pub fn pop(&self) -> T {
        let mut items = self.lock();
        loop {
            if let Some(item) = items.pop_front() {
                return item;
            }
            items = self
                .available
                .wait(items)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub fn try_pop(&self) -> Option<T> {
        self.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn event_fd(&self) -> &EventFd {
        &self.event
    }

    /// Reset the event descriptor, returning how many pushes were signalled since the last
    /// call.
    pub fn consume_event(&self) -> io::Result<u64> {
        self.event.consume()
    }
}

impl<T> AsRawFd for MessageQueue<T> {
    fn as_raw_fd(&self) -> RawFd {
        self.event.as_raw_fd()
    }
}
