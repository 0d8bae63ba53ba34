//! In-process serial link.
//!
//! [`MemoryLink`] plays the device side of a session without a tty: reads
//! are scripted with [`push_data`](MemoryLink::push_data) and friends, and
//! every byte the session writes is recorded for inspection. The session
//! tests drive both loops against it.

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::{Readiness, SerialLink};

/// One scripted outcome of the device side.
#[derive(Debug)]
enum Scripted {
    Data(Vec<u8>),
    ReadError(io::ErrorKind),
    Fault,
}

#[derive(Debug, Default)]
struct Inbox {
    queue: VecDeque<Scripted>,
    woken: bool,
}

/// Scripted in-memory [`SerialLink`].
#[derive(Debug, Default)]
pub struct MemoryLink {
    inbox: Mutex<Inbox>,
    ready: Condvar,
    written: Mutex<Vec<u8>>,
    paced_writes: AtomicUsize,
    flushes: AtomicUsize,
}

impl MemoryLink {
    /// Create a link with nothing queued.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue bytes for the next read.
    pub fn push_data(&self, bytes: &[u8]) {
        self.push(Scripted::Data(bytes.to_vec()));
    }

    /// Queue a read that fails with `kind`.
    pub fn push_read_error(&self, kind: io::ErrorKind) {
        self.push(Scripted::ReadError(kind));
    }

    /// Queue an error/hangup condition on the descriptor.
    pub fn push_fault(&self) {
        self.push(Scripted::Fault);
    }

    /// Everything written to the link so far.
    pub fn written(&self) -> Vec<u8> {
        self.lock_written().clone()
    }

    /// Number of paced (trigger response) writes performed.
    pub fn paced_writes(&self) -> usize {
        self.paced_writes.load(Ordering::SeqCst)
    }

    /// Number of [`flush_output`](SerialLink::flush_output) calls.
    pub fn flushes(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }

    /// Whether all scripted reads have been consumed.
    pub fn is_drained(&self) -> bool {
        self.lock_inbox().queue.is_empty()
    }

    fn push(&self, item: Scripted) {
        self.lock_inbox().queue.push_back(item);
        self.ready.notify_all();
    }

    fn lock_inbox(&self) -> MutexGuard<'_, Inbox> {
        self.inbox.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_written(&self) -> MutexGuard<'_, Vec<u8>> {
        self.written.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SerialLink for MemoryLink {
    fn wait_readable(&self) -> io::Result<Readiness> {
        let mut inbox = self.lock_inbox();
        loop {
            if inbox.woken {
                inbox.woken = false;
                return Ok(Readiness::Wake);
            }
            match inbox.queue.front() {
                Some(Scripted::Fault) => {
                    inbox.queue.pop_front();
                    return Ok(Readiness::Fault {
                        revents: libc::POLLERR,
                    });
                }
                Some(_) => return Ok(Readiness::Data),
                None => {
                    inbox = self
                        .ready
                        .wait(inbox)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            }
        }
    }

    fn read_chunk(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut inbox = self.lock_inbox();
        match inbox.queue.pop_front() {
            Some(Scripted::Data(mut bytes)) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                if n < bytes.len() {
                    inbox.queue.push_front(Scripted::Data(bytes.split_off(n)));
                }
                Ok(n)
            }
            Some(Scripted::ReadError(kind)) => Err(io::Error::from(kind)),
            Some(Scripted::Fault) | None => Ok(0),
        }
    }

    fn write_bytes(&self, bytes: &[u8]) -> io::Result<()> {
        self.lock_written().extend_from_slice(bytes);
        Ok(())
    }

    fn write_paced(&self, bytes: &[u8], _pacing: Duration) -> io::Result<()> {
        self.paced_writes.fetch_add(1, Ordering::SeqCst);
        self.lock_written().extend_from_slice(bytes);
        Ok(())
    }

    fn flush_output(&self) -> io::Result<()> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn wake(&self) {
        self.lock_inbox().woken = true;
        self.ready.notify_all();
    }
}
