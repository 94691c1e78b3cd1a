//! Bounded byte queue
//!
//! A fixed-capacity ring buffer shared between one producer thread and one
//! consumer thread. Writers block while the buffer is full, readers may
//! block until data arrives, and `close()` wakes everyone up.

use std::sync::{Condvar, Mutex, MutexGuard};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Queue capacity must be greater than zero")]
    ZeroCapacity,
}

pub type Result<T> = std::result::Result<T, QueueError>;

struct Ring {
    buffer: Box<[u8]>,
    head: usize,
    stored: usize,
    closed: bool,
}

impl Ring {
    fn capacity(&self) -> usize {
        self.buffer.len()
    }

    fn free(&self) -> usize {
        self.capacity() - self.stored
    }

    /// Store as much of `data` as fits without wrapping twice
    fn push(&mut self, data: &[u8]) -> usize {
        let capacity = self.capacity();
        let tail = (self.head + self.stored) % capacity;
        let chunk = data.len().min(self.free()).min(capacity - tail);

        self.buffer[tail..tail + chunk].copy_from_slice(&data[..chunk]);
        self.stored += chunk;
        chunk
    }
}

/// Blocking single-producer / single-consumer byte queue
pub struct ByteQueue {
    ring: Mutex<Ring>,
    changed: Condvar,
}

impl ByteQueue {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(QueueError::ZeroCapacity);
        }
        Ok(Self {
            ring: Mutex::new(Ring {
                buffer: vec![0u8; capacity].into_boxed_slice(),
                head: 0,
                stored: 0,
                closed: false,
            }),
            changed: Condvar::new(),
        })
    }

    // Indices are committed after each copy, so a poisoned ring is consistent
    fn lock(&self) -> MutexGuard<'_, Ring> {
        self.ring.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Write all of `data`, blocking while the queue is full.
    ///
    /// Returns `false` if the queue was closed before every byte was stored.
    pub fn write(&self, data: &[u8]) -> bool {
        let mut ring = self.lock();
        let mut written = 0;

        while written < data.len() {
            while ring.stored == ring.capacity() && !ring.closed {
                ring = self
                    .changed
                    .wait(ring)
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
            }
            if ring.closed {
                return false;
            }

            written += ring.push(&data[written..]);
            self.changed.notify_all();
        }

        true
    }

    /// Store all of `data` only if it fits right now, never blocking.
    ///
    /// Returns `false` and stores nothing when the queue is closed or lacks
    /// room for the whole slice.
    pub fn try_write(&self, data: &[u8]) -> bool {
        let mut ring = self.lock();
        if ring.closed || ring.free() < data.len() {
            return false;
        }

        let mut written = 0;
        while written < data.len() {
            written += ring.push(&data[written..]);
        }
        self.changed.notify_all();
        true
    }

    /// Read up to `buf.len()` bytes.
    ///
    /// - `Some(0)`: nothing buffered and `block` was false
    /// - `Some(n)`: `n` bytes copied into `buf`
    /// - `None`: the queue is closed and fully drained (EOF)
    pub fn read(&self, buf: &mut [u8], block: bool) -> Option<usize> {
        let mut ring = self.lock();

        while ring.stored == 0 && !ring.closed {
            if !block {
                return Some(0);
            }
            ring = self
                .changed
                .wait(ring)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        if ring.stored == 0 {
            return None;
        }

        let capacity = ring.capacity();
        let wanted = buf.len().min(ring.stored);

        // Copy in at most two contiguous pieces (before and after the wrap)
        let first = wanted.min(capacity - ring.head);
        let head = ring.head;
        buf[..first].copy_from_slice(&ring.buffer[head..head + first]);
        let second = wanted - first;
        if second > 0 {
            buf[first..wanted].copy_from_slice(&ring.buffer[..second]);
        }

        ring.head = (ring.head + wanted) % capacity;
        ring.stored -= wanted;
        self.changed.notify_all();
        Some(wanted)
    }

    /// Close the queue. Idempotent; wakes all blocked readers and writers.
    pub fn close(&self) {
        let mut ring = self.lock();
        ring.closed = true;
        self.changed.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of buffered bytes
    pub fn len(&self) -> usize {
        self.lock().stored
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity()
    }
}

impl std::fmt::Debug for ByteQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ring = self.lock();
        f.debug_struct("ByteQueue")
            .field("capacity", &ring.capacity())
            .field("stored", &ring.stored)
            .field("closed", &ring.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(matches!(ByteQueue::new(0), Err(QueueError::ZeroCapacity)));
    }

    #[test]
    fn test_writes_within_capacity_read_in_order() {
        let queue = ByteQueue::new(16).unwrap();
        assert!(queue.write(b"abc"));
        assert!(queue.write(b""));
        assert!(queue.write(b"defgh"));
        assert!(queue.write(b"ij"));

        let mut buf = [0u8; 16];
        let n = queue.read(&mut buf, true).unwrap();
        assert_eq!(&buf[..n], b"abcdefghij");
        assert!(queue.is_empty());
    }

    #[test]
    fn test_read_across_wraparound() {
        let queue = ByteQueue::new(8).unwrap();
        let mut buf = [0u8; 8];

        assert!(queue.write(b"123456"));
        assert_eq!(queue.read(&mut buf[..4], true), Some(4));
        assert_eq!(&buf[..4], b"1234");

        // Tail wraps: "56" at the end, "789a" starting at index 0
        assert!(queue.write(b"789a"));
        assert_eq!(queue.len(), 6);

        let n = queue.read(&mut buf, true).unwrap();
        assert_eq!(&buf[..n], b"56789a");
    }

    #[test]
    fn test_non_blocking_read_on_empty_returns_zero() {
        let queue = ByteQueue::new(4).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(queue.read(&mut buf, false), Some(0));
    }

    #[test]
    fn test_close_then_blocking_read_is_eof() {
        let queue = ByteQueue::new(4).unwrap();
        queue.close();
        let mut buf = [0u8; 4];
        assert_eq!(queue.read(&mut buf, true), None);
        assert_eq!(queue.read(&mut buf, false), None);
    }

    #[test]
    fn test_close_then_write_fails_and_stores_nothing() {
        let queue = ByteQueue::new(4).unwrap();
        queue.close();
        queue.close();
        assert!(!queue.write(b"xy"));
        assert_eq!(queue.len(), 0);
        assert!(queue.is_closed());
    }

    #[test]
    fn test_close_drains_remaining_before_eof() {
        let queue = ByteQueue::new(8).unwrap();
        assert!(queue.write(b"tail"));
        queue.close();

        let mut buf = [0u8; 8];
        let n = queue.read(&mut buf, true).unwrap();
        assert_eq!(&buf[..n], b"tail");
        assert_eq!(queue.read(&mut buf, true), None);
    }

    #[test]
    fn test_blocked_reader_wakes_on_close() {
        let queue = Arc::new(ByteQueue::new(4).unwrap());
        let reader = {
            let queue = queue.clone();
            thread::spawn(move || {
                let mut buf = [0u8; 4];
                queue.read(&mut buf, true)
            })
        };

        thread::sleep(Duration::from_millis(20));
        queue.close();
        assert_eq!(reader.join().unwrap(), None);
    }

    #[test]
    fn test_blocked_writer_fails_on_close() {
        let queue = Arc::new(ByteQueue::new(2).unwrap());
        let writer = {
            let queue = queue.clone();
            thread::spawn(move || queue.write(b"more than two"))
        };

        thread::sleep(Duration::from_millis(20));
        queue.close();
        assert!(!writer.join().unwrap());
    }

    #[test]
    fn test_try_write_is_all_or_nothing() {
        let queue = ByteQueue::new(8).unwrap();
        let mut buf = [0u8; 8];

        assert!(queue.try_write(b"abcdef"));
        assert_eq!(queue.read(&mut buf[..4], false), Some(4));

        // Six bytes free, split across the wrap
        assert!(!queue.try_write(b"1234567"));
        assert_eq!(queue.len(), 2);
        assert!(queue.try_write(b"123456"));
        assert_eq!(queue.len(), 8);
        assert!(!queue.try_write(b"x"));

        assert_eq!(queue.read(&mut buf, true), Some(8));
        assert_eq!(&buf, b"ef123456");

        queue.close();
        assert!(!queue.try_write(b"late"));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_backpressure_preserves_order() {
        let queue = Arc::new(ByteQueue::new(7).unwrap());
        let payload: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();

        let writer = {
            let queue = queue.clone();
            let payload = payload.clone();
            thread::spawn(move || {
                for chunk in payload.chunks(13) {
                    assert!(queue.write(chunk));
                }
                queue.close();
            })
        };

        let mut received = Vec::new();
        let mut buf = [0u8; 5];
        while let Some(n) = queue.read(&mut buf, true) {
            received.extend_from_slice(&buf[..n]);
        }

        writer.join().unwrap();
        assert_eq!(received, payload);
    }
}
