//! Recycling pool of part-sized buffers.
//!
//! Buffers move between three owners: the pool while idle, a fetcher while it
//! fills one, and the reader while the consumer copies out of it. A
//! [`PooledBuffer`] is move-only and returns itself to the pool when dropped,
//! so each acquisition is released exactly once.

use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Snapshot of pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    /// Buffers ever allocated by the pool.
    pub allocated:   usize,
    /// Buffers idle in the pool.
    pub available:   usize,
    /// Buffers currently handed out.
    pub outstanding: usize,
}

/// Concurrent free-list of buffers with a fixed capacity.
///
/// The pool grows on demand and never blocks an acquirer.
pub struct BufferPool {
    buffer_len:  usize,
    free:        Mutex<Vec<Vec<u8>>>,
    allocated:   AtomicUsize,
    outstanding: AtomicUsize,
}

impl BufferPool {
    pub fn new(buffer_len: usize) -> Arc<Self> {
        Arc::new(Self {
            buffer_len,
            free: Mutex::new(Vec::new()),
            allocated: AtomicUsize::new(0),
            outstanding: AtomicUsize::new(0),
        })
    }

    /// Capacity of every buffer handed out.
    pub fn buffer_len(&self) -> usize { self.buffer_len }

    /// Take an empty buffer, recycling an idle one when possible.
    pub fn acquire(self: &Arc<Self>) -> PooledBuffer {
        let recycled = self
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();

        let buf = recycled.unwrap_or_else(|| {
            self.allocated.fetch_add(1, Ordering::Relaxed);
            Vec::with_capacity(self.buffer_len)
        });
        self.outstanding.fetch_add(1, Ordering::AcqRel);

        PooledBuffer {
            buf,
            pool: Arc::clone(self),
        }
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            allocated:   self.allocated.load(Ordering::Relaxed),
            available:   self.free.lock().unwrap_or_else(PoisonError::into_inner).len(),
            outstanding: self.outstanding.load(Ordering::Acquire),
        }
    }

    fn release(&self, mut buf: Vec<u8>) {
        let previous = self.outstanding.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "buffer released more often than acquired");

        buf.clear();
        self.free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(buf);
    }
}

impl fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferPool")
            .field("buffer_len", &self.buffer_len)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Exclusive handle on a pool buffer.
///
/// Dereferences to the filled prefix. Dropping the handle returns the buffer.
pub struct PooledBuffer {
    buf:  Vec<u8>,
    pool: Arc<BufferPool>,
}

impl PooledBuffer {
    pub fn capacity(&self) -> usize { self.pool.buffer_len }

    /// Bytes still free before the buffer reaches its pool capacity.
    pub fn remaining(&self) -> usize { self.capacity().saturating_sub(self.buf.len()) }

    /// Append `data`, truncated to the remaining capacity.
    ///
    /// Returns the number of bytes taken. The buffer never grows past its pool
    /// capacity, so recycling never reallocates.
    pub fn fill_from(&mut self, data: &[u8]) -> usize {
        let n = data.len().min(self.remaining());
        self.buf.extend_from_slice(&data[..n]);
        n
    }
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] { &self.buf }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) { self.pool.release(std::mem::take(&mut self.buf)); }
}

impl fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("len", &self.buf.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_allocates_on_demand() {
        let pool = BufferPool::new(8);
        let a = pool.acquire();
        let b = pool.acquire();
        assert_eq!(
            pool.stats(),
            PoolStats {
                allocated:   2,
                available:   0,
                outstanding: 2,
            }
        );
        drop(a);
        drop(b);
        assert_eq!(
            pool.stats(),
            PoolStats {
                allocated:   2,
                available:   2,
                outstanding: 0,
            }
        );
    }

    #[test]
    fn test_release_recycles_storage() {
        let pool = BufferPool::new(8);
        let mut buf = pool.acquire();
        buf.fill_from(b"abc");
        let ptr = buf.as_ptr();
        drop(buf);

        let again = pool.acquire();
        assert!(again.is_empty(), "recycled buffer must come back empty");
        assert_eq!(again.as_ptr(), ptr);
        assert_eq!(pool.stats().allocated, 1);
    }

    #[test]
    fn test_fill_is_bounded_by_capacity() {
        let pool = BufferPool::new(4);
        let mut buf = pool.acquire();
        assert_eq!(buf.fill_from(b"abc"), 3);
        assert_eq!(buf.fill_from(b"defg"), 1);
        assert_eq!(&*buf, b"abcd");
        assert_eq!(buf.remaining(), 0);
        assert_eq!(buf.fill_from(b"h"), 0);
    }

    #[test]
    fn test_concurrent_acquire_release_balances() {
        let pool = BufferPool::new(64);
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let pool = Arc::clone(&pool);
                std::thread::spawn(move || {
                    for i in 0..200u8 {
                        let mut buf = pool.acquire();
                        buf.fill_from(&[t as u8, i]);
                        assert_eq!(buf.len(), 2);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let stats = pool.stats();
        assert_eq!(stats.outstanding, 0);
        assert_eq!(stats.available, stats.allocated);
        assert!(stats.allocated <= 8);
    }
}
