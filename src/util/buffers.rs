//! Buffer pool handle.
//!
//! The forwarder allocates its transfer buffers from a per-node pool; the
//! cluster core only carries the handle around. Buffers are recycled
//! through a lock-free queue; when the queue is empty a fresh buffer is
//! allocated, and when it is full returned buffers are simply dropped.

use bytes::BytesMut;
use crossbeam_queue::ArrayQueue;
use std::sync::Arc;

const DEFAULT_BUFFER_SIZE: usize = 16 * 1024;
const DEFAULT_POOL_CAPACITY: usize = 128;

/// Cheap-to-clone pool of fixed-size byte buffers.
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    buffer_size: usize,
    free: ArrayQueue<BytesMut>,
}

impl BufferPool {
    pub fn new(buffer_size: usize, capacity: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                buffer_size,
                free: ArrayQueue::new(capacity.max(1)),
            }),
        }
    }

    /// Size of the buffers this pool hands out.
    pub fn buffer_size(&self) -> usize {
        self.inner.buffer_size
    }

    /// Take a buffer from the pool, allocating if none is free.
    pub fn allocate(&self) -> BytesMut {
        self.inner
            .free
            .pop()
            .unwrap_or_else(|| BytesMut::with_capacity(self.inner.buffer_size))
    }

    /// Return a buffer for reuse. Undersized or excess buffers are dropped.
    pub fn release(&self, mut buffer: BytesMut) {
        if buffer.capacity() < self.inner.buffer_size {
            return;
        }
        buffer.clear();
        let _ = self.inner.free.push(buffer);
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_SIZE, DEFAULT_POOL_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_and_release() {
        let pool = BufferPool::new(1024, 4);

        let buf = pool.allocate();
        assert!(buf.capacity() >= 1024);
        pool.release(buf);

        // The recycled buffer comes back cleared.
        let buf = pool.allocate();
        assert!(buf.is_empty());
        assert!(buf.capacity() >= 1024);
    }

    #[test]
    fn test_undersized_buffers_are_dropped() {
        let pool = BufferPool::new(4096, 4);
        pool.release(BytesMut::with_capacity(16));

        let buf = pool.allocate();
        assert!(buf.capacity() >= 4096);
    }

    #[test]
    fn test_full_pool_drops_excess() {
        let pool = BufferPool::new(64, 1);
        pool.release(BytesMut::with_capacity(64));
        // Pool is full; this release is a no-op rather than an error.
        pool.release(BytesMut::with_capacity(64));
    }
}
