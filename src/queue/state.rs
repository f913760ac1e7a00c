use std::sync::atomic::{AtomicUsize, Ordering};

/// Shared read/write indices of one ring
/// `read` is only stored by the consumer, `write` only by the producer
#[derive(Debug, Default)]
pub struct QueueState {
    read: AtomicUsize,
    write: AtomicUsize,
}

/// Point-in-time copy of both indices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexSnapshot {
    pub read: usize,
    pub write: usize,
}

impl QueueState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load both indices with acquire ordering
    pub fn snapshot(&self) -> IndexSnapshot {
        IndexSnapshot {
            read: self.read.load(Ordering::Acquire),
            write: self.write.load(Ordering::Acquire),
        }
    }

    /// Producer view: own index relaxed, the consumer's with acquire
    pub(crate) fn producer_view(&self) -> IndexSnapshot {
        IndexSnapshot {
            read: self.read.load(Ordering::Acquire),
            write: self.write.load(Ordering::Relaxed),
        }
    }

    /// Consumer view: own index relaxed, the producer's with acquire
    pub(crate) fn consumer_view(&self) -> IndexSnapshot {
        IndexSnapshot {
            read: self.read.load(Ordering::Relaxed),
            write: self.write.load(Ordering::Acquire),
        }
    }

    /// Publish a new write index after the samples are in place
    pub(crate) fn publish_write(&self, index: usize) {
        self.write.store(index, Ordering::Release);
    }

    /// Publish a new read index after the samples were copied out
    pub(crate) fn publish_read(&self, index: usize) {
        self.read.store(index, Ordering::Release);
    }
}

impl IndexSnapshot {
    /// Frames between read and write, modulo the backing length
    pub fn available_read(&self, buffer_length: usize) -> usize {
        if self.write >= self.read {
            self.write - self.read
        } else {
            self.write + buffer_length - self.read
        }
    }

    /// Free slots, always keeping one slot empty
    pub fn available_write(&self, buffer_length: usize) -> usize {
        buffer_length - 1 - self.available_read(buffer_length)
    }
}
