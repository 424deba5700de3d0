// Bounded FIFO of inbound frames
//
// The producer side is asynchronous: an interrupt handler or a back-end
// thread appends frames while the foreground logic polls. The lock is
// held only to move an already-assembled frame and bump the ring state,
// never while frame bytes are being copied in or out.

use alloc::collections::VecDeque;
use alloc::sync::Arc;
use alloc::vec::Vec;
use spin::Mutex;

/// One raw inbound frame as handed up by the back-end.
#[derive(Clone, Debug)]
pub struct RxFrame {
    pub data: Vec<u8>,
    /// Arrival timestamp in milliseconds since boot.
    pub tstamp_ms: i64,
}

struct Inner {
    frames: VecDeque<RxFrame>,
    dropped: u64,
}

/// Receive queue shared between the driver and its producer handle.
pub struct ReceiveQueue {
    capacity: usize,
    inner: Mutex<Inner>,
}

impl ReceiveQueue {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            capacity,
            inner: Mutex::new(Inner {
                frames: VecDeque::with_capacity(capacity),
                dropped: 0,
            }),
        })
    }

    /// Append a frame at the producer end.
    ///
    /// # Returns
    /// `false` if the queue was full. The frame is dropped silently and
    /// the drop counter incremented; upper layers never see an error.
    pub fn push(&self, data: Vec<u8>, tstamp_ms: i64) -> bool {
        let mut inner = self.inner.lock();
        if inner.frames.len() >= self.capacity {
            inner.dropped += 1;
            return false;
        }
        inner.frames.push_back(RxFrame { data, tstamp_ms });
        true
    }

    /// Take the oldest queued frame, if any. Non-blocking.
    pub fn poll(&self) -> Option<RxFrame> {
        self.inner.lock().frames.pop_front()
    }

    /// Discard everything queued. Used to recover after a desync.
    pub fn wipe(&self) {
        self.inner.lock().frames.clear();
    }

    /// Total frames dropped because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.inner.lock().dropped
    }

    pub fn len(&self) -> usize {
        self.inner.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn free_slots(&self) -> usize {
        self.capacity - self.len()
    }
}

/// Cloneable handle for the producer (interrupt/back-end) side.
#[derive(Clone)]
pub struct RxProducer {
    queue: Arc<ReceiveQueue>,
}

impl RxProducer {
    pub(crate) fn new(queue: Arc<ReceiveQueue>) -> Self {
        Self { queue }
    }

    /// Append an arrived frame.
    ///
    /// # Arguments
    /// * `data` - The raw frame, link header included
    /// * `tstamp_ms` - Arrival timestamp in milliseconds since boot
    pub fn push(&self, data: Vec<u8>, tstamp_ms: i64) -> bool {
        self.queue.push(data, tstamp_ms)
    }
}
