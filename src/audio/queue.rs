//! Bounded hand-off between the capture producer and the decision thread.
//!
//! The producer side never waits on the consumer: a full queue evicts its
//! oldest frame so the newest capture is always admitted. The consumer sleeps
//! on a condition variable that `push`, `report_failure` and `close` signal.

use super::AudioFrame;
use crate::lock_or_recover;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex};

/// Default queue capacity, in [`AudioFrame`] blocks.
pub const DEFAULT_QUEUE_CAPACITY: usize = 16_384;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// Admitted after evicting the oldest queued frame.
    Evicted,
    /// The queue is closed; the frame was dropped.
    Closed,
}

#[derive(Debug, PartialEq)]
pub enum Batch {
    /// Frames in capture order. Empty when the consumer was woken by a
    /// capture failure rather than by data.
    Frames(Vec<AudioFrame>),
    Closed,
}

#[derive(Default)]
struct QueueState {
    frames: VecDeque<AudioFrame>,
    closed: bool,
    consecutive_failures: u32,
    failure_pending: bool,
}

pub struct CaptureQueue {
    state: Mutex<QueueState>,
    ready: Condvar,
    capacity: usize,
    overflowed: AtomicU64,
}

impl CaptureQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(QueueState {
                frames: VecDeque::with_capacity(capacity.min(1024)),
                ..QueueState::default()
            }),
            ready: Condvar::new(),
            capacity,
            overflowed: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        lock_or_recover(&self.state, "capture queue len").frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Frames evicted because the queue was full.
    pub fn overflow_count(&self) -> u64 {
        self.overflowed.load(Ordering::Relaxed)
    }

    /// Admit `frame`, evicting the oldest frame when full. O(1); only holds the
    /// lock for the duration of the deque operation.
    pub fn push(&self, frame: AudioFrame) -> PushOutcome {
        let outcome = {
            let mut state = lock_or_recover(&self.state, "capture queue push");
            if state.closed {
                return PushOutcome::Closed;
            }
            let outcome = if state.frames.len() >= self.capacity {
                state.frames.pop_front();
                self.overflowed.fetch_add(1, Ordering::Relaxed);
                PushOutcome::Evicted
            } else {
                PushOutcome::Queued
            };
            state.frames.push_back(frame);
            state.consecutive_failures = 0;
            outcome
        };
        self.ready.notify_one();
        outcome
    }

    /// Wait until frames are available, a capture failure is reported, or the
    /// queue is closed. Returns at most `max_frames` frames in capture order.
    /// A closed queue still hands out its remaining frames before `Closed`.
    pub fn pop_batch(&self, max_frames: usize) -> Batch {
        let max_frames = max_frames.max(1);
        let mut state = lock_or_recover(&self.state, "capture queue pop");
        while state.frames.is_empty() && !state.closed && !state.failure_pending {
            state = match self.ready.wait(state) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
        state.failure_pending = false;
        if state.frames.is_empty() && state.closed {
            return Batch::Closed;
        }
        let take = state.frames.len().min(max_frames);
        Batch::Frames(state.frames.drain(..take).collect())
    }

    /// Remove everything currently queued without waiting.
    pub fn take_all(&self) -> Vec<AudioFrame> {
        let mut state = lock_or_recover(&self.state, "capture queue take_all");
        state.frames.drain(..).collect()
    }

    /// Record a failed capture attempt and wake the consumer so it can decide
    /// whether to give up. A successful push resets the count.
    pub fn report_failure(&self) -> u32 {
        let count = {
            let mut state = lock_or_recover(&self.state, "capture queue failure");
            state.consecutive_failures = state.consecutive_failures.saturating_add(1);
            state.failure_pending = true;
            state.consecutive_failures
        };
        self.ready.notify_all();
        count
    }

    pub fn consecutive_failures(&self) -> u32 {
        lock_or_recover(&self.state, "capture queue failures").consecutive_failures
    }

    /// Refuse further pushes and wake every waiting consumer.
    pub fn close(&self) {
        lock_or_recover(&self.state, "capture queue close").closed = true;
        self.ready.notify_all();
    }
}
