use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::models::audio_frame::AudioFrame;

/// Outcome of waiting on the queue.
#[derive(Debug, PartialEq, Eq)]
pub enum Pop {
    Frame(AudioFrame),
    /// Nothing arrived within the timeout; the queue is still open.
    TimedOut,
    /// The queue is closed and every frame has been handed out.
    Drained,
}

#[derive(Debug, Default)]
struct QueueState {
    frames: VecDeque<AudioFrame>,
    closed: bool,
}

/// Thread-safe FIFO connecting capture producers to the writer thread.
///
/// Frames leave in the order they were pushed. The queue is unbounded: it is
/// drained every poll interval, and dropping audio is not an option while a
/// recording is active. After `close()` new frames are refused (and counted),
/// while frames already queued are still handed out until the queue is empty.
#[derive(Debug, Default)]
pub struct FrameQueue {
    state: Mutex<QueueState>,
    available: Condvar,
    pushed: AtomicU64,
    rejected: AtomicU64,
}

impl FrameQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a frame. Returns `false` if the queue was already closed.
    pub fn push(&self, frame: AudioFrame) -> bool {
        {
            let mut state = self.state.lock();
            if state.closed {
                drop(state);
                let rejected = self.rejected.fetch_add(1, Ordering::Relaxed) + 1;
                log::warn!("frame queue closed, rejected frame ({} so far)", rejected);
                return false;
            }
            state.frames.push_back(frame);
        }
        self.pushed.fetch_add(1, Ordering::Relaxed);
        self.available.notify_one();
        true
    }

    /// Take the oldest frame, waiting up to `timeout` for one to arrive.
    pub fn pop_timeout(&self, timeout: Duration) -> Pop {
        let mut state = self.state.lock();
        if state.frames.is_empty() && !state.closed {
            self.available.wait_for(&mut state, timeout);
        }
        match state.frames.pop_front() {
            Some(frame) => Pop::Frame(frame),
            None if state.closed => Pop::Drained,
            None => Pop::TimedOut,
        }
    }

    /// Take the oldest frame without waiting.
    pub fn try_pop(&self) -> Option<AudioFrame> {
        self.state.lock().frames.pop_front()
    }

    /// Refuse further frames and wake every waiter.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.available.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Number of frames waiting to be written.
    pub fn len(&self) -> usize {
        self.state.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().frames.is_empty()
    }

    pub fn pushed_count(&self) -> u64 {
        self.pushed.load(Ordering::Relaxed)
    }

    pub fn rejected_count(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}

/// Producer handle onto a [`FrameQueue`], handed to backends when they open.
#[derive(Debug, Clone)]
pub struct FrameSink {
    queue: Arc<FrameQueue>,
}

impl FrameSink {
    pub fn new(queue: Arc<FrameQueue>) -> Self {
        Self { queue }
    }

    pub fn push(&self, frame: AudioFrame) -> bool {
        self.queue.push(frame)
    }

    pub fn is_closed(&self) -> bool {
        self.queue.is_closed()
    }
}
