use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use futures::channel::mpsc::{UnboundedReceiver, UnboundedSender, unbounded};

/// Observer for long-running operations. Operations call `set_range` once,
/// then `update` with monotonically increasing values, and poll
/// `is_cancelled` between units of work.
pub trait Progress: Send + Sync {
    fn set_range(&self, min: usize, max: usize);

    fn update(&self, value: usize);

    fn set_message(&self, _message: &str) {}

    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Polls an optional observer for cancellation.
#[inline]
pub(crate) fn cancelled(progress: Option<&dyn Progress>) -> bool {
    progress.is_some_and(|p| p.is_cancelled())
}

/// Shared cancellation flag, cheap to clone across threads.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Records the latest range, value and message of an operation.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    min: AtomicUsize,
    max: AtomicUsize,
    value: AtomicUsize,
    message: Mutex<String>,
    token: CancellationToken,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            ..Self::default()
        }
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn range(&self) -> (usize, usize) {
        (
            self.min.load(Ordering::Relaxed),
            self.max.load(Ordering::Relaxed),
        )
    }

    pub fn value(&self) -> usize {
        self.value.load(Ordering::Relaxed)
    }

    pub fn message(&self) -> String {
        self.message
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    /// Completed fraction in `[0, 1]`.
    pub fn fraction(&self) -> f64 {
        let (min, max) = self.range();
        if max <= min {
            return 1.0;
        }
        let done = self.value().clamp(min, max) - min;
        done as f64 / (max - min) as f64
    }
}

impl Progress for ProgressTracker {
    fn set_range(&self, min: usize, max: usize) {
        self.min.store(min, Ordering::Relaxed);
        self.max.store(max, Ordering::Relaxed);
        self.value.store(min, Ordering::Relaxed);
    }

    fn update(&self, value: usize) {
        self.value.store(value, Ordering::Relaxed);
    }

    fn set_message(&self, message: &str) {
        if let Ok(mut m) = self.message.lock() {
            m.clear();
            m.push_str(message);
        }
    }

    fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProgressEvent {
    Range { min: usize, max: usize },
    Step(usize),
    Message(String),
}

/// Forwards progress as [`ProgressEvent`]s to an async receiver, e.g. a UI
/// task awaiting updates while the work runs on a blocking thread.
#[derive(Debug)]
pub struct ChannelProgress {
    sender: UnboundedSender<ProgressEvent>,
    token: CancellationToken,
}

impl ChannelProgress {
    pub fn new(token: CancellationToken) -> (Self, UnboundedReceiver<ProgressEvent>) {
        let (sender, receiver) = unbounded();
        (Self { sender, token }, receiver)
    }

    fn send(&self, event: ProgressEvent) {
        // A dropped receiver only means nobody is listening any more.
        let _ = self.sender.unbounded_send(event);
    }
}

impl Progress for ChannelProgress {
    fn set_range(&self, min: usize, max: usize) {
        self.send(ProgressEvent::Range { min, max });
    }

    fn update(&self, value: usize) {
        self.send(ProgressEvent::Step(value));
    }

    fn set_message(&self, message: &str) {
        self.send(ProgressEvent::Message(message.to_string()));
    }

    fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}
