//! Status records and the single-writer broadcast channel

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use parking_lot::{Condvar, Mutex, RwLock};

use super::phase::Phase;
use crate::perception::StateLabel;

/// Pending updates beyond this depth drop the oldest entry; a slow
/// observer must not stall the control thread.
const QUEUE_LIMIT: usize = 64;

/// Snapshot of the controller published to observers.
#[derive(Debug, Clone)]
pub struct Status {
    pub phase: Phase,
    pub last_detected_label: Option<StateLabel>,
    pub last_confidence: Option<f32>,
    pub round_count: u64,
    pub last_error: Option<String>,
    pub updated_at: Instant,
}

impl Status {
    pub(crate) fn initial() -> Self {
        Self {
            phase: Phase::Stopped,
            last_detected_label: None,
            last_confidence: None,
            round_count: 0,
            last_error: None,
            updated_at: Instant::now(),
        }
    }
}

type Callback = Box<dyn Fn(&Status) + Send>;

struct Subscriber {
    id: u64,
    callback: Callback,
}

/// Handle returned by [`StatusChannel::subscribe`]; pass it back to
/// [`StatusChannel::unsubscribe`] to remove the callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionHandle(u64);

struct ChannelShared {
    current: RwLock<Status>,
    subscribers: Mutex<Vec<Subscriber>>,
    queue: Mutex<VecDeque<Status>>,
    wakeup: Condvar,
    closed: AtomicBool,
    next_id: AtomicU64,
}

/// One-writer, many-reader status broadcast.
///
/// The writer publishes under its own lock; callbacks run on the channel's
/// delivery thread, never on the writer's. Readers can also poll the latest
/// snapshot atomically.
pub struct StatusChannel {
    shared: Arc<ChannelShared>,
    delivery: Mutex<Option<JoinHandle<()>>>,
}

impl StatusChannel {
    pub fn new() -> Self {
        let shared = Arc::new(ChannelShared {
            current: RwLock::new(Status::initial()),
            subscribers: Mutex::new(Vec::new()),
            queue: Mutex::new(VecDeque::new()),
            wakeup: Condvar::new(),
            closed: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
        });

        let delivery = {
            let shared = shared.clone();
            thread::spawn(move || delivery_loop(shared))
        };

        Self {
            shared,
            delivery: Mutex::new(Some(delivery)),
        }
    }

    /// Latest snapshot.
    pub fn snapshot(&self) -> Status {
        self.shared.current.read().clone()
    }

    /// Record a new snapshot and schedule callback delivery.
    pub(crate) fn publish(&self, status: Status) {
        *self.shared.current.write() = status.clone();

        let mut queue = self.shared.queue.lock();
        if queue.len() >= QUEUE_LIMIT {
            queue.pop_front();
        }
        queue.push_back(status);
        drop(queue);
        self.shared.wakeup.notify_one();
    }

    /// Register a callback invoked on every update.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: Fn(&Status) + Send + 'static,
    {
        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst);
        self.shared.subscribers.lock().push(Subscriber {
            id,
            callback: Box::new(callback),
        });
        SubscriptionHandle(id)
    }

    pub fn unsubscribe(&self, handle: SubscriptionHandle) {
        self.shared.subscribers.lock().retain(|s| s.id != handle.0);
    }
}

impl Default for StatusChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for StatusChannel {
    fn drop(&mut self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        self.shared.wakeup.notify_all();
        if let Some(handle) = self.delivery.lock().take() {
            let _ = handle.join();
        }
    }
}

fn delivery_loop(shared: Arc<ChannelShared>) {
    loop {
        let status = {
            let mut queue = shared.queue.lock();
            while queue.is_empty() {
                if shared.closed.load(Ordering::SeqCst) {
                    return;
                }
                shared.wakeup.wait(&mut queue);
            }
            queue.pop_front().unwrap()
        };

        let subscribers = shared.subscribers.lock();
        for subscriber in subscribers.iter() {
            (subscriber.callback)(&status);
        }
    }
}
