use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::flags::StatFlags;
use crate::frame::{
    Frame, DRAIN_MAX_BYTES, DRAIN_MAX_FRAMES, HARD_CAP_BYTES, SLOW_CONSUMER_AGE_SECS, SOFT_CAP_BYTES,
};

/// Opaque identity for a registered subscriber, used to remove it from the
/// engine's subscriber list on disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A connected stat-streaming client (`spec.md` §3 Subscriber).
///
/// The frame queue is a plain `Mutex<VecDeque<Frame>>` rather than an
/// intrusive linked list with a `tail` pointer (`spec.md` §9): `VecDeque`
/// gives the same O(1) push-front/push-back/pop-front the original's
/// pointer-chasing achieved, and `back_mut()` stands in for the `tail`
/// pointer used for append coalescing.
#[derive(Debug)]
pub struct Subscriber {
    pub id: SubscriberId,
    pub mask: StatFlags,
    queue: Mutex<VecDeque<Frame>>,
    queue_bytes: AtomicUsize,
    connection_start: i64,
    error: AtomicBool,
    notify: Notify,
}

impl Subscriber {
    pub fn new(mask: StatFlags, now: i64) -> Arc<Self> {
        Arc::new(Self {
            id: SubscriberId::new(),
            mask,
            queue: Mutex::new(VecDeque::new()),
            queue_bytes: AtomicUsize::new(0),
            connection_start: now,
            error: AtomicBool::new(false),
            notify: Notify::new(),
        })
    }

    pub fn is_admin(&self) -> bool {
        self.mask.is_admin()
    }

    pub fn matches(&self, event_flags: StatFlags) -> bool {
        StatFlags::matches_subscriber(event_flags, self.mask)
    }

    pub fn has_error(&self) -> bool {
        self.error.load(Ordering::Acquire)
    }

    pub fn mark_error(&self) {
        self.error.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    /// Wakes the stream task with no state change, for `clients_wakeup()` /
    /// shutdown so a blocked `wait_for_data` re-checks (e.g. the shutdown
    /// token it also selects on).
    pub fn wake(&self) {
        self.notify.notify_waiters();
    }

    pub fn queue_bytes(&self) -> usize {
        self.queue_bytes.load(Ordering::Acquire)
    }

    /// Appends a line into the tail frame if it fits, otherwise allocates a
    /// new frame (`spec.md` §4.3). Marks the subscriber for termination if
    /// either eviction threshold is crossed.
    pub fn enqueue_line(&self, line: &str, now: i64) {
        let mut queue = self.queue.lock();
        self.push_line_locked(&mut queue, line);
        drop(queue);
        self.enforce_caps(now);
        self.notify.notify_waiters();
    }

    /// Splices a pre-built, already-sealed/unsealed frame list onto the
    /// *front* of the live queue, for the registration consistency protocol
    /// (`spec.md` §4.4 step 3). Must be called while still holding the
    /// subscriber-list-wide registration lock in the caller.
    pub fn splice_front(&self, mut detached: VecDeque<Frame>, now: i64) {
        let mut queue = self.queue.lock();
        let added: usize = detached.iter().map(Frame::len).sum();
        detached.append(&mut queue);
        *queue = detached;
        drop(queue);
        self.queue_bytes.fetch_add(added, Ordering::AcqRel);
        self.enforce_caps(now);
        self.notify.notify_waiters();
    }

    fn push_line_locked(&self, queue: &mut VecDeque<Frame>, line: &str) {
        if let Some(tail) = queue.back_mut() {
            if tail.can_append(line.len()) {
                tail.append(line);
                self.queue_bytes.fetch_add(line.len(), Ordering::AcqRel);
                return;
            }
        }
        let mut frame = Frame::new();
        frame.append(line);
        self.queue_bytes.fetch_add(frame.len(), Ordering::AcqRel);
        queue.push_back(frame);
    }

    fn enforce_caps(&self, now: i64) {
        let bytes = self.queue_bytes();
        if bytes > HARD_CAP_BYTES {
            self.mark_error();
            return;
        }
        if bytes > SOFT_CAP_BYTES && now - self.connection_start > SLOW_CONSUMER_AGE_SECS {
            self.mark_error();
        }
    }

    /// Waits until there is at least one frame queued or the subscriber has
    /// been cancelled, for the `axum::body::Body` stream task to await on
    /// instead of the original's poll-and-reschedule loop (`spec.md` §4.3
    /// expansion).
    pub async fn wait_for_data(&self) {
        if !self.queue.lock().is_empty() || self.has_error() {
            return;
        }
        self.notify.notified().await;
    }

    /// Drains up to [`DRAIN_MAX_FRAMES`] frames or [`DRAIN_MAX_BYTES`] bytes,
    /// concatenated into a single buffer for one `poll_next` (`spec.md`
    /// §4.3's "drains ~50 KB or 12-14 frames per pass").
    pub fn drain_batch(&self) -> Option<Bytes> {
        let mut queue = self.queue.lock();
        if queue.is_empty() {
            return None;
        }
        let mut out = BytesMut::new();
        let mut drained = 0usize;
        while drained < DRAIN_MAX_FRAMES && out.len() < DRAIN_MAX_BYTES {
            let Some(frame) = queue.pop_front() else {
                break;
            };
            let bytes = frame.into_bytes();
            self.queue_bytes.fetch_sub(bytes.len(), Ordering::AcqRel);
            out.extend_from_slice(&bytes);
            drained += 1;
        }
        Some(out.freeze())
    }

    pub fn connection_age(&self, now: i64) -> i64 {
        now - self.connection_start
    }
}

/// The subscribers list, guarded by a plain mutex (`spec.md` §4.2/§5).
///
/// New subscribers are inserted at the head so that, from the instant of
/// registration forward, every subsequently-accepted event is appended to
/// their queue by the normal fan-out path — the first half of the
/// consistency protocol in `spec.md` §4.4.
#[derive(Debug, Default)]
pub struct SubscriberRegistry {
    subscribers: Mutex<Vec<Arc<Subscriber>>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, subscriber: Arc<Subscriber>) {
        self.subscribers.lock().insert(0, subscriber);
    }

    pub fn remove(&self, id: SubscriberId) {
        self.subscribers.lock().retain(|s| s.id != id);
    }

    /// Sends `line` to every subscriber whose mask selects `event_flags`.
    pub fn broadcast(&self, line: &str, event_flags: StatFlags, now: i64) {
        for subscriber in self.subscribers.lock().iter() {
            if subscriber.matches(event_flags) {
                subscriber.enqueue_line(line, now);
            }
        }
    }

    /// Drops every subscriber currently flagged for termination, returning
    /// how many were removed (for logging / tests).
    pub fn reap_errored(&self) -> usize {
        let mut guard = self.subscribers.lock();
        let before = guard.len();
        guard.retain(|s| !s.has_error());
        before - guard.len()
    }

    pub fn snapshot(&self) -> Vec<Arc<Subscriber>> {
        self.subscribers.lock().clone()
    }

    /// Wakes every registered subscriber's stream task (`clients_wakeup`).
    pub fn wake_all(&self) {
        for subscriber in self.subscribers.lock().iter() {
            subscriber.wake();
        }
    }

    pub fn len(&self) -> usize {
        self.subscribers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_coalesces_under_threshold() {
        let sub = Subscriber::new(StatFlags::GENERAL, 0);
        sub.enqueue_line("EVENT global a 1\n", 0);
        sub.enqueue_line("EVENT global b 2\n", 0);
        let batch = sub.drain_batch().unwrap();
        assert_eq!(batch.as_ref(), b"EVENT global a 1\nEVENT global b 2\n");
        assert!(sub.drain_batch().is_none());
    }

    #[test]
    fn hard_cap_marks_error() {
        let sub = Subscriber::new(StatFlags::GENERAL, 0);
        let line = "x".repeat(4000) + "\n";
        for _ in 0..(crate::frame::HARD_CAP_BYTES / line.len() + 2) {
            sub.enqueue_line(&line, 0);
        }
        assert!(sub.has_error());
    }

    #[test]
    fn registry_broadcast_respects_mask() {
        let registry = SubscriberRegistry::new();
        let admin = Subscriber::new(StatFlags::HIDDEN, 0);
        let pub_sub = Subscriber::new(StatFlags::GENERAL, 0);
        registry.register(admin.clone());
        registry.register(pub_sub.clone());

        registry.broadcast("EVENT global clients 1\n", StatFlags::GENERAL, 0);
        assert!(admin.drain_batch().is_some());
        assert!(pub_sub.drain_batch().is_some());

        registry.broadcast("EVENT global secret 1\n", StatFlags::HIDDEN, 0);
        assert!(admin.drain_batch().is_some());
        assert!(pub_sub.drain_batch().is_none());
    }
}
