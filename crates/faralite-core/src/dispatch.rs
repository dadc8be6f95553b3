//! Bounded outbound dispatch queue.
//!
//! Producers call [`DispatchQueue::send`], which never blocks. A single
//! dispatch loop drains the queue with [`DispatchQueue::next`] and writes
//! to the transport.

use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

/// What to do when a send finds the queue full.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OverflowPolicy {
    /// Evict the oldest queued item to make room.
    #[default]
    DropOldest,
    /// Refuse the new item.
    Reject,
}

impl FromStr for OverflowPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "dropoldest" => Ok(Self::DropOldest),
            "reject" => Ok(Self::Reject),
            other => Err(format!("unknown overflow policy: {other}")),
        }
    }
}

/// Outcome of [`DispatchQueue::send`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendStatus {
    /// Enqueued.
    Queued,
    /// Enqueued after evicting the oldest item.
    QueuedDroppedOldest,
    /// Queue full and policy is [`OverflowPolicy::Reject`].
    Full,
    /// Queue not yet opened (or suspended).
    NotConnected,
    /// Queue permanently closed.
    Closed,
}

impl SendStatus {
    /// Whether the message was accepted.
    pub fn is_sent(self) -> bool {
        matches!(self, Self::Queued | Self::QueuedDroppedOldest)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum QueueState {
    Pending,
    Open,
    Closed,
}

struct Inner<T> {
    state: QueueState,
    items: VecDeque<T>,
}

/// Bounded FIFO between producers and one dispatch loop.
pub struct DispatchQueue<T> {
    inner: Mutex<Inner<T>>,
    notify: Notify,
    capacity: usize,
    policy: OverflowPolicy,
    dropped: AtomicU64,
}

impl<T> DispatchQueue<T> {
    /// Create a queue in the pending state. Capacity is at least 1.
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: QueueState::Pending,
                items: VecDeque::new(),
            }),
            notify: Notify::new(),
            capacity: capacity.max(1),
            policy,
            dropped: AtomicU64::new(0),
        }
    }

    /// Allow sends. No-op once closed.
    pub fn open(&self) {
        let mut inner = self.inner.lock();
        if inner.state == QueueState::Pending {
            inner.state = QueueState::Open;
        }
    }

    /// Return to pending, discarding queued items. Used when a transport
    /// drops but may come back.
    pub fn suspend(&self) {
        {
            let mut inner = self.inner.lock();
            if inner.state != QueueState::Open {
                return;
            }
            inner.state = QueueState::Pending;
            inner.items.clear();
        }
        self.notify.notify_waiters();
    }

    /// Close permanently. Returns `true` on the first call.
    pub fn close(&self) -> bool {
        {
            let mut inner = self.inner.lock();
            if inner.state == QueueState::Closed {
                return false;
            }
            inner.state = QueueState::Closed;
            inner.items.clear();
        }
        self.notify.notify_waiters();
        true
    }

    /// Whether sends are currently accepted.
    pub fn is_open(&self) -> bool {
        self.inner.lock().state == QueueState::Open
    }

    /// Whether the queue has been closed.
    pub fn is_closed(&self) -> bool {
        self.inner.lock().state == QueueState::Closed
    }

    /// Enqueue without blocking.
    pub fn send(&self, item: T) -> SendStatus {
        let status = {
            let mut inner = self.inner.lock();
            match inner.state {
                QueueState::Pending => return SendStatus::NotConnected,
                QueueState::Closed => return SendStatus::Closed,
                QueueState::Open => {}
            }
            if inner.items.len() < self.capacity {
                inner.items.push_back(item);
                SendStatus::Queued
            } else {
                match self.policy {
                    OverflowPolicy::Reject => {
                        let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
                        return SendStatus::Full;
                    }
                    OverflowPolicy::DropOldest => {
                        let _ = inner.items.pop_front();
                        inner.items.push_back(item);
                        let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
                        SendStatus::QueuedDroppedOldest
                    }
                }
            }
        };
        self.notify.notify_one();
        status
    }

    /// Wait for the next item. Returns `None` once the queue is no longer
    /// open.
    pub async fn next(&self) -> Option<T> {
        loop {
            // Registered before the check so a send between the check and
            // the await still wakes us.
            let notified = self.notify.notified();
            {
                let mut inner = self.inner.lock();
                if inner.state != QueueState::Open {
                    return None;
                }
                if let Some(item) = inner.items.pop_front() {
                    return Some(item);
                }
            }
            notified.await;
        }
    }

    /// Items currently queued.
    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Items evicted or rejected because the queue was full.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn open_queue(capacity: usize, policy: OverflowPolicy) -> DispatchQueue<u32> {
        let q = DispatchQueue::new(capacity, policy);
        q.open();
        q
    }

    #[test]
    fn pending_queue_refuses_sends() {
        let q: DispatchQueue<u32> = DispatchQueue::new(4, OverflowPolicy::default());
        assert_eq!(q.send(1), SendStatus::NotConnected);
        assert!(q.is_empty());
    }

    #[test]
    fn closed_queue_refuses_sends() {
        let q = open_queue(4, OverflowPolicy::DropOldest);
        assert!(q.close());
        assert!(!q.close());
        assert_eq!(q.send(1), SendStatus::Closed);
        q.open();
        assert!(q.is_closed());
    }

    #[test]
    fn drop_oldest_evicts_front() {
        let q = open_queue(2, OverflowPolicy::DropOldest);
        assert_eq!(q.send(1), SendStatus::Queued);
        assert_eq!(q.send(2), SendStatus::Queued);
        assert_eq!(q.send(3), SendStatus::QueuedDroppedOldest);
        assert_eq!(q.len(), 2);
        assert_eq!(q.dropped_count(), 1);
    }

    #[test]
    fn reject_keeps_existing_items() {
        let q = open_queue(1, OverflowPolicy::Reject);
        assert_eq!(q.send(1), SendStatus::Queued);
        assert_eq!(q.send(2), SendStatus::Full);
        assert!(!SendStatus::Full.is_sent());
        assert_eq!(q.len(), 1);
        assert_eq!(q.dropped_count(), 1);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let q = open_queue(0, OverflowPolicy::Reject);
        assert_eq!(q.capacity(), 1);
        assert_eq!(q.send(1), SendStatus::Queued);
    }

    #[test]
    fn suspend_clears_and_returns_to_pending() {
        let q = open_queue(4, OverflowPolicy::DropOldest);
        let _ = q.send(1);
        q.suspend();
        assert!(q.is_empty());
        assert_eq!(q.send(2), SendStatus::NotConnected);
        q.open();
        assert_eq!(q.send(3), SendStatus::Queued);
    }

    #[tokio::test]
    async fn next_yields_fifo_order() {
        let q = open_queue(8, OverflowPolicy::DropOldest);
        for i in 0..5 {
            assert!(q.send(i).is_sent());
        }
        for i in 0..5 {
            assert_eq!(q.next().await, Some(i));
        }
    }

    #[tokio::test]
    async fn drop_oldest_delivers_newest() {
        let q = open_queue(2, OverflowPolicy::DropOldest);
        let _ = q.send(1);
        let _ = q.send(2);
        let _ = q.send(3);
        assert_eq!(q.next().await, Some(2));
        assert_eq!(q.next().await, Some(3));
    }

    #[tokio::test]
    async fn next_wakes_on_send() {
        let q = Arc::new(open_queue(4, OverflowPolicy::DropOldest));
        let consumer = {
            let q = Arc::clone(&q);
            tokio::spawn(async move { q.next().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(q.send(9), SendStatus::Queued);
        let got = tokio::time::timeout(Duration::from_secs(1), consumer).await.unwrap().unwrap();
        assert_eq!(got, Some(9));
    }

    #[tokio::test]
    async fn next_returns_none_on_close() {
        let q = Arc::new(open_queue(4, OverflowPolicy::DropOldest));
        let consumer = {
            let q = Arc::clone(&q);
            tokio::spawn(async move { q.next().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(q.close());
        let got = tokio::time::timeout(Duration::from_secs(1), consumer).await.unwrap().unwrap();
        assert_eq!(got, None);
    }

    #[tokio::test]
    async fn next_on_pending_returns_none() {
        let q: DispatchQueue<u32> = DispatchQueue::new(4, OverflowPolicy::default());
        assert_eq!(q.next().await, None);
    }

    #[test]
    fn overflow_policy_parsing() {
        assert_eq!("drop_oldest".parse::<OverflowPolicy>().unwrap(), OverflowPolicy::DropOldest);
        assert_eq!("dropOldest".parse::<OverflowPolicy>().unwrap(), OverflowPolicy::DropOldest);
        assert_eq!("REJECT".parse::<OverflowPolicy>().unwrap(), OverflowPolicy::Reject);
        assert!("block".parse::<OverflowPolicy>().is_err());
    }

    #[test]
    fn overflow_policy_serde_is_camel_case() {
        assert_eq!(serde_json::to_string(&OverflowPolicy::DropOldest).unwrap(), "\"dropOldest\"");
    }
}
