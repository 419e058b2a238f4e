//! Single-slot latest-value mailbox.
//!
//! The producer is the only writer and the consumer the only reader. A new
//! `put` replaces any unread value; nothing ever queues behind it.

use parking_lot::Mutex;

/// One-slot channel where the most recent `put` wins.
#[derive(Debug)]
pub struct LatestValueQueue<T> {
    slot: Mutex<Option<T>>,
}

impl<T> LatestValueQueue<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// Store `value`, returning the unread value it replaced, if any.
    ///
    /// Never blocks beyond the slot lock.
    pub fn put(&self, value: T) -> Option<T> {
        self.slot.lock().replace(value)
    }

    /// Take the stored value, leaving the slot empty.
    pub fn try_get(&self) -> Option<T> {
        self.slot.lock().take()
    }

    /// Take the stored value only when `pred` accepts it.
    pub fn take_if(&self, pred: impl FnOnce(&T) -> bool) -> Option<T> {
        let mut slot = self.slot.lock();
        if slot.as_ref().is_some_and(pred) {
            slot.take()
        } else {
            None
        }
    }

    pub fn is_empty(&self) -> bool {
        self.slot.lock().is_none()
    }
}

impl<T> Default for LatestValueQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_empty_on_creation() {
        let queue: LatestValueQueue<u32> = LatestValueQueue::new();
        assert!(queue.is_empty());
        assert_eq!(queue.try_get(), None);
    }

    #[test]
    fn test_second_put_wins() {
        let queue = LatestValueQueue::new();
        assert_eq!(queue.put(1), None);
        assert_eq!(queue.put(2), Some(1));

        assert_eq!(queue.try_get(), Some(2));
        assert!(queue.is_empty());
        assert_eq!(queue.try_get(), None);
    }

    #[test]
    fn test_take_if_leaves_rejected_value() {
        let queue = LatestValueQueue::new();
        queue.put(7);
        assert_eq!(queue.take_if(|v| *v > 10), None);
        assert!(!queue.is_empty());

        assert_eq!(queue.take_if(|v| *v == 7), Some(7));
        assert!(queue.is_empty());
        assert_eq!(queue.take_if(|_| true), None);
    }

    #[test]
    fn test_concurrent_producer_consumer_sees_latest() {
        let queue = Arc::new(LatestValueQueue::new());
        let writer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for i in 0..10_000u32 {
                    queue.put(i);
                }
            })
        };

        let mut last_seen = None;
        while !writer.is_finished() {
            if let Some(v) = queue.try_get() {
                if let Some(prev) = last_seen {
                    assert!(v > prev, "values must arrive in put order");
                }
                last_seen = Some(v);
            }
        }
        writer.join().unwrap();

        if let Some(v) = queue.try_get() {
            last_seen = Some(v);
        }
        assert_eq!(last_seen, Some(9_999));
    }
}
