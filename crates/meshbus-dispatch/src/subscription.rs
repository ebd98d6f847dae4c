use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
#[cfg(feature = "async")]
use std::task::{Context, Poll};
use std::task::Waker;
use std::time::{Duration, Instant};

use tracing::trace;

use crate::error::{RecvTimeoutError, TryRecvError};

/// Result of offering one item to a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    Queued,
    /// Queued after evicting the oldest buffered item.
    Evicted,
    Closed,
    /// The value was not of the queue's item type.
    Mismatch,
}

impl Delivery {
    pub(crate) fn is_delivered(self) -> bool {
        matches!(self, Delivery::Queued | Delivery::Evicted)
    }
}

/// Bounded drop-oldest queue shared by the registry (producer side) and one
/// [`Subscription`] (consumer side).
pub(crate) struct Queue<T> {
    state: Mutex<QueueState<T>>,
    ready: Condvar,
    capacity: usize,
}

struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
    evicted: u64,
    wakers: Vec<Waker>,
}

impl<T> Queue<T> {
    pub(crate) fn new(capacity: usize) -> Arc<Self> {
        let capacity = capacity.max(1);
        Arc::new(Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity),
                closed: false,
                evicted: 0,
                wakers: Vec::new(),
            }),
            ready: Condvar::new(),
            capacity,
        })
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue without blocking, evicting the oldest entry when full.
    pub(crate) fn push(&self, item: T) -> Delivery {
        let (delivery, wakers) = {
            let mut state = self.lock();
            if state.closed {
                return Delivery::Closed;
            }
            let delivery = if state.items.len() >= self.capacity {
                state.items.pop_front();
                state.evicted = state.evicted.saturating_add(1);
                Delivery::Evicted
            } else {
                Delivery::Queued
            };
            state.items.push_back(item);
            (delivery, std::mem::take(&mut state.wakers))
        };

        if delivery == Delivery::Evicted {
            trace!(capacity = self.capacity, "subscription full, dropped oldest entry");
        }
        self.ready.notify_all();
        for waker in wakers {
            waker.wake();
        }
        delivery
    }

    /// Close the queue, discard buffered entries and wake every waiter.
    pub(crate) fn close(&self) {
        let wakers = {
            let mut state = self.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            state.items.clear();
            std::mem::take(&mut state.wakers)
        };
        self.ready.notify_all();
        for waker in wakers {
            waker.wake();
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.lock().closed
    }

    #[cfg(feature = "async")]
    fn poll_recv(&self, cx: &mut Context<'_>) -> Poll<Option<T>> {
        let mut state = self.lock();
        if let Some(item) = state.items.pop_front() {
            return Poll::Ready(Some(item));
        }
        if state.closed {
            return Poll::Ready(None);
        }
        if !state.wakers.iter().any(|w| w.will_wake(cx.waker())) {
            state.wakers.push(cx.waker().clone());
        }
        Poll::Pending
    }
}

/// Type-erased producer side of a queue, as held by the registry.
pub(crate) trait Sink: Send + Sync {
    fn deliver(&self, value: &(dyn Any + Send)) -> Delivery;
    fn close(&self);
    fn is_closed(&self) -> bool;
}

impl<T: Clone + Send + 'static> Sink for Queue<T> {
    fn deliver(&self, value: &(dyn Any + Send)) -> Delivery {
        match value.downcast_ref::<T>() {
            Some(item) => self.push(item.clone()),
            None => Delivery::Mismatch,
        }
    }

    fn close(&self) {
        Queue::close(self);
    }

    fn is_closed(&self) -> bool {
        Queue::is_closed(self)
    }
}

/// A consumer-owned stream of messages of one type (or of raw payloads).
///
/// Iterating blocks until the next message arrives and ends once the
/// subscription is closed: explicitly, by dropping it, or by the bus
/// stopping. Closing discards anything still buffered.
pub struct Subscription<T> {
    queue: Arc<Queue<T>>,
}

impl<T> Subscription<T> {
    pub(crate) fn new(queue: Arc<Queue<T>>) -> Self {
        Self { queue }
    }

    /// Block until the next message, or `None` once closed.
    pub fn recv(&self) -> Option<T> {
        let mut state = self.queue.lock();
        loop {
            if let Some(item) = state.items.pop_front() {
                return Some(item);
            }
            if state.closed {
                return None;
            }
            state = self
                .queue
                .ready
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Take the next buffered message without blocking.
    pub fn try_recv(&self) -> Result<T, TryRecvError> {
        let mut state = self.queue.lock();
        match state.items.pop_front() {
            Some(item) => Ok(item),
            None if state.closed => Err(TryRecvError::Closed),
            None => Err(TryRecvError::Empty),
        }
    }

    /// Block for at most `timeout` waiting for the next message.
    ///
    /// A timeout too large to represent as a deadline waits without limit.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<T, RecvTimeoutError> {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return self.recv().ok_or(RecvTimeoutError::Closed);
        };
        let mut state = self.queue.lock();
        loop {
            if let Some(item) = state.items.pop_front() {
                return Ok(item);
            }
            if state.closed {
                return Err(RecvTimeoutError::Closed);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(RecvTimeoutError::Timeout);
            }
            let (next, _) = self
                .queue
                .ready
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            state = next;
        }
    }

    /// Wait asynchronously for the next message, or `None` once closed.
    #[cfg(feature = "async")]
    pub async fn recv_async(&self) -> Option<T> {
        std::future::poll_fn(|cx| self.queue.poll_recv(cx)).await
    }

    /// Stop delivery and discard buffered messages.
    pub fn close(&self) {
        self.queue.close();
    }

    pub fn is_closed(&self) -> bool {
        self.queue.is_closed()
    }

    /// Number of buffered, unread messages.
    pub fn len(&self) -> usize {
        self.queue.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity
    }

    /// How many messages were evicted unread because the queue was full.
    pub fn evicted(&self) -> u64 {
        self.queue.lock().evicted
    }
}

impl<T> Iterator for Subscription<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.recv()
    }
}

#[cfg(feature = "async")]
impl<T> futures_core::Stream for Subscription<T> {
    type Item = T;

    fn poll_next(
        self: std::pin::Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        self.queue.poll_recv(cx)
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.queue.close();
    }
}

impl<T> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.queue.lock();
        f.debug_struct("Subscription")
            .field("buffered", &state.items.len())
            .field("capacity", &self.queue.capacity)
            .field("closed", &state.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    fn subscription(capacity: usize) -> (Arc<Queue<u32>>, Subscription<u32>) {
        let queue = Queue::new(capacity);
        (Arc::clone(&queue), Subscription::new(queue))
    }

    #[test]
    fn seventh_item_evicts_first() {
        let (queue, sub) = subscription(6);
        for i in 1..=6 {
            assert_eq!(queue.push(i), Delivery::Queued);
        }
        assert_eq!(queue.push(7), Delivery::Evicted);

        let drained: Vec<u32> = (0..6).map(|_| sub.try_recv().unwrap()).collect();
        assert_eq!(drained, vec![2, 3, 4, 5, 6, 7]);
        assert_eq!(sub.try_recv(), Err(TryRecvError::Empty));
        assert_eq!(sub.evicted(), 1);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let (queue, sub) = subscription(0);
        assert_eq!(sub.capacity(), 1);
        queue.push(1);
        queue.push(2);
        assert_eq!(sub.try_recv(), Ok(2));
    }

    #[test]
    fn close_discards_and_rejects() {
        let (queue, sub) = subscription(6);
        queue.push(1);
        queue.push(2);
        sub.close();

        assert!(sub.is_closed());
        assert!(sub.is_empty());
        assert_eq!(queue.push(3), Delivery::Closed);
        assert_eq!(sub.try_recv(), Err(TryRecvError::Closed));
        assert_eq!(sub.recv(), None);
    }

    #[test]
    fn drop_closes_queue() {
        let (queue, sub) = subscription(6);
        drop(sub);
        assert!(queue.is_closed());
        assert_eq!(queue.push(1), Delivery::Closed);
    }

    #[test]
    fn recv_blocks_until_push() {
        let (queue, sub) = subscription(6);
        let producer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            queue.push(99);
        });
        assert_eq!(sub.recv(), Some(99));
        producer.join().unwrap();
    }

    #[test]
    fn close_wakes_blocked_consumer() {
        let (queue, sub) = subscription(6);
        let consumer = thread::spawn(move || sub.recv());
        thread::sleep(Duration::from_millis(20));
        queue.close();
        assert_eq!(consumer.join().unwrap(), None);
    }

    #[test]
    fn recv_timeout_times_out_then_receives() {
        let (queue, sub) = subscription(6);
        assert_eq!(
            sub.recv_timeout(Duration::from_millis(10)),
            Err(RecvTimeoutError::Timeout)
        );
        queue.push(5);
        assert_eq!(sub.recv_timeout(Duration::from_millis(10)), Ok(5));
        sub.close();
        assert_eq!(
            sub.recv_timeout(Duration::from_millis(10)),
            Err(RecvTimeoutError::Closed)
        );
    }

    #[test]
    fn recv_timeout_accepts_unbounded_duration() {
        let (queue, sub) = subscription(6);
        queue.push(1);
        assert_eq!(sub.recv_timeout(Duration::MAX), Ok(1));

        let producer = Arc::clone(&queue);
        let pusher = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            producer.push(2);
        });
        assert_eq!(sub.recv_timeout(Duration::MAX), Ok(2));
        pusher.join().unwrap();

        let closer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            queue.close();
        });
        assert_eq!(
            sub.recv_timeout(Duration::MAX),
            Err(RecvTimeoutError::Closed)
        );
        closer.join().unwrap();
    }

    #[test]
    fn iterator_ends_on_close() {
        let (queue, sub) = subscription(6);
        queue.push(1);
        queue.push(2);
        let closer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            queue.close();
        });
        let seen: Vec<u32> = sub.collect();
        assert_eq!(seen, vec![1, 2]);
        closer.join().unwrap();
    }

    #[test]
    fn sink_rejects_wrong_type() {
        let queue: Arc<Queue<u32>> = Queue::new(6);
        let value: Box<dyn Any + Send> = Box::new(String::from("nope"));
        assert_eq!(queue.deliver(&*value), Delivery::Mismatch);
        let value: Box<dyn Any + Send> = Box::new(7u32);
        assert_eq!(queue.deliver(&*value), Delivery::Queued);
    }

    #[cfg(feature = "async")]
    #[tokio::test]
    async fn async_recv_and_stream_end() {
        let (queue, sub) = subscription(6);
        let producer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            queue.push(11);
            tokio::time::sleep(Duration::from_millis(10)).await;
            queue.close();
        });
        assert_eq!(sub.recv_async().await, Some(11));
        assert_eq!(sub.recv_async().await, None);
        producer.await.unwrap();
    }

    #[cfg(feature = "async")]
    #[tokio::test]
    async fn stream_yields_until_closed() {
        use std::pin::Pin;

        use futures_core::Stream;

        let (queue, mut sub) = subscription(6);
        queue.push(1);
        queue.push(2);
        let producer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            queue.push(3);
            tokio::time::sleep(Duration::from_millis(10)).await;
            queue.close();
        });

        let mut seen = Vec::new();
        while let Some(item) =
            std::future::poll_fn(|cx| Pin::new(&mut sub).poll_next(cx)).await
        {
            seen.push(item);
        }
        assert_eq!(seen, vec![1, 2, 3]);
        producer.await.unwrap();
    }
}
