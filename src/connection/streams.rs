// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! This module implements the stream id pool and the in-flight request table.
//!
//! Both live behind one lock: the set of allocated ids and the keys of the
//! in-flight table are always identical, which is what makes response routing
//! by stream id safe.

use super::error::RequestError;
use crate::frame::ResponseFrame;
use std::{
    collections::HashMap,
    sync::Mutex,
};
use tokio::sync::{
    oneshot,
    Notify,
};

/// The response waiter of one in-flight request.
pub(super) type Waiter = oneshot::Sender<Result<ResponseFrame, RequestError>>;

/// The stream id pool over `[0, max_streams)` and the table of in-flight
/// requests keyed by stream id. Stream id -1 is reserved for server events and
/// is never part of the pool.
pub(super) struct Streams {
    inner: Mutex<Pool>,
    /// Signalled when an id returns to the pool or the table drains.
    available: Notify,
}

struct Pool {
    free: Vec<i16>,
    in_flight: HashMap<i16, Waiter>,
}

impl Streams {
    pub(super) fn new(max_streams: u16) -> Self {
        // LIFO keeps recently used ids hot; id 32767 is the largest legal one
        let free = (0..max_streams.min(i16::MAX as u16 + 1) as i32)
            .rev()
            .map(|stream| stream as i16)
            .collect();
        Self {
            inner: Mutex::new(Pool {
                free,
                in_flight: HashMap::new(),
            }),
            available: Notify::new(),
        }
    }

    /// Allocate a stream id and register the waiter under it. When the pool is
    /// empty this waits for an id if `block` is set, and fails with
    /// [`RequestError::QueueFull`] otherwise.
    pub(super) async fn acquire(&self, waiter: Waiter, block: bool) -> Result<i16, RequestError> {
        let mut waiter = Some(waiter);
        loop {
            // register for wakeups before checking, releases between the check
            // and the await are not lost
            let notified = self.available.notified();
            {
                let mut pool = self.inner.lock().expect("Stream pool lock poisoned");
                if let Some(stream) = pool.free.pop() {
                    if let Some(waiter) = waiter.take() {
                        pool.in_flight.insert(stream, waiter);
                    }
                    return Ok(stream);
                }
            }
            if !block {
                return Err(RequestError::QueueFull);
            }
            // raced acquirers go around again
            notified.await;
        }
    }

    /// Remove and return the waiter for a stream id, releasing the id back to
    /// the pool. Returns `None` for ids that are not in flight.
    pub(super) fn complete(&self, stream: i16) -> Option<Waiter> {
        let mut pool = self.inner.lock().expect("Stream pool lock poisoned");
        let waiter = pool.in_flight.remove(&stream)?;
        pool.free.push(stream);
        drop(pool);
        self.available.notify_waiters();
        Some(waiter)
    }

    /// The number of requests currently in flight.
    pub(super) fn in_flight(&self) -> usize {
        self.inner.lock().expect("Stream pool lock poisoned").in_flight.len()
    }

    /// Fail every in-flight request and reclaim all ids.
    pub(super) fn fail_all(&self, mut error: impl FnMut() -> RequestError) {
        let waiters = {
            let mut pool = self.inner.lock().expect("Stream pool lock poisoned");
            let waiters: Vec<(i16, Waiter)> = pool.in_flight.drain().collect();
            for (stream, _) in &waiters {
                pool.free.push(*stream);
            }
            waiters
        };
        self.available.notify_waiters();
        for (_, waiter) in waiters {
            let _ = waiter.send(Err(error()));
        }
    }

    /// Await the in-flight table draining empty.
    pub(super) async fn drained(&self) {
        loop {
            let notified = self.available.notified();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        sync::Arc,
        time::Duration,
    };

    fn waiter() -> (Waiter, oneshot::Receiver<Result<ResponseFrame, RequestError>>) {
        let (tx, rx) = oneshot::channel();
        (tx, rx)
    }

    #[tokio::test]
    async fn allocated_ids_match_in_flight_entries() {
        let streams = Streams::new(4);
        let mut held = Vec::new();
        for _ in 0..4 {
            let (tx, rx) = waiter();
            held.push(rx);
            streams.acquire(tx, true).await.unwrap();
        }
        assert_eq!(streams.in_flight(), 4);
        let (tx, _rx) = waiter();
        assert!(matches!(streams.acquire(tx, false).await, Err(RequestError::QueueFull)));
    }

    #[tokio::test]
    async fn exhausted_pool_blocks_until_release() {
        let streams = Arc::new(Streams::new(1));
        let (tx, _rx) = waiter();
        let stream = streams.acquire(tx, true).await.unwrap();

        let streams2 = streams.clone();
        let blocked = tokio::spawn(async move {
            let (tx, _rx) = waiter();
            streams2.acquire(tx, true).await
        });
        // the task cannot finish while the only id is out
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!blocked.is_finished());

        streams.complete(stream);
        let reacquired = tokio::time::timeout(Duration::from_secs(1), blocked)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(reacquired, stream);
    }

    #[tokio::test]
    async fn complete_is_single_delivery() {
        let streams = Streams::new(2);
        let (tx, _rx) = waiter();
        let stream = streams.acquire(tx, true).await.unwrap();
        assert!(streams.complete(stream).is_some());
        assert!(streams.complete(stream).is_none());
    }

    #[tokio::test]
    async fn fail_all_drains_every_waiter() {
        let streams = Streams::new(8);
        let mut receivers = Vec::new();
        for _ in 0..8 {
            let (tx, rx) = waiter();
            streams.acquire(tx, true).await.unwrap();
            receivers.push(rx);
        }
        streams.fail_all(|| RequestError::ConnectionClosed);
        assert_eq!(streams.in_flight(), 0);
        for rx in receivers {
            assert!(matches!(rx.await, Ok(Err(RequestError::ConnectionClosed))));
        }
    }
}
