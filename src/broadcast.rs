//! Fan-out of unsolicited transport events to independent subscribers.

use core::cell::RefCell;
use core::future::poll_fn;
use core::pin::Pin;
use core::task::{Context, Poll};

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::waitqueue::WakerRegistration;
use futures::Stream;
use heapless::Deque;

use crate::event::GattEvent;
use crate::types::{CapacityPolicy, OverflowPolicy};
use crate::Error;

struct SubscriberState<const CAP: usize> {
    queue: Deque<GattEvent, CAP>,
    policy: CapacityPolicy,
    missed: u64,
    waker: WakerRegistration,
}

impl<const CAP: usize> SubscriberState<CAP> {
    fn offer(&mut self, event: GattEvent) {
        match self.policy {
            CapacityPolicy::Conflate => {
                if self.queue.pop_front().is_some() {
                    self.missed += 1;
                }
            }
            CapacityPolicy::Bounded { depth, on_full } => {
                let depth = depth.min(CAP);
                if depth == 0 {
                    self.missed += 1;
                    return;
                }
                if self.queue.len() >= depth {
                    self.missed += 1;
                    match on_full {
                        OverflowPolicy::DropOldest => {
                            self.queue.pop_front();
                        }
                        OverflowPolicy::DropNewest => return,
                    }
                }
            }
        }
        let _ = self.queue.push_back(event);
        self.waker.wake();
    }
}

struct State<const CAP: usize, const SUBS: usize> {
    subscribers: [Option<SubscriberState<CAP>>; SUBS],
    closed: bool,
}

/// Multi-subscriber ordered fan-out for unsolicited events.
///
/// [`publish`](Self::publish) is the single serialization point for
/// concurrent producer threads: whichever call commits first comes first in
/// every subscriber's view. Producers never block; a slow subscriber loses
/// events according to its own [`CapacityPolicy`], counted per subscription.
pub struct EventBroadcaster<M: RawMutex, const CAP: usize, const SUBS: usize> {
    state: Mutex<M, RefCell<State<CAP, SUBS>>>,
}

impl<M: RawMutex, const CAP: usize, const SUBS: usize> EventBroadcaster<M, CAP, SUBS> {
    const FREE: Option<SubscriberState<CAP>> = None;

    pub const fn new() -> Self {
        Self {
            state: Mutex::new(RefCell::new(State {
                subscribers: [Self::FREE; SUBS],
                closed: false,
            })),
        }
    }

    /// Commit one event towards every active subscriber. Never blocks; events
    /// committed after [`close`](Self::close) are discarded.
    pub fn publish(&self, event: GattEvent) {
        self.state.lock(|s| {
            let mut s = s.borrow_mut();
            if s.closed {
                trace!("[broadcast] event after close discarded");
                return;
            }
            for sub in s.subscribers.iter_mut().flatten() {
                sub.offer(event.clone());
            }
        });
    }

    /// Attach a subscriber observing events committed from this moment on;
    /// nothing published earlier is replayed.
    pub fn subscribe(&self, policy: CapacityPolicy) -> Result<Subscription<'_, M, CAP, SUBS>, Error> {
        self.state.lock(|s| {
            let mut s = s.borrow_mut();
            if s.closed {
                return Err(Error::Closed);
            }
            for (index, slot) in s.subscribers.iter_mut().enumerate() {
                if slot.is_none() {
                    *slot = Some(SubscriberState {
                        queue: Deque::new(),
                        policy,
                        missed: 0,
                        waker: WakerRegistration::new(),
                    });
                    return Ok(Subscription { broadcaster: self, index });
                }
            }
            warn!("[broadcast] all {} subscriber slots taken", SUBS);
            Err(Error::SubscriberLimitReached)
        })
    }

    /// Stop accepting events and wake every subscriber. Queued events stay
    /// readable; a drained subscription then ends.
    pub fn close(&self) {
        self.state.lock(|s| {
            let mut s = s.borrow_mut();
            s.closed = true;
            for sub in s.subscribers.iter_mut().flatten() {
                sub.waker.wake();
            }
        });
    }

    fn poll_next_event(&self, index: usize, cx: &mut Context<'_>) -> Poll<Result<GattEvent, Error>> {
        self.state.lock(|s| {
            let mut s = s.borrow_mut();
            let closed = s.closed;
            let sub = unwrap!(s.subscribers[index].as_mut());
            if let Some(event) = sub.queue.pop_front() {
                Poll::Ready(Ok(event))
            } else if closed {
                Poll::Ready(Err(Error::Closed))
            } else {
                sub.waker.register(cx.waker());
                Poll::Pending
            }
        })
    }

    fn missed(&self, index: usize) -> u64 {
        self.state.lock(|s| unwrap!(s.borrow().subscribers[index].as_ref()).missed)
    }

    fn unsubscribe(&self, index: usize) {
        self.state.lock(|s| {
            s.borrow_mut().subscribers[index] = None;
        });
    }
}

/// Ordered view of events committed after the subscription was created.
///
/// Dropping the subscription frees its slot.
pub struct Subscription<'a, M: RawMutex, const CAP: usize, const SUBS: usize> {
    broadcaster: &'a EventBroadcaster<M, CAP, SUBS>,
    index: usize,
}

impl<M: RawMutex, const CAP: usize, const SUBS: usize> Subscription<'_, M, CAP, SUBS> {
    /// Receive the next surviving event, in commit order.
    pub async fn next(&mut self) -> Result<GattEvent, Error> {
        poll_fn(|cx| self.broadcaster.poll_next_event(self.index, cx)).await
    }

    /// Number of events this subscription's capacity policy has dropped.
    pub fn missed(&self) -> u64 {
        self.broadcaster.missed(self.index)
    }
}

impl<M: RawMutex, const CAP: usize, const SUBS: usize> Drop for Subscription<'_, M, CAP, SUBS> {
    fn drop(&mut self) {
        self.broadcaster.unsubscribe(self.index);
    }
}

impl<M: RawMutex, const CAP: usize, const SUBS: usize> Stream for Subscription<'_, M, CAP, SUBS> {
    type Item = GattEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<GattEvent>> {
        match self.broadcaster.poll_next_event(self.index, cx) {
            Poll::Ready(Ok(event)) => Poll::Ready(Some(event)),
            Poll::Ready(Err(_)) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}
