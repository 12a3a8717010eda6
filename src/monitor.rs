//! Tracks the evolving link state and wakes tasks waiting on transitions.

use core::cell::RefCell;
use core::future::poll_fn;
use core::task::{Context, Poll, Waker};

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;
use heapless::Vec;

use crate::types::{ConnectionState, Status};
use crate::Error;

/// Upper bound on tasks simultaneously parked on one monitor. Exceeding it
/// only causes spurious wakeups, not lost ones.
pub const MAX_STATE_WAITERS: usize = 8;

struct State {
    state: ConnectionState,
    closed: bool,
    wakers: Vec<Waker, MAX_STATE_WAITERS>,
}

/// Observable connection-state cell.
///
/// The transport's state callback feeds [`update`](Self::update); any number
/// of tasks wait for a target state, each through its own poll cursor, so no
/// waiter consumes a transition meant for another. The cell is conflated: a
/// waiter observes the current value on each wakeup, not a backlog of
/// intermediate ones.
pub struct ConnectionMonitor<M: RawMutex> {
    state: Mutex<M, RefCell<State>>,
}

impl<M: RawMutex> ConnectionMonitor<M> {
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(RefCell::new(State {
                state: ConnectionState::Disconnected,
                closed: false,
                wakers: Vec::new(),
            })),
        }
    }

    /// Record a transition reported by the transport and wake every waiter.
    /// Never blocks; safe from any thread the chosen `RawMutex` covers.
    pub fn update(&self, status: Status, state: ConnectionState) {
        self.state.lock(|s| {
            let mut s = s.borrow_mut();
            if s.closed {
                return;
            }
            debug!("[monitor] {:?} -> {:?} (status {})", s.state, state, status.0);
            s.state = state;
            wake_all(&mut s.wakers);
        });
    }

    /// Current link state.
    pub fn state(&self) -> ConnectionState {
        self.state.lock(|s| s.borrow().state)
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock(|s| s.borrow().closed)
    }

    /// Fail all pending waits and refuse future ones. Returns whether this
    /// call performed the transition.
    pub fn close(&self) -> bool {
        self.state.lock(|s| {
            let mut s = s.borrow_mut();
            if s.closed {
                return false;
            }
            s.closed = true;
            wake_all(&mut s.wakers);
            true
        })
    }

    /// Wait until the link reaches `target`; resolves immediately when it is
    /// already there.
    pub async fn wait_for(&self, target: ConnectionState) -> Result<(), Error> {
        self.wait(move |state| state == target).await
    }

    /// Wait for any disconnect-class state. This is the filtered view the
    /// request path races against its response.
    pub async fn wait_disconnected(&self) -> Result<(), Error> {
        self.wait(|state| state.is_disconnect_class()).await
    }

    async fn wait(&self, mut accept: impl FnMut(ConnectionState) -> bool) -> Result<(), Error> {
        poll_fn(move |cx| self.poll_wait(&mut accept, cx)).await
    }

    fn poll_wait(
        &self,
        accept: &mut impl FnMut(ConnectionState) -> bool,
        cx: &mut Context<'_>,
    ) -> Poll<Result<(), Error>> {
        self.state.lock(|s| {
            let mut s = s.borrow_mut();
            if s.closed {
                Poll::Ready(Err(Error::Closed))
            } else if accept(s.state) {
                Poll::Ready(Ok(()))
            } else {
                register(&mut s.wakers, cx.waker());
                Poll::Pending
            }
        })
    }
}

fn register(wakers: &mut Vec<Waker, MAX_STATE_WAITERS>, waker: &Waker) {
    if wakers.iter().any(|w| w.will_wake(waker)) {
        return;
    }
    if wakers.is_full() {
        // Evicted waiters re-register on their next poll.
        wake_all(wakers);
    }
    let _ = wakers.push(waker.clone());
}

fn wake_all(wakers: &mut Vec<Waker, MAX_STATE_WAITERS>) {
    for waker in wakers.iter() {
        waker.wake_by_ref();
    }
    wakers.clear();
}

#[cfg(test)]
mod tests {
    use core::future::Future;
    use core::pin::pin;

    use embassy_sync::blocking_mutex::raw::NoopRawMutex;
    use futures::task::noop_waker;
    use futures::FutureExt;

    use super::*;

    #[test]
    fn resolves_immediately_when_already_in_target() {
        let monitor: ConnectionMonitor<NoopRawMutex> = ConnectionMonitor::new();
        monitor.update(Status::SUCCESS, ConnectionState::Connected);

        assert_eq!(
            monitor.wait_for(ConnectionState::Connected).now_or_never(),
            Some(Ok(()))
        );
    }

    #[test]
    fn waiter_wakes_on_transition() {
        let monitor: ConnectionMonitor<NoopRawMutex> = ConnectionMonitor::new();
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);

        let mut wait = pin!(monitor.wait_for(ConnectionState::Connected));
        assert!(wait.as_mut().poll(&mut cx).is_pending());

        monitor.update(Status::SUCCESS, ConnectionState::Connecting);
        assert!(wait.as_mut().poll(&mut cx).is_pending());

        monitor.update(Status::SUCCESS, ConnectionState::Connected);
        assert_eq!(wait.as_mut().poll(&mut cx), Poll::Ready(Ok(())));
    }

    #[test]
    fn concurrent_waiters_do_not_steal_from_each_other() {
        let monitor: ConnectionMonitor<NoopRawMutex> = ConnectionMonitor::new();
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);

        let mut connect = pin!(monitor.wait_for(ConnectionState::Connected));
        let mut disconnect = pin!(monitor.wait_disconnected());
        monitor.update(Status::SUCCESS, ConnectionState::Connecting);
        assert!(connect.as_mut().poll(&mut cx).is_pending());
        assert!(disconnect.as_mut().poll(&mut cx).is_pending());

        monitor.update(Status::SUCCESS, ConnectionState::Connected);
        assert_eq!(connect.as_mut().poll(&mut cx), Poll::Ready(Ok(())));
        assert!(disconnect.as_mut().poll(&mut cx).is_pending());

        monitor.update(Status::SUCCESS, ConnectionState::Disconnected);
        assert_eq!(disconnect.as_mut().poll(&mut cx), Poll::Ready(Ok(())));
    }

    #[test]
    fn close_fails_pending_and_future_waits() {
        let monitor: ConnectionMonitor<NoopRawMutex> = ConnectionMonitor::new();
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);

        let mut wait = pin!(monitor.wait_for(ConnectionState::Connected));
        assert!(wait.as_mut().poll(&mut cx).is_pending());

        assert!(monitor.close());
        assert!(!monitor.close());

        assert_eq!(wait.as_mut().poll(&mut cx), Poll::Ready(Err(Error::Closed)));
        assert_eq!(
            monitor.wait_disconnected().now_or_never(),
            Some(Err(Error::Closed))
        );
    }

    #[test]
    fn updates_after_close_are_ignored() {
        let monitor: ConnectionMonitor<NoopRawMutex> = ConnectionMonitor::new();
        monitor.update(Status::SUCCESS, ConnectionState::Connected);
        monitor.close();
        monitor.update(Status::SUCCESS, ConnectionState::Disconnected);
        assert_eq!(monitor.state(), ConnectionState::Connected);
    }
}
