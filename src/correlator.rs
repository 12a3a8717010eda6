//! Correlates a transport callback response with the turn that caused it.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::signal::Signal;

use crate::event::GattEvent;

/// Single-capacity conflated holder for the response to the operation
/// currently in flight.
///
/// The callback side stores into the slot without ever blocking; a later
/// arrival supersedes an unconsumed earlier one. Only the holder of the turn
/// consumes the slot, and it clears leftovers with [`reset`](Self::reset)
/// before submitting.
pub struct ResponseSlot<M: RawMutex> {
    inner: Signal<M, GattEvent>,
}

impl<M: RawMutex> ResponseSlot<M> {
    pub const fn new() -> Self {
        Self { inner: Signal::new() }
    }

    /// Store a response, replacing any unconsumed one.
    pub fn put(&self, event: GattEvent) {
        if self.inner.signaled() {
            trace!("[correlator] unconsumed response superseded");
        }
        self.inner.signal(event);
    }

    /// Drop whatever stale value an earlier turn left behind.
    pub fn reset(&self) {
        self.inner.reset();
    }

    /// Wait for the next stored response and consume it.
    pub async fn take(&self) -> GattEvent {
        self.inner.wait().await
    }
}

#[cfg(test)]
mod tests {
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;
    use futures::FutureExt;

    use super::*;
    use crate::types::Status;

    fn write_done(handle: u16) -> GattEvent {
        GattEvent::CharacteristicWrite {
            handle,
            status: Status::SUCCESS,
        }
    }

    #[test]
    fn take_pends_until_put() {
        let slot: ResponseSlot<NoopRawMutex> = ResponseSlot::new();
        assert!(slot.take().now_or_never().is_none());

        slot.put(write_done(1));
        assert_eq!(slot.take().now_or_never(), Some(write_done(1)));
    }

    #[test]
    fn later_put_supersedes_unconsumed_one() {
        let slot: ResponseSlot<NoopRawMutex> = ResponseSlot::new();
        slot.put(write_done(1));
        slot.put(write_done(2));

        assert_eq!(slot.take().now_or_never(), Some(write_done(2)));
        assert!(slot.take().now_or_never().is_none());
    }

    #[test]
    fn reset_drops_stale_value() {
        let slot: ResponseSlot<NoopRawMutex> = ResponseSlot::new();
        slot.put(write_done(1));
        slot.reset();
        assert!(slot.take().now_or_never().is_none());
    }
}
