#![cfg_attr(not(test), no_std)]
#![allow(async_fn_in_trait)]

//! Sequential async request/response layer over callback-driven GATT
//! transports.
//!
//! Platform GATT bindings tend to share an awkward shape: one operation may
//! be outstanding at a time, the call that starts it only reports whether the
//! transport accepted it, and the actual result arrives later through a
//! callback fired on some thread the application does not control. Unsolicited
//! value-change notifications arrive on the same callback surface, unrelated
//! to whatever request happens to be in flight.
//!
//! `gattway` turns that surface into plain `async` calls:
//!
//! - [`GattClient::request`] serializes callers so exactly one operation holds
//!   the *turn* against the transport, then races the response against link
//!   loss, shutdown and an optional deadline.
//! - [`ResponseSlot`](correlator::ResponseSlot) correlates the callback result
//!   back to the turn that caused it; it is conflated, so the callback side
//!   never blocks.
//! - [`ConnectionMonitor`](monitor::ConnectionMonitor) lets any number of
//!   tasks wait for a target link state independently.
//! - [`EventBroadcaster`](broadcast::EventBroadcaster) fans unsolicited
//!   events out to subscribers in commit order, each with its own queue and
//!   capacity policy.
//!
//! The crate is `no_std`; interior synchronization is generic over
//! [`RawMutex`](embassy_sync::blocking_mutex::raw::RawMutex), so pick the
//! flavor that matches where the transport's callbacks run (for OS threads,
//! `CriticalSectionRawMutex`).
//!
//! ## Example
//!
//! ```no_run
//! use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
//! use gattway::{GattClient, GattTransport, Operation, Submission};
//!
//! struct Binding;
//!
//! impl GattTransport for Binding {
//!     fn submit(&self, _op: Operation<'_>) -> Submission {
//!         // hand off to the platform binding here
//!         Submission::Accepted
//!     }
//!     fn close(&self) {}
//! }
//!
//! # async fn run() -> Result<(), gattway::Error> {
//! let client: GattClient<CriticalSectionRawMutex, Binding, 2, 8> = GattClient::new(Binding);
//! // The platform glue feeds client.handle_response / handle_connection_state /
//! // handle_notification from its callback threads.
//! client.connect().await?;
//! let value = client.read_characteristic(0x2a19).await?;
//! client.close();
//! # Ok(())
//! # }
//! ```

// This mod MUST go first, so that the others see its macros.
mod fmt;

pub mod broadcast;
pub mod client;
pub mod correlator;
pub mod event;
pub mod monitor;
pub mod transport;
pub mod types;

pub use broadcast::{EventBroadcaster, Subscription};
pub use client::GattClient;
pub use event::{GattEvent, OperationKind, Value};
pub use transport::{GattTransport, Operation, Submission};
pub use types::{CapacityPolicy, ConnectionState, OverflowPolicy, Status};

/// Largest attribute value payload carried in a [`GattEvent`].
pub const MAX_VALUE_LEN: usize = 512;

/// Errors surfaced by requests, state waits and event subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The transport refused to start the operation. Nothing went out and
    /// the turn was released immediately.
    SubmissionRejected,
    /// The link entered a disconnect-class state while the operation was
    /// outstanding.
    ConnectionLost,
    /// The client was closed before the call, or while it was waiting.
    Closed,
    /// The configured request deadline elapsed without a resolution.
    Timeout,
    /// A response arrived whose kind does not match the operation in flight.
    /// The transport broke its one-outstanding-operation contract; retrying
    /// cannot fix this.
    UnexpectedResponse {
        expected: OperationKind,
        actual: Option<OperationKind>,
    },
    /// The operation completed with a nonzero transport status, carried
    /// through unchanged.
    Gatt(Status),
    /// All subscriber slots are in use.
    SubscriberLimitReached,
}
