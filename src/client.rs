//! Sequential request/response client over a callback-driven transport.

use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::mutex::Mutex;
use embassy_time::{with_timeout, Duration};

use crate::broadcast::{EventBroadcaster, Subscription};
use crate::correlator::ResponseSlot;
use crate::event::{GattEvent, Value};
use crate::monitor::ConnectionMonitor;
use crate::transport::{GattTransport, Operation, Submission};
use crate::types::{CapacityPolicy, ConnectionState, Status};
use crate::Error;

/// Serializes operations against a transport that supports one outstanding
/// operation, and fans unsolicited events out to subscribers.
///
/// At most one request holds the *turn* at any instant; concurrent callers
/// suspend on the internal mutex until the turn frees up. `SUBS` bounds the
/// concurrent notification subscribers, `QUEUE` is the per-subscriber queue
/// capacity.
///
/// The transport's callbacks feed [`handle_response`](Self::handle_response),
/// [`handle_connection_state`](Self::handle_connection_state) and
/// [`handle_notification`](Self::handle_notification); all three are cheap,
/// wait-free and safe from any thread the chosen `RawMutex` covers.
pub struct GattClient<M: RawMutex, T: GattTransport, const SUBS: usize, const QUEUE: usize> {
    transport: T,
    turn: Mutex<M, ()>,
    response: ResponseSlot<M>,
    monitor: ConnectionMonitor<M>,
    events: EventBroadcaster<M, QUEUE, SUBS>,
    timeout: Option<Duration>,
}

fn completed(status: Status) -> Result<(), Error> {
    if status.is_success() {
        Ok(())
    } else {
        Err(Error::Gatt(status))
    }
}

impl<M: RawMutex, T: GattTransport, const SUBS: usize, const QUEUE: usize> GattClient<M, T, SUBS, QUEUE> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            turn: Mutex::new(()),
            response: ResponseSlot::new(),
            monitor: ConnectionMonitor::new(),
            events: EventBroadcaster::new(),
            timeout: None,
        }
    }

    /// Fail any request still unresolved after `timeout` with
    /// [`Error::Timeout`]. The turn is released as usual.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Deliver the completion of the most recently accepted operation.
    ///
    /// Callback side of the transport; any thread.
    pub fn handle_response(&self, event: GattEvent) {
        trace!("[client] response {:?}", event.kind());
        self.response.put(event);
    }

    /// Deliver a link state transition.
    ///
    /// Callback side of the transport; any thread.
    pub fn handle_connection_state(&self, status: Status, state: ConnectionState) {
        self.monitor.update(status, state);
    }

    /// Deliver a push-style event unrelated to any pending request.
    ///
    /// Callback side of the transport; any thread. Never blocks, regardless
    /// of subscriber backlog.
    pub fn handle_notification(&self, event: GattEvent) {
        self.events.publish(event);
    }

    /// Perform one request: take the turn, submit to the transport, then
    /// suspend until the first of response, link loss, shutdown or the
    /// configured deadline.
    pub async fn request(&self, op: Operation<'_>) -> Result<GattEvent, Error> {
        let kind = op.kind();
        // Dropping the guard releases the turn on every exit path below.
        let _turn = self.turn.lock().await;
        if self.monitor.is_closed() {
            return Err(Error::Closed);
        }
        self.response.reset();
        trace!("[client] submit {:?}", kind);
        match self.transport.submit(op) {
            Submission::Accepted => {}
            Submission::Rejected => {
                warn!("[client] {:?} rejected by transport", kind);
                return Err(Error::SubmissionRejected);
            }
        }

        let race = select(self.response.take(), self.link_lost());
        let won = match self.timeout {
            Some(timeout) => with_timeout(timeout, race).await.map_err(|_| Error::Timeout)?,
            None => race.await,
        };
        let event = match won {
            Either::First(event) => event,
            Either::Second(err) => return Err(err),
        };
        match event.kind() {
            Some(actual) if actual == kind => Ok(event),
            actual => {
                error!("[client] expected {:?} response, got {:?}", kind, actual);
                Err(Error::UnexpectedResponse { expected: kind, actual })
            }
        }
    }

    /// Resolves only when the link dies or the client closes.
    async fn link_lost(&self) -> Error {
        match self.monitor.wait_disconnected().await {
            Ok(()) => Error::ConnectionLost,
            Err(err) => err,
        }
    }

    /// Ask the transport to establish the link and wait until it reports
    /// `Connected`.
    pub async fn connect(&self) -> Result<(), Error> {
        if self.monitor.is_closed() {
            return Err(Error::Closed);
        }
        match self.transport.submit(Operation::Connect) {
            Submission::Accepted => self.monitor.wait_for(ConnectionState::Connected).await,
            Submission::Rejected => Err(Error::SubmissionRejected),
        }
    }

    /// Ask the transport to drop the link and wait until it reports
    /// `Disconnected`.
    pub async fn disconnect(&self) -> Result<(), Error> {
        if self.monitor.is_closed() {
            return Err(Error::Closed);
        }
        match self.transport.submit(Operation::Disconnect) {
            Submission::Accepted => self.monitor.wait_for(ConnectionState::Disconnected).await,
            Submission::Rejected => Err(Error::SubmissionRejected),
        }
    }

    /// Current link state.
    pub fn state(&self) -> ConnectionState {
        self.monitor.state()
    }

    /// Start service discovery on the peer.
    pub async fn discover_services(&self) -> Result<(), Error> {
        let GattEvent::ServicesDiscovered { status } = self.request(Operation::DiscoverServices).await? else {
            unreachable!()
        };
        completed(status)
    }

    /// Read the value of the characteristic at `handle`.
    pub async fn read_characteristic(&self, handle: u16) -> Result<Value, Error> {
        let GattEvent::CharacteristicRead { value, status, .. } =
            self.request(Operation::ReadCharacteristic { handle }).await?
        else {
            unreachable!()
        };
        completed(status)?;
        Ok(value)
    }

    /// Write `data` to the characteristic at `handle`.
    pub async fn write_characteristic(&self, handle: u16, data: &[u8]) -> Result<(), Error> {
        let GattEvent::CharacteristicWrite { status, .. } =
            self.request(Operation::WriteCharacteristic { handle, data }).await?
        else {
            unreachable!()
        };
        completed(status)
    }

    /// Read the value of the descriptor at `handle`.
    pub async fn read_descriptor(&self, handle: u16) -> Result<Value, Error> {
        let GattEvent::DescriptorRead { value, status, .. } =
            self.request(Operation::ReadDescriptor { handle }).await?
        else {
            unreachable!()
        };
        completed(status)?;
        Ok(value)
    }

    /// Write `data` to the descriptor at `handle`.
    pub async fn write_descriptor(&self, handle: u16, data: &[u8]) -> Result<(), Error> {
        let GattEvent::DescriptorWrite { status, .. } =
            self.request(Operation::WriteDescriptor { handle, data }).await?
        else {
            unreachable!()
        };
        completed(status)
    }

    /// Execute the pending reliable write transaction.
    pub async fn execute_reliable_write(&self) -> Result<(), Error> {
        let GattEvent::ReliableWriteCompleted { status } =
            self.request(Operation::ExecuteReliableWrite).await?
        else {
            unreachable!()
        };
        completed(status)
    }

    /// Negotiate the ATT MTU; returns the value the transport settled on.
    pub async fn exchange_mtu(&self, mtu: u16) -> Result<u16, Error> {
        let GattEvent::MtuChanged { mtu, status } = self.request(Operation::ExchangeMtu { mtu }).await? else {
            unreachable!()
        };
        completed(status)?;
        Ok(mtu)
    }

    /// Attach an observer of unsolicited events, seeing events delivered
    /// from this moment on.
    pub fn subscribe(&self, policy: CapacityPolicy) -> Result<Subscription<'_, M, QUEUE, SUBS>, Error> {
        self.events.subscribe(policy)
    }

    /// Shut down: fail every outstanding and future wait with
    /// [`Error::Closed`], end all subscriptions, release the transport
    /// handle. Idempotent; never fails.
    pub fn close(&self) {
        if self.monitor.close() {
            self.events.close();
            self.transport.close();
            info!("[client] closed");
        }
    }
}
