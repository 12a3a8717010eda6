#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicIsize, AtomicUsize, Ordering};
use std::sync::Arc;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_time::Duration;
use gattway::{GattClient, GattTransport, Operation, Submission};
use tokio::sync::mpsc;

// Links the std critical-section implementation into the test binary.
use critical_section as _;

pub type TestClient = GattClient<CriticalSectionRawMutex, TestTransport, 4, 256>;

/// Owned mirror of [`Operation`], so submissions can cross the test channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnedOp {
    Connect,
    Disconnect,
    DiscoverServices,
    ReadCharacteristic { handle: u16 },
    WriteCharacteristic { handle: u16, data: Vec<u8> },
    ReadDescriptor { handle: u16 },
    WriteDescriptor { handle: u16, data: Vec<u8> },
    ExecuteReliableWrite,
    ExchangeMtu { mtu: u16 },
}

impl From<Operation<'_>> for OwnedOp {
    fn from(op: Operation<'_>) -> Self {
        match op {
            Operation::Connect => OwnedOp::Connect,
            Operation::Disconnect => OwnedOp::Disconnect,
            Operation::DiscoverServices => OwnedOp::DiscoverServices,
            Operation::ReadCharacteristic { handle } => OwnedOp::ReadCharacteristic { handle },
            Operation::WriteCharacteristic { handle, data } => OwnedOp::WriteCharacteristic {
                handle,
                data: data.to_vec(),
            },
            Operation::ReadDescriptor { handle } => OwnedOp::ReadDescriptor { handle },
            Operation::WriteDescriptor { handle, data } => OwnedOp::WriteDescriptor {
                handle,
                data: data.to_vec(),
            },
            Operation::ExecuteReliableWrite => OwnedOp::ExecuteReliableWrite,
            Operation::ExchangeMtu { mtu } => OwnedOp::ExchangeMtu { mtu },
        }
    }
}

/// Shared knobs and counters of the mock transport.
pub struct TransportState {
    /// Whether `submit` accepts the next operation.
    pub accept: AtomicBool,
    /// Operations accepted but not yet finished via [`finish`](Self::finish).
    pub outstanding: AtomicIsize,
    /// High-water mark of `outstanding`; 1 means single-flight held.
    pub max_outstanding: AtomicIsize,
    /// Times the transport handle was released.
    pub closed: AtomicUsize,
}

impl TransportState {
    fn new() -> Self {
        Self {
            accept: AtomicBool::new(true),
            outstanding: AtomicIsize::new(0),
            max_outstanding: AtomicIsize::new(0),
            closed: AtomicUsize::new(0),
        }
    }

    /// Mark the in-flight operation finished. Call this before delivering
    /// its response so the next submission sees a free slot.
    pub fn finish(&self) {
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Channel-backed stand-in for a platform GATT binding.
///
/// Accepted operations are forwarded to the test, which plays the callback
/// role by feeding the client's intake methods.
pub struct TestTransport {
    ops: mpsc::UnboundedSender<OwnedOp>,
    state: Arc<TransportState>,
}

impl GattTransport for TestTransport {
    fn submit(&self, op: Operation<'_>) -> Submission {
        if !self.state.accept.load(Ordering::SeqCst) {
            return Submission::Rejected;
        }
        let outstanding = self.state.outstanding.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.max_outstanding.fetch_max(outstanding, Ordering::SeqCst);
        self.ops.send(op.into()).unwrap();
        Submission::Accepted
    }

    fn close(&self) {
        self.state.closed.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn harness() -> (
    &'static TestClient,
    mpsc::UnboundedReceiver<OwnedOp>,
    Arc<TransportState>,
) {
    build(None)
}

pub fn harness_with_timeout(
    timeout: Duration,
) -> (
    &'static TestClient,
    mpsc::UnboundedReceiver<OwnedOp>,
    Arc<TransportState>,
) {
    build(Some(timeout))
}

fn build(
    timeout: Option<Duration>,
) -> (
    &'static TestClient,
    mpsc::UnboundedReceiver<OwnedOp>,
    Arc<TransportState>,
) {
    let (ops, rx) = mpsc::unbounded_channel();
    let state = Arc::new(TransportState::new());
    let transport = TestTransport {
        ops,
        state: state.clone(),
    };
    // The per-subscriber queue (QUEUE entries of up to MAX_VALUE_LEN each) is
    // larger than a default test/worker thread stack can hold while it is
    // constructed by value, so build and heap-leak it on a roomy stack.
    let client: &'static TestClient = std::thread::Builder::new()
        .stack_size(8 * 1024 * 1024)
        .spawn(move || {
            let mut client = GattClient::new(transport);
            if let Some(timeout) = timeout {
                client = client.with_request_timeout(timeout);
            }
            Box::leak(Box::new(client)) as &'static TestClient
        })
        .unwrap()
        .join()
        .unwrap();
    (client, rx, state)
}
