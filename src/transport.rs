//! Boundary to the underlying callback-driven transport.

use crate::event::OperationKind;

/// Synchronous outcome of handing an operation to the transport.
///
/// Acceptance only means the transport started the operation; the result
/// arrives later through the client's callback intake surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Submission {
    Accepted,
    Rejected,
}

/// A single request handed to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation<'a> {
    Connect,
    Disconnect,
    DiscoverServices,
    ReadCharacteristic { handle: u16 },
    WriteCharacteristic { handle: u16, data: &'a [u8] },
    ReadDescriptor { handle: u16 },
    WriteDescriptor { handle: u16, data: &'a [u8] },
    ExecuteReliableWrite,
    ExchangeMtu { mtu: u16 },
}

impl Operation<'_> {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Connect => OperationKind::Connect,
            Operation::Disconnect => OperationKind::Disconnect,
            Operation::DiscoverServices => OperationKind::DiscoverServices,
            Operation::ReadCharacteristic { .. } => OperationKind::ReadCharacteristic,
            Operation::WriteCharacteristic { .. } => OperationKind::WriteCharacteristic,
            Operation::ReadDescriptor { .. } => OperationKind::ReadDescriptor,
            Operation::WriteDescriptor { .. } => OperationKind::WriteDescriptor,
            Operation::ExecuteReliableWrite => OperationKind::ExecuteReliableWrite,
            Operation::ExchangeMtu { .. } => OperationKind::ExchangeMtu,
        }
    }
}

/// Callback-driven transport consumed by [`GattClient`](crate::GattClient).
///
/// Implementations forward completions to the owning client's intake methods
/// from whatever thread or context the platform delivers its callbacks on.
pub trait GattTransport {
    /// Hand one operation to the transport. Must not block; a `Rejected`
    /// return means the operation never started and no callback will follow.
    fn submit(&self, op: Operation<'_>) -> Submission;

    /// Release the underlying handle. Called exactly once, during shutdown.
    fn close(&self);
}
