//! Completion and notification events crossing the transport boundary.

use heapless::Vec;

use crate::types::{ConnectionState, Status};
use crate::MAX_VALUE_LEN;

/// Attribute value payload carried by read results and notifications.
pub type Value = Vec<u8, MAX_VALUE_LEN>;

/// A single completion or push event produced by the transport callbacks.
///
/// Events are immutable once constructed and move by value from the callback
/// boundary to whichever component consumes them.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GattEvent {
    ConnectionStateChanged { status: Status, state: ConnectionState },
    ServicesDiscovered { status: Status },
    CharacteristicRead { handle: u16, value: Value, status: Status },
    CharacteristicWrite { handle: u16, status: Status },
    /// Unsolicited value change pushed by the peer; never answers a request.
    CharacteristicChanged { handle: u16, value: Value },
    DescriptorRead { handle: u16, value: Value, status: Status },
    DescriptorWrite { handle: u16, status: Status },
    ReliableWriteCompleted { status: Status },
    MtuChanged { mtu: u16, status: Status },
}

/// Request kinds, used to correlate a response with the operation that
/// caused it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OperationKind {
    Connect,
    Disconnect,
    DiscoverServices,
    ReadCharacteristic,
    WriteCharacteristic,
    ReadDescriptor,
    WriteDescriptor,
    ExecuteReliableWrite,
    ExchangeMtu,
}

impl GattEvent {
    /// The operation kind this event completes, or `None` for events that
    /// never answer a request.
    pub fn kind(&self) -> Option<OperationKind> {
        match self {
            GattEvent::ServicesDiscovered { .. } => Some(OperationKind::DiscoverServices),
            GattEvent::CharacteristicRead { .. } => Some(OperationKind::ReadCharacteristic),
            GattEvent::CharacteristicWrite { .. } => Some(OperationKind::WriteCharacteristic),
            GattEvent::DescriptorRead { .. } => Some(OperationKind::ReadDescriptor),
            GattEvent::DescriptorWrite { .. } => Some(OperationKind::WriteDescriptor),
            GattEvent::ReliableWriteCompleted { .. } => Some(OperationKind::ExecuteReliableWrite),
            GattEvent::MtuChanged { .. } => Some(OperationKind::ExchangeMtu),
            GattEvent::ConnectionStateChanged { .. } | GattEvent::CharacteristicChanged { .. } => None,
        }
    }

    /// Completion status carried by the event, if the event has one.
    pub fn status(&self) -> Option<Status> {
        match self {
            GattEvent::ConnectionStateChanged { status, .. }
            | GattEvent::ServicesDiscovered { status }
            | GattEvent::CharacteristicRead { status, .. }
            | GattEvent::CharacteristicWrite { status, .. }
            | GattEvent::DescriptorRead { status, .. }
            | GattEvent::DescriptorWrite { status, .. }
            | GattEvent::ReliableWriteCompleted { status }
            | GattEvent::MtuChanged { status, .. } => Some(*status),
            GattEvent::CharacteristicChanged { .. } => None,
        }
    }
}
