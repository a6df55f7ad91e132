//! Unified error type for blehttp.
//!
//! We avoid `alloc` - all error variants carry only fixed-size data.
//! Implements `defmt::Format` for efficient on-target logging.

use crate::ble::writer::WritePhase;
use crate::ble::{GattStatus, HostError};

/// Top-level error type used across the engine.
///
/// Every error leaves the state machine that raised it parked in its
/// current phase; nothing is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    // Link layer
    /// The link layer refused a command outright.
    Host(HostError),

    // Discovery
    /// Primary service discovery failed or found nothing.
    ServiceNotFound(GattStatus),

    /// The gateway characteristic is missing from the service.
    CharacteristicNotFound(GattStatus),

    /// No CCCD follows the gateway characteristic value.
    CccdNotFound(GattStatus),

    // Transfer
    /// A write completed with a failure status.
    Write { phase: WritePhase, status: GattStatus },

    /// A read completed with a failure status.
    Read { offset: u16, status: GattStatus },

    /// A read response came back for another offset than the one asked for.
    ReadOffset { expected: u16, actual: u16 },

    /// A read fragment would land outside the response buffer.
    ResponseOverflow { offset: u16, len: u16 },

    /// A request was started before discovery completed.
    NotReady,

    /// A request was started while a response is being read.
    Busy,

    // Request construction
    /// The request does not fit the outbound buffer.
    RequestTooLarge,
}

// Convenience conversions

impl From<HostError> for Error {
    fn from(e: HostError) -> Self {
        Error::Host(e)
    }
}
