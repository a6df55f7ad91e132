//! Bluetooth Low Energy central engine.
//!
//! This module implements the gateway client in **Central** role as a
//! sans-IO state machine:
//!
//! 1. **Advertisement filter** - recognises peripherals advertising the
//!    gateway service UUID.
//! 2. **Discovery** - walks service, characteristic and descriptor
//!    discovery to find the request characteristic and its CCCD.
//! 3. **Writer** - enables notifications, then sends the request with
//!    prepared writes followed by an execute write.
//! 4. **Reader** - on notification, reads the response back in fragments.
//! 5. **Central** - the single event entry point tying it together.
//!
//! The link layer sits behind [`GattHost`]: the engine issues commands
//! through it and receives completions later as [`BleEvent`]s.

pub mod adv_parser;
pub mod central;
pub mod discovery;
pub mod reader;
pub mod uuid;
pub mod writer;

#[cfg(test)]
pub(crate) mod mock;

use uuid::{BleUuid, UuidType};

/// Link-layer connection handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnHandle(pub u16);

impl ConnHandle {
    pub const INVALID: Self = Self(0xFFFF);

    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }
}

/// Peer device address.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PeerAddress {
    /// Address type as reported by the controller (public, random static...).
    pub kind: u8,
    /// Address bytes, least significant first.
    pub bytes: [u8; 6],
}

/// GATT status reported with every completion event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GattStatus(pub u16);

impl GattStatus {
    pub const SUCCESS: Self = Self(0x0000);

    pub fn is_success(&self) -> bool {
        *self == Self::SUCCESS
    }
}

/// Raw error code returned by the link layer when it rejects a command
/// outright (before any completion event).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HostError(pub u32);

/// Inclusive range of attribute handles.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HandleRange {
    pub start: u16,
    pub end: u16,
}

/// Connection parameters (intervals in 1.25 ms units, timeout in 10 ms units).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnParams {
    pub min_interval: u16,
    pub max_interval: u16,
    pub slave_latency: u16,
    pub sup_timeout: u16,
}

/// One primary service from a discovery response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DiscoveredService {
    pub uuid: BleUuid,
    pub range: HandleRange,
}

/// One characteristic from a discovery response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DiscoveredCharacteristic {
    pub uuid: BleUuid,
    pub decl_handle: u16,
    pub value_handle: u16,
}

/// One descriptor from a discovery response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DiscoveredDescriptor {
    pub uuid: BleUuid,
    pub handle: u16,
}

/// GATT write operation kinds used by the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WriteOp {
    /// Write request, acknowledged by a write response.
    Request,
    /// Queue a fragment on the peer (prepare write request).
    Prepare,
    /// Commit all queued fragments (execute write request).
    Execute,
}

/// Parameters of one GATT write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WriteParams<'a> {
    pub handle: u16,
    pub op: WriteOp,
    pub offset: u16,
    pub value: &'a [u8],
}

/// Events delivered by the link layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BleEvent<'a> {
    /// An advertisement report was received while scanning.
    AdvReport {
        peer: PeerAddress,
        rssi: i8,
        data: &'a [u8],
    },
    /// A connection was established.
    Connected { conn: ConnHandle, peer: PeerAddress },
    /// The connection was lost or closed (HCI reason code).
    Disconnected { conn: ConnHandle, reason: u8 },
    /// The peer asks for new connection parameters.
    ConnParamUpdateRequest { conn: ConnHandle, params: ConnParams },
    /// Packets were handed to the radio.
    TxComplete { conn: ConnHandle, count: u8 },
    PrimaryServicesDiscovered {
        conn: ConnHandle,
        status: GattStatus,
        services: &'a [DiscoveredService],
    },
    CharacteristicsDiscovered {
        conn: ConnHandle,
        status: GattStatus,
        characteristics: &'a [DiscoveredCharacteristic],
    },
    DescriptorsDiscovered {
        conn: ConnHandle,
        status: GattStatus,
        descriptors: &'a [DiscoveredDescriptor],
    },
    WriteResponse {
        conn: ConnHandle,
        status: GattStatus,
        handle: u16,
        op: WriteOp,
    },
    Notification {
        conn: ConnHandle,
        handle: u16,
        data: &'a [u8],
    },
    ReadResponse {
        conn: ConnHandle,
        status: GattStatus,
        handle: u16,
        offset: u16,
        data: &'a [u8],
    },
    /// Anything the engine has no use for (raw event id).
    Other(u16),
}

/// Commands the engine issues to the link layer.
///
/// Every method returns as soon as the command is queued; its completion is
/// reported later through [`BleEvent`]. An `Err` means the stack refused the
/// command and no completion will follow.
pub trait GattHost {
    /// Register a vendor base UUID and obtain its type token.
    fn register_vendor_uuid(&mut self, base: &[u8; 16]) -> Result<UuidType, HostError>;

    fn start_scan(&mut self) -> Result<(), HostError>;

    fn connect(&mut self, peer: &PeerAddress) -> Result<(), HostError>;

    fn update_conn_params(&mut self, conn: ConnHandle, params: &ConnParams)
        -> Result<(), HostError>;

    fn discover_primary_services(
        &mut self,
        conn: ConnHandle,
        start_handle: u16,
        uuid: &BleUuid,
    ) -> Result<(), HostError>;

    fn discover_characteristics(
        &mut self,
        conn: ConnHandle,
        range: &HandleRange,
    ) -> Result<(), HostError>;

    fn discover_descriptors(&mut self, conn: ConnHandle, range: &HandleRange)
        -> Result<(), HostError>;

    fn write(&mut self, conn: ConnHandle, params: &WriteParams<'_>) -> Result<(), HostError>;

    fn read(&mut self, conn: ConnHandle, handle: u16, offset: u16) -> Result<(), HostError>;
}
