//! Recording link layer for unit tests.

use super::uuid::{BleUuid, UuidType};
use super::{ConnHandle, ConnParams, GattHost, HandleRange, HostError, PeerAddress, WriteOp, WriteParams};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    RegisterVendorUuid([u8; 16]),
    StartScan,
    Connect(PeerAddress),
    UpdateConnParams(ConnHandle, ConnParams),
    DiscoverServices {
        conn: ConnHandle,
        start: u16,
        uuid: BleUuid,
    },
    DiscoverCharacteristics {
        conn: ConnHandle,
        range: HandleRange,
    },
    DiscoverDescriptors {
        conn: ConnHandle,
        range: HandleRange,
    },
    Write {
        conn: ConnHandle,
        handle: u16,
        op: WriteOp,
        offset: u16,
        value: Vec<u8>,
    },
    Read {
        conn: ConnHandle,
        handle: u16,
        offset: u16,
    },
}

/// Records every command; optionally refuses them all.
pub struct MockHost {
    pub commands: Vec<Command>,
    pub reject: Option<HostError>,
    pub vendor_type: UuidType,
}

impl MockHost {
    pub fn new() -> Self {
        Self {
            commands: Vec::new(),
            reject: None,
            vendor_type: UuidType::VENDOR_BEGIN,
        }
    }

    /// Drain the recorded commands.
    pub fn take(&mut self) -> Vec<Command> {
        core::mem::take(&mut self.commands)
    }

    fn record(&mut self, command: Command) -> Result<(), HostError> {
        if let Some(e) = self.reject {
            return Err(e);
        }
        self.commands.push(command);
        Ok(())
    }
}

impl GattHost for MockHost {
    fn register_vendor_uuid(&mut self, base: &[u8; 16]) -> Result<UuidType, HostError> {
        self.record(Command::RegisterVendorUuid(*base))?;
        Ok(self.vendor_type)
    }

    fn start_scan(&mut self) -> Result<(), HostError> {
        self.record(Command::StartScan)
    }

    fn connect(&mut self, peer: &PeerAddress) -> Result<(), HostError> {
        self.record(Command::Connect(*peer))
    }

    fn update_conn_params(
        &mut self,
        conn: ConnHandle,
        params: &ConnParams,
    ) -> Result<(), HostError> {
        self.record(Command::UpdateConnParams(conn, *params))
    }

    fn discover_primary_services(
        &mut self,
        conn: ConnHandle,
        start_handle: u16,
        uuid: &BleUuid,
    ) -> Result<(), HostError> {
        self.record(Command::DiscoverServices {
            conn,
            start: start_handle,
            uuid: *uuid,
        })
    }

    fn discover_characteristics(
        &mut self,
        conn: ConnHandle,
        range: &HandleRange,
    ) -> Result<(), HostError> {
        self.record(Command::DiscoverCharacteristics {
            conn,
            range: *range,
        })
    }

    fn discover_descriptors(
        &mut self,
        conn: ConnHandle,
        range: &HandleRange,
    ) -> Result<(), HostError> {
        self.record(Command::DiscoverDescriptors {
            conn,
            range: *range,
        })
    }

    fn write(&mut self, conn: ConnHandle, params: &WriteParams<'_>) -> Result<(), HostError> {
        self.record(Command::Write {
            conn,
            handle: params.handle,
            op: params.op,
            offset: params.offset,
            value: params.value.to_vec(),
        })
    }

    fn read(&mut self, conn: ConnHandle, handle: u16, offset: u16) -> Result<(), HostError> {
        self.record(Command::Read {
            conn,
            handle,
            offset,
        })
    }
}
