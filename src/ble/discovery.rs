//! GATT discovery of the gateway characteristic.
//!
//! After a connection is established this walks, strictly in order:
//! 1. Primary service discovery for the gateway service UUID.
//! 2. Characteristic discovery inside the first matching service.
//! 3. Descriptor discovery on the handle right after the characteristic
//!    value, where the gateway firmware places its CCCD.
//!
//! Each step is issued from the response handler of the previous one.
//! A failed step parks discovery; only a fresh connection restarts it.

use super::uuid::{BleUuid, Target};
use super::{
    ConnHandle, DiscoveredCharacteristic, DiscoveredDescriptor, DiscoveredService, GattHost,
    GattStatus, HandleRange,
};
use crate::config::{CCCD_UUID16, DISCOVERY_START_HANDLE};
use crate::error::Error;

/// How far discovery has come on the current connection.
///
/// Only ever moves forward; a new connection resets it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DiscoveryProgress {
    AwaitingService,
    AwaitingCharacteristic,
    AwaitingDescriptor,
    Ready,
}

/// Handles of the gateway characteristic on the peer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AttributeHandles {
    /// Characteristic value: target of writes and reads, source of notifications.
    pub value: u16,
    /// Characteristic declaration.
    pub declaration: u16,
    /// Client Characteristic Configuration Descriptor.
    pub cccd: u16,
}

impl AttributeHandles {
    const fn unset() -> Self {
        Self {
            value: 0,
            declaration: 0,
            cccd: 0,
        }
    }
}

/// What a discovery response led to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DiscoveryStep {
    /// The response did not belong to the current step.
    Ignored,
    /// The next discovery command was issued.
    Advanced,
    /// All handles are known.
    Ready(AttributeHandles),
}

pub struct Discovery {
    progress: DiscoveryProgress,
    /// False before the first connection and after a failed step.
    active: bool,
    handles: AttributeHandles,
}

impl Discovery {
    pub const fn new() -> Self {
        Self {
            progress: DiscoveryProgress::AwaitingService,
            active: false,
            handles: AttributeHandles::unset(),
        }
    }

    pub fn progress(&self) -> DiscoveryProgress {
        self.progress
    }

    /// True when discovery was abandoned after a failure.
    pub fn is_halted(&self) -> bool {
        !self.active && self.progress != DiscoveryProgress::Ready
    }

    /// The discovered handles, available only once discovery is complete.
    pub fn handles(&self) -> Option<AttributeHandles> {
        (self.progress == DiscoveryProgress::Ready).then_some(self.handles)
    }

    /// Restart discovery on a freshly established connection.
    pub fn start(
        &mut self,
        host: &mut impl GattHost,
        conn: ConnHandle,
        target: &Target,
    ) -> Result<(), Error> {
        self.progress = DiscoveryProgress::AwaitingService;
        self.handles = AttributeHandles::unset();
        self.active = true;

        info!("Discovering gateway service on conn {}", conn.0);
        if let Err(e) =
            host.discover_primary_services(conn, DISCOVERY_START_HANDLE, &target.service_uuid())
        {
            return Err(self.abort(e.into()));
        }
        Ok(())
    }

    pub fn on_services(
        &mut self,
        host: &mut impl GattHost,
        conn: ConnHandle,
        status: GattStatus,
        services: &[DiscoveredService],
    ) -> Result<DiscoveryStep, Error> {
        if !self.expects(DiscoveryProgress::AwaitingService) {
            return Ok(DiscoveryStep::Ignored);
        }
        if !status.is_success() {
            return Err(self.abort(Error::ServiceNotFound(status)));
        }

        // The gateway exposes a single instance of its service.
        let Some(service) = services.first() else {
            return Err(self.abort(Error::ServiceNotFound(status)));
        };

        debug!(
            "Service found at {=u16:#x}..{=u16:#x}",
            service.range.start,
            service.range.end
        );
        if let Err(e) = host.discover_characteristics(conn, &service.range) {
            return Err(self.abort(e.into()));
        }
        self.progress = DiscoveryProgress::AwaitingCharacteristic;
        Ok(DiscoveryStep::Advanced)
    }

    pub fn on_characteristics(
        &mut self,
        host: &mut impl GattHost,
        conn: ConnHandle,
        target: &Target,
        status: GattStatus,
        characteristics: &[DiscoveredCharacteristic],
    ) -> Result<DiscoveryStep, Error> {
        if !self.expects(DiscoveryProgress::AwaitingCharacteristic) {
            return Ok(DiscoveryStep::Ignored);
        }
        if !status.is_success() {
            return Err(self.abort(Error::CharacteristicNotFound(status)));
        }

        let wanted = target.characteristic_uuid();
        let Some(characteristic) = characteristics.iter().find(|c| c.uuid == wanted) else {
            return Err(self.abort(Error::CharacteristicNotFound(status)));
        };

        debug!(
            "Characteristic found: decl {=u16:#x} value {=u16:#x}",
            characteristic.decl_handle,
            characteristic.value_handle
        );

        // The CCCD sits directly after the value handle on the gateway.
        let Some(cccd_guess) = characteristic.value_handle.checked_add(1) else {
            return Err(self.abort(Error::CccdNotFound(status)));
        };
        let range = HandleRange {
            start: cccd_guess,
            end: cccd_guess,
        };
        if let Err(e) = host.discover_descriptors(conn, &range) {
            return Err(self.abort(e.into()));
        }

        self.handles.value = characteristic.value_handle;
        self.handles.declaration = characteristic.decl_handle;
        self.progress = DiscoveryProgress::AwaitingDescriptor;
        Ok(DiscoveryStep::Advanced)
    }

    pub fn on_descriptors(
        &mut self,
        status: GattStatus,
        descriptors: &[DiscoveredDescriptor],
    ) -> Result<DiscoveryStep, Error> {
        if !self.expects(DiscoveryProgress::AwaitingDescriptor) {
            return Ok(DiscoveryStep::Ignored);
        }
        if !status.is_success() {
            return Err(self.abort(Error::CccdNotFound(status)));
        }

        let cccd_uuid = BleUuid::sig(CCCD_UUID16);
        let Some(cccd) = descriptors.iter().find(|d| d.uuid == cccd_uuid) else {
            return Err(self.abort(Error::CccdNotFound(status)));
        };

        self.handles.cccd = cccd.handle;
        self.progress = DiscoveryProgress::Ready;
        self.active = false;
        info!("Gateway characteristic ready: {}", self.handles);
        Ok(DiscoveryStep::Ready(self.handles))
    }

    fn expects(&self, progress: DiscoveryProgress) -> bool {
        if self.active && self.progress == progress {
            return true;
        }
        warn!(
            "Discovery response ignored (awaiting {}, active {})",
            self.progress,
            self.active
        );
        false
    }

    fn abort(&mut self, e: Error) -> Error {
        self.active = false;
        error!("Discovery abandoned at {}: {}", self.progress, e);
        e
    }
}

impl Default for Discovery {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::mock::{Command, MockHost};
    use crate::ble::uuid::{UuidType, VendorBase};
    use crate::ble::HostError;
    use crate::config::{BLEHTTP_BASE_UUID, BLEHTTP_CHAR_UUID16, BLEHTTP_SERVICE_UUID16};

    const CONN: ConnHandle = ConnHandle(0);
    const VENDOR: UuidType = UuidType::VENDOR_BEGIN;

    fn target() -> Target {
        Target::new(
            VendorBase::new(BLEHTTP_BASE_UUID),
            VENDOR,
            BLEHTTP_SERVICE_UUID16,
            BLEHTTP_CHAR_UUID16,
        )
    }

    fn service() -> DiscoveredService {
        DiscoveredService {
            uuid: BleUuid::vendor(VENDOR, BLEHTTP_SERVICE_UUID16),
            range: HandleRange {
                start: 0x000c,
                end: 0xffff,
            },
        }
    }

    fn characteristics() -> [DiscoveredCharacteristic; 2] {
        [
            DiscoveredCharacteristic {
                uuid: BleUuid::sig(0x2a00),
                decl_handle: 0x000d,
                value_handle: 0x000e,
            },
            DiscoveredCharacteristic {
                uuid: BleUuid::vendor(VENDOR, BLEHTTP_CHAR_UUID16),
                decl_handle: 0x000f,
                value_handle: 0x0010,
            },
        ]
    }

    fn cccd() -> DiscoveredDescriptor {
        DiscoveredDescriptor {
            uuid: BleUuid::sig(CCCD_UUID16),
            handle: 0x0011,
        }
    }

    fn started() -> (Discovery, MockHost) {
        let mut host = MockHost::new();
        let mut discovery = Discovery::new();
        discovery.start(&mut host, CONN, &target()).unwrap();
        (discovery, host)
    }

    #[test]
    fn start_discovers_services_from_first_handle() {
        let (discovery, mut host) = started();
        assert_eq!(discovery.progress(), DiscoveryProgress::AwaitingService);
        assert_eq!(
            host.take(),
            [Command::DiscoverServices {
                conn: CONN,
                start: 0x0001,
                uuid: BleUuid::vendor(VENDOR, BLEHTTP_SERVICE_UUID16),
            }]
        );
    }

    #[test]
    fn full_walk_reaches_ready() {
        let (mut d, mut host) = started();
        host.take();

        let step = d
            .on_services(&mut host, CONN, GattStatus::SUCCESS, &[service()])
            .unwrap();
        assert_eq!(step, DiscoveryStep::Advanced);
        assert_eq!(d.progress(), DiscoveryProgress::AwaitingCharacteristic);
        assert_eq!(
            host.take(),
            [Command::DiscoverCharacteristics {
                conn: CONN,
                range: service().range,
            }]
        );

        let step = d
            .on_characteristics(&mut host, CONN, &target(), GattStatus::SUCCESS, &characteristics())
            .unwrap();
        assert_eq!(step, DiscoveryStep::Advanced);
        assert_eq!(
            host.take(),
            [Command::DiscoverDescriptors {
                conn: CONN,
                range: HandleRange {
                    start: 0x0011,
                    end: 0x0011,
                },
            }]
        );
        assert!(d.handles().is_none());

        let step = d.on_descriptors(GattStatus::SUCCESS, &[cccd()]).unwrap();
        let expected = AttributeHandles {
            value: 0x0010,
            declaration: 0x000f,
            cccd: 0x0011,
        };
        assert_eq!(step, DiscoveryStep::Ready(expected));
        assert_eq!(d.handles(), Some(expected));
        assert!(!d.is_halted());
    }

    #[test]
    fn empty_service_list_halts() {
        let (mut d, mut host) = started();
        host.take();
        let err = d
            .on_services(&mut host, CONN, GattStatus::SUCCESS, &[])
            .unwrap_err();
        assert_eq!(err, Error::ServiceNotFound(GattStatus::SUCCESS));
        assert!(d.is_halted());
        assert_eq!(d.progress(), DiscoveryProgress::AwaitingService);
        assert!(host.take().is_empty());
    }

    #[test]
    fn failed_service_status_halts() {
        let (mut d, mut host) = started();
        host.take();
        let status = GattStatus(0x010a);
        let err = d
            .on_services(&mut host, CONN, status, &[service()])
            .unwrap_err();
        assert_eq!(err, Error::ServiceNotFound(status));
        assert!(host.take().is_empty());
    }

    #[test]
    fn missing_characteristic_halts() {
        let (mut d, mut host) = started();
        d.on_services(&mut host, CONN, GattStatus::SUCCESS, &[service()])
            .unwrap();
        host.take();

        let only_other = [characteristics()[0]];
        let err = d
            .on_characteristics(&mut host, CONN, &target(), GattStatus::SUCCESS, &only_other)
            .unwrap_err();
        assert_eq!(err, Error::CharacteristicNotFound(GattStatus::SUCCESS));
        assert_eq!(d.progress(), DiscoveryProgress::AwaitingCharacteristic);
        assert!(d.is_halted());
        assert!(host.take().is_empty());
    }

    #[test]
    fn same_short_uuid_with_sig_type_is_not_the_target() {
        let (mut d, mut host) = started();
        d.on_services(&mut host, CONN, GattStatus::SUCCESS, &[service()])
            .unwrap();
        let impostor = [DiscoveredCharacteristic {
            uuid: BleUuid::sig(BLEHTTP_CHAR_UUID16),
            decl_handle: 0x000f,
            value_handle: 0x0010,
        }];
        assert!(d
            .on_characteristics(&mut host, CONN, &target(), GattStatus::SUCCESS, &impostor)
            .is_err());
    }

    #[test]
    fn missing_cccd_halts() {
        let (mut d, mut host) = started();
        d.on_services(&mut host, CONN, GattStatus::SUCCESS, &[service()])
            .unwrap();
        d.on_characteristics(&mut host, CONN, &target(), GattStatus::SUCCESS, &characteristics())
            .unwrap();

        let user_description = DiscoveredDescriptor {
            uuid: BleUuid::sig(0x2901),
            handle: 0x0011,
        };
        let err = d
            .on_descriptors(GattStatus::SUCCESS, &[user_description])
            .unwrap_err();
        assert_eq!(err, Error::CccdNotFound(GattStatus::SUCCESS));
        assert!(d.handles().is_none());
    }

    #[test]
    fn out_of_order_responses_are_ignored() {
        let (mut d, mut host) = started();
        host.take();

        let step = d
            .on_characteristics(&mut host, CONN, &target(), GattStatus::SUCCESS, &characteristics())
            .unwrap();
        assert_eq!(step, DiscoveryStep::Ignored);
        assert_eq!(d.on_descriptors(GattStatus::SUCCESS, &[cccd()]).unwrap(), DiscoveryStep::Ignored);
        assert_eq!(d.progress(), DiscoveryProgress::AwaitingService);
        assert!(host.take().is_empty());
    }

    #[test]
    fn progress_never_regresses_within_a_connection() {
        let (mut d, mut host) = started();
        let mut last = d.progress();

        d.on_services(&mut host, CONN, GattStatus::SUCCESS, &[service()])
            .unwrap();
        assert!(d.progress() > last);
        last = d.progress();

        // A duplicate service response must not move it back.
        d.on_services(&mut host, CONN, GattStatus::SUCCESS, &[service()])
            .unwrap();
        assert_eq!(d.progress(), last);

        d.on_characteristics(&mut host, CONN, &target(), GattStatus::SUCCESS, &characteristics())
            .unwrap();
        assert!(d.progress() > last);
        last = d.progress();

        d.on_descriptors(GattStatus::SUCCESS, &[cccd()]).unwrap();
        assert!(d.progress() > last);

        // Late responses after Ready change nothing.
        d.on_services(&mut host, CONN, GattStatus::SUCCESS, &[service()])
            .unwrap();
        assert_eq!(d.progress(), DiscoveryProgress::Ready);
    }

    #[test]
    fn restart_resets_to_awaiting_service() {
        let (mut d, mut host) = started();
        d.on_services(&mut host, CONN, GattStatus::SUCCESS, &[service()])
            .unwrap();
        d.on_characteristics(&mut host, CONN, &target(), GattStatus::SUCCESS, &characteristics())
            .unwrap();
        d.on_descriptors(GattStatus::SUCCESS, &[cccd()]).unwrap();

        d.start(&mut host, ConnHandle(1), &target()).unwrap();
        assert_eq!(d.progress(), DiscoveryProgress::AwaitingService);
        assert!(d.handles().is_none());
    }

    #[test]
    fn rejected_command_halts() {
        let mut host = MockHost::new();
        host.reject = Some(HostError(0x08));
        let mut d = Discovery::new();
        let err = d.start(&mut host, CONN, &target()).unwrap_err();
        assert_eq!(err, Error::Host(HostError(0x08)));
        assert!(d.is_halted());
    }
}
