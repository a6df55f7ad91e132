//! UUIDs as the link layer reports them.
//!
//! The SoftDevice never hands out full 128-bit UUIDs during discovery.
//! Each vendor base is registered once and the stack returns a small type
//! token; afterwards every UUID is a `(type, 16-bit value)` pair.

/// UUID type token assigned by the link layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UuidType(pub u8);

impl UuidType {
    /// Bluetooth SIG base UUID.
    pub const SIG: Self = Self(1);
    /// First token handed out for vendor-specific bases.
    pub const VENDOR_BEGIN: Self = Self(2);
}

/// A UUID in link-layer form.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BleUuid {
    pub uuid: u16,
    pub ty: UuidType,
}

impl BleUuid {
    pub const fn sig(uuid: u16) -> Self {
        Self {
            uuid,
            ty: UuidType::SIG,
        }
    }

    pub const fn vendor(ty: UuidType, uuid: u16) -> Self {
        Self { uuid, ty }
    }
}

/// A vendor-specific 128-bit base UUID, stored little-endian.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct VendorBase([u8; 16]);

impl VendorBase {
    pub const fn new(bytes_le: [u8; 16]) -> Self {
        Self(bytes_le)
    }

    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Full 128-bit UUID with `short` placed in the 16-bit sub-ID slot.
    pub const fn with_short(&self, short: u16) -> [u8; 16] {
        let mut full = self.0;
        let le = short.to_le_bytes();
        full[12] = le[0];
        full[13] = le[1];
        full
    }
}

/// The gateway service and characteristic the central looks for.
///
/// Built once at start-up from a registered vendor base and never changed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Target {
    base: VendorBase,
    ty: UuidType,
    service: u16,
    characteristic: u16,
}

impl Target {
    pub const fn new(base: VendorBase, ty: UuidType, service: u16, characteristic: u16) -> Self {
        Self {
            base,
            ty,
            service,
            characteristic,
        }
    }

    /// Service UUID in link-layer form, used for discovery.
    pub const fn service_uuid(&self) -> BleUuid {
        BleUuid::vendor(self.ty, self.service)
    }

    /// Characteristic UUID in link-layer form.
    pub const fn characteristic_uuid(&self) -> BleUuid {
        BleUuid::vendor(self.ty, self.characteristic)
    }

    /// Service UUID as advertised (128-bit, little-endian).
    pub const fn service_uuid128(&self) -> [u8; 16] {
        self.base.with_short(self.service)
    }
}
