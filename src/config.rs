//! Application-wide constants and compile-time configuration.
//!
//! Protocol constants, radio timing parameters and the flash region used
//! for persisted state live here so they can be tuned in one place.

// Gateway service

/// Vendor base UUID of the HTTP gateway service, little-endian as it
/// appears on air. Bytes 12..14 carry the 16-bit sub-ID.
///
/// Full form: `16ba0001-cf44-461e-b889-4f9a90f6b330`.
pub const BLEHTTP_BASE_UUID: [u8; 16] = [
    0x30, 0xb3, 0xf6, 0x90, 0x9a, 0x4f, 0x89, 0xb8, 0x1e, 0x46, 0x44, 0xcf, 0x01, 0x00, 0xba, 0x16,
];

/// Sub-ID of the gateway service inside the vendor base.
pub const BLEHTTP_SERVICE_UUID16: u16 = 0x0001;

/// Sub-ID of the request/response characteristic inside the vendor base.
pub const BLEHTTP_CHAR_UUID16: u16 = 0x0002;

/// Client Characteristic Configuration Descriptor (Bluetooth SIG).
pub const CCCD_UUID16: u16 = 0x2902;

/// CCCD value enabling notifications (little-endian 0x0001).
pub const CCCD_ENABLE_NOTIFICATIONS: [u8; 2] = [0x01, 0x00];

/// First attribute handle searched by primary service discovery.
pub const DISCOVERY_START_HANDLE: u16 = 0x0001;

// Transfer sizing

/// Maximum bytes carried by one prepared write.
pub const WRITE_FRAGMENT_LEN: usize = 18;

/// A read response of exactly this length means more data follows.
pub const READ_FRAGMENT_LEN: usize = 22;

/// Capacity of the outbound request buffer.
pub const REQUEST_CAPACITY: usize = 512;

/// Capacity of the inbound response accumulation buffer.
pub const RESPONSE_CAPACITY: usize = 512;

/// Longest device name kept from an advertisement (legacy advertising
/// payloads are 31 bytes).
pub const DEVICE_NAME_LEN: usize = 31;

/// Name shown for peripherals that do not advertise one.
pub const UNKNOWN_DEVICE_NAME: &str = "?";

// Request

/// Gateway host header. Override at build time with `BLEHTTP_HOST`.
pub const REQUEST_HOST: &str = match option_env!("BLEHTTP_HOST") {
    Some(host) => host,
    None => "example.com",
};

/// Request target. Override at build time with `BLEHTTP_TARGET`.
pub const REQUEST_TARGET: &str = match option_env!("BLEHTTP_TARGET") {
    Some(target) => target,
    None => "https://example.com/",
};

// BLE radio

/// Passive scanning: the gateway name travels in the advertisement itself,
/// so no scan requests are sent.
pub const BLE_SCAN_ACTIVE: bool = false;

/// Scan interval (in 0.625 ms units). 0xA0 = 100 ms.
pub const BLE_SCAN_INTERVAL: u16 = 0x00A0;

/// Scan window (in 0.625 ms units). 0x50 = 50 ms.
pub const BLE_SCAN_WINDOW: u16 = 0x0050;

/// BLE connection interval range (in 1.25 ms units).
/// 16 = 20 ms, 60 = 75 ms.
pub const BLE_CONN_INTERVAL_MIN: u16 = 16;
pub const BLE_CONN_INTERVAL_MAX: u16 = 60;

/// BLE slave latency (number of connection events the peripheral can skip).
pub const BLE_SLAVE_LATENCY: u16 = 0;

/// BLE supervision timeout (in 10 ms units). 400 = 4 s.
pub const BLE_SUP_TIMEOUT: u16 = 400;

// Persisted application state

/// Flash page index where application state starts (4 KB per page on nRF52840).
pub const STORAGE_FLASH_PAGE_START: u32 = 240;

/// Number of flash pages reserved for application state.
pub const STORAGE_FLASH_PAGE_COUNT: u32 = 4;

// Diagnostics

/// How long the status LED stays lit for a transfer completion cue (ms).
pub const LED_PULSE_MS: u64 = 200;
