//! Versioned application state kept in flash between resets.
//!
//! Layout (12 bytes, little-endian):
//! ```text
//! Bytes 0..4   magic
//! Bytes 4..6   layout version
//! Bytes 6..10  completed transfers
//! Bytes 10..12 length of the last response
//! ```
//!
//! A region that was never written (or written by an older layout) decodes
//! to `None`, and the caller starts from [`AppState::default`].

/// Marks a region written by this firmware.
pub const APP_STATE_MAGIC: u32 = 0xcafe;

/// Bumped whenever the layout changes.
pub const APP_STATE_VERSION: u16 = 1;

/// Encoded size in bytes.
pub const APP_STATE_SIZE: usize = 12;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AppState {
    /// Number of request/response exchanges completed since first boot.
    pub transfers: u32,
    /// Length of the most recent response.
    pub last_response_len: u16,
}

impl AppState {
    /// Record a completed exchange.
    pub fn record_transfer(&mut self, response_len: usize) {
        self.transfers = self.transfers.wrapping_add(1);
        self.last_response_len = response_len.min(u16::MAX as usize) as u16;
    }

    pub fn serialize(&self) -> [u8; APP_STATE_SIZE] {
        let mut buf = [0u8; APP_STATE_SIZE];
        buf[0..4].copy_from_slice(&APP_STATE_MAGIC.to_le_bytes());
        buf[4..6].copy_from_slice(&APP_STATE_VERSION.to_le_bytes());
        buf[6..10].copy_from_slice(&self.transfers.to_le_bytes());
        buf[10..12].copy_from_slice(&self.last_response_len.to_le_bytes());
        buf
    }

    pub fn deserialize(data: &[u8]) -> Option<Self> {
        if data.len() < APP_STATE_SIZE {
            return None;
        }
        let magic = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        let version = u16::from_le_bytes([data[4], data[5]]);
        if magic != APP_STATE_MAGIC || version != APP_STATE_VERSION {
            return None;
        }
        Some(Self {
            transfers: u32::from_le_bytes([data[6], data[7], data[8], data[9]]),
            last_response_len: u16::from_le_bytes([data[10], data[11]]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoded_layout() {
        let state = AppState {
            transfers: 0x0102_0304,
            last_response_len: 30,
        };
        assert_eq!(
            state.serialize(),
            [0xfe, 0xca, 0x00, 0x00, 0x01, 0x00, 0x04, 0x03, 0x02, 0x01, 30, 0]
        );
        assert_eq!(AppState::deserialize(&state.serialize()), Some(state));
    }

    #[test]
    fn erased_flash_is_not_a_state() {
        assert_eq!(AppState::deserialize(&[0xff; APP_STATE_SIZE]), None);
    }

    #[test]
    fn other_version_is_not_a_state() {
        let mut buf = AppState::default().serialize();
        buf[4] = 2;
        assert_eq!(AppState::deserialize(&buf), None);
    }

    #[test]
    fn short_buffer_is_not_a_state() {
        let buf = AppState::default().serialize();
        assert_eq!(AppState::deserialize(&buf[..APP_STATE_SIZE - 1]), None);
    }

    #[test]
    fn record_transfer_counts_and_clamps() {
        let mut state = AppState::default();
        state.record_transfer(30);
        state.record_transfer(100_000);
        assert_eq!(state.transfers, 2);
        assert_eq!(state.last_response_len, u16::MAX);
    }
}
