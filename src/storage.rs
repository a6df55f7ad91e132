//! Persistent application state.
//!
//! Uses the nRF52840's internal flash via the `sequential-storage` crate to
//! keep the [`AppState`] blob across resets.
//!
//! Storage layout:
//!   - A single map item under [`KEY_APP_STATE`] holding the encoded state.
//!   - `sequential-storage` appends new versions of the item and takes care
//!     of page erasure and wear levelling.

use blehttp::app_state::{AppState, APP_STATE_SIZE};
use blehttp::config::{STORAGE_FLASH_PAGE_COUNT, STORAGE_FLASH_PAGE_START};
use defmt::{debug, error, info};
use embedded_storage_async::nor_flash::NorFlash;
use sequential_storage::cache::NoCache;
use sequential_storage::map;

/// Flash page size for nRF52840 (4 KB).
const FLASH_PAGE_SIZE: u32 = 4096;

/// Start address of our storage region.
const STORAGE_START: u32 = STORAGE_FLASH_PAGE_START * FLASH_PAGE_SIZE;

/// End address (exclusive) of our storage region.
const STORAGE_END: u32 = (STORAGE_FLASH_PAGE_START + STORAGE_FLASH_PAGE_COUNT) * FLASH_PAGE_SIZE;

/// Key of the application state item in the map storage.
const KEY_APP_STATE: u8 = 0x01;

/// Scratch buffer for one map item (key, length header and value).
const ITEM_BUF_SIZE: usize = 64;

/// In-memory copy of the application state, synced with flash.
pub struct AppStateStore {
    state: AppState,
    /// True if the cached state differs from flash.
    dirty: bool,
}

impl AppStateStore {
    pub const fn new() -> Self {
        Self {
            state: AppState {
                transfers: 0,
                last_response_len: 0,
            },
            dirty: false,
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Count a completed exchange; persisted on the next save.
    pub fn record_transfer(&mut self, response_len: usize) {
        self.state.record_transfer(response_len);
        self.dirty = true;
    }

    pub async fn load_from_flash(&mut self, flash: &mut impl NorFlash) {
        let mut buf = [0u8; ITEM_BUF_SIZE];

        match map::fetch_item::<u8, &[u8], _>(
            flash,
            STORAGE_START..STORAGE_END,
            &mut NoCache::new(),
            &mut buf,
            &KEY_APP_STATE,
        )
        .await
        {
            Ok(Some(data)) => match AppState::deserialize(data) {
                Some(state) => {
                    info!(
                        "Loaded app state: {} transfers, last response {} bytes",
                        state.transfers,
                        state.last_response_len
                    );
                    self.state = state;
                }
                None => {
                    info!("Stored app state has another layout, starting fresh");
                    self.state = AppState::default();
                }
            },
            Ok(None) => {
                info!("No app state in flash");
                self.state = AppState::default();
            }
            Err(e) => {
                error!("Flash read error: {:?}", defmt::Debug2Format(&e));
                self.state = AppState::default();
            }
        }
        self.dirty = false;
    }

    pub async fn save_to_flash(&mut self, flash: &mut impl NorFlash) {
        if !self.dirty {
            debug!("AppStateStore: no changes to save");
            return;
        }

        let mut buf = [0u8; ITEM_BUF_SIZE];
        let encoded: [u8; APP_STATE_SIZE] = self.state.serialize();
        let item: &[u8] = &encoded;

        match map::store_item::<u8, &[u8], _>(
            flash,
            STORAGE_START..STORAGE_END,
            &mut NoCache::new(),
            &mut buf,
            &KEY_APP_STATE,
            &item,
        )
        .await
        {
            Ok(()) => {
                debug!("Saved app state ({} transfers)", self.state.transfers);
                self.dirty = false;
            }
            Err(e) => {
                error!("Flash write error: {:?}", defmt::Debug2Format(&e));
            }
        }
    }
}
