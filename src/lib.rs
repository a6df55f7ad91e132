//! blehttp - BLE GATT central that tunnels an HTTP-like request to a
//! gateway peripheral.
//!
//! The protocol engine is pure logic and builds on the host, so the whole
//! exchange (scan filter, discovery, long write, chunked read) is unit
//! tested without hardware:
//!
//! ```text
//! cargo test --lib
//! cargo test --test integration
//! ```
//!
//! The firmware binary (`src/main.rs`, feature `embedded`) plugs the
//! SoftDevice into [`ble::GattHost`] and feeds its events to
//! [`ble::central::Central`].

#![cfg_attr(not(test), no_std)]

// Must come first so the logging macros are visible to every module.
#[macro_use]
mod fmt;

pub mod app_state;
pub mod ble;
pub mod config;
pub mod error;
pub mod request;

pub use ble::central::{Central, Link, Outcome};
pub use error::Error;
pub use request::{Method, Request, RequestBuilder};
