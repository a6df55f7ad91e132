//! Logging shim.
//!
//! With the `defmt` feature the macros forward to `defmt`; without it they
//! compile to nothing but still borrow their arguments, so host builds of the
//! library see no unused-variable warnings.

#![allow(unused_macros)]

#[cfg(feature = "defmt")]
macro_rules! trace {
    ($s:literal $(, $x:expr)* $(,)?) => {
        ::defmt::trace!($s $(, $x)*)
    };
}

#[cfg(feature = "defmt")]
macro_rules! debug {
    ($s:literal $(, $x:expr)* $(,)?) => {
        ::defmt::debug!($s $(, $x)*)
    };
}

#[cfg(feature = "defmt")]
macro_rules! info {
    ($s:literal $(, $x:expr)* $(,)?) => {
        ::defmt::info!($s $(, $x)*)
    };
}

#[cfg(feature = "defmt")]
macro_rules! warn {
    ($s:literal $(, $x:expr)* $(,)?) => {
        ::defmt::warn!($s $(, $x)*)
    };
}

#[cfg(feature = "defmt")]
macro_rules! error {
    ($s:literal $(, $x:expr)* $(,)?) => {
        ::defmt::error!($s $(, $x)*)
    };
}

#[cfg(not(feature = "defmt"))]
macro_rules! trace {
    ($s:literal $(, $x:expr)* $(,)?) => {{
        let _ = ($( & $x ),*);
    }};
}

#[cfg(not(feature = "defmt"))]
macro_rules! debug {
    ($s:literal $(, $x:expr)* $(,)?) => {{
        let _ = ($( & $x ),*);
    }};
}

#[cfg(not(feature = "defmt"))]
macro_rules! info {
    ($s:literal $(, $x:expr)* $(,)?) => {{
        let _ = ($( & $x ),*);
    }};
}

#[cfg(not(feature = "defmt"))]
macro_rules! warn {
    ($s:literal $(, $x:expr)* $(,)?) => {{
        let _ = ($( & $x ),*);
    }};
}

#[cfg(not(feature = "defmt"))]
macro_rules! error {
    ($s:literal $(, $x:expr)* $(,)?) => {{
        let _ = ($( & $x ),*);
    }};
}
