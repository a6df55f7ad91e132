//! Reassembly of the gateway response.
//!
//! The gateway notifies the value handle when a response is ready. The
//! central then reads it back with successive reads at increasing offsets.
//! There is no length prefix: a fragment of exactly [`READ_FRAGMENT_LEN`]
//! bytes means more follows, anything shorter ends the message.

use super::{ConnHandle, GattHost, GattStatus};
use crate::config::{READ_FRAGMENT_LEN, RESPONSE_CAPACITY};
use crate::error::Error;

/// What a read response led to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReadStep {
    /// No read of ours was outstanding.
    Ignored,
    /// A full fragment arrived; the next read was issued.
    Continued,
    /// A short fragment ended the message; total length in bytes.
    Complete(usize),
}

pub struct ChunkedReader {
    buf: [u8; RESPONSE_CAPACITY],
    len: usize,
    /// Offset of the outstanding read, if any.
    pending: Option<u16>,
    complete: bool,
}

impl ChunkedReader {
    pub const fn new() -> Self {
        Self {
            buf: [0; RESPONSE_CAPACITY],
            len: 0,
            pending: None,
            complete: false,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Bytes accumulated so far in the current read sequence.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The response, once a short fragment has ended it.
    pub fn response(&self) -> Option<&[u8]> {
        self.complete.then(|| &self.buf[..self.len])
    }

    /// Forget the outstanding read after the link dropped. Bytes gathered so
    /// far are kept.
    pub fn link_lost(&mut self) {
        self.pending = None;
    }

    /// Begin a new read sequence at offset 0, discarding any previous message.
    pub fn start(
        &mut self,
        host: &mut impl GattHost,
        conn: ConnHandle,
        value_handle: u16,
    ) -> Result<(), Error> {
        self.len = 0;
        self.complete = false;
        self.pending = None;
        debug!("Response ready, reading from {=u16:#x}", value_handle);
        self.issue(host, conn, value_handle, 0)
    }

    pub fn on_read_response(
        &mut self,
        host: &mut impl GattHost,
        conn: ConnHandle,
        value_handle: u16,
        status: GattStatus,
        offset: u16,
        data: &[u8],
    ) -> Result<ReadStep, Error> {
        let Some(expected) = self.pending.take() else {
            warn!("Unexpected read response at offset {}", offset);
            return Ok(ReadStep::Ignored);
        };

        if !status.is_success() {
            error!("Read failed at offset {}: status {=u16:#x}", offset, status.0);
            return Err(Error::Read { offset, status });
        }

        if offset != expected {
            error!("Read response at offset {}, expected {}", offset, expected);
            return Err(Error::ReadOffset {
                expected,
                actual: offset,
            });
        }

        let start = offset as usize;
        let end = start + data.len();
        if end > self.buf.len() {
            error!(
                "Read fragment {}+{} exceeds {} byte buffer",
                offset,
                data.len(),
                RESPONSE_CAPACITY
            );
            return Err(Error::ResponseOverflow {
                offset,
                len: data.len() as u16,
            });
        }

        self.buf[start..end].copy_from_slice(data);
        self.len = self.len.max(end);
        trace!("Read {} bytes at offset {}", data.len(), offset);

        if data.len() == READ_FRAGMENT_LEN {
            self.issue(host, conn, value_handle, end as u16)?;
            return Ok(ReadStep::Continued);
        }

        self.complete = true;
        info!("Response complete ({} bytes)", self.len);
        Ok(ReadStep::Complete(self.len))
    }

    fn issue(
        &mut self,
        host: &mut impl GattHost,
        conn: ConnHandle,
        value_handle: u16,
        offset: u16,
    ) -> Result<(), Error> {
        match host.read(conn, value_handle, offset) {
            Ok(()) => {
                self.pending = Some(offset);
                Ok(())
            }
            Err(e) => {
                error!("Read rejected by link layer at offset {}: {}", offset, e);
                Err(e.into())
            }
        }
    }
}

impl Default for ChunkedReader {
    fn default() -> Self {
        Self::new()
    }
}
