//! Long write of the request payload.
//!
//! A single GATT write carries at most [`WRITE_FRAGMENT_LEN`] bytes here, so
//! the request goes out as a queue of prepared writes that the peer commits
//! with one execute write:
//!
//! ```text
//! EnableNotify  -- write 0x0001 to the CCCD
//! Fragmenting   -- prepare write [cursor, cursor + 18) ... until cursor == len
//! Committing    -- execute write
//! Done
//! ```
//!
//! Exactly one write is outstanding at a time; the next one is issued from
//! the response to the previous one. A failure status parks the writer in its
//! current phase.

use super::discovery::AttributeHandles;
use super::{ConnHandle, GattHost, GattStatus, WriteOp, WriteParams};
use crate::config::{CCCD_ENABLE_NOTIFICATIONS, WRITE_FRAGMENT_LEN};
use crate::error::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WritePhase {
    /// Nothing has been started on this connection.
    Idle,
    /// The CCCD write enabling notifications is outstanding.
    EnableNotify,
    /// Prepared writes are being queued on the peer.
    Fragmenting,
    /// The execute write is outstanding.
    Committing,
    /// The peer acknowledged the execute write.
    Done,
}

/// What a write response led to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WriteStep {
    /// No write of ours was outstanding.
    Ignored,
    /// The next write was issued.
    Continued,
    /// The payload was committed by the peer.
    Delivered,
}

pub struct ChunkedWriter {
    phase: WritePhase,
    /// Payload bytes the peer has acknowledged.
    cursor: usize,
    /// Length of the prepared write in flight.
    in_flight: usize,
    /// A write of ours awaits its response.
    awaiting: bool,
    /// The payload was restarted while a write was outstanding. Holds the
    /// phase that write was issued in; its response clears the way for the
    /// first fragment.
    restart: Option<WritePhase>,
}

impl ChunkedWriter {
    pub const fn new() -> Self {
        Self {
            phase: WritePhase::Idle,
            cursor: 0,
            in_flight: 0,
            awaiting: false,
            restart: None,
        }
    }

    pub fn phase(&self) -> WritePhase {
        self.phase
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// True while a write of ours awaits its response.
    pub fn is_busy(&self) -> bool {
        self.awaiting
    }

    /// Forget the outstanding write after the link dropped; its response will
    /// never arrive. Phase and cursor stay where they were.
    pub fn link_lost(&mut self) {
        self.awaiting = false;
        self.restart = None;
        self.in_flight = 0;
    }

    /// Enable notifications on the characteristic; the payload follows once
    /// the peer acknowledges.
    pub fn enable_notifications(
        &mut self,
        host: &mut impl GattHost,
        conn: ConnHandle,
        handles: &AttributeHandles,
    ) -> Result<(), Error> {
        self.phase = WritePhase::EnableNotify;
        self.cursor = 0;
        self.restart = None;

        debug!("Enabling notifications via CCCD {=u16:#x}", handles.cccd);
        let params = WriteParams {
            handle: handles.cccd,
            op: WriteOp::Request,
            offset: 0,
            value: &CCCD_ENABLE_NOTIFICATIONS,
        };
        self.issue(host, conn, &params, 0)
    }

    /// (Re)start sending `payload` from its first byte.
    ///
    /// Any fragments already queued on the peer are abandoned. If one of our
    /// writes is still outstanding, the first fragment goes out when its
    /// response arrives.
    pub fn write_payload(
        &mut self,
        host: &mut impl GattHost,
        conn: ConnHandle,
        handles: &AttributeHandles,
        payload: &[u8],
    ) -> Result<(), Error> {
        self.cursor = 0;
        self.in_flight = 0;

        if self.awaiting {
            debug!("Write outstanding, payload restart deferred");
            if self.restart.is_none() {
                self.restart = Some(self.phase);
            }
            self.phase = WritePhase::Fragmenting;
            return Ok(());
        }
        self.phase = WritePhase::Fragmenting;
        self.restart = None;
        self.issue_next(host, conn, handles, payload)
    }

    pub fn on_write_response(
        &mut self,
        host: &mut impl GattHost,
        conn: ConnHandle,
        handles: &AttributeHandles,
        payload: &[u8],
        status: GattStatus,
    ) -> Result<WriteStep, Error> {
        if !self.awaiting {
            warn!("Unexpected write response in {}", self.phase);
            return Ok(WriteStep::Ignored);
        }
        self.awaiting = false;

        if let Some(superseded) = self.restart.take() {
            if !status.is_success() {
                if superseded == WritePhase::EnableNotify {
                    error!("CCCD write failed: status {=u16:#x}", status.0);
                    self.phase = WritePhase::EnableNotify;
                    return Err(Error::Write {
                        phase: WritePhase::EnableNotify,
                        status,
                    });
                }
                warn!(
                    "Abandoned write in {} failed: status {=u16:#x}",
                    superseded,
                    status.0
                );
            }
            self.issue_next(host, conn, handles, payload)?;
            return Ok(WriteStep::Continued);
        }

        if !status.is_success() {
            error!(
                "Write failed in {} at offset {}: status {=u16:#x}",
                self.phase,
                self.cursor,
                status.0
            );
            return Err(Error::Write {
                phase: self.phase,
                status,
            });
        }

        match self.phase {
            WritePhase::EnableNotify => {
                info!("Notifications enabled, sending {} byte request", payload.len());
                self.phase = WritePhase::Fragmenting;
                self.cursor = 0;
                self.issue_next(host, conn, handles, payload)?;
                Ok(WriteStep::Continued)
            }
            WritePhase::Fragmenting => {
                self.cursor += self.in_flight;
                self.in_flight = 0;
                self.issue_next(host, conn, handles, payload)?;
                Ok(WriteStep::Continued)
            }
            WritePhase::Committing => {
                self.phase = WritePhase::Done;
                info!("Request delivered ({} bytes)", self.cursor);
                Ok(WriteStep::Delivered)
            }
            WritePhase::Idle | WritePhase::Done => Ok(WriteStep::Ignored),
        }
    }

    /// Queue the fragment at the cursor, or commit once nothing remains.
    fn issue_next(
        &mut self,
        host: &mut impl GattHost,
        conn: ConnHandle,
        handles: &AttributeHandles,
        payload: &[u8],
    ) -> Result<(), Error> {
        let remaining = payload.len().saturating_sub(self.cursor);
        if remaining == 0 {
            self.phase = WritePhase::Committing;
            trace!("Execute write ({} bytes queued)", self.cursor);
            let params = WriteParams {
                handle: handles.value,
                op: WriteOp::Execute,
                offset: 0,
                value: &[],
            };
            return self.issue(host, conn, &params, 0);
        }

        let len = remaining.min(WRITE_FRAGMENT_LEN);
        trace!("Prepare write offset {} len {}", self.cursor, len);
        let params = WriteParams {
            handle: handles.value,
            op: WriteOp::Prepare,
            offset: self.cursor as u16,
            value: &payload[self.cursor..self.cursor + len],
        };
        self.issue(host, conn, &params, len)
    }

    fn issue(
        &mut self,
        host: &mut impl GattHost,
        conn: ConnHandle,
        params: &WriteParams<'_>,
        fragment_len: usize,
    ) -> Result<(), Error> {
        match host.write(conn, params) {
            Ok(()) => {
                self.in_flight = fragment_len;
                self.awaiting = true;
                Ok(())
            }
            Err(e) => {
                error!("Write rejected by link layer in {}: {}", self.phase, e);
                Err(e.into())
            }
        }
    }
}

impl Default for ChunkedWriter {
    fn default() -> Self {
        Self::new()
    }
}
