//! Connection event dispatcher.
//!
//! [`Central`] owns the per-connection state and routes every link-layer
//! event to the state machine it belongs to. It is the only place where
//! scanning, connecting and the request/response exchange meet.

use super::adv_parser::{contains_service_uuid128, extract_device_name};
use super::discovery::{AttributeHandles, Discovery, DiscoveryProgress, DiscoveryStep};
use super::reader::{ChunkedReader, ReadStep};
use super::uuid::{Target, VendorBase};
use super::writer::{ChunkedWriter, WritePhase, WriteStep};
use super::{BleEvent, ConnHandle, GattHost, PeerAddress};
use crate::config::{BLEHTTP_BASE_UUID, BLEHTTP_CHAR_UUID16, BLEHTTP_SERVICE_UUID16};
use crate::error::Error;
use crate::request::Request;

/// Where the radio link stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Link {
    Idle,
    Scanning,
    Connecting,
    Connected,
}

/// What an event amounted to, for the application loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Outcome {
    /// Nothing the application needs to act on.
    Idle,
    /// The exchange advanced by one operation.
    Progress,
    /// A gateway was found and a connection requested.
    Connecting(PeerAddress),
    Connected(ConnHandle),
    /// The link dropped; scanning resumed.
    Disconnected { reason: u8 },
    /// Discovery finished and notifications are being enabled.
    Ready(AttributeHandles),
    /// The peer committed the request.
    RequestDelivered,
    /// A full response was read back (length in bytes).
    ResponseComplete(usize),
}

/// State scoped to the current connection.
struct ConnectionContext {
    conn: ConnHandle,
    discovery: Discovery,
    writer: ChunkedWriter,
    reader: ChunkedReader,
    /// A notification arrived while a write was outstanding.
    read_deferred: bool,
}

pub struct Central {
    target: Target,
    link: Link,
    request: Request,
    ctx: ConnectionContext,
}

impl Central {
    /// Register the gateway UUID base with the stack and prepare to scan.
    pub fn new(host: &mut impl GattHost, request: Request) -> Result<Self, Error> {
        let base = VendorBase::new(BLEHTTP_BASE_UUID);
        let ty = host.register_vendor_uuid(base.as_bytes()).map_err(|e| {
            error!("Vendor UUID registration failed: {}", e);
            Error::from(e)
        })?;
        debug!("Vendor UUID registered as type {}", ty.0);

        Ok(Self {
            target: Target::new(base, ty, BLEHTTP_SERVICE_UUID16, BLEHTTP_CHAR_UUID16),
            link: Link::Idle,
            request,
            ctx: ConnectionContext {
                conn: ConnHandle::INVALID,
                discovery: Discovery::new(),
                writer: ChunkedWriter::new(),
                reader: ChunkedReader::new(),
                read_deferred: false,
            },
        })
    }

    pub fn start(&mut self, host: &mut impl GattHost) -> Result<(), Error> {
        self.scan(host)
    }

    pub fn handle_event(
        &mut self,
        host: &mut impl GattHost,
        event: &BleEvent<'_>,
    ) -> Result<Outcome, Error> {
        match *event {
            BleEvent::AdvReport { peer, rssi, data } => self.on_adv_report(host, peer, rssi, data),
            BleEvent::Connected { conn, peer } => {
                info!("Connected to {:02x} as conn {}", peer.bytes, conn.0);
                self.link = Link::Connected;
                self.ctx.conn = conn;
                self.ctx.read_deferred = false;
                self.ctx.discovery.start(host, conn, &self.target)?;
                Ok(Outcome::Connected(conn))
            }
            BleEvent::Disconnected { conn, reason } => {
                if !self.is_current(conn) {
                    return Ok(Outcome::Idle);
                }
                warn!("Disconnected from conn {} (reason {=u8:#x})", conn.0, reason);
                self.ctx.conn = ConnHandle::INVALID;
                self.ctx.writer.link_lost();
                self.ctx.reader.link_lost();
                self.ctx.read_deferred = false;
                self.scan(host)?;
                Ok(Outcome::Disconnected { reason })
            }
            BleEvent::ConnParamUpdateRequest { conn, params } => {
                if !self.is_current(conn) {
                    return Ok(Outcome::Idle);
                }
                debug!(
                    "Accepting conn params {}..{} latency {} timeout {}",
                    params.min_interval,
                    params.max_interval,
                    params.slave_latency,
                    params.sup_timeout
                );
                host.update_conn_params(conn, &params)?;
                Ok(Outcome::Idle)
            }
            BleEvent::TxComplete { conn, count } => {
                trace!("Tx complete on conn {}: {} packets", conn.0, count);
                Ok(Outcome::Idle)
            }
            BleEvent::PrimaryServicesDiscovered {
                conn,
                status,
                services,
            } => {
                if !self.is_current(conn) {
                    return Ok(Outcome::Idle);
                }
                let step = self.ctx.discovery.on_services(host, conn, status, services)?;
                Ok(Self::discovery_outcome(step))
            }
            BleEvent::CharacteristicsDiscovered {
                conn,
                status,
                characteristics,
            } => {
                if !self.is_current(conn) {
                    return Ok(Outcome::Idle);
                }
                let step = self.ctx.discovery.on_characteristics(
                    host,
                    conn,
                    &self.target,
                    status,
                    characteristics,
                )?;
                Ok(Self::discovery_outcome(step))
            }
            BleEvent::DescriptorsDiscovered {
                conn,
                status,
                descriptors,
            } => {
                if !self.is_current(conn) {
                    return Ok(Outcome::Idle);
                }
                match self.ctx.discovery.on_descriptors(status, descriptors)? {
                    DiscoveryStep::Ready(handles) => {
                        self.ctx.writer.enable_notifications(host, conn, &handles)?;
                        Ok(Outcome::Ready(handles))
                    }
                    step => Ok(Self::discovery_outcome(step)),
                }
            }
            BleEvent::WriteResponse {
                conn, status, op, ..
            } => {
                if !self.is_current(conn) {
                    return Ok(Outcome::Idle);
                }
                let Some(handles) = self.ctx.discovery.handles() else {
                    warn!("Write response ({}) before discovery completed", op);
                    return Ok(Outcome::Idle);
                };
                let step = self.ctx.writer.on_write_response(
                    host,
                    conn,
                    &handles,
                    self.request.as_bytes(),
                    status,
                );
                let outcome = match step? {
                    WriteStep::Ignored => Outcome::Idle,
                    WriteStep::Continued => Outcome::Progress,
                    WriteStep::Delivered => Outcome::RequestDelivered,
                };
                if !self.ctx.writer.is_busy() && self.ctx.read_deferred {
                    self.ctx.read_deferred = false;
                    // The reader logs a refused read; delivery still gets reported.
                    let started = self.ctx.reader.start(host, conn, handles.value);
                    if outcome != Outcome::RequestDelivered {
                        started?;
                    }
                }
                Ok(outcome)
            }
            BleEvent::Notification { conn, handle, data } => {
                if !self.is_current(conn) {
                    return Ok(Outcome::Idle);
                }
                let Some(handles) = self.ctx.discovery.handles() else {
                    return Ok(Outcome::Idle);
                };
                if handle != handles.value {
                    debug!("Notification on {=u16:#x} ignored", handle);
                    return Ok(Outcome::Idle);
                }
                trace!("Notification ({} bytes)", data.len());
                if self.ctx.reader.is_busy() {
                    warn!("Notification while reading a response, ignored");
                    return Ok(Outcome::Idle);
                }
                if self.ctx.writer.is_busy() {
                    debug!("Write outstanding, response read deferred");
                    self.ctx.read_deferred = true;
                    return Ok(Outcome::Idle);
                }
                self.ctx.reader.start(host, conn, handles.value)?;
                Ok(Outcome::Progress)
            }
            BleEvent::ReadResponse {
                conn,
                status,
                offset,
                data,
                ..
            } => {
                if !self.is_current(conn) {
                    return Ok(Outcome::Idle);
                }
                let Some(handles) = self.ctx.discovery.handles() else {
                    return Ok(Outcome::Idle);
                };
                match self.ctx.reader.on_read_response(
                    host,
                    conn,
                    handles.value,
                    status,
                    offset,
                    data,
                )? {
                    ReadStep::Ignored => Ok(Outcome::Idle),
                    ReadStep::Continued => Ok(Outcome::Progress),
                    ReadStep::Complete(len) => Ok(Outcome::ResponseComplete(len)),
                }
            }
            BleEvent::Other(id) => {
                trace!("Unhandled event {=u16:#x}", id);
                Ok(Outcome::Idle)
            }
        }
    }

    /// Send the current request again from its first byte.
    ///
    /// Fragments already queued on the peer are abandoned.
    pub fn send_request(&mut self, host: &mut impl GattHost) -> Result<(), Error> {
        let Some(handles) = self.ctx.discovery.handles() else {
            return Err(Error::NotReady);
        };
        if self.link != Link::Connected {
            return Err(Error::NotReady);
        }
        if self.ctx.reader.is_busy() || self.ctx.read_deferred {
            return Err(Error::Busy);
        }
        let conn = self.ctx.conn;
        self.ctx
            .writer
            .write_payload(host, conn, &handles, self.request.as_bytes())
    }

    /// Replace the request. It goes out on the next connection, or when
    /// [`Central::send_request`] is called.
    pub fn set_request(&mut self, request: Request) {
        self.request = request;
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn link(&self) -> Link {
        self.link
    }

    /// Handle of the current connection, [`ConnHandle::INVALID`] if none.
    pub fn conn_handle(&self) -> ConnHandle {
        self.ctx.conn
    }

    pub fn discovery_progress(&self) -> DiscoveryProgress {
        self.ctx.discovery.progress()
    }

    pub fn handles(&self) -> Option<AttributeHandles> {
        self.ctx.discovery.handles()
    }

    pub fn write_phase(&self) -> WritePhase {
        self.ctx.writer.phase()
    }

    /// Request bytes acknowledged by the peer so far.
    pub fn write_cursor(&self) -> usize {
        self.ctx.writer.cursor()
    }

    /// The last complete response.
    pub fn response(&self) -> Option<&[u8]> {
        self.ctx.reader.response()
    }

    fn on_adv_report(
        &mut self,
        host: &mut impl GattHost,
        peer: PeerAddress,
        rssi: i8,
        data: &[u8],
    ) -> Result<Outcome, Error> {
        if self.link != Link::Scanning {
            return Ok(Outcome::Idle);
        }
        if !contains_service_uuid128(data, &self.target.service_uuid128()) {
            return Ok(Outcome::Idle);
        }

        let name = extract_device_name(data);
        info!("Gateway \"{}\" found (RSSI {})", name.as_str(), rssi);
        host.connect(&peer).map_err(|e| {
            error!("Connect request failed: {}", e);
            Error::from(e)
        })?;
        self.link = Link::Connecting;
        Ok(Outcome::Connecting(peer))
    }

    fn scan(&mut self, host: &mut impl GattHost) -> Result<(), Error> {
        if let Err(e) = host.start_scan() {
            error!("Scan start failed: {}", e);
            self.link = Link::Idle;
            return Err(e.into());
        }
        info!("Scanning for gateway");
        self.link = Link::Scanning;
        Ok(())
    }

    fn is_current(&self, conn: ConnHandle) -> bool {
        if self.link == Link::Connected && self.ctx.conn == conn {
            return true;
        }
        debug!("Event for conn {} ignored", conn.0);
        false
    }

    fn discovery_outcome(step: DiscoveryStep) -> Outcome {
        match step {
            DiscoveryStep::Ignored => Outcome::Idle,
            DiscoveryStep::Advanced => Outcome::Progress,
            DiscoveryStep::Ready(handles) => Outcome::Ready(handles),
        }
    }
}
