//! SoftDevice S140 link layer.
//!
//! [`SoftdeviceHost`] issues the engine's commands as raw SoftDevice calls.
//! [`with_event`] turns the raw events delivered to the SoftDevice callback
//! into [`BleEvent`]s.

use core::{mem, ptr, slice};

use blehttp::ble::uuid::{BleUuid, UuidType};
use blehttp::ble::{
    BleEvent, ConnHandle, ConnParams, DiscoveredCharacteristic, DiscoveredDescriptor,
    DiscoveredService, GattHost, GattStatus, HandleRange, HostError, PeerAddress, WriteOp,
    WriteParams,
};
use blehttp::config::{
    BLE_CONN_INTERVAL_MAX, BLE_CONN_INTERVAL_MIN, BLE_SCAN_ACTIVE, BLE_SCAN_INTERVAL,
    BLE_SCAN_WINDOW, BLE_SLAVE_LATENCY, BLE_SUP_TIMEOUT,
};
use defmt::{trace, warn};
use heapless::Vec;
use nrf_softdevice::raw;
use static_cell::StaticCell;

/// Connection configuration tag nrf-softdevice applies its `Config` under.
const CONN_CFG_TAG: u8 = 1;

/// Most attributes kept from a single discovery response.
const MAX_DISCOVERED: usize = 16;

const SCAN_BUFFER_LEN: usize = raw::BLE_GAP_SCAN_BUFFER_MIN as usize;

static SCAN_BUFFER: StaticCell<[u8; SCAN_BUFFER_LEN]> = StaticCell::new();

fn check(ret: u32) -> Result<(), HostError> {
    if ret == raw::NRF_SUCCESS {
        Ok(())
    } else {
        Err(HostError(ret))
    }
}

fn scan_params() -> raw::ble_gap_scan_params_t {
    // SAFETY: plain C struct, all-zero is a valid configuration.
    let mut params: raw::ble_gap_scan_params_t = unsafe { mem::zeroed() };
    params.set_active(BLE_SCAN_ACTIVE as u8);
    params.scan_phys = raw::BLE_GAP_PHY_1MBPS as u8;
    params.interval = BLE_SCAN_INTERVAL;
    params.window = BLE_SCAN_WINDOW;
    params.timeout = raw::BLE_GAP_SCAN_TIMEOUT_UNLIMITED as u16;
    params
}

fn raw_uuid(uuid: &BleUuid) -> raw::ble_uuid_t {
    raw::ble_uuid_t {
        uuid: uuid.uuid,
        type_: uuid.ty.0,
    }
}

fn uuid_from_raw(uuid: &raw::ble_uuid_t) -> BleUuid {
    BleUuid::vendor(UuidType(uuid.type_), uuid.uuid)
}

fn raw_range(range: &HandleRange) -> raw::ble_gattc_handle_range_t {
    raw::ble_gattc_handle_range_t {
        start_handle: range.start,
        end_handle: range.end,
    }
}

fn peer_from_raw(addr: &raw::ble_gap_addr_t) -> PeerAddress {
    PeerAddress {
        kind: addr.addr_type(),
        bytes: addr.addr,
    }
}

pub struct SoftdeviceHost {
    scan_buffer: &'static mut [u8; SCAN_BUFFER_LEN],
}

impl SoftdeviceHost {
    /// Must be called once, after the SoftDevice is enabled.
    pub fn new() -> Self {
        Self {
            scan_buffer: SCAN_BUFFER.init([0; SCAN_BUFFER_LEN]),
        }
    }

    fn report_buffer(&mut self) -> raw::ble_data_t {
        raw::ble_data_t {
            p_data: self.scan_buffer.as_mut_ptr(),
            len: SCAN_BUFFER_LEN as u16,
        }
    }

    /// The scanner pauses after every advertisement report until it is
    /// handed its buffer back.
    pub fn resume_scan(&mut self) -> Result<(), HostError> {
        let buffer = self.report_buffer();
        check(unsafe { raw::sd_ble_gap_scan_start(ptr::null(), &buffer) })
    }
}

impl GattHost for SoftdeviceHost {
    fn register_vendor_uuid(&mut self, base: &[u8; 16]) -> Result<UuidType, HostError> {
        let uuid = raw::ble_uuid128_t { uuid128: *base };
        let mut ty = 0u8;
        check(unsafe { raw::sd_ble_uuid_vs_add(&uuid, &mut ty) })?;
        Ok(UuidType(ty))
    }

    fn start_scan(&mut self) -> Result<(), HostError> {
        let params = scan_params();
        let buffer = self.report_buffer();
        check(unsafe { raw::sd_ble_gap_scan_start(&params, &buffer) })
    }

    fn connect(&mut self, peer: &PeerAddress) -> Result<(), HostError> {
        // SAFETY: plain C struct; the fields that matter are set below.
        let mut addr: raw::ble_gap_addr_t = unsafe { mem::zeroed() };
        addr.set_addr_type(peer.kind);
        addr.addr = peer.bytes;

        let conn_params = raw::ble_gap_conn_params_t {
            min_conn_interval: BLE_CONN_INTERVAL_MIN,
            max_conn_interval: BLE_CONN_INTERVAL_MAX,
            slave_latency: BLE_SLAVE_LATENCY,
            conn_sup_timeout: BLE_SUP_TIMEOUT,
        };
        let scan = scan_params();
        check(unsafe { raw::sd_ble_gap_connect(&addr, &scan, &conn_params, CONN_CFG_TAG) })
    }

    fn update_conn_params(
        &mut self,
        conn: ConnHandle,
        params: &ConnParams,
    ) -> Result<(), HostError> {
        let params = raw::ble_gap_conn_params_t {
            min_conn_interval: params.min_interval,
            max_conn_interval: params.max_interval,
            slave_latency: params.slave_latency,
            conn_sup_timeout: params.sup_timeout,
        };
        check(unsafe { raw::sd_ble_gap_conn_param_update(conn.0, &params) })
    }

    fn discover_primary_services(
        &mut self,
        conn: ConnHandle,
        start_handle: u16,
        uuid: &BleUuid,
    ) -> Result<(), HostError> {
        let uuid = raw_uuid(uuid);
        check(unsafe { raw::sd_ble_gattc_primary_services_discover(conn.0, start_handle, &uuid) })
    }

    fn discover_characteristics(
        &mut self,
        conn: ConnHandle,
        range: &HandleRange,
    ) -> Result<(), HostError> {
        let range = raw_range(range);
        check(unsafe { raw::sd_ble_gattc_characteristics_discover(conn.0, &range) })
    }

    fn discover_descriptors(
        &mut self,
        conn: ConnHandle,
        range: &HandleRange,
    ) -> Result<(), HostError> {
        let range = raw_range(range);
        check(unsafe { raw::sd_ble_gattc_descriptors_discover(conn.0, &range) })
    }

    fn write(&mut self, conn: ConnHandle, params: &WriteParams<'_>) -> Result<(), HostError> {
        let (write_op, flags) = match params.op {
            WriteOp::Request => (raw::BLE_GATT_OP_WRITE_REQ, 0),
            WriteOp::Prepare => (raw::BLE_GATT_OP_PREP_WRITE_REQ, 0),
            WriteOp::Execute => (
                raw::BLE_GATT_OP_EXEC_WRITE_REQ,
                raw::BLE_GATT_EXEC_WRITE_FLAG_PREPARED_WRITE,
            ),
        };
        let raw_params = raw::ble_gattc_write_params_t {
            write_op: write_op as u8,
            flags: flags as u8,
            handle: params.handle,
            offset: params.offset,
            len: params.value.len() as u16,
            p_value: params.value.as_ptr(),
        };
        check(unsafe { raw::sd_ble_gattc_write(conn.0, &raw_params) })
    }

    fn read(&mut self, conn: ConnHandle, handle: u16, offset: u16) -> Result<(), HostError> {
        check(unsafe { raw::sd_ble_gattc_read(conn.0, handle, offset) })
    }
}

fn write_op_from_raw(op: u8) -> Option<WriteOp> {
    match op as u32 {
        raw::BLE_GATT_OP_WRITE_REQ => Some(WriteOp::Request),
        raw::BLE_GATT_OP_PREP_WRITE_REQ => Some(WriteOp::Prepare),
        raw::BLE_GATT_OP_EXEC_WRITE_REQ => Some(WriteOp::Execute),
        _ => None,
    }
}

/// Translate a raw SoftDevice event and hand it to `f`.
///
/// # Safety
///
/// `evt` must point to a valid event for the duration of the call, as it does
/// inside the SoftDevice event callback.
pub unsafe fn with_event<R>(
    evt: *const raw::ble_evt_t,
    f: impl FnOnce(&BleEvent<'_>) -> R,
) -> R {
    let evt = &*evt;
    let id = evt.header.evt_id;
    let gap = &evt.evt.gap_evt;
    let gattc = &evt.evt.gattc_evt;

    match id as u32 {
        raw::BLE_GAP_EVTS_BLE_GAP_EVT_ADV_REPORT => {
            let report = &gap.params.adv_report;
            let data = slice::from_raw_parts(report.data.p_data, report.data.len as usize);
            f(&BleEvent::AdvReport {
                peer: peer_from_raw(&report.peer_addr),
                rssi: report.rssi,
                data,
            })
        }
        raw::BLE_GAP_EVTS_BLE_GAP_EVT_CONNECTED => f(&BleEvent::Connected {
            conn: ConnHandle(gap.conn_handle),
            peer: peer_from_raw(&gap.params.connected.peer_addr),
        }),
        raw::BLE_GAP_EVTS_BLE_GAP_EVT_DISCONNECTED => f(&BleEvent::Disconnected {
            conn: ConnHandle(gap.conn_handle),
            reason: gap.params.disconnected.reason,
        }),
        raw::BLE_GAP_EVTS_BLE_GAP_EVT_CONN_PARAM_UPDATE_REQUEST => {
            let params = &gap.params.conn_param_update_request.conn_params;
            f(&BleEvent::ConnParamUpdateRequest {
                conn: ConnHandle(gap.conn_handle),
                params: ConnParams {
                    min_interval: params.min_conn_interval,
                    max_interval: params.max_conn_interval,
                    slave_latency: params.slave_latency,
                    sup_timeout: params.conn_sup_timeout,
                },
            })
        }
        raw::BLE_GATTC_EVTS_BLE_GATTC_EVT_WRITE_CMD_TX_COMPLETE => f(&BleEvent::TxComplete {
            conn: ConnHandle(gattc.conn_handle),
            count: gattc.params.write_cmd_tx_complete.count,
        }),
        raw::BLE_GATTC_EVTS_BLE_GATTC_EVT_PRIM_SRVC_DISC_RSP => {
            let rsp = &gattc.params.prim_srvc_disc_rsp;
            let services: Vec<DiscoveredService, MAX_DISCOVERED> = rsp
                .services
                .as_slice(rsp.count as usize)
                .iter()
                .take(MAX_DISCOVERED)
                .map(|s| DiscoveredService {
                    uuid: uuid_from_raw(&s.uuid),
                    range: HandleRange {
                        start: s.handle_range.start_handle,
                        end: s.handle_range.end_handle,
                    },
                })
                .collect();
            f(&BleEvent::PrimaryServicesDiscovered {
                conn: ConnHandle(gattc.conn_handle),
                status: GattStatus(gattc.gatt_status),
                services: &services,
            })
        }
        raw::BLE_GATTC_EVTS_BLE_GATTC_EVT_CHAR_DISC_RSP => {
            let rsp = &gattc.params.char_disc_rsp;
            let characteristics: Vec<DiscoveredCharacteristic, MAX_DISCOVERED> = rsp
                .chars
                .as_slice(rsp.count as usize)
                .iter()
                .take(MAX_DISCOVERED)
                .map(|c| DiscoveredCharacteristic {
                    uuid: uuid_from_raw(&c.uuid),
                    decl_handle: c.handle_decl,
                    value_handle: c.handle_value,
                })
                .collect();
            f(&BleEvent::CharacteristicsDiscovered {
                conn: ConnHandle(gattc.conn_handle),
                status: GattStatus(gattc.gatt_status),
                characteristics: &characteristics,
            })
        }
        raw::BLE_GATTC_EVTS_BLE_GATTC_EVT_DESC_DISC_RSP => {
            let rsp = &gattc.params.desc_disc_rsp;
            let descriptors: Vec<DiscoveredDescriptor, MAX_DISCOVERED> = rsp
                .descs
                .as_slice(rsp.count as usize)
                .iter()
                .take(MAX_DISCOVERED)
                .map(|d| DiscoveredDescriptor {
                    uuid: uuid_from_raw(&d.uuid),
                    handle: d.handle,
                })
                .collect();
            f(&BleEvent::DescriptorsDiscovered {
                conn: ConnHandle(gattc.conn_handle),
                status: GattStatus(gattc.gatt_status),
                descriptors: &descriptors,
            })
        }
        raw::BLE_GATTC_EVTS_BLE_GATTC_EVT_WRITE_RSP => {
            let rsp = &gattc.params.write_rsp;
            let Some(op) = write_op_from_raw(rsp.write_op) else {
                warn!("Write response with unknown op {}", rsp.write_op);
                return f(&BleEvent::Other(id));
            };
            f(&BleEvent::WriteResponse {
                conn: ConnHandle(gattc.conn_handle),
                status: GattStatus(gattc.gatt_status),
                handle: rsp.handle,
                op,
            })
        }
        raw::BLE_GATTC_EVTS_BLE_GATTC_EVT_HVX => {
            let hvx = &gattc.params.hvx;
            if hvx.type_ as u32 != raw::BLE_GATT_HVX_NOTIFICATION {
                trace!("HVX type {} on {=u16:#x} ignored", hvx.type_, hvx.handle);
                return f(&BleEvent::Other(id));
            }
            f(&BleEvent::Notification {
                conn: ConnHandle(gattc.conn_handle),
                handle: hvx.handle,
                data: hvx.data.as_slice(hvx.len as usize),
            })
        }
        raw::BLE_GATTC_EVTS_BLE_GATTC_EVT_READ_RSP => {
            let rsp = &gattc.params.read_rsp;
            f(&BleEvent::ReadResponse {
                conn: ConnHandle(gattc.conn_handle),
                status: GattStatus(gattc.gatt_status),
                handle: rsp.handle,
                offset: rsp.offset,
                data: rsp.data.as_slice(rsp.len as usize),
            })
        }
        _ => f(&BleEvent::Other(id)),
    }
}
