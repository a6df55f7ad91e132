//! blehttp firmware - nRF52840 + SoftDevice S140 in central role.
//!
//! Scans for a gateway advertising the blehttp service, sends the configured
//! request and logs the response it reads back. The status LED is lit while
//! connected and pulses each time a response completes.

#![no_std]
#![no_main]

mod softdevice;
mod storage;

use defmt_rtt as _; // global logger
use panic_probe as _;

use blehttp::ble::central::{Central, Link, Outcome};
use blehttp::ble::BleEvent;
use blehttp::config::{LED_PULSE_MS, REQUEST_HOST, REQUEST_TARGET};
use blehttp::request::Request;
use defmt::{info, unwrap, warn};
use embassy_executor::Spawner;
use embassy_nrf::gpio::{Level, Output, OutputDrive};
use embassy_nrf::interrupt::Priority;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_time::{Duration, Timer};
use nrf_softdevice::{raw, Flash, Softdevice};

use crate::softdevice::SoftdeviceHost;
use crate::storage::AppStateStore;

/// Dispatch outcomes forwarded from the SoftDevice callback.
static OUTCOMES: Channel<CriticalSectionRawMutex, Outcome, 8> = Channel::new();

#[embassy_executor::task]
async fn softdevice_task(
    sd: &'static Softdevice,
    mut central: Central,
    mut host: SoftdeviceHost,
) -> ! {
    sd.run_with_callback(|evt| {
        // SAFETY: the SoftDevice keeps the event alive for the callback.
        let result = unsafe {
            softdevice::with_event(evt, |event| {
                let result = central.handle_event(&mut host, event);
                if matches!(event, BleEvent::AdvReport { .. }) && central.link() == Link::Scanning
                {
                    if let Err(e) = host.resume_scan() {
                        warn!("Scan resume failed: {}", e);
                    }
                }
                result
            })
        };

        match result {
            Ok(Outcome::Idle | Outcome::Progress) => {}
            Ok(outcome) => {
                if let (Outcome::ResponseComplete(len), Some(response)) =
                    (outcome, central.response())
                {
                    info!("Response ({} bytes): {=[u8]:a}", len, response);
                }
                // try_send avoids blocking the callback; if the app task is
                // behind, we drop.
                if OUTCOMES.try_send(outcome).is_err() {
                    warn!("Outcome channel full - dropping {}", outcome);
                }
            }
            Err(e) => warn!("Exchange halted: {}", e),
        }
    })
    .await
}

#[embassy_executor::task]
async fn app_task(mut led: Output<'static>, mut flash: Flash) {
    let mut store = AppStateStore::new();
    store.load_from_flash(&mut flash).await;
    info!("{} transfers completed so far", store.state().transfers);

    loop {
        match OUTCOMES.receive().await {
            Outcome::Connecting(peer) => info!("Connecting to {:02x}", peer.bytes),
            Outcome::Connected(_) => led.set_low(),
            Outcome::Disconnected { .. } => led.set_high(),
            Outcome::Ready(handles) => info!("Gateway ready: {}", handles),
            Outcome::RequestDelivered => info!("Waiting for the gateway response"),
            Outcome::ResponseComplete(len) => {
                store.record_transfer(len);
                store.save_to_flash(&mut flash).await;

                led.toggle();
                Timer::after(Duration::from_millis(LED_PULSE_MS)).await;
                led.toggle();
            }
            Outcome::Idle | Outcome::Progress => {}
        }
    }
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("blehttp starting");

    // The SoftDevice reserves interrupt priorities 0, 1 and 4.
    let mut config = embassy_nrf::config::Config::default();
    config.gpiote_interrupt_priority = Priority::P2;
    config.time_interrupt_priority = Priority::P2;
    let p = embassy_nrf::init(config);

    // LED1 on the nRF52840-DK, active low.
    let led = Output::new(p.P0_13, Level::High, OutputDrive::Standard);

    let sd = enable_softdevice();
    let flash = Flash::take(sd);

    let mut host = SoftdeviceHost::new();
    let request = unwrap!(Request::get(REQUEST_TARGET, REQUEST_HOST));
    info!("Request: {} bytes for {}", request.len(), REQUEST_HOST);
    let mut central = unwrap!(Central::new(&mut host, request));
    unwrap!(central.start(&mut host));

    unwrap!(spawner.spawn(softdevice_task(sd, central, host)));
    unwrap!(spawner.spawn(app_task(led, flash)));
}

fn enable_softdevice() -> &'static Softdevice {
    let config = nrf_softdevice::Config {
        clock: Some(raw::nrf_clock_lf_cfg_t {
            source: raw::NRF_CLOCK_LF_SRC_RC as u8,
            rc_ctiv: 16,
            rc_temp_ctiv: 2,
            accuracy: raw::NRF_CLOCK_LF_ACCURACY_500_PPM as u8,
        }),
        conn_gap: Some(raw::ble_gap_conn_cfg_t {
            conn_count: 1,
            event_length: 24,
        }),
        // Default MTU: prepared writes carry 18 bytes, reads return 22.
        conn_gatt: Some(raw::ble_gatt_conn_cfg_t {
            att_mtu: raw::BLE_GATT_ATT_MTU_DEFAULT as u16,
        }),
        gap_role_count: Some(raw::ble_gap_cfg_role_count_t {
            adv_set_count: 0,
            periph_role_count: 0,
            central_role_count: 1,
            central_sec_count: 0,
            _bitfield_1: raw::ble_gap_cfg_role_count_t::new_bitfield_1(0),
        }),
        ..Default::default()
    };

    Softdevice::enable(&config)
}
