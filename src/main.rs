//! EV BMS Firmware: Main Entry Point
//!
//! Hexagonal architecture with a single supervisory polling loop.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  SensorFeed      GpioRelayBank   NvsAdapter     MonotonicClock │
//! │  (SensorPort)    (RelayPort)     (Config+Store)                │
//! │  ChannelUplink ──▶ uplink thread (HTTP + GSM)                  │
//! │  LogEventSink + EventLog (EventSink)                           │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │              BmsService (pure logic)                   │    │
//! │  │  Faults · Relays · Motion · SOC/SOH/RUL · Geofence     │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use anyhow::{Result, anyhow};
use log::{error, info, warn};

use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_hal::delay::FreeRtos;
use esp_idf_hal::gpio::{AnyInputPin, AnyIOPin, AnyOutputPin, Output, PinDriver};
use esp_idf_hal::modem::Modem;
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_hal::uart::{UartDriver, config::Config as UartConfig};
use esp_idf_hal::units::Hertz;
use esp_idf_svc::wifi::{BlockingWifi, ClientConfiguration, Configuration, EspWifi};

use evbms::adapters::event_log::{EventLog, Tee};
use evbms::adapters::log_sink::LogEventSink;
use evbms::adapters::nvs::NvsAdapter;
use evbms::adapters::relay_gpio::GpioRelayBank;
use evbms::adapters::sensor_feed::{FRAMES, SensorFeed};
use evbms::adapters::time::MonotonicClock;
use evbms::adapters::uplink::{self, ChannelUplink, GsmModem, HttpUplink, UPLINK};
use evbms::app::commands::{AppCommand, COMMANDS};
use evbms::app::ports::{ConfigPort, RelayPort, SensorPort};
use evbms::app::service::BmsService;
use evbms::config::BmsConfig;
use evbms::error::{ActuatorError, Error, FaultKind, SensorError};
use evbms::frame::SensorFrame;
use evbms::pins;
use evbms::watchdog::Watchdog;

/// No new frame for this long counts as an acquisition failure.
const SENSOR_STALE_MS: u64 = 5_000;
const WATCHDOG_TIMEOUT_MS: u32 = 10_000;

type Relay = PinDriver<'static, AnyOutputPin, Output>;

// ── Board ─────────────────────────────────────────────────────
//
// The service wants one value that is both the sensor and the relay
// port; this pairs the two adapters.

struct Board {
    feed: SensorFeed<'static, embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex>,
    relays: GpioRelayBank<Relay, Relay, Relay>,
}

impl SensorPort for Board {
    fn read_frame(&mut self, now_ms: u64) -> core::result::Result<SensorFrame, SensorError> {
        self.feed.read_frame(now_ms)
    }
}

impl RelayPort for Board {
    fn set_charge(&mut self, on: bool) -> core::result::Result<(), ActuatorError> {
        self.relays.set_charge(on)
    }

    fn set_motor(&mut self, on: bool) -> core::result::Result<(), ActuatorError> {
        self.relays.set_motor(on)
    }

    fn set_fan(&mut self, on: bool) -> core::result::Result<(), ActuatorError> {
        self.relays.set_fan(on)
    }
}

fn relay_pin(gpio: i32) -> Result<Relay> {
    // SAFETY: each relay GPIO is claimed exactly once, here.
    let pin = unsafe { AnyOutputPin::new(gpio) };
    Ok(PinDriver::output(pin)?)
}

fn connect_wifi(modem: Modem, sysloop: EspSystemEventLoop) -> Result<BlockingWifi<EspWifi<'static>>> {
    let ssid = option_env!("BMS_WIFI_SSID").ok_or_else(|| anyhow!("BMS_WIFI_SSID not set"))?;
    let password = option_env!("BMS_WIFI_PASS").unwrap_or("");

    let mut wifi = BlockingWifi::wrap(EspWifi::new(modem, sysloop.clone(), None)?, sysloop)?;
    wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        ssid: ssid.try_into().map_err(|_| anyhow!("SSID too long"))?,
        password: password.try_into().map_err(|_| anyhow!("password too long"))?,
        ..Default::default()
    }))?;
    wifi.start()?;
    wifi.connect()?;
    wifi.wait_netif_up()?;
    info!("WiFi: connected to '{}'", ssid);
    Ok(wifi)
}

fn gsm_modem(uart: esp_idf_hal::uart::UART2) -> Option<GsmModem> {
    let number = option_env!("BMS_SMS_NUMBER")?;
    let config = UartConfig::new().baudrate(Hertz(pins::GSM_BAUD));
    // SAFETY: the GSM pins are not used anywhere else.
    let (tx, rx) = unsafe { (AnyOutputPin::new(pins::GSM_TX_GPIO), AnyInputPin::new(pins::GSM_RX_GPIO)) };
    match UartDriver::new(uart, tx, rx, Option::<AnyIOPin>::None, Option::<AnyIOPin>::None, &config) {
        Ok(driver) => Some(GsmModem::new(driver, number)),
        Err(e) => {
            warn!("GSM: UART init failed ({}), SMS disabled", e);
            None
        }
    }
}

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  EV BMS v{}                        ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;

    // ── 2. Load config from NVS (or defaults) ─────────────────
    let mut nvs = NvsAdapter::new().map_err(|e| anyhow!("NVS init failed: {}", e))?;
    let config = match nvs.load() {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!("NVS config load failed ({}), using defaults", e);
            BmsConfig::default()
        }
    };

    // ── 3. Uplink (best-effort: the BMS runs without it) ──────
    let _wifi = connect_wifi(peripherals.modem, sysloop)
        .map_err(|e| warn!("WiFi unavailable ({}), alerts limited to SMS", e))
        .ok();
    let modem = gsm_modem(peripherals.uart2);
    uplink::spawn(HttpUplink::new(modem))?;
    let mut outbox = ChannelUplink::new(&UPLINK);

    // ── 4. Relays + sensor feed ───────────────────────────────
    let mut board = Board {
        feed: SensorFeed::new(&FRAMES),
        relays: GpioRelayBank::new(
            relay_pin(pins::CHARGE_RELAY_GPIO)?,
            relay_pin(pins::MOTOR_RELAY_GPIO)?,
            relay_pin(pins::FAN_RELAY_GPIO)?,
            pins::RELAY_ACTIVE_HIGH,
        ),
    };

    let mut sink = Tee(LogEventSink::new(), EventLog::new());
    let clock = MonotonicClock::new();
    let watchdog = Watchdog::new(WATCHDOG_TIMEOUT_MS);

    // ── 5. Start once the first frame arrives ─────────────────
    let mut svc = BmsService::new(config.clone());
    loop {
        watchdog.feed();
        match svc.start(clock.uptime_ms(), &mut board, &nvs, &mut sink) {
            Ok(()) => break,
            Err(Error::Sensor(_)) => FreeRtos::delay_ms(config.control_loop_interval_ms),
            Err(e) => return Err(anyhow!("BMS start failed: {}", e)),
        }
    }

    info!("System ready. Entering control loop.");

    // ── 6. Control loop ───────────────────────────────────────
    let mut sensor_stale = false;
    loop {
        let now = clock.uptime_ms();

        if let Err(e) = svc.tick(now, &mut board, &mut outbox, &mut nvs, &mut sink) {
            error!("Control tick: {}", e);
        }

        // Acquisition watchdog.
        let stale = board.feed.frame_age_ms(now).is_some_and(|age| age > SENSOR_STALE_MS);
        if stale && !sensor_stale {
            warn!("Sensor feed stale for more than {} ms", SENSOR_STALE_MS);
            let cmd = AppCommand::TriggerExternal(FaultKind::SensorFailure);
            if let Err(e) = svc.handle_command(cmd, now, &mut board, &mut outbox, &mut nvs, &mut sink) {
                error!("Sensor failure trigger: {}", e);
            }
        }
        sensor_stale = stale;

        // Operator commands.
        while let Ok(cmd) = COMMANDS.try_receive() {
            if let Err(e) = svc.handle_command(cmd, now, &mut board, &mut outbox, &mut nvs, &mut sink) {
                warn!("Command rejected: {}", e);
            }
        }

        // Config auto-save (5 s debounce after last change).
        svc.auto_save_if_needed(now, &nvs);

        if outbox.dropped() > 0 && svc.tick_count() % 300 == 0 {
            warn!("Uplink: {} messages dropped so far", outbox.dropped());
        }

        watchdog.feed();
        let interval = svc.config().control_loop_interval_ms;
        FreeRtos::delay_ms(interval);
    }
}
