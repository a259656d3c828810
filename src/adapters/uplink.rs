//! Non-blocking alert / telemetry uplink.
//!
//! The control loop never talks to the radio. [`ChannelUplink`] implements
//! [`AlertPort`] and [`TelemetryPort`] by pushing into a bounded
//! `embassy-sync` channel and returns immediately; a full queue drops the
//! message. A dedicated thread runs [`run_uplink`] on an `edge-executor`
//! and hands each message to an [`UplinkTransport`] (HTTP + GSM modem on
//! the device).
//!
//! ```text
//!  control loop ──try_send──▶ UPLINK ──receive().await──▶ uplink thread ──▶ HTTP / SMS
//! ```

use embassy_sync::blocking_mutex::raw::{CriticalSectionRawMutex, RawMutex};
use embassy_sync::channel::Channel;
use log::{debug, info, warn};

use crate::app::events::{Alert, TelemetryRecord};
use crate::app::ports::{AlertPort, TelemetryPort};
use crate::error::CommsError;
use crate::task_pin::{self, Core};

use super::alert_text::{AlertText, sms_text};

/// Outbound queue depth.
pub const UPLINK_DEPTH: usize = 8;

/// One unit of work for the uplink thread.
#[derive(Debug, Clone, PartialEq)]
pub enum UplinkMsg {
    Alert(Alert),
    Sms(Alert),
    Telemetry(TelemetryRecord),
}

pub type UplinkChannel = Channel<CriticalSectionRawMutex, UplinkMsg, UPLINK_DEPTH>;

/// Shared outbox between the control loop and the uplink thread.
pub static UPLINK: UplinkChannel = Channel::new();

// ── Producer side (control loop) ─────────────────────────────

/// Queueing implementation of the alert and telemetry ports.
pub struct ChannelUplink<'a, M: RawMutex, const N: usize> {
    tx: &'a Channel<M, UplinkMsg, N>,
    dropped: u32,
}

impl<'a, M: RawMutex, const N: usize> ChannelUplink<'a, M, N> {
    pub fn new(tx: &'a Channel<M, UplinkMsg, N>) -> Self {
        Self { tx, dropped: 0 }
    }

    /// Messages rejected because the queue was full.
    pub fn dropped(&self) -> u32 {
        self.dropped
    }

    fn enqueue(&mut self, msg: UplinkMsg) -> Result<(), CommsError> {
        self.tx.try_send(msg).map_err(|_| {
            self.dropped = self.dropped.saturating_add(1);
            CommsError::QueueFull
        })
    }
}

impl<M: RawMutex, const N: usize> AlertPort for ChannelUplink<'_, M, N> {
    fn send(&mut self, alert: &Alert) -> Result<(), CommsError> {
        self.enqueue(UplinkMsg::Alert(*alert))
    }

    fn send_sms(&mut self, alert: &Alert) -> Result<(), CommsError> {
        self.enqueue(UplinkMsg::Sms(*alert))
    }
}

impl<M: RawMutex, const N: usize> TelemetryPort for ChannelUplink<'_, M, N> {
    fn publish(&mut self, record: &TelemetryRecord) -> Result<(), CommsError> {
        self.enqueue(UplinkMsg::Telemetry(record.clone()))
    }
}

// ── Consumer side (uplink thread) ────────────────────────────

/// The actual delivery mechanism behind the queue.
pub trait UplinkTransport {
    /// Long-form alert text to the messaging channel.
    fn deliver_alert(&mut self, text: &str) -> Result<(), CommsError>;

    /// Short text to the SMS channel.
    fn deliver_sms(&mut self, text: &str) -> Result<(), CommsError>;

    /// JSON telemetry body to the cloud endpoint.
    fn deliver_telemetry(&mut self, body: &[u8]) -> Result<(), CommsError>;
}

/// Format one message and hand it to the transport.
pub fn forward(msg: &UplinkMsg, transport: &mut impl UplinkTransport) -> Result<(), CommsError> {
    match msg {
        UplinkMsg::Alert(alert) => transport.deliver_alert(&AlertText(alert).to_string()),
        UplinkMsg::Sms(alert) => transport.deliver_sms(sms_text(alert)),
        UplinkMsg::Telemetry(record) => {
            let body = record.to_json().map_err(|_| CommsError::Encode)?;
            transport.deliver_telemetry(&body)
        }
    }
}

/// Drain the queue forever. Delivery failures are logged and the message
/// is dropped.
pub async fn run_uplink<M, T, const N: usize>(rx: &Channel<M, UplinkMsg, N>, mut transport: T)
where
    M: RawMutex,
    T: UplinkTransport,
{
    loop {
        let msg = rx.receive().await;
        match forward(&msg, &mut transport) {
            Ok(()) => debug!("UPLINK: delivered {}", kind_name(&msg)),
            Err(e) => warn!("UPLINK: {} not delivered ({})", kind_name(&msg), e),
        }
    }
}

fn kind_name(msg: &UplinkMsg) -> &'static str {
    match msg {
        UplinkMsg::Alert(_) => "alert",
        UplinkMsg::Sms(_) => "sms",
        UplinkMsg::Telemetry(_) => "telemetry",
    }
}

/// Spawn the uplink thread on the protocol core.
pub fn spawn<T>(transport: T) -> std::io::Result<std::thread::JoinHandle<()>>
where
    T: UplinkTransport + Send + 'static,
{
    task_pin::spawn_on_core(Core::Pro, 5, 12, "uplink\0", move || {
        let executor: edge_executor::LocalExecutor<'_, 4> = edge_executor::LocalExecutor::new();
        info!("UPLINK: task started (queue depth {})", UPLINK_DEPTH);
        futures_lite::future::block_on(executor.run(run_uplink(&UPLINK, transport)));
    })
}

// ── ESP-IDF transport: HTTPS + GSM modem ─────────────────────

#[cfg(target_os = "espidf")]
pub use esp::{GsmModem, HttpUplink};

#[cfg(target_os = "espidf")]
mod esp {
    use core::time::Duration;

    use esp_idf_hal::delay::FreeRtos;
    use esp_idf_hal::uart::UartDriver;
    use esp_idf_svc::http::Method;
    use esp_idf_svc::http::client::{Configuration, EspHttpConnection};
    use log::{info, warn};

    use super::UplinkTransport;
    use crate::error::CommsError;

    const HTTP_TIMEOUT: Duration = Duration::from_secs(8);
    const CTRL_Z: u8 = 0x1A;

    /// SIM800-class modem in text mode on a UART.
    pub struct GsmModem {
        uart: UartDriver<'static>,
        number: &'static str,
        ready: bool,
    }

    impl GsmModem {
        pub fn new(uart: UartDriver<'static>, number: &'static str) -> Self {
            let mut modem = Self {
                uart,
                number,
                ready: false,
            };
            modem.ready = modem.command(b"AT\r\n", 2000)
                && modem.command(b"ATE0\r\n", 2000)
                && modem.command(b"AT+CMGF=1\r\n", 2000);
            if modem.ready {
                info!("GSM: modem ready");
            } else {
                warn!("GSM: modem not responding, SMS disabled");
            }
            modem
        }

        /// Write `cmd` and wait up to `timeout_ms` for an `OK`.
        fn command(&mut self, cmd: &[u8], timeout_ms: u32) -> bool {
            if self.uart.write(cmd).is_err() {
                return false;
            }
            self.wait_ok(timeout_ms)
        }

        fn wait_ok(&mut self, timeout_ms: u32) -> bool {
            let mut resp: heapless::Vec<u8, 128> = heapless::Vec::new();
            let mut waited = 0;
            let mut byte = [0u8; 1];
            while waited < timeout_ms {
                match self.uart.read(&mut byte, 10) {
                    Ok(1) => {
                        if resp.is_full() {
                            resp.clear();
                        }
                        let _ = resp.push(byte[0]);
                        if resp.windows(2).any(|w| w == b"OK") {
                            return true;
                        }
                    }
                    _ => waited += 10,
                }
            }
            false
        }

        pub fn send_sms(&mut self, text: &str) -> Result<(), CommsError> {
            if !self.ready {
                return Err(CommsError::NotConnected);
            }
            let write = |uart: &mut UartDriver<'static>, bytes: &[u8]| {
                uart.write(bytes).map(|_| ()).map_err(|_| CommsError::SendFailed)
            };
            write(&mut self.uart, b"AT+CMGS=\"")?;
            write(&mut self.uart, self.number.as_bytes())?;
            write(&mut self.uart, b"\"\r\n")?;
            FreeRtos::delay_ms(500);
            write(&mut self.uart, text.as_bytes())?;
            write(&mut self.uart, &[CTRL_Z])?;
            if self.wait_ok(5000) {
                Ok(())
            } else {
                Err(CommsError::SendFailed)
            }
        }
    }

    /// HTTPS alert webhook + telemetry endpoint, SMS via the modem.
    pub struct HttpUplink {
        alert_url: Option<&'static str>,
        telemetry_url: Option<&'static str>,
        api_key: Option<&'static str>,
        modem: Option<GsmModem>,
    }

    impl HttpUplink {
        /// Endpoints come from the build environment (`BMS_ALERT_URL`,
        /// `BMS_TELEMETRY_URL`, `BMS_API_KEY`); a missing URL disables
        /// that channel.
        pub fn new(modem: Option<GsmModem>) -> Self {
            let uplink = Self {
                alert_url: option_env!("BMS_ALERT_URL"),
                telemetry_url: option_env!("BMS_TELEMETRY_URL"),
                api_key: option_env!("BMS_API_KEY"),
                modem,
            };
            info!(
                "HttpUplink: alerts={} telemetry={} sms={}",
                uplink.alert_url.is_some(),
                uplink.telemetry_url.is_some(),
                uplink.modem.is_some()
            );
            uplink
        }

        fn post(&self, url: &str, body: &[u8]) -> Result<(), CommsError> {
            let mut conn = EspHttpConnection::new(&Configuration {
                timeout: Some(HTTP_TIMEOUT),
                crt_bundle_attach: Some(esp_idf_sys::esp_crt_bundle_attach),
                ..Default::default()
            })
            .map_err(|_| CommsError::NotConnected)?;

            let len = body.len().to_string();
            let bearer = self.api_key.map(|k| format!("Bearer {k}"));
            let mut headers: heapless::Vec<(&str, &str), 4> = heapless::Vec::new();
            let _ = headers.push(("Content-Type", "application/json"));
            let _ = headers.push(("Content-Length", len.as_str()));
            if let (Some(key), Some(bearer)) = (self.api_key, bearer.as_deref()) {
                let _ = headers.push(("apikey", key));
                let _ = headers.push(("Authorization", bearer));
            }

            conn.initiate_request(Method::Post, url, &headers)
                .map_err(|_| CommsError::SendFailed)?;
            conn.write(body).map_err(|_| CommsError::SendFailed)?;
            conn.initiate_response().map_err(|_| CommsError::SendFailed)?;
            match conn.status() {
                200..=299 => Ok(()),
                code => {
                    warn!("HttpUplink: HTTP {}", code);
                    Err(CommsError::SendFailed)
                }
            }
        }
    }

    impl UplinkTransport for HttpUplink {
        fn deliver_alert(&mut self, text: &str) -> Result<(), CommsError> {
            let url = self.alert_url.ok_or(CommsError::NotConnected)?;
            let body = serde_json::to_vec(&serde_json::json!({ "text": text }))
                .map_err(|_| CommsError::Encode)?;
            self.post(url, &body)
        }

        fn deliver_sms(&mut self, text: &str) -> Result<(), CommsError> {
            self.modem
                .as_mut()
                .ok_or(CommsError::NotConnected)?
                .send_sms(text)
        }

        fn deliver_telemetry(&mut self, body: &[u8]) -> Result<(), CommsError> {
            let url = self.telemetry_url.ok_or(CommsError::NotConnected)?;
            self.post(url, body)
        }
    }
}
