//! Mock adapters for integration tests.
//!
//! Records every relay write, alert, SMS and telemetry record so tests can
//! assert on the full history without touching real GPIO or radios.

use std::cell::RefCell;
use std::collections::HashMap;

use evbms::app::events::{Alert, AppEvent, TelemetryRecord};
use evbms::app::ports::{
    AlertPort, ConfigError, ConfigPort, EventSink, RelayPort, SensorPort, StorageError, StoragePort,
    TelemetryPort,
};
use evbms::app::service::BmsService;
use evbms::config::BmsConfig;
use evbms::error::{ActuatorError, CommsError, SensorError};
use evbms::frame::SensorFrame;

// ── Relay call record ─────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RelayCall {
    Charge(bool),
    Motor(bool),
    Fan(bool),
}

// ── MockBoard (sensors + relays) ──────────────────────────────

pub struct MockBoard {
    pub frame: Option<SensorFrame>,
    pub calls: Vec<RelayCall>,
}

#[allow(dead_code)]
impl MockBoard {
    pub fn new(frame: SensorFrame) -> Self {
        Self {
            frame: Some(frame),
            calls: Vec::new(),
        }
    }

    pub fn set_frame(&mut self, frame: SensorFrame) {
        self.frame = Some(frame);
    }

    fn last(&self, pick: fn(&RelayCall) -> Option<bool>) -> Option<bool> {
        self.calls.iter().rev().find_map(pick)
    }

    pub fn motor(&self) -> Option<bool> {
        self.last(|c| match c {
            RelayCall::Motor(on) => Some(*on),
            _ => None,
        })
    }

    pub fn charge(&self) -> Option<bool> {
        self.last(|c| match c {
            RelayCall::Charge(on) => Some(*on),
            _ => None,
        })
    }

    pub fn fan(&self) -> Option<bool> {
        self.last(|c| match c {
            RelayCall::Fan(on) => Some(*on),
            _ => None,
        })
    }
}

impl SensorPort for MockBoard {
    /// Accelerometer samples are delivered once, like a real FIFO drain.
    fn read_frame(&mut self, _now_ms: u64) -> Result<SensorFrame, SensorError> {
        let frame = self.frame.as_mut().ok_or(SensorError::NoData)?;
        let out = frame.clone();
        frame.accel.clear();
        Ok(out)
    }
}

impl RelayPort for MockBoard {
    fn set_charge(&mut self, on: bool) -> Result<(), ActuatorError> {
        self.calls.push(RelayCall::Charge(on));
        Ok(())
    }

    fn set_motor(&mut self, on: bool) -> Result<(), ActuatorError> {
        self.calls.push(RelayCall::Motor(on));
        Ok(())
    }

    fn set_fan(&mut self, on: bool) -> Result<(), ActuatorError> {
        self.calls.push(RelayCall::Fan(on));
        Ok(())
    }
}

// ── MockUplink ────────────────────────────────────────────────

#[derive(Default)]
pub struct MockUplink {
    pub alerts: Vec<Alert>,
    pub sms: Vec<Alert>,
    pub telemetry: Vec<TelemetryRecord>,
    pub offline: bool,
}

#[allow(dead_code)]
impl MockUplink {
    pub fn count(&self, pred: impl Fn(&Alert) -> bool) -> usize {
        self.alerts.iter().filter(|a| pred(a)).count()
    }
}

impl AlertPort for MockUplink {
    fn send(&mut self, alert: &Alert) -> Result<(), CommsError> {
        if self.offline {
            return Err(CommsError::NotConnected);
        }
        self.alerts.push(*alert);
        Ok(())
    }

    fn send_sms(&mut self, alert: &Alert) -> Result<(), CommsError> {
        if self.offline {
            return Err(CommsError::NotConnected);
        }
        self.sms.push(*alert);
        Ok(())
    }
}

impl TelemetryPort for MockUplink {
    fn publish(&mut self, record: &TelemetryRecord) -> Result<(), CommsError> {
        if self.offline {
            return Err(CommsError::NotConnected);
        }
        self.telemetry.push(record.clone());
        Ok(())
    }
}

// ── MockNvs ───────────────────────────────────────────────────

#[derive(Default)]
pub struct MockNvs {
    store: HashMap<String, Vec<u8>>,
    config: RefCell<Option<BmsConfig>>,
    pub fail_writes: bool,
}

impl StoragePort for MockNvs {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        let k = format!("{}::{}", namespace, key);
        match self.store.get(&k) {
            Some(v) if v.len() > buf.len() => Err(StorageError::Corrupted),
            Some(v) => {
                buf[..v.len()].copy_from_slice(v);
                Ok(v.len())
            }
            None => Err(StorageError::NotFound),
        }
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        if self.fail_writes {
            return Err(StorageError::IoError);
        }
        self.store.insert(format!("{}::{}", namespace, key), data.to_vec());
        Ok(())
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        self.store.remove(&format!("{}::{}", namespace, key));
        Ok(())
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        self.store.contains_key(&format!("{}::{}", namespace, key))
    }
}

impl ConfigPort for MockNvs {
    fn load(&self) -> Result<BmsConfig, ConfigError> {
        Ok(self.config.borrow().clone().unwrap_or_default())
    }

    fn save(&self, config: &BmsConfig) -> Result<(), ConfigError> {
        config.validate().map_err(ConfigError::ValidationFailed)?;
        *self.config.borrow_mut() = Some(config.clone());
        Ok(())
    }
}

// ── RecordingSink ─────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<AppEvent>,
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}

// ── Test bench ────────────────────────────────────────────────

/// A started service wired to mocks. Time is advanced explicitly.
pub struct Bench {
    pub svc: BmsService,
    pub board: MockBoard,
    pub uplink: MockUplink,
    pub nvs: MockNvs,
    pub sink: RecordingSink,
    pub now_ms: u64,
}

#[allow(dead_code)]
impl Bench {
    pub fn start(frame: SensorFrame) -> Self {
        Self::start_with(BmsConfig::default(), MockNvs::default(), frame)
    }

    pub fn start_with(config: BmsConfig, nvs: MockNvs, frame: SensorFrame) -> Self {
        let mut bench = Self {
            svc: BmsService::new(config),
            board: MockBoard::new(frame),
            uplink: MockUplink::default(),
            nvs,
            sink: RecordingSink::default(),
            now_ms: 0,
        };
        bench
            .svc
            .start(0, &mut bench.board, &bench.nvs, &mut bench.sink)
            .expect("service start");
        bench
    }

    /// Advance one 200 ms control period and run a tick.
    pub fn tick(&mut self) {
        self.now_ms += 200;
        self.svc
            .tick(self.now_ms, &mut self.board, &mut self.uplink, &mut self.nvs, &mut self.sink)
            .expect("tick");
    }

    pub fn ticks(&mut self, n: usize) {
        for _ in 0..n {
            self.tick();
        }
    }

    pub fn command(&mut self, cmd: evbms::app::commands::AppCommand) -> evbms::error::Result<()> {
        self.svc
            .handle_command(cmd, self.now_ms, &mut self.board, &mut self.uplink, &mut self.nvs, &mut self.sink)
    }

    pub fn events(&self, pred: impl Fn(&AppEvent) -> bool) -> usize {
        self.sink.events.iter().filter(|e| pred(e)).count()
    }
}

/// Nominal 3S frame at `pack_v`.
#[allow(dead_code)]
pub fn pack(pack_v: f32) -> SensorFrame {
    SensorFrame::nominal(pack_v, 3)
}
