//! Control loop → outbox queue → transport, wired the way the firmware runs.

use critical_section as _;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;

use evbms::adapters::event_log::{EventLog, Tee};
use evbms::adapters::log_sink::LogEventSink;
use evbms::adapters::uplink::{ChannelUplink, UplinkMsg, UplinkTransport, forward};
use evbms::app::events::AppEvent;
use evbms::app::service::BmsService;
use evbms::config::BmsConfig;
use evbms::error::CommsError;

use crate::mock_hw::{MockBoard, MockNvs, pack};

#[derive(Default)]
struct Capture {
    alerts: Vec<String>,
    sms: Vec<String>,
    telemetry: Vec<Vec<u8>>,
}

impl UplinkTransport for Capture {
    fn deliver_alert(&mut self, text: &str) -> Result<(), CommsError> {
        self.alerts.push(text.to_owned());
        Ok(())
    }

    fn deliver_sms(&mut self, text: &str) -> Result<(), CommsError> {
        self.sms.push(text.to_owned());
        Ok(())
    }

    fn deliver_telemetry(&mut self, body: &[u8]) -> Result<(), CommsError> {
        self.telemetry.push(body.to_vec());
        Ok(())
    }
}

fn drain<const N: usize>(
    channel: &Channel<CriticalSectionRawMutex, UplinkMsg, N>,
    transport: &mut Capture,
) {
    while let Ok(msg) = channel.try_receive() {
        forward(&msg, transport).unwrap();
    }
}

#[test]
fn fault_reaches_transport_as_text() {
    let channel: Channel<CriticalSectionRawMutex, UplinkMsg, 8> = Channel::new();
    let mut outbox = ChannelUplink::new(&channel);
    let mut board = MockBoard::new(pack(11.1));
    let mut nvs = MockNvs::default();
    let mut sink = Tee(LogEventSink::new(), EventLog::new());

    let mut svc = BmsService::new(BmsConfig::default());
    svc.start(0, &mut board, &nvs, &mut sink).unwrap();

    board.set_frame(pack(13.0));
    svc.tick(200, &mut board, &mut outbox, &mut nvs, &mut sink).unwrap();

    let mut transport = Capture::default();
    drain(&channel, &mut transport);

    assert!(
        transport
            .alerts
            .iter()
            .any(|t| t.starts_with("BMS FAULT DETECTED") && t.contains("OVER VOLTAGE"))
    );
    assert_eq!(transport.sms, ["BMS FAULT DETECTED"]);
    assert_eq!(outbox.dropped(), 0);

    let Tee(_, log) = sink;
    assert!(
        log.iter()
            .any(|e| matches!(e, AppEvent::FaultLatched { severity: 4, .. }))
    );
}

#[test]
fn telemetry_is_serialized_as_json() {
    let channel: Channel<CriticalSectionRawMutex, UplinkMsg, 8> = Channel::new();
    let mut outbox = ChannelUplink::new(&channel);
    let mut board = MockBoard::new(pack(11.1));
    let mut nvs = MockNvs::default();
    let mut sink = EventLog::new();

    let mut svc = BmsService::new(BmsConfig::default());
    svc.start(0, &mut board, &nvs, &mut sink).unwrap();
    for i in 1..=50 {
        svc.tick(i * 200, &mut board, &mut outbox, &mut nvs, &mut sink)
            .unwrap();
    }

    let mut transport = Capture::default();
    drain(&channel, &mut transport);

    assert_eq!(transport.telemetry.len(), 1);
    let json: serde_json::Value = serde_json::from_slice(&transport.telemetry[0]).unwrap();
    assert_eq!(json["uptime_ms"], 10_000);
    assert_eq!(json["fault"], "NONE");
    assert_eq!(json["motor"], true);
    assert!(sink.iter().all(|e| !matches!(e, AppEvent::Telemetry(_))));
}

#[test]
fn saturated_queue_never_blocks_the_interlock() {
    let channel: Channel<CriticalSectionRawMutex, UplinkMsg, 1> = Channel::new();
    let mut outbox = ChannelUplink::new(&channel);
    let mut board = MockBoard::new(pack(11.1));
    let mut nvs = MockNvs::default();
    let mut sink = EventLog::new();

    let mut svc = BmsService::new(BmsConfig::default());
    svc.start(0, &mut board, &nvs, &mut sink).unwrap();

    board.set_frame(pack(13.0));
    svc.tick(200, &mut board, &mut outbox, &mut nvs, &mut sink).unwrap();

    assert!(svc.is_faulted());
    assert_eq!(board.motor(), Some(false));
    assert!(outbox.dropped() >= 1, "SMS should not fit behind the alert");
}
