//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter       | Implements                 | Connects to                    |
//! |---------------|----------------------------|--------------------------------|
//! | `sensor_feed` | SensorPort                 | Acquisition task (Signal)      |
//! | `relay_gpio`  | RelayPort                  | embedded-hal output pins       |
//! | `uplink`      | AlertPort, TelemetryPort   | Outbox channel → HTTP / GSM    |
//! | `alert_text`  | (formatting only)          | Alert → message / SMS text     |
//! | `log_sink`    | EventSink                  | Serial log output              |
//! | `event_log`   | EventSink                  | In-memory ring of recent events|
//! | `nvs`         | ConfigPort, StoragePort    | NVS / in-memory store          |
//! | `time`        | (clock only)               | ESP32 system timer             |

pub mod alert_text;
pub mod event_log;
pub mod log_sink;
pub mod nvs;
pub mod relay_gpio;
pub mod sensor_feed;
pub mod time;
pub mod uplink;
