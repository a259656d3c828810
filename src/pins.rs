//! GPIO / peripheral pin assignments for the BMS main board (ESP32-WROOM).
//!
//! Single source of truth: the bootstrap references these rather than
//! hard-coding pin numbers.

// ---------------------------------------------------------------------------
// Relays (active HIGH on the stock relay board)
// ---------------------------------------------------------------------------

/// Charger contactor.
pub const CHARGE_RELAY_GPIO: i32 = 25;
/// Motor / load contactor.
pub const MOTOR_RELAY_GPIO: i32 = 26;
/// Cooling fan.
pub const FAN_RELAY_GPIO: i32 = 27;
pub const RELAY_ACTIVE_HIGH: bool = true;

// ---------------------------------------------------------------------------
// Acquisition (owned by the sensor task)
// ---------------------------------------------------------------------------

/// Pack voltage divider, ADC1.
pub const PACK_VOLTAGE_ADC_GPIO: i32 = 34;
/// Hall current sensor, ADC1.
pub const CURRENT_ADC_GPIO: i32 = 35;
/// Pack temperature sensor data line.
pub const TEMP_PACK_GPIO: i32 = 4;
/// Accelerometer interrupt.
pub const ACCEL_INT_GPIO: i32 = 23;

pub const I2C_SDA_GPIO: i32 = 21;
pub const I2C_SCL_GPIO: i32 = 22;

// ---------------------------------------------------------------------------
// GSM modem (UART2)
// ---------------------------------------------------------------------------

pub const GSM_RX_GPIO: i32 = 16;
pub const GSM_TX_GPIO: i32 = 17;
pub const GSM_BAUD: u32 = 9_600;
