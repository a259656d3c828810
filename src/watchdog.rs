//! Task Watchdog Timer (TWDT) for the control loop.
//!
//! A stalled supervisory cycle resets the device. The loop calls
//! [`Watchdog::feed`] once per tick.

#[cfg(target_os = "espidf")]
use esp_idf_sys::*;

pub struct Watchdog {
    #[cfg(target_os = "espidf")]
    subscribed: bool,
    timeout_ms: u32,
}

impl Watchdog {
    /// Configure the TWDT with `timeout_ms` and subscribe the calling task.
    pub fn new(timeout_ms: u32) -> Self {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: plain FFI calls on the current task handle.
            let subscribed = unsafe {
                let cfg = esp_task_wdt_config_t {
                    timeout_ms,
                    idle_core_mask: 0,
                    trigger_panic: true,
                };
                let ret = esp_task_wdt_reconfigure(&cfg);
                if ret != ESP_OK {
                    log::warn!("twdt: reconfigure -> {ret}, keeping existing settings");
                }
                let ret = esp_task_wdt_add(core::ptr::null_mut());
                if ret != ESP_OK {
                    log::warn!("twdt: control task not subscribed ({ret})");
                }
                ret == ESP_OK
            };
            if subscribed {
                log::info!("twdt: armed at {timeout_ms} ms");
            }
            Self { subscribed, timeout_ms }
        }

        #[cfg(not(target_os = "espidf"))]
        {
            log::info!("twdt: host build, {timeout_ms} ms timeout not enforced");
            Self { timeout_ms }
        }
    }

    pub fn timeout_ms(&self) -> u32 {
        self.timeout_ms
    }

    /// Must be called more often than the configured timeout.
    pub fn feed(&self) {
        #[cfg(target_os = "espidf")]
        if self.subscribed {
            // SAFETY: resets the TWDT entry of the calling (subscribed) task.
            unsafe {
                esp_task_wdt_reset();
            }
        }
    }
}
