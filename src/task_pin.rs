//! Core-pinned thread spawning for the dual-core ESP32.
//!
//! ESP-IDF implements `std::thread` on top of pthreads, which are thin
//! wrappers around FreeRTOS tasks. `esp_pthread_set_cfg()` applies to the
//! *next* `pthread_create()` from the calling thread, so the config/spawn
//! pair must not be interleaved with other thread creation.

use std::io;
use std::thread::JoinHandle;

/// CPU core identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Core {
    /// Core 0 (PRO_CPU): WiFi and lwIP live here.
    Pro = 0,
    /// Core 1 (APP_CPU): the control loop.
    App = 1,
}

/// Spawn a thread pinned to `core` with explicit priority and stack.
///
/// `name` must be NUL-terminated (e.g. `"uplink\0"`).
#[cfg(target_os = "espidf")]
pub fn spawn_on_core(
    core: Core,
    priority: u8,
    stack_kb: usize,
    name: &'static str,
    f: impl FnOnce() + Send + 'static,
) -> io::Result<JoinHandle<()>> {
    // SAFETY: `name` is 'static and NUL-terminated; the config is copied by IDF.
    let ret = unsafe {
        let mut cfg = esp_idf_sys::esp_create_default_pthread_config();
        cfg.pin_to_core = core as i32;
        cfg.prio = i32::from(priority);
        cfg.stack_size = (stack_kb * 1024) as _;
        cfg.thread_name = name.as_ptr() as *const _;
        esp_idf_sys::esp_pthread_set_cfg(&cfg)
    };
    if ret != esp_idf_sys::ESP_OK {
        return Err(io::Error::other(format!("esp_pthread_set_cfg failed: {ret}")));
    }

    let label = name.trim_end_matches('\0');
    log::info!("task {label}: {core:?} core, prio {priority}, {stack_kb} KiB stack");

    std::thread::Builder::new().name(label.into()).spawn(f)
}

/// Host fallback: ignores core affinity and priority.
#[cfg(not(target_os = "espidf"))]
pub fn spawn_on_core(
    _core: Core,
    _priority: u8,
    stack_kb: usize,
    name: &'static str,
    f: impl FnOnce() + Send + 'static,
) -> io::Result<JoinHandle<()>> {
    let label = name.trim_end_matches('\0');
    log::info!("task {label}: host thread, {stack_kb} KiB stack");

    std::thread::Builder::new()
        .name(label.into())
        .stack_size(stack_kb * 1024)
        .spawn(f)
}
