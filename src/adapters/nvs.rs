//! Flash-backed persistence for the BMS.
//!
//! Implements both [`ConfigPort`] and [`StoragePort`] for the BMS.
//!
//! - Config is range-checked with [`BmsConfig::validate`] before it is
//!   written, then stored as a single postcard blob.
//! - Health scalars (`soc`, `soh`, `hightemp_s`, `faults`, `cycle_cnt`) are
//!   small blobs in the `bms` namespace, written through
//!   [`persist`](crate::persist).
//! - ESP-IDF NVS commits are atomic per `nvs_commit()`; there is no
//!   transaction across keys.
//! - Reading into a buffer smaller than the stored value fails the same way
//!   on both backends.

use crate::app::ports::{ConfigError, ConfigPort, StorageError, StoragePort};
use crate::config::BmsConfig;
use log::info;

#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;

#[cfg(target_os = "espidf")]
use esp_idf_sys::*;

const CONFIG_NAMESPACE: &str = "bmscfg";
const CONFIG_KEY: &str = "config";

#[cfg(target_os = "espidf")]
const MAX_BLOB_SIZE: usize = 4000;

pub struct NvsAdapter {
    #[cfg(not(target_os = "espidf"))]
    store: std::cell::RefCell<HashMap<String, Vec<u8>>>,
}

impl NvsAdapter {
    /// Bring up the NVS partition (or the in-memory map on host builds).
    ///
    /// On first boot or after a version mismatch the partition is erased
    /// and re-initialised. Returns `Err(ConfigError::IoError)` if that fails.
    pub fn new() -> Result<Self, ConfigError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: called once from the main task before any other NVS use.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES || ret == ESP_ERR_NVS_NEW_VERSION_FOUND {
                log::warn!("NVS: erasing and re-initialising flash partition");
                if unsafe { nvs_flash_erase() } != ESP_OK || unsafe { nvs_flash_init() } != ESP_OK {
                    return Err(ConfigError::IoError);
                }
            } else if ret != ESP_OK {
                return Err(ConfigError::IoError);
            }
            info!("nvs: ESP-IDF NVS initialised");
        }

        #[cfg(not(target_os = "espidf"))]
        info!("nvs: simulation backend");

        Ok(Self {
            #[cfg(not(target_os = "espidf"))]
            store: std::cell::RefCell::new(HashMap::new()),
        })
    }

    #[cfg(not(target_os = "espidf"))]
    fn sim_slot(namespace: &str, key: &str) -> String {
        format!("{namespace}::{key}")
    }

    /// NUL-terminated copy of a namespace or key (NVS caps both at 15 bytes).
    #[cfg(target_os = "espidf")]
    fn c_name(name: &str) -> [u8; 16] {
        let mut buf = [0u8; 16];
        let bytes = name.as_bytes();
        let len = bytes.len().min(15);
        buf[..len].copy_from_slice(&bytes[..len]);
        buf
    }

    /// Runs `f` against an open handle on `namespace`; the handle is always closed.
    #[cfg(target_os = "espidf")]
    fn with_handle<F, T>(namespace: &str, write: bool, f: F) -> Result<T, i32>
    where
        F: FnOnce(nvs_handle_t) -> Result<T, i32>,
    {
        let ns = Self::c_name(namespace);
        let mut handle: nvs_handle_t = 0;
        let mode = if write {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };

        let ret = unsafe { nvs_open(ns.as_ptr() as *const _, mode, &mut handle) };
        if ret != ESP_OK {
            return Err(ret);
        }

        let result = f(handle);
        unsafe {
            nvs_close(handle);
        }
        result
    }

    #[cfg(target_os = "espidf")]
    fn set_blob(namespace: &str, key: &str, data: &[u8]) -> Result<(), i32> {
        let key = Self::c_name(key);
        Self::with_handle(namespace, true, |handle| {
            let ret = unsafe {
                nvs_set_blob(handle, key.as_ptr() as *const _, data.as_ptr() as *const _, data.len())
            };
            if ret != ESP_OK {
                return Err(ret);
            }
            let ret = unsafe { nvs_commit(handle) };
            if ret != ESP_OK {
                return Err(ret);
            }
            Ok(())
        })
    }
}

fn validate_config(cfg: &BmsConfig) -> Result<(), ConfigError> {
    cfg.validate().map_err(ConfigError::ValidationFailed)
}

impl ConfigPort for NvsAdapter {
    fn load(&self) -> Result<BmsConfig, ConfigError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let key = Self::sim_slot(CONFIG_NAMESPACE, CONFIG_KEY);
            if let Some(bytes) = self.store.borrow().get(&key) {
                let cfg: BmsConfig = postcard::from_bytes(bytes).map_err(|_| ConfigError::Corrupted)?;
                validate_config(&cfg)?;
                info!("nvs: loaded config from store");
                Ok(cfg)
            } else {
                info!("nvs: no stored config, using defaults");
                Ok(BmsConfig::default())
            }
        }

        #[cfg(target_os = "espidf")]
        {
            let key = Self::c_name(CONFIG_KEY);
            let result = Self::with_handle(CONFIG_NAMESPACE, false, |handle| {
                let mut size: usize = 0;
                let ret = unsafe {
                    nvs_get_blob(handle, key.as_ptr() as *const _, core::ptr::null_mut(), &mut size)
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                if size == 0 || size > MAX_BLOB_SIZE {
                    return Err(ESP_ERR_NVS_INVALID_LENGTH);
                }

                let mut buf = vec![0u8; size];
                let ret = unsafe {
                    nvs_get_blob(handle, key.as_ptr() as *const _, buf.as_mut_ptr() as *mut _, &mut size)
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(buf)
            });

            match result {
                Ok(bytes) => {
                    let cfg: BmsConfig = postcard::from_bytes(&bytes).map_err(|_| ConfigError::Corrupted)?;
                    validate_config(&cfg)?;
                    info!("nvs: loaded config from NVS ({} bytes)", bytes.len());
                    Ok(cfg)
                }
                Err(e) if e == ESP_ERR_NVS_NOT_FOUND => {
                    info!("nvs: no stored config, using defaults");
                    Ok(BmsConfig::default())
                }
                Err(e) => {
                    log::warn!("nvs: NVS read error {}, using defaults", e);
                    Ok(BmsConfig::default())
                }
            }
        }
    }

    fn save(&self, config: &BmsConfig) -> Result<(), ConfigError> {
        validate_config(config)?;
        let bytes = postcard::to_allocvec(config).map_err(|_| ConfigError::IoError)?;

        #[cfg(not(target_os = "espidf"))]
        {
            let key = Self::sim_slot(CONFIG_NAMESPACE, CONFIG_KEY);
            self.store.borrow_mut().insert(key, bytes);
            info!("nvs: config saved (simulation)");
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            match Self::set_blob(CONFIG_NAMESPACE, CONFIG_KEY, &bytes) {
                Ok(()) => {
                    info!("nvs: config saved to NVS ({} bytes)", bytes.len());
                    Ok(())
                }
                Err(e) if e == ESP_ERR_NVS_NOT_ENOUGH_SPACE => Err(ConfigError::StorageFull),
                Err(e) => {
                    log::warn!("nvs: NVS write error {}", e);
                    Err(ConfigError::IoError)
                }
            }
        }
    }
}

impl StoragePort for NvsAdapter {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let slot = Self::sim_slot(namespace, key);
            match self.store.borrow().get(&slot) {
                Some(data) if data.len() > buf.len() => Err(StorageError::Corrupted),
                Some(data) => {
                    buf[..data.len()].copy_from_slice(data);
                    Ok(data.len())
                }
                None => Err(StorageError::NotFound),
            }
        }

        #[cfg(target_os = "espidf")]
        {
            let key = Self::c_name(key);
            let result = Self::with_handle(namespace, false, |handle| {
                let mut size = buf.len();
                let ret = unsafe {
                    nvs_get_blob(handle, key.as_ptr() as *const _, buf.as_mut_ptr() as *mut _, &mut size)
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(size)
            });
            match result {
                Ok(size) => Ok(size),
                Err(e) if e == ESP_ERR_NVS_NOT_FOUND => Err(StorageError::NotFound),
                Err(e) if e == ESP_ERR_NVS_INVALID_LENGTH => Err(StorageError::Corrupted),
                Err(_) => Err(StorageError::IoError),
            }
        }
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let slot = Self::sim_slot(namespace, key);
            self.store.borrow_mut().insert(slot, data.to_vec());
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            match Self::set_blob(namespace, key, data) {
                Ok(()) => Ok(()),
                Err(e) if e == ESP_ERR_NVS_NOT_ENOUGH_SPACE => Err(StorageError::Full),
                Err(_) => Err(StorageError::IoError),
            }
        }
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let slot = Self::sim_slot(namespace, key);
            self.store.borrow_mut().remove(&slot);
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let key = Self::c_name(key);
            let result = Self::with_handle(namespace, true, |handle| {
                let ret = unsafe { nvs_erase_key(handle, key.as_ptr() as *const _) };
                if ret != ESP_OK && ret != ESP_ERR_NVS_NOT_FOUND {
                    return Err(ret);
                }
                let ret = unsafe { nvs_commit(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(())
            });
            result.map_err(|_| StorageError::IoError)
        }
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        #[cfg(not(target_os = "espidf"))]
        {
            let slot = Self::sim_slot(namespace, key);
            self.store.borrow().contains_key(&slot)
        }

        #[cfg(target_os = "espidf")]
        {
            let key = Self::c_name(key);
            let result = Self::with_handle(namespace, false, |handle| {
                let ret = unsafe { nvs_find_key(handle, key.as_ptr() as *const _, core::ptr::null_mut()) };
                Ok(ret == ESP_OK)
            });
            result.unwrap_or(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::NAMESPACE;

    #[test]
    fn missing_config_loads_defaults() {
        let nvs = NvsAdapter::new().unwrap();
        assert_eq!(nvs.load().unwrap(), BmsConfig::default());
    }

    #[test]
    fn config_round_trip() {
        let nvs = NvsAdapter::new().unwrap();
        let cfg = BmsConfig {
            geofence_radius_m: 250.0,
            home_lat: 48.8584,
            home_lon: 2.2945,
            ..BmsConfig::default()
        };
        nvs.save(&cfg).unwrap();
        assert_eq!(nvs.load().unwrap(), cfg);
    }

    #[test]
    fn save_rejects_invalid_config() {
        let nvs = NvsAdapter::new().unwrap();
        let cfg = BmsConfig {
            fan_on_temp_c: 30.0,
            fan_off_temp_c: 35.0,
            ..BmsConfig::default()
        };
        assert!(matches!(nvs.save(&cfg), Err(ConfigError::ValidationFailed(_))));
        assert_eq!(nvs.load().unwrap(), BmsConfig::default());
    }

    #[test]
    fn stored_nan_threshold_is_refused_on_load() {
        let nvs = NvsAdapter::new().unwrap();
        let cfg = BmsConfig {
            cell_max_v: f32::NAN,
            ..BmsConfig::default()
        };
        let blob = postcard::to_allocvec(&cfg).unwrap();
        nvs.store
            .borrow_mut()
            .insert(NvsAdapter::sim_slot(CONFIG_NAMESPACE, CONFIG_KEY), blob);
        assert!(matches!(nvs.load(), Err(ConfigError::ValidationFailed(_))));
        assert!(matches!(nvs.save(&cfg), Err(ConfigError::ValidationFailed(_))));
    }

    #[test]
    fn storage_round_trip() {
        let mut nvs = NvsAdapter::new().unwrap();
        nvs.write(NAMESPACE, "soc", &55.5f32.to_le_bytes()).unwrap();
        assert!(nvs.exists(NAMESPACE, "soc"));

        let mut buf = [0u8; 4];
        let len = nvs.read(NAMESPACE, "soc", &mut buf).unwrap();
        assert_eq!(len, 4);
        assert_eq!(f32::from_le_bytes(buf), 55.5);

        nvs.delete(NAMESPACE, "soc").unwrap();
        assert!(!nvs.exists(NAMESPACE, "soc"));
    }

    #[test]
    fn read_missing_key() {
        let nvs = NvsAdapter::new().unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(nvs.read(NAMESPACE, "nope", &mut buf), Err(StorageError::NotFound));
    }

    #[test]
    fn short_buffer_is_rejected() {
        let mut nvs = NvsAdapter::new().unwrap();
        nvs.write(NAMESPACE, "cycle_cnt", &7u64.to_le_bytes()).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(nvs.read(NAMESPACE, "cycle_cnt", &mut buf), Err(StorageError::Corrupted));
    }

    #[test]
    fn namespace_isolation() {
        let mut nvs = NvsAdapter::new().unwrap();
        nvs.write("bms", "key", b"alpha").unwrap();
        nvs.write("bmscfg", "key", b"bravo").unwrap();

        let mut buf = [0u8; 8];
        let len = nvs.read("bms", "key", &mut buf).unwrap();
        assert_eq!(&buf[..len], b"alpha");
        let len = nvs.read("bmscfg", "key", &mut buf).unwrap();
        assert_eq!(&buf[..len], b"bravo");
    }
}
