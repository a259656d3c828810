fn main() {
    // Uplink endpoints and credentials are baked in at build time.
    for var in [
        "BMS_ALERT_URL",
        "BMS_TELEMETRY_URL",
        "BMS_API_KEY",
        "BMS_WIFI_SSID",
        "BMS_WIFI_PASS",
        "BMS_SMS_NUMBER",
    ] {
        println!("cargo:rerun-if-env-changed={var}");
    }

    // ESP-IDF link arguments are only needed for the firmware image.
    #[cfg(feature = "espidf")]
    embuild::espidf::sysenv::output();
}
