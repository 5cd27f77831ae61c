//! Compiled-in configuration.
//!
//! Credentials and the broker address can be overridden at build time through
//! the `SSID`, `PASSWORD` and `MQTT_SERVER` environment variables (or a `.env`
//! file, see `build.rs`). Everything else is fixed.

const fn or_default(value: Option<&'static str>, default: &'static str) -> &'static str {
    match value {
        Some(value) => value,
        None => default,
    }
}

pub const SSID: &str = or_default(option_env!("SSID"), "Nomad-Fi");
pub const PASSWORD: &str = or_default(option_env!("PASSWORD"), "1234567890");

/// IPv4 literal or host name of the broker.
pub const MQTT_SERVER: &str = or_default(option_env!("MQTT_SERVER"), "192.168.137.114");
pub const MQTT_PORT: u16 = 1883;
pub const MQTT_KEEP_ALIVE_SECS: u16 = 60;
pub const MQTT_SOCKET_TIMEOUT_SECS: u64 = 10;
pub const MQTT_RETRY_DELAY_MS: u32 = 5_000;

pub const LAMP_TOPIC: &str = "fastapi/topic";
/// GPIO driving the lamp relay, active high. The board binary takes the
/// matching `GPIO2` peripheral by name.
pub const LAMP_PIN: u8 = 2;

pub const CLIENT_ID_PREFIX: &str = "ESP32Client-";
pub const HOSTNAME: &str = "lamp-relay";
pub const BLE_DEVICE_NAME: &str = "ESP32_BLE_Advertiser";

pub const WIFI_BEGIN_DELAY_MS: u32 = 10;
pub const WIFI_POLL_INTERVAL_MS: u32 = 500;
/// Polls tolerated before the device restarts (about ten seconds).
pub const WIFI_MAX_RETRIES: u32 = 20;

pub const WATCHDOG_TIMEOUT_MS: u64 = 60_000;
