#![cfg_attr(not(test), no_std)]

pub mod beacon;
pub mod client_id;
pub mod command;
pub mod config;
pub mod connectivity;
pub mod lamp;
#[cfg(target_os = "none")]
pub mod mqtt;
#[cfg(target_os = "none")]
pub mod wifi;

#[cfg(test)]
mod testing;

#[cfg(target_os = "none")]
impl connectivity::Watchdog for esp_hal::timer::timg::Wdt<esp_hal::peripherals::TIMG0<'static>> {
    fn feed(&mut self) {
        esp_hal::timer::timg::Wdt::feed(self);
    }
}

#[cfg(target_os = "none")]
#[unsafe(no_mangle)]
pub fn custom_halt() -> ! {
    esp_hal::system::software_reset();
}

#[cfg(target_os = "none")]
#[unsafe(no_mangle)]
pub extern "Rust" fn _esp_println_timestamp() -> u64 {
    esp_hal::time::Instant::now()
        .duration_since_epoch()
        .as_millis()
}
