#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]

#[cfg(target_os = "none")]
use {
    embassy_executor::Spawner,
    embassy_time::Delay,
    esp_alloc as _,
    esp_backtrace as _,
    esp_hal::clock::CpuClock,
    esp_hal::gpio::{Level, Output, OutputConfig},
    esp_hal::ram,
    esp_hal::rng::Rng,
    esp_hal::timer::timg::{MwdtStage, TimerGroup},
    esp_radio::Controller,
    lamp_relay::command::Interpreter,
    lamp_relay::config::{LAMP_PIN, LAMP_TOPIC, WATCHDOG_TIMEOUT_MS},
    lamp_relay::connectivity::Connectivity,
    lamp_relay::lamp::Lamp,
    lamp_relay::mqtt::{MQTT_BUFFER_SIZE, Mqtt, RX_BUFFER_SIZE, TX_BUFFER_SIZE},
    lamp_relay::wifi::Wifi,
    lamp_relay::beacon,
    log::{error, info},
};

// When you are okay with using a nightly compiler it's better to use https://docs.rs/static_cell/2.1.0/static_cell/macro.make_static.html
#[cfg(target_os = "none")]
macro_rules! mk_static {
    ($t:ty,$val:expr) => {{
        static STATIC_CELL: static_cell::StaticCell<$t> = static_cell::StaticCell::new();
        #[deny(unused_attributes)]
        let x = STATIC_CELL.uninit().write($val);
        x
    }};
}

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
#[cfg(target_os = "none")]
esp_bootloader_esp_idf::esp_app_desc!();

#[cfg(target_os = "none")]
#[esp_rtos::main]
async fn main(spawner: Spawner) -> ! {
    esp_println::logger::init_logger_from_env();
    info!("Booting...");
    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    esp_alloc::heap_allocator!(#[ram(reclaimed)] size: 72 * 1024);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    // Every wait in the connectivity loop is shorter than this; only a wedged
    // loop lets it expire.
    let mut wdt = timg0.wdt;
    wdt.set_timeout(
        MwdtStage::Stage0,
        esp_hal::time::Duration::from_millis(WATCHDOG_TIMEOUT_MS),
    );
    wdt.enable();
    wdt.feed();

    // Must stay in step with `config::LAMP_PIN`.
    let lamp_pin = Output::new(peripherals.GPIO2, Level::Low, OutputConfig::default());
    let mut lamp = Lamp::new(lamp_pin);
    info!("Lamp relay on GPIO{}", LAMP_PIN);

    let radio_init = &*mk_static!(
        Controller<'static>,
        esp_radio::init().expect("Failed to init radio")
    );
    beacon::start_advertising(radio_init, peripherals.BT, spawner);

    let wifi = Wifi::new(radio_init, peripherals.WIFI, Rng::new(), spawner)
        .expect("Failed to initialize Wi-Fi");
    let mqtt = Mqtt::new(
        wifi.stack(),
        mk_static!([u8; RX_BUFFER_SIZE], [0; RX_BUFFER_SIZE]),
        mk_static!([u8; TX_BUFFER_SIZE], [0; TX_BUFFER_SIZE]),
        mk_static!([u8; MQTT_BUFFER_SIZE], [0; MQTT_BUFFER_SIZE]),
        mk_static!([u8; MQTT_BUFFER_SIZE], [0; MQTT_BUFFER_SIZE]),
    );

    let rng = Rng::new();
    let mut connectivity = Connectivity::new(wifi, mqtt, Delay, move || rng.random(), wdt);
    let interpreter = Interpreter::new(LAMP_TOPIC);

    let fatal = match connectivity.connect_wifi().await {
        Ok(_) => match connectivity.run(&interpreter, &mut lamp).await {
            Ok(never) => match never {},
            Err(e) => e,
        },
        Err(e) => e,
    };

    error!("Unrecoverable connectivity failure: {:?}", fatal);
    esp_hal::system::software_reset()
}

#[cfg(not(target_os = "none"))]
fn main() {
    println!("lamp-relay runs on the ESP32; build it with `cargo firmware` and flash with `cargo flash`.");
}
