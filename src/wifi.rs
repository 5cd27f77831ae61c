use core::net::Ipv4Addr;

use esp_hal::rng::Rng;
use esp_radio::{
    Controller,
    wifi::{ClientConfig, ModeConfig, WifiController, WifiDevice, WifiError},
};

use embassy_executor::Spawner;
use embassy_net::{DhcpConfig, Runner, Stack, StackResources};
use heapless::String;
use log::{info, warn};
use static_cell::StaticCell;

use crate::config::{HOSTNAME, PASSWORD, SSID};
use crate::connectivity::WifiLink;

static RESOURCES: StaticCell<StackResources<4>> = StaticCell::new();

/// Station-mode WiFi on the esp-radio controller with an embassy-net stack on
/// top. Association is driven from outside through [`WifiLink`].
pub struct Wifi {
    controller: WifiController<'static>,
    stack: Stack<'static>,
}

#[derive(Debug)]
pub enum Error {
    Init(WifiError),
    Spawn,
}

impl Wifi {
    pub fn new(
        radio_init: &'static Controller<'static>,
        wifi: esp_hal::peripherals::WIFI<'static>,
        rng: Rng,
        spawner: Spawner,
    ) -> Result<Self, Error> {
        let config = esp_radio::wifi::Config::default().with_rx_queue_size(10);
        let (controller, interfaces) =
            esp_radio::wifi::new(radio_init, wifi, config).map_err(Error::Init)?;

        let mut dhcp_config: DhcpConfig = Default::default();
        dhcp_config.hostname = String::try_from(HOSTNAME).ok();
        let config = embassy_net::Config::dhcpv4(dhcp_config);

        let seed = (rng.random() as u64) << 32 | rng.random() as u64;

        let resources = RESOURCES.init(StackResources::new());
        let (stack, runner) = embassy_net::new(interfaces.sta, config, resources, seed);
        if spawner.spawn(net_task(runner)).is_err() {
            return Err(Error::Spawn);
        }

        Ok(Self { controller, stack })
    }

    pub fn stack(&self) -> Stack<'static> {
        self.stack
    }
}

impl WifiLink for Wifi {
    async fn begin(&mut self) {
        if !matches!(self.controller.is_started(), Ok(true)) {
            let client_config = ModeConfig::Client(
                ClientConfig::default()
                    .with_ssid(SSID.into())
                    .with_password(PASSWORD.into()),
            );
            if let Err(e) = self.controller.set_config(&client_config) {
                warn!("Failed to configure wifi: {:?}", e);
                return;
            }
            info!("Starting wifi");
            if let Err(e) = self.controller.start_async().await {
                warn!("Failed to start wifi: {:?}", e);
                return;
            }
            info!("Wifi started!");
        }

        if let Err(e) = self.controller.connect() {
            warn!("Failed to start association: {:?}", e);
        }
    }

    fn is_connected(&self) -> bool {
        matches!(self.controller.is_connected(), Ok(true)) && self.stack.config_v4().is_some()
    }

    fn local_ip(&self) -> Option<Ipv4Addr> {
        self.stack.config_v4().map(|config| config.address.address())
    }
}

#[embassy_executor::task]
async fn net_task(mut runner: Runner<'static, WifiDevice<'static>>) {
    runner.run().await
}
