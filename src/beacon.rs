//! BLE name beacon.
//!
//! The beacon is fire-and-forget: once started it advertises the device name
//! forever and never talks to the rest of the firmware.

/// Longest legacy advertising payload.
pub const MAX_ADV_LEN: usize = 31;

const AD_FLAGS: u8 = 0x01;
const AD_COMPLETE_LOCAL_NAME: u8 = 0x09;
const LE_GENERAL_DISCOVERABLE: u8 = 0x02;
const BR_EDR_NOT_SUPPORTED: u8 = 0x04;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeaconError {
    NameTooLong(usize),
    BufferTooSmall,
}

/// Writes the advertising payload (flags, then the complete local name) into
/// `buf` and returns its length.
pub fn advertisement_data(name: &str, buf: &mut [u8]) -> Result<usize, BeaconError> {
    let name = name.as_bytes();
    let len = 3 + 2 + name.len();
    if len > MAX_ADV_LEN {
        return Err(BeaconError::NameTooLong(name.len()));
    }
    if buf.len() < len {
        return Err(BeaconError::BufferTooSmall);
    }

    buf[..3].copy_from_slice(&[2, AD_FLAGS, LE_GENERAL_DISCOVERABLE | BR_EDR_NOT_SUPPORTED]);
    buf[3] = name.len() as u8 + 1;
    buf[4] = AD_COMPLETE_LOCAL_NAME;
    buf[5..len].copy_from_slice(name);
    Ok(len)
}

#[cfg(target_os = "none")]
pub use board::start_advertising;

#[cfg(target_os = "none")]
mod board {
    use bt_hci::controller::ExternalController;
    use embassy_executor::Spawner;
    use embassy_futures::join::join;
    use esp_radio::Controller;
    use esp_radio::ble::controller::BleConnector;
    use log::{info, warn};
    use trouble_host::prelude::*;

    use super::{MAX_ADV_LEN, advertisement_data};
    use crate::config::BLE_DEVICE_NAME;

    type BleController = ExternalController<BleConnector<'static>, 20>;

    /// Brings up the BLE host and leaves a task advertising the device name.
    /// Failures are logged; the rest of the firmware does not depend on BLE.
    pub fn start_advertising(
        radio_init: &'static Controller<'static>,
        bt: esp_hal::peripherals::BT<'static>,
        spawner: Spawner,
    ) {
        info!("Initializing BLE...");
        let connector = match BleConnector::new(radio_init, bt, Default::default()) {
            Ok(connector) => connector,
            Err(e) => {
                warn!("BLE controller unavailable: {:?}", e);
                return;
            }
        };
        if spawner.spawn(beacon_task(ExternalController::new(connector))).is_err() {
            warn!("Failed to spawn BLE beacon task");
        }
    }

    #[embassy_executor::task]
    async fn beacon_task(controller: BleController) {
        let address = Address::random([0xff, 0x8f, 0x1a, 0x05, 0xe4, 0xff]);
        let mut resources: HostResources<DefaultPacketPool, 1, 1> = HostResources::new();
        let stack = trouble_host::new(controller, &mut resources).set_random_address(address);
        let Host {
            mut peripheral,
            mut runner,
            ..
        } = stack.build();

        let mut adv_data = [0u8; MAX_ADV_LEN];
        let len = match advertisement_data(BLE_DEVICE_NAME, &mut adv_data) {
            Ok(len) => len,
            Err(e) => {
                warn!("Bad BLE advertisement: {:?}", e);
                return;
            }
        };

        let advertise = async {
            let params = AdvertisementParameters::default();
            let advertisement = Advertisement::NonconnectableScannableUndirected {
                adv_data: &adv_data[..len],
                scan_data: &[],
            };
            match peripheral.advertise(&params, advertisement).await {
                Ok(_advertiser) => {
                    info!("BLE advertising started.");
                    core::future::pending::<()>().await;
                }
                Err(e) => warn!("BLE advertising failed: {:?}", e),
            }
        };

        let (result, _) = join(runner.run(), advertise).await;
        if let Err(e) = result {
            warn!("BLE host stopped: {:?}", e);
        }
    }
}
