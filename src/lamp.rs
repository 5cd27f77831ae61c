use embedded_hal::digital::{OutputPin, PinState};
use log::{info, warn};

/// The lamp relay: one active-high digital output.
pub struct Lamp<P> {
    pin: P,
    on: bool,
}

impl<P: OutputPin> Lamp<P> {
    /// Takes ownership of the pin and drives it low.
    pub fn new(pin: P) -> Self {
        let mut lamp = Lamp { pin, on: false };
        lamp.set(false);
        info!("Lamp initialized to OFF");
        lamp
    }

    pub fn set(&mut self, on: bool) {
        if let Err(e) = self.pin.set_state(PinState::from(on)) {
            warn!("Failed to drive lamp pin: {:?}", e);
        }
        self.on = on;
    }

    pub fn is_on(&self) -> bool {
        self.on
    }
}
