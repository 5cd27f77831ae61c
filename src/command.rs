//! Maps inbound MQTT messages onto the lamp.

use embedded_hal::digital::OutputPin;
use log::{info, warn};

use crate::lamp::Lamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    On,
    Off,
}

impl Command {
    /// Exact, case-sensitive match.
    pub fn parse(message: &str) -> Option<Self> {
        match message {
            "on" => Some(Command::On),
            "off" => Some(Command::Off),
            _ => None,
        }
    }
}

/// What the interpreter did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Switched(bool),
    UnknownCommand,
    UnknownTopic,
}

/// Command interpreter bound to a single topic.
pub struct Interpreter<'a> {
    topic: &'a str,
}

impl<'a> Interpreter<'a> {
    pub const fn new(topic: &'a str) -> Self {
        Interpreter { topic }
    }

    pub fn topic(&self) -> &'a str {
        self.topic
    }

    pub fn handle<P: OutputPin>(&self, topic: &str, payload: &[u8], lamp: &mut Lamp<P>) -> Outcome {
        let message = core::str::from_utf8(payload);
        match message {
            Ok(message) => info!("MQTT message received [{}]: {}", topic, message),
            Err(_) => info!("MQTT message received [{}]: {:?}", topic, payload),
        }

        if topic != self.topic {
            warn!("Unknown topic: {}", topic);
            return Outcome::UnknownTopic;
        }

        match message.ok().and_then(Command::parse) {
            Some(command) => {
                let on = command == Command::On;
                lamp.set(on);
                info!("Lamp turned {}", if on { "ON" } else { "OFF" });
                Outcome::Switched(on)
            }
            None => {
                warn!("Unknown command: {:?}", message.unwrap_or("<not utf-8>"));
                Outcome::UnknownCommand
            }
        }
    }
}
