use core::fmt::{self, Write};

use heapless::String;

use crate::config::CLIENT_ID_PREFIX;

pub const CLIENT_ID_LEN: usize = 24;

/// MQTT client identifier, regenerated for every connect attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientId(String<CLIENT_ID_LEN>);

impl ClientId {
    /// `ESP32Client-` followed by `random % 0xffff` in lower-case hex.
    pub fn from_random(random: u32) -> Self {
        let mut id = String::new();
        let written = write!(id, "{}{:x}", CLIENT_ID_PREFIX, random % 0xffff);
        debug_assert!(written.is_ok(), "prefix plus four hex digits fits");
        ClientId(id)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
