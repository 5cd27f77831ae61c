//! WiFi and MQTT recovery plus the forever loop that pumps messages into the
//! command interpreter.
//!
//! Everything here is generic over the [`WifiLink`], [`Broker`] and clock
//! seams so the retry logic runs without a radio or real time.

use core::convert::Infallible;
use core::fmt::Debug;
use core::net::Ipv4Addr;

use embedded_hal::digital::OutputPin;
use embedded_hal_async::delay::DelayNs;
use log::{debug, error, info, warn};

use crate::client_id::ClientId;
use crate::command::Interpreter;
use crate::config::{
    MQTT_RETRY_DELAY_MS, SSID, WIFI_BEGIN_DELAY_MS, WIFI_MAX_RETRIES, WIFI_POLL_INTERVAL_MS,
};
use crate::lamp::Lamp;

/// Station-mode WiFi association.
#[allow(async_fn_in_trait)]
pub trait WifiLink {
    /// Starts associating with the configured network. Does not wait for it.
    async fn begin(&mut self);

    /// Associated and holding an IPv4 address.
    fn is_connected(&self) -> bool;

    fn local_ip(&self) -> Option<Ipv4Addr>;
}

/// An inbound PUBLISH.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Message<'a> {
    pub topic: &'a str,
    pub payload: &'a [u8],
}

/// A live MQTT session. Dropping it closes the connection.
#[allow(async_fn_in_trait)]
pub trait Session {
    type Error: Debug;

    async fn subscribe(&mut self, topic: &str) -> Result<(), Self::Error>;

    /// Pumps the connection once. `Ok(None)` means nothing arrived this time;
    /// an error means the session is gone.
    async fn next_message(&mut self) -> Result<Option<Message<'_>>, Self::Error>;
}

/// Opens MQTT sessions against the configured broker.
#[allow(async_fn_in_trait)]
pub trait Broker {
    /// The error code reported by the client.
    type Error: Debug;
    type Session<'a>: Session<Error = Self::Error>
    where
        Self: 'a;

    async fn connect(&mut self, client_id: ClientId) -> Result<Self::Session<'_>, Self::Error>;
}

pub trait Watchdog {
    fn feed(&mut self);
}

impl Watchdog for () {
    fn feed(&mut self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiError {
    /// The link never came up; the device has to restart.
    Timeout { attempts: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiStep {
    Connected,
    Wait(u32),
    Restart,
}

/// Retry bookkeeping for one WiFi connect sequence.
#[derive(Debug, Clone)]
pub struct WifiReconnect {
    retries: u32,
    max_retries: u32,
    poll_interval_ms: u32,
}

impl Default for WifiReconnect {
    fn default() -> Self {
        Self::new(WIFI_MAX_RETRIES, WIFI_POLL_INTERVAL_MS)
    }
}

impl WifiReconnect {
    pub const fn new(max_retries: u32, poll_interval_ms: u32) -> Self {
        WifiReconnect {
            retries: 0,
            max_retries,
            poll_interval_ms,
        }
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Feeds one status poll. Every miss counts; once the count passes
    /// `max_retries` the answer is [`WifiStep::Restart`].
    pub fn poll(&mut self, connected: bool) -> WifiStep {
        if connected {
            return WifiStep::Connected;
        }
        self.retries += 1;
        if self.retries > self.max_retries {
            WifiStep::Restart
        } else {
            WifiStep::Wait(self.poll_interval_ms)
        }
    }
}

/// Runs a full WiFi connect sequence: begin, then poll every 500 ms until the
/// link is up or the retry budget is spent.
pub async fn connect_wifi<W, D>(link: &mut W, delay: &mut D) -> Result<Ipv4Addr, WifiError>
where
    W: WifiLink,
    D: DelayNs,
{
    delay.delay_ms(WIFI_BEGIN_DELAY_MS).await;
    info!("Connecting to WiFi: {}", SSID);
    link.begin().await;

    let mut machine = WifiReconnect::default();
    loop {
        match machine.poll(link.is_connected()) {
            WifiStep::Connected => break,
            WifiStep::Wait(ms) => {
                debug!("WiFi not connected yet ({})", machine.retries());
                delay.delay_ms(ms).await;
            }
            WifiStep::Restart => {
                error!("WiFi connection failed. Restarting...");
                return Err(WifiError::Timeout {
                    attempts: machine.retries(),
                });
            }
        }
    }

    let ip = link.local_ip().unwrap_or(Ipv4Addr::UNSPECIFIED);
    info!("WiFi connected, IP address: {}", ip);
    Ok(ip)
}

/// Connects and subscribes. The subscription is repeated on every new
/// session since nothing persists broker side.
async fn open_session<'a, B: Broker>(
    broker: &'a mut B,
    client_id: ClientId,
    topic: &str,
) -> Result<B::Session<'a>, B::Error> {
    let mut session = broker.connect(client_id).await?;
    info!("MQTT connected");
    session.subscribe(topic).await?;
    info!("Subscribed to topic: {}", topic);
    Ok(session)
}

/// All connectivity state in one place: the WiFi link, the MQTT broker, the
/// clock used for retry waits, the entropy behind client ids and the watchdog.
pub struct Connectivity<W, B, D, R, G> {
    wifi: W,
    broker: B,
    delay: D,
    entropy: R,
    watchdog: G,
}

impl<W, B, D, R, G> Connectivity<W, B, D, R, G>
where
    W: WifiLink,
    B: Broker,
    D: DelayNs,
    R: FnMut() -> u32,
    G: Watchdog,
{
    pub fn new(wifi: W, broker: B, delay: D, entropy: R, watchdog: G) -> Self {
        Connectivity {
            wifi,
            broker,
            delay,
            entropy,
            watchdog,
        }
    }

    pub fn wifi(&self) -> &W {
        &self.wifi
    }

    pub fn delay(&self) -> &D {
        &self.delay
    }

    pub async fn connect_wifi(&mut self) -> Result<Ipv4Addr, WifiError> {
        self.watchdog.feed();
        connect_wifi(&mut self.wifi, &mut self.delay).await
    }

    /// The main loop. Each pass makes sure WiFi is up, then that an MQTT
    /// session exists, then pumps the session once.
    ///
    /// Only returns when WiFi cannot be recovered; the caller restarts the
    /// device. MQTT failures are retried every five seconds forever.
    pub async fn run<P: OutputPin>(
        &mut self,
        interpreter: &Interpreter<'_>,
        lamp: &mut Lamp<P>,
    ) -> Result<Infallible, WifiError> {
        let topic = interpreter.topic();
        'recover: loop {
            self.watchdog.feed();
            if !self.wifi.is_connected() {
                warn!("WiFi disconnected! Reconnecting...");
                self.connect_wifi().await?;
            }

            let mut session = loop {
                // An attempt is only made while WiFi is up.
                if !self.wifi.is_connected() {
                    continue 'recover;
                }
                self.watchdog.feed();
                let client_id = ClientId::from_random((self.entropy)());
                info!("Attempting MQTT connection as {}...", client_id);
                match open_session(&mut self.broker, client_id, topic).await {
                    Ok(session) => break session,
                    Err(e) => {
                        warn!(
                            "MQTT connection failed, rc={:?}, try again in {} seconds",
                            e,
                            MQTT_RETRY_DELAY_MS / 1000
                        );
                        self.delay.delay_ms(MQTT_RETRY_DELAY_MS).await;
                    }
                }
            };

            loop {
                self.watchdog.feed();
                if !self.wifi.is_connected() {
                    break;
                }
                match session.next_message().await {
                    Ok(Some(message)) => {
                        interpreter.handle(message.topic, message.payload, lamp);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!("MQTT session lost, rc={:?}", e);
                        break;
                    }
                }
            }
        }
    }
}
