use core::cell::RefCell;
use core::net::Ipv4Addr;

use embassy_futures::select::{Either, select};
use embassy_net::{IpAddress, Stack, dns::DnsQueryType, tcp::TcpSocket};
use embassy_time::{Duration, Instant, Timer};
use embedded_io_async::{ErrorType, Read, Write};

use log::{debug, info};

use rust_mqtt::{
    client::{
        client::MqttClient,
        client_config::{ClientConfig as MqttClientConfig, MqttVersion},
    },
    packet::v5::{publish_packet::QualityOfService::QoS0, reason_codes::ReasonCode},
    utils::rng_generator::CountingRng,
};

use crate::client_id::ClientId;
use crate::config::{MQTT_KEEP_ALIVE_SECS, MQTT_PORT, MQTT_SERVER, MQTT_SOCKET_TIMEOUT_SECS};
use crate::connectivity::{Broker, Message, Session};

pub const RX_BUFFER_SIZE: usize = 4096;
pub const TX_BUFFER_SIZE: usize = 4096;
pub const MQTT_BUFFER_SIZE: usize = 256;

/// How long one pump waits for an inbound packet.
const POLL_WINDOW: Duration = Duration::from_millis(500);

#[derive(Debug)]
pub enum Error {
    DnsResolveFailed,
    ConnectionFailed(embassy_net::tcp::ConnectError),
    Mqtt(ReasonCode),
}

/// Broker endpoint plus the socket and buffers every session borrows.
///
/// The TCP socket outlives sessions and is reconnected for each one, so the
/// pump can wait on it while the client holds a handle to the same socket.
pub struct Mqtt {
    stack: Stack<'static>,
    client_id: ClientId,
    socket: RefCell<TcpSocket<'static>>,
    read_buf: &'static mut [u8; MQTT_BUFFER_SIZE],
    write_buf: &'static mut [u8; MQTT_BUFFER_SIZE],
}

impl Mqtt {
    pub fn new(
        stack: Stack<'static>,
        rx_buf: &'static mut [u8; RX_BUFFER_SIZE],
        tx_buf: &'static mut [u8; TX_BUFFER_SIZE],
        read_buf: &'static mut [u8; MQTT_BUFFER_SIZE],
        write_buf: &'static mut [u8; MQTT_BUFFER_SIZE],
    ) -> Self {
        Mqtt {
            stack,
            client_id: ClientId::default(),
            socket: RefCell::new(TcpSocket::new(stack, rx_buf, tx_buf)),
            read_buf,
            write_buf,
        }
    }

    async fn resolve(&self) -> Result<IpAddress, Error> {
        if let Ok(addr) = MQTT_SERVER.parse::<Ipv4Addr>() {
            return Ok(IpAddress::Ipv4(addr));
        }
        self.stack
            .dns_query(MQTT_SERVER, DnsQueryType::A)
            .await
            .map_err(|_| Error::DnsResolveFailed)?
            .first()
            .copied()
            .ok_or(Error::DnsResolveFailed)
    }
}

/// Client-side handle on the broker socket.
///
/// Only the connectivity task touches the socket and it does so one
/// operation at a time, so a borrow is never held by two futures at once.
pub struct SharedSocket<'a>(&'a RefCell<TcpSocket<'static>>);

impl ErrorType for SharedSocket<'_> {
    type Error = embassy_net::tcp::Error;
}

#[allow(clippy::await_holding_refcell_ref)]
impl Read for SharedSocket<'_> {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        self.0.borrow_mut().read(buf).await
    }
}

#[allow(clippy::await_holding_refcell_ref)]
impl Write for SharedSocket<'_> {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.0.borrow_mut().write(buf).await
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        self.0.borrow_mut().flush().await
    }
}

impl Broker for Mqtt {
    type Error = Error;
    type Session<'a>
        = MqttSession<'a>
    where
        Self: 'a;

    #[allow(clippy::await_holding_refcell_ref)]
    async fn connect(&mut self, client_id: ClientId) -> Result<MqttSession<'_>, Error> {
        let addr = self.resolve().await?;
        self.client_id = client_id;

        let Mqtt {
            client_id,
            socket,
            read_buf,
            write_buf,
            ..
        } = self;
        let socket = &*socket;

        {
            let mut socket = socket.borrow_mut();
            // Whatever the previous session left open goes first.
            socket.abort();
            let _ = socket.flush().await;
            socket.set_timeout(Some(Duration::from_secs(MQTT_SOCKET_TIMEOUT_SECS)));
            debug!("Opening TCP connection to {}:{}", addr, MQTT_PORT);
            socket
                .connect((addr, MQTT_PORT))
                .await
                .map_err(Error::ConnectionFailed)?;
        }

        let mut config = MqttClientConfig::new(MqttVersion::MQTTv5, CountingRng(20000));
        config.add_max_subscribe_qos(QoS0);
        config.add_client_id(client_id.as_str());
        config.max_packet_size = MQTT_BUFFER_SIZE as u32;
        config.keep_alive = MQTT_KEEP_ALIVE_SECS;

        let writebuf_len = write_buf.len();
        let readbuf_len = read_buf.len();
        let mut client = MqttClient::<_, 5, _>::new(
            SharedSocket(socket),
            &mut write_buf[..],
            writebuf_len,
            &mut read_buf[..],
            readbuf_len,
            config,
        );

        client.connect_to_broker().await.map_err(Error::Mqtt)?;
        info!("Connected to MQTT broker {}", MQTT_SERVER);

        Ok(MqttSession {
            socket,
            client,
            last_activity: Instant::now(),
        })
    }
}

pub struct MqttSession<'a> {
    socket: &'a RefCell<TcpSocket<'static>>,
    client: MqttClient<'a, SharedSocket<'a>, 5, CountingRng>,
    last_activity: Instant,
}

impl Session for MqttSession<'_> {
    type Error = Error;

    async fn subscribe(&mut self, topic: &str) -> Result<(), Error> {
        self.client
            .subscribe_to_topic(topic)
            .await
            .map_err(Error::Mqtt)?;
        self.last_activity = Instant::now();
        Ok(())
    }

    /// Waits up to [`POLL_WINDOW`] for the first byte of a packet. Only the
    /// readiness wait is cut short by the window; once a packet has started
    /// it is read to the end, bounded by the socket timeout.
    async fn next_message(&mut self) -> Result<Option<Message<'_>>, Error> {
        let keep_alive = Duration::from_secs(u64::from(MQTT_KEEP_ALIVE_SECS));
        if self.last_activity.elapsed() >= keep_alive / 2 {
            self.client.send_ping().await.map_err(Error::Mqtt)?;
            self.last_activity = Instant::now();
        }

        let socket = self.socket;
        let ready = async {
            socket.borrow().wait_read_ready().await;
        };
        if let Either::Second(()) = select(ready, Timer::after(POLL_WINDOW)).await {
            return Ok(None);
        }

        let (topic, payload) = self.client.receive_message().await.map_err(Error::Mqtt)?;
        self.last_activity = Instant::now();
        Ok(Some(Message { topic, payload }))
    }
}
