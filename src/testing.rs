//! Host-side stand-ins for the pin, the clock, the radio and the broker.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::convert::Infallible;
use std::net::Ipv4Addr;
use std::rc::Rc;

use embedded_hal::digital::{ErrorType, OutputPin};
use embedded_hal_async::delay::DelayNs;

use crate::client_id::ClientId;
use crate::connectivity::{Broker, Message, Session, Watchdog, WifiLink};

/// Output pin that records every level written to it.
#[derive(Clone, Default)]
pub struct FakePin {
    levels: Rc<RefCell<Vec<bool>>>,
}

impl FakePin {
    pub fn levels(&self) -> Vec<bool> {
        self.levels.borrow().clone()
    }

    pub fn level(&self) -> Option<bool> {
        self.levels.borrow().last().copied()
    }
}

impl ErrorType for FakePin {
    type Error = Infallible;
}

impl OutputPin for FakePin {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.levels.borrow_mut().push(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.levels.borrow_mut().push(true);
        Ok(())
    }
}

/// Clock that returns immediately and remembers what it was asked to wait.
#[derive(Default)]
pub struct FakeDelay {
    pub waits_ms: Vec<u32>,
}

impl FakeDelay {
    pub fn total_ms(&self) -> u64 {
        self.waits_ms.iter().map(|&ms| u64::from(ms)).sum()
    }
}

impl DelayNs for FakeDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.waits_ms.push(ns / 1_000_000);
    }

    async fn delay_ms(&mut self, ms: u32) {
        self.waits_ms.push(ms);
    }
}

/// WiFi link that associates a fixed number of times, each after a fixed
/// number of failed status polls. Once the joins are used up it never comes
/// back.
pub struct FakeWifi {
    link: Rc<Cell<bool>>,
    joins_left: usize,
    polls_before_up: usize,
    pending: Cell<Option<usize>>,
    begins: usize,
}

impl FakeWifi {
    pub const IP: Ipv4Addr = Ipv4Addr::new(192, 168, 137, 50);

    pub fn new(joins: usize, polls_before_up: usize) -> Self {
        FakeWifi {
            link: Rc::new(Cell::new(false)),
            joins_left: joins,
            polls_before_up,
            pending: Cell::new(None),
            begins: 0,
        }
    }

    pub fn begins(&self) -> usize {
        self.begins
    }
}

impl WifiLink for FakeWifi {
    async fn begin(&mut self) {
        self.begins += 1;
        if self.joins_left > 0 {
            self.joins_left -= 1;
            self.pending.set(Some(self.polls_before_up));
        } else {
            self.pending.set(None);
        }
    }

    fn is_connected(&self) -> bool {
        if self.link.get() {
            return true;
        }
        match self.pending.get() {
            Some(0) => {
                self.pending.set(None);
                self.link.set(true);
                true
            }
            Some(n) => {
                self.pending.set(Some(n - 1));
                false
            }
            None => false,
        }
    }

    fn local_ip(&self) -> Option<Ipv4Addr> {
        self.link.get().then_some(Self::IP)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Connect(String),
    Subscribe(String),
    Deliver(String),
    Feed,
}

#[derive(Clone, Default)]
pub struct Events(Rc<RefCell<Vec<Event>>>);

impl Events {
    fn push(&self, event: Event) {
        self.0.borrow_mut().push(event);
    }

    pub fn take(&self) -> Vec<Event> {
        self.0.take()
    }
}

/// Watchdog that counts feeds and, when given an event log, records each
/// feed in order with the broker traffic.
#[derive(Clone, Default)]
pub struct FakeWatchdog {
    feeds: Rc<Cell<usize>>,
    events: Option<Events>,
}

impl FakeWatchdog {
    pub fn logging_to(events: &Events) -> Self {
        FakeWatchdog {
            feeds: Rc::default(),
            events: Some(events.clone()),
        }
    }

    pub fn feeds(&self) -> usize {
        self.feeds.get()
    }
}

impl Watchdog for FakeWatchdog {
    fn feed(&mut self) {
        self.feeds.set(self.feeds.get() + 1);
        if let Some(events) = &self.events {
            events.push(Event::Feed);
        }
    }
}

type Inbound = Option<(String, Vec<u8>)>;

/// What the broker does on one connect attempt.
pub enum Script {
    Refuse(u8),
    SubscribeFails,
    /// Connects and then yields these pump results in order (`None` is an
    /// idle pump). When they run out the session fails, or the WiFi link
    /// drops if `drop_wifi` is set.
    Session {
        inbound: VecDeque<Inbound>,
        drop_wifi: bool,
    },
}

impl Script {
    pub fn session<'a>(inbound: impl IntoIterator<Item = Option<(&'a str, &'a str)>>) -> Self {
        Script::Session {
            inbound: inbound
                .into_iter()
                .map(|m| m.map(|(topic, payload)| (topic.to_owned(), payload.as_bytes().to_vec())))
                .collect(),
            drop_wifi: false,
        }
    }

    pub fn then_drop_wifi(mut self) -> Self {
        if let Script::Session { drop_wifi, .. } = &mut self {
            *drop_wifi = true;
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeError {
    Refused(u8),
    SubscribeRejected,
    Closed,
}

/// Broker that plays back one [`Script`] per connect attempt. With nothing
/// left to play it refuses and takes the WiFi link down, which ends the
/// main loop through the WiFi restart path.
pub struct FakeBroker {
    link: Rc<Cell<bool>>,
    scripts: VecDeque<Script>,
    events: Events,
}

impl FakeBroker {
    pub fn new(wifi: &FakeWifi, scripts: impl IntoIterator<Item = Script>) -> Self {
        FakeBroker {
            link: wifi.link.clone(),
            scripts: scripts.into_iter().collect(),
            events: Events::default(),
        }
    }

    pub fn events(&self) -> Events {
        self.events.clone()
    }
}

impl Broker for FakeBroker {
    type Error = FakeError;
    type Session<'a>
        = FakeSession
    where
        Self: 'a;

    async fn connect(&mut self, client_id: ClientId) -> Result<Self::Session<'_>, FakeError> {
        self.events.push(Event::Connect(client_id.as_str().to_owned()));
        let session = |inbound, drop_wifi, subscribe_fails| FakeSession {
            link: self.link.clone(),
            events: self.events.clone(),
            inbound,
            current: None,
            drop_wifi,
            subscribe_fails,
        };
        match self.scripts.pop_front() {
            Some(Script::Refuse(rc)) => Err(FakeError::Refused(rc)),
            Some(Script::SubscribeFails) => Ok(session(VecDeque::new(), false, true)),
            Some(Script::Session { inbound, drop_wifi }) => Ok(session(inbound, drop_wifi, false)),
            None => {
                self.link.set(false);
                Err(FakeError::Refused(3))
            }
        }
    }
}

pub struct FakeSession {
    link: Rc<Cell<bool>>,
    events: Events,
    inbound: VecDeque<Inbound>,
    current: Option<(String, Vec<u8>)>,
    drop_wifi: bool,
    subscribe_fails: bool,
}

impl Session for FakeSession {
    type Error = FakeError;

    async fn subscribe(&mut self, topic: &str) -> Result<(), FakeError> {
        self.events.push(Event::Subscribe(topic.to_owned()));
        if self.subscribe_fails {
            Err(FakeError::SubscribeRejected)
        } else {
            Ok(())
        }
    }

    async fn next_message(&mut self) -> Result<Option<Message<'_>>, FakeError> {
        match self.inbound.pop_front() {
            Some(Some((topic, payload))) => {
                self.events.push(Event::Deliver(topic.clone()));
                let (topic, payload) = &*self.current.insert((topic, payload));
                Ok(Some(Message { topic, payload }))
            }
            Some(None) => Ok(None),
            None if self.drop_wifi => {
                self.link.set(false);
                Ok(None)
            }
            None => Err(FakeError::Closed),
        }
    }
}
