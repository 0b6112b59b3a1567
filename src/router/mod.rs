//! The event router: the system service that connects numbered client/port
//! pairs and carries timestamped events between them.
//!
//! This module provides:
//! - addressing and port metadata types ([`Addr`], [`PortInfo`], [`PortCaps`])
//! - the router's native event representation ([`SeqEvent`])
//! - the [`Router`] and [`Session`] traits every backend implements
//!
//! The concrete backends are:
//! - [`mock::MockRouter`], an in-memory router used by the tests
//! - `alsa::AlsaRouter`, the ALSA sequencer (feature `alsa`)
//!
#[cfg(feature = "alsa")]
pub mod alsa;
pub mod mock;

use std::fmt;
use std::ops::BitOr;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

#[cfg(feature = "alsa")]
pub use self::alsa::AlsaRouter;
pub use mock::MockRouter;

pub type ClientId = i32;
pub type PortId = i32;
pub type QueueId = i32;

/// Seeds client and port iteration ("query all").
pub const QUERY_ALL: i32 = -1;

/// Queue a freshly encoded event carries before it is bound to a real queue.
pub const DEFAULT_QUEUE: QueueId = 0;

/// A client/port pair inside the router's namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Addr {
    pub client: ClientId,
    pub port: PortId,
}

impl Addr {
    pub const fn new(client: ClientId, port: PortId) -> Self {
        Self { client, port }
    }
}

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.client, self.port)
    }
}

impl FromStr for Addr {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (client, port) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| format!("expected CLIENT:PORT, got '{}'", s))?;
        let client = client
            .parse::<ClientId>()
            .map_err(|e| format!("invalid client '{}': {}", client, e))?;
        let port = port
            .parse::<PortId>()
            .map_err(|e| format!("invalid port '{}': {}", port, e))?;
        Ok(Addr { client, port })
    }
}

/// Port capability bits, numerically identical to `SND_SEQ_PORT_CAP_*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PortCaps(u32);

impl PortCaps {
    pub const NONE: PortCaps = PortCaps(0);
    pub const READ: PortCaps = PortCaps(1 << 0);
    pub const WRITE: PortCaps = PortCaps(1 << 1);
    pub const SYNC_READ: PortCaps = PortCaps(1 << 2);
    pub const SYNC_WRITE: PortCaps = PortCaps(1 << 3);
    pub const DUPLEX: PortCaps = PortCaps(1 << 4);
    pub const SUBS_READ: PortCaps = PortCaps(1 << 5);
    pub const SUBS_WRITE: PortCaps = PortCaps(1 << 6);
    pub const NO_EXPORT: PortCaps = PortCaps(1 << 7);

    pub const fn from_bits(bits: u32) -> Self {
        PortCaps(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: PortCaps) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: PortCaps) -> bool {
        self.0 & other.0 != 0
    }

    /// Other clients can read events from this port.
    pub const fn is_readable(self) -> bool {
        self.intersects(PortCaps(Self::READ.0 | Self::SUBS_READ.0))
    }

    /// Other clients can write events to this port.
    pub const fn is_writable(self) -> bool {
        self.intersects(PortCaps(Self::WRITE.0 | Self::SUBS_WRITE.0))
    }
}

impl BitOr for PortCaps {
    type Output = PortCaps;

    fn bitor(self, rhs: PortCaps) -> PortCaps {
        PortCaps(self.0 | rhs.0)
    }
}

/// Port type bits, numerically identical to `SND_SEQ_PORT_TYPE_*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PortType(u32);

impl PortType {
    pub const SPECIFIC: PortType = PortType(1 << 0);
    pub const MIDI_GENERIC: PortType = PortType(1 << 1);
    pub const SYNTH: PortType = PortType(1 << 10);
    pub const HARDWARE: PortType = PortType(1 << 16);
    pub const SOFTWARE: PortType = PortType(1 << 17);
    pub const SYNTHESIZER: PortType = PortType(1 << 18);
    pub const PORT: PortType = PortType(1 << 19);
    pub const APPLICATION: PortType = PortType(1 << 20);

    pub const fn from_bits(bits: u32) -> Self {
        PortType(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: PortType) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for PortType {
    type Output = PortType;

    fn bitor(self, rhs: PortType) -> PortType {
        PortType(self.0 | rhs.0)
    }
}

/// Metadata the router keeps about one port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    pub addr: Addr,
    pub name: String,
    pub caps: PortCaps,
    pub port_type: PortType,
}

/// Which streams a session is opened for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
    Duplex,
}

/// How a port stamps the events it receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamping {
    pub queue: QueueId,
    /// Real (wall-clock) time instead of ticks.
    pub real_time: bool,
}

/// Where an event is headed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    /// Every port subscribed to the source port.
    Subscribers,
    Port(Addr),
}

/// Whether an event bypasses the timestamping queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventQueue {
    Direct,
    Scheduled(QueueId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timestamp {
    Real(Duration),
    Tick(u32),
}

impl Timestamp {
    /// Seconds as a real number. Tick stamps carry no wall-clock meaning and
    /// are reported as the raw tick count.
    pub fn as_secs_f64(&self) -> f64 {
        match self {
            Timestamp::Real(time) => time.as_secs() as f64 + f64::from(time.subsec_nanos()) / 1e9,
            Timestamp::Tick(tick) => f64::from(*tick),
        }
    }
}

/// Payload of a router event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    NoteOff { channel: u8, note: u8, velocity: u8 },
    NoteOn { channel: u8, note: u8, velocity: u8 },
    KeyPressure { channel: u8, note: u8, pressure: u8 },
    Controller { channel: u8, param: u8, value: u8 },
    ProgramChange { channel: u8, program: u8 },
    ChannelPressure { channel: u8, pressure: u8 },
    /// Centered bend, -8192..=8191.
    PitchBend { channel: u8, value: i16 },
    QuarterFrame(u8),
    SongPosition(u16),
    SongSelect(u8),
    TuneRequest,
    Clock,
    Tick,
    Start,
    Continue,
    Stop,
    Sensing,
    Reset,
    /// Raw system exclusive bytes, including the framing 0xF0/0xF7 when present.
    Sysex(Vec<u8>),
    Echo,
    /// A router-internal event type with no MIDI byte representation.
    Unsupported(i32),
}

/// The router's structured event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeqEvent {
    pub kind: EventKind,
    pub source: Addr,
    pub dest: Destination,
    pub queue: EventQueue,
    pub time: Timestamp,
}

impl SeqEvent {
    /// An event as a zeroed router event would look: no source or destination,
    /// scheduled on the default queue at tick 0.
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            source: Addr::default(),
            dest: Destination::Port(Addr::default()),
            queue: EventQueue::Scheduled(DEFAULT_QUEUE),
            time: Timestamp::Tick(0),
        }
    }

    pub fn is_direct(&self) -> bool {
        self.queue == EventQueue::Direct
    }

    pub fn set_source(&mut self, port: PortId) {
        self.source.port = port;
    }

    pub fn set_subs(&mut self) {
        self.dest = Destination::Subscribers;
    }
}

/// Failure reported by a router backend, carrying the router's own text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouterError {
    #[error("cannot open router: {0}")]
    Open(String),
    #[error("no such port {addr}: {reason}")]
    NoSuchPort { addr: Addr, reason: String },
    #[error("query failed: {0}")]
    Query(String),
    #[error("queue operation failed: {0}")]
    Queue(String),
    #[error("port operation failed: {0}")]
    Port(String),
    #[error("subscription {sender} -> {dest} failed: {reason}")]
    Subscribe {
        sender: Addr,
        dest: Addr,
        reason: String,
    },
    #[error("output failed: {0}")]
    Output(String),
    #[error("input failed: {0}")]
    Input(String),
    #[error("input overrun")]
    Overrun,
    #[error("operation would block")]
    WouldBlock,
}

/// Opens sessions on one router.
pub trait Router {
    type Session: Session;

    fn open(&self, direction: Direction, nonblock: bool) -> Result<Self::Session, RouterError>;
}

/// One open handle on the router. Dropping it closes the handle and releases
/// every port, queue and subscription created through it.
pub trait Session {
    /// Client id the router assigned to this session.
    fn client_id(&self) -> Result<ClientId, RouterError>;

    fn port_info(&self, addr: Addr) -> Result<PortInfo, RouterError>;

    /// First client with an id greater than `after`; `Ok(None)` ends iteration.
    fn next_client(&self, after: ClientId) -> Result<Option<ClientId>, RouterError>;

    /// First port of `client` with an id greater than `after`.
    fn next_port(&self, client: ClientId, after: PortId) -> Result<Option<PortInfo>, RouterError>;

    fn alloc_queue(&mut self) -> Result<QueueId, RouterError>;

    fn create_port(
        &mut self,
        name: &str,
        caps: PortCaps,
        port_type: PortType,
    ) -> Result<PortId, RouterError>;

    fn subscribe(&mut self, sender: Addr, dest: Addr) -> Result<(), RouterError>;

    fn unsubscribe(&mut self, sender: Addr, dest: Addr) -> Result<(), RouterError>;

    fn set_port_timestamping(
        &mut self,
        port: PortId,
        stamping: Timestamping,
    ) -> Result<(), RouterError>;

    fn start_queue(&mut self, queue: QueueId) -> Result<(), RouterError>;

    /// Current real time of a running queue.
    fn queue_time(&self, queue: QueueId) -> Result<Duration, RouterError>;

    fn drain_output(&mut self) -> Result<(), RouterError>;

    /// Hands one event to the router without local buffering.
    fn output_direct(&mut self, event: &SeqEvent) -> Result<(), RouterError>;

    /// Number of events waiting; with `fetch` the transport is read first.
    fn input_pending(&mut self, fetch: bool) -> Result<usize, RouterError>;

    /// Dequeues one event. [`RouterError::Overrun`] reports that events were
    /// dropped before they could be read; the next call resumes normally.
    fn event_input(&mut self) -> Result<SeqEvent, RouterError>;

    /// Subscribes `port` of this session to receive from `source`.
    fn connect_from(&mut self, port: PortId, source: Addr) -> Result<(), RouterError> {
        let me = Addr::new(self.client_id()?, port);
        self.subscribe(source, me)
    }

    /// Subscribes `dest` to receive what `port` of this session emits.
    fn connect_to(&mut self, port: PortId, dest: Addr) -> Result<(), RouterError> {
        let me = Addr::new(self.client_id()?, port);
        self.subscribe(me, dest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_addr_parse_and_display() {
        let addr: Addr = "128:0".parse().unwrap();
        assert_eq!(addr, Addr::new(128, 0));
        assert_eq!(addr.to_string(), "128:0");
        assert_eq!(" 20:1 ".parse::<Addr>().unwrap(), Addr::new(20, 1));
    }

    #[test]
    fn test_addr_parse_rejects_garbage() {
        assert!("128".parse::<Addr>().is_err());
        assert!("a:0".parse::<Addr>().is_err());
        assert!("1:b".parse::<Addr>().is_err());
    }

    #[test]
    fn test_port_caps_direction() {
        assert!(PortCaps::SUBS_READ.is_readable());
        assert!(!PortCaps::SUBS_READ.is_writable());
        assert!((PortCaps::WRITE | PortCaps::SUBS_WRITE).is_writable());
        assert!(!PortCaps::NO_EXPORT.is_readable());
        assert!((PortCaps::READ | PortCaps::WRITE).contains(PortCaps::READ));
    }

    #[test]
    fn test_timestamp_seconds() {
        let ts = Timestamp::Real(Duration::new(2, 500_000_000));
        assert!((ts.as_secs_f64() - 2.5).abs() < 1e-9);
        assert_eq!(Timestamp::Tick(7).as_secs_f64(), 7.0);
    }
}
