//! In-memory router with the same client/port/queue/subscription model as the
//! ALSA sequencer. Used by the test suite and anywhere a real sequencer is not
//! available.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::debug;

use super::{
    Addr, ClientId, Destination, Direction, EventKind, EventQueue, PortCaps, PortId, PortInfo,
    PortType, QueueId, Router, RouterError, SeqEvent, Session, Timestamp, Timestamping,
};

/// First id handed to clients added with [`MockRouter::add_client`].
const FIRST_EXTERNAL_CLIENT: ClientId = 20;
/// First id handed to sessions, as the kernel does for user clients.
const FIRST_SESSION_CLIENT: ClientId = 128;
const DEFAULT_FIFO_CAPACITY: usize = 200;

const ENOENT: &str = "No such file or directory";
const EPERM: &str = "Operation not permitted";
const EBUSY: &str = "Device or resource busy";
const EINVAL: &str = "Invalid argument";
const EBADF: &str = "Bad file descriptor";

/// An operation the next matching call should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Open,
    PortInfo,
    AllocQueue,
    CreatePort,
    Subscribe,
    Timestamping,
    StartQueue,
    QueueTime,
    Drain,
    Output,
    Input,
}

/// Counters for what sessions have done so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterStats {
    pub opens: usize,
    pub closes: usize,
    pub queues_allocated: usize,
    pub queues_started: usize,
    pub ports_created: usize,
    pub events_output: usize,
    pub input_polls: usize,
}

#[derive(Debug)]
struct MockPort {
    info: PortInfo,
    stamping: Option<Timestamping>,
    /// Events delivered to a port of a non-session client.
    received: Vec<SeqEvent>,
}

#[derive(Debug)]
struct MockClient {
    name: String,
    ports: BTreeMap<PortId, MockPort>,
    session: bool,
    inbox: VecDeque<SeqEvent>,
    overrun: bool,
}

impl MockClient {
    fn new(name: &str, session: bool) -> Self {
        Self {
            name: name.to_string(),
            ports: BTreeMap::new(),
            session,
            inbox: VecDeque::new(),
            overrun: false,
        }
    }

    fn free_port(&self) -> PortId {
        (0..)
            .find(|id| !self.ports.contains_key(id))
            .unwrap_or_default()
    }
}

#[derive(Debug)]
struct MockQueue {
    owner: ClientId,
    started: Option<Instant>,
}

#[derive(Debug)]
struct MockState {
    clients: BTreeMap<ClientId, MockClient>,
    subscriptions: BTreeSet<(Addr, Addr)>,
    queues: BTreeMap<QueueId, MockQueue>,
    next_external: ClientId,
    next_session: ClientId,
    next_queue: QueueId,
    fifo_capacity: usize,
    faults: Vec<Fault>,
    query_budget: Option<usize>,
    stats: RouterStats,
}

impl MockState {
    fn take_fault(&mut self, fault: Fault) -> bool {
        match self.faults.iter().position(|f| *f == fault) {
            Some(index) => {
                self.faults.remove(index);
                true
            }
            None => false,
        }
    }

    fn spend_query(&mut self) -> Result<(), RouterError> {
        match self.query_budget.as_mut() {
            Some(0) => Err(RouterError::Query(ENOENT.to_string())),
            Some(budget) => {
                *budget -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn port(&self, addr: Addr) -> Option<&MockPort> {
        self.clients.get(&addr.client)?.ports.get(&addr.port)
    }

    fn queue_elapsed(&self, queue: QueueId) -> Option<Duration> {
        self.queues
            .get(&queue)
            .and_then(|q| q.started)
            .map(|started| started.elapsed())
    }

    /// Delivers `event` to every target and returns how many received it.
    fn deliver(&mut self, event: &SeqEvent) -> usize {
        let targets: Vec<Addr> = match event.dest {
            Destination::Subscribers => self
                .subscriptions
                .iter()
                .filter(|(sender, _)| *sender == event.source)
                .map(|(_, dest)| *dest)
                .collect(),
            Destination::Port(dest) => vec![dest],
        };

        let mut delivered = 0;
        for target in targets {
            let Some(stamping) = self.port(target).map(|port| port.stamping) else {
                continue;
            };
            let mut copy = event.clone();
            copy.dest = Destination::Port(target);
            if let Some(stamping) = stamping {
                if let Some(elapsed) = self.queue_elapsed(stamping.queue) {
                    copy.queue = EventQueue::Scheduled(stamping.queue);
                    copy.time = if stamping.real_time {
                        Timestamp::Real(elapsed)
                    } else {
                        Timestamp::Tick(0)
                    };
                }
            }

            let capacity = self.fifo_capacity;
            let Some(client) = self.clients.get_mut(&target.client) else {
                continue;
            };
            if client.session {
                if client.inbox.len() >= capacity {
                    client.overrun = true;
                    continue;
                }
                client.inbox.push_back(copy);
            } else if let Some(port) = client.ports.get_mut(&target.port) {
                port.received.push(copy);
            }
            delivered += 1;
        }
        delivered
    }
}

/// Shared handle on one in-memory router. Clones see the same state.
#[derive(Debug, Clone)]
pub struct MockRouter {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRouter {
    /// An empty router: no clients at all.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                clients: BTreeMap::new(),
                subscriptions: BTreeSet::new(),
                queues: BTreeMap::new(),
                next_external: FIRST_EXTERNAL_CLIENT,
                next_session: FIRST_SESSION_CLIENT,
                next_queue: 0,
                fifo_capacity: DEFAULT_FIFO_CAPACITY,
                faults: Vec::new(),
                query_budget: None,
                stats: RouterStats::default(),
            })),
        }
    }

    /// A router populated like a freshly booted system: the timer and
    /// announce ports of client 0 and the "Midi Through" client 14.
    pub fn with_system() -> Self {
        let router = Self::new();
        {
            let mut state = router.lock();
            let mut system = MockClient::new("System", false);
            for (id, name) in [(0, "Timer"), (1, "Announce")] {
                system.ports.insert(
                    id,
                    MockPort {
                        info: PortInfo {
                            addr: Addr::new(0, id),
                            name: name.to_string(),
                            caps: PortCaps::READ | PortCaps::SUBS_READ,
                            port_type: PortType::default(),
                        },
                        stamping: None,
                        received: Vec::new(),
                    },
                );
            }
            state.clients.insert(0, system);

            let mut through = MockClient::new("Midi Through", false);
            through.ports.insert(
                0,
                MockPort {
                    info: PortInfo {
                        addr: Addr::new(14, 0),
                        name: "Midi Through Port-0".to_string(),
                        caps: PortCaps::READ
                            | PortCaps::SUBS_READ
                            | PortCaps::WRITE
                            | PortCaps::SUBS_WRITE,
                        port_type: PortType::MIDI_GENERIC | PortType::SOFTWARE,
                    },
                    stamping: None,
                    received: Vec::new(),
                },
            );
            state.clients.insert(14, through);
        }
        router
    }

    /// Sets how many events a session's input FIFO holds before overrunning.
    pub fn with_fifo_capacity(self, capacity: usize) -> Self {
        self.lock().fifo_capacity = capacity;
        self
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add_client(&self, name: &str) -> ClientId {
        let mut state = self.lock();
        let id = state.next_external;
        state.next_external += 1;
        state.clients.insert(id, MockClient::new(name, false));
        id
    }

    /// Adds a port to an existing client and returns its address.
    pub fn add_port(&self, client: ClientId, name: &str, caps: PortCaps) -> Addr {
        let mut state = self.lock();
        let entry = state
            .clients
            .entry(client)
            .or_insert_with(|| MockClient::new(&format!("Client-{}", client), false));
        let addr = Addr::new(client, entry.free_port());
        entry.ports.insert(
            addr.port,
            MockPort {
                info: PortInfo {
                    addr,
                    name: name.to_string(),
                    caps,
                    port_type: PortType::MIDI_GENERIC | PortType::HARDWARE,
                },
                stamping: None,
                received: Vec::new(),
            },
        );
        addr
    }

    /// Unplugs a client together with its ports and subscriptions.
    pub fn remove_client(&self, client: ClientId) {
        let mut state = self.lock();
        state.clients.remove(&client);
        state
            .subscriptions
            .retain(|(sender, dest)| sender.client != client && dest.client != client);
    }

    pub fn client_name(&self, client: ClientId) -> Option<String> {
        self.lock().clients.get(&client).map(|c| c.name.clone())
    }

    /// Emits an event from port `from` to everything subscribed to it.
    /// Returns the number of ports that received it.
    pub fn inject(&self, from: Addr, kind: EventKind) -> usize {
        let mut event = SeqEvent::new(kind);
        event.source = from;
        event.set_subs();
        event.queue = EventQueue::Direct;
        self.lock().deliver(&event)
    }

    /// Drains the events delivered so far to a port of a non-session client.
    pub fn take_received(&self, addr: Addr) -> Vec<SeqEvent> {
        let mut state = self.lock();
        state
            .clients
            .get_mut(&addr.client)
            .and_then(|c| c.ports.get_mut(&addr.port))
            .map(|p| std::mem::take(&mut p.received))
            .unwrap_or_default()
    }

    pub fn is_subscribed(&self, sender: Addr, dest: Addr) -> bool {
        self.lock().subscriptions.contains(&(sender, dest))
    }

    pub fn port_stamping(&self, addr: Addr) -> Option<Timestamping> {
        self.lock().port(addr).and_then(|p| p.stamping)
    }

    /// Queues currently allocated by any session.
    pub fn queue_count(&self) -> usize {
        self.lock().queues.len()
    }

    /// Makes the next call of the given kind fail.
    pub fn fail_next(&self, fault: Fault) {
        self.lock().faults.push(fault);
    }

    /// Lets `count` more client/port queries succeed, then fails every one.
    pub fn fail_queries_after(&self, count: usize) {
        self.lock().query_budget = Some(count);
    }

    pub fn stats(&self) -> RouterStats {
        self.lock().stats
    }
}

impl Router for MockRouter {
    type Session = MockSession;

    fn open(&self, direction: Direction, nonblock: bool) -> Result<MockSession, RouterError> {
        let mut state = self.lock();
        if state.take_fault(Fault::Open) {
            return Err(RouterError::Open(ENOENT.to_string()));
        }
        let client = state.next_session;
        state.next_session += 1;
        state
            .clients
            .insert(client, MockClient::new(&format!("Client-{}", client), true));
        state.stats.opens += 1;
        debug!("mock router: opened client {} ({:?})", client, direction);
        Ok(MockSession {
            router: self.clone(),
            client,
            direction,
            nonblock,
        })
    }
}

/// One open client on a [`MockRouter`].
#[derive(Debug)]
pub struct MockSession {
    router: MockRouter,
    client: ClientId,
    direction: Direction,
    nonblock: bool,
}

impl MockSession {
    pub fn is_nonblocking(&self) -> bool {
        self.nonblock
    }

    fn owns_port(state: &MockState, client: ClientId, port: PortId) -> bool {
        state
            .clients
            .get(&client)
            .map_or(false, |c| c.ports.contains_key(&port))
    }
}

impl Session for MockSession {
    fn client_id(&self) -> Result<ClientId, RouterError> {
        Ok(self.client)
    }

    fn port_info(&self, addr: Addr) -> Result<PortInfo, RouterError> {
        let mut state = self.router.lock();
        if state.take_fault(Fault::PortInfo) {
            return Err(RouterError::NoSuchPort {
                addr,
                reason: EINVAL.to_string(),
            });
        }
        state
            .port(addr)
            .map(|p| p.info.clone())
            .ok_or_else(|| RouterError::NoSuchPort {
                addr,
                reason: ENOENT.to_string(),
            })
    }

    fn next_client(&self, after: ClientId) -> Result<Option<ClientId>, RouterError> {
        let mut state = self.router.lock();
        state.spend_query()?;
        Ok(state
            .clients
            .range((after + 1)..)
            .map(|(id, _)| *id)
            .next())
    }

    fn next_port(&self, client: ClientId, after: PortId) -> Result<Option<PortInfo>, RouterError> {
        let mut state = self.router.lock();
        state.spend_query()?;
        Ok(state.clients.get(&client).and_then(|c| {
            c.ports
                .range((after + 1)..)
                .map(|(_, p)| p.info.clone())
                .next()
        }))
    }

    fn alloc_queue(&mut self) -> Result<QueueId, RouterError> {
        let mut state = self.router.lock();
        if state.take_fault(Fault::AllocQueue) {
            return Err(RouterError::Queue(EBUSY.to_string()));
        }
        let id = state.next_queue;
        state.next_queue += 1;
        state.queues.insert(
            id,
            MockQueue {
                owner: self.client,
                started: None,
            },
        );
        state.stats.queues_allocated += 1;
        Ok(id)
    }

    fn create_port(
        &mut self,
        name: &str,
        caps: PortCaps,
        port_type: PortType,
    ) -> Result<PortId, RouterError> {
        let mut state = self.router.lock();
        if state.take_fault(Fault::CreatePort) {
            return Err(RouterError::Port(EPERM.to_string()));
        }
        let client = self.client;
        let me = state
            .clients
            .get_mut(&client)
            .ok_or_else(|| RouterError::Port(EBADF.to_string()))?;
        let port = me.free_port();
        me.ports.insert(
            port,
            MockPort {
                info: PortInfo {
                    addr: Addr::new(client, port),
                    name: name.to_string(),
                    caps,
                    port_type,
                },
                stamping: None,
                received: Vec::new(),
            },
        );
        state.stats.ports_created += 1;
        Ok(port)
    }

    fn subscribe(&mut self, sender: Addr, dest: Addr) -> Result<(), RouterError> {
        let mut state = self.router.lock();
        let fail = |reason: &str| RouterError::Subscribe {
            sender,
            dest,
            reason: reason.to_string(),
        };
        if state.take_fault(Fault::Subscribe) {
            return Err(fail(EPERM));
        }
        let (Some(from), Some(to)) = (state.port(sender), state.port(dest)) else {
            return Err(fail(ENOENT));
        };
        if !from.info.caps.is_readable() || !to.info.caps.is_writable() {
            return Err(fail(EPERM));
        }
        if !state.subscriptions.insert((sender, dest)) {
            return Err(fail(EBUSY));
        }
        Ok(())
    }

    fn unsubscribe(&mut self, sender: Addr, dest: Addr) -> Result<(), RouterError> {
        let mut state = self.router.lock();
        if state.subscriptions.remove(&(sender, dest)) {
            Ok(())
        } else {
            Err(RouterError::Subscribe {
                sender,
                dest,
                reason: ENOENT.to_string(),
            })
        }
    }

    fn set_port_timestamping(
        &mut self,
        port: PortId,
        stamping: Timestamping,
    ) -> Result<(), RouterError> {
        let mut state = self.router.lock();
        if state.take_fault(Fault::Timestamping) {
            return Err(RouterError::Port(EINVAL.to_string()));
        }
        if !state.queues.contains_key(&stamping.queue) {
            return Err(RouterError::Port(EINVAL.to_string()));
        }
        let client = self.client;
        let port = state
            .clients
            .get_mut(&client)
            .and_then(|c| c.ports.get_mut(&port))
            .ok_or_else(|| RouterError::Port(ENOENT.to_string()))?;
        port.stamping = Some(stamping);
        Ok(())
    }

    fn start_queue(&mut self, queue: QueueId) -> Result<(), RouterError> {
        let mut state = self.router.lock();
        if state.take_fault(Fault::StartQueue) {
            return Err(RouterError::Queue(EBUSY.to_string()));
        }
        let client = self.client;
        let entry = state
            .queues
            .get_mut(&queue)
            .ok_or_else(|| RouterError::Queue(EINVAL.to_string()))?;
        if entry.owner != client {
            return Err(RouterError::Queue(EPERM.to_string()));
        }
        entry.started = Some(Instant::now());
        state.stats.queues_started += 1;
        Ok(())
    }

    fn queue_time(&self, queue: QueueId) -> Result<Duration, RouterError> {
        let mut state = self.router.lock();
        if state.take_fault(Fault::QueueTime) {
            return Err(RouterError::Queue(EINVAL.to_string()));
        }
        if !state.queues.contains_key(&queue) {
            return Err(RouterError::Queue(EINVAL.to_string()));
        }
        Ok(state.queue_elapsed(queue).unwrap_or_default())
    }

    fn drain_output(&mut self) -> Result<(), RouterError> {
        let mut state = self.router.lock();
        if state.take_fault(Fault::Drain) {
            return Err(RouterError::Output(EBUSY.to_string()));
        }
        Ok(())
    }

    fn output_direct(&mut self, event: &SeqEvent) -> Result<(), RouterError> {
        if self.direction == Direction::Input {
            return Err(RouterError::Output(EBADF.to_string()));
        }
        let mut state = self.router.lock();
        if state.take_fault(Fault::Output) {
            return Err(RouterError::Output(EBUSY.to_string()));
        }
        if !Self::owns_port(&state, self.client, event.source.port) {
            return Err(RouterError::Output(ENOENT.to_string()));
        }
        if let EventQueue::Scheduled(queue) = event.queue {
            if !state.queues.contains_key(&queue) {
                return Err(RouterError::Output(EINVAL.to_string()));
            }
        }
        let mut event = event.clone();
        event.source.client = self.client;
        state.deliver(&event);
        state.stats.events_output += 1;
        Ok(())
    }

    fn input_pending(&mut self, _fetch: bool) -> Result<usize, RouterError> {
        if self.direction == Direction::Output {
            return Err(RouterError::Input(EBADF.to_string()));
        }
        let mut state = self.router.lock();
        if state.take_fault(Fault::Input) {
            return Err(RouterError::Input(EBUSY.to_string()));
        }
        state.stats.input_polls += 1;
        let me = state
            .clients
            .get(&self.client)
            .ok_or_else(|| RouterError::Input(EBADF.to_string()))?;
        Ok(me.inbox.len() + usize::from(me.overrun))
    }

    fn event_input(&mut self) -> Result<SeqEvent, RouterError> {
        let mut state = self.router.lock();
        if state.take_fault(Fault::Input) {
            return Err(RouterError::Input(EBUSY.to_string()));
        }
        let me = state
            .clients
            .get_mut(&self.client)
            .ok_or_else(|| RouterError::Input(EBADF.to_string()))?;
        if me.overrun {
            me.overrun = false;
            return Err(RouterError::Overrun);
        }
        // An empty blocking read would hang forever; report it like a
        // non-blocking one instead.
        me.inbox.pop_front().ok_or(RouterError::WouldBlock)
    }
}

impl Drop for MockSession {
    fn drop(&mut self) {
        let mut state = self.router.lock();
        let client = self.client;
        state.clients.remove(&client);
        state.queues.retain(|_, q| q.owner != client);
        state
            .subscriptions
            .retain(|(sender, dest)| sender.client != client && dest.client != client);
        state.stats.closes += 1;
        debug!("mock router: closed client {}", client);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn duplex() -> PortCaps {
        PortCaps::READ | PortCaps::SUBS_READ | PortCaps::WRITE | PortCaps::SUBS_WRITE
    }

    #[test]
    fn test_iteration_follows_ids() {
        let router = MockRouter::with_system();
        let synth = router.add_client("Synth");
        router.add_port(synth, "Synth MIDI 1", duplex());
        router.add_port(synth, "Synth MIDI 2", duplex());

        let session = router.open(Direction::Input, false).unwrap();
        assert_eq!(session.next_client(-1).unwrap(), Some(0));
        assert_eq!(session.next_client(0).unwrap(), Some(14));
        assert_eq!(session.next_client(14).unwrap(), Some(synth));

        let first = session.next_port(synth, -1).unwrap().unwrap();
        assert_eq!(first.name, "Synth MIDI 1");
        let second = session.next_port(synth, first.addr.port).unwrap().unwrap();
        assert_eq!(second.addr, Addr::new(synth, 1));
        assert!(session.next_port(synth, 1).unwrap().is_none());
    }

    #[test]
    fn test_session_drop_releases_resources() {
        let router = MockRouter::new();
        let synth = router.add_client("Synth");
        let out = router.add_port(synth, "out", duplex());
        {
            let mut session = router.open(Direction::Duplex, true).unwrap();
            let queue = session.alloc_queue().unwrap();
            let port = session
                .create_port("p", duplex(), PortType::APPLICATION)
                .unwrap();
            session.connect_from(port, out).unwrap();
            session.start_queue(queue).unwrap();
            assert_eq!(router.queue_count(), 1);
        }
        assert_eq!(router.queue_count(), 0);
        assert!(!router.is_subscribed(out, Addr::new(128, 0)));
        assert_eq!(router.stats().opens, router.stats().closes);
    }

    #[test]
    fn test_fifo_overrun_is_reported_once() {
        let router = MockRouter::new().with_fifo_capacity(1);
        let synth = router.add_client("Synth");
        let out = router.add_port(synth, "out", duplex());
        let mut session = router.open(Direction::Duplex, true).unwrap();
        let port = session
            .create_port("p", duplex(), PortType::APPLICATION)
            .unwrap();
        session.connect_from(port, out).unwrap();

        assert_eq!(router.inject(out, EventKind::Clock), 1);
        assert_eq!(router.inject(out, EventKind::Clock), 0);
        assert_eq!(session.input_pending(true).unwrap(), 2);
        assert_eq!(session.event_input(), Err(RouterError::Overrun));
        assert_eq!(session.event_input().unwrap().kind, EventKind::Clock);
        assert_eq!(session.event_input(), Err(RouterError::WouldBlock));
    }

    #[test]
    fn test_subscription_needs_capabilities() {
        let router = MockRouter::new();
        let synth = router.add_client("Synth");
        let read_only = router.add_port(synth, "out", PortCaps::READ | PortCaps::SUBS_READ);
        let mut session = router.open(Direction::Output, false).unwrap();
        let port = session
            .create_port("p", duplex(), PortType::APPLICATION)
            .unwrap();
        assert!(session.connect_from(port, read_only).is_ok());
        assert!(matches!(
            session.connect_to(port, read_only),
            Err(RouterError::Subscribe { .. })
        ));
    }
}
