//! ALSA sequencer backend.

use std::ffi::CString;
use std::time::Duration;

use alsa::seq::{
    self, ClientIter, EvCtrl, EvNote, EvQueueControl, Event, EventType, PortIter, PortSubscribe,
    Seq,
};
use log::debug;

use super::{
    Addr, ClientId, Destination, Direction, EventKind, EventQueue, PortCaps, PortId, PortInfo,
    PortType, QueueId, Router, RouterError, SeqEvent, Session, Timestamp, Timestamping,
};

const ENOSPC: i32 = 28;
const EAGAIN: i32 = 11;
/// `SND_SEQ_ADDRESS_SUBSCRIBERS`
const ADDRESS_SUBSCRIBERS: i32 = 254;
/// `SND_SEQ_QUEUE_DIRECT`
const QUEUE_DIRECT: i32 = 253;

/// Opens sessions on an ALSA sequencer ("default" is the system one).
#[derive(Debug, Clone)]
pub struct AlsaRouter {
    sequencer: String,
    client_name: String,
}

impl AlsaRouter {
    pub fn new(sequencer: &str, client_name: &str) -> Self {
        Self {
            sequencer: sequencer.to_string(),
            client_name: client_name.to_string(),
        }
    }
}

impl Default for AlsaRouter {
    fn default() -> Self {
        Self::new("default", "alsamidi")
    }
}

impl Router for AlsaRouter {
    type Session = AlsaSession;

    fn open(&self, direction: Direction, nonblock: bool) -> Result<AlsaSession, RouterError> {
        let name = c_string(&self.sequencer).map_err(RouterError::Open)?;
        let streams = match direction {
            Direction::Input => Some(alsa::Direction::Capture),
            Direction::Output => Some(alsa::Direction::Playback),
            Direction::Duplex => None,
        };
        let seq = Seq::open(Some(name.as_c_str()), streams, nonblock)
            .map_err(|e| RouterError::Open(e.to_string()))?;

        let client_name = c_string(&self.client_name).map_err(RouterError::Open)?;
        seq.set_client_name(&client_name)
            .map_err(|e| RouterError::Open(e.to_string()))?;
        debug!(
            "Opened sequencer '{}' ({:?}, nonblock={})",
            self.sequencer, direction, nonblock
        );
        Ok(AlsaSession { seq, direction })
    }
}

/// One open `snd_seq_t` handle. Dropping it closes the handle.
pub struct AlsaSession {
    seq: Seq,
    direction: Direction,
}

impl Session for AlsaSession {
    fn client_id(&self) -> Result<ClientId, RouterError> {
        self.seq
            .client_id()
            .map_err(|e| RouterError::Query(e.to_string()))
    }

    fn port_info(&self, addr: Addr) -> Result<PortInfo, RouterError> {
        let info = self
            .seq
            .get_any_port_info(to_alsa_addr(addr))
            .map_err(|e| RouterError::NoSuchPort {
                addr,
                reason: e.to_string(),
            })?;
        Ok(port_info(&info))
    }

    // The iterators stop silently on query errors, so those show up as the
    // end of the listing.
    fn next_client(&self, after: ClientId) -> Result<Option<ClientId>, RouterError> {
        Ok(ClientIter::new(&self.seq)
            .map(|client| client.get_client())
            .find(|&client| client > after))
    }

    fn next_port(&self, client: ClientId, after: PortId) -> Result<Option<PortInfo>, RouterError> {
        Ok(PortIter::new(&self.seq, client)
            .find(|port| port.get_port() > after)
            .map(|port| port_info(&port)))
    }

    fn alloc_queue(&mut self) -> Result<QueueId, RouterError> {
        self.seq
            .alloc_queue()
            .map_err(|e| RouterError::Queue(e.to_string()))
    }

    fn create_port(
        &mut self,
        name: &str,
        caps: PortCaps,
        port_type: PortType,
    ) -> Result<PortId, RouterError> {
        let name = c_string(name).map_err(RouterError::Port)?;
        self.seq
            .create_simple_port(
                &name,
                seq::PortCap::from_bits_truncate(caps.bits()),
                seq::PortType::from_bits_truncate(port_type.bits()),
            )
            .map_err(|e| RouterError::Port(e.to_string()))
    }

    fn subscribe(&mut self, sender: Addr, dest: Addr) -> Result<(), RouterError> {
        let fail = |e: alsa::Error| RouterError::Subscribe {
            sender,
            dest,
            reason: e.to_string(),
        };
        let subscription = PortSubscribe::empty().map_err(fail)?;
        subscription.set_sender(to_alsa_addr(sender));
        subscription.set_dest(to_alsa_addr(dest));
        self.seq.subscribe_port(&subscription).map_err(fail)
    }

    fn unsubscribe(&mut self, sender: Addr, dest: Addr) -> Result<(), RouterError> {
        self.seq
            .unsubscribe_port(to_alsa_addr(sender), to_alsa_addr(dest))
            .map_err(|e| RouterError::Subscribe {
                sender,
                dest,
                reason: e.to_string(),
            })
    }

    fn set_port_timestamping(
        &mut self,
        port: PortId,
        stamping: Timestamping,
    ) -> Result<(), RouterError> {
        let me = Addr::new(self.client_id()?, port);
        let mut info = self
            .seq
            .get_any_port_info(to_alsa_addr(me))
            .map_err(|e| RouterError::Port(e.to_string()))?;
        info.set_timestamping(true);
        info.set_timestamp_queue(stamping.queue);
        info.set_timestamp_real(stamping.real_time);
        self.seq
            .set_port_info(port, &mut info)
            .map_err(|e| RouterError::Port(e.to_string()))
    }

    fn start_queue(&mut self, queue: QueueId) -> Result<(), RouterError> {
        self.seq
            .control_queue(queue, EventType::Start, 0, None)
            .map_err(|e| RouterError::Queue(e.to_string()))
    }

    fn queue_time(&self, queue: QueueId) -> Result<Duration, RouterError> {
        let status = self
            .seq
            .get_queue_status(queue)
            .map_err(|e| RouterError::Queue(e.to_string()))?;
        Ok(status.get_real_time())
    }

    fn drain_output(&mut self) -> Result<(), RouterError> {
        self.seq
            .drain_output()
            .map(|_| ())
            .map_err(|e| RouterError::Output(e.to_string()))
    }

    fn output_direct(&mut self, event: &SeqEvent) -> Result<(), RouterError> {
        let mut ev = to_alsa_event(event)?;
        self.seq
            .event_output_direct(&mut ev)
            .map(|_| ())
            .map_err(|e| RouterError::Output(e.to_string()))
    }

    fn input_pending(&mut self, fetch: bool) -> Result<usize, RouterError> {
        if self.direction == Direction::Output {
            return Err(RouterError::Input("session was opened for output only".into()));
        }
        self.seq
            .input()
            .event_input_pending(fetch)
            .map(|pending| pending as usize)
            .map_err(|e| RouterError::Input(e.to_string()))
    }

    fn event_input(&mut self) -> Result<SeqEvent, RouterError> {
        if self.direction == Direction::Output {
            return Err(RouterError::Input("session was opened for output only".into()));
        }
        let mut input = self.seq.input();
        let event = input.event_input().map(|ev| from_alsa_event(&ev));
        match event {
            Ok(event) => Ok(event),
            Err(e) if e.errno() == ENOSPC => Err(RouterError::Overrun),
            Err(e) if e.errno() == EAGAIN => Err(RouterError::WouldBlock),
            Err(e) => Err(RouterError::Input(e.to_string())),
        }
    }
}

fn c_string(s: &str) -> Result<CString, String> {
    CString::new(s).map_err(|e| format!("invalid name '{}': {}", s, e))
}

fn to_alsa_addr(addr: Addr) -> seq::Addr {
    seq::Addr {
        client: addr.client,
        port: addr.port,
    }
}

fn port_info(info: &seq::PortInfo) -> PortInfo {
    let addr = info.addr();
    PortInfo {
        addr: Addr::new(addr.client, addr.port),
        name: info.get_name().unwrap_or_default().to_string(),
        caps: PortCaps::from_bits(info.get_capability().bits()),
        port_type: PortType::from_bits(info.get_type().bits()),
    }
}

fn note(t: EventType, channel: u8, note: u8, velocity: u8) -> Event<'static> {
    Event::new(
        t,
        &EvNote {
            channel,
            note,
            velocity,
            off_velocity: 0,
            duration: 0,
        },
    )
}

fn ctrl(t: EventType, channel: u8, param: u32, value: i32) -> Event<'static> {
    Event::new(
        t,
        &EvCtrl {
            channel,
            param,
            value,
        },
    )
}

fn queue_ctrl(t: EventType) -> Event<'static> {
    Event::new(t, &EvQueueControl { queue: 0, value: () })
}

fn to_alsa_event(event: &SeqEvent) -> Result<Event<'static>, RouterError> {
    let mut ev = match &event.kind {
        EventKind::NoteOff {
            channel,
            note: key,
            velocity,
        } => note(EventType::Noteoff, *channel, *key, *velocity),
        EventKind::NoteOn {
            channel,
            note: key,
            velocity,
        } => note(EventType::Noteon, *channel, *key, *velocity),
        EventKind::KeyPressure {
            channel,
            note: key,
            pressure,
        } => note(EventType::Keypress, *channel, *key, *pressure),
        EventKind::Controller {
            channel,
            param,
            value,
        } => ctrl(
            EventType::Controller,
            *channel,
            u32::from(*param),
            i32::from(*value),
        ),
        EventKind::ProgramChange { channel, program } => {
            ctrl(EventType::Pgmchange, *channel, 0, i32::from(*program))
        }
        EventKind::ChannelPressure { channel, pressure } => {
            ctrl(EventType::Chanpress, *channel, 0, i32::from(*pressure))
        }
        EventKind::PitchBend { channel, value } => {
            ctrl(EventType::Pitchbend, *channel, 0, i32::from(*value))
        }
        EventKind::QuarterFrame(value) => ctrl(EventType::Qframe, 0, 0, i32::from(*value)),
        EventKind::SongPosition(value) => ctrl(EventType::Songpos, 0, 0, i32::from(*value)),
        EventKind::SongSelect(value) => ctrl(EventType::Songsel, 0, 0, i32::from(*value)),
        EventKind::TuneRequest => Event::new(EventType::TuneRequest, &()),
        EventKind::Reset => Event::new(EventType::Reset, &()),
        EventKind::Sensing => Event::new(EventType::Sensing, &()),
        EventKind::Clock => queue_ctrl(EventType::Clock),
        EventKind::Start => queue_ctrl(EventType::Start),
        EventKind::Continue => queue_ctrl(EventType::Continue),
        EventKind::Stop => queue_ctrl(EventType::Stop),
        EventKind::Tick => Event::new(EventType::Tick, &EvQueueControl { queue: 0, value: 0u32 }),
        EventKind::Sysex(data) => Event::new_ext(EventType::Sysex, data.clone()),
        EventKind::Echo => Event::new(EventType::Echo, &[0u8; 12]),
        EventKind::Unsupported(t) => {
            return Err(RouterError::Output(format!(
                "event type {} cannot be sent",
                t
            )))
        }
    };

    ev.set_source(event.source.port);
    match event.dest {
        Destination::Subscribers => ev.set_subs(),
        Destination::Port(dest) => ev.set_dest(to_alsa_addr(dest)),
    }
    match (event.queue, event.time) {
        (EventQueue::Direct, _) => ev.set_direct(),
        (EventQueue::Scheduled(queue), Timestamp::Real(time)) => ev.schedule_real(queue, false, time),
        (EventQueue::Scheduled(queue), Timestamp::Tick(tick)) => ev.schedule_tick(queue, false, tick),
    }
    Ok(ev)
}

fn from_alsa_event(ev: &Event) -> SeqEvent {
    let t = ev.get_type();
    let kind = match t {
        EventType::Noteoff | EventType::Noteon | EventType::Keypress => {
            let data = ev.get_data::<EvNote>().unwrap_or_default();
            match t {
                EventType::Noteoff => EventKind::NoteOff {
                    channel: data.channel,
                    note: data.note,
                    velocity: data.velocity,
                },
                EventType::Noteon => EventKind::NoteOn {
                    channel: data.channel,
                    note: data.note,
                    velocity: data.velocity,
                },
                _ => EventKind::KeyPressure {
                    channel: data.channel,
                    note: data.note,
                    pressure: data.velocity,
                },
            }
        }
        EventType::Controller
        | EventType::Pgmchange
        | EventType::Chanpress
        | EventType::Pitchbend
        | EventType::Qframe
        | EventType::Songpos
        | EventType::Songsel => {
            let data = ev.get_data::<EvCtrl>().unwrap_or_default();
            match t {
                EventType::Controller => EventKind::Controller {
                    channel: data.channel,
                    param: data.param as u8,
                    value: data.value as u8,
                },
                EventType::Pgmchange => EventKind::ProgramChange {
                    channel: data.channel,
                    program: data.value as u8,
                },
                EventType::Chanpress => EventKind::ChannelPressure {
                    channel: data.channel,
                    pressure: data.value as u8,
                },
                EventType::Pitchbend => EventKind::PitchBend {
                    channel: data.channel,
                    value: data.value.clamp(-8192, 8191) as i16,
                },
                EventType::Qframe => EventKind::QuarterFrame(data.value as u8),
                EventType::Songpos => EventKind::SongPosition(data.value as u16),
                _ => EventKind::SongSelect(data.value as u8),
            }
        }
        EventType::TuneRequest => EventKind::TuneRequest,
        EventType::Clock => EventKind::Clock,
        EventType::Tick => EventKind::Tick,
        EventType::Start => EventKind::Start,
        EventType::Continue => EventKind::Continue,
        EventType::Stop => EventKind::Stop,
        EventType::Sensing => EventKind::Sensing,
        EventType::Reset => EventKind::Reset,
        EventType::Sysex => EventKind::Sysex(ev.get_ext().unwrap_or_default().to_vec()),
        EventType::Echo => EventKind::Echo,
        other => EventKind::Unsupported(other as i32),
    };

    let source = ev.get_source();
    let dest = ev.get_dest();
    SeqEvent {
        kind,
        source: Addr::new(source.client, source.port),
        dest: if dest.client == ADDRESS_SUBSCRIBERS {
            Destination::Subscribers
        } else {
            Destination::Port(Addr::new(dest.client, dest.port))
        },
        queue: match ev.get_queue() {
            QUEUE_DIRECT => EventQueue::Direct,
            queue => EventQueue::Scheduled(queue),
        },
        time: match (ev.get_time(), ev.get_tick()) {
            (Some(time), _) => Timestamp::Real(time),
            (None, tick) => Timestamp::Tick(tick.unwrap_or_default()),
        },
    }
}
