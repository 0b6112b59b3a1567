use log::{debug, warn};

use super::{Capabilities, MidiMessage};
use crate::codec::{Codec, CodecError};
use crate::config::BUFFER_SIZE;
use crate::error::{DeviceError, Result};
use crate::router::{
    Addr, EventKind, EventQueue, PortCaps, PortId, PortType, QueueId, RouterError, Session,
    Timestamping,
};

/// Everything a connected device holds. It exists only when every step of
/// [`Connection::establish`] succeeded, and dropping it closes the session
/// together with the queue, port and subscriptions created through it.
pub(crate) struct Connection<S: Session> {
    session: S,
    queue: QueueId,
    port: PortId,
    codec: Codec,
    buffer: [u8; BUFFER_SIZE],
    pub(crate) caps: Capabilities,
}

impl<S: Session> Connection<S> {
    pub(crate) fn establish(
        mut session: S,
        target: Addr,
        caps: Capabilities,
        port_name: &str,
    ) -> Result<Self> {
        let queue = session.alloc_queue().map_err(DeviceError::QueueAlloc)?;
        debug!("Allocated queue {} for ({})", queue, target);

        let port = session
            .create_port(
                port_name,
                PortCaps::READ | PortCaps::SUBS_READ | PortCaps::WRITE | PortCaps::SUBS_WRITE,
                PortType::MIDI_GENERIC | PortType::APPLICATION,
            )
            .map_err(DeviceError::PortCreate)?;
        debug!("Created local port {} '{}'", port, port_name);

        if caps.is_input {
            session
                .connect_from(port, target)
                .map_err(|source| DeviceError::Subscribe {
                    addr: target,
                    source,
                })?;
        }
        if caps.is_output {
            session
                .connect_to(port, target)
                .map_err(|source| DeviceError::Subscribe {
                    addr: target,
                    source,
                })?;
        }

        session
            .set_port_timestamping(
                port,
                Timestamping {
                    queue,
                    real_time: true,
                },
            )
            .map_err(DeviceError::Timestamping)?;
        session.start_queue(queue).map_err(DeviceError::QueueStart)?;
        session.drain_output().map_err(DeviceError::Drain)?;

        Ok(Self {
            session,
            queue,
            port,
            codec: Codec::new(BUFFER_SIZE),
            buffer: [0; BUFFER_SIZE],
            caps,
        })
    }

    pub(crate) fn session(&self) -> &S {
        &self.session
    }

    pub(crate) fn local_addr(&self) -> Option<Addr> {
        self.session
            .client_id()
            .ok()
            .map(|client| Addr::new(client, self.port))
    }

    pub(crate) fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.codec.reset_encode();
        let (consumed, event) = self.codec.encode(bytes).map_err(DeviceError::Encode)?;
        let mut event = event.ok_or(DeviceError::Encode(CodecError::Incomplete))?;
        if consumed < bytes.len() {
            warn!(
                "Only the first event was sent; {} trailing bytes ignored",
                bytes.len() - consumed
            );
        }

        if !event.is_direct() {
            event.queue = EventQueue::Scheduled(self.queue);
        }
        event.set_source(self.port);
        if event.kind != EventKind::Echo {
            event.set_subs();
        }
        self.session
            .output_direct(&event)
            .map_err(DeviceError::Output)
    }

    /// Reads one message. `overruns` is bumped for every overrun reported on
    /// the way to it.
    pub(crate) fn receive(&mut self, overruns: &mut u64) -> Result<Option<MidiMessage>> {
        let pending = self
            .session
            .input_pending(true)
            .map_err(DeviceError::Input)?;
        if pending == 0 {
            return Ok(None);
        }

        // one retry: after an overrun the FIFO resumes with the next event
        for _ in 0..2 {
            match self.session.event_input() {
                Ok(event) => {
                    self.codec.reset_decode();
                    let len = self
                        .codec
                        .decode(&event, &mut self.buffer)
                        .map_err(DeviceError::Decode)?;
                    return Ok(Some(MidiMessage {
                        bytes: self.buffer[..len].to_vec(),
                        timestamp: event.time.as_secs_f64(),
                    }));
                }
                Err(RouterError::Overrun) => {
                    *overruns += 1;
                    warn!("Input overrun on local port {}: events were lost", self.port);
                }
                Err(RouterError::WouldBlock) => return Ok(None),
                Err(e) => return Err(DeviceError::Input(e)),
            }
        }
        Ok(None)
    }

    pub(crate) fn time(&self) -> Result<f64> {
        let time = self
            .session
            .queue_time(self.queue)
            .map_err(DeviceError::QueueTime)?;
        Ok(time.as_secs_f64())
    }
}
