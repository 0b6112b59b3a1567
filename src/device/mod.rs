//! A MIDI endpoint on the router and its connection state machine.
//!
//! A [`Device`] goes through three phases:
//! - unprobed: only the address is known
//! - probed: capability flags were read from the router
//! - connected: a private session, queue, local port and codec are held
//!
//! Send and receive are only possible while connected. [`Device::close`] (or
//! dropping the device) tears the connection down again.

mod connection;
mod payload;

use std::fmt;

use log::{debug, info, warn};

use crate::error::{DeviceError, Result};
use crate::router::{Addr, ClientId, Direction, PortCaps, PortId, PortInfo, Router, Session};
use connection::Connection;

pub use payload::MidiPayload;

/// Name of the local port a connected device creates.
pub const DEFAULT_PORT_NAME: &str = "alsamidi";

/// Direction flags read from the router's port metadata.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// The port emits events we can receive.
    pub is_input: bool,
    /// The port accepts events we send.
    pub is_output: bool,
}

impl From<PortCaps> for Capabilities {
    fn from(caps: PortCaps) -> Self {
        Self {
            is_input: caps.is_readable(),
            is_output: caps.is_writable(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Unprobed,
    Probed,
    Connected,
}

/// One received message.
#[derive(Debug, Clone, PartialEq)]
pub struct MidiMessage {
    pub bytes: Vec<u8>,
    /// Queue time of arrival in seconds.
    pub timestamp: f64,
}

impl MidiMessage {
    pub fn into_tuple(self) -> (Vec<u8>, f64) {
        (self.bytes, self.timestamp)
    }
}

enum Phase<S: Session> {
    Unprobed,
    Probed(Capabilities),
    Connected(Box<Connection<S>>),
}

pub struct Device<R: Router> {
    router: R,
    name: Option<String>,
    addr: Addr,
    local_port_name: String,
    phase: Phase<R::Session>,
    overruns: u64,
}

impl<R: Router> Device<R> {
    pub fn new(router: R, client: ClientId, port: PortId) -> Self {
        Self {
            router,
            name: None,
            addr: Addr::new(client, port),
            local_port_name: DEFAULT_PORT_NAME.to_string(),
            phase: Phase::Unprobed,
            overruns: 0,
        }
    }

    pub fn with_name(router: R, name: impl Into<String>, client: ClientId, port: PortId) -> Self {
        let mut device = Self::new(router, client, port);
        device.name = Some(name.into());
        device
    }

    /// A device described by enumeration; it starts out probed.
    pub fn from_port_info(router: R, info: &PortInfo) -> Self {
        let mut device = Self::with_name(router, info.name.clone(), info.addr.client, info.addr.port);
        device.phase = Phase::Probed(Capabilities::from(info.caps));
        device
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
    }

    /// First word of the name, e.g. "Launchkey" for "Launchkey MK3 MIDI 1".
    pub fn short_name(&self) -> Option<&str> {
        self.name.as_deref().and_then(|name| name.split_whitespace().next())
    }

    pub fn client(&self) -> ClientId {
        self.addr.client
    }

    pub fn port(&self) -> PortId {
        self.addr.port
    }

    pub fn addr(&self) -> Addr {
        self.addr
    }

    /// Moves the device to another client. Capabilities are forgotten.
    pub fn set_client(&mut self, client: ClientId) -> Result<()> {
        self.set_addr(Addr::new(client, self.addr.port))
    }

    /// Moves the device to another port. Capabilities are forgotten.
    pub fn set_port(&mut self, port: PortId) -> Result<()> {
        self.set_addr(Addr::new(self.addr.client, port))
    }

    fn set_addr(&mut self, addr: Addr) -> Result<()> {
        if self.is_connected() {
            return Err(DeviceError::AlreadyConnected(self.addr));
        }
        if addr != self.addr {
            self.addr = addr;
            self.phase = Phase::Unprobed;
        }
        Ok(())
    }

    /// Name of the local port created by [`Device::connect`].
    pub fn set_local_port_name(&mut self, name: impl Into<String>) {
        self.local_port_name = name.into();
    }

    pub fn router(&self) -> &R {
        &self.router
    }

    pub fn state(&self) -> DeviceState {
        match self.phase {
            Phase::Unprobed => DeviceState::Unprobed,
            Phase::Probed(_) => DeviceState::Probed,
            Phase::Connected(_) => DeviceState::Connected,
        }
    }

    /// Last known capabilities; both flags are false before the first probe.
    pub fn capabilities(&self) -> Capabilities {
        match &self.phase {
            Phase::Unprobed => Capabilities::default(),
            Phase::Probed(caps) => *caps,
            Phase::Connected(conn) => conn.caps,
        }
    }

    pub fn is_input(&self) -> bool {
        self.capabilities().is_input
    }

    pub fn is_output(&self) -> bool {
        self.capabilities().is_output
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.phase, Phase::Connected(_))
    }

    /// Address of the local port while connected.
    pub fn local_addr(&self) -> Option<Addr> {
        match &self.phase {
            Phase::Connected(conn) => conn.local_addr(),
            _ => None,
        }
    }

    pub fn overrun_count(&self) -> u64 {
        self.overruns
    }

    /// Reads the capability flags from the router.
    ///
    /// Uses the connection's session when there is one, otherwise a
    /// short-lived input session that is closed before returning. On failure
    /// the previous flags are kept.
    pub fn probe(&mut self) -> Result<Capabilities> {
        let addr = self.addr;
        let info = match &self.phase {
            Phase::Connected(conn) => conn.session().port_info(addr),
            _ => {
                let session = self
                    .router
                    .open(Direction::Input, false)
                    .map_err(DeviceError::Session)?;
                session.port_info(addr)
            }
        }
        .map_err(|source| DeviceError::PortInfo { addr, source })?;

        let caps = Capabilities::from(info.caps);
        debug!("Probed ({}): {:?}", addr, caps);
        match &mut self.phase {
            Phase::Connected(conn) => conn.caps = caps,
            phase => *phase = Phase::Probed(caps),
        }
        Ok(caps)
    }

    /// Opens a private session and sets up queue, local port, subscriptions
    /// and codec. Does nothing when already connected.
    ///
    /// If any step fails, everything this call opened is closed again and the
    /// device stays disconnected.
    pub fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            debug!("({}) is already connected", self.addr);
            return Ok(());
        }

        let session = self
            .router
            .open(Direction::Duplex, true)
            .map_err(DeviceError::Session)?;

        let caps = match self.phase {
            Phase::Probed(caps) => caps,
            _ => {
                let info = session
                    .port_info(self.addr)
                    .map_err(|source| DeviceError::PortInfo {
                        addr: self.addr,
                        source,
                    })?;
                Capabilities::from(info.caps)
            }
        };

        let conn = Connection::establish(session, self.addr, caps, &self.local_port_name)?;
        self.phase = Phase::Connected(Box::new(conn));
        info!("Connected to {}", self);
        Ok(())
    }

    /// Sends the first MIDI event contained in `data`.
    pub fn send<P: Into<MidiPayload>>(&mut self, data: P) -> Result<()> {
        let payload = data.into();
        let addr = self.addr;
        let conn = match &mut self.phase {
            Phase::Connected(conn) => conn,
            _ => return Err(DeviceError::NotConnected { operation: "send" }),
        };
        if !conn.caps.is_output {
            return Err(DeviceError::NotOutput {
                addr,
                operation: "send",
            });
        }
        if payload.dropped() > 0 {
            warn!(
                "Message for ({}) truncated to {} bytes, {} dropped",
                addr,
                payload.len(),
                payload.dropped()
            );
        }
        conn.send(payload.as_bytes())
    }

    /// Returns the next pending message, or `None` when nothing is waiting.
    /// Never blocks.
    pub fn receive(&mut self) -> Result<Option<MidiMessage>> {
        let addr = self.addr;
        let conn = match &mut self.phase {
            Phase::Connected(conn) => conn,
            _ => return Err(DeviceError::NotConnected { operation: "receive" }),
        };
        if !conn.caps.is_input {
            return Err(DeviceError::NotInput {
                addr,
                operation: "receive",
            });
        }
        conn.receive(&mut self.overruns)
    }

    /// Receives until nothing is pending.
    pub fn drain(&mut self) -> Result<Vec<MidiMessage>> {
        let mut messages = Vec::new();
        while let Some(message) = self.receive()? {
            messages.push(message);
        }
        Ok(messages)
    }

    /// Current time of the device's queue in seconds; the same clock that
    /// stamps received messages.
    pub fn time(&self) -> Result<f64> {
        match &self.phase {
            Phase::Connected(conn) => conn.time(),
            _ => Err(DeviceError::NotConnected {
                operation: "read the queue time",
            }),
        }
    }

    /// Releases the connection. Calling it on a disconnected device does
    /// nothing.
    pub fn close(&mut self) {
        if let Phase::Connected(conn) = &self.phase {
            let caps = conn.caps;
            self.phase = Phase::Probed(caps);
            info!("Closed connection to {}", self);
        }
    }
}

impl<R: Router> fmt::Display for Device<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} ({})", name, self.addr),
            None => write!(f, "({})", self.addr),
        }
    }
}

impl<R: Router> fmt::Debug for Device<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("name", &self.name)
            .field("addr", &self.addr)
            .field("state", &self.state())
            .field("capabilities", &self.capabilities())
            .field("overruns", &self.overruns)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::MockRouter;

    #[test]
    fn test_capabilities_from_port_caps() {
        let caps = Capabilities::from(PortCaps::READ | PortCaps::SUBS_WRITE);
        assert!(caps.is_input);
        assert!(caps.is_output);
        assert_eq!(Capabilities::from(PortCaps::NO_EXPORT), Capabilities::default());
    }

    #[test]
    fn test_short_name() {
        let device = Device::with_name(MockRouter::new(), "Launchkey MK3 MIDI 1", 20, 0);
        assert_eq!(device.short_name(), Some("Launchkey"));
        assert_eq!(Device::new(MockRouter::new(), 0, 0).short_name(), None);
    }

    #[test]
    fn test_address_change_forgets_capabilities() {
        let info = PortInfo {
            addr: Addr::new(20, 0),
            name: "Synth".to_string(),
            caps: PortCaps::READ,
            port_type: Default::default(),
        };
        let mut device = Device::from_port_info(MockRouter::new(), &info);
        assert_eq!(device.state(), DeviceState::Probed);

        device.set_port(0).unwrap();
        assert_eq!(device.state(), DeviceState::Probed);
        device.set_port(1).unwrap();
        assert_eq!(device.state(), DeviceState::Unprobed);
        assert!(!device.is_input());
    }

    #[test]
    fn test_display() {
        let device = Device::with_name(MockRouter::new(), "Synth", 20, 1);
        assert_eq!(device.to_string(), "Synth (20:1)");
        assert_eq!(Device::new(MockRouter::new(), 128, 0).to_string(), "(128:0)");
    }
}
