use thiserror::Error;

use crate::codec::CodecError;
use crate::router::{Addr, RouterError};

/// Broad category of a [`DeviceError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Opening or querying the router failed.
    Session,
    /// A queue, port or subscription could not be set up.
    Resource,
    /// MIDI bytes could not be translated to or from a router event.
    Protocol,
    /// The device is in the wrong state for the operation; no I/O happened.
    State,
    /// Event transport to or from the router failed.
    Transport,
}

/// The one error type every device operation reports.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("Failed to open sequencer: {0}")]
    Session(#[source] RouterError),
    #[error("Failed to get port info for ({addr}): {source}")]
    PortInfo { addr: Addr, source: RouterError },
    #[error("Failed to get client/port info: {0}")]
    Enumerate(#[source] RouterError),
    #[error("Failed to create a sequencer queue: {0}")]
    QueueAlloc(#[source] RouterError),
    #[error("Failed to create a local port: {0}")]
    PortCreate(#[source] RouterError),
    #[error("Failed to subscribe to ({addr}): {source}")]
    Subscribe { addr: Addr, source: RouterError },
    #[error("Failed to enable timestamping: {0}")]
    Timestamping(#[source] RouterError),
    #[error("Failed to start queue: {0}")]
    QueueStart(#[source] RouterError),
    #[error("Failed to flush sequencer output: {0}")]
    Drain(#[source] RouterError),
    #[error("Failed to read queue time: {0}")]
    QueueTime(#[source] RouterError),
    #[error("Failed to route ({sender}) to ({dest}): {source}")]
    Route {
        sender: Addr,
        dest: Addr,
        source: RouterError,
    },
    #[error("Failed to {operation} because there is no connection")]
    NotConnected { operation: &'static str },
    #[error("Failed to {operation} because ({addr}) is not an input device")]
    NotInput {
        addr: Addr,
        operation: &'static str,
    },
    #[error("Failed to {operation} because ({addr}) is not an output device")]
    NotOutput {
        addr: Addr,
        operation: &'static str,
    },
    #[error("Cannot change the address of connected device ({0})")]
    AlreadyConnected(Addr),
    #[error("Failed to encode data as a MIDI event: {0}")]
    Encode(#[source] CodecError),
    #[error("Failed to decode event to MIDI data: {0}")]
    Decode(#[source] CodecError),
    #[error("Failed to send event: {0}")]
    Output(#[source] RouterError),
    #[error("Failed to get input from sequencer: {0}")]
    Input(#[source] RouterError),
}

impl DeviceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DeviceError::Session(_) | DeviceError::PortInfo { .. } | DeviceError::Enumerate(_) => {
                ErrorKind::Session
            }
            DeviceError::QueueAlloc(_)
            | DeviceError::PortCreate(_)
            | DeviceError::Subscribe { .. }
            | DeviceError::Timestamping(_)
            | DeviceError::QueueStart(_)
            | DeviceError::Drain(_)
            | DeviceError::QueueTime(_)
            | DeviceError::Route { .. } => ErrorKind::Resource,
            DeviceError::NotConnected { .. }
            | DeviceError::NotInput { .. }
            | DeviceError::NotOutput { .. }
            | DeviceError::AlreadyConnected(_) => ErrorKind::State,
            DeviceError::Encode(_) | DeviceError::Decode(_) => ErrorKind::Protocol,
            DeviceError::Output(_) | DeviceError::Input(_) => ErrorKind::Transport,
        }
    }
}

pub type Result<T> = std::result::Result<T, DeviceError>;
