//! MIDI devices on an event router such as the ALSA sequencer.
//!
//! A [`Device`] names one client/port pair. It can be probed for its
//! capabilities, connected (which gives it a private session, timestamping
//! queue, local port and codec) and then used to send and receive raw MIDI
//! bytes. [`get_devices`] lists every port the router knows about.

pub mod cli;
pub mod codec;
pub mod config;
pub mod device;
pub mod enumerate;
pub mod error;
pub mod logging;
pub mod patch;
pub mod pool;
pub mod router;

pub use crate::config::{Settings, BUFFER_SIZE};
pub use crate::device::{Capabilities, Device, DeviceState, MidiMessage, MidiPayload};
pub use crate::enumerate::{get_devices, get_user_devices, is_system_port};
pub use crate::error::{DeviceError, ErrorKind};
pub use crate::patch::{connect_devices, disconnect_devices};
pub use crate::pool::{DevicePool, DeviceKey, ScanReport};
pub use crate::router::{Addr, MockRouter, Router};

#[cfg(feature = "alsa")]
pub use crate::router::AlsaRouter;
