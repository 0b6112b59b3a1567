//! Device discovery.

use log::{debug, warn};

use crate::device::Device;
use crate::error::{DeviceError, Result};
use crate::router::{Direction, Router, RouterError, Session, QUERY_ALL};

/// Port names the router itself provides.
const SYSTEM_PORTS: [&str; 3] = ["Timer", "Announce", "Notify"];
const THROUGH_PREFIX: &str = "Midi Through";

/// Lists one unconnected [`Device`] per port the router knows about.
///
/// A failure before the first port was found is an error; a later failure
/// ends the walk and returns what was found so far.
pub fn get_devices<R: Router + Clone>(router: &R) -> Result<Vec<Device<R>>> {
    let session = router
        .open(Direction::Input, false)
        .map_err(DeviceError::Session)?;

    let mut devices = Vec::new();
    match walk_ports(router, &session, &mut devices) {
        Ok(()) => {}
        Err(e) if devices.is_empty() => return Err(DeviceError::Enumerate(e)),
        Err(e) => warn!(
            "Device enumeration stopped after {} devices: {}",
            devices.len(),
            e
        ),
    }
    debug!("Found {} devices", devices.len());
    Ok(devices)
}

fn walk_ports<R: Router + Clone>(
    router: &R,
    session: &R::Session,
    devices: &mut Vec<Device<R>>,
) -> std::result::Result<(), RouterError> {
    let mut client = QUERY_ALL;
    while let Some(next) = session.next_client(client)? {
        client = next;
        let mut port = QUERY_ALL;
        while let Some(info) = session.next_port(client, port)? {
            port = info.addr.port;
            devices.push(Device::from_port_info(router.clone(), &info));
        }
    }
    Ok(())
}

/// Whether a port name belongs to the router's own plumbing rather than to
/// a MIDI device.
pub fn is_system_port(name: &str) -> bool {
    SYSTEM_PORTS.contains(&name) || name.starts_with(THROUGH_PREFIX)
}

/// [`get_devices`] without the router's own ports.
pub fn get_user_devices<R: Router + Clone>(router: &R) -> Result<Vec<Device<R>>> {
    Ok(get_devices(router)?
        .into_iter()
        .filter(|device| !device.name().map_or(false, is_system_port))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_ports() {
        assert!(is_system_port("Timer"));
        assert!(is_system_port("Announce"));
        assert!(is_system_port("Midi Through Port-0"));
        assert!(!is_system_port("Timer 2"));
        assert!(!is_system_port("nanoKONTROL2 MIDI 1"));
    }
}
