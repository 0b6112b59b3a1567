//! Direct routing between two devices, e.g. to let a keyboard play a synth
//! without the events passing through this process.

use log::info;

use crate::device::Device;
use crate::error::{DeviceError, Result};
use crate::router::{Direction, Router, Session};

/// Subscribes `dest` to everything `source` emits.
pub fn connect_devices<R: Router>(router: &R, source: &Device<R>, dest: &Device<R>) -> Result<()> {
    check_route(source, dest, "route")?;
    let mut session = router
        .open(Direction::Output, false)
        .map_err(DeviceError::Session)?;
    session
        .subscribe(source.addr(), dest.addr())
        .map_err(|e| DeviceError::Route {
            sender: source.addr(),
            dest: dest.addr(),
            source: e,
        })?;
    info!("Routed {} to {}", source, dest);
    Ok(())
}

/// Removes a route made by [`connect_devices`].
pub fn disconnect_devices<R: Router>(
    router: &R,
    source: &Device<R>,
    dest: &Device<R>,
) -> Result<()> {
    check_route(source, dest, "unroute")?;
    let mut session = router
        .open(Direction::Output, false)
        .map_err(DeviceError::Session)?;
    session
        .unsubscribe(source.addr(), dest.addr())
        .map_err(|e| DeviceError::Route {
            sender: source.addr(),
            dest: dest.addr(),
            source: e,
        })?;
    info!("Removed route {} to {}", source, dest);
    Ok(())
}

fn check_route<R: Router>(
    source: &Device<R>,
    dest: &Device<R>,
    operation: &'static str,
) -> Result<()> {
    if !source.is_input() {
        return Err(DeviceError::NotInput {
            addr: source.addr(),
            operation,
        });
    }
    if !dest.is_output() {
        return Err(DeviceError::NotOutput {
            addr: dest.addr(),
            operation,
        });
    }
    Ok(())
}
