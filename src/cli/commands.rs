use std::io::Write;
use std::thread;
use std::time::Duration;

use chrono::Local;
use dialoguer::Select;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};

use super::CliError;
use crate::device::Device;
use crate::enumerate::{get_devices, get_user_devices};
use crate::router::{Addr, Router};

pub fn run_list<R: Router + Clone>(
    router: &R,
    all: bool,
    out: &mut impl Write,
) -> Result<usize, CliError> {
    let devices = if all {
        get_devices(router)?
    } else {
        get_user_devices(router)?
    };

    if devices.is_empty() {
        writeln!(out, "No MIDI devices found")?;
        return Ok(0);
    }
    writeln!(out, "Available MIDI devices:")?;
    for device in &devices {
        writeln!(out, "  {}", format_device(device))?;
    }
    Ok(devices.len())
}

pub fn run_probe<R: Router + Clone>(
    router: &R,
    addr: Addr,
    out: &mut impl Write,
) -> Result<(), CliError> {
    let mut device = Device::new(router.clone(), addr.client, addr.port);
    let caps = device.probe()?;
    writeln!(
        out,
        "{}: input={} output={}",
        addr, caps.is_input, caps.is_output
    )?;
    Ok(())
}

pub fn run_send<R: Router + Clone>(
    router: &R,
    addr: Addr,
    bytes: &[u8],
    port_name: &str,
    out: &mut impl Write,
) -> Result<(), CliError> {
    let mut device = find_device(router, addr)?;
    device.set_local_port_name(port_name);
    device.connect()?;
    device.send(bytes)?;
    writeln!(out, "Sent {} to {}", format_bytes(bytes), device)?;
    device.close();
    Ok(())
}

/// Connects `device` and prints what it receives until `count` messages
/// arrived (forever without a count). Returns the number printed.
pub fn run_monitor<R: Router>(
    device: &mut Device<R>,
    count: Option<usize>,
    poll_interval: Duration,
    out: &mut impl Write,
    progress: &ProgressBar,
) -> Result<usize, CliError> {
    device.connect()?;
    info!("Monitoring {}", device);
    progress.set_message(format!("{}: waiting for messages", device));

    let mut received = 0;
    while count.map_or(true, |count| received < count) {
        match device.receive()? {
            Some(message) => {
                received += 1;
                progress.suspend(|| {
                    writeln!(
                        out,
                        "{:>12.6}  {}  {}",
                        message.timestamp,
                        Local::now().format("%H:%M:%S%.3f"),
                        format_bytes(&message.bytes)
                    )
                })?;
                progress.set_message(format!("{}: {} messages", device, received));
            }
            None => {
                progress.tick();
                thread::sleep(poll_interval);
            }
        }
    }

    if device.overrun_count() > 0 {
        writeln!(out, "{} input overruns", device.overrun_count())?;
    }
    device.close();
    progress.finish_and_clear();
    Ok(received)
}

pub fn monitor_spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{prefix:.bold.dim} {spinner} {wide_msg}")
            .unwrap(),
    );
    pb.set_prefix("Monitor");
    pb
}

/// Finds the enumerated device at `addr`, so it carries its name.
pub fn find_device<R: Router + Clone>(router: &R, addr: Addr) -> Result<Device<R>, CliError> {
    get_devices(router)?
        .into_iter()
        .find(|device| device.addr() == addr)
        .ok_or(CliError::NotFound(addr))
}

/// Lets the user choose an input device.
pub fn pick_device<R: Router + Clone>(router: &R) -> Result<Device<R>, CliError> {
    let mut devices: Vec<Device<R>> = get_user_devices(router)?
        .into_iter()
        .filter(|device| device.is_input())
        .collect();
    if devices.is_empty() {
        return Err(CliError::NoDevices);
    }

    let items: Vec<String> = devices.iter().map(format_device).collect();
    let index = Select::new()
        .with_prompt("Select a MIDI input")
        .items(&items)
        .default(0)
        .interact()?;
    debug!("Picked device {}", items[index]);
    Ok(devices.swap_remove(index))
}

pub fn format_device<R: Router>(device: &Device<R>) -> String {
    let direction = match (device.is_input(), device.is_output()) {
        (true, true) => "in/out",
        (true, false) => "in",
        (false, true) => "out",
        (false, false) => "-",
    };
    format!(
        "{:>7}  {:<6}  {}",
        device.addr().to_string(),
        direction,
        device.name().unwrap_or_default()
    )
}

pub fn format_bytes(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|byte| format!("{:02X}", byte))
        .collect::<Vec<_>>()
        .join(" ")
}
