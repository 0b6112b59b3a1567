mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use thiserror::Error;

use crate::config::ConfigError;
use crate::error::DeviceError;
use crate::router::Addr;

pub use commands::{
    find_device, format_bytes, format_device, monitor_spinner, pick_device, run_list,
    run_monitor, run_probe, run_send,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Settings file (default: alsamidi.toml in the working directory)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// List available MIDI devices
    List {
        /// Include the sequencer's own ports (Timer, Announce, Midi Through)
        #[arg(long)]
        all: bool,
    },
    /// Show whether a port can be read from and written to
    Probe {
        /// Port address as CLIENT:PORT
        addr: Addr,
    },
    /// Send one MIDI message to a device
    Send {
        /// Port address as CLIENT:PORT
        addr: Addr,
        /// Message bytes in hex, e.g. 90 40 7F
        #[arg(required = true, value_parser = parse_hex_byte)]
        bytes: Vec<u8>,
    },
    /// Print messages received from a device
    Monitor {
        /// Port address as CLIENT:PORT; asks interactively when omitted
        addr: Option<Addr>,
        /// Stop after this many messages
        #[arg(short = 'n', long)]
        count: Option<usize>,
    },
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Failed to write output: {0}")]
    Io(#[from] std::io::Error),
    #[error("Device selection failed: {0}")]
    Prompt(#[from] dialoguer::Error),
    #[error("No device at ({0})")]
    NotFound(Addr),
    #[error("No MIDI devices found")]
    NoDevices,
}

/// Parses one byte written in hex, with or without a `0x` prefix.
pub fn parse_hex_byte(s: &str) -> Result<u8, String> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u8::from_str_radix(digits, 16).map_err(|e| format!("invalid byte '{}': {}", s, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_byte() {
        assert_eq!(parse_hex_byte("90"), Ok(0x90));
        assert_eq!(parse_hex_byte("0x7f"), Ok(0x7F));
        assert_eq!(parse_hex_byte("0XF0"), Ok(0xF0));
        assert!(parse_hex_byte("100").is_err());
        assert!(parse_hex_byte("zz").is_err());
    }
}
