//! CLI argument definitions using clap.

use clap::{Parser, ValueEnum};

/// How the sensor board is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Serial port
    Usb,
    /// Board's HTTP server on the local network
    Wifi,
}

#[derive(Debug, Parser)]
#[command(name = "dewdrop")]
#[command(author, version, about = "Indoor dew point poller for dewdrop sensor boards", long_about = None)]
pub struct Cli {
    /// How the sensor board is attached
    #[arg(value_enum, env = "DEWDROP_MODE")]
    pub mode: Mode,

    /// Serial port of the board (usb mode)
    #[arg(short, long, env = "DEWDROP_PORT", required_if_eq("mode", "usb"))]
    pub port: Option<String>,

    /// Serial baud rate (usb mode)
    #[arg(short, long, env = "DEWDROP_BAUD", default_value_t = 115_200)]
    pub baud: u32,

    /// Base URL of the board, e.g. http://192.168.1.50 (wifi mode)
    #[arg(short, long, env = "DEWDROP_DEVICE_URL", required_if_eq("mode", "wifi"))]
    pub device_url: Option<String>,

    /// Base URL of the dewdrop service
    #[arg(
        short,
        long,
        env = "DEWDROP_SERVER_URL",
        default_value = "http://127.0.0.1:5000"
    )]
    pub server_url: String,

    /// Seconds between cycles
    #[arg(
        short,
        long,
        env = "DEWDROP_INTERVAL",
        default_value_t = 60,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub interval: u64,

    /// Run a single cycle and exit
    #[arg(long)]
    pub once: bool,

    /// Enable verbose output
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long)]
    pub quiet: bool,
}
