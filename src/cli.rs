//! CLI argument parsing

use clap::{Args, Parser, Subcommand};

/// Parse a string as a hex or decimal u32
fn parse_hex_u32(s: &str) -> Result<u32, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u32>().map_err(|e| format!("Invalid number: {}", e))
    }
}

/// Parse a clock speed in Hz, rejecting zero
fn parse_speed_hz(s: &str) -> Result<u32, String> {
    match parse_hex_u32(s)? {
        0 => Err("Clock speed must be greater than zero".to_string()),
        speed => Ok(speed),
    }
}

/// Parse hex byte arguments
///
/// Each argument is either a run of hex digit pairs (`DEADBEEF`) or a single
/// byte with an optional `0x` prefix (`0xde`, `5`).
pub fn parse_hex_bytes(args: &[String]) -> Result<Vec<u8>, String> {
    let mut bytes = Vec::new();
    for arg in args {
        let digits = arg
            .strip_prefix("0x")
            .or_else(|| arg.strip_prefix("0X"))
            .unwrap_or(arg);
        if digits.is_empty() || !digits.is_ascii() {
            return Err(format!("Invalid hex data: {:?}", arg));
        }
        if digits.len() <= 2 {
            bytes.push(
                u8::from_str_radix(digits, 16)
                    .map_err(|_| format!("Invalid hex data: {:?}", arg))?,
            );
            continue;
        }
        if digits.len() % 2 != 0 {
            return Err(format!("Odd number of hex digits in {:?}", arg));
        }
        for pair in digits.as_bytes().chunks(2) {
            let pair =
                core::str::from_utf8(pair).map_err(|_| format!("Invalid hex data: {:?}", arg))?;
            bytes.push(
                u8::from_str_radix(pair, 16).map_err(|_| format!("Invalid hex data: {:?}", arg))?,
            );
        }
    }
    Ok(bytes)
}

#[derive(Parser)]
#[command(name = "rspi")]
#[command(author, version, about = "Linux spidev transfer tool", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Device selection and bus settings shared across commands
#[derive(Args, Debug, Clone)]
pub struct DeviceArgs {
    /// spidev node (e.g. /dev/spidev0.0), or "dummy" for a loopback emulator
    #[arg(short, long, conflicts_with_all = ["bus", "cs", "index"])]
    pub device: Option<String>,

    /// Two-digit bus/chip-select index (23 selects /dev/spidev2.3)
    #[arg(long, conflicts_with_all = ["bus", "cs"])]
    pub index: Option<u32>,

    /// Bus number, used with --cs instead of --device
    #[arg(long, requires = "cs")]
    pub bus: Option<u32>,

    /// Chip-select index, used with --bus instead of --device
    #[arg(long, requires = "bus")]
    pub cs: Option<u32>,

    /// Clock speed in Hz (hex with 0x prefix accepted)
    #[arg(short, long, default_value = "8000000", value_parser = parse_speed_hz)]
    pub speed: u32,

    /// SPI mode (0-3)
    #[arg(short, long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=3))]
    pub mode: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Full-duplex transfer; prints the received bytes
    Transfer {
        #[command(flatten)]
        device: DeviceArgs,

        /// Override the clock speed for this message only (Hz)
        #[arg(long, value_parser = parse_speed_hz)]
        at_speed: Option<u32>,

        /// Bytes to send, in hex (e.g. DEADBEEF or 0xde 0xad)
        #[arg(required = true)]
        data: Vec<String>,
    },

    /// Send bytes and discard what comes back
    Write {
        #[command(flatten)]
        device: DeviceArgs,

        /// Bytes to send, in hex
        #[arg(required = true)]
        data: Vec<String>,
    },

    /// Open a device and show its effective settings
    Info {
        #[command(flatten)]
        device: DeviceArgs,
    },
}
