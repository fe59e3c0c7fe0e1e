//! CLI command implementations
//!
//! Commands are generic over the spidev backend so the `dummy` device runs
//! the same code paths as a real `/dev/spidevX.Y` node.

use crate::cli::{parse_hex_bytes, DeviceArgs};

use rspi_spidev::dummy::DummySpidev;
use rspi_spidev::{DevicePath, SpiDevice, SpiModeFlags, SpidevBackend, SpidevConfig};

/// Device name selecting the in-memory loopback emulator
pub const DUMMY_DEVICE: &str = "dummy";

type CmdResult = Result<(), Box<dyn std::error::Error>>;

/// Work to run once a device is open
pub enum Action {
    Transfer { data: Vec<u8>, at_speed: Option<u32> },
    Write { data: Vec<u8> },
    Info,
}

impl Action {
    pub fn transfer(data: &[String], at_speed: Option<u32>) -> Result<Self, String> {
        Ok(Action::Transfer {
            data: parse_hex_bytes(data)?,
            at_speed,
        })
    }

    pub fn write(data: &[String]) -> Result<Self, String> {
        Ok(Action::Write {
            data: parse_hex_bytes(data)?,
        })
    }
}

/// Build the device configuration from CLI arguments
pub fn device_config(args: &DeviceArgs) -> Result<SpidevConfig, String> {
    let device = match (&args.device, args.index, args.bus, args.cs) {
        (Some(device), _, _, _) => {
            check_device_name(device);
            device.clone()
        }
        (None, Some(index), _, _) => DevicePath::from_legacy_index(index)
            .map_err(|e| e.to_string())?
            .to_string(),
        (None, None, Some(bus), Some(cs)) => DevicePath::new(bus, cs).to_string(),
        _ => return Err("No device specified. Use --device, --index or --bus/--cs".to_string()),
    };
    let mode = SpiModeFlags::from_mode_number(args.mode)
        .ok_or_else(|| format!("Invalid SPI mode: {} (must be 0-3)", args.mode))?;

    Ok(SpidevConfig::new(device)
        .with_speed(args.speed)
        .with_mode(mode))
}

/// Log what `--device` refers to; non-standard spidev names are still opened
fn check_device_name(device: &str) {
    if device == DUMMY_DEVICE {
        return;
    }
    match device.parse::<DevicePath>() {
        Ok(path) => log::debug!("bus {}, chip select {}", path.bus, path.chip_select),
        Err(_) => log::warn!("{} is not a /dev/spidevB.C path", device),
    }
}

/// Open the device named by `args` and run `action` on it
pub fn run(args: &DeviceArgs, action: Action) -> CmdResult {
    let config = device_config(args)?;
    if config.device == DUMMY_DEVICE {
        log::info!("Using dummy loopback device");
        let spi = SpiDevice::with_backend(DummySpidev::new(), &config)?;
        run_action(&spi, action)
    } else {
        let spi = SpiDevice::open(&config)?;
        run_action(&spi, action)
    }
}

fn run_action<B: SpidevBackend>(spi: &SpiDevice<B>, action: Action) -> CmdResult {
    match action {
        Action::Transfer { mut data, at_speed } => {
            match at_speed {
                Some(speed) => spi.transfer_at(&mut data, speed)?,
                None => spi.transfer(&mut data)?,
            }
            println!("{}", format_hex(&data));
        }
        Action::Write { data } => {
            spi.write(&data)?;
            log::info!("Wrote {} bytes to {}", data.len(), spi.path());
        }
        Action::Info => print_info(spi),
    }
    Ok(())
}

fn print_info<B: SpidevBackend>(spi: &SpiDevice<B>) {
    println!("Device:        {}", spi.path());
    println!(
        "Mode:          {} (flags {:#04x})",
        spi.mode().mode_number(),
        spi.mode().bits()
    );
    println!("Bits per word: {}", spi.bits_per_word());
    println!("Max speed:     {} Hz", spi.speed_hz());
    println!("Max transfer:  {} bytes", spi.max_transfer_len());
}

/// Format bytes as space separated hex
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
