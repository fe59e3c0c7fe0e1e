//! Device configuration and programmer-style option parsing

use crate::mode::SpiModeFlags;
use crate::path::DevicePath;

/// Default SPI clock speed in Hz (8 MHz)
pub const DEFAULT_SPEED_HZ: u32 = 8_000_000;

/// Configuration for opening a spidev device
#[derive(Debug, Clone)]
pub struct SpidevConfig {
    /// Device path (e.g., "/dev/spidev0.0")
    pub device: String,
    /// SPI clock speed in Hz (default: 8 MHz)
    pub speed_hz: u32,
    /// Mode byte (default: mode 0)
    pub mode: SpiModeFlags,
}

impl Default for SpidevConfig {
    fn default() -> Self {
        Self {
            device: String::new(),
            speed_hz: DEFAULT_SPEED_HZ,
            mode: SpiModeFlags::MODE_0,
        }
    }
}

impl SpidevConfig {
    /// Create a new configuration with the given device path
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            ..Default::default()
        }
    }

    /// Configuration for `/dev/spidev{bus}.{chip_select}`
    pub fn for_bus(bus: u32, chip_select: u32) -> Self {
        Self::new(DevicePath::new(bus, chip_select).to_string())
    }

    /// Set the SPI clock speed in Hz
    pub fn with_speed(mut self, speed_hz: u32) -> Self {
        self.speed_hz = speed_hz;
        self
    }

    /// Set the mode flags
    pub fn with_mode(mut self, mode: SpiModeFlags) -> Self {
        self.mode = mode;
        self
    }
}

/// Parse options from a list of key-value pairs
///
/// Recognized keys: `dev`, `bus` + `cs`, `spispeed` (kHz), `mode` (0-3).
pub fn parse_options(options: &[(&str, &str)]) -> Result<SpidevConfig, String> {
    let mut config = SpidevConfig::default();
    let mut bus: Option<u32> = None;
    let mut cs: Option<u32> = None;

    for (key, value) in options {
        match *key {
            "dev" => {
                config.device = value.to_string();
            }
            "bus" => {
                bus = Some(
                    value
                        .parse()
                        .map_err(|_| format!("Invalid bus value: {}", value))?,
                );
            }
            "cs" => {
                cs = Some(
                    value
                        .parse()
                        .map_err(|_| format!("Invalid cs value: {}", value))?,
                );
            }
            "spispeed" => {
                let speed_khz: u32 = value
                    .parse()
                    .map_err(|_| format!("Invalid spispeed value: {}", value))?;
                if speed_khz == 0 {
                    return Err("spispeed must be greater than zero".to_string());
                }
                config.speed_hz = speed_khz
                    .checked_mul(1000)
                    .ok_or_else(|| format!("spispeed too large: {}", value))?;
            }
            "mode" => {
                let mode: u8 = value
                    .parse()
                    .map_err(|_| format!("Invalid mode value: {}", value))?;
                config.mode = SpiModeFlags::from_mode_number(mode)
                    .ok_or_else(|| format!("Invalid SPI mode: {} (must be 0-3)", mode))?;
            }
            _ => {
                log::warn!("spidev: Unknown option: {}={}", key, value);
            }
        }
    }

    match (bus, cs) {
        (None, None) => {}
        (Some(_), None) | (None, Some(_)) => {
            return Err("bus and cs must be given together".to_string());
        }
        (Some(_), Some(_)) if !config.device.is_empty() => {
            return Err("Use either dev or bus/cs, not both".to_string());
        }
        (Some(bus), Some(cs)) => {
            config.device = DevicePath::new(bus, cs).to_string();
        }
    }

    if config.device.is_empty() {
        return Err("No device specified. Use dev=/dev/spidevX.Y".to_string());
    }

    Ok(config)
}
