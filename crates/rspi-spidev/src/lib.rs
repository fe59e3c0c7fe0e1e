//! rspi-spidev - Linux spidev access
//!
//! This crate wraps the Linux spidev character device (`/dev/spidevX.Y`)
//! in a small, thread-safe [`SpiDevice`].
//!
//! # Overview
//!
//! A device is opened once, configured with a mode and a maximum clock
//! speed, and then used for full-duplex transfers. Words are always 8 bits
//! wide, every message deselects the chip when it completes, and transfers
//! from several threads are serialized by a lock owned by the device.
//!
//! # Example
//!
//! ```no_run
//! use rspi_spidev::{SpiDevice, SpiModeFlags, SpidevConfig};
//!
//! let config = SpidevConfig::new("/dev/spidev0.0")
//!     .with_speed(500_000)
//!     .with_mode(SpiModeFlags::MODE_0);
//! let spi = SpiDevice::open(&config)?;
//!
//! // Send two bytes, receive two bytes in their place
//! let mut buf = [0xDE, 0xAD];
//! spi.transfer(&mut buf)?;
//! println!("received {:02X?}", buf);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # System Requirements
//!
//! - Linux kernel with spidev support enabled (`CONFIG_SPI_SPIDEV`)
//! - Read/write access to `/dev/spidevX.Y` device
//! - May require adding user to `spi` group or using udev rules

pub mod backend;
pub mod config;
pub mod device;
pub mod dummy;
pub mod error;
pub mod ioctl;
pub mod mode;
pub mod path;

// Re-exports
pub use backend::{SpiBuffers, SpiTransfer, Spidev, SpidevBackend};
pub use config::{parse_options, SpidevConfig, DEFAULT_SPEED_HZ};
pub use device::{SpiDevice, BITS_PER_WORD};
pub use error::{ErrorKind, Result, Setting, SpidevError};
pub use mode::SpiModeFlags;
pub use path::DevicePath;

/// Open a spidev device from programmer-style `key=value` options
///
/// # Example Options
///
/// - `dev=/dev/spidev0.0` - device path
/// - `bus=0,cs=1` - alternative to `dev`
/// - `spispeed=4000` - Optional: speed in kHz (default: 8000)
/// - `mode=0` - Optional: SPI mode 0-3 (default: 0)
pub fn open_spidev(
    options: &[(&str, &str)],
) -> std::result::Result<SpiDevice, Box<dyn std::error::Error>> {
    let config = parse_options(options)?;
    Ok(SpiDevice::open(&config)?)
}
