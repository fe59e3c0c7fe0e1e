//! Error types for spidev operations

use core::fmt;
use thiserror::Error;

/// Device setting touched by a configuration ioctl
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Setting {
    /// SPI mode byte (`SPI_IOC_{RD,WR}_MODE`)
    Mode,
    /// Word size (`SPI_IOC_{RD,WR}_BITS_PER_WORD`)
    BitsPerWord,
    /// Maximum clock speed (`SPI_IOC_{RD,WR}_MAX_SPEED_HZ`)
    MaxSpeed,
}

impl fmt::Display for Setting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Setting::Mode => f.write_str("SPI mode"),
            Setting::BitsPerWord => f.write_str("bits per word"),
            Setting::MaxSpeed => f.write_str("max speed"),
        }
    }
}

/// Coarse classification of a [`SpidevError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The device node could not be opened
    Open,
    /// Mode, word size or speed could not be applied
    Configuration,
    /// A bus transaction failed or was rejected
    Transfer,
    /// Bad arguments, detected before touching the device
    Usage,
}

/// spidev specific errors
#[derive(Debug, Error)]
pub enum SpidevError {
    /// Device not specified
    #[error("No device specified. Use dev=/dev/spidevX.Y")]
    NoDevice,

    /// Malformed or out of range device path
    #[error("Invalid device path: {0}")]
    InvalidPath(String),

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Failed to open device
    #[error("Failed to open {path}: {source}")]
    OpenFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A configuration ioctl failed
    #[error("Failed to configure {setting} ({value}): {source}")]
    Configuration {
        setting: Setting,
        value: u32,
        #[source]
        source: std::io::Error,
    },

    /// The SPI_IOC_MESSAGE ioctl failed
    #[error("SPI transfer failed: {0}")]
    Transfer(#[source] std::io::Error),

    /// The kernel reported fewer bytes than requested
    #[error("Short SPI transfer: {transferred} of {requested} bytes")]
    ShortTransfer { requested: usize, transferred: usize },

    /// Transmit and receive buffers differ in length
    #[error("Buffer length mismatch: tx={tx}, rx={rx}")]
    LengthMismatch { tx: usize, rx: usize },

    /// Message exceeds what one ioctl can carry
    #[error("Transfer of {len} bytes exceeds the {max} byte limit")]
    TransferTooLong { len: usize, max: usize },
}

impl SpidevError {
    /// Which stage of the device lifecycle produced this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            SpidevError::OpenFailed { .. } => ErrorKind::Open,
            SpidevError::Configuration { .. } => ErrorKind::Configuration,
            SpidevError::Transfer(_)
            | SpidevError::ShortTransfer { .. }
            | SpidevError::LengthMismatch { .. }
            | SpidevError::TransferTooLong { .. } => ErrorKind::Transfer,
            SpidevError::NoDevice
            | SpidevError::InvalidPath(_)
            | SpidevError::InvalidParameter(_) => ErrorKind::Usage,
        }
    }

    /// Underlying OS error code, if any
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            SpidevError::OpenFailed { source, .. }
            | SpidevError::Configuration { source, .. }
            | SpidevError::Transfer(source) => source.raw_os_error(),
            _ => None,
        }
    }
}

/// Result type for spidev operations
pub type Result<T> = std::result::Result<T, SpidevError>;
