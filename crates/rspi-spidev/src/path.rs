//! `/dev/spidevB.C` device paths

use crate::error::{Result, SpidevError};

use core::fmt;
use core::str::FromStr;

const PREFIX: &str = "/dev/spidev";

/// Bus and chip-select pair naming a spidev node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DevicePath {
    pub bus: u32,
    pub chip_select: u32,
}

impl DevicePath {
    pub fn new(bus: u32, chip_select: u32) -> Self {
        Self { bus, chip_select }
    }

    /// Decode the two-digit integer form, e.g. `23` -> `/dev/spidev2.3`.
    ///
    /// Only `0..=99` is representable; anything larger is rejected.
    pub fn from_legacy_index(index: u32) -> Result<Self> {
        if index > 99 {
            return Err(SpidevError::InvalidPath(format!(
                "legacy bus index {} out of range (0-99)",
                index
            )));
        }
        Ok(Self::new(index / 10, index % 10))
    }
}

impl fmt::Display for DevicePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}.{}", PREFIX, self.bus, self.chip_select)
    }
}

impl FromStr for DevicePath {
    type Err = SpidevError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || SpidevError::InvalidPath(s.to_string());
        let rest = s.strip_prefix(PREFIX).ok_or_else(invalid)?;
        let (bus, cs) = rest.split_once('.').ok_or_else(invalid)?;
        let bus = bus.parse().map_err(|_| invalid())?;
        let chip_select = cs.parse().map_err(|_| invalid())?;
        Ok(Self::new(bus, chip_select))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(DevicePath::new(0, 0).to_string(), "/dev/spidev0.0");
        assert_eq!(DevicePath::new(12, 3).to_string(), "/dev/spidev12.3");
    }

    #[test]
    fn test_legacy_index() {
        assert_eq!(
            DevicePath::from_legacy_index(23).unwrap().to_string(),
            "/dev/spidev2.3"
        );
        assert_eq!(
            DevicePath::from_legacy_index(1).unwrap(),
            DevicePath::new(0, 1)
        );
        assert!(matches!(
            DevicePath::from_legacy_index(100),
            Err(SpidevError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_parse() {
        let path: DevicePath = "/dev/spidev1.2".parse().unwrap();
        assert_eq!(path, DevicePath::new(1, 2));
        assert!("/dev/spidev1".parse::<DevicePath>().is_err());
        assert!("/dev/ttyUSB0".parse::<DevicePath>().is_err());
        assert!("/dev/spidevA.0".parse::<DevicePath>().is_err());
    }
}
