//! SPI mode flags
//!
//! The values match the `SPI_*` mode bits of `<linux/spi/spidev.h>` that
//! fit in the 8-bit `SPI_IOC_WR_MODE` ioctl.

use bitflags::bitflags;

bitflags! {
    /// spidev mode byte
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SpiModeFlags: u8 {
        /// Clock phase: sample on the trailing edge
        const CPHA      = 0x01;
        /// Clock polarity: idle high
        const CPOL      = 0x02;
        /// Chip select is active high
        const CS_HIGH   = 0x04;
        /// Shift the least significant bit first
        const LSB_FIRST = 0x08;
        /// MOSI and MISO share one line
        const THREE_WIRE = 0x10;
        /// Loopback mode
        const LOOP      = 0x20;
        /// One device per bus, no chip select
        const NO_CS     = 0x40;
        /// Slave pulls low to pause
        const READY     = 0x80;

        /// SPI mode 0: CPOL=0, CPHA=0
        const MODE_0 = 0;
        /// SPI mode 1: CPOL=0, CPHA=1
        const MODE_1 = Self::CPHA.bits();
        /// SPI mode 2: CPOL=1, CPHA=0
        const MODE_2 = Self::CPOL.bits();
        /// SPI mode 3: CPOL=1, CPHA=1
        const MODE_3 = Self::CPOL.bits() | Self::CPHA.bits();
    }
}

impl Default for SpiModeFlags {
    fn default() -> Self {
        SpiModeFlags::MODE_0
    }
}

impl SpiModeFlags {
    /// Flags for one of the four classic SPI modes (0-3)
    pub fn from_mode_number(mode: u8) -> Option<Self> {
        match mode {
            0 => Some(Self::MODE_0),
            1 => Some(Self::MODE_1),
            2 => Some(Self::MODE_2),
            3 => Some(Self::MODE_3),
            _ => None,
        }
    }

    /// Classic mode number (0-3) encoded by CPOL/CPHA
    pub fn mode_number(&self) -> u8 {
        (*self & Self::MODE_3).bits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_numbers() {
        for n in 0..4 {
            let mode = SpiModeFlags::from_mode_number(n).unwrap();
            assert_eq!(mode.mode_number(), n);
        }
        assert_eq!(SpiModeFlags::from_mode_number(4), None);
        assert_eq!(SpiModeFlags::default().bits(), 0);
    }

    #[test]
    fn test_extra_flags_keep_mode_number() {
        let mode = SpiModeFlags::MODE_3 | SpiModeFlags::NO_CS | SpiModeFlags::LSB_FIRST;
        assert_eq!(mode.bits(), 0x4B);
        assert_eq!(mode.mode_number(), 3);
    }
}
