//! Linux spidev ioctl definitions
//!
//! Mirrors `<linux/spi/spidev.h>`. Mode and word size are single bytes,
//! the clock speed is a `u32`, and `SPI_IOC_MESSAGE(n)` takes an array of
//! `n` [`SpiIocTransfer`] records.

use crate::backend::{SpiBuffers, SpiTransfer};

use nix::{ioctl_read, ioctl_write_buf, ioctl_write_ptr};

/// SPI ioctl magic number
pub const SPI_IOC_MAGIC: u8 = b'k';

const SPI_IOC_NR_MESSAGE: u8 = 0;
const SPI_IOC_NR_MODE: u8 = 1;
const SPI_IOC_NR_BITS_PER_WORD: u8 = 3;
const SPI_IOC_NR_MAX_SPEED_HZ: u8 = 4;

ioctl_read!(spi_ioc_rd_mode, SPI_IOC_MAGIC, SPI_IOC_NR_MODE, u8);
ioctl_write_ptr!(spi_ioc_wr_mode, SPI_IOC_MAGIC, SPI_IOC_NR_MODE, u8);
ioctl_read!(
    spi_ioc_rd_bits_per_word,
    SPI_IOC_MAGIC,
    SPI_IOC_NR_BITS_PER_WORD,
    u8
);
ioctl_write_ptr!(
    spi_ioc_wr_bits_per_word,
    SPI_IOC_MAGIC,
    SPI_IOC_NR_BITS_PER_WORD,
    u8
);
ioctl_read!(
    spi_ioc_rd_max_speed_hz,
    SPI_IOC_MAGIC,
    SPI_IOC_NR_MAX_SPEED_HZ,
    u32
);
ioctl_write_ptr!(
    spi_ioc_wr_max_speed_hz,
    SPI_IOC_MAGIC,
    SPI_IOC_NR_MAX_SPEED_HZ,
    u32
);

// SPI_IOC_MESSAGE(n) = _IOW(SPI_IOC_MAGIC, 0, char[n * sizeof(struct spi_ioc_transfer)])
ioctl_write_buf!(
    spi_ioc_message,
    SPI_IOC_MAGIC,
    SPI_IOC_NR_MESSAGE,
    SpiIocTransfer
);

/// Request code of `SPI_IOC_MESSAGE(n)`
pub fn spi_ioc_message_code(n: usize) -> nix::sys::ioctl::ioctl_num_type {
    nix::request_code_write!(
        SPI_IOC_MAGIC,
        SPI_IOC_NR_MESSAGE,
        n * core::mem::size_of::<SpiIocTransfer>()
    )
}

/// SPI transfer structure for ioctl
/// This must match the kernel's struct spi_ioc_transfer layout
#[repr(C)]
#[derive(Debug, Default, Clone)]
pub struct SpiIocTransfer {
    pub tx_buf: u64,          // __u64 tx_buf
    pub rx_buf: u64,          // __u64 rx_buf
    pub len: u32,             // __u32 len
    pub speed_hz: u32,        // __u32 speed_hz
    pub delay_usecs: u16,     // __u16 delay_usecs
    pub bits_per_word: u8,    // __u8 bits_per_word
    pub cs_change: u8,        // __u8 cs_change
    pub tx_nbits: u8,         // __u8 tx_nbits
    pub rx_nbits: u8,         // __u8 rx_nbits
    pub word_delay_usecs: u8, // __u8 word_delay_usecs
    pub _pad: u8,
}

impl SpiIocTransfer {
    /// Build the kernel record for `xfer`.
    ///
    /// The record holds raw pointers into `xfer`'s buffers and must not be
    /// used after `xfer` is dropped. A null `rx_buf` tells spidev to discard
    /// the received bytes.
    pub fn from_transfer(xfer: &mut SpiTransfer<'_>) -> Self {
        let (tx_buf, rx_buf, len) = match &mut xfer.buffers {
            SpiBuffers::InPlace(buf) => {
                let rx = buf.as_mut_ptr() as u64;
                (buf.as_ptr() as u64, rx, buf.len())
            }
            SpiBuffers::Split { tx, rx } => {
                (tx.as_ptr() as u64, rx.as_mut_ptr() as u64, tx.len())
            }
            SpiBuffers::WriteOnly(tx) => (tx.as_ptr() as u64, 0, tx.len()),
        };

        Self {
            tx_buf,
            rx_buf,
            len: len as u32,
            speed_hz: xfer.speed_hz,
            delay_usecs: xfer.delay_usecs,
            bits_per_word: xfer.bits_per_word,
            cs_change: u8::from(xfer.cs_change),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_struct_layout() {
        assert_eq!(core::mem::size_of::<SpiIocTransfer>(), 32);
    }

    #[cfg(any(target_arch = "x86_64", target_arch = "aarch64", target_arch = "arm"))]
    #[test]
    fn test_message_request_code() {
        assert_eq!(spi_ioc_message_code(1) as u64, 0x4020_6b00);
        assert_eq!(spi_ioc_message_code(2) as u64, 0x4040_6b00);
    }

    #[test]
    fn test_from_transfer_in_place() {
        let mut buf = [0xDE, 0xAD, 0xBE];
        let ptr = buf.as_ptr() as u64;
        let mut xfer = SpiTransfer::new(SpiBuffers::InPlace(&mut buf), 500_000);
        let raw = SpiIocTransfer::from_transfer(&mut xfer);
        assert_eq!(raw.tx_buf, ptr);
        assert_eq!(raw.rx_buf, ptr);
        assert_eq!(raw.len, 3);
        assert_eq!(raw.speed_hz, 500_000);
        assert_eq!(raw.bits_per_word, 8);
        assert_eq!(raw.cs_change, 1);
        assert_eq!(raw.delay_usecs, 0);
    }

    #[test]
    fn test_from_transfer_write_only() {
        let data = [1u8, 2];
        let mut xfer = SpiTransfer::new(SpiBuffers::WriteOnly(&data), 1_000_000);
        let raw = SpiIocTransfer::from_transfer(&mut xfer);
        assert_eq!(raw.tx_buf, data.as_ptr() as u64);
        assert_eq!(raw.rx_buf, 0);
        assert_eq!(raw.len, 2);
    }
}
