//! The seam between [`SpiDevice`](crate::SpiDevice) and the kernel
//!
//! [`SpidevBackend`] covers the handful of spidev ioctls the device uses.
//! [`Spidev`] implements it over an open `/dev/spidevX.Y` node; the
//! [`dummy`](crate::dummy) module provides an in-memory stand-in.

use crate::ioctl::{self, SpiIocTransfer};

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::AsRawFd;

/// Path to kernel spidev buffer size parameter
const BUF_SIZE_SYSFS: &str = "/sys/module/spidev/parameters/bufsiz";

/// Transmit/receive buffers of a single message
#[derive(Debug)]
pub enum SpiBuffers<'a> {
    /// Shift out `buf` and overwrite it with the received bytes
    InPlace(&'a mut [u8]),
    /// Shift out `tx`, store the received bytes in `rx` (same length)
    Split { tx: &'a [u8], rx: &'a mut [u8] },
    /// Shift out `tx`, discard what comes back
    WriteOnly(&'a [u8]),
}

impl SpiBuffers<'_> {
    /// Number of bytes clocked on the bus
    pub fn len(&self) -> usize {
        match self {
            SpiBuffers::InPlace(buf) => buf.len(),
            SpiBuffers::Split { tx, .. } => tx.len(),
            SpiBuffers::WriteOnly(tx) => tx.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes that go out on MOSI
    pub fn tx(&self) -> &[u8] {
        match self {
            SpiBuffers::InPlace(buf) => &**buf,
            SpiBuffers::Split { tx, .. } => *tx,
            SpiBuffers::WriteOnly(tx) => *tx,
        }
    }

    /// Destination for MISO bytes, `None` if they are discarded
    pub fn rx_mut(&mut self) -> Option<&mut [u8]> {
        match self {
            SpiBuffers::InPlace(buf) => Some(&mut **buf),
            SpiBuffers::Split { rx, .. } => Some(&mut **rx),
            SpiBuffers::WriteOnly(_) => None,
        }
    }
}

/// One chip-select framed bus transaction
#[derive(Debug)]
pub struct SpiTransfer<'a> {
    pub buffers: SpiBuffers<'a>,
    /// Clock speed for this message in Hz
    pub speed_hz: u32,
    pub bits_per_word: u8,
    /// Delay after the message before CS changes, in microseconds
    pub delay_usecs: u16,
    /// Deselect the chip after this message
    pub cs_change: bool,
}

impl<'a> SpiTransfer<'a> {
    /// A message with the parameters used for every transfer: 8-bit words,
    /// no delay, chip select toggled at the end.
    pub fn new(buffers: SpiBuffers<'a>, speed_hz: u32) -> Self {
        Self {
            buffers,
            speed_hz,
            bits_per_word: 8,
            delay_usecs: 0,
            cs_change: true,
        }
    }
}

/// Operations a spidev handle has to provide
///
/// Implementations own their handle; dropping the backend releases it.
pub trait SpidevBackend {
    /// Write the mode byte (`SPI_IOC_WR_MODE`)
    fn set_mode(&mut self, mode: u8) -> io::Result<()>;
    /// Read the mode byte back (`SPI_IOC_RD_MODE`)
    fn mode(&mut self) -> io::Result<u8>;
    fn set_bits_per_word(&mut self, bits: u8) -> io::Result<()>;
    fn bits_per_word(&mut self) -> io::Result<u8>;
    fn set_max_speed_hz(&mut self, speed_hz: u32) -> io::Result<()>;
    fn max_speed_hz(&mut self) -> io::Result<u32>;

    /// Largest message a single `SPI_IOC_MESSAGE` call accepts
    fn max_transfer_len(&self) -> usize;

    /// Run one message, returning the number of bytes transferred
    fn transfer(&mut self, xfer: &mut SpiTransfer<'_>) -> io::Result<usize>;
}

/// Linux spidev character device
#[derive(Debug)]
pub struct Spidev {
    /// File handle for spidev device, closed on drop
    file: File,
    /// Maximum kernel buffer size
    max_kernel_buf_size: usize,
}

impl Spidev {
    /// Open `path` for reading and writing
    pub fn open(path: &str) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let max_kernel_buf_size = get_max_kernel_buf_size();
        log::debug!(
            "spidev: Max kernel buffer size: {} bytes",
            max_kernel_buf_size
        );
        Ok(Self {
            file,
            max_kernel_buf_size,
        })
    }
}

fn errno_to_io(e: nix::errno::Errno) -> io::Error {
    io::Error::from_raw_os_error(e as i32)
}

impl SpidevBackend for Spidev {
    fn set_mode(&mut self, mode: u8) -> io::Result<()> {
        unsafe { ioctl::spi_ioc_wr_mode(self.file.as_raw_fd(), &mode) }
            .map(drop)
            .map_err(errno_to_io)
    }

    fn mode(&mut self) -> io::Result<u8> {
        let mut mode = 0u8;
        unsafe { ioctl::spi_ioc_rd_mode(self.file.as_raw_fd(), &mut mode) }
            .map_err(errno_to_io)?;
        Ok(mode)
    }

    fn set_bits_per_word(&mut self, bits: u8) -> io::Result<()> {
        unsafe { ioctl::spi_ioc_wr_bits_per_word(self.file.as_raw_fd(), &bits) }
            .map(drop)
            .map_err(errno_to_io)
    }

    fn bits_per_word(&mut self) -> io::Result<u8> {
        let mut bits = 0u8;
        unsafe { ioctl::spi_ioc_rd_bits_per_word(self.file.as_raw_fd(), &mut bits) }
            .map_err(errno_to_io)?;
        Ok(bits)
    }

    fn set_max_speed_hz(&mut self, speed_hz: u32) -> io::Result<()> {
        unsafe { ioctl::spi_ioc_wr_max_speed_hz(self.file.as_raw_fd(), &speed_hz) }
            .map(drop)
            .map_err(errno_to_io)
    }

    fn max_speed_hz(&mut self) -> io::Result<u32> {
        let mut speed = 0u32;
        unsafe { ioctl::spi_ioc_rd_max_speed_hz(self.file.as_raw_fd(), &mut speed) }
            .map_err(errno_to_io)?;
        Ok(speed)
    }

    fn max_transfer_len(&self) -> usize {
        self.max_kernel_buf_size
    }

    fn transfer(&mut self, xfer: &mut SpiTransfer<'_>) -> io::Result<usize> {
        let raw = [SpiIocTransfer::from_transfer(xfer)];
        // `raw` points into `xfer`'s buffers, which outlive this call
        let ret = unsafe { ioctl::spi_ioc_message(self.file.as_raw_fd(), &raw) }
            .map_err(errno_to_io)?;
        Ok(ret as usize)
    }
}

/// Read the maximum kernel buffer size from sysfs, or use page size as fallback
fn get_max_kernel_buf_size() -> usize {
    if let Ok(content) = std::fs::read_to_string(BUF_SIZE_SYSFS) {
        if let Some(size) = parse_bufsiz(&content) {
            log::debug!("spidev: Using buffer size {} from sysfs", size);
            return size;
        }
        log::warn!("spidev: Invalid buffer size in {}", BUF_SIZE_SYSFS);
    } else {
        log::debug!("spidev: Cannot read {}, using page size", BUF_SIZE_SYSFS);
    }

    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if page_size > 0 {
        page_size as usize
    } else {
        4096
    }
}

/// Parse the contents of the spidev `bufsiz` parameter
fn parse_bufsiz(content: &str) -> Option<usize> {
    match content.trim().parse::<u32>() {
        Ok(0) | Err(_) => None,
        Ok(size) => Some(size as usize),
    }
}
