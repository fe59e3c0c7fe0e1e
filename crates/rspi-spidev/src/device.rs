//! Thread-safe spidev device
//!
//! [`SpiDevice`] opens and configures a spidev node once, then serializes
//! every transfer through a per-instance mutex so several threads can share
//! one device without interleaving their chip-select framed messages.

use crate::backend::{SpiBuffers, SpiTransfer, Spidev, SpidevBackend};
use crate::config::SpidevConfig;
use crate::error::{Result, Setting, SpidevError};
use crate::mode::SpiModeFlags;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Word size used for every message
pub const BITS_PER_WORD: u8 = 8;

/// A configured spidev device
///
/// The backend (and with it the file descriptor) is owned exclusively and
/// released exactly once when the device is dropped.
#[derive(Debug)]
pub struct SpiDevice<B: SpidevBackend = Spidev> {
    path: String,
    mode: SpiModeFlags,
    speed_hz: u32,
    bits_per_word: u8,
    max_transfer_len: usize,
    backend: Mutex<B>,
}

impl SpiDevice<Spidev> {
    /// Open and configure a spidev device
    pub fn open(config: &SpidevConfig) -> Result<Self> {
        if config.device.is_empty() {
            return Err(SpidevError::NoDevice);
        }
        check_speed(config.speed_hz)?;

        log::debug!("spidev: Opening device {}", config.device);

        let backend = Spidev::open(&config.device).map_err(|e| SpidevError::OpenFailed {
            path: config.device.clone(),
            source: e,
        })?;

        Self::with_backend(backend, config)
    }

    /// Open a device with default settings (8 MHz, mode 0)
    pub fn open_path(device: &str) -> Result<Self> {
        Self::open(&SpidevConfig::new(device))
    }
}

impl<B: SpidevBackend> SpiDevice<B> {
    /// Configure an already opened backend
    ///
    /// Mode, word size and speed are written and then read back; the values
    /// reported by the driver become the device's effective settings. On
    /// failure the backend is dropped before the error is returned.
    pub fn with_backend(mut backend: B, config: &SpidevConfig) -> Result<Self> {
        check_speed(config.speed_hz)?;

        let config_err = |setting: Setting, value: u32| {
            move |source: std::io::Error| SpidevError::Configuration {
                setting,
                value,
                source,
            }
        };

        let mode = config.mode.bits();
        backend
            .set_mode(mode)
            .map_err(config_err(Setting::Mode, u32::from(mode)))?;
        let actual_mode = backend
            .mode()
            .map_err(config_err(Setting::Mode, u32::from(mode)))?;
        if actual_mode != mode {
            log::warn!(
                "spidev: {}: requested mode {:#04x}, driver reports {:#04x}",
                config.device,
                mode,
                actual_mode
            );
        }

        backend
            .set_bits_per_word(BITS_PER_WORD)
            .map_err(config_err(Setting::BitsPerWord, u32::from(BITS_PER_WORD)))?;
        let bits_per_word = backend
            .bits_per_word()
            .map_err(config_err(Setting::BitsPerWord, u32::from(BITS_PER_WORD)))?;
        // The kernel reports 0 for the default word size, which is 8 bits
        let bits_per_word = if bits_per_word == 0 {
            BITS_PER_WORD
        } else {
            bits_per_word
        };
        if bits_per_word != BITS_PER_WORD {
            log::warn!(
                "spidev: {}: driver reports {} bits per word",
                config.device,
                bits_per_word
            );
        }

        let speed = config.speed_hz;
        backend
            .set_max_speed_hz(speed)
            .map_err(config_err(Setting::MaxSpeed, speed))?;
        let speed_hz = backend
            .max_speed_hz()
            .map_err(config_err(Setting::MaxSpeed, speed))?;
        if speed_hz != speed {
            log::warn!(
                "spidev: {}: requested {} Hz, driver reports {} Hz",
                config.device,
                speed,
                speed_hz
            );
        }

        let max_transfer_len = backend.max_transfer_len().min(u32::MAX as usize);

        log::info!(
            "spidev: Opened {} (mode={}, speed={} kHz)",
            config.device,
            SpiModeFlags::from_bits_retain(actual_mode).mode_number(),
            speed_hz / 1000
        );

        Ok(Self {
            path: config.device.clone(),
            mode: SpiModeFlags::from_bits_retain(actual_mode),
            speed_hz,
            bits_per_word,
            max_transfer_len,
            backend: Mutex::new(backend),
        })
    }

    /// Full-duplex transfer in place: `buf` is sent and then overwritten
    /// with the bytes received.
    pub fn transfer(&self, buf: &mut [u8]) -> Result<()> {
        self.submit(SpiBuffers::InPlace(buf), self.speed_hz)
    }

    /// Full-duplex transfer with separate transmit and receive buffers
    pub fn transfer_split(&self, tx: &[u8], rx: &mut [u8]) -> Result<()> {
        if tx.len() != rx.len() {
            return Err(SpidevError::LengthMismatch {
                tx: tx.len(),
                rx: rx.len(),
            });
        }
        self.submit(SpiBuffers::Split { tx, rx }, self.speed_hz)
    }

    /// Send `buf` and overwrite it with the received bytes
    ///
    /// Same message as [`transfer_split`](Self::transfer_split) with the
    /// transmit and receive buffers pointing at the same memory.
    pub fn transfer_write(&self, buf: &mut [u8]) -> Result<()> {
        self.submit(SpiBuffers::InPlace(buf), self.speed_hz)
    }

    /// Shift `data` out and discard the received bytes
    pub fn write(&self, data: &[u8]) -> Result<()> {
        self.submit(SpiBuffers::WriteOnly(data), self.speed_hz)
    }

    /// Exchange a single byte
    pub fn transfer_byte(&self, byte: u8) -> Result<u8> {
        let mut buf = [byte];
        self.transfer(&mut buf)?;
        Ok(buf[0])
    }

    /// In-place transfer clocked at `speed_hz` instead of the configured speed
    pub fn transfer_at(&self, buf: &mut [u8], speed_hz: u32) -> Result<()> {
        check_speed(speed_hz)?;
        self.submit(SpiBuffers::InPlace(buf), speed_hz)
    }

    fn submit(&self, buffers: SpiBuffers<'_>, speed_hz: u32) -> Result<()> {
        let len = buffers.len();
        if len == 0 {
            log::trace!("spidev: {}: skipping empty transfer", self.path);
            return Ok(());
        }
        if len > self.max_transfer_len {
            return Err(SpidevError::TransferTooLong {
                len,
                max: self.max_transfer_len,
            });
        }

        let mut xfer = SpiTransfer::new(buffers, speed_hz);
        xfer.bits_per_word = self.bits_per_word;

        let transferred = {
            let mut backend = self.lock();
            log::trace!(
                "spidev: {}: message of {} bytes at {} Hz",
                self.path,
                len,
                speed_hz
            );
            backend
                .transfer(&mut xfer)
                .map_err(SpidevError::Transfer)?
        };

        if transferred < len {
            return Err(SpidevError::ShortTransfer {
                requested: len,
                transferred,
            });
        }
        Ok(())
    }

    // A panic while holding the lock leaves no state to repair in the backend
    fn lock(&self) -> MutexGuard<'_, B> {
        self.backend.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Device path this device was opened from
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Effective mode as reported by the driver
    pub fn mode(&self) -> SpiModeFlags {
        self.mode
    }

    /// Effective clock speed as reported by the driver
    pub fn speed_hz(&self) -> u32 {
        self.speed_hz
    }

    pub fn bits_per_word(&self) -> u8 {
        self.bits_per_word
    }

    /// Largest message accepted by the transfer methods
    pub fn max_transfer_len(&self) -> usize {
        self.max_transfer_len
    }

    /// Release the device and return its backend
    pub fn into_backend(self) -> B {
        self.backend
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn check_speed(speed_hz: u32) -> Result<()> {
    if speed_hz == 0 {
        return Err(SpidevError::InvalidParameter(
            "SPI clock speed cannot be zero".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dummy::{DummyCall, DummyFault, DummyProbe, DummySpidev};
    use crate::error::ErrorKind;
    use std::sync::Arc;
    use std::time::Duration;

    fn open_dummy(
        dummy: DummySpidev,
        config: &SpidevConfig,
    ) -> (SpiDevice<DummySpidev>, DummyProbe) {
        let probe = dummy.probe();
        let dev = SpiDevice::with_backend(dummy, config).unwrap();
        (dev, probe)
    }

    #[test]
    fn test_configure_and_transfer_scenario() {
        let config = SpidevConfig::new("/dev/spidev0.0").with_speed(500_000);
        let dummy = DummySpidev::with_handle(5);
        assert_eq!(dummy.handle(), 5);
        let (dev, probe) = open_dummy(dummy, &config);

        assert_eq!(
            probe.calls(),
            vec![
                DummyCall::SetMode(0),
                DummyCall::GetMode,
                DummyCall::SetBitsPerWord(8),
                DummyCall::GetBitsPerWord,
                DummyCall::SetMaxSpeed(500_000),
                DummyCall::GetMaxSpeed,
            ]
        );
        assert_eq!(dev.speed_hz(), 500_000);
        assert_eq!(dev.mode(), SpiModeFlags::MODE_0);

        probe.push_response(vec![0x12, 0x34]);
        let mut buf = [0xDE, 0xAD];
        dev.transfer(&mut buf).unwrap();
        assert_eq!(buf, [0x12, 0x34]);

        let messages = probe.messages();
        assert_eq!(messages.len(), 1);
        let msg = &messages[0];
        assert_eq!(msg.tx, vec![0xDE, 0xAD]);
        assert!(msg.cs_change);
        assert_eq!(msg.bits_per_word, 8);
        assert_eq!(msg.speed_hz, 500_000);
        assert_eq!(msg.delay_usecs, 0);
        assert!(!msg.rx_discarded);
    }

    #[test]
    fn test_split_matches_in_place() {
        let config = SpidevConfig::new("/dev/spidev0.0");
        let (dev, probe) = open_dummy(DummySpidev::new(), &config);

        let mut buf = [1u8, 2, 3, 4];
        dev.transfer(&mut buf).unwrap();
        let tx = [1u8, 2, 3, 4];
        let mut rx = [0u8; 4];
        dev.transfer_split(&tx, &mut rx).unwrap();

        let messages = probe.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0], messages[1]);
        assert_eq!(rx, buf);
    }

    #[test]
    fn test_transfer_write_overwrites_in_place() {
        let config = SpidevConfig::new("/dev/spidev0.0");
        let (dev, probe) = open_dummy(DummySpidev::new(), &config);

        probe.push_response(vec![0xAA, 0xBB]);
        let mut written = [0x01u8, 0x02];
        dev.transfer_write(&mut written).unwrap();

        probe.push_response(vec![0xAA, 0xBB]);
        let mut transferred = [0x01u8, 0x02];
        dev.transfer(&mut transferred).unwrap();

        assert_eq!(written, [0xAA, 0xBB]);
        assert_eq!(written, transferred);
        let messages = probe.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0], messages[1]);
        assert!(!messages[0].rx_discarded);
    }

    #[test]
    fn test_write_discards_received_bytes() {
        let config = SpidevConfig::new("/dev/spidev0.0");
        let (dev, probe) = open_dummy(DummySpidev::new(), &config);

        probe.push_response(vec![0xAA, 0xBB]);
        let data = [0x01u8, 0x02];
        dev.write(&data).unwrap();

        let messages = probe.messages();
        assert_eq!(messages[0].tx, vec![0x01, 0x02]);
        assert_eq!(messages[0].speed_hz, dev.speed_hz());
        assert!(messages[0].cs_change);
        assert!(messages[0].rx_discarded);
    }

    #[test]
    fn test_empty_transfer_is_noop() {
        let config = SpidevConfig::new("/dev/spidev0.0");
        let (dev, probe) = open_dummy(DummySpidev::new(), &config);

        dev.transfer(&mut []).unwrap();
        dev.transfer_split(&[], &mut []).unwrap();
        dev.transfer_write(&mut []).unwrap();
        dev.write(&[]).unwrap();
        assert!(probe.messages().is_empty());
    }

    #[test]
    fn test_length_checks() {
        let config = SpidevConfig::new("/dev/spidev0.0");
        let dummy = DummySpidev::new().with_max_transfer_len(16);
        let (dev, probe) = open_dummy(dummy, &config);
        assert_eq!(dev.max_transfer_len(), 16);

        let mut rx = [0u8; 3];
        let err = dev.transfer_split(&[1, 2], &mut rx).unwrap_err();
        assert!(matches!(err, SpidevError::LengthMismatch { tx: 2, rx: 3 }));

        let mut big = [0u8; 17];
        let err = dev.transfer(&mut big).unwrap_err();
        assert!(matches!(err, SpidevError::TransferTooLong { len: 17, max: 16 }));
        assert!(probe.messages().is_empty());

        let mut fits = [0u8; 16];
        dev.transfer(&mut fits).unwrap();
    }

    #[test]
    fn test_transfer_failures() {
        let config = SpidevConfig::new("/dev/spidev0.0");
        let (dev, probe) = open_dummy(DummySpidev::new(), &config);

        probe.inject(DummyFault::ShortTransfer(1));
        let mut buf = [0u8; 4];
        let err = dev.transfer(&mut buf).unwrap_err();
        assert!(matches!(
            err,
            SpidevError::ShortTransfer {
                requested: 4,
                transferred: 1
            }
        ));
        assert_eq!(err.kind(), ErrorKind::Transfer);

        probe.clear_faults();
        probe.inject(DummyFault::Transfer);
        let err = dev.transfer_byte(0xFF).unwrap_err();
        assert!(matches!(err, SpidevError::Transfer(_)));
        assert_eq!(err.raw_os_error(), Some(libc::EIO));

        probe.clear_faults();
        assert_eq!(dev.transfer_byte(0x5A).unwrap(), 0x5A);
    }

    #[test]
    fn test_configuration_failure_closes_once() {
        let faults = [
            (DummyFault::SetMode, Setting::Mode),
            (DummyFault::GetMode, Setting::Mode),
            (DummyFault::SetBitsPerWord, Setting::BitsPerWord),
            (DummyFault::GetBitsPerWord, Setting::BitsPerWord),
            (DummyFault::SetMaxSpeed, Setting::MaxSpeed),
            (DummyFault::GetMaxSpeed, Setting::MaxSpeed),
        ];
        for (fault, expected) in faults {
            let dummy = DummySpidev::new();
            let probe = dummy.probe();
            probe.inject(fault);

            let err = SpiDevice::with_backend(dummy, &SpidevConfig::new("/dev/spidev0.0"))
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Configuration);
            match err {
                SpidevError::Configuration { setting, .. } => assert_eq!(setting, expected),
                other => panic!("unexpected error: {other}"),
            }
            assert_eq!(probe.close_count(), 1);
        }
    }

    #[test]
    fn test_zero_speed_rejected_before_io() {
        let dummy = DummySpidev::new();
        let probe = dummy.probe();
        let config = SpidevConfig::new("/dev/spidev0.0").with_speed(0);

        let err = SpiDevice::with_backend(dummy, &config).unwrap_err();
        assert!(matches!(err, SpidevError::InvalidParameter(_)));
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert!(probe.calls().is_empty());
        assert_eq!(probe.close_count(), 1);

        let err = SpiDevice::open(&SpidevConfig::new("/dev/spidev-missing.9").with_speed(0))
            .unwrap_err();
        assert!(matches!(err, SpidevError::InvalidParameter(_)));
    }

    #[test]
    fn test_drop_closes_once() {
        let config = SpidevConfig::new("/dev/spidev0.0");
        let (dev, probe) = open_dummy(DummySpidev::new(), &config);
        assert_eq!(probe.close_count(), 0);
        drop(dev);
        assert_eq!(probe.close_count(), 1);
    }

    #[test]
    fn test_open_failures() {
        let err = SpiDevice::open(&SpidevConfig::default()).unwrap_err();
        assert!(matches!(err, SpidevError::NoDevice));

        let err = SpiDevice::open_path("/dev/spidev-missing.9").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Open);
        assert_eq!(err.raw_os_error(), Some(libc::ENOENT));
    }

    #[test]
    fn test_driver_adjusted_settings() {
        let config = SpidevConfig::new("/dev/spidev0.0")
            .with_speed(20_000_000)
            .with_mode(SpiModeFlags::MODE_3);
        let dummy = DummySpidev::new().with_speed_limit(10_000_000);
        let (dev, probe) = open_dummy(dummy, &config);
        assert_eq!(dev.speed_hz(), 10_000_000);
        assert_eq!(dev.mode().mode_number(), 3);

        dev.transfer_byte(0).unwrap();
        assert_eq!(probe.messages()[0].speed_hz, 10_000_000);
    }

    #[test]
    fn test_transfer_at_overrides_speed() {
        let config = SpidevConfig::new("/dev/spidev0.0");
        let (dev, probe) = open_dummy(DummySpidev::new(), &config);

        let mut buf = [0xAB];
        dev.transfer_at(&mut buf, 250_000).unwrap();
        dev.transfer(&mut buf).unwrap();
        let messages = probe.messages();
        assert_eq!(messages[0].speed_hz, 250_000);
        assert_eq!(messages[1].speed_hz, 8_000_000);

        assert!(matches!(
            dev.transfer_at(&mut buf, 0),
            Err(SpidevError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_concurrent_transfers_do_not_overlap() {
        let config = SpidevConfig::new("/dev/spidev0.0");
        let dummy = DummySpidev::new().with_latency(Duration::from_millis(2));
        let (dev, probe) = open_dummy(dummy, &config);
        let dev = Arc::new(dev);

        let threads: Vec<_> = (0..4u8)
            .map(|id| {
                let dev = Arc::clone(&dev);
                std::thread::spawn(move || {
                    for _ in 0..5 {
                        let mut buf = [id; 8];
                        dev.transfer(&mut buf).unwrap();
                        assert_eq!(buf, [id; 8]);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        assert_eq!(probe.max_in_flight(), 1);
        let messages = probe.messages();
        assert_eq!(messages.len(), 20);
        for msg in messages {
            assert!(msg.tx.iter().all(|&b| b == msg.tx[0]));
        }
    }
}
