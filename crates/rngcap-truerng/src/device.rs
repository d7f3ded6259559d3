//! TrueRNG device implementation
//!
//! This module provides the `TrueRng` session, which reads the raw byte
//! stream of a TrueRNG presented as a serial port, plus enumeration and the
//! knock sequence used to switch capture modes.

use std::io::Read;
use std::thread;
use std::time::{Duration, Instant};

use rngcap_core::{
    DeviceDescriptor, EntropySource, Error, PortMetadata, Result, TransportKind,
};
use serialport::{
    ClearBuffer, DataBits, FlowControl, Parity, SerialPort, SerialPortInfo, SerialPortType,
    StopBits,
};

use crate::error::{from_serial, open_failed};
use crate::mode::CaptureMode;
use crate::protocol::*;

/// Session options for a TrueRNG
#[derive(Debug, Clone)]
pub struct TrueRngConfig {
    /// Capture mode applied by the knock sequence
    pub mode: CaptureMode,
    /// Run the knock sequence before opening
    ///
    /// Off by default: on real hardware the sequence can make the device
    /// drop off the bus and re-enumerate.
    pub knock: bool,
    /// Timeout of a single OS read call
    pub read_poll: Duration,
    /// Pulse DTR after opening a long-lived session
    pub dtr_pulse: bool,
}

impl Default for TrueRngConfig {
    fn default() -> Self {
        Self {
            mode: CaptureMode::Normal,
            knock: false,
            read_poll: READ_POLL_TIMEOUT,
            dtr_pulse: true,
        }
    }
}

impl TrueRngConfig {
    /// Set the capture mode
    pub fn mode(mut self, mode: CaptureMode) -> Self {
        self.mode = mode;
        self
    }

    /// Enable or disable the knock sequence
    pub fn knock(mut self, knock: bool) -> Self {
        self.knock = knock;
        self
    }

    /// Set the per-call read timeout
    pub fn read_poll(mut self, read_poll: Duration) -> Result<Self> {
        if read_poll.is_zero() {
            return Err(Error::InvalidArgument(
                "read poll timeout must be positive".into(),
            ));
        }
        self.read_poll = read_poll;
        Ok(self)
    }

    /// Enable or disable the DTR stability pulse on long-lived sessions
    pub fn dtr_pulse(mut self, dtr_pulse: bool) -> Self {
        self.dtr_pulse = dtr_pulse;
        self
    }
}

/// Open session on a TrueRNG serial port
///
/// The port is closed when the session is dropped.
pub struct TrueRng {
    port: Box<dyn SerialPort>,
    path: String,
    read_poll: Duration,
}

impl TrueRng {
    /// Open the TrueRNG at `path`
    ///
    /// Framing is 8N1 without flow control. The baud rate is left at the
    /// stock rate; only the knock sequence (when enabled) uses mode rates.
    /// DTR is asserted and stale input discarded before the session is
    /// returned.
    pub fn open(path: &str, config: &TrueRngConfig) -> Result<Self> {
        if config.knock {
            change_mode(path, config.mode)?;
        }

        let port = open_port(path, DEFAULT_OPEN_BAUD, config.read_poll)?;
        log::info!("Opened TrueRNG on {}", path);

        let mut trng = Self {
            port,
            path: path.to_string(),
            read_poll: config.read_poll,
        };

        if let Err(e) = trng.port.write_data_terminal_ready(true) {
            log::warn!("{}: failed to assert DTR: {}", path, e);
        }
        if let Err(e) = trng.port.clear(ClearBuffer::Input) {
            log::warn!("{}: failed to flush input: {}", path, e);
        }

        Ok(trng)
    }

    /// Open a discovered device
    ///
    /// `long_lived` sessions get the DTR stability pulse when configured.
    pub fn open_device(
        device: &DeviceDescriptor,
        config: &TrueRngConfig,
        long_lived: bool,
    ) -> Result<Self> {
        if device.kind != TransportKind::Serial {
            return Err(Error::InvalidArgument(format!(
                "{} is not a serial device",
                device
            )));
        }
        if config.knock && !config.mode.supported_by(device.model) {
            log::warn!(
                "Mode {} is only implemented by the TrueRNGproV2, {} may ignore it",
                config.mode,
                device.model
            );
        }

        let mut trng = Self::open(&device.path, config)?;
        if long_lived && config.dtr_pulse {
            trng.pulse_dtr()?;
        }
        Ok(trng)
    }

    /// System path of the port
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Drop and re-assert DTR, letting the firmware settle in between
    fn pulse_dtr(&mut self) -> Result<()> {
        log::debug!("{}: pulsing DTR", self.path);
        self.port
            .write_data_terminal_ready(false)
            .map_err(from_serial)?;
        thread::sleep(DTR_PULSE_SETTLE);
        self.port
            .write_data_terminal_ready(true)
            .map_err(from_serial)?;
        thread::sleep(DTR_PULSE_SETTLE);
        Ok(())
    }
}

impl Drop for TrueRng {
    fn drop(&mut self) {
        log::debug!("Closing TrueRNG on {}", self.path);
    }
}

impl EntropySource for TrueRng {
    fn kind(&self) -> TransportKind {
        TransportKind::Serial
    }

    fn read_exact(&mut self, buf: &mut [u8], deadline: Instant) -> Result<()> {
        // Keep a single OS read from overshooting the deadline by much.
        let remaining = deadline.saturating_duration_since(Instant::now());
        let poll = self.read_poll.min(remaining).max(Duration::from_millis(1));
        self.port.set_timeout(poll).map_err(from_serial)?;

        read_until(&mut self.port, buf, deadline, EMPTY_READ_BACKOFF)?;
        log::trace!("{}: read {} bytes", self.path, buf.len());
        Ok(())
    }
}

/// Fill `buf` from `reader` before `deadline`
///
/// A read that returns no data (or times out at the OS level) is not an
/// error; the loop backs off and tries again until the deadline. Any other
/// I/O error ends the attempt.
pub fn read_until<R>(reader: &mut R, buf: &mut [u8], deadline: Instant, backoff: Duration) -> Result<()>
where
    R: Read + ?Sized,
{
    let wanted = buf.len();
    let mut total = 0;

    while total < wanted {
        if Instant::now() >= deadline {
            return Err(Error::ReadTimeout {
                read: total,
                wanted,
            });
        }

        match reader.read(&mut buf[total..]) {
            Ok(0) => thread::sleep(backoff),
            Ok(n) => total += n,
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::TimedOut
                        | std::io::ErrorKind::WouldBlock
                        | std::io::ErrorKind::Interrupted
                ) => {}
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}

/// Open `path` with 8N1 framing at `baud`
fn open_port(path: &str, baud: u32, timeout: Duration) -> Result<Box<dyn SerialPort>> {
    serialport::new(path, baud)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .timeout(timeout)
        .open()
        .map_err(|e| open_failed(path, e))
}

/// Switch the capture mode of the TrueRNG at `path`
///
/// Runs the knock sequence (open/close at 110, 300 and 110 baud, each held
/// for 500 ms) and then opens once at the baud rate of `mode`. The first
/// failed open aborts the whole sequence.
pub fn change_mode(path: &str, mode: CaptureMode) -> Result<()> {
    log::info!(
        "Switching {} to {} ({} baud)",
        path,
        mode,
        mode.baud_rate()
    );
    knock_sequence(mode, KNOCK_HOLD, |baud| {
        let port = open_port(path, baud, READ_POLL_TIMEOUT)?;
        drop(port);
        Ok(())
    })
}

/// Drive the knock sequence through `open_close`
///
/// `open_close` opens the port at the given baud rate and closes it again.
fn knock_sequence<F>(mode: CaptureMode, hold: Duration, mut open_close: F) -> Result<()>
where
    F: FnMut(u32) -> Result<()>,
{
    for baud in KNOCK_SEQUENCE {
        log::debug!("Knock at {} baud", baud);
        open_close(baud).map_err(|e| match e {
            Error::OpenFailed(msg) => {
                Error::OpenFailed(format!("mode change aborted at {} baud: {}", baud, msg))
            }
            other => other,
        })?;
        thread::sleep(hold);
    }

    open_close(mode.baud_rate()).map_err(|e| match e {
        Error::OpenFailed(msg) => Error::OpenFailed(format!("failed to set final mode: {}", msg)),
        other => other,
    })
}

/// Convert an enumerated serial port into identifier metadata
fn port_metadata(info: &SerialPortInfo) -> PortMetadata {
    match &info.port_type {
        SerialPortType::UsbPort(usb) => PortMetadata {
            port_name: info.port_name.clone(),
            usb_id: Some((usb.vid, usb.pid)),
            product: usb.product.clone(),
            serial_number: usb.serial_number.clone(),
        },
        _ => PortMetadata {
            port_name: info.port_name.clone(),
            ..Default::default()
        },
    }
}

/// List all connected TrueRNG devices
pub fn list_devices() -> Result<Vec<DeviceDescriptor>> {
    let ports = serialport::available_ports().map_err(|e| Error::Enumeration(e.to_string()))?;
    let metadata: Vec<PortMetadata> = ports.iter().map(port_metadata).collect();
    Ok(TRUERNG_FAMILY.filter(&metadata))
}

/// Find the first connected TrueRNG
pub fn find_first() -> Result<DeviceDescriptor> {
    list_devices()?
        .into_iter()
        .next()
        .ok_or(Error::DeviceNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io;

    /// Reader replaying a script of read results
    struct ScriptedReader {
        steps: VecDeque<io::Result<Vec<u8>>>,
    }

    impl ScriptedReader {
        fn new(steps: Vec<io::Result<Vec<u8>>>) -> Self {
            Self {
                steps: steps.into(),
            }
        }
    }

    impl Read for ScriptedReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.steps.pop_front() {
                Some(Ok(data)) => {
                    let n = data.len().min(buf.len());
                    buf[..n].copy_from_slice(&data[..n]);
                    Ok(n)
                }
                Some(Err(e)) => Err(e),
                None => Ok(0),
            }
        }
    }

    fn far() -> Instant {
        Instant::now() + Duration::from_secs(10)
    }

    #[test]
    fn test_read_until_accumulates_partial_reads() {
        let mut reader = ScriptedReader::new(vec![
            Ok(vec![1, 2]),
            Ok(vec![]),
            Err(io::Error::new(io::ErrorKind::TimedOut, "poll")),
            Ok(vec![3, 4, 5]),
        ]);
        let mut buf = [0u8; 5];
        read_until(&mut reader, &mut buf, far(), Duration::from_millis(1)).unwrap();
        assert_eq!(buf, [1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_read_until_times_out_with_progress() {
        let mut reader = ScriptedReader::new(vec![Ok(vec![0xAA; 3])]);
        let mut buf = [0u8; 8];
        let deadline = Instant::now() + Duration::from_millis(30);
        let err = read_until(&mut reader, &mut buf, deadline, Duration::from_millis(5)).unwrap_err();
        assert_eq!(err, Error::ReadTimeout { read: 3, wanted: 8 });
    }

    #[test]
    fn test_read_until_os_error_is_fatal() {
        let mut reader = ScriptedReader::new(vec![
            Ok(vec![1]),
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "broken pipe")),
            Ok(vec![2, 3]),
        ]);
        let mut buf = [0u8; 3];
        let err = read_until(&mut reader, &mut buf, far(), Duration::from_millis(1)).unwrap_err();
        assert!(err.is_disconnect());
    }

    #[test]
    fn test_knock_sequence_order() {
        let mut bauds = Vec::new();
        knock_sequence(CaptureMode::Rng1White, Duration::ZERO, |baud| {
            bauds.push(baud);
            Ok(())
        })
        .unwrap();
        assert_eq!(bauds, vec![110, 300, 110, 4800]);
    }

    #[test]
    fn test_knock_sequence_aborts_on_failure() {
        let mut bauds = Vec::new();
        let err = knock_sequence(CaptureMode::Normal, Duration::ZERO, |baud| {
            bauds.push(baud);
            if bauds.len() == 2 {
                Err(Error::OpenFailed("busy".into()))
            } else {
                Ok(())
            }
        })
        .unwrap_err();
        assert_eq!(bauds, vec![110, 300]);
        assert_eq!(
            err,
            Error::OpenFailed("mode change aborted at 300 baud: busy".into())
        );
    }

    #[test]
    fn test_port_metadata_non_usb() {
        let info = SerialPortInfo {
            port_name: "/dev/ttyS0".into(),
            port_type: SerialPortType::Unknown,
        };
        let meta = port_metadata(&info);
        assert_eq!(meta.port_name, "/dev/ttyS0");
        assert_eq!(meta.usb_id, None);
        assert!(TRUERNG_FAMILY.describe(&meta).is_none());
    }

    #[test]
    fn test_config_defaults() {
        let config = TrueRngConfig::default();
        assert_eq!(config.mode, CaptureMode::Normal);
        assert!(!config.knock);
        assert!(config.clone().read_poll(Duration::ZERO).is_err());
    }
}
