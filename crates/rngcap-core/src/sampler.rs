//! Transport-agnostic sampling loop
//!
//! The sampler requests a fixed number of bits per tick from whatever
//! [`Connector`] it was given and hands each masked sample to a consumer
//! callback, synchronously and in acquisition order.
//!
//! Two strategies are available and chosen explicitly through
//! [`SamplerConfig::strategy`]:
//!
//! - [`Strategy::PerTick`]: every tick re-runs discovery, opens a fresh
//!   session, reads one sample and closes the session again. Any error ends
//!   the loop; retrying is up to the caller.
//! - [`Strategy::Reconnect`]: one session is kept across ticks. Disconnects,
//!   timeouts and repeated transient errors drop the session, and after a
//!   backoff the device is re-discovered (possibly on a new path) and
//!   reopened. Only `max_consecutive_errors` failed reads in a row end the
//!   loop.
//!
//! ```text
//! Idle -> Connected -> Reading -> Delivering -> Connected
//!                         |
//!                         +-> Disconnected -> Reconnecting -> Connected
//!                                                  |
//!                                                  +-> (backoff, retry)
//! terminal: Cancelled, FatallyErrored
//! ```

use std::time::{Duration, Instant};

use crate::bits::{validate_bit_count, SampleBuffer};
use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::source::{Connector, EntropySource};

/// Read deadline for one-shot reads
pub const ONE_SHOT_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Read deadline per tick in interval mode
pub const TICK_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Pause between dropping a stale session and re-discovering the device
pub const DEFAULT_RECONNECT_BACKOFF: Duration = Duration::from_millis(500);

/// Pause after a failed re-discovery or reopen
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Transient errors tolerated on one session before it is replaced
pub const DEFAULT_RECONNECT_AFTER_ERRORS: u32 = 3;

/// Failed reads in a row that end a reconnect-capable loop
pub const DEFAULT_MAX_CONSECUTIVE_ERRORS: u32 = 10;

/// When the next sample is taken
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    /// Start the next read as soon as the consumer returns
    Immediate,
    /// One read per interval, measured from the first read
    Fixed(Duration),
}

/// Session handling between ticks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    /// Open and close the device on every tick
    #[default]
    PerTick,
    /// Keep one session open and replace it on failure
    Reconnect,
}

/// Sampling loop configuration
#[derive(Debug, Clone)]
pub struct SamplerConfig {
    /// Bits per sample
    pub bit_count: usize,
    /// Tick cadence
    pub cadence: Cadence,
    /// Session strategy
    pub strategy: Strategy,
    /// Deadline for one sample read
    pub read_timeout: Duration,
    /// Wait before re-discovery after a session was dropped
    pub reconnect_backoff: Duration,
    /// Wait after a failed re-discovery or reopen
    pub retry_delay: Duration,
    /// Transient read errors on one session before it is replaced
    pub reconnect_after_errors: u32,
    /// Failed reads in a row before the loop gives up
    pub max_consecutive_errors: u32,
}

impl SamplerConfig {
    /// Per-tick configuration reading `bit_count` bits every `interval`
    pub fn new(bit_count: usize, interval: Duration) -> Self {
        Self {
            bit_count,
            cadence: Cadence::Fixed(interval),
            strategy: Strategy::PerTick,
            read_timeout: TICK_READ_TIMEOUT,
            reconnect_backoff: DEFAULT_RECONNECT_BACKOFF,
            retry_delay: DEFAULT_RETRY_DELAY,
            reconnect_after_errors: DEFAULT_RECONNECT_AFTER_ERRORS,
            max_consecutive_errors: DEFAULT_MAX_CONSECUTIVE_ERRORS,
        }
    }

    /// Set the tick cadence
    pub fn cadence(mut self, cadence: Cadence) -> Self {
        self.cadence = cadence;
        self
    }

    /// Choose between per-tick sessions and a reconnecting long-lived session
    pub fn reconnect(mut self, reconnect: bool) -> Self {
        self.strategy = if reconnect {
            Strategy::Reconnect
        } else {
            Strategy::PerTick
        };
        self
    }

    /// Set the read deadline per sample
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set the reconnect backoff and retry delay
    pub fn backoff(mut self, reconnect_backoff: Duration, retry_delay: Duration) -> Self {
        self.reconnect_backoff = reconnect_backoff;
        self.retry_delay = retry_delay;
        self
    }

    /// Set the fatal failed-read limit
    pub fn max_consecutive_errors(mut self, max: u32) -> Self {
        self.max_consecutive_errors = max;
        self
    }

    /// Check every parameter before any I/O happens
    pub fn validate(&self) -> Result<()> {
        validate_bit_count(self.bit_count)?;
        if let Cadence::Fixed(interval) = self.cadence {
            if interval.is_zero() {
                return Err(Error::InvalidArgument("interval must be positive".into()));
            }
        }
        if self.read_timeout.is_zero() {
            return Err(Error::InvalidArgument("read timeout must be positive".into()));
        }
        if self.reconnect_after_errors == 0 || self.max_consecutive_errors == 0 {
            return Err(Error::InvalidArgument("error limits must be positive".into()));
        }
        Ok(())
    }
}

/// Read and frame one sample from an open session
///
/// A failed read never yields a partial sample.
pub fn read_sample<S>(source: &mut S, bit_count: usize, timeout: Duration) -> Result<Vec<u8>>
where
    S: EntropySource + ?Sized,
{
    let mut sample = SampleBuffer::new(bit_count)?;
    let deadline = Instant::now() + timeout;
    source.read_exact(sample.as_mut_bytes(), deadline)?;
    Ok(sample.finish())
}

/// Discover, open, read one sample and close
pub fn read_once<C: Connector>(
    connector: &mut C,
    bit_count: usize,
    timeout: Duration,
) -> Result<Vec<u8>> {
    validate_bit_count(bit_count)?;
    let device = connector.discover()?;
    log::debug!("Reading {} bits from {}", bit_count, device);
    let mut source = connector.open(&device, false)?;
    read_sample(&mut source, bit_count, timeout)
}

/// Position of the reconnect-capable loop in its state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Connected,
    Reading,
    Delivering,
    Disconnected,
    Reconnecting,
}

/// Mutable state of a reconnect-capable loop, owned by the sampling thread
struct LoopState<S> {
    phase: Phase,
    session: Option<S>,
    device_path: Option<String>,
    /// Transient errors on the current session
    consecutive_errors: u32,
    /// Failed reads since the last delivered sample
    failed_reads: u32,
    last_good: Option<Instant>,
}

impl<S> LoopState<S> {
    fn new() -> Self {
        Self {
            phase: Phase::Idle,
            session: None,
            device_path: None,
            consecutive_errors: 0,
            failed_reads: 0,
            last_good: None,
        }
    }

    fn enter(&mut self, phase: Phase) {
        if self.phase != phase {
            log::trace!("sampler: {:?} -> {:?}", self.phase, phase);
            self.phase = phase;
        }
    }

    /// Close the current session, if any
    fn drop_session(&mut self) {
        if self.session.take().is_some() {
            log::debug!("sampler: closed stale session");
        }
        self.enter(Phase::Disconnected);
    }
}

/// Sampling loop over a [`Connector`]
pub struct Sampler<C: Connector> {
    connector: C,
    config: SamplerConfig,
}

impl<C: Connector> Sampler<C> {
    /// Create a sampler; the configuration is validated here
    pub fn new(connector: C, config: SamplerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { connector, config })
    }

    /// Access the configuration
    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Run until cancelled or a fatal error occurs
    ///
    /// Returns the reason the loop stopped: [`Error::Cancelled`] for a
    /// cooperative stop, any other variant for a failure.
    pub fn run<F>(&mut self, mut on_sample: F, cancel: &CancelToken) -> Error
    where
        F: FnMut(&[u8]),
    {
        match self.config.strategy {
            Strategy::PerTick => self.run_per_tick(&mut on_sample, cancel),
            Strategy::Reconnect => self.run_reconnect(&mut on_sample, cancel),
        }
    }

    fn run_per_tick(&mut self, on_sample: &mut dyn FnMut(&[u8]), cancel: &CancelToken) -> Error {
        let mut next_tick = Instant::now();
        loop {
            if cancel.is_cancelled() {
                return Error::Cancelled;
            }

            let sample = match self.sample_fresh_session() {
                Ok(sample) => sample,
                Err(e) => return e,
            };
            on_sample(&sample);

            if self.wait_for_tick(&mut next_tick, cancel) {
                return Error::Cancelled;
            }
        }
    }

    fn sample_fresh_session(&mut self) -> Result<Vec<u8>> {
        let device = self.connector.discover()?;
        let mut source = self.connector.open(&device, false)?;
        let result = read_sample(&mut source, self.config.bit_count, self.config.read_timeout);
        drop(source);
        result
    }

    fn run_reconnect(&mut self, on_sample: &mut dyn FnMut(&[u8]), cancel: &CancelToken) -> Error {
        let mut state = LoopState::new();

        // The first connection is not retried: a missing device is reported.
        if cancel.is_cancelled() {
            return Error::Cancelled;
        }
        if let Err(e) = self.connect(&mut state) {
            return e;
        }

        let mut next_tick = Instant::now();
        loop {
            if cancel.is_cancelled() {
                return Error::Cancelled;
            }

            if state.session.is_none() {
                state.enter(Phase::Reconnecting);
                if cancel.wait_timeout(self.config.reconnect_backoff) {
                    return Error::Cancelled;
                }
                if let Err(e) = self.connect(&mut state) {
                    log::warn!("Reconnection failed: {}", e);
                    state.enter(Phase::Idle);
                    if cancel.wait_timeout(self.config.retry_delay) {
                        return Error::Cancelled;
                    }
                } else {
                    log::info!("Successfully reconnected to device");
                }
                // No sample is delivered for the tick that lost the session.
                continue;
            }

            state.enter(Phase::Reading);
            let Some(session) = state.session.as_mut() else {
                continue;
            };
            let result = read_sample(session, self.config.bit_count, self.config.read_timeout);
            match result {
                Ok(sample) => {
                    state.consecutive_errors = 0;
                    state.failed_reads = 0;
                    state.last_good = Some(Instant::now());
                    state.enter(Phase::Delivering);
                    on_sample(&sample);
                    state.enter(Phase::Connected);

                    if self.wait_for_tick(&mut next_tick, cancel) {
                        return Error::Cancelled;
                    }
                }
                Err(e) => {
                    state.failed_reads += 1;
                    if state.failed_reads >= self.config.max_consecutive_errors {
                        log::error!(
                            "Giving up after {} failed reads (last good sample: {})",
                            state.failed_reads,
                            describe_age(state.last_good)
                        );
                        return Error::TooManyConsecutiveErrors {
                            count: state.failed_reads,
                            last: e.to_string(),
                        };
                    }

                    if e.is_disconnect() {
                        log::warn!("Port closed ({}), attempting reconnection", e);
                        state.drop_session();
                    } else if let Error::ReadTimeout { .. } = e {
                        log::warn!("{}, attempting reconnection", e);
                        state.drop_session();
                    } else {
                        state.consecutive_errors += 1;
                        log::warn!(
                            "Read error {}/{}: {}",
                            state.consecutive_errors,
                            self.config.reconnect_after_errors,
                            e
                        );
                        if state.consecutive_errors >= self.config.reconnect_after_errors {
                            state.drop_session();
                        } else {
                            state.enter(Phase::Connected);
                        }
                    }
                }
            }
        }
    }

    /// Discover the device and open a long-lived session on it
    fn connect(&mut self, state: &mut LoopState<C::Source>) -> Result<()> {
        let device = self.connector.discover()?;
        match &state.device_path {
            Some(old) if *old != device.path => {
                log::info!("Device port changed from {} to {}", old, device.path);
            }
            _ => {}
        }
        let session = self.connector.open(&device, true)?;
        log::debug!("sampler: connected to {}", device);

        state.device_path = Some(device.path);
        state.session = Some(session);
        state.consecutive_errors = 0;
        state.enter(Phase::Connected);
        Ok(())
    }

    /// Wait for the next tick; returns true if cancelled meanwhile
    fn wait_for_tick(&self, next_tick: &mut Instant, cancel: &CancelToken) -> bool {
        match self.config.cadence {
            Cadence::Immediate => cancel.is_cancelled(),
            Cadence::Fixed(interval) => {
                *next_tick += interval;
                let now = Instant::now();
                // Ticks missed while reading are dropped, not replayed.
                if *next_tick < now {
                    *next_tick = now;
                }
                cancel.wait_until(*next_tick)
            }
        }
    }
}

fn describe_age(last_good: Option<Instant>) -> String {
    match last_good {
        Some(t) => format!("{:.1}s ago", t.elapsed().as_secs_f64()),
        None => "never".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceDescriptor, DeviceModel, TransportKind};
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    /// What the next read on any fake session does
    #[derive(Debug, Clone)]
    enum Step {
        Fill(u8),
        Fail(Error),
    }

    type Script = Rc<RefCell<VecDeque<Step>>>;

    struct FakeSource {
        script: Script,
    }

    impl EntropySource for FakeSource {
        fn kind(&self) -> TransportKind {
            TransportKind::Serial
        }

        fn read_exact(&mut self, buf: &mut [u8], _deadline: Instant) -> Result<()> {
            match self.script.borrow_mut().pop_front() {
                Some(Step::Fill(b)) => {
                    buf.fill(b);
                    Ok(())
                }
                Some(Step::Fail(e)) => Err(e),
                None => Err(Error::Disconnected("script exhausted".into())),
            }
        }
    }

    struct FakeConnector {
        script: Script,
        paths: VecDeque<String>,
        discovers: usize,
        opens: usize,
    }

    impl FakeConnector {
        fn new(steps: Vec<Step>) -> Self {
            Self {
                script: Rc::new(RefCell::new(steps.into())),
                paths: VecDeque::new(),
                discovers: 0,
                opens: 0,
            }
        }
    }

    impl Connector for FakeConnector {
        type Source = FakeSource;

        fn discover(&mut self) -> Result<DeviceDescriptor> {
            self.discovers += 1;
            let path = self
                .paths
                .pop_front()
                .unwrap_or_else(|| "/dev/ttyACM0".to_string());
            Ok(DeviceDescriptor {
                kind: TransportKind::Serial,
                model: DeviceModel::TrueRngPro,
                path,
                vendor_id: 0x16D0,
                product_id: 0x0AA0,
                display_name: "TrueRNGpro".into(),
                serial_number: None,
            })
        }

        fn open(&mut self, _device: &DeviceDescriptor, _long_lived: bool) -> Result<FakeSource> {
            self.opens += 1;
            Ok(FakeSource {
                script: self.script.clone(),
            })
        }
    }

    fn fast(config: SamplerConfig) -> SamplerConfig {
        config
            .cadence(Cadence::Immediate)
            .backoff(Duration::from_millis(1), Duration::from_millis(1))
    }

    #[test]
    fn test_read_once_framing() {
        let mut connector = FakeConnector::new(vec![Step::Fill(0xFF)]);
        let bytes = read_once(&mut connector, 10, ONE_SHOT_READ_TIMEOUT).unwrap();
        assert_eq!(bytes, vec![0xFF, 0xC0]);
        assert_eq!(connector.opens, 1);
    }

    #[test]
    fn test_read_once_rejects_zero_bits_without_io() {
        let mut connector = FakeConnector::new(vec![]);
        let err = read_once(&mut connector, 0, ONE_SHOT_READ_TIMEOUT).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert_eq!(connector.discovers, 0);
        assert_eq!(connector.opens, 0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let err = Sampler::new(
            FakeConnector::new(vec![]),
            SamplerConfig::new(0, Duration::from_secs(1)),
        )
        .err()
        .unwrap();
        assert!(matches!(err, Error::InvalidArgument(_)));

        let err = Sampler::new(
            FakeConnector::new(vec![]),
            SamplerConfig::new(8, Duration::ZERO),
        )
        .err()
        .unwrap();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_per_tick_cancel_after_first_sample() {
        let connector = FakeConnector::new(vec![Step::Fill(0xAA), Step::Fill(0xBB)]);
        let config = SamplerConfig::new(16, Duration::from_secs(2));
        let mut sampler = Sampler::new(connector, config).unwrap();
        let cancel = CancelToken::new();

        let mut samples = Vec::new();
        let start = Instant::now();
        let stop = sampler.run(
            |s| {
                samples.push(s.to_vec());
                cancel.cancel();
            },
            &cancel,
        );

        assert_eq!(stop, Error::Cancelled);
        assert_eq!(samples, vec![vec![0xAA, 0xAA]]);
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_per_tick_reopens_every_tick() {
        let connector = FakeConnector::new(vec![Step::Fill(1), Step::Fill(2), Step::Fill(3)]);
        let mut sampler = Sampler::new(connector, fast(SamplerConfig::new(8, Duration::MAX))).unwrap();
        let cancel = CancelToken::new();

        let mut count = 0;
        let stop = sampler.run(
            |_| {
                count += 1;
                if count == 3 {
                    cancel.cancel();
                }
            },
            &cancel,
        );
        assert_eq!(stop, Error::Cancelled);
        assert_eq!(sampler.connector.opens, 3);
        assert_eq!(sampler.connector.discovers, 3);
    }

    #[test]
    fn test_per_tick_surfaces_errors() {
        let connector = FakeConnector::new(vec![
            Step::Fill(1),
            Step::Fail(Error::ReadTimeout { read: 3, wanted: 4 }),
        ]);
        let mut sampler = Sampler::new(connector, fast(SamplerConfig::new(32, Duration::MAX))).unwrap();
        let mut delivered = 0;
        let stop = sampler.run(|_| delivered += 1, &CancelToken::new());
        assert_eq!(stop, Error::ReadTimeout { read: 3, wanted: 4 });
        assert_eq!(delivered, 1);
    }

    #[test]
    fn test_reconnect_after_port_closed() {
        let mut connector = FakeConnector::new(vec![
            Step::Fill(0x11),
            Step::Fail(Error::Io("port has been closed".into())),
            Step::Fill(0x22),
        ]);
        connector.paths = VecDeque::from(vec!["/dev/ttyACM0".into(), "/dev/ttyACM1".into()]);
        let config = fast(SamplerConfig::new(8, Duration::MAX).reconnect(true));
        let mut sampler = Sampler::new(connector, config).unwrap();
        let cancel = CancelToken::new();

        let mut samples = Vec::new();
        let stop = sampler.run(
            |s| {
                samples.push(s[0]);
                if samples.len() == 2 {
                    cancel.cancel();
                }
            },
            &cancel,
        );

        assert_eq!(stop, Error::Cancelled);
        // The failed tick delivers nothing; exactly one reconnect follows.
        assert_eq!(samples, vec![0x11, 0x22]);
        assert_eq!(sampler.connector.opens, 2);
        assert_eq!(sampler.connector.discovers, 2);
    }

    #[test]
    fn test_reconnect_after_repeated_transient_errors() {
        let transient = || Step::Fail(Error::TransientRead("parity".into()));
        let connector = FakeConnector::new(vec![
            transient(),
            transient(),
            transient(),
            Step::Fill(0x33),
        ]);
        let config = fast(SamplerConfig::new(8, Duration::MAX).reconnect(true));
        let mut sampler = Sampler::new(connector, config).unwrap();
        let cancel = CancelToken::new();

        let mut samples = Vec::new();
        let stop = sampler.run(
            |s| {
                samples.push(s[0]);
                cancel.cancel();
            },
            &cancel,
        );
        assert_eq!(stop, Error::Cancelled);
        assert_eq!(samples, vec![0x33]);
        // Initial open plus one replacement after the third error.
        assert_eq!(sampler.connector.opens, 2);
    }

    #[test]
    fn test_reconnect_gives_up_after_max_errors() {
        let steps = (0..5)
            .map(|_| Step::Fail(Error::TransientRead("crc".into())))
            .collect();
        let connector = FakeConnector::new(steps);
        let config = fast(
            SamplerConfig::new(8, Duration::MAX)
                .reconnect(true)
                .max_consecutive_errors(5),
        );
        let mut sampler = Sampler::new(connector, config).unwrap();

        let mut delivered = 0;
        let stop = sampler.run(|_| delivered += 1, &CancelToken::new());
        assert_eq!(
            stop,
            Error::TooManyConsecutiveErrors {
                count: 5,
                last: "Transient read error: crc".into()
            }
        );
        assert_eq!(delivered, 0);
    }

    #[test]
    fn test_cancelled_before_start_does_no_io() {
        let connector = FakeConnector::new(vec![Step::Fill(0)]);
        let config = fast(SamplerConfig::new(8, Duration::MAX).reconnect(true));
        let mut sampler = Sampler::new(connector, config).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        assert_eq!(sampler.run(|_| {}, &cancel), Error::Cancelled);
        assert_eq!(sampler.connector.opens, 0);
    }
}
