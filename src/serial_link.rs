use crate::capture_buffer::{CaptureBuffer, CAPTURE_BYTES};
use crate::trigger_config::TriggerConfig;
use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Marker the device sends right before the sample block.
pub const SAMPLE_SYNC_BYTE: u8 = 0x55;

pub const DEFAULT_SYNC_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_FRAME_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("Failed to open device {port}: {source}")]
    DeviceOpenFailure {
        port: String,
        #[source]
        source: serialport::Error,
    },

    #[error("Write to device failed after {written} of {expected} bytes: {reason}")]
    DeviceWriteFailure {
        written: usize,
        expected: usize,
        reason: String,
    },

    #[error("Read from device failed: {0}")]
    DeviceReadFailure(#[source] std::io::Error),

    #[error("No sync byte from device within {waited:?}")]
    DeviceUnresponsive { waited: Duration },

    #[error("Short read: received {received} of {expected} sample bytes")]
    ShortRead { received: usize, expected: usize },

    #[error("Capture cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    SendingMasks,
    SendingArm,
    WaitingSync,
    ReceivingFrames,
    Complete,
    Failed,
}

/// Shared flag that aborts a capture in progress from another thread.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Bounds for the blocking parts of a capture.
#[derive(Debug, Clone)]
pub struct CaptureOptions {
    pub sync_timeout: Duration,
    pub frame_timeout: Duration,
    pub write_timeout: Duration,
    pub cancel: Option<CancelToken>,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            sync_timeout: DEFAULT_SYNC_TIMEOUT,
            frame_timeout: DEFAULT_FRAME_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            cancel: None,
        }
    }
}

impl CaptureOptions {
    pub fn with_sync_timeout(mut self, timeout: Duration) -> Self {
        self.sync_timeout = timeout;
        self
    }

    pub fn with_frame_timeout(mut self, timeout: Duration) -> Self {
        self.frame_timeout = timeout;
        self
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    fn check_cancelled(&self) -> Result<(), DeviceError> {
        match &self.cancel {
            Some(token) if token.is_cancelled() => Err(DeviceError::Cancelled),
            _ => Ok(()),
        }
    }
}

/// Errors a port with a read timeout reports while no data is available yet.
fn is_retryable(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
    )
}

/// Byte stream a capture can run over.
pub trait CapturePort: Read + Write {
    /// Drops everything received but not yet read.
    fn discard_input(&mut self) -> std::io::Result<()>;
}

/// The capture handshake over one exclusively owned byte stream.
///
/// Holding the stream by value (and taking `&mut self` for a capture) is what keeps a
/// second capture from interleaving with one in flight.
#[derive(Debug)]
pub struct SerialLink<P> {
    port: P,
    state: CaptureState,
}

impl<P: CapturePort> SerialLink<P> {
    pub fn new(port: P) -> Self {
        Self {
            port,
            state: CaptureState::Idle,
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn into_inner(self) -> P {
        self.port
    }

    fn transition(&mut self, next: CaptureState) {
        log::debug!("Capture state {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Sends the trigger configuration, arms the device and reads back one full capture.
    ///
    /// One attempt only: on any error the state becomes `Failed` and nothing received so
    /// far is returned.
    #[tracing::instrument(skip_all)]
    pub fn capture<C: TriggerConfig>(
        &mut self,
        config: &C,
        options: &CaptureOptions,
    ) -> Result<CaptureBuffer, DeviceError> {
        #[cfg(feature = "cpu-profiling")]
        let _span = crate::profile_span!("SerialLink::capture");

        match self.run_capture(config, options) {
            Ok(capture) => {
                self.transition(CaptureState::Complete);
                Ok(capture)
            }
            Err(e) => {
                log::warn!("Capture failed in state {:?}: {}", self.state, e);
                self.transition(CaptureState::Failed);
                Err(e)
            }
        }
    }

    fn run_capture<C: TriggerConfig>(
        &mut self,
        config: &C,
        options: &CaptureOptions,
    ) -> Result<CaptureBuffer, DeviceError> {
        // leftovers of an aborted capture may contain the sync byte
        log::debug!("Discarding pending input");
        self.port
            .discard_input()
            .map_err(DeviceError::DeviceReadFailure)?;

        self.transition(CaptureState::SendingMasks);
        let config_bytes = config.config_bytes();
        log::debug!("Sending {} bytes of trigger configuration", config_bytes.len());
        self.write_looped(&config_bytes, options)?;

        if let Some(arm) = config.arm_command() {
            self.transition(CaptureState::SendingArm);
            self.write_looped(&arm, options)?;
        }

        self.transition(CaptureState::WaitingSync);
        log::info!("Waiting for sync byte...");
        self.wait_for_sync(options)?;

        self.transition(CaptureState::ReceivingFrames);
        let mut data = vec![0u8; CAPTURE_BYTES];
        self.read_looped(&mut data, options)?;
        log::info!("Received {} sample bytes", data.len());

        CaptureBuffer::from_bytes(&data).map_err(|e| DeviceError::ShortRead {
            received: e.actual,
            expected: CAPTURE_BYTES,
        })
    }

    fn write_looped(&mut self, buf: &[u8], options: &CaptureOptions) -> Result<(), DeviceError> {
        let start = Instant::now();
        let mut written = 0;

        while written < buf.len() {
            options.check_cancelled()?;
            match self.port.write(&buf[written..]) {
                Ok(0) => {
                    return Err(DeviceError::DeviceWriteFailure {
                        written,
                        expected: buf.len(),
                        reason: "device accepted no data".to_string(),
                    });
                }
                Ok(n) => written += n,
                Err(e) if is_retryable(e.kind()) && start.elapsed() < options.write_timeout => {}
                Err(e) => {
                    return Err(DeviceError::DeviceWriteFailure {
                        written,
                        expected: buf.len(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        self.port.flush().map_err(|e| DeviceError::DeviceWriteFailure {
            written,
            expected: buf.len(),
            reason: e.to_string(),
        })
    }

    /// Discards bytes until the sync marker shows up or the deadline passes.
    fn wait_for_sync(&mut self, options: &CaptureOptions) -> Result<(), DeviceError> {
        let start = Instant::now();
        let mut discarded = 0usize;

        loop {
            options.check_cancelled()?;
            if start.elapsed() >= options.sync_timeout {
                return Err(DeviceError::DeviceUnresponsive {
                    waited: start.elapsed(),
                });
            }

            let mut byte = [0u8; 1];
            match self.port.read(&mut byte) {
                Ok(1) if byte[0] == SAMPLE_SYNC_BYTE => {
                    if discarded > 0 {
                        log::debug!("Discarded {} bytes before sync", discarded);
                    }
                    return Ok(());
                }
                Ok(1) => discarded += 1,
                Ok(_) => {
                    return Err(DeviceError::DeviceReadFailure(std::io::Error::new(
                        ErrorKind::UnexpectedEof,
                        "stream closed while waiting for sync byte",
                    )));
                }
                Err(e) if is_retryable(e.kind()) => {}
                Err(e) => return Err(DeviceError::DeviceReadFailure(e)),
            }
        }
    }

    fn read_looped(&mut self, buf: &mut [u8], options: &CaptureOptions) -> Result<(), DeviceError> {
        let start = Instant::now();
        let mut received = 0;

        while received < buf.len() {
            options.check_cancelled()?;
            if start.elapsed() >= options.frame_timeout {
                return Err(DeviceError::ShortRead {
                    received,
                    expected: buf.len(),
                });
            }

            match self.port.read(&mut buf[received..]) {
                Ok(0) => {
                    return Err(DeviceError::ShortRead {
                        received,
                        expected: buf.len(),
                    });
                }
                Ok(n) => received += n,
                Err(e) if is_retryable(e.kind()) => {}
                Err(e) => return Err(DeviceError::DeviceReadFailure(e)),
            }
        }
        Ok(())
    }
}
