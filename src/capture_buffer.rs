use crate::bit_vector::{BitVector128, VECTOR_BYTES};
use crate::signal_registry::{PlacedSignal, SignalLayout};
use crate::waveform::SampleRate;
use polars::prelude::*;

/// Frames returned by the device per capture.
pub const FRAME_COUNT: usize = 512;

/// Bytes per frame.
pub const FRAME_BYTES: usize = VECTOR_BYTES;

/// Size of the sample block following the sync byte.
pub const CAPTURE_BYTES: usize = FRAME_COUNT * FRAME_BYTES;

/// One sample of all 128 channels.
pub type Frame = BitVector128;

const FRAME_COLUMN_NAME: &str = "frame";
const TIME_COLUMN_NAME: &str = "time_us";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("Capture block must be exactly 8192 bytes, got {actual}")]
pub struct CaptureSizeError {
    pub actual: usize,
}

/// The complete sample block of one capture, oldest frame first.
///
/// Only ever built from a full block, so a partially received capture cannot exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureBuffer {
    frames: Box<[Frame; FRAME_COUNT]>,
}

impl CaptureBuffer {
    pub fn from_bytes(data: &[u8]) -> Result<Self, CaptureSizeError> {
        if data.len() != CAPTURE_BYTES {
            return Err(CaptureSizeError { actual: data.len() });
        }

        let mut frames = Box::new([Frame::zeroed(); FRAME_COUNT]);
        for (frame, chunk) in frames.iter_mut().zip(data.chunks_exact(FRAME_BYTES)) {
            let mut bytes = [0u8; FRAME_BYTES];
            bytes.copy_from_slice(chunk);
            *frame = Frame::from_bytes(bytes);
        }
        Ok(Self { frames })
    }

    pub fn from_frames(frames: [Frame; FRAME_COUNT]) -> Self {
        Self {
            frames: Box::new(frames),
        }
    }

    pub fn frames(&self) -> &[Frame; FRAME_COUNT] {
        &self.frames
    }

    pub fn frame(&self, index: usize) -> Option<&Frame> {
        self.frames.get(index)
    }

    /// Binary digits of a signal in one frame, MSB first.
    pub fn signal_binary(&self, frame: usize, signal: &PlacedSignal) -> Option<String> {
        self.frame(frame)?
            .range_binary(signal.low_bit, signal.high_bit)
    }

    /// Value of a signal in one frame.
    pub fn signal_value(&self, frame: usize, signal: &PlacedSignal) -> Option<u128> {
        self.frame(frame)?
            .range_value(signal.low_bit, signal.high_bit)
    }

    /// Tabulates the capture: frame index, time of the frame's rising edge in microseconds,
    /// and one column per signal. Signals up to 64 bits wide become `UInt64` columns,
    /// wider ones binary strings.
    pub fn to_dataframe(
        &self,
        layout: &SignalLayout,
        sample_rate: SampleRate,
    ) -> Result<DataFrame, PolarsError> {
        #[cfg(feature = "cpu-profiling")]
        let _span = crate::profile_span!("CaptureBuffer::to_dataframe");

        let frame_index: Vec<u32> = (0..FRAME_COUNT as u32).collect();
        let mut columns: Vec<Column> = Vec::with_capacity(layout.signals().len() + 1);
        columns.push(Series::new(FRAME_COLUMN_NAME.into(), frame_index).into());

        for signal in layout.signals() {
            let column: Column = if signal.width <= 64 {
                let values: Vec<u64> = (0..FRAME_COUNT)
                    .map(|i| self.signal_value(i, signal).unwrap_or_default() as u64)
                    .collect();
                Series::new(signal.name.as_str().into(), values).into()
            } else {
                let values: Vec<String> = (0..FRAME_COUNT)
                    .map(|i| self.signal_binary(i, signal).unwrap_or_default())
                    .collect();
                Series::new(signal.name.as_str().into(), values).into()
            };
            columns.push(column);
        }

        DataFrame::new(columns)?
            .lazy()
            .with_columns([(col(FRAME_COLUMN_NAME).cast(DataType::Float64)
                * lit(sample_rate.frame_period_us()))
            .alias(TIME_COLUMN_NAME)])
            .collect()
    }
}
