//! Value-change trace output.
//!
//! Each captured frame becomes one cycle of a synthetic `capture_clk`: the clock rises at
//! tick `2 * i`, where every signal is sampled, and falls at tick `2 * i + 1`. One tick is
//! half a sample period so both edges land on integer times.

use crate::capture_buffer::CaptureBuffer;
use crate::signal_registry::SignalLayout;
use std::io::Write;

/// Name of the synthetic sample clock.
pub const CLOCK_NAME: &str = "capture_clk";

/// Identifier reserved for the sample clock.
pub const CLOCK_ID: char = '*';

pub const DEFAULT_SAMPLE_RATE_MHZ: f64 = 20.0;

#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    #[error("Invalid sample rate: {mhz} MHz")]
    InvalidSampleRate { mhz: f64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Trace output is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Rate of the clock feeding the capture core.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleRate {
    mhz: f64,
}

impl SampleRate {
    pub fn from_mhz(mhz: f64) -> Result<Self, TraceError> {
        if !mhz.is_finite() || mhz <= 0.0 {
            return Err(TraceError::InvalidSampleRate { mhz });
        }
        let rate = Self { mhz };
        if rate.half_period_ps() == 0 {
            return Err(TraceError::InvalidSampleRate { mhz });
        }
        Ok(rate)
    }

    pub fn mhz(self) -> f64 {
        self.mhz
    }

    /// Duration of one frame in microseconds.
    pub fn frame_period_us(self) -> f64 {
        1.0 / self.mhz
    }

    /// One trace tick, i.e. half a frame period, rounded to whole picoseconds.
    pub fn half_period_ps(self) -> u64 {
        (500_000.0 / self.mhz).round() as u64
    }
}

impl Default for SampleRate {
    fn default() -> Self {
        Self {
            mhz: DEFAULT_SAMPLE_RATE_MHZ,
        }
    }
}

/// Free-form header lines. Only these depend on when and by what the trace was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceHeader {
    pub date: String,
    pub version: String,
}

impl TraceHeader {
    pub fn now() -> Self {
        Self {
            date: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            version: Self::default_version(),
        }
    }

    pub fn with_date(date: impl Into<String>) -> Self {
        Self {
            date: date.into(),
            version: Self::default_version(),
        }
    }

    fn default_version() -> String {
        format!("RED TIN {}", env!("CARGO_PKG_VERSION"))
    }
}

impl Default for TraceHeader {
    fn default() -> Self {
        Self::now()
    }
}

/// Printable identifier characters in assignment order: `A` through `~` first,
/// then the remaining printable characters except the clock's `*`. `$` and `#` are
/// skipped as well, some viewers take them for a keyword or a timestamp.
fn identifier_alphabet() -> Vec<char> {
    ('A'..='~')
        .chain('!'..='@')
        .filter(|c| !matches!(*c, CLOCK_ID | '$' | '#'))
        .collect()
}

/// Identifier for the signal at `index` in registry order.
pub fn signal_identifier(index: usize) -> String {
    let alphabet = identifier_alphabet();
    let base = alphabet.len();
    if index < base {
        return alphabet[index].to_string();
    }
    let rest = index - base;
    let mut id = String::with_capacity(2);
    id.push(alphabet[(rest / base) % base]);
    id.push(alphabet[rest % base]);
    id
}

/// Renders a capture as a value-change trace.
#[derive(Debug, Clone)]
pub struct WaveformWriter<'a> {
    layout: &'a SignalLayout,
    sample_rate: SampleRate,
    header: TraceHeader,
}

impl<'a> WaveformWriter<'a> {
    pub fn new(layout: &'a SignalLayout, sample_rate: SampleRate) -> Self {
        Self {
            layout,
            sample_rate,
            header: TraceHeader::now(),
        }
    }

    pub fn with_header(mut self, header: TraceHeader) -> Self {
        self.header = header;
        self
    }

    fn write_definitions<W: Write>(&self, out: &mut W, ids: &[String]) -> std::io::Result<()> {
        writeln!(out, "$timescale {}ps $end", self.sample_rate.half_period_ps())?;
        writeln!(out, "$date {} $end", self.header.date)?;
        writeln!(out, "$version {} $end", self.header.version)?;
        writeln!(out, "$var reg 1 {CLOCK_ID} {CLOCK_NAME} $end")?;
        for (signal, id) in self.layout.signals().iter().zip(ids) {
            writeln!(out, "$var wire {} {} {} $end", signal.width, id, signal.name)?;
        }
        writeln!(out, "$enddefinition $end")
    }

    #[tracing::instrument(skip_all, fields(signals = self.layout.signals().len()))]
    pub fn write<W: Write>(&self, capture: &CaptureBuffer, out: &mut W) -> Result<(), TraceError> {
        #[cfg(feature = "cpu-profiling")]
        let _span = crate::profile_span!("WaveformWriter::write");

        let ids: Vec<String> = (0..self.layout.signals().len())
            .map(signal_identifier)
            .collect();
        self.write_definitions(out, &ids)?;

        for (i, frame) in capture.frames().iter().enumerate() {
            writeln!(out, "#{}", 2 * i)?;
            writeln!(out, "1{CLOCK_ID}")?;
            for (signal, id) in self.layout.signals().iter().zip(&ids) {
                let value = frame
                    .range_binary(signal.low_bit, signal.high_bit)
                    .unwrap_or_default();
                if signal.width == 1 {
                    writeln!(out, "{value}{id}")?;
                } else {
                    writeln!(out, "b{value} {id}")?;
                }
            }
            writeln!(out)?;

            writeln!(out, "#{}", 2 * i + 1)?;
            writeln!(out, "0{CLOCK_ID}")?;
            writeln!(out)?;
        }

        out.flush()?;
        log::debug!(
            "Wrote trace with {} signals over {} frames",
            ids.len(),
            capture.frames().len()
        );
        Ok(())
    }

    pub fn to_string(&self, capture: &CaptureBuffer) -> Result<String, TraceError> {
        let mut out = Vec::new();
        self.write(capture, &mut out)?;
        Ok(String::from_utf8(out)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture_buffer::{CAPTURE_BYTES, FRAME_BYTES};
    use crate::signal_registry::Signal;

    fn fixed_header() -> TraceHeader {
        TraceHeader {
            date: "2024-01-01 00:00:00".to_string(),
            version: "RED TIN test".to_string(),
        }
    }

    #[test]
    fn test_sample_rate_timescale() {
        assert_eq!(SampleRate::from_mhz(20.0).unwrap().half_period_ps(), 25_000);
        assert_eq!(SampleRate::from_mhz(100.0).unwrap().half_period_ps(), 5_000);
        assert_eq!(SampleRate::from_mhz(3.0).unwrap().half_period_ps(), 166_667);
        assert!((SampleRate::from_mhz(20.0).unwrap().frame_period_us() - 0.05).abs() < 1e-12);
        assert_eq!(SampleRate::default().half_period_ps(), 25_000);
    }

    #[test]
    fn test_sample_rate_rejects_invalid() {
        for mhz in [0.0, -1.0, f64::NAN, f64::INFINITY, 2_000_000.0] {
            assert!(matches!(
                SampleRate::from_mhz(mhz),
                Err(TraceError::InvalidSampleRate { .. })
            ));
        }
    }

    #[test]
    fn test_identifiers_are_unique() {
        assert_eq!(signal_identifier(0), "A");
        assert_eq!(signal_identifier(1), "B");
        let ids: Vec<String> = (0..128).map(signal_identifier).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), 128);
        assert!(ids.iter().all(|id| !id.contains(CLOCK_ID)));
        assert!(ids.iter().all(|id| !id.contains('$') && !id.contains('#')));
        assert_eq!(signal_identifier(63), "\"");
        assert_eq!(signal_identifier(64), "%");
        assert!(ids.iter().all(|id| id.chars().all(|c| c.is_ascii_graphic())));
    }

    #[test]
    fn test_single_bit_clock_scenario() {
        let layout = SignalLayout::assign(&[Signal::new("clk", 1)]).unwrap();
        let mut data = vec![0u8; CAPTURE_BYTES];
        data[0] = 0x80;
        let capture = CaptureBuffer::from_bytes(&data).unwrap();

        let trace = WaveformWriter::new(&layout, SampleRate::default())
            .with_header(fixed_header())
            .to_string(&capture)
            .unwrap();

        let expected_start = "\
$timescale 25000ps $end
$date 2024-01-01 00:00:00 $end
$version RED TIN test $end
$var reg 1 * capture_clk $end
$var wire 1 A clk $end
$enddefinition $end
#0
1*
1A

#1
0*

#2
1*
0A
";
        assert!(trace.starts_with(expected_start), "{trace}");
        assert!(trace.contains("#1023\n0*\n"));
        assert!(!trace.contains("#1024"));
    }

    #[test]
    fn test_vector_signals() {
        let layout =
            SignalLayout::assign(&[Signal::new("buttons", 4), Signal::new("count", 12)]).unwrap();
        let mut data = vec![0u8; CAPTURE_BYTES];
        // frame 1: buttons = 1001, count = 0x0AB -> bits 123..112
        data[FRAME_BYTES] = 0b1001_0000;
        data[FRAME_BYTES + 1] = 0xAB;
        let capture = CaptureBuffer::from_bytes(&data).unwrap();

        let trace = WaveformWriter::new(&layout, SampleRate::default())
            .with_header(fixed_header())
            .to_string(&capture)
            .unwrap();

        assert!(trace.contains("$var wire 4 A buttons $end\n$var wire 12 B count $end\n"));
        assert!(trace.contains("#0\n1*\nb0000 A\nb000000000000 B\n\n"));
        assert!(trace.contains("#2\n1*\nb1001 A\nb000010101011 B\n\n"));
    }

    #[test]
    fn test_output_is_deterministic() {
        let layout = SignalLayout::assign(&[Signal::new("bus", 16)]).unwrap();
        let data: Vec<u8> = (0..CAPTURE_BYTES).map(|i| (i * 7 % 251) as u8).collect();
        let capture = CaptureBuffer::from_bytes(&data).unwrap();
        let rate = SampleRate::from_mhz(48.0).unwrap();

        let first = WaveformWriter::new(&layout, rate)
            .with_header(fixed_header())
            .to_string(&capture)
            .unwrap();
        let second = WaveformWriter::new(&layout, rate)
            .with_header(fixed_header())
            .to_string(&capture)
            .unwrap();
        assert_eq!(first, second);

        // Only the date line differs when the header is taken from the clock.
        let live = WaveformWriter::new(&layout, rate).to_string(&capture).unwrap();
        let strip = |s: &str| {
            s.lines()
                .filter(|l| !l.starts_with("$date") && !l.starts_with("$version"))
                .collect::<Vec<_>>()
                .join("\n")
        };
        assert_eq!(strip(&first), strip(&live));
    }
}
