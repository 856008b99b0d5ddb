use crate::capture_buffer::CaptureBuffer;
use crate::device_connector::DeviceConnector;
use crate::serial_link::{CaptureOptions, CapturePort, CaptureState, DeviceError, SerialLink};
use crate::signal_registry::{LayoutError, SignalLayout, SignalRegistry};
use crate::trigger_config::{EncodeError, TriggerMasks, TruthTableBitstream};
use crate::waveform::{SampleRate, TraceError, TraceHeader, WaveformWriter};
use polars::prelude::{DataFrame, PolarsError};
use serialport::SerialPort;
use std::io::Write;

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("Trigger configuration error: {0}")]
    Encode(#[from] EncodeError),

    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    #[error("Trace error: {0}")]
    Trace(#[from] TraceError),
}

/// Which trigger encoding the attached capture core expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HardwareGeneration {
    /// Five condition masks followed by an arm command.
    #[default]
    ConditionMasks,
    /// 256-byte LUT bitstream of channel-pair truth tables.
    TruthTables,
}

/// A finished capture together with the signal layout it was taken with.
#[derive(Debug, Clone)]
pub struct Capture {
    layout: SignalLayout,
    buffer: CaptureBuffer,
}

impl Capture {
    pub fn new(layout: SignalLayout, buffer: CaptureBuffer) -> Self {
        Self { layout, buffer }
    }

    pub fn layout(&self) -> &SignalLayout {
        &self.layout
    }

    pub fn buffer(&self) -> &CaptureBuffer {
        &self.buffer
    }

    pub fn write_trace<W: Write>(
        &self,
        sample_rate: SampleRate,
        header: TraceHeader,
        out: &mut W,
    ) -> Result<(), TraceError> {
        WaveformWriter::new(&self.layout, sample_rate)
            .with_header(header)
            .write(&self.buffer, out)
    }

    pub fn trace(&self, sample_rate: SampleRate) -> Result<String, TraceError> {
        WaveformWriter::new(&self.layout, sample_rate).to_string(&self.buffer)
    }

    pub fn to_dataframe(&self, sample_rate: SampleRate) -> Result<DataFrame, PolarsError> {
        self.buffer.to_dataframe(&self.layout, sample_rate)
    }
}

/// Host side of one capture core.
pub struct LogicAnalyzer<P> {
    link: SerialLink<P>,
    generation: HardwareGeneration,
}

impl LogicAnalyzer<Box<dyn SerialPort>> {
    pub fn connect(port: &str) -> Result<Self, DeviceError> {
        let link = DeviceConnector::connect(port)?;
        log::info!("Connected to logic analyzer on {}", port);
        Ok(Self::new(link))
    }
}

impl<P: CapturePort> LogicAnalyzer<P> {
    pub fn new(link: SerialLink<P>) -> Self {
        Self {
            link,
            generation: HardwareGeneration::default(),
        }
    }

    pub fn with_generation(mut self, generation: HardwareGeneration) -> Self {
        self.generation = generation;
        self
    }

    pub fn generation(&self) -> HardwareGeneration {
        self.generation
    }

    pub fn state(&self) -> CaptureState {
        self.link.state()
    }

    pub fn into_link(self) -> SerialLink<P> {
        self.link
    }

    /// Lays out the registry, encodes its triggers and runs one capture.
    ///
    /// Encoding happens before anything is sent, so a bad configuration never reaches
    /// the device. Nothing is retried; call again to start over.
    #[tracing::instrument(skip_all, fields(generation = ?self.generation))]
    pub fn capture(
        &mut self,
        registry: &SignalRegistry,
        options: &CaptureOptions,
    ) -> Result<Capture, CaptureError> {
        let layout = registry.layout().map_err(EncodeError::from)?;
        log::debug!(
            "Capturing {} signals using {} of 128 bits",
            layout.signals().len(),
            layout.used_bits()
        );

        let buffer = match self.generation {
            HardwareGeneration::ConditionMasks => {
                let masks = TriggerMasks::encode(&layout, registry.triggers())?;
                log::trace!("Trigger masks:\n{}", masks);
                self.link.capture(&masks, options)?
            }
            HardwareGeneration::TruthTables => {
                let bitstream = TruthTableBitstream::encode(&layout, registry.triggers())?;
                self.link.capture(&bitstream, options)?
            }
        };

        Ok(Capture::new(layout, buffer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial_link::tests::{sample_block, MockPort};
    use crate::serial_link::SAMPLE_SYNC_BYTE;
    use crate::signal_registry::TriggerCondition;
    use std::time::Duration;

    fn options() -> CaptureOptions {
        CaptureOptions::default()
            .with_sync_timeout(Duration::from_millis(50))
            .with_frame_timeout(Duration::from_millis(50))
    }

    fn answering_port() -> MockPort {
        let mut response = vec![SAMPLE_SYNC_BYTE];
        response.extend(sample_block());
        MockPort::with_response(&response)
    }

    #[test]
    fn test_capture_to_trace() {
        let mut registry = SignalRegistry::new();
        registry.add_signal("index", 8).unwrap();
        registry
            .add_trigger("index", 0, TriggerCondition::Change)
            .unwrap();

        let mut analyzer = LogicAnalyzer::new(SerialLink::new(answering_port()));
        let capture = analyzer.capture(&registry, &options()).unwrap();
        assert_eq!(analyzer.state(), CaptureState::Complete);

        let mut out = Vec::new();
        capture
            .write_trace(
                SampleRate::default(),
                TraceHeader::with_date("today"),
                &mut out,
            )
            .unwrap();
        let trace = String::from_utf8(out).unwrap();
        assert!(trace.contains("$var wire 8 A index $end"));
        assert!(trace.contains("#6\n1*\nb00000011 A\n"));

        let df = capture.to_dataframe(SampleRate::default()).unwrap();
        assert_eq!(df.height(), 512);
    }

    #[test]
    fn test_overflow_sends_nothing() {
        let mut registry = SignalRegistry::new();
        registry.add_signal("a", 100).unwrap();
        registry.add_signal("b", 29).unwrap();

        let mut analyzer = LogicAnalyzer::new(SerialLink::new(answering_port()));
        let result = analyzer.capture(&registry, &options());
        assert!(matches!(
            result,
            Err(CaptureError::Encode(EncodeError::Layout(
                LayoutError::ConfigurationOverflow { required: 129 }
            )))
        ));
        assert_eq!(analyzer.state(), CaptureState::Idle);
        assert!(analyzer.into_link().into_inner().tx.is_empty());
    }

    #[test]
    fn test_orphaned_trigger_sends_nothing() {
        let mut registry = SignalRegistry::new();
        registry.add_signal("a", 1).unwrap();
        registry.add_signal("b", 1).unwrap();
        registry.add_trigger("a", 0, TriggerCondition::High).unwrap();
        registry.remove_signal("a").unwrap();

        let mut analyzer = LogicAnalyzer::new(SerialLink::new(answering_port()));
        let result = analyzer.capture(&registry, &options());
        assert!(matches!(
            result,
            Err(CaptureError::Encode(EncodeError::UnresolvedTriggerSignal { .. }))
        ));
        assert!(analyzer.into_link().into_inner().tx.is_empty());
    }

    #[test]
    fn test_resized_signal_invalidates_trigger() {
        let mut registry = SignalRegistry::new();
        registry.add_signal("bus", 8).unwrap();
        registry.add_trigger("bus", 7, TriggerCondition::Low).unwrap();
        registry.remove_signal("bus").unwrap();
        registry.add_signal("bus", 4).unwrap();

        let mut analyzer = LogicAnalyzer::new(SerialLink::new(answering_port()));
        assert!(matches!(
            analyzer.capture(&registry, &options()),
            Err(CaptureError::Encode(EncodeError::InvalidTriggerBit { bit: 7, width: 4, .. }))
        ));
    }

    #[test]
    fn test_unresponsive_device_yields_no_capture() {
        let mut registry = SignalRegistry::new();
        registry.add_signal("clk", 1).unwrap();

        let mut analyzer = LogicAnalyzer::new(SerialLink::new(MockPort::default()));
        let result = analyzer.capture(&registry, &options());
        assert!(matches!(
            result,
            Err(CaptureError::Device(DeviceError::DeviceUnresponsive { .. }))
        ));
        assert_eq!(analyzer.state(), CaptureState::Failed);
    }

    #[test]
    fn test_truth_table_generation() {
        let mut registry = SignalRegistry::new();
        registry.add_signal("clk", 1).unwrap();

        let mut analyzer = LogicAnalyzer::new(SerialLink::new(answering_port()))
            .with_generation(HardwareGeneration::TruthTables);
        analyzer.capture(&registry, &options()).unwrap();

        let tx = analyzer.into_link().into_inner().tx;
        assert_eq!(tx.len(), 5 + 256);
        assert_eq!(&tx[..5], &[0xFE, 0xED, 0xFA, 0xCE, 0x00]);
    }
}
