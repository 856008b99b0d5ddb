//! # RED TIN RS
//!
//! Host-side control library for the RED TIN FPGA logic analyzer.
//!
//! The capture core samples a 128-bit vector and keeps 512 frames around a trigger event.
//! This crate maps named signals onto that vector, encodes bit-level trigger conditions
//! into the configuration the core expects, runs the serial capture handshake and renders
//! the returned samples as a value-change trace.
//!
//! ## Features
//!
//! - **Signal registry**: Ordered, named multi-bit signals packed MSB-first into the sample vector
//! - **Trigger encoding**: Condition masks for the opcode protocol, LUT bitstreams for older cores
//! - **Bounded capture**: Every blocking step has a deadline and can be cancelled
//! - **Trace output**: Value-change dump with a synthetic sample clock
//! - **DataFrame output**: Uses `polars` to tabulate captured signals
//! - **Session files**: Load and save signal/trigger sets in the `.scfg` format
//!
//! ## Examples
//!
//! ### Configuring signals and triggers
//!
//! ```rust
//! use redtin_rs::{SignalRegistry, TriggerCondition, TriggerMasks};
//!
//! let mut registry = SignalRegistry::new();
//! registry.add_signal("buttons", 4)?;
//! registry.add_signal("count", 32)?;
//! registry.add_trigger("buttons", 2, TriggerCondition::Rising)?;
//!
//! let layout = registry.layout()?;
//! let masks = TriggerMasks::encode(&layout, registry.triggers())?;
//! println!("{}", masks);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ### Capturing from a device
//!
//! ```rust,no_run
//! use redtin_rs::{CaptureOptions, LogicAnalyzer, SampleRate, SessionConfig};
//! use std::time::Duration;
//!
//! let session = SessionConfig::load("buttons.scfg")?;
//! let mut analyzer = LogicAnalyzer::connect("/dev/ttyUSB0")?;
//!
//! let options = CaptureOptions::default().with_sync_timeout(Duration::from_secs(5));
//! let capture = analyzer.capture(&session.registry, &options)?;
//! std::fs::write("capture.vcd", capture.trace(session.sample_rate)?)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#[cfg(feature = "cpu-profiling")]
macro_rules! profile_span {
    ($name:literal) => {
        tracy_client::Client::running()
            .map(|client| client.span(tracy_client::span_location!($name), 0))
    };
}

#[cfg(feature = "cpu-profiling")]
pub(crate) use profile_span;

pub mod bit_vector;
pub mod capture_buffer;
pub mod device_connector;
pub mod logic_analyzer;
pub mod serial_link;
pub mod session_file;
pub mod signal_registry;
pub mod trigger_config;
pub mod waveform;

// Re-export the main types for convenience
pub use signal_registry::{
    LayoutError, PlacedSignal, RegistryError, Signal, SignalLayout, SignalRegistry,
    Trigger, TriggerCondition,
};

pub use trigger_config::{EncodeError, TriggerConfig, TriggerMasks, TruthTableBitstream};

pub use serial_link::{
    CancelToken, CaptureOptions, CapturePort, CaptureState, DeviceError, SerialLink,
};

pub use device_connector::{DeviceConnector, SerialDevice};

pub use capture_buffer::{CaptureBuffer, Frame};

pub use waveform::{SampleRate, TraceError, TraceHeader, WaveformWriter};

pub use session_file::{SessionConfig, SessionFileError};

pub use logic_analyzer::{Capture, CaptureError, HardwareGeneration, LogicAnalyzer};
