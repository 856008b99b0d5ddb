// One-shot capture example
//
// Loads a signal configuration, runs a single capture on the given port, writes the
// result as a VCD file and optionally opens it in an external viewer.

use clap::Parser;
use redtin_rs::{
    CaptureOptions, DeviceConnector, HardwareGeneration, LogicAnalyzer, SampleRate,
    SessionConfig, TraceHeader,
};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "capture")]
#[command(about = "Capture 512 frames from a RED TIN logic analyzer")]
struct Args {
    /// Signal configuration file (.scfg)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial port of the capture core
    #[arg(short, long, default_value = "/dev/ttyUSB0")]
    port: String,

    /// Where to write the trace
    #[arg(short, long, default_value = "capture.vcd")]
    output: PathBuf,

    /// Sampling frequency in MHz, overrides the configuration file
    #[arg(short, long)]
    sample_rate: Option<f64>,

    /// Seconds to wait for the trigger to fire
    #[arg(long, default_value_t = 10)]
    sync_timeout: u64,

    /// Target the older LUT-based capture core
    #[arg(long)]
    truth_tables: bool,

    /// Viewer to launch on the trace, e.g. gtkwave
    #[arg(long)]
    viewer: Option<String>,

    /// List serial ports and exit
    #[arg(long)]
    list_ports: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if args.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::init();
    }

    if args.list_ports {
        for device in DeviceConnector::available_devices()? {
            println!("{:<20} {}", device.port, device.description);
        }
        return Ok(());
    }

    let mut session = match &args.config {
        Some(path) => SessionConfig::load(path)?,
        None => {
            eprintln!("No configuration given, capturing all 128 bits as one signal");
            let mut session = SessionConfig::default();
            session.registry.add_signal("data", 128)?;
            session
        }
    };
    if let Some(mhz) = args.sample_rate {
        session.sample_rate = SampleRate::from_mhz(mhz)?;
    }

    println!("Signals:");
    for signal in session.registry.signals() {
        println!("  {:<16} {} bit(s)", signal.name, signal.width);
    }
    println!("Triggers:");
    for trigger in session.registry.triggers() {
        println!("  {}", trigger);
    }

    let generation = if args.truth_tables {
        HardwareGeneration::TruthTables
    } else {
        HardwareGeneration::ConditionMasks
    };
    let mut analyzer = LogicAnalyzer::connect(&args.port)?.with_generation(generation);

    let options =
        CaptureOptions::default().with_sync_timeout(Duration::from_secs(args.sync_timeout));

    println!("Waiting for trigger on {}...", args.port);
    let capture = analyzer.capture(&session.registry, &options)?;
    println!("Got the data");

    let mut out = BufWriter::new(File::create(&args.output)?);
    capture.write_trace(session.sample_rate, TraceHeader::now(), &mut out)?;
    println!("Trace written to {}", args.output.display());

    if let Some(viewer) = args.viewer {
        let status = Command::new(&viewer)
            .arg(&args.output)
            .args(session.viewer_args.split_whitespace())
            .spawn();
        if let Err(e) = status {
            eprintln!("Failed to launch {}: {}", viewer, e);
        }
    }

    Ok(())
}
