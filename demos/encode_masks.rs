// Offline trigger encoding example
//
// Prints the condition masks and the LUT bitstream a configuration file produces,
// without talking to any hardware.

use clap::Parser;
use redtin_rs::{SessionConfig, TriggerConfig, TriggerMasks, TruthTableBitstream};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "encode_masks")]
#[command(about = "Show the trigger configuration sent to the capture core")]
struct Args {
    /// Signal configuration file (.scfg)
    config: PathBuf,

    /// Also dump the LUT bitstream used by older cores
    #[arg(long)]
    bitstream: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let session = SessionConfig::load(&args.config)?;
    let layout = session.registry.layout()?;

    for signal in layout.signals() {
        if signal.width == 1 {
            println!("Signal {} is data[{}]", signal.name, signal.high_bit);
        } else {
            println!(
                "Signal {}[{}:0] is data[{}:{}]",
                signal.name,
                signal.width - 1,
                signal.high_bit,
                signal.low_bit
            );
        }
    }
    println!();

    let masks = TriggerMasks::encode(&layout, session.registry.triggers())?;
    print!("{}", masks);

    println!("\nPackets:");
    for packet in masks.config_bytes().chunks(20) {
        let hex: Vec<String> = packet.iter().map(|b| format!("{b:02x}")).collect();
        println!("  {}", hex.join(""));
    }

    if args.bitstream {
        let bitstream = TruthTableBitstream::encode(&layout, session.registry.triggers())?;
        println!("\nBitstream:");
        for row in bitstream.bitstream().chunks(16) {
            let hex: Vec<String> = row.iter().map(|b| format!("{b:02x}")).collect();
            println!("  {}", hex.join(" "));
        }
    }

    Ok(())
}
