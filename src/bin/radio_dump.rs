//! Radio memory dump utility
//! Downloads a UV-5R image over serial and saves it as a `.img` file

use anyhow::Context;
use chirp_bitwise::drivers::{
    get_driver, init_drivers, uv5r, CloneModeRadio, Radio, Status, StatusCallback,
};
use chirp_bitwise::formats::save_img;
use chirp_bitwise::serial::{list_ports, SerialConfig, SerialPort};
use chirp_bitwise::Metadata;
use std::env;
use std::time::Duration;
use tracing_subscriber::{fmt::format::FmtSpan, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter_layer = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;

    let format_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::NONE);

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(format_layer)
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() != 3 {
        eprintln!("Usage: {} <port> <out.img>", args[0]);
        eprintln!("Example: {} /dev/ttyUSB0 uv5r.img", args[0]);
        std::process::exit(1);
    }

    let port_name = &args[1];
    let out_path = &args[2];

    init_drivers();
    let driver = get_driver(uv5r::VENDOR, uv5r::MODEL)
        .context("UV-5R driver is not registered")?;
    tracing::info!("Using driver: {}", driver.full_name());

    let config = SerialConfig::new(9600).with_timeout(Duration::from_secs(1));
    let mut port = match SerialPort::open(port_name, config) {
        Ok(port) => port,
        Err(e) => {
            eprintln!("Failed to open {}: {}", port_name, e);
            if let Ok(ports) = list_ports() {
                eprintln!("Available ports:");
                for name in ports {
                    eprintln!("  {}", name);
                }
            }
            std::process::exit(1);
        }
    };
    port.clear_all()?;

    tracing::info!("Downloading memory from radio...");
    let mut radio = uv5r::UV5RRadio::new();
    let progress: StatusCallback = Box::new(|status: &Status| {
        if status.current % 0x400 == 0 || status.current == status.max {
            tracing::info!("{}", status);
        }
    });
    let mmap = radio.sync_in(&mut port, Some(progress)).await?;
    port.close();
    tracing::info!("Downloaded {} bytes", mmap.len());

    let metadata = Metadata::new(uv5r::VENDOR, uv5r::MODEL).with_rclass("BaofengUV5R");
    save_img(out_path, &mmap, &metadata)
        .with_context(|| format!("Failed to save {}", out_path))?;

    println!("\n=== Download Complete ===");
    println!("Radio:    {}", radio.get_name());
    if let Ok(version) = radio.firmware_version() {
        println!("Firmware: {}", version);
    }
    println!("Image:    {} ({} bytes)", out_path, mmap.len());
    println!();

    for memory in radio.get_memories()? {
        println!("{}", memory);
    }

    Ok(())
}
