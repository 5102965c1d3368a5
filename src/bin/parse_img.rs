//! Image inspection utility
//! Binds a layout file to a saved `.img` and prints its fields

use anyhow::Context;
use chirp_bitwise::formats::load_img;
use chirp_bitwise::Schema;
use std::env;
use std::fs;
use tracing_subscriber::{fmt::format::FmtSpan, prelude::*, EnvFilter};

fn main() -> anyhow::Result<()> {
    let filter_layer = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("warn"))?;

    let format_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::NONE);

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(format_layer)
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 || args.len() > 4 {
        eprintln!("Usage: {} <file.img> <schema.txt> [path]", args[0]);
        eprintln!("Example: {} uv5r.img uv5r.layout 'memory[0].rxfreq'", args[0]);
        std::process::exit(1);
    }

    let (mmap, metadata) =
        load_img(&args[1]).with_context(|| format!("Failed to load image {}", args[1]))?;
    let source = fs::read_to_string(&args[2])
        .with_context(|| format!("Failed to read layout {}", args[2]))?;
    let schema = Schema::compile(&source).context("Failed to compile layout")?;

    println!("=== {} ===", args[1]);
    match metadata.radio_name() {
        Some(name) => println!("Radio:   {}", name),
        None => println!("Radio:   (no metadata)"),
    }
    println!("Image:   {} bytes", mmap.len());
    println!("Layout:  {} bytes", schema.size());
    if schema.size() > mmap.len() {
        println!("Warning: layout extends past the end of the image");
    }
    println!();

    let root = schema.bind(&mmap);
    match args.get(3) {
        Some(path) => {
            let location = schema.locate(path)?;
            println!(
                "{} @ 0x{:04X} bit {} ({} bits)",
                location.path, location.offset, location.bit_offset, location.bits
            );
            println!("{}", root.lookup(path)?);
            let end = location.offset + (location.bit_offset as usize + location.bits).div_ceil(8);
            print!("{}", mmap.printable(Some(location.offset), Some(end)));
        }
        None => println!("{}", root),
    }

    Ok(())
}
