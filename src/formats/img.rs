// .img container: raw image bytes, a magic separator, then base64 JSON metadata

use super::metadata::Metadata;
use crate::memmap::MemoryMap;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ImgError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to decode base64 metadata: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Failed to parse metadata JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ImgError>;

/// Separates image data from the metadata trailer
pub const MAGIC: &[u8] = b"\x00\xffchirp\xeeimg\x00\x01";

/// Split file contents into image and metadata
pub fn parse_img(data: &[u8]) -> Result<(MemoryMap, Metadata)> {
    match find_magic(data) {
        Some(idx) => {
            let trailer = data[idx + MAGIC.len()..].trim_ascii();
            let metadata = Metadata::from_json(&STANDARD.decode(trailer)?)?;
            debug!("Image of {} bytes with metadata for {:?}", idx, metadata.radio_name());
            Ok((MemoryMap::new(data[..idx].to_vec()), metadata))
        }
        None => {
            debug!("Raw image of {} bytes without metadata", data.len());
            Ok((MemoryMap::new(data.to_vec()), Metadata::default()))
        }
    }
}

/// Serialize an image with its metadata trailer
pub fn encode_img(mmap: &MemoryMap, metadata: &Metadata) -> Result<Vec<u8>> {
    let mut out = mmap.get_packed();
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(STANDARD.encode(metadata.to_json()?).as_bytes());
    Ok(out)
}

pub fn load_img(filename: impl AsRef<Path>) -> Result<(MemoryMap, Metadata)> {
    parse_img(&fs::read(filename)?)
}

pub fn save_img(filename: impl AsRef<Path>, mmap: &MemoryMap, metadata: &Metadata) -> Result<()> {
    fs::write(filename, encode_img(mmap, metadata)?)?;
    Ok(())
}

fn find_magic(data: &[u8]) -> Option<usize> {
    data.windows(MAGIC.len()).position(|window| window == MAGIC)
}
