// File format handlers
pub mod img;
pub mod metadata;

pub use img::{encode_img, load_img, parse_img, save_img, ImgError};
pub use metadata::Metadata;
