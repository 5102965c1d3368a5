// Metadata trailer of .img files

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// JSON object stored after the image data.
///
/// Unknown keys written by other tools are kept in `extra` and written back
/// unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Metadata {
    /// Driver class that produced the image
    #[serde(default)]
    pub rclass: String,

    #[serde(default)]
    pub vendor: String,

    #[serde(default)]
    pub model: String,

    #[serde(default)]
    pub variant: String,

    /// Version of the program that wrote the file
    #[serde(default)]
    pub chirp_version: String,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Metadata {
    pub fn new(vendor: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            vendor: vendor.into(),
            model: model.into(),
            chirp_version: crate::VERSION.to_string(),
            ..Default::default()
        }
    }

    pub fn with_rclass(mut self, rclass: impl Into<String>) -> Self {
        self.rclass = rclass.into();
        self
    }

    /// True when the image was written for `vendor` / `model`
    pub fn is_for(&self, vendor: &str, model: &str) -> bool {
        self.vendor == vendor && self.model == model
    }

    /// "Vendor Model", or None for an image without metadata
    pub fn radio_name(&self) -> Option<String> {
        match (self.vendor.is_empty(), self.model.is_empty()) {
            (true, true) => None,
            _ => Some(format!("{} {}", self.vendor, self.model).trim().to_string()),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_creation() {
        let meta = Metadata::new("Baofeng", "UV-5R").with_rclass("BaofengUV5R");
        assert!(meta.is_for("Baofeng", "UV-5R"));
        assert_eq!(meta.rclass, "BaofengUV5R");
        assert_eq!(meta.chirp_version, crate::VERSION);
        assert_eq!(meta.radio_name().as_deref(), Some("Baofeng UV-5R"));
        assert_eq!(Metadata::default().radio_name(), None);
    }

    #[test]
    fn test_unknown_keys_survive() {
        let json = br#"{"vendor":"Baofeng","model":"UV-5R","mem_extra":{"0":"x"}}"#;
        let meta = Metadata::from_json(json).unwrap();
        assert_eq!(meta.extra["mem_extra"], serde_json::json!({"0": "x"}));

        let again = Metadata::from_json(meta.to_json().unwrap().as_bytes()).unwrap();
        assert_eq!(again, meta);
    }
}
