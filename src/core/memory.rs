// Driver-facing channel record

use crate::core::constants::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MemoryError {
    #[error("Invalid frequency: {0}")]
    InvalidFrequency(String),

    #[error("Invalid tone: {0}")]
    InvalidTone(f32),

    #[error("Invalid DTCS code: {0}")]
    InvalidDtcs(u16),

    #[error("Invalid mode: {0}")]
    InvalidMode(String),

    #[error("Invalid duplex: {0}")]
    InvalidDuplex(String),

    #[error("Invalid tone mode: {0}")]
    InvalidToneMode(String),

    #[error("Invalid cross mode: {0}")]
    InvalidCrossMode(String),

    #[error("Invalid DTCS polarity: {0}")]
    InvalidPolarity(String),
}

pub type Result<T> = std::result::Result<T, MemoryError>;

/// Transmit offset direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Duplex {
    #[default]
    #[serde(rename = "")]
    Simplex,
    #[serde(rename = "+")]
    Plus,
    #[serde(rename = "-")]
    Minus,
    /// `offset` holds the absolute transmit frequency
    #[serde(rename = "split")]
    Split,
    /// Transmit inhibited
    #[serde(rename = "off")]
    Off,
}

impl Duplex {
    pub fn as_str(&self) -> &'static str {
        match self {
            Duplex::Simplex => "",
            Duplex::Plus => "+",
            Duplex::Minus => "-",
            Duplex::Split => "split",
            Duplex::Off => "off",
        }
    }
}

impl FromStr for Duplex {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "" => Ok(Duplex::Simplex),
            "+" => Ok(Duplex::Plus),
            "-" => Ok(Duplex::Minus),
            "split" => Ok(Duplex::Split),
            "off" => Ok(Duplex::Off),
            other => Err(MemoryError::InvalidDuplex(other.to_string())),
        }
    }
}

/// Squelch tone mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ToneMode {
    #[default]
    #[serde(rename = "")]
    None,
    Tone,
    #[serde(rename = "TSQL")]
    Tsql,
    #[serde(rename = "DTCS")]
    Dtcs,
    /// Transmit and receive use different tone kinds, see `cross_mode`
    Cross,
}

impl ToneMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToneMode::None => "",
            ToneMode::Tone => "Tone",
            ToneMode::Tsql => "TSQL",
            ToneMode::Dtcs => "DTCS",
            ToneMode::Cross => "Cross",
        }
    }
}

impl FromStr for ToneMode {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "" => Ok(ToneMode::None),
            "Tone" => Ok(ToneMode::Tone),
            "TSQL" => Ok(ToneMode::Tsql),
            "DTCS" => Ok(ToneMode::Dtcs),
            "Cross" => Ok(ToneMode::Cross),
            other => Err(MemoryError::InvalidToneMode(other.to_string())),
        }
    }
}

/// One radio memory channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    pub number: u32,

    pub name: String,

    /// Receive frequency in Hz
    pub freq: u64,

    pub duplex: Duplex,

    /// Offset in Hz, or the transmit frequency for [`Duplex::Split`]
    pub offset: u64,

    pub tmode: ToneMode,

    /// Transmit CTCSS tone in Hz
    pub rtone: f32,

    /// Receive CTCSS tone in Hz
    pub ctone: f32,

    /// Transmit DTCS code
    pub dtcs: u16,

    /// Receive DTCS code
    pub rx_dtcs: u16,

    /// DTCS polarity ("NN", "NR", "RN", "RR")
    pub dtcs_polarity: String,

    pub cross_mode: String,

    /// Excluded from scanning
    pub skip: bool,

    /// Power level label
    pub power: Option<String>,

    pub mode: String,

    pub empty: bool,

    /// Model-specific per-channel settings, keyed by layout field name
    pub extra: BTreeMap<String, i64>,
}

impl Default for Memory {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Memory {
    pub fn new(number: u32) -> Self {
        Self {
            number,
            name: String::new(),
            freq: 0,
            duplex: Duplex::Simplex,
            offset: 0,
            tmode: ToneMode::None,
            rtone: 88.5,
            ctone: 88.5,
            dtcs: 23,
            rx_dtcs: 23,
            dtcs_polarity: "NN".to_string(),
            cross_mode: "Tone->Tone".to_string(),
            skip: false,
            power: None,
            mode: "FM".to_string(),
            empty: false,
            extra: BTreeMap::new(),
        }
    }

    pub fn new_empty(number: u32) -> Self {
        Self {
            empty: true,
            ..Self::new(number)
        }
    }

    /// Format Hz as "146.520000"
    pub fn format_freq(freq: u64) -> String {
        format!("{}.{:06}", freq / 1_000_000, freq % 1_000_000)
    }

    pub fn validate(&self) -> Result<()> {
        if !is_valid_tone(self.rtone) {
            return Err(MemoryError::InvalidTone(self.rtone));
        }
        if !is_valid_tone(self.ctone) {
            return Err(MemoryError::InvalidTone(self.ctone));
        }
        if !is_valid_dtcs(self.dtcs) {
            return Err(MemoryError::InvalidDtcs(self.dtcs));
        }
        if !is_valid_dtcs(self.rx_dtcs) {
            return Err(MemoryError::InvalidDtcs(self.rx_dtcs));
        }
        if !is_valid_mode(&self.mode) {
            return Err(MemoryError::InvalidMode(self.mode.clone()));
        }
        if !is_valid_cross_mode(&self.cross_mode) {
            return Err(MemoryError::InvalidCrossMode(self.cross_mode.clone()));
        }
        if !DTCS_POLARITIES.contains(&self.dtcs_polarity.as_str()) {
            return Err(MemoryError::InvalidPolarity(self.dtcs_polarity.clone()));
        }
        Ok(())
    }
}

impl fmt::Display for Memory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.empty {
            return write!(f, "Memory {}: (empty)", self.number);
        }

        write!(
            f,
            "Memory {}: {} {}{} {} {:?}",
            self.number,
            Self::format_freq(self.freq),
            if self.duplex == Duplex::Simplex { "/" } else { self.duplex.as_str() },
            Self::format_freq(self.offset),
            self.mode,
            self.name,
        )?;
        match self.tmode {
            ToneMode::None => Ok(()),
            ToneMode::Tone => write!(f, " Tone {:.1}", self.rtone),
            ToneMode::Tsql => write!(f, " TSQL {:.1}", self.ctone),
            ToneMode::Dtcs => write!(f, " DTCS {:03}{}", self.dtcs, self.dtcs_polarity),
            ToneMode::Cross => write!(f, " Cross {}", self.cross_mode),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_freq() {
        assert_eq!(Memory::format_freq(146_520_000), "146.520000");
        assert_eq!(Memory::format_freq(520_000), "0.520000");
    }

    #[test]
    fn test_enums_from_str() {
        assert_eq!("split".parse::<Duplex>().unwrap(), Duplex::Split);
        assert_eq!("".parse::<Duplex>().unwrap(), Duplex::Simplex);
        assert!("x".parse::<Duplex>().is_err());
        assert_eq!("TSQL".parse::<ToneMode>().unwrap(), ToneMode::Tsql);
        assert_eq!(ToneMode::Cross.as_str(), "Cross");
    }

    #[test]
    fn test_validation() {
        let mut mem = Memory::new(1);
        mem.freq = 146_520_000;
        assert!(mem.validate().is_ok());

        mem.rtone = 88.0;
        assert_eq!(mem.validate(), Err(MemoryError::InvalidTone(88.0)));
    }

    #[test]
    fn test_serde_names() {
        let mut mem = Memory::new(3);
        mem.duplex = Duplex::Minus;
        mem.tmode = ToneMode::Tsql;
        let json = serde_json::to_value(&mem).unwrap();
        assert_eq!(json["duplex"], "-");
        assert_eq!(json["tmode"], "TSQL");
        let back: Memory = serde_json::from_value(json).unwrap();
        assert_eq!(back, mem);
    }

    #[test]
    fn test_display() {
        let mut mem = Memory::new(5);
        mem.freq = 146_520_000;
        mem.name = "CALL".to_string();
        assert_eq!(mem.to_string(), "Memory 5: 146.520000 /0.000000 FM \"CALL\"");
        assert_eq!(Memory::new_empty(2).to_string(), "Memory 2: (empty)");
    }
}
