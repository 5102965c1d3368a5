// Baofeng UV-5R radio driver
//
// Channel records, names and a handful of settings are described in the
// bitwise layout language below; every memory access goes through views
// bound to the downloaded image.

use super::traits::{CloneModeRadio, Radio, RadioError, RadioResult, Status, StatusCallback};
use crate::bitwise::{BitwiseError, FieldView, Schema, StringCodec, StructView};
use crate::core::{Duplex, Memory, MemoryError, ToneMode, DTCS_CODES};
use crate::memmap::MemoryMap;
use crate::serial::ByteChannel;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

pub const VENDOR: &str = "Baofeng";
pub const MODEL: &str = "UV-5R";

const MEM_FORMAT: &str = r#"
#seekto 0x0008;
struct {
  lbcd rxfreq[4];
  lbcd txfreq[4];
  ul16 rxtone;
  ul16 txtone;
  u8 unused1:3,
     isuhf:1,
     scode:4;
  u8 unknown1:7,
     txtoneicon:1;
  u8 mailicon:3,
     unknown2:3,
     lowpower:2;
  u8 unknown3:1,
     wide:1,
     unknown4:2,
     bcl:1,
     scan:1,
     pttid:2;
} memory[128];

#seekto 0x0E28;
struct {
  u8 squelch;
  u8 step;
  u8 unknown1;
  u8 save;
  u8 vox;
  u8 unknown2;
  u8 abr;
  u8 tdr;
  u8 beep;
  u8 timeout;
  u8 unknown3[4];
  u8 voice;
} settings;

#seekto 0x0E7E;
struct {
  u8 unused1:1,
     mrcha:7;
  u8 unused2:1,
     mrchb:7;
} wmchannel;

#seekto 0x0F56;
u16 fm_presets;

#seekto 0x1008;
struct {
  char name[7];
  u8 unknown2[9];
} names[128];

#seekto 0x1828;
struct {
  char line1[7];
  char line2[7];
} poweron_msg;

#seekto 0x1838;
struct {
  char line1[7];
  char line2[7];
} firmware_msg;

struct limit {
  u8 enable;
  bbcd lower[2];
  bbcd upper[2];
};

#seekto 0x1908;
struct {
  struct limit vhf;
  struct limit uhf;
} limits;
"#;

/// Main block: 8-byte ident header plus radio 0x0000..0x1800
const MEMSIZE: usize = 0x1808;

/// Ident header prepended to the downloaded data
const HEADER_SIZE: usize = 8;

/// Auxiliary block, stored after the main block in the image
const AUX_START: usize = 0x1EC0;
const AUX_END: usize = 0x2000;

const NUM_MEMORIES: u32 = 128;

const BLOCK_SIZE: usize = 0x40;
const WRITE_BLOCK_SIZE: usize = 0x10;

const ACK: u8 = 0x06;

/// Model identification magic bytes (UV-5R variant 291)
const UV5R_MODEL_291: &[u8] = b"\x50\xBB\xFF\x20\x12\x07\x25";

/// Model identification magic bytes (original UV-5R)
const UV5R_MODEL_ORIG: &[u8] = b"\x50\xBB\xFF\x01\x25\x98\x4D";

/// Image ranges written during upload (file offsets)
const UPLOAD_RANGES: &[(usize, usize)] = &[(0x0008, 0x0CF8), (0x0D08, 0x0DF8), (0x0E08, 0x1808)];

/// Auxiliary ranges written during upload (radio addresses)
const AUX_UPLOAD_RANGES: &[(usize, usize)] = &[(0x1EC0, 0x1EF0)];

/// Firmware version string location in the image
const FW_VERSION: std::ops::Range<usize> = 0x1838..0x1846;

/// Firmware prefixes reported by UV-5R family radios
const BASETYPE_UV5R: &[&[u8]] = &[
    b"BFS", b"BFB", b"N5R-2", b"N5R2", b"N5RV", b"BTS", b"D5R2", b"B5R2",
];

const POWER_LEVELS: &[&str] = &["High", "Low"];

const VALID_MODES: &[&str] = &["FM", "NFM"];

/// Tone values at or above this are CTCSS in tenths of Hz
const CTCSS_THRESHOLD: i64 = 0x0258;

/// Added to a DTCS index to mark inverted polarity
const DTCS_REVERSED: i64 = 0x69;

/// Raw transmit frequency marking a receive-only channel
const TX_INHIBIT: [u8; 4] = [0xFF; 4];

/// Per-channel settings surfaced through `Memory::extra`
const EXTRA_FIELDS: &[&str] = &["bcl", "pttid", "scode"];

lazy_static::lazy_static! {
    static ref SCHEMA: Result<Schema, BitwiseError> = Schema::compile(MEM_FORMAT);

    /// The UV-5R also knows code 645
    static ref UV5R_DTCS: Vec<u16> = {
        let mut codes = DTCS_CODES.to_vec();
        codes.push(645);
        codes.sort_unstable();
        codes
    };
}

fn schema() -> RadioResult<&'static Schema> {
    SCHEMA.as_ref().map_err(|e| RadioError::Bitwise(e.clone()))
}

/// Names are plain ASCII padded with 0xFF
fn name_codec() -> StringCodec {
    StringCodec::latin1(0xFF)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Tone {
    None,
    Ctcss(f32),
    Dtcs { code: u16, reversed: bool },
}

impl Tone {
    fn label(&self) -> &'static str {
        match self {
            Tone::None => "",
            Tone::Ctcss(_) => "Tone",
            Tone::Dtcs { .. } => "DTCS",
        }
    }

    fn polarity(&self) -> char {
        match self {
            Tone::Dtcs { reversed: true, .. } => 'R',
            _ => 'N',
        }
    }

    fn decode(value: i64) -> RadioResult<Tone> {
        match value {
            0 | 0xFFFF => Ok(Tone::None),
            v if v >= CTCSS_THRESHOLD => Ok(Tone::Ctcss(v as f32 / 10.0)),
            v => {
                let (index, reversed) = if v > DTCS_REVERSED {
                    (v - DTCS_REVERSED - 1, true)
                } else {
                    (v - 1, false)
                };
                UV5R_DTCS
                    .get(index as usize)
                    .map(|&code| Tone::Dtcs { code, reversed })
                    .ok_or_else(|| RadioError::InvalidResponse(format!("Unknown tone value {:#06x}", v)))
            }
        }
    }

    fn encode(&self) -> RadioResult<i64> {
        match *self {
            Tone::None => Ok(0),
            Tone::Ctcss(hz) => Ok((hz * 10.0).round() as i64),
            Tone::Dtcs { code, reversed } => {
                let index = UV5R_DTCS
                    .iter()
                    .position(|&c| c == code)
                    .ok_or(MemoryError::InvalidDtcs(code))? as i64;
                Ok(index + 1 + if reversed { DTCS_REVERSED } else { 0 })
            }
        }
    }
}

/// Fill the tone fields of `mem` from the decoded transmit and receive tones
fn apply_tones(mem: &mut Memory, tx: Tone, rx: Tone) {
    match tx {
        Tone::Ctcss(hz) => mem.rtone = hz,
        Tone::Dtcs { code, .. } => mem.dtcs = code,
        Tone::None => {}
    }
    match rx {
        Tone::Ctcss(hz) => mem.ctone = hz,
        Tone::Dtcs { code, .. } => mem.rx_dtcs = code,
        Tone::None => {}
    }
    mem.dtcs_polarity = format!("{}{}", tx.polarity(), rx.polarity());

    mem.tmode = match (tx, rx) {
        (Tone::None, Tone::None) => ToneMode::None,
        (Tone::Ctcss(_), Tone::None) => ToneMode::Tone,
        (Tone::Ctcss(a), Tone::Ctcss(b)) if a == b => ToneMode::Tsql,
        (Tone::Dtcs { code: a, .. }, Tone::Dtcs { code: b, .. }) if a == b => ToneMode::Dtcs,
        _ => {
            mem.cross_mode = format!("{}->{}", tx.label(), rx.label());
            ToneMode::Cross
        }
    };
}

/// Transmit and receive tones for `mem`
fn split_tones(mem: &Memory) -> RadioResult<(Tone, Tone)> {
    let mut polarity = mem.dtcs_polarity.chars();
    let tx_reversed = polarity.next() == Some('R');
    let rx_reversed = polarity.next() == Some('R');

    let tones = match mem.tmode {
        ToneMode::None => (Tone::None, Tone::None),
        ToneMode::Tone => (Tone::Ctcss(mem.rtone), Tone::None),
        ToneMode::Tsql => (Tone::Ctcss(mem.ctone), Tone::Ctcss(mem.ctone)),
        ToneMode::Dtcs => (
            Tone::Dtcs {
                code: mem.dtcs,
                reversed: tx_reversed,
            },
            Tone::Dtcs {
                code: mem.dtcs,
                reversed: rx_reversed,
            },
        ),
        ToneMode::Cross => {
            let (tx, rx) = mem
                .cross_mode
                .split_once("->")
                .ok_or_else(|| MemoryError::InvalidCrossMode(mem.cross_mode.clone()))?;
            let tx = match tx {
                "Tone" => Tone::Ctcss(mem.rtone),
                "DTCS" => Tone::Dtcs {
                    code: mem.dtcs,
                    reversed: tx_reversed,
                },
                _ => Tone::None,
            };
            let rx = match rx {
                "Tone" => Tone::Ctcss(mem.ctone),
                "DTCS" => Tone::Dtcs {
                    code: mem.rx_dtcs,
                    reversed: rx_reversed,
                },
                _ => Tone::None,
            };
            (tx, rx)
        }
    };
    Ok(tones)
}

/// Write every field of `mem` into a zeroed channel record
fn encode_channel(
    chan: &StructView<'_>,
    name: &StructView<'_>,
    mem: &Memory,
    extras: &BTreeMap<String, i64>,
) -> RadioResult<()> {
    let (tx, rx) = split_tones(mem)?;
    let lowpower = match &mem.power {
        Some(level) => POWER_LEVELS
            .iter()
            .position(|l| l == level)
            .ok_or_else(|| RadioError::Radio(format!("Unsupported power level: {}", level)))?,
        None => 0,
    };

    chan.fill_raw(0x00)?;
    chan.set_int("rxfreq", (mem.freq / 10) as i64)?;

    let txfreq = match mem.duplex {
        Duplex::Off => None,
        Duplex::Simplex => Some(mem.freq),
        Duplex::Plus => Some(mem.freq + mem.offset),
        Duplex::Minus => Some(
            mem.freq
                .checked_sub(mem.offset)
                .ok_or_else(|| MemoryError::InvalidFrequency(format!("-{}", mem.offset)))?,
        ),
        Duplex::Split => Some(mem.offset),
    };
    match txfreq {
        Some(freq) => chan.set_int("txfreq", (freq / 10) as i64)?,
        None => chan.field("txfreq")?.set_raw(&TX_INHIBIT)?,
    }

    chan.set_int("txtone", tx.encode()?)?;
    chan.set_int("rxtone", rx.encode()?)?;
    chan.set_int("scan", i64::from(!mem.skip))?;
    chan.set_int("wide", i64::from(mem.mode == "FM"))?;
    chan.set_int("lowpower", lowpower as i64)?;

    for (key, value) in extras {
        chan.set_int(key, *value)?;
    }

    let text: String = mem.name.chars().take(7).collect();
    name.field("name")?
        .into_chars()?
        .set_string_with(&text, &name_codec())?;
    Ok(())
}

/// Shrink a 12-byte ident to the 8 bytes stored in the image header
fn compact_ident(ident: &[u8]) -> Vec<u8> {
    if ident.len() == 12 {
        let mut compact = vec![ident[0], ident[3], ident[5]];
        compact.extend_from_slice(&ident[7..]);
        compact
    } else {
        ident.to_vec()
    }
}

fn report(status_fn: &Option<StatusCallback>, current: usize, max: usize, message: &str) {
    if let Some(cb) = status_fn {
        cb(&Status::new(current, max, message));
    }
}

/// Baofeng UV-5R driver
#[derive(Debug, Default)]
pub struct UV5RRadio {
    mmap: Option<MemoryMap>,
}

impl UV5RRadio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mmap(&self) -> Option<&MemoryMap> {
        self.mmap.as_ref()
    }

    /// Root struct of the loaded image
    fn memobj(&self) -> RadioResult<StructView<'_>> {
        let mmap = self.mmap.as_ref().ok_or(RadioError::NoImage)?;
        Ok(schema()?.bind(mmap))
    }

    /// Channel record and name record for `number`
    fn channel(&self, number: u32) -> RadioResult<(StructView<'_>, StructView<'_>)> {
        if number >= NUM_MEMORIES {
            return Err(RadioError::InvalidMemory(number));
        }
        let root = self.memobj()?;
        let index = number as usize;
        let chan = root.array("memory")?.get(index)?.into_struct()?;
        let name = root.array("names")?.get(index)?.into_struct()?;
        Ok((chan, name))
    }

    /// Read a numeric setting such as `settings.squelch` or `limits.vhf.lower`
    pub fn get_setting(&self, path: &str) -> RadioResult<i64> {
        Ok(self.memobj()?.lookup(path)?.get_int()?)
    }

    pub fn set_setting(&mut self, path: &str, value: i64) -> RadioResult<()> {
        Ok(self.memobj()?.lookup(path)?.set_int(value)?)
    }

    /// The two lines shown at power-on
    pub fn power_on_message(&self) -> RadioResult<(String, String)> {
        let msg = self.memobj()?.child("poweron_msg")?;
        let codec = name_codec();
        let line1 = msg.field("line1")?.into_chars()?.get_string_with(&codec)?;
        let line2 = msg.field("line2")?.into_chars()?.get_string_with(&codec)?;
        Ok((line1, line2))
    }

    /// Firmware version recorded in the image
    pub fn firmware_version(&self) -> RadioResult<String> {
        let msg = self.memobj()?.child("firmware_msg")?;
        let mut version = msg.field("line1")?.into_chars()?.get_string()?;
        version.push_str(&msg.field("line2")?.into_chars()?.get_string()?);
        Ok(version.trim_end_matches(['\0', '\u{ff}']).to_string())
    }

    /// Send one magic sequence and read the radio's ident
    async fn do_ident<C: ByteChannel>(port: &mut C, magic: &[u8]) -> RadioResult<Option<Vec<u8>>> {
        debug!("Sending magic: {:02X?}", magic);
        for &byte in magic {
            port.write(&[byte]).await?;
            sleep(Duration::from_millis(10)).await;
        }

        let ack = port.read(1).await?;
        if ack != [ACK] {
            debug!("No ACK after magic, got {:02X?}", ack);
            return Ok(None);
        }

        port.write(&[0x02]).await?;

        let mut response = Vec::with_capacity(12);
        while response.len() < 12 {
            let byte = port.read(1).await?;
            let Some(&b) = byte.first() else { break };
            response.push(b);
            if b == 0xDD {
                break;
            }
        }

        if response.len() != 8 && response.len() != 12 {
            warn!("Unexpected ident response: {:02X?}", response);
            return Ok(None);
        }
        debug!("Received ident: {:02X?}", response);

        port.write(&[ACK]).await?;
        if port.read(1).await? != [ACK] {
            warn!("Radio refused clone");
            return Ok(None);
        }

        Ok(Some(compact_ident(&response)))
    }

    /// Try each known magic until the radio answers
    async fn do_handshake<C: ByteChannel>(port: &mut C) -> RadioResult<Vec<u8>> {
        for magic in [UV5R_MODEL_291, UV5R_MODEL_ORIG] {
            if let Some(ident) = Self::do_ident(port, magic).await? {
                info!("Handshake successful, ident {:02X?}", ident);
                return Ok(ident);
            }
            sleep(Duration::from_secs(2)).await;
        }

        Err(RadioError::NoResponse)
    }

    /// Read one block
    ///
    /// Protocol:
    /// - Send: "S" + addr (u16 BE) + size (u8)
    /// - Receive: "X" + addr (u16 BE) + size (u8) + data, possibly preceded
    ///   by the ACK for the previous block
    /// - Send: ACK
    async fn read_block<C: ByteChannel>(port: &mut C, addr: u16, size: u8) -> RadioResult<Vec<u8>> {
        let [hi, lo] = addr.to_be_bytes();
        port.write(&[b'S', hi, lo, size]).await?;

        let mut hdr = port.read_exact(4).await?;
        if hdr[0] == ACK {
            hdr.remove(0);
            hdr.extend(port.read_exact(1).await?);
        }

        let raddr = u16::from_be_bytes([hdr[1], hdr[2]]);
        if hdr[0] != b'X' || raddr != addr || hdr[3] != size {
            return Err(RadioError::InvalidResponse(format!(
                "Unexpected header {:02X?} for block {:#06x}",
                hdr, addr
            )));
        }

        let data = port.read_exact(size as usize).await?;

        port.write(&[ACK]).await?;
        sleep(Duration::from_millis(50)).await;

        Ok(data)
    }

    /// Write one block
    ///
    /// Protocol:
    /// - Send: "X" + addr (u16 BE) + size (u8) + data
    /// - Receive: ACK
    async fn write_block<C: ByteChannel>(port: &mut C, addr: u16, data: &[u8]) -> RadioResult<()> {
        let [hi, lo] = addr.to_be_bytes();
        let mut cmd = vec![b'X', hi, lo, data.len() as u8];
        cmd.extend_from_slice(data);
        port.write(&cmd).await?;

        sleep(Duration::from_millis(50)).await;

        let ack = port.read_exact(1).await?;
        if ack[0] != ACK {
            return Err(RadioError::InvalidResponse(format!(
                "Radio refused block {:#06x}: got {:02X}",
                addr, ack[0]
            )));
        }

        Ok(())
    }
}

impl Radio for UV5RRadio {
    fn vendor(&self) -> &str {
        VENDOR
    }

    fn model(&self) -> &str {
        MODEL
    }

    fn memory_bounds(&self) -> (u32, u32) {
        (0, NUM_MEMORIES - 1)
    }

    fn get_memory(&self, number: u32) -> RadioResult<Option<Memory>> {
        let (chan, name) = self.channel(number)?;

        if chan.get_raw()?[0] == 0xFF {
            return Ok(None);
        }

        let mut mem = Memory::new(number);
        let rx = chan.get_int("rxfreq")? as u64;
        mem.freq = rx * 10;

        let txfreq = chan.field("txfreq")?;
        if txfreq.get_raw()? == TX_INHIBIT {
            mem.duplex = Duplex::Off;
        } else {
            let tx = txfreq.get_int()? as u64;
            if tx == rx {
                mem.duplex = Duplex::Simplex;
            } else if (rx * 10).abs_diff(tx * 10) > 70_000_000 {
                mem.duplex = Duplex::Split;
                mem.offset = tx * 10;
            } else {
                mem.duplex = if rx > tx { Duplex::Minus } else { Duplex::Plus };
                mem.offset = rx.abs_diff(tx) * 10;
            }
        }

        // Stock software can leave 0xFF in the middle of a name
        mem.name = name
            .field("name")?
            .into_chars()?
            .get_string_with(&name_codec())?
            .replace('\u{ff}', " ")
            .trim_end()
            .to_string();

        let tx_tone = Tone::decode(chan.get_int("txtone")?)?;
        let rx_tone = Tone::decode(chan.get_int("rxtone")?)?;
        apply_tones(&mut mem, tx_tone, rx_tone);

        mem.skip = chan.get_int("scan")? == 0;
        mem.mode = if chan.get_int("wide")? != 0 { "FM" } else { "NFM" }.to_string();

        let lowpower = chan.get_int("lowpower")? as usize;
        let level = POWER_LEVELS.get(lowpower).copied().unwrap_or_else(|| {
            warn!("Memory #{} has invalid power level {}", number, lowpower);
            POWER_LEVELS[0]
        });
        mem.power = Some(level.to_string());

        for key in EXTRA_FIELDS {
            mem.extra.insert(key.to_string(), chan.get_int(key)?);
        }

        Ok(Some(mem))
    }

    fn set_memory(&mut self, memory: &Memory) -> RadioResult<()> {
        let (chan, name) = self.channel(memory.number)?;

        if memory.empty {
            chan.fill_raw(0xFF)?;
            name.fill_raw(0xFF)?;
            return Ok(());
        }

        if let Some(key) = memory
            .extra
            .keys()
            .find(|k| !EXTRA_FIELDS.contains(&k.as_str()))
        {
            return Err(RadioError::Radio(format!("Unknown channel setting: {}", key)));
        }

        memory.validate()?;
        if !VALID_MODES.contains(&memory.mode.as_str()) {
            return Err(MemoryError::InvalidMode(memory.mode.clone()).into());
        }

        // Keep per-channel settings the record does not carry
        let mut extras = BTreeMap::new();
        if chan.get_raw()?[0] != 0xFF {
            for key in EXTRA_FIELDS {
                extras.insert(key.to_string(), chan.get_int(key)?);
            }
        }
        extras.extend(memory.extra.iter().map(|(k, v)| (k.clone(), *v)));

        let saved_chan = chan.get_raw()?;
        let saved_name = name.get_raw()?;
        let result = encode_channel(&chan, &name, memory, &extras);
        if result.is_err() {
            chan.set_raw(&saved_chan)?;
            name.set_raw(&saved_name)?;
        }
        result
    }
}

impl CloneModeRadio for UV5RRadio {
    fn get_memsize(&self) -> usize {
        MEMSIZE
    }

    async fn sync_in<C: ByteChannel>(
        &mut self,
        port: &mut C,
        status_fn: Option<StatusCallback>,
    ) -> RadioResult<MemoryMap> {
        let ident = Self::do_handshake(port).await?;

        let mut data = Vec::with_capacity(MEMSIZE + AUX_END - AUX_START);
        data.extend(ident.iter().copied().chain(std::iter::repeat(0xFF)).take(HEADER_SIZE));

        let main_end = MEMSIZE - HEADER_SIZE;
        let total = main_end + AUX_END - AUX_START;
        report(&status_fn, 0, total, "Downloading from radio");

        for addr in (0..main_end).step_by(BLOCK_SIZE) {
            data.extend(Self::read_block(port, addr as u16, BLOCK_SIZE as u8).await?);
            report(&status_fn, addr + BLOCK_SIZE, total, "Downloading from radio");
        }

        debug!("Downloading aux block");
        for addr in (AUX_START..AUX_END).step_by(BLOCK_SIZE) {
            data.extend(Self::read_block(port, addr as u16, BLOCK_SIZE as u8).await?);
            report(
                &status_fn,
                main_end + addr + BLOCK_SIZE - AUX_START,
                total,
                "Downloading from radio",
            );
        }

        info!("Downloaded {} bytes", data.len());
        let mmap = MemoryMap::new(data);
        self.process_mmap(mmap.clone())?;
        Ok(mmap)
    }

    async fn sync_out<C: ByteChannel>(
        &mut self,
        port: &mut C,
        mmap: &MemoryMap,
        status_fn: Option<StatusCallback>,
    ) -> RadioResult<()> {
        if mmap.len() < MEMSIZE {
            return Err(RadioError::Radio(format!(
                "Image too small: expected at least {} bytes, got {}",
                MEMSIZE,
                mmap.len()
            )));
        }

        Self::do_handshake(port).await?;

        for &(start, end) in UPLOAD_RANGES {
            for offset in (start..end).step_by(WRITE_BLOCK_SIZE) {
                let block = mmap.get(offset, Some(WRITE_BLOCK_SIZE))?;
                Self::write_block(port, (offset - HEADER_SIZE) as u16, &block).await?;
                report(&status_fn, offset + WRITE_BLOCK_SIZE, MEMSIZE, "Uploading to radio");
            }
        }

        if mmap.len() < MEMSIZE + AUX_END - AUX_START {
            info!("Image has no aux block, not writing it");
            return Ok(());
        }

        for &(start, end) in AUX_UPLOAD_RANGES {
            for addr in (start..end).step_by(WRITE_BLOCK_SIZE) {
                let block = mmap.get(MEMSIZE + addr - AUX_START, Some(WRITE_BLOCK_SIZE))?;
                Self::write_block(port, addr as u16, &block).await?;
            }
        }

        Ok(())
    }

    fn process_mmap(&mut self, mmap: MemoryMap) -> RadioResult<()> {
        if mmap.len() < MEMSIZE {
            return Err(RadioError::Radio(format!(
                "Image too small: expected at least {} bytes, got {}",
                MEMSIZE,
                mmap.len()
            )));
        }
        schema()?;
        self.mmap = Some(mmap);
        Ok(())
    }

    fn match_model(data: &[u8], _filename: &str) -> bool {
        match data.len() {
            0x1950 => data[0x1948..].starts_with(MODEL.as_bytes()),
            0x1948 => {
                let version = &data[FW_VERSION];
                BASETYPE_UV5R
                    .iter()
                    .any(|base| version.windows(base.len()).any(|w| w == *base))
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial::mock::MockSerialPort;
    use std::sync::{Arc, Mutex};

    const IMAGE_SIZE: usize = MEMSIZE + AUX_END - AUX_START;
    const IDENT: &[u8] = &[0xAA, 0x30, 0x76, 0x04, 0x00, 0x05, 0x20, 0xDD];

    fn blank_radio() -> UV5RRadio {
        let mut radio = UV5RRadio::new();
        radio
            .process_mmap(MemoryMap::filled(IMAGE_SIZE, 0xFF))
            .unwrap();
        radio
    }

    fn channel_offset(number: usize) -> usize {
        0x0008 + number * 16
    }

    fn raw_channel(radio: &UV5RRadio, number: usize) -> Vec<u8> {
        radio
            .mmap()
            .unwrap()
            .get(channel_offset(number), Some(16))
            .unwrap()
    }

    fn simplex(number: u32, freq: u64) -> Memory {
        let mut mem = Memory::new(number);
        mem.freq = freq;
        mem.power = Some("High".to_string());
        mem
    }

    #[derive(Clone, Copy, PartialEq)]
    enum SimState {
        Magic,
        Ident,
        Ack,
        Ready,
    }

    /// Radio side of the clone protocol over a shared 0x2000-byte memory
    struct RadioSim {
        memory: Arc<Mutex<Vec<u8>>>,
        magic: &'static [u8],
        ident: Vec<u8>,
        input: Vec<u8>,
        state: SimState,
    }

    impl RadioSim {
        fn new(memory: Arc<Mutex<Vec<u8>>>, magic: &'static [u8]) -> Self {
            Self {
                memory,
                magic,
                ident: IDENT.to_vec(),
                input: Vec::new(),
                state: SimState::Magic,
            }
        }

        fn respond(&mut self, data: &[u8]) -> Vec<u8> {
            self.input.extend_from_slice(data);
            let mut out = Vec::new();

            loop {
                match self.state {
                    SimState::Magic => {
                        if self.input.len() < self.magic.len() {
                            break;
                        }
                        let sent: Vec<u8> = self.input.drain(..self.magic.len()).collect();
                        if sent == self.magic {
                            out.push(ACK);
                            self.state = SimState::Ident;
                        }
                    }
                    SimState::Ident | SimState::Ack => {
                        if self.input.is_empty() {
                            break;
                        }
                        let byte = self.input.remove(0);
                        if self.state == SimState::Ident && byte == 0x02 {
                            out.extend_from_slice(&self.ident);
                            self.state = SimState::Ack;
                        } else if self.state == SimState::Ack && byte == ACK {
                            out.push(ACK);
                            self.state = SimState::Ready;
                        }
                    }
                    SimState::Ready => {
                        let Some(&cmd) = self.input.first() else { break };
                        match cmd {
                            ACK => {
                                self.input.remove(0);
                                out.push(ACK);
                            }
                            b'S' | b'X' if self.input.len() < 4 => break,
                            b'S' => {
                                let addr = u16::from_be_bytes([self.input[1], self.input[2]]) as usize;
                                let size = self.input[3] as usize;
                                out.extend_from_slice(&self.input[..4]);
                                let n = out.len();
                                out[n - 4] = b'X';
                                out.extend_from_slice(&self.memory.lock().unwrap()[addr..addr + size]);
                                self.input.drain(..4);
                            }
                            b'X' => {
                                let size = self.input[3] as usize;
                                if self.input.len() < 4 + size {
                                    break;
                                }
                                let addr = u16::from_be_bytes([self.input[1], self.input[2]]) as usize;
                                self.memory.lock().unwrap()[addr..addr + size]
                                    .copy_from_slice(&self.input[4..4 + size]);
                                self.input.drain(..4 + size);
                                out.push(ACK);
                            }
                            _ => {
                                self.input.remove(0);
                            }
                        }
                    }
                }
            }

            out
        }
    }

    fn sim_port(memory: Arc<Mutex<Vec<u8>>>, magic: &'static [u8]) -> MockSerialPort {
        let mut sim = RadioSim::new(memory, magic);
        MockSerialPort::with_responder(move |data| sim.respond(data))
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 + i / 256) as u8).collect()
    }

    #[test]
    fn test_schema_compiles() {
        let schema = schema().unwrap();
        assert_eq!(schema.locate("memory[0]").unwrap().offset, 0x0008);
        assert_eq!(schema.locate("memory[127].pttid").unwrap().offset, 0x0008 + 127 * 16 + 15);
        assert_eq!(schema.locate("names[1].name").unwrap().offset, 0x1018);
        assert_eq!(schema.locate("fm_presets").unwrap().offset, 0x0F56);
        assert_eq!(schema.locate("limits.uhf.upper").unwrap().offset, 0x1908 + 8);
    }

    #[test]
    fn test_dtcs_table() {
        assert_eq!(UV5R_DTCS.len(), 105);
        assert!(UV5R_DTCS.windows(2).all(|w| w[0] < w[1]));
        assert!(UV5R_DTCS.contains(&645));
    }

    #[test]
    fn test_tone_codec() {
        assert_eq!(Tone::decode(0).unwrap(), Tone::None);
        assert_eq!(Tone::decode(0xFFFF).unwrap(), Tone::None);
        assert_eq!(Tone::decode(885).unwrap(), Tone::Ctcss(88.5));
        assert_eq!(
            Tone::decode(1).unwrap(),
            Tone::Dtcs {
                code: 23,
                reversed: false
            }
        );
        assert_eq!(
            Tone::decode(0x6A).unwrap(),
            Tone::Dtcs {
                code: 23,
                reversed: true
            }
        );
        assert!(Tone::decode(0x200).is_err());

        assert_eq!(Tone::Ctcss(88.5).encode().unwrap(), 885);
        assert_eq!(
            Tone::Dtcs {
                code: 754,
                reversed: true
            }
            .encode()
            .unwrap(),
            105 + 0x69
        );
        assert!(Tone::Dtcs {
            code: 24,
            reversed: false
        }
        .encode()
        .is_err());
    }

    #[test]
    fn test_decode_raw_channel() {
        let radio = blank_radio();
        let mmap = radio.mmap().unwrap();
        mmap.set_bytes(
            channel_offset(3),
            &[
                0x00, 0x20, 0x65, 0x14, // rx 146.520
                0x00, 0x20, 0x65, 0x14, // tx 146.520
                0x00, 0x00, // rxtone off
                0x75, 0x03, // txtone 88.5
                0x00, 0x00, 0x01, 0x44, // low power, wide, scan
            ],
        )
        .unwrap();
        mmap.set_bytes(0x1008 + 3 * 16, b"CALL\xFF\xFF\xFF").unwrap();

        let mem = radio.get_memory(3).unwrap().unwrap();
        assert_eq!(mem.freq, 146_520_000);
        assert_eq!(mem.duplex, Duplex::Simplex);
        assert_eq!(mem.tmode, ToneMode::Tone);
        assert_eq!(mem.rtone, 88.5);
        assert_eq!(mem.power.as_deref(), Some("Low"));
        assert_eq!(mem.mode, "FM");
        assert!(!mem.skip);
        assert_eq!(mem.name, "CALL");
        assert_eq!(mem.extra.get("bcl"), Some(&0));
    }

    #[test]
    fn test_empty_and_bounds() {
        let mut radio = blank_radio();
        assert!(radio.get_memory(0).unwrap().is_none());
        assert!(matches!(radio.get_memory(128), Err(RadioError::InvalidMemory(128))));
        assert!(radio.get_memories().unwrap().is_empty());

        radio.set_memory(&simplex(0, 146_520_000)).unwrap();
        assert_eq!(radio.get_memories().unwrap().len(), 1);

        radio.delete_memory(0).unwrap();
        assert_eq!(raw_channel(&radio, 0), vec![0xFF; 16]);
        assert!(radio.get_memory(0).unwrap().is_none());

        assert!(matches!(
            UV5RRadio::new().get_memory(0),
            Err(RadioError::NoImage)
        ));
    }

    #[test]
    fn test_set_memory_layout() {
        let mut radio = blank_radio();
        let mut mem = simplex(5, 146_520_000);
        mem.name = "REPEATER9".to_string();
        radio.set_memory(&mem).unwrap();

        assert_eq!(
            raw_channel(&radio, 5),
            vec![0x00, 0x20, 0x65, 0x14, 0x00, 0x20, 0x65, 0x14, 0, 0, 0, 0, 0, 0, 0x00, 0x44]
        );
        let name = radio.mmap().unwrap().get(0x1008 + 5 * 16, Some(16)).unwrap();
        assert_eq!(&name[..7], b"REPEATE");
        assert_eq!(&name[7..], &[0xFF; 9]);

        let back = radio.get_memory(5).unwrap().unwrap();
        assert_eq!(back.name, "REPEATE");
        assert_eq!(back.freq, mem.freq);
    }

    #[test]
    fn test_duplex_modes() {
        let mut radio = blank_radio();

        let mut mem = simplex(1, 146_940_000);
        mem.duplex = Duplex::Minus;
        mem.offset = 600_000;
        radio.set_memory(&mem).unwrap();
        let back = radio.get_memory(1).unwrap().unwrap();
        assert_eq!((back.duplex, back.offset), (Duplex::Minus, 600_000));

        mem.duplex = Duplex::Plus;
        mem.offset = 5_000_000;
        radio.set_memory(&mem).unwrap();
        let back = radio.get_memory(1).unwrap().unwrap();
        assert_eq!((back.duplex, back.offset), (Duplex::Plus, 5_000_000));

        mem.duplex = Duplex::Split;
        mem.offset = 446_000_000;
        radio.set_memory(&mem).unwrap();
        let back = radio.get_memory(1).unwrap().unwrap();
        assert_eq!((back.duplex, back.offset), (Duplex::Split, 446_000_000));

        mem.duplex = Duplex::Off;
        radio.set_memory(&mem).unwrap();
        assert_eq!(&raw_channel(&radio, 1)[4..8], &TX_INHIBIT);
        let back = radio.get_memory(1).unwrap().unwrap();
        assert_eq!((back.duplex, back.offset), (Duplex::Off, 0));
    }

    #[test]
    fn test_tone_modes_round_trip() {
        let mut radio = blank_radio();

        let mut mem = simplex(2, 446_000_000);
        mem.tmode = ToneMode::Tsql;
        mem.ctone = 100.0;
        radio.set_memory(&mem).unwrap();
        let back = radio.get_memory(2).unwrap().unwrap();
        assert_eq!(back.tmode, ToneMode::Tsql);
        assert_eq!(back.ctone, 100.0);

        mem.tmode = ToneMode::Dtcs;
        mem.dtcs = 23;
        mem.dtcs_polarity = "RN".to_string();
        radio.set_memory(&mem).unwrap();
        assert_eq!(&raw_channel(&radio, 2)[8..12], &[0x01, 0x00, 0x6A, 0x00]);
        let back = radio.get_memory(2).unwrap().unwrap();
        assert_eq!(back.tmode, ToneMode::Dtcs);
        assert_eq!(back.dtcs, 23);
        assert_eq!(back.dtcs_polarity, "RN");

        mem.tmode = ToneMode::Cross;
        mem.cross_mode = "Tone->DTCS".to_string();
        mem.rtone = 88.5;
        mem.rx_dtcs = 645;
        mem.dtcs_polarity = "NN".to_string();
        radio.set_memory(&mem).unwrap();
        let back = radio.get_memory(2).unwrap().unwrap();
        assert_eq!(back.tmode, ToneMode::Cross);
        assert_eq!(back.cross_mode, "Tone->DTCS");
        assert_eq!(back.rx_dtcs, 645);
    }

    #[test]
    fn test_extras_are_preserved() {
        let mut radio = blank_radio();
        let mut mem = simplex(7, 145_500_000);
        mem.extra.insert("bcl".to_string(), 1);
        mem.extra.insert("pttid".to_string(), 3);
        radio.set_memory(&mem).unwrap();

        let plain = simplex(7, 145_600_000);
        radio.set_memory(&plain).unwrap();
        let back = radio.get_memory(7).unwrap().unwrap();
        assert_eq!(back.freq, 145_600_000);
        assert_eq!(back.extra.get("bcl"), Some(&1));
        assert_eq!(back.extra.get("pttid"), Some(&3));

        let mut unknown = plain.clone();
        unknown.extra.insert("rxfreq".to_string(), 0);
        assert!(matches!(radio.set_memory(&unknown), Err(RadioError::Radio(_))));
    }

    #[test]
    fn test_rejected_memory_leaves_channel_untouched() {
        let mut radio = blank_radio();
        radio.set_memory(&simplex(9, 146_520_000)).unwrap();
        let before = raw_channel(&radio, 9);

        let mut bad = simplex(9, 147_000_000);
        bad.extra.insert("pttid".to_string(), 4);
        let err = radio.set_memory(&bad).unwrap_err();
        assert!(matches!(
            err,
            RadioError::Bitwise(BitwiseError::ValueOutOfRange { value: 4, .. })
        ));
        assert_eq!(raw_channel(&radio, 9), before);

        let mut bad = simplex(9, 147_000_000);
        bad.power = Some("Turbo".to_string());
        assert!(radio.set_memory(&bad).is_err());
        assert_eq!(raw_channel(&radio, 9), before);
    }

    #[test]
    fn test_invalid_memory_is_rejected() {
        let mut radio = blank_radio();
        radio.set_memory(&simplex(12, 146_520_000)).unwrap();
        let before = raw_channel(&radio, 12);

        let mut am = simplex(12, 147_000_000);
        am.mode = "AM".to_string();
        assert!(matches!(
            radio.set_memory(&am),
            Err(RadioError::Memory(MemoryError::InvalidMode(ref m))) if m == "AM"
        ));
        assert_eq!(raw_channel(&radio, 12), before);

        let mut tone = simplex(12, 147_000_000);
        tone.tmode = ToneMode::Tone;
        tone.rtone = 12.3;
        assert!(matches!(
            radio.set_memory(&tone),
            Err(RadioError::Memory(MemoryError::InvalidTone(t))) if t == 12.3
        ));
        assert_eq!(raw_channel(&radio, 12), before);

        let mut nfm = simplex(12, 147_000_000);
        nfm.mode = "NFM".to_string();
        radio.set_memory(&nfm).unwrap();
        assert_eq!(radio.get_memory(12).unwrap().unwrap().mode, "NFM");
    }

    #[test]
    fn test_settings_access() {
        let mut radio = blank_radio();
        let mmap = radio.mmap().unwrap();
        mmap.set_bytes(0x1908, &[0x01, 0x01, 0x36, 0x01, 0x74]).unwrap();
        mmap.set_bytes(0x1828, b"HELLO\xFF\xFFWORLD\xFF\xFF").unwrap();

        assert_eq!(radio.get_setting("limits.vhf.enable").unwrap(), 1);
        assert_eq!(radio.get_setting("limits.vhf.lower").unwrap(), 136);
        assert_eq!(radio.get_setting("limits.vhf.upper").unwrap(), 174);
        assert_eq!(
            radio.power_on_message().unwrap(),
            ("HELLO".to_string(), "WORLD".to_string())
        );

        radio.set_setting("settings.squelch", 5).unwrap();
        assert_eq!(radio.mmap().unwrap().get_byte(0x0E28).unwrap(), 5);
        radio.set_setting("wmchannel.mrcha", 127).unwrap();
        assert_eq!(radio.get_setting("wmchannel.mrcha").unwrap(), 127);
        assert!(matches!(
            radio.set_setting("wmchannel.mrchb", 128),
            Err(RadioError::Bitwise(BitwiseError::ValueOutOfRange { .. }))
        ));
    }

    #[test]
    fn test_aux_fields_need_aux_block() {
        let mut radio = UV5RRadio::new();
        radio.process_mmap(MemoryMap::filled(MEMSIZE, 0xFF)).unwrap();

        assert!(radio.get_setting("settings.squelch").is_ok());
        assert!(matches!(
            radio.get_setting("limits.vhf.lower"),
            Err(RadioError::Bitwise(BitwiseError::Range { .. }))
        ));
        assert!(radio.process_mmap(MemoryMap::filled(0x100, 0xFF)).is_err());
    }

    #[test]
    fn test_match_model() {
        let mut data = vec![0xFFu8; 0x1948];
        data[0x1838..0x1840].copy_from_slice(b"UV82X3\0\0");
        assert!(!UV5RRadio::match_model(&data, "radio.img"));
        data[0x1838..0x183E].copy_from_slice(b"BFB297");
        assert!(UV5RRadio::match_model(&data, "radio.img"));

        let mut tagged = vec![0u8; 0x1950];
        tagged[0x1948..].copy_from_slice(b"UV-5R   ");
        assert!(UV5RRadio::match_model(&tagged, "radio.img"));

        assert!(!UV5RRadio::match_model(&vec![0u8; 0x1808], "radio.img"));
    }

    #[test]
    fn test_firmware_version() {
        let radio = blank_radio();
        radio
            .mmap()
            .unwrap()
            .set_bytes(0x1838, b"BFB297 ")
            .unwrap();
        assert_eq!(radio.firmware_version().unwrap(), "BFB297 ");
    }

    #[test]
    fn test_compact_ident() {
        let long = [0xAA, 0x01, 0x01, 0x36, 0x01, 0x74, 0x01, 0x04, 0x00, 0x05, 0x20, 0xDD];
        assert_eq!(
            compact_ident(&long),
            vec![0xAA, 0x36, 0x74, 0x04, 0x00, 0x05, 0x20, 0xDD]
        );
        assert_eq!(compact_ident(IDENT), IDENT.to_vec());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_in() {
        let memory = Arc::new(Mutex::new(pattern(0x2000)));
        let mut port = sim_port(memory.clone(), UV5R_MODEL_291);
        let progress = Arc::new(Mutex::new(Vec::new()));
        let sink = progress.clone();

        let mut radio = UV5RRadio::new();
        let mmap = radio
            .sync_in(
                &mut port,
                Some(Box::new(move |s: &Status| sink.lock().unwrap().push(s.current))),
            )
            .await
            .unwrap();

        let image = mmap.get_packed();
        let radio_mem = memory.lock().unwrap();
        assert_eq!(image.len(), IMAGE_SIZE);
        assert_eq!(&image[..8], IDENT);
        assert_eq!(&image[8..MEMSIZE], &radio_mem[..0x1800]);
        assert_eq!(&image[MEMSIZE..], &radio_mem[AUX_START..AUX_END]);
        assert!(radio.mmap().is_some());

        let progress = progress.lock().unwrap();
        assert_eq!(progress.first(), Some(&0));
        assert_eq!(progress.last(), Some(&(IMAGE_SIZE - HEADER_SIZE)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_handshake_falls_back_to_second_magic() {
        let memory = Arc::new(Mutex::new(vec![0u8; 0x2000]));
        let mut port = sim_port(memory, UV5R_MODEL_ORIG);

        let start = tokio::time::Instant::now();
        let ident = UV5RRadio::do_handshake(&mut port).await.unwrap();
        assert_eq!(ident, IDENT);
        assert!(start.elapsed() >= Duration::from_secs(2));
        assert!(port.was_written(UV5R_MODEL_291));
        assert!(port.was_written(UV5R_MODEL_ORIG));
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_radio() {
        let mut port = MockSerialPort::new();
        let mut radio = UV5RRadio::new();
        assert!(matches!(
            radio.sync_in(&mut port, None).await,
            Err(RadioError::NoResponse)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_block_rejects_bad_header() {
        let mut port = MockSerialPort::new();
        port.push_read_data(&[b'X', 0x00, 0x40, 0x40]);
        assert!(matches!(
            UV5RRadio::read_block(&mut port, 0x0000, 0x40).await,
            Err(RadioError::InvalidResponse(_))
        ));
        assert!(port.was_written(&[b'S', 0x00, 0x00, 0x40]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_out() {
        let memory = Arc::new(Mutex::new(vec![0u8; 0x2000]));
        let mut port = sim_port(memory.clone(), UV5R_MODEL_291);
        let image = pattern(IMAGE_SIZE);
        let mmap = MemoryMap::new(image.clone());

        let mut radio = UV5RRadio::new();
        radio.sync_out(&mut port, &mmap, None).await.unwrap();

        let radio_mem = memory.lock().unwrap();
        assert_eq!(&radio_mem[..0x0CF0], &image[8..0x0CF8]);
        assert_eq!(&radio_mem[0x0CF0..0x0D00], &[0u8; 0x10]);
        assert_eq!(&radio_mem[0x0D00..0x0DF0], &image[0x0D08..0x0DF8]);
        assert_eq!(&radio_mem[0x0DF0..0x0E00], &[0u8; 0x10]);
        assert_eq!(&radio_mem[0x0E00..0x1800], &image[0x0E08..MEMSIZE]);
        assert_eq!(&radio_mem[0x1EC0..0x1EF0], &image[MEMSIZE..MEMSIZE + 0x30]);
        assert_eq!(&radio_mem[0x1EF0..0x2000], &[0u8; 0x110]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_out_without_aux_block() {
        let memory = Arc::new(Mutex::new(vec![0u8; 0x2000]));
        let mut port = sim_port(memory.clone(), UV5R_MODEL_291);
        let mmap = MemoryMap::filled(MEMSIZE, 0x11);

        UV5RRadio::new().sync_out(&mut port, &mmap, None).await.unwrap();

        let radio_mem = memory.lock().unwrap();
        assert_eq!(radio_mem[0x0000], 0x11);
        assert_eq!(&radio_mem[0x1EC0..0x1EF0], &[0u8; 0x30]);
    }
}
