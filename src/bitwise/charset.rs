// Character encodings for `char` arrays
//
// Radios store names either as plain single-byte characters or as indices
// into a model-specific glyph table. Unused trailing positions are filled
// with a pad byte that differs between models (0x00, 0x20 and 0xFF are all
// common).

/// How bytes of a `char` array map to characters
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Charset {
    /// Byte value is the code point (ISO-8859-1)
    Latin1,
    /// Byte value is an index into the table
    Table(Vec<char>),
}

impl Charset {
    pub fn table(glyphs: &str) -> Self {
        Charset::Table(glyphs.chars().collect())
    }
}

/// Text codec for fixed-length character arrays
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringCodec {
    pub charset: Charset,
    /// Byte written after the text, and trimmed from the end when reading
    pub pad: u8,
    /// Substituted for bytes with no mapping when decoding
    pub fallback: char,
}

impl Default for StringCodec {
    fn default() -> Self {
        Self {
            charset: Charset::Latin1,
            pad: 0x00,
            fallback: ' ',
        }
    }
}

impl StringCodec {
    pub fn latin1(pad: u8) -> Self {
        Self {
            pad,
            ..Self::default()
        }
    }

    pub fn with_table(glyphs: &str, pad: u8) -> Self {
        Self {
            charset: Charset::table(glyphs),
            pad,
            ..Self::default()
        }
    }

    pub fn decode_byte(&self, byte: u8) -> char {
        match &self.charset {
            Charset::Latin1 => byte as char,
            Charset::Table(glyphs) => glyphs.get(byte as usize).copied().unwrap_or(self.fallback),
        }
    }

    pub fn encode_char(&self, ch: char) -> Option<u8> {
        match &self.charset {
            Charset::Latin1 => u8::try_from(ch as u32).ok(),
            Charset::Table(glyphs) => glyphs
                .iter()
                .position(|&g| g == ch)
                .and_then(|i| u8::try_from(i).ok()),
        }
    }

    /// Decode bytes, dropping trailing pad bytes
    pub fn decode(&self, bytes: &[u8]) -> String {
        let end = bytes
            .iter()
            .rposition(|&b| b != self.pad)
            .map_or(0, |i| i + 1);
        bytes[..end].iter().map(|&b| self.decode_byte(b)).collect()
    }

    /// Encode exactly `len` bytes: longer text is cut, shorter text is padded.
    /// Returns the first character without a mapping as the error.
    pub fn encode(&self, text: &str, len: usize) -> std::result::Result<Vec<u8>, char> {
        let mut out = Vec::with_capacity(len);
        for ch in text.chars().take(len) {
            out.push(self.encode_char(ch).ok_or(ch)?);
        }
        out.resize(len, self.pad);
        Ok(out)
    }
}
