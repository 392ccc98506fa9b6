/// Low-level accessor over a contiguous byte buffer.
///
/// Every read is addressed by an absolute offset rather than a cursor, since
/// string-pool entries, the package name field, and XML attribute blocks are
/// all accessed by offset rather than read sequentially. Out-of-range reads
/// return zero (or empty, for strings) instead of failing: the format is
/// full of optional/sentinel offsets, and chunk_size bounds catch real
/// structural corruption elsewhere.
pub struct BinReader<'a> {
    buf: &'a [u8],
}

impl<'a> BinReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        BinReader { buf }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn u8(&self, off: usize) -> u8 {
        self.buf.get(off).copied().unwrap_or(0)
    }

    pub fn u16_le(&self, off: usize) -> u16 {
        match self.buf.get(off..off + 2) {
            Some(bytes) => u16::from_le_bytes([bytes[0], bytes[1]]),
            None => 0,
        }
    }

    pub fn u32_le(&self, off: usize) -> u32 {
        match self.buf.get(off..off + 4) {
            Some(bytes) => u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            None => 0,
        }
    }

    /// Reads `len` bytes at `off` as UTF-8, lossily replacing invalid
    /// sequences. Returns empty string if out of range.
    pub fn str_utf8(&self, off: usize, len: usize) -> String {
        match self.buf.get(off..off + len) {
            Some(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            None => String::new(),
        }
    }

    /// Reads `byte_len` bytes at `off` as UTF-16LE code units, lossily
    /// replacing unpaired surrogates. Returns empty string if out of range.
    pub fn str_utf16le(&self, off: usize, byte_len: usize) -> String {
        let Some(bytes) = self.buf.get(off..off + byte_len) else {
            return String::new();
        };
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .take_while(|&unit| unit != 0)
            .collect();
        char::decode_utf16(units)
            .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect()
    }

    pub fn slice(&self, off: usize, len: usize) -> &'a [u8] {
        self.buf.get(off..off + len).unwrap_or(&[])
    }

    pub fn as_slice(&self) -> &'a [u8] {
        self.buf
    }
}

/// Decodes a null-terminated UTF-16LE string inside a fixed-size byte
/// region, as used for the package name field in `resources.arsc`.
pub fn fixed_utf16le(buf: &[u8]) -> String {
    let units: Vec<u16> = buf
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .take_while(|&unit| unit != 0)
        .collect();
    char::decode_utf16(units)
        .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}
