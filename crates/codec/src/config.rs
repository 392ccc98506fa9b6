use crate::reader::BinReader;

/// An 8-tuple of device-configuration axes identifying which variant of a
/// resource applies. Two keys are equal iff all eight fields compare equal;
/// the default key (selected when no configuration is requested) is all
/// zeros.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConfigKey {
    pub imsi: u32,
    pub locale: u32,
    pub screen_type: u32,
    pub input: u32,
    pub screen_size: u32,
    pub version: u32,
    pub screen_config: u32,
    pub screen_size_dp: u32,
}

impl ConfigKey {
    pub const DEFAULT: ConfigKey = ConfigKey {
        imsi: 0,
        locale: 0,
        screen_type: 0,
        input: 0,
        screen_size: 0,
        version: 0,
        screen_config: 0,
        screen_size_dp: 0,
    };

    /// Parses a ConfigKey starting at `off`. The on-disk structure leads
    /// with a `size: u32` field that has grown over Android versions; later
    /// fields are read only if `size` covers their offset, and any bytes
    /// beyond the eight fields this decoder understands are skipped. The
    /// number of bytes consumed (i.e. `size`) is returned alongside the key
    /// so the caller can advance past the whole structure, not just the
    /// fields decoded here.
    pub fn parse(r: &BinReader, off: usize) -> (ConfigKey, u32) {
        let size = r.u32_le(off);
        let mut key = ConfigKey::DEFAULT;

        let field = |rel: usize| off + rel;
        if size >= 8 {
            key.imsi = r.u32_le(field(4));
        }
        if size >= 12 {
            key.locale = r.u32_le(field(8));
        }
        if size >= 16 {
            key.screen_type = r.u32_le(field(12));
        }
        if size >= 20 {
            key.input = r.u32_le(field(16));
        }
        if size >= 24 {
            key.screen_size = r.u32_le(field(20));
        }
        if size >= 28 {
            key.version = r.u32_le(field(24));
        }
        if size >= 32 {
            key.screen_config = r.u32_le(field(28));
        }
        if size >= 36 {
            key.screen_size_dp = r.u32_le(field(32));
        }

        (key, size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_all_zero() {
        assert_eq!(ConfigKey::DEFAULT, ConfigKey::default());
    }

    #[test]
    fn parses_legacy_short_config() {
        // size=8: only imsi present, matches an old-Android-version table.
        let mut buf = Vec::new();
        buf.extend_from_slice(&8u32.to_le_bytes());
        buf.extend_from_slice(&0x1234u32.to_le_bytes());
        let r = BinReader::new(&buf);
        let (key, size) = ConfigKey::parse(&r, 0);
        assert_eq!(size, 8);
        assert_eq!(key.imsi, 0x1234);
        assert_eq!(key.locale, 0);
    }

    #[test]
    fn parses_newer_config_with_trailing_unknown_bytes() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&40u32.to_le_bytes()); // bigger than we model
        for i in 1..=9u32 {
            buf.extend_from_slice(&i.to_le_bytes());
        }
        let r = BinReader::new(&buf);
        let (key, size) = ConfigKey::parse(&r, 0);
        assert_eq!(size, 40);
        assert_eq!(key.screen_size_dp, 8);
    }
}
