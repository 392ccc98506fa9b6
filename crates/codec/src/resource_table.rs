use std::collections::BTreeMap;

use bitflags::bitflags;
use log::{debug, warn};

use crate::chunk::{ChunkHeader, ChunkType};
use crate::config::ConfigKey;
use crate::errors::{CodecError, CodecResult};
use crate::reader::{fixed_utf16le, BinReader};
use crate::string_pool::StringPool;
use crate::typed_value::TypedValue;

const NO_ENTRY: u32 = 0xFFFF_FFFF;
const PACKAGE_NAME_LEN: usize = 256;

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct EntryFlags: u16 {
        const COMPLEX = 0x0001;
        const PUBLIC  = 0x0002;
    }
}

/// One decoded entry: a resolved key name and its typed value. Complex
/// (aggregate) entries are not expanded; they come back as an opaque
/// stand-in, per scope.
#[derive(Clone, Debug, PartialEq)]
pub struct Entry {
    pub flags: EntryFlags,
    pub key: String,
    pub value: TypedValue,
}

impl Entry {
    pub fn is_complex(&self) -> bool {
        self.flags.contains(EntryFlags::COMPLEX)
    }

    pub fn is_public(&self) -> bool {
        self.flags.contains(EntryFlags::PUBLIC)
    }
}

/// A type-spec together with the type chunk(s) folded into it. Multiple
/// `TypeChunk`s for the same type id accumulate into one `entries` vector,
/// each slot a map keyed by `ConfigKey` so every configuration variant for
/// that entry index is retained.
#[derive(Clone, Debug, Default)]
pub struct TypeSpec {
    pub type_id: u8,
    pub config_flags: Vec<u32>,
    pub entries: Vec<BTreeMap<ConfigKey, Entry>>,
}

impl TypeSpec {
    fn ensure_slots(&mut self, count: usize) {
        if self.entries.len() < count {
            self.entries.resize_with(count, BTreeMap::new);
        }
    }
}

/// One resource package: its own type-name and key-name pools and the
/// ordered type specs parsed from it.
#[derive(Clone, Debug, Default)]
pub struct Package {
    pub id: u8,
    pub name: String,
    pub type_strings: StringPool,
    pub key_strings: StringPool,
    /// Keyed by the 1-based type id, matching how resource ids address them.
    pub type_specs: BTreeMap<u8, TypeSpec>,
}

/// The fully decoded `resources.arsc`: the global string pool and every
/// package, keyed by package id. Immutable once built, safe to share across
/// threads.
#[derive(Clone, Debug, Default)]
pub struct ResourceTable {
    pub global_strings: StringPool,
    pub packages: BTreeMap<u8, Package>,
}

impl ResourceTable {
    pub fn parse(buf: &[u8]) -> CodecResult<ResourceTable> {
        if buf.len() < ChunkHeader::SIZE + 4 {
            return Err(CodecError::TooSmall {
                need: ChunkHeader::SIZE + 4,
                have: buf.len(),
            });
        }

        let mut input: &[u8] = buf;
        let header =
            ChunkHeader::parse(&mut input).map_err(|e| CodecError::ResourceTable(e.to_string()))?;
        if header.chunk_type != ChunkType::Table {
            return Err(CodecError::UnexpectedChunk {
                expected: ChunkType::Table,
                found: header.chunk_type,
            });
        }

        let r = BinReader::new(buf);
        let package_count = r.u32_le(8) as usize;

        let mut cursor = header.header_size as usize;
        if cursor == 0 {
            cursor = 12;
        }

        let pool_header = ChunkHeader::parse(&mut &buf[cursor..])
            .map_err(|e| CodecError::StringPool(e.to_string()))?;
        check_chunk_bounds(buf.len(), cursor, pool_header.chunk_size)?;
        let global_strings = StringPool::parse(&buf[cursor..cursor + pool_header.chunk_size as usize]);
        cursor += pool_header.chunk_size as usize;

        let mut packages = BTreeMap::new();
        for _ in 0..package_count {
            if cursor + ChunkHeader::SIZE > buf.len() {
                warn!("resource table ended before declared package_count was reached");
                break;
            }
            let pkg_header = ChunkHeader::parse(&mut &buf[cursor..])
                .map_err(|e| CodecError::ResourceTable(e.to_string()))?;
            if pkg_header.chunk_type != ChunkType::TablePackage {
                return Err(CodecError::UnexpectedChunk {
                    expected: ChunkType::TablePackage,
                    found: pkg_header.chunk_type,
                });
            }
            check_chunk_bounds(buf.len(), cursor, pkg_header.chunk_size)?;
            let package = parse_package(buf, cursor, pkg_header)?;
            packages.insert(package.id, package);
            cursor += pkg_header.chunk_size as usize;
        }

        Ok(ResourceTable {
            global_strings,
            packages,
        })
    }

    /// Splits a resource id into `(package, 1-based type index, entry
    /// index)`.
    pub fn split_id(res_id: u32) -> (u8, u8, u16) {
        (
            (res_id >> 24) as u8,
            (res_id >> 16) as u8,
            (res_id & 0xFFFF) as u16,
        )
    }

    fn type_name<'a>(&'a self, package: &'a Package, type_id: u8) -> Option<&'a str> {
        package.type_strings.get((type_id as u32).checked_sub(1)?)
    }

    fn lookup_entry(&self, res_id: u32) -> Option<(&Package, &TypeSpec, &Entry)> {
        let (pkg_id, type_id, idx) = Self::split_id(res_id);
        let package = self.packages.get(&pkg_id)?;
        let spec = package.type_specs.get(&type_id)?;
        let slot = spec.entries.get(idx as usize)?;
        let entry = slot.values().next()?;
        Some((package, spec, entry))
    }

    /// Returns `"@{type}/{key}"` (xml_form) or `"R.{type}.{key}"` for the
    /// first variant found at `res_id`, or `None` if the package, type, or
    /// entry slot is unknown.
    pub fn key_for(&self, res_id: u32, xml_form: bool) -> Option<String> {
        let (package, spec, entry) = self.lookup_entry(res_id)?;
        let type_name = self.type_name(package, spec.type_id)?;
        Some(if xml_form {
            format!("@{type_name}/{}", entry.key)
        } else {
            format!("R.{type_name}.{}", entry.key)
        })
    }

    /// Returns the entry for the default configuration, or `None`.
    pub fn default_value(&self, res_id: u32) -> Option<&Entry> {
        let (pkg_id, type_id, idx) = Self::split_id(res_id);
        let package = self.packages.get(&pkg_id)?;
        let spec = package.type_specs.get(&type_id)?;
        let slot = spec.entries.get(idx as usize)?;
        slot.get(&ConfigKey::DEFAULT)
    }

    /// Returns every configuration variant recorded for `res_id`.
    pub fn all_values(&self, res_id: u32) -> Option<&BTreeMap<ConfigKey, Entry>> {
        let (pkg_id, type_id, idx) = Self::split_id(res_id);
        let package = self.packages.get(&pkg_id)?;
        let spec = package.type_specs.get(&type_id)?;
        spec.entries.get(idx as usize)
    }

    /// All key names, grouped by package id.
    pub fn all_keys(&self) -> BTreeMap<u8, Vec<String>> {
        self.packages
            .iter()
            .map(|(&id, pkg)| (id, pkg.key_strings.iter().map(str::to_string).collect()))
            .collect()
    }

    /// Every interned string in the global string pool.
    pub fn all_strings(&self) -> Vec<String> {
        self.global_strings.iter().map(str::to_string).collect()
    }

    /// All type names, grouped by package id.
    pub fn all_types(&self) -> BTreeMap<u8, Vec<String>> {
        self.packages
            .iter()
            .map(|(&id, pkg)| (id, pkg.type_strings.iter().map(str::to_string).collect()))
            .collect()
    }
}

fn check_chunk_bounds(len: usize, cursor: usize, chunk_size: u32) -> CodecResult<()> {
    if cursor.saturating_add(chunk_size as usize) > len {
        return Err(CodecError::ChunkOverrun { chunk_size, len });
    }
    Ok(())
}

fn parse_package(buf: &[u8], off: usize, header: ChunkHeader) -> CodecResult<Package> {
    let r = BinReader::new(buf);
    let id = r.u32_le(off + 8) as u8;
    let name = fixed_utf16le(r.slice(off + 12, PACKAGE_NAME_LEN));
    let type_strings_off = r.u32_le(off + 12 + PACKAGE_NAME_LEN) as usize;
    let key_strings_off = r.u32_le(off + 12 + PACKAGE_NAME_LEN + 8) as usize;

    let type_strings = parse_sub_pool(buf, off + type_strings_off)?;
    let key_strings = parse_sub_pool(buf, off + key_strings_off)?;

    let package_end = off + header.chunk_size as usize;
    let mut cursor = off + header.header_size as usize;
    let mut type_specs: BTreeMap<u8, TypeSpec> = BTreeMap::new();

    while cursor + ChunkHeader::SIZE <= package_end {
        let chunk_header = ChunkHeader::parse(&mut &buf[cursor..])
            .map_err(|e| CodecError::ResourceTable(e.to_string()))?;
        if chunk_header.chunk_size == 0 {
            warn!("zero-size chunk inside package at offset {cursor}, stopping scan");
            break;
        }
        check_chunk_bounds(buf.len(), cursor, chunk_header.chunk_size)?;

        match chunk_header.chunk_type {
            ChunkType::TableTypeSpec => {
                let (type_id, spec) = parse_type_spec(&r, cursor, chunk_header);
                type_specs.entry(type_id).or_insert(spec);
            }
            ChunkType::TableType => {
                let (type_id, entry_count, type_entries) =
                    parse_type(&r, cursor, chunk_header, &key_strings);
                let spec = type_specs.entry(type_id).or_insert_with(|| TypeSpec {
                    type_id,
                    config_flags: Vec::new(),
                    entries: Vec::new(),
                });
                spec.ensure_slots(entry_count);
                for (idx, config, entry) in type_entries {
                    spec.entries[idx].insert(config, entry);
                }
            }
            other => {
                debug!("skipping chunk type {other:?} inside package at offset {cursor}");
            }
        }

        cursor += chunk_header.chunk_size as usize;
    }

    Ok(Package {
        id,
        name,
        type_strings,
        key_strings,
        type_specs,
    })
}

fn parse_sub_pool(buf: &[u8], off: usize) -> CodecResult<StringPool> {
    if off >= buf.len() {
        return Err(CodecError::StringPool(format!(
            "string pool offset {off} out of range (buffer len {})",
            buf.len()
        )));
    }
    let header = ChunkHeader::parse(&mut &buf[off..]).map_err(|e| CodecError::StringPool(e.to_string()))?;
    check_chunk_bounds(buf.len(), off, header.chunk_size)?;
    Ok(StringPool::parse(&buf[off..off + header.chunk_size as usize]))
}

fn parse_type_spec(r: &BinReader, off: usize, header: ChunkHeader) -> (u8, TypeSpec) {
    let type_id = r.u8(off + 8);
    let entry_count = r.u32_le(off + 12) as usize;
    let mut config_flags = Vec::with_capacity(entry_count);
    for i in 0..entry_count {
        config_flags.push(r.u32_le(off + 16 + i * 4));
    }
    let _ = header;
    (
        type_id,
        TypeSpec {
            type_id,
            config_flags,
            entries: Vec::new(),
        },
    )
}

fn parse_type(
    r: &BinReader,
    off: usize,
    header: ChunkHeader,
    key_strings: &StringPool,
) -> (u8, usize, Vec<(usize, ConfigKey, Entry)>) {
    let type_id = r.u8(off + 8);
    let entry_count = r.u32_le(off + 12) as usize;
    let entries_start = r.u32_le(off + 16) as usize;
    let (config, config_size) = ConfigKey::parse(r, off + 20);

    let offsets_start = off + 20 + config_size as usize;
    let entries_base = off + entries_start;
    let chunk_end = off + header.chunk_size as usize;

    let mut out = Vec::new();
    for idx in 0..entry_count {
        let entry_off_field = r.u32_le(offsets_start + idx * 4);
        if entry_off_field == NO_ENTRY {
            continue;
        }
        let entry_off = entries_base + entry_off_field as usize;
        if entry_off + 8 > chunk_end {
            warn!(
                "entry offset {entry_off} for slot {idx} in type {type_id} falls outside its chunk, skipping"
            );
            continue;
        }
        let entry = parse_entry(r, entry_off, key_strings);
        out.push((idx, config, entry));
    }

    (type_id, entry_count, out)
}

fn parse_entry(r: &BinReader, off: usize, key_strings: &StringPool) -> Entry {
    let flags = EntryFlags::from_bits_truncate(r.u16_le(off + 2));
    let key_index = r.u32_le(off + 4);
    let key = key_strings.get(key_index).unwrap_or_default().to_string();

    if flags.contains(EntryFlags::COMPLEX) {
        debug!("complex entry (key={key}) is an aggregate resource and is not decoded");
        return Entry {
            flags,
            key,
            value: TypedValue::Opaque(0, 0),
        };
    }

    let data_type = r.u8(off + 11);
    let data = r.u32_le(off + 12);
    Entry {
        flags,
        key,
        value: TypedValue::from_raw(data_type, data),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_resource_id() {
        let (pkg, ty, idx) = ResourceTable::split_id(0x7F09_0001);
        assert_eq!(pkg, 0x7F);
        assert_eq!(ty, 0x09);
        assert_eq!(idx, 0x0001);
    }

    fn chunk_header(buf: &mut Vec<u8>, chunk_type: u16, header_size: u16, chunk_size: u32) {
        buf.extend_from_slice(&chunk_type.to_le_bytes());
        buf.extend_from_slice(&header_size.to_le_bytes());
        buf.extend_from_slice(&chunk_size.to_le_bytes());
    }

    fn utf8_pool(strings: &[&str]) -> Vec<u8> {
        let header_size = 28u16;
        let string_count = strings.len() as u32;
        let mut payload = Vec::new();
        let mut offsets = Vec::new();
        for s in strings {
            offsets.push(payload.len() as u32);
            let bytes = s.as_bytes();
            payload.push(bytes.len() as u8);
            payload.push(bytes.len() as u8);
            payload.extend_from_slice(bytes);
            payload.push(0);
        }
        let strings_start = header_size as u32 + string_count * 4;
        let chunk_size = strings_start + payload.len() as u32;

        let mut buf = Vec::new();
        chunk_header(&mut buf, 0x0001, header_size, chunk_size);
        buf.extend_from_slice(&string_count.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(&0x100u32.to_le_bytes()); // UTF8 flag
        buf.extend_from_slice(&strings_start.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes());
        for off in &offsets {
            buf.extend_from_slice(&off.to_le_bytes());
        }
        buf.extend_from_slice(&payload);
        buf
    }

    /// One package (id 0x7F), one type ("string", id 1) with one simple
    /// entry ("app_name" = 42 decimal) at the default configuration.
    fn build_sample_table() -> Vec<u8> {
        let type_pool = utf8_pool(&["string"]);
        let key_pool = utf8_pool(&["app_name"]);

        let type_strings_off = 288u32;
        let key_strings_off = type_strings_off + type_pool.len() as u32;

        let mut package = Vec::new();
        chunk_header(&mut package, 0x0200, 288, 0); // chunk_size patched below
        package.extend_from_slice(&0x7Fu32.to_le_bytes()); // id
        package.extend_from_slice(&[0u8; 256]); // name (unused by these tests)
        package.extend_from_slice(&type_strings_off.to_le_bytes());
        package.extend_from_slice(&0u32.to_le_bytes()); // lastPublicType
        package.extend_from_slice(&key_strings_off.to_le_bytes());
        package.extend_from_slice(&[0u8; 8]); // padding up to header_size=288
        package.extend_from_slice(&type_pool);
        package.extend_from_slice(&key_pool);

        // TypeSpec chunk: type_id=1, one entry, no config variance flags.
        let mut type_spec = Vec::new();
        chunk_header(&mut type_spec, 0x0202, 16, 20);
        type_spec.push(1); // id
        type_spec.push(0); // res0
        type_spec.extend_from_slice(&0u16.to_le_bytes()); // res1
        type_spec.extend_from_slice(&1u32.to_le_bytes()); // entry_count
        type_spec.extend_from_slice(&0u32.to_le_bytes()); // flags[0]

        // Type chunk: type_id=1, one simple entry (key 0 = "app_name",
        // data_type IntDec, data=42), default (all-zero) configuration.
        let mut type_chunk = Vec::new();
        chunk_header(&mut type_chunk, 0x0201, 20, 44);
        type_chunk.push(1); // id
        type_chunk.push(0); // res0
        type_chunk.extend_from_slice(&0u16.to_le_bytes()); // res1
        type_chunk.extend_from_slice(&1u32.to_le_bytes()); // entry_count
        type_chunk.extend_from_slice(&28u32.to_le_bytes()); // entries_start
        type_chunk.extend_from_slice(&4u32.to_le_bytes()); // config.size (degenerate/default)
        type_chunk.extend_from_slice(&0u32.to_le_bytes()); // offsets[0] = 0
        type_chunk.extend_from_slice(&8u16.to_le_bytes()); // entry.size
        type_chunk.extend_from_slice(&0u16.to_le_bytes()); // entry.flags
        type_chunk.extend_from_slice(&0u32.to_le_bytes()); // entry.key = "app_name"
        type_chunk.extend_from_slice(&8u16.to_le_bytes()); // value.size
        type_chunk.push(0); // value.res0
        type_chunk.push(0x10); // value.dataType = IntDec
        type_chunk.extend_from_slice(&42u32.to_le_bytes()); // value.data

        package.extend_from_slice(&type_spec);
        package.extend_from_slice(&type_chunk);
        let package_size = package.len() as u32;
        package[4..8].copy_from_slice(&package_size.to_le_bytes());

        let global_pool = utf8_pool(&[]);

        let mut buf = Vec::new();
        chunk_header(&mut buf, 0x0002, 12, 0); // chunk_size patched below
        buf.extend_from_slice(&1u32.to_le_bytes()); // package_count
        buf.extend_from_slice(&global_pool);
        buf.extend_from_slice(&package);
        let total_size = buf.len() as u32;
        buf[4..8].copy_from_slice(&total_size.to_le_bytes());
        buf
    }

    const SAMPLE_RES_ID: u32 = 0x7F01_0000;

    #[test]
    fn invariant_chunk_sizes_span_exactly_the_buffer() {
        let buf = build_sample_table();
        assert!(ResourceTable::parse(&buf).is_ok());

        // Truncating the buffer breaks the "sum of chunk sizes == file
        // length" invariant and must be rejected, not silently accepted.
        let truncated = &buf[..buf.len() - 1];
        assert!(ResourceTable::parse(truncated).is_err());
    }

    #[test]
    fn invariant_every_key_resolves_to_a_live_entry() {
        let buf = build_sample_table();
        let table = ResourceTable::parse(&buf).unwrap();

        let keys = table.all_keys();
        assert_eq!(keys.get(&0x7F).map(Vec::as_slice), Some(&["app_name".to_string()][..]));
        assert_eq!(
            table.key_for(SAMPLE_RES_ID, true),
            Some("@string/app_name".to_string())
        );
    }

    #[test]
    fn invariant_xml_form_and_java_form_differ_only_in_separator() {
        let buf = build_sample_table();
        let table = ResourceTable::parse(&buf).unwrap();

        let xml_form = table.key_for(SAMPLE_RES_ID, true).unwrap();
        let java_form = table.key_for(SAMPLE_RES_ID, false).unwrap();
        assert_eq!(xml_form, "@string/app_name");
        assert_eq!(java_form, "R.string.app_name");
    }

    #[test]
    fn invariant_default_value_matches_all_values_default_slot() {
        let buf = build_sample_table();
        let table = ResourceTable::parse(&buf).unwrap();

        let default = table.default_value(SAMPLE_RES_ID).unwrap();
        let all = table.all_values(SAMPLE_RES_ID).unwrap();
        assert_eq!(all.get(&ConfigKey::DEFAULT), Some(default));
        assert_eq!(default.value, TypedValue::IntDec(42));
    }
}
