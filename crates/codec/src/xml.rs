use std::collections::HashMap;

use log::{debug, warn};
use quick_xml::escape::escape;

use crate::chunk::{ChunkHeader, ChunkType};
use crate::errors::{CodecError, CodecResult};
use crate::reader::BinReader;
use crate::resource_table::ResourceTable;
use crate::string_pool::{StringPool, NO_STRING};
use crate::typed_value::TypedValue;

const ATTR_EXT_SIZE: usize = 20;
const DEFAULT_ATTR_SIZE: usize = 20;

/// One attribute on an `XmlElement`, already resolved to its final textual
/// form (raw string, resource key, or materialized default value,
/// depending on how it was encoded and whether resolution was requested).
#[derive(Clone, Debug)]
pub struct XmlAttribute {
    pub namespace_prefix: Option<String>,
    pub name: String,
    pub value: String,
}

/// A node in the decoded document tree: either an element or a run of
/// character data.
#[derive(Clone, Debug)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
}

/// A decoded XML element, in document order.
#[derive(Clone, Debug)]
pub struct XmlElement {
    pub line: u32,
    pub comment: Option<String>,
    pub namespace_prefix: Option<String>,
    pub name: String,
    pub attributes: Vec<XmlAttribute>,
    pub is_root: bool,
    pub children: Vec<XmlNode>,
}

/// The result of decoding one binary XML member: the element tree plus the
/// namespaces opened above the root (the root element declares all of
/// them; descendants do not redeclare).
#[derive(Clone, Debug)]
pub struct XmlDocument {
    pub root: XmlElement,
    pub namespaces: Vec<(String, String)>,
}

impl XmlDocument {
    /// Every element in the tree, flattened into document order (pre-order:
    /// a START_ELEMENT is listed before its children, which precede the
    /// matching END_ELEMENT's effect of closing it). Useful for callers
    /// that want to scan the manifest without walking the nested tree, and
    /// for checking that every opened element is accounted for exactly
    /// once.
    pub fn elements(&self) -> Vec<&XmlElement> {
        let mut out = Vec::new();
        collect_elements(&self.root, &mut out);
        out
    }
}

fn collect_elements<'a>(el: &'a XmlElement, out: &mut Vec<&'a XmlElement>) {
    out.push(el);
    for child in &el.children {
        if let XmlNode::Element(child_el) = child {
            collect_elements(child_el, out);
        }
    }
}

#[derive(Debug)]
enum RawNode {
    StartNamespace { prefix_idx: u32, uri_idx: u32 },
    EndNamespace { uri_idx: u32 },
    StartElement {
        line: u32,
        comment_idx: u32,
        ns_uri_idx: u32,
        name_idx: u32,
        attrs: Vec<RawAttr>,
    },
    EndElement { ns_uri_idx: u32, name_idx: u32 },
    Cdata { data_idx: u32 },
}

#[derive(Debug)]
struct RawAttr {
    ns_uri_idx: u32,
    name_idx: u32,
    raw_value_idx: u32,
    data_type: u8,
    data: u32,
}

pub struct XmlDecoder;

impl XmlDecoder {
    /// Decodes a binary XML member. `table` and `resolve_resources`
    /// together control the attribute-value fallback chain for typed
    /// reference attributes; `table` alone (with `resolve_resources =
    /// false`) still allows rendering references as resource keys.
    pub fn decode(
        buf: &[u8],
        table: Option<&ResourceTable>,
        resolve_resources: bool,
    ) -> CodecResult<XmlDocument> {
        if buf.len() < ChunkHeader::SIZE {
            return Err(CodecError::TooSmall {
                need: ChunkHeader::SIZE,
                have: buf.len(),
            });
        }

        let mut input: &[u8] = buf;
        let file_header =
            ChunkHeader::parse(&mut input).map_err(|e| CodecError::XmlTree(e.to_string()))?;
        if file_header.chunk_type != ChunkType::Xml {
            return Err(CodecError::UnexpectedChunk {
                expected: ChunkType::Xml,
                found: file_header.chunk_type,
            });
        }

        let r = BinReader::new(buf);
        let mut cursor = file_header.header_size as usize;
        if cursor == 0 {
            cursor = ChunkHeader::SIZE;
        }

        let pool_header = ChunkHeader::parse(&mut &buf[cursor..])
            .map_err(|e| CodecError::XmlTree(e.to_string()))?;
        check_bounds(buf.len(), cursor, pool_header.chunk_size)?;
        let strings = StringPool::parse(&buf[cursor..cursor + pool_header.chunk_size as usize]);
        cursor += pool_header.chunk_size as usize;

        let mut raw_nodes = Vec::new();
        while cursor + ChunkHeader::SIZE <= buf.len() {
            let chunk_header = ChunkHeader::parse(&mut &buf[cursor..])
                .map_err(|e| CodecError::XmlTree(e.to_string()))?;
            if chunk_header.chunk_size == 0 {
                warn!("zero-size chunk in xml stream at offset {cursor}, stopping scan");
                break;
            }
            check_bounds(buf.len(), cursor, chunk_header.chunk_size)?;

            match chunk_header.chunk_type {
                ChunkType::XmlResourceMap => {
                    debug!("resource map chunk at {cursor} parsed past, not exposed");
                }
                ChunkType::XmlStartNamespace => {
                    let (prefix_idx, uri_idx) = ns_pair(&r, cursor);
                    raw_nodes.push(RawNode::StartNamespace { prefix_idx, uri_idx });
                }
                ChunkType::XmlEndNamespace => {
                    let (_, uri_idx) = ns_pair(&r, cursor);
                    raw_nodes.push(RawNode::EndNamespace { uri_idx });
                }
                ChunkType::XmlStartElement => {
                    raw_nodes.push(parse_start_element(&r, cursor, &chunk_header));
                }
                ChunkType::XmlEndElement => {
                    let base = cursor + 16;
                    raw_nodes.push(RawNode::EndElement {
                        ns_uri_idx: r.u32_le(base),
                        name_idx: r.u32_le(base + 4),
                    });
                }
                ChunkType::XmlCdata => {
                    let base = cursor + 16;
                    raw_nodes.push(RawNode::Cdata {
                        data_idx: r.u32_le(base),
                    });
                }
                other => {
                    debug!("skipping unrecognized xml chunk type {other:?} at {cursor}");
                }
            }

            cursor += chunk_header.chunk_size as usize;
        }

        build_document(raw_nodes, &strings, table, resolve_resources)
    }
}

fn check_bounds(len: usize, cursor: usize, chunk_size: u32) -> CodecResult<()> {
    if cursor.saturating_add(chunk_size as usize) > len {
        return Err(CodecError::ChunkOverrun { chunk_size, len });
    }
    Ok(())
}

fn ns_pair(r: &BinReader, chunk_off: usize) -> (u32, u32) {
    let base = chunk_off + 16;
    (r.u32_le(base), r.u32_le(base + 4))
}

fn parse_start_element(r: &BinReader, chunk_off: usize, header: &ChunkHeader) -> RawNode {
    let line = r.u32_le(chunk_off + 8);
    let comment_idx = r.u32_le(chunk_off + 12);
    let ext = chunk_off + 16;
    let ns_uri_idx = r.u32_le(ext);
    let name_idx = r.u32_le(ext + 4);
    let attr_start = r.u16_le(ext + 8) as usize;
    let attr_size = r.u16_le(ext + 10) as usize;
    let attr_count = r.u16_le(ext + 12) as usize;
    let attr_size = if attr_size == 0 { DEFAULT_ATTR_SIZE } else { attr_size };

    let attrs_base = ext + attr_start.max(ATTR_EXT_SIZE);
    let chunk_end = chunk_off + header.chunk_size as usize;
    let mut attrs = Vec::with_capacity(attr_count);
    for i in 0..attr_count {
        let a = attrs_base + i * attr_size;
        if a + ATTR_EXT_SIZE > chunk_end {
            warn!("attribute {i} of element at {chunk_off} falls outside its chunk, skipping rest");
            break;
        }
        attrs.push(RawAttr {
            ns_uri_idx: r.u32_le(a),
            name_idx: r.u32_le(a + 4),
            raw_value_idx: r.u32_le(a + 8),
            data_type: r.u8(a + 15),
            data: r.u32_le(a + 16),
        });
    }

    RawNode::StartElement {
        line,
        comment_idx,
        ns_uri_idx,
        name_idx,
        attrs,
    }
}

fn resolve_name(idx: u32, strings: &StringPool) -> String {
    strings.get(idx).unwrap_or_default().to_string()
}

fn resolve_comment(idx: u32, strings: &StringPool) -> Option<String> {
    strings.get(idx).map(str::to_string)
}

fn resolve_namespace_prefix(
    ns_uri_idx: u32,
    namespaces: &HashMap<u32, u32>,
    strings: &StringPool,
) -> Option<String> {
    if ns_uri_idx == NO_STRING {
        return None;
    }
    namespaces
        .get(&ns_uri_idx)
        .and_then(|&prefix_idx| strings.get(prefix_idx))
        .map(str::to_string)
}

/// Resolves one attribute's final textual value, per the fallback chain:
/// raw string first, then reference resolution (materialized default value
/// if `resolve_resources`, else a resource key, else a bare `res:0x…`), then
/// the typed decoder for any other constant.
fn resolve_attr_value(
    attr: &RawAttr,
    strings: &StringPool,
    table: Option<&ResourceTable>,
    resolve_resources: bool,
) -> String {
    if attr.raw_value_idx != NO_STRING {
        return strings.get(attr.raw_value_idx).unwrap_or_default().to_string();
    }

    if attr.data_type == 0x01 {
        if resolve_resources {
            if let Some(table) = table {
                if let Some(entry) = table.default_value(attr.data) {
                    return entry.value.render(&table.global_strings);
                }
            }
        }
        if let Some(table) = table {
            if let Some(key) = table.key_for(attr.data, true) {
                return key;
            }
        }
        return format!("res:0x{:x}", attr.data);
    }

    TypedValue::from_raw(attr.data_type, attr.data).render(strings)
}

fn build_document(
    raw_nodes: Vec<RawNode>,
    strings: &StringPool,
    table: Option<&ResourceTable>,
    resolve_resources: bool,
) -> CodecResult<XmlDocument> {
    let mut active_namespaces: HashMap<u32, u32> = HashMap::new();
    let mut declared_namespaces: Vec<(String, String)> = Vec::new();
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    for node in raw_nodes {
        match node {
            RawNode::StartNamespace { prefix_idx, uri_idx } => {
                active_namespaces.insert(uri_idx, prefix_idx);
                declared_namespaces.push((
                    resolve_name(prefix_idx, strings),
                    resolve_name(uri_idx, strings),
                ));
            }
            RawNode::EndNamespace { uri_idx } => {
                active_namespaces.remove(&uri_idx);
            }
            RawNode::StartElement {
                line,
                comment_idx,
                ns_uri_idx,
                name_idx,
                attrs,
            } => {
                let attributes = attrs
                    .iter()
                    .map(|a| XmlAttribute {
                        namespace_prefix: resolve_namespace_prefix(
                            a.ns_uri_idx,
                            &active_namespaces,
                            strings,
                        ),
                        name: resolve_name(a.name_idx, strings),
                        value: resolve_attr_value(a, strings, table, resolve_resources),
                    })
                    .collect();

                let element = XmlElement {
                    line,
                    comment: resolve_comment(comment_idx, strings),
                    namespace_prefix: resolve_namespace_prefix(
                        ns_uri_idx,
                        &active_namespaces,
                        strings,
                    ),
                    name: resolve_name(name_idx, strings),
                    attributes,
                    is_root: stack.is_empty() && root.is_none(),
                    children: Vec::new(),
                };
                stack.push(element);
            }
            RawNode::EndElement { .. } => {
                let Some(finished) = stack.pop() else {
                    warn!("end element with no matching open element, ignoring");
                    continue;
                };
                match stack.last_mut() {
                    Some(parent) => parent.children.push(XmlNode::Element(finished)),
                    None => root = Some(finished),
                }
            }
            RawNode::Cdata { data_idx, .. } => {
                let text = resolve_name(data_idx, strings);
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(XmlNode::Text(text));
                }
            }
        }
    }

    let root = root.ok_or(CodecError::MissingRoot)?;
    Ok(XmlDocument {
        root,
        namespaces: declared_namespaces,
    })
}

/// Serializes a decoded document to well-formed XML text.
pub fn serialize(doc: &XmlDocument, pretty: bool) -> String {
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?>");
    if pretty {
        out.push('\n');
    }
    write_element(&mut out, &doc.root, &doc.namespaces, 0, pretty);
    out
}

fn write_element(
    out: &mut String,
    el: &XmlElement,
    root_namespaces: &[(String, String)],
    depth: usize,
    pretty: bool,
) {
    if pretty && depth > 0 {
        out.push('\n');
        out.push_str(&"  ".repeat(depth));
    }
    out.push('<');
    if let Some(prefix) = &el.namespace_prefix {
        out.push_str(prefix);
        out.push(':');
    }
    out.push_str(&el.name);

    if el.is_root {
        for (prefix, uri) in root_namespaces {
            write_attr(out, Some("xmlns"), prefix, uri, pretty, depth + 1);
        }
    }
    for attr in &el.attributes {
        write_attr(
            out,
            attr.namespace_prefix.as_deref(),
            &attr.name,
            &attr.value,
            pretty,
            depth + 1,
        );
    }

    if el.children.is_empty() {
        out.push_str(" />");
        return;
    }
    out.push('>');

    for child in &el.children {
        match child {
            XmlNode::Element(child_el) => {
                write_element(out, child_el, root_namespaces, depth + 1, pretty)
            }
            XmlNode::Text(text) => write_cdata(out, text, depth + 1, pretty),
        }
    }

    if pretty {
        out.push('\n');
        out.push_str(&"  ".repeat(depth));
    }
    out.push_str("</");
    if let Some(prefix) = &el.namespace_prefix {
        out.push_str(prefix);
        out.push(':');
    }
    out.push_str(&el.name);
    out.push('>');
}

fn write_attr(
    out: &mut String,
    prefix: Option<&str>,
    name: &str,
    value: &str,
    pretty: bool,
    depth: usize,
) {
    if pretty {
        out.push('\n');
        out.push_str(&"  ".repeat(depth));
    } else {
        out.push(' ');
    }
    if let Some(prefix) = prefix {
        out.push_str(prefix);
        out.push(':');
    }
    out.push_str(name);
    out.push_str("=\"");
    out.push_str(&escape(value));
    out.push('"');
}

fn write_cdata(out: &mut String, text: &str, depth: usize, pretty: bool) {
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if pretty {
            out.push('\n');
            out.push_str(&"  ".repeat(depth));
        }
        out.push_str("<![CDATA[");
        out.push_str(trimmed);
        out.push_str("]]>");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    fn start_namespace(prefix_idx: u32, uri_idx: u32, end: bool) -> Vec<u8> {
        let mut buf = Vec::new();
        let chunk_type = if end { 0x0101 } else { 0x0100 };
        chunk_header(&mut buf, chunk_type, 16, 24);
        buf.extend_from_slice(&0u32.to_le_bytes()); // line
        buf.extend_from_slice(&0xFFFF_FFFFu32.to_le_bytes()); // comment
        buf.extend_from_slice(&prefix_idx.to_le_bytes());
        buf.extend_from_slice(&uri_idx.to_le_bytes());
        buf
    }

    fn start_element(name_idx: u32, ns_uri_idx: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        let chunk_size = 36u32; // no attributes
        chunk_header(&mut buf, 0x0102, 16, chunk_size);
        buf.extend_from_slice(&1u32.to_le_bytes()); // line
        buf.extend_from_slice(&0xFFFF_FFFFu32.to_le_bytes()); // comment
        buf.extend_from_slice(&ns_uri_idx.to_le_bytes());
        buf.extend_from_slice(&name_idx.to_le_bytes());
        buf.extend_from_slice(&20u16.to_le_bytes()); // attr_start
        buf.extend_from_slice(&20u16.to_le_bytes()); // attr_size
        buf.extend_from_slice(&0u16.to_le_bytes()); // attr_count
        buf.extend_from_slice(&0u16.to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes());
        buf
    }

    fn end_element(name_idx: u32, ns_uri_idx: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        chunk_header(&mut buf, 0x0103, 16, 24);
        buf.extend_from_slice(&1u32.to_le_bytes());
        buf.extend_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
        buf.extend_from_slice(&ns_uri_idx.to_le_bytes());
        buf.extend_from_slice(&name_idx.to_le_bytes());
        buf
    }

    #[test]
    fn decodes_minimal_manifest_root() {
        let pool = utf8_pool(&["manifest"]);
        let mut buf = Vec::new();
        let total_size = 8
            + pool.len() as u32
            + 24 // start namespace (unused here, kept minimal)
            + 36 // start element
            + 24; // end element
        chunk_header(&mut buf, 0x0003, 8, total_size);
        buf.extend_from_slice(&pool);
        buf.extend_from_slice(&start_namespace(NO_STRING, NO_STRING, false));
        buf.extend_from_slice(&start_element(0, NO_STRING));
        buf.extend_from_slice(&end_element(0, NO_STRING));

        let doc = XmlDecoder::decode(&buf, None, false).expect("decode should succeed");
        assert_eq!(doc.root.name, "manifest");
        assert!(doc.root.is_root);
        assert!(doc.root.children.is_empty());
    }

    #[test]
    fn elements_flattens_in_document_order() {
        let pool = utf8_pool(&["manifest", "application"]);
        let mut buf = Vec::new();
        let start_app = start_element(1, NO_STRING);
        let end_app = end_element(1, NO_STRING);
        let total_size = 8
            + pool.len() as u32
            + 24 // start namespace
            + 36 // <manifest>
            + start_app.len() as u32
            + end_app.len() as u32
            + 24; // </manifest>
        chunk_header(&mut buf, 0x0003, 8, total_size);
        buf.extend_from_slice(&pool);
        buf.extend_from_slice(&start_namespace(NO_STRING, NO_STRING, false));
        buf.extend_from_slice(&start_element(0, NO_STRING));
        buf.extend_from_slice(&start_app);
        buf.extend_from_slice(&end_app);
        buf.extend_from_slice(&end_element(0, NO_STRING));

        let doc = XmlDecoder::decode(&buf, None, false).unwrap();
        let elements = doc.elements();
        assert_eq!(elements.len(), 2);
        assert_eq!(elements[0].name, "manifest");
        assert_eq!(elements[1].name, "application");
    }

    #[test]
    fn serializes_well_formed_xml() {
        let pool = utf8_pool(&["manifest"]);
        let mut buf = Vec::new();
        let total_size =
            8 + pool.len() as u32 + 24 + 36 + 24;
        chunk_header(&mut buf, 0x0003, 8, total_size);
        buf.extend_from_slice(&pool);
        buf.extend_from_slice(&start_namespace(NO_STRING, NO_STRING, false));
        buf.extend_from_slice(&start_element(0, NO_STRING));
        buf.extend_from_slice(&end_element(0, NO_STRING));

        let doc = XmlDecoder::decode(&buf, None, false).unwrap();
        let text = serialize(&doc, false);
        assert!(text.contains("<manifest"));
        assert!(text.trim_end().ends_with("/>") || text.contains("</manifest>"));
    }
}
