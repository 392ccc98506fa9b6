use winnow::binary::{le_u16, le_u32};
use winnow::error::{ContextError, StrContext, StrContextValue};
use winnow::{ModalResult, Parser};

/// Chunk type tags shared by `resources.arsc` and compiled binary XML.
///
/// Both formats share one chunk-header convention, so one enum covers the
/// tags that appear in either stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChunkType {
    Null,
    StringPool,
    Table,
    Xml,
    XmlStartNamespace,
    XmlEndNamespace,
    XmlStartElement,
    XmlEndElement,
    XmlCdata,
    XmlResourceMap,
    TablePackage,
    TableType,
    TableTypeSpec,
    Unknown(u16),
}

impl From<u16> for ChunkType {
    fn from(value: u16) -> Self {
        match value {
            0x0000 => ChunkType::Null,
            0x0001 => ChunkType::StringPool,
            0x0002 => ChunkType::Table,
            0x0003 => ChunkType::Xml,
            0x0100 => ChunkType::XmlStartNamespace,
            0x0101 => ChunkType::XmlEndNamespace,
            0x0102 => ChunkType::XmlStartElement,
            0x0103 => ChunkType::XmlEndElement,
            0x0104 => ChunkType::XmlCdata,
            0x0180 => ChunkType::XmlResourceMap,
            0x0200 => ChunkType::TablePackage,
            0x0201 => ChunkType::TableType,
            0x0202 => ChunkType::TableTypeSpec,
            other => ChunkType::Unknown(other),
        }
    }
}

/// The universal chunk prefix: `type`, `header_size`, `chunk_size`.
///
/// `chunk_size` is the authoritative span of the chunk from its first byte;
/// callers advance their cursor by exactly this many bytes.
#[derive(Clone, Copy, Debug)]
pub struct ChunkHeader {
    pub chunk_type: ChunkType,
    pub header_size: u16,
    pub chunk_size: u32,
}

impl ChunkHeader {
    pub const SIZE: usize = 8;

    pub fn parse(input: &mut &[u8]) -> ModalResult<Self> {
        let (raw_type, header_size, chunk_size) = (
            le_u16,
            le_u16,
            le_u32.context(StrContext::Expected(StrContextValue::Description(
                "chunk_size",
            ))),
        )
            .parse_next(input)?;
        Ok(ChunkHeader {
            chunk_type: ChunkType::from(raw_type),
            header_size,
            chunk_size,
        })
    }

}

pub type ParseError = ContextError;
