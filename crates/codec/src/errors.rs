use thiserror::Error;

use crate::chunk::ChunkType;

/// Failures that abort the current parse: constructing a `ResourceTable` or
/// decoding one XML member. Lookup misses are never represented here; they
/// come back as `None` from the lookup methods.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("buffer too small: need at least {need} bytes, have {have}")]
    TooSmall { need: usize, have: usize },

    #[error("unexpected chunk type {found:?}, expected {expected:?}")]
    UnexpectedChunk {
        expected: ChunkType,
        found: ChunkType,
    },

    #[error("chunk_size {chunk_size} would read past the end of the buffer (len {len})")]
    ChunkOverrun { chunk_size: u32, len: usize },

    #[error("string pool parse error: {0}")]
    StringPool(String),

    #[error("resource table parse error: {0}")]
    ResourceTable(String),

    #[error("xml tree parse error: {0}")]
    XmlTree(String),

    #[error("xml document has no root element")]
    MissingRoot,
}

pub type CodecResult<T> = Result<T, CodecError>;
