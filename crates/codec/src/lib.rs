pub mod chunk;
pub mod config;
pub mod errors;
pub mod reader;
pub mod resource_table;
pub mod string_pool;
pub mod typed_value;
pub mod xml;

pub use chunk::{ChunkHeader, ChunkType};
pub use config::ConfigKey;
pub use errors::{CodecError, CodecResult};
pub use reader::BinReader;
pub use resource_table::{Entry, EntryFlags, Package, ResourceTable, TypeSpec};
pub use string_pool::StringPool;
pub use typed_value::{complex_to_float, BoolValue, TypedValue};
pub use xml::{XmlAttribute, XmlDecoder, XmlDocument, XmlElement, XmlNode};
