pub mod apk;
pub mod errors;

pub use apk::{Apk, ParsedXml};
pub use errors::{ApkError, ApkResult};
