use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use log::info;
use resparse_codec::{ConfigKey, Entry, ResourceTable, XmlDecoder, XmlDocument, XmlElement};

use crate::errors::{ApkError, ApkResult};

const RESOURCE_TABLE_ENTRY: &str = "resources.arsc";

/// The result of decoding one XML member: its serialized text and the
/// element tree, returned together so callers can pick whichever form
/// they need without re-parsing.
pub struct ParsedXml {
    pub text: String,
    pub document: XmlDocument,
}

impl ParsedXml {
    /// Every element in the document, in document order. See
    /// `XmlDocument::elements`.
    pub fn elements(&self) -> Vec<&XmlElement> {
        self.document.elements()
    }
}

/// An opened APK: its eagerly-decoded resource table, plus enough to go
/// back and extract named XML members on demand.
pub struct Apk {
    path: PathBuf,
    resources: ResourceTable,
}

impl Apk {
    /// Opens `path` as a ZIP archive, extracts and decodes
    /// `resources.arsc` eagerly, and returns a handle for further lookups.
    pub fn open(path: impl AsRef<Path>) -> ApkResult<Apk> {
        let path = path.as_ref().to_path_buf();
        let bytes = read_entry(&path, RESOURCE_TABLE_ENTRY)?;
        let resources = ResourceTable::parse(&bytes)?;
        info!(
            "opened {:?}: {} packages, {} global strings",
            path,
            resources.packages.len(),
            resources.global_strings.len()
        );
        Ok(Apk { path, resources })
    }

    pub fn resources(&self) -> &ResourceTable {
        &self.resources
    }

    pub fn key_for(&self, res_id: u32, xml_form: bool) -> Option<String> {
        self.resources.key_for(res_id, xml_form)
    }

    pub fn default_value(&self, res_id: u32) -> Option<&Entry> {
        self.resources.default_value(res_id)
    }

    pub fn all_values(&self, res_id: u32) -> Option<&BTreeMap<ConfigKey, Entry>> {
        self.resources.all_values(res_id)
    }

    pub fn all_keys(&self) -> BTreeMap<u8, Vec<String>> {
        self.resources.all_keys()
    }

    pub fn all_strings(&self) -> Vec<String> {
        self.resources.all_strings()
    }

    pub fn all_types(&self) -> BTreeMap<u8, Vec<String>> {
        self.resources.all_types()
    }

    /// Extracts and decodes the named XML member (typically
    /// `AndroidManifest.xml`), resolving attribute references against this
    /// APK's resource table when `resolve` is set.
    pub fn parse_xml(&self, member_name: &str, pretty: bool, resolve: bool) -> ApkResult<ParsedXml> {
        let bytes = read_entry(&self.path, member_name)?;
        let document = XmlDecoder::decode(&bytes, Some(&self.resources), resolve)?;
        let text = resparse_codec::xml::serialize(&document, pretty);
        Ok(ParsedXml { text, document })
    }
}

fn read_entry(apk_path: &Path, name: &str) -> ApkResult<Vec<u8>> {
    let file = File::open(apk_path)?;
    let mut archive = zip::ZipArchive::new(file)?;
    let mut entry = archive
        .by_name(name)
        .map_err(|_| ApkError::MissingEntry(name.to_string()))?;
    let mut data = Vec::with_capacity(entry.size() as usize);
    entry.read_to_end(&mut data)?;
    Ok(data)
}
