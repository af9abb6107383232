// The mapping table says, for every field of an SDE file, where its value, units and
// description come from in a MAPS file. A field can be
// - a constant stored in the table itself
// - the value of a dataset in the MAPS file (optionally indexed down to a single element)
// - an attribute of a dataset or group in the MAPS file
// Entries are keyed by (group, entry type, field) and written to
// root/entry-type-segment/field in the destination.
use std::fs::File;
use std::io::Read;
use std::path::Path;

use fxhash::FxHashSet;
use serde::{Deserialize, Serialize};

use super::error::{MappingError, SourceError};
use super::source::SourceFile;
use super::value::{Literal, Value};

/// Load the default table for windows
#[cfg(target_family = "windows")]
fn load_default_table() -> String {
    String::from(include_str!("data\\maps_to_sde.yml"))
}

/// Load the default table for macos and linux
#[cfg(target_family = "unix")]
fn load_default_table() -> String {
    String::from(include_str!("data/maps_to_sde.yml"))
}

/// Where a sourced field gets its data from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Source {
    Constant {
        value: Literal,
    },
    DirectValue {
        path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        index: Option<Vec<usize>>,
    },
    AttributeValue {
        path: String,
        name: String,
    },
}

impl Source {
    /// Resolve the source against an open MAPS file
    pub fn resolve(&self, source: &SourceFile) -> Result<Value, SourceError> {
        match self {
            Source::Constant { value } => Ok(Value::from(value)),
            Source::DirectValue { path, index } => resolve_direct(source, path, index.as_deref()),
            Source::AttributeValue { path, name } => source.read_attribute(path, name),
        }
    }
}

fn resolve_direct(
    source: &SourceFile,
    path: &str,
    index: Option<&[usize]>,
) -> Result<Value, SourceError> {
    let value = source.read_value(path)?;
    match index {
        Some(index) => value.select(index, path),
        None => Ok(value),
    }
}

/// The kind of SDE entry, which fixes its default location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    Data,
    Amplifier,
}

impl EntryType {
    /// Root used when an entry does not name one
    pub fn default_root(&self) -> &'static str {
        match self {
            EntryType::Data => "exchange",
            EntryType::Amplifier => "instrument",
        }
    }

    /// Sub-group between the root and the field, if any
    pub fn segment(&self) -> Option<&'static str> {
        match self {
            EntryType::Data => None,
            EntryType::Amplifier => Some("amplifier"),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            EntryType::Data => "data",
            EntryType::Amplifier => "amplifier",
        }
    }
}

/// Options applied when the entry's dataset is created
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WriteOptions {
    /// gzip (deflate) level, 0-9
    #[serde(default)]
    pub compression: Option<u8>,
}

/// A single row of the mapping table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingEntry {
    pub group: String,
    pub entry_type: EntryType,
    pub field: String,
    #[serde(default)]
    pub root: Option<String>,
    pub value: Source,
    #[serde(default)]
    pub units: Option<Source>,
    #[serde(default)]
    pub description: Option<Source>,
    #[serde(default)]
    pub axes: Option<String>,
    #[serde(default)]
    pub write_options: Option<WriteOptions>,
}

/// A mapping entry resolved against one MAPS file, ready to be written
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRecord {
    pub value: Value,
    pub units: Option<Value>,
    pub description: Option<Value>,
    pub axes: Option<String>,
    pub write_options: Option<WriteOptions>,
}

impl MappingEntry {
    pub fn key(&self) -> String {
        format!("{}/{}/{}", self.group, self.entry_type.name(), self.field)
    }

    /// Absolute path of the entry in the destination file
    pub fn destination(&self) -> String {
        let root = self
            .root
            .as_deref()
            .unwrap_or(self.entry_type.default_root())
            .trim_matches('/');
        match self.entry_type.segment() {
            Some(segment) => format!("/{root}/{segment}/{}", self.field),
            None => format!("/{root}/{}", self.field),
        }
    }

    /// Resolve value, units and description independently
    pub fn resolve(&self, source: &SourceFile) -> Result<SourceRecord, SourceError> {
        Ok(SourceRecord {
            value: self.value.resolve(source)?,
            units: self.units.as_ref().map(|s| s.resolve(source)).transpose()?,
            description: self
                .description
                .as_ref()
                .map(|s| s.resolve(source))
                .transpose()?,
            axes: self.axes.clone(),
            write_options: self.write_options,
        })
    }
}

/// The full, immutable MAPS to SDE mapping.
///
/// The table is a YAML list of MappingEntry. A table bundled with the library is used unless
/// a path to another table is given.
#[derive(Debug, Clone, Default)]
pub struct MappingTable {
    entries: Vec<MappingEntry>,
}

impl MappingTable {
    /// Create a new MappingTable
    /// If the path is None, we load the default that is bundled with the library
    pub fn new(path: Option<&Path>) -> Result<Self, MappingError> {
        let mut contents = String::new();
        if let Some(p) = path {
            let mut file = File::open(p)?;
            file.read_to_string(&mut contents)?;
        } else {
            contents = load_default_table();
        }
        Self::from_entries(serde_yaml::from_str::<Vec<MappingEntry>>(&contents)?)
    }

    pub fn from_entries(entries: Vec<MappingEntry>) -> Result<Self, MappingError> {
        let mut keys = FxHashSet::default();
        for entry in entries.iter() {
            if !keys.insert(entry.key()) {
                return Err(MappingError::DuplicateKey(entry.key()));
            }
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[MappingEntry] {
        &self.entries
    }

    pub fn get(&self, group: &str, entry_type: EntryType, field: &str) -> Option<&MappingEntry> {
        self.entries
            .iter()
            .find(|e| e.group == group && e.entry_type == entry_type && e.field == field)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
