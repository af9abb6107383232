use hdf5::File;
use std::path::{Path, PathBuf};

use super::error::SourceError;
use super::value::{read_container, Value};

/// Read-only handle to an HDF5 file, addressed by absolute paths.
///
/// Any lookup that fails to find its node (or attribute) is reported as a missing field
/// naming the path and the file. The underlying file is closed when the handle is dropped.
#[derive(Debug)]
pub struct SourceFile {
    file_handle: File,
    path: PathBuf,
}

impl SourceFile {
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        Ok(Self {
            file_handle: File::open(path)?,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the value of the dataset at `node`
    pub fn read_value(&self, node: &str) -> Result<Value, SourceError> {
        let dataset = self
            .file_handle
            .dataset(node)
            .map_err(|_| self.missing(node))?;
        read_container(&dataset, node, &self.path)
    }

    /// Read the attribute `name` attached to the dataset or group at `node`
    pub fn read_attribute(&self, node: &str, name: &str) -> Result<Value, SourceError> {
        let attr_path = format!("{node}@{name}");
        let attr = match self.file_handle.dataset(node) {
            Ok(dataset) => dataset.attr(name),
            Err(_) => self
                .file_handle
                .group(node)
                .map_err(|_| self.missing(node))?
                .attr(name),
        }
        .map_err(|_| self.missing(&attr_path))?;
        read_container(&attr, &attr_path, &self.path)
    }

    /// Shape of the dataset at `node`
    pub fn shape(&self, node: &str) -> Result<Vec<usize>, SourceError> {
        let dataset = self
            .file_handle
            .dataset(node)
            .map_err(|_| self.missing(node))?;
        Ok(dataset.shape())
    }

    /// Names of the groups directly under the root, in name order
    pub fn root_groups(&self) -> Result<Vec<String>, SourceError> {
        let mut names: Vec<String> = self
            .file_handle
            .groups()?
            .iter()
            .map(|g| g.name().trim_start_matches('/').to_string())
            .collect();
        names.sort();
        Ok(names)
    }

    pub fn has_dataset(&self, node: &str) -> bool {
        self.file_handle.dataset(node).is_ok()
    }

    /// Expose a dataset for the stack reader, which needs its element type and metadata
    pub(crate) fn dataset(&self, node: &str) -> Result<hdf5::Dataset, SourceError> {
        self.file_handle
            .dataset(node)
            .map_err(|_| self.missing(node))
    }

    fn missing(&self, node: &str) -> SourceError {
        SourceError::MissingField {
            path: node.to_string(),
            file: self.path.clone(),
        }
    }
}
