use hdf5::types::{TypeDescriptor, VarLenUnicode};
use hdf5::{Dataset, File, Group, H5Type, Location};
use ndarray::{s, Array3, ArrayD, ArrayView1, Dimension, IxDyn};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use super::error::SdeWriterError;
use super::mapping::SourceRecord;
use super::value::Value;

pub(crate) const UNITS_ATTR: &str = "units";
pub(crate) const DESCRIPTION_ATTR: &str = "description";
pub(crate) const AXES_ATTR: &str = "axes";
const IMPLEMENTS_ATTR: &str = "implements";
const VERSION_ATTR: &str = "version";
const CREATED_ATTR: &str = "created";
/// Label of the leading dimension added to stacked datasets
pub const STACK_AXIS: &str = "stack";
/// This is the version of the output format
const FORMAT_VERSION: &str = "1.0";
/// Upper bound on the bytes in one chunk of a stacked dataset. HDF5 refuses chunks of 4 GiB
const MAX_CHUNK_BYTES: usize = 64 * 1024 * 1024;

/// Metadata carried from a per-projection dataset to its stacked counterpart
#[derive(Debug, Clone)]
pub struct StackMetadata {
    pub dtype: TypeDescriptor,
    pub units: Option<Value>,
    pub description: Option<Value>,
    pub axes: Option<String>,
}

/// A simple struct which wraps around the hdf5-rust library.
///
/// Opens an HDF5 file for writing Scientific Data Exchange entries. Entries are datasets
/// carrying optional `units`, `description` and `axes` attributes.
#[derive(Debug)]
pub struct SdeWriter {
    file_handle: File,
    path: PathBuf,
    is_new: bool,
}
// Structure
// / - version, created, implements
// exchange - title, data, x_axis, y_axis, energy, scalers, scaler_names, fit_parameters, angle
// exchange_N - title, data, x_axis, y_axis, channel_names, channel_units, fit_parameters
// |---- data(dset) - units, description, axes
// instrument
// |---- amplifier - name, ds_amplifier, us_amplifier
// Stacked files additionally carry exchange*/angles, and exchange*/data gains a leading
// "stack" dimension.

impl SdeWriter {
    /// Create the writer, truncating any file at path
    pub fn create(path: &Path) -> Result<Self, SdeWriterError> {
        let file_handle = File::create(path)?;
        let version = format!("{}:{}", env!("CARGO_PKG_NAME"), FORMAT_VERSION);
        let created = OffsetDateTime::now_utc().format(&Rfc3339)?;
        write_string_attr(&file_handle, VERSION_ATTR, &version)?;
        write_string_attr(&file_handle, CREATED_ATTR, &created)?;
        Ok(Self {
            file_handle,
            path: path.to_path_buf(),
            is_new: true,
        })
    }

    /// Open an existing SDE file for modification
    pub fn open(path: &Path) -> Result<Self, SdeWriterError> {
        Ok(Self {
            file_handle: File::open_rw(path)?,
            path: path.to_path_buf(),
            is_new: false,
        })
    }

    /// Duplicate a file byte-for-byte. Returns the number of bytes copied
    pub fn copy_file(src: &Path, dst: &Path) -> Result<u64, SdeWriterError> {
        let bytes = std::fs::copy(src, dst)?;
        spdlog::info!(
            "Copied {} to {} ({})",
            src.display(),
            dst.display(),
            human_bytes::human_bytes(bytes as f64)
        );
        Ok(bytes)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write one entry at an absolute destination path, replacing anything already there
    pub fn write_record(
        &self,
        destination: &str,
        record: &SourceRecord,
    ) -> Result<(), SdeWriterError> {
        let (parent, name) = split_path(destination)?;
        let group = self.require_group(parent)?;
        remove_member(&group, name)?;

        let compression = record.write_options.and_then(|o| o.compression);
        let dataset = write_value_dataset(&group, name, &record.value, compression)?;
        if let Some(units) = &record.units {
            write_value_attr(&dataset, UNITS_ATTR, units)?;
        }
        if let Some(description) = &record.description {
            write_value_attr(&dataset, DESCRIPTION_ATTR, description)?;
        }
        if let Some(axes) = &record.axes {
            write_string_attr(&dataset, AXES_ATTR, axes)?;
        }
        Ok(())
    }

    /// Delete the node at path if it exists. Returns whether anything was removed
    pub fn remove_node(&self, path: &str) -> Result<bool, SdeWriterError> {
        let (parent, name) = split_path(path)?;
        let parent = if parent.is_empty() { "/" } else { parent };
        match self.file_handle.group(parent) {
            Ok(group) => remove_member(&group, name),
            Err(_) => Ok(false),
        }
    }

    /// Create a stacked dataset `group/name` shaped `(1, channels, x, y)` whose first
    /// dimension can grow. Any existing node at that path is replaced.
    pub fn create_stack(
        &self,
        group: &str,
        name: &str,
        slice_shape: [usize; 3],
        metadata: &StackMetadata,
        compression: Option<u8>,
    ) -> Result<StackDataset, SdeWriterError> {
        let parent = self.require_group(group)?;
        if remove_member(&parent, name)? {
            spdlog::info!("Replaced existing dataset {}/{}", group, name);
        }
        let [channels, x, y] = slice_shape;
        let chunk = stack_chunk(slice_shape, metadata.dtype.size());
        let mut builder = parent
            .new_dataset_builder()
            .empty_as(&metadata.dtype)
            .shape((1_usize.., channels, x, y))
            .chunk(chunk);
        if let Some(level) = compression {
            builder = builder.deflate(level);
        }
        let dataset = builder.create(name)?;

        if let Some(units) = &metadata.units {
            write_value_attr(&dataset, UNITS_ATTR, units)?;
        }
        if let Some(description) = &metadata.description {
            write_value_attr(&dataset, DESCRIPTION_ATTR, description)?;
        }
        let axes = match &metadata.axes {
            Some(axes) => format!("{STACK_AXIS}:{axes}"),
            None => String::from(STACK_AXIS),
        };
        write_string_attr(&dataset, AXES_ATTR, &axes)?;

        Ok(StackDataset {
            dataset,
            slice_shape,
        })
    }

    /// Write (or replace) the angles side-array of a stacked group
    pub fn write_angles(
        &self,
        group: &str,
        name: &str,
        angles: &[f64],
    ) -> Result<(), SdeWriterError> {
        let parent = self.require_group(group)?;
        remove_member(&parent, name)?;
        let dataset = parent
            .new_dataset_builder()
            .with_data(ArrayView1::from(angles))
            .create(name)?;
        write_string_attr(&dataset, UNITS_ATTR, "degrees")?;
        write_string_attr(&dataset, AXES_ATTR, STACK_AXIS)?;
        Ok(())
    }

    /// Finish the file. New files record the top-level groups they implement
    pub fn close(self) -> Result<(), SdeWriterError> {
        if self.is_new {
            let names: Vec<String> = self
                .file_handle
                .groups()?
                .iter()
                .map(|g| g.name().trim_start_matches('/').to_string())
                .collect();
            write_string_attr(&self.file_handle, IMPLEMENTS_ATTR, &names.join(":"))?;
        }
        self.file_handle.flush()?;
        Ok(())
    }

    /// Get a group by absolute path, creating it and any missing parents
    fn require_group(&self, path: &str) -> Result<Group, SdeWriterError> {
        let mut group = self.file_handle.as_group()?;
        for part in path.split('/').filter(|p| !p.is_empty()) {
            group = match group.group(part) {
                Ok(g) => g,
                Err(_) => group.create_group(part)?,
            };
        }
        Ok(group)
    }
}

/// A resizable 4-d dataset `(stack, channels, x, y)` filled one slice at a time
#[derive(Debug)]
pub struct StackDataset {
    dataset: Dataset,
    slice_shape: [usize; 3],
}

impl StackDataset {
    /// Grow (or shrink) the stack to `depth` slices, keeping the slice shape
    pub fn resize(&self, depth: usize) -> Result<(), SdeWriterError> {
        let [channels, x, y] = self.slice_shape;
        self.dataset.resize((depth, channels, x, y))?;
        Ok(())
    }

    /// Write one file's array into the corner `[rank, :, 0:nx, 0:ny]` of its slice
    pub fn write_slice<T: H5Type>(
        &self,
        rank: usize,
        data: &Array3<T>,
    ) -> Result<(), SdeWriterError> {
        let (channels, nx, ny) = data.dim();
        self.dataset
            .write_slice(data, s![rank, 0..channels, 0..nx, 0..ny])?;
        Ok(())
    }

    pub fn shape(&self) -> Vec<usize> {
        self.dataset.shape()
    }
}

/// Chunk shape of a stacked dataset: one slice per chunk when it fits under
/// MAX_CHUNK_BYTES, otherwise a run of channels, and for very large planes a band of rows.
/// Every extent is at least 1.
fn stack_chunk(slice_shape: [usize; 3], element_size: usize) -> (usize, usize, usize, usize) {
    let [channels, x, y] = slice_shape.map(|d| d.max(1));
    let element_size = element_size.max(1);
    let row_bytes = y.saturating_mul(element_size);
    let plane_bytes = x.saturating_mul(row_bytes);
    if plane_bytes <= MAX_CHUNK_BYTES {
        let per_chunk = (MAX_CHUNK_BYTES / plane_bytes).clamp(1, channels);
        (1, per_chunk, x, y)
    } else if row_bytes <= MAX_CHUNK_BYTES {
        (1, 1, (MAX_CHUNK_BYTES / row_bytes).clamp(1, x), y)
    } else {
        (1, 1, 1, (MAX_CHUNK_BYTES / element_size).clamp(1, y))
    }
}

/// Split an absolute path into (parent, name)
fn split_path(path: &str) -> Result<(&str, &str), SdeWriterError> {
    let trimmed = path.trim_end_matches('/');
    let (parent, name) = match trimmed.rfind('/') {
        Some(i) => (&trimmed[..i], &trimmed[i + 1..]),
        None => ("", trimmed),
    };
    if name.is_empty() {
        return Err(SdeWriterError::EmptyPath);
    }
    Ok((parent, name))
}

fn remove_member(group: &Group, name: &str) -> Result<bool, SdeWriterError> {
    if group.member_names()?.iter().any(|n| n == name) {
        group.unlink(name)?;
        Ok(true)
    } else {
        Ok(false)
    }
}

fn to_unicode(array: &ArrayD<String>) -> Result<ArrayD<VarLenUnicode>, SdeWriterError> {
    let strings = array
        .iter()
        .map(|s| VarLenUnicode::from_str(s))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ArrayD::from_shape_vec(array.raw_dim(), strings)?)
}

fn write_value_dataset(
    group: &Group,
    name: &str,
    value: &Value,
    compression: Option<u8>,
) -> Result<Dataset, SdeWriterError> {
    // Scalars and empty arrays cannot be chunked, so they are never compressed
    let compression =
        compression.filter(|_| !value.is_scalar() && value.shape().iter().all(|&d| d > 0));
    let chunk = IxDyn(value.shape());
    let dataset = match value {
        Value::Numeric(array) => {
            let mut builder = group.new_dataset_builder().with_data(array.view());
            if let Some(level) = compression {
                builder = builder.chunk(chunk.slice()).deflate(level);
            }
            builder.create(name)?
        }
        Value::Text(array) => {
            let strings = to_unicode(array)?;
            let mut builder = group.new_dataset_builder().with_data(strings.view());
            if let Some(level) = compression {
                builder = builder.chunk(chunk.slice()).deflate(level);
            }
            builder.create(name)?
        }
    };
    Ok(dataset)
}

fn write_value_attr(location: &Location, name: &str, value: &Value) -> Result<(), SdeWriterError> {
    match value {
        Value::Numeric(array) => {
            if array.ndim() == 0 {
                let scalar = array.iter().next().copied().unwrap_or_default();
                location
                    .new_attr::<f64>()
                    .create(name)?
                    .write_scalar(&scalar)?;
            } else {
                let flat: Vec<f64> = array.iter().copied().collect();
                location
                    .new_attr::<f64>()
                    .shape((flat.len(),))
                    .create(name)?
                    .write(ArrayView1::from(flat.as_slice()))?;
            }
        }
        Value::Text(array) => {
            if array.ndim() == 0 {
                let scalar = array.iter().next().cloned().unwrap_or_default();
                write_string_attr(location, name, &scalar)?;
            } else {
                let flat = to_unicode(array)?.iter().cloned().collect::<Vec<_>>();
                location
                    .new_attr::<VarLenUnicode>()
                    .shape((flat.len(),))
                    .create(name)?
                    .write(ArrayView1::from(flat.as_slice()))?;
            }
        }
    }
    Ok(())
}

fn write_string_attr(location: &Location, name: &str, value: &str) -> Result<(), SdeWriterError> {
    location
        .new_attr::<VarLenUnicode>()
        .create(name)?
        .write_scalar(&VarLenUnicode::from_str(value)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::WriteOptions;
    use crate::source::SourceFile;
    use ndarray::{Array1, Array3};

    fn text(s: &str) -> Value {
        Value::Text(ArrayD::from_elem(vec![], s.to_string()))
    }

    #[test]
    fn test_write_record_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out_SDE.h5");
        let data = Array3::from_shape_fn((2, 3, 4), |(c, x, y)| (c * 100 + x * 10 + y) as f64);
        let record = SourceRecord {
            value: Value::Numeric(data.clone().into_dyn()),
            units: Some(text("counts")),
            description: Some(text("raw spectra")),
            axes: Some(String::from("energy:y:x")),
            write_options: Some(WriteOptions {
                compression: Some(4),
            }),
        };
        let writer = SdeWriter::create(&path).unwrap();
        writer.write_record("/exchange/data", &record).unwrap();
        writer
            .write_record(
                "/instrument/amplifier/name",
                &SourceRecord {
                    value: text("XSD/2-ID-E"),
                    units: None,
                    description: None,
                    axes: None,
                    write_options: None,
                },
            )
            .unwrap();
        writer.close().unwrap();

        let source = SourceFile::open(&path).unwrap();
        assert_eq!(
            source.read_value("/exchange/data").unwrap(),
            Value::Numeric(data.into_dyn())
        );
        assert_eq!(source.read_attribute("/exchange/data", "units").unwrap(), text("counts"));
        assert_eq!(
            source.read_attribute("/exchange/data", "axes").unwrap(),
            text("energy:y:x")
        );
        assert_eq!(
            source.read_value("/instrument/amplifier/name").unwrap(),
            text("XSD/2-ID-E")
        );
        assert_eq!(source.read_attribute("/", "implements").unwrap(), text("exchange:instrument"));
        assert!(source.read_attribute("/instrument/amplifier/name", "units").is_err());
    }

    #[test]
    fn test_stack_dataset_resize_and_fill() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stack.h5");
        let writer = SdeWriter::create(&path).unwrap();
        let metadata = StackMetadata {
            dtype: TypeDescriptor::Float(hdf5::types::FloatSize::U8),
            units: Some(text("counts")),
            description: None,
            axes: Some(String::from("channel:y:x")),
        };
        let stack = writer
            .create_stack("exchange", "data", [2, 3, 3], &metadata, Some(4))
            .unwrap();
        assert_eq!(stack.shape(), vec![1, 2, 3, 3]);
        stack.resize(2).unwrap();
        assert_eq!(stack.shape(), vec![2, 2, 3, 3]);
        stack
            .write_slice(1, &Array3::from_elem((2, 2, 1), 7.0))
            .unwrap();
        writer.write_angles("exchange", "angles", &[0.0, 15.0]).unwrap();
        writer.close().unwrap();

        let source = SourceFile::open(&path).unwrap();
        let Value::Numeric(read) = source.read_value("/exchange/data").unwrap() else {
            panic!()
        };
        assert_eq!(read[[1, 1, 1, 0]], 7.0);
        assert_eq!(read[[1, 1, 2, 0]], 0.0);
        assert_eq!(read[[1, 1, 1, 1]], 0.0);
        assert_eq!(read[[0, 0, 0, 0]], 0.0);
        assert_eq!(
            source.read_attribute("/exchange/data", "axes").unwrap(),
            text("stack:channel:y:x")
        );
        assert_eq!(
            source.read_value("/exchange/angles").unwrap(),
            Value::Numeric(Array1::from(vec![0.0, 15.0]).into_dyn())
        );
    }

    #[test]
    fn test_remove_node() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.h5");
        let writer = SdeWriter::create(&path).unwrap();
        writer.write_angles("exchange", "angles", &[1.0]).unwrap();
        assert!(writer.remove_node("/exchange/angles").unwrap());
        assert!(!writer.remove_node("/exchange/angles").unwrap());
        assert!(!writer.remove_node("/missing/angles").unwrap());
    }

    #[test]
    fn test_stack_chunk_bounds() {
        let bytes = |c: (usize, usize, usize, usize)| c.0 * c.1 * c.2 * c.3 * 8;

        assert_eq!(stack_chunk([2, 3, 3], 8), (1, 2, 3, 3));

        // 2048 channels of 512 x 512 doubles is 4 GiB per slice
        let chunk = stack_chunk([2048, 512, 512], 8);
        assert_eq!(chunk, (1, 32, 512, 512));
        assert!(bytes(chunk) <= MAX_CHUNK_BYTES);

        // a single plane over the limit is split into bands of rows
        let chunk = stack_chunk([3, 5000, 5000], 8);
        assert_eq!((chunk.0, chunk.1, chunk.3), (1, 1, 5000));
        assert!(chunk.2 >= 1 && chunk.2 < 5000);
        assert!(bytes(chunk) <= MAX_CHUNK_BYTES);

        assert_eq!(stack_chunk([0, 4, 0], 8), (1, 1, 4, 1));
        assert_eq!(stack_chunk([0, 0, 0], 0), (1, 1, 1, 1));
    }

    #[test]
    fn test_split_path() {
        assert_eq!(split_path("/exchange/data").unwrap(), ("/exchange", "data"));
        assert_eq!(split_path("/data").unwrap(), ("", "data"));
        assert!(split_path("/").is_err());
    }
}
