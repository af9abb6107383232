use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Config failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Config failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("Config could not derive an SDE file name from {0:?}")]
    BadFileName(PathBuf),
}

#[derive(Debug, Error)]
pub enum FileStackError {
    #[error("FileStack failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("FileStack failed because {0:?} is not a directory")]
    BadDirectory(PathBuf),
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Source failed due to HDF5 error: {0}")]
    HDF5Error(#[from] hdf5::Error),
    #[error("Missing field {path} in file {file:?}")]
    MissingField { path: String, file: PathBuf },
    #[error("Field {path} in file {file:?} has a type that cannot be read as a number or string")]
    UnsupportedType { path: String, file: PathBuf },
    #[error("Index {index:?} is out of range for field {path} with shape {shape:?}")]
    BadIndex {
        path: String,
        index: Vec<usize>,
        shape: Vec<usize>,
    },
}

#[derive(Debug, Error)]
pub enum MappingError {
    #[error("MappingTable failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("MappingTable failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("MappingTable contains the entry {0} more than once")]
    DuplicateKey(String),
}

#[derive(Debug, Error)]
pub enum SdeWriterError {
    #[error("SdeWriter failed due to HDF5 error: {0}")]
    HDF5Error(#[from] hdf5::Error),
    #[error("SdeWriter failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("SdeWriter could not store a string: {0}")]
    StringError(#[from] hdf5::types::StringError),
    #[error("SdeWriter failed due to shape error: {0}")]
    ShapeError(#[from] ndarray::ShapeError),
    #[error("SdeWriter failed to format a timestamp: {0}")]
    TimeError(#[from] time::error::Format),
    #[error("SdeWriter was given an empty destination path")]
    EmptyPath,
}

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("Conversion failed due to Source error: {0}")]
    SourceError(#[from] SourceError),
    #[error("Conversion failed due to SdeWriter error: {0}")]
    WriterError(#[from] SdeWriterError),
    #[error("Conversion failed due to Config error: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("Conversion failed due to FileStack error: {0}")]
    FileStackError(#[from] FileStackError),
    #[error("Conversion failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum StackError {
    #[error("Stack failed due to HDF5 error: {0}")]
    HDF5Error(#[from] hdf5::Error),
    #[error("Stack failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Stack failed due to Source error: {0}")]
    SourceError(#[from] SourceError),
    #[error("Stack failed due to SdeWriter error: {0}")]
    WriterError(#[from] SdeWriterError),
    #[error("Stack failed due to FileStack error: {0}")]
    FileStackError(#[from] FileStackError),
    #[error("Stack failed due to shape error: {0}")]
    ShapeError(#[from] ndarray::ShapeError),
    #[error("Stack output {0:?} is also one of the input files")]
    OutputIsInput(PathBuf),
    #[error("Group {group} is present in the first file but missing from {file:?}")]
    MissingGroup { group: String, file: PathBuf },
    #[error("Files {first:?} and {second:?} share the angle {angle}; their order in the stack is ambiguous")]
    DuplicateAngle {
        angle: f64,
        first: PathBuf,
        second: PathBuf,
    },
    #[error("Group {group} in {file:?} has {found} channels; expected {expected}")]
    ChannelMismatch {
        group: String,
        file: PathBuf,
        expected: usize,
        found: usize,
    },
    #[error("Angle in {file:?} could not be read as a single number: {value}")]
    InvalidAngle { file: PathBuf, value: String },
    #[error("Group {group} in {file:?} has data of shape {shape:?}; expected (channels, x, y)")]
    BadShape {
        group: String,
        file: PathBuf,
        shape: Vec<usize>,
    },
}
