use std::path::{Path, PathBuf};

use super::config::Config;
use super::error::FileStackError;

/// Get all MAPS source files in a directory, sorted by name.
///
/// SDE products (names containing the SDE marker) are skipped so a directory can be
/// converted more than once.
pub fn list_source_files(dir: &Path, config: &Config) -> Result<Vec<PathBuf>, FileStackError> {
    get_file_stack(dir, |path| config.is_source_file(path))
}

/// Get all SDE files in a directory, sorted by name
pub fn list_sde_files(dir: &Path, config: &Config) -> Result<Vec<PathBuf>, FileStackError> {
    get_file_stack(dir, |path| config.is_sde_file(path))
}

fn get_file_stack(
    parent_path: &Path,
    matches: impl Fn(&Path) -> bool,
) -> Result<Vec<PathBuf>, FileStackError> {
    if !parent_path.is_dir() {
        return Err(FileStackError::BadDirectory(parent_path.to_path_buf()));
    }
    let mut file_list: Vec<PathBuf> = Vec::new();
    for item in parent_path.read_dir()? {
        let item_path = item?.path();
        if item_path.is_file() && matches(&item_path) {
            file_list.push(item_path);
        }
    }
    file_list.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(file_list)
}
