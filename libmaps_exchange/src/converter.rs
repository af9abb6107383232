use std::path::{Path, PathBuf};

use super::config::Config;
use super::error::ConvertError;
use super::file_stack::list_source_files;
use super::mapping::MappingTable;
use super::sde_writer::SdeWriter;
use super::source::SourceFile;
use super::worker_status::{Phase, ProgressStatus};

/// Outcome of a batch conversion
#[derive(Debug, Default)]
pub struct BatchReport {
    pub converted: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, ConvertError)>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

fn write_entries(
    source: &SourceFile,
    writer: &SdeWriter,
    table: &MappingTable,
) -> Result<(), ConvertError> {
    for entry in table.entries() {
        let record = entry.resolve(source)?;
        writer.write_record(&entry.destination(), &record)?;
    }
    Ok(())
}

/// Convert a single MAPS file to a Scientific Data Exchange file.
///
/// The SDE file is written next to the source (see [`Config::sde_file_name`]), replacing any
/// file already there. If any entry of the table cannot be resolved the partial SDE file is
/// removed and the error is returned. Returns the path of the SDE file.
pub fn convert_file(
    source_path: &Path,
    table: &MappingTable,
    config: &Config,
) -> Result<PathBuf, ConvertError> {
    let sde_path = config.sde_file_name(source_path)?;
    let source = SourceFile::open(source_path)?;
    let writer = SdeWriter::create(&sde_path)?;

    let result = match write_entries(&source, &writer, table) {
        Ok(()) => writer.close().map_err(ConvertError::from),
        Err(e) => {
            drop(writer);
            Err(e)
        }
    };
    drop(source);

    match result {
        Ok(()) => {
            let size = std::fs::metadata(&sde_path)?.len();
            spdlog::info!(
                "Wrote {} ({})",
                sde_path.display(),
                human_bytes::human_bytes(size as f64)
            );
            Ok(sde_path)
        }
        Err(e) => {
            if let Err(rm) = std::fs::remove_file(&sde_path) {
                spdlog::warn!(
                    "Could not remove partial file {}: {}",
                    sde_path.display(),
                    rm
                );
            }
            Err(e)
        }
    }
}

/// Convert every MAPS file in a directory.
///
/// Files are handled one at a time in name order. A file that fails is recorded in the
/// report and the batch moves on to the next file.
pub fn convert_directory(
    dir: &Path,
    table: &MappingTable,
    config: &Config,
    mut on_progress: impl FnMut(ProgressStatus),
) -> Result<BatchReport, ConvertError> {
    let files = list_source_files(dir, config)?;
    spdlog::info!("Found {} files in {}.", files.len(), dir.display());

    let mut report = BatchReport::default();
    for (idx, file) in files.iter().enumerate() {
        spdlog::info!("Converting {}", file.display());
        match convert_file(file, table, config) {
            Ok(sde_path) => report.converted.push(sde_path),
            Err(e) => {
                spdlog::error!("Failed to convert {}: {}", file.display(), e);
                report.failed.push((file.clone(), e));
            }
        }
        on_progress(ProgressStatus::new(
            idx + 1,
            files.len(),
            Phase::Converting,
            file,
        ));
    }

    if !report.is_success() {
        spdlog::warn!(
            "{} of {} files failed to convert.",
            report.failed.len(),
            files.len()
        );
    }
    Ok(report)
}
