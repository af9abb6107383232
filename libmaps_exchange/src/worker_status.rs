use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Converting,
    Discovering,
    Stacking,
}

/// Progress through a batch operation, reported after each file is handled
#[derive(Debug, Clone, Default)]
pub struct ProgressStatus {
    pub progress: f32,
    pub phase: Phase,
    pub file: PathBuf,
}

impl ProgressStatus {
    pub fn new(done: usize, total: usize, phase: Phase, file: &Path) -> Self {
        let progress = if total == 0 {
            1.0
        } else {
            done as f32 / total as f32
        };
        Self {
            progress,
            phase,
            file: file.to_path_buf(),
        }
    }
}
