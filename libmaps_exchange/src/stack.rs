use fxhash::FxHashSet;
use hdf5::types::{FloatSize, IntSize, TypeDescriptor};
use hdf5::H5Type;
use ndarray::Ix3;
use std::path::{Path, PathBuf};

use super::config::Config;
use super::error::{SourceError, StackError};
use super::file_stack::list_sde_files;
use super::sde_writer::{
    SdeWriter, StackDataset, StackMetadata, AXES_ATTR, DESCRIPTION_ATTR, UNITS_ATTR,
};
use super::source::SourceFile;
use super::value::Value;
use super::worker_status::{Phase, ProgressStatus};

/// Shape of one file's data in a group: (channels, x, y)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SliceShape {
    pub channels: usize,
    pub x: usize,
    pub y: usize,
}

impl SliceShape {
    /// Build from a dataset shape, which must have exactly three dimensions
    pub fn from_dims(dims: &[usize]) -> Option<Self> {
        match dims {
            [channels, x, y] => Some(Self {
                channels: *channels,
                x: *x,
                y: *y,
            }),
            _ => None,
        }
    }

    pub fn as_array(&self) -> [usize; 3] {
        [self.channels, self.x, self.y]
    }
}

impl std::fmt::Display for SliceShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.channels, self.x, self.y)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AngleEntry {
    pub angle: f64,
    pub path: PathBuf,
}

/// The input files ordered by acquisition angle, strictly ascending
#[derive(Debug, Clone, Default)]
pub struct AngleIndex {
    entries: Vec<AngleEntry>,
}

impl AngleIndex {
    /// Read the angle of every file, opening one file at a time
    pub fn discover(
        inputs: &[PathBuf],
        config: &Config,
        on_progress: &mut dyn FnMut(ProgressStatus),
    ) -> Result<Self, StackError> {
        let angle_path = config.angle_path();
        let mut entries = Vec::with_capacity(inputs.len());
        for (idx, path) in inputs.iter().enumerate() {
            let source = SourceFile::open(path)?;
            let value = source.read_value(&angle_path).map_err(|e| match e {
                SourceError::MissingField { .. } => StackError::MissingGroup {
                    group: config.angle_group.clone(),
                    file: path.clone(),
                },
                e => StackError::from(e),
            })?;
            let angle = value
                .as_f64()
                .filter(|a| a.is_finite())
                .ok_or_else(|| StackError::InvalidAngle {
                    file: path.clone(),
                    value: value.to_string(),
                })?;
            spdlog::debug!("{} was taken at {} degrees", path.display(), angle);
            entries.push(AngleEntry {
                angle,
                path: path.clone(),
            });
            on_progress(ProgressStatus::new(
                idx + 1,
                inputs.len(),
                Phase::Discovering,
                path,
            ));
        }
        Self::from_entries(entries)
    }

    /// Sort entries by angle. Two files at the same angle are an error
    pub fn from_entries(mut entries: Vec<AngleEntry>) -> Result<Self, StackError> {
        entries.sort_by(|a, b| a.angle.total_cmp(&b.angle));
        if let Some(pair) = entries.windows(2).find(|w| w[0].angle == w[1].angle) {
            return Err(StackError::DuplicateAngle {
                angle: pair[0].angle,
                first: pair[0].path.clone(),
                second: pair[1].path.clone(),
            });
        }
        Ok(Self { entries })
    }

    pub fn angles(&self) -> Vec<f64> {
        self.entries.iter().map(|e| e.angle).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AngleEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Result of assembling a stack
#[derive(Debug, Clone, Default)]
pub struct StackSummary {
    pub depth: usize,
    pub angles: Vec<f64>,
    pub groups: Vec<(String, SliceShape)>,
}

/// Pick the slice shape of a group from the shapes of every file.
///
/// Identical shapes are used as they are. Otherwise the x and y bounds are the largest seen,
/// and every file must have the same number of channels.
pub fn reconcile_shapes(
    group: &str,
    shapes: &[(PathBuf, SliceShape)],
) -> Result<Option<SliceShape>, StackError> {
    let Some((_, first)) = shapes.first() else {
        return Ok(None);
    };
    let distinct: FxHashSet<SliceShape> = shapes.iter().map(|(_, s)| *s).collect();
    if distinct.len() == 1 {
        return Ok(Some(*first));
    }

    let mut bound = *first;
    for (path, shape) in shapes {
        if shape.channels != first.channels {
            return Err(StackError::ChannelMismatch {
                group: group.to_string(),
                file: path.clone(),
                expected: first.channels,
                found: shape.channels,
            });
        }
        bound.x = bound.x.max(shape.x);
        bound.y = bound.y.max(shape.y);
    }
    spdlog::warn!(
        "Group {} has {} distinct shapes; padding every slice to {}",
        group,
        distinct.len(),
        bound
    );
    Ok(Some(bound))
}

fn missing_group(group: &str, file: &Path) -> StackError {
    StackError::MissingGroup {
        group: group.to_string(),
        file: file.to_path_buf(),
    }
}

/// Shape of every file's data in a group, one file open at a time
fn discover_shapes(
    index: &AngleIndex,
    group: &str,
    node: &str,
) -> Result<Vec<(PathBuf, SliceShape)>, StackError> {
    let mut shapes = Vec::with_capacity(index.len());
    for entry in index.iter() {
        let source = SourceFile::open(&entry.path)?;
        if !source.has_dataset(node) {
            return Err(missing_group(group, &entry.path));
        }
        let dims = source.shape(node)?;
        let shape = SliceShape::from_dims(&dims).ok_or_else(|| StackError::BadShape {
            group: group.to_string(),
            file: entry.path.clone(),
            shape: dims.clone(),
        })?;
        shapes.push((entry.path.clone(), shape));
    }
    Ok(shapes)
}

fn optional_attribute(
    source: &SourceFile,
    node: &str,
    name: &str,
) -> Result<Option<Value>, StackError> {
    match source.read_attribute(node, name) {
        Ok(value) => Ok(Some(value)),
        Err(SourceError::MissingField { .. }) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Element type and attributes of a per-file dataset, carried over to the stack
pub fn read_stack_metadata(source: &SourceFile, node: &str) -> Result<StackMetadata, StackError> {
    let dtype = source.dataset(node)?.dtype()?.to_descriptor()?;
    Ok(StackMetadata {
        dtype,
        units: optional_attribute(source, node, UNITS_ATTR)?,
        description: optional_attribute(source, node, DESCRIPTION_ATTR)?,
        axes: optional_attribute(source, node, AXES_ATTR)?.and_then(|v| v.as_text()),
    })
}

/// Everything needed to write one stacked group, gathered before the output is touched
#[derive(Debug)]
struct GroupPlan {
    group: String,
    node: String,
    shape: SliceShape,
    metadata: StackMetadata,
}

/// Discover and reconcile the shapes of a group and read the metadata it carries over
fn plan_group(
    group: &str,
    index: &AngleIndex,
    first_input: &Path,
    config: &Config,
) -> Result<GroupPlan, StackError> {
    let node = format!("/{}/{}", group, config.data_name);
    let shapes = discover_shapes(index, group, &node)?;
    let shape =
        reconcile_shapes(group, &shapes)?.ok_or_else(|| missing_group(group, first_input))?;
    let metadata = {
        let first = SourceFile::open(first_input)?;
        read_stack_metadata(&first, &node)?
    };
    Ok(GroupPlan {
        group: group.to_string(),
        node,
        shape,
        metadata,
    })
}

type FillFn = fn(
    &StackDataset,
    &AngleIndex,
    &str,
    &mut dyn FnMut(ProgressStatus),
) -> Result<(), StackError>;

/// Copy each file's array into its slice, reading it in the stack's own element type
fn fill_stack<T: H5Type>(
    stack: &StackDataset,
    index: &AngleIndex,
    node: &str,
    on_progress: &mut dyn FnMut(ProgressStatus),
) -> Result<(), StackError> {
    for (rank, entry) in index.iter().enumerate() {
        let source = SourceFile::open(&entry.path)?;
        let data = source
            .dataset(node)?
            .read_dyn::<T>()?
            .into_dimensionality::<Ix3>()?;
        stack.write_slice(rank, &data)?;
        on_progress(ProgressStatus::new(
            rank + 1,
            index.len(),
            Phase::Stacking,
            &entry.path,
        ));
    }
    Ok(())
}

/// Replace `group/data` in the output with the stack of every file's `group/data`, and write
/// the angles alongside it
fn write_group(
    writer: &SdeWriter,
    plan: &GroupPlan,
    index: &AngleIndex,
    config: &Config,
    on_progress: &mut dyn FnMut(ProgressStatus),
) -> Result<(), StackError> {
    let stack = writer.create_stack(
        &plan.group,
        &config.data_name,
        plan.shape.as_array(),
        &plan.metadata,
        config.stack_compression,
    )?;
    stack.resize(index.len())?;
    spdlog::info!(
        "Stacking {} files into {}/{} with slice shape {}",
        index.len(),
        plan.group,
        config.data_name,
        plan.shape
    );

    let fill: FillFn = match &plan.metadata.dtype {
        TypeDescriptor::Float(FloatSize::U4) => fill_stack::<f32>,
        TypeDescriptor::Integer(IntSize::U1) => fill_stack::<i8>,
        TypeDescriptor::Integer(IntSize::U2) => fill_stack::<i16>,
        TypeDescriptor::Integer(IntSize::U4) => fill_stack::<i32>,
        TypeDescriptor::Integer(IntSize::U8) => fill_stack::<i64>,
        TypeDescriptor::Unsigned(IntSize::U1) => fill_stack::<u8>,
        TypeDescriptor::Unsigned(IntSize::U2) => fill_stack::<u16>,
        TypeDescriptor::Unsigned(IntSize::U4) => fill_stack::<u32>,
        TypeDescriptor::Unsigned(IntSize::U8) => fill_stack::<u64>,
        _ => fill_stack::<f64>,
    };
    fill(&stack, index, &plan.node, on_progress)?;

    writer.write_angles(&plan.group, &config.angles_name, &index.angles())?;
    Ok(())
}

/// Groups of the first file that take part in stacking
fn stackable_groups(first_input: &Path, config: &Config) -> Result<Vec<String>, StackError> {
    let source = SourceFile::open(first_input)?;
    let groups = source
        .root_groups()?
        .into_iter()
        .filter(|g| config.is_stackable(g))
        .filter(|g| source.has_dataset(&format!("/{}/{}", g, config.data_name)))
        .collect();
    Ok(groups)
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// The validated inputs of a non-empty stack
struct StackPlan<'a> {
    first_input: &'a Path,
    index: AngleIndex,
    groups: Vec<GroupPlan>,
}

/// Read every input and check it can be stacked. Nothing is written.
fn plan_stack<'a>(
    inputs: &'a [PathBuf],
    config: &Config,
    on_progress: &mut dyn FnMut(ProgressStatus),
) -> Result<Option<StackPlan<'a>>, StackError> {
    let Some(first_input) = inputs.first() else {
        return Ok(None);
    };
    let index = AngleIndex::discover(inputs, config, on_progress)?;
    let groups = stackable_groups(first_input, config)?
        .iter()
        .map(|group| plan_group(group, &index, first_input, config))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Some(StackPlan {
        first_input,
        index,
        groups,
    }))
}

fn write_stack(
    plan: Option<StackPlan>,
    output: &Path,
    config: &Config,
    on_progress: &mut dyn FnMut(ProgressStatus),
) -> Result<StackSummary, StackError> {
    let Some(plan) = plan else {
        spdlog::warn!("No files to stack; writing an empty file");
        SdeWriter::create(output)?.close()?;
        return Ok(StackSummary::default());
    };

    SdeWriter::copy_file(plan.first_input, output)?;
    let writer = SdeWriter::open(output)?;
    for group in plan.groups.iter() {
        write_group(&writer, group, &plan.index, config, on_progress)?;
    }
    writer.close()?;
    Ok(StackSummary {
        depth: plan.index.len(),
        angles: plan.index.angles(),
        groups: plan
            .groups
            .into_iter()
            .map(|g| (g.group, g.shape))
            .collect(),
    })
}

/// Merge single projection SDE files into one theta stack.
///
/// `inputs[0]` is copied to `output` and serves as the template: every group whose name
/// starts with the stack prefix and holds a data dataset has that dataset replaced by a
/// `(files, channels, x, y)` stack ordered by ascending angle. Files smaller than the largest
/// x or y are placed in the low corner of their slice; the rest of the slice stays zero.
/// Anything else in the template is left as it was.
///
/// Every input is checked before `output` is touched, so a rejected input set leaves an
/// existing `output` as it was. A failure while writing removes the partial file.
pub fn assemble_stack(
    inputs: &[PathBuf],
    output: &Path,
    config: &Config,
    mut on_progress: impl FnMut(ProgressStatus),
) -> Result<StackSummary, StackError> {
    if let Some(input) = inputs.iter().find(|i| same_file(i, output)) {
        return Err(StackError::OutputIsInput(input.clone()));
    }

    let plan = plan_stack(inputs, config, &mut on_progress)?;
    match write_stack(plan, output, config, &mut on_progress) {
        Ok(summary) => {
            let size = std::fs::metadata(output)?.len();
            spdlog::info!(
                "Wrote stack of depth {} with {} groups to {} ({})",
                summary.depth,
                summary.groups.len(),
                output.display(),
                human_bytes::human_bytes(size as f64)
            );
            Ok(summary)
        }
        Err(e) => {
            if output.exists() {
                if let Err(rm) = std::fs::remove_file(output) {
                    spdlog::warn!(
                        "Could not remove partial file {}: {}",
                        output.display(),
                        rm
                    );
                }
            }
            Err(e)
        }
    }
}

/// Stack every SDE file in a directory. The output is never taken as an input, even when it
/// lives in the same directory.
pub fn stack_directory(
    dir: &Path,
    output: &Path,
    config: &Config,
    on_progress: impl FnMut(ProgressStatus),
) -> Result<StackSummary, StackError> {
    let inputs: Vec<PathBuf> = list_sde_files(dir, config)?
        .into_iter()
        .filter(|p| !same_file(p, output))
        .collect();
    spdlog::info!("Found {} SDE files in {}.", inputs.len(), dir.display());
    assemble_stack(&inputs, output, config, on_progress)
}
