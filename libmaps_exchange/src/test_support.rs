// Fixture files for unit tests, written with hdf5-rust directly so that the readers and
// writers under test are not used to build their own inputs.
use hdf5::types::VarLenUnicode;
use hdf5::{File, Group, H5Type};
use ndarray::{arr0, Array1, Array2, Array3, ArrayD, IxDyn};
use std::path::Path;
use std::str::FromStr;

const PV_COLUMNS: usize = 100;

fn require_group(file: &File, path: &str) -> hdf5::Result<Group> {
    let mut group = file.as_group()?;
    for part in path.split('/').filter(|p| !p.is_empty()) {
        group = match group.group(part) {
            Ok(g) => g,
            Err(_) => group.create_group(part)?,
        };
    }
    Ok(group)
}

fn unicode(s: &str) -> VarLenUnicode {
    VarLenUnicode::from_str(s).unwrap()
}

fn add_numeric(file: &File, path: &str, data: &ArrayD<f64>) -> hdf5::Result<()> {
    let (parent, name) = path.rsplit_once('/').unwrap();
    let dataset = require_group(file, parent)?
        .new_dataset_builder()
        .with_data(data)
        .create(name)?;
    dataset
        .new_attr::<VarLenUnicode>()
        .create("comments")?
        .write_scalar(&unicode(&format!("comments for {path}")))?;
    Ok(())
}

fn add_text(file: &File, path: &str, data: &ArrayD<String>) -> hdf5::Result<()> {
    let (parent, name) = path.rsplit_once('/').unwrap();
    let strings = data.map(|s| unicode(s));
    let dataset = require_group(file, parent)?
        .new_dataset_builder()
        .with_data(&strings)
        .create(name)?;
    dataset
        .new_attr::<VarLenUnicode>()
        .create("comments")?
        .write_scalar(&unicode(&format!("comments for {path}")))?;
    Ok(())
}

fn counting(shape: &[usize], offset: f64) -> ArrayD<f64> {
    let len: usize = shape.iter().product();
    ArrayD::from_shape_vec(IxDyn(shape), (0..len).map(|i| i as f64 + offset).collect()).unwrap()
}

fn names(prefix: &str, n: usize) -> ArrayD<String> {
    Array1::from_shape_fn(n, |i| format!("{prefix}_{i}")).into_dyn()
}

/// Write a MAPS-shaped file holding every path referenced by the bundled mapping table.
///
/// The angle is stored as text at `/MAPS/extra_pvs[1][98]`. If `missing` names one of the
/// paths it is left out of the file.
pub fn write_maps_fixture(path: &Path, angle: f64, missing: Option<&str>) -> hdf5::Result<()> {
    let file = File::create(path)?;
    let skip = |p: &str| missing == Some(p);

    let numeric: [(&str, Vec<usize>); 13] = [
        ("/MAPS/mca_arr", vec![8, 3, 2]),
        ("/exchange/x_axis", vec![3]),
        ("/exchange/y_axis", vec![2]),
        ("/MAPS/energy", vec![8]),
        ("/MAPS/scalers", vec![4, 3, 2]),
        ("/MAPS/energy_calib", vec![3]),
        ("/MAPS/XRF_fits", vec![5, 3, 2]),
        ("/MAPS/XRF_fits_quant", vec![5, 3]),
        ("/MAPS/XRF_roi", vec![5, 3, 2]),
        ("/MAPS/XRF_roi_quant", vec![5, 3]),
        ("/MAPS/XRF_roi_plus", vec![5, 3, 2]),
        ("/MAPS/XRF_roi_plus_quant", vec![5, 3]),
        ("/exchange/images", vec![2, 3, 2]),
    ];
    for (idx, (p, shape)) in numeric.iter().enumerate() {
        if !skip(*p) {
            add_numeric(&file, p, &counting(shape, angle + idx as f64))?;
        }
    }
    for p in ["/MAPS/ds_amp", "/MAPS/us_amp"] {
        if !skip(p) {
            add_numeric(&file, p, &arr0(2.0).into_dyn())?;
        }
    }

    let text: [(&str, ArrayD<String>); 6] = [
        ("/MAPS/scaler_units", names("cts", 4)),
        ("/MAPS/scaler_names", names("scaler", 4)),
        ("/MAPS/channel_units", names("ug/cm^2", 5)),
        ("/MAPS/channel_names", names("element", 5)),
        ("/exchange/images_units", names("cts", 2)),
        ("/exchange/images_names", names("image", 2)),
    ];
    for (p, data) in text.iter() {
        if !skip(*p) {
            add_text(&file, p, data)?;
        }
    }

    if !skip("/MAPS/extra_pvs") {
        let mut pvs = Array2::from_shape_fn((2, PV_COLUMNS), |(row, col)| {
            if row == 0 {
                format!("2xfm:pv{col}")
            } else {
                String::from("0")
            }
        });
        pvs[[1, 98]] = format!("{angle}");
        add_text(&file, "/MAPS/extra_pvs", &pvs.into_dyn())?;
    }
    Ok(())
}

/// Deterministic, non-zero data for an SDE fixture, distinct per angle
pub fn sde_data(angle: f64, shape: [usize; 3]) -> Array3<f64> {
    Array3::from_shape_fn((shape[0], shape[1], shape[2]), |(c, x, y)| {
        angle * 10_000.0 + (c * 1000 + x * 100 + y) as f64 + 1.0
    })
}

/// Write an SDE-shaped, single projection file: `/exchange/angle` plus a `data` dataset of
/// the given shape in each listed group
pub fn write_sde_fixture(path: &Path, angle: f64, groups: &[(&str, [usize; 3])]) -> hdf5::Result<()> {
    write_typed_sde_fixture(path, Some(angle), angle, groups, |v| v)
}

/// As write_sde_fixture, with `data` stored as `T` (each value of sde_data passed through
/// `cast`). With `angle` None the file has no `/exchange/angle`; `seed` still picks the data.
pub fn write_typed_sde_fixture<T: H5Type>(
    path: &Path,
    angle: Option<f64>,
    seed: f64,
    groups: &[(&str, [usize; 3])],
    cast: impl Fn(f64) -> T,
) -> hdf5::Result<()> {
    let file = File::create(path)?;
    let exchange = require_group(&file, "exchange")?;
    if let Some(angle) = angle {
        exchange
            .new_dataset_builder()
            .with_data(&arr0(angle))
            .create("angle")?;
    }
    for (group, shape) in groups {
        let group = require_group(&file, group)?;
        let data = group
            .new_dataset_builder()
            .with_data(&sde_data(seed, *shape).map(|v| cast(*v)))
            .create("data")?;
        data.new_attr::<VarLenUnicode>()
            .create("units")?
            .write_scalar(&unicode("counts"))?;
        data.new_attr::<VarLenUnicode>()
            .create("axes")?
            .write_scalar(&unicode("channel:y:x"))?;
        group
            .new_dataset_builder()
            .with_data(&counting(&[shape[1]], seed))
            .create("x_axis")?;
    }
    Ok(())
}
