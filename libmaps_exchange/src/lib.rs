//! # maps_exchange
//!
//! maps_exchange converts the per-scan HDF5 files written by the MAPS X-ray fluorescence
//! analysis software into the Scientific Data Exchange (SDE) layout, and merges a
//! directory of single-projection SDE files into one theta stack ordered by the angle at
//! which each projection was taken.
//!
//! ## Installation
//!
//! The only method of install is from source, which is laid out below.
//!
//! ### Rust
//!
//! If you have not used Rust before, you will most likely need to install the Rust tool
//! chain. See the [Rust docs](https://www.rust-lang.org/tools/install) for installation
//! instructions.
//!
//! ### HDF5
//!
//! Before building and running maps_exchange, HDF5 must be installed. Typically this will
//! be installed using a package manager (homebrew, apt, etc), and the Rust libraries will
//! auto detect the location of the HDF install. If HDF5 lives in a custom location, write
//! the following snippet into the file `.cargo/config.toml` in the repository:
//!
//! ```toml
//! [env]
//! HDF5_DIR="/path/to/my/hdf5/install/"
//!
//! [build]
//! rustflags="-C link-args=-Wl,-rpath,/path/to/my/hdf5/install/lib"
//! ```
//!
//! ### Building & Install
//!
//! To build and install the CLI use `cargo install --path ./maps_exchange_cli` from the top
//! level of the repository. To use the CLI see the `maps_exchange_cli` README.
//!
//! ## Configuration
//!
//! A configuration file is optional; without one the standard MAPS/SDE conventions are
//! used. The YAML format of a configuration file is as follows:
//!
//! ```yml
//! mapping_path: null
//! sde_suffix: _SDE
//! extension: h5
//! stack_prefix: exchange
//! data_name: data
//! angle_group: exchange
//! angle_name: angle
//! angles_name: angles
//! stack_compression: 4
//! ```
//!
//! If `mapping_path` is `null` the bundled mapping table is used.
//!
//! ### Mapping Table Format
//!
//! The mapping table is a YAML list. Each entry describes one output dataset:
//!
//! ```yml
//! - group: exchange
//!   entry_type: data
//!   field: data
//!   root: exchange
//!   value: { kind: direct_value, path: /MAPS/mca_arr }
//!   units: { kind: constant, value: counts }
//!   description: { kind: attribute_value, path: /MAPS/mca_arr, name: comments }
//!   axes: energy:y:x
//!   write_options: { compression: 4 }
//! ```
//!
//! `value`, `units` and `description` are sources: a `constant`, a `direct_value` read
//! from a dataset (optionally narrowed with an `index`), or an `attribute_value` read
//! from an attribute. `entry_type: amplifier` entries are written under
//! `<root>/amplifier` with `instrument` as the default root.
//!
//! ## Output
//!
//! ```text
//! scan_SDE.h5 - version, created, implements
//! exchange
//! |---- title, data, x_axis, y_axis, energy, scalers, scaler_names, fit_parameters, angle
//! exchange_N
//! |---- title, data, x_axis, y_axis, channel_names, channel_units, fit_parameters
//! instrument
//! |---- amplifier
//! |    |---- name, ds_amplifier, us_amplifier
//! ```
//!
//! Datasets carry `units`, `description` and `axes` attributes where the table gives them.
//! In a theta stack every `exchange*/data` gains a leading `stack` dimension and an
//! `exchange*/angles` dataset lists the angle of each slice.
pub mod config;
pub mod converter;
pub mod error;
pub mod file_stack;
pub mod mapping;
pub mod sde_writer;
pub mod source;
pub mod stack;
pub mod value;
pub mod worker_status;

#[cfg(test)]
mod test_support;
