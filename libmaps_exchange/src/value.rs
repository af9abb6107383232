use hdf5::types::{FixedAscii, FixedUnicode, TypeDescriptor, VarLenAscii, VarLenUnicode};
use hdf5::Container;
use ndarray::{ArrayD, Axis};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::error::SourceError;

/// Fixed-length strings are widened (or truncated) to this many bytes on read
const FIXED_STRING_LEN: usize = 256;

/// A literal stored directly in the mapping table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Number(f64),
    Text(String),
}

/// A datum read from (or destined for) an HDF5 file.
///
/// Every numeric type is widened to f64 and every string flavour becomes a String. Scalars
/// are 0-dimensional arrays.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Numeric(ArrayD<f64>),
    Text(ArrayD<String>),
}

impl From<&Literal> for Value {
    fn from(literal: &Literal) -> Self {
        match literal {
            Literal::Number(n) => Value::Numeric(ArrayD::from_elem(vec![], *n)),
            Literal::Text(s) => Value::Text(ArrayD::from_elem(vec![], s.clone())),
        }
    }
}

impl Value {
    pub fn shape(&self) -> &[usize] {
        match self {
            Value::Numeric(a) => a.shape(),
            Value::Text(a) => a.shape(),
        }
    }

    pub fn is_scalar(&self) -> bool {
        self.shape().is_empty()
    }

    /// Apply a secondary index to the value, peeling one leading axis per index component.
    ///
    /// An index as long as the number of dimensions yields a scalar; a shorter one yields a
    /// sub-array.
    pub fn select(&self, index: &[usize], path: &str) -> Result<Value, SourceError> {
        let bad_index = || SourceError::BadIndex {
            path: path.to_string(),
            index: index.to_vec(),
            shape: self.shape().to_vec(),
        };
        match self {
            Value::Numeric(a) => select_array(a, index).map(Value::Numeric).ok_or_else(bad_index),
            Value::Text(a) => select_array(a, index).map(Value::Text).ok_or_else(bad_index),
        }
    }

    /// Interpret the value as a single number. Text is parsed, so instrument metadata stored
    /// as strings (e.g. process variables) is accepted.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Numeric(a) if a.len() == 1 => a.iter().next().copied(),
            Value::Text(a) if a.len() == 1 => a.iter().next()?.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Interpret the value as a single string
    pub fn as_text(&self) -> Option<String> {
        match self {
            Value::Text(a) if a.len() == 1 => a.iter().next().cloned(),
            Value::Numeric(a) if a.len() == 1 => a.iter().next().map(|n| n.to_string()),
            _ => None,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.as_text() {
            Some(s) => write!(f, "{s}"),
            None => write!(f, "<array of shape {:?}>", self.shape()),
        }
    }
}

fn select_array<T: Clone>(array: &ArrayD<T>, index: &[usize]) -> Option<ArrayD<T>> {
    let mut view = array.view();
    for &i in index {
        if view.ndim() == 0 || i >= view.len_of(Axis(0)) {
            return None;
        }
        view = view.index_axis_move(Axis(0), i);
    }
    Some(view.to_owned())
}

/// Read a dataset or attribute into a Value by inspecting its stored type
pub(crate) fn read_container(
    container: &Container,
    path: &str,
    file: &Path,
) -> Result<Value, SourceError> {
    let value = match container.dtype()?.to_descriptor()? {
        TypeDescriptor::Integer(_) | TypeDescriptor::Unsigned(_) | TypeDescriptor::Float(_) => {
            Value::Numeric(container.read_dyn::<f64>()?)
        }
        TypeDescriptor::VarLenUnicode => Value::Text(
            container
                .read_dyn::<VarLenUnicode>()?
                .map(|s| s.as_str().to_string()),
        ),
        TypeDescriptor::VarLenAscii => Value::Text(
            container
                .read_dyn::<VarLenAscii>()?
                .map(|s| s.as_str().to_string()),
        ),
        TypeDescriptor::FixedAscii(_) => Value::Text(
            container
                .read_dyn::<FixedAscii<FIXED_STRING_LEN>>()?
                .map(|s| s.as_str().to_string()),
        ),
        TypeDescriptor::FixedUnicode(_) => Value::Text(
            container
                .read_dyn::<FixedUnicode<FIXED_STRING_LEN>>()?
                .map(|s| s.as_str().to_string()),
        ),
        _ => {
            return Err(SourceError::UnsupportedType {
                path: path.to_string(),
                file: file.to_path_buf(),
            })
        }
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr2, ArrayD, IxDyn};

    #[test]
    fn test_select_scalar_from_matrix() {
        let pvs = arr2(&[
            [String::from("name_a"), String::from("name_b")],
            [String::from("1.5"), String::from("45.25")],
        ])
        .into_dyn();
        let value = Value::Text(pvs);
        let selected = value.select(&[1, 1], "/MAPS/extra_pvs").unwrap();
        assert!(selected.is_scalar());
        assert_eq!(selected.as_f64(), Some(45.25));
    }

    #[test]
    fn test_select_row() {
        let data = ArrayD::from_shape_vec(IxDyn(&[2, 3]), vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0])
            .unwrap();
        let row = Value::Numeric(data).select(&[1], "/x").unwrap();
        assert_eq!(row.shape(), &[3]);
        match row {
            Value::Numeric(a) => assert_eq!(a.iter().copied().collect::<Vec<_>>(), [3.0, 4.0, 5.0]),
            Value::Text(_) => panic!(),
        }
    }

    #[test]
    fn test_select_out_of_range() {
        let data = ArrayD::from_elem(IxDyn(&[2, 3]), 0.0);
        let result = Value::Numeric(data).select(&[1, 98], "/MAPS/extra_pvs");
        match result {
            Err(SourceError::BadIndex { index, shape, .. }) => {
                assert_eq!(index, vec![1, 98]);
                assert_eq!(shape, vec![2, 3]);
            }
            _ => panic!(),
        }
    }

    #[test]
    fn test_literal_conversion() {
        let value = Value::from(&Literal::Text(String::from("XSD/2-ID-E")));
        assert!(value.is_scalar());
        assert_eq!(value.as_text().as_deref(), Some("XSD/2-ID-E"));
        assert_eq!(value.as_f64(), None);
        let value = Value::from(&Literal::Number(2.5));
        assert_eq!(value.as_f64(), Some(2.5));
    }
}
