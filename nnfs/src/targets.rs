//! Training labels.

use ndarray::prelude::*;

use crate::array_util::argmax_rows;
use crate::error::{NnfsError, Result};
use crate::Matrix;

/// Expected outputs for a batch of examples.
///
/// Classification labels can be given either as one class index per example
/// or as one-hot rows; losses and metrics accept both.
#[derive(Debug, Clone, PartialEq)]
pub enum Targets {
    /// `classes[i]` is the correct class of example `i`.
    Classes(Array1<usize>),
    /// Row `i` holds the expected output of example `i` (one-hot rows for
    /// classification, 0/1 columns for binary outputs).
    OneHot(Array2<f64>),
}

impl Targets {
    /// Number of examples.
    pub fn len(&self) -> usize {
        match self {
            Targets::Classes(c) => c.len(),
            Targets::OneHot(m) => m.nrows(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The targets of the examples at `indices`, in that order.
    pub fn select(&self, indices: &[usize]) -> Targets {
        match self {
            Targets::Classes(c) => Targets::Classes(c.select(Axis(0), indices)),
            Targets::OneHot(m) => Targets::OneHot(m.select(Axis(0), indices)),
        }
    }

    /// One class index per example. One-hot rows are decoded by argmax.
    pub fn class_indices(&self) -> Array1<usize> {
        match self {
            Targets::Classes(c) => c.clone(),
            Targets::OneHot(m) => argmax_rows(m.view()),
        }
    }

    /// Check that these targets can be compared with predictions that have
    /// `width` columns, without building the comparison matrix.
    pub(crate) fn check_width(&self, width: usize, operation: &'static str) -> Result<()> {
        match self {
            Targets::OneHot(m) => {
                if m.ncols() != width {
                    return Err(NnfsError::shape(operation, &[m.nrows(), width], m.shape()));
                }
            }
            Targets::Classes(classes) => {
                let limit = if width == 1 { 2 } else { width };
                if let Some(&bad) = classes.iter().find(|&&c| c >= limit) {
                    return Err(NnfsError::config(format!(
                        "{operation}: class index {bad} out of range for {width} output column(s)"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Expand into a matrix of shape `shape` to compare elementwise with
    /// predictions of that shape.
    ///
    /// Class indices become one-hot rows, except that for a single output
    /// column they are read as binary labels and must be 0 or 1.
    pub(crate) fn to_matrix(&self, shape: (usize, usize), operation: &'static str) -> Result<Matrix> {
        let (n, width) = shape;
        if self.len() != n {
            return Err(NnfsError::shape(operation, &[n], &[self.len()]));
        }
        self.check_width(width, operation)?;
        match self {
            Targets::OneHot(m) => Ok(m.clone()),
            Targets::Classes(classes) => {
                let mut m = Matrix::zeros(shape);
                if width == 1 {
                    for (i, &c) in classes.iter().enumerate() {
                        m[[i, 0]] = c as f64;
                    }
                } else {
                    for (i, &c) in classes.iter().enumerate() {
                        m[[i, c]] = 1.0;
                    }
                }
                Ok(m)
            }
        }
    }
}

impl From<Array1<usize>> for Targets {
    fn from(classes: Array1<usize>) -> Self {
        Targets::Classes(classes)
    }
}

impl From<Array2<f64>> for Targets {
    fn from(m: Array2<f64>) -> Self {
        Targets::OneHot(m)
    }
}
