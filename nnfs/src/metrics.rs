//! Scores for judging a model's predictions. None of these affect training.

use ndarray::prelude::*;
use ndarray::Zip;

use crate::array_util::argmax_rows;
use crate::error::{NnfsError, Result};
use crate::Targets;

/// Predicted class of each example: the index of the largest value in its
/// row.
pub fn one_hot_decode(predictions: ArrayView2<'_, f64>) -> Array1<usize> {
    argmax_rows(predictions)
}

/// Fraction of examples whose predicted class is the target class.
///
/// Returns 0 for an empty batch.
pub fn accuracy(predictions: ArrayView2<'_, f64>, targets: &Targets) -> Result<f64> {
    let n = predictions.nrows();
    if targets.len() != n {
        return Err(NnfsError::shape("accuracy", &[n], &[targets.len()]));
    }
    if n == 0 {
        return Ok(0.0);
    }
    let predicted = one_hot_decode(predictions);
    let expected = targets.class_indices();
    let mut num_good = 0;
    Zip::from(&predicted).and(&expected).for_each(|p, e| {
        if p == e {
            num_good += 1;
        }
    });
    Ok(num_good as f64 / n as f64)
}

/// Fraction of outputs on the right side of 0.5, for networks whose outputs
/// are independent yes/no probabilities.
pub fn binary_accuracy(predictions: ArrayView2<'_, f64>, targets: &Targets) -> Result<f64> {
    let t = targets.to_matrix(predictions.dim(), "binary_accuracy")?;
    if t.is_empty() {
        return Ok(0.0);
    }
    let mut num_good = 0;
    Zip::from(predictions).and(&t).for_each(|&p, &t| {
        if (p > 0.5) == (t > 0.5) {
            num_good += 1;
        }
    });
    Ok(num_good as f64 / t.len() as f64)
}

/// A metric that training can record in every epoch summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    Accuracy,
    BinaryAccuracy,
}

impl Metric {
    /// Key under which the value appears in a `Summary`.
    pub fn name(self) -> &'static str {
        match self {
            Metric::Accuracy => "accuracy",
            Metric::BinaryAccuracy => "binary_accuracy",
        }
    }

    pub fn compute(self, predictions: ArrayView2<'_, f64>, targets: &Targets) -> Result<f64> {
        match self {
            Metric::Accuracy => accuracy(predictions, targets),
            Metric::BinaryAccuracy => binary_accuracy(predictions, targets),
        }
    }
}
