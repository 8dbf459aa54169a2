//! Loss functions.

use ndarray::prelude::*;
use ndarray::Zip;

use crate::array_util::{clip_probabilities, mean};
use crate::error::Result;
use crate::layers::Softmax;
use crate::traits::{Differentiable, Loss, LossOutput};
use crate::{Matrix, Targets};

fn output(per_sample: Array1<f64>) -> LossOutput {
    let mean = mean(per_sample.view());
    LossOutput { per_sample, mean }
}

/// Categorical cross-entropy, `-Σ t·ln(p)` per example.
///
/// The predictions must be normalized, e.g. by a `Softmax` layer. They are
/// clipped away from 0 and 1 first, so a confident wrong answer costs a lot
/// but not infinity.
#[derive(Debug, Clone, Copy, Default)]
pub struct Cce;

impl Loss for Cce {
    fn name(&self) -> &'static str {
        "CCE"
    }

    fn forward(&self, predictions: ArrayView2<'_, f64>, targets: &Targets) -> Result<LossOutput> {
        let t = targets.to_matrix(predictions.dim(), "CCE::forward")?;
        let log_p = clip_probabilities(predictions).mapv_into(f64::ln);
        let per_sample = (t * log_p).sum_axis(Axis(1)).mapv_into(|v| -v);
        Ok(output(per_sample))
    }

    fn backward(&self, predictions: ArrayView2<'_, f64>, targets: &Targets) -> Result<Matrix> {
        let t = targets.to_matrix(predictions.dim(), "CCE::backward")?;
        let n = predictions.nrows() as f64;
        let p = clip_probabilities(predictions);
        Ok(Zip::from(&t).and(&p).map_collect(|&t, &p| -t / p / n))
    }
}

/// Softmax followed by categorical cross-entropy, as one loss.
///
/// The network's last layer should output raw scores (logits); this loss
/// normalizes them itself. The gradient of the pair collapses to
/// `(softmax(x) - t) / n`, which is both cheaper and better behaved than
/// running the softmax Jacobian on the CCE gradient.
#[derive(Debug, Clone, Copy, Default)]
pub struct CceSoftmax;

impl Loss for CceSoftmax {
    fn name(&self) -> &'static str {
        "CCESoftmax"
    }

    fn forward(&self, predictions: ArrayView2<'_, f64>, targets: &Targets) -> Result<LossOutput> {
        Cce.forward(Softmax.activate(predictions).view(), targets)
    }

    fn backward(&self, predictions: ArrayView2<'_, f64>, targets: &Targets) -> Result<Matrix> {
        let t = targets.to_matrix(predictions.dim(), "CCESoftmax::backward")?;
        let n = predictions.nrows() as f64;
        let mut dx = Softmax.activate(predictions);
        dx -= &t;
        dx /= n;
        Ok(dx)
    }
}

/// Binary cross-entropy, for outputs that are independent probabilities
/// (e.g. after a `Sigmoid` layer).
///
/// The loss of an example is the mean over its output columns of
/// `-(t·ln(p) + (1-t)·ln(1-p))`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryCrossEntropy;

impl Loss for BinaryCrossEntropy {
    fn name(&self) -> &'static str {
        "BinaryCrossEntropy"
    }

    fn forward(&self, predictions: ArrayView2<'_, f64>, targets: &Targets) -> Result<LossOutput> {
        let t = targets.to_matrix(predictions.dim(), "BinaryCrossEntropy::forward")?;
        let p = clip_probabilities(predictions);
        let elementwise = Zip::from(&t)
            .and(&p)
            .map_collect(|&t, &p| -(t * p.ln() + (1.0 - t) * (1.0 - p).ln()));
        let per_sample = match elementwise.mean_axis(Axis(1)) {
            Some(m) => m,
            // No output columns: nothing to lose.
            None => Array1::zeros(predictions.nrows()),
        };
        Ok(output(per_sample))
    }

    fn backward(&self, predictions: ArrayView2<'_, f64>, targets: &Targets) -> Result<Matrix> {
        let t = targets.to_matrix(predictions.dim(), "BinaryCrossEntropy::backward")?;
        let (n, outputs) = predictions.dim();
        let scale = (n * outputs) as f64;
        let p = clip_probabilities(predictions);
        Ok(Zip::from(&t)
            .and(&p)
            .map_collect(|&t, &p| -(t / p - (1.0 - t) / (1.0 - p)) / scale))
    }
}
