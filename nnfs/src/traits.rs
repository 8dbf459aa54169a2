use std::fmt::Debug;

use ndarray::prelude::*;

use crate::callback::Summary;
use crate::error::Result;
use crate::model::{FitConfig, History};
use crate::optimizers::ParamSet;
use crate::{Matrix, Metric, Targets};

/// One stage of a network.
///
/// Axis 0 of every matrix passed to or returned from a layer is the
/// mini-batch axis; axis 1 is the feature axis.
pub trait Layer: Debug + Send + Sync {
    /// Short name used in error messages and logs.
    fn name(&self) -> &'static str;

    /// For an input with `input_width` features per example, compute the
    /// number of output features, or fail if this layer can't accept that
    /// input.
    ///
    /// `None` means the width isn't known yet (the start of a network); layers
    /// that don't constrain their input just pass it through.
    fn output_width(&self, input_width: Option<usize>) -> Result<Option<usize>>;

    /// Compute the output of this layer for the batch `x` without recording
    /// anything for backpropagation.
    fn apply(&self, x: ArrayView2<'_, f64>) -> Result<Matrix>;

    /// Like `apply`, but also save whatever the next call to `backward` needs.
    fn forward(&mut self, x: ArrayView2<'_, f64>) -> Result<Matrix>;

    /// Given ∂L/∂y for the output of the last `forward` call, return ∂L/∂x.
    ///
    /// Layers with parameters also compute and keep ∂L/∂p, to be picked up by
    /// an optimizer through `parameters`. The cache saved by `forward` is
    /// consumed, so each forward pairs with exactly one backward.
    fn backward(&mut self, dy: ArrayView2<'_, f64>) -> Result<Matrix>;

    /// Number of learnable parameters.
    fn num_params(&self) -> usize {
        0
    }

    /// Borrow this layer's parameters together with their latest gradients.
    ///
    /// `key` identifies the parameter set to the optimizer, which keeps its
    /// accumulators per key. Layers without parameters return `Ok(None)`.
    fn parameters(&mut self, _key: usize) -> Result<Option<ParamSet<'_>>> {
        Ok(None)
    }

    /// Penalty term contributed by weight regularization, or `None` if this
    /// layer isn't regularized.
    fn regularization_loss(&self) -> Option<f64> {
        None
    }
}

/// A nonlinearity with no learnable parameters.
///
/// Implementors are plain functions of their input; the `Activation` layer
/// does the caching needed to turn one into a `Layer`.
pub trait Differentiable: Copy + Debug + Send + Sync {
    /// Name used by the wrapping layer.
    const NAME: &'static str;

    /// y = f(x).
    fn activate(&self, x: ArrayView2<'_, f64>) -> Matrix;

    /// Given the input `x`, the output `y = f(x)` and ∂L/∂y, return ∂L/∂x.
    fn gradient(
        &self,
        x: ArrayView2<'_, f64>,
        y: ArrayView2<'_, f64>,
        dy: ArrayView2<'_, f64>,
    ) -> Matrix;
}

/// The result of evaluating a loss function on one batch.
#[derive(Debug, Clone)]
pub struct LossOutput {
    /// Loss of each example.
    pub per_sample: Array1<f64>,
    /// Mean of `per_sample`.
    pub mean: f64,
}

pub trait Loss: Debug {
    fn name(&self) -> &'static str;

    fn forward(&self, predictions: ArrayView2<'_, f64>, targets: &Targets) -> Result<LossOutput>;

    /// Partial derivative of the mean loss with respect to each prediction.
    ///
    /// The result is already divided by the batch size, so layers must not
    /// normalize again.
    fn backward(&self, predictions: ArrayView2<'_, f64>, targets: &Targets) -> Result<Matrix>;
}

/// A rule for turning gradients into parameter updates.
pub trait Optimizer: Debug {
    /// Learning rate that the next `update` will use, after decay.
    fn learning_rate(&self) -> f64;

    /// Number of completed `post_update` calls.
    fn iterations(&self) -> usize;

    /// Call once per training step, before updating any parameter set.
    fn pre_update(&mut self);

    /// Update one parameter set in place.
    fn update(&mut self, params: ParamSet<'_>) -> Result<()>;

    /// Call once per training step, after every parameter set was updated.
    fn post_update(&mut self);

    /// Forget all accumulated state, as if freshly constructed.
    fn reset(&mut self);
}

/// Observer notified by the training loop after every epoch.
pub trait Callback {
    /// Return `Ok(false)` to stop training once this epoch is done.
    fn on_epoch_end(&mut self, epoch: usize, summary: &Summary) -> Result<bool>;
}

pub trait Model {
    /// Run the network on a batch of examples.
    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Matrix>;

    /// Train on the given data set.
    fn fit(
        &mut self,
        x: ArrayView2<'_, f64>,
        targets: &Targets,
        config: &FitConfig,
        callbacks: &mut [&mut dyn Callback],
    ) -> Result<History>;

    /// Loss (and the requested metrics) on a data set, without training.
    fn evaluate(&self, x: ArrayView2<'_, f64>, targets: &Targets, metrics: &[Metric]) -> Result<Summary>;
}
