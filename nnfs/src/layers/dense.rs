use ndarray::prelude::*;
use ndarray::Zip;
use ndarray_rand::rand_distr::StandardNormal;
use ndarray_rand::RandomExt;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::array_util::sum_rows;
use crate::error::{check_shape, NnfsError, Result};
use crate::optimizers::ParamSet;
use crate::{Layer, Matrix};

/// L1/L2 penalty coefficients for a `Dense` layer. All zero by default.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Regularization {
    pub l1_weights: f64,
    pub l2_weights: f64,
    pub l1_bias: f64,
    pub l2_bias: f64,
}

impl Regularization {
    fn is_zero(&self) -> bool {
        *self == Regularization::default()
    }
}

#[derive(Debug, Clone)]
struct Gradients {
    weights: Array2<f64>,
    bias: Array1<f64>,
}

/// A fully connected layer: `y = x · W + b`.
#[derive(Debug, Clone)]
pub struct Dense {
    /// Shape `(ni, no)`: number of inputs by number of cells.
    weights: Array2<f64>,
    /// One per cell; added to every row of the output.
    bias: Array1<f64>,
    regularization: Regularization,
    /// Input of the last `forward` call, waiting for `backward`.
    input: Option<Matrix>,
    /// ∂L/∂W and ∂L/∂b from the last `backward` call.
    gradients: Option<Gradients>,
}

impl Dense {
    /// A layer with `num_inputs` inputs and `num_outputs` cells, with random
    /// weights.
    ///
    /// Weights are drawn from a normal distribution with variance
    /// `2 / num_inputs`, so activations keep roughly the same scale from layer
    /// to layer. Biases start at zero.
    ///
    /// *Panics* if either size is zero.
    pub fn new(num_inputs: usize, num_outputs: usize) -> Self {
        Self::random(num_inputs, num_outputs, &mut rand::thread_rng())
    }

    /// Like `new`, but the initial weights are a function of `seed`.
    pub fn seeded(num_inputs: usize, num_outputs: usize, seed: u64) -> Self {
        Self::random(num_inputs, num_outputs, &mut StdRng::seed_from_u64(seed))
    }

    fn random<R: Rng + ?Sized>(num_inputs: usize, num_outputs: usize, rng: &mut R) -> Self {
        assert!(num_inputs > 0 && num_outputs > 0, "Dense layer sizes must be nonzero");
        let scale = (2.0 / num_inputs as f64).sqrt();
        let weights = Array2::<f64>::random_using((num_inputs, num_outputs), StandardNormal, rng) * scale;
        Self::build(weights, Array1::zeros(num_outputs))
    }

    /// A layer with the given weights, shape `(num_inputs, num_outputs)`, and
    /// bias, length `num_outputs`.
    pub fn from_parameters(weights: Array2<f64>, bias: Array1<f64>) -> Result<Self> {
        check_shape("Dense::from_parameters bias", &[weights.ncols()], bias.shape())?;
        if weights.is_empty() {
            return Err(NnfsError::config("Dense layer sizes must be nonzero"));
        }
        Ok(Self::build(weights, bias))
    }

    fn build(weights: Array2<f64>, bias: Array1<f64>) -> Self {
        Dense {
            weights,
            bias,
            regularization: Regularization::default(),
            input: None,
            gradients: None,
        }
    }

    /// Penalize large parameters.
    ///
    /// *Panics* if any coefficient is negative.
    pub fn with_regularization(mut self, regularization: Regularization) -> Self {
        let Regularization {
            l1_weights,
            l2_weights,
            l1_bias,
            l2_bias,
        } = regularization;
        assert!(
            [l1_weights, l2_weights, l1_bias, l2_bias]
                .iter()
                .all(|&c| c >= 0.0),
            "regularization coefficients must be non-negative"
        );
        self.regularization = regularization;
        self
    }

    /// `(num_inputs, num_outputs)`.
    pub fn shape(&self) -> (usize, usize) {
        self.weights.dim()
    }

    pub fn weights(&self) -> ArrayView2<'_, f64> {
        self.weights.view()
    }

    pub fn bias(&self) -> ArrayView1<'_, f64> {
        self.bias.view()
    }

    pub fn regularization(&self) -> Regularization {
        self.regularization
    }

    pub fn set_weights(&mut self, weights: Array2<f64>) -> Result<()> {
        check_shape("Dense::set_weights", self.weights.shape(), weights.shape())?;
        self.weights = weights;
        Ok(())
    }

    pub fn set_bias(&mut self, bias: Array1<f64>) -> Result<()> {
        check_shape("Dense::set_bias", self.bias.shape(), bias.shape())?;
        self.bias = bias;
        Ok(())
    }

    /// ∂L/∂W from the last backward pass, including any regularization term.
    pub fn weight_gradient(&self) -> Option<ArrayView2<'_, f64>> {
        self.gradients.as_ref().map(|g| g.weights.view())
    }

    /// ∂L/∂b from the last backward pass, including any regularization term.
    pub fn bias_gradient(&self) -> Option<ArrayView1<'_, f64>> {
        self.gradients.as_ref().map(|g| g.bias.view())
    }
}

/// Add the derivative of `l1 * Σ|p| + l2 * Σp²` to `grad`.
fn add_penalty_gradient<D: Dimension>(
    grad: &mut Array<f64, D>,
    params: &Array<f64, D>,
    l1: f64,
    l2: f64,
) {
    if l1 == 0.0 && l2 == 0.0 {
        return;
    }
    Zip::from(grad).and(params).for_each(|g, &p| {
        let sign = if p < 0.0 { -1.0 } else { 1.0 };
        *g += l1 * sign + 2.0 * l2 * p;
    });
}

fn penalty<D: Dimension>(params: &Array<f64, D>, l1: f64, l2: f64) -> f64 {
    let mut total = 0.0;
    if l1 > 0.0 {
        total += l1 * params.iter().map(|p| p.abs()).sum::<f64>();
    }
    if l2 > 0.0 {
        total += l2 * params.iter().map(|p| p * p).sum::<f64>();
    }
    total
}

impl Layer for Dense {
    fn name(&self) -> &'static str {
        "Dense"
    }

    fn output_width(&self, input_width: Option<usize>) -> Result<Option<usize>> {
        let (ni, no) = self.shape();
        if let Some(w) = input_width {
            check_shape("Dense input", &[ni], &[w])?;
        }
        Ok(Some(no))
    }

    fn num_params(&self) -> usize {
        self.weights.len() + self.bias.len()
    }

    fn apply(&self, x: ArrayView2<'_, f64>) -> Result<Matrix> {
        let (ni, no) = self.shape();
        check_shape("Dense input", &[ni], &[x.ncols()])?;
        let mut y = x.dot(&self.weights);
        y += &self.bias;
        debug_assert_eq!(y.ncols(), no);
        Ok(y)
    }

    fn forward(&mut self, x: ArrayView2<'_, f64>) -> Result<Matrix> {
        let y = self.apply(x)?;
        self.input = Some(x.to_owned());
        Ok(y)
    }

    fn backward(&mut self, dy: ArrayView2<'_, f64>) -> Result<Matrix> {
        let x = self
            .input
            .take()
            .ok_or(NnfsError::MissingForward { layer: "Dense" })?;
        let n = x.nrows();
        let (ni, no) = self.shape();
        check_shape("Dense output gradient", &[n, no], dy.shape())?;

        let mut dw = x.t().dot(&dy);
        let mut db = sum_rows(dy);
        let r = self.regularization;
        add_penalty_gradient(&mut dw, &self.weights, r.l1_weights, r.l2_weights);
        add_penalty_gradient(&mut db, &self.bias, r.l1_bias, r.l2_bias);
        debug_assert_eq!(dw.dim(), (ni, no));
        self.gradients = Some(Gradients {
            weights: dw,
            bias: db,
        });

        let dx = dy.dot(&self.weights.t());
        debug_assert_eq!(dx.dim(), x.dim());
        Ok(dx)
    }

    fn parameters(&mut self, key: usize) -> Result<Option<ParamSet<'_>>> {
        let grads = self
            .gradients
            .as_ref()
            .ok_or(NnfsError::MissingGradient { layer: "Dense" })?;
        ParamSet::new(
            key,
            self.weights.view_mut(),
            self.bias.view_mut(),
            grads.weights.view(),
            grads.bias.view(),
        )
        .map(Some)
    }

    fn regularization_loss(&self) -> Option<f64> {
        if self.regularization.is_zero() {
            return None;
        }
        let r = self.regularization;
        Some(penalty(&self.weights, r.l1_weights, r.l2_weights) + penalty(&self.bias, r.l1_bias, r.l2_bias))
    }
}
