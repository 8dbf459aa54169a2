use ndarray::prelude::*;
use ndarray::Zip;

use crate::error::{check_shape, NnfsError, Result};
use crate::{Differentiable, Layer, Matrix};

/// Layer that applies an activation function to its input.
///
/// The function has no parameters; this wrapper only remembers what the
/// derivative needs between `forward` and `backward`.
#[derive(Debug, Clone)]
pub struct Activation<F> {
    f: F,
    /// Input and output of the last `forward` call.
    cache: Option<(Matrix, Matrix)>,
}

impl<F: Differentiable> Activation<F> {
    pub fn new(f: F) -> Self {
        Activation { f, cache: None }
    }

    pub fn function(&self) -> F {
        self.f
    }
}

impl<F: Differentiable> Layer for Activation<F> {
    fn name(&self) -> &'static str {
        F::NAME
    }

    fn output_width(&self, input_width: Option<usize>) -> Result<Option<usize>> {
        Ok(input_width)
    }

    fn apply(&self, x: ArrayView2<'_, f64>) -> Result<Matrix> {
        Ok(self.f.activate(x))
    }

    fn forward(&mut self, x: ArrayView2<'_, f64>) -> Result<Matrix> {
        let y = self.f.activate(x);
        self.cache = Some((x.to_owned(), y.clone()));
        Ok(y)
    }

    fn backward(&mut self, dy: ArrayView2<'_, f64>) -> Result<Matrix> {
        let (x, y) = self
            .cache
            .take()
            .ok_or(NnfsError::MissingForward { layer: F::NAME })?;
        check_shape(F::NAME, y.shape(), dy.shape())?;
        Ok(self.f.gradient(x.view(), y.view(), dy))
    }
}

/// Rectified linear unit activation function.
#[derive(Debug, Clone, Copy)]
pub struct Relu;

impl Differentiable for Relu {
    const NAME: &'static str = "ReLU";

    fn activate(&self, x: ArrayView2<'_, f64>) -> Matrix {
        Zip::from(x).par_map_collect(|&x| x.max(0.0))
    }

    fn gradient(
        &self,
        x: ArrayView2<'_, f64>,
        _y: ArrayView2<'_, f64>,
        dy: ArrayView2<'_, f64>,
    ) -> Matrix {
        Zip::from(x)
            .and(dy)
            .par_map_collect(|&x, &dy| if x > 0.0 { dy } else { 0.0 })
    }
}

/// The logistic function, a handy symmetric, s-shaped function.
#[derive(Debug, Clone, Copy)]
pub struct Sigmoid;

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

impl Differentiable for Sigmoid {
    const NAME: &'static str = "Sigmoid";

    fn activate(&self, x: ArrayView2<'_, f64>) -> Matrix {
        Zip::from(x).par_map_collect(|&x| sigmoid(x))
    }

    fn gradient(
        &self,
        _x: ArrayView2<'_, f64>,
        y: ArrayView2<'_, f64>,
        dy: ArrayView2<'_, f64>,
    ) -> Matrix {
        Zip::from(y)
            .and(dy)
            .par_map_collect(|&y, &dy| y * (1.0 - y) * dy)
    }
}

/// Hyperbolic tangent.
#[derive(Debug, Clone, Copy)]
pub struct Tanh;

impl Differentiable for Tanh {
    const NAME: &'static str = "Tanh";

    fn activate(&self, x: ArrayView2<'_, f64>) -> Matrix {
        Zip::from(x).par_map_collect(|&x| x.tanh())
    }

    fn gradient(
        &self,
        _x: ArrayView2<'_, f64>,
        y: ArrayView2<'_, f64>,
        dy: ArrayView2<'_, f64>,
    ) -> Matrix {
        Zip::from(y)
            .and(dy)
            .par_map_collect(|&y, &dy| (1.0 - y * y) * dy)
    }
}

/// The identity. Useful as the last layer of a regression network.
#[derive(Debug, Clone, Copy)]
pub struct Linear;

impl Differentiable for Linear {
    const NAME: &'static str = "Linear";

    fn activate(&self, x: ArrayView2<'_, f64>) -> Matrix {
        x.to_owned()
    }

    fn gradient(
        &self,
        _x: ArrayView2<'_, f64>,
        _y: ArrayView2<'_, f64>,
        dy: ArrayView2<'_, f64>,
    ) -> Matrix {
        dy.to_owned()
    }
}
