use ndarray::prelude::*;
use ndarray::Zip;

use crate::{Differentiable, Matrix};

/// Converts each row of the input to a probability distribution, using the
/// [softmax function](https://en.wikipedia.org/wiki/Softmax_function).
///
/// This is often the last layer in a classification network. When it is
/// followed by categorical cross-entropy, prefer the fused
/// `loss::CceSoftmax`, whose backward pass skips the Jacobian below.
#[derive(Debug, Clone, Copy)]
pub struct Softmax;

impl Differentiable for Softmax {
    const NAME: &'static str = "Softmax";

    fn activate(&self, x: ArrayView2<'_, f64>) -> Matrix {
        let mut y = x.to_owned();
        Zip::from(y.rows_mut()).par_for_each(|mut row| {
            // Subtracting the max keeps exp() from overflowing and doesn't
            // change the result.
            let max = row.fold(f64::NEG_INFINITY, |m, &v| m.max(v));
            row.mapv_inplace(|v| (v - max).exp());
            let sum = row.sum();
            row /= sum;
        });
        y
    }

    fn gradient(
        &self,
        _x: ArrayView2<'_, f64>,
        y: ArrayView2<'_, f64>,
        dy: ArrayView2<'_, f64>,
    ) -> Matrix {
        // For one row, ∂y[k]/∂x[j] = y[k] * ((j == k) - y[j]), so the
        // Jacobian is diag(y) - y yᵀ, and ∂L/∂x = J · ∂L/∂y.
        let mut dx = Matrix::zeros(y.raw_dim());
        Zip::from(dx.rows_mut())
            .and(y.rows())
            .and(dy.rows())
            .par_for_each(|mut dx, y, dy| {
                let column = y.insert_axis(Axis(1));
                let jacobian = Array2::from_diag(&y) - column.dot(&column.t());
                dx.assign(&jacobian.dot(&dy));
            });
        dx
    }
}
