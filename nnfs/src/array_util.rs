use ndarray::prelude::*;

/// Smallest probability the losses will take a log of or divide by.
pub const EPSILON: f64 = 1e-7;

/// Clamp every element into `[EPSILON, 1 - EPSILON]`.
pub fn clip_probabilities(p: ArrayView2<'_, f64>) -> Array2<f64> {
    p.mapv(|v| v.clamp(EPSILON, 1.0 - EPSILON))
}

/// Index of the largest element of each row.
///
/// Ties go to the lowest index. An empty row maps to 0.
pub fn argmax_rows(a: ArrayView2<'_, f64>) -> Array1<usize> {
    a.rows()
        .into_iter()
        .map(|row| {
            let mut best = 0;
            for (j, &v) in row.iter().enumerate() {
                if v > row[best] {
                    best = j;
                }
            }
            best
        })
        .collect()
}

/// Sum over the batch axis, always in row order.
///
/// `sum_axis` may pick a different summation order depending on memory
/// layout; this one doesn't, so bias gradients are reproducible bit for bit.
pub fn sum_rows(a: ArrayView2<'_, f64>) -> Array1<f64> {
    let mut total = Array1::zeros(a.ncols());
    for row in a.rows() {
        total += &row;
    }
    total
}

/// Mean of a vector, summed front to back. Empty input gives 0.
pub fn mean(v: ArrayView1<'_, f64>) -> f64 {
    if v.is_empty() {
        0.0
    } else {
        v.iter().fold(0.0, |acc, &x| acc + x) / v.len() as f64
    }
}
