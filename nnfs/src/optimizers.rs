//! Rules for turning gradients into parameter updates.
//!
//! Every optimizer follows the same per-step protocol: `pre_update` once,
//! `update` once per parameter set, `post_update` once. Adaptive optimizers
//! keep one state record per parameter set, created the first time they see
//! its key.

use ndarray::prelude::*;

use crate::error::{check_shape, NnfsError, Result};

mod adagrad;
mod adam;
mod rmsprop;
mod sgd;

pub use adagrad::{Adagrad, AdagradState};
pub use adam::{Adam, AdamState};
pub use rmsprop::{RmsProp, RmsPropState};
pub use sgd::{Sgd, SgdState};

/// Default guard against division by zero in adaptive optimizers.
pub const DEFAULT_EPSILON: f64 = 1e-7;

/// One layer's parameters, borrowed mutably, and the gradients to apply to
/// them.
#[derive(Debug)]
pub struct ParamSet<'a> {
    /// Identifies this parameter set across steps.
    pub key: usize,
    pub weights: ArrayViewMut2<'a, f64>,
    pub bias: ArrayViewMut1<'a, f64>,
    pub weight_gradient: ArrayView2<'a, f64>,
    pub bias_gradient: ArrayView1<'a, f64>,
}

impl<'a> ParamSet<'a> {
    /// Fails unless each gradient has the shape of its parameter.
    pub fn new(
        key: usize,
        weights: ArrayViewMut2<'a, f64>,
        bias: ArrayViewMut1<'a, f64>,
        weight_gradient: ArrayView2<'a, f64>,
        bias_gradient: ArrayView1<'a, f64>,
    ) -> Result<Self> {
        check_shape("weight gradient", weights.shape(), weight_gradient.shape())?;
        check_shape("bias gradient", bias.shape(), bias_gradient.shape())?;
        Ok(ParamSet {
            key,
            weights,
            bias,
            weight_gradient,
            bias_gradient,
        })
    }
}

/// Learning rate with inverse-time decay:
/// `current = initial / (1 + decay * iterations)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Schedule {
    initial: f64,
    current: f64,
    decay: f64,
    iterations: usize,
}

impl Schedule {
    pub fn new(learning_rate: f64, decay: f64) -> Result<Self> {
        if !(learning_rate > 0.0 && learning_rate.is_finite()) {
            return Err(NnfsError::config(format!(
                "learning rate must be positive, got {learning_rate}"
            )));
        }
        non_negative("decay", decay)?;
        Ok(Schedule {
            initial: learning_rate,
            current: learning_rate,
            decay,
            iterations: 0,
        })
    }

    pub fn initial(&self) -> f64 {
        self.initial
    }

    pub fn current(&self) -> f64 {
        self.current
    }

    pub fn decay(&self) -> f64 {
        self.decay
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn with_decay(self, decay: f64) -> Result<Self> {
        non_negative("decay", decay)?;
        Ok(Schedule { decay, ..self })
    }

    pub fn pre_update(&mut self) {
        if self.decay > 0.0 {
            self.current = self.initial / (1.0 + self.decay * self.iterations as f64);
        }
    }

    pub fn post_update(&mut self) {
        self.iterations += 1;
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
        self.iterations = 0;
    }
}

pub(crate) fn non_negative(what: &str, value: f64) -> Result<()> {
    if value >= 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(NnfsError::config(format!("{what} must be non-negative, got {value}")))
    }
}

pub(crate) fn positive(what: &str, value: f64) -> Result<()> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(NnfsError::config(format!("{what} must be positive, got {value}")))
    }
}

/// Check that `value` is in `[0, 1)`, as exponential averaging rates must be.
pub(crate) fn unit_rate(what: &str, value: f64) -> Result<()> {
    if (0.0..1.0).contains(&value) {
        Ok(())
    } else {
        Err(NnfsError::config(format!("{what} must be in [0, 1), got {value}")))
    }
}

/// A per-element accumulator shaped like one parameter set.
#[derive(Debug, Clone, PartialEq)]
pub struct Moments {
    pub weights: Array2<f64>,
    pub bias: Array1<f64>,
}

impl Moments {
    pub(crate) fn zeros(params: &ParamSet<'_>) -> Self {
        Moments {
            weights: Array2::zeros(params.weights.raw_dim()),
            bias: Array1::zeros(params.bias.raw_dim()),
        }
    }

    /// A layer's parameters can't change shape, so a mismatch means two
    /// different layers were given the same key.
    pub(crate) fn check(&self, params: &ParamSet<'_>) -> Result<()> {
        check_shape("optimizer state", self.weights.shape(), params.weights.shape())?;
        check_shape("optimizer state", self.bias.shape(), params.bias.shape())
    }
}

/// Optimizer state records, indexed by parameter-set key.
#[derive(Debug, Clone)]
pub(crate) struct StateTable<S> {
    slots: Vec<Option<S>>,
}

impl<S> Default for StateTable<S> {
    fn default() -> Self {
        StateTable { slots: Vec::new() }
    }
}

impl<S> StateTable<S> {
    pub(crate) fn get(&self, key: usize) -> Option<&S> {
        self.slots.get(key).and_then(Option::as_ref)
    }

    pub(crate) fn get_or_insert_with(&mut self, key: usize, create: impl FnOnce() -> S) -> &mut S {
        if key >= self.slots.len() {
            self.slots.resize_with(key + 1, || None);
        }
        let slot = &mut self.slots[key];
        if slot.is_none() {
            log::debug!("creating optimizer state for parameter set {key}");
        }
        slot.get_or_insert_with(create)
    }

    pub(crate) fn clear(&mut self) {
        self.slots.clear();
    }
}
