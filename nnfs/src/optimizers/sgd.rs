use ndarray::prelude::*;
use ndarray::Zip;

use super::{non_negative, Moments, ParamSet, Schedule, StateTable};
use crate::error::Result;
use crate::Optimizer;

/// Plain stochastic gradient descent, optionally with momentum.
#[derive(Debug, Clone)]
pub struct Sgd {
    schedule: Schedule,
    momentum: f64,
    states: StateTable<SgdState>,
}

/// Velocity of one parameter set, kept only when momentum is on.
#[derive(Debug, Clone, PartialEq)]
pub struct SgdState {
    pub velocity: Moments,
}

impl Sgd {
    pub fn new(learning_rate: f64) -> Result<Self> {
        Ok(Sgd {
            schedule: Schedule::new(learning_rate, 0.0)?,
            momentum: 0.0,
            states: StateTable::default(),
        })
    }

    pub fn with_decay(self, decay: f64) -> Result<Self> {
        Ok(Sgd {
            schedule: self.schedule.with_decay(decay)?,
            ..self
        })
    }

    pub fn with_momentum(self, momentum: f64) -> Result<Self> {
        non_negative("momentum", momentum)?;
        Ok(Sgd { momentum, ..self })
    }

    pub fn momentum(&self) -> f64 {
        self.momentum
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn state(&self, key: usize) -> Option<&SgdState> {
        self.states.get(key)
    }
}

/// `v = momentum * v - lr * g; p += v`
fn momentum_step<D: Dimension>(
    velocity: &mut Array<f64, D>,
    param: ArrayViewMut<'_, f64, D>,
    grad: ArrayView<'_, f64, D>,
    momentum: f64,
    lr: f64,
) {
    Zip::from(velocity)
        .and(param)
        .and(grad)
        .for_each(|v, p, &g| {
            *v = momentum * *v - lr * g;
            *p += *v;
        });
}

impl Optimizer for Sgd {
    fn learning_rate(&self) -> f64 {
        self.schedule.current()
    }

    fn iterations(&self) -> usize {
        self.schedule.iterations()
    }

    fn pre_update(&mut self) {
        self.schedule.pre_update();
    }

    fn update(&mut self, mut params: ParamSet<'_>) -> Result<()> {
        let lr = self.schedule.current();
        if self.momentum == 0.0 {
            params.weights.scaled_add(-lr, &params.weight_gradient);
            params.bias.scaled_add(-lr, &params.bias_gradient);
            return Ok(());
        }

        let momentum = self.momentum;
        let state = self.states.get_or_insert_with(params.key, || SgdState {
            velocity: Moments::zeros(&params),
        });
        state.velocity.check(&params)?;
        momentum_step(
            &mut state.velocity.weights,
            params.weights.view_mut(),
            params.weight_gradient.view(),
            momentum,
            lr,
        );
        momentum_step(
            &mut state.velocity.bias,
            params.bias.view_mut(),
            params.bias_gradient.view(),
            momentum,
            lr,
        );
        Ok(())
    }

    fn post_update(&mut self) {
        self.schedule.post_update();
    }

    fn reset(&mut self) {
        self.schedule.reset();
        self.states.clear();
    }
}
