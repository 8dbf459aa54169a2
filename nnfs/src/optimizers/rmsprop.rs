use ndarray::prelude::*;
use ndarray::Zip;

use super::{positive, unit_rate, Moments, ParamSet, Schedule, StateTable, DEFAULT_EPSILON};
use crate::error::Result;
use crate::Optimizer;

/// Like Adagrad, but the squared-gradient cache is an exponential moving
/// average, so old gradients are forgotten.
#[derive(Debug, Clone)]
pub struct RmsProp {
    schedule: Schedule,
    epsilon: f64,
    rho: f64,
    states: StateTable<RmsPropState>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RmsPropState {
    pub cache: Moments,
}

impl Default for RmsProp {
    /// Learning rate 0.001, decay 0.001, rho 0.9.
    fn default() -> Self {
        RmsProp {
            schedule: Schedule {
                initial: 1e-3,
                current: 1e-3,
                decay: 1e-3,
                iterations: 0,
            },
            epsilon: DEFAULT_EPSILON,
            rho: 0.9,
            states: StateTable::default(),
        }
    }
}

impl RmsProp {
    /// Uses the default decay (0.001) and rho (0.9).
    pub fn new(learning_rate: f64) -> Result<Self> {
        Ok(RmsProp {
            schedule: Schedule::new(learning_rate, 1e-3)?,
            ..RmsProp::default()
        })
    }

    pub fn with_decay(self, decay: f64) -> Result<Self> {
        Ok(RmsProp {
            schedule: self.schedule.with_decay(decay)?,
            ..self
        })
    }

    pub fn with_epsilon(self, epsilon: f64) -> Result<Self> {
        positive("epsilon", epsilon)?;
        Ok(RmsProp { epsilon, ..self })
    }

    /// Weight of the old cache in the moving average.
    pub fn with_rho(self, rho: f64) -> Result<Self> {
        unit_rate("rho", rho)?;
        Ok(RmsProp { rho, ..self })
    }

    pub fn rho(&self) -> f64 {
        self.rho
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn state(&self, key: usize) -> Option<&RmsPropState> {
        self.states.get(key)
    }
}

fn rmsprop_step<D: Dimension>(
    cache: &mut Array<f64, D>,
    param: ArrayViewMut<'_, f64, D>,
    grad: ArrayView<'_, f64, D>,
    lr: f64,
    rho: f64,
    epsilon: f64,
) {
    Zip::from(cache).and(param).and(grad).for_each(|c, p, &g| {
        *c = rho * *c + (1.0 - rho) * g * g;
        *p -= lr * g / (c.sqrt() + epsilon);
    });
}

impl Optimizer for RmsProp {
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
        let (rho, epsilon) = (self.rho, self.epsilon);
        let state = self.states.get_or_insert_with(params.key, || RmsPropState {
            cache: Moments::zeros(&params),
        });
        state.cache.check(&params)?;
        rmsprop_step(
            &mut state.cache.weights,
            params.weights.view_mut(),
            params.weight_gradient.view(),
            lr,
            rho,
            epsilon,
        );
        rmsprop_step(
            &mut state.cache.bias,
            params.bias.view_mut(),
            params.bias_gradient.view(),
            lr,
            rho,
            epsilon,
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
