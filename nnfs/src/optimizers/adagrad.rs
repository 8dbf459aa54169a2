use ndarray::prelude::*;
use ndarray::Zip;

use super::{positive, Moments, ParamSet, Schedule, StateTable, DEFAULT_EPSILON};
use crate::error::Result;
use crate::Optimizer;

/// SGD with a per-parameter learning rate that shrinks as squared gradients
/// pile up.
#[derive(Debug, Clone)]
pub struct Adagrad {
    schedule: Schedule,
    epsilon: f64,
    states: StateTable<AdagradState>,
}

/// Running sum of squared gradients for one parameter set.
#[derive(Debug, Clone, PartialEq)]
pub struct AdagradState {
    pub cache: Moments,
}

impl Adagrad {
    pub fn new(learning_rate: f64) -> Result<Self> {
        Ok(Adagrad {
            schedule: Schedule::new(learning_rate, 0.0)?,
            epsilon: DEFAULT_EPSILON,
            states: StateTable::default(),
        })
    }

    pub fn with_decay(self, decay: f64) -> Result<Self> {
        Ok(Adagrad {
            schedule: self.schedule.with_decay(decay)?,
            ..self
        })
    }

    pub fn with_epsilon(self, epsilon: f64) -> Result<Self> {
        positive("epsilon", epsilon)?;
        Ok(Adagrad { epsilon, ..self })
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn state(&self, key: usize) -> Option<&AdagradState> {
        self.states.get(key)
    }
}

fn adagrad_step<D: Dimension>(
    cache: &mut Array<f64, D>,
    param: ArrayViewMut<'_, f64, D>,
    grad: ArrayView<'_, f64, D>,
    lr: f64,
    epsilon: f64,
) {
    Zip::from(cache).and(param).and(grad).for_each(|c, p, &g| {
        *c += g * g;
        *p -= lr * g / (c.sqrt() + epsilon);
    });
}

impl Optimizer for Adagrad {
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
        let epsilon = self.epsilon;
        let state = self.states.get_or_insert_with(params.key, || AdagradState {
            cache: Moments::zeros(&params),
        });
        state.cache.check(&params)?;
        adagrad_step(
            &mut state.cache.weights,
            params.weights.view_mut(),
            params.weight_gradient.view(),
            lr,
            epsilon,
        );
        adagrad_step(
            &mut state.cache.bias,
            params.bias.view_mut(),
            params.bias_gradient.view(),
            lr,
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
