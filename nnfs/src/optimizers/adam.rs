use ndarray::prelude::*;
use ndarray::Zip;

use super::{positive, unit_rate, Moments, ParamSet, Schedule, StateTable, DEFAULT_EPSILON};
use crate::error::Result;
use crate::Optimizer;

/// Adaptive moment estimation: momentum plus an RMSProp-style cache, both
/// bias-corrected for their zero initialization.
#[derive(Debug, Clone)]
pub struct Adam {
    schedule: Schedule,
    epsilon: f64,
    beta_1: f64,
    beta_2: f64,
    states: StateTable<AdamState>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdamState {
    /// First moment (mean) of the gradient.
    pub momentum: Moments,
    /// Second moment (uncentered variance) of the gradient.
    pub cache: Moments,
    /// Number of updates applied to this parameter set.
    pub step: u64,
}

impl Default for Adam {
    /// Learning rate 0.001, betas 0.9 and 0.999, no decay.
    fn default() -> Self {
        Adam {
            schedule: Schedule {
                initial: 1e-3,
                current: 1e-3,
                decay: 0.0,
                iterations: 0,
            },
            epsilon: DEFAULT_EPSILON,
            beta_1: 0.9,
            beta_2: 0.999,
            states: StateTable::default(),
        }
    }
}

impl Adam {
    pub fn new(learning_rate: f64) -> Result<Self> {
        Ok(Adam {
            schedule: Schedule::new(learning_rate, 0.0)?,
            ..Adam::default()
        })
    }

    pub fn with_decay(self, decay: f64) -> Result<Self> {
        Ok(Adam {
            schedule: self.schedule.with_decay(decay)?,
            ..self
        })
    }

    pub fn with_epsilon(self, epsilon: f64) -> Result<Self> {
        positive("epsilon", epsilon)?;
        Ok(Adam { epsilon, ..self })
    }

    pub fn with_betas(self, beta_1: f64, beta_2: f64) -> Result<Self> {
        unit_rate("beta_1", beta_1)?;
        unit_rate("beta_2", beta_2)?;
        Ok(Adam {
            beta_1,
            beta_2,
            ..self
        })
    }

    pub fn betas(&self) -> (f64, f64) {
        (self.beta_1, self.beta_2)
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn state(&self, key: usize) -> Option<&AdamState> {
        self.states.get(key)
    }
}

#[derive(Clone, Copy)]
struct StepSize {
    lr: f64,
    beta_1: f64,
    beta_2: f64,
    epsilon: f64,
    /// `1 - beta_1^t` and `1 - beta_2^t`.
    correction_1: f64,
    correction_2: f64,
}

/// `1 - beta^step`, the bias correction for a moment estimate started at zero.
fn bias_correction(beta: f64, step: u64) -> f64 {
    1.0 - beta.powf(step as f64)
}

fn adam_step<D: Dimension>(
    m: &mut Array<f64, D>,
    v: &mut Array<f64, D>,
    param: ArrayViewMut<'_, f64, D>,
    grad: ArrayView<'_, f64, D>,
    s: StepSize,
) {
    Zip::from(m).and(v).and(param).and(grad).for_each(|m, v, p, &g| {
        *m = s.beta_1 * *m + (1.0 - s.beta_1) * g;
        *v = s.beta_2 * *v + (1.0 - s.beta_2) * g * g;
        let m_hat = *m / s.correction_1;
        let v_hat = *v / s.correction_2;
        *p -= s.lr * m_hat / (v_hat.sqrt() + s.epsilon);
    });
}

impl Optimizer for Adam {
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
        let state = self.states.get_or_insert_with(params.key, || AdamState {
            momentum: Moments::zeros(&params),
            cache: Moments::zeros(&params),
            step: 0,
        });
        state.momentum.check(&params)?;
        state.step += 1;
        let s = StepSize {
            lr: self.schedule.current(),
            beta_1: self.beta_1,
            beta_2: self.beta_2,
            epsilon: self.epsilon,
            correction_1: bias_correction(self.beta_1, state.step),
            correction_2: bias_correction(self.beta_2, state.step),
        };
        adam_step(
            &mut state.momentum.weights,
            &mut state.cache.weights,
            params.weights.view_mut(),
            params.weight_gradient.view(),
            s,
        );
        adam_step(
            &mut state.momentum.bias,
            &mut state.cache.bias,
            params.bias.view_mut(),
            params.bias_gradient.view(),
            s,
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
