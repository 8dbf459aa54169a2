//! A small neural-network training engine: dense layers, activations, losses,
//! optimizers, and a training loop to drive them.

mod array_util;

mod error;
pub use error::{NnfsError, Result};

mod traits;
pub use traits::{Callback, Differentiable, Layer, Loss, LossOutput, Model, Optimizer};

mod targets;
pub use targets::Targets;

mod model;
pub use model::{FitConfig, History, NetworkBuilder, NeuralNetwork, Shuffle, Validation};

pub mod callback;
pub mod layers;
pub mod loss;
pub mod metrics;
pub use metrics::Metric;
pub mod optimizers;

/// A batch of examples: one row per example, one column per feature.
pub type Matrix = ndarray::Array2<f64>;
