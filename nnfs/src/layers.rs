//! Network stages: the dense layer and the activation functions.

mod activation;
mod dense;
mod softmax;

pub use activation::{Activation, Linear, Relu, Sigmoid, Tanh};
pub use dense::{Dense, Regularization};
pub use softmax::Softmax;
