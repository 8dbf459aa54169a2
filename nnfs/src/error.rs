use thiserror::Error;

/// Everything that can go wrong while composing or running a network.
///
/// All of these are configuration bugs rather than transient conditions, so
/// nothing in the crate retries after one of them.
#[derive(Debug, Error)]
pub enum NnfsError {
    #[error("shape mismatch in {operation}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        operation: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("{layer}: backward called without a matching forward")]
    MissingForward { layer: &'static str },

    #[error("{layer}: no gradients yet; run a backward pass before updating")]
    MissingGradient { layer: &'static str },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

pub type Result<T, E = NnfsError> = std::result::Result<T, E>;

impl NnfsError {
    pub(crate) fn shape(operation: &'static str, expected: &[usize], actual: &[usize]) -> Self {
        NnfsError::ShapeMismatch {
            operation,
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        NnfsError::InvalidConfiguration(message.into())
    }
}

/// Fail with `ShapeMismatch` unless `actual == expected`.
pub(crate) fn check_shape(operation: &'static str, expected: &[usize], actual: &[usize]) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(NnfsError::shape(operation, expected, actual))
    }
}
