use crate::signal::DType;

/// Errors raised by the learning-results engine.
#[derive(Debug, thiserror::Error)]
pub enum MvaError {
    /// The signal holds non floating point data.
    #[error("data type `{dtype}` is not supported, decomposition requires floating point data")]
    Type { dtype: DType },

    /// Missing or inconsistent options.
    #[error("{0}")]
    Configuration(String),

    #[error("shape mismatch: {0}")]
    Shape(String),

    /// A derived quantity was read before the computation that produces it.
    #[error("`{0}` is not available, run a decomposition first")]
    NotComputed(&'static str),

    #[error("unknown algorithm `{0}`")]
    UnknownAlgorithm(String),

    #[error("numerical failure: {0}")]
    Numerical(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("archive error: {0}")]
    Archive(#[from] serde_json::Error),
}

impl MvaError {
    pub(crate) fn missing_output_dimension(algorithm: &str) -> Self {
        MvaError::Configuration(format!(
            "the output_dimension must be specified when using `{algorithm}`"
        ))
    }

    pub(crate) fn real_only(algorithm: &str) -> Self {
        MvaError::Configuration(format!(
            "`{algorithm}` does not support complex-valued data"
        ))
    }
}

impl From<ndarray::ShapeError> for MvaError {
    fn from(err: ndarray::ShapeError) -> Self {
        MvaError::Shape(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MvaError>;
