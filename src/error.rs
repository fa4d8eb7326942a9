use thiserror::Error;

/// Main error type for the quench toolkit
#[derive(Error, Debug)]
pub enum QuenchError {
    /// Shape-related errors
    #[error("Shape error: {0}")]
    ShapeError(String),

    /// Conversion errors raised while building a converted model
    #[error("Conversion error: {0}")]
    ConversionError(String),

    /// Calibration errors (missing or unusable representative data)
    #[error("Calibration error: {0}")]
    CalibrationError(String),

    /// Errors raised while decoding or executing a converted model
    #[error("Interpreter error: {0}")]
    InterpreterError(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Invalid input errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Invalid state errors
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// IO errors
    #[error("IO error: {0}")]
    IoError(String),
}

impl QuenchError {
    /// Create a shape error with expected/actual context
    pub fn shape_error(expected: &str, got: &str) -> Self {
        QuenchError::ShapeError(format!("expected {}, got {}", expected, got))
    }
}

impl From<std::io::Error> for QuenchError {
    fn from(err: std::io::Error) -> Self {
        QuenchError::IoError(err.to_string())
    }
}

impl From<bincode::Error> for QuenchError {
    fn from(err: bincode::Error) -> Self {
        QuenchError::SerializationError(err.to_string())
    }
}

impl From<serde_json::Error> for QuenchError {
    fn from(err: serde_json::Error) -> Self {
        QuenchError::SerializationError(err.to_string())
    }
}

/// Result type for quench operations
pub type QuenchResult<T> = Result<T, QuenchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_error() {
        let error = QuenchError::shape_error("[32, 256]", "[32, 128]");
        assert!(error.to_string().contains("expected [32, 256], got [32, 128]"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: QuenchError = io_err.into();
        assert!(matches!(err, QuenchError::IoError(_)));
    }
}
