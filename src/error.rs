//! Error module for the spike analysis library.
use std::error::Error;
use std::fmt;

/// Error types for the library.
///
/// Numeric degeneracies (silent units, empty trains, no avalanches) are not errors:
/// every analysis defines a substitution value for them instead.
#[derive(Debug, PartialEq, Clone)]
pub enum AnalysisError {
    /// Error for malformed inputs, e.g., mismatched index/time lengths, negative or non-finite times, non-positive bin size.
    InvalidInput(String),
    /// Error for incompatible spike data, e.g., different number of units.
    IncompatibleSpikeData(String),
    /// Error for out of bounds access, e.g., unit not found.
    OutOfBounds(String),
    /// Error when a power-law fit cannot be formed or does not converge.
    FitFailure(String),
    /// Error for I/O operations.
    IOError(String),
}

impl fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AnalysisError::InvalidInput(e) => write!(f, "Invalid input: {}", e),
            AnalysisError::IncompatibleSpikeData(e) => write!(f, "Incompatible spike data: {}", e),
            AnalysisError::OutOfBounds(e) => {
                write!(f, "Index out of bounds: {}", e)
            }
            AnalysisError::FitFailure(e) => write!(f, "Power-law fit failure: {}", e),
            AnalysisError::IOError(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl Error for AnalysisError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = AnalysisError::InvalidInput("negative time -1".to_string());
        assert_eq!(err.to_string(), "Invalid input: negative time -1");

        let err = AnalysisError::FitFailure("all values are equal".to_string());
        assert_eq!(err.to_string(), "Power-law fit failure: all values are equal");
    }
}
