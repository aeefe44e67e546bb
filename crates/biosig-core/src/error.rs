//! Error handling for the biosig workspace
//!
//! One error type is shared by the data model and the processing layer so
//! that a failing queue step surfaces to the caller unchanged.

use core::fmt;

/// Result type alias for biosig operations
pub type BiosigResult<T> = Result<T, BiosigError>;

/// Error type for all biosig operations
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum BiosigError {
    /// Sampling rate is zero, negative or not finite
    InvalidSamplingRate {
        /// Provided sampling rate
        rate: f64,
    },

    /// Timestamp validation error
    InvalidTimestamp {
        /// Description of timestamp issue
        reason: String,
    },

    /// Data or timestamp shapes do not line up
    ShapeMismatch {
        /// Description of the mismatch
        reason: String,
    },

    /// Invalid construction or registration parameters
    InvalidConfig {
        /// Description of the configuration error
        reason: String,
    },

    /// Segmentation parameters cannot produce a window
    InvalidWindow {
        /// Description of the windowing issue
        reason: String,
    },

    /// Lookup of a channel that is not in the container
    ChannelNotFound {
        /// Requested channel name
        name: String,
    },

    /// Channel name already present in the container
    DuplicateChannel {
        /// Conflicting channel name
        name: String,
    },

    /// Event positions do not index into the supplied timestamps
    EventIndex {
        /// Offending event value
        event: f64,
        /// Number of timestamps available
        len: usize,
    },

    /// Event data is empty or malformed
    InvalidEvents {
        /// Description of the event issue
        reason: String,
    },

    /// A processing function returned a shape that cannot become a channel
    UnsupportedResult {
        /// Kind of value that was returned
        kind: &'static str,
    },

    /// A processing function returned several values and no index was given
    AmbiguousResult {
        /// Description of the ambiguity
        reason: String,
    },

    /// Error raised by a wrapped processing or feature function
    FunctionFailed {
        /// Function name
        function: String,
        /// Failure description
        reason: String,
    },

    /// Pipeline operation attempted in the wrong state
    InvalidState {
        /// Current state
        current: &'static str,
        /// Operation that was attempted
        operation: &'static str,
    },

    /// Serialization/deserialization error
    SerializationError {
        /// Serialization error description
        reason: String,
    },

    /// Filesystem error while reading configuration
    Io {
        /// I/O error description
        reason: String,
    },
}

impl BiosigError {
    /// Build a [`BiosigError::FunctionFailed`] for a wrapped function
    pub fn function(function: impl Into<String>, reason: impl Into<String>) -> Self {
        BiosigError::FunctionFailed {
            function: function.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for BiosigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BiosigError::InvalidSamplingRate { rate } => {
                write!(f, "Invalid sampling rate: {}Hz, must be positive", rate)
            }
            BiosigError::InvalidTimestamp { reason } => {
                write!(f, "Invalid timestamp: {}", reason)
            }
            BiosigError::ShapeMismatch { reason } => {
                write!(f, "Shape mismatch: {}", reason)
            }
            BiosigError::InvalidConfig { reason } => {
                write!(f, "Invalid configuration: {}", reason)
            }
            BiosigError::InvalidWindow { reason } => {
                write!(f, "Invalid window: {}", reason)
            }
            BiosigError::ChannelNotFound { name } => {
                write!(f, "Channel '{}' not found", name)
            }
            BiosigError::DuplicateChannel { name } => {
                write!(f, "Channel '{}' already exists", name)
            }
            BiosigError::EventIndex { event, len } => {
                write!(f, "Event {} does not index into {} timestamps", event, len)
            }
            BiosigError::InvalidEvents { reason } => {
                write!(f, "Invalid events: {}", reason)
            }
            BiosigError::UnsupportedResult { kind } => {
                write!(f, "Unsupported result type: {}", kind)
            }
            BiosigError::AmbiguousResult { reason } => {
                write!(f, "Ambiguous result: {}", reason)
            }
            BiosigError::FunctionFailed { function, reason } => {
                write!(f, "Function '{}' failed: {}", function, reason)
            }
            BiosigError::InvalidState { current, operation } => {
                write!(f, "Cannot {} while pipeline is {}", operation, current)
            }
            BiosigError::SerializationError { reason } => {
                write!(f, "Serialization error: {}", reason)
            }
            BiosigError::Io { reason } => {
                write!(f, "I/O error: {}", reason)
            }
        }
    }
}

impl std::error::Error for BiosigError {}

/// Convenience macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)+) => {
        $crate::error::BiosigError::InvalidConfig {
            reason: format!($($arg)+)
        }
    };
}

/// Convenience macro for creating shape errors
#[macro_export]
macro_rules! shape_error {
    ($($arg:tt)+) => {
        $crate::error::BiosigError::ShapeMismatch {
            reason: format!($($arg)+)
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = BiosigError::EventIndex { event: 12.0, len: 5 };
        let display = format!("{}", error);
        assert!(display.contains("12"));
        assert!(display.contains("5 timestamps"));
    }

    #[test]
    fn test_error_macros() {
        let error = config_error!("window size {} must be positive", -1.0);
        assert_eq!(
            error,
            BiosigError::InvalidConfig {
                reason: "window size -1 must be positive".to_string()
            }
        );

        let error = shape_error!("{} != {}", 3, 4);
        assert!(error.to_string().starts_with("Shape mismatch"));
    }

    #[test]
    fn test_function_error() {
        let error = BiosigError::function("bandpass", "cutoff above nyquist");
        assert_eq!(
            error.to_string(),
            "Function 'bandpass' failed: cutoff above nyquist"
        );
    }
}
