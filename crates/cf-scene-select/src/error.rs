//! Error types for scene selection operations.

use crate::image_slot::SlotState;

/// Result type alias for scene selection operations.
pub type SceneResult<T> = Result<T, SceneError>;

/// Errors that can occur while picking, indexing or editing a scene.
///
/// Expected absences (no ray hit, empty selection, no qualifying images) are
/// not errors; they are reported as `None` or empty values.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SceneError {
    /// An image slot was asked to make a transition its current state forbids.
    #[error("image slot cannot {operation} while {state:?}")]
    InvalidSlotTransition {
        /// The operation that was attempted.
        operation: &'static str,
        /// The state the slot was in.
        state: SlotState,
    },

    /// A job was enqueued after shutdown had been requested.
    #[error("job queue has been shut down")]
    QueueShutDown,

    /// The worker thread could not be started.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    /// A background job reported failure.
    #[error("background job '{0}' failed")]
    JobFailed(String),

    /// A background job panicked.
    #[error("background job panicked: {0}")]
    JobPanicked(String),

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// An element index does not exist in the target collection.
    #[error("{kind} index {index} out of range (len {len})")]
    IndexOutOfRange {
        /// Kind of element being indexed.
        kind: &'static str,
        /// The offending index.
        index: usize,
        /// Length of the collection.
        len: usize,
    },

    /// Image decoding or resampling failed.
    #[error("image error: {0}")]
    Image(String),
}

impl SceneError {
    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_config(details: impl Into<String>) -> Self {
        Self::InvalidConfig(details.into())
    }

    /// Create an image error.
    #[must_use]
    pub fn image(details: impl Into<String>) -> Self {
        Self::Image(details.into())
    }

    /// Create an index out of range error.
    #[must_use]
    pub const fn out_of_range(kind: &'static str, index: usize, len: usize) -> Self {
        Self::IndexOutOfRange { kind, index, len }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SceneError::invalid_config("click window must be positive");
        assert!(format!("{err}").contains("click window"));

        let err = SceneError::out_of_range("point", 12, 4);
        assert_eq!(format!("{err}"), "point index 12 out of range (len 4)");

        let err = SceneError::InvalidSlotTransition {
            operation: "assign",
            state: SlotState::Empty,
        };
        assert!(format!("{err}").contains("assign"));
        assert!(format!("{err}").contains("Empty"));

        let err = SceneError::QueueShutDown;
        assert!(format!("{err}").contains("shut down"));
    }
}
