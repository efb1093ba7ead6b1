use ort::Error as OrtError;

use crate::model_manager::ModelError;

/// Represents the different types of errors that can occur while classifying waste images.
///
/// Resolving a label to a category never fails, so every variant here comes from
/// decoding the image or from the inference adapter.
#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    /// The supplied bytes could not be decoded into pixel data
    #[error("Decode error: {0}")]
    DecodeError(String),
    /// The inference adapter failed to load or to run
    #[error("Inference error: {0}")]
    InferenceError(String),
    /// Error occurred due to invalid input parameters
    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl ClassifierError {
    /// Whether the failure came from the inference side (model load or run).
    pub fn is_inference(&self) -> bool {
        matches!(self, Self::InferenceError(_))
    }
}

impl From<OrtError> for ClassifierError {
    fn from(err: OrtError) -> Self {
        ClassifierError::InferenceError(err.to_string())
    }
}

impl From<ModelError> for ClassifierError {
    fn from(err: ModelError) -> Self {
        ClassifierError::InferenceError(err.to_string())
    }
}

impl From<image::ImageError> for ClassifierError {
    fn from(err: image::ImageError) -> Self {
        ClassifierError::DecodeError(err.to_string())
    }
}
