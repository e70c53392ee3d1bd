use thiserror::Error;

/// Library errors using thiserror for structured error handling.
///
/// None of these cross the detector's public lifecycle API: detection
/// failures are counted and logged by the pipeline, configuration failures
/// surface only when building a detector or loading a config file.

#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("Detection failed: {0}")]
    Failed(String),

    #[error("Detection model error")]
    Model(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Detector panicked: {0}")]
    Panicked(String),

    #[error("No detector configured")]
    NotConfigured,
}

impl DetectionError {
    /// Convenience constructor for message-only failures
    pub fn failed(message: impl Into<String>) -> Self {
        DetectionError::Failed(message.into())
    }

    /// Wrap any model/backend error
    pub fn model<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        DetectionError::Model(Box::new(source))
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration from {path}")]
    LoadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration")]
    ParseFailed(#[source] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
