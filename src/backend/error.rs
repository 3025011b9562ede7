use thiserror::Error;

/// Errors a backend can raise while turning normalized IR into a target query.
/// Unlike the frontend's error types, these are detected after the query is
/// already known to be semantically valid -- they reflect a gap between what
/// the IR expresses and what a particular backend's dialect can emit.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BackendError {
    #[error("the {backend} backend does not support {feature} (at {location})")]
    NotSupportedByBackend { backend: &'static str, feature: String, location: String },

    #[error("internal invariant violated: {0}")]
    InternalAssertionError(String),
}
