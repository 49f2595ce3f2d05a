//! Structured error types for the punchlist engine.
//!
//! Only failures that abort a whole generation attempt surface here.
//! Per-asset problems (a photo that will not decode, a missing logo) are
//! handled inline with graceful degradation and never reach this type.

use thiserror::Error;

/// The unified error type returned by all public API functions.
#[derive(Debug, Error)]
pub enum Error {
    /// JSON input failed to parse as valid inspection content.
    #[error("failed to parse inspection content: {0}")]
    Parse(#[from] serde_json::Error),

    /// The underlying drawing surface could not be constructed. Fatal for
    /// the generation attempt: no partial document is emitted.
    #[error("drawing surface error: {0}")]
    Surface(String),

    /// Rendering or compositing failed.
    #[error("render error: {0}")]
    Render(String),

    /// A required input image (annotation snapshot, raster editor source)
    /// could not be decoded.
    #[error("image decode error: {0}")]
    ImageDecode(String),

    /// An in-flight generation was superseded by a newer one and its
    /// result must be discarded.
    #[error("stale generation: version {got} superseded by {current}")]
    StaleGeneration { got: u64, current: u64 },
}
