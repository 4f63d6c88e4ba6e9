use thiserror::Error;

/// Fatal or structural failures that abort a [`crate::Decoder::parse`] call.
///
/// Recoverable issues (corrupt frames, desynced streams, unrecognised events)
/// never surface here: they are reported through
/// [`crate::stats::LogStatistics`] and the `valid` flag passed to
/// `on_frame_ready`. This enum only covers the cases where the log cannot be
/// made sense of at all.
#[derive(Debug, Error)]
pub enum Error {
    #[error("log index {index} out of range (log count is {count})")]
    LogIndexOutOfRange { index: usize, count: usize },

    #[error("no start-of-log marker found and the buffer is empty")]
    EmptyInput,

    #[error("header parsing failed: {0}")]
    HeaderParse(String),

    #[error("no 'I' frame definition (missing 'Field I name' header)")]
    MissingIFrameDefinition,

    #[error("predictor {predictor:?} on field {field} requires the '{needed}' field, which this log does not declare")]
    MissingSemanticField {
        predictor: crate::stream::predictor::FieldPredictor,
        field: usize,
        needed: &'static str,
    },

    #[error("unknown field encoding id {0}")]
    UnknownEncoding(u32),

    #[error("unknown field predictor id {0}")]
    UnknownPredictor(u32),
}

pub type Result<T> = std::result::Result<T, Error>;
