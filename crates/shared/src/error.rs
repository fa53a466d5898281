use thiserror::Error;

#[derive(Debug, Error)]
pub enum ButtonCodecError {
    #[error("button list failed to encode: {0}")]
    Encode(serde_json::Error),
    #[error("persisted button list is not valid JSON: {0}")]
    Parse(serde_json::Error),
    #[error("persisted button list is not a JSON array")]
    NotAnArray,
}
