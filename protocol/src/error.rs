use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to decode envelope payload: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Unexpected message type: expected [{expected}], got [{got}]")]
    UnexpectedType { expected: &'static str, got: String },
    #[error("Unknown message type: [{0}]")]
    UnknownType(String),
}
